use regex::Regex;
use std::sync::LazyLock;

static MAJOR_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/v(\d+)$").expect("valid major suffix regex"));

/// How a hosting convention encodes the major version in module paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathConvention {
    /// `example.com/mod/v2`
    MajorSuffix,
    /// Legacy selectors such as `gopkg.in/yaml.v3`. Import paths cannot be
    /// rewritten with a `/vN` suffix.
    LegacySelector,
}

#[derive(Debug, Clone)]
pub struct ModulePathRule {
    pub prefix: String,
    pub convention: PathConvention,
}

/// Prefix table deciding which convention a module path follows. Paths
/// matching no rule use the `/vN` suffix convention.
#[derive(Debug, Clone)]
pub struct ModulePathRules {
    rules: Vec<ModulePathRule>,
}

impl Default for ModulePathRules {
    fn default() -> Self {
        Self {
            rules: vec![ModulePathRule {
                prefix: "gopkg.in/".to_string(),
                convention: PathConvention::LegacySelector,
            }],
        }
    }
}

impl ModulePathRules {
    pub fn with_rule(mut self, prefix: impl Into<String>, convention: PathConvention) -> Self {
        self.rules.push(ModulePathRule {
            prefix: prefix.into(),
            convention,
        });
        self
    }

    pub fn convention(&self, module_path: &str) -> PathConvention {
        // Longest prefix wins so more specific rules can override broad ones.
        self.rules
            .iter()
            .filter(|rule| module_path.starts_with(&rule.prefix))
            .max_by_key(|rule| rule.prefix.len())
            .map(|rule| rule.convention)
            .unwrap_or(PathConvention::MajorSuffix)
    }

    /// Whether imports of `module_path` can be rewritten to `target_major`.
    pub fn is_rewrite_eligible(
        &self,
        module_path: &str,
        new_version: Option<&str>,
        target_major: u64,
    ) -> bool {
        if target_major < 2 || module_path.trim().is_empty() || module_path.contains(char::is_whitespace) {
            return false;
        }
        if self.convention(module_path) != PathConvention::MajorSuffix {
            return false;
        }
        if new_version.is_some_and(|v| v.ends_with("+incompatible")) {
            return false;
        }
        // Already at (or past) the target suffix, nothing to rewrite.
        !matches!(major_suffix(module_path), Some(current) if current >= target_major)
    }
}

/// Major version encoded as a trailing `/vN` element.
pub fn major_suffix(module_path: &str) -> Option<u64> {
    MAJOR_SUFFIX
        .captures(module_path)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
