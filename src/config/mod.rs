use crate::agents::environment::{EnvironmentSettings, SandboxMode};
use crate::agents::go_execution::RunnerSettings;
use crate::artifacts::{PostUpdateOption, UpdateConfig};
use crate::error::{GomodError, Result};
use crate::golang::ModulePathRules;
use crate::golang::module_path::PathConvention;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod host_rules;
pub use host_rules::{ConfigHostRules, HostRuleEntry};

pub const CONFIG_FILE: &str = "gomodup.toml";

/// `gomodup.toml` contents.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// unset | "global" | "docker"
    pub binary_source: Option<String>,
    pub cache_dir: Option<PathBuf>,
    pub go_image: Option<String>,
    pub toolchain_dir: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub cgo_enabled: Option<bool>,
    /// Module path prefixes using `.vN` selectors instead of `/vN` suffixes.
    pub legacy_module_prefixes: Vec<String>,
    pub update: UpdateSection,
    pub host_rules: Vec<HostRuleEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UpdateSection {
    pub post_update_options: Vec<String>,
    pub registry_urls: Vec<String>,
    pub constraints: BTreeMap<String, String>,
}

impl ToolConfig {
    /// Load `explicit`, or `gomodup.toml` in the project when present.
    pub fn load(project_path: &Path, explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let default = project_path.join(CONFIG_FILE);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let content = fs::read_to_string(&path).map_err(|e| {
            GomodError::Configuration(format!("Failed to read '{}': {e}", path.display()))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn apply_env_overrides(&mut self, env: &BTreeMap<String, String>) {
        if let Some(source) = env.get("GOMODUP_BINARY_SOURCE") {
            self.binary_source = Some(source.clone());
        }
        if let Some(dir) = env.get("GOMODUP_CACHE_DIR").filter(|d| !d.is_empty()) {
            self.cache_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn sandbox_mode(&self) -> SandboxMode {
        SandboxMode::from_binary_source(self.binary_source.as_deref())
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("gomodup"))
    }

    /// Update settings shared by every request; the caller adds the
    /// per-request update kind and major version.
    pub fn update_config(&self) -> UpdateConfig {
        UpdateConfig {
            tool_constraints: self.update.constraints.clone(),
            post_update_options: PostUpdateOption::parse_set(&self.update.post_update_options),
            registry_urls: self.update.registry_urls.clone(),
            ..UpdateConfig::default()
        }
    }

    pub fn environment_settings(&self, base_env: BTreeMap<String, String>) -> EnvironmentSettings {
        EnvironmentSettings {
            sandbox_mode: self.sandbox_mode(),
            base_env,
            cache_dir: self.cache_dir(),
            cgo_enabled: self.cgo_enabled.unwrap_or(true),
        }
    }

    pub fn runner_settings(&self, show_progress: bool) -> RunnerSettings {
        let defaults = RunnerSettings::default();
        RunnerSettings {
            toolchain_dir: self.toolchain_dir.clone(),
            go_image: self.go_image.clone().unwrap_or(defaults.go_image),
            docker_binary: defaults.docker_binary,
            timeout: self.timeout_secs.map(Duration::from_secs),
            show_progress,
        }
    }

    pub fn module_path_rules(&self) -> ModulePathRules {
        self.legacy_module_prefixes
            .iter()
            .fold(ModulePathRules::default(), |rules, prefix| {
                rules.with_rule(prefix.as_str(), PathConvention::LegacySelector)
            })
    }

    pub fn host_rules(&self) -> ConfigHostRules {
        ConfigHostRules::new(self.host_rules.clone())
    }
}
