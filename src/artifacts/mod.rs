// Artifact update data model
//
// - ManifestUpdateRequest: immutable input of one update call
// - UpdateConfig / PostUpdateOption / UpdateKind: what the caller asked for
// - ManifestPaths: conventional sibling paths of a go.mod
// - ArtifactResult: what the call hands back
pub mod result;

pub use result::{ArtifactError, ArtifactResult};

use crate::error::{GomodError, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// A dependency whose version was changed in the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRef {
    pub module_path: String,
    pub new_version: Option<String>,
}

impl DependencyRef {
    pub fn new(module_path: impl Into<String>, new_version: Option<&str>) -> Self {
        Self {
            module_path: module_path.into(),
            new_version: new_version.map(str::to_string),
        }
    }
}

impl FromStr for DependencyRef {
    type Err = GomodError;

    /// Parses `module` or `module@version`.
    fn from_str(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.is_empty() {
            return Err(GomodError::Configuration(
                "Dependency reference must not be empty".to_string(),
            ));
        }

        match value.rsplit_once('@') {
            Some((module, version)) if !module.is_empty() && !version.is_empty() => {
                Ok(Self::new(module, Some(version)))
            }
            Some(_) => Err(GomodError::Configuration(format!(
                "Invalid dependency reference '{value}', expected MODULE@VERSION"
            ))),
            None => Ok(Self::new(value, None)),
        }
    }
}

/// Recognised post-update options. Anything else is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PostUpdateOption {
    Tidy,
    TidyCompat117,
    VendorSync,
    UpdateImportPaths,
    MassageReplaceDirectives,
}

impl PostUpdateOption {
    /// Parse a loosely typed option list, dropping unknown members.
    pub fn parse_set<I, S>(values: I) -> BTreeSet<PostUpdateOption>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut options = BTreeSet::new();
        for value in values {
            match value.as_ref().parse::<PostUpdateOption>() {
                Ok(option) => {
                    options.insert(option);
                }
                Err(_) => warn!(option = value.as_ref(), "ignoring unrecognised post-update option"),
            }
        }
        options
    }
}

impl FromStr for PostUpdateOption {
    type Err = GomodError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim() {
            "tidy" | "gomodTidy" => Ok(Self::Tidy),
            "tidyCompat117" | "gomodTidy1.17" => Ok(Self::TidyCompat117),
            "vendorSync" | "gomodVendor" => Ok(Self::VendorSync),
            "updateImportPaths" | "gomodUpdateImportPaths" => Ok(Self::UpdateImportPaths),
            "massageReplaceDirectives" | "gomodMassage" => Ok(Self::MassageReplaceDirectives),
            other => Err(GomodError::Configuration(format!(
                "Unknown post-update option '{other}'"
            ))),
        }
    }
}

impl fmt::Display for PostUpdateOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Tidy => "tidy",
            Self::TidyCompat117 => "tidyCompat117",
            Self::VendorSync => "vendorSync",
            Self::UpdateImportPaths => "updateImportPaths",
            Self::MassageReplaceDirectives => "massageReplaceDirectives",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateKind {
    #[default]
    None,
    Major,
    Minor,
    Patch,
}

impl FromStr for UpdateKind {
    type Err = GomodError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "major" => Ok(Self::Major),
            "minor" => Ok(Self::Minor),
            "patch" => Ok(Self::Patch),
            other => Err(GomodError::Configuration(format!(
                "Unknown update type '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpdateConfig {
    /// Tool name to version constraint, e.g. `go` or `gomodMod`.
    pub tool_constraints: BTreeMap<String, String>,
    pub post_update_options: BTreeSet<PostUpdateOption>,
    pub registry_urls: Vec<String>,
    pub update_kind: UpdateKind,
    pub new_major_version: Option<u64>,
}

impl UpdateConfig {
    pub fn has_option(&self, option: PostUpdateOption) -> bool {
        self.post_update_options.contains(&option)
    }

    pub fn wants_tidy(&self) -> bool {
        self.has_option(PostUpdateOption::Tidy) || self.has_option(PostUpdateOption::TidyCompat117)
    }

    pub fn constraint(&self, tool: &str) -> Option<&str> {
        self.tool_constraints.get(tool).map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct ManifestUpdateRequest {
    /// Repository-relative path of the go.mod being updated.
    pub manifest_path: String,
    pub updated_dependencies: Vec<DependencyRef>,
    pub new_manifest_content: String,
    pub config: UpdateConfig,
}

/// Conventional file locations next to a manifest, repository-relative and
/// `/`-separated like the paths reported by the status reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestPaths {
    pub manifest: String,
    pub lock_file: String,
    pub directory: String,
    pub vendor_dir: String,
    pub vendor_marker: String,
}

impl ManifestPaths {
    pub fn for_manifest(manifest_path: &str) -> Self {
        let manifest = manifest_path.replace('\\', "/");
        let lock_file = match manifest.strip_suffix(".mod") {
            Some(stem) => format!("{stem}.sum"),
            None => format!("{manifest}.sum"),
        };
        let directory = match manifest.rfind('/') {
            Some(idx) => manifest[..idx].to_string(),
            None => String::new(),
        };
        let vendor_dir = if directory.is_empty() {
            "vendor/".to_string()
        } else {
            format!("{directory}/vendor/")
        };
        let vendor_marker = format!("{vendor_dir}modules.txt");

        Self {
            manifest,
            lock_file,
            directory,
            vendor_dir,
            vendor_marker,
        }
    }

    pub fn is_vendor_file(&self, path: &str) -> bool {
        path.starts_with(&self.vendor_dir)
    }

    /// Go sources outside the vendor tree, as touched by import-path rewrites.
    pub fn is_source_file(&self, path: &str) -> bool {
        path.ends_with(".go")
            && !self.is_vendor_file(path)
            && (self.directory.is_empty() || path.starts_with(&format!("{}/", self.directory)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_for_root_manifest() {
        let paths = ManifestPaths::for_manifest("go.mod");
        assert_eq!(paths.lock_file, "go.sum");
        assert_eq!(paths.directory, "");
        assert_eq!(paths.vendor_dir, "vendor/");
        assert_eq!(paths.vendor_marker, "vendor/modules.txt");
    }

    #[test]
    fn paths_for_nested_manifest() {
        let paths = ManifestPaths::for_manifest("services/api/go.mod");
        assert_eq!(paths.lock_file, "services/api/go.sum");
        assert_eq!(paths.vendor_dir, "services/api/vendor/");
        assert!(paths.is_vendor_file("services/api/vendor/github.com/x/y.go"));
        assert!(!paths.is_vendor_file("vendor/github.com/x/y.go"));
        assert!(paths.is_source_file("services/api/main.go"));
        assert!(!paths.is_source_file("services/other/main.go"));
    }

    #[test]
    fn parses_dependency_refs() {
        let dep: DependencyRef = "github.com/foo/bar@v2.0.0".parse().unwrap();
        assert_eq!(dep.module_path, "github.com/foo/bar");
        assert_eq!(dep.new_version.as_deref(), Some("v2.0.0"));

        let bare: DependencyRef = "github.com/foo/bar".parse().unwrap();
        assert!(bare.new_version.is_none());

        assert!("github.com/foo/bar@".parse::<DependencyRef>().is_err());
    }

    #[test]
    fn unknown_options_are_dropped() {
        let options = PostUpdateOption::parse_set(["gomodTidy", "bogus", "vendorSync"]);
        assert_eq!(options.len(), 2);
        assert!(options.contains(&PostUpdateOption::Tidy));
        assert!(options.contains(&PostUpdateOption::VendorSync));
    }

    #[test]
    fn tidy_compat_counts_as_tidy() {
        let config = UpdateConfig {
            post_update_options: PostUpdateOption::parse_set(["tidyCompat117"]),
            ..UpdateConfig::default()
        };
        assert!(config.wants_tidy());
    }
}
