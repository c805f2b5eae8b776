use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use tracing::debug;

pub const LATEST: &str = "latest";

static GO_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\.(\d+)(?:\.(\d+))?").expect("valid go version regex"));

/// Version a helper tool is installed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolVersion {
    Pinned(semver::Version),
    Latest,
}

impl ToolVersion {
    /// Resolve a configured constraint. Missing or malformed constraints
    /// degrade to `latest`.
    pub fn from_constraint(constraint: Option<&str>) -> Self {
        let Some(raw) = constraint.map(str::trim).filter(|c| !c.is_empty()) else {
            return Self::Latest;
        };

        let candidate = raw.strip_prefix('v').unwrap_or(raw);
        match semver::Version::parse(candidate) {
            Ok(version) => Self::Pinned(version),
            Err(err) => {
                debug!(constraint = raw, error = %err, "skipping invalid tool constraint");
                Self::Latest
            }
        }
    }

    pub fn is_latest(&self) -> bool {
        matches!(self, Self::Latest)
    }
}

impl fmt::Display for ToolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pinned(version) => write!(f, "v{version}"),
            Self::Latest => f.write_str(LATEST),
        }
    }
}

/// Go release version (`major.minor[.patch]`) extracted from a constraint
/// such as `1.21`, `>=1.14` or `go1.20.3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct GoRelease {
    pub major: u64,
    pub minor: u64,
    pub patch: Option<u64>,
}

impl GoRelease {
    pub fn from_constraint(constraint: &str) -> Option<Self> {
        let caps = GO_VERSION.captures(constraint)?;
        let major = caps.get(1)?.as_str().parse().ok()?;
        let minor = caps.get(2)?.as_str().parse().ok()?;
        let patch = caps.get(3).and_then(|m| m.as_str().parse().ok());
        Some(Self {
            major,
            minor,
            patch,
        })
    }

    pub fn at_least(&self, major: u64, minor: u64) -> bool {
        (self.major, self.minor) >= (major, minor)
    }

    /// Tag of the official toolchain image for this release.
    pub fn image_tag(&self) -> String {
        match self.patch {
            Some(patch) => format!("{}.{}.{}", self.major, self.minor, patch),
            None => format!("{}.{}", self.major, self.minor),
        }
    }
}

/// `-modcacherw` is understood from go 1.14 on; an unknown toolchain is
/// assumed to be recent.
pub fn supports_modcacherw(go_constraint: Option<&str>) -> bool {
    match go_constraint.and_then(GoRelease::from_constraint) {
        Some(release) => release.at_least(1, 14),
        None => true,
    }
}

pub fn image_tag(go_constraint: Option<&str>) -> String {
    go_constraint
        .and_then(GoRelease::from_constraint)
        .map(|release| release.image_tag())
        .unwrap_or_else(|| LATEST.to_string())
}
