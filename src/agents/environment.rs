use crate::artifacts::UpdateConfig;
use crate::golang::version::supports_modcacherw;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, warn};
use url::Url;

const GIT_CONFIG_COUNT: &str = "GIT_CONFIG_COUNT";
/// Upper bound for inherited `GIT_CONFIG_COUNT` values.
const MAX_GIT_CONFIG_ENTRIES: usize = 1024;

/// Variables copied from the caller's environment when present.
const PASSTHROUGH_VARS: &[&str] = &["GOPRIVATE", "GOSUMDB", "GOINSECURE"];

/// How toolchain commands are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SandboxMode {
    /// `go` from the host `PATH`.
    #[default]
    Host,
    /// A pre-installed toolchain at a configured location.
    Installed,
    /// An ephemeral container per command.
    Container,
}

impl SandboxMode {
    /// Map the `binary_source` setting; unknown values run on the host.
    pub fn from_binary_source(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()) {
            None => Self::Host,
            Some(v) => match v.as_str() {
                "" | "host" => Self::Host,
                "global" | "install" => Self::Installed,
                "docker" => Self::Container,
                other => {
                    warn!(binary_source = other, "unknown binary source, running on host");
                    Self::Host
                }
            },
        }
    }
}

impl fmt::Display for SandboxMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Host => "host",
            Self::Installed => "global",
            Self::Container => "docker",
        };
        f.write_str(label)
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Token(String),
    UserPass { username: String, password: String },
}

// Never print secrets.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token(_) => f.write_str("Token(***)"),
            Self::UserPass { username, .. } => write!(f, "UserPass({username}:***)"),
        }
    }
}

/// Authentication for one private host, applied through git url rewriting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialInsertion {
    pub host_pattern: String,
    pub credential: Credential,
}

impl CredentialInsertion {
    /// `https://<token>@<host>/` or `https://<user>:<password>@<host>/`,
    /// with the userinfo percent-encoded.
    pub fn authenticated_url(&self) -> String {
        match self.credential_url() {
            Some(url) => url.to_string(),
            None => match &self.credential {
                Credential::Token(token) => format!("https://{token}@{}/", self.host_pattern),
                Credential::UserPass { username, password } => {
                    format!("https://{username}:{password}@{}/", self.host_pattern)
                }
            },
        }
    }

    pub fn original_url(&self) -> String {
        format!("https://{}/", self.host_pattern)
    }

    fn credential_url(&self) -> Option<Url> {
        let mut url = Url::parse(&self.original_url()).ok()?;
        match &self.credential {
            Credential::Token(token) => url.set_username(token).ok()?,
            Credential::UserPass { username, password } => {
                url.set_username(username).ok()?;
                url.set_password(Some(password)).ok()?;
            }
        }
        Some(url)
    }

    /// Raw secrets plus their encoded form as it appears in URLs.
    fn secrets(&self) -> Vec<String> {
        let raw = match &self.credential {
            Credential::Token(token) => token.clone(),
            Credential::UserPass { password, .. } => password.clone(),
        };
        let encoded = self.credential_url().and_then(|url| match &self.credential {
            Credential::Token(_) => Some(url.username().to_string()),
            Credential::UserPass { .. } => url.password().map(str::to_string),
        });

        let mut secrets = vec![raw];
        if let Some(encoded) = encoded.filter(|e| e != &secrets[0]) {
            secrets.push(encoded);
        }
        secrets
    }
}

/// Everything a command of one update call runs with.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    pub sandbox_mode: SandboxMode,
    pub environment: BTreeMap<String, String>,
    pub credential_insertions: Vec<CredentialInsertion>,
    /// The `go` tool constraint, used to pick a container image.
    pub toolchain_constraint: Option<String>,
}

impl ExecutionContext {
    /// Replace every credential secret in `message` with `***`.
    pub fn redact(&self, message: &str) -> String {
        let mut redacted = message.to_string();
        for insertion in &self.credential_insertions {
            for secret in insertion.secrets() {
                if !secret.is_empty() {
                    redacted = redacted.replace(&secret, "***");
                }
            }
        }
        redacted
    }
}

/// Caller-provided inputs of the environment builder.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentSettings {
    pub sandbox_mode: SandboxMode,
    pub base_env: BTreeMap<String, String>,
    pub cache_dir: PathBuf,
    pub cgo_enabled: bool,
}

pub struct EnvironmentBuilder<'a> {
    settings: &'a EnvironmentSettings,
}

impl<'a> EnvironmentBuilder<'a> {
    pub fn new(settings: &'a EnvironmentSettings) -> Self {
        Self { settings }
    }

    pub fn build(
        &self,
        config: &UpdateConfig,
        insertions: Vec<CredentialInsertion>,
    ) -> ExecutionContext {
        let base = &self.settings.base_env;
        let mode = self.settings.sandbox_mode;

        // Containers start from a clean shell; only what we set is forwarded.
        let mut environment = match mode {
            SandboxMode::Container => BTreeMap::new(),
            SandboxMode::Host | SandboxMode::Installed => base.clone(),
        };

        for key in PASSTHROUGH_VARS {
            if let Some(value) = non_empty(base, key) {
                environment.insert((*key).to_string(), value.to_string());
            }
        }

        let go_private = non_empty(base, "GOPRIVATE");
        if let Some(value) = non_empty(base, "GONOSUMDB").or(go_private) {
            environment.insert("GONOSUMDB".to_string(), value.to_string());
        }
        if let Some(value) = non_empty(base, "GONOPROXY").or(go_private) {
            environment.insert("GONOPROXY".to_string(), value.to_string());
        }

        let registries: Vec<&str> = config
            .registry_urls
            .iter()
            .map(|url| url.trim())
            .filter(|url| !url.is_empty())
            .collect();
        if !registries.is_empty() {
            environment.insert("GOPROXY".to_string(), registries.join(","));
        } else if let Some(value) = non_empty(base, "GOPROXY") {
            environment.insert("GOPROXY".to_string(), value.to_string());
        }

        environment.insert(
            "GOPATH".to_string(),
            self.settings.cache_dir.join("go").to_string_lossy().into_owned(),
        );
        if supports_modcacherw(config.constraint("go")) {
            environment.insert("GOFLAGS".to_string(), "-modcacherw".to_string());
        } else {
            environment.remove("GOFLAGS");
        }
        environment.insert("GIT_TERMINAL_PROMPT".to_string(), "0".to_string());
        environment.insert(
            "CGO_ENABLED".to_string(),
            if self.settings.cgo_enabled { "1" } else { "0" }.to_string(),
        );

        let existing = git_config_count(base);
        if existing.is_none() {
            environment.remove(GIT_CONFIG_COUNT);
        }
        if mode == SandboxMode::Container {
            forward_git_config_entries(base, existing.unwrap_or(0), &mut environment);
        }

        let insertions = last_wins_by_host(insertions);
        let mut count = existing.unwrap_or(0);
        for insertion in &insertions {
            let Some(next) = count.checked_add(1) else {
                warn!(host = insertion.host_pattern.as_str(), "git config entries exhausted");
                break;
            };
            environment.insert(
                format!("GIT_CONFIG_KEY_{count}"),
                format!("url.{}.insteadOf", insertion.authenticated_url()),
            );
            environment.insert(format!("GIT_CONFIG_VALUE_{count}"), insertion.original_url());
            count = next;
        }
        if count > 0 {
            environment.insert(GIT_CONFIG_COUNT.to_string(), count.to_string());
        }

        debug!(
            sandbox = %mode,
            hosts = ?insertions.iter().map(|i| i.host_pattern.as_str()).collect::<Vec<_>>(),
            "built execution environment"
        );

        ExecutionContext {
            sandbox_mode: mode,
            environment,
            credential_insertions: insertions,
            toolchain_constraint: config.constraint("go").map(str::to_string),
        }
    }
}

fn non_empty<'m>(env: &'m BTreeMap<String, String>, key: &str) -> Option<&'m str> {
    env.get(key).map(String::as_str).filter(|v| !v.trim().is_empty())
}

/// Number of numbered git config entries already present. Unparsable,
/// negative or oversized values count as absent, and so does a count whose
/// `GIT_CONFIG_KEY_<n>` entries are not all set.
pub fn git_config_count(env: &BTreeMap<String, String>) -> Option<usize> {
    let raw = env.get(GIT_CONFIG_COUNT)?;
    let Ok(count) = raw.trim().parse::<usize>() else {
        warn!(value = raw.as_str(), "ignoring invalid GIT_CONFIG_COUNT");
        return None;
    };
    if count > MAX_GIT_CONFIG_ENTRIES {
        warn!(count, max = MAX_GIT_CONFIG_ENTRIES, "ignoring oversized GIT_CONFIG_COUNT");
        return None;
    }
    if let Some(missing) = (0..count).find(|i| !env.contains_key(&format!("GIT_CONFIG_KEY_{i}"))) {
        warn!(count, missing, "ignoring GIT_CONFIG_COUNT without matching entries");
        return None;
    }
    Some(count)
}

fn forward_git_config_entries(
    base: &BTreeMap<String, String>,
    count: usize,
    environment: &mut BTreeMap<String, String>,
) {
    for index in 0..count {
        for prefix in ["GIT_CONFIG_KEY_", "GIT_CONFIG_VALUE_"] {
            let key = format!("{prefix}{index}");
            if let Some(value) = base.get(&key) {
                environment.insert(key, value.clone());
            }
        }
    }
    if count > 0 {
        environment.insert(GIT_CONFIG_COUNT.to_string(), count.to_string());
    }
}

/// Keep one insertion per exact host; a later insertion replaces an earlier one.
fn last_wins_by_host(insertions: Vec<CredentialInsertion>) -> Vec<CredentialInsertion> {
    let mut unique: Vec<CredentialInsertion> = Vec::with_capacity(insertions.len());
    for insertion in insertions {
        unique.retain(|existing| existing.host_pattern != insertion.host_pattern);
        unique.push(insertion);
    }
    unique
}
