use crate::ports::{HostRule, HostRuleQuery, HostRules};
use serde::Deserialize;
use std::fmt;
use url::Url;

/// A `[[host_rules]]` entry.
#[derive(Clone, Deserialize)]
pub struct HostRuleEntry {
    /// Host (`gitlab.example.com`), host with path prefix, or full URL prefix.
    pub match_host: String,
    #[serde(default)]
    pub host_type: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl fmt::Debug for HostRuleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostRuleEntry")
            .field("match_host", &self.match_host)
            .field("host_type", &self.host_type)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl HostRuleEntry {
    fn matches(&self, query: &HostRuleQuery) -> bool {
        if let Some(host_type) = &self.host_type {
            if host_type != &query.host_type {
                return false;
            }
        }

        let pattern = self.match_host.trim().trim_end_matches('/');
        if pattern.is_empty() {
            return false;
        }

        if pattern.contains("://") {
            return query.url.starts_with(pattern)
                && matches!(query.url[pattern.len()..].chars().next(), None | Some('/'));
        }

        let Ok(url) = Url::parse(&query.url) else {
            return false;
        };
        let Some(host) = url.host_str() else {
            return false;
        };

        if pattern.contains('/') {
            let bare = format!("{host}{}", url.path());
            let bare = bare.trim_end_matches('/');
            return bare == pattern || bare.starts_with(&format!("{pattern}/"));
        }

        host == pattern || host.ends_with(&format!(".{pattern}"))
    }
}

/// Host rules declared in `gomodup.toml`. The most specific match wins.
#[derive(Debug, Clone, Default)]
pub struct ConfigHostRules {
    entries: Vec<HostRuleEntry>,
}

impl ConfigHostRules {
    pub fn new(entries: Vec<HostRuleEntry>) -> Self {
        Self { entries }
    }
}

impl HostRules for ConfigHostRules {
    fn find(&self, query: &HostRuleQuery) -> Option<HostRule> {
        self.entries
            .iter()
            .filter(|entry| entry.matches(query))
            .max_by_key(|entry| entry.match_host.len())
            .map(|entry| HostRule {
                token: entry.token.clone(),
                username: entry.username.clone(),
                password: entry.password.clone(),
            })
    }
}
