use crate::agents::environment::{Credential, CredentialInsertion};
use crate::artifacts::UpdateConfig;
use crate::ports::{HostRule, HostRuleQuery, HostRules};
use std::collections::BTreeMap;
use tracing::debug;
use url::Url;

pub const GO_HOST_TYPE: &str = "go";

/// GOPROXY keywords that are not hosts.
const PROXY_KEYWORDS: &[&str] = &["direct", "off"];

/// Private host patterns from `GOPRIVATE` followed by the configured
/// registry URLs, normalized to `host` or `host/prefix`.
pub fn private_patterns(base_env: &BTreeMap<String, String>, config: &UpdateConfig) -> Vec<String> {
    let from_env = base_env
        .get("GOPRIVATE")
        .map(|value| value.split(',').map(str::to_string).collect::<Vec<_>>())
        .unwrap_or_default();

    from_env
        .iter()
        .chain(config.registry_urls.iter())
        .filter(|raw| !PROXY_KEYWORDS.contains(&raw.trim()))
        .filter_map(|raw| normalize_pattern(raw))
        .collect()
}

/// Strip scheme, credentials, query and trailing path wildcards/slashes.
pub fn normalize_pattern(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let stripped = if raw.contains("://") {
        let url = Url::parse(raw).ok()?;
        let host = url.host_str()?;
        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        format!("{host}{}", url.path())
    } else {
        raw.split(['?', '#']).next().unwrap_or(raw).to_string()
    };

    let mut pattern = stripped.as_str();
    loop {
        let trimmed = pattern.trim_end_matches('/');
        let trimmed = trimmed.strip_suffix("/...").unwrap_or(trimmed);
        if trimmed == pattern {
            break;
        }
        pattern = trimmed;
    }

    (!pattern.is_empty()).then(|| pattern.to_string())
}

/// Looks up registered credentials for private host patterns.
pub struct CredentialResolver<'a> {
    host_rules: &'a dyn HostRules,
}

impl<'a> CredentialResolver<'a> {
    pub fn new(host_rules: &'a dyn HostRules) -> Self {
        Self { host_rules }
    }

    /// One insertion per pattern with usable credentials, in input order.
    /// Patterns without a match or with incomplete credentials are skipped.
    pub fn resolve(&self, patterns: &[String]) -> Vec<CredentialInsertion> {
        let mut insertions = Vec::new();

        for pattern in patterns {
            // git url rewriting is a literal prefix match
            if pattern.contains(['*', '?', '[']) {
                debug!(host = pattern.as_str(), "skipping glob pattern for credentials");
                continue;
            }

            let query = HostRuleQuery {
                host_type: GO_HOST_TYPE.to_string(),
                url: format!("https://{pattern}"),
            };
            let Some(rule) = self.host_rules.find(&query) else {
                debug!(host = pattern.as_str(), "no host rule found");
                continue;
            };

            match credential_from_rule(&rule) {
                Some(credential) => {
                    debug!(host = pattern.as_str(), "adding credentials for private host");
                    insertions.push(CredentialInsertion {
                        host_pattern: pattern.clone(),
                        credential,
                    });
                }
                None => debug!(host = pattern.as_str(), "host rule has incomplete credentials"),
            }
        }

        insertions
    }
}

fn credential_from_rule(rule: &HostRule) -> Option<Credential> {
    let present = |value: &Option<String>| value.as_ref().filter(|v| !v.is_empty()).cloned();

    if let Some(token) = present(&rule.token) {
        return Some(Credential::Token(token));
    }
    match (present(&rule.username), present(&rule.password)) {
        (Some(username), Some(password)) => Some(Credential::UserPass { username, password }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapRules(HashMap<String, HostRule>);

    impl HostRules for MapRules {
        fn find(&self, query: &HostRuleQuery) -> Option<HostRule> {
            assert_eq!(query.host_type, GO_HOST_TYPE);
            self.0.get(&query.url).cloned()
        }
    }

    fn rule(token: Option<&str>, username: Option<&str>, password: Option<&str>) -> HostRule {
        HostRule {
            token: token.map(str::to_string),
            username: username.map(str::to_string),
            password: password.map(str::to_string),
        }
    }

    #[test]
    fn normalizes_patterns() {
        assert_eq!(normalize_pattern("https://gitlab.example.com/"), Some("gitlab.example.com".into()));
        assert_eq!(
            normalize_pattern("https://gitlab.example.com/group/..."),
            Some("gitlab.example.com/group".into())
        );
        assert_eq!(normalize_pattern("corp.example.com/team/"), Some("corp.example.com/team".into()));
        assert_eq!(
            normalize_pattern("https://proxy.example.com:8443/go?x=1"),
            Some("proxy.example.com:8443/go".into())
        );
        assert_eq!(normalize_pattern("  "), None);
    }

    #[test]
    fn collects_patterns_from_env_and_registries() {
        let mut env = BTreeMap::new();
        env.insert("GOPRIVATE".to_string(), "github.com/corp, gitlab.example.com".to_string());
        let config = UpdateConfig {
            registry_urls: vec!["https://goproxy.example.com/".into(), "direct".into()],
            ..UpdateConfig::default()
        };
        assert_eq!(
            private_patterns(&env, &config),
            vec!["github.com/corp", "gitlab.example.com", "goproxy.example.com"]
        );
    }

    #[test]
    fn renders_token_and_userpass_credentials() {
        let mut rules = HashMap::new();
        rules.insert("https://github.com/corp".into(), rule(Some("tok"), None, None));
        rules.insert("https://gitlab.example.com".into(), rule(None, Some("bot"), Some("pw")));
        let rules = MapRules(rules);

        let insertions = CredentialResolver::new(&rules)
            .resolve(&["github.com/corp".into(), "gitlab.example.com".into()]);

        assert_eq!(insertions.len(), 2);
        assert_eq!(insertions[0].authenticated_url(), "https://tok@github.com/corp/");
        assert_eq!(insertions[1].authenticated_url(), "https://bot:pw@gitlab.example.com/");
    }

    #[test]
    fn skips_incomplete_or_missing_rules() {
        let mut rules = HashMap::new();
        rules.insert("https://a.example.com".into(), rule(None, Some("bot"), None));
        rules.insert("https://b.example.com".into(), rule(Some(""), None, Some("pw")));
        let rules = MapRules(rules);

        let insertions = CredentialResolver::new(&rules).resolve(&[
            "a.example.com".into(),
            "b.example.com".into(),
            "c.example.com".into(),
            "*.example.com".into(),
        ]);
        assert!(insertions.is_empty());
    }

    #[test]
    fn keeps_duplicates_for_the_environment_builder() {
        let mut rules = HashMap::new();
        rules.insert("https://github.com".into(), rule(Some("tok"), None, None));
        let rules = MapRules(rules);

        let insertions =
            CredentialResolver::new(&rules).resolve(&["github.com".into(), "github.com".into()]);
        assert_eq!(insertions.len(), 2);
    }
}
