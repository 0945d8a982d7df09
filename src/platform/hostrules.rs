//! platform::hostrules
//!
//! Declarative credential-to-host bindings.
//!
//! A host rule tells downstream HTTP layers which credentials apply to which
//! host. Initialization appends one derived rule for the platform itself to
//! whatever rules the config already carried, then deduplicates the combined
//! list so each `(hostType, matchHost)` pair resolves to exactly one rule.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::id::PlatformId;
use super::registry::CredentialShape;
use super::types::PlatformConfig;

/// One credential-to-host binding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HostRule {
    /// Kind of host the rule applies to, e.g. a platform name or `"docker"`.
    pub host_type: String,
    /// Hostname the rule matches.
    pub match_host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl HostRule {
    /// The rule derived for an initialized platform.
    ///
    /// Carries only the credential fields the driver's declared shape
    /// consumes, so an unused field in the config never leaks into the
    /// normalized record.
    pub fn for_platform(
        id: PlatformId,
        shape: CredentialShape,
        config: &PlatformConfig,
        match_host: impl Into<String>,
    ) -> HostRule {
        let mut rule = HostRule {
            host_type: id.name().to_string(),
            match_host: match_host.into(),
            ..Default::default()
        };
        match shape {
            CredentialShape::Token => {
                rule.token = config.token.clone();
            }
            CredentialShape::Basic => {
                rule.username = config.username.clone();
                rule.password = config.password.clone();
            }
        }
        rule
    }

    /// Whether the rule carries any credential at all.
    pub fn has_credentials(&self) -> bool {
        self.username.is_some() || self.password.is_some() || self.token.is_some()
    }

    fn key(&self) -> (String, String) {
        (self.host_type.clone(), self.match_host.clone())
    }
}

/// Collapse rules sharing a `(hostType, matchHost)` key.
///
/// The later rule wins the slot but keeps the earlier rule's position, so
/// the derived platform rule can override a config rule without reordering
/// the caller's list.
pub(crate) fn dedupe(rules: Vec<HostRule>) -> Vec<HostRule> {
    let mut merged: IndexMap<(String, String), HostRule> = IndexMap::with_capacity(rules.len());
    for rule in rules {
        merged.insert(rule.key(), rule);
    }
    merged.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(host_type: &str, match_host: &str, token: Option<&str>) -> HostRule {
        HostRule {
            host_type: host_type.to_string(),
            match_host: match_host.to_string(),
            token: token.map(str::to_string),
            ..Default::default()
        }
    }

    mod derivation {
        use super::*;

        #[test]
        fn token_shape_ignores_basic_fields() {
            let config = PlatformConfig {
                username: Some("ignored".to_string()),
                password: Some("ignored".to_string()),
                token: Some("abc".to_string()),
                ..Default::default()
            };
            let derived = HostRule::for_platform(
                PlatformId::Github,
                CredentialShape::Token,
                &config,
                "api.github.com",
            );
            assert_eq!(derived.host_type, "github");
            assert_eq!(derived.match_host, "api.github.com");
            assert_eq!(derived.token.as_deref(), Some("abc"));
            assert_eq!(derived.username, None);
            assert_eq!(derived.password, None);
        }

        #[test]
        fn basic_shape_ignores_token() {
            let config = PlatformConfig {
                username: Some("abc".to_string()),
                password: Some("123".to_string()),
                token: Some("ignored".to_string()),
                ..Default::default()
            };
            let derived = HostRule::for_platform(
                PlatformId::Bitbucket,
                CredentialShape::Basic,
                &config,
                "api.bitbucket.org",
            );
            assert_eq!(derived.username.as_deref(), Some("abc"));
            assert_eq!(derived.password.as_deref(), Some("123"));
            assert_eq!(derived.token, None);
        }

        #[test]
        fn missing_credentials_derive_an_empty_rule() {
            let derived = HostRule::for_platform(
                PlatformId::Gitea,
                CredentialShape::Token,
                &PlatformConfig::default(),
                "gitea.example.com",
            );
            assert!(!derived.has_credentials());
        }
    }

    mod deduplication {
        use super::*;

        #[test]
        fn later_rule_wins_earlier_position() {
            let deduped = dedupe(vec![
                rule("github", "api.github.com", Some("old")),
                rule("docker", "registry.example.com", None),
                rule("github", "api.github.com", Some("new")),
            ]);
            assert_eq!(deduped.len(), 2);
            assert_eq!(deduped[0].host_type, "github");
            assert_eq!(deduped[0].token.as_deref(), Some("new"));
            assert_eq!(deduped[1].host_type, "docker");
        }

        #[test]
        fn same_host_different_type_both_survive() {
            let deduped = dedupe(vec![
                rule("github", "example.com", Some("a")),
                rule("docker", "example.com", Some("b")),
            ]);
            assert_eq!(deduped.len(), 2);
        }

        #[test]
        fn distinct_rules_keep_their_order() {
            let deduped = dedupe(vec![
                rule("a", "one.example.com", None),
                rule("b", "two.example.com", None),
                rule("c", "three.example.com", None),
            ]);
            let order: Vec<&str> = deduped.iter().map(|r| r.host_type.as_str()).collect();
            assert_eq!(order, vec!["a", "b", "c"]);
        }
    }

    mod serde_shape {
        use super::*;

        #[test]
        fn serializes_camel_case_and_omits_empty_credentials() {
            let json = serde_json::to_value(rule("bitbucket", "api.bitbucket.org", None)).unwrap();
            assert_eq!(json["hostType"], "bitbucket");
            assert_eq!(json["matchHost"], "api.bitbucket.org");
            assert!(json.get("username").is_none());
            assert!(json.get("token").is_none());
        }
    }
}
