//! platform::types
//!
//! Value objects shared by every platform driver.
//!
//! Requests are plain structs built by callers; drivers translate them into
//! service-specific wire bodies. Responses are normalized into the shapes
//! here so downstream code never sees service-specific field names.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::hostrules::HostRule;
use super::id::PlatformId;

/// Input to platform initialization.
///
/// Mirrors the wire form of an automation config: unknown platform names
/// arrive as free text in `platform` and are resolved against the registry,
/// not at deserialization time.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlatformConfig {
    /// Platform name to initialize, e.g. `"github"`.
    pub platform: Option<String>,
    /// API endpoint override. Drivers fall back to their public default.
    pub endpoint: Option<String>,
    /// Username, for drivers that authenticate with basic credentials.
    pub username: Option<String>,
    /// Password or app password, paired with `username`.
    pub password: Option<String>,
    /// Token, for drivers that authenticate with a bearer-style credential.
    pub token: Option<String>,
    /// Commit author override. Wins over anything the platform suggests.
    pub git_author: Option<String>,
    /// Host rules supplied by the config, kept ahead of the derived rule.
    pub host_rules: Vec<HostRule>,
}

// Credentials stay out of debug output.
impl fmt::Debug for PlatformConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformConfig")
            .field("platform", &self.platform)
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("git_author", &self.git_author)
            .field("host_rules", &self.host_rules)
            .finish()
    }
}

/// Raw result of a driver's authentication probe, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformSession {
    /// Absolute endpoint the driver authenticated against.
    pub endpoint: String,
    /// Login of the authenticated user, when the service reports one.
    pub user: Option<String>,
    /// Author identity suggested by the platform, e.g. a noreply address.
    pub git_author: Option<String>,
}

/// The normalized record produced by a successful initialization.
///
/// Serializes with the camelCase field names downstream tooling expects
/// (`gitAuthor`, `hostRules`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializedPlatform {
    /// Normalized endpoint, always with a trailing slash.
    pub endpoint: String,
    /// Effective commit author, if any source provided one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_author: Option<String>,
    /// Config-supplied rules followed by the derived platform rule,
    /// deduplicated by `(hostType, matchHost)`.
    pub host_rules: Vec<HostRule>,
    /// The platform that was initialized.
    pub platform: PlatformId,
}

/// Repository metadata returned by [`repo_info`](super::Platform::repo_info).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoInfo {
    /// Full repository path, e.g. `owner/name`.
    pub full_name: String,
    /// Name of the default branch.
    pub default_branch: String,
    /// Whether the repository is archived (or disabled, where the service
    /// has no archive concept).
    pub archived: bool,
    /// Whether the repository is a fork.
    pub fork: bool,
}

/// Lifecycle state of a change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrState {
    Open,
    Closed,
    Merged,
}

impl fmt::Display for PrState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PrState::Open => "open",
            PrState::Closed => "closed",
            PrState::Merged => "merged",
        };
        write!(f, "{label}")
    }
}

/// A change request (pull request / merge request) in normalized form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pr {
    /// Service-assigned number (GitLab's `iid`, Azure's `pullRequestId`).
    pub number: u64,
    pub title: String,
    pub state: PrState,
    pub is_draft: bool,
    /// Source branch name.
    pub head: String,
    /// Target branch name.
    pub base: String,
    /// Browser URL of the change request.
    pub url: String,
    /// Creation time, when the service reports one.
    pub created_at: Option<DateTime<Utc>>,
}

/// Request to open a change request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreatePrRequest {
    /// Repository path in the driver's addressing scheme.
    pub repo: String,
    /// Source branch.
    pub head: String,
    /// Target branch.
    pub base: String,
    pub title: String,
    pub body: Option<String>,
    /// Open as draft, where the service supports drafts.
    pub draft: bool,
}

/// Target lifecycle state for an update.
///
/// Merging is not a state transition an update can request; it goes through
/// [`merge_pr`](super::Platform::merge_pr).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrTargetState {
    Open,
    Closed,
}

/// Request to update an existing change request.
///
/// `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdatePrRequest {
    pub repo: String,
    pub number: u64,
    pub title: Option<String>,
    pub body: Option<String>,
    /// Retarget onto a different base branch.
    pub base: Option<String>,
    pub state: Option<PrTargetState>,
}

/// Merge strategy for [`merge_pr`](super::Platform::merge_pr).
///
/// Drivers map this onto the nearest native strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeMethod {
    /// A merge commit.
    Merge,
    /// Squash into a single commit.
    #[default]
    Squash,
    /// Rebase or fast-forward, per the service's vocabulary.
    Rebase,
}

impl fmt::Display for MergeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MergeMethod::Merge => "merge",
            MergeMethod::Squash => "squash",
            MergeMethod::Rebase => "rebase",
        };
        write!(f, "{label}")
    }
}

/// Request to merge a change request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergePrRequest {
    pub repo: String,
    pub number: u64,
    pub method: MergeMethod,
}

/// Add-or-update request for a change-request comment.
///
/// Comments are keyed by `topic`: at most one comment per topic exists after
/// the call, and an unchanged body is left alone. With no topic the content
/// itself is the key, which gives add-only semantics for one-off remarks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnsureCommentRequest {
    pub repo: String,
    pub number: u64,
    pub topic: Option<String>,
    pub content: String,
}

impl EnsureCommentRequest {
    /// Full comment body, with the topic marker line when a topic is set.
    pub fn render(&self) -> String {
        match &self.topic {
            Some(topic) => format!("### {topic}\n\n{}", self.content),
            None => self.content.clone(),
        }
    }

    /// Whether an existing comment body occupies this request's slot.
    pub fn matches(&self, existing: &str) -> bool {
        match &self.topic {
            Some(topic) => existing.starts_with(&format!("### {topic}\n")),
            None => existing == self.content,
        }
    }
}

/// Outcome to publish for a head SHA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BranchStatusState {
    #[default]
    Pending,
    Success,
    Failed,
}

impl fmt::Display for BranchStatusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BranchStatusState::Pending => "pending",
            BranchStatusState::Success => "success",
            BranchStatusState::Failed => "failed",
        };
        write!(f, "{label}")
    }
}

/// Commit status to publish via
/// [`set_branch_status`](super::Platform::set_branch_status).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchStatusRequest {
    pub repo: String,
    /// Head SHA the status attaches to.
    pub sha: String,
    /// Status context (check name).
    pub context: String,
    pub description: Option<String>,
    pub state: BranchStatusState,
    pub target_url: Option<String>,
}

/// Branch protection summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchProtection {
    pub protected: bool,
    /// Status contexts required to pass before merging, where the service
    /// exposes them.
    pub required_checks: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    mod config {
        use super::*;

        #[test]
        fn debug_redacts_credentials() {
            let config = PlatformConfig {
                platform: Some("github".to_string()),
                token: Some("ghp_secret".to_string()),
                password: Some("hunter2".to_string()),
                ..Default::default()
            };
            let rendered = format!("{config:?}");
            assert!(!rendered.contains("ghp_secret"));
            assert!(!rendered.contains("hunter2"));
            assert!(rendered.contains("***"));
        }

        #[test]
        fn deserializes_camel_case_fields() {
            let config: PlatformConfig = serde_json::from_str(
                r#"{
                    "platform": "bitbucket",
                    "gitAuthor": "user@domain.com",
                    "hostRules": [{"hostType": "docker", "matchHost": "registry.example.com"}]
                }"#,
            )
            .unwrap();
            assert_eq!(config.platform.as_deref(), Some("bitbucket"));
            assert_eq!(config.git_author.as_deref(), Some("user@domain.com"));
            assert_eq!(config.host_rules.len(), 1);
            assert_eq!(config.host_rules[0].host_type, "docker");
        }
    }

    mod record {
        use super::*;

        #[test]
        fn serializes_camel_case_and_omits_absent_author() {
            let record = InitializedPlatform {
                endpoint: "https://api.github.com/".to_string(),
                git_author: None,
                host_rules: vec![],
                platform: PlatformId::Github,
            };
            let json = serde_json::to_value(&record).unwrap();
            assert_eq!(json["endpoint"], "https://api.github.com/");
            assert_eq!(json["platform"], "github");
            assert!(json.get("gitAuthor").is_none());
            assert!(json["hostRules"].as_array().unwrap().is_empty());
        }
    }

    mod comments {
        use super::*;

        #[test]
        fn render_prefixes_topic_marker() {
            let request = EnsureCommentRequest {
                topic: Some("Upgrade notes".to_string()),
                content: "All checks green.".to_string(),
                ..Default::default()
            };
            assert_eq!(request.render(), "### Upgrade notes\n\nAll checks green.");
        }

        #[test]
        fn topic_matches_any_body_under_the_marker() {
            let request = EnsureCommentRequest {
                topic: Some("Upgrade notes".to_string()),
                content: "new".to_string(),
                ..Default::default()
            };
            assert!(request.matches("### Upgrade notes\n\nold"));
            assert!(!request.matches("### Other topic\n\nold"));
        }

        #[test]
        fn without_topic_only_exact_content_matches() {
            let request = EnsureCommentRequest {
                content: "ping".to_string(),
                ..Default::default()
            };
            assert!(request.matches("ping"));
            assert!(!request.matches("pong"));
        }
    }

    mod merging {
        use super::*;

        #[test]
        fn squash_is_the_default_strategy() {
            assert_eq!(MergeMethod::default(), MergeMethod::Squash);
            let request = MergePrRequest {
                repo: "owner/repo".to_string(),
                number: 7,
                ..Default::default()
            };
            assert_eq!(request.method, MergeMethod::Squash);
        }
    }

    mod display {
        use super::*;

        #[test]
        fn states_render_lowercase() {
            assert_eq!(PrState::Merged.to_string(), "merged");
            assert_eq!(BranchStatusState::Failed.to_string(), "failed");
            assert_eq!(MergeMethod::Squash.to_string(), "squash");
        }
    }
}
