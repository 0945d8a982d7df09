//! platform::bitbucket
//!
//! Bitbucket Cloud driver speaking the 2.0 REST API.
//!
//! # Design
//!
//! Bitbucket differs from the token-based platforms in a few ways this
//! driver papers over: authentication is basic (username plus app
//! password), list endpoints wrap their results in a `values` envelope,
//! commit statuses use upper-case states keyed by `key`, and a declined
//! pull request can never be reopened. There is no draft flag and no
//! archive concept; both normalize to `false`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::client::{Api, AuthScheme};
use super::error::PlatformError;
use super::id::PlatformId;
use super::traits::Platform;
use super::types::{
    BranchProtection, BranchStatusRequest, BranchStatusState, CreatePrRequest,
    EnsureCommentRequest, MergeMethod, MergePrRequest, PlatformConfig, PlatformSession, Pr,
    PrState, PrTargetState, RepoInfo, UpdatePrRequest,
};

/// Default Bitbucket Cloud API base URL.
const DEFAULT_ENDPOINT: &str = "https://api.bitbucket.org";

/// Bitbucket Cloud platform driver.
#[derive(Debug)]
pub struct BitbucketPlatform {
    api: Api,
}

impl BitbucketPlatform {
    /// Build a driver from an initialization config. No network traffic.
    ///
    /// # Errors
    ///
    /// [`PlatformError::AuthRequired`] unless both `username` and
    /// `password` are present.
    pub fn from_config(config: &PlatformConfig) -> Result<BitbucketPlatform, PlatformError> {
        let username = config.username.clone().ok_or_else(|| {
            PlatformError::AuthRequired("a Bitbucket username (username)".to_string())
        })?;
        let password = config.password.clone().ok_or_else(|| {
            PlatformError::AuthRequired("a Bitbucket app password (password)".to_string())
        })?;
        let endpoint = config.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT);
        let api = Api::new(endpoint, AuthScheme::Basic { username, password })?;
        Ok(BitbucketPlatform { api })
    }
}

#[async_trait]
impl Platform for BitbucketPlatform {
    fn id(&self) -> PlatformId {
        PlatformId::Bitbucket
    }

    async fn authenticate(&self) -> Result<PlatformSession, PlatformError> {
        let user: BitbucketUser = self.api.get_json("2.0/user").await?;
        let login = user.username.or(user.display_name);
        if let Some(login) = &login {
            debug!(login = %login, "authenticated against Bitbucket");
        }
        Ok(PlatformSession {
            endpoint: self.api.endpoint(),
            user: login,
            git_author: None,
        })
    }

    async fn repo_info(&self, repo: &str) -> Result<RepoInfo, PlatformError> {
        let raw: BitbucketRepo = self
            .api
            .get_json(&format!("2.0/repositories/{repo}"))
            .await?;
        Ok(RepoInfo {
            full_name: raw.full_name,
            // Bare repositories report no main branch.
            default_branch: raw
                .mainbranch
                .map(|branch| branch.name)
                .unwrap_or_else(|| "master".to_string()),
            archived: false,
            fork: raw.parent.is_some(),
        })
    }

    async fn create_pr(&self, request: CreatePrRequest) -> Result<Pr, PlatformError> {
        let body = CreatePrBody {
            title: &request.title,
            description: request.body.as_deref(),
            source: BranchRefBody::new(&request.head),
            destination: BranchRefBody::new(&request.base),
        };
        let raw: BitbucketPr = self
            .api
            .post_json(&format!("2.0/repositories/{}/pullrequests", request.repo), &body)
            .await?;
        Ok(raw.into())
    }

    async fn update_pr(&self, request: UpdatePrRequest) -> Result<Pr, PlatformError> {
        if request.state == Some(PrTargetState::Open) {
            return Err(PlatformError::Unsupported {
                platform: PlatformId::Bitbucket,
                operation: "reopening a declined pull request".to_string(),
            });
        }

        let base_path = format!(
            "2.0/repositories/{}/pullrequests/{}",
            request.repo, request.number
        );
        let mut latest: Option<BitbucketPr> = None;

        if request.title.is_some() || request.body.is_some() || request.base.is_some() {
            let body = UpdatePrBody {
                title: request.title.as_deref(),
                description: request.body.as_deref(),
                destination: request.base.as_deref().map(BranchRefBody::new),
            };
            latest = Some(self.api.put_json(&base_path, &body).await?);
        }
        if request.state == Some(PrTargetState::Closed) {
            latest = Some(
                self.api
                    .post_json(&format!("{base_path}/decline"), &serde_json::json!({}))
                    .await?,
            );
        }

        match latest {
            Some(raw) => Ok(raw.into()),
            // Nothing to change: report the current state.
            None => Ok(self.api.get_json::<BitbucketPr>(&base_path).await?.into()),
        }
    }

    async fn merge_pr(&self, request: MergePrRequest) -> Result<(), PlatformError> {
        let body = MergePrBody {
            merge_strategy: merge_strategy(request.method),
        };
        self.api
            .post_unit(
                &format!(
                    "2.0/repositories/{}/pullrequests/{}/merge",
                    request.repo, request.number
                ),
                &body,
            )
            .await
    }

    async fn ensure_comment(&self, request: EnsureCommentRequest) -> Result<(), PlatformError> {
        let list_path = format!(
            "2.0/repositories/{}/pullrequests/{}/comments",
            request.repo, request.number
        );
        let page: Paged<BitbucketComment> = self.api.get_json(&list_path).await?;
        let desired = request.render();

        let existing = page
            .values
            .iter()
            .find(|comment| request.matches(&comment.content.raw));
        match existing {
            Some(comment) if comment.content.raw == desired => {
                debug!(number = request.number, "comment already up to date");
                Ok(())
            }
            Some(comment) => {
                let path = format!("{list_path}/{}", comment.id);
                self.api.put_unit(&path, &CommentBody::new(&desired)).await
            }
            None => {
                self.api
                    .post_unit(&list_path, &CommentBody::new(&desired))
                    .await
            }
        }
    }

    async fn set_branch_status(&self, request: BranchStatusRequest) -> Result<(), PlatformError> {
        let body = StatusBody {
            key: &request.context,
            state: status_label(request.state),
            description: request.description.as_deref(),
            url: request.target_url.as_deref(),
        };
        self.api
            .post_unit(
                &format!(
                    "2.0/repositories/{}/commit/{}/statuses/build",
                    request.repo, request.sha
                ),
                &body,
            )
            .await
    }

    async fn branch_protection(
        &self,
        repo: &str,
        branch: &str,
    ) -> Result<BranchProtection, PlatformError> {
        let page: Paged<BitbucketRestriction> = self
            .api
            .get_json(&format!("2.0/repositories/{repo}/branch-restrictions"))
            .await?;
        let protected = page
            .values
            .iter()
            .any(|restriction| pattern_matches(&restriction.pattern, branch));
        // Restrictions gate who may push or merge; they carry no required
        // status contexts.
        Ok(BranchProtection {
            protected,
            required_checks: vec![],
        })
    }
}

/// Bitbucket merge strategy name for a normalized method.
fn merge_strategy(method: MergeMethod) -> &'static str {
    match method {
        MergeMethod::Merge => "merge_commit",
        MergeMethod::Squash => "squash",
        MergeMethod::Rebase => "fast_forward",
    }
}

/// Bitbucket build-status label for a normalized state.
fn status_label(state: BranchStatusState) -> &'static str {
    match state {
        BranchStatusState::Pending => "INPROGRESS",
        BranchStatusState::Success => "SUCCESSFUL",
        BranchStatusState::Failed => "FAILED",
    }
}

/// Branch-restriction pattern match: exact, or prefix with a trailing `*`.
fn pattern_matches(pattern: &str, branch: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => branch.starts_with(prefix),
        None => pattern == branch,
    }
}

// --------------------------------------------------------------------------
// API Request/Response Types
// --------------------------------------------------------------------------

/// List envelope. Every Bitbucket list endpoint wraps its page like this.
#[derive(Deserialize)]
struct Paged<T> {
    // The explicit path keeps the derive from bounding `T: Default`.
    #[serde(default = "Vec::new")]
    values: Vec<T>,
}

/// Branch reference used in request bodies.
#[derive(Serialize)]
struct BranchRefBody<'a> {
    branch: BranchNameBody<'a>,
}

impl<'a> BranchRefBody<'a> {
    fn new(name: &'a str) -> BranchRefBody<'a> {
        BranchRefBody {
            branch: BranchNameBody { name },
        }
    }
}

#[derive(Serialize)]
struct BranchNameBody<'a> {
    name: &'a str,
}

/// Request body for creating a pull request.
#[derive(Serialize)]
struct CreatePrBody<'a> {
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    source: BranchRefBody<'a>,
    destination: BranchRefBody<'a>,
}

/// Request body for updating a pull request.
#[derive(Serialize)]
struct UpdatePrBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    destination: Option<BranchRefBody<'a>>,
}

/// Request body for merging a pull request.
#[derive(Serialize)]
struct MergePrBody {
    merge_strategy: &'static str,
}

/// Comment content wrapper used both ways on the wire.
#[derive(Serialize)]
struct CommentBody<'a> {
    content: RawContentBody<'a>,
}

impl<'a> CommentBody<'a> {
    fn new(raw: &'a str) -> CommentBody<'a> {
        CommentBody {
            content: RawContentBody { raw },
        }
    }
}

#[derive(Serialize)]
struct RawContentBody<'a> {
    raw: &'a str,
}

/// Request body for publishing a build status.
#[derive(Serialize)]
struct StatusBody<'a> {
    key: &'a str,
    state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
}

/// Authenticated-user response.
#[derive(Deserialize)]
struct BitbucketUser {
    username: Option<String>,
    display_name: Option<String>,
}

/// Repository response.
#[derive(Deserialize)]
struct BitbucketRepo {
    full_name: String,
    mainbranch: Option<BitbucketBranch>,
    parent: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct BitbucketBranch {
    name: String,
}

/// Pull request response.
#[derive(Deserialize)]
struct BitbucketPr {
    id: u64,
    title: String,
    state: String,
    links: BitbucketLinks,
    source: BitbucketPrRef,
    destination: BitbucketPrRef,
    created_on: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct BitbucketLinks {
    html: BitbucketLink,
}

#[derive(Deserialize)]
struct BitbucketLink {
    href: String,
}

#[derive(Deserialize)]
struct BitbucketPrRef {
    branch: BitbucketBranch,
}

/// Pull request comment response.
#[derive(Deserialize)]
struct BitbucketComment {
    id: u64,
    content: BitbucketRendered,
}

#[derive(Deserialize)]
struct BitbucketRendered {
    raw: String,
}

/// Branch restriction response.
#[derive(Deserialize)]
struct BitbucketRestriction {
    pattern: String,
}

impl From<BitbucketPr> for Pr {
    fn from(raw: BitbucketPr) -> Pr {
        let state = match raw.state.as_str() {
            "OPEN" => PrState::Open,
            "MERGED" => PrState::Merged,
            // DECLINED and SUPERSEDED both mean the request is done without
            // merging.
            _ => PrState::Closed,
        };
        Pr {
            number: raw.id,
            title: raw.title,
            state,
            is_draft: false,
            head: raw.source.branch.name,
            base: raw.destination.branch.name,
            url: raw.links.html.href,
            created_at: raw.created_on,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(username: Option<&str>, password: Option<&str>) -> PlatformConfig {
        PlatformConfig {
            username: username.map(str::to_string),
            password: password.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn requires_both_basic_credentials() {
        assert!(matches!(
            BitbucketPlatform::from_config(&config(None, None)).unwrap_err(),
            PlatformError::AuthRequired(_)
        ));
        assert!(matches!(
            BitbucketPlatform::from_config(&config(Some("abc"), None)).unwrap_err(),
            PlatformError::AuthRequired(_)
        ));
        assert!(BitbucketPlatform::from_config(&config(Some("abc"), Some("123"))).is_ok());
    }

    #[test]
    fn defaults_to_the_cloud_api() {
        let platform = BitbucketPlatform::from_config(&config(Some("abc"), Some("123"))).unwrap();
        assert_eq!(platform.api.endpoint(), "https://api.bitbucket.org/");
        assert_eq!(platform.id(), PlatformId::Bitbucket);
    }

    #[test]
    fn merge_strategies_match_the_service_vocabulary() {
        assert_eq!(merge_strategy(MergeMethod::Merge), "merge_commit");
        assert_eq!(merge_strategy(MergeMethod::Squash), "squash");
        assert_eq!(merge_strategy(MergeMethod::Rebase), "fast_forward");
    }

    #[test]
    fn status_labels_are_upper_case() {
        assert_eq!(status_label(BranchStatusState::Pending), "INPROGRESS");
        assert_eq!(status_label(BranchStatusState::Success), "SUCCESSFUL");
        assert_eq!(status_label(BranchStatusState::Failed), "FAILED");
    }

    #[test]
    fn restriction_patterns_support_trailing_wildcards() {
        assert!(pattern_matches("main", "main"));
        assert!(pattern_matches("release/*", "release/2024.08"));
        assert!(pattern_matches("*", "anything"));
        assert!(!pattern_matches("main", "maintenance"));
    }

    #[test]
    fn list_pages_tolerate_a_missing_values_field() {
        let page: Paged<BitbucketComment> = serde_json::from_str("{}").unwrap();
        assert!(page.values.is_empty());

        let page: Paged<BitbucketRestriction> = serde_json::from_value(serde_json::json!({
            "values": [{ "kind": "push", "pattern": "release/*" }]
        }))
        .unwrap();
        assert_eq!(page.values.len(), 1);
        assert_eq!(page.values[0].pattern, "release/*");
    }

    #[test]
    fn declined_and_superseded_normalize_to_closed() {
        for wire in ["DECLINED", "SUPERSEDED"] {
            let raw = BitbucketPr {
                id: 3,
                title: "t".to_string(),
                state: wire.to_string(),
                links: BitbucketLinks {
                    html: BitbucketLink {
                        href: "https://bitbucket.org/w/r/pull-requests/3".to_string(),
                    },
                },
                source: BitbucketPrRef {
                    branch: BitbucketBranch {
                        name: "feature".to_string(),
                    },
                },
                destination: BitbucketPrRef {
                    branch: BitbucketBranch {
                        name: "main".to_string(),
                    },
                },
                created_on: None,
            };
            assert_eq!(Pr::from(raw).state, PrState::Closed, "state {wire}");
        }
    }
}
