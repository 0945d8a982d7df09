//! platform::gitea
//!
//! Gitea driver speaking the v1 REST API.
//!
//! # Design
//!
//! The API is a close cousin of GitHub's v3, with a few local accents: the
//! merge strategy field is literally named `Do`, draft state rides on a
//! `WIP:` title prefix, and branch protection is a first-class resource
//! with its own status-check list. Works against gitea.com by default and
//! against self-hosted instances (including compatible forks) via an
//! endpoint override.
//!
//! # Authentication
//!
//! An access token sent as `Authorization: token <token>`.

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
    EnsureCommentRequest, MergePrRequest, PlatformConfig, PlatformSession, Pr, PrState,
    PrTargetState, RepoInfo, UpdatePrRequest,
};

/// Default Gitea API base URL.
const DEFAULT_ENDPOINT: &str = "https://gitea.com/api/v1";

/// Title prefix Gitea treats as "work in progress".
const WIP_PREFIX: &str = "WIP:";

/// Gitea platform driver.
#[derive(Debug)]
pub struct GiteaPlatform {
    api: Api,
}

impl GiteaPlatform {
    /// Build a driver from an initialization config. No network traffic.
    pub fn from_config(config: &PlatformConfig) -> Result<GiteaPlatform, PlatformError> {
        let token = config.token.clone().ok_or_else(|| {
            PlatformError::AuthRequired("a Gitea access token (token)".to_string())
        })?;
        let endpoint = config.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT);
        let api = Api::new(endpoint, AuthScheme::Token(token))?;
        Ok(GiteaPlatform { api })
    }
}

#[async_trait]
impl Platform for GiteaPlatform {
    fn id(&self) -> PlatformId {
        PlatformId::Gitea
    }

    async fn authenticate(&self) -> Result<PlatformSession, PlatformError> {
        let user: GiteaUser = self.api.get_json("user").await?;
        debug!(login = %user.login, "authenticated against Gitea");
        let git_author = user
            .email
            .as_deref()
            .filter(|email| !email.is_empty())
            .map(|email| {
                let display = user
                    .full_name
                    .as_deref()
                    .filter(|name| !name.is_empty())
                    .unwrap_or(&user.login);
                format!("{display} <{email}>")
            });
        Ok(PlatformSession {
            endpoint: self.api.endpoint(),
            user: Some(user.login),
            git_author,
        })
    }

    async fn repo_info(&self, repo: &str) -> Result<RepoInfo, PlatformError> {
        let raw: GiteaRepo = self.api.get_json(&format!("repos/{repo}")).await?;
        Ok(RepoInfo {
            full_name: raw.full_name,
            default_branch: raw.default_branch,
            archived: raw.archived,
            fork: raw.fork,
        })
    }

    async fn create_pr(&self, request: CreatePrRequest) -> Result<Pr, PlatformError> {
        let body = CreatePrBody {
            title: wip_title(&request.title, request.draft),
            head: &request.head,
            base: &request.base,
            body: request.body.as_deref(),
        };
        let raw: GiteaPr = self
            .api
            .post_json(&format!("repos/{}/pulls", request.repo), &body)
            .await?;
        Ok(raw.into())
    }

    async fn update_pr(&self, request: UpdatePrRequest) -> Result<Pr, PlatformError> {
        let body = UpdatePrBody {
            title: request.title.as_deref(),
            body: request.body.as_deref(),
            base: request.base.as_deref(),
            state: request.state.map(|state| match state {
                PrTargetState::Open => "open",
                PrTargetState::Closed => "closed",
            }),
        };
        let raw: GiteaPr = self
            .api
            .patch_json(
                &format!("repos/{}/pulls/{}", request.repo, request.number),
                &body,
            )
            .await?;
        Ok(raw.into())
    }

    async fn merge_pr(&self, request: MergePrRequest) -> Result<(), PlatformError> {
        let body = MergePrBody {
            strategy: request.method.to_string(),
        };
        self.api
            .post_unit(
                &format!("repos/{}/pulls/{}/merge", request.repo, request.number),
                &body,
            )
            .await
    }

    async fn ensure_comment(&self, request: EnsureCommentRequest) -> Result<(), PlatformError> {
        let list_path = format!("repos/{}/issues/{}/comments", request.repo, request.number);
        let comments: Vec<GiteaComment> = self.api.get_json(&list_path).await?;
        let desired = request.render();

        match comments.iter().find(|c| request.matches(&c.body)) {
            Some(existing) if existing.body == desired => {
                debug!(number = request.number, "comment already up to date");
                Ok(())
            }
            Some(existing) => {
                let path = format!("repos/{}/issues/comments/{}", request.repo, existing.id);
                self.api
                    .patch_unit(&path, &CommentBody { body: &desired })
                    .await
            }
            None => {
                self.api
                    .post_unit(&list_path, &CommentBody { body: &desired })
                    .await
            }
        }
    }

    async fn set_branch_status(&self, request: BranchStatusRequest) -> Result<(), PlatformError> {
        let body = StatusBody {
            state: status_label(request.state),
            context: &request.context,
            description: request.description.as_deref(),
            target_url: request.target_url.as_deref(),
        };
        self.api
            .post_unit(
                &format!("repos/{}/statuses/{}", request.repo, request.sha),
                &body,
            )
            .await
    }

    async fn branch_protection(
        &self,
        repo: &str,
        branch: &str,
    ) -> Result<BranchProtection, PlatformError> {
        let path = format!(
            "repos/{repo}/branch_protections/{}",
            urlencoding::encode(branch)
        );
        match self.api.get_json::<GiteaProtection>(&path).await {
            Ok(raw) => Ok(BranchProtection {
                protected: true,
                required_checks: if raw.enable_status_check {
                    raw.status_check_contexts
                } else {
                    vec![]
                },
            }),
            Err(PlatformError::NotFound(_)) => Ok(BranchProtection::default()),
            Err(err) => Err(err),
        }
    }
}

/// Apply the `WIP:` title convention.
fn wip_title(title: &str, draft: bool) -> String {
    if draft && !title.starts_with(WIP_PREFIX) {
        format!("{WIP_PREFIX} {title}")
    } else {
        title.to_string()
    }
}

/// Gitea commit-status label for a normalized state.
fn status_label(state: BranchStatusState) -> &'static str {
    match state {
        BranchStatusState::Pending => "pending",
        BranchStatusState::Success => "success",
        BranchStatusState::Failed => "failure",
    }
}

// --------------------------------------------------------------------------
// API Request/Response Types
// --------------------------------------------------------------------------

/// Request body for creating a pull request.
#[derive(Serialize)]
struct CreatePrBody<'a> {
    title: String,
    head: &'a str,
    base: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
}

/// Request body for updating a pull request.
#[derive(Serialize)]
struct UpdatePrBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    base: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'a str>,
}

/// Request body for merging a pull request. The strategy field is named
/// `Do` on the wire.
#[derive(Serialize)]
struct MergePrBody {
    #[serde(rename = "Do")]
    strategy: String,
}

/// Request body for creating or updating a comment.
#[derive(Serialize)]
struct CommentBody<'a> {
    body: &'a str,
}

/// Request body for publishing a commit status.
#[derive(Serialize)]
struct StatusBody<'a> {
    state: &'a str,
    context: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_url: Option<&'a str>,
}

/// Authenticated-user response.
#[derive(Deserialize)]
struct GiteaUser {
    login: String,
    full_name: Option<String>,
    email: Option<String>,
}

/// Repository response.
#[derive(Deserialize)]
struct GiteaRepo {
    full_name: String,
    default_branch: String,
    #[serde(default)]
    archived: bool,
    #[serde(default)]
    fork: bool,
}

/// Pull request response.
#[derive(Deserialize)]
struct GiteaPr {
    number: u64,
    title: String,
    state: String,
    #[serde(default)]
    merged: bool,
    html_url: String,
    head: GiteaRef,
    base: GiteaRef,
    created_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct GiteaRef {
    #[serde(rename = "ref")]
    ref_name: String,
}

/// Issue comment response.
#[derive(Deserialize)]
struct GiteaComment {
    id: u64,
    body: String,
}

/// Branch protection response.
#[derive(Deserialize)]
struct GiteaProtection {
    #[serde(default)]
    enable_status_check: bool,
    #[serde(default)]
    status_check_contexts: Vec<String>,
}

impl From<GiteaPr> for Pr {
    fn from(raw: GiteaPr) -> Pr {
        let state = if raw.merged {
            PrState::Merged
        } else if raw.state == "closed" {
            PrState::Closed
        } else {
            PrState::Open
        };
        let is_draft = raw.title.starts_with(WIP_PREFIX);
        Pr {
            number: raw.number,
            title: raw.title,
            state,
            is_draft,
            head: raw.head.ref_name,
            base: raw.base.ref_name,
            url: raw.html_url,
            created_at: raw.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_a_token() {
        let err = GiteaPlatform::from_config(&PlatformConfig::default()).unwrap_err();
        assert!(matches!(err, PlatformError::AuthRequired(_)));
    }

    #[test]
    fn defaults_to_gitea_com() {
        let config = PlatformConfig {
            token: Some("t".to_string()),
            ..Default::default()
        };
        let platform = GiteaPlatform::from_config(&config).unwrap();
        assert_eq!(platform.api.endpoint(), "https://gitea.com/api/v1/");
        assert_eq!(platform.id(), PlatformId::Gitea);
    }

    #[test]
    fn wip_titles_get_the_prefix_once() {
        assert_eq!(wip_title("Add parser", true), "WIP: Add parser");
        assert_eq!(wip_title("WIP: Add parser", true), "WIP: Add parser");
        assert_eq!(wip_title("Add parser", false), "Add parser");
    }

    #[test]
    fn merged_flag_wins_over_state() {
        let raw = GiteaPr {
            number: 2,
            title: "t".to_string(),
            state: "closed".to_string(),
            merged: true,
            html_url: "https://gitea.com/o/r/pulls/2".to_string(),
            head: GiteaRef {
                ref_name: "feature".to_string(),
            },
            base: GiteaRef {
                ref_name: "main".to_string(),
            },
            created_at: None,
        };
        assert_eq!(Pr::from(raw).state, PrState::Merged);
    }

    #[test]
    fn wip_prefix_reads_back_as_draft() {
        let raw = GiteaPr {
            number: 2,
            title: "WIP: t".to_string(),
            state: "open".to_string(),
            merged: false,
            html_url: "https://gitea.com/o/r/pulls/2".to_string(),
            head: GiteaRef {
                ref_name: "feature".to_string(),
            },
            base: GiteaRef {
                ref_name: "main".to_string(),
            },
            created_at: None,
        };
        assert!(Pr::from(raw).is_draft);
    }
}
