//! platform::github
//!
//! GitHub driver speaking the v3 REST API.
//!
//! # Design
//!
//! Works against github.com by default and against GitHub Enterprise Server
//! when the config carries an endpoint override. Change requests are pull
//! requests; keyed comments live on the issue side of the API; branch
//! protection reports the rule's required status contexts.
//!
//! # Authentication
//!
//! A personal access token (classic or fine-grained) sent as a bearer
//! credential. The token is required at construction, before any network
//! traffic.

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

/// Default GitHub API base URL.
const DEFAULT_ENDPOINT: &str = "https://api.github.com";

/// GitHub platform driver.
#[derive(Debug)]
pub struct GithubPlatform {
    api: Api,
}

impl GithubPlatform {
    /// Build a driver from an initialization config. No network traffic.
    ///
    /// # Errors
    ///
    /// [`PlatformError::AuthRequired`] without a token;
    /// [`PlatformError::InvalidEndpoint`] for an unusable endpoint override.
    pub fn from_config(config: &PlatformConfig) -> Result<GithubPlatform, PlatformError> {
        let token = config.token.clone().ok_or_else(|| {
            PlatformError::AuthRequired("a GitHub personal access token (token)".to_string())
        })?;
        let endpoint = config.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT);
        let api = Api::new(endpoint, AuthScheme::Bearer(token))?
            .with_header("Accept", "application/vnd.github+json")
            .with_header("X-GitHub-Api-Version", "2022-11-28");
        Ok(GithubPlatform { api })
    }
}

#[async_trait]
impl Platform for GithubPlatform {
    fn id(&self) -> PlatformId {
        PlatformId::Github
    }

    async fn authenticate(&self) -> Result<PlatformSession, PlatformError> {
        let user: GithubUser = self.api.get_json("user").await?;
        debug!(login = %user.login, "authenticated against GitHub");
        let git_author = user.email.as_ref().map(|email| {
            let display = user.name.as_deref().unwrap_or(&user.login);
            format!("{display} <{email}>")
        });
        Ok(PlatformSession {
            endpoint: self.api.endpoint(),
            user: Some(user.login),
            git_author,
        })
    }

    async fn repo_info(&self, repo: &str) -> Result<RepoInfo, PlatformError> {
        let raw: GithubRepo = self.api.get_json(&format!("repos/{repo}")).await?;
        Ok(RepoInfo {
            full_name: raw.full_name,
            default_branch: raw.default_branch,
            archived: raw.archived,
            fork: raw.fork,
        })
    }

    async fn create_pr(&self, request: CreatePrRequest) -> Result<Pr, PlatformError> {
        let body = CreatePrBody {
            title: &request.title,
            head: &request.head,
            base: &request.base,
            body: request.body.as_deref(),
            draft: request.draft,
        };
        let raw: GithubPr = self
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
        let raw: GithubPr = self
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
            merge_method: request.method.to_string(),
        };
        self.api
            .put_unit(
                &format!("repos/{}/pulls/{}/merge", request.repo, request.number),
                &body,
            )
            .await
    }

    async fn ensure_comment(&self, request: EnsureCommentRequest) -> Result<(), PlatformError> {
        let list_path = format!("repos/{}/issues/{}/comments", request.repo, request.number);
        let comments: Vec<GithubComment> = self.api.get_json(&list_path).await?;
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
        let path = format!("repos/{repo}/branches/{branch}/protection");
        match self.api.get_json::<GithubProtection>(&path).await {
            Ok(raw) => Ok(BranchProtection {
                protected: true,
                required_checks: raw
                    .required_status_checks
                    .map(|checks| checks.contexts)
                    .unwrap_or_default(),
            }),
            // GitHub reports an unprotected branch as a missing resource.
            Err(PlatformError::NotFound(_)) => Ok(BranchProtection::default()),
            Err(err) => Err(err),
        }
    }
}

/// GitHub commit-status label for a normalized state.
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
    title: &'a str,
    head: &'a str,
    base: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
    draft: bool,
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

/// Request body for merging a pull request.
#[derive(Serialize)]
struct MergePrBody {
    merge_method: String,
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
struct GithubUser {
    login: String,
    name: Option<String>,
    email: Option<String>,
}

/// Repository response.
#[derive(Deserialize)]
struct GithubRepo {
    full_name: String,
    default_branch: String,
    #[serde(default)]
    archived: bool,
    #[serde(default)]
    fork: bool,
}

/// Pull request response.
#[derive(Deserialize)]
struct GithubPr {
    number: u64,
    title: String,
    state: String,
    html_url: String,
    #[serde(default)]
    draft: bool,
    head: GithubRef,
    base: GithubRef,
    merged_at: Option<DateTime<Utc>>,
    created_at: Option<DateTime<Utc>>,
}

/// Head/base ref.
#[derive(Deserialize)]
struct GithubRef {
    #[serde(rename = "ref")]
    ref_name: String,
}

/// Issue comment response.
#[derive(Deserialize)]
struct GithubComment {
    id: u64,
    body: String,
}

/// Branch protection response (the subset this crate surfaces).
#[derive(Deserialize)]
struct GithubProtection {
    required_status_checks: Option<GithubRequiredChecks>,
}

#[derive(Deserialize)]
struct GithubRequiredChecks {
    contexts: Vec<String>,
}

impl From<GithubPr> for Pr {
    fn from(raw: GithubPr) -> Pr {
        let state = if raw.merged_at.is_some() {
            PrState::Merged
        } else if raw.state == "closed" {
            PrState::Closed
        } else {
            PrState::Open
        };
        Pr {
            number: raw.number,
            title: raw.title,
            state,
            is_draft: raw.draft,
            head: raw.head.ref_name,
            base: raw.base.ref_name,
            url: raw.html_url,
            created_at: raw.created_at,
        }
    }
}
