//! platform::gitlab
//!
//! GitLab driver speaking the v4 REST API.
//!
//! # Design
//!
//! Works against gitlab.com by default and against self-managed instances
//! via an endpoint override. Change requests are merge requests addressed by
//! `iid`, and projects are addressed by their URL-encoded full path
//! (`group%2Fsubgroup%2Fproject`). Draft state is a title convention, not a
//! field, so the driver maintains the `Draft:` prefix itself.
//!
//! # Authentication
//!
//! A personal access token sent in the `PRIVATE-TOKEN` header.

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

/// Default GitLab API base URL.
const DEFAULT_ENDPOINT: &str = "https://gitlab.com/api/v4";

/// GitLab platform driver.
#[derive(Debug)]
pub struct GitlabPlatform {
    api: Api,
}

impl GitlabPlatform {
    /// Build a driver from an initialization config. No network traffic.
    pub fn from_config(config: &PlatformConfig) -> Result<GitlabPlatform, PlatformError> {
        let token = config.token.clone().ok_or_else(|| {
            PlatformError::AuthRequired("a GitLab personal access token (token)".to_string())
        })?;
        let endpoint = config.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT);
        let api = Api::new(endpoint, AuthScheme::PrivateToken(token))?;
        Ok(GitlabPlatform { api })
    }
}

#[async_trait]
impl Platform for GitlabPlatform {
    fn id(&self) -> PlatformId {
        PlatformId::Gitlab
    }

    async fn authenticate(&self) -> Result<PlatformSession, PlatformError> {
        let user: GitlabUser = self.api.get_json("user").await?;
        debug!(username = %user.username, "authenticated against GitLab");
        let email = user.commit_email.as_ref().or(user.email.as_ref());
        let git_author = email.map(|email| {
            let display = user.name.as_deref().unwrap_or(&user.username);
            format!("{display} <{email}>")
        });
        Ok(PlatformSession {
            endpoint: self.api.endpoint(),
            user: Some(user.username),
            git_author,
        })
    }

    async fn repo_info(&self, repo: &str) -> Result<RepoInfo, PlatformError> {
        let raw: GitlabProject = self
            .api
            .get_json(&format!("projects/{}", project_path(repo)))
            .await?;
        Ok(RepoInfo {
            full_name: raw.path_with_namespace,
            // Empty projects report no default branch; GitLab's
            // initial-branch default applies.
            default_branch: raw.default_branch.unwrap_or_else(|| "main".to_string()),
            archived: raw.archived,
            fork: raw.forked_from_project.is_some(),
        })
    }

    async fn create_pr(&self, request: CreatePrRequest) -> Result<Pr, PlatformError> {
        let body = CreateMrBody {
            title: draft_title(&request.title, request.draft),
            source_branch: &request.head,
            target_branch: &request.base,
            description: request.body.as_deref(),
        };
        let raw: GitlabMr = self
            .api
            .post_json(
                &format!("projects/{}/merge_requests", project_path(&request.repo)),
                &body,
            )
            .await?;
        Ok(raw.into())
    }

    async fn update_pr(&self, request: UpdatePrRequest) -> Result<Pr, PlatformError> {
        let body = UpdateMrBody {
            title: request.title.as_deref(),
            description: request.body.as_deref(),
            target_branch: request.base.as_deref(),
            state_event: request.state.map(|state| match state {
                PrTargetState::Open => "reopen",
                PrTargetState::Closed => "close",
            }),
        };
        let raw: GitlabMr = self
            .api
            .put_json(
                &format!(
                    "projects/{}/merge_requests/{}",
                    project_path(&request.repo),
                    request.number
                ),
                &body,
            )
            .await?;
        Ok(raw.into())
    }

    async fn merge_pr(&self, request: MergePrRequest) -> Result<(), PlatformError> {
        // GitLab models squash as a flag on the merge call; the other
        // strategies land as a plain merge.
        let body = MergeMrBody {
            squash: matches!(request.method, MergeMethod::Squash),
        };
        self.api
            .put_unit(
                &format!(
                    "projects/{}/merge_requests/{}/merge",
                    project_path(&request.repo),
                    request.number
                ),
                &body,
            )
            .await
    }

    async fn ensure_comment(&self, request: EnsureCommentRequest) -> Result<(), PlatformError> {
        let list_path = format!(
            "projects/{}/merge_requests/{}/notes",
            project_path(&request.repo),
            request.number
        );
        let notes: Vec<GitlabNote> = self.api.get_json(&list_path).await?;
        let desired = request.render();

        match notes.iter().find(|note| request.matches(&note.body)) {
            Some(existing) if existing.body == desired => {
                debug!(number = request.number, "note already up to date");
                Ok(())
            }
            Some(existing) => {
                let path = format!("{list_path}/{}", existing.id);
                self.api.put_unit(&path, &NoteBody { body: &desired }).await
            }
            None => {
                self.api
                    .post_unit(&list_path, &NoteBody { body: &desired })
                    .await
            }
        }
    }

    async fn set_branch_status(&self, request: BranchStatusRequest) -> Result<(), PlatformError> {
        let body = StatusBody {
            state: status_label(request.state),
            name: &request.context,
            description: request.description.as_deref(),
            target_url: request.target_url.as_deref(),
        };
        self.api
            .post_unit(
                &format!(
                    "projects/{}/statuses/{}",
                    project_path(&request.repo),
                    request.sha
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
        let path = format!(
            "projects/{}/protected_branches/{}",
            project_path(repo),
            urlencoding::encode(branch)
        );
        match self.api.get_json::<GitlabProtectedBranch>(&path).await {
            // GitLab's protection endpoint carries no status contexts; those
            // live in approval rules outside this surface.
            Ok(_) => Ok(BranchProtection {
                protected: true,
                required_checks: vec![],
            }),
            Err(PlatformError::NotFound(_)) => Ok(BranchProtection::default()),
            Err(err) => Err(err),
        }
    }
}

/// URL-encode a project path so it fits in one path segment.
fn project_path(repo: &str) -> String {
    urlencoding::encode(repo).into_owned()
}

/// Apply the `Draft:` title convention.
fn draft_title(title: &str, draft: bool) -> String {
    if draft && !title.starts_with("Draft:") {
        format!("Draft: {title}")
    } else {
        title.to_string()
    }
}

/// GitLab commit-status label for a normalized state.
fn status_label(state: BranchStatusState) -> &'static str {
    match state {
        BranchStatusState::Pending => "pending",
        BranchStatusState::Success => "success",
        BranchStatusState::Failed => "failed",
    }
}

// --------------------------------------------------------------------------
// API Request/Response Types
// --------------------------------------------------------------------------

/// Request body for creating a merge request.
#[derive(Serialize)]
struct CreateMrBody<'a> {
    title: String,
    source_branch: &'a str,
    target_branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

/// Request body for updating a merge request.
#[derive(Serialize)]
struct UpdateMrBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_branch: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state_event: Option<&'a str>,
}

/// Request body for merging a merge request.
#[derive(Serialize)]
struct MergeMrBody {
    squash: bool,
}

/// Request body for creating or updating a note.
#[derive(Serialize)]
struct NoteBody<'a> {
    body: &'a str,
}

/// Request body for publishing a commit status.
#[derive(Serialize)]
struct StatusBody<'a> {
    state: &'a str,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_url: Option<&'a str>,
}

/// Authenticated-user response.
#[derive(Deserialize)]
struct GitlabUser {
    username: String,
    name: Option<String>,
    email: Option<String>,
    commit_email: Option<String>,
}

/// Project response.
#[derive(Deserialize)]
struct GitlabProject {
    path_with_namespace: String,
    default_branch: Option<String>,
    #[serde(default)]
    archived: bool,
    forked_from_project: Option<serde_json::Value>,
}

/// Merge request response.
#[derive(Deserialize)]
struct GitlabMr {
    iid: u64,
    title: String,
    state: String,
    web_url: String,
    #[serde(default)]
    draft: bool,
    source_branch: String,
    target_branch: String,
    created_at: Option<DateTime<Utc>>,
}

/// Note (comment) response.
#[derive(Deserialize)]
struct GitlabNote {
    id: u64,
    body: String,
}

/// Protected-branch response. Only existence matters here.
#[derive(Deserialize)]
struct GitlabProtectedBranch {
    #[allow(dead_code)]
    name: String,
}

impl From<GitlabMr> for Pr {
    fn from(raw: GitlabMr) -> Pr {
        let state = match raw.state.as_str() {
            "merged" => PrState::Merged,
            "closed" | "locked" => PrState::Closed,
            _ => PrState::Open,
        };
        Pr {
            number: raw.iid,
            title: raw.title,
            state,
            is_draft: raw.draft,
            head: raw.source_branch,
            base: raw.target_branch,
            url: raw.web_url,
            created_at: raw.created_at,
        }
    }
}
