//! platform::azure
//!
//! Azure DevOps driver speaking the 7.0 REST API.
//!
//! # Design
//!
//! Azure has no public default endpoint that makes sense for everyone: every
//! organization lives under its own URL (`https://dev.azure.com/my-org`), so
//! the config must carry one and construction fails early without it.
//! Repositories are addressed as `project/repository` relative to the
//! organization, branches travel as full refs (`refs/heads/main`), and
//! merging is a state transition on the pull request itself rather than a
//! separate call. Keyed comments map onto comment threads.
//!
//! # Authentication
//!
//! A personal access token sent as the password of a basic credential with
//! an empty username.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
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

/// REST API version sent with every request.
const API_VERSION: &str = "7.0";

/// Azure DevOps platform driver.
#[derive(Debug)]
pub struct AzurePlatform {
    api: Api,
}

impl AzurePlatform {
    /// Build a driver from an initialization config. No network traffic.
    ///
    /// # Errors
    ///
    /// [`PlatformError::InvalidConfig`] without an organization endpoint;
    /// [`PlatformError::AuthRequired`] without a token.
    pub fn from_config(config: &PlatformConfig) -> Result<AzurePlatform, PlatformError> {
        let endpoint = config.endpoint.as_deref().ok_or_else(|| {
            PlatformError::InvalidConfig(
                "Azure DevOps needs an explicit organization endpoint, \
                 e.g. https://dev.azure.com/my-org"
                    .to_string(),
            )
        })?;
        let token = config.token.clone().ok_or_else(|| {
            PlatformError::AuthRequired("an Azure DevOps personal access token (token)".to_string())
        })?;
        let api = Api::new(
            endpoint,
            AuthScheme::Basic {
                username: String::new(),
                password: token,
            },
        )?;
        Ok(AzurePlatform { api })
    }

    /// Path under the repository's git area, with the API version attached.
    fn git_path(repo: &str, tail: &str) -> Result<String, PlatformError> {
        let (project, name) = split_repo(repo)?;
        Ok(format!(
            "{}/_apis/git/repositories/{}{tail}?api-version={API_VERSION}",
            urlencoding::encode(project),
            urlencoding::encode(name),
        ))
    }
}

#[async_trait]
impl Platform for AzurePlatform {
    fn id(&self) -> PlatformId {
        PlatformId::Azure
    }

    async fn authenticate(&self) -> Result<PlatformSession, PlatformError> {
        let data: AzureConnectionData = self
            .api
            .get_json(&format!("_apis/connectionData?api-version={API_VERSION}"))
            .await?;
        let user = data
            .authenticated_user
            .and_then(|identity| identity.provider_display_name);
        if let Some(user) = &user {
            debug!(user = %user, "authenticated against Azure DevOps");
        }
        Ok(PlatformSession {
            endpoint: self.api.endpoint(),
            user,
            git_author: None,
        })
    }

    async fn repo_info(&self, repo: &str) -> Result<RepoInfo, PlatformError> {
        let (project, _) = split_repo(repo)?;
        let raw: AzureRepo = self.api.get_json(&Self::git_path(repo, "")?).await?;
        Ok(RepoInfo {
            full_name: format!("{project}/{}", raw.name),
            default_branch: raw
                .default_branch
                .as_deref()
                .map(branch_name)
                // A just-created repository has no default branch yet.
                .unwrap_or_else(|| "main".to_string()),
            archived: raw.is_disabled,
            fork: raw.is_fork,
        })
    }

    async fn create_pr(&self, request: CreatePrRequest) -> Result<Pr, PlatformError> {
        let body = CreatePrBody {
            source_ref_name: format!("refs/heads/{}", request.head),
            target_ref_name: format!("refs/heads/{}", request.base),
            title: &request.title,
            description: request.body.as_deref(),
            is_draft: request.draft,
        };
        let raw: AzurePr = self
            .api
            .post_json(&Self::git_path(&request.repo, "/pullrequests")?, &body)
            .await?;
        Ok(raw.into())
    }

    async fn update_pr(&self, request: UpdatePrRequest) -> Result<Pr, PlatformError> {
        let body = UpdatePrBody {
            title: request.title.as_deref(),
            description: request.body.as_deref(),
            target_ref_name: request.base.as_ref().map(|base| format!("refs/heads/{base}")),
            status: request.state.map(|state| match state {
                PrTargetState::Open => "active",
                PrTargetState::Closed => "abandoned",
            }),
            last_merge_source_commit: None,
            completion_options: None,
        };
        let path = Self::git_path(&request.repo, &format!("/pullrequests/{}", request.number))?;
        let raw: AzurePr = self.api.patch_json(&path, &body).await?;
        Ok(raw.into())
    }

    async fn merge_pr(&self, request: MergePrRequest) -> Result<(), PlatformError> {
        let path = Self::git_path(&request.repo, &format!("/pullrequests/{}", request.number))?;
        // Completion needs the current merge source commit; without one the
        // service rejects the transition with its own error.
        let current: AzurePr = self.api.get_json(&path).await?;
        let body = UpdatePrBody {
            title: None,
            description: None,
            target_ref_name: None,
            status: Some("completed"),
            last_merge_source_commit: current.last_merge_source_commit,
            completion_options: Some(CompletionOptions {
                merge_strategy: merge_strategy(request.method),
            }),
        };
        self.api.patch_unit(&path, &body).await
    }

    async fn ensure_comment(&self, request: EnsureCommentRequest) -> Result<(), PlatformError> {
        let threads_path = Self::git_path(
            &request.repo,
            &format!("/pullRequests/{}/threads", request.number),
        )?;
        let threads: AzureThreads = self.api.get_json(&threads_path).await?;
        let desired = request.render();

        let slot = threads
            .value
            .iter()
            .filter(|thread| !thread.is_deleted)
            .find_map(|thread| {
                let first = thread.comments.first()?;
                let content = first.content.as_deref()?;
                request.matches(content).then_some((thread, first, content))
            });

        match slot {
            Some((_, _, content)) if content == desired => {
                debug!(number = request.number, "thread already up to date");
                Ok(())
            }
            Some((thread, comment, _)) => {
                let path = Self::git_path(
                    &request.repo,
                    &format!(
                        "/pullRequests/{}/threads/{}/comments/{}",
                        request.number, thread.id, comment.id
                    ),
                )?;
                self.api
                    .patch_unit(&path, &CommentContentBody { content: &desired })
                    .await
            }
            None => {
                let body = NewThreadBody {
                    status: "active",
                    comments: vec![NewCommentBody {
                        parent_comment_id: 0,
                        comment_type: "text",
                        content: &desired,
                    }],
                };
                self.api.post_unit(&threads_path, &body).await
            }
        }
    }

    async fn set_branch_status(&self, request: BranchStatusRequest) -> Result<(), PlatformError> {
        let body = StatusBody {
            state: status_label(request.state),
            description: request.description.as_deref(),
            context: StatusContextBody {
                name: &request.context,
            },
            target_url: request.target_url.as_deref(),
        };
        let path = Self::git_path(&request.repo, &format!("/commits/{}/statuses", request.sha))?;
        self.api.post_unit(&path, &body).await
    }

    async fn branch_protection(
        &self,
        repo: &str,
        branch: &str,
    ) -> Result<BranchProtection, PlatformError> {
        let (project, _) = split_repo(repo)?;
        let repo_meta: AzureRepo = self.api.get_json(&Self::git_path(repo, "")?).await?;
        let policies: AzurePolicies = self
            .api
            .get_json(&format!(
                "{}/_apis/policy/configurations?api-version={API_VERSION}",
                urlencoding::encode(project)
            ))
            .await?;

        let ref_name = format!("refs/heads/{branch}");
        let mut protected = false;
        let mut required_checks = vec![];
        for policy in policies.value.iter().filter(|p| p.is_enabled) {
            if !policy_applies(&policy.settings, repo_meta.id.as_deref(), &ref_name) {
                continue;
            }
            protected = true;
            if let Some(status_name) = policy.settings["statusName"].as_str() {
                required_checks.push(status_name.to_string());
            }
        }
        Ok(BranchProtection {
            protected,
            required_checks,
        })
    }
}

/// Split `project/repository` addressing into its parts.
fn split_repo(repo: &str) -> Result<(&str, &str), PlatformError> {
    repo.split_once('/')
        .filter(|(project, name)| !project.is_empty() && !name.is_empty())
        .ok_or_else(|| {
            PlatformError::InvalidConfig(format!(
                "Azure DevOps repositories are addressed as 'project/repository', got '{repo}'"
            ))
        })
}

/// Strip the `refs/heads/` prefix Azure puts on branch names.
fn branch_name(ref_name: &str) -> String {
    ref_name
        .strip_prefix("refs/heads/")
        .unwrap_or(ref_name)
        .to_string()
}

/// Whether a policy's scope covers the given repository and ref.
///
/// A scope entry with no `repositoryId` covers the whole project; one with
/// no `refName` covers every branch of its repository.
fn policy_applies(settings: &Value, repo_id: Option<&str>, ref_name: &str) -> bool {
    let Some(scopes) = settings["scope"].as_array() else {
        return false;
    };
    scopes.iter().any(|scope| {
        let repo_matches = match scope["repositoryId"].as_str() {
            Some(scoped_id) => repo_id == Some(scoped_id),
            None => true,
        };
        let ref_matches = match scope["refName"].as_str() {
            Some(scoped_ref) => scoped_ref == ref_name,
            None => true,
        };
        repo_matches && ref_matches
    })
}

/// Azure merge strategy name for a normalized method.
fn merge_strategy(method: MergeMethod) -> &'static str {
    match method {
        MergeMethod::Merge => "noFastForward",
        MergeMethod::Squash => "squash",
        MergeMethod::Rebase => "rebase",
    }
}

/// Azure commit-status label for a normalized state.
fn status_label(state: BranchStatusState) -> &'static str {
    match state {
        BranchStatusState::Pending => "pending",
        BranchStatusState::Success => "succeeded",
        BranchStatusState::Failed => "failed",
    }
}

// --------------------------------------------------------------------------
// API Request/Response Types
// --------------------------------------------------------------------------

/// Request body for creating a pull request.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatePrBody<'a> {
    source_ref_name: String,
    target_ref_name: String,
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    is_draft: bool,
}

/// Request body for updating a pull request, including completion.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdatePrBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_ref_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_merge_source_commit: Option<AzureCommitRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    completion_options: Option<CompletionOptions>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletionOptions {
    merge_strategy: &'static str,
}

/// Request body for opening a comment thread.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewThreadBody<'a> {
    status: &'static str,
    comments: Vec<NewCommentBody<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewCommentBody<'a> {
    parent_comment_id: u64,
    comment_type: &'static str,
    content: &'a str,
}

/// Request body for editing one thread comment.
#[derive(Serialize)]
struct CommentContentBody<'a> {
    content: &'a str,
}

/// Request body for publishing a commit status.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusBody<'a> {
    state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    context: StatusContextBody<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_url: Option<&'a str>,
}

#[derive(Serialize)]
struct StatusContextBody<'a> {
    name: &'a str,
}

/// Connection-data response.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzureConnectionData {
    authenticated_user: Option<AzureIdentity>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzureIdentity {
    provider_display_name: Option<String>,
}

/// Repository response.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzureRepo {
    id: Option<String>,
    name: String,
    default_branch: Option<String>,
    #[serde(default)]
    is_disabled: bool,
    #[serde(default)]
    is_fork: bool,
}

/// Pull request response.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzurePr {
    pull_request_id: u64,
    title: String,
    status: String,
    #[serde(default)]
    is_draft: bool,
    source_ref_name: String,
    target_ref_name: String,
    url: String,
    repository: Option<AzurePrRepo>,
    creation_date: Option<DateTime<Utc>>,
    last_merge_source_commit: Option<AzureCommitRef>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzurePrRepo {
    web_url: Option<String>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzureCommitRef {
    commit_id: String,
}

/// Thread list response.
#[derive(Deserialize)]
struct AzureThreads {
    #[serde(default)]
    value: Vec<AzureThread>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzureThread {
    id: u64,
    #[serde(default)]
    is_deleted: bool,
    #[serde(default)]
    comments: Vec<AzureComment>,
}

#[derive(Deserialize)]
struct AzureComment {
    id: u64,
    content: Option<String>,
}

/// Policy configuration list response.
#[derive(Deserialize)]
struct AzurePolicies {
    #[serde(default)]
    value: Vec<AzurePolicy>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzurePolicy {
    #[serde(default)]
    is_enabled: bool,
    #[serde(default)]
    settings: Value,
}

impl From<AzurePr> for Pr {
    fn from(raw: AzurePr) -> Pr {
        let state = match raw.status.as_str() {
            "completed" => PrState::Merged,
            "abandoned" => PrState::Closed,
            _ => PrState::Open,
        };
        let url = match raw.repository.and_then(|repo| repo.web_url) {
            Some(web_url) => format!("{web_url}/pullrequest/{}", raw.pull_request_id),
            None => raw.url,
        };
        Pr {
            number: raw.pull_request_id,
            title: raw.title,
            state,
            is_draft: raw.is_draft,
            head: branch_name(&raw.source_ref_name),
            base: branch_name(&raw.target_ref_name),
            url,
            created_at: raw.creation_date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(endpoint: Option<&str>, token: Option<&str>) -> PlatformConfig {
        PlatformConfig {
            endpoint: endpoint.map(str::to_string),
            token: token.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn endpoint_is_mandatory() {
        let err = AzurePlatform::from_config(&config(None, Some("pat"))).unwrap_err();
        assert!(matches!(err, PlatformError::InvalidConfig(_)));
    }

    #[test]
    fn token_is_mandatory() {
        let err =
            AzurePlatform::from_config(&config(Some("https://dev.azure.com/org"), None))
                .unwrap_err();
        assert!(matches!(err, PlatformError::AuthRequired(_)));
    }

    #[test]
    fn builds_against_an_organization_endpoint() {
        let platform =
            AzurePlatform::from_config(&config(Some("https://dev.azure.com/org"), Some("pat")))
                .unwrap();
        assert_eq!(platform.api.endpoint(), "https://dev.azure.com/org/");
        assert_eq!(platform.id(), PlatformId::Azure);
    }

    #[test]
    fn repo_addressing_requires_project_and_name() {
        assert!(split_repo("proj/repo").is_ok());
        assert!(matches!(
            split_repo("just-a-repo"),
            Err(PlatformError::InvalidConfig(_))
        ));
        assert!(matches!(
            split_repo("/repo"),
            Err(PlatformError::InvalidConfig(_))
        ));
    }

    #[test]
    fn git_paths_encode_segments_and_carry_the_api_version() {
        let path = AzurePlatform::git_path("My Project/the-repo", "/pullrequests").unwrap();
        assert_eq!(
            path,
            "My%20Project/_apis/git/repositories/the-repo/pullrequests?api-version=7.0"
        );
    }

    #[test]
    fn branch_names_drop_the_ref_prefix() {
        assert_eq!(branch_name("refs/heads/main"), "main");
        assert_eq!(branch_name("refs/heads/release/2024"), "release/2024");
        assert_eq!(branch_name("main"), "main");
    }

    #[test]
    fn statuses_normalize() {
        for (wire, expected) in [
            ("active", PrState::Open),
            ("notSet", PrState::Open),
            ("completed", PrState::Merged),
            ("abandoned", PrState::Closed),
        ] {
            let raw = AzurePr {
                pull_request_id: 9,
                title: "t".to_string(),
                status: wire.to_string(),
                is_draft: false,
                source_ref_name: "refs/heads/feature".to_string(),
                target_ref_name: "refs/heads/main".to_string(),
                url: "https://dev.azure.com/org/_apis/git/pullRequests/9".to_string(),
                repository: None,
                creation_date: None,
                last_merge_source_commit: None,
            };
            assert_eq!(Pr::from(raw).state, expected, "status {wire}");
        }
    }

    #[test]
    fn web_url_is_preferred_for_the_pr_link() {
        let raw = AzurePr {
            pull_request_id: 9,
            title: "t".to_string(),
            status: "active".to_string(),
            is_draft: true,
            source_ref_name: "refs/heads/feature".to_string(),
            target_ref_name: "refs/heads/main".to_string(),
            url: "https://dev.azure.com/org/_apis/git/pullRequests/9".to_string(),
            repository: Some(AzurePrRepo {
                web_url: Some("https://dev.azure.com/org/proj/_git/repo".to_string()),
            }),
            creation_date: None,
            last_merge_source_commit: None,
        };
        let pr = Pr::from(raw);
        assert_eq!(pr.url, "https://dev.azure.com/org/proj/_git/repo/pullrequest/9");
        assert!(pr.is_draft);
    }

    #[test]
    fn policy_scopes_match_repository_and_ref() {
        let settings = json!({
            "statusName": "ci/build",
            "scope": [{
                "repositoryId": "abc-123",
                "refName": "refs/heads/main",
            }],
        });
        assert!(policy_applies(&settings, Some("abc-123"), "refs/heads/main"));
        assert!(!policy_applies(&settings, Some("abc-123"), "refs/heads/dev"));
        assert!(!policy_applies(&settings, Some("other"), "refs/heads/main"));
    }

    #[test]
    fn project_wide_policy_scopes_cover_every_repository() {
        let settings = json!({ "scope": [{ "refName": "refs/heads/main" }] });
        assert!(policy_applies(&settings, Some("any"), "refs/heads/main"));
        let branch_wide = json!({ "scope": [{ "repositoryId": "abc-123" }] });
        assert!(policy_applies(&branch_wide, Some("abc-123"), "refs/heads/anything"));
        let no_scope = json!({});
        assert!(!policy_applies(&no_scope, Some("abc-123"), "refs/heads/main"));
    }
}
