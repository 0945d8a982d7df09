//! platform::mock
//!
//! In-memory platform driver for deterministic testing.
//!
//! # Design
//!
//! The mock keeps its whole world (session, repositories, change requests,
//! comments, statuses, protections) behind one `Arc<Mutex<...>>`, records
//! every operation for later verification, and can be armed to fail any
//! single capability with a chosen error. Clones share state, so a test can
//! keep a handle while the driver itself is boxed into a registry or
//! context.
//!
//! # Example
//!
//! ```
//! use omniforge::platform::mock::MockPlatform;
//! use omniforge::platform::{CreatePrRequest, Platform, PlatformId, PrState};
//!
//! # tokio_test::block_on(async {
//! let platform = MockPlatform::new(PlatformId::Github);
//!
//! let pr = platform
//!     .create_pr(CreatePrRequest {
//!         repo: "owner/repo".to_string(),
//!         head: "feature".to_string(),
//!         base: "main".to_string(),
//!         title: "Add feature".to_string(),
//!         body: None,
//!         draft: false,
//!     })
//!     .await
//!     .unwrap();
//!
//! assert_eq!(pr.number, 1);
//! assert_eq!(pr.state, PrState::Open);
//! assert_eq!(platform.pr(1).unwrap().title, "Add feature");
//! # });
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::capabilities::Capability;
use super::error::PlatformError;
use super::id::PlatformId;
use super::traits::Platform;
use super::types::{
    BranchProtection, BranchStatusRequest, BranchStatusState, CreatePrRequest,
    EnsureCommentRequest, MergeMethod, MergePrRequest, PlatformSession, Pr, PrState,
    PrTargetState, RepoInfo, UpdatePrRequest,
};

/// Mock platform driver.
///
/// Thread-safe; clones share state.
#[derive(Debug, Clone)]
pub struct MockPlatform {
    id: PlatformId,
    inner: Arc<Mutex<MockPlatformInner>>,
}

/// Internal mutable state.
#[derive(Debug)]
struct MockPlatformInner {
    session: PlatformSession,
    repos: HashMap<String, RepoInfo>,
    prs: HashMap<u64, Pr>,
    comments: HashMap<u64, Vec<String>>,
    statuses: Vec<BranchStatusRequest>,
    protections: HashMap<(String, String), BranchProtection>,
    next_pr_number: u64,
    fail_on: Option<FailOn>,
    operations: Vec<MockOperation>,
}

/// Armed failure: one capability answers with the given error.
#[derive(Debug, Clone)]
struct FailOn {
    capability: Capability,
    error: PlatformError,
}

/// Recorded operation for test verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOperation {
    Authenticate,
    RepoInfo {
        repo: String,
    },
    CreatePr {
        repo: String,
        head: String,
        base: String,
        title: String,
    },
    UpdatePr {
        repo: String,
        number: u64,
    },
    MergePr {
        repo: String,
        number: u64,
        method: MergeMethod,
    },
    EnsureComment {
        repo: String,
        number: u64,
        topic: Option<String>,
    },
    SetBranchStatus {
        repo: String,
        sha: String,
        context: String,
        state: BranchStatusState,
    },
    BranchProtection {
        repo: String,
        branch: String,
    },
}

impl MockPlatform {
    /// Create a mock that identifies as the given platform.
    ///
    /// The default session reports `https://mock.example.com` as endpoint
    /// and `mock-user` as the authenticated user.
    pub fn new(id: PlatformId) -> Self {
        Self {
            id,
            inner: Arc::new(Mutex::new(MockPlatformInner {
                session: PlatformSession {
                    endpoint: "https://mock.example.com".to_string(),
                    user: Some("mock-user".to_string()),
                    git_author: None,
                },
                repos: HashMap::new(),
                prs: HashMap::new(),
                comments: HashMap::new(),
                statuses: Vec::new(),
                protections: HashMap::new(),
                next_pr_number: 1,
                fail_on: None,
                operations: Vec::new(),
            })),
        }
    }

    /// Replace the session reported by `authenticate`.
    pub fn with_session(self, session: PlatformSession) -> Self {
        self.inner.lock().unwrap().session = session;
        self
    }

    /// Seed a repository, keyed by its `full_name`.
    pub fn with_repo(self, repo: RepoInfo) -> Self {
        self.inner
            .lock()
            .unwrap()
            .repos
            .insert(repo.full_name.clone(), repo);
        self
    }

    /// Seed pre-existing change requests.
    pub fn with_prs(self, prs: Vec<Pr>) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            let max_number = prs.iter().map(|pr| pr.number).max().unwrap_or(0);
            inner.next_pr_number = max_number + 1;
            inner.prs = prs.into_iter().map(|pr| (pr.number, pr)).collect();
        }
        self
    }

    /// Seed a branch protection answer.
    pub fn with_protection(self, repo: &str, branch: &str, protection: BranchProtection) -> Self {
        self.inner
            .lock()
            .unwrap()
            .protections
            .insert((repo.to_string(), branch.to_string()), protection);
        self
    }

    /// Arm one capability to fail with the given error.
    pub fn fail_on(self, capability: Capability, error: PlatformError) -> Self {
        self.inner.lock().unwrap().fail_on = Some(FailOn { capability, error });
        self
    }

    /// Disarm the failure configuration.
    pub fn clear_fail_on(&self) {
        self.inner.lock().unwrap().fail_on = None;
    }

    /// All recorded operations, including ones that were armed to fail.
    pub fn operations(&self) -> Vec<MockOperation> {
        self.inner.lock().unwrap().operations.clone()
    }

    /// Forget recorded operations.
    pub fn clear_operations(&self) {
        self.inner.lock().unwrap().operations.clear();
    }

    /// Look up a change request without going through the trait.
    pub fn pr(&self, number: u64) -> Option<Pr> {
        self.inner.lock().unwrap().prs.get(&number).cloned()
    }

    /// Number of stored change requests.
    pub fn pr_count(&self) -> usize {
        self.inner.lock().unwrap().prs.len()
    }

    /// Comment bodies stored for a change request, in insertion order.
    pub fn comments(&self, number: u64) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .comments
            .get(&number)
            .cloned()
            .unwrap_or_default()
    }

    /// All published statuses, in publication order.
    pub fn statuses(&self) -> Vec<BranchStatusRequest> {
        self.inner.lock().unwrap().statuses.clone()
    }

    fn record(&self, operation: MockOperation) {
        self.inner.lock().unwrap().operations.push(operation);
    }

    fn check_fail(&self, capability: Capability) -> Result<(), PlatformError> {
        let inner = self.inner.lock().unwrap();
        match &inner.fail_on {
            Some(armed) if armed.capability == capability => Err(armed.error.clone()),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Platform for MockPlatform {
    fn id(&self) -> PlatformId {
        self.id
    }

    async fn authenticate(&self) -> Result<PlatformSession, PlatformError> {
        self.record(MockOperation::Authenticate);
        self.check_fail(Capability::Authenticate)?;
        Ok(self.inner.lock().unwrap().session.clone())
    }

    async fn repo_info(&self, repo: &str) -> Result<RepoInfo, PlatformError> {
        self.record(MockOperation::RepoInfo {
            repo: repo.to_string(),
        });
        self.check_fail(Capability::RepoInfo)?;
        self.inner
            .lock()
            .unwrap()
            .repos
            .get(repo)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("repository {repo}")))
    }

    async fn create_pr(&self, request: CreatePrRequest) -> Result<Pr, PlatformError> {
        self.record(MockOperation::CreatePr {
            repo: request.repo.clone(),
            head: request.head.clone(),
            base: request.base.clone(),
            title: request.title.clone(),
        });
        self.check_fail(Capability::CreatePr)?;

        let mut inner = self.inner.lock().unwrap();
        let number = inner.next_pr_number;
        inner.next_pr_number += 1;
        let pr = Pr {
            number,
            title: request.title,
            state: PrState::Open,
            is_draft: request.draft,
            head: request.head,
            base: request.base,
            url: format!("https://mock.example.com/pr/{number}"),
            created_at: None,
        };
        inner.prs.insert(number, pr.clone());
        Ok(pr)
    }

    async fn update_pr(&self, request: UpdatePrRequest) -> Result<Pr, PlatformError> {
        self.record(MockOperation::UpdatePr {
            repo: request.repo.clone(),
            number: request.number,
        });
        self.check_fail(Capability::UpdatePr)?;

        let mut inner = self.inner.lock().unwrap();
        let pr = inner
            .prs
            .get_mut(&request.number)
            .ok_or_else(|| PlatformError::NotFound(format!("pr {}", request.number)))?;
        if let Some(title) = request.title {
            pr.title = title;
        }
        if let Some(base) = request.base {
            pr.base = base;
        }
        if let Some(state) = request.state {
            pr.state = match state {
                PrTargetState::Open => PrState::Open,
                PrTargetState::Closed => PrState::Closed,
            };
        }
        Ok(pr.clone())
    }

    async fn merge_pr(&self, request: MergePrRequest) -> Result<(), PlatformError> {
        self.record(MockOperation::MergePr {
            repo: request.repo.clone(),
            number: request.number,
            method: request.method,
        });
        self.check_fail(Capability::MergePr)?;

        let mut inner = self.inner.lock().unwrap();
        let pr = inner
            .prs
            .get_mut(&request.number)
            .ok_or_else(|| PlatformError::NotFound(format!("pr {}", request.number)))?;
        pr.state = PrState::Merged;
        Ok(())
    }

    async fn ensure_comment(&self, request: EnsureCommentRequest) -> Result<(), PlatformError> {
        self.record(MockOperation::EnsureComment {
            repo: request.repo.clone(),
            number: request.number,
            topic: request.topic.clone(),
        });
        self.check_fail(Capability::EnsureComment)?;

        let desired = request.render();
        let mut inner = self.inner.lock().unwrap();
        let bodies = inner.comments.entry(request.number).or_default();
        match bodies.iter().position(|body| request.matches(body)) {
            Some(index) if bodies[index] == desired => Ok(()),
            Some(index) => {
                bodies[index] = desired;
                Ok(())
            }
            None => {
                bodies.push(desired);
                Ok(())
            }
        }
    }

    async fn set_branch_status(&self, request: BranchStatusRequest) -> Result<(), PlatformError> {
        self.record(MockOperation::SetBranchStatus {
            repo: request.repo.clone(),
            sha: request.sha.clone(),
            context: request.context.clone(),
            state: request.state,
        });
        self.check_fail(Capability::SetBranchStatus)?;
        self.inner.lock().unwrap().statuses.push(request);
        Ok(())
    }

    async fn branch_protection(
        &self,
        repo: &str,
        branch: &str,
    ) -> Result<BranchProtection, PlatformError> {
        self.record(MockOperation::BranchProtection {
            repo: repo.to_string(),
            branch: branch.to_string(),
        });
        self.check_fail(Capability::BranchProtection)?;
        Ok(self
            .inner
            .lock()
            .unwrap()
            .protections
            .get(&(repo.to_string(), branch.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_request(title: &str) -> CreatePrRequest {
        CreatePrRequest {
            repo: "owner/repo".to_string(),
            head: "feature".to_string(),
            base: "main".to_string(),
            title: title.to_string(),
            body: None,
            draft: false,
        }
    }

    #[tokio::test]
    async fn numbers_are_assigned_sequentially() {
        let platform = MockPlatform::new(PlatformId::Github);
        let first = platform.create_pr(create_request("one")).await.unwrap();
        let second = platform.create_pr(create_request("two")).await.unwrap();
        assert_eq!(first.number, 1);
        assert_eq!(second.number, 2);
        assert_eq!(platform.pr_count(), 2);
    }

    #[tokio::test]
    async fn seeded_prs_set_the_next_number() {
        let seeded = Pr {
            number: 41,
            title: "existing".to_string(),
            state: PrState::Open,
            is_draft: false,
            head: "feature".to_string(),
            base: "main".to_string(),
            url: "https://mock.example.com/pr/41".to_string(),
            created_at: None,
        };
        let platform = MockPlatform::new(PlatformId::Gitea).with_prs(vec![seeded]);
        let pr = platform.create_pr(create_request("next")).await.unwrap();
        assert_eq!(pr.number, 42);
    }

    #[tokio::test]
    async fn armed_capability_fails_and_is_still_recorded() {
        let platform = MockPlatform::new(PlatformId::Github)
            .fail_on(Capability::CreatePr, PlatformError::RateLimited);
        let err = platform.create_pr(create_request("doomed")).await.unwrap_err();
        assert_eq!(err, PlatformError::RateLimited);
        assert_eq!(platform.operations().len(), 1);

        platform.clear_fail_on();
        assert!(platform.create_pr(create_request("fine")).await.is_ok());
    }

    #[tokio::test]
    async fn ensure_comment_updates_in_place() {
        let platform = MockPlatform::new(PlatformId::Gitlab);
        let pr = platform.create_pr(create_request("pr")).await.unwrap();

        let mut request = EnsureCommentRequest {
            repo: "owner/repo".to_string(),
            number: pr.number,
            topic: Some("status".to_string()),
            content: "first".to_string(),
        };
        platform.ensure_comment(request.clone()).await.unwrap();
        request.content = "second".to_string();
        platform.ensure_comment(request.clone()).await.unwrap();
        platform.ensure_comment(request).await.unwrap();

        let comments = platform.comments(pr.number);
        assert_eq!(comments, vec!["### status\n\nsecond".to_string()]);
    }

    #[tokio::test]
    async fn merge_transitions_state() {
        let platform = MockPlatform::new(PlatformId::Bitbucket);
        let pr = platform.create_pr(create_request("pr")).await.unwrap();
        platform
            .merge_pr(MergePrRequest {
                repo: "owner/repo".to_string(),
                number: pr.number,
                method: MergeMethod::Squash,
            })
            .await
            .unwrap();
        assert_eq!(platform.pr(pr.number).unwrap().state, PrState::Merged);
    }

    #[tokio::test]
    async fn unknown_repo_is_not_found() {
        let platform = MockPlatform::new(PlatformId::Azure);
        let err = platform.repo_info("missing/repo").await.unwrap_err();
        assert!(matches!(err, PlatformError::NotFound(_)));
    }
}
