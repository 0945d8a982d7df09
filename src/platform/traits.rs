//! platform::traits
//!
//! The driver abstraction every hosting platform implements.
//!
//! # Design
//!
//! A driver is constructed from a [`PlatformConfig`](super::PlatformConfig)
//! without touching the network; the first I/O happens in
//! [`authenticate`](Platform::authenticate). Drivers are immutable after
//! construction and safe to share across tasks, which is what lets the
//! active-platform holder swap them atomically behind an `Arc`.
//!
//! Repository-scoped operations take the repository path on every call
//! rather than binding it at construction, so one authenticated driver can
//! serve any repository the credentials reach.

use async_trait::async_trait;

use super::error::PlatformError;
use super::id::PlatformId;
use super::types::{
    BranchProtection, BranchStatusRequest, CreatePrRequest, EnsureCommentRequest, MergePrRequest,
    PlatformSession, Pr, RepoInfo, UpdatePrRequest,
};

/// A platform driver: one hosting service spoken through a uniform surface.
///
/// Every method maps to one capability in the contract the registry
/// validates. Implementations translate between normalized request/response
/// types and the service's own wire format, and map service failures onto
/// [`PlatformError`].
#[async_trait]
pub trait Platform: Send + Sync {
    /// Identifier of the platform this driver speaks to.
    fn id(&self) -> PlatformId;

    /// Probe the configured credentials against the service.
    ///
    /// On success, reports the resolved endpoint, the authenticated user,
    /// and optionally an author identity the platform suggests for commits.
    ///
    /// # Errors
    ///
    /// [`PlatformError::AuthFailed`] when the service rejects the
    /// credentials; transport failures surface as
    /// [`PlatformError::Network`].
    async fn authenticate(&self) -> Result<PlatformSession, PlatformError>;

    /// Fetch metadata for a repository.
    async fn repo_info(&self, repo: &str) -> Result<RepoInfo, PlatformError>;

    /// Open a change request and return its normalized form.
    async fn create_pr(&self, request: CreatePrRequest) -> Result<Pr, PlatformError>;

    /// Update an existing change request. `None` fields stay untouched.
    async fn update_pr(&self, request: UpdatePrRequest) -> Result<Pr, PlatformError>;

    /// Merge a change request with the given strategy.
    async fn merge_pr(&self, request: MergePrRequest) -> Result<(), PlatformError>;

    /// Add or update the comment occupying the request's topic slot.
    ///
    /// Idempotent: an existing comment with the desired body is left alone.
    async fn ensure_comment(&self, request: EnsureCommentRequest) -> Result<(), PlatformError>;

    /// Publish a commit status for a head SHA.
    async fn set_branch_status(&self, request: BranchStatusRequest) -> Result<(), PlatformError>;

    /// Report the protection state of a branch.
    ///
    /// An unprotected branch is a normal answer, not an error, even when the
    /// service models it as a missing resource.
    async fn branch_protection(
        &self,
        repo: &str,
        branch: &str,
    ) -> Result<BranchProtection, PlatformError>;
}
