//! platform::context
//!
//! Platform initialization and the active-platform holder.
//!
//! # Design
//!
//! Initialization is a short pipeline: resolve the config's platform name
//! against the registry, construct the driver (no I/O), let the driver
//! authenticate, then normalize the outcome into an
//! [`InitializedPlatform`] record. Only a fully successful pipeline
//! publishes anything; every failure leaves the previously active platform
//! untouched.
//!
//! The holder pairs the authenticated driver with its record in one
//! [`ActivePlatform`] value behind an `Arc`, so a reader can never observe
//! a driver from one initialization next to a record from another. When
//! initializations race, each carries a monotonically increasing attempt
//! ticket and a completed attempt never overwrites a later one; the
//! superseded caller still gets its own record back, it just does not
//! become active.
//!
//! Most programs want exactly one active platform per process and can use
//! [`PlatformContext::global`]. Embedders and tests build their own
//! contexts, optionally over their own registries.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info};
use url::Url;

use crate::gitauthor::parse_git_author;

use super::error::PlatformError;
use super::hostrules::{self, HostRule};
use super::id::PlatformId;
use super::registry::{DriverRegistration, DriverRegistry};
use super::traits::Platform;
use super::types::{
    BranchProtection, BranchStatusRequest, CreatePrRequest, EnsureCommentRequest,
    InitializedPlatform, MergePrRequest, PlatformConfig, PlatformSession, Pr, RepoInfo,
    UpdatePrRequest,
};

/// An authenticated driver paired with the record its initialization
/// produced.
///
/// Snapshots are immutable: a handle obtained before a re-initialization
/// keeps answering with its original driver and record.
pub struct ActivePlatform {
    driver: Arc<dyn Platform>,
    init: InitializedPlatform,
    attempt: u64,
}

impl ActivePlatform {
    /// The authenticated driver.
    pub fn driver(&self) -> &dyn Platform {
        self.driver.as_ref()
    }

    /// The normalized initialization record.
    pub fn init(&self) -> &InitializedPlatform {
        &self.init
    }

    /// Which platform this snapshot serves.
    pub fn id(&self) -> PlatformId {
        self.init.platform
    }
}

impl fmt::Debug for ActivePlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivePlatform")
            .field("platform", &self.init.platform)
            .field("endpoint", &self.init.endpoint)
            .field("attempt", &self.attempt)
            .finish_non_exhaustive()
    }
}

/// Owner of the active platform for one scope (usually the process).
#[derive(Debug)]
pub struct PlatformContext {
    registry: Arc<DriverRegistry>,
    active: RwLock<Option<Arc<ActivePlatform>>>,
    attempts: AtomicU64,
}

impl PlatformContext {
    /// A context over the built-in driver table.
    pub fn new() -> Self {
        Self::with_registry(DriverRegistry::builtin())
    }

    /// A context over a caller-supplied (already validated) registry.
    pub fn with_registry(registry: Arc<DriverRegistry>) -> Self {
        Self {
            registry,
            active: RwLock::new(None),
            attempts: AtomicU64::new(0),
        }
    }

    /// The process-wide context over the built-in table.
    ///
    /// This is the one deliberate singleton in the crate, for programs
    /// where "the platform" is process-global state. Everything it offers
    /// works identically on an owned [`PlatformContext`].
    pub fn global() -> &'static PlatformContext {
        static GLOBAL: std::sync::OnceLock<PlatformContext> = std::sync::OnceLock::new();
        GLOBAL.get_or_init(PlatformContext::new)
    }

    /// The registry this context resolves against.
    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    /// Whether any initialization has succeeded here.
    pub fn is_initialized(&self) -> bool {
        self.read_active().is_some()
    }

    /// Snapshot of the active platform.
    ///
    /// # Errors
    ///
    /// [`PlatformError::NoPlatformSelected`] before the first successful
    /// initialization.
    pub fn active(&self) -> Result<Arc<ActivePlatform>, PlatformError> {
        self.read_active().ok_or(PlatformError::NoPlatformSelected)
    }

    /// Initialize the platform named by `config` and make it active.
    ///
    /// The pipeline is resolve, construct, authenticate, normalize; no
    /// network traffic happens before a driver has been resolved and
    /// constructed. On success the returned record is also published as
    /// the active platform, unless a later-started initialization has
    /// already published (the record is still returned).
    ///
    /// # Errors
    ///
    /// [`PlatformError::PlatformNotFound`] for an absent or unknown
    /// platform name; construction and authentication failures propagate
    /// from the driver; [`PlatformError::InvalidGitAuthor`] when the
    /// effective author string is unusable.
    pub async fn init_platform(
        &self,
        config: PlatformConfig,
    ) -> Result<InitializedPlatform, PlatformError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;

        let registration = *self.registry.resolve(config.platform.as_deref())?;
        debug!(platform = %registration.id, attempt, "resolved platform driver");

        let driver: Arc<dyn Platform> = Arc::from((registration.build)(&config)?);

        debug!(platform = %registration.id, "authenticating against platform");
        let session = driver.authenticate().await?;

        let init = normalize(&registration, &config, session)?;
        if self.publish(driver, init.clone(), attempt) {
            info!(
                platform = %init.platform,
                endpoint = %init.endpoint,
                "platform initialized"
            );
        } else {
            debug!(
                platform = %init.platform,
                attempt,
                "initialization superseded by a later attempt"
            );
        }
        Ok(init)
    }

    /// Authenticate through the active platform.
    pub async fn authenticate(&self) -> Result<PlatformSession, PlatformError> {
        let active = self.active()?;
        active.driver().authenticate().await
    }

    /// Fetch repository metadata through the active platform.
    pub async fn repo_info(&self, repo: &str) -> Result<RepoInfo, PlatformError> {
        let active = self.active()?;
        active.driver().repo_info(repo).await
    }

    /// Open a change request through the active platform.
    pub async fn create_pr(&self, request: CreatePrRequest) -> Result<Pr, PlatformError> {
        let active = self.active()?;
        active.driver().create_pr(request).await
    }

    /// Update a change request through the active platform.
    pub async fn update_pr(&self, request: UpdatePrRequest) -> Result<Pr, PlatformError> {
        let active = self.active()?;
        active.driver().update_pr(request).await
    }

    /// Merge a change request through the active platform.
    pub async fn merge_pr(&self, request: MergePrRequest) -> Result<(), PlatformError> {
        let active = self.active()?;
        active.driver().merge_pr(request).await
    }

    /// Add or update a keyed comment through the active platform.
    pub async fn ensure_comment(&self, request: EnsureCommentRequest) -> Result<(), PlatformError> {
        let active = self.active()?;
        active.driver().ensure_comment(request).await
    }

    /// Publish a commit status through the active platform.
    pub async fn set_branch_status(
        &self,
        request: BranchStatusRequest,
    ) -> Result<(), PlatformError> {
        let active = self.active()?;
        active.driver().set_branch_status(request).await
    }

    /// Report branch protection through the active platform.
    pub async fn branch_protection(
        &self,
        repo: &str,
        branch: &str,
    ) -> Result<BranchProtection, PlatformError> {
        let active = self.active()?;
        active.driver().branch_protection(repo, branch).await
    }

    fn read_active(&self) -> Option<Arc<ActivePlatform>> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap in a completed initialization unless a later attempt already
    /// published. Returns whether the swap happened.
    fn publish(&self, driver: Arc<dyn Platform>, init: InitializedPlatform, attempt: u64) -> bool {
        let mut guard = self.active.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = guard.as_ref() {
            if current.attempt > attempt {
                return false;
            }
        }
        *guard = Some(Arc::new(ActivePlatform {
            driver,
            init,
            attempt,
        }));
        true
    }
}

impl Default for PlatformContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Turn a raw session into the normalized initialization record.
fn normalize(
    registration: &DriverRegistration,
    config: &PlatformConfig,
    session: PlatformSession,
) -> Result<InitializedPlatform, PlatformError> {
    let (endpoint, match_host) = normalize_endpoint(&session.endpoint)?;

    // Config-supplied author wins over whatever the platform suggests.
    let git_author = config.git_author.clone().or(session.git_author);
    if let Some(raw) = git_author.as_deref() {
        if parse_git_author(Some(raw)).is_none() {
            return Err(PlatformError::InvalidGitAuthor(raw.to_string()));
        }
    }

    let mut host_rules = config.host_rules.clone();
    host_rules.push(HostRule::for_platform(
        registration.id,
        registration.credential,
        config,
        match_host,
    ));

    Ok(InitializedPlatform {
        endpoint,
        git_author,
        host_rules: hostrules::dedupe(host_rules),
        platform: registration.id,
    })
}

/// Normalize an endpoint to its trailing-slash form and extract the host
/// for the derived rule.
fn normalize_endpoint(raw: &str) -> Result<(String, String), PlatformError> {
    let parsed = Url::parse(raw).map_err(|_| PlatformError::InvalidEndpoint(raw.to_string()))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| PlatformError::InvalidEndpoint(raw.to_string()))?
        .to_string();
    let mut endpoint = parsed.to_string();
    if !endpoint.ends_with('/') {
        endpoint.push('/');
    }
    Ok((endpoint, host))
}
