//! platform::error
//!
//! Error taxonomy for platform resolution, initialization, and dispatch.
//!
//! Two families live here. [`PlatformError`] covers everything a caller can
//! hit at runtime, from a config naming no usable driver through remote API
//! failures. [`DriverValidationError`] covers load-time driver table
//! validation; those are fatal because a registry is either fully validated
//! or never constructed.

use thiserror::Error;

use super::capabilities::Capability;
use super::id::PlatformId;

/// Errors surfaced by platform initialization and capability operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    /// The config names no platform, or names one the registry does not
    /// serve. Raised before any network traffic.
    #[error("platform not found: {0}")]
    PlatformNotFound(String),

    /// A capability operation was invoked before any successful
    /// initialization.
    #[error("no active platform: initialize a platform before dispatching operations")]
    NoPlatformSelected,

    /// The selected driver needs a credential the config does not carry.
    #[error("authentication required: {0}")]
    AuthRequired(String),

    /// The service rejected the configured credentials.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The requested resource does not exist (or is invisible to the
    /// authenticated user).
    #[error("not found: {0}")]
    NotFound(String),

    /// The service is throttling this client.
    #[error("rate limited by the platform API")]
    RateLimited,

    /// Any other remote API failure.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Connection-level failure before an HTTP status was received.
    #[error("network error: {0}")]
    Network(String),

    /// The service has no way to perform the requested operation (for
    /// example reopening a declined Bitbucket pull request).
    #[error("unsupported on {platform}: {operation}")]
    Unsupported {
        platform: PlatformId,
        operation: String,
    },

    /// The config cannot construct the selected driver (for example Azure
    /// DevOps without an explicit organization endpoint).
    #[error("invalid platform config: {0}")]
    InvalidConfig(String),

    /// A driver reported an endpoint that is not an absolute URL with a host.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// The effective git author string matches no recognized author form.
    #[error("invalid git author: {0}")]
    InvalidGitAuthor(String),
}

impl PlatformError {
    /// True for failures that re-entering credentials could fix.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            PlatformError::AuthRequired(_) | PlatformError::AuthFailed(_)
        )
    }

    /// True for failures worth retrying without config changes.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PlatformError::Network(_) | PlatformError::RateLimited
        )
    }
}

impl From<reqwest::Error> for PlatformError {
    fn from(err: reqwest::Error) -> Self {
        PlatformError::Network(err.to_string())
    }
}

/// Load-time failures while building a driver registry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DriverValidationError {
    /// A registration does not declare a mandatory capability.
    #[error("driver '{id}' does not declare mandatory capability '{capability}'")]
    MissingCapability {
        id: PlatformId,
        capability: Capability,
    },

    /// Two registrations share one platform identifier.
    #[error("driver '{id}' is registered more than once")]
    DuplicateDriver { id: PlatformId },
}
