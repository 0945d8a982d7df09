//! platform
//!
//! Abstraction for code hosting platforms (GitHub, GitLab, Bitbucket
//! Cloud, Gitea, Azure DevOps).
//!
//! # Architecture
//!
//! The [`Platform`] trait defines the operations every driver supports.
//! Drivers are registered in a [`DriverRegistry`], which is validated at
//! construction: a driver that does not declare the full capability
//! contract never becomes resolvable. Programs typically do not touch
//! drivers directly; they initialize a [`PlatformContext`] from a
//! [`PlatformConfig`] and dispatch operations through it.
//!
//! Initialization resolves the configured platform name, constructs the
//! driver, authenticates, and normalizes the result into an
//! [`InitializedPlatform`] record (canonical endpoint, effective git
//! author, derived host rules). Only a fully successful initialization
//! changes which platform is active.
//!
//! # Modules
//!
//! - `traits`: the [`Platform`] trait
//! - `types`: config, records, and request/response types
//! - `registry`: driver registration and name resolution
//! - `context`: initialization pipeline and the active-platform holder
//! - `client`: shared authenticated HTTP plumbing for the REST drivers
//! - [`github`], [`gitlab`], [`bitbucket`], [`gitea`], [`azure`]: drivers
//! - [`mock`]: in-memory driver for deterministic testing
//!
//! # Example
//!
//! ```ignore
//! use omniforge::platform::{CreatePrRequest, PlatformConfig, PlatformContext};
//!
//! let config = PlatformConfig {
//!     platform: Some("github".to_string()),
//!     token: Some(token),
//!     ..Default::default()
//! };
//!
//! let context = PlatformContext::new();
//! let record = context.init_platform(config).await?;
//! println!("active platform endpoint: {}", record.endpoint);
//!
//! let pr = context
//!     .create_pr(CreatePrRequest {
//!         repo: "owner/repo".to_string(),
//!         head: "feature".to_string(),
//!         base: "main".to_string(),
//!         title: "Add feature".to_string(),
//!         body: None,
//!         draft: false,
//!     })
//!     .await?;
//! println!("created PR #{}: {}", pr.number, pr.url);
//! ```

pub mod azure;
pub mod bitbucket;
mod capabilities;
mod client;
mod context;
mod error;
pub mod gitea;
pub mod github;
pub mod gitlab;
mod hostrules;
mod id;
pub mod mock;
mod registry;
mod traits;
mod types;

pub use capabilities::Capability;
pub use context::{ActivePlatform, PlatformContext};
pub use error::{DriverValidationError, PlatformError};
pub use hostrules::HostRule;
pub use id::PlatformId;
pub use registry::{
    platform_names, CredentialShape, DriverBuild, DriverRegistration, DriverRegistry,
};
pub use traits::Platform;
pub use types::*;
