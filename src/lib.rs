//! Omniforge - A platform layer for code hosting services
//!
//! Omniforge gives host automation tools one interface to GitHub, GitLab,
//! Bitbucket Cloud, Gitea, and Azure DevOps: selecting a platform by name,
//! authenticating against it, and dispatching repository operations
//! (pull requests, comments, commit statuses, branch protection) through
//! a single active driver.
//!
//! # Architecture
//!
//! - [`platform`] - Driver registry, initialization pipeline, the
//!   active-platform holder, and the per-service drivers
//! - [`gitauthor`] - Parsing and sanitizing free-text git author strings
//!
//! # Correctness Invariants
//!
//! Omniforge maintains the following invariants:
//!
//! 1. Every resolvable driver declares the full capability contract
//! 2. No network traffic happens before a driver is resolved and built
//! 3. Only a fully successful initialization changes the active platform
//! 4. The active driver and its initialization record swap atomically

pub mod gitauthor;
pub mod platform;
