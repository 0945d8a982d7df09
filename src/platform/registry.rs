//! platform::registry
//!
//! The driver table: compile-time registrations, load-time validation.
//!
//! # Design
//!
//! Drivers register statically: each entry pairs a [`PlatformId`] with a
//! plain constructor function pointer, so the full set of platforms is
//! known at compile time and nothing is discovered at runtime. Building a
//! registry validates every registration against the capability contract
//! and rejects duplicates; an invalid table never becomes a registry, so
//! resolution can assume every entry it holds is conformant.
//!
//! The built-in table is materialized lazily and shared process-wide.
//! Callers embedding their own drivers build a registry from their own
//! registrations and hand it to a
//! [`PlatformContext`](super::PlatformContext).
//!
//! # Example
//!
//! ```
//! use omniforge::platform::{DriverRegistry, PlatformId};
//!
//! let registry = DriverRegistry::builtin();
//! assert!(registry.contains(PlatformId::Github));
//! assert!(registry.resolve(Some("gitea")).is_ok());
//! assert!(registry.resolve(None).is_err());
//! ```

use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;

use super::azure::AzurePlatform;
use super::bitbucket::BitbucketPlatform;
use super::capabilities::Capability;
use super::error::{DriverValidationError, PlatformError};
use super::gitea::GiteaPlatform;
use super::github::GithubPlatform;
use super::gitlab::GitlabPlatform;
use super::id::PlatformId;
use super::traits::Platform;
use super::types::PlatformConfig;

/// Which credential fields of a config a driver consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialShape {
    /// A single token (`token`).
    Token,
    /// Username and password (`username` + `password`).
    Basic,
}

/// Constructor signature: builds an unauthenticated driver from a config
/// without performing any I/O.
pub type DriverBuild = fn(&PlatformConfig) -> Result<Box<dyn Platform>, PlatformError>;

/// One entry of a driver table.
#[derive(Debug, Clone, Copy)]
pub struct DriverRegistration {
    /// Identifier the registry keys this driver under.
    pub id: PlatformId,
    /// Credential shape the driver authenticates with; also decides which
    /// fields the derived host rule carries.
    pub credential: CredentialShape,
    /// Operations the driver declares. Validated against
    /// [`Capability::MANDATORY`].
    pub capabilities: &'static [Capability],
    /// Driver constructor.
    pub build: DriverBuild,
}

fn build_github(config: &PlatformConfig) -> Result<Box<dyn Platform>, PlatformError> {
    Ok(Box::new(GithubPlatform::from_config(config)?))
}

fn build_gitlab(config: &PlatformConfig) -> Result<Box<dyn Platform>, PlatformError> {
    Ok(Box::new(GitlabPlatform::from_config(config)?))
}

fn build_bitbucket(config: &PlatformConfig) -> Result<Box<dyn Platform>, PlatformError> {
    Ok(Box::new(BitbucketPlatform::from_config(config)?))
}

fn build_gitea(config: &PlatformConfig) -> Result<Box<dyn Platform>, PlatformError> {
    Ok(Box::new(GiteaPlatform::from_config(config)?))
}

fn build_azure(config: &PlatformConfig) -> Result<Box<dyn Platform>, PlatformError> {
    Ok(Box::new(AzurePlatform::from_config(config)?))
}

/// The built-in driver table, in registry order.
const BUILTIN: &[DriverRegistration] = &[
    DriverRegistration {
        id: PlatformId::Github,
        credential: CredentialShape::Token,
        capabilities: Capability::MANDATORY,
        build: build_github,
    },
    DriverRegistration {
        id: PlatformId::Gitlab,
        credential: CredentialShape::Token,
        capabilities: Capability::MANDATORY,
        build: build_gitlab,
    },
    DriverRegistration {
        id: PlatformId::Bitbucket,
        credential: CredentialShape::Basic,
        capabilities: Capability::MANDATORY,
        build: build_bitbucket,
    },
    DriverRegistration {
        id: PlatformId::Gitea,
        credential: CredentialShape::Token,
        capabilities: Capability::MANDATORY,
        build: build_gitea,
    },
    DriverRegistration {
        id: PlatformId::Azure,
        credential: CredentialShape::Token,
        capabilities: Capability::MANDATORY,
        build: build_azure,
    },
];

/// Names of the built-in platforms, in registry order.
///
/// Useful for config validation and help text.
pub fn platform_names() -> Vec<&'static str> {
    PlatformId::all().iter().map(|id| id.name()).collect()
}

/// A validated driver table.
///
/// Iteration order is registration order, which keeps error messages and
/// listings deterministic.
#[derive(Debug, Clone)]
pub struct DriverRegistry {
    drivers: IndexMap<PlatformId, DriverRegistration>,
}

impl DriverRegistry {
    /// The shared built-in table, materialized on first use.
    ///
    /// Always returns the same instance; the built-in table is validated
    /// once per process.
    pub fn builtin() -> Arc<DriverRegistry> {
        static BUILTIN_REGISTRY: OnceLock<Arc<DriverRegistry>> = OnceLock::new();
        BUILTIN_REGISTRY
            .get_or_init(|| {
                let registry = DriverRegistry::from_registrations(BUILTIN.iter().copied())
                    .expect("built-in driver table declares the full capability contract");
                Arc::new(registry)
            })
            .clone()
    }

    /// Build a registry from arbitrary registrations.
    ///
    /// # Errors
    ///
    /// [`DriverValidationError::MissingCapability`] when a registration
    /// does not declare the full contract, and
    /// [`DriverValidationError::DuplicateDriver`] when an identifier
    /// appears twice. The first offending registration wins the error.
    pub fn from_registrations(
        registrations: impl IntoIterator<Item = DriverRegistration>,
    ) -> Result<DriverRegistry, DriverValidationError> {
        let mut drivers = IndexMap::new();
        for registration in registrations {
            if let Some(capability) = Capability::missing_from(registration.capabilities)
                .into_iter()
                .next()
            {
                return Err(DriverValidationError::MissingCapability {
                    id: registration.id,
                    capability,
                });
            }
            if drivers.insert(registration.id, registration).is_some() {
                return Err(DriverValidationError::DuplicateDriver {
                    id: registration.id,
                });
            }
        }
        Ok(DriverRegistry { drivers })
    }

    /// Look up a registration by identifier.
    pub fn get(&self, id: PlatformId) -> Option<&DriverRegistration> {
        self.drivers.get(&id)
    }

    /// Whether the registry serves an identifier.
    pub fn contains(&self, id: PlatformId) -> bool {
        self.drivers.contains_key(&id)
    }

    /// Served identifiers, in registration order.
    pub fn ids(&self) -> impl Iterator<Item = PlatformId> + '_ {
        self.drivers.keys().copied()
    }

    /// All registrations, in registration order.
    pub fn registrations(&self) -> impl Iterator<Item = &DriverRegistration> {
        self.drivers.values()
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    /// Resolve a config's platform name to a registration.
    ///
    /// # Errors
    ///
    /// [`PlatformError::PlatformNotFound`] when the name is absent, empty,
    /// or not served here. The message names the platforms this registry
    /// knows, so a typo is a one-glance fix.
    pub fn resolve(&self, name: Option<&str>) -> Result<&DriverRegistration, PlatformError> {
        let name = name.unwrap_or("").trim();
        if name.is_empty() {
            return Err(PlatformError::PlatformNotFound(format!(
                "no platform configured (set `platform` to one of: {})",
                self.known_names()
            )));
        }
        PlatformId::parse(name)
            .and_then(|id| self.drivers.get(&id))
            .ok_or_else(|| {
                PlatformError::PlatformNotFound(format!(
                    "unknown platform '{name}' (known platforms: {})",
                    self.known_names()
                ))
            })
    }

    fn known_names(&self) -> String {
        let names: Vec<&str> = self.ids().map(|id| id.name()).collect();
        if names.is_empty() {
            "none".to_string()
        } else {
            names.join(", ")
        }
    }
}
