//! platform::id
//!
//! Identifiers for the built-in platform drivers.

use serde::{Deserialize, Serialize};

/// Identifier of a hosting platform known to this crate.
///
/// The identifier doubles as the registry key and as the `hostType` value
/// written into normalized host rules, so its string form is stable.
///
/// # Example
///
/// ```
/// use omniforge::platform::PlatformId;
///
/// assert_eq!(PlatformId::parse("github"), Some(PlatformId::Github));
/// assert_eq!(PlatformId::parse("GitLab"), Some(PlatformId::Gitlab));
/// assert_eq!(PlatformId::parse("sourcehut"), None);
/// assert_eq!(PlatformId::Bitbucket.name(), "bitbucket");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformId {
    /// GitHub (github.com or GitHub Enterprise Server).
    Github,
    /// GitLab (gitlab.com or self-managed).
    Gitlab,
    /// Bitbucket Cloud.
    Bitbucket,
    /// Gitea (and compatible forks).
    Gitea,
    /// Azure DevOps.
    Azure,
}

impl PlatformId {
    /// All identifiers, in registry order.
    pub fn all() -> &'static [PlatformId] {
        &[
            PlatformId::Github,
            PlatformId::Gitlab,
            PlatformId::Bitbucket,
            PlatformId::Gitea,
            PlatformId::Azure,
        ]
    }

    /// The stable string form used in configs and host rules.
    pub fn name(&self) -> &'static str {
        match self {
            PlatformId::Github => "github",
            PlatformId::Gitlab => "gitlab",
            PlatformId::Bitbucket => "bitbucket",
            PlatformId::Gitea => "gitea",
            PlatformId::Azure => "azure",
        }
    }

    /// Parse an identifier from its string form, case-insensitively.
    ///
    /// Returns `None` for unknown names; the caller owns the error message
    /// because only it knows which names its registry actually serves.
    pub fn parse(value: &str) -> Option<PlatformId> {
        match value.trim().to_lowercase().as_str() {
            "github" => Some(PlatformId::Github),
            "gitlab" => Some(PlatformId::Gitlab),
            "bitbucket" => Some(PlatformId::Bitbucket),
            "gitea" => Some(PlatformId::Gitea),
            "azure" => Some(PlatformId::Azure),
            _ => None,
        }
    }
}

impl std::fmt::Display for PlatformId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
