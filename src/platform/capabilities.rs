//! platform::capabilities
//!
//! The capability contract drivers are validated against.
//!
//! Every driver registration declares the operations its driver implements.
//! Registry construction checks the declared set against [`Capability::MANDATORY`]
//! and refuses the whole table when anything is missing, so a registry that
//! exists at all only hands out conforming drivers. A capability is binary:
//! declared or not, with no partial states.

/// One operation of the driver capability contract.
///
/// # Example
///
/// ```
/// use omniforge::platform::Capability;
///
/// assert!(Capability::MANDATORY.contains(&Capability::CreatePr));
/// assert_eq!(Capability::missing_from(Capability::MANDATORY), vec![]);
/// assert_eq!(
///     Capability::missing_from(&[Capability::Authenticate]).len(),
///     Capability::MANDATORY.len() - 1,
/// );
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Probe the configured credentials and report a session.
    Authenticate,
    /// Fetch repository metadata.
    RepoInfo,
    /// Open a change request.
    CreatePr,
    /// Update an existing change request.
    UpdatePr,
    /// Merge a change request.
    MergePr,
    /// Add or update a keyed change-request comment.
    EnsureComment,
    /// Publish a commit status for a head SHA.
    SetBranchStatus,
    /// Report branch protection state.
    BranchProtection,
}

impl Capability {
    /// The full contract. Every registered driver must declare all of these.
    pub const MANDATORY: &'static [Capability] = &[
        Capability::Authenticate,
        Capability::RepoInfo,
        Capability::CreatePr,
        Capability::UpdatePr,
        Capability::MergePr,
        Capability::EnsureComment,
        Capability::SetBranchStatus,
        Capability::BranchProtection,
    ];

    /// Mandatory capabilities absent from a declared set, in contract order.
    ///
    /// Returns an empty vec when the declaration conforms.
    pub fn missing_from(declared: &[Capability]) -> Vec<Capability> {
        Capability::MANDATORY
            .iter()
            .filter(|required| !declared.contains(required))
            .copied()
            .collect()
    }

    /// The operation name used in validation errors.
    pub fn name(&self) -> &'static str {
        match self {
            Capability::Authenticate => "authenticate",
            Capability::RepoInfo => "repo_info",
            Capability::CreatePr => "create_pr",
            Capability::UpdatePr => "update_pr",
            Capability::MergePr => "merge_pr",
            Capability::EnsureComment => "ensure_comment",
            Capability::SetBranchStatus => "set_branch_status",
            Capability::BranchProtection => "branch_protection",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
