//! Integration tests for driver registration and resolution.
//!
//! These tests exercise the public registry surface the way an embedder
//! would: building registries from custom registrations, sharing one
//! registry between contexts, and switching the active platform between
//! differently-identified drivers.

use std::sync::Arc;

use omniforge::platform::mock::MockPlatform;
use omniforge::platform::{
    platform_names, Capability, CredentialShape, DriverRegistration, DriverRegistry,
    DriverValidationError, Platform, PlatformConfig, PlatformContext, PlatformError, PlatformId,
};

fn build_mock_github(_config: &PlatformConfig) -> Result<Box<dyn Platform>, PlatformError> {
    Ok(Box::new(MockPlatform::new(PlatformId::Github)))
}

fn build_mock_gitea(_config: &PlatformConfig) -> Result<Box<dyn Platform>, PlatformError> {
    Ok(Box::new(MockPlatform::new(PlatformId::Gitea)))
}

fn registration(id: PlatformId, build: omniforge::platform::DriverBuild) -> DriverRegistration {
    DriverRegistration {
        id,
        credential: CredentialShape::Token,
        capabilities: Capability::MANDATORY,
        build,
    }
}

fn two_driver_registry() -> Arc<DriverRegistry> {
    let registry = DriverRegistry::from_registrations([
        registration(PlatformId::Github, build_mock_github),
        registration(PlatformId::Gitea, build_mock_gitea),
    ])
    .unwrap();
    Arc::new(registry)
}

fn config(platform: &str) -> PlatformConfig {
    PlatformConfig {
        platform: Some(platform.to_string()),
        token: Some("sometoken".to_string()),
        ..Default::default()
    }
}

mod custom_registrations {
    use super::*;

    #[tokio::test]
    async fn a_context_switches_between_registered_platforms() {
        let context = PlatformContext::with_registry(two_driver_registry());

        let record = context.init_platform(config("github")).await.unwrap();
        assert_eq!(record.platform, PlatformId::Github);
        assert_eq!(context.active().unwrap().id(), PlatformId::Github);
        assert_eq!(record.host_rules[0].host_type, "github");

        let record = context.init_platform(config("gitea")).await.unwrap();
        assert_eq!(record.platform, PlatformId::Gitea);
        assert_eq!(context.active().unwrap().id(), PlatformId::Gitea);
        assert_eq!(record.host_rules[0].host_type, "gitea");
    }

    #[tokio::test]
    async fn contexts_over_one_registry_stay_independent() {
        let registry = two_driver_registry();
        let first = PlatformContext::with_registry(registry.clone());
        let second = PlatformContext::with_registry(registry);

        first.init_platform(config("github")).await.unwrap();
        assert!(first.is_initialized());
        assert!(!second.is_initialized());

        second.init_platform(config("gitea")).await.unwrap();
        assert_eq!(first.active().unwrap().id(), PlatformId::Github);
        assert_eq!(second.active().unwrap().id(), PlatformId::Gitea);
    }

    #[tokio::test]
    async fn a_narrowed_registry_hides_builtin_platforms() {
        let context = PlatformContext::with_registry(two_driver_registry());
        let err = context.init_platform(config("bitbucket")).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("bitbucket"), "{message}");
        assert!(message.contains("github, gitea"), "{message}");
    }
}

mod validation_surface {
    use super::*;

    #[test]
    fn missing_capabilities_are_reported_by_operation_name() {
        const PARTIAL: &[Capability] = &[
            Capability::Authenticate,
            Capability::RepoInfo,
            Capability::CreatePr,
            Capability::UpdatePr,
            Capability::MergePr,
            Capability::EnsureComment,
            Capability::SetBranchStatus,
        ];
        let err = DriverRegistry::from_registrations([DriverRegistration {
            id: PlatformId::Gitea,
            credential: CredentialShape::Token,
            capabilities: PARTIAL,
            build: build_mock_gitea,
        }])
        .unwrap_err();

        assert_eq!(
            err,
            DriverValidationError::MissingCapability {
                id: PlatformId::Gitea,
                capability: Capability::BranchProtection,
            }
        );
        assert_eq!(
            err.to_string(),
            "driver 'gitea' does not declare mandatory capability 'branch_protection'"
        );
    }

    #[test]
    fn duplicates_are_reported_by_identifier() {
        let err = DriverRegistry::from_registrations([
            registration(PlatformId::Github, build_mock_github),
            registration(PlatformId::Github, build_mock_github),
        ])
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "driver 'github' is registered more than once"
        );
    }

    #[test]
    fn the_builtin_name_list_matches_the_identifier_set() {
        let names = platform_names();
        assert_eq!(names, vec!["github", "gitlab", "bitbucket", "gitea", "azure"]);
        for (name, id) in names.iter().zip(PlatformId::all()) {
            assert_eq!(*name, id.name());
            assert_eq!(PlatformId::parse(name), Some(*id));
        }
    }
}
