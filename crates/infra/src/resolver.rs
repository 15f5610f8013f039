//! Principal resolver: bearer credential -> authenticated principal.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use platform_auth::{AccessError, AuthenticationError, CredentialError, CredentialVerifier, Principal, validate_claims};

use crate::store::PrincipalDirectory;

#[derive(Clone)]
pub struct PrincipalResolver {
    verifier: Arc<dyn CredentialVerifier>,
    directory: Arc<dyn PrincipalDirectory>,
}

impl PrincipalResolver {
    pub fn new(verifier: Arc<dyn CredentialVerifier>, directory: Arc<dyn PrincipalDirectory>) -> Self {
        Self { verifier, directory }
    }

    pub async fn resolve(&self, credential: &str) -> Result<Principal, AccessError> {
        self.resolve_at(credential, Utc::now()).await
    }

    /// Resolve against an explicit clock.
    ///
    /// - rejected credential or missing subject: `InvalidCredential`
    /// - unknown subject: `PrincipalNotFound`
    /// - deactivated principal: `PrincipalInactive`
    /// - store failure: `Unavailable`
    #[instrument(skip(self, credential), err)]
    pub async fn resolve_at(&self, credential: &str, now: DateTime<Utc>) -> Result<Principal, AccessError> {
        let claims = self.verifier.verify(credential, now).map_err(|e| {
            debug!(error = %e, "credential rejected");
            AuthenticationError::from(e)
        })?;
        validate_claims(&claims, now).map_err(|e| AuthenticationError::from(CredentialError::from(e)))?;
        let subject = claims.subject()?;

        let view = self
            .directory
            .resolve_principal(subject)
            .await?
            .ok_or(AuthenticationError::PrincipalNotFound)?;

        if !view.record.is_active {
            return Err(AuthenticationError::PrincipalInactive.into());
        }

        // A tenantless principal whose role lost global scope holds nothing.
        Principal::new(view.record.id, view.record.tenant_id, view.role, view.global_scope, true)
            .map_err(|_| AccessError::forbidden("principal has no tenant and its role is not global-scope"))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use platform_auth::{CredentialClaims, RoleName};
    use platform_core::PrincipalId;

    use super::*;
    use platform_auth::TenantPredicate;

    use crate::store::{PrincipalDirectory, PrincipalPatch, PrincipalRecord, RbacStore};
    use crate::testing::Fixture;

    /// Accepts tokens of the form `ok:<subject>`; everything else is rejected.
    struct PrefixVerifier;

    impl CredentialVerifier for PrefixVerifier {
        fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<CredentialClaims, CredentialError> {
            let subject = token
                .strip_prefix("ok:")
                .ok_or_else(|| CredentialError::Rejected("bad signature".to_string()))?;
            Ok(CredentialClaims {
                sub: (!subject.is_empty()).then(|| subject.to_string()),
                issued_at: now - Duration::minutes(1),
                expires_at: now + Duration::minutes(5),
            })
        }
    }

    async fn setup() -> (Fixture, PrincipalResolver, PrincipalRecord) {
        let fx = Fixture::seeded().await;
        let role = fx.store.find_role(&RoleName::from_static("USER")).await.unwrap().unwrap();
        let record = PrincipalRecord::new(Some(fx.tenant), "member@example.test", role.id);
        let record = fx.store.insert_principal(record).await.unwrap();
        let resolver = PrincipalResolver::new(Arc::new(PrefixVerifier), fx.store.clone());
        (fx, resolver, record)
    }

    #[tokio::test]
    async fn resolves_active_principal() {
        let (fx, resolver, record) = setup().await;
        let principal = resolver.resolve(&format!("ok:{}", record.id)).await.unwrap();
        assert_eq!(principal.id(), record.id);
        assert_eq!(principal.tenant_id(), Some(fx.tenant));
        assert_eq!(principal.role().name, RoleName::from_static("USER"));
        assert!(!principal.is_global_scope());
    }

    #[tokio::test]
    async fn rejected_or_subjectless_credentials_are_invalid() {
        let (_fx, resolver, _record) = setup().await;
        for token in ["forged", "ok:", "ok:not-a-uuid"] {
            let err = resolver.resolve(token).await.unwrap_err();
            assert!(
                matches!(err, AccessError::Authentication(AuthenticationError::InvalidCredential(_))),
                "{token}: {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn unknown_subject_is_not_found() {
        let (_fx, resolver, _record) = setup().await;
        let err = resolver.resolve(&format!("ok:{}", PrincipalId::new())).await.unwrap_err();
        assert_eq!(err, AccessError::Authentication(AuthenticationError::PrincipalNotFound));
    }

    #[tokio::test]
    async fn deactivated_principal_is_inactive() {
        let (fx, resolver, record) = setup().await;
        let patch = PrincipalPatch {
            is_active: Some(false),
            ..PrincipalPatch::default()
        };
        fx.store.update_principal(record.id, TenantPredicate::Any, &patch).await.unwrap();

        let err = resolver.resolve(&format!("ok:{}", record.id)).await.unwrap_err();
        assert_eq!(err, AccessError::Authentication(AuthenticationError::PrincipalInactive));
    }

    #[tokio::test]
    async fn store_outage_is_unavailable() {
        let (fx, resolver, record) = setup().await;
        fx.store.set_offline(true);
        let err = resolver.resolve(&format!("ok:{}", record.id)).await.unwrap_err();
        assert!(matches!(err, AccessError::Unavailable(_)));
    }
}
