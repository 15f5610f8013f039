use std::sync::Arc;

use anyhow::Context;

use platform_auth::CredentialVerifier;
use platform_infra::{
    AuthorizationEngine, InMemoryStore, PostgresStore, PrincipalDirectory, PrincipalResolver, RbacAdmin, RbacStore,
    RecordStore, ScopedRecords, UserAdmin, seed_builtin_catalog,
};

use crate::config::ApiConfig;
use crate::jwt::Hs256CredentialVerifier;

/// Services shared by every handler.
#[derive(Clone)]
pub struct AppServices {
    pub resolver: PrincipalResolver,
    pub engine: AuthorizationEngine,
    pub admin: RbacAdmin,
    pub records: ScopedRecords,
    pub users: UserAdmin,
}

impl AppServices {
    /// Wire every service onto one backing store.
    pub fn from_store<S>(store: Arc<S>, verifier: Arc<dyn CredentialVerifier>) -> Self
    where
        S: RbacStore + PrincipalDirectory + RecordStore + 'static,
    {
        let rbac: Arc<dyn RbacStore> = store.clone();
        let directory: Arc<dyn PrincipalDirectory> = store.clone();
        let record_store: Arc<dyn RecordStore> = store;

        let engine = AuthorizationEngine::new(rbac.clone());
        Self {
            resolver: PrincipalResolver::new(verifier, directory.clone()),
            admin: RbacAdmin::new(rbac.clone()),
            records: ScopedRecords::new(engine.clone(), record_store),
            users: UserAdmin::new(engine.clone(), rbac, directory),
            engine,
        }
    }
}

/// Build services from configuration: Postgres when a database URL is
/// configured, in-memory otherwise.
pub async fn build_services(config: &ApiConfig) -> anyhow::Result<AppServices> {
    let verifier: Arc<dyn CredentialVerifier> = Arc::new(Hs256CredentialVerifier::new(config.jwt_secret.as_bytes()));

    match &config.database_url {
        Some(url) => {
            let store = Arc::new(PostgresStore::connect(url).await.context("connecting to postgres")?);
            store.migrate().await.context("applying migrations")?;
            if config.seed_catalog {
                let report = seed_builtin_catalog(store.as_ref()).await.context("seeding catalog")?;
                tracing::info!(?report, "built-in catalog seeded");
            }
            Ok(AppServices::from_store(store, verifier))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory stores");
            let store = Arc::new(InMemoryStore::new());
            if config.seed_catalog {
                seed_builtin_catalog(store.as_ref()).await.context("seeding catalog")?;
            }
            Ok(AppServices::from_store(store, verifier))
        }
    }
}
