//! Shared fixtures for the service tests.

use std::sync::Arc;

use platform_auth::{Principal, Role, RoleName};
use platform_core::{PrincipalId, Tenant, TenantId, TenantStatus};

use crate::admin::RbacAdmin;
use crate::engine::AuthorizationEngine;
use crate::records::ScopedRecords;
use crate::seed::seed_builtin_catalog;
use crate::store::{InMemoryStore, PrincipalDirectory, PrincipalRecord, RbacStore};
use crate::users::UserAdmin;

pub(crate) struct Fixture {
    pub store: Arc<InMemoryStore>,
    pub engine: AuthorizationEngine,
    pub admin: RbacAdmin,
    pub records: ScopedRecords,
    pub users: UserAdmin,
    pub tenant: TenantId,
    pub other_tenant: TenantId,
}

impl Fixture {
    /// In-memory store with the built-in catalog and two tenants.
    pub async fn seeded() -> Self {
        let store = Arc::new(InMemoryStore::new());
        seed_builtin_catalog(store.as_ref()).await.unwrap();

        let tenant = store
            .insert_tenant(Tenant::new(TenantId::new(), "Acme", TenantStatus::Active))
            .await
            .unwrap()
            .id;
        let other_tenant = store
            .insert_tenant(Tenant::new(TenantId::new(), "Globex", TenantStatus::Active))
            .await
            .unwrap()
            .id;

        let engine = AuthorizationEngine::new(store.clone());
        Self {
            admin: RbacAdmin::new(store.clone()),
            records: ScopedRecords::new(engine.clone(), store.clone()),
            users: UserAdmin::new(engine.clone(), store.clone(), store.clone()),
            engine,
            store,
            tenant,
            other_tenant,
        }
    }

    /// Persist an active principal with the named role and return it resolved.
    pub async fn principal_with_role(&self, role: &RoleName, tenant: Option<TenantId>) -> Principal {
        let role = self.store.find_role(role).await.unwrap().unwrap();
        let record = PrincipalRecord::new(tenant, format!("{}@example.test", PrincipalId::new()), role.id);
        self.store.insert_principal(record.clone()).await.unwrap();
        Principal::new(record.id, tenant, role.to_ref(), role.global_scope, true).unwrap()
    }
}

/// Principal for `role` without persisting anything.
pub(crate) fn principal_for(role: &Role, tenant: Option<TenantId>, active: bool) -> Principal {
    Principal::new(PrincipalId::new(), tenant, role.to_ref(), role.global_scope, active).unwrap()
}
