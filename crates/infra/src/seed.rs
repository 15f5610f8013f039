//! Built-in catalog seeding.

use chrono::Utc;
use serde::Serialize;
use tracing::{info, instrument};

use platform_auth::{AccessError, builtin_permissions, builtin_roles};
use platform_core::{PermissionId, RoleId};

use crate::store::RbacStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub permissions_created: usize,
    pub roles_created: usize,
}

/// Create missing catalog permissions and built-in roles.
///
/// Existing rows are never overwritten, so running this on every start is
/// safe. A built-in global-scope role only takes the flag when no role holds
/// it yet.
#[instrument(skip(store), err)]
pub async fn seed_builtin_catalog(store: &dyn RbacStore) -> Result<SeedReport, AccessError> {
    let mut report = SeedReport::default();
    let now = Utc::now();

    for entry in builtin_permissions() {
        if store.find_permission(&entry.permission).await?.is_some() {
            continue;
        }
        let definition = entry.to_new_permission().into_definition(PermissionId::new(), now);
        store.insert_permission(definition).await?;
        report.permissions_created += 1;
    }

    let has_global = store.list_roles().await?.iter().any(|r| r.global_scope);

    for builtin in builtin_roles() {
        if store.find_role(&builtin.role.name).await?.is_some() {
            continue;
        }
        let mut role = builtin.role.into_role(RoleId::new(), now);
        role.permissions = builtin.permissions;
        role.global_scope = builtin.global_scope && !has_global;
        store.insert_role(role).await?;
        report.roles_created += 1;
    }

    info!(
        permissions_created = report.permissions_created,
        roles_created = report.roles_created,
        "builtin catalog seeded"
    );
    Ok(report)
}
