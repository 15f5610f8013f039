//! Scoped record executor: authorize, scope, then touch storage.

use std::sync::Arc;

use chrono::Utc;
use tracing::instrument;

use platform_auth::tenant_filter::TENANT_ID_KEY;
use platform_auth::{
    AccessError, EntityType, JsonMap, Principal, RecordOperation, ScopedOperation, TenantPredicate, payload_tenant,
    scope_query,
};
use platform_core::{RecordId, TenantId};

use crate::engine::AuthorizationEngine;
use crate::store::{RecordPatch, RecordStore, StoredRecord};

/// Keys the store owns; callers cannot write them into a payload.
const RESERVED_KEYS: [&str; 4] = ["id", TENANT_ID_KEY, "created_at", "updated_at"];

#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Listed(Vec<StoredRecord>),
    Found(StoredRecord),
    Created(StoredRecord),
    Updated(StoredRecord),
    Deleted,
}

#[derive(Clone)]
pub struct ScopedRecords {
    engine: AuthorizationEngine,
    store: Arc<dyn RecordStore>,
}

impl ScopedRecords {
    pub fn new(engine: AuthorizationEngine, store: Arc<dyn RecordStore>) -> Self {
        Self { engine, store }
    }

    /// Run `operation` on the named entity for `principal`.
    ///
    /// Unknown entities and rows outside the principal's tenant are both
    /// `NotFound`; a missing permission is `Forbidden`. Writing a record into
    /// a tenant that does not exist, or filtering a tenantless entity by
    /// tenant, is `Validation`.
    #[instrument(
        skip(self, principal, operation),
        fields(principal_id = %principal.id(), action = ?operation.action()),
        err
    )]
    pub async fn execute(
        &self,
        principal: &Principal,
        entity: &str,
        operation: RecordOperation,
    ) -> Result<RecordOutcome, AccessError> {
        let entity = EntityType::lookup(entity).ok_or(AccessError::NotFound)?;
        self.engine
            .require(principal, entity.required_permission(operation.action()))
            .await?;
        let scoped = scope_query(principal, entity, operation)?;
        self.run(scoped).await
    }

    async fn run(&self, scoped: ScopedOperation) -> Result<RecordOutcome, AccessError> {
        let ScopedOperation {
            entity,
            predicate,
            operation,
        } = scoped;

        match operation {
            RecordOperation::List(mut query) => {
                let mut predicate = predicate;
                if let Some(wanted) = payload_tenant(&query.filters)? {
                    query.filters.remove(TENANT_ID_KEY);
                    predicate = match predicate {
                        _ if !entity.tenant_scoped => {
                            return Err(AccessError::validation(format!("{} has no tenant_id to filter on", entity.name)));
                        }
                        TenantPredicate::Any => TenantPredicate::Tenant(wanted),
                        TenantPredicate::Tenant(own) if own == wanted => predicate,
                        TenantPredicate::Tenant(_) => return Ok(RecordOutcome::Listed(Vec::new())),
                    };
                }
                let rows = self.store.list_records(entity, predicate, &query).await?;
                Ok(RecordOutcome::Listed(rows))
            }
            RecordOperation::Get { id } => self
                .store
                .get_record(entity, predicate, id)
                .await?
                .map(RecordOutcome::Found)
                .ok_or(AccessError::NotFound),
            RecordOperation::Create { payload } => {
                let (tenant_id, data) = split_payload(entity, payload)?;
                if entity.tenant_scoped && tenant_id.is_none() {
                    return Err(AccessError::validation(format!("{} requires a tenant_id", entity.name)));
                }
                let now = Utc::now();
                let record = StoredRecord {
                    id: RecordId::new(),
                    entity: entity.name.to_string(),
                    tenant_id,
                    data,
                    created_at: now,
                    updated_at: now,
                };
                Ok(RecordOutcome::Created(self.store.insert_record(record).await?))
            }
            RecordOperation::Update { id, payload } => {
                let (tenant_id, fields) = split_payload(entity, payload)?;
                let patch = RecordPatch {
                    fields,
                    tenant_id,
                    updated_at: Utc::now(),
                };
                self.store
                    .update_record(entity, predicate, id, &patch)
                    .await?
                    .map(RecordOutcome::Updated)
                    .ok_or(AccessError::NotFound)
            }
            RecordOperation::Delete { id } => {
                if self.store.delete_record(entity, predicate, id).await? {
                    Ok(RecordOutcome::Deleted)
                } else {
                    Err(AccessError::NotFound)
                }
            }
        }
    }
}

/// Separate the tenant column from payload fields. Entities without tenants
/// never keep a `tenant_id`.
fn split_payload(entity: &EntityType, mut payload: JsonMap) -> Result<(Option<TenantId>, JsonMap), AccessError> {
    let tenant_id = if entity.tenant_scoped {
        payload_tenant(&payload)?
    } else {
        None
    };
    for key in RESERVED_KEYS {
        payload.remove(key);
    }
    Ok((tenant_id, payload))
}
