//! Infrastructure layer: stores and the services that run the authorization
//! core against them.

pub mod admin;
pub mod engine;
pub mod error;
pub mod records;
pub mod resolver;
pub mod seed;
pub mod store;
pub mod users;

#[cfg(test)]
pub(crate) mod testing;

pub use admin::RbacAdmin;
pub use engine::AuthorizationEngine;
pub use error::{StoreError, StoreResult};
pub use records::{RecordOutcome, ScopedRecords};
pub use resolver::PrincipalResolver;
pub use seed::{SeedReport, seed_builtin_catalog};
pub use store::{
    InMemoryStore, PostgresStore, PrincipalDirectory, PrincipalPatch, PrincipalRecord, PrincipalScope, PrincipalView,
    RbacStore, RecordPatch, RecordStore, StoredRecord,
};
pub use users::{UserAdmin, UserPage};
