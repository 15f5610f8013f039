//! `platform-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod entity;
pub mod error;
pub mod id;
pub mod tenant;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{PermissionId, PrincipalId, RecordId, RoleId, TenantId};
pub use tenant::{Tenant, TenantStatus};
