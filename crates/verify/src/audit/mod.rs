//! AuditEvent model, expected fixtures and the structural comparator.
//!
//! - [`event`] - typed view over AuditEvent JSON
//! - [`fixture`] - expected-audit fixture files
//! - [`compare`] - field projections and the [`AuditVerifier`]

pub mod compare;
pub mod event;
pub mod fixture;

pub use compare::{AuditField, AuditFieldMismatch, AuditVerifier, HISTORY_MARKER, MismatchAspect};
pub use event::{AuditAgent, AuditEntity, AuditEvent, AuditPeriod, EntityWhat};
pub use fixture::ExpectedAuditFixture;
