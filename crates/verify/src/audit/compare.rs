//! Structural comparison of audit events against expected fixtures.
//!
//! Fields are checked in a fixed order and only when the expected event
//! carries them. Each field has its own projection:
//!
//! | Field | Compared value |
//! |-------|----------------|
//! | `action`, `subtype`, `outcome`, `source` | raw JSON value |
//! | `agent` | `agent[2].who` (the user agent), `""` if fewer than 3 agents |
//! | `entity` | resource type of `entity[1].what.reference` (compartment owner) and of `entity[2].what.reference` (target resource); the expected target must be a versioned reference |
//! | `recorded` | calendar date of the actual value vs. today |
//! | `period` | calendar date of the actual `period.end` vs. today |
//!
//! The entity and agent positions are the fixed shape the gateway emits:
//! agent 0 is the client, 1 the server, 2 the user; entity 0 is the request
//! id, 1 the patient compartment, 2 the affected resource. A backend that
//! reorders these lists fails verification.

use std::fmt;

use chrono::{Local, NaiveDate};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::event::AuditEvent;
use crate::date::normalize_optional_date;

/// Marks a versioned reference (`<Type>/<id>/_history/<version>`).
pub const HISTORY_MARKER: &str = "/_history/";

const USER_AGENT_INDEX: usize = 2;
const COMPARTMENT_ENTITY_INDEX: usize = 1;
const TARGET_ENTITY_INDEX: usize = 2;

/// The audit-event fields the comparator knows how to check, in check order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditField {
    /// `action`
    Action,
    /// `subtype`
    Subtype,
    /// `outcome`
    Outcome,
    /// `agent`
    Agent,
    /// `entity`
    Entity,
    /// `source`
    Source,
    /// `recorded`
    Recorded,
    /// `period`
    Period,
}

impl AuditField {
    /// All fields in check order.
    pub const ALL: [AuditField; 8] = [
        AuditField::Action,
        AuditField::Subtype,
        AuditField::Outcome,
        AuditField::Agent,
        AuditField::Entity,
        AuditField::Source,
        AuditField::Recorded,
        AuditField::Period,
    ];

    /// JSON property name.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditField::Action => "action",
            AuditField::Subtype => "subtype",
            AuditField::Outcome => "outcome",
            AuditField::Agent => "agent",
            AuditField::Entity => "entity",
            AuditField::Source => "source",
            AuditField::Recorded => "recorded",
            AuditField::Period => "period",
        }
    }
}

impl fmt::Display for AuditField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which part of a field's projection failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchAspect {
    /// The projected values differ.
    Value,
    /// `entity[1]` resource types differ.
    CompartmentOwner,
    /// `entity[2]` resource types differ.
    TargetResource,
    /// The expected `entity[2]` reference has no history segment.
    VersionMarker,
}

impl fmt::Display for MismatchAspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MismatchAspect::Value => f.write_str("value"),
            MismatchAspect::CompartmentOwner => f.write_str("compartment owner"),
            MismatchAspect::TargetResource => f.write_str("target resource"),
            MismatchAspect::VersionMarker => f.write_str("version marker"),
        }
    }
}

/// A single audit field that failed comparison.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("AuditEvent.{field} {aspect} mismatch: expected {expected}, actual {actual}")]
pub struct AuditFieldMismatch {
    /// The field being checked.
    pub field: AuditField,
    /// Which check within the field failed.
    pub aspect: MismatchAspect,
    /// Rendered expected projection.
    pub expected: String,
    /// Rendered actual projection.
    pub actual: String,
}

impl AuditFieldMismatch {
    fn new(
        field: AuditField,
        aspect: MismatchAspect,
        expected: impl fmt::Display,
        actual: impl fmt::Display,
    ) -> Self {
        Self {
            field,
            aspect,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

/// Compares actual audit events against expected fixtures.
///
/// `recorded` and `period` are checked against the verifier's notion of
/// "today", which defaults to the local system date at construction time.
#[derive(Debug, Clone, Copy)]
pub struct AuditVerifier {
    today: NaiveDate,
}

impl Default for AuditVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditVerifier {
    /// Creates a verifier that treats the current local date as "today".
    pub fn new() -> Self {
        Self::with_today(Local::now().date_naive())
    }

    /// Creates a verifier with a fixed "today".
    pub fn with_today(today: NaiveDate) -> Self {
        Self { today }
    }

    /// The date `recorded` and `period.end` must fall on.
    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// Verifies `actual` against `expected`, stopping at the first mismatch.
    pub fn verify(
        &self,
        expected: &AuditEvent,
        actual: &AuditEvent,
    ) -> Result<(), AuditFieldMismatch> {
        for field in AuditField::ALL {
            debug!(field = %field, "Verifying AuditEvent field");
            if let Err(mismatch) = self.check_field(field, expected, actual) {
                warn!(
                    field = %mismatch.field,
                    aspect = %mismatch.aspect,
                    expected = %mismatch.expected,
                    actual = %mismatch.actual,
                    "AuditEvent field mismatch"
                );
                return Err(mismatch);
            }
        }
        info!("All AuditEvent fields verified successfully");
        Ok(())
    }

    /// Verifies every field and returns all mismatches found, in check order.
    pub fn verify_all(&self, expected: &AuditEvent, actual: &AuditEvent) -> Vec<AuditFieldMismatch> {
        AuditField::ALL
            .into_iter()
            .filter_map(|field| self.check_field(field, expected, actual).err())
            .collect()
    }

    /// Checks a single field. Fields absent from `expected` always pass.
    pub fn check_field(
        &self,
        field: AuditField,
        expected: &AuditEvent,
        actual: &AuditEvent,
    ) -> Result<(), AuditFieldMismatch> {
        match field {
            AuditField::Action => compare_raw(field, expected.action.as_ref(), actual.action.as_ref()),
            AuditField::Subtype => {
                compare_raw(field, expected.subtype.as_ref(), actual.subtype.as_ref())
            }
            AuditField::Outcome => {
                compare_raw(field, expected.outcome.as_ref(), actual.outcome.as_ref())
            }
            AuditField::Source => compare_raw(field, expected.source.as_ref(), actual.source.as_ref()),
            AuditField::Agent => match expected.agent {
                Some(_) => {
                    let expected_who = user_agent_who(expected);
                    let actual_who = user_agent_who(actual);
                    if expected_who == actual_who {
                        Ok(())
                    } else {
                        Err(AuditFieldMismatch::new(
                            field,
                            MismatchAspect::Value,
                            expected_who,
                            actual_who,
                        ))
                    }
                }
                None => Ok(()),
            },
            AuditField::Entity => match expected.entity {
                Some(_) => check_entity(expected, actual),
                None => Ok(()),
            },
            AuditField::Recorded => match expected.recorded {
                Some(_) => self.check_today(field, normalize_optional_date(actual.recorded.as_ref())),
                None => Ok(()),
            },
            AuditField::Period => match expected.period {
                Some(_) => self.check_today(field, normalize_optional_date(actual.period_end())),
                None => Ok(()),
            },
        }
    }

    fn check_today(&self, field: AuditField, actual: NaiveDate) -> Result<(), AuditFieldMismatch> {
        if actual == self.today {
            Ok(())
        } else {
            Err(AuditFieldMismatch::new(
                field,
                MismatchAspect::Value,
                self.today,
                actual,
            ))
        }
    }
}

/// Identity comparison for fields present in the expected event. A field
/// missing from the actual event compares as JSON `null`.
fn compare_raw(
    field: AuditField,
    expected: Option<&Value>,
    actual: Option<&Value>,
) -> Result<(), AuditFieldMismatch> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let actual = actual.unwrap_or(&Value::Null);
    if expected == actual {
        Ok(())
    } else {
        Err(AuditFieldMismatch::new(
            field,
            MismatchAspect::Value,
            expected,
            actual,
        ))
    }
}

/// `agent[2].who`, `null` when that agent has no `who`, `""` when there are
/// fewer than three agents.
fn user_agent_who(event: &AuditEvent) -> Value {
    match event.agent_who(USER_AGENT_INDEX) {
        Some(who) => who.cloned().unwrap_or(Value::Null),
        None => Value::String(String::new()),
    }
}

fn check_entity(expected: &AuditEvent, actual: &AuditEvent) -> Result<(), AuditFieldMismatch> {
    let expected_owner = expected.entity_reference(COMPARTMENT_ENTITY_INDEX);
    let actual_owner = actual.entity_reference(COMPARTMENT_ENTITY_INDEX);
    if resource_type_of(expected_owner) != resource_type_of(actual_owner) {
        return Err(AuditFieldMismatch::new(
            AuditField::Entity,
            MismatchAspect::CompartmentOwner,
            expected_owner,
            actual_owner,
        ));
    }

    let expected_target = expected.entity_reference(TARGET_ENTITY_INDEX);
    let actual_target = actual.entity_reference(TARGET_ENTITY_INDEX);
    if resource_type_of(expected_target) != resource_type_of(actual_target) {
        return Err(AuditFieldMismatch::new(
            AuditField::Entity,
            MismatchAspect::TargetResource,
            expected_target,
            actual_target,
        ));
    }

    if !expected_target.contains(HISTORY_MARKER) {
        return Err(AuditFieldMismatch::new(
            AuditField::Entity,
            MismatchAspect::VersionMarker,
            format!("a reference containing '{HISTORY_MARKER}'"),
            expected_target,
        ));
    }

    Ok(())
}

/// The text before the first `/` of a reference.
fn resource_type_of(reference: &str) -> &str {
    reference.split('/').next().unwrap_or("")
}
