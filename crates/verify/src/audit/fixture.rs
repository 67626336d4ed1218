//! Expected audit-event fixtures.
//!
//! An expected fixture is a JSON array of partial AuditEvent objects. Element
//! `i` is matched against the `i`-th newest audit event fetched from the
//! origin server.

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use super::event::AuditEvent;
use crate::error::{VerifyError, VerifyResult};
use crate::fixtures::load_json;

/// Expected audit events, newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpectedAuditFixture {
    entries: Vec<AuditEvent>,
}

impl ExpectedAuditFixture {
    /// Loads and validates a fixture file.
    pub fn load(path: impl AsRef<Path>) -> VerifyResult<Self> {
        let path = path.as_ref();
        let value = load_json(path)?;
        let fixture = Self::from_value(&value, &path.display().to_string())?;
        debug!(
            path = %path.display(),
            entries = fixture.len(),
            "Loaded expected AuditEvent fixture"
        );
        Ok(fixture)
    }

    /// Validates a parsed fixture document.
    ///
    /// The document must be an array whose elements are all objects.
    /// `source_name` only labels the error.
    pub fn from_value(value: &Value, source_name: &str) -> VerifyResult<Self> {
        let items = value
            .as_array()
            .ok_or_else(|| VerifyError::MalformedFixture {
                source_name: source_name.to_string(),
                reason: format!("expected a JSON array, found {}", json_kind(value)),
            })?;

        let entries = items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                if item.is_object() {
                    Ok(AuditEvent::from_value(item))
                } else {
                    Err(VerifyError::MalformedFixture {
                        source_name: source_name.to_string(),
                        reason: format!("element {} is {}, not an object", index, json_kind(item)),
                    })
                }
            })
            .collect::<VerifyResult<Vec<_>>>()?;

        Ok(Self { entries })
    }

    /// Number of expected events.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the fixture holds no expected events.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Expected event at `index`.
    pub fn get(&self, index: usize) -> Option<&AuditEvent> {
        self.entries.get(index)
    }

    /// Iterates expected events, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &AuditEvent> {
        self.entries.iter()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
