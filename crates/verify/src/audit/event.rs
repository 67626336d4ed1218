//! Typed view over an AuditEvent resource.
//!
//! Only the fields the comparator looks at are modelled. Each top-level field
//! is `Option` so that "absent" is distinguishable from "present but empty";
//! expected fixtures rely on that distinction to opt fields into checking.
//!
//! Construction never fails. Nested shapes that do not match what the
//! gateway emits (an `agent` that is not a list, a `what` that is not an
//! object, a non-string `reference`) collapse to empty projections instead
//! of being rejected.

use serde::Deserialize;
use serde_json::Value;

/// AuditEvent fields relevant to verification.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "Value")]
pub struct AuditEvent {
    /// `AuditEvent.action` (e.g. `"C"`).
    pub action: Option<Value>,
    /// `AuditEvent.subtype` (list of codings).
    pub subtype: Option<Value>,
    /// `AuditEvent.outcome`.
    pub outcome: Option<Value>,
    /// `AuditEvent.agent`, in document order.
    pub agent: Option<Vec<AuditAgent>>,
    /// `AuditEvent.entity`, in document order.
    pub entity: Option<Vec<AuditEntity>>,
    /// `AuditEvent.source`.
    pub source: Option<Value>,
    /// `AuditEvent.recorded`, kept raw so non-string values survive.
    pub recorded: Option<Value>,
    /// `AuditEvent.period`.
    pub period: Option<AuditPeriod>,
}

/// One `AuditEvent.agent` entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditAgent {
    /// The raw `who` reference, if any.
    pub who: Option<Value>,
}

/// One `AuditEvent.entity` entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditEntity {
    /// The `what` reference, when it is an object.
    pub what: Option<EntityWhat>,
}

/// The `entity.what` reference.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityWhat {
    /// `reference` string such as `Observation/55/_history/1`.
    pub reference: Option<String>,
}

/// `AuditEvent.period`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditPeriod {
    /// `period.start`.
    pub start: Option<Value>,
    /// `period.end`.
    pub end: Option<Value>,
}

impl AuditEvent {
    /// Builds the typed view from a JSON value. Non-object input yields an
    /// event with every field absent.
    pub fn from_value(value: &Value) -> Self {
        Self {
            action: value.get("action").cloned(),
            subtype: value.get("subtype").cloned(),
            outcome: value.get("outcome").cloned(),
            agent: value.get("agent").map(|agents| {
                list_items(agents)
                    .iter()
                    .map(|agent| AuditAgent {
                        who: agent.get("who").cloned(),
                    })
                    .collect()
            }),
            entity: value.get("entity").map(|entities| {
                list_items(entities)
                    .iter()
                    .map(|entity| AuditEntity {
                        what: entity
                            .get("what")
                            .filter(|what| what.is_object())
                            .map(|what| EntityWhat {
                                reference: what
                                    .get("reference")
                                    .and_then(Value::as_str)
                                    .map(str::to_string),
                            }),
                    })
                    .collect()
            }),
            source: value.get("source").cloned(),
            recorded: value.get("recorded").cloned(),
            period: value.get("period").map(|period| AuditPeriod {
                start: period.get("start").cloned(),
                end: period.get("end").cloned(),
            }),
        }
    }

    /// The `who` of the agent at `index`, or `None` if the list is absent or
    /// too short.
    pub fn agent_who(&self, index: usize) -> Option<Option<&Value>> {
        self.agent
            .as_deref()
            .and_then(|agents| agents.get(index))
            .map(|agent| agent.who.as_ref())
    }

    /// The `entity[index].what.reference`, or `""` when any link is missing.
    pub fn entity_reference(&self, index: usize) -> &str {
        self.entity
            .as_deref()
            .and_then(|entities| entities.get(index))
            .and_then(|entity| entity.what.as_ref())
            .and_then(|what| what.reference.as_deref())
            .unwrap_or("")
    }

    /// `period.end`, if present.
    pub fn period_end(&self) -> Option<&Value> {
        self.period.as_ref().and_then(|period| period.end.as_ref())
    }
}

impl From<Value> for AuditEvent {
    fn from(value: Value) -> Self {
        Self::from_value(&value)
    }
}

fn list_items(value: &Value) -> &[Value] {
    value.as_array().map(Vec::as_slice).unwrap_or(&[])
}
