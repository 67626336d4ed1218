//! Fixture helpers.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde_json::{Value, json};
use tempfile::TempDir;

/// The fixture directory shipped with the repository.
pub fn repo_fixtures_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../e2e-test")
}

/// A temporary fixture directory holding the repository payloads plus the
/// given expected-audit documents, written as `(file name, document)` pairs.
pub fn fixture_dir_with(expected: &[(&str, Value)]) -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp dir");
    for payload in ["obs.json", "transaction_bundle.json"] {
        fs::copy(repo_fixtures_dir().join(payload), dir.path().join(payload))
            .expect("Failed to copy payload fixture");
    }
    for (name, document) in expected {
        fs::write(
            dir.path().join(name),
            serde_json::to_string_pretty(document).expect("Failed to serialize fixture"),
        )
        .expect("Failed to write expected fixture");
    }
    dir
}

/// The repository's expected AuditEvent for a single Observation POST.
pub fn expected_observation_audit() -> Value {
    let path = repo_fixtures_dir().join("observation_audit_events.json");
    let text = fs::read_to_string(path).expect("Failed to read expected fixture");
    let document: Value = serde_json::from_str(&text).expect("Failed to parse expected fixture");
    document[0].clone()
}

/// An AuditEvent shaped the way the gateway writes one for a create:
/// client, server and user agents, then request, compartment and target
/// entities. `recorded` and `period` carry the current local time.
pub fn gateway_audit_event(resource_type: &str, id: u64, patient: &str) -> Value {
    let now = Local::now().to_rfc3339();
    json!({
        "resourceType": "AuditEvent",
        "id": format!("audit-{}-{}", resource_type.to_lowercase(), id),
        "type": {
            "system": "http://terminology.hl7.org/CodeSystem/audit-event-type",
            "code": "rest",
            "display": "RESTful Operation"
        },
        "subtype": [
            {
                "system": "http://hl7.org/fhir/restful-interaction",
                "code": "create",
                "display": "create"
            }
        ],
        "action": "C",
        "period": { "start": now, "end": now },
        "recorded": now,
        "outcome": "0",
        "agent": [
            {
                "who": {
                    "identifier": {
                        "system": "http://localhost:9080/auth/realms/test",
                        "value": "my-fhir-client"
                    }
                },
                "requestor": false
            },
            {
                "who": { "display": "FHIR gateway" },
                "requestor": false
            },
            {
                "who": {
                    "identifier": {
                        "system": "http://localhost:9080/auth/realms/test",
                        "value": "testuser"
                    }
                },
                "requestor": true
            }
        ],
        "source": {
            "observer": { "display": "FHIR gateway" }
        },
        "entity": [
            { "what": { "identifier": { "value": format!("request-{}", id) } } },
            { "what": { "reference": patient } },
            { "what": { "reference": format!("{}/{}/_history/1", resource_type, id) } }
        ]
    })
}
