//! In-memory backends.
//!
//! [`FakeBackend`] models one deployment: an origin server with per-patient
//! resource counts, a gateway proxy in front of it and the AuditEvents the
//! gateway writes. Posted resources and their AuditEvents only become
//! visible after a configurable lag, measured on the tokio clock so tests
//! running with paused time stay deterministic.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use helios_gateway_verify::fixtures::load_json;
use helios_gateway_verify::{
    GatewayProxy, OriginServer, ResourceSearchPair, Submission, TokenSource, VerifyError,
    VerifyResult,
};
use serde_json::{Value, json};
use tokio::time::Instant;

use super::fixtures::gateway_audit_event;

type CountKey = (String, String);

fn key(resource_type: &str, patient: &str) -> CountKey {
    (resource_type.to_string(), patient.to_string())
}

#[derive(Default)]
struct BackendState {
    counts: HashMap<CountKey, u64>,
    proxy_extra: HashMap<CountKey, u64>,
    pending_resources: Vec<(Instant, CountKey)>,
    audit_events: Vec<Value>,
    pending_audit: Vec<(Instant, Value)>,
    next_id: u64,
    posted: Vec<String>,
    proxy_tokens: Vec<String>,
}

/// Shared state behind [`FakeHapi`] and [`FakeProxy`].
pub struct FakeBackend {
    state: Mutex<BackendState>,
    index_lag: Duration,
    audit_lag: Duration,
    extra_audit_events: usize,
    hapi_unreachable: bool,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BackendState {
                next_id: 1,
                ..Default::default()
            }),
            index_lag: Duration::ZERO,
            audit_lag: Duration::ZERO,
            extra_audit_events: 0,
            hapi_unreachable: false,
        }
    }

    /// Seeds the count of `resource_type` for `patient`.
    pub fn with_count(self, resource_type: &str, patient: &str, count: u64) -> Self {
        self.lock().counts.insert(key(resource_type, patient), count);
        self
    }

    /// Makes the proxy report `extra` more resources than the origin server.
    pub fn with_proxy_extra(self, resource_type: &str, patient: &str, extra: u64) -> Self {
        self.lock()
            .proxy_extra
            .insert(key(resource_type, patient), extra);
        self
    }

    /// Seeds `count` older AuditEvents.
    pub fn with_audit_history(self, count: u64) -> Self {
        {
            let mut state = self.lock();
            for id in 0..count {
                let event = gateway_audit_event("Patient", 9000 + id, "Patient/3810");
                state.audit_events.insert(0, event);
            }
        }
        self
    }

    /// Delay before a posted resource shows up in counts.
    pub fn with_index_lag(mut self, lag: Duration) -> Self {
        self.index_lag = lag;
        self
    }

    /// Delay before the AuditEvents of a post show up.
    pub fn with_audit_lag(mut self, lag: Duration) -> Self {
        self.audit_lag = lag;
        self
    }

    /// Writes `extra` additional AuditEvents for every post.
    pub fn with_extra_audit_events(mut self, extra: usize) -> Self {
        self.extra_audit_events = extra;
        self
    }

    /// Makes every origin server call fail with a transport error.
    pub fn with_unreachable_hapi(mut self) -> Self {
        self.hapi_unreachable = true;
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Payload types posted through the proxy, in order.
    pub fn posted(&self) -> Vec<String> {
        self.lock().posted.clone()
    }

    /// Tokens the proxy was queried with, in order.
    pub fn proxy_tokens(&self) -> Vec<String> {
        self.lock().proxy_tokens.clone()
    }

    /// Origin server count, after applying everything that became visible.
    pub fn count(&self, resource_type: &str, patient: &str) -> u64 {
        self.settled()
            .counts
            .get(&key(resource_type, patient))
            .copied()
            .unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BackendState> {
        self.state.lock().expect("backend state poisoned")
    }

    fn settled(&self) -> std::sync::MutexGuard<'_, BackendState> {
        let mut state = self.lock();
        let now = Instant::now();

        let (ready, pending): (Vec<_>, Vec<_>) = state
            .pending_resources
            .drain(..)
            .partition(|(visible_at, _)| *visible_at <= now);
        state.pending_resources = pending;
        for (_, resource) in ready {
            *state.counts.entry(resource).or_default() += 1;
        }

        let (ready, pending): (Vec<_>, Vec<_>) = state
            .pending_audit
            .drain(..)
            .partition(|(visible_at, _)| *visible_at <= now);
        state.pending_audit = pending;
        for (_, event) in ready {
            state.audit_events.insert(0, event);
        }

        state
    }

    fn check_hapi(&self, endpoint: &str) -> VerifyResult<()> {
        if self.hapi_unreachable {
            return Err(VerifyError::Transport {
                endpoint: format!("http://localhost:8099/fhir/{}", endpoint),
                message: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    fn post(&self, submission: &Submission, payload: &Value) {
        let created: Vec<(String, String)> = match submission {
            Submission::TransactionBundle => payload["entry"]
                .as_array()
                .map(|entries| {
                    entries
                        .iter()
                        .map(|entry| created_resource(&entry["resource"]))
                        .collect()
                })
                .unwrap_or_default(),
            Submission::Resource(_) => vec![created_resource(payload)],
        };

        let now = Instant::now();
        let mut state = self.lock();
        state.posted.push(submission.payload_type().to_string());

        for (resource_type, patient) in &created {
            let id = state.next_id;
            state.next_id += 1;
            state
                .pending_resources
                .push((now + self.index_lag, key(resource_type, patient)));
            state.pending_audit.push((
                now + self.audit_lag,
                gateway_audit_event(resource_type, id, patient),
            ));
        }

        for _ in 0..self.extra_audit_events {
            let id = state.next_id;
            state.next_id += 1;
            state.pending_audit.push((
                now + self.audit_lag,
                gateway_audit_event("Provenance", id, "Patient/75270"),
            ));
        }
    }
}

fn created_resource(resource: &Value) -> (String, String) {
    (
        resource["resourceType"].as_str().unwrap_or_default().to_string(),
        resource["subject"]["reference"]
            .as_str()
            .unwrap_or_default()
            .to_string(),
    )
}

/// Origin server view over a [`FakeBackend`].
pub struct FakeHapi(pub Arc<FakeBackend>);

#[async_trait]
impl OriginServer for FakeHapi {
    async fn get_resource_count(&self, resource_type: &str, patient_id: &str) -> VerifyResult<u64> {
        self.0.check_hapi(resource_type)?;
        Ok(self.0.count(resource_type, patient_id))
    }

    async fn get_audit_event_count(&self) -> VerifyResult<u64> {
        self.0.check_hapi("AuditEvent")?;
        Ok(self.0.settled().audit_events.len() as u64)
    }

    async fn get_audit_events(&self, limit: usize) -> VerifyResult<Vec<Value>> {
        self.0.check_hapi("AuditEvent")?;
        Ok(self
            .0
            .settled()
            .audit_events
            .iter()
            .take(limit)
            .map(|event| json!({ "resource": event }))
            .collect())
    }
}

/// Gateway proxy view over a [`FakeBackend`].
pub struct FakeProxy(pub Arc<FakeBackend>);

#[async_trait]
impl GatewayProxy for FakeProxy {
    async fn get_resource_count(
        &self,
        token: &str,
        pair: &ResourceSearchPair,
        patient_id: &str,
    ) -> VerifyResult<u64> {
        let count = self.0.count(pair.resource_type(), patient_id);
        let mut state = self.0.lock();
        state.proxy_tokens.push(token.to_string());
        let extra = state
            .proxy_extra
            .get(&key(pair.resource_type(), patient_id))
            .copied()
            .unwrap_or_default();
        Ok(count + extra)
    }

    async fn post_resource(
        &self,
        submission: &Submission,
        fixture_path: &Path,
        _token: &str,
    ) -> VerifyResult<()> {
        let payload = load_json(fixture_path)?;
        self.0.post(submission, &payload);
        Ok(())
    }
}

/// Token source handing out `token-1`, `token-2`, ... Clones share the
/// counter.
#[derive(Clone, Default)]
pub struct FakeAuth {
    issued: Arc<AtomicU32>,
}

impl FakeAuth {
    pub fn issued(&self) -> u32 {
        self.issued.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenSource for FakeAuth {
    async fn get_auth_token(&self) -> VerifyResult<String> {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("token-{}", n))
    }
}
