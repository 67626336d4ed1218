//! Direct client for the origin HAPI FHIR server.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::OriginServer;
use super::http::{build_session, join, json_body, parse_base_url, read_total};
use crate::error::{VerifyError, VerifyResult};

/// Default base URL, matching the docker compose setup.
pub const DEFAULT_HAPI_URL: &str = "http://localhost:8099/fhir";

/// Client for the HAPI server behind the gateway.
#[derive(Debug, Clone)]
pub struct HapiClient {
    base_url: String,
    session: Client,
}

impl HapiClient {
    /// Creates a client for `base_url` with a per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> VerifyResult<Self> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            session: build_session(timeout)?,
        })
    }

    /// The normalized base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn count(&self, resource_type: &str, query: &[(&str, &str)]) -> VerifyResult<u64> {
        let response = self
            .session
            .get(join(&self.base_url, resource_type))
            .query(query)
            .query(&[("_summary", "count")])
            .send()
            .await?;
        let (endpoint, body) = json_body(response).await?;
        let total = read_total(&endpoint, &body)?;
        debug!(endpoint = %endpoint, total, "HAPI count");
        Ok(total)
    }
}

#[async_trait]
impl OriginServer for HapiClient {
    async fn get_resource_count(&self, resource_type: &str, patient_id: &str) -> VerifyResult<u64> {
        self.count(resource_type, &[("subject", patient_id)]).await
    }

    async fn get_audit_event_count(&self) -> VerifyResult<u64> {
        self.count("AuditEvent", &[]).await
    }

    async fn get_audit_events(&self, limit: usize) -> VerifyResult<Vec<Value>> {
        let count = limit.to_string();
        let response = self
            .session
            .get(join(&self.base_url, "AuditEvent"))
            .query(&[("_sort", "-_lastUpdated"), ("_count", count.as_str())])
            .send()
            .await?;
        let (endpoint, body) = json_body(response).await?;

        if body.get("resourceType").and_then(Value::as_str) != Some("Bundle") {
            return Err(VerifyError::UnexpectedResponse {
                endpoint,
                message: "AuditEvent search did not return a Bundle".to_string(),
            });
        }

        let entries = body
            .get("entry")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        debug!(endpoint = %endpoint, returned = entries.len(), limit, "Fetched AuditEvents");
        Ok(entries.into_iter().take(limit).collect())
    }
}
