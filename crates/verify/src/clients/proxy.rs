//! Authenticated client for the FHIR gateway proxy.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use super::http::{build_session, join, json_body, parse_base_url, read_total};
use super::{GatewayProxy, ResourceSearchPair, Submission};
use crate::error::{VerifyError, VerifyResult};
use crate::fixtures::load_json;

/// Default base URL, matching the docker compose setup.
pub const DEFAULT_PROXY_URL: &str = "http://localhost:8080/fhir";

/// Client for the gateway under test.
///
/// Tokens are passed per call; the client keeps no authorization state.
#[derive(Debug, Clone)]
pub struct FhirProxyClient {
    base_url: String,
    session: Client,
}

impl FhirProxyClient {
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
}

#[async_trait]
impl GatewayProxy for FhirProxyClient {
    async fn get_resource_count(
        &self,
        token: &str,
        pair: &ResourceSearchPair,
        patient_id: &str,
    ) -> VerifyResult<u64> {
        let response = self
            .session
            .get(join(&self.base_url, pair.resource_type()))
            .bearer_auth(token)
            .query(&[(pair.search_param(), patient_id), ("_summary", "count")])
            .send()
            .await?;
        let (endpoint, body) = json_body(response).await?;
        let total = read_total(&endpoint, &body)?;
        debug!(endpoint = %endpoint, total, "Proxy count");
        Ok(total)
    }

    async fn post_resource(
        &self,
        submission: &Submission,
        fixture_path: &Path,
        token: &str,
    ) -> VerifyResult<()> {
        let payload = load_json(fixture_path)?;
        let body = serde_json::to_vec(&payload).map_err(|source| VerifyError::FixtureParse {
            path: fixture_path.to_path_buf(),
            source,
        })?;

        let url = join(&self.base_url, submission.path_segment());
        let response = self
            .session
            .post(&url)
            .bearer_auth(token)
            .body(body)
            .send()
            .await?
            .error_for_status()?;

        info!(
            url = %url,
            status = response.status().as_u16(),
            payload_type = submission.payload_type(),
            "Posted via proxy"
        );
        Ok(())
    }
}
