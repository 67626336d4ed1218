//! Shared HTTP session setup and response helpers.

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Response};
use serde_json::Value;
use url::Url;

use crate::error::{VerifyError, VerifyResult};

pub(crate) const FHIR_JSON: &str = "application/fhir+json;charset=utf-8";

/// Builds a client that sends FHIR JSON by default.
pub(crate) fn build_session(timeout: Duration) -> VerifyResult<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(FHIR_JSON));

    Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(VerifyError::from)
}

/// Parses and normalizes a base URL (no trailing slash).
pub(crate) fn parse_base_url(base_url: &str) -> VerifyResult<String> {
    let parsed = Url::parse(base_url).map_err(|e| VerifyError::Transport {
        endpoint: base_url.to_string(),
        message: format!("invalid base URL: {}", e),
    })?;
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

/// Joins a path segment onto a normalized base URL.
pub(crate) fn join(base_url: &str, segment: &str) -> String {
    if segment.is_empty() {
        format!("{}/", base_url)
    } else {
        format!("{}/{}", base_url, segment)
    }
}

/// Fails on non-2xx statuses and decodes the JSON body.
pub(crate) async fn json_body(response: Response) -> VerifyResult<(String, Value)> {
    let response = response.error_for_status()?;
    let endpoint = response.url().to_string();
    let body = response.json::<Value>().await?;
    Ok((endpoint, body))
}

/// Reads `total` from a `_summary=count` search Bundle.
pub(crate) fn read_total(endpoint: &str, body: &Value) -> VerifyResult<u64> {
    body.get("total")
        .and_then(Value::as_u64)
        .ok_or_else(|| VerifyError::UnexpectedResponse {
            endpoint: endpoint.to_string(),
            message: "response Bundle has no numeric 'total'".to_string(),
        })
}
