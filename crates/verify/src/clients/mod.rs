//! Backend clients.
//!
//! The scenario driver talks to three collaborators through the traits in
//! this module so that real HTTP clients and in-memory test doubles are
//! interchangeable:
//!
//! - [`OriginServer`] - the upstream FHIR server (HAPI), read directly
//! - [`GatewayProxy`] - the FHIR gateway under test, always called with a token
//! - [`TokenSource`] - the authorization server issuing bearer tokens
//!
//! The reqwest-backed implementations are [`HapiClient`], [`FhirProxyClient`]
//! and [`AuthClient`].

pub mod auth;
pub mod hapi;
mod http;
pub mod proxy;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::VerifyResult;

pub use auth::AuthClient;
pub use hapi::HapiClient;
pub use proxy::FhirProxyClient;

/// Read access to the origin FHIR server.
#[async_trait]
pub trait OriginServer: Send + Sync {
    /// Number of `resource_type` resources whose `subject` is `patient_id`.
    async fn get_resource_count(&self, resource_type: &str, patient_id: &str) -> VerifyResult<u64>;

    /// Total number of AuditEvent resources.
    async fn get_audit_event_count(&self) -> VerifyResult<u64>;

    /// The newest `limit` AuditEvent bundle entries (`{"resource": ...}`),
    /// newest first.
    async fn get_audit_events(&self, limit: usize) -> VerifyResult<Vec<Value>>;
}

/// Authenticated access through the FHIR gateway.
#[async_trait]
pub trait GatewayProxy: Send + Sync {
    /// Number of resources matching `pair` scoped to `patient_id`.
    async fn get_resource_count(
        &self,
        token: &str,
        pair: &ResourceSearchPair,
        patient_id: &str,
    ) -> VerifyResult<u64>;

    /// Posts the JSON document at `fixture_path`.
    async fn post_resource(
        &self,
        submission: &Submission,
        fixture_path: &Path,
        token: &str,
    ) -> VerifyResult<()>;
}

/// Issues bearer tokens.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Fetches a fresh access token.
    async fn get_auth_token(&self) -> VerifyResult<String>;
}

/// A resource type together with the search parameter that links it to a
/// patient, e.g. `Encounter` / `patient` or `Observation` / `subject`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceSearchPair {
    resource_type: String,
    search_param: String,
}

impl ResourceSearchPair {
    /// Creates a new pair.
    pub fn new(resource_type: impl Into<String>, search_param: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            search_param: search_param.into(),
        }
    }

    /// The FHIR resource type.
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// The patient search parameter name.
    pub fn search_param(&self) -> &str {
        &self.search_param
    }
}

impl fmt::Display for ResourceSearchPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource_type, self.search_param)
    }
}

impl FromStr for ResourceSearchPair {
    type Err = String;

    /// Parses `Type:param`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (resource_type, search_param) = s
            .split_once(':')
            .ok_or_else(|| format!("expected Type:param, got '{}'", s))?;
        let resource_type = resource_type.trim();
        let search_param = search_param.trim();
        if resource_type.is_empty() || search_param.is_empty() {
            return Err(format!("expected Type:param, got '{}'", s));
        }
        Ok(Self::new(resource_type, search_param))
    }
}

/// What a proxy POST targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// `POST [base]/[type]` with a single resource.
    Resource(String),
    /// `POST [base]/` with a transaction bundle.
    TransactionBundle,
}

impl Submission {
    /// Path segment appended to the base URL; empty for a transaction.
    pub fn path_segment(&self) -> &str {
        match self {
            Submission::Resource(resource_type) => resource_type,
            Submission::TransactionBundle => "",
        }
    }

    /// Human-readable payload type for logs.
    pub fn payload_type(&self) -> &str {
        match self {
            Submission::Resource(resource_type) => resource_type,
            Submission::TransactionBundle => "Bundle",
        }
    }

    /// File name of the expected-audit fixture for this submission.
    pub fn expected_audit_fixture_name(&self) -> String {
        match self {
            Submission::Resource(resource_type) => {
                format!("{}_audit_events.json", resource_type).to_lowercase()
            }
            Submission::TransactionBundle => "transaction_bundle_audit_events.json".to_string(),
        }
    }
}

impl From<&str> for Submission {
    /// An empty resource type denotes a transaction bundle.
    fn from(resource_type: &str) -> Self {
        if resource_type.is_empty() {
            Submission::TransactionBundle
        } else {
            Submission::Resource(resource_type.to_string())
        }
    }
}
