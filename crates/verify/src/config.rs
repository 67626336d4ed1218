//! Runner configuration.
//!
//! Every option can be given on the command line or through the environment.
//! Defaults match the docker compose setup (HAPI on 8099, gateway on 8080,
//! Keycloak on 9080).
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `E2E_HAPI_URL` | http://localhost:8099/fhir | Origin server base URL |
//! | `E2E_PROXY_URL` | http://localhost:8080/fhir | Gateway base URL |
//! | `E2E_AUTH_URL` | http://localhost:9080/auth/realms/test/protocol/openid-connect/token | Token endpoint |
//! | `E2E_CLIENT_ID` | my-fhir-client | OAuth client id |
//! | `E2E_USERNAME` | testuser | Resource owner user name |
//! | `E2E_PASSWORD` | testpass | Resource owner password |
//! | `E2E_LOG_LEVEL` | info | Log level |
//! | `E2E_FIXTURES_DIR` | e2e-test | Directory holding payload and expected fixtures |
//! | `E2E_PATIENTS` | Patient/75270,Patient/3810 | Patients for the count parity check |
//! | `E2E_RESOURCES` | Encounter:patient,Observation:subject | `Type:param` pairs for the count parity check |
//! | `E2E_POST_PATIENT` | Patient/75270 | Patient the posted Observation belongs to |
//! | `E2E_REQUEST_TIMEOUT` | 30 | Per-request HTTP timeout (seconds) |
//! | `E2E_COUNT_POLL_DEADLINE` | 300 | Resource-count poll deadline (seconds) |
//! | `E2E_COUNT_POLL_INTERVAL` | 10 | Resource-count poll interval (seconds) |
//! | `E2E_AUDIT_POLL_DEADLINE` | 300 | AuditEvent-count poll deadline (seconds) |
//! | `E2E_AUDIT_POLL_INTERVAL` | 5 | AuditEvent-count poll interval (seconds) |
//! | `AUDIT_EVENT_LOGGING_ENABLED` | false | Whether the gateway writes AuditEvents |
//! | `E2E_SCENARIO` | all | Scenario selection (all, counts, post, audit) |

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use url::Url;

use crate::clients::ResourceSearchPair;
use crate::clients::auth::{Credentials, DEFAULT_AUTH_URL, REDACTED};
use crate::clients::hapi::DEFAULT_HAPI_URL;
use crate::clients::proxy::DEFAULT_PROXY_URL;
use crate::error::VerifyResult;
use crate::poll::PollPolicy;

/// Which scenarios to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScenarioSelection {
    /// Every scenario, audit scenarios only when audit logging is enabled.
    All,
    /// Proxy/server count parity only.
    Counts,
    /// Post a resource and wait for the proxy count to increase.
    Post,
    /// Post a resource and a bundle and verify the resulting AuditEvents.
    Audit,
}

impl ScenarioSelection {
    /// Returns true if the count parity scenario is selected.
    pub fn includes_counts(&self) -> bool {
        matches!(self, ScenarioSelection::All | ScenarioSelection::Counts)
    }

    /// Returns true if the post-and-converge scenario is selected.
    pub fn includes_post(&self) -> bool {
        matches!(self, ScenarioSelection::All | ScenarioSelection::Post)
    }

    /// Returns true if the audit scenarios are selected.
    pub fn includes_audit(&self) -> bool {
        matches!(self, ScenarioSelection::All | ScenarioSelection::Audit)
    }
}

/// Configuration for an end-to-end run.
#[derive(Clone, Parser)]
#[command(name = "gateway-e2e")]
#[command(about = "End-to-end verification of a FHIR gateway proxy")]
pub struct E2eConfig {
    /// Base URL of the origin HAPI server.
    #[arg(long, env = "E2E_HAPI_URL", default_value = DEFAULT_HAPI_URL)]
    pub hapi_url: String,

    /// Base URL of the FHIR gateway proxy.
    #[arg(long, env = "E2E_PROXY_URL", default_value = DEFAULT_PROXY_URL)]
    pub proxy_url: String,

    /// OAuth2 token endpoint.
    #[arg(long, env = "E2E_AUTH_URL", default_value = DEFAULT_AUTH_URL)]
    pub auth_url: String,

    /// OAuth client id.
    #[arg(long, env = "E2E_CLIENT_ID", default_value = "my-fhir-client")]
    pub client_id: String,

    /// Resource owner user name.
    #[arg(long, env = "E2E_USERNAME", default_value = "testuser")]
    pub username: String,

    /// Resource owner password.
    #[arg(long, env = "E2E_PASSWORD", default_value = "testpass", hide_env_values = true)]
    pub password: String,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "E2E_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Directory containing payload and expected-audit fixtures.
    #[arg(long, env = "E2E_FIXTURES_DIR", default_value = "e2e-test")]
    pub fixtures_dir: PathBuf,

    /// Patients used by the count parity check (comma-separated).
    #[arg(
        long,
        env = "E2E_PATIENTS",
        default_value = "Patient/75270,Patient/3810",
        value_delimiter = ','
    )]
    pub patients: Vec<String>,

    /// Resource/search-parameter pairs used by the count parity check.
    #[arg(
        long,
        env = "E2E_RESOURCES",
        default_value = "Encounter:patient,Observation:subject",
        value_delimiter = ','
    )]
    pub resources: Vec<String>,

    /// Patient the posted Observation belongs to.
    #[arg(long, env = "E2E_POST_PATIENT", default_value = "Patient/75270")]
    pub post_patient: String,

    /// Per-request HTTP timeout in seconds.
    #[arg(long, env = "E2E_REQUEST_TIMEOUT", default_value = "30")]
    pub request_timeout: u64,

    /// Deadline for the resource-count poll in seconds.
    #[arg(long, env = "E2E_COUNT_POLL_DEADLINE", default_value = "300")]
    pub count_poll_deadline: u64,

    /// Interval between resource-count samples in seconds.
    #[arg(long, env = "E2E_COUNT_POLL_INTERVAL", default_value = "10")]
    pub count_poll_interval: u64,

    /// Deadline for the AuditEvent-count poll in seconds.
    #[arg(long, env = "E2E_AUDIT_POLL_DEADLINE", default_value = "300")]
    pub audit_poll_deadline: u64,

    /// Interval between AuditEvent-count samples in seconds.
    #[arg(long, env = "E2E_AUDIT_POLL_INTERVAL", default_value = "5")]
    pub audit_poll_interval: u64,

    /// Whether the gateway has AuditEvent logging enabled.
    #[arg(
        long,
        env = "AUDIT_EVENT_LOGGING_ENABLED",
        default_value = "false",
        action = clap::ArgAction::Set
    )]
    pub audit_logging_enabled: bool,

    /// Scenarios to run.
    #[arg(long, env = "E2E_SCENARIO", value_enum, default_value = "all")]
    pub scenario: ScenarioSelection,
}

impl fmt::Debug for E2eConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("E2eConfig")
            .field("hapi_url", &self.hapi_url)
            .field("proxy_url", &self.proxy_url)
            .field("auth_url", &self.auth_url)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &REDACTED)
            .field("log_level", &self.log_level)
            .field("fixtures_dir", &self.fixtures_dir)
            .field("patients", &self.patients)
            .field("resources", &self.resources)
            .field("post_patient", &self.post_patient)
            .field("request_timeout", &self.request_timeout)
            .field("count_poll_deadline", &self.count_poll_deadline)
            .field("count_poll_interval", &self.count_poll_interval)
            .field("audit_poll_deadline", &self.audit_poll_deadline)
            .field("audit_poll_interval", &self.audit_poll_interval)
            .field("audit_logging_enabled", &self.audit_logging_enabled)
            .field("scenario", &self.scenario)
            .finish()
    }
}

impl Default for E2eConfig {
    fn default() -> Self {
        Self {
            hapi_url: DEFAULT_HAPI_URL.to_string(),
            proxy_url: DEFAULT_PROXY_URL.to_string(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            client_id: "my-fhir-client".to_string(),
            username: "testuser".to_string(),
            password: "testpass".to_string(),
            log_level: "info".to_string(),
            fixtures_dir: PathBuf::from("e2e-test"),
            patients: vec!["Patient/75270".to_string(), "Patient/3810".to_string()],
            resources: vec![
                "Encounter:patient".to_string(),
                "Observation:subject".to_string(),
            ],
            post_patient: "Patient/75270".to_string(),
            request_timeout: 30,
            count_poll_deadline: 300,
            count_poll_interval: 10,
            audit_poll_deadline: 300,
            audit_poll_interval: 5,
            audit_logging_enabled: false,
            scenario: ScenarioSelection::All,
        }
    }
}

impl E2eConfig {
    /// Validates the configuration and returns every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        for (name, value) in [
            ("HAPI URL", &self.hapi_url),
            ("proxy URL", &self.proxy_url),
            ("auth URL", &self.auth_url),
        ] {
            if let Err(e) = Url::parse(value) {
                errors.push(format!("Invalid {} '{}': {}", name, value, e));
            }
        }

        if self.request_timeout == 0 {
            errors.push("Request timeout cannot be 0".to_string());
        }

        if let Err(e) = self.count_poll_policy() {
            errors.push(format!("Count poll: {}", e));
        }

        if let Err(e) = self.audit_poll_policy() {
            errors.push(format!("Audit poll: {}", e));
        }

        if self.patients.iter().all(|p| p.trim().is_empty()) {
            errors.push("At least one patient is required".to_string());
        }

        if self.post_patient.trim().is_empty() {
            errors.push("Post patient cannot be empty".to_string());
        }

        if self.resources.is_empty() {
            errors.push("At least one resource pair is required".to_string());
        }
        for resource in &self.resources {
            if let Err(e) = resource.parse::<ResourceSearchPair>() {
                errors.push(format!("Invalid resource pair: {}", e));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Per-request HTTP timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// Poll policy for the post-and-converge scenario.
    pub fn count_poll_policy(&self) -> VerifyResult<PollPolicy> {
        PollPolicy::from_secs(self.count_poll_deadline, self.count_poll_interval)
    }

    /// Poll policy for the audit scenarios.
    pub fn audit_poll_policy(&self) -> VerifyResult<PollPolicy> {
        PollPolicy::from_secs(self.audit_poll_deadline, self.audit_poll_interval)
    }

    /// Parsed resource pairs; malformed entries are skipped (see [`validate`](Self::validate)).
    pub fn resource_pairs(&self) -> Vec<ResourceSearchPair> {
        self.resources
            .iter()
            .filter_map(|resource| resource.parse().ok())
            .collect()
    }

    /// Non-empty, trimmed patient ids.
    pub fn patient_ids(&self) -> Vec<String> {
        self.patients
            .iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect()
    }

    /// OAuth credentials for the password grant.
    pub fn credentials(&self) -> Credentials {
        Credentials {
            client_id: self.client_id.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }

    /// Creates a configuration suitable for testing: short poll windows and
    /// audit scenarios enabled.
    pub fn for_testing() -> Self {
        Self {
            log_level: "debug".to_string(),
            request_timeout: 5,
            count_poll_deadline: 30,
            count_poll_interval: 1,
            audit_poll_deadline: 30,
            audit_poll_interval: 1,
            audit_logging_enabled: true,
            ..Default::default()
        }
    }
}
