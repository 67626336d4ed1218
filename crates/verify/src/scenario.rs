//! End-to-end scenarios.
//!
//! [`E2eSuite`] composes the backend clients, the convergence poller and the
//! audit comparator into the scenarios a gateway deployment is checked with:
//!
//! 1. count parity between origin server and proxy
//! 2. post through the proxy, then wait for the proxy count to grow by one
//! 3. post a resource or transaction bundle with audit logging enabled, wait
//!    for the AuditEvent count to grow by the expected delta, and compare the
//!    newest AuditEvents with an expected fixture
//!
//! Scenarios run sequentially and stop at the first failure.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::{error, info, warn};

use crate::audit::{AuditEvent, AuditVerifier, ExpectedAuditFixture};
use crate::clients::{GatewayProxy, OriginServer, ResourceSearchPair, Submission, TokenSource};
use crate::config::E2eConfig;
use crate::error::{VerifyError, VerifyResult};
use crate::poll::{PollPolicy, poll_until};

/// Observation payload posted by the post scenarios.
pub const OBSERVATION_FIXTURE: &str = "obs.json";

/// Transaction bundle payload posted by the bundle audit scenario.
pub const TRANSACTION_BUNDLE_FIXTURE: &str = "transaction_bundle.json";

/// AuditEvents written for a single-resource POST.
pub const SINGLE_RESOURCE_AUDIT_DELTA: u64 = 1;

/// AuditEvents written for the transaction bundle fixture (one per entry).
pub const TRANSACTION_BUNDLE_AUDIT_DELTA: u64 = 2;

/// Scenario driver over injected backend clients.
pub struct E2eSuite<H, P, A>
where
    H: OriginServer,
    P: GatewayProxy,
    A: TokenSource,
{
    hapi: H,
    proxy: P,
    auth: A,
    fixtures_dir: PathBuf,
    count_policy: PollPolicy,
    audit_policy: PollPolicy,
    today: Option<NaiveDate>,
}

impl<H, P, A> E2eSuite<H, P, A>
where
    H: OriginServer,
    P: GatewayProxy,
    A: TokenSource,
{
    /// Creates a suite with the default fixtures directory and poll policies.
    pub fn new(hapi: H, proxy: P, auth: A) -> Self {
        Self {
            hapi,
            proxy,
            auth,
            fixtures_dir: PathBuf::from("e2e-test"),
            count_policy: PollPolicy::RESOURCE_COUNT,
            audit_policy: PollPolicy::AUDIT_EVENT_COUNT,
            today: None,
        }
    }

    /// Creates a suite configured from `config`.
    pub fn from_config(hapi: H, proxy: P, auth: A, config: &E2eConfig) -> VerifyResult<Self> {
        Ok(Self::new(hapi, proxy, auth)
            .with_fixtures_dir(&config.fixtures_dir)
            .with_count_policy(config.count_poll_policy()?)
            .with_audit_policy(config.audit_poll_policy()?))
    }

    /// Sets the directory fixture names are resolved against.
    pub fn with_fixtures_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.fixtures_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Sets the poll policy for resource-count convergence.
    pub fn with_count_policy(mut self, policy: PollPolicy) -> Self {
        self.count_policy = policy;
        self
    }

    /// Sets the poll policy for AuditEvent-count convergence.
    pub fn with_audit_policy(mut self, policy: PollPolicy) -> Self {
        self.audit_policy = policy;
        self
    }

    /// Pins the date `recorded`/`period.end` are compared with. Without it
    /// the local date at verification time is used.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    /// Resolves a fixture file name.
    pub fn fixture_path(&self, file_name: &str) -> PathBuf {
        self.fixtures_dir.join(file_name)
    }

    fn verifier(&self) -> AuditVerifier {
        self.today
            .map(AuditVerifier::with_today)
            .unwrap_or_default()
    }

    /// Checks that origin server and proxy return the same count for every
    /// patient and resource pair.
    pub async fn proxy_and_server_equal_count(
        &self,
        patients: &[String],
        pairs: &[ResourceSearchPair],
    ) -> VerifyResult<()> {
        let token = self.auth.get_auth_token().await?;
        for patient in patients {
            for pair in pairs {
                self.expect_equal_count(&token, pair, patient).await?;
            }
        }
        Ok(())
    }

    async fn expect_equal_count(
        &self,
        token: &str,
        pair: &ResourceSearchPair,
        patient_id: &str,
    ) -> VerifyResult<u64> {
        let server = self
            .hapi
            .get_resource_count(pair.resource_type(), patient_id)
            .await?;
        let proxy = self
            .proxy
            .get_resource_count(token, pair, patient_id)
            .await?;

        info!(
            resource_type = pair.resource_type(),
            patient = patient_id,
            server,
            proxy,
            "Resource counts"
        );

        if server != proxy {
            error!(
                resource_type = pair.resource_type(),
                patient = patient_id,
                server,
                proxy,
                "Number of resources do not match"
            );
            return Err(VerifyError::CountMismatch {
                resource_type: pair.resource_type().to_string(),
                patient_id: patient_id.to_string(),
                server,
                proxy,
            });
        }
        Ok(proxy)
    }

    /// Posts `file_name` through the proxy and waits until the proxy count
    /// for `patient_id` is exactly one higher. Returns the new count.
    ///
    /// Every poll attempt fetches a fresh token before querying the proxy.
    pub async fn post_resource_increase_count(
        &self,
        pair: &ResourceSearchPair,
        file_name: &str,
        patient_id: &str,
    ) -> VerifyResult<u64> {
        let token = self.auth.get_auth_token().await?;
        let baseline = self.expect_equal_count(&token, pair, patient_id).await?;

        info!(
            resource_type = pair.resource_type(),
            patient = patient_id,
            "Adding one resource"
        );
        let submission = Submission::Resource(pair.resource_type().to_string());
        self.proxy
            .post_resource(&submission, &self.fixture_path(file_name), &token)
            .await?;

        let target = baseline + 1;
        let expectation = format!(
            "proxy {} count for {} == {}",
            pair.resource_type(),
            patient_id,
            target
        );
        let auth = &self.auth;
        let proxy = &self.proxy;
        let count = poll_until(
            &self.count_policy,
            &expectation,
            move || async move {
                let token = auth.get_auth_token().await?;
                proxy.get_resource_count(&token, pair, patient_id).await
            },
            |count| *count == target,
        )
        .await?;

        info!(
            resource_type = pair.resource_type(),
            patient = patient_id,
            count,
            "Added one resource"
        );
        Ok(count)
    }

    /// Posts a single Observation and verifies the AuditEvent it produces.
    pub async fn post_resource_creates_audit_event(&self, file_name: &str) -> VerifyResult<()> {
        self.post_and_verify_audit_events(
            &Submission::Resource("Observation".to_string()),
            file_name,
            SINGLE_RESOURCE_AUDIT_DELTA,
        )
        .await
    }

    /// Posts a transaction bundle and verifies one AuditEvent per entry.
    pub async fn post_bundle_creates_audit_events(&self, file_name: &str) -> VerifyResult<()> {
        self.post_and_verify_audit_events(
            &Submission::TransactionBundle,
            file_name,
            TRANSACTION_BUNDLE_AUDIT_DELTA,
        )
        .await
    }

    /// Posts `file_name`, waits for the AuditEvent count to grow by exactly
    /// `expected_increase`, then compares the newest AuditEvents with the
    /// expected fixture for `submission`, position by position.
    pub async fn post_and_verify_audit_events(
        &self,
        submission: &Submission,
        file_name: &str,
        expected_increase: u64,
    ) -> VerifyResult<()> {
        let expected_path = self.fixture_path(&submission.expected_audit_fixture_name());
        let expected = ExpectedAuditFixture::load(&expected_path)?;
        let newest = usize::try_from(expected_increase).unwrap_or(usize::MAX);
        if expected.len() < newest {
            return Err(VerifyError::MalformedFixture {
                source_name: expected_path.display().to_string(),
                reason: format!(
                    "{} expected AuditEvents for {} new events",
                    expected.len(),
                    expected_increase
                ),
            });
        }

        let token = self.auth.get_auth_token().await?;
        let baseline = self.hapi.get_audit_event_count().await?;
        info!(file = file_name, baseline, "AuditEvent count before posting");

        self.proxy
            .post_resource(submission, &self.fixture_path(file_name), &token)
            .await?;
        info!(
            payload_type = submission.payload_type(),
            "Posted resource via proxy"
        );

        let target = baseline + expected_increase;
        let expectation = format!("AuditEvent count == {}", target);
        let hapi = &self.hapi;
        poll_until(
            &self.audit_policy,
            &expectation,
            move || hapi.get_audit_event_count(),
            |count| *count == target,
        )
        .await?;

        let entries = self.hapi.get_audit_events(newest).await?;
        if entries.len() < newest {
            return Err(VerifyError::UnexpectedResponse {
                endpoint: "AuditEvent".to_string(),
                message: format!(
                    "expected {} newest AuditEvents, got {}",
                    newest,
                    entries.len()
                ),
            });
        }

        let verifier = self.verifier();
        for (index, entry) in entries.iter().enumerate() {
            let Some(resource) = entry.get("resource").filter(|r| r.is_object()) else {
                warn!(index, entry = %entry, "AuditEvent resource is not an object");
                continue;
            };
            let Some(expected_event) = expected.get(index) else {
                break;
            };
            verifier.verify(expected_event, &AuditEvent::from_value(resource))?;
        }

        info!(
            payload_type = submission.payload_type(),
            verified = entries.len(),
            "AuditEvents created successfully"
        );
        Ok(())
    }

    /// Runs the scenarios selected in `config`, in order, stopping at the
    /// first failure.
    pub async fn run(&self, config: &E2eConfig) -> VerifyResult<()> {
        let selection = config.scenario;

        if selection.includes_counts() {
            info!("Testing proxy and server resource counts");
            self.proxy_and_server_equal_count(&config.patient_ids(), &config.resource_pairs())
                .await?;
        }

        if selection.includes_post() {
            info!("Testing post resource");
            self.post_resource_increase_count(
                &ResourceSearchPair::new("Observation", "subject"),
                OBSERVATION_FIXTURE,
                config.post_patient.trim(),
            )
            .await?;
        }

        if selection.includes_audit() {
            if config.audit_logging_enabled {
                info!("Testing POST resource with AuditEvent logging enabled");
                self.post_resource_creates_audit_event(OBSERVATION_FIXTURE)
                    .await?;

                info!("Testing POST bundle with AuditEvent logging enabled");
                self.post_bundle_creates_audit_events(TRANSACTION_BUNDLE_FIXTURE)
                    .await?;
            } else {
                info!("AuditEvent logging is disabled; skipping audit scenarios");
            }
        }

        Ok(())
    }
}
