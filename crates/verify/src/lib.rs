//! # helios-gateway-verify - FHIR Gateway End-to-End Verification
//!
//! This crate checks a FHIR gateway proxy deployed in front of a HAPI FHIR
//! server. It talks to three backends over HTTP: the origin server, the
//! gateway proxy and an OAuth2 authorization server issuing bearer tokens.
//!
//! ## Features
//!
//! - **Count Parity**: The proxy returns the same per-patient resource counts as the origin server
//! - **Post Convergence**: A resource posted through the proxy becomes visible within a deadline
//! - **Audit Verification**: Posts produce AuditEvents that match an expected fixture field by field
//! - **Date Normalization**: FHIR date/dateTime strings are compared by calendar date
//!
//! ## Architecture
//!
//! Backends are reached through the [`OriginServer`], [`GatewayProxy`] and
//! [`TokenSource`] traits, so [`E2eSuite`] can be driven by the reqwest
//! clients in [`clients`] or by in-memory fakes in tests. Post-conditions that
//! depend on asynchronous indexing or audit writing are observed through
//! [`poll_until`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use clap::Parser;
//! use helios_gateway_verify::clients::{auth::AuthClient, hapi::HapiClient, proxy::FhirProxyClient};
//! use helios_gateway_verify::{E2eConfig, E2eSuite};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let config = E2eConfig::parse();
//!     let timeout = config.request_timeout();
//!
//!     let suite = E2eSuite::from_config(
//!         HapiClient::new(&config.hapi_url, timeout)?,
//!         FhirProxyClient::new(&config.proxy_url, timeout)?,
//!         AuthClient::new(&config.auth_url, config.credentials(), timeout)?,
//!         &config,
//!     )?;
//!     suite.run(&config).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod audit;
pub mod clients;
pub mod config;
pub mod date;
pub mod error;
pub mod fixtures;
pub mod poll;
pub mod scenario;

pub use audit::{AuditEvent, AuditField, AuditFieldMismatch, AuditVerifier, ExpectedAuditFixture};
pub use clients::{GatewayProxy, OriginServer, ResourceSearchPair, Submission, TokenSource};
pub use config::{E2eConfig, ScenarioSelection};
pub use error::{VerifyError, VerifyResult};
pub use poll::{PollPolicy, poll_until};
pub use scenario::E2eSuite;

/// Initializes the tracing subscriber.
///
/// `RUST_LOG` takes precedence over `level` when set.
pub fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "helios_gateway_verify={},helios_gateway_e2e={}",
            level, level
        ))
    });

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}
