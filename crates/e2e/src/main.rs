//! Helios Gateway E2E runner
//!
//! Runs the end-to-end scenarios against a gateway proxy, its origin HAPI
//! server and the authorization server. Exits non-zero on the first failure.

use clap::Parser;
use helios_gateway_verify::clients::auth::AuthClient;
use helios_gateway_verify::clients::hapi::HapiClient;
use helios_gateway_verify::clients::proxy::FhirProxyClient;
use helios_gateway_verify::{E2eConfig, E2eSuite, init_logging};
use tracing::{error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let config = E2eConfig::parse();
    init_logging(&config.log_level);

    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Configuration error: {}", error);
        }
        std::process::exit(1);
    }

    info!(
        hapi = %config.hapi_url,
        proxy = %config.proxy_url,
        scenario = ?config.scenario,
        audit_logging_enabled = config.audit_logging_enabled,
        "Starting gateway e2e run"
    );

    let timeout = config.request_timeout();
    let hapi = HapiClient::new(&config.hapi_url, timeout)
        .map_err(|e| anyhow::anyhow!("Invalid HAPI client configuration: {}", e))?;
    let proxy = FhirProxyClient::new(&config.proxy_url, timeout)
        .map_err(|e| anyhow::anyhow!("Invalid proxy client configuration: {}", e))?;
    let auth = AuthClient::new(&config.auth_url, config.credentials(), timeout)?;

    let suite = E2eSuite::from_config(hapi, proxy, auth, &config)?;

    if let Err(e) = suite.run(&config).await {
        error!(error = %e, "E2E run failed");
        return Err(e.into());
    }

    info!("All selected scenarios passed");
    Ok(())
}
