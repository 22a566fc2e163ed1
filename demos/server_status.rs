//! Check connectivity and WSFEv1 server state.
//!
//! ```sh
//! ARCA_CUIT=20123456786 ARCA_CERT_PATH=cert.crt ARCA_KEY_PATH=key.key \
//!     cargo run --example server_status --features wsfe
//! ```

use std::sync::Arc;

use arca_fe::config::ArcaConfig;
use arca_fe::core::{ArcaError, SystemClock};
use arca_fe::wsaa::WsaaClient;
use arca_fe::wsfe::WsfeClient;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ArcaError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("arca_fe=debug")),
        )
        .init();

    let config = ArcaConfig::from_env()?;
    println!("environment: {:?}", config.environment);

    match config.signer().probe().await {
        Ok(version) => println!("signing tool: {version}"),
        Err(e) => println!("signing tool: {e}"),
    }

    let wsaa = WsaaClient::from_config(&config, Arc::new(SystemClock))?;
    println!("WSAA {}: reachable={}", config.wsaa_url, wsaa.is_reachable().await);

    let wsfe = WsfeClient::from_config(&config)?;
    println!("WSFE {}: reachable={}", wsfe.endpoint(), wsfe.is_reachable().await);

    match wsfe.server_status().await {
        Ok(status) => {
            println!(
                "FEDummy: app={} db={} auth={}",
                status.app_server, status.db_server, status.auth_server
            );
            if !status.is_healthy() {
                println!("WSFE is degraded; invoices will keep their provisional numbers");
            }
        }
        Err(e) => println!("FEDummy failed ({:?}): {e}", e.kind()),
    }
    Ok(())
}
