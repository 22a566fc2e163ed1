//! End-to-end checkout against the homologation environment.
//!
//! ```sh
//! ARCA_CUIT=20123456786 ARCA_CERT_PATH=cert.crt ARCA_KEY_PATH=key.key \
//! ARCA_TICKET_CACHE=/tmp/arca-ta.json RUST_LOG=arca_fe=debug \
//!     cargo run --example checkout --features ledger
//! ```
//!
//! Set `ARCA_RETRY=<id>` to re-authorize an invoice instead of creating one.

use std::sync::Arc;

use arca_fe::config::ArcaConfig;
use arca_fe::core::*;
use arca_fe::ledger::{
    InvoiceAuthorizer, InvoiceStore, MemoryInvoiceStore, Reconciler, StatusReport,
};
use arca_fe::wsaa::{TicketCache, WsaaClient};
use arca_fe::wsfe::WsfeClient;
use rust_decimal_macros::dec;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ArcaError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("arca_fe=info")),
        )
        .init();

    let config = ArcaConfig::from_env()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let wsaa = WsaaClient::from_config(&config, clock.clone())?;
    let tickets = TicketCache::new(wsaa, clock.clone())
        .with_store(config.ticket_store())
        .with_contention_delay(config.contention_delay());
    let wsfe = WsfeClient::from_config(&config)?;
    let authorizer = InvoiceAuthorizer::new(tickets, wsfe, config.cuit);

    let store: Arc<dyn InvoiceStore> = Arc::new(MemoryInvoiceStore::new());
    let reconciler = Reconciler::new(store.clone(), authorizer, clock);

    let record = match std::env::var("ARCA_RETRY").ok().and_then(|v| v.parse().ok()) {
        Some(id) => reconciler.retry(id).await?,
        None => {
            let draft = DraftSaleBuilder::new(VoucherType::FacturaB, config.point_of_sale)
                .add_line(
                    LineItemBuilder::new("YERBA-1KG", dec!(2), dec!(2450.00))
                        .description("Yerba mate 1 kg")
                        .build(),
                )
                .add_line(
                    LineItemBuilder::new("PAN-LACT", dec!(1), dec!(1180.50))
                        .iva(dec!(10.5))
                        .build(),
                )
                .build()?;
            reconciler.checkout(draft).await?
        }
    };

    println!("invoice {} is {}", record.number, record.status);
    match (&record.cae, &record.failure) {
        (Some(cae), _) => println!("  CAE {cae} expires {:?}", record.cae_expiry),
        (None, Some(failure)) => {
            println!("  {}: {}", failure.kind.as_str(), failure.detail);
            println!("  retry with ARCA_RETRY={}", record.id);
        }
        (None, None) => {}
    }
    if record.number_mismatch() {
        println!(
            "  authority recorded number {:?}; provisional number kept",
            record.authority_number
        );
    }

    println!("\n{}", StatusReport::collect(store.as_ref(), 10).await?);
    Ok(())
}
