use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::{info, warn};

use crate::core::{ArcaError, InvoiceRecord, Observation};
use crate::wsaa::TicketProvider;
use crate::wsfe::{Auth, CaeRequest, CaeResponse, WsfeClient};

/// A granted authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    pub cae: String,
    pub cae_expiry: NaiveDate,
    /// Voucher number the authority recorded.
    pub voucher_number: u64,
    pub observations: Vec<Observation>,
}

/// Obtains a CAE for a persisted record.
#[async_trait]
pub trait Authorize: Send + Sync {
    async fn authorize(&self, record: &InvoiceRecord) -> Result<Authorization, ArcaError>;
}

#[async_trait]
impl<T: Authorize + ?Sized> Authorize for Arc<T> {
    async fn authorize(&self, record: &InvoiceRecord) -> Result<Authorization, ArcaError> {
        (**self).authorize(record).await
    }
}

/// Authorizes vouchers against WSFEv1 using WSAA tickets.
///
/// One call runs ticket lookup, an `FEDummy` probe, the last-number query
/// and `FECAESolicitar`, in that order. A maintenance page at any step
/// aborts with `ServiceUnavailable`; a failed probe or last-number query
/// that is not a maintenance page is logged and the flow continues.
pub struct InvoiceAuthorizer<P> {
    tickets: P,
    wsfe: WsfeClient,
    cuit: u64,
}

impl<P: TicketProvider> InvoiceAuthorizer<P> {
    pub fn new(tickets: P, wsfe: WsfeClient, cuit: u64) -> Self {
        Self {
            tickets,
            wsfe,
            cuit,
        }
    }

    pub fn wsfe(&self) -> &WsfeClient {
        &self.wsfe
    }

    async fn probe(&self) -> Result<(), ArcaError> {
        match self.wsfe.server_status().await {
            Ok(status) if !status.is_healthy() => {
                warn!(
                    app = %status.app_server,
                    db = %status.db_server,
                    auth = %status.auth_server,
                    "WSFE reports degraded servers"
                );
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(e @ ArcaError::ServiceUnavailable(_)) => Err(e),
            Err(e) => {
                warn!(error = %e, "FEDummy probe failed; continuing");
                Ok(())
            }
        }
    }

    async fn last_number(&self, auth: &Auth, record: &InvoiceRecord) -> Result<u64, ArcaError> {
        match self
            .wsfe
            .last_authorized(auth, record.point_of_sale, record.voucher_type)
            .await
        {
            Ok(n) => Ok(n),
            Err(e @ ArcaError::ServiceUnavailable(_)) => Err(e),
            Err(e) => {
                warn!(
                    error = %e,
                    point_of_sale = record.point_of_sale,
                    voucher_type = record.voucher_type.code(),
                    "last authorized number unavailable; assuming 0"
                );
                Ok(0)
            }
        }
    }
}

#[async_trait]
impl<P: TicketProvider> Authorize for InvoiceAuthorizer<P> {
    async fn authorize(&self, record: &InvoiceRecord) -> Result<Authorization, ArcaError> {
        let ticket = self.tickets.valid_ticket().await?;
        let auth = Auth::from_ticket(&ticket, self.cuit);

        self.probe().await?;
        let next = self.last_number(&auth, record).await? + 1;

        let request = CaeRequest::from_record(record, next);
        match self.wsfe.request_cae(&auth, &request).await? {
            CaeResponse::Approved {
                cae,
                cae_expiry,
                voucher_number,
                observations,
            } => {
                let voucher_number = voucher_number.unwrap_or(next);
                info!(
                    id = record.id,
                    cae = %cae,
                    voucher_number,
                    "CAE granted"
                );
                for obs in &observations {
                    warn!(code = obs.code, message = %obs.message, "authority observation");
                }
                Ok(Authorization {
                    cae,
                    cae_expiry,
                    voucher_number,
                    observations,
                })
            }
            CaeResponse::Rejected {
                result,
                observations,
            } => {
                warn!(id = record.id, result = %result, "CAE request rejected");
                Err(ArcaError::AuthorityRejected { observations })
            }
        }
    }
}
