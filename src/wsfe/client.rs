use std::time::Duration;

use tracing::{debug, info};

use super::request::{Auth, CaeRequest, dummy_envelope, last_authorized_envelope, soap_action};
use super::response::{
    CaeResponse, ServerStatus, parse_cae_response, parse_last_authorized, parse_server_status,
};
use crate::config::ArcaConfig;
use crate::core::{ArcaError, VoucherType};
use crate::soap::SoapTransport;

/// WSFEv1 client.
#[derive(Debug, Clone)]
pub struct WsfeClient {
    transport: SoapTransport,
}

impl WsfeClient {
    pub fn new(endpoint: &str, timeout: Duration, legacy_tls: bool) -> Result<Self, ArcaError> {
        Ok(Self {
            transport: SoapTransport::new(endpoint, timeout, legacy_tls)?,
        })
    }

    pub fn from_config(config: &ArcaConfig) -> Result<Self, ArcaError> {
        Self::new(&config.wsfe_url, config.timeout(), config.legacy_tls)
    }

    pub fn endpoint(&self) -> &str {
        self.transport.endpoint()
    }

    /// Cheap connectivity check: any HTTP answer from the endpoint.
    pub async fn is_reachable(&self) -> bool {
        self.transport.is_reachable().await
    }

    /// `FEDummy`: application, database and authentication server states.
    pub async fn server_status(&self) -> Result<ServerStatus, ArcaError> {
        let body = self
            .transport
            .call(&soap_action("FEDummy"), dummy_envelope()?)
            .await?;
        let status = parse_server_status(&body)?;
        debug!(
            app = %status.app_server,
            db = %status.db_server,
            auth = %status.auth_server,
            "FEDummy"
        );
        Ok(status)
    }

    /// `FECompUltimoAutorizado`: last voucher number the authority has
    /// recorded for this point of sale and voucher type.
    pub async fn last_authorized(
        &self,
        auth: &Auth,
        point_of_sale: u32,
        voucher_type: VoucherType,
    ) -> Result<u64, ArcaError> {
        let body = self
            .transport
            .call(
                &soap_action("FECompUltimoAutorizado"),
                last_authorized_envelope(auth, point_of_sale, voucher_type)?,
            )
            .await?;
        let last = parse_last_authorized(&body)?;
        debug!(point_of_sale, voucher_type = voucher_type.code(), last, "last authorized voucher");
        Ok(last)
    }

    /// `FECAESolicitar` for a single voucher.
    pub async fn request_cae(
        &self,
        auth: &Auth,
        request: &CaeRequest,
    ) -> Result<CaeResponse, ArcaError> {
        info!(
            point_of_sale = request.point_of_sale,
            voucher_type = request.voucher_type.code(),
            voucher_number = request.voucher_number,
            total = %request.iva.total,
            "requesting CAE"
        );
        let body = self
            .transport
            .call(&soap_action("FECAESolicitar"), request.to_envelope(auth)?)
            .await?;
        parse_cae_response(&body)
    }
}
