use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::signer::{OpensslSigner, Signer};
use super::ticket::{Credentials, TicketSource};
use super::tra::LoginTicketRequest;
use crate::config::ArcaConfig;
use crate::core::{ArcaError, Clock};
use crate::soap::{PathHandler, SoapTransport, envelope, first_text, walk};

pub const WSAA_NS: &str = "http://wsaa.view.sua.dvadac.desein.afip.gov";

const CONTENTION_FAULT_CODE: &str = "alreadyAuthenticated";
const CONTENTION_MESSAGE: &str = "ya posee un TA valido";

/// WSAA `LoginCms` client: signs a TRA and exchanges it for credentials.
pub struct WsaaClient<G = OpensslSigner> {
    transport: SoapTransport,
    signer: G,
    service: String,
    clock: Arc<dyn Clock>,
}

impl WsaaClient<OpensslSigner> {
    pub fn from_config(config: &ArcaConfig, clock: Arc<dyn Clock>) -> Result<Self, ArcaError> {
        Ok(WsaaClient::new(
            &config.wsaa_url,
            config.signer(),
            clock,
            config.timeout(),
            config.legacy_tls,
        )?
        .with_service(&config.service))
    }
}

impl<G: Signer> WsaaClient<G> {
    pub fn new(
        endpoint: &str,
        signer: G,
        clock: Arc<dyn Clock>,
        timeout: std::time::Duration,
        legacy_tls: bool,
    ) -> Result<Self, ArcaError> {
        Ok(Self {
            transport: SoapTransport::new(endpoint, timeout, legacy_tls)?,
            signer,
            service: "wsfe".to_string(),
            clock,
        })
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    /// Whether the WSAA host answers HTTP at all.
    pub async fn is_reachable(&self) -> bool {
        self.transport.is_reachable().await
    }
}

#[async_trait]
impl<G: Signer> TicketSource for WsaaClient<G> {
    async fn request_ticket(&self) -> Result<Credentials, ArcaError> {
        let tra = LoginTicketRequest::new(&self.service, self.clock.now());
        let cms = self.signer.sign(&tra.to_xml()?).await?;
        let cms_b64 = STANDARD.encode(cms);

        let request = envelope("wsaa", WSAA_NS, |w| {
            w.start_element("wsaa:loginCms")?;
            w.text_element("wsaa:in0", &cms_b64)?;
            w.end_element("wsaa:loginCms")?;
            Ok(())
        })?;

        info!(
            endpoint = self.transport.endpoint(),
            service = %self.service,
            "requesting WSAA access ticket"
        );

        let body = self
            .transport
            .call("", request)
            .await
            .map_err(|e| match e {
                ArcaError::SoapFault { code, message } if is_contention(&code, &message) => {
                    ArcaError::TicketContention(message)
                }
                other => other,
            })?;

        parse_login_response(&body)
    }
}

fn is_contention(code: &str, message: &str) -> bool {
    code.contains(CONTENTION_FAULT_CODE) || message.contains(CONTENTION_MESSAGE)
}

#[derive(Default)]
struct LoginTicketResponse {
    token: Option<String>,
    sign: Option<String>,
    expiration_time: Option<String>,
}

impl PathHandler for LoginTicketResponse {
    fn text(&mut self, path: &[String], text: &str) {
        let leaf = path.last().map(String::as_str).unwrap_or("");
        let parent = if path.len() >= 2 {
            path[path.len() - 2].as_str()
        } else {
            ""
        };
        match (parent, leaf) {
            ("credentials", "token") => self.token = Some(text.to_string()),
            ("credentials", "sign") => self.sign = Some(text.to_string()),
            ("header", "expirationTime") => self.expiration_time = Some(text.to_string()),
            _ => {}
        }
    }
}

/// Decode a `loginCms` SOAP response into credentials.
///
/// The `loginCmsReturn` element carries the `loginTicketResponse` document
/// as escaped text.
pub fn parse_login_response(body: &str) -> Result<Credentials, ArcaError> {
    let inner = first_text(body, "loginCmsReturn")?
        .ok_or_else(|| ArcaError::MalformedResponse("missing loginCmsReturn".into()))?;

    let mut ltr = LoginTicketResponse::default();
    walk(&inner, &mut ltr)?;

    let token = ltr
        .token
        .ok_or_else(|| ArcaError::MalformedResponse("token missing from login response".into()))?;
    let sign = ltr
        .sign
        .ok_or_else(|| ArcaError::MalformedResponse("sign missing from login response".into()))?;

    let expires_at = ltr.expiration_time.and_then(|raw| {
        match DateTime::parse_from_rfc3339(raw.trim()) {
            Ok(t) => Some(t.with_timezone(&Utc)),
            Err(e) => {
                warn!(value = %raw, error = %e, "unparseable ticket expirationTime");
                None
            }
        }
    });

    Ok(Credentials {
        token,
        sign,
        expires_at,
    })
}
