use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::{ArcaError, Observation};
use crate::soap::{PathHandler, walk};

/// Outcome of a `FECAESolicitar` call for a single voucher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaeResponse {
    Approved {
        cae: String,
        cae_expiry: NaiveDate,
        /// `CbteDesde` echoed by the authority.
        voucher_number: Option<u64>,
        observations: Vec<Observation>,
    },
    Rejected {
        /// `Resultado` as sent (`R`, or anything other than `A`).
        result: String,
        observations: Vec<Observation>,
    },
}

/// `FEDummy` server states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatus {
    pub app_server: String,
    pub db_server: String,
    pub auth_server: String,
}

impl ServerStatus {
    pub fn is_healthy(&self) -> bool {
        [&self.app_server, &self.db_server, &self.auth_server]
            .iter()
            .all(|s| s.eq_ignore_ascii_case("OK"))
    }
}

#[derive(Default)]
struct CodeMsg {
    code: Option<i64>,
    message: Option<String>,
}

impl CodeMsg {
    fn take(&mut self) -> Observation {
        let taken = std::mem::take(self);
        Observation {
            code: taken.code.unwrap_or_default(),
            message: taken.message.unwrap_or_default(),
        }
    }
}

#[derive(Default)]
struct WsfeResponse {
    // FECAESolicitar
    detail_seen: bool,
    detail_result: Option<String>,
    voucher_from: Option<u64>,
    cae: Option<String>,
    cae_expiry: Option<String>,
    observations: Vec<Observation>,
    // FECompUltimoAutorizado
    last_number: Option<u64>,
    // FEDummy
    app_server: Option<String>,
    db_server: Option<String>,
    auth_server: Option<String>,
    // shared
    errors: Vec<Observation>,
    events: Vec<Observation>,
    current: CodeMsg,
    invalid: Option<String>,
}

impl WsfeResponse {
    fn parse(body: &str) -> Result<Self, ArcaError> {
        let mut r = Self::default();
        walk(body, &mut r)?;
        if let Some(problem) = r.invalid.take() {
            return Err(ArcaError::MalformedResponse(problem));
        }
        for evt in &r.events {
            info!(code = evt.code, message = %evt.message, "WSFE event");
        }
        Ok(r)
    }

    fn number(&mut self, field: &str, text: &str) -> Option<u64> {
        match text.trim().parse() {
            Ok(n) => Some(n),
            Err(_) => {
                self.invalid
                    .get_or_insert_with(|| format!("{field} is not a number: {text:?}"));
                None
            }
        }
    }
}

impl PathHandler for WsfeResponse {
    fn text(&mut self, path: &[String], text: &str) {
        let leaf = path.last().map(String::as_str).unwrap_or("");
        let parent = if path.len() >= 2 {
            path[path.len() - 2].as_str()
        } else {
            ""
        };

        match (parent, leaf) {
            ("Obs" | "Err" | "Evt", "Code") => {
                self.current.code = self.number("Code", text).map(|n| n as i64);
            }
            ("Obs" | "Err" | "Evt", "Msg") => self.current.message = Some(text.to_string()),
            ("FECAEDetResponse", "Resultado") => self.detail_result = Some(text.to_string()),
            ("FECAEDetResponse", "CbteDesde") => {
                self.voucher_from = self.number("CbteDesde", text);
            }
            ("FECAEDetResponse", "CAE") => self.cae = Some(text.to_string()),
            ("FECAEDetResponse", "CAEFchVto") => self.cae_expiry = Some(text.to_string()),
            ("FECompUltimoAutorizadoResult", "CbteNro") => {
                self.last_number = self.number("CbteNro", text);
            }
            ("FEDummyResult", "AppServer") => self.app_server = Some(text.to_string()),
            ("FEDummyResult", "DbServer") => self.db_server = Some(text.to_string()),
            ("FEDummyResult", "AuthServer") => self.auth_server = Some(text.to_string()),
            _ => {}
        }
    }

    fn end(&mut self, _path: &[String], name: &str) {
        match name {
            "Obs" => {
                let obs = self.current.take();
                self.observations.push(obs);
            }
            "Err" => {
                let err = self.current.take();
                self.errors.push(err);
            }
            "Evt" => {
                let evt = self.current.take();
                self.events.push(evt);
            }
            "FECAEDetResponse" => self.detail_seen = true,
            _ => {}
        }
    }
}

/// Decode a `FECAESolicitar` response.
///
/// # Errors
///
/// - `AuthorityRejected` when the response carries top-level `Errors`
/// - `MalformedResponse` when the detail is missing, or an approval lacks
///   its CAE or a parseable expiry
pub fn parse_cae_response(body: &str) -> Result<CaeResponse, ArcaError> {
    let r = WsfeResponse::parse(body)?;

    if !r.errors.is_empty() {
        return Err(ArcaError::AuthorityRejected {
            observations: r.errors,
        });
    }
    if !r.detail_seen {
        return Err(ArcaError::MalformedResponse(
            "response has no FECAEDetResponse".into(),
        ));
    }

    let result = r.detail_result.unwrap_or_default();
    if result != "A" {
        return Ok(CaeResponse::Rejected {
            result,
            observations: r.observations,
        });
    }

    let cae = r
        .cae
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ArcaError::MalformedResponse("approved response without CAE".into()))?;
    let raw_expiry = r.cae_expiry.ok_or_else(|| {
        ArcaError::MalformedResponse("approved response without CAEFchVto".into())
    })?;
    let cae_expiry = NaiveDate::parse_from_str(raw_expiry.trim(), "%Y%m%d").map_err(|_| {
        ArcaError::MalformedResponse(format!("CAEFchVto is not YYYYMMDD: {raw_expiry:?}"))
    })?;

    Ok(CaeResponse::Approved {
        cae,
        cae_expiry,
        voucher_number: r.voucher_from,
        observations: r.observations,
    })
}

/// Decode a `FECompUltimoAutorizado` response into the last voucher number.
pub fn parse_last_authorized(body: &str) -> Result<u64, ArcaError> {
    let r = WsfeResponse::parse(body)?;
    if !r.errors.is_empty() {
        return Err(ArcaError::AuthorityRejected {
            observations: r.errors,
        });
    }
    r.last_number
        .ok_or_else(|| ArcaError::MalformedResponse("response has no CbteNro".into()))
}

/// Decode a `FEDummy` response.
pub fn parse_server_status(body: &str) -> Result<ServerStatus, ArcaError> {
    let r = WsfeResponse::parse(body)?;
    match (r.app_server, r.db_server, r.auth_server) {
        (Some(app_server), Some(db_server), Some(auth_server)) => Ok(ServerStatus {
            app_server,
            db_server,
            auth_server,
        }),
        _ => Err(ArcaError::MalformedResponse(
            "FEDummy response is missing server states".into(),
        )),
    }
}
