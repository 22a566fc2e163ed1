//! Service configuration.
//!
//! Endpoint defaults follow the selected [`Environment`]; every value can be
//! overridden through `ARCA_*` environment variables or explicit
//! construction.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::ArcaError;
use crate::wsaa::{FileTicketStore, MemoryTicketStore, OpensslSigner, TicketStore};

pub const WSAA_HOMOLOGATION_URL: &str = "https://wsaahomo.afip.gov.ar/ws/services/LoginCms";
pub const WSAA_PRODUCTION_URL: &str = "https://wsaa.afip.gov.ar/ws/services/LoginCms";
pub const WSFE_HOMOLOGATION_URL: &str = "https://wswhomo.afip.gov.ar/wsfev1/service.asmx";
pub const WSFE_PRODUCTION_URL: &str = "https://servicios1.afip.gov.ar/wsfev1/service.asmx";

/// Authority environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    /// Testing environment ("homologación").
    #[default]
    Homologation,
    Production,
}

impl Environment {
    pub fn wsaa_url(&self) -> &'static str {
        match self {
            Self::Homologation => WSAA_HOMOLOGATION_URL,
            Self::Production => WSAA_PRODUCTION_URL,
        }
    }

    pub fn wsfe_url(&self) -> &'static str {
        match self {
            Self::Homologation => WSFE_HOMOLOGATION_URL,
            Self::Production => WSFE_PRODUCTION_URL,
        }
    }

    fn parse(raw: &str) -> Result<Self, ArcaError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "homologation" | "homologacion" | "homo" | "testing" => Ok(Self::Homologation),
            "production" | "produccion" | "prod" => Ok(Self::Production),
            other => Err(ArcaError::Config(format!(
                "ARCA_ENVIRONMENT must be homologation or production, got {other:?}"
            ))),
        }
    }
}

/// Everything needed to talk to WSAA and WSFEv1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArcaConfig {
    /// Issuer CUIT, 11 digits.
    pub cuit: u64,
    pub point_of_sale: u32,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub environment: Environment,
    pub wsaa_url: String,
    pub wsfe_url: String,
    /// Timeout for every outbound call, in seconds.
    pub timeout_secs: u64,
    /// Accept the authority's legacy TLS setup (certificate verification off).
    pub legacy_tls: bool,
    /// Persist the access ticket here; in-memory when unset.
    pub ticket_cache_path: Option<PathBuf>,
    pub contention_delay_secs: u64,
    pub openssl_bin: PathBuf,
    /// WSAA service name the ticket is requested for.
    pub service: String,
}

impl ArcaConfig {
    /// Defaults for `environment`: endpoints, 60 s timeout, 30 s contention
    /// delay, `openssl` from `PATH`, service `wsfe`.
    pub fn new(
        cuit: u64,
        point_of_sale: u32,
        cert_path: impl Into<PathBuf>,
        key_path: impl Into<PathBuf>,
        environment: Environment,
    ) -> Self {
        Self {
            cuit,
            point_of_sale,
            cert_path: cert_path.into(),
            key_path: key_path.into(),
            environment,
            wsaa_url: environment.wsaa_url().to_string(),
            wsfe_url: environment.wsfe_url().to_string(),
            timeout_secs: 60,
            legacy_tls: false,
            ticket_cache_path: None,
            contention_delay_secs: 30,
            openssl_bin: PathBuf::from("openssl"),
            service: "wsfe".to_string(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `ARCA_CUIT` (required)
    /// - `ARCA_CERT_PATH`, `ARCA_KEY_PATH` (required)
    /// - `ARCA_POINT_OF_SALE` (default: 1)
    /// - `ARCA_ENVIRONMENT` (`homologation` or `production`, default: homologation)
    /// - `ARCA_WSAA_URL`, `ARCA_WSFE_URL` (default: per environment)
    /// - `ARCA_TIMEOUT_SECS` (default: 60)
    /// - `ARCA_LEGACY_TLS` (default: false)
    /// - `ARCA_TICKET_CACHE` (default: unset, in-memory)
    /// - `ARCA_CONTENTION_DELAY_SECS` (default: 30)
    /// - `ARCA_OPENSSL` (default: `openssl`)
    /// - `ARCA_SERVICE` (default: `wsfe`)
    pub fn from_env() -> Result<Self, ArcaError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ArcaConfig::from_env`], reading values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ArcaError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ArcaError::Config(format!("{key} environment variable is required")))
        };

        let cuit_raw = required("ARCA_CUIT")?;
        let cuit_digits: String = cuit_raw.chars().filter(|c| *c != '-').collect();
        let cuit = cuit_digits
            .parse::<u64>()
            .map_err(|_| ArcaError::Config(format!("ARCA_CUIT is not numeric: {cuit_raw:?}")))?;
        if cuit_digits.len() != 11 {
            return Err(ArcaError::Config(format!(
                "ARCA_CUIT must have 11 digits, got {cuit_raw:?}"
            )));
        }

        let environment = match lookup("ARCA_ENVIRONMENT") {
            Some(raw) => Environment::parse(&raw)?,
            None => Environment::default(),
        };

        let mut config = Self::new(
            cuit,
            parse_or(&lookup, "ARCA_POINT_OF_SALE", 1)?,
            required("ARCA_CERT_PATH")?,
            required("ARCA_KEY_PATH")?,
            environment,
        );

        if let Some(url) = lookup("ARCA_WSAA_URL") {
            config.wsaa_url = url;
        }
        if let Some(url) = lookup("ARCA_WSFE_URL") {
            config.wsfe_url = url;
        }
        config.timeout_secs = parse_or(&lookup, "ARCA_TIMEOUT_SECS", 60)?;
        config.legacy_tls = parse_bool(&lookup, "ARCA_LEGACY_TLS")?;
        config.ticket_cache_path = lookup("ARCA_TICKET_CACHE").map(PathBuf::from);
        config.contention_delay_secs = parse_or(&lookup, "ARCA_CONTENTION_DELAY_SECS", 30)?;
        if let Some(bin) = lookup("ARCA_OPENSSL") {
            config.openssl_bin = PathBuf::from(bin);
        }
        if let Some(service) = lookup("ARCA_SERVICE") {
            config.service = service;
        }

        Ok(config)
    }

    /// Configuration pointing both services at a local mock server.
    pub fn local_mock(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        let mut config = Self::new(
            20123456786,
            1,
            "cert.crt",
            "key.key",
            Environment::Homologation,
        );
        config.wsaa_url = format!("{base}/ws/services/LoginCms");
        config.wsfe_url = format!("{base}/wsfev1/service.asmx");
        config.timeout_secs = 5;
        config.contention_delay_secs = 0;
        config
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn contention_delay(&self) -> Duration {
        Duration::from_secs(self.contention_delay_secs)
    }

    pub fn signer(&self) -> OpensslSigner {
        OpensslSigner::new(&self.cert_path, &self.key_path).with_binary(&self.openssl_bin)
    }

    pub fn ticket_store(&self) -> Arc<dyn TicketStore> {
        match &self.ticket_cache_path {
            Some(path) => Arc::new(FileTicketStore::new(path)),
            None => Arc::new(MemoryTicketStore::default()),
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ArcaError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ArcaError::Config(format!("{key} has an invalid value: {raw:?}"))),
        None => Ok(default),
    }
}

fn parse_bool<F>(lookup: &F, key: &str) -> Result<bool, ArcaError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).as_deref().map(str::trim) {
        None | Some("") => Ok(false),
        Some("1") | Some("true") | Some("yes") => Ok(true),
        Some("0") | Some("false") | Some("no") => Ok(false),
        Some(other) => Err(ArcaError::Config(format!(
            "{key} must be true or false, got {other:?}"
        ))),
    }
}
