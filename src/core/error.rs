use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while preparing, authorizing or persisting an invoice.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ArcaError {
    /// Signing certificate or private key file is missing.
    #[error("certificate material not found: {0}")]
    CertificateNotFound(String),

    /// The signing tool failed or produced no output.
    #[error("signing error: {0}")]
    Signing(String),

    /// WSAA reports that a valid ticket already exists for this service.
    #[error("ticket contention: {0}")]
    TicketContention(String),

    /// Response XML did not have the expected shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The service answered with a maintenance page or a bare 5xx.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// SOAP fault returned by the service.
    #[error("SOAP fault [{code}]: {message}")]
    SoapFault { code: String, message: String },

    /// Network-level failure (connect, timeout, TLS).
    #[error("transport error: {0}")]
    Transport(String),

    /// The authority explicitly rejected the request.
    #[error("rejected by authority: {}", format_observations(.observations))]
    AuthorityRejected { observations: Vec<Observation> },

    /// A draft without line items cannot be invoiced.
    #[error("no line items")]
    NoLineItems,

    /// One or more validation rules failed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Invoice number parsing or sequencing error.
    #[error("numbering error: {0}")]
    Numbering(String),

    /// Another record already holds this invoice number.
    #[error("invoice number already in use: {0}")]
    NumberConflict(String),

    /// Requested record does not exist.
    #[error("invoice {0} not found")]
    NotFound(u64),

    /// Another authorization attempt for this record has not finished.
    #[error("invoice {0} has an authorization attempt in progress")]
    AttemptInProgress(u64),

    /// Invoice storage failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// XML generation error.
    #[error("XML error: {0}")]
    Xml(String),
}

/// Operator-facing classification of an authorization failure.
///
/// The reconciler stores every failure as `InvoiceStatus::Error`; the kind
/// keeps maintenance windows, rejections and credential problems apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ServiceUnavailable,
    Rejected,
    Credentials,
    Transport,
    MalformedResponse,
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServiceUnavailable => "service_unavailable",
            Self::Rejected => "rejected",
            Self::Credentials => "credentials",
            Self::Transport => "transport",
            Self::MalformedResponse => "malformed_response",
            Self::Internal => "internal",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "service_unavailable" => Some(Self::ServiceUnavailable),
            "rejected" => Some(Self::Rejected),
            "credentials" => Some(Self::Credentials),
            "transport" => Some(Self::Transport),
            "malformed_response" => Some(Self::MalformedResponse),
            "internal" => Some(Self::Internal),
            _ => None,
        }
    }
}

impl ArcaError {
    /// Classify this error for the invoice's failure record.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::ServiceUnavailable(_) => FailureKind::ServiceUnavailable,
            Self::AuthorityRejected { .. } => FailureKind::Rejected,
            Self::CertificateNotFound(_) | Self::Signing(_) | Self::TicketContention(_) => {
                FailureKind::Credentials
            }
            Self::Transport(_) | Self::SoapFault { .. } => FailureKind::Transport,
            Self::MalformedResponse(_) | Self::Xml(_) => FailureKind::MalformedResponse,
            _ => FailureKind::Internal,
        }
    }
}

/// Observation, error or event code attached to an authority response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub code: i64,
    pub message: String,
}

impl std::fmt::Display for Observation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

fn format_observations(observations: &[Observation]) -> String {
    if observations.is_empty() {
        return "no observations".to_string();
    }
    observations
        .iter()
        .map(|o| o.to_string())
        .collect::<Vec<_>>()
        .join(" | ")
}

/// A single validation error with field path and message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dot-separated path to the invalid field (e.g. "lines[0].quantity").
    pub field: String,
    /// Human-readable error description.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_message_joins_observations() {
        let err = ArcaError::AuthorityRejected {
            observations: vec![
                Observation {
                    code: 10016,
                    message: "CbteDesde invalido".into(),
                },
                Observation {
                    code: 10048,
                    message: "ImpTotal mal calculado".into(),
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "rejected by authority: [10016] CbteDesde invalido | [10048] ImpTotal mal calculado"
        );
        assert_eq!(err.kind(), FailureKind::Rejected);
    }

    #[test]
    fn failure_kinds_round_trip_through_str() {
        for kind in [
            FailureKind::ServiceUnavailable,
            FailureKind::Rejected,
            FailureKind::Credentials,
            FailureKind::Transport,
            FailureKind::MalformedResponse,
            FailureKind::Internal,
        ] {
            assert_eq!(FailureKind::from_str_opt(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn maintenance_and_contention_are_distinct_kinds() {
        assert_eq!(
            ArcaError::ServiceUnavailable("html".into()).kind(),
            FailureKind::ServiceUnavailable
        );
        assert_eq!(
            ArcaError::TicketContention("ya posee un TA valido".into()).kind(),
            FailureKind::Credentials
        );
    }
}
