//! WSFEv1 electronic invoicing service: request encoding, response decoding
//! and the HTTP client.

mod client;
mod request;
mod response;

pub use client::WsfeClient;
pub use request::{
    Auth, CaeRequest, ReportedAmounts, WSFE_NS, dummy_envelope, last_authorized_envelope,
    soap_action,
};
pub use response::{
    CaeResponse, ServerStatus, parse_cae_response, parse_last_authorized, parse_server_status,
};
