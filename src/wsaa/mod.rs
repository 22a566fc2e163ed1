//! WSAA authentication: TRA construction, CMS signing, `LoginCms` and the
//! shared access-ticket cache.

mod client;
mod signer;
mod store;
mod ticket;
mod tra;

pub use client::{WSAA_NS, WsaaClient, parse_login_response};
pub use signer::{OpensslSigner, Signer};
pub use store::{FileTicketStore, MemoryTicketStore, TicketStore};
pub use ticket::{
    AccessTicket, Credentials, DEFAULT_CONTENTION_DELAY, REUSE_WINDOW_HOURS, TicketCache,
    TicketProvider, TicketSource,
};
pub use tra::{LoginTicketRequest, TRA_LIFETIME_HOURS};
