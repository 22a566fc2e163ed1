//! Core invoice types, IVA bucketing, and numbering.
//!
//! This module provides the data model shared by the WSAA, WSFE and ledger
//! layers: authority code tables, draft sales, IVA summaries, the
//! `PPPP-NNNNNNNN` invoice number and draft validation.

mod builder;
mod clock;
mod codes;
pub mod currencies;
mod error;
mod iva;
mod numbering;
mod types;
mod validation;

pub use builder::*;
pub use clock::*;
pub use codes::*;
pub use currencies::is_known_currency_code;
pub use error::*;
pub use iva::{
    Alicuota, IvaBucket, IvaCode, IvaCodeLookup, IvaSummary, TaxableAmount, UnmappedRate,
    iva_code, summarize, summarize_lines,
};
pub use numbering::*;
pub use types::*;
pub use validation::*;

pub(crate) use iva::round_half_up;
