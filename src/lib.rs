//! # arca-fe
//!
//! Argentine electronic invoicing against AFIP/ARCA web services: WSAA
//! access tickets, WSFEv1 CAE authorization, IVA rate buckets and local
//! invoice numbering reconciled with the authority's.
//!
//! All monetary values use [`rust_decimal::Decimal`], never floating point.
//!
//! ## Quick Start
//!
//! ```rust
//! use arca_fe::core::*;
//! use rust_decimal_macros::dec;
//!
//! let summary = summarize_lines(&[
//!     LineItemBuilder::new("SKU-1", dec!(1), dec!(500)).iva(dec!(21)).build(),
//!     LineItemBuilder::new("SKU-2", dec!(2), dec!(150)).iva(dec!(10.5)).build(),
//! ])
//! .unwrap();
//!
//! assert_eq!(summary.net, dec!(800.00));
//! assert_eq!(summary.vat, dec!(136.50));
//! assert_eq!(summary.total, dec!(936.50));
//! assert_eq!(summary.bucket(dec!(21)).unwrap().code, IvaCode::GENERAL_21);
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `core` (default) | Sale types, IVA buckets, numbering, validation |
//! | `wsaa` | TRA signing, `LoginCms`, access-ticket cache, configuration |
//! | `wsfe` | WSFEv1 client: `FEDummy`, `FECompUltimoAutorizado`, `FECAESolicitar` |
//! | `ledger` | Invoice store, authorizer and number reconciler |
//! | `sqlite` | SQLite invoice store |
//! | `qr` | RG 4291 QR payload |
//! | `all` | Everything |

#[cfg(feature = "core")]
pub mod core;

#[cfg(feature = "wsaa")]
pub(crate) mod soap;

#[cfg(feature = "wsaa")]
pub mod config;

#[cfg(feature = "wsaa")]
pub mod wsaa;

#[cfg(feature = "wsfe")]
pub mod wsfe;

#[cfg(feature = "ledger")]
pub mod ledger;

#[cfg(feature = "qr")]
pub mod qr;

// Re-export core types at crate root for convenience
#[cfg(feature = "core")]
pub use crate::core::*;
