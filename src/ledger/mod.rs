//! Invoice ledger: provisional numbering, authorization and reconciliation
//! of local records with the authority's numbers.

mod authorizer;
mod reconciler;
mod report;
#[cfg(feature = "sqlite")]
mod sqlite;
mod store;

pub use authorizer::{Authorization, Authorize, InvoiceAuthorizer};
pub use reconciler::{DEFAULT_ATTEMPT_LEASE_MINUTES, Reconciler};
pub use report::StatusReport;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteInvoiceStore;
pub use store::{InvoiceStore, MemoryInvoiceStore, StatusCounts};
