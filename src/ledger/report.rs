use serde::{Deserialize, Serialize};

use super::store::{InvoiceStore, StatusCounts};
use crate::core::{ArcaError, InvoiceRecord, InvoiceStatus};

/// Operator overview of the invoice ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub counts: StatusCounts,
    /// Newest records first.
    pub recent: Vec<InvoiceRecord>,
}

impl StatusReport {
    pub async fn collect(store: &dyn InvoiceStore, limit: usize) -> Result<Self, ArcaError> {
        Ok(Self {
            counts: store.status_counts().await?,
            recent: store.recent(limit).await?,
        })
    }

    /// Recent records waiting for an operator retry.
    pub fn retry_candidates(&self) -> impl Iterator<Item = &InvoiceRecord> {
        self.recent.iter().filter(|r| r.status != InvoiceStatus::Authorized)
    }

    /// Recent authorized records whose visible number differs from the
    /// authority's.
    pub fn mismatched(&self) -> impl Iterator<Item = &InvoiceRecord> {
        self.recent.iter().filter(|r| r.number_mismatch())
    }
}

impl std::fmt::Display for StatusReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let c = &self.counts;
        writeln!(
            f,
            "invoices: {} total, {} authorized, {} pending, {} error, {} with CAE",
            c.total(),
            c.authorized,
            c.pending,
            c.error,
            c.with_cae
        )?;
        for r in &self.recent {
            write!(f, "  #{} {} {:>12} {}", r.id, r.number, r.total(), r.status)?;
            if let Some(cae) = &r.cae {
                write!(f, " CAE {cae}")?;
            }
            if let Some(failure) = &r.failure {
                write!(f, " ({}: {})", failure.kind.as_str(), failure.detail)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
