use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::{
    ArcaError, InvoiceNumber, InvoiceRecord, InvoiceStatus, NewInvoice, ProvisionalSequence,
    VoucherType,
};

/// Number of records per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: u64,
    pub authorized: u64,
    pub error: u64,
    /// Records carrying a CAE, whatever their status.
    pub with_cae: u64,
}

impl StatusCounts {
    pub fn total(&self) -> u64 {
        self.pending + self.authorized + self.error
    }

    pub(crate) fn add(&mut self, status: InvoiceStatus, has_cae: bool) {
        match status {
            InvoiceStatus::Pending => self.pending += 1,
            InvoiceStatus::Authorized => self.authorized += 1,
            InvoiceStatus::Error => self.error += 1,
        }
        if has_cae {
            self.with_cae += 1;
        }
    }
}

/// Persistence for invoice records.
///
/// Records are created by [`reserve`](InvoiceStore::reserve) and afterwards
/// only updated. A record's current number is unique across the store.
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    /// Atomically pick the next free provisional number for the invoice's
    /// voucher type and point of sale and persist a pending record with it.
    async fn reserve(&self, invoice: NewInvoice) -> Result<InvoiceRecord, ArcaError>;

    async fn get(&self, id: u64) -> Result<InvoiceRecord, ArcaError>;

    /// Claim a record for a new authorization attempt.
    ///
    /// Compare-and-set on the stored status: an `error` record, or a
    /// `pending` one last touched at or before `stale_before`, becomes
    /// `pending` with `updated_at = now` and is returned. An authorized
    /// record is returned unchanged.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id, `AttemptInProgress` when a pending
    /// attempt newer than `stale_before` holds the record.
    async fn begin_attempt(
        &self,
        id: u64,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<InvoiceRecord, ArcaError>;

    /// Whether a record other than `except` currently holds `number`.
    async fn number_in_use(
        &self,
        number: &InvoiceNumber,
        except: Option<u64>,
    ) -> Result<bool, ArcaError>;

    /// Overwrite a record.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id, `NumberConflict` when another record
    /// holds the record's number.
    async fn update(&self, record: &InvoiceRecord) -> Result<(), ArcaError>;

    /// Most recent records first.
    async fn recent(&self, limit: usize) -> Result<Vec<InvoiceRecord>, ArcaError>;

    async fn status_counts(&self) -> Result<StatusCounts, ArcaError>;
}

/// Whether a record in `status`, last touched at `updated_at`, may be
/// claimed. `Ok(false)` means it is already authorized.
pub(crate) fn claimable(
    id: u64,
    status: InvoiceStatus,
    updated_at: DateTime<Utc>,
    stale_before: DateTime<Utc>,
) -> Result<bool, ArcaError> {
    match status {
        InvoiceStatus::Authorized => Ok(false),
        InvoiceStatus::Pending if updated_at > stale_before => {
            Err(ArcaError::AttemptInProgress(id))
        }
        InvoiceStatus::Pending | InvoiceStatus::Error => Ok(true),
    }
}

/// In-process store; numbering is centralized behind one mutex.
#[derive(Debug, Default)]
pub struct MemoryInvoiceStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    records: BTreeMap<u64, InvoiceRecord>,
    next_id: u64,
}

impl Inner {
    fn holder_of(&self, number: &InvoiceNumber) -> Option<u64> {
        self.records
            .values()
            .find(|r| r.number == *number)
            .map(|r| r.id)
    }

    fn last_sequence(&self, voucher_type: VoucherType, point_of_sale: u32) -> u64 {
        self.records
            .values()
            .filter(|r| r.voucher_type == voucher_type && r.point_of_sale == point_of_sale)
            .map(|r| r.number.sequence)
            .max()
            .unwrap_or(0)
    }
}

impl MemoryInvoiceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing records, e.g. ones loaded from another system.
    pub fn from_records(records: impl IntoIterator<Item = InvoiceRecord>) -> Self {
        let records: BTreeMap<u64, InvoiceRecord> =
            records.into_iter().map(|r| (r.id, r)).collect();
        let next_id = records.keys().next_back().copied().unwrap_or(0);
        Self {
            inner: Mutex::new(Inner { records, next_id }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl InvoiceStore for MemoryInvoiceStore {
    async fn reserve(&self, invoice: NewInvoice) -> Result<InvoiceRecord, ArcaError> {
        let mut inner = self.inner.lock();
        let last = inner.last_sequence(invoice.voucher_type, invoice.point_of_sale);
        let number = ProvisionalSequence::starting_after(invoice.point_of_sale, last)
            .next_free(|n| inner.holder_of(n).is_some())?;

        inner.next_id += 1;
        let record = invoice.into_record(inner.next_id, number);
        inner.records.insert(record.id, record.clone());
        debug!(id = record.id, number = %record.number, "reserved provisional number");
        Ok(record)
    }

    async fn get(&self, id: u64) -> Result<InvoiceRecord, ArcaError> {
        self.inner
            .lock()
            .records
            .get(&id)
            .cloned()
            .ok_or(ArcaError::NotFound(id))
    }

    async fn begin_attempt(
        &self,
        id: u64,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<InvoiceRecord, ArcaError> {
        let mut inner = self.inner.lock();
        let record = inner.records.get_mut(&id).ok_or(ArcaError::NotFound(id))?;
        if claimable(id, record.status, record.updated_at, stale_before)? {
            record.status = InvoiceStatus::Pending;
            record.updated_at = now;
            debug!(id, "claimed invoice for authorization");
        }
        Ok(record.clone())
    }

    async fn number_in_use(
        &self,
        number: &InvoiceNumber,
        except: Option<u64>,
    ) -> Result<bool, ArcaError> {
        let inner = self.inner.lock();
        Ok(inner
            .holder_of(number)
            .is_some_and(|holder| Some(holder) != except))
    }

    async fn update(&self, record: &InvoiceRecord) -> Result<(), ArcaError> {
        let mut inner = self.inner.lock();
        if !inner.records.contains_key(&record.id) {
            return Err(ArcaError::NotFound(record.id));
        }
        if inner
            .holder_of(&record.number)
            .is_some_and(|holder| holder != record.id)
        {
            return Err(ArcaError::NumberConflict(record.number.to_string()));
        }
        inner.records.insert(record.id, record.clone());
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<InvoiceRecord>, ArcaError> {
        Ok(self
            .inner
            .lock()
            .records
            .values()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn status_counts(&self) -> Result<StatusCounts, ArcaError> {
        let inner = self.inner.lock();
        let mut counts = StatusCounts::default();
        for r in inner.records.values() {
            counts.add(r.status, r.cae.is_some());
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Concept, IvaSummary, LineItemBuilder, summarize_lines};
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn new_invoice(voucher_type: VoucherType, point_of_sale: u32) -> NewInvoice {
        let line = LineItemBuilder::new("SKU-1", dec!(1), dec!(100)).build();
        let iva: IvaSummary = summarize_lines(std::slice::from_ref(&line)).unwrap();
        NewInvoice {
            voucher_type,
            point_of_sale,
            concept: Concept::Products,
            buyer: None,
            currency: "PES".into(),
            exchange_rate: dec!(1),
            lines: vec![line],
            iva,
            issue_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 15, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn first_reservation_starts_at_one() {
        let store = MemoryInvoiceStore::new();
        let rec = store
            .reserve(new_invoice(VoucherType::FacturaB, 1))
            .await
            .unwrap();
        assert_eq!(rec.id, 1);
        assert_eq!(rec.number.to_string(), "0001-00000001");
        assert_eq!(rec.status, InvoiceStatus::Pending);
    }

    #[tokio::test]
    async fn numbers_stay_unique_across_voucher_types() {
        let store = MemoryInvoiceStore::new();
        store
            .reserve(new_invoice(VoucherType::FacturaB, 2))
            .await
            .unwrap();
        let a = store
            .reserve(new_invoice(VoucherType::FacturaA, 2))
            .await
            .unwrap();
        assert_eq!(a.number.to_string(), "0002-00000002");
        let other_pos = store
            .reserve(new_invoice(VoucherType::FacturaA, 5))
            .await
            .unwrap();
        assert_eq!(other_pos.number.to_string(), "0005-00000001");
    }

    #[tokio::test]
    async fn update_rejects_taken_number() {
        let store = MemoryInvoiceStore::new();
        let first = store
            .reserve(new_invoice(VoucherType::FacturaB, 1))
            .await
            .unwrap();
        let mut second = store
            .reserve(new_invoice(VoucherType::FacturaB, 1))
            .await
            .unwrap();
        second.number = first.number;
        let err = store.update(&second).await.unwrap_err();
        assert!(matches!(err, ArcaError::NumberConflict(_)));
        assert!(store.number_in_use(&first.number, Some(second.id)).await.unwrap());
        assert!(!store.number_in_use(&first.number, Some(first.id)).await.unwrap());
    }

    #[tokio::test]
    async fn begin_attempt_claims_only_idle_records() {
        let store = MemoryInvoiceStore::new();
        let reserved = store
            .reserve(new_invoice(VoucherType::FacturaB, 1))
            .await
            .unwrap();
        let created = reserved.created_at;
        let later = created + chrono::Duration::minutes(1);

        // Fresh pending record: an attempt is still running.
        let err = store
            .begin_attempt(reserved.id, later, created - chrono::Duration::minutes(10))
            .await
            .unwrap_err();
        assert!(matches!(err, ArcaError::AttemptInProgress(1)));

        // Stale pending record: the attempt was abandoned.
        let claimed = store.begin_attempt(reserved.id, later, created).await.unwrap();
        assert_eq!(claimed.status, InvoiceStatus::Pending);
        assert_eq!(claimed.updated_at, later);

        let mut failed = claimed;
        failed.status = InvoiceStatus::Error;
        store.update(&failed).await.unwrap();
        let claimed = store
            .begin_attempt(failed.id, later, created - chrono::Duration::days(1))
            .await
            .unwrap();
        assert_eq!(claimed.status, InvoiceStatus::Pending);

        let mut done = claimed;
        done.status = InvoiceStatus::Authorized;
        store.update(&done).await.unwrap();
        let unchanged = store.begin_attempt(done.id, later, later).await.unwrap();
        assert_eq!(unchanged, done);

        assert!(matches!(
            store.begin_attempt(9, later, later).await,
            Err(ArcaError::NotFound(9))
        ));
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let store = MemoryInvoiceStore::new();
        assert!(matches!(store.get(9).await, Err(ArcaError::NotFound(9))));
    }

    #[tokio::test]
    async fn recent_is_newest_first() {
        let store = MemoryInvoiceStore::new();
        for _ in 0..3 {
            store
                .reserve(new_invoice(VoucherType::FacturaB, 1))
                .await
                .unwrap();
        }
        let ids: Vec<u64> = store.recent(2).await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 2]);
        assert_eq!(store.status_counts().await.unwrap().pending, 3);
    }
}
