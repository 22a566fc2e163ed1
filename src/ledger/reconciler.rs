use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use tracing::{error, info, warn};

use super::authorizer::Authorize;
use super::store::InvoiceStore;
use crate::core::{
    ArcaError, AuthorizationFailure, Clock, DraftSale, InvoiceNumber, InvoiceRecord,
    InvoiceStatus, NewInvoice, argentina_date, summarize_lines, validate_draft,
};

/// How long a pending attempt holds its record before a retry may take it
/// over. Covers a ticket contention wait plus the SOAP timeouts.
pub const DEFAULT_ATTEMPT_LEASE_MINUTES: i64 = 10;

const UPDATE_ATTEMPTS: u32 = 3;
const UPDATE_BACKOFF: StdDuration = StdDuration::from_millis(100);

/// Drives an invoice from provisional number to authorized record.
///
/// A checkout persists a pending record before any remote call, so a failed
/// authorization never loses the sale: the record stays at its provisional
/// number with status `error` until [`retry`](Reconciler::retry) succeeds.
/// Every attempt first claims its record in the store, so one sale never has
/// two authorization requests in flight.
pub struct Reconciler<A> {
    store: Arc<dyn InvoiceStore>,
    authorizer: A,
    clock: Arc<dyn Clock>,
    attempt_lease: Duration,
}

impl<A: Authorize> Reconciler<A> {
    pub fn new(store: Arc<dyn InvoiceStore>, authorizer: A, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            authorizer,
            clock,
            attempt_lease: Duration::minutes(DEFAULT_ATTEMPT_LEASE_MINUTES),
        }
    }

    pub fn with_attempt_lease(mut self, lease: Duration) -> Self {
        self.attempt_lease = lease;
        self
    }

    pub fn store(&self) -> &Arc<dyn InvoiceStore> {
        &self.store
    }

    /// Validate, reserve a provisional number and try to authorize.
    ///
    /// Returns the persisted record whatever the authorization outcome.
    ///
    /// # Errors
    ///
    /// - `NoLineItems` / `Validation` for an invalid draft
    /// - storage errors while reserving or updating the record
    pub async fn checkout(&self, draft: DraftSale) -> Result<InvoiceRecord, ArcaError> {
        if draft.lines.is_empty() {
            return Err(ArcaError::NoLineItems);
        }
        let errors = validate_draft(&draft);
        if !errors.is_empty() {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            return Err(ArcaError::Validation(messages.join("; ")));
        }

        let iva = summarize_lines(&draft.lines)?;
        for w in &iva.warnings {
            warn!(
                rate = %w.rate,
                reported_as = w.reported_as.0,
                "IVA rate has no authority code; reported with the general rate code"
            );
        }

        let now = self.clock.now();
        let record = self
            .store
            .reserve(NewInvoice {
                voucher_type: draft.voucher_type,
                point_of_sale: draft.point_of_sale,
                concept: draft.concept,
                buyer: draft.buyer,
                currency: draft.currency,
                exchange_rate: draft.exchange_rate,
                lines: draft.lines,
                iva,
                issue_date: argentina_date(now),
                created_at: now,
            })
            .await?;
        info!(
            id = record.id,
            number = %record.number,
            total = %record.total(),
            "invoice reserved"
        );

        self.authorize_and_finalize(record).await
    }

    /// Re-run authorization for a record that is not yet authorized.
    ///
    /// The record keeps its id, provisional number and line items; its issue
    /// date moves to today. An authorized record is returned unchanged.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown id
    /// - `AttemptInProgress` while another attempt on the record is pending
    ///   and younger than the attempt lease
    /// - storage errors while claiming or updating the record
    pub async fn retry(&self, id: u64) -> Result<InvoiceRecord, ArcaError> {
        let now = self.clock.now();
        let mut record = self
            .store
            .begin_attempt(id, now, now - self.attempt_lease)
            .await?;
        if record.is_authorized() {
            info!(id, number = %record.number, "invoice already authorized");
            return Ok(record);
        }

        let today = argentina_date(now);
        if record.issue_date != today {
            info!(id, from = %record.issue_date, to = %today, "moving issue date to today");
            record.issue_date = today;
        }
        info!(id, number = %record.number, attempts = record.attempts, "retrying authorization");
        self.authorize_and_finalize(record).await
    }

    async fn authorize_and_finalize(
        &self,
        mut record: InvoiceRecord,
    ) -> Result<InvoiceRecord, ArcaError> {
        record.attempts += 1;
        let outcome = self.authorizer.authorize(&record).await;
        record.updated_at = self.clock.now();

        match outcome {
            Ok(granted) => {
                let authority = InvoiceNumber::new(record.point_of_sale, granted.voucher_number);
                let in_use = self.store.number_in_use(&authority, Some(record.id)).await;
                record.number = match in_use {
                    Ok(false) => authority,
                    Ok(true) => {
                        warn!(
                            id = record.id,
                            provisional = %record.provisional_number,
                            authority = %authority,
                            "authority number already used locally; keeping provisional number"
                        );
                        record.provisional_number
                    }
                    Err(e) => {
                        warn!(
                            id = record.id,
                            authority = %authority,
                            error = %e,
                            "cannot check authority number; keeping provisional number"
                        );
                        record.provisional_number
                    }
                };
                record.authority_number = Some(granted.voucher_number);
                record.cae = Some(granted.cae);
                record.cae_expiry = Some(granted.cae_expiry);
                record.status = InvoiceStatus::Authorized;
                record.failure = None;
            }
            Err(e) => {
                warn!(
                    id = record.id,
                    number = %record.number,
                    kind = e.kind().as_str(),
                    error = %e,
                    "authorization failed; invoice kept at provisional number"
                );
                record.number = record.provisional_number;
                record.status = InvoiceStatus::Error;
                record.failure = Some(AuthorizationFailure {
                    kind: e.kind(),
                    detail: e.to_string(),
                });
            }
        }

        self.persist(&mut record).await?;

        if record.is_authorized() {
            info!(
                id = record.id,
                number = %record.number,
                cae = record.cae.as_deref().unwrap_or_default(),
                "invoice authorized"
            );
        }
        Ok(record)
    }

    /// Write the outcome of an attempt, retrying transient storage errors.
    async fn persist(&self, record: &mut InvoiceRecord) -> Result<(), ArcaError> {
        let mut attempt = 1;
        loop {
            match self.store.update(record).await {
                Ok(()) => return Ok(()),
                // Another record took the authority number between the check
                // and the write.
                Err(ArcaError::NumberConflict(taken))
                    if record.number != record.provisional_number =>
                {
                    warn!(
                        id = record.id,
                        number = %taken,
                        "number taken concurrently; keeping provisional number"
                    );
                    record.number = record.provisional_number;
                }
                Err(e) if attempt < UPDATE_ATTEMPTS => {
                    warn!(id = record.id, attempt, error = %e, "cannot persist invoice; retrying");
                    tokio::time::sleep(UPDATE_BACKOFF * attempt).await;
                    attempt += 1;
                }
                Err(e) => {
                    if record.is_authorized() {
                        error!(
                            id = record.id,
                            number = %record.number,
                            authority_number = record.authority_number.unwrap_or_default(),
                            cae = record.cae.as_deref().unwrap_or_default(),
                            cae_expiry = ?record.cae_expiry,
                            error = %e,
                            "CAE granted but not persisted; record it by hand"
                        );
                    }
                    return Err(e);
                }
            }
        }
    }
}
