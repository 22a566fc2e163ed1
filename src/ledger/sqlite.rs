//! SQLite-backed invoice store.
//!
//! Reservation runs inside `BEGIN IMMEDIATE`, which takes the write lock up
//! front, and the `number` column is `UNIQUE`. A reservation that still
//! loses a race to another process is retried with a fresh number.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions,
    SqliteSynchronous,
};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info, warn};

use super::store::{InvoiceStore, StatusCounts, claimable};
use crate::core::{
    ArcaError, AuthorizationFailure, Concept, FailureKind, InvoiceNumber, InvoiceRecord,
    InvoiceStatus, NewInvoice, ProvisionalSequence, VoucherType,
};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

const RESERVE_ATTEMPTS: usize = 5;

const SELECT_COLUMNS: &str = "SELECT id, number, provisional_number, voucher_type, point_of_sale, \
     concept, buyer, currency, exchange_rate, lines, iva, issue_date, status, authority_number, \
     cae, cae_expiry, failure_kind, failure_detail, attempts, created_at, updated_at \
     FROM invoices";

/// Invoice store persisted in a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteInvoiceStore {
    pool: SqlitePool,
}

impl SqliteInvoiceStore {
    /// Open (creating if needed) the database at `path` and apply migrations.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self, ArcaError> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening invoice database");
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(10));
        Self::open(options, 5).await
    }

    /// Private in-memory database, for tests and demos.
    pub async fn in_memory() -> Result<Self, ArcaError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(storage)?;
        // Every connection to :memory: is a separate database.
        Self::open(options, 1).await
    }

    async fn open(options: SqliteConnectOptions, max_connections: u32) -> Result<Self, ArcaError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(storage)?;
        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| ArcaError::Storage(format!("migration failed: {e}")))?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn try_reserve(&self, invoice: &NewInvoice) -> Result<InvoiceRecord, ArcaError> {
        let mut conn = self.pool.acquire().await.map_err(storage)?;
        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *conn)
            .await
            .map_err(storage)?;

        let result = insert_next(&mut conn, invoice).await;
        let end = if result.is_ok() { "COMMIT" } else { "ROLLBACK" };
        sqlx::query(end)
            .execute(&mut *conn)
            .await
            .map_err(storage)?;

        drop(conn);
        self.get(result?).await
    }

    /// Compare-and-set the record's status under the write lock.
    async fn claim_attempt(
        &self,
        id: u64,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<(), ArcaError> {
        let mut conn = self.pool.acquire().await.map_err(storage)?;
        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *conn)
            .await
            .map_err(storage)?;

        let result = claim(&mut conn, id, now, stale_before).await;
        let end = if result.is_ok() { "COMMIT" } else { "ROLLBACK" };
        sqlx::query(end)
            .execute(&mut *conn)
            .await
            .map_err(storage)?;
        result
    }
}

async fn claim(
    conn: &mut SqliteConnection,
    id: u64,
    now: DateTime<Utc>,
    stale_before: DateTime<Utc>,
) -> Result<(), ArcaError> {
    let row: Option<(String, DateTime<Utc>)> =
        sqlx::query_as("SELECT status, updated_at FROM invoices WHERE id = ?1")
            .bind(to_i64(id)?)
            .fetch_optional(&mut *conn)
            .await
            .map_err(storage)?;
    let (status, updated_at) = row.ok_or(ArcaError::NotFound(id))?;
    let status = InvoiceStatus::from_str_opt(&status)
        .ok_or_else(|| ArcaError::Storage(format!("invoice {id}: invalid status")))?;

    if claimable(id, status, updated_at, stale_before)? {
        sqlx::query("UPDATE invoices SET status = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(to_i64(id)?)
            .bind(InvoiceStatus::Pending.as_str())
            .bind(now)
            .execute(&mut *conn)
            .await
            .map_err(storage)?;
        debug!(id, "claimed invoice for authorization");
    }
    Ok(())
}

async fn insert_next(conn: &mut SqliteConnection, invoice: &NewInvoice) -> Result<u64, ArcaError> {
    let last: Option<i64> = sqlx::query_scalar(
        "SELECT MAX(sequence) FROM invoices WHERE voucher_type = ?1 AND point_of_sale = ?2",
    )
    .bind(i64::from(invoice.voucher_type.code()))
    .bind(i64::from(invoice.point_of_sale))
    .fetch_one(&mut *conn)
    .await
    .map_err(storage)?;

    let mut sequence =
        ProvisionalSequence::starting_after(invoice.point_of_sale, to_u64(last.unwrap_or(0))?);
    let number = loop {
        let candidate = sequence.next_number()?;
        let taken: Option<i64> = sqlx::query_scalar("SELECT id FROM invoices WHERE number = ?1")
            .bind(candidate.to_string())
            .fetch_optional(&mut *conn)
            .await
            .map_err(storage)?;
        if taken.is_none() {
            break candidate;
        }
        debug!(number = %candidate, "provisional number taken; trying next");
    };

    let number_text = number.to_string();
    let result = sqlx::query(
        "INSERT INTO invoices (number, provisional_number, voucher_type, point_of_sale, sequence, \
         concept, buyer, currency, exchange_rate, lines, iva, issue_date, status, attempts, \
         created_at, updated_at) \
         VALUES (?1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 0, ?13, ?13)",
    )
    .bind(&number_text)
    .bind(i64::from(invoice.voucher_type.code()))
    .bind(i64::from(invoice.point_of_sale))
    .bind(to_i64(number.sequence)?)
    .bind(i64::from(invoice.concept.code()))
    .bind(invoice.buyer.as_ref().map(to_json).transpose()?)
    .bind(&invoice.currency)
    .bind(invoice.exchange_rate.to_string())
    .bind(to_json(&invoice.lines)?)
    .bind(to_json(&invoice.iva)?)
    .bind(invoice.issue_date)
    .bind(InvoiceStatus::Pending.as_str())
    .bind(invoice.created_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| conflict_or_storage(e, &number_text))?;

    let id = to_u64(result.last_insert_rowid())?;
    debug!(id, number = %number, "reserved provisional number");
    Ok(id)
}

#[async_trait]
impl InvoiceStore for SqliteInvoiceStore {
    async fn reserve(&self, invoice: NewInvoice) -> Result<InvoiceRecord, ArcaError> {
        let mut last_conflict = String::new();
        for attempt in 1..=RESERVE_ATTEMPTS {
            match self.try_reserve(&invoice).await {
                Err(ArcaError::NumberConflict(number)) => {
                    warn!(
                        attempt,
                        number = %number,
                        "provisional number lost to a concurrent writer"
                    );
                    last_conflict = number;
                }
                other => return other,
            }
        }
        Err(ArcaError::NumberConflict(last_conflict))
    }

    async fn get(&self, id: u64) -> Result<InvoiceRecord, ArcaError> {
        let row: Option<InvoiceRow> = sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE id = ?1"))
            .bind(to_i64(id)?)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        row.ok_or(ArcaError::NotFound(id))?.try_into()
    }

    async fn begin_attempt(
        &self,
        id: u64,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<InvoiceRecord, ArcaError> {
        self.claim_attempt(id, now, stale_before).await?;
        self.get(id).await
    }

    async fn number_in_use(
        &self,
        number: &InvoiceNumber,
        except: Option<u64>,
    ) -> Result<bool, ArcaError> {
        let holder: Option<i64> = sqlx::query_scalar("SELECT id FROM invoices WHERE number = ?1")
            .bind(number.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        match holder {
            Some(id) => Ok(Some(to_u64(id)?) != except),
            None => Ok(false),
        }
    }

    async fn update(&self, record: &InvoiceRecord) -> Result<(), ArcaError> {
        let number_text = record.number.to_string();
        let result = sqlx::query(
            "UPDATE invoices SET number = ?2, sequence = ?3, status = ?4, authority_number = ?5, \
             cae = ?6, cae_expiry = ?7, failure_kind = ?8, failure_detail = ?9, attempts = ?10, \
             buyer = ?11, lines = ?12, iva = ?13, issue_date = ?14, updated_at = ?15 \
             WHERE id = ?1",
        )
        .bind(to_i64(record.id)?)
        .bind(&number_text)
        .bind(to_i64(record.number.sequence)?)
        .bind(record.status.as_str())
        .bind(record.authority_number.map(to_i64).transpose()?)
        .bind(record.cae.as_deref())
        .bind(record.cae_expiry)
        .bind(record.failure.as_ref().map(|f| f.kind.as_str()))
        .bind(record.failure.as_ref().map(|f| f.detail.as_str()))
        .bind(i64::from(record.attempts))
        .bind(record.buyer.as_ref().map(to_json).transpose()?)
        .bind(to_json(&record.lines)?)
        .bind(to_json(&record.iva)?)
        .bind(record.issue_date)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or_storage(e, &number_text))?;

        if result.rows_affected() == 0 {
            return Err(ArcaError::NotFound(record.id));
        }
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<InvoiceRecord>, ArcaError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<InvoiceRow> =
            sqlx::query_as(&format!("{SELECT_COLUMNS} ORDER BY id DESC LIMIT ?1"))
                .bind(limit)
                .fetch_all(&self.pool)
                .await
                .map_err(storage)?;
        rows.into_iter().map(InvoiceRecord::try_from).collect()
    }

    async fn status_counts(&self) -> Result<StatusCounts, ArcaError> {
        let rows: Vec<(String, i64, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*), COUNT(cae) FROM invoices GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        let mut counts = StatusCounts::default();
        for (status, total, with_cae) in rows {
            let total = to_u64(total)?;
            match InvoiceStatus::from_str_opt(&status) {
                Some(InvoiceStatus::Pending) => counts.pending += total,
                Some(InvoiceStatus::Authorized) => counts.authorized += total,
                Some(InvoiceStatus::Error) => counts.error += total,
                None => return Err(ArcaError::Storage(format!("unknown status {status:?}"))),
            }
            counts.with_cae += to_u64(with_cae)?;
        }
        Ok(counts)
    }
}

#[derive(Debug, FromRow)]
struct InvoiceRow {
    id: i64,
    number: String,
    provisional_number: String,
    voucher_type: i64,
    point_of_sale: i64,
    concept: i64,
    buyer: Option<String>,
    currency: String,
    exchange_rate: String,
    lines: String,
    iva: String,
    issue_date: NaiveDate,
    status: String,
    authority_number: Option<i64>,
    cae: Option<String>,
    cae_expiry: Option<NaiveDate>,
    failure_kind: Option<String>,
    failure_detail: Option<String>,
    attempts: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<InvoiceRow> for InvoiceRecord {
    type Error = ArcaError;

    fn try_from(row: InvoiceRow) -> Result<Self, Self::Error> {
        let voucher_type = u16::try_from(row.voucher_type)
            .ok()
            .and_then(VoucherType::from_code)
            .ok_or_else(|| corrupt(row.id, "voucher_type"))?;
        let concept = u16::try_from(row.concept)
            .ok()
            .and_then(Concept::from_code)
            .ok_or_else(|| corrupt(row.id, "concept"))?;
        let status =
            InvoiceStatus::from_str_opt(&row.status).ok_or_else(|| corrupt(row.id, "status"))?;
        let failure = match row.failure_kind {
            Some(kind) => Some(AuthorizationFailure {
                kind: FailureKind::from_str_opt(&kind)
                    .ok_or_else(|| corrupt(row.id, "failure_kind"))?,
                detail: row.failure_detail.unwrap_or_default(),
            }),
            None => None,
        };

        Ok(InvoiceRecord {
            id: to_u64(row.id)?,
            number: row.number.parse()?,
            provisional_number: row.provisional_number.parse()?,
            voucher_type,
            point_of_sale: u32::try_from(row.point_of_sale)
                .map_err(|_| corrupt(row.id, "point_of_sale"))?,
            concept,
            buyer: row.buyer.as_deref().map(from_json).transpose()?,
            currency: row.currency,
            exchange_rate: Decimal::from_str(&row.exchange_rate)
                .map_err(|_| corrupt(row.id, "exchange_rate"))?,
            lines: from_json(&row.lines)?,
            iva: from_json(&row.iva)?,
            issue_date: row.issue_date,
            status,
            authority_number: row.authority_number.map(to_u64).transpose()?,
            cae: row.cae,
            cae_expiry: row.cae_expiry,
            failure,
            attempts: u32::try_from(row.attempts).map_err(|_| corrupt(row.id, "attempts"))?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn storage(e: sqlx::Error) -> ArcaError {
    ArcaError::Storage(e.to_string())
}

fn conflict_or_storage(e: sqlx::Error, number: &str) -> ArcaError {
    match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            ArcaError::NumberConflict(number.to_string())
        }
        other => storage(other),
    }
}

fn corrupt(id: i64, column: &str) -> ArcaError {
    ArcaError::Storage(format!("invoice {id}: invalid {column}"))
}

fn to_i64(n: u64) -> Result<i64, ArcaError> {
    i64::try_from(n).map_err(|_| ArcaError::Storage(format!("{n} does not fit in INTEGER")))
}

fn to_u64(n: i64) -> Result<u64, ArcaError> {
    u64::try_from(n).map_err(|_| ArcaError::Storage(format!("negative value {n}")))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, ArcaError> {
    serde_json::to_string(value).map_err(|e| ArcaError::Storage(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, ArcaError> {
    serde_json::from_str(raw).map_err(|e| ArcaError::Storage(e.to_string()))
}
