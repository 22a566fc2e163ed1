use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::store::{MemoryTicketStore, TicketStore};
use crate::core::{ArcaError, Clock};

/// How long a ticket is reused after it was obtained. The authority grants
/// twelve hours; the remaining two are margin for clock skew.
pub const REUSE_WINDOW_HOURS: i64 = 10;

/// Default wait before retrying after WSAA reports an active ticket.
pub const DEFAULT_CONTENTION_DELAY: StdDuration = StdDuration::from_secs(30);

/// Token and sign returned by WSAA, not yet stamped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
    pub sign: String,
    /// `expirationTime` reported by the authority, when it parsed.
    pub expires_at: Option<DateTime<Utc>>,
}

/// A WSAA access ticket (TA) as held by the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTicket {
    pub token: String,
    pub sign: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessTicket {
    pub fn from_credentials(credentials: Credentials, issued_at: DateTime<Utc>) -> Self {
        Self {
            token: credentials.token,
            sign: credentials.sign,
            issued_at,
            expires_at: credentials.expires_at,
        }
    }

    /// Still inside the reuse window and before the authority's expiration.
    pub fn is_reusable_at(&self, now: DateTime<Utc>) -> bool {
        let fresh = now - self.issued_at < Duration::hours(REUSE_WINDOW_HOURS);
        let unexpired = self.expires_at.is_none_or(|exp| now < exp);
        fresh && unexpired
    }
}

/// Obtains fresh credentials from the authority.
#[async_trait]
pub trait TicketSource: Send + Sync {
    async fn request_ticket(&self) -> Result<Credentials, ArcaError>;
}

#[async_trait]
impl<T: TicketSource + ?Sized> TicketSource for Arc<T> {
    async fn request_ticket(&self) -> Result<Credentials, ArcaError> {
        (**self).request_ticket().await
    }
}

/// Hands out a ticket valid for the next call.
#[async_trait]
pub trait TicketProvider: Send + Sync {
    async fn valid_ticket(&self) -> Result<AccessTicket, ArcaError>;
}

#[async_trait]
impl<T: TicketProvider + ?Sized> TicketProvider for Arc<T> {
    async fn valid_ticket(&self) -> Result<AccessTicket, ArcaError> {
        (**self).valid_ticket().await
    }
}

/// Shared ticket cache.
///
/// Reads are lock-free with respect to each other; acquisition is
/// serialized so concurrent callers on a cold cache trigger a single login.
pub struct TicketCache<S> {
    source: S,
    store: Arc<dyn TicketStore>,
    clock: Arc<dyn Clock>,
    contention_delay: StdDuration,
    acquire_lock: tokio::sync::Mutex<()>,
}

impl<S: TicketSource> TicketCache<S> {
    pub fn new(source: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            store: Arc::new(MemoryTicketStore::default()),
            clock,
            contention_delay: DEFAULT_CONTENTION_DELAY,
            acquire_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn TicketStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_contention_delay(mut self, delay: StdDuration) -> Self {
        self.contention_delay = delay;
        self
    }

    /// Drop the cached ticket; the next call logs in again.
    pub async fn invalidate(&self) -> Result<(), ArcaError> {
        self.store.clear().await
    }

    async fn cached(&self) -> Result<Option<AccessTicket>, ArcaError> {
        let now = self.clock.now();
        Ok(self
            .store
            .load()
            .await?
            .filter(|t| t.is_reusable_at(now)))
    }

    async fn acquire(&self) -> Result<AccessTicket, ArcaError> {
        let credentials = match self.source.request_ticket().await {
            Ok(c) => c,
            Err(ArcaError::TicketContention(msg)) => {
                warn!(
                    reason = %msg,
                    delay_secs = self.contention_delay.as_secs(),
                    "WSAA reports an active ticket, retrying once"
                );
                self.store.clear().await?;
                tokio::time::sleep(self.contention_delay).await;
                self.source.request_ticket().await?
            }
            Err(e) => return Err(e),
        };

        let ticket = AccessTicket::from_credentials(credentials, self.clock.now());
        self.store.save(&ticket).await?;
        info!(
            issued_at = %ticket.issued_at,
            expires_at = ?ticket.expires_at,
            "obtained WSAA access ticket"
        );
        Ok(ticket)
    }
}

#[async_trait]
impl<S: TicketSource> TicketProvider for TicketCache<S> {
    async fn valid_ticket(&self) -> Result<AccessTicket, ArcaError> {
        if let Some(ticket) = self.cached().await? {
            debug!("using cached WSAA ticket");
            return Ok(ticket);
        }

        let _guard = self.acquire_lock.lock().await;

        // Another task may have logged in while we waited.
        if let Some(ticket) = self.cached().await? {
            debug!("using WSAA ticket obtained by another task");
            return Ok(ticket);
        }

        self.acquire().await
    }
}
