use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::warn;

use super::ticket::AccessTicket;
use crate::core::ArcaError;

/// Where the ticket cache keeps its ticket.
#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn load(&self) -> Result<Option<AccessTicket>, ArcaError>;
    async fn save(&self, ticket: &AccessTicket) -> Result<(), ArcaError>;
    async fn clear(&self) -> Result<(), ArcaError>;
}

/// In-process ticket storage.
#[derive(Debug, Default)]
pub struct MemoryTicketStore {
    ticket: RwLock<Option<AccessTicket>>,
}

#[async_trait]
impl TicketStore for MemoryTicketStore {
    async fn load(&self) -> Result<Option<AccessTicket>, ArcaError> {
        Ok(self.ticket.read().clone())
    }

    async fn save(&self, ticket: &AccessTicket) -> Result<(), ArcaError> {
        *self.ticket.write() = Some(ticket.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), ArcaError> {
        *self.ticket.write() = None;
        Ok(())
    }
}

/// JSON file ticket storage, shared across restarts and sibling processes.
///
/// An unreadable or corrupt file is treated as an empty cache.
#[derive(Debug, Clone)]
pub struct FileTicketStore {
    path: PathBuf,
}

impl FileTicketStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TicketStore for FileTicketStore {
    async fn load(&self) -> Result<Option<AccessTicket>, ArcaError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cannot read ticket cache");
                return Ok(None);
            }
        };
        match serde_json::from_slice(&raw) {
            Ok(ticket) => Ok(Some(ticket)),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring corrupt ticket cache");
                Ok(None)
            }
        }
    }

    async fn save(&self, ticket: &AccessTicket) -> Result<(), ArcaError> {
        let json = serde_json::to_vec_pretty(ticket)
            .map_err(|e| ArcaError::Storage(format!("cannot encode ticket: {e}")))?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || replace_file(&path, &json))
            .await
            .map_err(|e| ArcaError::Storage(format!("ticket cache writer failed: {e}")))?
    }

    async fn clear(&self) -> Result<(), ArcaError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ArcaError::Storage(format!(
                "cannot remove {}: {e}",
                self.path.display()
            ))),
        }
    }
}

/// Write to a private temp file in the same directory, then rename over
/// `path`; readers see either the old or the new ticket.
fn replace_file(path: &Path, contents: &[u8]) -> Result<(), ArcaError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| {
        ArcaError::Storage(format!("cannot create temp file in {}: {e}", dir.display()))
    })?;
    tmp.write_all(contents)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| ArcaError::Storage(format!("cannot write {}: {e}", tmp.path().display())))?;
    tmp.persist(path).map_err(|e| {
        ArcaError::Storage(format!("cannot replace {}: {}", path.display(), e.error))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample() -> AccessTicket {
        AccessTicket {
            token: "PD94bWwgdmVyc2lvbj0i".into(),
            sign: "dGhpcyBpcyBub3QgYSBzaWdu".into(),
            issued_at: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            expires_at: Some(Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap()),
        }
    }

    #[tokio::test]
    async fn file_store_persists_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ta.json");
        let store = FileTicketStore::new(&path);

        assert!(store.load().await.unwrap().is_none());
        store.save(&sample()).await.unwrap();

        let reopened = FileTicketStore::new(&path);
        assert_eq!(reopened.load().await.unwrap(), Some(sample()));

        reopened.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
        reopened.clear().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_leave_one_whole_ticket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ta.json");

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = FileTicketStore::new(&path);
                tokio::spawn(async move {
                    let mut ticket = sample();
                    ticket.token = format!("token-{i}-{}", "x".repeat(4096));
                    store.save(&ticket).await
                })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let stored = FileTicketStore::new(&path).load().await.unwrap().unwrap();
        assert!(stored.token.starts_with("token-"));
        assert_eq!(stored.sign, sample().sign);
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("ta.json")]);
    }

    #[tokio::test]
    async fn corrupt_file_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ta.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(FileTicketStore::new(&path).load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryTicketStore::default();
        store.save(&sample()).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(sample()));
        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }
}
