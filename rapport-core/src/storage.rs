//! Snapshot storage — the contract the engine consumes, plus two adapters.
//!
//! The engine never decides *where* snapshots live; hosts implement
//! [`SnapshotStore`] against whatever they have (message metadata, session
//! state, a local cache). Two adapters ship with the crate: an in-memory
//! store for tests and embedding, and a SQLite store for standalone hosts.
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS snapshots (
//!     conversation TEXT    NOT NULL,
//!     msg_index    INTEGER NOT NULL,
//!     payload      TEXT    NOT NULL,
//!     created_at   TEXT    NOT NULL,
//!     PRIMARY KEY (conversation, msg_index)
//! );
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use tracing::{debug, info};

use crate::error::Result;
use crate::types::TrackerSnapshot;

/// Read/write contract for per-turn snapshots.
pub trait SnapshotStore {
    /// The newest snapshot at or before `before` (exclusive), or the newest
    /// overall when `before` is `None`.
    fn previous_snapshot(
        &self,
        conversation: &str,
        before: Option<usize>,
    ) -> Result<Option<TrackerSnapshot>>;

    /// Persist a snapshot at one message index, replacing any existing one.
    fn write_snapshot(
        &self,
        conversation: &str,
        index: usize,
        snapshot: &TrackerSnapshot,
    ) -> Result<()>;

    /// Up to `max` snapshots, newest first. Used to give the oracle
    /// short-term trend context.
    fn recent_history(&self, conversation: &str, max: usize) -> Result<Vec<TrackerSnapshot>>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Keeps snapshots in a map; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<BTreeMap<(String, usize), TrackerSnapshot>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemoryStore {
    fn previous_snapshot(
        &self,
        conversation: &str,
        before: Option<usize>,
    ) -> Result<Option<TrackerSnapshot>> {
        let inner = self.inner.lock();
        Ok(inner
            .iter()
            .filter(|((conv, idx), _)| {
                conv == conversation && before.is_none_or(|b| *idx < b)
            })
            .max_by_key(|((_, idx), _)| *idx)
            .map(|(_, snapshot)| snapshot.clone()))
    }

    fn write_snapshot(
        &self,
        conversation: &str,
        index: usize,
        snapshot: &TrackerSnapshot,
    ) -> Result<()> {
        self.inner
            .lock()
            .insert((conversation.to_string(), index), snapshot.clone());
        Ok(())
    }

    fn recent_history(&self, conversation: &str, max: usize) -> Result<Vec<TrackerSnapshot>> {
        let inner = self.inner.lock();
        let mut rows: Vec<(usize, TrackerSnapshot)> = inner
            .iter()
            .filter(|((conv, _), _)| conv == conversation)
            .map(|((_, idx), snapshot)| (*idx, snapshot.clone()))
            .collect();
        rows.sort_by_key(|(idx, _)| std::cmp::Reverse(*idx));
        Ok(rows.into_iter().take(max).map(|(_, s)| s).collect())
    }
}

// ---------------------------------------------------------------------------
// SQLite store
// ---------------------------------------------------------------------------

/// SQLite-backed snapshot store for standalone hosts.
///
/// Snapshots are serialised to JSON; the schema stays stable across
/// stat-dimension changes.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS snapshots (
    conversation TEXT    NOT NULL,
    msg_index    INTEGER NOT NULL,
    payload      TEXT    NOT NULL,
    created_at   TEXT    NOT NULL,
    PRIMARY KEY (conversation, msg_index)
);";

impl SqliteStore {
    /// Open (or create) a snapshot database at `path`, WAL mode on.
    ///
    /// # Errors
    /// Returns [`crate::RapportError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&db_path, flags)?;

        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;

        info!(path = %db_path.display(), "snapshot store opened");
        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    /// Open an in-memory database (useful for tests).
    ///
    /// # Errors
    /// Returns [`crate::RapportError::Database`] on SQLite failures.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
        })
    }
}

impl SnapshotStore for SqliteStore {
    fn previous_snapshot(
        &self,
        conversation: &str,
        before: Option<usize>,
    ) -> Result<Option<TrackerSnapshot>> {
        let conn = self.conn.lock();
        let bound = before.map_or(i64::MAX, |b| b as i64);
        let mut stmt = conn.prepare(
            "SELECT payload FROM snapshots
             WHERE conversation = ?1 AND msg_index < ?2
             ORDER BY msg_index DESC LIMIT 1",
        )?;
        let payload: Option<String> = stmt
            .query_row(params![conversation, bound], |row| row.get(0))
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn write_snapshot(
        &self,
        conversation: &str,
        index: usize,
        snapshot: &TrackerSnapshot,
    ) -> Result<()> {
        let payload = serde_json::to_string(snapshot)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO snapshots (conversation, msg_index, payload, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                conversation,
                index as i64,
                payload,
                snapshot.timestamp.to_rfc3339()
            ],
        )?;
        debug!(conversation, index, "snapshot written");
        Ok(())
    }

    fn recent_history(&self, conversation: &str, max: usize) -> Result<Vec<TrackerSnapshot>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT payload FROM snapshots
             WHERE conversation = ?1
             ORDER BY msg_index DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![conversation, max as i64], |row| {
            row.get::<_, String>(0)
        })?;
        let mut snapshots = Vec::new();
        for row in rows {
            snapshots.push(serde_json::from_str(&row?)?);
        }
        Ok(snapshots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(active: &str, affection: u8) -> TrackerSnapshot {
        let mut s = TrackerSnapshot::empty(vec![active.to_string()]);
        s.statistics.affection.insert(active.into(), affection);
        s
    }

    #[test]
    fn memory_store_returns_newest_before_index() {
        let store = MemoryStore::new();
        store.write_snapshot("chat", 1, &snapshot("Alice", 10)).expect("write");
        store.write_snapshot("chat", 5, &snapshot("Alice", 50)).expect("write");
        store.write_snapshot("chat", 9, &snapshot("Alice", 90)).expect("write");

        let previous = store
            .previous_snapshot("chat", Some(9))
            .expect("read")
            .expect("some");
        assert_eq!(previous.statistics.affection["Alice"], 50);

        let newest = store.previous_snapshot("chat", None).expect("read").expect("some");
        assert_eq!(newest.statistics.affection["Alice"], 90);
    }

    #[test]
    fn memory_store_history_is_newest_first() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store
                .write_snapshot("chat", i, &snapshot("Alice", i as u8))
                .expect("write");
        }
        let history = store.recent_history("chat", 3).expect("read");
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].statistics.affection["Alice"], 4);
    }

    #[test]
    fn sqlite_store_round_trips() {
        let store = SqliteStore::open_in_memory().expect("open");
        store.write_snapshot("chat", 3, &snapshot("Alice", 42)).expect("write");

        let loaded = store
            .previous_snapshot("chat", Some(4))
            .expect("read")
            .expect("some");
        assert_eq!(loaded.statistics.affection["Alice"], 42);
        assert!(store
            .previous_snapshot("chat", Some(3))
            .expect("read")
            .is_none());
    }

    #[test]
    fn sqlite_store_isolates_conversations() {
        let store = SqliteStore::open_in_memory().expect("open");
        store.write_snapshot("a", 1, &snapshot("Alice", 1)).expect("write");
        store.write_snapshot("b", 1, &snapshot("Bob", 2)).expect("write");

        let history = store.recent_history("a", 10).expect("read");
        assert_eq!(history.len(), 1);
        assert!(history[0].statistics.affection.contains_key("Alice"));
    }

    #[test]
    fn sqlite_store_persists_to_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("snapshots.db");
        {
            let store = SqliteStore::open(&path).expect("open");
            store.write_snapshot("chat", 1, &snapshot("Alice", 7)).expect("write");
        }
        let store = SqliteStore::open(&path).expect("reopen");
        let loaded = store.previous_snapshot("chat", None).expect("read").expect("some");
        assert_eq!(loaded.statistics.affection["Alice"], 7);
    }
}
