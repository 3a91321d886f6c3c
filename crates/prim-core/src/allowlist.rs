//! Durable wallet allowlist backed by SQLite.
//!
//! Addresses are lowercased inside the store, so callers never have to agree on a
//! casing. A [`AllowlistRegistry`] hands out one shared store per storage location;
//! services build it once at startup and pass it around as app data.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Storage failures. "Address not found" is never one of these.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("allowlist store lock poisoned")]
    LockPoisoned,

    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// One row of `allowed_wallets`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AllowlistEntry {
    pub address: String,
    /// Unix seconds
    pub added_at: i64,
    pub added_by: Option<String>,
    pub note: Option<String>,
}

/// Canonical form used for storage and comparison.
pub fn normalize_address(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}

/// Check that `address` is a 20-byte hex EVM address (`0x` + 40 hex digits).
/// Casing is ignored everywhere, including the prefix.
pub fn is_valid_address(address: &str) -> bool {
    let address = normalize_address(address);
    address.len() == 42 && address.parse::<alloy::primitives::Address>().is_ok()
}

/// Handle to one allowlist database. Cloning shares the connection.
#[derive(Clone)]
pub struct AllowlistStore {
    location: Arc<str>,
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for AllowlistStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllowlistStore")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

impl AllowlistStore {
    /// Open (or create) the database at `location` and ensure the schema exists.
    ///
    /// Prefer [`AllowlistRegistry::open`], which reuses an already-open handle.
    pub fn open(location: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(location)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS allowed_wallets (
                address TEXT PRIMARY KEY NOT NULL,
                added_at INTEGER NOT NULL DEFAULT (CAST(strftime('%s', 'now') AS INTEGER)),
                added_by TEXT,
                note TEXT
            );",
        )?;

        tracing::debug!(location = %location, "allowlist store opened");

        Ok(Self {
            location: Arc::from(location),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// True when both handles use the same underlying connection.
    pub fn shares_connection(&self, other: &AllowlistStore) -> bool {
        Arc::ptr_eq(&self.conn, &other.conn)
    }

    /// Run a query on the blocking pool so request tasks never wait on disk I/O.
    async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| StoreError::LockPoisoned)?;
            f(&conn).map_err(StoreError::from)
        })
        .await?
    }

    /// Whether `address` (any casing) is on the list. Unknown addresses are `false`.
    pub async fn is_allowed(&self, address: &str) -> Result<bool, StoreError> {
        let address = normalize_address(address);
        if address.is_empty() {
            return Ok(false);
        }
        self.run(move |conn| {
            conn.query_row(
                "SELECT 1 FROM allowed_wallets WHERE address = ?1",
                params![address],
                |_| Ok(()),
            )
            .optional()
            .map(|row| row.is_some())
        })
        .await
    }

    /// Grant access. Re-adding an address replaces `added_by` and `note`.
    pub async fn add(
        &self,
        address: &str,
        added_by: Option<&str>,
        note: Option<&str>,
    ) -> Result<AllowlistEntry, StoreError> {
        let address = normalize_address(address);
        let added_by = added_by.map(normalize_address);
        let note = note.map(String::from);
        let now = chrono::Utc::now().timestamp();

        self.run(move |conn| {
            conn.execute(
                r#"
                INSERT INTO allowed_wallets (address, added_at, added_by, note)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(address) DO UPDATE SET
                    added_by = excluded.added_by,
                    note = excluded.note
                "#,
                params![address, now, added_by, note],
            )?;
            conn.query_row(
                "SELECT address, added_at, added_by, note FROM allowed_wallets WHERE address = ?1",
                params![address],
                row_to_entry,
            )
        })
        .await
    }

    /// Revoke access. Returns whether a row was removed; absent addresses are a no-op.
    pub async fn remove(&self, address: &str) -> Result<bool, StoreError> {
        let address = normalize_address(address);
        self.run(move |conn| {
            conn.execute(
                "DELETE FROM allowed_wallets WHERE address = ?1",
                params![address],
            )
            .map(|n| n > 0)
        })
        .await
    }

    pub async fn get(&self, address: &str) -> Result<Option<AllowlistEntry>, StoreError> {
        let address = normalize_address(address);
        self.run(move |conn| {
            conn.query_row(
                "SELECT address, added_at, added_by, note FROM allowed_wallets WHERE address = ?1",
                params![address],
                row_to_entry,
            )
            .optional()
        })
        .await
    }

    /// All entries, newest first.
    pub async fn list(&self) -> Result<Vec<AllowlistEntry>, StoreError> {
        self.run(|conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT address, added_at, added_by, note
                FROM allowed_wallets
                ORDER BY added_at DESC, address ASC
                "#,
            )?;
            let entries = stmt
                .query_map([], row_to_entry)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(entries)
        })
        .await
    }

    /// Cheap round-trip used by the health check.
    pub async fn ping(&self) -> Result<(), StoreError> {
        self.run(|conn| conn.query_row("SELECT 1", [], |_| Ok(())))
            .await
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> Result<AllowlistEntry, rusqlite::Error> {
    Ok(AllowlistEntry {
        address: row.get(0)?,
        added_at: row.get(1)?,
        added_by: row.get(2)?,
        note: row.get(3)?,
    })
}

/// Reusable allowlist predicate bound to one open store.
#[derive(Debug, Clone)]
pub struct AllowlistChecker {
    store: AllowlistStore,
}

impl AllowlistChecker {
    pub fn new(store: AllowlistStore) -> Self {
        Self { store }
    }

    pub async fn check(&self, address: &str) -> Result<bool, StoreError> {
        self.store.is_allowed(address).await
    }

    pub fn store(&self) -> &AllowlistStore {
        &self.store
    }
}

/// Open stores keyed by storage location. At most one connection per location.
#[derive(Debug, Clone, Default)]
pub struct AllowlistRegistry {
    stores: Arc<DashMap<String, AllowlistStore>>,
}

impl AllowlistRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the store for `location`, opening it on first use.
    ///
    /// File paths are canonicalized, so `a.db` and `./a.db` share one store. A first
    /// open does blocking file and schema I/O; call it at startup, not per request.
    pub fn open(&self, location: &str) -> Result<AllowlistStore, StoreError> {
        let key = location_key(location);
        // The entry guard holds the shard lock, so concurrent first opens of the
        // same location cannot race into two connections.
        match self.stores.entry(key) {
            Entry::Occupied(e) => Ok(e.get().clone()),
            Entry::Vacant(v) => {
                let store = AllowlistStore::open(v.key())?;
                v.insert(store.clone());
                Ok(store)
            }
        }
    }

    /// Predicate over the store at `location`. Checkers for one location share a connection.
    pub fn checker(&self, location: &str) -> Result<AllowlistChecker, StoreError> {
        self.open(location).map(AllowlistChecker::new)
    }

    /// Drop cached stores: one location, or all of them when `None`.
    /// Meant for test harnesses; live handles keep their connection until dropped.
    pub fn reset(&self, location: Option<&str>) {
        match location {
            Some(location) => {
                self.stores.remove(&location_key(location));
            }
            None => self.stores.clear(),
        }
    }

    pub fn is_open(&self, location: &str) -> bool {
        self.stores.contains_key(&location_key(location))
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}

/// Registry key for `location`. In-memory and URI locations are used as given; file
/// paths resolve through their parent directory, since the file may not exist yet.
fn location_key(location: &str) -> String {
    if location == ":memory:" || location.starts_with("file:") {
        return location.to_string();
    }
    let path = Path::new(location);
    if let Ok(canonical) = path.canonicalize() {
        return canonical.to_string_lossy().into_owned();
    }
    let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
        return location.to_string();
    };
    let parent = if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    };
    parent
        .canonicalize()
        .map(|dir| dir.join(name).to_string_lossy().into_owned())
        .unwrap_or_else(|_| location.to_string())
}
