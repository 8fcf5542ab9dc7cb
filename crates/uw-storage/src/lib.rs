use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

pub const UPGRADE_SCHEMA_VERSION: i64 = 1;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("height {0} does not fit the upgrade_height column")]
    HeightOutOfRange(u64),
    #[error("stored height {0} for {1} is negative")]
    NegativeHeight(i64, String),
    #[error("store connection lock poisoned")]
    LockPoisoned,
    #[error("unsupported schema version {found}, max supported {supported}")]
    UnsupportedSchemaVersion { found: i64, supported: i64 },
}

/// Last upgrade height a chain has been notified for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainState {
    pub chain_id: String,
    pub last_notified_height: u64,
}

/// SQLite-backed `chain_id -> upgrade_height` table.
///
/// The connection sits behind a mutex so one store can be shared by every chain
/// worker; each statement is a single implicit transaction.
pub struct UpgradeStore {
    conn: Mutex<Connection>,
}

impl UpgradeStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    pub fn schema_version(&self) -> Result<i64, StorageError> {
        Ok(self
            .conn()?
            .query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    pub fn migrate(&self) -> Result<(), StorageError> {
        let current = self.schema_version()?;
        if current > UPGRADE_SCHEMA_VERSION {
            return Err(StorageError::UnsupportedSchemaVersion {
                found: current,
                supported: UPGRADE_SCHEMA_VERSION,
            });
        }

        if current < 1 {
            let conn = self.conn()?;
            conn.execute_batch(include_str!("../migrations/0001_upgrade_schema.sql"))?;
            conn.execute("PRAGMA user_version = 1", []).map(|_| ())?;
        }

        Ok(())
    }

    pub fn get_state(&self, chain_id: &str) -> Result<Option<ChainState>, StorageError> {
        let height = self
            .conn()?
            .query_row(
                "SELECT upgrade_height FROM chains WHERE chain_id = ?1",
                [chain_id],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;

        height
            .map(|height| row_to_state(chain_id.to_string(), height))
            .transpose()
    }

    /// Inserts or replaces the row for `chain_id`. Repeating the call with the same
    /// arguments leaves the table unchanged.
    pub fn upsert_state(&self, chain_id: &str, height: u64) -> Result<(), StorageError> {
        let height = i64::try_from(height).map_err(|_| StorageError::HeightOutOfRange(height))?;
        self.conn()?.execute(
            "
            INSERT INTO chains (chain_id, upgrade_height) VALUES (?1, ?2)
            ON CONFLICT(chain_id) DO UPDATE SET
                upgrade_height=excluded.upgrade_height
            ",
            params![chain_id, height],
        )?;
        Ok(())
    }

    pub fn list_states(&self) -> Result<Vec<ChainState>, StorageError> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT chain_id, upgrade_height FROM chains ORDER BY chain_id ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut states = Vec::new();
        for row in rows {
            let (chain_id, height) = row?;
            states.push(row_to_state(chain_id, height)?);
        }
        Ok(states)
    }
}

fn row_to_state(chain_id: String, height: i64) -> Result<ChainState, StorageError> {
    let last_notified_height =
        u64::try_from(height).map_err(|_| StorageError::NegativeHeight(height, chain_id.clone()))?;
    Ok(ChainState {
        chain_id,
        last_notified_height,
    })
}
