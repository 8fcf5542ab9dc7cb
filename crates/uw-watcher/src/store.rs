use uw_storage::{ChainState, StorageError, UpgradeStore};

/// Durable `chain_id -> last notified height` mapping used by the watchers.
pub trait StateStore: Send + Sync {
    fn get_state(&self, chain_id: &str) -> Result<Option<ChainState>, StorageError>;
    fn upsert_state(&self, chain_id: &str, height: u64) -> Result<(), StorageError>;
}

impl StateStore for UpgradeStore {
    fn get_state(&self, chain_id: &str) -> Result<Option<ChainState>, StorageError> {
        UpgradeStore::get_state(self, chain_id)
    }

    fn upsert_state(&self, chain_id: &str, height: u64) -> Result<(), StorageError> {
        UpgradeStore::upsert_state(self, chain_id, height)
    }
}
