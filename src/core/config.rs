use std::path::PathBuf;
use crate::codec::codec::Codec;
use crate::storage::log::SyncMode;

#[derive(Debug, Clone)]
pub struct Config {
    pub storage_path: PathBuf,

    pub id_buffer_size: usize,      // ids added to the tank per refill
    pub max_workers: usize,         // TaskPool bound for scans and trigger fan-out
    pub codec: Codec,

    // LogBackend only
    pub sync_mode: SyncMode,
    pub compact_on_open: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage_path: PathBuf::from("./data"),
            id_buffer_size: 1000,
            max_workers: 50,
            codec: Codec::Bincode,
            sync_mode: SyncMode::Batch,
            compact_on_open: true,
        }
    }
}

impl Config {
    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = path.into();
        self
    }

    pub fn with_id_buffer_size(mut self, size: usize) -> Self {
        self.id_buffer_size = size;
        self
    }
}
