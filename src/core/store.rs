use std::sync::Arc;
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use crate::codec::codec::Codec;
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::tank::IdTank;
use crate::core::types::{Entry, Record};
use crate::parallel::task_pool;
use crate::storage::backend::Backend;
use crate::storage::key::{Key, TableKey};
use crate::storage::log::LogBackend;
use crate::storage::memory::MemoryBackend;
use crate::trigger::operation::Operation;
use crate::trigger::registry::{Payload, Trigger, TriggerRegistry};

/// Typed records, links and triggers over a flat [`Backend`].
///
/// Each manager owns its id tank and its trigger registry. Do not point two
/// managers at the same backend: their tanks would hand out the same ids.
pub struct StoreManager {
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) tank: IdTank,
    pub(crate) triggers: TriggerRegistry,
    pub(crate) config: Config,
}

impl StoreManager {
    pub fn in_memory(config: Config) -> Self {
        StoreManager::with_backend(Arc::new(MemoryBackend::new()), config)
    }

    /// Opens (or creates) a durable store under `config.storage_path`.
    pub fn open(config: Config) -> Result<Self> {
        let backend = LogBackend::open(config.storage_path.clone(), config.sync_mode)?;
        if config.compact_on_open {
            backend.compact()?;
        }
        Ok(StoreManager::with_backend(Arc::new(backend), config))
    }

    /// Wraps an existing backend and seeds the id tank from its rows.
    pub fn with_backend(backend: Arc<dyn Backend>, config: Config) -> Self {
        let tank = IdTank::seed(backend.as_ref(), config.id_buffer_size);
        info!(
            used_ids = tank.used_len(),
            available_ids = tank.available_len(),
            codec = ?config.codec,
            "store manager ready"
        );
        StoreManager {
            backend,
            tank,
            triggers: TriggerRegistry::new(config.max_workers),
            config,
        }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tank(&self) -> &IdTank {
        &self.tank
    }

    pub fn codec(&self) -> Codec {
        self.config.codec
    }

    pub fn close(&self) {
        info!("closing store");
        self.backend.close();
    }

    // Triggers

    pub fn add_before_trigger<T, F>(
        &self,
        id: impl Into<String>,
        operations: Operation,
        callback: F,
    ) -> Result<()>
    where
        T: Record,
        F: Fn(Operation, &TableKey, &T) -> bool + Send + Sync + 'static,
    {
        self.triggers.add(Trigger::before::<T, F>(id, operations, callback))
    }

    pub fn add_after_trigger<T, F>(
        &self,
        id: impl Into<String>,
        operations: Operation,
        callback: F,
    ) -> Result<()>
    where
        T: Record,
        F: Fn(Operation, &TableKey, &T) + Send + Sync + 'static,
    {
        self.triggers.add(Trigger::after::<T, F>(id, operations, callback))
    }

    pub fn delete_trigger<T: Record>(&self, id: &str) -> Result<()> {
        self.triggers.remove(&T::table_name(), id).map(|_| ())
    }

    pub fn triggers(&self) -> &TriggerRegistry {
        &self.triggers
    }

    // CRUD

    /// Stores `value` under a fresh id. The id goes back to the tank if a
    /// trigger cancels the insert or the write fails.
    pub fn insert<T: Record>(&self, value: &T) -> Result<TableKey> {
        let key = TableKey::of::<T>(self.tank.get_free_id());

        let written = self.guarded(Operation::INSERT, &key, Some(value as &Payload), || {
            self.write_row(&key, value)
        });
        if let Err(err) = written {
            self.tank.free_id([key.id()]);
            return Err(err);
        }

        debug!(key = %key, "inserted");
        Ok(key)
    }

    /// Replaces the record stored under `key`. `key` must belong to the
    /// table of `T`.
    pub fn set<T: Record>(&self, key: &TableKey, value: &T) -> Result<()> {
        self.check_table::<T>(key)?;
        if !self.exists(key) {
            return Err(Error::invalid_id(key));
        }
        self.guarded(Operation::UPDATE, key, Some(value as &Payload), || {
            self.write_row(key, value)
        })
    }

    /// Reads and decodes the record under `key`. Get triggers are only
    /// notified: a before-trigger returning `false` does not fail the read.
    pub fn get<T: Record>(&self, key: &TableKey) -> Result<T> {
        self.check_table::<T>(key)?;
        let value: T = self.read_row(key)?;
        if !self.triggers.run_before(Operation::GET, key, &value) {
            debug!(key = %key, "before-get trigger flagged the read");
        }
        self.triggers.run_after(Operation::GET, key, &value);
        Ok(value)
    }

    /// Applies `editor` to the stored record and writes the result back.
    /// Before-triggers see the record as stored, after-triggers the edit.
    pub fn update<T, F>(&self, key: &TableKey, editor: F) -> Result<T>
    where
        T: Record,
        F: FnOnce(&mut T),
    {
        self.check_table::<T>(key)?;
        let mut value: T = self.read_row(key)?;
        if !self.triggers.run_before(Operation::UPDATE, key, &value) {
            return Err(cancelled(Operation::UPDATE, key));
        }

        editor(&mut value);
        self.write_row(key, &value)?;

        self.triggers.run_after(Operation::UPDATE, key, &value);
        Ok(value)
    }

    /// Removes the record and every link touching it. Linked records stay.
    pub fn delete(&self, key: &TableKey) -> Result<()> {
        let payload = self.watched_payload(key, Operation::DELETE)?;

        self.guarded(Operation::DELETE, key, payload.as_deref(), || {
            self.remove_row(key)?;
            let links = self.unlink_all(key);
            debug!(key = %key, links, "deleted");
            Ok(())
        })
    }

    /// Removes the record, every link touching it, and recursively every
    /// record it links to. Records linking to it are left alone.
    ///
    /// The record's own delete is complete, after-triggers included, before
    /// the cascade starts. A cascade target that is already gone counts as
    /// deleted. Any other failure stops the cascade; records removed so far
    /// stay removed.
    pub fn deep_delete(&self, key: &TableKey) -> Result<()> {
        let payload = self.watched_payload(key, Operation::DELETE)?;
        self.permit(Operation::DELETE, key, payload.as_deref())?;

        self.remove_row(key)?;
        let mut cascade = Vec::new();
        for link in self.links_touching(key) {
            self.backend.raw_delete(&Key::Link(link.clone()));
            if link.current == *key {
                cascade.push(link.target);
            }
        }
        self.notify(Operation::DELETE, key, payload.as_deref());

        if !cascade.is_empty() {
            info!(key = %key, targets = cascade.len(), "cascading delete");
        }
        for target in &cascade {
            match self.deep_delete(target) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::InvalidId => {
                    debug!(key = %target, "cascade target already removed");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    pub fn exists(&self, key: &TableKey) -> bool {
        self.backend.exists(&Key::Table(key.clone()))
    }

    /// Number of rows in the table of `T`.
    pub fn count<T: Record>(&self) -> usize {
        self.count_table(&TableKey::table::<T>())
    }

    /// Number of rows matching the prefix of `table`.
    pub fn count_table(&self, table: &TableKey) -> usize {
        let mut count = 0;
        self.backend.iter_keys(&Key::Table(table.clone()), &mut |_| {
            count += 1;
            false
        });
        count
    }

    /// Number of rows in every table.
    pub fn count_all(&self) -> usize {
        self.count_table(&TableKey::any())
    }

    // Scans

    /// Decodes every row of `T` on the task pool and hands it to `visit`.
    /// Calls run concurrently and in no particular order. Rows that fail to
    /// decode are skipped.
    pub fn foreach<T, F>(&self, visit: F)
    where
        T: Record,
        F: Fn(&TableKey, T) + Sync,
    {
        let codec = self.codec();
        let visit = &visit;
        task_pool::scoped(self.config.max_workers, |pool| {
            self.backend
                .iter_entries(&Key::Table(TableKey::table::<T>()), &mut |key, bytes| {
                    if let Key::Table(key) = key {
                        pool.add_task(move || {
                            if let Some(value) = decode_row::<T>(codec, &key, &bytes) {
                                visit(&key, value);
                            }
                        });
                    }
                    false
                });
        });
    }

    /// First row of `T`, in scan order, accepted by `predicate`.
    pub fn find_first<T, P>(&self, mut predicate: P) -> Option<Entry<T>>
    where
        T: Record,
        P: FnMut(&TableKey, &T) -> bool,
    {
        let codec = self.codec();
        let mut found = None;
        self.backend
            .iter_entries(&Key::Table(TableKey::table::<T>()), &mut |key, bytes| {
                let Key::Table(key) = key else {
                    return false;
                };
                match decode_row::<T>(codec, &key, &bytes) {
                    Some(value) if predicate(&key, &value) => {
                        found = Some(Entry::new(key, value));
                        true
                    }
                    _ => false,
                }
            });
        found
    }

    /// Every row of `T` accepted by `predicate`, in scan order. Predicates
    /// run concurrently on the task pool.
    pub fn find_all<T, P>(&self, predicate: P) -> Vec<Entry<T>>
    where
        T: Record,
        P: Fn(&TableKey, &T) -> bool + Sync,
    {
        let codec = self.codec();
        let predicate = &predicate;
        let matches = Mutex::new(Vec::new());
        let sink = &matches;

        task_pool::scoped(self.config.max_workers, |pool| {
            let mut position = 0usize;
            self.backend
                .iter_entries(&Key::Table(TableKey::table::<T>()), &mut |key, bytes| {
                    if let Key::Table(key) = key {
                        let index = position;
                        pool.add_task(move || {
                            if let Some(value) = decode_row::<T>(codec, &key, &bytes) {
                                if predicate(&key, &value) {
                                    sink.lock().push((index, Entry::new(key, value)));
                                }
                            }
                        });
                        position += 1;
                    }
                    false
                });
        });

        let mut matches = matches.into_inner();
        matches.sort_by_key(|(index, _)| *index);
        matches.into_iter().map(|(_, entry)| entry).collect()
    }

    // Internals

    /// Runs before-triggers, `action`, then after-triggers. Without a payload
    /// no trigger watches the operation and `action` runs alone.
    fn guarded<F>(
        &self,
        op: Operation,
        key: &TableKey,
        payload: Option<&Payload>,
        action: F,
    ) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        self.permit(op, key, payload)?;
        action()?;
        self.notify(op, key, payload);
        Ok(())
    }

    fn permit(&self, op: Operation, key: &TableKey, payload: Option<&Payload>) -> Result<()> {
        match payload {
            Some(payload) if !self.triggers.run_before(op, key, payload) => {
                Err(cancelled(op, key))
            }
            _ => Ok(()),
        }
    }

    fn notify(&self, op: Operation, key: &TableKey, payload: Option<&Payload>) {
        if let Some(payload) = payload {
            self.triggers.run_after(op, key, payload);
        }
    }

    /// Rejects a key whose table is not the one `T` is stored in.
    fn check_table<T: Record>(&self, key: &TableKey) -> Result<()> {
        let table = T::table_name();
        if key.name() != table {
            return Err(Error::new(
                ErrorKind::InvalidId,
                format!("{} is not a row of table {}", key, table),
            ));
        }
        Ok(())
    }

    /// Decodes the stored record for trigger dispatch, if any trigger on its
    /// table watches `op`. Fails with `InvalidId` when the row is missing.
    fn watched_payload(&self, key: &TableKey, op: Operation) -> Result<Option<Box<Payload>>> {
        let bytes = self
            .backend
            .raw_get(&Key::Table(key.clone()))
            .ok_or_else(|| Error::invalid_id(key))?;
        self.triggers
            .decode_watched(key.name(), op, self.codec(), &bytes)
    }

    fn read_row<T: Record>(&self, key: &TableKey) -> Result<T> {
        let bytes = self
            .backend
            .raw_get(&Key::Table(key.clone()))
            .ok_or_else(|| Error::invalid_id(key))?;
        self.codec().decode(&bytes)
    }

    fn write_row<T: Record>(&self, key: &TableKey, value: &T) -> Result<()> {
        let bytes = self.codec().encode(value)?;
        if !self.backend.raw_set(&Key::Table(key.clone()), &bytes) {
            warn!(key = %key, "backend refused write");
            return Err(Error::new(
                ErrorKind::FailedToSet,
                format!("backend refused to write {}", key),
            ));
        }
        Ok(())
    }

    /// Deletes the row and returns its id to the tank.
    fn remove_row(&self, key: &TableKey) -> Result<()> {
        let row = Key::Table(key.clone());
        if !self.backend.raw_delete(&row) {
            if !self.backend.exists(&row) {
                return Err(Error::invalid_id(key));
            }
            warn!(key = %key, "backend refused delete");
            return Err(Error::new(
                ErrorKind::FailedToSet,
                format!("backend refused to delete {}", key),
            ));
        }
        self.tank.free_id([key.id()]);
        Ok(())
    }
}

fn cancelled(op: Operation, key: &TableKey) -> Error {
    Error::new(
        ErrorKind::CancelledByTrigger,
        format!("{} on {} cancelled by trigger", op, key),
    )
}

fn decode_row<T: Record>(codec: Codec, key: &TableKey, bytes: &[u8]) -> Option<T> {
    match codec.decode(bytes) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(key = %key, error = %err, "skipping undecodable row");
            None
        }
    }
}
