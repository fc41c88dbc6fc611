use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use parking_lot::RwLock;
use crate::storage::backend::{visit_snapshot, Backend};
use crate::storage::key::Key;

/// Volatile backend over an ordered map. Scans run in byte order.
#[derive(Default)]
pub struct MemoryBackend {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
    closed: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub(crate) fn snapshot<V>(
        entries: &BTreeMap<String, Vec<u8>>,
        prefix: &str,
        project: impl Fn(&Vec<u8>) -> V,
    ) -> Vec<(String, V)> {
        entries
            .range(prefix.to_string()..)
            .take_while(|(raw, _)| raw.starts_with(prefix))
            .map(|(raw, value)| (raw.clone(), project(value)))
            .collect()
    }
}

impl Backend for MemoryBackend {
    fn raw_set(&self, key: &Key, value: &[u8]) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        self.entries.write().insert(key.raw(), value.to_vec());
        true
    }

    fn raw_get(&self, key: &Key) -> Option<Vec<u8>> {
        self.entries.read().get(&key.raw()).cloned()
    }

    fn raw_delete(&self, key: &Key) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        self.entries.write().remove(&key.raw()).is_some()
    }

    fn exists(&self, key: &Key) -> bool {
        self.entries.read().contains_key(&key.raw())
    }

    fn iter_keys(&self, prefix: &Key, visit: &mut dyn FnMut(Key) -> bool) {
        let snapshot = Self::snapshot(&self.entries.read(), &prefix.prefix(), |_| ());
        visit_snapshot(snapshot, |key, _| visit(key));
    }

    fn iter_entries(&self, prefix: &Key, visit: &mut dyn FnMut(Key, Vec<u8>) -> bool) {
        let snapshot = Self::snapshot(&self.entries.read(), &prefix.prefix(), Vec::clone);
        visit_snapshot(snapshot, |key, value| visit(key, value));
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
