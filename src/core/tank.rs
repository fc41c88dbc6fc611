use std::collections::{HashSet, VecDeque};
use parking_lot::Mutex;
use tracing::debug;
use crate::storage::backend::Backend;
use crate::storage::key::{Key, TableKey};

pub const DEFAULT_BUFFER_SIZE: usize = 1000;

struct TankState {
    available: VecDeque<String>,
    used: HashSet<String>,
}

/// Store-wide pool of record ids.
///
/// Ids are unique across every table. Freed ids go to the back of the queue
/// and are handed out again in the order they were freed, after whatever was
/// already waiting.
pub struct IdTank {
    state: Mutex<TankState>,
    buffer_size: usize,
}

impl IdTank {
    /// Empty tank, as for a store with no rows.
    pub fn new(buffer_size: usize) -> Self {
        IdTank::from_used(Vec::<String>::new(), buffer_size)
    }

    /// Seeds the tank from every table row currently in `backend`.
    pub fn seed(backend: &dyn Backend, buffer_size: usize) -> Self {
        let mut ids = Vec::new();
        backend.iter_keys(&Key::Table(TableKey::any()), &mut |key| {
            if let Key::Table(table_key) = key {
                ids.push(table_key.id().to_string());
            }
            false
        });
        debug!(rows = ids.len(), "seeding id tank");
        IdTank::from_used(ids, buffer_size)
    }

    /// Builds a tank where `used` ids are taken. The initial queue holds every
    /// free id below the first multiple of `buffer_size` above the highest
    /// numeric id, in ascending order. The window never reaches past one
    /// buffer beyond the number of used ids; later refills cover the rest.
    pub fn from_used<I, S>(used: I, buffer_size: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let buffer_size = buffer_size.max(1);
        let used: HashSet<String> = used.into_iter().map(Into::into).collect();

        let max_id = used
            .iter()
            .map(|id| id.parse::<u64>().unwrap_or(0))
            .max()
            .unwrap_or(0);
        let buffer = buffer_size as u64;
        let ceil = max_id.saturating_add(1).div_ceil(buffer).saturating_mul(buffer);
        let window = (used.len() as u64)
            .saturating_add(buffer)
            .div_ceil(buffer)
            .saturating_mul(buffer);
        let ceil = ceil.min(window);

        let available = (0..ceil)
            .map(|n| n.to_string())
            .filter(|id| !used.contains(id))
            .collect();

        IdTank {
            state: Mutex::new(TankState { available, used }),
            buffer_size,
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Pops the next free id and marks it used. Refills the queue with
    /// `buffer_size` fresh ids, counting up from the number of used ids,
    /// when it runs dry.
    pub fn get_free_id(&self) -> String {
        let mut state = self.state.lock();
        if state.available.is_empty() {
            self.refill(&mut state);
        }
        // refill always adds at least one id
        let id = state.available.pop_front().unwrap_or_default();
        state.used.insert(id.clone());
        id
    }

    /// Returns ids to the back of the queue. Ids that are not in use are
    /// ignored.
    pub fn free_id<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut state = self.state.lock();
        for id in ids {
            let id = id.as_ref();
            if state.used.remove(id) {
                state.available.push_back(id.to_string());
            }
        }
    }

    pub fn is_used(&self, id: &str) -> bool {
        self.state.lock().used.contains(id)
    }

    pub fn used_len(&self) -> usize {
        self.state.lock().used.len()
    }

    pub fn available_len(&self) -> usize {
        self.state.lock().available.len()
    }

    fn refill(&self, state: &mut TankState) {
        let mut next = state.used.len() as u64;
        let mut added = 0;
        while added < self.buffer_size {
            let id = next.to_string();
            if !state.used.contains(&id) {
                state.available.push_back(id);
                added += 1;
            }
            next += 1;
        }
        debug!(from = state.used.len(), count = added, "refilled id tank");
    }
}
