use crate::storage::key::Key;

/// Flat byte store underneath a [`StoreManager`](crate::core::store::StoreManager).
///
/// Iteration visits exactly the entries whose raw key starts with
/// `prefix.prefix()`. Implementations take a snapshot of the matching entries
/// before the first callback, so a visitor may write to the backend while a
/// scan is running. Visitors return `true` to stop early.
pub trait Backend: Send + Sync {
    /// Writes `value` under `key`, replacing any previous value. Returns
    /// `false` when the write was refused.
    fn raw_set(&self, key: &Key, value: &[u8]) -> bool;

    fn raw_get(&self, key: &Key) -> Option<Vec<u8>>;

    /// Returns `true` only if an entry existed and is now gone.
    fn raw_delete(&self, key: &Key) -> bool;

    fn exists(&self, key: &Key) -> bool;

    fn iter_keys(&self, prefix: &Key, visit: &mut dyn FnMut(Key) -> bool);

    fn iter_entries(&self, prefix: &Key, visit: &mut dyn FnMut(Key, Vec<u8>) -> bool);

    fn close(&self);
}

/// Parses raw keys out of a snapshot, dropping any that do not belong to the
/// grammar, and feeds them to `visit` until it asks to stop.
pub(crate) fn visit_snapshot<V>(
    snapshot: Vec<(String, V)>,
    mut visit: impl FnMut(Key, V) -> bool,
) {
    for (raw, value) in snapshot {
        let Some(key) = Key::parse(&raw) else {
            tracing::debug!(key = %raw, "skipping key outside the grammar");
            continue;
        };
        if visit(key, value) {
            break;
        }
    }
}
