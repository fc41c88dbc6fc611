use std::cmp::Ordering;
use std::collections::HashSet;
use crate::core::error::Result;
use crate::core::store::StoreManager;
use crate::core::types::{content_hash, Entry, Record};

/// A table loaded into memory for sorting, deduplication and filtering.
///
/// Every operation rewrites the collection in place and returns it again, so
/// calls chain. Nothing is written back to the store.
pub struct Collection<'a, T> {
    store: &'a StoreManager,
    entries: Vec<Entry<T>>,
}

impl<'a, T: Record> Collection<'a, T> {
    /// Loads every row of `T`, in backend scan order.
    pub fn load(store: &'a StoreManager) -> Self {
        let entries = store.find_all::<T, _>(|_, _| true);
        Collection { store, entries }
    }

    pub fn from_entries(store: &'a StoreManager, entries: Vec<Entry<T>>) -> Self {
        Collection { store, entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entry<T>> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[Entry<T>] {
        &self.entries
    }

    pub fn into_vec(self) -> Vec<Entry<T>> {
        self.entries
    }

    /// Stable sort by `compare`.
    pub fn sort_by<F>(&mut self, compare: F) -> &mut Self
    where
        F: FnMut(&Entry<T>, &Entry<T>) -> Ordering,
    {
        self.entries.sort_by(compare);
        self
    }

    /// Keeps the first entry of each distinct content hash.
    pub fn distinct(&mut self) -> &mut Self {
        let mut seen = HashSet::new();
        self.entries.retain(|entry| seen.insert(content_hash(&entry.value)));
        self
    }

    pub fn filter<P>(&mut self, mut predicate: P) -> &mut Self
    where
        P: FnMut(&Entry<T>) -> bool,
    {
        self.entries.retain(|entry| predicate(entry));
        self
    }

    /// Keeps entries for which `predicate` holds against at least one record
    /// of `K` they link to. With `skip_first`, the first linked record is
    /// left out of the test whenever there is more than one.
    pub fn where_linked<K, P>(&mut self, skip_first: bool, mut predicate: P) -> Result<&mut Self>
    where
        K: Record,
        P: FnMut(&Entry<T>, &Entry<K>) -> bool,
    {
        self.retain_linked::<K, _>(|source, linked| {
            let candidates = if skip_first && linked.len() > 1 {
                &linked[1..]
            } else {
                linked
            };
            candidates.iter().any(|target| predicate(source, target))
        })?;
        Ok(self)
    }

    /// Keeps entries for which `predicate` holds against any linked `K`.
    pub fn where_any<K, P>(&mut self, mut predicate: P) -> Result<&mut Self>
    where
        K: Record,
        P: FnMut(&Entry<T>, &Entry<K>) -> bool,
    {
        self.retain_linked::<K, _>(|source, linked| {
            linked.iter().any(|target| predicate(source, target))
        })?;
        Ok(self)
    }

    /// Keeps entries whose first linked `K` satisfies `predicate`. Entries
    /// linking to no `K` are dropped.
    pub fn where_first<K, P>(&mut self, mut predicate: P) -> Result<&mut Self>
    where
        K: Record,
        P: FnMut(&Entry<T>, &Entry<K>) -> bool,
    {
        self.retain_linked::<K, _>(|source, linked| {
            linked.first().is_some_and(|target| predicate(source, target))
        })?;
        Ok(self)
    }

    fn retain_linked<K, F>(&mut self, mut keep: F) -> Result<()>
    where
        K: Record,
        F: FnMut(&Entry<T>, &[Entry<K>]) -> bool,
    {
        let mut verdicts = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let linked = self.store.collect_linked::<K>(&entry.key)?;
            verdicts.push(keep(entry, &linked));
        }

        let mut verdicts = verdicts.into_iter();
        self.entries.retain(|_| verdicts.next().unwrap_or(false));
        Ok(())
    }
}

impl<'a, T> IntoIterator for Collection<'a, T> {
    type Item = Entry<T>;
    type IntoIter = std::vec::IntoIter<Entry<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a, 'c, T> IntoIterator for &'c Collection<'a, T> {
    type Item = &'c Entry<T>;
    type IntoIter = std::slice::Iter<'c, Entry<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
