use tracing::{debug, warn};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::store::StoreManager;
use crate::core::types::{Entry, Record};
use crate::storage::key::{Key, LinkKey, TableKey};

/// Link graph operations. Links are directed `current -> target` edges
/// stored as empty values; a bidirectional link is two edges.
impl StoreManager {
    /// Links `current` to each of `targets`, and each target back to
    /// `current` when `bidirectional`. Stops at the first target that is
    /// missing, equal to `current`, or fails to write; links written for
    /// earlier targets are kept.
    pub fn link(
        &self,
        current: &TableKey,
        bidirectional: bool,
        targets: &[TableKey],
    ) -> Result<()> {
        if !self.exists(current) {
            return Err(Error::invalid_id(current));
        }

        for target in targets {
            if !self.exists(target) {
                return Err(Error::invalid_id(target));
            }
            if target == current {
                return Err(Error::new(
                    ErrorKind::SelfBind,
                    format!("{} cannot be linked to itself", current),
                ));
            }

            let forward = LinkKey::new(current.clone(), target.clone());
            if bidirectional {
                self.write_link(&forward.reversed())?;
            }
            self.write_link(&forward)?;
        }
        Ok(())
    }

    /// Inserts each of `targets` and links it to `current`. Targets that fail
    /// to insert are skipped. A target that was inserted but could not be
    /// linked is still returned, so the caller can find the new row; keys come
    /// back in input order.
    pub fn link_new<T: Record>(
        &self,
        current: &TableKey,
        bidirectional: bool,
        targets: &[T],
    ) -> Result<Vec<TableKey>> {
        if !self.exists(current) {
            return Err(Error::invalid_id(current));
        }

        let mut inserted = Vec::with_capacity(targets.len());
        for target in targets {
            let key = match self.insert(target) {
                Ok(key) => key,
                Err(err) => {
                    warn!(
                        current = %current,
                        error = %err,
                        "skipping target that failed to insert"
                    );
                    continue;
                }
            };
            if let Err(err) = self.link(current, bidirectional, std::slice::from_ref(&key)) {
                warn!(
                    current = %current,
                    target = %key,
                    error = %err,
                    "inserted target left unlinked"
                );
            }
            inserted.push(key);
        }
        Ok(inserted)
    }

    /// Records of `T` that `current` links to, in link scan order.
    pub fn collect_linked<T: Record>(&self, current: &TableKey) -> Result<Vec<Entry<T>>> {
        let table = T::table_name();
        let targets: Vec<TableKey> = self
            .links_touching(current)
            .into_iter()
            .filter(|link| link.current == *current && link.target.name() == table)
            .map(|link| link.target)
            .collect();

        targets
            .into_iter()
            .map(|key| {
                let value = self.get::<T>(&key)?;
                Ok(Entry::new(key, value))
            })
            .collect()
    }

    /// Removes both `a -> b` and `b -> a`. Returns whether `a -> b` existed.
    pub fn unlink(&self, a: &TableKey, b: &TableKey) -> bool {
        self.backend
            .raw_delete(&Key::Link(LinkKey::new(b.clone(), a.clone())));
        self.backend
            .raw_delete(&Key::Link(LinkKey::new(a.clone(), b.clone())))
    }

    /// Removes every link, in either direction, between `key` and a record
    /// of `T`. Returns the number of links removed.
    pub fn unlink_all_of<T: Record>(&self, key: &TableKey) -> usize {
        let table = T::table_name();
        let doomed = self
            .links_touching(key)
            .into_iter()
            .filter(|link| {
                link.other_side(key)
                    .is_some_and(|other| other.name() == table)
            });
        self.remove_links(doomed)
    }

    /// Removes every link touching `key`. Returns the number removed.
    pub fn unlink_all(&self, key: &TableKey) -> usize {
        let doomed = self.links_touching(key);
        self.remove_links(doomed)
    }

    /// The opposite endpoint of every link touching `key`, one per link.
    /// Records are not read.
    pub fn collect_linked_keys(&self, key: &TableKey) -> Vec<TableKey> {
        self.links_touching(key)
            .iter()
            .filter_map(|link| link.other_side(key).cloned())
            .collect()
    }

    /// Every link with `key` on either side, collected before the caller
    /// acts on them.
    pub(crate) fn links_touching(&self, key: &TableKey) -> Vec<LinkKey> {
        let mut links = Vec::new();
        self.backend.iter_keys(&Key::all_links(), &mut |raw| {
            if let Key::Link(link) = raw {
                if link.touches(key) {
                    links.push(link);
                }
            }
            false
        });
        links
    }

    fn remove_links(&self, links: impl IntoIterator<Item = LinkKey>) -> usize {
        let mut removed = 0;
        for link in links {
            if self.backend.raw_delete(&Key::Link(link)) {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(removed, "removed links");
        }
        removed
    }

    fn write_link(&self, link: &LinkKey) -> Result<()> {
        if !self.backend.raw_set(&Key::Link(link.clone()), &[]) {
            warn!(link = %link, "backend refused link write");
            return Err(Error::new(
                ErrorKind::FailedToSet,
                format!("backend refused to write {}", link),
            ));
        }
        Ok(())
    }
}
