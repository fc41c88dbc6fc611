//! Flat key grammar shared by every backend.
//!
//! | Namespace      | Prefix         | Body                                |
//! |----------------|----------------|-------------------------------------|
//! | table row      | `tbl%`         | `<table>_<id>`                      |
//! | link           | `lnk%`         | `<table>_<id>@<table>_<id>`         |
//! | tank available | `tank%avlbId_` | `<id>`                              |
//! | tank used      | `tank%usedId_` | `<id>`                              |
//!
//! Table names and ids must not contain `_`, `@` or `%`; the grammar is
//! ambiguous otherwise and nothing here re-validates it.

use std::fmt;
use serde::{Deserialize, Serialize};
use crate::core::types::Record;

pub const PREFIX_DELIMITER: &str = "%";
pub const ID_DELIMITER: &str = "_";
pub const LINK_DELIMITER: &str = "@";

pub const PREFIX_TABLE: &str = "tbl%";
pub const PREFIX_LINK: &str = "lnk%";
pub const PREFIX_TANK: &str = "tank%";
pub const PREFIX_TANK_AVAILABLE: &str = "tank%avlbId_";
pub const PREFIX_TANK_USED: &str = "tank%usedId_";

/// Address of one record: `{table name, id}`.
///
/// An empty id turns the key into a table prototype, whose prefix matches every
/// row of the table. An empty name matches every row of every table.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableKey {
    name: String,
    id: String,
}

impl TableKey {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        TableKey { name: name.into(), id: id.into() }
    }

    /// Key of the record `id` in the table of `T`.
    pub fn of<T: Record>(id: impl Into<String>) -> Self {
        TableKey::new(T::table_name(), id)
    }

    /// Prototype matching every row of the table of `T`.
    pub fn table<T: Record>() -> Self {
        TableKey::new(T::table_name(), "")
    }

    /// Prototype matching every table row in the store.
    pub fn any() -> Self {
        TableKey::default()
    }

    /// Parses a raw table key. The `tbl%` namespace is optional so link halves
    /// go through the same path.
    pub fn parse(raw: &str) -> Self {
        let body = raw.strip_prefix(PREFIX_TABLE).unwrap_or(raw);
        match body.split_once(ID_DELIMITER) {
            Some((name, id)) => TableKey::new(name, id),
            None => TableKey::new(body, ""),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn with_id(&self, id: impl Into<String>) -> Self {
        TableKey { name: self.name.clone(), id: id.into() }
    }

    pub fn prefix(&self) -> String {
        if self.name.is_empty() {
            return PREFIX_TABLE.to_string();
        }
        format!("{}{}{}", PREFIX_TABLE, self.name, ID_DELIMITER)
    }

    pub fn raw(&self) -> String {
        self.prefix() + &self.id
    }

    /// `<table>_<id>`, the form embedded in link keys.
    pub fn base(&self) -> String {
        format!("{}{}{}", self.name, ID_DELIMITER, self.id)
    }
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.raw())
    }
}

/// Directed edge `current -> target`. Stored with an empty value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct LinkKey {
    pub current: TableKey,
    pub target: TableKey,
}

impl LinkKey {
    pub fn new(current: TableKey, target: TableKey) -> Self {
        LinkKey { current, target }
    }

    /// Parses `lnk%<table>_<id>@<table>_<id>`. Returns `None` unless exactly
    /// one link delimiter separates the halves.
    pub fn parse(raw: &str) -> Option<Self> {
        let body = raw.strip_prefix(PREFIX_LINK).unwrap_or(raw);
        let mut halves = body.split(LINK_DELIMITER);
        let (current, target) = (halves.next()?, halves.next()?);
        if halves.next().is_some() {
            return None;
        }
        Some(LinkKey::new(TableKey::parse(current), TableKey::parse(target)))
    }

    /// True when `key` is either endpoint.
    pub fn touches(&self, key: &TableKey) -> bool {
        self.current == *key || self.target == *key
    }

    /// The endpoint opposite to `key`, if `key` is one of them.
    pub fn other_side(&self, key: &TableKey) -> Option<&TableKey> {
        if self.current == *key {
            Some(&self.target)
        } else if self.target == *key {
            Some(&self.current)
        } else {
            None
        }
    }

    pub fn reversed(&self) -> Self {
        LinkKey::new(self.target.clone(), self.current.clone())
    }

    pub fn raw(&self) -> String {
        format!(
            "{}{}{}{}",
            PREFIX_LINK,
            self.current.base(),
            LINK_DELIMITER,
            self.target.base()
        )
    }
}

impl fmt::Display for LinkKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.raw())
    }
}

/// Any key of the flat namespace.
///
/// The two tank variants are recognised so data written by a persisted id
/// pool still parses; the in-memory tank never writes them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    TankAvailable(String),
    TankUsed(String),
    Table(TableKey),
    Link(LinkKey),
}

impl Key {
    /// Dispatches on the namespace prefix. First match wins, in the order
    /// tank-available, tank-used, table, link.
    pub fn parse(raw: &str) -> Option<Key> {
        if let Some(id) = raw.strip_prefix(PREFIX_TANK_AVAILABLE) {
            return Some(Key::TankAvailable(id.to_string()));
        }
        if let Some(id) = raw.strip_prefix(PREFIX_TANK_USED) {
            return Some(Key::TankUsed(id.to_string()));
        }
        if raw.starts_with(PREFIX_TABLE) {
            return Some(Key::Table(TableKey::parse(raw)));
        }
        if raw.starts_with(PREFIX_LINK) {
            return LinkKey::parse(raw).map(Key::Link);
        }
        None
    }

    /// Prototype whose prefix matches every link in the store.
    pub fn all_links() -> Key {
        Key::Link(LinkKey::default())
    }

    /// Prefix used when this key drives a scan.
    pub fn prefix(&self) -> String {
        match self {
            Key::TankAvailable(_) => PREFIX_TANK_AVAILABLE.to_string(),
            Key::TankUsed(_) => PREFIX_TANK_USED.to_string(),
            Key::Table(key) => key.prefix(),
            Key::Link(_) => PREFIX_LINK.to_string(),
        }
    }

    pub fn raw(&self) -> String {
        match self {
            Key::TankAvailable(id) => format!("{}{}", PREFIX_TANK_AVAILABLE, id),
            Key::TankUsed(id) => format!("{}{}", PREFIX_TANK_USED, id),
            Key::Table(key) => key.raw(),
            Key::Link(key) => key.raw(),
        }
    }

    pub fn as_table(&self) -> Option<&TableKey> {
        match self {
            Key::Table(key) => Some(key),
            _ => None,
        }
    }

    pub fn as_link(&self) -> Option<&LinkKey> {
        match self {
            Key::Link(key) => Some(key),
            _ => None,
        }
    }
}

impl From<TableKey> for Key {
    fn from(key: TableKey) -> Self {
        Key::Table(key)
    }
}

impl From<LinkKey> for Key {
    fn from(key: LinkKey) -> Self {
        Key::Link(key)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.raw())
    }
}
