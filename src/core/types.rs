use std::fmt::Debug;
use serde::{Serialize, Deserialize};
use serde::de::DeserializeOwned;
use crate::storage::key::TableKey;

/// A value that can be stored as a row.
///
/// The table a record lives in defaults to its unqualified type name
/// (`my_app::model::User<u8>` lives in `User`). Override `table_name` to pin
/// a name that survives renames; it must not contain `_`, `@` or `%`.
pub trait Record: Serialize + DeserializeOwned + Debug + Clone + Send + Sync + 'static {
    fn table_name() -> String {
        short_type_name(std::any::type_name::<Self>())
    }
}

/// Strips the module path and generic arguments from a type name.
pub fn short_type_name(full: &str) -> String {
    let without_generics = full.split('<').next().unwrap_or(full);
    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
        .to_string()
}

/// A record together with the key it is stored under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry<T> {
    pub key: TableKey,
    pub value: T,
}

impl<T> Entry<T> {
    pub fn new(key: TableKey, value: T) -> Self {
        Entry { key, value }
    }

    pub fn id(&self) -> &str {
        self.key.id()
    }

    pub fn into_parts(self) -> (TableKey, T) {
        (self.key, self.value)
    }
}

/// Content hash over the table name and the printed field values. Two records
/// with the same fields hash the same regardless of where they are stored.
pub fn content_hash<T: Record>(value: &T) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(T::table_name().as_bytes());
    hasher.update(b"|");
    hasher.update(format!("{:?}", value).as_bytes());
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        t1: String,
        val: i32,
    }
    impl Record for Sample {}

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Renamed {
        t1: String,
        val: i32,
    }
    impl Record for Renamed {
        fn table_name() -> String {
            "Sample".to_string()
        }
    }

    #[test]
    fn default_table_name_is_the_bare_type_name() {
        assert_eq!(Sample::table_name(), "Sample");
        assert_eq!(short_type_name("a::b::Wrapper<c::D>"), "Wrapper");
        assert_eq!(short_type_name("Plain"), "Plain");
    }

    #[test]
    fn content_hash_ignores_identity_but_not_fields() {
        let a = Sample { t1: "a".into(), val: 1 };
        let b = Sample { t1: "a".into(), val: 1 };
        let c = Sample { t1: "a".into(), val: 2 };
        assert_eq!(content_hash(&a), content_hash(&b));
        assert_ne!(content_hash(&a), content_hash(&c));
    }

    #[test]
    fn content_hash_covers_the_printed_type() {
        // Same table name, same field values, different printed type name.
        let a = Sample { t1: "a".into(), val: 1 };
        let r = Renamed { t1: "a".into(), val: 1 };
        assert_ne!(content_hash(&a), content_hash(&r));
    }
}
