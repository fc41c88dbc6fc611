use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use parking_lot::RwLock;
use tracing::{debug, info};
use crate::codec::codec::Codec;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::Record;
use crate::parallel::task_pool;
use crate::storage::key::TableKey;
use crate::trigger::operation::Operation;

/// A decoded record with its concrete type erased.
pub type Payload = dyn Any + Send + Sync;

type BeforeFn = Arc<dyn Fn(Operation, &TableKey, &Payload) -> bool + Send + Sync>;
type AfterFn = Arc<dyn Fn(Operation, &TableKey, &Payload) + Send + Sync>;

/// Decodes raw bytes of one table into its record type.
pub type DecodeFn = fn(Codec, &[u8]) -> Result<Box<Payload>>;

fn decode_as<T: Record>(codec: Codec, bytes: &[u8]) -> Result<Box<Payload>> {
    let value: T = codec.decode(bytes)?;
    Ok(Box::new(value))
}

#[derive(Clone)]
enum Action {
    Before(BeforeFn),
    After(AfterFn),
}

/// A callback bound to one table and a set of operations.
#[derive(Clone)]
pub struct Trigger {
    id: String,
    table_name: String,
    operations: Operation,
    action: Action,
    decode: DecodeFn,
}

impl Trigger {
    /// Trigger run before the write. Returning `false` cancels the operation.
    pub fn before<T, F>(id: impl Into<String>, operations: Operation, callback: F) -> Self
    where
        T: Record,
        F: Fn(Operation, &TableKey, &T) -> bool + Send + Sync + 'static,
    {
        let action = Action::Before(Arc::new(
            move |op: Operation, key: &TableKey, payload: &Payload| -> bool {
                match payload.downcast_ref::<T>() {
                    Some(value) => callback(op, key, value),
                    None => {
                        debug!(key = %key, "payload type does not match trigger, skipping");
                        true
                    }
                }
            },
        ));
        Trigger::with_action::<T>(id.into(), operations, action)
    }

    /// Trigger run after the write has reached the backend.
    pub fn after<T, F>(id: impl Into<String>, operations: Operation, callback: F) -> Self
    where
        T: Record,
        F: Fn(Operation, &TableKey, &T) + Send + Sync + 'static,
    {
        let action = Action::After(Arc::new(
            move |op: Operation, key: &TableKey, payload: &Payload| {
                if let Some(value) = payload.downcast_ref::<T>() {
                    callback(op, key, value);
                }
            },
        ));
        Trigger::with_action::<T>(id.into(), operations, action)
    }

    fn with_action<T: Record>(id: String, operations: Operation, action: Action) -> Self {
        Trigger {
            id,
            table_name: T::table_name(),
            operations,
            action,
            decode: decode_as::<T>,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn operations(&self) -> Operation {
        self.operations
    }

    pub fn is_before(&self) -> bool {
        matches!(self.action, Action::Before(_))
    }

    fn watches(&self, table_name: &str, op: Operation) -> bool {
        self.table_name == table_name && self.operations.contains(op)
    }
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Trigger")
            .field("id", &self.id)
            .field("table_name", &self.table_name)
            .field("operations", &self.operations)
            .field("before", &self.is_before())
            .finish()
    }
}

/// Before and after triggers of one store, in registration order.
///
/// Ids share one namespace per table whether the trigger runs before or
/// after. Dispatch copies the matching callbacks out of the lock first, so
/// callbacks may register or remove triggers themselves.
pub struct TriggerRegistry {
    triggers: RwLock<Vec<Trigger>>,
    max_workers: usize,
}

impl TriggerRegistry {
    pub fn new(max_workers: usize) -> Self {
        TriggerRegistry {
            triggers: RwLock::new(Vec::new()),
            max_workers,
        }
    }

    pub fn add(&self, trigger: Trigger) -> Result<()> {
        let mut triggers = self.triggers.write();
        if triggers
            .iter()
            .any(|t| t.table_name == trigger.table_name && t.id == trigger.id)
        {
            return Err(Error::new(
                ErrorKind::DuplicateTrigger,
                format!("trigger {} already exists on {}", trigger.id, trigger.table_name),
            ));
        }
        info!(
            table = %trigger.table_name,
            id = %trigger.id,
            operations = %trigger.operations,
            before = trigger.is_before(),
            "registered trigger"
        );
        triggers.push(trigger);
        Ok(())
    }

    pub fn remove(&self, table_name: &str, id: &str) -> Result<Trigger> {
        let mut triggers = self.triggers.write();
        let position = triggers
            .iter()
            .position(|t| t.table_name == table_name && t.id == id)
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::InexistentTrigger,
                    format!("no trigger {} on {}", id, table_name),
                )
            })?;
        info!(table = %table_name, id = %id, "removed trigger");
        Ok(triggers.remove(position))
    }

    pub fn len(&self) -> usize {
        self.triggers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.read().is_empty()
    }

    /// True when any trigger, before or after, listens to `op` on `table_name`.
    pub fn watches(&self, table_name: &str, op: Operation) -> bool {
        self.triggers.read().iter().any(|t| t.watches(table_name, op))
    }

    /// Decodes `bytes` for dispatch when some trigger listens to `op` on the
    /// table. Returns `None` without decoding otherwise.
    pub fn decode_watched(
        &self,
        table_name: &str,
        op: Operation,
        codec: Codec,
        bytes: &[u8],
    ) -> Result<Option<Box<Payload>>> {
        let decode = self
            .triggers
            .read()
            .iter()
            .find(|t| t.watches(table_name, op))
            .map(|t| t.decode);
        match decode {
            Some(decode) => decode(codec, bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Runs every matching before-trigger concurrently. All of them run even
    /// once one has vetoed; the result is the AND of their answers.
    pub fn run_before(&self, op: Operation, key: &TableKey, payload: &Payload) -> bool {
        let callbacks: Vec<BeforeFn> = self
            .matching(key.name(), op)
            .into_iter()
            .filter_map(|action| match action {
                Action::Before(f) => Some(f),
                Action::After(_) => None,
            })
            .collect();
        if callbacks.is_empty() {
            return true;
        }

        let allowed = AtomicBool::new(true);
        task_pool::scoped(self.max_workers, |pool| {
            for callback in callbacks {
                let allowed = &allowed;
                pool.add_task(move || {
                    let verdict = callback(op, key, payload);
                    allowed.fetch_and(verdict, Ordering::SeqCst);
                });
            }
        });

        let allowed = allowed.into_inner();
        if !allowed {
            debug!(key = %key, op = %op, "operation cancelled by trigger");
        }
        allowed
    }

    /// Runs every matching after-trigger concurrently and waits for them.
    pub fn run_after(&self, op: Operation, key: &TableKey, payload: &Payload) {
        let callbacks: Vec<AfterFn> = self
            .matching(key.name(), op)
            .into_iter()
            .filter_map(|action| match action {
                Action::After(f) => Some(f),
                Action::Before(_) => None,
            })
            .collect();
        if callbacks.is_empty() {
            return;
        }

        task_pool::scoped(self.max_workers, |pool| {
            for callback in callbacks {
                pool.add_task(move || callback(op, key, payload));
            }
        });
    }

    fn matching(&self, table_name: &str, op: Operation) -> Vec<Action> {
        self.triggers
            .read()
            .iter()
            .filter(|t| t.watches(table_name, op))
            .map(|t| t.action.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Note {
        text: String,
    }
    impl Record for Note {}

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Other;
    impl Record for Other {}

    fn note() -> Note {
        Note { text: "hi".into() }
    }

    #[test]
    fn duplicate_ids_are_rejected_across_before_and_after() {
        let registry = TriggerRegistry::new(4);
        registry
            .add(Trigger::before::<Note, _>("audit", Operation::INSERT, |_, _, _| true))
            .unwrap();
        let err = registry
            .add(Trigger::after::<Note, _>("audit", Operation::DELETE, |_, _, _| {}))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateTrigger);

        // Same id on another table is fine.
        registry
            .add(Trigger::after::<Other, _>("audit", Operation::DELETE, |_, _, _| {}))
            .unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn removing_a_missing_trigger_fails() {
        let registry = TriggerRegistry::new(4);
        let err = registry.remove("Note", "ghost").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InexistentTrigger);

        registry
            .add(Trigger::before::<Note, _>("t", Operation::ALL, |_, _, _| true))
            .unwrap();
        let removed = registry.remove("Note", "t").unwrap();
        assert!(removed.is_before());
        assert!(registry.is_empty());
    }

    #[test]
    fn every_before_trigger_runs_even_after_a_veto() {
        let registry = TriggerRegistry::new(4);
        let calls = Arc::new(AtomicUsize::new(0));
        for (i, verdict) in [true, false, true, true].into_iter().enumerate() {
            let calls = Arc::clone(&calls);
            registry
                .add(Trigger::before::<Note, _>(
                    format!("t{}", i),
                    Operation::INSERT,
                    move |_, _, _| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        verdict
                    },
                ))
                .unwrap();
        }

        let key = TableKey::of::<Note>("1");
        assert!(!registry.run_before(Operation::INSERT, &key, &note()));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn dispatch_filters_by_table_and_operation() {
        let registry = TriggerRegistry::new(4);
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        registry
            .add(Trigger::after::<Note, _>(
                "count",
                Operation::INSERT | Operation::UPDATE,
                move |_, _, value| {
                    assert_eq!(value.text, "hi");
                    counter.fetch_add(1, Ordering::SeqCst);
                },
            ))
            .unwrap();

        let key = TableKey::of::<Note>("1");
        registry.run_after(Operation::INSERT, &key, &note());
        registry.run_after(Operation::UPDATE, &key, &note());
        registry.run_after(Operation::DELETE, &key, &note());
        registry.run_after(Operation::INSERT, &TableKey::of::<Other>("1"), &Other);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn decodes_only_watched_tables() {
        let registry = TriggerRegistry::new(4);
        registry
            .add(Trigger::after::<Note, _>("d", Operation::DELETE, |_, _, _| {}))
            .unwrap();
        let bytes = Codec::Bincode.encode(&note()).unwrap();

        let decoded = registry
            .decode_watched("Note", Operation::DELETE, Codec::Bincode, &bytes)
            .unwrap()
            .unwrap();
        assert_eq!(decoded.downcast_ref::<Note>().unwrap().text, "hi");

        assert!(registry
            .decode_watched("Note", Operation::INSERT, Codec::Bincode, &bytes)
            .unwrap()
            .is_none());
        assert!(registry
            .decode_watched("Other", Operation::DELETE, Codec::Bincode, b"junk")
            .unwrap()
            .is_none());
    }
}
