//! Shared key/value store for one device process
//!
//! Entries are typed through `Key<T>`; a read with the wrong type is
//! impossible for the well-known keys and simply misses for ad-hoc ones.

use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, PoisonError, RwLock};

use fleetman_api::AgentConfig;
use fleetman_bus::Transport;

use crate::job::JobManager;
use crate::tasks::BackgroundTasks;

/// Typed blackboard key
pub struct Key<T> {
    name: &'static str,
    _type: PhantomData<fn() -> T>,
}

impl<T> Key<T> {
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _type: PhantomData,
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for Key<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Key<T> {}

/// Well-known entries
pub mod keys {
    use super::*;

    pub const CONFIG: Key<AgentConfig> = Key::new("config");
    /// Current local address; absent until first detected
    pub const LOCAL_IP: Key<String> = Key::new("local_ip");
    pub const TRANSPORT: Key<Arc<dyn Transport>> = Key::new("transport");
    pub const JOBS: Key<JobManager> = Key::new("jobs");
    pub const TASKS: Key<BackgroundTasks> = Key::new("tasks");
}

type Entry = Arc<dyn Any + Send + Sync>;

/// Thread-safe blackboard
#[derive(Default)]
pub struct Blackboard {
    entries: RwLock<HashMap<&'static str, Entry>>,
}

impl Blackboard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T: Send + Sync + 'static>(&self, key: Key<T>, value: T) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.name, Arc::new(value));
    }

    /// Shared handle to the entry
    #[must_use]
    pub fn get_ref<T: Send + Sync + 'static>(&self, key: Key<T>) -> Option<Arc<T>> {
        let entry = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key.name)
            .cloned()?;
        entry.downcast::<T>().ok()
    }

    /// Copy of the entry
    #[must_use]
    pub fn get<T: Clone + Send + Sync + 'static>(&self, key: Key<T>) -> Option<T> {
        self.get_ref(key).map(|v| T::clone(&v))
    }

    pub fn remove<T>(&self, key: Key<T>) -> bool {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key.name)
            .is_some()
    }

    #[must_use]
    pub fn contains<T>(&self, key: Key<T>) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_overwrite() {
        let bb = Blackboard::new();
        assert!(bb.get(keys::LOCAL_IP).is_none());

        bb.set(keys::LOCAL_IP, "10.0.0.1".to_string());
        bb.set(keys::LOCAL_IP, "10.0.0.2".to_string());
        assert_eq!(bb.get(keys::LOCAL_IP).as_deref(), Some("10.0.0.2"));

        assert!(bb.remove(keys::LOCAL_IP));
        assert!(!bb.contains(keys::LOCAL_IP));
    }

    #[test]
    fn test_type_mismatch_misses() {
        let bb = Blackboard::new();
        bb.set(Key::<u32>::new("counter"), 7);

        assert_eq!(bb.get(Key::<u32>::new("counter")), Some(7));
        assert_eq!(bb.get(Key::<String>::new("counter")), None);
    }

    #[test]
    fn test_shared_across_threads() {
        let bb = Arc::new(Blackboard::new());
        let writer = bb.clone();
        std::thread::spawn(move || writer.set(Key::<u64>::new("n"), 42))
            .join()
            .unwrap();
        assert_eq!(bb.get(Key::<u64>::new("n")), Some(42));
    }
}
