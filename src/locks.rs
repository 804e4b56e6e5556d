//! Per-key mutual exclusion
//!
//! Operations on the same public port or the same application id run one
//! at a time; operations on different keys do not contend. Entries are
//! created on demand and dropped once nobody holds or waits on them.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{ArcMutexGuard, Mutex, RawMutex};

/// Resource a lifecycle operation serializes on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockKey {
    Port(u16),
    Id(u32),
}

#[derive(Debug, Default)]
pub struct KeyLocks {
    entries: Mutex<HashMap<LockKey, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `key` is free and hold it until the guard drops
    pub fn lock(&self, key: LockKey) -> KeyGuard<'_> {
        let entry = Arc::clone(
            self.entries
                .lock()
                .entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        );
        let guard = entry.lock_arc();
        KeyGuard {
            owner: self,
            key,
            entry,
            guard: Some(guard),
        }
    }

    /// Number of keys currently held or waited on
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct KeyGuard<'a> {
    owner: &'a KeyLocks,
    key: LockKey,
    entry: Arc<Mutex<()>>,
    guard: Option<ArcMutexGuard<RawMutex, ()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());

        // Holding the map lock, nobody can clone the entry; the map and
        // this guard are the only owners left when no one else waits.
        let mut entries = self.owner.entries.lock();
        if Arc::strong_count(&self.entry) == 2 {
            entries.remove(&self.key);
        }
    }
}
