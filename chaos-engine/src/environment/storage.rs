//! In-memory storage with a pluggable write path.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Mutates data on its way to storage.
pub trait Corruptor: Send + Sync + fmt::Debug {
    /// Possibly mutate `data` in place. Returns true if it was changed.
    fn corrupt(&self, key: &str, data: &mut [u8]) -> bool;
}

/// Handle to an installed corruptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorruptorId(u64);

#[derive(Debug, Default)]
struct WritePath {
    corruptors: Vec<(CorruptorId, Arc<dyn Corruptor>)>,
    next_id: u64,
}

/// Key/value store standing in for persistent storage.
#[derive(Debug, Default)]
pub struct Storage {
    data: Mutex<HashMap<String, Vec<u8>>>,
    write_path: Mutex<WritePath>,
    writes: AtomicU64,
    corrupted_writes: AtomicU64,
}

impl Storage {
    /// Empty store with a clean write path.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `data` under `key`, passing it through every installed corruptor.
    /// Returns true if the stored bytes differ from what was written.
    pub fn write(&self, key: &str, data: &[u8]) -> bool {
        let corruptors: Vec<Arc<dyn Corruptor>> = self
            .path()
            .corruptors
            .iter()
            .map(|(_, c)| Arc::clone(c))
            .collect();

        let mut stored = data.to_vec();
        for corruptor in &corruptors {
            corruptor.corrupt(key, &mut stored);
        }
        // Overlapping corruptors can undo each other.
        let corrupted = stored != data;

        self.writes.fetch_add(1, Ordering::Relaxed);
        if corrupted {
            self.corrupted_writes.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key, "Write corrupted");
        }
        lock(&self.data).insert(key.to_string(), stored);
        corrupted
    }

    /// Read back the bytes stored under `key`.
    pub fn read(&self, key: &str) -> Option<Vec<u8>> {
        lock(&self.data).get(key).cloned()
    }

    /// Add a corruptor to the write path.
    pub fn install_corruptor(&self, corruptor: Arc<dyn Corruptor>) -> CorruptorId {
        let mut path = self.path();
        let id = CorruptorId(path.next_id);
        path.next_id += 1;
        path.corruptors.push((id, corruptor));
        id
    }

    /// Remove a corruptor. Returns false if it was not installed.
    pub fn remove_corruptor(&self, id: CorruptorId) -> bool {
        let mut path = self.path();
        let before = path.corruptors.len();
        path.corruptors.retain(|(c, _)| *c != id);
        path.corruptors.len() != before
    }

    /// Returns true if no corruptor is installed.
    pub fn is_write_path_clean(&self) -> bool {
        self.path().corruptors.is_empty()
    }

    /// Writes stored so far.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Writes whose stored bytes differ from the input.
    pub fn corrupted_writes(&self) -> u64 {
        self.corrupted_writes.load(Ordering::Relaxed)
    }

    fn path(&self) -> MutexGuard<'_, WritePath> {
        lock(&self.write_path)
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
