use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::types::Index;
use crate::types::Uid;

/// Process-wide table mapping a participant identifier to its last persisted snapshot
/// index.
///
/// Readable concurrently from any task; written only by the manager owning the
/// corresponding `uid`. `DashMap` gives sharded lock-free-ish read/write concurrency
/// without requiring every reader to take the same global lock.
pub struct IndexRegistry {
    table: DashMap<Uid, Index>,
}

impl IndexRegistry {
    fn new() -> Self {
        IndexRegistry { table: DashMap::new() }
    }

    /// Record `index` as the last persisted snapshot index for `uid`.
    ///
    /// Called only by `init` (after a successful meta-read), `complete_snapshot`, and
    /// the final chunk of `accept_chunk` — never concurrently for the same `uid`.
    pub fn publish(&self, uid: &Uid, index: Index) {
        self.table.insert(uid.clone(), index);
    }

    /// Look up the last published snapshot index for `uid`, if any.
    pub fn last_snapshot_index(&self, uid: &Uid) -> Option<Index> {
        self.table.get(uid).map(|v| *v)
    }
}

static REGISTRY: Lazy<IndexRegistry> = Lazy::new(IndexRegistry::new);

/// The process-wide index registry. Any task may read it; only a participant's
/// owning manager writes to its own `uid`'s entry.
pub fn registry() -> &'static IndexRegistry {
    &REGISTRY
}

/// `last_snapshot_index(uid) → Option<Index>` — callable from any task.
pub fn last_snapshot_index(uid: &Uid) -> Option<Index> {
    registry().last_snapshot_index(uid)
}
