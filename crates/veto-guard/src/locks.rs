use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use veto_core::PrincipalId;

/// One mutex per principal, so read-decide-append sequences for the same
/// principal run one at a time while different principals proceed in
/// parallel. Only covers callers sharing this process.
///
/// Entries live only while some caller holds or waits on them; the last
/// caller out removes the principal's entry.
#[derive(Debug, Default)]
pub struct PrincipalLocks {
    locks: DashMap<PrincipalId, Arc<Mutex<()>>>,
}

impl PrincipalLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the principal's lock.
    pub fn with_lock<T>(&self, principal: PrincipalId, f: impl FnOnce() -> T) -> T {
        let result = {
            // Clone out of the map so the shard lock is released before blocking.
            let lock = Arc::clone(self.locks.entry(principal).or_default().value());
            let _guard = lock.lock();
            f()
        };
        // Only the map's own handle left: nobody holds or waits on it. The
        // check runs under the shard lock, so no new handle can be cloned
        // out concurrently.
        self.locks
            .remove_if(&principal, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    /// Number of principals currently holding or waiting on a lock.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
