use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;

use crate::model::Snapshot;

/// Holds the most recently observed snapshot.
///
/// The snapshot is replaced as a whole reference; readers clone the `Arc` and
/// always see either the old or the new snapshot in full.
#[derive(Clone)]
pub struct SnapshotStore {
    live: Arc<RwLock<Arc<Snapshot>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::with_snapshot(Snapshot::empty(Utc::now()))
    }

    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            live: Arc::new(RwLock::new(Arc::new(snapshot))),
        }
    }

    pub fn current(&self) -> Arc<Snapshot> {
        self.live
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn replace(&self, snapshot: Snapshot) {
        let next = Arc::new(snapshot);
        let mut guard = self.live.write().unwrap_or_else(PoisonError::into_inner);
        *guard = next;
    }

    pub fn len(&self) -> usize {
        self.current().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current().is_empty()
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}
