//! Synchronous change notifications for records.
//!
//! Listeners run to completion before control returns to the mutating
//! call, so observers always see the store in the state the mutation left
//! it in. The listener list is snapshotted before invocation, so a
//! listener may register further listeners without deadlocking.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::relation::State;

type Listener = Arc<dyn Fn(&State) + Send + Sync>;

pub(crate) struct ChangeEmitter {
    listeners: RwLock<Vec<Listener>>,
}

impl ChangeEmitter {
    pub(crate) fn new() -> Self {
        ChangeEmitter {
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn on<F>(&self, listener: F)
    where
        F: Fn(&State) + Send + Sync + 'static,
    {
        self.listeners.write().push(Arc::new(listener));
    }

    /// Invoke every listener with the applied patch, synchronously.
    pub(crate) fn emit(&self, patch: &State) {
        let snapshot: Vec<Listener> = self.listeners.read().clone();
        for listener in snapshot {
            listener(patch);
        }
    }
}
