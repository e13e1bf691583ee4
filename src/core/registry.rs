//! # Active-process registry.
//!
//! Maps each in-flight [`ExecutionId`] to its [`ProcessHandle`] so that
//! [`SupervisionEngine::terminate`](crate::SupervisionEngine::terminate) and
//! [`list_active`](crate::SupervisionEngine::list_active) can reach running
//! children from outside the executing task.
//!
//! ## Rules
//! - The engine registers right after spawn and deregisters before releasing its permit.
//! - Entries are cloned out under the lock; the lock is never held across process I/O.
//! - The `terminated` flag marks executions stopped on request (reported as `Terminated`).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::RwLock;

use crate::process::{ExecutionId, ProcessHandle};

/// Registry entry: the shared handle plus the external-termination mark.
#[derive(Clone)]
pub(crate) struct Entry {
    pub(crate) handle: Arc<ProcessHandle>,
    terminated: Arc<AtomicBool>,
}

impl Entry {
    /// Marks the execution as stopped on request.
    pub(crate) fn mark_terminated(&self) {
        self.terminated.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }
}

/// Registry of running executions.
#[derive(Default)]
pub(crate) struct Registry {
    active: RwLock<HashMap<ExecutionId, Entry>>,
}

impl Registry {
    /// Registers a freshly spawned child and returns its entry.
    pub(crate) async fn insert(&self, id: ExecutionId, handle: Arc<ProcessHandle>) -> Entry {
        let entry = Entry {
            handle,
            terminated: Arc::new(AtomicBool::new(false)),
        };
        self.active.write().await.insert(id, entry.clone());
        entry
    }

    /// Deregisters an execution; returns `true` if it was present.
    pub(crate) async fn remove(&self, id: &ExecutionId) -> bool {
        self.active.write().await.remove(id).is_some()
    }

    pub(crate) async fn get(&self, id: &ExecutionId) -> Option<Entry> {
        self.active.read().await.get(id).cloned()
    }

    /// Returns the identifiers of every running execution.
    pub(crate) async fn ids(&self) -> HashSet<ExecutionId> {
        self.active.read().await.keys().cloned().collect()
    }

    /// Returns a copy of every entry (for bulk termination).
    pub(crate) async fn snapshot(&self) -> Vec<(ExecutionId, Entry)> {
        self.active
            .read()
            .await
            .iter()
            .map(|(id, e)| (id.clone(), e.clone()))
            .collect()
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.active.read().await.len()
    }
}
