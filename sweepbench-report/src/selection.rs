//! Active-Algorithm Selection Store
//!
//! Both result views read and write the same selection. Writes that would not
//! change anything are dropped before any listener runs, which is what stops
//! a table -> chart -> table echo from looping.

use parking_lot::Mutex;
use std::sync::{Arc, LazyLock};

/// Immutable view of the selection at one revision
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selection {
    /// Active algorithm ids, in the order they were set
    pub active: Vec<String>,
    /// Advances once per effective change
    pub revision: u64,
}

/// Handle returned by [`SelectionStore::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&Selection) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(SubscriptionId, Listener)>,
}

/// Process-wide selection with change notification
#[derive(Default)]
pub struct SelectionStore {
    state: Mutex<Selection>,
    listeners: Mutex<Listeners>,
}

static GLOBAL: LazyLock<SelectionStore> = LazyLock::new(SelectionStore::new);

impl SelectionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide instance shared by every view
    pub fn global() -> &'static SelectionStore {
        &GLOBAL
    }

    /// Current selection
    pub fn snapshot(&self) -> Selection {
        self.state.lock().clone()
    }

    /// Current active ids
    pub fn active(&self) -> Vec<String> {
        self.state.lock().active.clone()
    }

    /// Current revision
    pub fn revision(&self) -> u64 {
        self.state.lock().revision
    }

    /// Replace the active ids.
    ///
    /// Returns `false` without notifying anyone when `ids` equals the current
    /// selection element-wise. Listeners run after the lock is released and
    /// may call back into the store.
    pub fn set_active<I, S>(&self, ids: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: Vec<String> = ids.into_iter().map(Into::into).collect();

        let snapshot = {
            let mut state = self.state.lock();
            if state.active == ids {
                return false;
            }
            state.active = ids;
            state.revision += 1;
            state.clone()
        };

        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .entries
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        tracing::trace!(
            revision = snapshot.revision,
            listeners = listeners.len(),
            "selection changed: {:?}",
            snapshot.active
        );

        for listener in listeners {
            listener(&snapshot);
        }
        true
    }

    /// Register a change listener
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&Selection) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        let mut listeners = self.listeners.lock();
        let id = SubscriptionId(listeners.next_id);
        listeners.next_id += 1;
        listeners.entries.push((id, listener));
        id
    }

    /// Remove a listener; returns whether it was registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.entries.len();
        listeners.entries.retain(|(entry, _)| *entry != id);
        listeners.entries.len() != before
    }
}

impl std::fmt::Debug for SelectionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionStore")
            .field("state", &*self.state.lock())
            .field("listeners", &self.listeners.lock().entries.len())
            .finish()
    }
}
