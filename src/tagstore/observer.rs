//! Change notifications
//!
//! Mutating operations report what they did to the listeners handed to the
//! store at construction. There is no global registry: a listener sees only
//! the stores it was explicitly given to.
//!
//! Every local mutation produces exactly one event, so a remote peer can
//! match one notification to one operation.

use std::fmt;
use std::sync::Arc;

/// A single observed mutation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChangeEvent {
    /// The tag was added or its value replaced.
    Added(String),
    /// The tag was removed.
    Deleted(String),
    /// The whole store was cleared or reloaded.
    FullReset,
}

impl ChangeEvent {
    /// Tag the event concerns, if it concerns a single tag.
    pub fn tag(&self) -> Option<&str> {
        match self {
            ChangeEvent::Added(tag) | ChangeEvent::Deleted(tag) => Some(tag),
            ChangeEvent::FullReset => None,
        }
    }
}

/// Receives change events. Called synchronously on the mutating thread.
pub trait ChangeListener: Send + Sync {
    fn on_change(&self, event: &ChangeEvent);
}

/// The set of listeners attached to one store.
#[derive(Clone, Default)]
pub struct Listeners {
    listeners: Vec<Arc<dyn ChangeListener>>,
}

impl Listeners {
    /// No listeners.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(listeners: Vec<Arc<dyn ChangeListener>>) -> Self {
        Self { listeners }
    }

    /// Single-listener set.
    pub fn single(listener: Arc<dyn ChangeListener>) -> Self {
        Self {
            listeners: vec![listener],
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn notify(&self, event: ChangeEvent) {
        for listener in &self.listeners {
            listener.on_change(&event);
        }
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.listeners.len())
            .finish()
    }
}
