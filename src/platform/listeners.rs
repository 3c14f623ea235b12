//! A registry of event listeners keyed by id.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Callback invoked when an event fires.
pub type Listener = Rc<dyn Fn()>;

/// Handle returned when a listener is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Listeners in registration order, each bound to one event kind.
///
/// Ids are unique across all event kinds of one set.
pub struct ListenerSet<E = ()> {
    next_id: Cell<u64>,
    listeners: RefCell<Vec<(ListenerId, E, Listener)>>,
}

impl<E> Default for ListenerSet<E> {
    fn default() -> Self {
        Self {
            next_id: Cell::new(0),
            listeners: RefCell::new(Vec::new()),
        }
    }
}

impl<E: Copy + PartialEq> ListenerSet<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, event: E, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners.borrow_mut().push((id, event, listener));
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(existing, _, _)| *existing != id);
        listeners.len() != before
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.listeners.borrow().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call every listener for `event` registered at the moment of the call.
    ///
    /// Listeners may add or remove listeners while running.
    pub fn emit(&self, event: E) {
        let snapshot: Vec<Listener> = self
            .listeners
            .borrow()
            .iter()
            .filter(|(_, kind, _)| *kind == event)
            .map(|(_, _, listener)| Rc::clone(listener))
            .collect();
        for listener in snapshot {
            listener();
        }
    }
}
