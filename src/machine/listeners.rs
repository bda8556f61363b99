//! Listener lists with explicit unsubscription.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

type Callback<T> = Rc<dyn Fn(&T)>;

struct Entries<T: ?Sized> {
    next_id: u64,
    callbacks: Vec<(u64, Callback<T>)>,
}

/// Ordered list of callbacks, notified in registration order.
pub(crate) struct Listeners<T: ?Sized> {
    entries: Rc<RefCell<Entries<T>>>,
}

impl<T: ?Sized> Clone for Listeners<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Rc::clone(&self.entries),
        }
    }
}

impl<T: ?Sized + 'static> Listeners<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Rc::new(RefCell::new(Entries {
                next_id: 0,
                callbacks: Vec::new(),
            })),
        }
    }

    pub(crate) fn add(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let callback: Callback<T> = Rc::new(callback);
        let id = {
            let mut entries = self.entries.borrow_mut();
            let id = entries.next_id;
            entries.next_id += 1;
            entries.callbacks.push((id, callback));
            id
        };

        let weak: Weak<RefCell<Entries<T>>> = Rc::downgrade(&self.entries);
        Subscription {
            remove: Box::new(move || {
                if let Some(entries) = weak.upgrade() {
                    entries.borrow_mut().callbacks.retain(|(entry, _)| *entry != id);
                }
            }),
        }
    }

    /// Call every listener registered at the time of the call.
    ///
    /// Listeners may subscribe or unsubscribe while being notified; the
    /// change takes effect from the next notification.
    pub(crate) fn notify(&self, value: &T) {
        let snapshot: Vec<Callback<T>> = self
            .entries
            .borrow()
            .callbacks
            .iter()
            .map(|(_, callback)| Rc::clone(callback))
            .collect();
        for callback in snapshot {
            callback(value);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.borrow().callbacks.len()
    }
}

/// Handle returned by `subscribe`; removes the listener when consumed.
///
/// Dropping the handle without calling `unsubscribe` keeps the listener.
#[must_use = "call unsubscribe() to remove the listener; dropping the handle keeps it registered"]
pub struct Subscription {
    remove: Box<dyn FnOnce()>,
}

impl Subscription {
    /// Remove the listener.
    pub fn unsubscribe(self) {
        (self.remove)();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}
