#![forbid(unsafe_code)]

//! Collection wrapper that forwards item-level property changes as
//! collection-level notifications.
//!
//! A thin adapter over `Vec`: structural edits emit positional
//! [`VecChange`] events, and a contained item's property change is
//! re-emitted as [`VecChange::Replaced`] at the item's current index so
//! list bindings refresh the row. While notifications are suppressed,
//! changes are swallowed; un-suppressing after at least one swallowed
//! change emits a single [`VecChange::Reset`].

use std::cell::RefCell;
use std::rc::Rc;

use crate::notify::{Notifier, Subscription};
use crate::object::ReactiveObject;

/// Items that expose a [`ReactiveObject`] whose change stream can be
/// forwarded.
pub trait ReactiveItem {
    fn reactive(&self) -> &ReactiveObject;
}

impl ReactiveItem for ReactiveObject {
    fn reactive(&self) -> &ReactiveObject {
        self
    }
}

/// A collection-level change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VecChange {
    Inserted { index: usize },
    Removed { index: usize },
    /// The item at `index` changed in place (forwarded property change).
    Replaced { index: usize },
    /// The collection changed wholesale; re-read everything.
    Reset,
}

struct VecInner<T> {
    items: Vec<(T, Subscription)>,
    suppress: bool,
    swallowed: bool,
}

/// Observable list of reactive items. Cheap to clone; clones share state.
pub struct ObservableVec<T: ReactiveItem + 'static> {
    inner: Rc<RefCell<VecInner<T>>>,
    changes: Notifier<VecChange>,
}

impl<T: ReactiveItem + 'static> Clone for ObservableVec<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            changes: self.changes.clone(),
        }
    }
}

impl<T: ReactiveItem + 'static> Default for ObservableVec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ReactiveItem + 'static> ObservableVec<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(VecInner {
                items: Vec::new(),
                suppress: false,
                swallowed: false,
            })),
            changes: Notifier::new(),
        }
    }

    /// Subscribe to collection-level notifications.
    #[must_use]
    pub fn on_change(&self, callback: impl Fn(&VecChange) + 'static) -> Subscription {
        self.changes.subscribe(callback)
    }

    pub fn push(&self, item: T) {
        let subscription = self.forward_subscription(&item);
        let index = {
            let mut inner = self.inner.borrow_mut();
            inner.items.push((item, subscription));
            inner.items.len() - 1
        };
        self.emit(VecChange::Inserted { index });
    }

    pub fn insert(&self, index: usize, item: T) {
        let subscription = self.forward_subscription(&item);
        self.inner
            .borrow_mut()
            .items
            .insert(index, (item, subscription));
        self.emit(VecChange::Inserted { index });
    }

    /// Remove and return the item at `index`, dropping its forwarding
    /// subscription.
    pub fn remove(&self, index: usize) -> T {
        let (item, subscription) = self.inner.borrow_mut().items.remove(index);
        drop(subscription);
        self.emit(VecChange::Removed { index });
        item
    }

    /// Remove every item and emit one [`VecChange::Reset`].
    pub fn clear(&self) {
        self.inner.borrow_mut().items.clear();
        self.emit(VecChange::Reset);
    }

    /// Append all of `items`, emitting a single [`VecChange::Reset`] for the
    /// batch instead of one insertion event per item.
    pub fn extend(&self, items: impl IntoIterator<Item = T>) {
        let already_suppressed = self.suppress_notifications();
        if !already_suppressed {
            self.set_suppress_notifications(true);
        }
        for item in items {
            self.push(item);
        }
        if !already_suppressed {
            self.set_suppress_notifications(false);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().items.is_empty()
    }

    /// Clone out the item at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<T>
    where
        T: Clone,
    {
        self.inner
            .borrow()
            .items
            .get(index)
            .map(|(item, _)| item.clone())
    }

    /// Borrow the item at `index` without cloning.
    pub fn with_item<R>(&self, index: usize, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.inner
            .borrow()
            .items
            .get(index)
            .map(|(item, _)| f(item))
    }

    #[must_use]
    pub fn suppress_notifications(&self) -> bool {
        self.inner.borrow().suppress
    }

    /// Toggle notification suppression. Turning it off after at least one
    /// swallowed change emits a single [`VecChange::Reset`].
    pub fn set_suppress_notifications(&self, value: bool) {
        let emit_reset = {
            let mut inner = self.inner.borrow_mut();
            if inner.suppress == value {
                return;
            }
            inner.suppress = value;
            if !value && inner.swallowed {
                inner.swallowed = false;
                true
            } else {
                false
            }
        };
        if emit_reset {
            self.changes.emit(&VecChange::Reset);
        }
    }

    fn emit(&self, change: VecChange) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.suppress {
                inner.swallowed = true;
                return;
            }
        }
        self.changes.emit(&change);
    }

    /// Wire an item's property-change stream into this collection.
    ///
    /// The callback holds only a weak reference to the collection and an
    /// identity token for the item, so neither keeps the other alive.
    fn forward_subscription(&self, item: &T) -> Subscription {
        let inner = Rc::downgrade(&self.inner);
        let changes = self.changes.clone();
        let addr = item.reactive().addr();
        item.reactive().on_change(move |_name| {
            let Some(inner) = inner.upgrade() else {
                return;
            };
            {
                let mut inner_ref = inner.borrow_mut();
                if inner_ref.suppress {
                    inner_ref.swallowed = true;
                    return;
                }
            }
            let index = inner
                .borrow()
                .items
                .iter()
                .position(|(item, _)| item.reactive().addr() == addr);
            match index {
                Some(index) => changes.emit(&VecChange::Replaced { index }),
                None => changes.emit(&VecChange::Reset),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
