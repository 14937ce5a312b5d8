#![forbid(unsafe_code)]

//! Reactive property-bag object: named properties without backing fields.
//!
//! # Design
//!
//! [`ReactiveObject`] wraps a [`PropertyStore`] in shared, reference-counted
//! storage. Cloning an object creates a new handle to the **same** state.
//! Derived types implement properties by routing accessors through
//! [`get`](ReactiveObject::get)/[`set`](ReactiveObject::set) under a stable,
//! per-property name.
//!
//! Every successful mutation emits a change notification for that name.
//! Aggregate validity and dirtiness are derived signals, notified under the
//! exported [`IS_VALID`] and [`IS_DIRTY`] names so bindings can filter one
//! change stream.
//!
//! # Invariants
//!
//! 1. Notifications are synchronous, on the calling thread, in mutation
//!    order; there is no event queue.
//! 2. A suppressed (equal-value) write emits no property notification and
//!    performs no dirty-marking, but a registered validator still runs on
//!    the attempted value and the validity signal still fires.
//! 3. The aggregate dirty notification fires only for the first field that
//!    dirties the object; resetting fires it unconditionally.
//! 4. Property names must be stable and unique per logical property within
//!    one object; re-reading a name under a different type panics.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use crate::notify::{Notifier, Subscription};
use crate::property::{ErasedValidator, PropertyStore, WriteOutcome};

/// Change-notification name for the aggregate validity signal.
pub const IS_VALID: &str = "is_valid";

/// Change-notification name for the aggregate dirty signal.
pub const IS_DIRTY: &str = "is_dirty";

/// A property-bag object emitting change notifications on mutation.
///
/// Cheap to clone; clones share state. Single logical owner thread, no
/// internal locking.
pub struct ReactiveObject {
    store: Rc<RefCell<PropertyStore>>,
    changes: Notifier<String>,
}

impl Clone for ReactiveObject {
    fn clone(&self) -> Self {
        Self {
            store: Rc::clone(&self.store),
            changes: self.changes.clone(),
        }
    }
}

impl Default for ReactiveObject {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ReactiveObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let store = self.store.borrow();
        f.debug_struct("ReactiveObject")
            .field("is_valid", &store.is_valid())
            .field("is_dirty", &store.is_dirty())
            .finish()
    }
}

impl ReactiveObject {
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: Rc::new(RefCell::new(PropertyStore::new())),
            changes: Notifier::new(),
        }
    }

    /// Subscribe to property-change notifications. The callback receives the
    /// property name (or [`IS_VALID`]/[`IS_DIRTY`] for the aggregates).
    #[must_use]
    pub fn on_change(&self, callback: impl Fn(&str) + 'static) -> Subscription {
        self.changes.subscribe(move |name: &String| callback(name))
    }

    /// Emit a change notification for `name` without touching any value.
    pub fn notify(&self, name: &str) {
        self.changes.emit(&name.to_string());
    }

    /// Read `name`, initializing it to `default` on first access.
    pub fn get<T: Clone + 'static>(&self, name: &str, default: T) -> T {
        self.get_or_else(name, || default)
    }

    /// Read `name`, initializing it lazily on first access.
    pub fn get_or_else<T: Clone + 'static>(&self, name: &str, default: impl FnOnce() -> T) -> T {
        let (value, _) = self.store.borrow_mut().read_or_init(name, default, None);
        value
    }

    /// Read `name`, registering `validator` on the initializing access.
    ///
    /// The validator runs against the default immediately, so a freshly read
    /// property can start invalid (and the validity signal fires).
    pub fn get_validated<T: Clone + 'static>(
        &self,
        name: &str,
        default: T,
        validator: impl Fn(&T) -> bool + 'static,
    ) -> T {
        let erased: ErasedValidator = Rc::new(move |value: &dyn Any| {
            value
                .downcast_ref::<T>()
                .is_some_and(|value| validator(value))
        });
        let (value, validated) =
            self.store
                .borrow_mut()
                .read_or_init(name, || default, Some(erased));
        if validated {
            self.notify(IS_VALID);
        }
        value
    }

    /// Write `name` using `==` for the no-op check. Returns whether the
    /// value actually changed.
    pub fn set<T: PartialEq + 'static>(&self, name: &str, value: T) -> bool {
        self.set_with(name, value, |a: &T, b: &T| a == b)
    }

    /// Write `name` using a caller-supplied equality check.
    ///
    /// Any registered validator runs on the attempted value *before* the
    /// equality comparison; validity can therefore change even when the
    /// write is suppressed. On an actual change the property notification
    /// fires, the name is dirty-marked, and the aggregate dirty notification
    /// fires if this was the first dirty field.
    pub fn set_with<T: 'static>(
        &self,
        name: &str,
        value: T,
        eq: impl FnOnce(&T, &T) -> bool,
    ) -> bool {
        let (outcome, validated) = self.store.borrow_mut().write(name, value, eq);
        if validated {
            self.notify(IS_VALID);
        }
        match outcome {
            WriteOutcome::Unchanged => false,
            WriteOutcome::Changed { first_dirty } => {
                self.notify(name);
                if first_dirty {
                    self.notify(IS_DIRTY);
                }
                true
            }
        }
    }

    /// True when no property currently fails its validator.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.store.borrow().is_valid()
    }

    /// True when any property was mutated since construction or the last
    /// [`reset_changes`](Self::reset_changes).
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.store.borrow().is_dirty()
    }

    /// Names currently failing validation, sorted.
    #[must_use]
    pub fn invalid_fields(&self) -> Vec<String> {
        self.store.borrow().invalid_names()
    }

    /// Names mutated since the last reset, sorted.
    #[must_use]
    pub fn changed_fields(&self) -> Vec<String> {
        self.store.borrow().changed_names()
    }

    /// Clear the dirty set and fire the aggregate dirty notification
    /// unconditionally.
    pub fn reset_changes(&self) {
        self.store.borrow_mut().reset_changes();
        self.notify(IS_DIRTY);
    }

    /// Whether two handles refer to the same underlying object.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.store, &other.store)
    }

    /// Stable identity token for this object, used by the collection
    /// adapter to locate items after their property changes.
    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.store) as usize
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
