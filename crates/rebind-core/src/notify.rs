#![forbid(unsafe_code)]

//! Subscriber fan-out shared by every observable surface in the crate.
//!
//! # Design
//!
//! [`Notifier<A>`] stores its subscriber list in shared, reference-counted
//! storage; cloning a notifier produces a second handle to the **same** list.
//! Subscribing returns a [`Subscription`] RAII guard that removes the
//! callback on drop.
//!
//! # Invariants
//!
//! 1. Callbacks are invoked synchronously, in registration order.
//! 2. No batching and no deduplication: every `emit` reaches every current
//!    subscriber exactly once.
//! 3. Emission never holds a borrow across a callback, so callbacks may
//!    re-enter the notifier (subscribe, unsubscribe, emit again).
//! 4. A callback removed during fan-out still observes the in-flight
//!    emission; removal takes effect for the next cycle.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

type Callback<A> = Rc<dyn Fn(&A)>;
type SubscriberList<A> = Rc<RefCell<Vec<(u64, Callback<A>)>>>;

/// A clone-shared fan-out point for change notifications.
pub struct Notifier<A> {
    subscribers: SubscriberList<A>,
    next_id: Rc<Cell<u64>>,
}

impl<A> Clone for Notifier<A> {
    fn clone(&self) -> Self {
        Self {
            subscribers: Rc::clone(&self.subscribers),
            next_id: Rc::clone(&self.next_id),
        }
    }
}

impl<A: 'static> Default for Notifier<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: 'static> Notifier<A> {
    /// Create a notifier with an empty subscriber list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: Rc::new(RefCell::new(Vec::new())),
            next_id: Rc::new(Cell::new(0)),
        }
    }

    /// Register a callback. The callback stays registered until the returned
    /// [`Subscription`] is dropped (or detached).
    #[must_use]
    pub fn subscribe(&self, callback: impl Fn(&A) + 'static) -> Subscription {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.subscribers
            .borrow_mut()
            .push((id, Rc::new(callback)));

        let list = Rc::downgrade(&self.subscribers);
        Subscription::new(move || {
            if let Some(list) = list.upgrade() {
                list.borrow_mut().retain(|(entry_id, _)| *entry_id != id);
            }
        })
    }

    /// Invoke every current subscriber with `arg`, in registration order.
    ///
    /// The subscriber list is snapshotted first, so callbacks may freely
    /// mutate it (or the owning object) without invalidating the fan-out.
    pub fn emit(&self, arg: &A) {
        let snapshot: Vec<Callback<A>> = self
            .subscribers
            .borrow()
            .iter()
            .map(|(_, callback)| Rc::clone(callback))
            .collect();

        for callback in snapshot {
            callback(arg);
        }
    }

    /// Number of currently registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }
}

/// RAII guard for a registered callback; dropping it unsubscribes.
#[must_use = "dropping a Subscription immediately removes the callback"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub(crate) fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Keep the callback registered for the lifetime of its notifier.
    pub fn detach(mut self) {
        self.cancel = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_reaches_subscribers_in_order() {
        let notifier: Notifier<u32> = Notifier::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let seen_a = Rc::clone(&seen);
        let _a = notifier.subscribe(move |v| seen_a.borrow_mut().push(("a", *v)));
        let seen_b = Rc::clone(&seen);
        let _b = notifier.subscribe(move |v| seen_b.borrow_mut().push(("b", *v)));

        notifier.emit(&7);
        assert_eq!(*seen.borrow(), vec![("a", 7), ("b", 7)]);
    }

    #[test]
    fn drop_unsubscribes() {
        let notifier: Notifier<()> = Notifier::new();
        let count = Rc::new(Cell::new(0u32));

        let count_clone = Rc::clone(&count);
        let sub = notifier.subscribe(move |_| count_clone.set(count_clone.get() + 1));

        notifier.emit(&());
        assert_eq!(count.get(), 1);

        drop(sub);
        notifier.emit(&());
        assert_eq!(count.get(), 1);
        assert_eq!(notifier.subscriber_count(), 0);
    }

    #[test]
    fn detach_keeps_callback_alive() {
        let notifier: Notifier<()> = Notifier::new();
        let count = Rc::new(Cell::new(0u32));

        let count_clone = Rc::clone(&count);
        notifier
            .subscribe(move |_| count_clone.set(count_clone.get() + 1))
            .detach();

        notifier.emit(&());
        notifier.emit(&());
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn clone_shares_subscriber_list() {
        let a: Notifier<()> = Notifier::new();
        let b = a.clone();
        let count = Rc::new(Cell::new(0u32));

        let count_clone = Rc::clone(&count);
        let _sub = a.subscribe(move |_| count_clone.set(count_clone.get() + 1));

        b.emit(&());
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn subscriber_may_subscribe_during_emit() {
        let notifier: Notifier<()> = Notifier::new();
        let notifier_clone = notifier.clone();
        let late = Rc::new(Cell::new(0u32));
        let late_clone = Rc::clone(&late);

        let held = Rc::new(RefCell::new(Vec::new()));
        let held_clone = Rc::clone(&held);
        let _sub = notifier.subscribe(move |_| {
            let late_inner = Rc::clone(&late_clone);
            let sub = notifier_clone.subscribe(move |_| late_inner.set(late_inner.get() + 1));
            held_clone.borrow_mut().push(sub);
        });

        // The newly added subscriber is not part of the current snapshot.
        notifier.emit(&());
        assert_eq!(late.get(), 0);

        // It is part of the next one.
        notifier.emit(&());
        assert_eq!(late.get(), 1);
    }

    #[test]
    fn unsubscribe_during_emit_still_sees_current_emission() {
        let notifier: Notifier<()> = Notifier::new();
        let count = Rc::new(Cell::new(0u32));

        let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let slot_clone = Rc::clone(&slot);
        let count_clone = Rc::clone(&count);
        let sub = notifier.subscribe(move |_| {
            count_clone.set(count_clone.get() + 1);
            // Drop our own subscription mid-fan-out.
            slot_clone.borrow_mut().take();
        });
        *slot.borrow_mut() = Some(sub);

        notifier.emit(&());
        notifier.emit(&());
        assert_eq!(count.get(), 1);
    }
}
