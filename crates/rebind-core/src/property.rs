#![forbid(unsafe_code)]

//! Name-keyed property storage backing [`ReactiveObject`](crate::ReactiveObject).
//!
//! The store holds type-erased values, per-name validators, the set of names
//! currently failing validation, and the set of names mutated since the last
//! reset. It performs no notification itself; callers translate the returned
//! outcomes into change events.
//!
//! # Invariants
//!
//! 1. A name is in the invalid set iff its validator exists and last
//!    evaluated to `false` (or panicked).
//! 2. The changed set is empty until the first successful mutation and is
//!    cleared atomically by [`reset_changes`](PropertyStore::reset_changes).
//! 3. Validation runs on the *attempted* value before equality comparison,
//!    so validity can flip even when the write is suppressed as a no-op.
//! 4. Validation never blocks assignment: an invalid value is still stored.
//!
//! # Failure Modes
//!
//! - **Validator panics**: contained, logged, the value is treated as
//!   invalid. Never propagates to the caller.
//! - **Type mismatch**: reading or writing a name under a different type
//!   than it was stored with is a contract violation and panics.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use ahash::{AHashMap, AHashSet};

/// Type-erased validation predicate registered for a single property.
pub(crate) type ErasedValidator = Rc<dyn Fn(&dyn Any) -> bool>;

/// Result of a write attempt, consumed by the notification layer.
pub(crate) enum WriteOutcome {
    /// The attempted value compared equal to the stored one; nothing changed.
    Unchanged,
    /// The value was stored and the name dirty-marked.
    Changed {
        /// True when this mutation is the first to dirty the object.
        first_dirty: bool,
    },
}

pub(crate) struct PropertyStore {
    values: AHashMap<String, Box<dyn Any>>,
    validators: AHashMap<String, ErasedValidator>,
    invalid: AHashSet<String>,
    changed: AHashSet<String>,
}

impl PropertyStore {
    pub(crate) fn new() -> Self {
        Self {
            values: AHashMap::new(),
            validators: AHashMap::new(),
            invalid: AHashSet::new(),
            changed: AHashSet::new(),
        }
    }

    /// Read `name`, initializing it from `default` on first access.
    ///
    /// A validator supplied on the initializing read is registered and run
    /// against the default immediately, so a freshly read property can start
    /// invalid. Returns the current value and whether a validator ran.
    pub(crate) fn read_or_init<T: Clone + 'static>(
        &mut self,
        name: &str,
        default: impl FnOnce() -> T,
        validator: Option<ErasedValidator>,
    ) -> (T, bool) {
        if let Some(existing) = self.values.get(name) {
            let value = existing.downcast_ref::<T>().unwrap_or_else(|| {
                panic!(
                    "property '{name}' re-read as {}, which does not match its stored type",
                    std::any::type_name::<T>()
                )
            });
            return (value.clone(), false);
        }

        let value = default();
        let mut validated = false;
        if let Some(validator) = validator {
            self.validators.insert(name.to_string(), validator);
            validated = self.validate(name, &value);
        }
        self.values.insert(name.to_string(), Box::new(value.clone()));
        (value, validated)
    }

    /// Attempt to write `name`.
    ///
    /// Validation runs on the attempted value first; the write is then
    /// suppressed if `eq` reports the stored value equal. Returns the write
    /// outcome and whether a validator ran.
    pub(crate) fn write<T: 'static>(
        &mut self,
        name: &str,
        value: T,
        eq: impl FnOnce(&T, &T) -> bool,
    ) -> (WriteOutcome, bool) {
        let validated = self.validate(name, &value);

        if let Some(existing) = self.values.get_mut(name) {
            let stored = existing.downcast_mut::<T>().unwrap_or_else(|| {
                panic!(
                    "property '{name}' written as {}, which does not match its stored type",
                    std::any::type_name::<T>()
                )
            });
            if eq(stored, &value) {
                return (WriteOutcome::Unchanged, validated);
            }
            *stored = value;
        } else {
            self.values.insert(name.to_string(), Box::new(value));
        }

        let first_dirty = self.changed.is_empty();
        self.changed.insert(name.to_string());
        (WriteOutcome::Changed { first_dirty }, validated)
    }

    /// Run the validator registered for `name`, if any, against `value`.
    ///
    /// Returns whether a validator ran. Membership in the invalid set is
    /// updated unconditionally when one did.
    fn validate(&mut self, name: &str, value: &dyn Any) -> bool {
        let Some(validator) = self.validators.get(name) else {
            return false;
        };
        let validator = Rc::clone(validator);

        let ok = match catch_unwind(AssertUnwindSafe(|| validator(value))) {
            Ok(ok) => ok,
            Err(_) => {
                tracing::warn!(property = name, "validator panicked; treating value as invalid");
                false
            }
        };

        if ok {
            self.invalid.remove(name);
        } else {
            self.invalid.insert(name.to_string());
        }
        true
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.invalid.is_empty()
    }

    pub(crate) fn is_dirty(&self) -> bool {
        !self.changed.is_empty()
    }

    pub(crate) fn invalid_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.invalid.iter().cloned().collect();
        names.sort_unstable();
        names
    }

    pub(crate) fn changed_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.changed.iter().cloned().collect();
        names.sort_unstable();
        names
    }

    pub(crate) fn reset_changes(&mut self) {
        self.changed.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn erase<T: 'static>(validator: impl Fn(&T) -> bool + 'static) -> ErasedValidator {
        Rc::new(move |value: &dyn Any| match value.downcast_ref::<T>() {
            Some(value) => validator(value),
            None => panic!("validator received a value of an unexpected type"),
        })
    }

    #[test]
    fn first_read_initializes_with_default() {
        let mut store = PropertyStore::new();
        let (value, validated) = store.read_or_init("count", || 42i32, None);
        assert_eq!(value, 42);
        assert!(!validated);
        assert!(!store.is_dirty());

        // Second read returns the stored value, default ignored.
        let (value, _) = store.read_or_init("count", || 0i32, None);
        assert_eq!(value, 42);
    }

    #[test]
    fn default_can_start_invalid() {
        let mut store = PropertyStore::new();
        let (value, validated) =
            store.read_or_init("name", String::new, Some(erase(|s: &String| !s.is_empty())));
        assert_eq!(value, "");
        assert!(validated);
        assert!(!store.is_valid());
        assert_eq!(store.invalid_names(), vec!["name".to_string()]);
    }

    #[test]
    fn write_suppresses_equal_values() {
        let mut store = PropertyStore::new();
        let (outcome, _) = store.write("count", 1i32, |a, b| a == b);
        assert!(matches!(outcome, WriteOutcome::Changed { first_dirty: true }));

        let (outcome, _) = store.write("count", 1i32, |a, b| a == b);
        assert!(matches!(outcome, WriteOutcome::Unchanged));
    }

    #[test]
    fn first_dirty_reported_once() {
        let mut store = PropertyStore::new();
        let (outcome, _) = store.write("a", 1i32, |a, b| a == b);
        assert!(matches!(outcome, WriteOutcome::Changed { first_dirty: true }));

        let (outcome, _) = store.write("b", 2i32, |a, b| a == b);
        assert!(matches!(outcome, WriteOutcome::Changed { first_dirty: false }));

        assert_eq!(
            store.changed_names(),
            vec!["a".to_string(), "b".to_string()]
        );

        store.reset_changes();
        assert!(!store.is_dirty());
        let (outcome, _) = store.write("a", 3i32, |a, b| a == b);
        assert!(matches!(outcome, WriteOutcome::Changed { first_dirty: true }));
    }

    #[test]
    fn invalid_value_is_still_stored() {
        let mut store = PropertyStore::new();
        let _ = store.read_or_init("age", || 0i32, Some(erase(|age: &i32| *age >= 0)));
        assert!(store.is_valid());

        let (outcome, validated) = store.write("age", -5i32, |a, b| a == b);
        assert!(matches!(outcome, WriteOutcome::Changed { .. }));
        assert!(validated);
        assert!(!store.is_valid());

        let (value, _) = store.read_or_init("age", || 0i32, None);
        assert_eq!(value, -5);
    }

    #[test]
    fn panicking_validator_is_contained_and_marks_invalid() {
        let mut store = PropertyStore::new();
        let _ = store.read_or_init(
            "text",
            || "ok".to_string(),
            Some(erase(|s: &String| {
                assert!(!s.contains('!'), "boom");
                true
            })),
        );
        assert!(store.is_valid());

        let (outcome, validated) = store.write("text", "bad!".to_string(), |a, b| a == b);
        assert!(matches!(outcome, WriteOutcome::Changed { .. }));
        assert!(validated);
        assert!(!store.is_valid());
    }

    #[test]
    fn equal_invalid_write_still_flips_validity() {
        let mut store = PropertyStore::new();
        let _ = store.read_or_init("name", || "x".to_string(), Some(erase(|s: &String| s != "x")));
        // Default "x" is invalid.
        assert!(!store.is_valid());

        let _ = store.write("name", "y".to_string(), |a, b| a == b);
        assert!(store.is_valid());

        // Writing "y" again is a suppressed no-op, but validation still ran.
        let (outcome, validated) = store.write("name", "y".to_string(), |a, b| a == b);
        assert!(matches!(outcome, WriteOutcome::Unchanged));
        assert!(validated);
    }

    #[test]
    #[should_panic(expected = "does not match its stored type")]
    fn type_mismatch_on_read_panics() {
        let mut store = PropertyStore::new();
        let _ = store.read_or_init("count", || 1i32, None);
        let _ = store.read_or_init("count", String::new, None);
    }

    #[test]
    #[should_panic(expected = "does not match its stored type")]
    fn type_mismatch_on_write_panics() {
        let mut store = PropertyStore::new();
        let _ = store.read_or_init("count", || 1i32, None);
        let _ = store.write("count", "nope".to_string(), |a, b| a == b);
    }
}
