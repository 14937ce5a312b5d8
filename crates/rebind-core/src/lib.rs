#![forbid(unsafe_code)]

//! Reactive object model for building UI-bound view models without
//! generated code-behind.
//!
//! - [`ReactiveObject`]: a property bag with change notification,
//!   validation, and dirty tracking; properties need no backing fields.
//! - [`Command`] and friends: encapsulated actions with enablement
//!   predicates and a re-evaluate signal for bindings.
//! - [`ViewModel`]: command caching, busy state, exception containment,
//!   and asynchronous initialization layered on top.
//! - [`ObservableVec`]: forwards item-level property changes as
//!   collection-level notifications.
//!
//! Instances assume a single logical owner thread (typical of UI-bound
//! state) and perform no internal locking. Async command bodies suspend
//! cooperatively on a view-model-owned pool; nothing here blocks a calling
//! thread.

pub mod collection;
pub mod command;
pub mod notify;
pub mod object;
mod property;
pub mod viewmodel;

pub use collection::{ObservableVec, ReactiveItem, VecChange};
pub use command::{
    AsyncCommand, AsyncParamCommand, CanExecute, Command, CommandBase, CommandError,
    CommandResult, ParamCommand,
};
pub use notify::{Notifier, Subscription};
pub use object::{IS_DIRTY, IS_VALID, ReactiveObject};
pub use viewmodel::{IS_BUSY, IS_INITIALIZED, ViewModel, WeakViewModel};
