#![forbid(unsafe_code)]

//! Command objects: encapsulated actions with enablement predicates.
//!
//! # Design
//!
//! Four shapes share one contract: a fallible body, an optional
//! `can_execute` predicate (absent means always enabled), and a
//! re-evaluate-enablement signal that producers raise and consumers
//! (typically UI bindings) subscribe to.
//!
//! - [`Command`]: synchronous, parameterless.
//! - [`ParamCommand<T>`]: synchronous, one typed argument.
//! - [`AsyncCommand`] / [`AsyncParamCommand<T>`]: the body yields a future
//!   that is spawned onto a single-threaded executor; `execute` never blocks
//!   the caller.
//!
//! Every command is a cheap cloneable handle; clones share identity
//! ([`same`](Command::same) compares by pointer). The object-safe
//! [`CommandBase`] trait lets heterogeneous commands live in one cache and
//! lets binding layers drive them without knowing the concrete shape.
//!
//! # Invariants
//!
//! 1. `can_execute()` with no predicate reports `true`.
//! 2. `raise_can_execute_changed()` fans out synchronously, in subscription
//!    order, with no batching or deduplication.
//! 3. `execute` runs the body unconditionally; checking enablement first is
//!    the binding layer's job.
//!
//! # Failure Modes
//!
//! - **Sync body fails**: the error is returned to the caller untouched.
//! - **Async body fails**: the failure surfaces when the pool is driven;
//!   with no templated handler wrapping the body it is logged and escalates
//!   as a task panic (the unhandled-error path).
//! - **Wrongly-typed or missing argument** through [`CommandBase::execute_any`]:
//!   contract violation, panics.

use std::any::Any;
use std::error::Error;
use std::rc::Rc;

use futures::executor::LocalSpawner;
use futures::future::{FutureExt, LocalBoxFuture};
use futures::task::LocalSpawnExt;

use crate::notify::{Notifier, Subscription};

/// Caller-supplied failure raised by a command body.
pub type CommandError = Box<dyn Error + 'static>;

/// Result of running a command body.
pub type CommandResult = Result<(), CommandError>;

/// Optional enablement predicate, the trailing argument of every
/// view-model command acquisition method.
pub type CanExecute = Option<Box<dyn Fn() -> bool>>;

/// The shape-independent command contract.
pub trait CommandBase {
    /// Current enablement; `true` when no predicate was supplied.
    fn can_execute(&self) -> bool;

    /// Synchronously notify all enablement subscribers, in subscription
    /// order.
    fn raise_can_execute_changed(&self);

    /// Subscribe to enablement re-evaluation requests.
    fn on_can_execute_changed(&self, callback: Box<dyn Fn()>) -> Subscription;

    /// Execute through the type-erased binding surface.
    ///
    /// Parameterless commands ignore `parameter`. Parameterized commands
    /// panic when it is absent or of the wrong type (contract violation).
    fn execute_any(&self, parameter: Option<Box<dyn Any>>) -> CommandResult;

    fn as_any(&self) -> &dyn Any;

    fn clone_box(&self) -> Box<dyn CommandBase>;
}

/// Enablement predicate plus re-evaluation signal, embedded in every shape.
struct EnablementCore {
    can_execute: CanExecute,
    changed: Notifier<()>,
}

impl EnablementCore {
    fn new(can_execute: CanExecute) -> Self {
        Self {
            can_execute,
            changed: Notifier::new(),
        }
    }

    fn can_execute(&self) -> bool {
        self.can_execute.as_ref().is_none_or(|predicate| predicate())
    }

    fn raise(&self) {
        self.changed.emit(&());
    }

    fn subscribe(&self, callback: Box<dyn Fn()>) -> Subscription {
        self.changed.subscribe(move |()| callback())
    }
}

macro_rules! impl_enablement {
    () => {
        fn can_execute(&self) -> bool {
            self.inner.core.can_execute()
        }

        fn raise_can_execute_changed(&self) {
            self.inner.core.raise();
        }

        fn on_can_execute_changed(&self, callback: Box<dyn Fn()>) -> Subscription {
            self.inner.core.subscribe(callback)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn clone_box(&self) -> Box<dyn CommandBase> {
            Box::new(self.clone())
        }
    };
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// Synchronous parameterless command.
pub struct Command {
    inner: Rc<CommandInner>,
}

struct CommandInner {
    body: Box<dyn Fn() -> CommandResult>,
    core: EnablementCore,
}

impl Clone for Command {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl Command {
    pub fn new(body: impl Fn() -> CommandResult + 'static) -> Self {
        Self::from_parts(Box::new(body), None)
    }

    pub fn with_can_execute(
        body: impl Fn() -> CommandResult + 'static,
        can_execute: impl Fn() -> bool + 'static,
    ) -> Self {
        Self::from_parts(Box::new(body), Some(Box::new(can_execute)))
    }

    pub(crate) fn from_parts(body: Box<dyn Fn() -> CommandResult>, can_execute: CanExecute) -> Self {
        Self {
            inner: Rc::new(CommandInner {
                body,
                core: EnablementCore::new(can_execute),
            }),
        }
    }

    /// Run the body and return its result.
    pub fn execute(&self) -> CommandResult {
        (self.inner.body)()
    }

    /// Whether two handles refer to the same command.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl CommandBase for Command {
    impl_enablement!();

    fn execute_any(&self, _parameter: Option<Box<dyn Any>>) -> CommandResult {
        self.execute()
    }
}

// ---------------------------------------------------------------------------
// ParamCommand
// ---------------------------------------------------------------------------

/// Synchronous command taking one typed argument.
pub struct ParamCommand<T> {
    inner: Rc<ParamCommandInner<T>>,
}

struct ParamCommandInner<T> {
    body: Box<dyn Fn(T) -> CommandResult>,
    core: EnablementCore,
}

impl<T> Clone for ParamCommand<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> ParamCommand<T> {
    pub fn new(body: impl Fn(T) -> CommandResult + 'static) -> Self {
        Self::from_parts(Box::new(body), None)
    }

    pub fn with_can_execute(
        body: impl Fn(T) -> CommandResult + 'static,
        can_execute: impl Fn() -> bool + 'static,
    ) -> Self {
        Self::from_parts(Box::new(body), Some(Box::new(can_execute)))
    }

    pub(crate) fn from_parts(
        body: Box<dyn Fn(T) -> CommandResult>,
        can_execute: CanExecute,
    ) -> Self {
        Self {
            inner: Rc::new(ParamCommandInner {
                body,
                core: EnablementCore::new(can_execute),
            }),
        }
    }

    /// Run the body with `parameter` and return its result.
    pub fn execute(&self, parameter: T) -> CommandResult {
        (self.inner.body)(parameter)
    }

    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: 'static> CommandBase for ParamCommand<T> {
    impl_enablement!();

    fn execute_any(&self, parameter: Option<Box<dyn Any>>) -> CommandResult {
        let Some(parameter) = parameter else {
            panic!(
                "parameterized command invoked without an argument (expected {})",
                std::any::type_name::<T>()
            );
        };
        match parameter.downcast::<T>() {
            Ok(parameter) => self.execute(*parameter),
            Err(_) => panic!(
                "parameterized command invoked with a wrongly-typed argument (expected {})",
                std::any::type_name::<T>()
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// AsyncCommand
// ---------------------------------------------------------------------------

type AsyncBody = Box<dyn Fn() -> LocalBoxFuture<'static, CommandResult>>;
type AsyncParamBody<T> = Box<dyn Fn(T) -> LocalBoxFuture<'static, CommandResult>>;

fn spawn_command_future(spawner: &LocalSpawner, future: LocalBoxFuture<'static, CommandResult>) {
    let task = async move {
        if let Err(error) = future.await {
            tracing::error!(%error, "async command failed with no handler in place");
            panic!("unhandled async command failure: {error}");
        }
    };
    if spawner.spawn_local(task).is_err() {
        tracing::warn!("async command executor is gone; dropping execution");
    }
}

/// Asynchronous parameterless command.
///
/// `execute` starts the body on the owning executor and returns immediately;
/// completion and failure are observed when the pool is driven.
pub struct AsyncCommand {
    inner: Rc<AsyncCommandInner>,
}

struct AsyncCommandInner {
    body: AsyncBody,
    spawner: LocalSpawner,
    core: EnablementCore,
}

impl Clone for AsyncCommand {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl AsyncCommand {
    pub fn new<F, Fut>(spawner: LocalSpawner, body: F) -> Self
    where
        F: Fn() -> Fut + 'static,
        Fut: Future<Output = CommandResult> + 'static,
    {
        Self::from_parts(spawner, Box::new(move || body().boxed_local()), None)
    }

    pub fn with_can_execute<F, Fut>(
        spawner: LocalSpawner,
        body: F,
        can_execute: impl Fn() -> bool + 'static,
    ) -> Self
    where
        F: Fn() -> Fut + 'static,
        Fut: Future<Output = CommandResult> + 'static,
    {
        Self::from_parts(
            spawner,
            Box::new(move || body().boxed_local()),
            Some(Box::new(can_execute)),
        )
    }

    pub(crate) fn from_parts(spawner: LocalSpawner, body: AsyncBody, can_execute: CanExecute) -> Self {
        Self {
            inner: Rc::new(AsyncCommandInner {
                body,
                spawner,
                core: EnablementCore::new(can_execute),
            }),
        }
    }

    /// Start the body; never blocks.
    pub fn execute(&self) {
        spawn_command_future(&self.inner.spawner, (self.inner.body)());
    }

    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl CommandBase for AsyncCommand {
    impl_enablement!();

    fn execute_any(&self, _parameter: Option<Box<dyn Any>>) -> CommandResult {
        self.execute();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// AsyncParamCommand
// ---------------------------------------------------------------------------

/// Asynchronous command taking one typed argument.
pub struct AsyncParamCommand<T> {
    inner: Rc<AsyncParamCommandInner<T>>,
}

struct AsyncParamCommandInner<T> {
    body: AsyncParamBody<T>,
    spawner: LocalSpawner,
    core: EnablementCore,
}

impl<T> Clone for AsyncParamCommand<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> AsyncParamCommand<T> {
    pub fn new<F, Fut>(spawner: LocalSpawner, body: F) -> Self
    where
        F: Fn(T) -> Fut + 'static,
        Fut: Future<Output = CommandResult> + 'static,
    {
        Self::from_parts(
            spawner,
            Box::new(move |parameter| body(parameter).boxed_local()),
            None,
        )
    }

    pub fn with_can_execute<F, Fut>(
        spawner: LocalSpawner,
        body: F,
        can_execute: impl Fn() -> bool + 'static,
    ) -> Self
    where
        F: Fn(T) -> Fut + 'static,
        Fut: Future<Output = CommandResult> + 'static,
    {
        Self::from_parts(
            spawner,
            Box::new(move |parameter| body(parameter).boxed_local()),
            Some(Box::new(can_execute)),
        )
    }

    pub(crate) fn from_parts(
        spawner: LocalSpawner,
        body: AsyncParamBody<T>,
        can_execute: CanExecute,
    ) -> Self {
        Self {
            inner: Rc::new(AsyncParamCommandInner {
                body,
                spawner,
                core: EnablementCore::new(can_execute),
            }),
        }
    }

    /// Start the body with `parameter`; never blocks.
    pub fn execute(&self, parameter: T) {
        spawn_command_future(&self.inner.spawner, (self.inner.body)(parameter));
    }

    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: 'static> CommandBase for AsyncParamCommand<T> {
    impl_enablement!();

    fn execute_any(&self, parameter: Option<Box<dyn Any>>) -> CommandResult {
        let Some(parameter) = parameter else {
            panic!(
                "parameterized command invoked without an argument (expected {})",
                std::any::type_name::<T>()
            );
        };
        match parameter.downcast::<T>() {
            Ok(parameter) => {
                self.execute(*parameter);
                Ok(())
            }
            Err(_) => panic!(
                "parameterized command invoked with a wrongly-typed argument (expected {})",
                std::any::type_name::<T>()
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::LocalPool;
    use std::cell::{Cell, RefCell};

    #[test]
    fn can_execute_defaults_to_true() {
        let command = Command::new(|| Ok(()));
        assert!(command.can_execute());
    }

    #[test]
    fn can_execute_tracks_predicate() {
        let enabled = Rc::new(Cell::new(false));
        let enabled_clone = Rc::clone(&enabled);
        let command = Command::with_can_execute(|| Ok(()), move || enabled_clone.get());

        assert!(!command.can_execute());
        enabled.set(true);
        assert!(command.can_execute());
    }

    #[test]
    fn raise_fans_out_in_subscription_order() {
        let command = Command::new(|| Ok(()));
        let order = Rc::new(RefCell::new(Vec::new()));

        let order_a = Rc::clone(&order);
        let _a = command.on_can_execute_changed(Box::new(move || order_a.borrow_mut().push('a')));
        let order_b = Rc::clone(&order);
        let _b = command.on_can_execute_changed(Box::new(move || order_b.borrow_mut().push('b')));

        command.raise_can_execute_changed();
        command.raise_can_execute_changed();
        assert_eq!(*order.borrow(), vec!['a', 'b', 'a', 'b']);
    }

    #[test]
    fn execute_returns_body_result() {
        let runs = Rc::new(Cell::new(0u32));
        let runs_clone = Rc::clone(&runs);
        let command = Command::new(move || {
            runs_clone.set(runs_clone.get() + 1);
            Ok(())
        });

        assert!(command.execute().is_ok());
        assert_eq!(runs.get(), 1);

        let failing = Command::new(|| Err("nope".into()));
        assert_eq!(failing.execute().unwrap_err().to_string(), "nope");
    }

    #[test]
    fn execute_ignores_disabled_predicate() {
        // Enablement is the binding layer's concern; execute always runs.
        let runs = Rc::new(Cell::new(0u32));
        let runs_clone = Rc::clone(&runs);
        let command = Command::with_can_execute(
            move || {
                runs_clone.set(runs_clone.get() + 1);
                Ok(())
            },
            || false,
        );

        assert!(!command.can_execute());
        assert!(command.execute().is_ok());
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn clones_share_identity() {
        let a = Command::new(|| Ok(()));
        let b = a.clone();
        assert!(a.same(&b));
        assert!(!a.same(&Command::new(|| Ok(()))));
    }

    #[test]
    fn param_command_passes_argument() {
        let seen = Rc::new(RefCell::new(String::new()));
        let seen_clone = Rc::clone(&seen);
        let command = ParamCommand::new(move |value: String| {
            *seen_clone.borrow_mut() = value;
            Ok(())
        });

        assert!(command.execute("hello".to_string()).is_ok());
        assert_eq!(*seen.borrow(), "hello");
    }

    #[test]
    fn execute_any_routes_to_typed_body() {
        let seen = Rc::new(Cell::new(0i32));
        let seen_clone = Rc::clone(&seen);
        let command = ParamCommand::new(move |value: i32| {
            seen_clone.set(value);
            Ok(())
        });

        let erased: &dyn CommandBase = &command;
        assert!(erased.execute_any(Some(Box::new(41i32))).is_ok());
        assert_eq!(seen.get(), 41);
    }

    #[test]
    #[should_panic(expected = "wrongly-typed argument")]
    fn execute_any_with_wrong_type_panics() {
        let command = ParamCommand::new(|_: i32| Ok(()));
        let _ = command.execute_any(Some(Box::new("oops")));
    }

    #[test]
    #[should_panic(expected = "without an argument")]
    fn execute_any_with_missing_argument_panics() {
        let command = ParamCommand::new(|_: i32| Ok(()));
        let _ = command.execute_any(None);
    }

    #[test]
    fn async_execute_returns_before_body_runs() {
        let mut pool = LocalPool::new();
        let ran = Rc::new(Cell::new(false));
        let ran_clone = Rc::clone(&ran);

        let command = AsyncCommand::new(pool.spawner(), move || {
            let ran_inner = Rc::clone(&ran_clone);
            async move {
                ran_inner.set(true);
                Ok(())
            }
        });

        command.execute();
        assert!(!ran.get());

        pool.run_until_stalled();
        assert!(ran.get());
    }

    #[test]
    fn async_param_command_receives_owned_argument() {
        let mut pool = LocalPool::new();
        let seen = Rc::new(RefCell::new(String::new()));
        let seen_clone = Rc::clone(&seen);

        let command = AsyncParamCommand::new(pool.spawner(), move |value: String| {
            let seen_inner = Rc::clone(&seen_clone);
            async move {
                *seen_inner.borrow_mut() = value;
                Ok(())
            }
        });

        command.execute("later".to_string());
        pool.run_until_stalled();
        assert_eq!(*seen.borrow(), "later");
    }

    #[test]
    fn downcast_through_command_base() {
        let command = Command::new(|| Ok(()));
        let boxed: Box<dyn CommandBase> = command.clone_box();
        let restored = boxed
            .as_any()
            .downcast_ref::<Command>()
            .expect("same concrete type");
        assert!(restored.same(&command));
    }
}
