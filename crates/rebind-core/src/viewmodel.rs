#![forbid(unsafe_code)]

//! View-model base: command caching, busy state, and async initialization
//! layered over [`ReactiveObject`].
//!
//! # Design
//!
//! [`ViewModel`] owns a name-keyed cache of command handles so that repeated
//! access through a computed property returns the same command identity —
//! observers hold references to it, so the same logical command is never
//! reconstructed while the view model lives. The first access for a key
//! wins: later calls return the cached handle and ignore any different
//! body/predicate supplied. This is a documented contract, not a bug; it
//! prevents UI re-binding from creating duplicate commands, and it means the
//! closure from the first access is what runs for the lifetime of the
//! object.
//!
//! "Templated" acquisition wraps the body in the busy/exception template:
//! set `is_busy`, run (or await) the body, deliver failures to the
//! exception handler if one is set (otherwise propagate), and clear
//! `is_busy` in a drop guard regardless of outcome. Busy state is global
//! per view model: toggling it fans enablement re-evaluation out to *every*
//! cached command, a deliberate broadcast rather than a minimal affected
//! set. Non-templated acquisition runs the raw body with no busy tracking
//! and no containment; callers choose per command.
//!
//! Asynchronous work (async command bodies, the initialization hook) runs on
//! a view-model-owned single-threaded pool driven by
//! [`run_until_stalled`](ViewModel::run_until_stalled). Initialization moves
//! `Constructed → Initializing → Initialized`; the hook is spawned at
//! construction but only runs once the owner drives the pool, so it always
//! executes strictly after full construction.
//!
//! # Invariants
//!
//! 1. One command instance per cache key for the life of the view model.
//! 2. `is_busy`/`is_initialized` writes are equality-suppressed and never
//!    dirty-mark the object.
//! 3. `is_initialized` transitions false→true exactly once; repeated
//!    initialization starts are ignored (and logged).
//! 4. Templated escalation happens only after `is_busy` is restored.
//!
//! # Failure Modes
//!
//! - **Templated body fails, handler set**: handler receives the error
//!   (busy still true at that point), the failure is swallowed.
//! - **Templated body fails, no handler**: sync bodies return the error to
//!   the caller; async bodies escalate as a task panic when the pool runs.
//! - **View model dropped while a command handle lives on**: the wrapped
//!   body becomes a no-op (the template captures the view model weakly).
//!
//! The command cache and pool are owned by a single logical thread; calling
//! [`run_until_stalled`](ViewModel::run_until_stalled) from inside a command
//! body is not supported.

use std::any::Any;
use std::cell::RefCell;
use std::error::Error;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use futures::executor::{LocalPool, LocalSpawner};
use futures::future::{FutureExt, LocalBoxFuture};
use futures::task::LocalSpawnExt;

use crate::command::{
    AsyncCommand, AsyncParamCommand, CanExecute, Command, CommandBase, CommandResult, ParamCommand,
};
use crate::notify::{Notifier, Subscription};
use crate::object::ReactiveObject;

/// Change-notification name for the busy flag.
pub const IS_BUSY: &str = "is_busy";

/// Change-notification name for the initialized flag.
pub const IS_INITIALIZED: &str = "is_initialized";

struct VmState {
    commands: AHashMap<String, Box<dyn CommandBase>>,
    exception_handler: Option<Rc<dyn Fn(&dyn Error)>>,
    is_busy: bool,
    is_initialized: bool,
    init_started: bool,
}

impl VmState {
    fn new() -> Self {
        Self {
            commands: AHashMap::new(),
            exception_handler: None,
            is_busy: false,
            is_initialized: false,
            init_started: false,
        }
    }
}

/// View-model base object. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ViewModel {
    object: ReactiveObject,
    state: Rc<RefCell<VmState>>,
    pool: Rc<RefCell<LocalPool>>,
    spawner: LocalSpawner,
    initialized: Notifier<()>,
}

/// Weak handle for capturing a view model inside its own command bodies
/// without creating a reference cycle through the command cache.
pub struct WeakViewModel {
    object: ReactiveObject,
    state: Weak<RefCell<VmState>>,
    pool: Weak<RefCell<LocalPool>>,
    spawner: LocalSpawner,
    initialized: Notifier<()>,
}

impl Clone for WeakViewModel {
    fn clone(&self) -> Self {
        Self {
            object: self.object.clone(),
            state: Weak::clone(&self.state),
            pool: Weak::clone(&self.pool),
            spawner: self.spawner.clone(),
            initialized: self.initialized.clone(),
        }
    }
}

impl WeakViewModel {
    /// Recover a strong handle; `None` once the view model is gone.
    #[must_use]
    pub fn upgrade(&self) -> Option<ViewModel> {
        Some(ViewModel {
            object: self.object.clone(),
            state: self.state.upgrade()?,
            pool: self.pool.upgrade()?,
            spawner: self.spawner.clone(),
            initialized: self.initialized.clone(),
        })
    }
}

impl Default for ViewModel {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ViewModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ViewModel")
            .field("is_busy", &state.is_busy)
            .field("is_initialized", &state.is_initialized)
            .field("commands", &state.commands.len())
            .finish()
    }
}

impl ViewModel {
    /// Construct and immediately start the (no-op) initialization hook.
    ///
    /// The hook completes the next time the pool is driven; `is_initialized`
    /// is still false when this returns.
    #[must_use]
    pub fn new() -> Self {
        let vm = Self::deferred();
        vm.start_initialization();
        vm
    }

    /// Construct without starting initialization; the caller starts it
    /// manually via [`start_initialization`](Self::start_initialization) or
    /// [`start_initialization_with`](Self::start_initialization_with).
    #[must_use]
    pub fn deferred() -> Self {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        Self {
            object: ReactiveObject::new(),
            state: Rc::new(RefCell::new(VmState::new())),
            pool: Rc::new(RefCell::new(pool)),
            spawner,
            initialized: Notifier::new(),
        }
    }

    /// Construct and start a caller-supplied initialization hook, which
    /// receives a clone of the view model.
    ///
    /// The hook runs only when the pool is driven, strictly after this
    /// function returns.
    pub fn new_with<F, Fut>(init: F) -> Self
    where
        F: FnOnce(ViewModel) -> Fut,
        Fut: Future<Output = ()> + 'static,
    {
        let vm = Self::deferred();
        let hook = init(vm.clone());
        vm.start_initialization_with(hook);
        vm
    }

    /// The underlying property-bag object.
    #[must_use]
    pub fn object(&self) -> &ReactiveObject {
        &self.object
    }

    /// Weak handle for use inside command bodies.
    #[must_use]
    pub fn downgrade(&self) -> WeakViewModel {
        WeakViewModel {
            object: self.object.clone(),
            state: Rc::downgrade(&self.state),
            pool: Rc::downgrade(&self.pool),
            spawner: self.spawner.clone(),
            initialized: self.initialized.clone(),
        }
    }

    // -- property delegation -------------------------------------------------

    /// See [`ReactiveObject::on_change`].
    #[must_use]
    pub fn on_change(&self, callback: impl Fn(&str) + 'static) -> Subscription {
        self.object.on_change(callback)
    }

    /// See [`ReactiveObject::get`].
    pub fn get<T: Clone + 'static>(&self, name: &str, default: T) -> T {
        self.object.get(name, default)
    }

    /// See [`ReactiveObject::get_validated`].
    pub fn get_validated<T: Clone + 'static>(
        &self,
        name: &str,
        default: T,
        validator: impl Fn(&T) -> bool + 'static,
    ) -> T {
        self.object.get_validated(name, default, validator)
    }

    /// See [`ReactiveObject::set`].
    pub fn set<T: PartialEq + 'static>(&self, name: &str, value: T) -> bool {
        self.object.set(name, value)
    }

    /// See [`ReactiveObject::set_with`].
    pub fn set_with<T: 'static>(
        &self,
        name: &str,
        value: T,
        eq: impl FnOnce(&T, &T) -> bool,
    ) -> bool {
        self.object.set_with(name, value, eq)
    }

    /// Write a property and, when the value actually changed, raise
    /// enablement re-evaluation on the supplied commands.
    pub fn set_notifying<T: PartialEq + 'static>(
        &self,
        name: &str,
        value: T,
        commands: &[&dyn CommandBase],
    ) -> bool {
        let changed = self.object.set(name, value);
        if changed {
            for command in commands {
                command.raise_can_execute_changed();
            }
        }
        changed
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.object.is_valid()
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.object.is_dirty()
    }

    pub fn reset_changes(&self) {
        self.object.reset_changes();
    }

    // -- busy / initialized flags --------------------------------------------

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.state.borrow().is_busy
    }

    /// Toggle the busy flag. Equality-suppressed; a change notifies
    /// [`IS_BUSY`] and fans re-evaluation out to every cached command.
    pub fn set_busy(&self, value: bool) {
        set_busy_flag(&self.state, &self.object, value);
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state.borrow().is_initialized
    }

    /// Install the exception handler receiving templated command failures.
    pub fn set_exception_handler(&self, handler: impl Fn(&dyn Error) + 'static) {
        self.state.borrow_mut().exception_handler = Some(Rc::new(handler));
    }

    /// Remove the exception handler; templated failures propagate again.
    pub fn clear_exception_handler(&self) {
        self.state.borrow_mut().exception_handler = None;
    }

    // -- initialization ------------------------------------------------------

    /// Start initialization with the default no-op hook.
    pub fn start_initialization(&self) {
        self.start_initialization_with(std::future::ready(()));
    }

    /// Start initialization with a caller-supplied hook. On completion the
    /// view model notifies [`IS_INITIALIZED`], fans re-evaluation out to all
    /// cached commands, and fires the
    /// [`on_initialized`](Self::on_initialized) observers.
    ///
    /// Repeated starts are not supported and are ignored with a warning.
    pub fn start_initialization_with<F: Future<Output = ()> + 'static>(&self, hook: F) {
        {
            let mut state = self.state.borrow_mut();
            if state.init_started {
                tracing::warn!("initialization already started; ignoring repeated start");
                return;
            }
            state.init_started = true;
        }

        let state = Rc::downgrade(&self.state);
        let object = self.object.clone();
        let initialized = self.initialized.clone();
        let task = async move {
            hook.await;
            finish_initialization(&state, &object, &initialized);
        };
        if self.spawner.spawn_local(task).is_err() {
            tracing::warn!("executor unavailable; initialization will not run");
        }
    }

    /// Observe initialization completion.
    #[must_use]
    pub fn on_initialized(&self, callback: impl Fn() + 'static) -> Subscription {
        self.initialized.subscribe(move |()| callback())
    }

    /// Drive spawned work (the initialization hook, async command bodies)
    /// until no task can make further progress.
    ///
    /// Must be called from the owner thread, outside any command body.
    pub fn run_until_stalled(&self) {
        self.pool.borrow_mut().run_until_stalled();
    }

    /// Spawner for the view model's pool, for callers that schedule related
    /// work of their own.
    #[must_use]
    pub fn spawner(&self) -> LocalSpawner {
        self.spawner.clone()
    }

    // -- command cache -------------------------------------------------------

    /// Raise enablement re-evaluation on every cached command.
    pub fn notify_all_commands(&self) {
        notify_commands(&self.state);
    }

    /// Number of commands currently cached.
    #[must_use]
    pub fn command_count(&self) -> usize {
        self.state.borrow().commands.len()
    }

    /// Fetch the command cached under `key`, constructing it on first
    /// access. Later calls ignore `build` entirely.
    ///
    /// Panics if `key` is already cached as a different command type.
    fn cached_command<C: CommandBase + Clone + 'static>(
        &self,
        key: &str,
        build: impl FnOnce() -> C,
    ) -> C {
        if let Some(existing) = self.state.borrow().commands.get(key) {
            return existing
                .as_any()
                .downcast_ref::<C>()
                .unwrap_or_else(|| {
                    panic!("command '{key}' was already created as a different command type")
                })
                .clone();
        }
        let command = build();
        self.state
            .borrow_mut()
            .commands
            .insert(key.to_string(), command.clone_box());
        command
    }

    /// Cached parameterless command; the raw body runs with no busy
    /// tracking and no exception containment.
    pub fn command(
        &self,
        key: &str,
        body: impl Fn() -> CommandResult + 'static,
        can_execute: CanExecute,
    ) -> Command {
        self.cached_command(key, || Command::from_parts(Box::new(body), can_execute))
    }

    /// Cached parameterless command with templated execution.
    pub fn templated_command(
        &self,
        key: &str,
        body: impl Fn() -> CommandResult + 'static,
        can_execute: CanExecute,
    ) -> Command {
        let state = Rc::downgrade(&self.state);
        let object = self.object.clone();
        self.cached_command(key, move || {
            Command::from_parts(
                Box::new(move || run_templated(&state, &object, || body())),
                can_execute,
            )
        })
    }

    /// Cached parameterized command; raw body semantics.
    pub fn param_command<T: 'static>(
        &self,
        key: &str,
        body: impl Fn(T) -> CommandResult + 'static,
        can_execute: CanExecute,
    ) -> ParamCommand<T> {
        self.cached_command(key, || ParamCommand::from_parts(Box::new(body), can_execute))
    }

    /// Cached parameterized command with templated execution.
    pub fn templated_param_command<T: 'static>(
        &self,
        key: &str,
        body: impl Fn(T) -> CommandResult + 'static,
        can_execute: CanExecute,
    ) -> ParamCommand<T> {
        let state = Rc::downgrade(&self.state);
        let object = self.object.clone();
        self.cached_command(key, move || {
            ParamCommand::from_parts(
                Box::new(move |parameter: T| run_templated(&state, &object, || body(parameter))),
                can_execute,
            )
        })
    }

    /// Cached async command; raw body semantics (failures escalate as task
    /// panics when the pool runs).
    pub fn async_command<F, Fut>(&self, key: &str, body: F, can_execute: CanExecute) -> AsyncCommand
    where
        F: Fn() -> Fut + 'static,
        Fut: Future<Output = CommandResult> + 'static,
    {
        let spawner = self.spawner.clone();
        self.cached_command(key, move || {
            AsyncCommand::from_parts(spawner, Box::new(move || body().boxed_local()), can_execute)
        })
    }

    /// Cached async command with templated execution: busy is held across
    /// the body's suspension points, failures go to the exception handler.
    pub fn templated_async_command<F, Fut>(
        &self,
        key: &str,
        body: F,
        can_execute: CanExecute,
    ) -> AsyncCommand
    where
        F: Fn() -> Fut + 'static,
        Fut: Future<Output = CommandResult> + 'static,
    {
        let spawner = self.spawner.clone();
        let state = Rc::downgrade(&self.state);
        let object = self.object.clone();
        self.cached_command(key, move || {
            AsyncCommand::from_parts(
                spawner,
                Box::new(move || {
                    run_templated_async(state.clone(), object.clone(), body().boxed_local())
                        .boxed_local()
                }),
                can_execute,
            )
        })
    }

    /// Cached async parameterized command; raw body semantics.
    pub fn async_param_command<T, F, Fut>(
        &self,
        key: &str,
        body: F,
        can_execute: CanExecute,
    ) -> AsyncParamCommand<T>
    where
        T: 'static,
        F: Fn(T) -> Fut + 'static,
        Fut: Future<Output = CommandResult> + 'static,
    {
        let spawner = self.spawner.clone();
        self.cached_command(key, move || {
            AsyncParamCommand::from_parts(
                spawner,
                Box::new(move |parameter| body(parameter).boxed_local()),
                can_execute,
            )
        })
    }

    /// Cached async parameterized command with templated execution.
    pub fn templated_async_param_command<T, F, Fut>(
        &self,
        key: &str,
        body: F,
        can_execute: CanExecute,
    ) -> AsyncParamCommand<T>
    where
        T: 'static,
        F: Fn(T) -> Fut + 'static,
        Fut: Future<Output = CommandResult> + 'static,
    {
        let spawner = self.spawner.clone();
        let state = Rc::downgrade(&self.state);
        let object = self.object.clone();
        self.cached_command(key, move || {
            AsyncParamCommand::from_parts(
                spawner,
                Box::new(move |parameter| {
                    run_templated_async(state.clone(), object.clone(), body(parameter).boxed_local())
                        .boxed_local()
                }),
                can_execute,
            )
        })
    }
}

// ---------------------------------------------------------------------------
// Template helpers
// ---------------------------------------------------------------------------

fn notify_commands(state: &Rc<RefCell<VmState>>) {
    let snapshot: Vec<Box<dyn CommandBase>> = state
        .borrow()
        .commands
        .values()
        .map(|command| command.clone_box())
        .collect();
    for command in snapshot {
        command.raise_can_execute_changed();
    }
}

fn set_busy_flag(state: &Rc<RefCell<VmState>>, object: &ReactiveObject, value: bool) {
    {
        let mut state_ref = state.borrow_mut();
        if state_ref.is_busy == value {
            return;
        }
        state_ref.is_busy = value;
    }
    object.notify(IS_BUSY);
    notify_commands(state);
}

fn finish_initialization(
    state: &Weak<RefCell<VmState>>,
    object: &ReactiveObject,
    initialized: &Notifier<()>,
) {
    let Some(state) = state.upgrade() else {
        return;
    };
    {
        let mut state_ref = state.borrow_mut();
        if state_ref.is_initialized {
            return;
        }
        state_ref.is_initialized = true;
    }
    object.notify(IS_INITIALIZED);
    notify_commands(&state);
    initialized.emit(&());
}

/// Clears the busy flag when dropped, whatever the body's outcome.
struct BusyGuard {
    state: Rc<RefCell<VmState>>,
    object: ReactiveObject,
}

impl BusyGuard {
    fn engage(state: &Weak<RefCell<VmState>>, object: &ReactiveObject) -> Option<Self> {
        let state = state.upgrade()?;
        set_busy_flag(&state, object, true);
        Some(Self {
            state,
            object: object.clone(),
        })
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        set_busy_flag(&self.state, &self.object, false);
    }
}

fn deliver_or_propagate(state: &Rc<RefCell<VmState>>, result: CommandResult) -> CommandResult {
    match result {
        Ok(()) => Ok(()),
        Err(error) => {
            let handler = state.borrow().exception_handler.clone();
            match handler {
                Some(handler) => {
                    handler(error.as_ref());
                    Ok(())
                }
                None => Err(error),
            }
        }
    }
}

fn run_templated(
    state: &Weak<RefCell<VmState>>,
    object: &ReactiveObject,
    body: impl FnOnce() -> CommandResult,
) -> CommandResult {
    let Some(guard) = BusyGuard::engage(state, object) else {
        return Ok(());
    };
    let result = body();
    deliver_or_propagate(&guard.state, result)
    // The guard drops here: busy is restored before the result reaches the
    // caller, and even if the body panics.
}

async fn run_templated_async(
    state: Weak<RefCell<VmState>>,
    object: ReactiveObject,
    body: LocalBoxFuture<'static, CommandResult>,
) -> CommandResult {
    let Some(guard) = BusyGuard::engage(&state, &object) else {
        return Ok(());
    };
    let result = body.await;
    deliver_or_propagate(&guard.state, result)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
