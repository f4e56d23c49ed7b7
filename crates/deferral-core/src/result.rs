#![forbid(unsafe_code)]

//! Single-settlement eventual values.
//!
//! # Design
//!
//! An [`AsyncResult`] owns three registries over shared `Rc` state:
//!
//! | channel  | flags         | fired by            |
//! |----------|---------------|---------------------|
//! | done     | `once memory` | `resolve*`          |
//! | fail     | `once memory` | `reject*`           |
//! | progress | `memory`      | `notify*`           |
//!
//! Each settlement registry starts with one built-in listener that records
//! the new [`State`], disables the opposite registry, then locks and empties
//! the progress registry. Those listeners hold a `Weak` back-reference, so dropping every
//! handle frees the state even while listeners are still registered.
//!
//! A [`ResultView`] is the observer half: it shares the same state but cannot
//! settle it. `AsyncResult` dereferences to its view, so every observer
//! method is available on the owner too.
//!
//! # Invariants
//!
//! 1. The state moves `Pending -> Fulfilled` or `Pending -> Rejected` at most
//!    once and never changes again.
//! 2. Done listeners run only after fulfillment, fail listeners only after
//!    rejection, each exactly once, with the settlement's context and args.
//! 3. Listeners added after settlement on the matching channel run
//!    immediately with the recorded settlement.
//! 4. Progress listeners never run once the result is settled.
//! 5. All views of one result observe the same state.
//!
//! # Failure Modes
//!
//! - **Listener panics**: propagate out of the settling call. The state has
//!   already been recorded by the built-in listener, which always runs first.

use std::cell::Cell;
use std::fmt;
use std::ops::Deref;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use deferral_callbacks::{Callback, Callbacks, Listeners, RegistryFlags};
use serde_json::Value;

use crate::args::{Args, Payload};

/// Registry type behind every result channel.
pub type Channel<V> = Callbacks<ResultId, Args<V>>;

/// Listener type accepted by result channels.
pub type Listener<V> = Callback<ResultId, Args<V>>;

/// Listener list accepted by the `add_*` methods.
pub type ListenerList<V> = Listeners<ResultId, Args<V>>;

static NEXT_RESULT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one [`AsyncResult`].
///
/// Used as the default call context: listeners receive the id of the result
/// that settled unless an explicit context was supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResultId(u64);

impl ResultId {
    fn next() -> Self {
        Self(NEXT_RESULT_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Settlement state of a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum State {
    #[default]
    Pending,
    Fulfilled,
    Rejected,
}

impl State {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fulfilled => "resolved",
            Self::Rejected => "rejected",
        }
    }

    #[must_use]
    pub const fn is_settled(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy)]
enum Kind {
    Done,
    Fail,
    Progress,
}

impl Kind {
    const fn name(self) -> &'static str {
        match self {
            Self::Done => "resolve",
            Self::Fail => "reject",
            Self::Progress => "notify",
        }
    }
}

pub(crate) struct Shared<V> {
    id: ResultId,
    state: Cell<State>,
    done: Channel<V>,
    fail: Channel<V>,
    progress: Channel<V>,
}

impl<V: Payload> Shared<V> {
    fn channel(&self, kind: Kind) -> &Channel<V> {
        match kind {
            Kind::Done => &self.done,
            Kind::Fail => &self.fail,
            Kind::Progress => &self.progress,
        }
    }

    fn settle(&self, state: State) {
        self.state.set(state);
        tracing::debug!(message = "result.settle", id = %self.id, state = %state);
        match state {
            State::Fulfilled => {
                self.fail.disable();
            }
            State::Rejected => {
                self.done.disable();
            }
            State::Pending => return,
        }
        // Ends an in-flight progress pass too.
        self.progress.lock().empty();
    }

    fn fire(&self, kind: Kind, context: ResultId, args: Args<V>) {
        let state = self.state.get();
        if state.is_settled() {
            tracing::trace!(
                message = "result.ignored",
                id = %self.id,
                op = kind.name(),
                state = %state
            );
            return;
        }
        self.channel(kind).fire_with(context, args);
    }
}

fn settle_listener<V: Payload>(shared: &Rc<Shared<V>>, state: State) -> Listener<V> {
    let weak: Weak<Shared<V>> = Rc::downgrade(shared);
    Callback::new(move |_: &Args<V>| {
        if let Some(shared) = weak.upgrade() {
            shared.settle(state);
        }
    })
}

/// Read-only observer of an [`AsyncResult`].
///
/// Views are cheap to clone; clones and every view handed out by the same
/// result compare equal.
pub struct ResultView<V = Value> {
    pub(crate) shared: Rc<Shared<V>>,
}

impl<V> Clone for ResultView<V> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<V> PartialEq for ResultView<V> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }
}

impl<V> Eq for ResultView<V> {}

impl<V> fmt::Debug for ResultView<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultView")
            .field("id", &self.shared.id)
            .field("state", &self.shared.state.get())
            .finish()
    }
}

impl<V: Payload> ResultView<V> {
    #[must_use]
    pub fn id(&self) -> ResultId {
        self.shared.id
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.shared.state.get()
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.state() == State::Pending
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.state() == State::Fulfilled
    }

    #[must_use]
    pub fn is_rejected(&self) -> bool {
        self.state() == State::Rejected
    }

    /// Run `f` on fulfillment, or immediately if already fulfilled.
    pub fn done(&self, f: impl Fn(&Args<V>) + 'static) -> &Self {
        self.add_done(Listener::<V>::new(f))
    }

    /// Run `f` on rejection, or immediately if already rejected.
    pub fn fail(&self, f: impl Fn(&Args<V>) + 'static) -> &Self {
        self.add_fail(Listener::<V>::new(f))
    }

    /// Run `f` on every notification while pending.
    ///
    /// Ignored once the result is settled.
    pub fn progress(&self, f: impl Fn(&Args<V>) + 'static) -> &Self {
        self.add_progress(Listener::<V>::new(f))
    }

    /// Run `f` on either settlement.
    pub fn always(&self, f: impl Fn(&Args<V>) + 'static) -> &Self {
        let listener = Listener::<V>::new(f);
        self.add_done(listener.clone());
        self.add_fail(listener)
    }

    pub fn add_done(&self, listeners: impl Into<ListenerList<V>>) -> &Self {
        self.shared.done.add(listeners);
        self
    }

    pub fn add_fail(&self, listeners: impl Into<ListenerList<V>>) -> &Self {
        self.shared.fail.add(listeners);
        self
    }

    pub fn add_progress(&self, listeners: impl Into<ListenerList<V>>) -> &Self {
        let state = self.state();
        if state.is_settled() {
            tracing::trace!(
                message = "result.ignored",
                id = %self.shared.id,
                op = "progress",
                state = %state
            );
            return self;
        }
        self.shared.progress.add(listeners);
        self
    }

    /// Register listeners on all three channels at once.
    ///
    /// Unlike [`pipe`](Self::pipe) this derives nothing; pass
    /// [`Listeners::none`] to skip a channel.
    pub fn subscribe(
        &self,
        done: impl Into<ListenerList<V>>,
        fail: impl Into<ListenerList<V>>,
        progress: impl Into<ListenerList<V>>,
    ) -> &Self {
        self.add_done(done);
        self.add_fail(fail);
        self.add_progress(progress)
    }

    /// Another view of the same result.
    #[must_use]
    pub fn promise(&self) -> ResultView<V> {
        self.clone()
    }

    /// Install a view of this result onto `target` and hand the target back.
    pub fn promise_onto<'t, T>(&self, target: &'t mut T) -> &'t mut T
    where
        T: PromiseTarget<V> + ?Sized,
    {
        target.install_view(self.promise());
        target
    }
}

/// The owner half of an eventual value.
///
/// ```
/// use deferral_core::{AsyncResult, State};
/// use serde_json::json;
///
/// let result: AsyncResult = AsyncResult::new();
/// result.resolve(json!("ok"));
/// result.reject(json!("too late"));
/// assert_eq!(result.state(), State::Fulfilled);
/// ```
pub struct AsyncResult<V = Value> {
    view: ResultView<V>,
}

impl<V> Clone for AsyncResult<V> {
    fn clone(&self) -> Self {
        Self {
            view: self.view.clone(),
        }
    }
}

impl<V> PartialEq for AsyncResult<V> {
    fn eq(&self, other: &Self) -> bool {
        self.view == other.view
    }
}

impl<V> Eq for AsyncResult<V> {}

impl<V> fmt::Debug for AsyncResult<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncResult")
            .field("id", &self.view.shared.id)
            .field("state", &self.view.shared.state.get())
            .finish()
    }
}

impl<V> Deref for AsyncResult<V> {
    type Target = ResultView<V>;

    fn deref(&self) -> &ResultView<V> {
        &self.view
    }
}

impl<V: Payload> Default for AsyncResult<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Payload> AsyncResult<V> {
    /// A fresh pending result.
    #[must_use]
    pub fn new() -> Self {
        let shared = Rc::new(Shared {
            id: ResultId::next(),
            state: Cell::new(State::Pending),
            done: Channel::new(RegistryFlags::SETTLEMENT),
            fail: Channel::new(RegistryFlags::SETTLEMENT),
            progress: Channel::new(RegistryFlags::PROGRESS),
        });
        shared.done.add(settle_listener(&shared, State::Fulfilled));
        shared.fail.add(settle_listener(&shared, State::Rejected));
        Self {
            view: ResultView { shared },
        }
    }

    /// A fresh result handed to `init` before being returned.
    pub fn with_init(init: impl FnOnce(&Self)) -> Self {
        let result = Self::new();
        init(&result);
        result
    }

    /// Like [`with_init`](Self::with_init), propagating the initializer's
    /// error.
    pub fn try_with_init<E>(init: impl FnOnce(&Self) -> Result<(), E>) -> Result<Self, E> {
        let result = Self::new();
        init(&result)?;
        Ok(result)
    }

    /// The observer half.
    #[must_use]
    pub fn view(&self) -> &ResultView<V> {
        &self.view
    }

    pub fn resolve(&self, value: V) -> &Self {
        self.resolve_args(Args::one(value))
    }

    pub fn resolve_args(&self, args: Args<V>) -> &Self {
        self.resolve_with(self.id(), args)
    }

    pub fn resolve_with(&self, context: ResultId, args: Args<V>) -> &Self {
        self.view.shared.fire(Kind::Done, context, args);
        self
    }

    pub fn reject(&self, value: V) -> &Self {
        self.reject_args(Args::one(value))
    }

    pub fn reject_args(&self, args: Args<V>) -> &Self {
        self.reject_with(self.id(), args)
    }

    pub fn reject_with(&self, context: ResultId, args: Args<V>) -> &Self {
        self.view.shared.fire(Kind::Fail, context, args);
        self
    }

    pub fn notify(&self, value: V) -> &Self {
        self.notify_args(Args::one(value))
    }

    pub fn notify_args(&self, args: Args<V>) -> &Self {
        self.notify_with(self.id(), args)
    }

    pub fn notify_with(&self, context: ResultId, args: Args<V>) -> &Self {
        self.view.shared.fire(Kind::Progress, context, args);
        self
    }
}

/// Anything that can hand out a [`ResultView`].
pub trait Settleable<V> {
    fn promise(&self) -> ResultView<V>;
}

impl<V: Payload> Settleable<V> for ResultView<V> {
    fn promise(&self) -> ResultView<V> {
        self.clone()
    }
}

impl<V: Payload> Settleable<V> for AsyncResult<V> {
    fn promise(&self) -> ResultView<V> {
        self.view.clone()
    }
}

/// A value that can carry an installed [`ResultView`].
pub trait PromiseTarget<V> {
    fn install_view(&mut self, view: ResultView<V>);
}

impl<V> PromiseTarget<V> for Option<ResultView<V>> {
    fn install_view(&mut self, view: ResultView<V>) {
        *self = Some(view);
    }
}

impl<V> PromiseTarget<V> for Vec<ResultView<V>> {
    fn install_view(&mut self, view: ResultView<V>) {
        self.push(view);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;

    type Log = Rc<RefCell<Vec<String>>>;

    fn push(log: &Log, tag: &'static str) -> impl Fn(&Args<Value>) + 'static {
        let log = Rc::clone(log);
        move |args: &Args<Value>| {
            let first = args.first().cloned().unwrap_or(Value::Null);
            log.borrow_mut().push(format!("{tag}:{first}"));
        }
    }

    #[test]
    fn starts_pending_with_unique_ids() {
        let a: AsyncResult = AsyncResult::new();
        let b: AsyncResult = AsyncResult::new();
        assert_eq!(a.state(), State::Pending);
        assert!(a.is_pending());
        assert!(!a.is_resolved());
        assert!(!a.is_rejected());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn resolve_runs_done_once_and_records_state() {
        let log: Log = Rc::default();
        let result: AsyncResult = AsyncResult::new();
        result.done(push(&log, "done")).fail(push(&log, "fail"));
        result.resolve(json!(1));
        result.resolve(json!(2));
        assert_eq!(*log.borrow(), vec!["done:1"]);
        assert_eq!(result.state(), State::Fulfilled);
        assert!(result.is_resolved());
    }

    #[test]
    fn settlement_is_single_shot() {
        let log: Log = Rc::default();
        let result: AsyncResult = AsyncResult::new();
        result.done(push(&log, "done")).fail(push(&log, "fail"));
        result.reject(json!("bad"));
        result.resolve(json!("good"));
        result.reject(json!("worse"));
        assert_eq!(*log.borrow(), vec!["fail:\"bad\""]);
        assert_eq!(result.state(), State::Rejected);
    }

    #[test]
    fn late_listeners_replay_settlement() {
        let log: Log = Rc::default();
        let result: AsyncResult = AsyncResult::new();
        result.resolve(json!("v"));
        result.done(push(&log, "late"));
        result.fail(push(&log, "never"));
        result.always(push(&log, "always"));
        assert_eq!(*log.borrow(), vec!["late:\"v\"", "always:\"v\""]);
    }

    #[test]
    fn always_runs_on_rejection() {
        let log: Log = Rc::default();
        let result: AsyncResult = AsyncResult::new();
        result.always(push(&log, "always"));
        result.reject(json!(0));
        assert_eq!(*log.borrow(), vec!["always:0"]);
    }

    #[test]
    fn progress_runs_in_order_and_stops_at_settlement() {
        let log: Log = Rc::default();
        let result: AsyncResult = AsyncResult::new();
        result.progress(push(&log, "p"));
        result.notify(json!(1)).notify(json!(2));
        result.resolve(json!("x"));
        result.notify(json!(3));
        assert_eq!(*log.borrow(), vec!["p:1", "p:2"]);
    }

    #[test]
    fn late_progress_listener_replays_latest_while_pending() {
        let log: Log = Rc::default();
        let result: AsyncResult = AsyncResult::new();
        result.notify(json!(1)).notify(json!(2));
        result.progress(push(&log, "late"));
        assert_eq!(*log.borrow(), vec!["late:2"]);
    }

    #[test]
    fn progress_registration_after_settlement_is_ignored() {
        let log: Log = Rc::default();
        let result: AsyncResult = AsyncResult::new();
        result.notify(json!(1));
        result.resolve(json!(2));
        result.progress(push(&log, "p"));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn settling_from_a_progress_listener_ends_the_pass() {
        let log: Log = Rc::default();
        let result: AsyncResult = AsyncResult::new();
        let handle = result.clone();
        result.progress(move |_: &Args<Value>| {
            handle.resolve(json!("done"));
        });
        let view = result.promise();
        let seen = Rc::clone(&log);
        result.progress(move |args: &Args<Value>| {
            let first = args.first().cloned().unwrap_or(Value::Null);
            seen.borrow_mut().push(format!("p:{first} state={}", view.state()));
        });
        result.done(push(&log, "done"));

        result.notify(json!(1));
        assert_eq!(*log.borrow(), vec!["done:\"done\""]);
        assert!(result.is_resolved());
        result.notify(json!(2));
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn default_context_is_own_id() {
        let seen = Rc::new(Cell::new(None));
        let result: AsyncResult = AsyncResult::new();
        let s = Rc::clone(&seen);
        result.add_done(Callback::with_context(move |ctx: &ResultId, _: &Args<Value>| {
            s.set(Some(*ctx));
        }));
        result.resolve(Value::Null);
        assert_eq!(seen.get(), Some(result.id()));
    }

    #[test]
    fn explicit_context_is_forwarded() {
        let other: AsyncResult = AsyncResult::new();
        let seen = Rc::new(Cell::new(None));
        let result: AsyncResult = AsyncResult::new();
        let s = Rc::clone(&seen);
        result.add_fail(Callback::with_context(move |ctx: &ResultId, _: &Args<Value>| {
            s.set(Some(*ctx));
        }));
        result.reject_with(other.id(), Args::none());
        assert_eq!(seen.get(), Some(other.id()));
    }

    #[test]
    fn multi_argument_settlement() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let result: AsyncResult = AsyncResult::new();
        let s = Rc::clone(&seen);
        result.done(move |args: &Args<Value>| s.borrow_mut().extend(args.iter().cloned()));
        result.resolve_args(Args::many(vec![json!(1), json!("two")]));
        assert_eq!(*seen.borrow(), vec![json!(1), json!("two")]);
    }

    #[test]
    fn views_share_state_and_compare_equal() {
        let result: AsyncResult = AsyncResult::new();
        let a = result.promise();
        let b = a.promise();
        assert_eq!(a, b);
        assert_eq!(&a, result.view());
        result.reject(json!(null));
        assert_eq!(a.state(), State::Rejected);
        assert_eq!(b.state(), State::Rejected);
    }

    #[test]
    fn settleable_trait_hands_out_views() {
        fn view_of<S: Settleable<Value>>(s: &S) -> ResultView<Value> {
            s.promise()
        }
        let result: AsyncResult = AsyncResult::new();
        assert_eq!(view_of(&result), view_of(&result.promise()));
    }

    #[test]
    fn promise_onto_installs_view() {
        struct Job {
            name: &'static str,
            view: Option<ResultView<Value>>,
        }
        impl PromiseTarget<Value> for Job {
            fn install_view(&mut self, view: ResultView<Value>) {
                self.view = Some(view);
            }
        }

        let result: AsyncResult = AsyncResult::new();
        let mut job = Job {
            name: "fetch",
            view: None,
        };
        let same = result.promise_onto(&mut job);
        assert_eq!(same.name, "fetch");
        assert_eq!(job.view.as_ref(), Some(result.view()));

        let mut slot: Option<ResultView<Value>> = None;
        result.promise_onto(&mut slot);
        assert!(slot.is_some());
    }

    #[test]
    fn subscribe_registers_every_channel() {
        let log: Log = Rc::default();
        let result: AsyncResult = AsyncResult::new();
        result.subscribe(
            Listener::<Value>::new(push(&log, "done")),
            Listeners::none(),
            Listener::<Value>::new(push(&log, "p")),
        );
        result.notify(json!(1));
        result.resolve(json!(2));
        assert_eq!(*log.borrow(), vec!["p:1", "done:2"]);
    }

    #[test]
    fn with_init_runs_before_return() {
        let result: AsyncResult = AsyncResult::with_init(|r| {
            r.resolve(json!("init"));
        });
        assert!(result.is_resolved());
    }

    #[test]
    fn try_with_init_propagates_error() {
        let ok: Result<AsyncResult, &str> = AsyncResult::try_with_init(|_| Ok(()));
        assert!(ok.is_ok_and(|r| r.is_pending()));
        let err: Result<AsyncResult, &str> = AsyncResult::try_with_init(|_| Err("boom"));
        assert_eq!(err.err(), Some("boom"));
    }

    #[test]
    fn settling_from_inside_a_listener_is_ignored() {
        let log: Log = Rc::default();
        let result: AsyncResult = AsyncResult::new();
        let handle = result.clone();
        result.done(move |_: &Args<Value>| {
            handle.reject(json!("nested"));
            handle.resolve(json!("nested"));
        });
        result.done(push(&log, "second"));
        result.fail(push(&log, "fail"));
        result.resolve(json!("outer"));
        assert_eq!(*log.borrow(), vec!["second:\"outer\""]);
        assert!(result.is_resolved());
    }

    #[test]
    fn dropping_all_handles_frees_state() {
        let result: AsyncResult = AsyncResult::new();
        let weak = Rc::downgrade(&result.view.shared);
        result.done(|_: &Args<Value>| ());
        drop(result);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn state_strings() {
        assert_eq!(State::Pending.to_string(), "pending");
        assert_eq!(State::Fulfilled.to_string(), "resolved");
        assert_eq!(State::Rejected.to_string(), "rejected");
    }
}
