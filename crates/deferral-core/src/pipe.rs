#![forbid(unsafe_code)]

//! Chaining: derive a new result from an existing one.
//!
//! [`ResultView::pipe`] returns a view of a fresh derived result. For each
//! channel the derived result either mirrors the source verbatim (no handler)
//! or receives whatever the handler produced: a plain [`Step::Value`] settles
//! the derived result on the same channel, while a [`Step::Chain`] defers to
//! another result and adopts its outcome on all three channels.

use std::fmt;

use deferral_callbacks::Callback;

use crate::args::{Args, Payload};
use crate::result::{AsyncResult, Listener, ResultId, ResultView};

/// What a pipe handler hands on to the derived result.
pub enum Step<V> {
    /// Settle (or notify) the derived result with this single value.
    Value(V),
    /// Adopt the outcome of another result.
    Chain(ResultView<V>),
}

impl<V> From<ResultView<V>> for Step<V> {
    fn from(view: ResultView<V>) -> Self {
        Self::Chain(view)
    }
}

impl<V> From<&ResultView<V>> for Step<V> {
    fn from(view: &ResultView<V>) -> Self {
        Self::Chain(view.clone())
    }
}

impl<V: Payload> From<AsyncResult<V>> for Step<V> {
    fn from(result: AsyncResult<V>) -> Self {
        Self::Chain(result.view().clone())
    }
}

impl<V: Payload> From<&AsyncResult<V>> for Step<V> {
    fn from(result: &AsyncResult<V>) -> Self {
        Self::Chain(result.view().clone())
    }
}

impl<V: fmt::Debug> fmt::Debug for Step<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Chain(view) => f.debug_tuple("Chain").field(view).finish(),
        }
    }
}

type Handler<V> = Box<dyn Fn(&Args<V>) -> Step<V>>;

/// Optional per-channel handlers for [`ResultView::pipe`].
pub struct Handlers<V> {
    done: Option<Handler<V>>,
    fail: Option<Handler<V>>,
    progress: Option<Handler<V>>,
}

impl<V> Default for Handlers<V> {
    fn default() -> Self {
        Self {
            done: None,
            fail: None,
            progress: None,
        }
    }
}

impl<V> fmt::Debug for Handlers<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handlers")
            .field("done", &self.done.is_some())
            .field("fail", &self.fail.is_some())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl<V: Payload> Handlers<V> {
    /// No handlers: every channel passes straight through.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn done(mut self, f: impl Fn(&Args<V>) -> Step<V> + 'static) -> Self {
        self.done = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn fail(mut self, f: impl Fn(&Args<V>) -> Step<V> + 'static) -> Self {
        self.fail = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn progress(mut self, f: impl Fn(&Args<V>) -> Step<V> + 'static) -> Self {
        self.progress = Some(Box::new(f));
        self
    }
}

#[derive(Clone, Copy)]
enum Route {
    Resolve,
    Reject,
    Notify,
}

impl Route {
    fn apply<V: Payload>(self, target: &AsyncResult<V>, context: ResultId, args: Args<V>) {
        match self {
            Self::Resolve => target.resolve_with(context, args),
            Self::Reject => target.reject_with(context, args),
            Self::Notify => target.notify_with(context, args),
        };
    }

    fn forwarder<V: Payload>(self, target: &AsyncResult<V>) -> Listener<V> {
        let target = target.clone();
        Callback::with_context(move |context: &ResultId, args: &Args<V>| {
            self.apply(&target, *context, args.clone());
        })
    }
}

impl<V: Payload> ResultView<V> {
    /// Derive a new result through optional per-channel handlers.
    ///
    /// Without a handler the channel is forwarded unchanged, context
    /// included. A handler returning [`Step::Value`] settles the derived
    /// result with that single value; the context is the derived result's id
    /// when the source fired with its own id, and is forwarded otherwise. A
    /// handler returning [`Step::Chain`] makes the derived result follow the
    /// returned one.
    ///
    /// ```
    /// use deferral_core::{Args, AsyncResult, Handlers, Step};
    /// use serde_json::{Value, json};
    /// use std::cell::RefCell;
    /// use std::rc::Rc;
    ///
    /// let source: AsyncResult = AsyncResult::new();
    /// let doubled = source.pipe(Handlers::new().done(|args: &Args<Value>| {
    ///     let n = args.first().and_then(Value::as_i64).unwrap_or(0);
    ///     Step::Value(json!(n * 2))
    /// }));
    ///
    /// let seen = Rc::new(RefCell::new(Value::Null));
    /// let s = Rc::clone(&seen);
    /// doubled.done(move |args| *s.borrow_mut() = args[0].clone());
    /// source.resolve(json!(21));
    /// assert_eq!(*seen.borrow(), json!(42));
    /// ```
    #[must_use]
    pub fn pipe(&self, handlers: Handlers<V>) -> ResultView<V> {
        let derived = AsyncResult::new();
        let Handlers {
            done,
            fail,
            progress,
        } = handlers;
        self.add_done(self.route(&derived, done, Route::Resolve));
        self.add_fail(self.route(&derived, fail, Route::Reject));
        self.add_progress(self.route(&derived, progress, Route::Notify));
        tracing::trace!(message = "result.pipe", source = %self.id(), derived = %derived.id());
        derived.view().clone()
    }

    /// Same as [`pipe`](Self::pipe).
    ///
    /// To register listeners without deriving anything, use
    /// [`subscribe`](Self::subscribe).
    #[must_use]
    pub fn then(&self, handlers: Handlers<V>) -> ResultView<V> {
        self.pipe(handlers)
    }

    fn route(
        &self,
        derived: &AsyncResult<V>,
        handler: Option<Handler<V>>,
        route: Route,
    ) -> Listener<V> {
        let Some(handler) = handler else {
            return route.forwarder(derived);
        };
        let source = self.id();
        let derived = derived.clone();
        Callback::with_context(move |context: &ResultId, args: &Args<V>| match handler(args) {
            Step::Value(value) => {
                let context = if *context == source {
                    derived.id()
                } else {
                    *context
                };
                route.apply(&derived, context, Args::one(value));
            }
            Step::Chain(next) => {
                next.subscribe(
                    Route::Resolve.forwarder(&derived),
                    Route::Reject.forwarder(&derived),
                    Route::Notify.forwarder(&derived),
                );
            }
        })
    }
}
