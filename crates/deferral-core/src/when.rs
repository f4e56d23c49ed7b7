#![forbid(unsafe_code)]

//! Fan-in: join several inputs into one result.
//!
//! # Invariants
//!
//! 1. The joined result resolves exactly once, after every input has
//!    fulfilled, with one positional slot per input.
//! 2. The first rejection rejects the joined result with that input's
//!    arguments; later outcomes have no observable effect.
//! 3. Every input notification re-notifies the joined result with the whole
//!    positional progress array.
//! 4. A single pending input is returned as-is rather than wrapped.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use deferral_callbacks::Callback;
use serde_json::Value;

use crate::args::{Args, Payload};
use crate::result::{AsyncResult, Listener, ResultId, ResultView};

/// One argument to [`when`].
pub enum Input<V = Value> {
    /// A plain value, fulfilled from the start.
    Value(V),
    /// A result whose outcome is awaited.
    Pending(ResultView<V>),
}

impl<V> From<ResultView<V>> for Input<V> {
    fn from(view: ResultView<V>) -> Self {
        Self::Pending(view)
    }
}

impl<V> From<&ResultView<V>> for Input<V> {
    fn from(view: &ResultView<V>) -> Self {
        Self::Pending(view.clone())
    }
}

impl<V: Payload> From<AsyncResult<V>> for Input<V> {
    fn from(result: AsyncResult<V>) -> Self {
        Self::Pending(result.view().clone())
    }
}

impl<V: Payload> From<&AsyncResult<V>> for Input<V> {
    fn from(result: &AsyncResult<V>) -> Self {
        Self::Pending(result.view().clone())
    }
}

impl From<Value> for Input<Value> {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl<V: fmt::Debug> fmt::Debug for Input<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Pending(view) => f.debug_tuple("Pending").field(view).finish(),
        }
    }
}

/// Join `inputs` into a single result.
///
/// - No inputs: an already fulfilled result with no arguments.
/// - One plain value: an already fulfilled result carrying that value.
/// - One result: that result's own view.
/// - Otherwise: fulfilled with the positional slots once every input has
///   fulfilled, rejected by the first input to reject, and notified with the
///   positional progress array on every input notification. Plain values
///   fill their slot immediately.
///
/// Each slot holds [`Payload::collapse`] of that input's arguments.
pub fn when<V: Payload>(inputs: impl IntoIterator<Item = Input<V>>) -> ResultView<V> {
    let mut inputs: Vec<Input<V>> = inputs.into_iter().collect();
    if inputs.len() > 1 {
        return join(inputs);
    }
    match inputs.pop() {
        Some(Input::Pending(view)) => view,
        Some(Input::Value(value)) => {
            let joined = AsyncResult::new();
            joined.resolve(value);
            joined.view().clone()
        }
        None => {
            let joined = AsyncResult::new();
            joined.resolve_args(Args::none());
            joined.view().clone()
        }
    }
}

struct Join<V> {
    joined: AsyncResult<V>,
    values: RefCell<Vec<V>>,
    progress: RefCell<Vec<V>>,
    remaining: Cell<usize>,
}

impl<V: Payload> Join<V> {
    fn complete_one(&self) {
        let remaining = self.remaining.get().saturating_sub(1);
        self.remaining.set(remaining);
        if remaining == 0 {
            let values = self.values.borrow().clone();
            tracing::debug!(
                message = "when.join",
                id = %self.joined.id(),
                inputs = values.len()
            );
            self.joined.resolve_with(self.joined.id(), Args::many(values));
        }
    }
}

fn join<V: Payload>(inputs: Vec<Input<V>>) -> ResultView<V> {
    let count = inputs.len();
    let values = inputs
        .iter()
        .map(|input| match input {
            Input::Value(value) => value.clone(),
            Input::Pending(_) => V::collapse(Args::none()),
        })
        .collect();
    let state = Rc::new(Join {
        joined: AsyncResult::new(),
        values: RefCell::new(values),
        progress: RefCell::new(vec![V::collapse(Args::none()); count]),
        remaining: Cell::new(count),
    });
    let id = state.joined.id();

    for (slot, input) in inputs.into_iter().enumerate() {
        match input {
            Input::Value(_) => state.complete_one(),
            Input::Pending(view) => {
                view.subscribe(
                    fulfilled(&state, slot),
                    rejected(&state, slot),
                    notified(&state, slot),
                );
            }
        }
    }
    tracing::trace!(message = "when.start", id = %id, inputs = count);
    state.joined.view().clone()
}

fn fulfilled<V: Payload>(state: &Rc<Join<V>>, slot: usize) -> Listener<V> {
    let state = Rc::clone(state);
    Callback::new(move |args: &Args<V>| {
        state.values.borrow_mut()[slot] = V::collapse(args.clone());
        state.complete_one();
    })
}

fn rejected<V: Payload>(state: &Rc<Join<V>>, slot: usize) -> Listener<V> {
    let state = Rc::clone(state);
    Callback::with_context(move |context: &ResultId, args: &Args<V>| {
        if state.joined.is_pending() {
            tracing::debug!(message = "when.rejected", id = %state.joined.id(), slot);
        }
        state.joined.reject_with(*context, args.clone());
    })
}

fn notified<V: Payload>(state: &Rc<Join<V>>, slot: usize) -> Listener<V> {
    let state = Rc::clone(state);
    Callback::new(move |args: &Args<V>| {
        let snapshot = {
            let mut progress = state.progress.borrow_mut();
            progress[slot] = V::collapse(args.clone());
            progress.clone()
        };
        state
            .joined
            .notify_with(state.joined.id(), Args::many(snapshot));
    })
}

/// Join a comma-separated list of inputs with [`when`].
///
/// Each argument goes through `Input::from`, so results, views and plain
/// JSON values can be mixed.
///
/// ```
/// use deferral_core::{AsyncResult, when};
/// use serde_json::json;
///
/// let a: AsyncResult = AsyncResult::new();
/// let joined = when!(&a, json!("b"));
/// a.resolve(json!("a"));
/// assert!(joined.is_resolved());
/// ```
#[macro_export]
macro_rules! when {
    () => {
        $crate::when::when(::std::iter::empty())
    };
    ($($input:expr),+ $(,)?) => {
        $crate::when::when([$($crate::when::Input::from($input)),+])
    };
}
