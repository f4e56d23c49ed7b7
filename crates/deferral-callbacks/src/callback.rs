#![forbid(unsafe_code)]

//! Listener handles and the nested listener lists accepted by `add`.

use std::fmt;
use std::rc::Rc;

/// Outcome of a single listener invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flow {
    /// Keep dispatching.
    #[default]
    Continue,
    /// Abort the pass if the registry has `STOP_ON_FALSE`.
    Stop,
}

/// Conversion from a listener's return value into a [`Flow`].
///
/// `()` continues; `false` stops.
pub trait IntoFlow {
    fn into_flow(self) -> Flow;
}

impl IntoFlow for () {
    fn into_flow(self) -> Flow {
        Flow::Continue
    }
}

impl IntoFlow for bool {
    fn into_flow(self) -> Flow {
        if self { Flow::Continue } else { Flow::Stop }
    }
}

impl IntoFlow for Flow {
    fn into_flow(self) -> Flow {
        self
    }
}

type ListenerFn<C, A> = dyn Fn(&C, &A) -> Flow;

/// A shared listener.
///
/// Identity is the identity of the shared closure: clones compare equal to
/// each other and to nothing else. `has`, `remove` and the `UNIQUE` policy all
/// use this identity.
pub struct Callback<C, A> {
    f: Rc<ListenerFn<C, A>>,
}

impl<C: 'static, A: 'static> Callback<C, A> {
    /// Wrap a listener that ignores the call context.
    pub fn new<F, R>(f: F) -> Self
    where
        F: Fn(&A) -> R + 'static,
        R: IntoFlow,
    {
        Self {
            f: Rc::new(move |_: &C, args: &A| f(args).into_flow()),
        }
    }

    /// Wrap a listener that receives the call context.
    pub fn with_context<F, R>(f: F) -> Self
    where
        F: Fn(&C, &A) -> R + 'static,
        R: IntoFlow,
    {
        Self {
            f: Rc::new(move |context: &C, args: &A| f(context, args).into_flow()),
        }
    }
}

impl<C, A> Callback<C, A> {
    #[inline]
    pub(crate) fn call(&self, context: &C, args: &A) -> Flow {
        (self.f)(context, args)
    }

    /// Whether `self` and `other` are the same listener.
    #[inline]
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.f), Rc::as_ptr(&other.f))
    }
}

impl<C, A> Clone for Callback<C, A> {
    fn clone(&self) -> Self {
        Self {
            f: Rc::clone(&self.f),
        }
    }
}

impl<C, A> PartialEq for Callback<C, A> {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl<C, A> Eq for Callback<C, A> {}

impl<C, A> fmt::Debug for Callback<C, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Callback")
            .field(&Rc::as_ptr(&self.f).cast::<()>())
            .finish()
    }
}

/// A possibly nested list of listeners.
///
/// `add` flattens it depth first, preserving order.
#[derive(Debug, Clone)]
pub enum Listeners<C, A> {
    One(Callback<C, A>),
    Many(Vec<Listeners<C, A>>),
}

impl<C, A> Listeners<C, A> {
    /// An empty list.
    #[must_use]
    pub fn none() -> Self {
        Self::Many(Vec::new())
    }

    /// Flatten into registration order.
    #[must_use]
    pub fn flatten(self) -> Vec<Callback<C, A>> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into(self, out: &mut Vec<Callback<C, A>>) {
        match self {
            Self::One(callback) => out.push(callback),
            Self::Many(items) => {
                for item in items {
                    item.flatten_into(out);
                }
            }
        }
    }
}

impl<C, A> From<Callback<C, A>> for Listeners<C, A> {
    fn from(callback: Callback<C, A>) -> Self {
        Self::One(callback)
    }
}

impl<C, A> From<&Callback<C, A>> for Listeners<C, A> {
    fn from(callback: &Callback<C, A>) -> Self {
        Self::One(callback.clone())
    }
}

impl<C, A> From<Vec<Callback<C, A>>> for Listeners<C, A> {
    fn from(callbacks: Vec<Callback<C, A>>) -> Self {
        Self::Many(callbacks.into_iter().map(Self::One).collect())
    }
}

impl<C, A> From<Vec<Listeners<C, A>>> for Listeners<C, A> {
    fn from(items: Vec<Listeners<C, A>>) -> Self {
        Self::Many(items)
    }
}

impl<C, A, const N: usize> From<[Callback<C, A>; N]> for Listeners<C, A> {
    fn from(callbacks: [Callback<C, A>; N]) -> Self {
        Self::Many(callbacks.into_iter().map(Self::One).collect())
    }
}
