#![forbid(unsafe_code)]

//! Ordered multicast callback registry.
//!
//! # Design
//!
//! [`Callbacks<C, A>`] is a cheaply cloneable handle over
//! `Rc<RefCell<..>>` state. Listeners are invoked in registration order
//! with a call context `C` and an argument value `A`. The `RefCell` borrow is
//! released around every listener call, so listeners may freely add, remove,
//! fire, lock or disable the registry that is invoking them.
//!
//! # Invariants
//!
//! 1. Within one pass, listeners run in registration order; a listener
//!    removed mid-pass is neither skipped over nor invoked twice, and a
//!    listener added mid-pass runs in the same pass.
//! 2. A `ONCE` registry dispatches its list at most once. Afterwards the list
//!    is cleared, or the registry is disabled when the pass was stopped.
//! 3. A `MEMORY` registry replays its [`Memory::Recorded`] call to listeners
//!    added later, unless it is mid-dispatch or disabled.
//! 4. Firing from inside a listener never recurses: without `ONCE` the call is
//!    queued and runs right after the current pass; with `ONCE` it is dropped.
//! 5. [`disable`](Callbacks::disable) is terminal.
//!
//! # Failure Modes
//!
//! - **Listener panics**: the panic propagates out of `fire`. The firing flag
//!   is reset on unwind, so the registry remains usable; the rest of the
//!   pass and any queued fires are abandoned.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use crate::callback::{Callback, Flow, Listeners};
use crate::flags::{FlagsError, RegistryFlags, cached_flags};

/// What a registry remembers about its last fire.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Memory<C, A> {
    /// Nothing to replay.
    #[default]
    Empty,
    /// The last pass was aborted by a listener; nothing is replayed.
    Stopped,
    /// The last completed pass, replayed to late listeners.
    Recorded { context: C, args: A },
}

impl<C, A> Memory<C, A> {
    #[must_use]
    pub fn is_recorded(&self) -> bool {
        matches!(self, Self::Recorded { .. })
    }
}

struct Inner<C, A> {
    flags: RegistryFlags,
    list: Vec<Callback<C, A>>,
    queue: VecDeque<(C, A)>,
    memory: Memory<C, A>,
    fired: bool,
    firing: bool,
    locked: bool,
    disabled: bool,
    /// Index of the next listener of the in-flight pass.
    cursor: usize,
    /// End (exclusive) of the in-flight pass.
    end: usize,
}

impl<C, A> Inner<C, A> {
    fn new(flags: RegistryFlags) -> Self {
        Self {
            flags,
            list: Vec::new(),
            queue: VecDeque::new(),
            memory: Memory::Empty,
            fired: false,
            firing: false,
            locked: false,
            disabled: false,
            cursor: 0,
            end: 0,
        }
    }

    fn disable(&mut self) {
        self.disabled = true;
        self.list.clear();
        self.queue.clear();
        self.memory = Memory::Empty;
        self.end = 0;
    }
}

/// Resets the firing state if a listener unwinds out of a pass.
struct FiringGuard<'a, C, A> {
    inner: &'a RefCell<Inner<C, A>>,
    armed: bool,
}

impl<C, A> Drop for FiringGuard<'_, C, A> {
    fn drop(&mut self) {
        if self.armed
            && let Ok(mut inner) = self.inner.try_borrow_mut()
        {
            inner.firing = false;
            inner.cursor = 0;
            inner.end = 0;
            inner.queue.clear();
        }
    }
}

/// Ordered multicast dispatcher governed by [`RegistryFlags`].
///
/// Cloning a `Callbacks` creates a new handle to the **same** registry.
pub struct Callbacks<C, A> {
    inner: Rc<RefCell<Inner<C, A>>>,
}

impl<C, A> Clone for Callbacks<C, A> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<C, A> fmt::Debug for Callbacks<C, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Callbacks")
            .field("flags", &inner.flags)
            .field("listeners", &inner.list.len())
            .field("queued", &inner.queue.len())
            .field("fired", &inner.fired)
            .field("firing", &inner.firing)
            .field("locked", &inner.locked)
            .field("disabled", &inner.disabled)
            .finish()
    }
}

impl<C, A> Default for Callbacks<C, A> {
    fn default() -> Self {
        Self::new(RegistryFlags::empty())
    }
}

impl<C, A> Callbacks<C, A> {
    /// Create an empty registry with fixed policy flags.
    #[must_use]
    pub fn new(flags: RegistryFlags) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner::new(flags))),
        }
    }

    /// Create a registry from a flag string such as `"once memory"`.
    pub fn from_spec(spec: &str) -> Result<Self, FlagsError> {
        Ok(Self::new(cached_flags(spec)?))
    }

    #[must_use]
    pub fn flags(&self) -> RegistryFlags {
        self.inner.borrow().flags
    }

    /// Remove every occurrence of `callback`.
    ///
    /// Mid-dispatch, the in-flight pass is adjusted so the remaining
    /// listeners each still run exactly once.
    pub fn remove(&self, callback: &Callback<C, A>) -> &Self {
        let mut inner = self.inner.borrow_mut();
        if inner.disabled {
            return self;
        }
        let mut i = 0;
        while i < inner.list.len() {
            if !inner.list[i].same(callback) {
                i += 1;
                continue;
            }
            inner.list.remove(i);
            if inner.firing && i < inner.end {
                inner.end -= 1;
                if i < inner.cursor {
                    inner.cursor -= 1;
                }
            }
            if inner.flags.contains(RegistryFlags::UNIQUE) {
                break;
            }
        }
        self
    }

    #[must_use]
    pub fn has(&self, callback: &Callback<C, A>) -> bool {
        self.inner
            .borrow()
            .list
            .iter()
            .any(|existing| existing.same(callback))
    }

    /// Drop every listener; policy and memory are kept.
    pub fn empty(&self) -> &Self {
        let mut inner = self.inner.borrow_mut();
        inner.list.clear();
        inner.cursor = 0;
        inner.end = 0;
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().list.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().list.is_empty()
    }

    /// Whether any pass has ever been dispatched. Stays true after
    /// [`disable`](Self::disable).
    #[must_use]
    pub fn fired(&self) -> bool {
        self.inner.borrow().fired
    }

    #[must_use]
    pub fn is_firing(&self) -> bool {
        self.inner.borrow().firing
    }

    /// Irreversibly drop listeners, queued fires and memory.
    pub fn disable(&self) -> &Self {
        tracing::trace!(message = "callbacks.disable");
        self.inner.borrow_mut().disable();
        self
    }

    #[must_use]
    pub fn disabled(&self) -> bool {
        self.inner.borrow().disabled
    }

    /// Refuse further fires.
    ///
    /// Listeners added afterwards are still replayed from memory; without a
    /// recorded call there is nothing left to do and the registry is disabled.
    pub fn lock(&self) -> &Self {
        let mut inner = self.inner.borrow_mut();
        inner.locked = true;
        inner.queue.clear();
        let keep = inner.memory.is_recorded();
        tracing::trace!(message = "callbacks.lock", keep_memory = keep);
        if !keep {
            inner.disable();
        }
        self
    }

    /// Whether fires are refused. Disabled registries count as locked.
    #[must_use]
    pub fn locked(&self) -> bool {
        let inner = self.inner.borrow();
        inner.locked || inner.disabled
    }
}

impl<C: Clone, A: Clone> Callbacks<C, A> {
    /// Append listeners, flattening nested lists.
    ///
    /// Under `UNIQUE`, listeners already present are skipped. Outside a pass,
    /// a `MEMORY` registry with a recorded call invokes the new listeners
    /// immediately with that call.
    pub fn add(&self, listeners: impl Into<Listeners<C, A>>) -> &Self {
        let replay = {
            let mut inner = self.inner.borrow_mut();
            if inner.disabled {
                return self;
            }
            let start = inner.list.len();
            let unique = inner.flags.contains(RegistryFlags::UNIQUE);
            for callback in listeners.into().flatten() {
                if unique && inner.list.iter().any(|existing| existing.same(&callback)) {
                    continue;
                }
                inner.list.push(callback);
            }
            if inner.firing {
                inner.end = inner.list.len();
                None
            } else {
                match &inner.memory {
                    Memory::Recorded { context, args }
                        if inner.flags.contains(RegistryFlags::MEMORY)
                            && start < inner.list.len() =>
                    {
                        Some((context.clone(), args.clone(), start))
                    }
                    _ => None,
                }
            }
        };
        if let Some((context, args, start)) = replay {
            self.dispatch(context, args, start);
        }
        self
    }

    /// Snapshot of the remembered call.
    #[must_use]
    pub fn memory(&self) -> Memory<C, A> {
        self.inner.borrow().memory.clone()
    }

    /// Invoke every listener with `context` and `args`.
    ///
    /// No-op when disabled or locked, and for a `ONCE` registry that has
    /// already fired. Mid-dispatch the call is queued (or dropped under `ONCE`).
    pub fn fire_with(&self, context: C, args: A) -> &Self {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.disabled || inner.locked {
                return self;
            }
            let once = inner.flags.contains(RegistryFlags::ONCE);
            if inner.firing {
                if !once {
                    inner.queue.push_back((context, args));
                }
                return self;
            }
            if once && inner.fired {
                return self;
            }
        }
        self.dispatch(context, args, 0);
        self
    }

    fn dispatch(&self, mut context: C, mut args: A, mut start: usize) {
        loop {
            let flags = {
                let mut inner = self.inner.borrow_mut();
                inner.memory = if inner.flags.contains(RegistryFlags::MEMORY) {
                    Memory::Recorded {
                        context: context.clone(),
                        args: args.clone(),
                    }
                } else {
                    Memory::Empty
                };
                inner.fired = true;
                inner.firing = true;
                inner.cursor = start;
                inner.end = inner.list.len();
                tracing::trace!(
                    message = "callbacks.fire",
                    flags = %inner.flags,
                    listeners = inner.end.saturating_sub(start),
                    queued = inner.queue.len()
                );
                inner.flags
            };

            let mut guard = FiringGuard {
                inner: &self.inner,
                armed: true,
            };
            loop {
                let next = {
                    let mut inner = self.inner.borrow_mut();
                    if inner.disabled || inner.cursor >= inner.end {
                        None
                    } else {
                        let callback = inner.list[inner.cursor].clone();
                        inner.cursor += 1;
                        Some(callback)
                    }
                };
                let Some(callback) = next else {
                    break;
                };
                if callback.call(&context, &args) == Flow::Stop
                    && flags.contains(RegistryFlags::STOP_ON_FALSE)
                {
                    let mut inner = self.inner.borrow_mut();
                    tracing::debug!(message = "callbacks.stopped", index = inner.cursor.saturating_sub(1));
                    if !inner.disabled {
                        inner.memory = Memory::Stopped;
                    }
                    break;
                }
            }
            guard.armed = false;

            let queued = {
                let mut inner = self.inner.borrow_mut();
                inner.firing = false;
                if inner.disabled {
                    None
                } else if !flags.contains(RegistryFlags::ONCE) {
                    inner.queue.pop_front()
                } else if matches!(inner.memory, Memory::Stopped) {
                    inner.disable();
                    None
                } else {
                    inner.list.clear();
                    None
                }
            };
            match queued {
                Some((next_context, next_args)) => {
                    context = next_context;
                    args = next_args;
                    start = 0;
                }
                None => return,
            }
        }
    }
}

impl<C: Clone + Default, A: Clone> Callbacks<C, A> {
    /// [`fire_with`](Self::fire_with) using the default context.
    pub fn fire(&self, args: A) -> &Self {
        self.fire_with(C::default(), args)
    }
}
