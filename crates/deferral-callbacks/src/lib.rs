#![forbid(unsafe_code)]

//! Callbacks: an ordered multicast listener registry.
//!
//! A [`Callbacks`] registry holds listeners and dispatches every fire to them
//! in registration order. Its lifecycle is governed by [`RegistryFlags`]:
//!
//! - `ONCE`: the list is dispatched at most once.
//! - `MEMORY`: the last fire is replayed to listeners added later.
//! - `UNIQUE`: a listener can be registered only once.
//! - `STOP_ON_FALSE`: a listener returning `false` aborts the pass.
//!
//! Dispatch is synchronous and single-threaded. A registry fired from inside
//! one of its own listeners queues the request instead of recursing.
//!
//! # Example
//!
//! ```
//! use deferral_callbacks::{Callback, Callbacks};
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let seen = Rc::new(Cell::new(0));
//! let registry: Callbacks<(), i32> = Callbacks::from_spec("once memory").unwrap();
//! registry.fire(7);
//!
//! let s = Rc::clone(&seen);
//! registry.add(Callback::new(move |v: &i32| s.set(*v)));
//! assert_eq!(seen.get(), 7);
//! ```

pub mod callback;
pub mod flags;
pub mod registry;

pub use callback::{Callback, Flow, IntoFlow, Listeners};
pub use flags::{FlagsError, RegistryFlags, cached_flags, cached_spec_count};
pub use registry::{Callbacks, Memory};
