#![forbid(unsafe_code)]

//! Eventual values built on [`deferral_callbacks`].
//!
//! - [`AsyncResult`]: a single-settlement value with done, fail and progress
//!   channels.
//! - [`ResultView`]: the observer half, safe to hand out.
//! - [`ResultView::pipe`]: derive a new result through per-channel handlers.
//! - [`when()`]: join several inputs into one positional result.
//!
//! Values default to [`serde_json::Value`]; any [`Payload`] works.
//!
//! # Example
//!
//! ```
//! use deferral_core::{Args, AsyncResult, Handlers, Step, when};
//! use serde_json::{Value, json};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let user: AsyncResult = AsyncResult::new();
//! let perms: AsyncResult = AsyncResult::new();
//! let name = user.pipe(
//!     Handlers::new().done(|args: &Args<Value>| Step::Value(args[0]["name"].clone())),
//! );
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let s = Rc::clone(&seen);
//! when!(name, &perms).done(move |args| s.borrow_mut().extend(args.iter().cloned()));
//!
//! perms.resolve(json!(["read"]));
//! user.resolve(json!({ "name": "ada" }));
//! assert_eq!(*seen.borrow(), vec![json!("ada"), json!(["read"])]);
//! ```

pub mod args;
pub mod pipe;
pub mod result;
pub mod when;

pub use args::{Args, Payload};
pub use pipe::{Handlers, Step};
pub use result::{
    AsyncResult, Channel, Listener, ListenerList, PromiseTarget, ResultId, ResultView,
    Settleable, State,
};
pub use when::{Input, when};
