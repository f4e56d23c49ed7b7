#![forbid(unsafe_code)]

//! Deferral public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for users: the
//! callback registry from `deferral-callbacks` and the eventual values, pipe
//! chaining and `when` combinator from `deferral-core`.
//!
//! ```
//! use deferral::prelude::*;
//! use serde_json::json;
//!
//! let a: AsyncResult = AsyncResult::new();
//! let b: AsyncResult = AsyncResult::new();
//! let joined = when!(&a, &b);
//! a.resolve(json!(1));
//! b.reject(json!("nope"));
//! assert_eq!(joined.state(), State::Rejected);
//! ```

pub use deferral_callbacks as callbacks;

pub use deferral_callbacks::{Callback, Callbacks, Flow, Listeners, RegistryFlags};
pub use deferral_core::{
    Args, AsyncResult, Handlers, Input, Payload, PromiseTarget, ResultId, ResultView, Settleable,
    State, Step, when,
};

pub mod prelude {
    pub use deferral_callbacks::{Callback, Callbacks, Flow, RegistryFlags};
    pub use deferral_core::{
        Args, AsyncResult, Handlers, Input, ResultView, Settleable, State, Step, when,
    };

    pub use deferral_callbacks as callbacks;
}
