#![forbid(unsafe_code)]

//! Invocation recorder.

use std::cell::RefCell;
use std::rc::Rc;

use deferral_core::{Args, Listener, Payload, ResultId, ResultView};
use serde_json::Value;

/// One recorded listener call.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub tag: String,
    pub context: ResultId,
    pub args: Vec<Value>,
}

impl Invocation {
    /// The call's arguments folded into one value.
    #[must_use]
    pub fn value(&self) -> Value {
        Value::collapse(Args::many(self.args.clone()))
    }
}

/// Shared log of listener invocations, in call order.
///
/// Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    log: Rc<RefCell<Vec<Invocation>>>,
}

impl Recorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A listener that records each call under `tag`.
    #[must_use]
    pub fn listener(&self, tag: impl Into<String>) -> Listener<Value> {
        let log = Rc::clone(&self.log);
        let tag = tag.into();
        Listener::<Value>::with_context(move |context: &ResultId, args: &Args<Value>| {
            log.borrow_mut().push(Invocation {
                tag: tag.clone(),
                context: *context,
                args: args.as_slice().to_vec(),
            });
        })
    }

    /// Record `done`, `fail` and `progress` on `view`.
    pub fn attach(&self, view: &ResultView<Value>) -> &Self {
        self.attach_as(view, "")
    }

    /// Like [`attach`](Self::attach) with tags prefixed by `prefix`.
    pub fn attach_as(&self, view: &ResultView<Value>, prefix: &str) -> &Self {
        view.subscribe(
            self.listener(format!("{prefix}done")),
            self.listener(format!("{prefix}fail")),
            self.listener(format!("{prefix}progress")),
        );
        self
    }

    #[must_use]
    pub fn invocations(&self) -> Vec<Invocation> {
        self.log.borrow().clone()
    }

    /// `(tag, value)` pairs in call order.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.log
            .borrow()
            .iter()
            .map(|call| (call.tag.clone(), call.value()))
            .collect()
    }

    #[must_use]
    pub fn tags(&self) -> Vec<String> {
        self.log.borrow().iter().map(|call| call.tag.clone()).collect()
    }

    /// Argument lists recorded under `tag`.
    #[must_use]
    pub fn calls(&self, tag: &str) -> Vec<Vec<Value>> {
        self.log
            .borrow()
            .iter()
            .filter(|call| call.tag == tag)
            .map(|call| call.args.clone())
            .collect()
    }

    #[must_use]
    pub fn count(&self, tag: &str) -> usize {
        self.log.borrow().iter().filter(|call| call.tag == tag).count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.log.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.log.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.log.borrow_mut().clear();
    }
}
