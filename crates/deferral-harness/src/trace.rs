#![forbid(unsafe_code)]

//! Structured tracing capture.
//!
//! [`TraceCapture`] is a `tracing_subscriber` [`Layer`] that stores every
//! event with its fields rendered to strings, so tests can assert on the
//! dotted event names emitted by the library (`result.settle`,
//! `when.join`, ...).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

/// One captured event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedEvent {
    pub level: Level,
    pub target: String,
    pub message: String,
    pub fields: BTreeMap<String, String>,
}

impl CapturedEvent {
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: BTreeMap<String, String>,
}

impl FieldVisitor {
    fn store(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.fields.insert(field.name().to_owned(), value);
        }
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.store(field, value.to_owned());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.store(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.store(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.store(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.store(field, format!("{value:?}").trim_matches('"').to_owned());
    }
}

/// Shared sink of captured events; clones observe the same events.
#[derive(Debug, Clone, Default)]
pub struct TraceCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl TraceCapture {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Event names in emission order.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.events().into_iter().map(|event| event.message).collect()
    }

    /// Events named `message`, in emission order.
    #[must_use]
    pub fn named(&self, message: &str) -> Vec<CapturedEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.message == message)
            .collect()
    }

    #[must_use]
    pub fn count(&self, message: &str) -> usize {
        self.named(message).len()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl<S: Subscriber> Layer<S> for TraceCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        let metadata = event.metadata();
        let captured = CapturedEvent {
            level: *metadata.level(),
            target: metadata.target().to_owned(),
            message: visitor.message.unwrap_or_default(),
            fields: visitor.fields,
        };
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(captured);
    }
}

/// Run `f` with a capturing subscriber installed on this thread.
pub fn capture<R>(f: impl FnOnce() -> R) -> (R, TraceCapture) {
    let capture = TraceCapture::new();
    let subscriber = tracing_subscriber::registry().with(capture.clone());
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, capture)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_message_and_fields() {
        let ((), capture) = capture(|| {
            tracing::debug!(message = "demo.event", count = 3u64, label = %"x", ok = true);
        });
        let events = capture.named("demo.event");
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.level, Level::DEBUG);
        assert_eq!(event.field("count"), Some("3"));
        assert_eq!(event.field("label"), Some("x"));
        assert_eq!(event.field("ok"), Some("true"));
    }

    #[test]
    fn capture_is_scoped_to_the_closure() {
        let ((), capture) = capture(|| tracing::trace!(message = "inside"));
        tracing::trace!(message = "outside");
        assert_eq!(capture.messages(), vec!["inside"]);
        capture.clear();
        assert!(capture.events().is_empty());
    }
}
