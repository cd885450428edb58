//! Test helpers shared across modules

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::Registry;

/// Records the message of every WARN event
#[derive(Clone, Default)]
struct WarnRecorder {
    messages: Arc<Mutex<Vec<String>>>,
}

struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{:?}", value);
        }
    }
}

impl<S: Subscriber> Layer<S> for WarnRecorder {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::WARN {
            let mut visitor = MessageVisitor(String::new());
            event.record(&mut visitor);
            self.messages.lock().push(visitor.0);
        }
    }
}

/// Run `f` under a thread-local subscriber and return the WARN messages it emitted
pub(crate) fn capture_warnings<T>(f: impl FnOnce() -> T) -> (T, Vec<String>) {
    let recorder = WarnRecorder::default();
    let subscriber = Registry::default().with(recorder.clone());
    let value = tracing::subscriber::with_default(subscriber, f);
    let messages = recorder.messages.lock().clone();
    (value, messages)
}
