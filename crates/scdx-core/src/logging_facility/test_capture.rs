//! In-memory capture of log events for test assertions

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex, OnceLock};
use tracing::field::{Field, Visit};
use tracing::{Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// One recorded event. Every field value is kept in its display form.
#[derive(Clone, Debug)]
pub struct CapturedEvent {
    pub level: Level,
    pub component: Option<String>,
    pub op: Option<String>,
    pub event: Option<String>,
    pub fields: HashMap<String, String>,
}

impl CapturedEvent {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Whether this is the `event` phase of operation `op`
    pub fn is(&self, op: &str, event: &str) -> bool {
        self.op.as_deref() == Some(op) && self.event.as_deref() == Some(event)
    }
}

#[derive(Default)]
struct Fields(HashMap<String, String>);

impl Fields {
    fn put(&mut self, field: &Field, value: String) {
        self.0.insert(field.name().to_string(), value);
    }
}

impl Visit for Fields {
    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        self.put(field, format!("{:?}", value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, value.to_string());
    }
}

type EventBuffer = Arc<Mutex<Vec<CapturedEvent>>>;

/// Subscriber layer appending every event to a shared buffer
pub struct TestCaptureLayer {
    buffer: EventBuffer,
}

impl TestCaptureLayer {
    pub fn new() -> (Self, TestCapture) {
        let buffer = EventBuffer::default();
        (
            Self {
                buffer: buffer.clone(),
            },
            TestCapture { buffer },
        )
    }
}

impl<S> Layer<S> for TestCaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = Fields::default();
        event.record(&mut fields);
        let fields = fields.0;

        let captured = CapturedEvent {
            level: *event.metadata().level(),
            component: fields.get("component").cloned(),
            op: fields.get("op").cloned(),
            event: fields.get("event").cloned(),
            fields,
        };
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.push(captured);
        }
    }
}

/// Read handle over the captured events
#[derive(Clone)]
pub struct TestCapture {
    buffer: EventBuffer,
}

impl TestCapture {
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.buffer
            .lock()
            .map(|buffer| buffer.clone())
            .unwrap_or_default()
    }

    /// Events emitted for one operation, in order
    pub fn events_for_op(&self, op: &str) -> Vec<CapturedEvent> {
        self.matching(|e| e.op.as_deref() == Some(op))
    }

    /// Events carrying `snapshot = <name>`, in order
    pub fn events_for_snapshot(&self, snapshot: &str) -> Vec<CapturedEvent> {
        self.matching(|e| e.field("snapshot") == Some(snapshot))
    }

    pub fn matching<F>(&self, predicate: F) -> Vec<CapturedEvent>
    where
        F: Fn(&CapturedEvent) -> bool,
    {
        self.events().into_iter().filter(|e| predicate(e)).collect()
    }

    /// # Panics
    ///
    /// Panics when no `event` phase of `op` was captured.
    pub fn assert_event_exists(&self, op: &str, event: &str) {
        let events = self.events();
        assert!(
            events.iter().any(|e| e.is(op, event)),
            "no {} event for op {} among {} captured events",
            event,
            op,
            events.len()
        );
    }
}

static GLOBAL_CAPTURE: OnceLock<TestCapture> = OnceLock::new();

/// Install the capture layer as the global subscriber (first call only) and
/// return the shared handle.
///
/// The buffer is process-wide, so tests filter by a unique op or snapshot name.
///
/// ```
/// use scdx_core::logging_facility::test_capture::init_test_capture;
/// use scdx_core::log_op_start;
///
/// let capture = init_test_capture();
/// log_op_start!("doc_capture_op", snapshot = "doc_snapshot");
/// capture.assert_event_exists("doc_capture_op", "start");
/// assert_eq!(capture.events_for_snapshot("doc_snapshot").len(), 1);
/// ```
pub fn init_test_capture() -> TestCapture {
    GLOBAL_CAPTURE
        .get_or_init(|| {
            let (layer, capture) = TestCaptureLayer::new();
            tracing_subscriber::registry().with(layer).init();
            capture
        })
        .clone()
}
