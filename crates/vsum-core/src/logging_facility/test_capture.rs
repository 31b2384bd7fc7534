//! In-memory event capture for logging assertions in tests
//!
//! One capture layer is installed per test process; tests share it and
//! narrow what they look at by `op` or by commit `request_id`.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::field::{Field, Visit};
use tracing::{Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;
use vsum_core_types::schema;

/// One recorded event, every field rendered as a string
#[derive(Clone, Debug)]
pub struct CapturedEvent {
    pub level: Level,
    pub op: Option<String>,
    pub event: Option<String>,
    pub fields: HashMap<String, String>,
}

impl CapturedEvent {
    fn from_fields(level: Level, fields: HashMap<String, String>) -> Self {
        Self {
            level,
            op: fields.get("op").cloned(),
            event: fields.get("event").cloned(),
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn component(&self) -> Option<&str> {
        self.field("component")
    }

    /// Whether this event belongs to the commit with the given request id
    pub fn is_for_request(&self, request_id: &str) -> bool {
        self.field(schema::FIELD_REQUEST_ID) == Some(request_id)
    }

    pub fn is(&self, op: &str, event: &str) -> bool {
        self.op.as_deref() == Some(op) && self.event.as_deref() == Some(event)
    }

    /// Stable error code of an `end_error` event
    pub fn error_code(&self) -> Option<&str> {
        self.field(schema::FIELD_ERR_CODE)
    }
}

#[derive(Default)]
struct FieldCollector(HashMap<String, String>);

impl FieldCollector {
    fn put(&mut self, field: &Field, value: String) {
        self.0.insert(field.name().to_string(), value);
    }
}

impl Visit for FieldCollector {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
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

/// Layer pushing every event into a shared buffer
pub struct TestCaptureLayer {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl TestCaptureLayer {
    pub fn new() -> (Self, TestCapture) {
        let capture = TestCapture::default();
        let layer = Self {
            events: capture.events.clone(),
        };
        (layer, capture)
    }
}

impl<S> Layer<S> for TestCaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut collector = FieldCollector::default();
        event.record(&mut collector);
        self.events
            .lock()
            .push(CapturedEvent::from_fields(*event.metadata().level(), collector.0));
    }
}

/// Read handle on the captured events
#[derive(Clone, Default)]
pub struct TestCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl TestCapture {
    /// Snapshot of everything captured so far
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().clone()
    }

    /// # Panics
    ///
    /// Panics if no event with this `op` and `event` was captured.
    pub fn assert_event_exists(&self, op: &str, event: &str) {
        let events = self.events.lock();
        assert!(
            events.iter().any(|e| e.is(op, event)),
            "no op={} event={} among {} captured events",
            op,
            event,
            events.len()
        );
    }

    /// Events recorded for one commit, in emission order
    pub fn events_for_request(&self, request_id: &str) -> Vec<CapturedEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.is_for_request(request_id))
            .cloned()
            .collect()
    }

    pub fn count_events<F>(&self, predicate: F) -> usize
    where
        F: Fn(&CapturedEvent) -> bool,
    {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }
}

static GLOBAL_CAPTURE: OnceLock<TestCapture> = OnceLock::new();

/// Install the capture layer as the global subscriber, once per process
///
/// Every call returns a handle on the same buffer.
///
/// # Example
///
/// ```
/// use vsum_core::logging_facility::test_capture::init_test_capture;
/// use vsum_core::log_op_start;
///
/// let capture = init_test_capture();
/// log_op_start!("select_roots");
/// capture.assert_event_exists("select_roots", "start");
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
