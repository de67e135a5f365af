use std::{borrow::Cow, time::SystemTime};

use telepipe::trace::{SpanContext, SpanId, TraceFlags, TraceId};
use telepipe::{Key, KeyValue, Value};

/// A normalized severity value.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Ord, PartialOrd, Hash)]
pub enum Severity {
    /// TRACE
    Trace = 1,
    /// TRACE2
    Trace2 = 2,
    /// TRACE3
    Trace3 = 3,
    /// TRACE4
    Trace4 = 4,
    /// DEBUG
    Debug = 5,
    /// DEBUG2
    Debug2 = 6,
    /// DEBUG3
    Debug3 = 7,
    /// DEBUG4
    Debug4 = 8,
    /// INFO
    Info = 9,
    /// INFO2
    Info2 = 10,
    /// INFO3
    Info3 = 11,
    /// INFO4
    Info4 = 12,
    /// WARN
    Warn = 13,
    /// WARN2
    Warn2 = 14,
    /// WARN3
    Warn3 = 15,
    /// WARN4
    Warn4 = 16,
    /// ERROR
    Error = 17,
    /// ERROR2
    Error2 = 18,
    /// ERROR3
    Error3 = 19,
    /// ERROR4
    Error4 = 20,
    /// FATAL
    Fatal = 21,
    /// FATAL2
    Fatal2 = 22,
    /// FATAL3
    Fatal3 = 23,
    /// FATAL4
    Fatal4 = 24,
}

const SEVERITIES: [Severity; 24] = [
    Severity::Trace,
    Severity::Trace2,
    Severity::Trace3,
    Severity::Trace4,
    Severity::Debug,
    Severity::Debug2,
    Severity::Debug3,
    Severity::Debug4,
    Severity::Info,
    Severity::Info2,
    Severity::Info3,
    Severity::Info4,
    Severity::Warn,
    Severity::Warn2,
    Severity::Warn3,
    Severity::Warn4,
    Severity::Error,
    Severity::Error2,
    Severity::Error3,
    Severity::Error4,
    Severity::Fatal,
    Severity::Fatal2,
    Severity::Fatal3,
    Severity::Fatal4,
];

impl Severity {
    /// The severity with the given number, `None` outside `1..=24`.
    pub fn from_number(number: u8) -> Option<Severity> {
        SEVERITIES.get(usize::from(number).checked_sub(1)?).copied()
    }

    /// The severity number, in `1..=24`.
    pub const fn number(self) -> u8 {
        self as u8
    }

    /// Return the string representing the short name for the `Severity`
    /// value.
    pub const fn name(&self) -> &'static str {
        match &self {
            Severity::Trace => "TRACE",
            Severity::Trace2 => "TRACE2",
            Severity::Trace3 => "TRACE3",
            Severity::Trace4 => "TRACE4",

            Severity::Debug => "DEBUG",
            Severity::Debug2 => "DEBUG2",
            Severity::Debug3 => "DEBUG3",
            Severity::Debug4 => "DEBUG4",

            Severity::Info => "INFO",
            Severity::Info2 => "INFO2",
            Severity::Info3 => "INFO3",
            Severity::Info4 => "INFO4",

            Severity::Warn => "WARN",
            Severity::Warn2 => "WARN2",
            Severity::Warn3 => "WARN3",
            Severity::Warn4 => "WARN4",

            Severity::Error => "ERROR",
            Severity::Error2 => "ERROR2",
            Severity::Error3 => "ERROR3",
            Severity::Error4 => "ERROR4",

            Severity::Fatal => "FATAL",
            Severity::Fatal2 => "FATAL2",
            Severity::Fatal3 => "FATAL3",
            Severity::Fatal4 => "FATAL4",
        }
    }
}

/// The span a log record was emitted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceContext {
    /// Trace id of the active span
    pub trace_id: TraceId,
    /// Span id of the active span
    pub span_id: SpanId,
    /// Trace flags of the active span
    pub trace_flags: TraceFlags,
}

impl From<&SpanContext> for TraceContext {
    fn from(span_context: &SpanContext) -> Self {
        TraceContext {
            trace_id: span_context.trace_id(),
            span_id: span_context.span_id(),
            trace_flags: span_context.trace_flags(),
        }
    }
}

/// All data carried by a log record, as handed to log processors and
/// exporters.
///
/// Create one with [`SdkLogger::create_log_record`] and hand it back through
/// [`SdkLogger::emit`], which fills the observed timestamp and the trace
/// context of the current span when they are not set.
///
/// [`SdkLogger::create_log_record`]: crate::logs::SdkLogger::create_log_record
/// [`SdkLogger::emit`]: crate::logs::SdkLogger::emit
#[derive(Debug, Clone, Default, PartialEq)]
#[non_exhaustive]
pub struct SdkLogRecord {
    /// Name of the event, if the record describes one.
    pub event_name: Option<&'static str>,

    /// The component that emitted the record, such as a module path.
    pub target: Option<Cow<'static, str>>,

    /// Record timestamp
    pub timestamp: Option<SystemTime>,

    /// When the pipeline received the record
    pub observed_timestamp: Option<SystemTime>,

    /// Trace context for logs associated with spans
    pub trace_context: Option<TraceContext>,

    /// The original severity string from the source
    pub severity_text: Option<&'static str>,

    /// The corresponding severity value, normalized
    pub severity_number: Option<Severity>,

    /// Record body
    pub body: Option<Value>,

    /// Additional attributes associated with this record
    pub attributes: Vec<KeyValue>,
}

impl SdkLogRecord {
    pub(crate) fn new() -> Self {
        SdkLogRecord::default()
    }

    /// Sets the event name.
    pub fn set_event_name(&mut self, name: &'static str) {
        self.event_name = Some(name);
    }

    /// Sets the emitting component.
    pub fn set_target(&mut self, target: impl Into<Cow<'static, str>>) {
        self.target = Some(target.into());
    }

    /// Sets the time the event occurred.
    pub fn set_timestamp(&mut self, timestamp: SystemTime) {
        self.timestamp = Some(timestamp);
    }

    /// Sets the time the record was observed.
    pub fn set_observed_timestamp(&mut self, timestamp: SystemTime) {
        self.observed_timestamp = Some(timestamp);
    }

    /// Correlates the record with a span.
    pub fn set_trace_context(&mut self, span_context: &SpanContext) {
        self.trace_context = Some(TraceContext::from(span_context));
    }

    /// Sets the severity text as reported by the source.
    pub fn set_severity_text(&mut self, text: &'static str) {
        self.severity_text = Some(text);
    }

    /// Sets the normalized severity.
    pub fn set_severity_number(&mut self, severity: Severity) {
        self.severity_number = Some(severity);
    }

    /// Sets the body.
    pub fn set_body(&mut self, body: impl Into<Value>) {
        self.body = Some(body.into());
    }

    /// Adds an attribute.
    pub fn add_attribute<K, V>(&mut self, key: K, value: V)
    where
        K: Into<Key>,
        V: Into<Value>,
    {
        self.attributes.push(KeyValue::new(key, value));
    }

    /// Adds several attributes.
    pub fn add_attributes<I>(&mut self, attributes: I)
    where
        I: IntoIterator<Item = KeyValue>,
    {
        self.attributes.extend(attributes);
    }

    /// The value of the first attribute with this key.
    pub fn attribute(&self, key: &Key) -> Option<&Value> {
        self.attributes
            .iter()
            .find(|kv| kv.key == *key)
            .map(|kv| &kv.value)
    }
}
