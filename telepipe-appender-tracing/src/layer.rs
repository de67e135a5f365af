use std::time::SystemTime;

use telepipe_sdk::logs::{SdkLogRecord, SdkLogger, SdkLoggerProvider, Severity};
use tracing_core::{Level, Metadata};
use tracing_subscriber::{registry::LookupSpan, Layer};

const INSTRUMENTATION_LIBRARY_NAME: &str = "telepipe-appender-tracing";

/// Targets of the pipeline's own diagnostics. Bridging them would feed every
/// export failure back into the exporter that failed.
const INTERNAL_TARGET_PREFIX: &str = "telepipe";

/// Visitor to record the message and fields of an event.
struct EventVisitor<'a> {
    log_record: &'a mut SdkLogRecord,
}

/// Fields added by `tracing-log` repeat what the metadata already says.
fn is_duplicated_metadata(field: &'static str) -> bool {
    field
        .strip_prefix("log.")
        .map(|remainder| matches!(remainder, "file" | "line" | "module_path" | "target"))
        .unwrap_or(false)
}

impl<'a> EventVisitor<'a> {
    fn new(log_record: &'a mut SdkLogRecord) -> Self {
        EventVisitor { log_record }
    }
}

impl tracing::field::Visit for EventVisitor<'_> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if is_duplicated_metadata(field.name()) {
            return;
        }
        if field.name() == "message" {
            self.log_record.set_body(format!("{value:?}"));
        } else {
            self.log_record
                .add_attribute(field.name(), format!("{value:?}"));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if is_duplicated_metadata(field.name()) {
            return;
        }
        if field.name() == "message" {
            self.log_record.set_body(value.to_owned());
        } else {
            self.log_record.add_attribute(field.name(), value.to_owned());
        }
    }

    fn record_error(
        &mut self,
        field: &tracing::field::Field,
        value: &(dyn std::error::Error + 'static),
    ) {
        if field.name() == "message" {
            self.log_record.set_body(value.to_string());
        } else {
            self.log_record.add_attribute(field.name(), value.to_string());
        }
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.log_record.add_attribute(field.name(), value);
    }

    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.log_record.add_attribute(field.name(), value);
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.log_record.add_attribute(field.name(), value);
    }

    // Values that do not fit an i64 are kept as their decimal string.
    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        match i64::try_from(value) {
            Ok(signed) => self.log_record.add_attribute(field.name(), signed),
            Err(_) => self.log_record.add_attribute(field.name(), value.to_string()),
        }
    }

    fn record_i128(&mut self, field: &tracing::field::Field, value: i128) {
        match i64::try_from(value) {
            Ok(signed) => self.log_record.add_attribute(field.name(), signed),
            Err(_) => self.log_record.add_attribute(field.name(), value.to_string()),
        }
    }

    fn record_u128(&mut self, field: &tracing::field::Field, value: u128) {
        match i64::try_from(value) {
            Ok(signed) => self.log_record.add_attribute(field.name(), signed),
            Err(_) => self.log_record.add_attribute(field.name(), value.to_string()),
        }
    }
}

/// A [`Layer`] that turns `tracing` events into log records of an
/// [`SdkLoggerProvider`].
///
/// The event's level becomes the severity, its `message` field the body and
/// every other field an attribute. Records emitted while a span is active in
/// the current [`Context`](telepipe::Context) carry that span's trace id and
/// span id. Spans of the `tracing` crate itself are not bridged.
#[derive(Debug)]
pub struct TelepipeTracingBridge {
    logger: SdkLogger,
}

impl TelepipeTracingBridge {
    /// Creates a bridge emitting through a logger of `provider`.
    pub fn new(provider: &SdkLoggerProvider) -> Self {
        TelepipeTracingBridge {
            logger: provider.logger(INSTRUMENTATION_LIBRARY_NAME),
        }
    }
}

impl<S> Layer<S> for TelepipeTracingBridge
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let metadata = event.metadata();
        if is_internal(metadata) {
            return;
        }
        let severity = severity_of_level(metadata.level());
        let target = metadata.target();
        if !self.logger.event_enabled(severity, target) {
            return;
        }

        let mut log_record = self.logger.create_log_record();
        log_record.set_target(target);
        log_record.set_event_name(metadata.name());
        log_record.set_severity_number(severity);
        log_record.set_severity_text(metadata.level().as_str());
        log_record.set_timestamp(SystemTime::now());

        let mut visitor = EventVisitor::new(&mut log_record);
        event.record(&mut visitor);

        // the logger correlates the record with the active span
        self.logger.emit(log_record);
    }
}

fn is_internal(metadata: &Metadata<'static>) -> bool {
    metadata.target().starts_with(INTERNAL_TARGET_PREFIX)
}

const fn severity_of_level(level: &Level) -> Severity {
    match *level {
        Level::TRACE => Severity::Trace,
        Level::DEBUG => Severity::Debug,
        Level::INFO => Severity::Info,
        Level::WARN => Severity::Warn,
        Level::ERROR => Severity::Error,
    }
}
