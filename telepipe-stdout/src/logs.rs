use crate::common::{format_time, write_attributes, write_resource, BoxedWriter, Output};
use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use telepipe_sdk::logs::LogData;
use telepipe_sdk::{ExportResult, Resource};

/// Writes log records in a human readable form.
///
/// The resource is written once, before the first batch.
#[derive(Debug)]
pub struct LogExporter {
    output: Output,
    resource: Resource,
    resource_emitted: AtomicBool,
}

impl Default for LogExporter {
    fn default() -> Self {
        LogExporter::builder().build()
    }
}

impl LogExporter {
    /// Create a builder to configure this exporter.
    pub fn builder() -> LogExporterBuilder {
        LogExporterBuilder::default()
    }
}

impl telepipe_sdk::logs::LogExporter for LogExporter {
    async fn export(&self, batch: Vec<LogData>) -> ExportResult {
        let emit_resource = !self.resource_emitted.swap(true, Ordering::SeqCst);
        self.output.write_with(|w| {
            writeln!(w, "Logs")?;
            if emit_resource {
                write_resource(w, &self.resource)?;
            }
            write_logs(w, &batch)
        })
    }

    fn force_flush(&mut self) -> ExportResult {
        self.output.flush()
    }

    fn shutdown(&mut self) -> ExportResult {
        self.output.close()
    }

    fn set_resource(&mut self, resource: &Resource) {
        self.resource = resource.clone();
    }
}

fn write_logs(w: &mut dyn Write, batch: &[LogData]) -> io::Result<()> {
    for (i, log) in batch.iter().enumerate() {
        let record = &log.record;
        writeln!(w, "Log #{i}")?;
        writeln!(w, "\t Instrumentation Scope: {:?}", log.instrumentation_scope.name())?;
        if let Some(event_name) = record.event_name {
            writeln!(w, "\t EventName: {event_name:?}")?;
        }
        if let Some(target) = &record.target {
            writeln!(w, "\t Target (Scope): {target:?}")?;
        }
        if let Some(trace_context) = &record.trace_context {
            writeln!(w, "\t TraceId: {}", trace_context.trace_id)?;
            writeln!(w, "\t SpanId: {}", trace_context.span_id)?;
            writeln!(w, "\t TraceFlags: {:02x}", trace_context.trace_flags.to_u8())?;
        }
        if let Some(timestamp) = record.timestamp {
            writeln!(w, "\t Timestamp: {}", format_time(timestamp))?;
        }
        if let Some(timestamp) = record.observed_timestamp {
            writeln!(w, "\t Observed Timestamp: {}", format_time(timestamp))?;
        }
        if let Some(severity) = record.severity_text {
            writeln!(w, "\t SeverityText: {severity:?}")?;
        }
        if let Some(severity) = record.severity_number {
            writeln!(w, "\t SeverityNumber: {}", severity.number())?;
        }
        if let Some(body) = &record.body {
            writeln!(w, "\t Body: {body}")?;
        }
        writeln!(w, "\t Attributes:")?;
        write_attributes(w, "\t\t ", &record.attributes)?;
    }
    Ok(())
}

/// Configuration for the console [`LogExporter`].
#[derive(Default)]
pub struct LogExporterBuilder {
    writer: Option<BoxedWriter>,
}

impl fmt::Debug for LogExporterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LogExporterBuilder")
    }
}

impl LogExporterBuilder {
    /// Set the writer that log records are written to, stdout by default.
    pub fn with_writer<W>(mut self, writer: W) -> Self
    where
        W: Write + Send + Sync + 'static,
    {
        self.writer = Some(Box::new(writer));
        self
    }

    /// Create a log exporter with the current configuration.
    pub fn build(self) -> LogExporter {
        LogExporter {
            output: Output::new(self.writer),
            resource: Resource::empty(),
            resource_emitted: AtomicBool::new(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::test_util::Buffer;
    use telepipe::trace::{SpanContext, SpanId, TraceFlags, TraceId};
    use telepipe_sdk::logs::{SdkLoggerProvider, Severity};

    #[test]
    fn writes_record_with_correlation() {
        let buffer = Buffer::default();
        let provider = SdkLoggerProvider::builder()
            .with_simple_exporter(LogExporter::builder().with_writer(buffer.clone()).build())
            .with_resource(Resource::builder_empty().with_service_name("checkout").build())
            .build();
        let logger = provider.logger("console-test");

        let mut record = logger.create_log_record();
        record.set_severity_number(Severity::Warn);
        record.set_severity_text("WARN");
        record.set_body("payment retried");
        record.add_attribute("attempt", 2);
        record.set_trace_context(&SpanContext::new(
            TraceId::from(0x4bf92f3577b34da6a3ce929d0e0e4736_u128),
            SpanId::from(0x00f067aa0ba902b7_u64),
            TraceFlags::SAMPLED,
            false,
        ));
        logger.emit(record);
        logger.emit(logger.create_log_record());

        let output = buffer.contents();
        assert_eq!(output.matches("Resource\n").count(), 1);
        assert!(output.contains("\t Instrumentation Scope: \"console-test\"\n"));
        assert!(output.contains("\t TraceId: 4bf92f3577b34da6a3ce929d0e0e4736\n"));
        assert!(output.contains("\t SpanId: 00f067aa0ba902b7\n"));
        assert!(output.contains("\t TraceFlags: 01\n"));
        assert!(output.contains("\t SeverityText: \"WARN\"\n"));
        assert!(output.contains("\t SeverityNumber: 13\n"));
        assert!(output.contains("\t Body: payment retried\n"));
        assert!(output.contains("\t\t ->  attempt: 2\n"));
        assert!(output.contains("Log #0\n"));
    }
}
