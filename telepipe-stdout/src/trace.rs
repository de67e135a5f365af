use crate::common::{format_time, write_attributes, write_resource, BoxedWriter, Output};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use telepipe_sdk::trace::SpanData;
use telepipe_sdk::{ExportResult, Resource};

/// Writes finished spans in a human readable form.
///
/// The resource is written once, before the first batch.
#[derive(Debug)]
pub struct SpanExporter {
    output: Output,
    resource: Resource,
    resource_emitted: AtomicBool,
}

impl Default for SpanExporter {
    fn default() -> Self {
        SpanExporter::builder().build()
    }
}

impl SpanExporter {
    /// Create a builder to configure this exporter.
    pub fn builder() -> SpanExporterBuilder {
        SpanExporterBuilder::default()
    }
}

impl telepipe_sdk::trace::SpanExporter for SpanExporter {
    async fn export(&self, batch: Vec<SpanData>) -> ExportResult {
        let emit_resource = !self.resource_emitted.swap(true, Ordering::SeqCst);
        self.output.write_with(|w| {
            writeln!(w, "Spans")?;
            if emit_resource {
                write_resource(w, &self.resource)?;
            }
            write_spans(w, &batch)
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

fn write_spans(w: &mut dyn Write, batch: &[SpanData]) -> io::Result<()> {
    for (i, span) in batch.iter().enumerate() {
        writeln!(w, "Span #{i}")?;
        writeln!(w, "\t Instrumentation Scope")?;
        writeln!(w, "\t\t Name: {:?}", span.instrumentation_scope.name())?;
        if let Some(version) = span.instrumentation_scope.version() {
            writeln!(w, "\t\t Version: {version:?}")?;
        }
        writeln!(w)?;
        writeln!(w, "\t Name: {:?}", span.name)?;
        writeln!(w, "\t TraceId: {}", span.span_context.trace_id())?;
        writeln!(w, "\t SpanId: {}", span.span_context.span_id())?;
        if let Some(parent) = span.parent_span_id {
            writeln!(w, "\t ParentSpanId: {parent}")?;
        }
        writeln!(w, "\t Kind: {:?}", span.span_kind)?;
        writeln!(w, "\t Start time: {}", format_time(span.start_time))?;
        writeln!(w, "\t End time: {}", format_time(span.end_time))?;
        writeln!(w, "\t Status: {:?}", span.status)?;

        if !span.attributes.is_empty() {
            writeln!(w, "\t Attributes:")?;
            write_attributes(w, "\t\t ", &span.attributes)?;
        }

        if !span.events.is_empty() {
            writeln!(w, "\t Events:")?;
            for event in &span.events {
                writeln!(w, "\t\t Name: {:?}", event.name)?;
                writeln!(w, "\t\t Timestamp: {}", format_time(event.timestamp))?;
                if !event.attributes.is_empty() {
                    writeln!(w, "\t\t Attributes:")?;
                    write_attributes(w, "\t\t\t ", &event.attributes)?;
                }
            }
        }

        if !span.child_span_ids.is_empty() {
            writeln!(w, "\t Children:")?;
            for child in &span.child_span_ids {
                writeln!(w, "\t\t SpanId: {child}")?;
            }
        }
    }
    Ok(())
}

/// Configuration for the console [`SpanExporter`].
#[derive(Default)]
pub struct SpanExporterBuilder {
    writer: Option<BoxedWriter>,
}

impl std::fmt::Debug for SpanExporterBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SpanExporterBuilder")
    }
}

impl SpanExporterBuilder {
    /// Set the writer that spans are written to, stdout by default.
    pub fn with_writer<W>(mut self, writer: W) -> Self
    where
        W: Write + Send + Sync + 'static,
    {
        self.writer = Some(Box::new(writer));
        self
    }

    /// Create a span exporter with the current configuration.
    pub fn build(self) -> SpanExporter {
        SpanExporter {
            output: Output::new(self.writer),
            resource: Resource::empty(),
            resource_emitted: AtomicBool::new(false),
        }
    }
}
