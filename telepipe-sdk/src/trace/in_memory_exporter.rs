use crate::error::{ExportError, ExportResult};
use crate::trace::{SpanData, SpanExporter};
use crate::Resource;
use std::sync::{Arc, Mutex};

/// Keeps exported spans in memory, for tests.
///
/// Clones share the same storage, so keep a clone to inspect what the
/// pipeline exported:
///
/// ```
/// use telepipe_sdk::trace::{InMemorySpanExporter, SdkTracerProvider};
///
/// let exporter = InMemorySpanExporter::default();
/// let provider = SdkTracerProvider::builder()
///     .with_simple_exporter(exporter.clone())
///     .build();
///
/// drop(provider.tracer("example").start("say hello"));
/// assert_eq!(exporter.get_finished_spans().unwrap()[0].name, "say hello");
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemorySpanExporter {
    spans: Arc<Mutex<Vec<SpanData>>>,
    resource: Arc<Mutex<Option<Resource>>>,
}

impl InMemorySpanExporter {
    /// Spans exported so far, in export order.
    pub fn get_finished_spans(&self) -> Result<Vec<SpanData>, ExportError> {
        Ok(self.spans.lock()?.clone())
    }

    /// Forget all exported spans.
    pub fn reset(&self) {
        if let Ok(mut spans) = self.spans.lock() {
            spans.clear();
        }
    }

    /// The resource set by the provider, empty if none was set.
    pub fn resource(&self) -> Resource {
        self.resource
            .lock()
            .ok()
            .and_then(|resource| resource.clone())
            .unwrap_or_else(Resource::empty)
    }
}

impl SpanExporter for InMemorySpanExporter {
    async fn export(&self, batch: Vec<SpanData>) -> ExportResult {
        self.spans.lock()?.extend(batch);
        Ok(())
    }

    fn set_resource(&mut self, resource: &Resource) {
        if let Ok(mut slot) = self.resource.lock() {
            *slot = Some(resource.clone());
        }
    }
}
