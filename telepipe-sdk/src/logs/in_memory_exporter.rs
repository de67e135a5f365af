use crate::error::{ExportError, ExportResult};
use crate::logs::{LogData, LogExporter};
use crate::Resource;
use std::sync::{Arc, Mutex};

/// Keeps exported log records in memory, for tests.
///
/// Clones share the same storage.
#[derive(Clone, Debug, Default)]
pub struct InMemoryLogExporter {
    logs: Arc<Mutex<Vec<LogData>>>,
    resource: Arc<Mutex<Option<Resource>>>,
    is_shutdown: Arc<Mutex<bool>>,
}

impl InMemoryLogExporter {
    /// Records exported so far, in export order.
    pub fn get_emitted_logs(&self) -> Result<Vec<LogData>, ExportError> {
        Ok(self.logs.lock()?.clone())
    }

    /// Forget all exported records.
    pub fn reset(&self) {
        if let Ok(mut logs) = self.logs.lock() {
            logs.clear();
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

    /// Whether the provider shut this exporter down.
    pub fn is_shutdown_called(&self) -> bool {
        self.is_shutdown.lock().map(|flag| *flag).unwrap_or(false)
    }
}

impl LogExporter for InMemoryLogExporter {
    async fn export(&self, batch: Vec<LogData>) -> ExportResult {
        self.logs.lock()?.extend(batch);
        Ok(())
    }

    fn shutdown(&mut self) -> ExportResult {
        *self.is_shutdown.lock()? = true;
        Ok(())
    }

    fn set_resource(&mut self, resource: &Resource) {
        if let Ok(mut slot) = self.resource.lock() {
            *slot = Some(resource.clone());
        }
    }
}
