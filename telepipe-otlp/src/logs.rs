//! OTLP log exporter.
use crate::exporter::{HasExportConfig, HasTonicConfig, TonicExporterBuilder};
use crate::transform::common::ResourceAttributesWithSchema;
use crate::transform::logs::group_logs_by_resource_and_scope;
use crate::{Error, ExportConfig};
use opentelemetry_proto::tonic::collector::logs::v1::{
    logs_service_client::LogsServiceClient, ExportLogsServiceRequest,
};
use std::fmt;
use telepipe::otel_debug;
use telepipe_sdk::logs::LogData;
use telepipe_sdk::{ExportError, ExportResult, Resource};
use tonic::metadata::MetadataMap;
use tonic::transport::Channel;
use tonic::Request;

/// Target to which the exporter is going to send logs, overriding
/// [`OTEL_EXPORTER_OTLP_ENDPOINT`](crate::OTEL_EXPORTER_OTLP_ENDPOINT).
pub const OTEL_EXPORTER_OTLP_LOGS_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_LOGS_ENDPOINT";
/// Max waiting time for the backend to process each logs batch, in
/// milliseconds.
pub const OTEL_EXPORTER_OTLP_LOGS_TIMEOUT: &str = "OTEL_EXPORTER_OTLP_LOGS_TIMEOUT";

/// Builder for [`LogExporter`].
#[derive(Debug, Default)]
pub struct LogExporterBuilder {
    tonic: TonicExporterBuilder,
}

impl LogExporterBuilder {
    /// Build the exporter. Must be called inside a Tokio runtime.
    pub fn build(self) -> Result<LogExporter, Error> {
        otel_debug!(name: "LogsTonicChannelBuilding");
        let (channel, metadata) = self
            .tonic
            .build_channel(OTEL_EXPORTER_OTLP_LOGS_ENDPOINT, OTEL_EXPORTER_OTLP_LOGS_TIMEOUT)?;
        Ok(LogExporter {
            inner: Some(ClientInner {
                client: LogsServiceClient::new(channel),
                metadata,
            }),
            resource: ResourceAttributesWithSchema::default(),
        })
    }
}

impl HasExportConfig for LogExporterBuilder {
    fn export_config(&mut self) -> &mut ExportConfig {
        &mut self.tonic.exporter_config
    }
}

impl HasTonicConfig for LogExporterBuilder {
    fn tonic_builder(&mut self) -> &mut TonicExporterBuilder {
        &mut self.tonic
    }
}

struct ClientInner {
    client: LogsServiceClient<Channel>,
    metadata: MetadataMap,
}

/// Sends log records to an OTLP collector over gRPC.
pub struct LogExporter {
    inner: Option<ClientInner>,
    resource: ResourceAttributesWithSchema,
}

impl fmt::Debug for LogExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LogExporter")
    }
}

impl LogExporter {
    /// Create a builder for the exporter.
    pub fn builder() -> LogExporterBuilder {
        LogExporterBuilder::default()
    }
}

impl telepipe_sdk::logs::LogExporter for LogExporter {
    async fn export(&self, batch: Vec<LogData>) -> ExportResult {
        let (mut client, metadata) = match &self.inner {
            Some(inner) => (inner.client.clone(), inner.metadata.clone()),
            None => return Err(ExportError::AlreadyShutdown),
        };

        let resource_logs = group_logs_by_resource_and_scope(batch, &self.resource);
        let mut request = Request::new(ExportLogsServiceRequest { resource_logs });
        *request.metadata_mut() = metadata;

        otel_debug!(name: "TonicLogsClient.ExportStarted");
        match client.export(request).await {
            Ok(_) => {
                otel_debug!(name: "TonicLogsClient.ExportSucceeded");
                Ok(())
            }
            Err(status) => {
                let err = Error::from(status);
                otel_debug!(name: "TonicLogsClient.ExportFailed", error = err.to_string());
                Err(err.into())
            }
        }
    }

    fn shutdown(&mut self) -> ExportResult {
        match self.inner.take() {
            Some(_) => Ok(()),
            None => Err(ExportError::AlreadyShutdown),
        }
    }

    fn set_resource(&mut self, resource: &Resource) {
        self.resource = resource.into();
    }
}
