//! OTLP span exporter.
use crate::exporter::{HasExportConfig, HasTonicConfig, TonicExporterBuilder};
use crate::transform::common::ResourceAttributesWithSchema;
use crate::transform::trace::group_spans_by_resource_and_scope;
use crate::{Error, ExportConfig};
use opentelemetry_proto::tonic::collector::trace::v1::{
    trace_service_client::TraceServiceClient, ExportTraceServiceRequest,
};
use std::fmt;
use telepipe::otel_debug;
use telepipe_sdk::trace::SpanData;
use telepipe_sdk::{ExportError, ExportResult, Resource};
use tonic::metadata::MetadataMap;
use tonic::transport::Channel;
use tonic::Request;

/// Target to which the exporter is going to send spans, overriding
/// [`OTEL_EXPORTER_OTLP_ENDPOINT`](crate::OTEL_EXPORTER_OTLP_ENDPOINT).
pub const OTEL_EXPORTER_OTLP_TRACES_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_TRACES_ENDPOINT";
/// Max waiting time for the backend to process each spans batch, in
/// milliseconds.
pub const OTEL_EXPORTER_OTLP_TRACES_TIMEOUT: &str = "OTEL_EXPORTER_OTLP_TRACES_TIMEOUT";

/// Builder for [`SpanExporter`].
#[derive(Debug, Default)]
pub struct SpanExporterBuilder {
    tonic: TonicExporterBuilder,
}

impl SpanExporterBuilder {
    /// Build the exporter. Must be called inside a Tokio runtime.
    pub fn build(self) -> Result<SpanExporter, Error> {
        otel_debug!(name: "TracesTonicChannelBuilding");
        let (channel, metadata) = self.tonic.build_channel(
            OTEL_EXPORTER_OTLP_TRACES_ENDPOINT,
            OTEL_EXPORTER_OTLP_TRACES_TIMEOUT,
        )?;
        Ok(SpanExporter {
            inner: Some(ClientInner {
                client: TraceServiceClient::new(channel),
                metadata,
            }),
            resource: ResourceAttributesWithSchema::default(),
        })
    }
}

impl HasExportConfig for SpanExporterBuilder {
    fn export_config(&mut self) -> &mut ExportConfig {
        &mut self.tonic.exporter_config
    }
}

impl HasTonicConfig for SpanExporterBuilder {
    fn tonic_builder(&mut self) -> &mut TonicExporterBuilder {
        &mut self.tonic
    }
}

struct ClientInner {
    client: TraceServiceClient<Channel>,
    metadata: MetadataMap,
}

/// Sends spans to an OTLP collector over gRPC.
pub struct SpanExporter {
    inner: Option<ClientInner>,
    resource: ResourceAttributesWithSchema,
}

impl fmt::Debug for SpanExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SpanExporter")
    }
}

impl SpanExporter {
    /// Create a builder for the exporter.
    pub fn builder() -> SpanExporterBuilder {
        SpanExporterBuilder::default()
    }
}

impl telepipe_sdk::trace::SpanExporter for SpanExporter {
    async fn export(&self, batch: Vec<SpanData>) -> ExportResult {
        let (mut client, metadata) = match &self.inner {
            Some(inner) => (inner.client.clone(), inner.metadata.clone()),
            None => return Err(ExportError::AlreadyShutdown),
        };

        let resource_spans = group_spans_by_resource_and_scope(batch, &self.resource);
        let mut request = Request::new(ExportTraceServiceRequest { resource_spans });
        *request.metadata_mut() = metadata;

        otel_debug!(name: "TonicTracesClient.ExportStarted");
        match client.export(request).await {
            Ok(_) => {
                otel_debug!(name: "TonicTracesClient.ExportSucceeded");
                Ok(())
            }
            Err(status) => {
                let err = Error::from(status);
                otel_debug!(name: "TonicTracesClient.ExportFailed", error = err.to_string());
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
