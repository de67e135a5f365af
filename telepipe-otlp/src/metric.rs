//! OTLP metric exporter.
use crate::exporter::{HasExportConfig, HasTonicConfig, TonicExporterBuilder};
use crate::transform::common::ResourceAttributesWithSchema;
use crate::transform::metrics::resource_metrics_to_request;
use crate::{Error, ExportConfig};
use opentelemetry_proto::tonic::collector::metrics::v1::metrics_service_client::MetricsServiceClient;
use std::fmt;
use std::sync::Mutex;
use telepipe::otel_debug;
use telepipe_sdk::metrics::data::ResourceMetrics;
use telepipe_sdk::metrics::PushMetricExporter;
use telepipe_sdk::{ExportError, ExportResult};
use tonic::metadata::MetadataMap;
use tonic::transport::Channel;
use tonic::Request;

/// Target to which the exporter is going to send metrics, overriding
/// [`OTEL_EXPORTER_OTLP_ENDPOINT`](crate::OTEL_EXPORTER_OTLP_ENDPOINT).
pub const OTEL_EXPORTER_OTLP_METRICS_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_METRICS_ENDPOINT";
/// Max waiting time for the backend to process each metrics batch, in
/// milliseconds.
pub const OTEL_EXPORTER_OTLP_METRICS_TIMEOUT: &str = "OTEL_EXPORTER_OTLP_METRICS_TIMEOUT";

/// Builder for [`MetricExporter`].
#[derive(Debug, Default)]
pub struct MetricExporterBuilder {
    tonic: TonicExporterBuilder,
}

impl MetricExporterBuilder {
    /// Build the exporter. Must be called inside a Tokio runtime.
    pub fn build(self) -> Result<MetricExporter, Error> {
        otel_debug!(name: "MetricsTonicChannelBuilding");
        let (channel, metadata) = self.tonic.build_channel(
            OTEL_EXPORTER_OTLP_METRICS_ENDPOINT,
            OTEL_EXPORTER_OTLP_METRICS_TIMEOUT,
        )?;
        Ok(MetricExporter {
            inner: Mutex::new(Some(ClientInner {
                client: MetricsServiceClient::new(channel),
                metadata,
            })),
        })
    }
}

impl HasExportConfig for MetricExporterBuilder {
    fn export_config(&mut self) -> &mut ExportConfig {
        &mut self.tonic.exporter_config
    }
}

impl HasTonicConfig for MetricExporterBuilder {
    fn tonic_builder(&mut self) -> &mut TonicExporterBuilder {
        &mut self.tonic
    }
}

struct ClientInner {
    client: MetricsServiceClient<Channel>,
    metadata: MetadataMap,
}

/// Sends metrics to an OTLP collector over gRPC.
///
/// Pair it with a `PeriodicReader`; every collection becomes one export
/// request with cumulative temporality.
pub struct MetricExporter {
    inner: Mutex<Option<ClientInner>>,
}

impl fmt::Debug for MetricExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MetricExporter")
    }
}

impl MetricExporter {
    /// Create a builder for the exporter.
    pub fn builder() -> MetricExporterBuilder {
        MetricExporterBuilder::default()
    }
}

impl PushMetricExporter for MetricExporter {
    async fn export(&self, metrics: &ResourceMetrics) -> ExportResult {
        let (mut client, metadata) = match self.inner.lock()?.as_ref() {
            Some(inner) => (inner.client.clone(), inner.metadata.clone()),
            None => return Err(ExportError::AlreadyShutdown),
        };

        let resource = ResourceAttributesWithSchema::from(&metrics.resource);
        let mut request = Request::new(resource_metrics_to_request(metrics, &resource));
        *request.metadata_mut() = metadata;

        otel_debug!(name: "TonicMetricsClient.ExportStarted");
        match client.export(request).await {
            Ok(_) => {
                otel_debug!(name: "TonicMetricsClient.ExportSucceeded");
                Ok(())
            }
            Err(status) => {
                let err = Error::from(status);
                otel_debug!(name: "TonicMetricsClient.ExportFailed", error = err.to_string());
                Err(err.into())
            }
        }
    }

    fn force_flush(&self) -> ExportResult {
        Ok(())
    }

    fn shutdown(&self) -> ExportResult {
        match self.inner.lock()?.take() {
            Some(_) => Ok(()),
            None => Err(ExportError::AlreadyShutdown),
        }
    }
}
