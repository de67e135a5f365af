use std::borrow::Cow;
use std::net::SocketAddr;

use telepipe::{otel_info, otel_warn};
use telepipe_appender_tracing::layer::TelepipeTracingBridge;
use telepipe_http::{create_instruments, ProcessSamplers, TelemetryLayer};
use telepipe_otlp::WithExportConfig;
use telepipe_prometheus::{PrometheusExporter, ScrapeServer};
use telepipe_sdk::logs::{BatchLogProcessor, SdkLoggerProvider};
use telepipe_sdk::metrics::{Meter, MetricResult, PeriodicReader, Sampler, SdkMeterProvider, View};
use telepipe_sdk::resource::create_resource;
use telepipe_sdk::trace::{BatchSpanProcessor, SdkTracerProvider, Tracer};
use telepipe_sdk::{ExportError, ExportResult, Resource};

use crate::config::{ExporterKind, PipelineConfig, Signal};
use crate::{ConfigError, PipelineError};

const HTTP_SCOPE: &str = "telepipe-http";

/// The trace, metric and log pipelines of one service.
///
/// Built once at startup by [`init`](Self::init) and torn down by
/// [`shutdown`](Self::shutdown). Nothing is installed globally: hand out the
/// tracers, meters and layers this pipeline creates.
///
/// ```no_run
/// use telepipe_pipeline::{standard_views, PipelineConfig, TelemetryPipeline};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let pipeline = TelemetryPipeline::init(PipelineConfig::from_env()?, standard_views()?).await?;
/// let http_layer = pipeline.http_layer(Default::default())?;
/// // serve requests through `http_layer`...
/// # drop(http_layer);
/// pipeline.shutdown().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct TelemetryPipeline {
    resource: Resource,
    tracer_provider: SdkTracerProvider,
    meter_provider: SdkMeterProvider,
    logger_provider: SdkLoggerProvider,
    prometheus: Option<PrometheusExporter>,
    scrape_server: Option<ScrapeServer>,
}

impl TelemetryPipeline {
    /// Builds every pipeline `config` enables and starts the Prometheus scrape
    /// endpoint if metrics are exported to Prometheus.
    ///
    /// Must be called inside a Tokio runtime. `views` apply to every metric
    /// exporter.
    pub async fn init(config: PipelineConfig, views: Vec<View>) -> Result<Self, PipelineError> {
        let resource = create_resource(
            config.service_name().to_owned(),
            config.service_version().to_owned(),
        );

        let tracer_provider = init_traces(&config, &resource)?;
        let logger_provider = init_logs(&config, &resource)?;

        let mut meter_builder = views.into_iter().fold(
            SdkMeterProvider::builder().with_resource(resource.clone()),
            |builder, view| builder.with_view(view),
        );
        let mut prometheus = None;
        for kind in config.exporters(Signal::Metrics) {
            meter_builder = match kind {
                ExporterKind::Console => meter_builder.with_reader(
                    PeriodicReader::builder(telepipe_stdout::MetricExporter::default())
                        .with_interval(config.metric_export_interval())
                        .build(),
                ),
                ExporterKind::Otlp => {
                    let exporter = telepipe_otlp::MetricExporter::builder()
                        .with_export_config(config.otlp().clone())
                        .build()?;
                    meter_builder.with_reader(
                        PeriodicReader::builder(exporter)
                            .with_interval(config.metric_export_interval())
                            .build(),
                    )
                }
                ExporterKind::Prometheus => {
                    let exporter = telepipe_prometheus::exporter().build();
                    prometheus = Some(exporter.clone());
                    meter_builder.with_reader(exporter)
                }
            };
        }
        let meter_provider = meter_builder.build();

        let scrape_server = match &prometheus {
            Some(exporter) => {
                Some(ScrapeServer::bind(exporter.clone(), config.prometheus().clone()).await?)
            }
            None => None,
        };

        otel_info!(
            name: "TelemetryPipeline.Started",
            service_name = config.service_name(),
            traces = describe(config.exporters(Signal::Traces)),
            metrics = describe(config.exporters(Signal::Metrics)),
            logs = describe(config.exporters(Signal::Logs))
        );

        Ok(TelemetryPipeline {
            resource,
            tracer_provider,
            meter_provider,
            logger_provider,
            prometheus,
            scrape_server,
        })
    }

    /// The resource attached to everything this pipeline exports.
    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// A tracer for the instrumentation scope `name`.
    pub fn tracer(&self, name: impl Into<Cow<'static, str>>) -> Tracer {
        self.tracer_provider.tracer(name)
    }

    /// A meter for the instrumentation scope `name`.
    pub fn meter(&self, name: impl Into<Cow<'static, str>>) -> Meter {
        self.meter_provider.meter(name)
    }

    /// The tracer provider.
    pub fn tracer_provider(&self) -> &SdkTracerProvider {
        &self.tracer_provider
    }

    /// The meter provider.
    pub fn meter_provider(&self) -> &SdkMeterProvider {
        &self.meter_provider
    }

    /// The logger provider.
    pub fn logger_provider(&self) -> &SdkLoggerProvider {
        &self.logger_provider
    }

    /// The Prometheus exporter, when metrics are exported to Prometheus.
    pub fn prometheus_exporter(&self) -> Option<&PrometheusExporter> {
        self.prometheus.as_ref()
    }

    /// Where the Prometheus scrape endpoint listens.
    pub fn scrape_addr(&self) -> Option<SocketAddr> {
        self.scrape_server.as_ref().map(ScrapeServer::local_addr)
    }

    /// Registers the request instruments and returns the tower layer that
    /// traces and measures every request.
    ///
    /// A second call returns a layer sharing the instruments of the first;
    /// the observables keep the samplers they were first registered with.
    pub fn http_layer<C, M>(&self, samplers: ProcessSamplers<C, M>) -> MetricResult<TelemetryLayer>
    where
        C: Sampler<f64>,
        M: Sampler<i64>,
    {
        let instruments = create_instruments(&self.meter(HTTP_SCOPE), samplers)?;
        Ok(TelemetryLayer::new(self.tracer(HTTP_SCOPE), instruments))
    }

    /// A `tracing` layer forwarding application events to the log pipeline.
    pub fn tracing_bridge(&self) -> TelepipeTracingBridge {
        TelepipeTracingBridge::new(&self.logger_provider)
    }

    /// Exports everything still buffered, on every signal.
    pub fn force_flush(&self) -> ExportResult {
        let results = [
            self.tracer_provider.force_flush(),
            self.meter_provider.force_flush(),
            self.logger_provider.force_flush(),
        ];
        results.into_iter().collect::<ExportResult>()
    }

    /// Stops the scrape endpoint, then flushes and shuts down every
    /// provider.
    ///
    /// All providers are shut down even if one fails; the first failure is
    /// returned.
    pub async fn shutdown(mut self) -> Result<(), PipelineError> {
        if let Some(server) = self.scrape_server.take() {
            server.shutdown().await;
        }

        let tracer_provider = self.tracer_provider.clone();
        let meter_provider = self.meter_provider.clone();
        let logger_provider = self.logger_provider.clone();
        // shutdown joins worker threads
        let results = tokio::task::spawn_blocking(move || {
            [
                (Signal::Traces, tracer_provider.shutdown()),
                (Signal::Metrics, meter_provider.shutdown()),
                (Signal::Logs, logger_provider.shutdown()),
            ]
        })
        .await
        .map_err(|err| ExportError::Failed(err.to_string()))?;

        let mut first_error = None;
        for (signal, result) in results {
            if let Err(err) = result {
                otel_warn!(
                    name: "TelemetryPipeline.ShutdownFailed",
                    signal = signal.to_string(),
                    error = err.to_string()
                );
                first_error.get_or_insert(err);
            }
        }
        otel_info!(name: "TelemetryPipeline.Stopped");

        match first_error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}

fn init_traces(
    config: &PipelineConfig,
    resource: &Resource,
) -> Result<SdkTracerProvider, PipelineError> {
    let mut builder = SdkTracerProvider::builder().with_resource(resource.clone());
    for kind in config.exporters(Signal::Traces) {
        builder = match kind {
            ExporterKind::Console => {
                builder.with_simple_exporter(telepipe_stdout::SpanExporter::default())
            }
            ExporterKind::Otlp => {
                let exporter = telepipe_otlp::SpanExporter::builder()
                    .with_export_config(config.otlp().clone())
                    .build()?;
                builder.with_span_processor(
                    BatchSpanProcessor::builder(exporter)
                        .with_batch_config(config.span_batch().clone())
                        .build(),
                )
            }
            ExporterKind::Prometheus => return Err(unsupported(Signal::Traces, *kind)),
        };
    }
    Ok(builder.build())
}

fn init_logs(
    config: &PipelineConfig,
    resource: &Resource,
) -> Result<SdkLoggerProvider, PipelineError> {
    let mut builder = SdkLoggerProvider::builder().with_resource(resource.clone());
    for kind in config.exporters(Signal::Logs) {
        builder = match kind {
            ExporterKind::Console => {
                builder.with_simple_exporter(telepipe_stdout::LogExporter::default())
            }
            ExporterKind::Otlp => {
                let exporter = telepipe_otlp::LogExporter::builder()
                    .with_export_config(config.otlp().clone())
                    .build()?;
                builder.with_log_processor(
                    BatchLogProcessor::builder(exporter)
                        .with_batch_config(config.log_batch().clone())
                        .build(),
                )
            }
            ExporterKind::Prometheus => return Err(unsupported(Signal::Logs, *kind)),
        };
    }
    Ok(builder.build())
}

fn unsupported(signal: Signal, exporter: ExporterKind) -> PipelineError {
    ConfigError::UnsupportedExporter { signal, exporter }.into()
}

fn describe(exporters: &[ExporterKind]) -> String {
    if exporters.is_empty() {
        return "none".to_owned();
    }
    exporters
        .iter()
        .map(ExporterKind::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exporters_are_described() {
        assert_eq!(describe(&[]), "none");
        assert_eq!(
            describe(&[ExporterKind::Console, ExporterKind::Prometheus]),
            "console,prometheus"
        );
    }
}
