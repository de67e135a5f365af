use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use telepipe::otel_warn;
use telepipe_otlp::ExportConfig;
use telepipe_prometheus::ServerConfig;
use telepipe_sdk::{BatchConfig, BatchConfigBuilder};

use crate::ConfigError;

/// Logical name of the service.
pub const OTEL_SERVICE_NAME: &str = "OTEL_SERVICE_NAME";
/// Default service name.
pub const OTEL_SERVICE_NAME_DEFAULT: &str = "unknown_service";
/// Version of the service.
pub const OTEL_SERVICE_VERSION: &str = "OTEL_SERVICE_VERSION";
/// Default service version.
pub const OTEL_SERVICE_VERSION_DEFAULT: &str = "0.1.0";
/// Milliseconds between two pushes of the metric exporters.
pub const OTEL_METRIC_EXPORT_INTERVAL: &str = "OTEL_METRIC_EXPORT_INTERVAL";
/// Default push interval.
pub const OTEL_METRIC_EXPORT_INTERVAL_DEFAULT: Duration = Duration::from_millis(5_000);
/// Comma separated span exporters.
pub const OTEL_TRACES_EXPORTER: &str = "OTEL_TRACES_EXPORTER";
/// Comma separated metric exporters.
pub const OTEL_METRICS_EXPORTER: &str = "OTEL_METRICS_EXPORTER";
/// Comma separated log exporters.
pub const OTEL_LOGS_EXPORTER: &str = "OTEL_LOGS_EXPORTER";

/// A destination for telemetry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExporterKind {
    /// Human readable dumps to stdout.
    Console,
    /// OTLP over gRPC.
    Otlp,
    /// Prometheus scrape endpoint, metrics only.
    Prometheus,
}

impl ExporterKind {
    fn as_str(self) -> &'static str {
        match self {
            ExporterKind::Console => "console",
            ExporterKind::Otlp => "otlp",
            ExporterKind::Prometheus => "prometheus",
        }
    }
}

impl fmt::Display for ExporterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExporterKind {
    type Err = String;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim().to_ascii_lowercase().as_str() {
            "console" | "stdout" => Ok(ExporterKind::Console),
            "otlp" => Ok(ExporterKind::Otlp),
            "prometheus" => Ok(ExporterKind::Prometheus),
            other => Err(other.to_owned()),
        }
    }
}

/// The telemetry signals.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Signal {
    /// Spans.
    Traces,
    /// Metric points.
    Metrics,
    /// Log records.
    Logs,
}

impl Signal {
    fn variable(self) -> &'static str {
        match self {
            Signal::Traces => OTEL_TRACES_EXPORTER,
            Signal::Metrics => OTEL_METRICS_EXPORTER,
            Signal::Logs => OTEL_LOGS_EXPORTER,
        }
    }

    fn default_exporters(self) -> Vec<ExporterKind> {
        match self {
            Signal::Traces | Signal::Logs => vec![ExporterKind::Console],
            Signal::Metrics => vec![ExporterKind::Console, ExporterKind::Prometheus],
        }
    }

    fn supports(self, exporter: ExporterKind) -> bool {
        exporter != ExporterKind::Prometheus || self == Signal::Metrics
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Signal::Traces => "traces",
            Signal::Metrics => "metrics",
            Signal::Logs => "logs",
        })
    }
}

/// Settings of a [`TelemetryPipeline`](crate::TelemetryPipeline).
///
/// [`from_env`](Self::from_env) reads the environment; every `with_*` method
/// overrides what was read. [`Default`] is the configuration of an empty
/// environment.
///
/// OTLP connection settings left unset are resolved by the OTLP exporters
/// from `OTEL_EXPORTER_OTLP_*` (and the per-signal variants), defaulting to
/// `http://localhost:4317`, plaintext and 10 seconds.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    service_name: String,
    service_version: String,
    metric_export_interval: Duration,
    traces_exporters: Vec<ExporterKind>,
    metrics_exporters: Vec<ExporterKind>,
    logs_exporters: Vec<ExporterKind>,
    otlp: ExportConfig,
    prometheus: ServerConfig,
    span_batch: BatchConfig,
    log_batch: BatchConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            service_name: OTEL_SERVICE_NAME_DEFAULT.to_owned(),
            service_version: OTEL_SERVICE_VERSION_DEFAULT.to_owned(),
            metric_export_interval: OTEL_METRIC_EXPORT_INTERVAL_DEFAULT,
            traces_exporters: Signal::Traces.default_exporters(),
            metrics_exporters: Signal::Metrics.default_exporters(),
            logs_exporters: Signal::Logs.default_exporters(),
            otlp: ExportConfig::default(),
            prometheus: ServerConfig::default(),
            span_batch: BatchConfig::default(),
            log_batch: BatchConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Reads the configuration from the environment.
    ///
    /// Unparseable values are logged and replaced by their default. Unknown
    /// exporter names, or an exporter that cannot carry the signal it is
    /// configured for, are an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(PipelineConfig {
            service_name: non_empty_var(OTEL_SERVICE_NAME)
                .unwrap_or_else(|| OTEL_SERVICE_NAME_DEFAULT.to_owned()),
            service_version: non_empty_var(OTEL_SERVICE_VERSION)
                .unwrap_or_else(|| OTEL_SERVICE_VERSION_DEFAULT.to_owned()),
            metric_export_interval: millis_from_env(OTEL_METRIC_EXPORT_INTERVAL)
                .unwrap_or(OTEL_METRIC_EXPORT_INTERVAL_DEFAULT),
            traces_exporters: exporters_from_env(Signal::Traces)?,
            metrics_exporters: exporters_from_env(Signal::Metrics)?,
            logs_exporters: exporters_from_env(Signal::Logs)?,
            otlp: ExportConfig::default(),
            prometheus: ServerConfig::from_env(),
            span_batch: BatchConfigBuilder::for_spans().build(),
            log_batch: BatchConfigBuilder::for_logs().build(),
        })
    }

    /// Sets the service name.
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Sets the service version.
    pub fn with_service_version(mut self, version: impl Into<String>) -> Self {
        self.service_version = version.into();
        self
    }

    /// Sets the push interval of the console and OTLP metric exporters. Zero
    /// is ignored.
    pub fn with_metric_export_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.metric_export_interval = interval;
        }
        self
    }

    /// Replaces the exporters of `signal`. An empty list disables the signal.
    pub fn with_exporters(
        mut self,
        signal: Signal,
        exporters: impl IntoIterator<Item = ExporterKind>,
    ) -> Result<Self, ConfigError> {
        let exporters = dedup(exporters);
        if let Some(unsupported) = exporters.iter().find(|kind| !signal.supports(**kind)) {
            return Err(ConfigError::UnsupportedExporter {
                signal,
                exporter: *unsupported,
            });
        }
        *self.exporters_mut(signal) = exporters;
        Ok(self)
    }

    /// Sets the OTLP connection settings.
    pub fn with_otlp(mut self, otlp: ExportConfig) -> Self {
        self.otlp = otlp;
        self
    }

    /// Sets where the Prometheus scrape endpoint listens.
    pub fn with_prometheus(mut self, prometheus: ServerConfig) -> Self {
        self.prometheus = prometheus;
        self
    }

    /// Sets the batching of the OTLP span exporter.
    pub fn with_span_batch(mut self, batch: BatchConfig) -> Self {
        self.span_batch = batch;
        self
    }

    /// Sets the batching of the OTLP log exporter.
    pub fn with_log_batch(mut self, batch: BatchConfig) -> Self {
        self.log_batch = batch;
        self
    }

    /// The service name.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// The service version.
    pub fn service_version(&self) -> &str {
        &self.service_version
    }

    /// The push interval of metric exporters.
    pub fn metric_export_interval(&self) -> Duration {
        self.metric_export_interval
    }

    /// The exporters of `signal`.
    pub fn exporters(&self, signal: Signal) -> &[ExporterKind] {
        match signal {
            Signal::Traces => &self.traces_exporters,
            Signal::Metrics => &self.metrics_exporters,
            Signal::Logs => &self.logs_exporters,
        }
    }

    /// The OTLP connection settings.
    pub fn otlp(&self) -> &ExportConfig {
        &self.otlp
    }

    /// The Prometheus endpoint settings.
    pub fn prometheus(&self) -> &ServerConfig {
        &self.prometheus
    }

    /// The span batching settings.
    pub fn span_batch(&self) -> &BatchConfig {
        &self.span_batch
    }

    /// The log batching settings.
    pub fn log_batch(&self) -> &BatchConfig {
        &self.log_batch
    }

    fn exporters_mut(&mut self, signal: Signal) -> &mut Vec<ExporterKind> {
        match signal {
            Signal::Traces => &mut self.traces_exporters,
            Signal::Metrics => &mut self.metrics_exporters,
            Signal::Logs => &mut self.logs_exporters,
        }
    }
}

fn non_empty_var(name: &'static str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn millis_from_env(name: &'static str) -> Option<Duration> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(millis) if millis > 0 => Some(Duration::from_millis(millis)),
        _ => {
            otel_warn!(
                name: "PipelineConfig.InvalidEnvValue",
                variable = name,
                value = raw.as_str(),
                message = "expected a positive number of milliseconds, using the default"
            );
            None
        }
    }
}

/// `none` disables the signal; an unset or blank variable keeps the default.
fn exporters_from_env(signal: Signal) -> Result<Vec<ExporterKind>, ConfigError> {
    let variable = signal.variable();
    let Some(raw) = non_empty_var(variable) else {
        return Ok(signal.default_exporters());
    };
    if raw.eq_ignore_ascii_case("none") {
        return Ok(Vec::new());
    }

    let mut exporters = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|name| !name.is_empty()) {
        let kind = name
            .parse::<ExporterKind>()
            .map_err(|name| ConfigError::UnknownExporter { variable, name })?;
        if !signal.supports(kind) {
            return Err(ConfigError::UnsupportedExporter {
                signal,
                exporter: kind,
            });
        }
        exporters.push(kind);
    }
    Ok(dedup(exporters))
}

fn dedup(exporters: impl IntoIterator<Item = ExporterKind>) -> Vec<ExporterKind> {
    let mut unique = Vec::new();
    for kind in exporters {
        if !unique.contains(&kind) {
            unique.push(kind);
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use telepipe_prometheus::{OTEL_EXPORTER_PROMETHEUS_HOST, OTEL_EXPORTER_PROMETHEUS_PORT};

    const VARIABLES: [&str; 8] = [
        OTEL_SERVICE_NAME,
        OTEL_SERVICE_VERSION,
        OTEL_METRIC_EXPORT_INTERVAL,
        OTEL_TRACES_EXPORTER,
        OTEL_METRICS_EXPORTER,
        OTEL_LOGS_EXPORTER,
        OTEL_EXPORTER_PROMETHEUS_HOST,
        OTEL_EXPORTER_PROMETHEUS_PORT,
    ];

    #[test]
    fn empty_environment_gives_defaults() {
        temp_env::with_vars_unset(VARIABLES, || {
            let config = PipelineConfig::from_env().unwrap();
            assert_eq!(config.service_name(), "unknown_service");
            assert_eq!(config.service_version(), "0.1.0");
            assert_eq!(config.metric_export_interval(), Duration::from_millis(5000));
            assert_eq!(config.exporters(Signal::Traces), [ExporterKind::Console]);
            assert_eq!(
                config.exporters(Signal::Metrics),
                [ExporterKind::Console, ExporterKind::Prometheus]
            );
            assert_eq!(config.exporters(Signal::Logs), [ExporterKind::Console]);
            assert_eq!(config.prometheus().port(), 8000);
            assert_eq!(config.span_batch().max_queue_size(), 2048);
            assert_eq!(config.span_batch().max_export_batch_size(), 512);
            assert_eq!(config.log_batch().scheduled_delay(), Duration::from_millis(5000));
        });
    }

    #[test]
    fn environment_is_read() {
        temp_env::with_vars(
            [
                (OTEL_SERVICE_NAME, Some("checkout")),
                (OTEL_SERVICE_VERSION, Some("2.4.1")),
                (OTEL_METRIC_EXPORT_INTERVAL, Some("1000")),
                (OTEL_TRACES_EXPORTER, Some("otlp,console")),
                (OTEL_METRICS_EXPORTER, Some("prometheus")),
                (OTEL_LOGS_EXPORTER, Some("none")),
                (OTEL_EXPORTER_PROMETHEUS_PORT, Some("9464")),
            ],
            || {
                let config = PipelineConfig::from_env().unwrap();
                assert_eq!(config.service_name(), "checkout");
                assert_eq!(config.service_version(), "2.4.1");
                assert_eq!(config.metric_export_interval(), Duration::from_secs(1));
                assert_eq!(
                    config.exporters(Signal::Traces),
                    [ExporterKind::Otlp, ExporterKind::Console]
                );
                assert_eq!(config.exporters(Signal::Metrics), [ExporterKind::Prometheus]);
                assert!(config.exporters(Signal::Logs).is_empty());
                assert_eq!(config.prometheus().port(), 9464);
            },
        );
    }

    #[rstest]
    #[case("")]
    #[case("soon")]
    #[case("0")]
    #[case("-5")]
    fn invalid_interval_falls_back(#[case] value: &str) {
        temp_env::with_var(OTEL_METRIC_EXPORT_INTERVAL, Some(value), || {
            let config = PipelineConfig::from_env().unwrap();
            assert_eq!(config.metric_export_interval(), Duration::from_millis(5000));
        });
    }

    #[test]
    fn unknown_exporter_is_an_error() {
        temp_env::with_var(OTEL_TRACES_EXPORTER, Some("console,zipkin"), || {
            assert!(matches!(
                PipelineConfig::from_env(),
                Err(ConfigError::UnknownExporter { variable: OTEL_TRACES_EXPORTER, ref name })
                    if name == "zipkin"
            ));
        });
    }

    #[test]
    fn prometheus_only_carries_metrics() {
        temp_env::with_var(OTEL_LOGS_EXPORTER, Some("prometheus"), || {
            assert!(matches!(
                PipelineConfig::from_env(),
                Err(ConfigError::UnsupportedExporter {
                    signal: Signal::Logs,
                    exporter: ExporterKind::Prometheus
                })
            ));
        });

        assert!(PipelineConfig::default()
            .with_exporters(Signal::Traces, [ExporterKind::Prometheus])
            .is_err());
    }

    #[test]
    fn overrides_win_over_environment() {
        temp_env::with_var(OTEL_SERVICE_NAME, Some("from-env"), || {
            let config = PipelineConfig::from_env()
                .unwrap()
                .with_service_name("from-code")
                .with_exporters(
                    Signal::Metrics,
                    [ExporterKind::Otlp, ExporterKind::Otlp, ExporterKind::Console],
                )
                .unwrap();
            assert_eq!(config.service_name(), "from-code");
            assert_eq!(
                config.exporters(Signal::Metrics),
                [ExporterKind::Otlp, ExporterKind::Console]
            );
        });
    }

    #[rstest]
    #[case("console", ExporterKind::Console)]
    #[case(" STDOUT ", ExporterKind::Console)]
    #[case("otlp", ExporterKind::Otlp)]
    #[case("Prometheus", ExporterKind::Prometheus)]
    fn exporter_names(#[case] name: &str, #[case] kind: ExporterKind) {
        assert_eq!(name.parse::<ExporterKind>(), Ok(kind));
    }
}
