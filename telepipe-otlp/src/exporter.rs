//! Exporter builders and the configuration shared by all signals.
use crate::Error;
use std::env;
use std::fmt;
use std::time::Duration;
use telepipe::{otel_debug, otel_warn};
use tonic::metadata::{Ascii, KeyAndValueRef, MetadataKey, MetadataMap, MetadataValue};
use tonic::transport::Channel;
#[cfg(feature = "tls")]
use tonic::transport::ClientTlsConfig;

/// Target to which the exporter is going to send signals.
pub const OTEL_EXPORTER_OTLP_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
/// Default target to which the exporter is going to send signals.
pub const OTEL_EXPORTER_OTLP_ENDPOINT_DEFAULT: &str = "http://localhost:4317";
/// Whether to connect without TLS, `true` by default.
pub const OTEL_EXPORTER_OTLP_INSECURE: &str = "OTEL_EXPORTER_OTLP_INSECURE";
/// Max waiting time for the backend to process each batch, in milliseconds.
pub const OTEL_EXPORTER_OTLP_TIMEOUT: &str = "OTEL_EXPORTER_OTLP_TIMEOUT";
/// Default max waiting time for the backend to process each batch.
pub const OTEL_EXPORTER_OTLP_TIMEOUT_DEFAULT: Duration = Duration::from_millis(10000);
/// Key-value pairs sent as gRPC metadata with every export, as `k1=v1,k2=v2`.
pub const OTEL_EXPORTER_OTLP_HEADERS: &str = "OTEL_EXPORTER_OTLP_HEADERS";

/// Connection settings common to the span, metric and log exporters.
///
/// Values left as `None` are taken from the environment, then from the
/// defaults. Programmatic values always win over the environment.
#[derive(Debug, Default, Clone)]
pub struct ExportConfig {
    /// The address of the OTLP collector.
    pub endpoint: Option<String>,
    /// Plaintext HTTP/2 when `true`, TLS when `false`.
    pub insecure: Option<bool>,
    /// Deadline for each export call.
    pub timeout: Option<Duration>,
}

/// gRPC specific settings.
#[derive(Default)]
pub(crate) struct TonicConfig {
    metadata: MetadataMap,
    #[cfg(feature = "tls")]
    tls_config: Option<ClientTlsConfig>,
}

/// Builder state shared by every signal's exporter builder.
#[derive(Default)]
pub struct TonicExporterBuilder {
    pub(crate) tonic_config: TonicConfig,
    pub(crate) exporter_config: ExportConfig,
}

impl fmt::Debug for TonicExporterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TonicExporterBuilder")
            .field("exporter_config", &self.exporter_config)
            .field("metadata", &self.tonic_config.metadata.len())
            .finish()
    }
}

impl TonicExporterBuilder {
    /// Resolves the configuration and creates a lazily connecting channel.
    ///
    /// Must run inside a Tokio runtime, which then drives the connection for
    /// the lifetime of the exporter.
    pub(crate) fn build_channel(
        self,
        signal_endpoint_var: &str,
        signal_timeout_var: &str,
    ) -> Result<(Channel, MetadataMap), Error> {
        let config = self.exporter_config;
        let endpoint = resolve_endpoint(signal_endpoint_var, config.endpoint);
        let timeout = resolve_timeout(signal_timeout_var, config.timeout);
        let insecure = resolve_insecure(config.insecure);

        let mut metadata = headers_from_env();
        for entry in self.tonic_config.metadata.iter() {
            if let KeyAndValueRef::Ascii(key, value) = entry {
                metadata.insert(key.clone(), value.clone());
            }
        }

        if tokio::runtime::Handle::try_current().is_err() {
            return Err(Error::NoRuntime);
        }

        let channel_endpoint = Channel::from_shared(endpoint.clone())?
            .timeout(timeout)
            .connect_timeout(timeout);

        let channel_endpoint = if insecure {
            channel_endpoint
        } else {
            #[cfg(feature = "tls")]
            {
                let tls_config = self
                    .tonic_config
                    .tls_config
                    .unwrap_or_else(|| ClientTlsConfig::new().with_native_roots());
                channel_endpoint.tls_config(tls_config)?
            }
            #[cfg(not(feature = "tls"))]
            {
                return Err(Error::InvalidConfig {
                    name: "insecure",
                    reason: "a secure connection requires the `tls` feature".into(),
                });
            }
        };

        otel_debug!(
            name: "TonicChannelBuilt",
            endpoint = endpoint.as_str(),
            insecure = insecure,
            timeout_in_millisecs = timeout.as_millis() as u64
        );
        Ok((channel_endpoint.connect_lazy(), metadata))
    }
}

/// Provide access to the [`ExportConfig`] field within the exporter builders.
pub trait HasExportConfig {
    /// Return a mutable reference to the [`ExportConfig`] within the exporter builders.
    fn export_config(&mut self) -> &mut ExportConfig;
}

/// Expose methods to override [`ExportConfig`].
///
/// Implemented for every builder implementing [`HasExportConfig`].
///
/// ```
/// use telepipe_otlp::WithExportConfig;
///
/// let builder = telepipe_otlp::SpanExporter::builder()
///     .with_endpoint("http://collector:4317")
///     .with_insecure(true);
/// # drop(builder);
/// ```
pub trait WithExportConfig {
    /// Set the address of the OTLP collector.
    fn with_endpoint<T: Into<String>>(self, endpoint: T) -> Self;
    /// Choose between plaintext (`true`) and TLS (`false`).
    fn with_insecure(self, insecure: bool) -> Self;
    /// Set the deadline of each export call.
    fn with_timeout(self, timeout: Duration) -> Self;
    /// Replace the whole export config.
    fn with_export_config(self, export_config: ExportConfig) -> Self;
}

impl<B: HasExportConfig> WithExportConfig for B {
    fn with_endpoint<T: Into<String>>(mut self, endpoint: T) -> Self {
        self.export_config().endpoint = Some(endpoint.into());
        self
    }

    fn with_insecure(mut self, insecure: bool) -> Self {
        self.export_config().insecure = Some(insecure);
        self
    }

    fn with_timeout(mut self, timeout: Duration) -> Self {
        self.export_config().timeout = Some(timeout);
        self
    }

    fn with_export_config(mut self, export_config: ExportConfig) -> Self {
        *self.export_config() = export_config;
        self
    }
}

/// Provide access to the gRPC settings within the exporter builders.
pub trait HasTonicConfig {
    /// Return a mutable reference to the builder's gRPC settings.
    #[doc(hidden)]
    fn tonic_builder(&mut self) -> &mut TonicExporterBuilder;
}

/// Expose methods to set gRPC metadata and TLS options.
pub trait WithTonicConfig {
    /// Metadata sent with every export. Entries from
    /// `OTEL_EXPORTER_OTLP_HEADERS` are kept unless overridden here.
    fn with_metadata(self, metadata: MetadataMap) -> Self;

    /// TLS settings used when the exporter is not insecure. Native root
    /// certificates are used when unset.
    #[cfg(feature = "tls")]
    fn with_tls_config(self, tls_config: ClientTlsConfig) -> Self;
}

impl<B: HasTonicConfig> WithTonicConfig for B {
    fn with_metadata(mut self, metadata: MetadataMap) -> Self {
        self.tonic_builder().tonic_config.metadata = metadata;
        self
    }

    #[cfg(feature = "tls")]
    fn with_tls_config(mut self, tls_config: ClientTlsConfig) -> Self {
        self.tonic_builder().tonic_config.tls_config = Some(tls_config);
        self
    }
}

fn resolve_endpoint(signal_endpoint_var: &str, provided: Option<String>) -> String {
    provided
        .filter(|endpoint| !endpoint.is_empty())
        .or_else(|| env::var(signal_endpoint_var).ok())
        .or_else(|| env::var(OTEL_EXPORTER_OTLP_ENDPOINT).ok())
        .filter(|endpoint| !endpoint.is_empty())
        .unwrap_or_else(|| OTEL_EXPORTER_OTLP_ENDPOINT_DEFAULT.to_string())
}

fn resolve_timeout(signal_timeout_var: &str, provided: Option<Duration>) -> Duration {
    if let Some(timeout) = provided {
        return timeout;
    }
    [signal_timeout_var, OTEL_EXPORTER_OTLP_TIMEOUT]
        .into_iter()
        .find_map(|var| {
            let raw = env::var(var).ok()?;
            match raw.trim().parse::<u64>() {
                Ok(millis) => Some(Duration::from_millis(millis)),
                Err(_) => {
                    otel_warn!(
                        name: "ExportConfig.InvalidTimeout",
                        variable = var,
                        value = raw.as_str()
                    );
                    None
                }
            }
        })
        .unwrap_or(OTEL_EXPORTER_OTLP_TIMEOUT_DEFAULT)
}

fn resolve_insecure(provided: Option<bool>) -> bool {
    if let Some(insecure) = provided {
        return insecure;
    }
    match env::var(OTEL_EXPORTER_OTLP_INSECURE) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" => true,
            "false" => false,
            _ => {
                otel_warn!(
                    name: "ExportConfig.InvalidInsecure",
                    value = raw.as_str(),
                    message = "expected `true` or `false`, using `true`"
                );
                true
            }
        },
        Err(_) => true,
    }
}

fn headers_from_env() -> MetadataMap {
    let mut metadata = MetadataMap::new();
    let Ok(raw) = env::var(OTEL_EXPORTER_OTLP_HEADERS) else {
        return metadata;
    };
    for (key, value) in parse_header_string(&raw) {
        match (
            MetadataKey::<Ascii>::from_bytes(key.to_ascii_lowercase().as_bytes()),
            MetadataValue::<Ascii>::try_from(value.as_str()),
        ) {
            (Ok(key), Ok(value)) => {
                metadata.insert(key, value);
            }
            _ => {
                otel_warn!(name: "ExportConfig.InvalidHeader", header = key);
            }
        }
    }
    metadata
}

fn parse_header_string(value: &str) -> impl Iterator<Item = (&str, String)> {
    value
        .split_terminator(',')
        .map(str::trim)
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let value = value.trim();
            let decoded = percent_encoding::percent_decode_str(value)
                .decode_utf8()
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| value.to_string());
            Some((key.trim(), decoded))
        })
        .filter(|(key, value)| !key.is_empty() && !value.is_empty())
}
