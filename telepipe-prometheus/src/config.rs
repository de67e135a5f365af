use std::sync::Arc;

use telepipe_sdk::metrics::ManualReader;

use crate::exposition::EncoderConfig;
use crate::PrometheusExporter;

/// [PrometheusExporter] configuration options
#[derive(Debug, Default)]
pub struct ExporterBuilder {
    config: EncoderConfig,
}

impl ExporterBuilder {
    /// Disables exporter's addition of unit suffixes to metric names.
    ///
    /// By default, metric names include a unit suffix to follow Prometheus naming
    /// conventions. For example, the histogram `http.server.request.duration`
    /// with unit `s` becomes `http_server_request_duration_seconds`.
    pub fn without_units(mut self) -> Self {
        self.config.without_units = true;
        self
    }

    /// Disables exporter's addition `_total` suffixes on counters.
    pub fn without_counter_suffixes(mut self) -> Self {
        self.config.without_counter_suffixes = true;
        self
    }

    /// Configures the exporter to not export the resource `target_info` metric.
    pub fn without_target_info(mut self) -> Self {
        self.config.without_target_info = true;
        self
    }

    /// Configures the exporter to not export the `otel_scope_info` metric nor
    /// add `otel_scope_name`/`otel_scope_version` labels to every sample.
    pub fn without_scope_info(mut self) -> Self {
        self.config.without_scope_info = true;
        self
    }

    /// Configures the exporter to prefix metrics with the given namespace.
    ///
    /// `target_info` and `otel_scope_info` are not prefixed.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        let mut namespace = namespace.into();

        // namespace and metric names should be separated with an underscore
        if !namespace.ends_with('_') {
            namespace.push('_')
        }

        self.config.namespace = Some(namespace);
        self
    }

    /// Creates a new [PrometheusExporter] from this configuration.
    pub fn build(self) -> PrometheusExporter {
        PrometheusExporter {
            reader: ManualReader::default(),
            config: Arc::new(self.config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_gets_separator() {
        let builder = ExporterBuilder::default().with_namespace("shop");
        assert_eq!(builder.config.namespace.as_deref(), Some("shop_"));

        let builder = ExporterBuilder::default().with_namespace("shop_");
        assert_eq!(builder.config.namespace.as_deref(), Some("shop_"));
    }
}
