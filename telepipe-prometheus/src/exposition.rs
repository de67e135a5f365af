//! Text exposition format 0.0.4.
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;

use telepipe::{otel_warn, InstrumentationScope, Key, KeyValue, Value};
use telepipe_sdk::metrics::data::{AggregatedMetrics, Metric, MetricData, ResourceMetrics};
use telepipe_sdk::metrics::Number;

use crate::utils;

/// The `Content-Type` of a scrape response.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

const TARGET_INFO_NAME: &str = "target_info";
const TARGET_INFO_DESCRIPTION: &str = "Target metadata";
const SCOPE_INFO_NAME: &str = "otel_scope_info";
const SCOPE_INFO_DESCRIPTION: &str = "Instrumentation Scope metadata";
const SCOPE_NAME_LABEL: &str = "otel_scope_name";
const SCOPE_VERSION_LABEL: &str = "otel_scope_version";

// prometheus counters MUST have a _total suffix by default
const COUNTER_SUFFIX: &str = "_total";

type Labels = Vec<(String, String)>;

/// Naming options applied while encoding.
#[derive(Clone, Debug, Default)]
pub(crate) struct EncoderConfig {
    pub(crate) without_units: bool,
    pub(crate) without_counter_suffixes: bool,
    pub(crate) without_target_info: bool,
    pub(crate) without_scope_info: bool,
    pub(crate) namespace: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MetricType {
    Counter,
    Gauge,
    Histogram,
}

impl MetricType {
    fn as_str(self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
            MetricType::Histogram => "histogram",
        }
    }
}

#[derive(Debug)]
struct Family {
    name: String,
    help: String,
    metric_type: MetricType,
    samples: String,
}

/// Metric families in first-seen order. Samples of one family are written
/// together under a single `HELP`/`TYPE` header, whichever scope they came
/// from.
#[derive(Debug, Default)]
struct Families {
    families: Vec<Family>,
    index: HashMap<String, usize>,
}

impl Families {
    /// The family to append samples to, `None` if the name is already taken
    /// by a family of another type.
    fn get_or_insert(
        &mut self,
        name: &str,
        help: &str,
        metric_type: MetricType,
    ) -> Option<&mut Family> {
        let existing = self.index.get(name).copied();
        match existing {
            Some(i) => {
                let family = &mut self.families[i];
                if family.metric_type != metric_type {
                    otel_warn!(
                        name: "Prometheus.MetricTypeConflict",
                        metric = name,
                        existing = family.metric_type.as_str(),
                        dropped = metric_type.as_str()
                    );
                    return None;
                }
                if family.help != help {
                    otel_warn!(
                        name: "Prometheus.DescriptionConflict",
                        metric = name,
                        message = "keeping the first description"
                    );
                }
                Some(family)
            }
            None => {
                self.index.insert(name.to_owned(), self.families.len());
                self.families.push(Family {
                    name: name.to_owned(),
                    help: help.to_owned(),
                    metric_type,
                    samples: String::new(),
                });
                self.families.last_mut()
            }
        }
    }

    fn write_to(&self, out: &mut String) {
        for family in self.families.iter().filter(|f| !f.samples.is_empty()) {
            write_header(out, &family.name, &family.help, family.metric_type);
            out.push_str(&family.samples);
        }
    }
}

/// Renders one collection.
pub(crate) fn encode(metrics: &ResourceMetrics, config: &EncoderConfig) -> String {
    let mut families = Families::default();
    let mut scope_info = String::new();

    for scope_metrics in &metrics.scope_metrics {
        let scope_labels = if config.without_scope_info {
            Vec::new()
        } else {
            scope_labels(&scope_metrics.scope)
        };
        if !config.without_scope_info && scope_metrics.scope.attributes().next().is_some() {
            let labels = point_labels(scope_metrics.scope.attributes(), &scope_labels);
            write_sample(&mut scope_info, SCOPE_INFO_NAME, &labels, None, 1.0);
        }

        for metric in &scope_metrics.metrics {
            match &metric.data {
                AggregatedMetrics::F64(data) => {
                    encode_metric(&mut families, config, metric, data, &scope_labels)
                }
                AggregatedMetrics::U64(data) => {
                    encode_metric(&mut families, config, metric, data, &scope_labels)
                }
                AggregatedMetrics::I64(data) => {
                    encode_metric(&mut families, config, metric, data, &scope_labels)
                }
            }
        }
    }

    let mut out = String::new();
    families.write_to(&mut out);
    if !scope_info.is_empty() {
        write_header(&mut out, SCOPE_INFO_NAME, SCOPE_INFO_DESCRIPTION, MetricType::Gauge);
        out.push_str(&scope_info);
    }
    if !config.without_target_info && !metrics.resource.is_empty() {
        write_header(&mut out, TARGET_INFO_NAME, TARGET_INFO_DESCRIPTION, MetricType::Gauge);
        let labels = labels(metrics.resource.iter(), &[]);
        write_sample(&mut out, TARGET_INFO_NAME, &labels, None, 1.0);
    }
    out
}

fn encode_metric<T: Number>(
    families: &mut Families,
    config: &EncoderConfig,
    metric: &Metric,
    data: &MetricData<T>,
    scope_labels: &[(String, String)],
) {
    let name = metric_name(metric, config);
    match data {
        MetricData::Sum(sum) => {
            let (name, metric_type) = match sum.is_monotonic {
                true if !config.without_counter_suffixes => {
                    (format!("{name}{COUNTER_SUFFIX}"), MetricType::Counter)
                }
                true => (name, MetricType::Counter),
                false => (name, MetricType::Gauge),
            };
            let Some(family) = families.get_or_insert(&name, &metric.description, metric_type)
            else {
                return;
            };
            for point in &sum.data_points {
                let labels = point_labels(&point.attributes, scope_labels);
                write_sample(&mut family.samples, &name, &labels, None, point.value.into_float());
            }
        }
        MetricData::Gauge(gauge) => {
            let Some(family) = families.get_or_insert(&name, &metric.description, MetricType::Gauge)
            else {
                return;
            };
            for point in &gauge.data_points {
                let labels = point_labels(&point.attributes, scope_labels);
                write_sample(&mut family.samples, &name, &labels, None, point.value.into_float());
            }
        }
        MetricData::Histogram(histogram) => {
            let Some(family) =
                families.get_or_insert(&name, &metric.description, MetricType::Histogram)
            else {
                return;
            };
            let bucket = format!("{name}_bucket");
            for point in &histogram.data_points {
                let labels = point_labels(&point.attributes, scope_labels);
                let mut cumulative = 0;
                for (bound, count) in point.bounds.iter().zip(&point.bucket_counts) {
                    cumulative += count;
                    write_sample(
                        &mut family.samples,
                        &bucket,
                        &labels,
                        Some(*bound),
                        cumulative as f64,
                    );
                }
                write_sample(
                    &mut family.samples,
                    &bucket,
                    &labels,
                    Some(f64::INFINITY),
                    point.count as f64,
                );
                write_sample(
                    &mut family.samples,
                    &format!("{name}_sum"),
                    &labels,
                    None,
                    point.sum.into_float(),
                );
                write_sample(
                    &mut family.samples,
                    &format!("{name}_count"),
                    &labels,
                    None,
                    point.count as f64,
                );
            }
        }
    }
}

fn metric_name(metric: &Metric, config: &EncoderConfig) -> String {
    let name = utils::sanitize_name(&metric.name);
    let namespace = config.namespace.as_deref().unwrap_or_default();
    let suffix = if config.without_units {
        None
    } else {
        utils::unit_suffix(&metric.unit)
    };
    match suffix {
        Some(suffix) if !name.ends_with(&format!("_{suffix}")) => {
            format!("{namespace}{name}_{suffix}")
        }
        _ => format!("{namespace}{name}"),
    }
}

fn scope_labels(scope: &InstrumentationScope) -> Labels {
    let mut labels = vec![(SCOPE_NAME_LABEL.to_owned(), scope.name().to_owned())];
    if let Some(version) = scope.version() {
        labels.push((SCOPE_VERSION_LABEL.to_owned(), version.to_owned()));
    }
    labels
}

fn point_labels<'a>(
    attributes: impl IntoIterator<Item = &'a KeyValue>,
    extra: &[(String, String)],
) -> Labels {
    labels(
        attributes.into_iter().map(|kv| (&kv.key, &kv.value)),
        extra,
    )
}

/// Sanitized, sorted attribute labels followed by `extra`.
///
/// Keys that collide after sanitization keep all their values, sorted and
/// joined with `;`.
fn labels<'a>(
    attributes: impl Iterator<Item = (&'a Key, &'a Value)>,
    extra: &[(String, String)],
) -> Labels {
    let mut by_key = BTreeMap::<String, Vec<String>>::new();
    for (key, value) in attributes {
        by_key
            .entry(utils::sanitize_label(key.as_str()))
            .or_default()
            .push(value.to_string());
    }

    by_key
        .into_iter()
        .map(|(key, mut values)| {
            values.sort_unstable();
            (key, values.join(";"))
        })
        .chain(extra.iter().cloned())
        .collect()
}

fn write_header(out: &mut String, name: &str, help: &str, metric_type: MetricType) {
    if !help.is_empty() {
        let _ = writeln!(out, "# HELP {name} {}", escape(help, false));
    }
    let _ = writeln!(out, "# TYPE {name} {}", metric_type.as_str());
}

fn write_sample(out: &mut String, name: &str, labels: &[(String, String)], le: Option<f64>, value: f64) {
    out.push_str(name);
    let le = le.map(|bound| ("le".to_owned(), format_value(bound)));
    if !labels.is_empty() || le.is_some() {
        out.push('{');
        for (i, (key, value)) in labels.iter().chain(le.iter()).enumerate() {
            if i > 0 {
                out.push(',');
            }
            let _ = write!(out, "{key}=\"{}\"", escape(value, true));
        }
        out.push('}');
    }
    let _ = writeln!(out, " {}", format_value(value));
}

/// Escapes `\` and newlines, plus `"` inside label values.
fn escape(s: &str, label_value: bool) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '"' if label_value => escaped.push_str("\\\""),
            c => escaped.push(c),
        }
    }
    escaped
}

fn format_value(v: f64) -> String {
    if v == f64::INFINITY {
        "+Inf".to_owned()
    } else if v == f64::NEG_INFINITY {
        "-Inf".to_owned()
    } else if v.is_nan() {
        "NaN".to_owned()
    } else {
        v.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;
    use telepipe_sdk::metrics::data::{
        Gauge, GaugeDataPoint, Histogram, HistogramDataPoint, ScopeMetrics, Sum, SumDataPoint,
    };
    use telepipe_sdk::metrics::Temporality;
    use telepipe_sdk::Resource;

    fn sum(values: &[(u64, &'static str)], is_monotonic: bool) -> AggregatedMetrics {
        AggregatedMetrics::U64(MetricData::Sum(Sum {
            data_points: values
                .iter()
                .map(|(value, route)| SumDataPoint {
                    attributes: vec![KeyValue::new("http.route", *route)],
                    value: *value,
                })
                .collect(),
            start_time: SystemTime::now(),
            time: SystemTime::now(),
            temporality: Temporality::Cumulative,
            is_monotonic,
        }))
    }

    fn metric(name: &'static str, unit: &'static str, data: AggregatedMetrics) -> Metric {
        Metric {
            name: name.into(),
            description: "".into(),
            unit: unit.into(),
            data,
        }
    }

    fn single_scope(metrics: Vec<Metric>) -> ResourceMetrics {
        ResourceMetrics {
            resource: Resource::empty(),
            scope_metrics: vec![ScopeMetrics {
                scope: InstrumentationScope::builder("http").build(),
                metrics,
            }],
        }
    }

    #[test]
    fn counter_gets_total_suffix() {
        let mut counter = metric("traffic_volume", "request", sum(&[(3, "/")], true));
        counter.description = "total volume of requests to an endpoint".into();

        let text = encode(&single_scope(vec![counter]), &EncoderConfig::default());
        assert_eq!(
            text,
            "# HELP traffic_volume_total total volume of requests to an endpoint\n\
             # TYPE traffic_volume_total counter\n\
             traffic_volume_total{http_route=\"/\",otel_scope_name=\"http\"} 3\n"
        );
    }

    #[test]
    fn up_down_sum_is_a_gauge() {
        let usage = metric("process.memory.usage", "By", sum(&[(512, "/")], false));
        let config = EncoderConfig {
            without_scope_info: true,
            ..Default::default()
        };

        let text = encode(&single_scope(vec![usage]), &config);
        assert_eq!(
            text,
            "# TYPE process_memory_usage_bytes gauge\n\
             process_memory_usage_bytes{http_route=\"/\"} 512\n"
        );
    }

    #[test]
    fn histogram_buckets_are_cumulative() {
        let histogram = metric(
            "http.server.request.duration",
            "s",
            AggregatedMetrics::F64(MetricData::Histogram(Histogram {
                data_points: vec![HistogramDataPoint {
                    attributes: vec![],
                    count: 3,
                    bounds: vec![1.0, 5.0],
                    bucket_counts: vec![1, 1, 1],
                    min: Some(0.5),
                    max: Some(10.0),
                    sum: 13.5,
                }],
                start_time: SystemTime::now(),
                time: SystemTime::now(),
                temporality: Temporality::Cumulative,
            })),
        );
        let config = EncoderConfig {
            without_scope_info: true,
            ..Default::default()
        };

        let text = encode(&single_scope(vec![histogram]), &config);
        assert_eq!(
            text,
            "# TYPE http_server_request_duration_seconds histogram\n\
             http_server_request_duration_seconds_bucket{le=\"1\"} 1\n\
             http_server_request_duration_seconds_bucket{le=\"5\"} 2\n\
             http_server_request_duration_seconds_bucket{le=\"+Inf\"} 3\n\
             http_server_request_duration_seconds_sum 13.5\n\
             http_server_request_duration_seconds_count 3\n"
        );
    }

    #[test]
    fn same_family_across_scopes_shares_one_header() {
        let mut metrics = single_scope(vec![metric("hits", "", sum(&[(1, "/a")], true))]);
        metrics.scope_metrics.push(ScopeMetrics {
            scope: InstrumentationScope::builder("jobs")
                .with_version("1.2.0")
                .build(),
            metrics: vec![metric("hits", "", sum(&[(2, "/b")], true))],
        });

        let text = encode(&metrics, &EncoderConfig::default());
        assert_eq!(
            text,
            "# TYPE hits_total counter\n\
             hits_total{http_route=\"/a\",otel_scope_name=\"http\"} 1\n\
             hits_total{http_route=\"/b\",otel_scope_name=\"jobs\",otel_scope_version=\"1.2.0\"} 2\n"
        );
    }

    #[test]
    fn conflicting_type_is_dropped() {
        let gauge = metric(
            "hits_total",
            "",
            AggregatedMetrics::F64(MetricData::Gauge(Gauge {
                data_points: vec![GaugeDataPoint {
                    attributes: vec![],
                    value: 1.5,
                }],
                start_time: None,
                time: SystemTime::now(),
            })),
        );
        let counter = metric("hits", "", sum(&[(1, "/")], true));
        let config = EncoderConfig {
            without_scope_info: true,
            ..Default::default()
        };

        let text = encode(&single_scope(vec![gauge, counter]), &config);
        assert_eq!(text, "# TYPE hits_total gauge\nhits_total 1.5\n");
    }

    #[test]
    fn namespace_and_target_info() {
        let mut metrics = single_scope(vec![metric("hits", "", sum(&[(1, "/")], true))]);
        metrics.resource = Resource::builder_empty()
            .with_service_name("checkout")
            .build();
        let config = EncoderConfig {
            without_scope_info: true,
            without_counter_suffixes: true,
            namespace: Some("shop_".into()),
            ..Default::default()
        };

        let text = encode(&metrics, &config);
        assert_eq!(
            text,
            "# TYPE shop_hits counter\n\
             shop_hits{http_route=\"/\"} 1\n\
             # HELP target_info Target metadata\n\
             # TYPE target_info gauge\n\
             target_info{service_name=\"checkout\"} 1\n"
        );
    }

    #[test]
    fn scope_attributes_produce_scope_info() {
        let mut metrics = single_scope(Vec::new());
        metrics.scope_metrics[0].scope = InstrumentationScope::builder("http")
            .with_attributes([KeyValue::new("deployment.environment", "test")])
            .build();

        let text = encode(&metrics, &EncoderConfig::default());
        assert_eq!(
            text,
            "# HELP otel_scope_info Instrumentation Scope metadata\n\
             # TYPE otel_scope_info gauge\n\
             otel_scope_info{deployment_environment=\"test\",otel_scope_name=\"http\"} 1\n"
        );
    }

    #[test]
    fn colliding_label_keys_are_joined() {
        let attributes = [KeyValue::new("a.b", "2"), KeyValue::new("a_b", "1")];
        assert_eq!(
            point_labels(&attributes, &[]),
            vec![("a_b".to_owned(), "1;2".to_owned())]
        );
    }

    #[test]
    fn escaping() {
        assert_eq!(escape("with\"quote\nand\\slash", true), "with\\\"quote\\nand\\\\slash");
        assert_eq!(escape("with\"quote", false), "with\"quote");
        assert_eq!(format_value(f64::NEG_INFINITY), "-Inf");
        assert_eq!(format_value(0.25), "0.25");
    }
}
