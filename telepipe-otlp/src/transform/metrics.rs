use crate::transform::common::{instrumentation_scope, key_values, to_nanos, ResourceAttributesWithSchema};
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::metrics::v1::{
    metric, number_data_point, AggregationTemporality, Gauge as ProtoGauge,
    Histogram as ProtoHistogram, HistogramDataPoint as ProtoHistogramDataPoint,
    Metric as ProtoMetric, NumberDataPoint, ResourceMetrics as ProtoResourceMetrics,
    ScopeMetrics as ProtoScopeMetrics, Sum as ProtoSum,
};
use telepipe_sdk::metrics::data::{
    AggregatedMetrics, Gauge, Histogram, Metric, MetricData, ResourceMetrics, Sum, Temporality,
};

/// Numbers the wire format can carry as a data point value.
trait Numeric: Copy {
    fn to_value(self) -> number_data_point::Value;
    fn to_f64(self) -> f64;
}

impl Numeric for u64 {
    fn to_value(self) -> number_data_point::Value {
        number_data_point::Value::AsInt(i64::try_from(self).unwrap_or(i64::MAX))
    }
    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl Numeric for i64 {
    fn to_value(self) -> number_data_point::Value {
        number_data_point::Value::AsInt(self)
    }
    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl Numeric for f64 {
    fn to_value(self) -> number_data_point::Value {
        number_data_point::Value::AsDouble(self)
    }
    fn to_f64(self) -> f64 {
        self
    }
}

fn temporality(temporality: Temporality) -> i32 {
    match temporality {
        Temporality::Cumulative => AggregationTemporality::Cumulative as i32,
        _ => AggregationTemporality::Unspecified as i32,
    }
}

pub(crate) fn resource_metrics_to_request(
    metrics: &ResourceMetrics,
    resource: &ResourceAttributesWithSchema,
) -> ExportMetricsServiceRequest {
    ExportMetricsServiceRequest {
        resource_metrics: vec![ProtoResourceMetrics {
            resource: Some(resource.to_proto()),
            scope_metrics: metrics
                .scope_metrics
                .iter()
                .map(|scope_metrics| ProtoScopeMetrics {
                    scope: Some(instrumentation_scope(&scope_metrics.scope)),
                    metrics: scope_metrics.metrics.iter().map(metric_to_proto).collect(),
                    schema_url: scope_metrics
                        .scope
                        .schema_url()
                        .unwrap_or_default()
                        .to_string(),
                })
                .collect(),
            schema_url: resource.schema_url(),
        }],
    }
}

fn metric_to_proto(metric: &Metric) -> ProtoMetric {
    let data = match &metric.data {
        AggregatedMetrics::F64(data) => data_to_proto(data),
        AggregatedMetrics::U64(data) => data_to_proto(data),
        AggregatedMetrics::I64(data) => data_to_proto(data),
    };
    ProtoMetric {
        name: metric.name.to_string(),
        description: metric.description.to_string(),
        unit: metric.unit.to_string(),
        data: Some(data),
        ..Default::default()
    }
}

fn data_to_proto<T: Numeric>(data: &MetricData<T>) -> metric::Data {
    match data {
        MetricData::Gauge(gauge) => metric::Data::Gauge(gauge_to_proto(gauge)),
        MetricData::Sum(sum) => metric::Data::Sum(sum_to_proto(sum)),
        MetricData::Histogram(histogram) => metric::Data::Histogram(histogram_to_proto(histogram)),
    }
}

fn gauge_to_proto<T: Numeric>(gauge: &Gauge<T>) -> ProtoGauge {
    ProtoGauge {
        data_points: gauge
            .data_points
            .iter()
            .map(|point| NumberDataPoint {
                attributes: key_values(&point.attributes),
                start_time_unix_nano: gauge.start_time.map(to_nanos).unwrap_or_default(),
                time_unix_nano: to_nanos(gauge.time),
                value: Some(point.value.to_value()),
                ..Default::default()
            })
            .collect(),
    }
}

fn sum_to_proto<T: Numeric>(sum: &Sum<T>) -> ProtoSum {
    ProtoSum {
        data_points: sum
            .data_points
            .iter()
            .map(|point| NumberDataPoint {
                attributes: key_values(&point.attributes),
                start_time_unix_nano: to_nanos(sum.start_time),
                time_unix_nano: to_nanos(sum.time),
                value: Some(point.value.to_value()),
                ..Default::default()
            })
            .collect(),
        aggregation_temporality: temporality(sum.temporality),
        is_monotonic: sum.is_monotonic,
    }
}

fn histogram_to_proto<T: Numeric>(histogram: &Histogram<T>) -> ProtoHistogram {
    ProtoHistogram {
        data_points: histogram
            .data_points
            .iter()
            .map(|point| ProtoHistogramDataPoint {
                attributes: key_values(&point.attributes),
                start_time_unix_nano: to_nanos(histogram.start_time),
                time_unix_nano: to_nanos(histogram.time),
                count: point.count,
                sum: Some(point.sum.to_f64()),
                bucket_counts: point.bucket_counts.clone(),
                explicit_bounds: point.bounds.clone(),
                min: point.min.map(Numeric::to_f64),
                max: point.max.map(Numeric::to_f64),
                ..Default::default()
            })
            .collect(),
        aggregation_temporality: temporality(histogram.temporality),
    }
}
