//! What a metric reader collects.
//!
//! One collection is a [`ResourceMetrics`]: the meter provider's resource and,
//! per meter, the streams that had at least one point. Points of a stream are
//! in no particular order. Their attributes are sorted by key with duplicate
//! keys removed, so equal sets compare equal.

use std::{borrow::Cow, time::SystemTime};

use telepipe::{InstrumentationScope, KeyValue};

use crate::Resource;

/// How sums and histograms accumulate between collections.
///
/// Streams only ever accumulate since their start time; there is no delta
/// mode.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Temporality {
    /// Every collection reports the total since the stream started.
    #[default]
    Cumulative,
}

/// Everything one collection produced.
#[derive(Debug, Clone)]
pub struct ResourceMetrics {
    /// Resource of the meter provider.
    pub resource: Resource,
    /// One entry per meter that had data.
    pub scope_metrics: Vec<ScopeMetrics>,
}

impl Default for ResourceMetrics {
    fn default() -> Self {
        ResourceMetrics {
            resource: Resource::empty(),
            scope_metrics: Vec::new(),
        }
    }
}

/// The streams of one meter.
#[derive(Default, Debug, Clone)]
pub struct ScopeMetrics {
    /// Scope the meter was created with.
    pub scope: InstrumentationScope,
    /// Streams with at least one point; dropped streams never appear.
    pub metrics: Vec<Metric>,
}

/// One stream, named and described the way views left it.
///
/// An instrument matched by several views yields one stream per view.
#[derive(Debug, Clone)]
pub struct Metric {
    /// Export name: a renaming view's name, else the instrument name.
    pub name: Cow<'static, str>,
    /// Description, possibly overridden by a view.
    pub description: Cow<'static, str>,
    /// Unit, possibly empty.
    pub unit: Cow<'static, str>,
    /// The aggregated points.
    pub data: AggregatedMetrics,
}

/// Stream data keyed by the instrument's value type.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregatedMetrics {
    /// `f64` instruments.
    F64(MetricData<f64>),
    /// `u64` instruments.
    U64(MetricData<u64>),
    /// `i64` instruments.
    I64(MetricData<i64>),
}

/// Stream data by aggregation.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricData<T> {
    /// Last value per attribute set.
    Gauge(Gauge<T>),
    /// Running total per attribute set.
    Sum(Sum<T>),
    /// Bucketed distribution per attribute set.
    Histogram(Histogram<T>),
}

impl From<MetricData<f64>> for AggregatedMetrics {
    fn from(value: MetricData<f64>) -> Self {
        AggregatedMetrics::F64(value)
    }
}

impl From<MetricData<i64>> for AggregatedMetrics {
    fn from(value: MetricData<i64>) -> Self {
        AggregatedMetrics::I64(value)
    }
}

impl From<MetricData<u64>> for AggregatedMetrics {
    fn from(value: MetricData<u64>) -> Self {
        AggregatedMetrics::U64(value)
    }
}

impl<T> From<Gauge<T>> for MetricData<T> {
    fn from(value: Gauge<T>) -> Self {
        MetricData::Gauge(value)
    }
}

impl<T> From<Sum<T>> for MetricData<T> {
    fn from(value: Sum<T>) -> Self {
        MetricData::Sum(value)
    }
}

impl<T> From<Histogram<T>> for MetricData<T> {
    fn from(value: Histogram<T>) -> Self {
        MetricData::Histogram(value)
    }
}

/// The last value observed for one attribute set.
#[derive(Debug, Clone, PartialEq)]
pub struct GaugeDataPoint<T> {
    /// Sorted, deduplicated attributes; `otel.metric.overflow=true` marks
    /// the overflow stream.
    pub attributes: Vec<KeyValue>,
    /// Last recorded or sampled value.
    pub value: T,
}

/// Gauge stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Gauge<T> {
    /// One point per attribute set.
    pub data_points: Vec<GaugeDataPoint<T>>,
    /// When the stream was created.
    pub start_time: Option<SystemTime>,
    /// Collection time.
    pub time: SystemTime,
}

/// The running total of one attribute set.
#[derive(Debug, Clone, PartialEq)]
pub struct SumDataPoint<T> {
    /// Sorted, deduplicated attributes; `otel.metric.overflow=true` marks
    /// the overflow stream.
    pub attributes: Vec<KeyValue>,
    /// Total since [`Sum::start_time`], or the last sampled total for
    /// observable counters.
    pub value: T,
}

/// Counter and up-down counter stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Sum<T> {
    /// One point per attribute set.
    pub data_points: Vec<SumDataPoint<T>>,
    /// When the stream was created.
    pub start_time: SystemTime,
    /// Collection time.
    pub time: SystemTime,
    /// Always [`Temporality::Cumulative`].
    pub temporality: Temporality,
    /// `true` for counters, `false` for up-down counters.
    pub is_monotonic: bool,
}

/// Histogram stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram<T> {
    /// One point per attribute set.
    pub data_points: Vec<HistogramDataPoint<T>>,
    /// When the stream was created.
    pub start_time: SystemTime,
    /// Collection time.
    pub time: SystemTime,
    /// Always [`Temporality::Cumulative`].
    pub temporality: Temporality,
}

/// The distribution of one attribute set.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramDataPoint<T> {
    /// Sorted, deduplicated attributes.
    pub attributes: Vec<KeyValue>,
    /// Number of recorded values.
    pub count: u64,
    /// Upper bucket bounds from the view or instrument, without the implicit
    /// `+Inf` bound.
    pub bounds: Vec<f64>,
    /// `bounds.len() + 1` counts; a value equal to a bound lands in that
    /// bound's bucket.
    pub bucket_counts: Vec<u64>,

    /// Smallest value, `None` when min/max recording is off.
    pub min: Option<T>,
    /// Largest value, `None` when min/max recording is off.
    pub max: Option<T>,
    /// Sum of all values.
    pub sum: T,
}

impl ResourceMetrics {
    /// Finds the first metric with the given name in any scope.
    pub fn metric(&self, name: &str) -> Option<&Metric> {
        self.scope_metrics
            .iter()
            .flat_map(|scope| scope.metrics.iter())
            .find(|metric| metric.name == name)
    }
}
