use std::collections::HashSet;
use std::sync::Arc;
use std::time::SystemTime;

use telepipe::{Key, KeyValue};

use crate::metrics::data::{self, AggregatedMetrics, MetricData, Temporality};
use crate::metrics::Number;

use super::{Aggregator, ComputeAggregation, Measure, ValueMap};

struct Buckets<T> {
    counts: Vec<u64>,
    count: u64,
    total: T,
    min: T,
    max: T,
}

impl<T: Number> Aggregator for Buckets<T> {
    /// Number of buckets
    type InitConfig = usize;
    /// Value and bucket index
    type PreComputedValue = (T, usize);

    fn create(count: &usize) -> Self {
        Buckets {
            counts: vec![0; *count],
            count: 0,
            total: T::default(),
            min: T::default(),
            max: T::default(),
        }
    }

    fn update(&mut self, (value, index): (T, usize)) {
        self.counts[index] += 1;
        self.count += 1;
        self.total = self.total.add(value);
        if self.count == 1 || value < self.min {
            self.min = value;
        }
        if self.count == 1 || value > self.max {
            self.max = value;
        }
    }
}

/// Summarizes a set of measurements as a histogram with explicitly defined
/// buckets.
pub(crate) struct Histogram<T: Number> {
    value_map: ValueMap<Buckets<T>>,
    bounds: Vec<f64>,
    record_min_max: bool,
    start: SystemTime,
}

impl<T: Number> Histogram<T> {
    /// `boundaries` must be sorted and free of NaN, which view validation
    /// guarantees.
    pub(crate) fn new(
        boundaries: Vec<f64>,
        record_min_max: bool,
        filter: Option<Arc<HashSet<Key>>>,
    ) -> Self {
        Histogram {
            value_map: ValueMap::new(boundaries.len() + 1, filter),
            bounds: boundaries,
            record_min_max,
            start: SystemTime::now(),
        }
    }
}

impl<T: Number> Measure<T> for Histogram<T> {
    fn call(&self, measurement: T, attrs: &[KeyValue]) {
        let f = measurement.into_float();
        // This search will return an index in the range `[0, bounds.len()]`, where
        // it will return `bounds.len()` if value is greater than the last element
        // of `bounds`. This aligns with the buckets in that the length of buckets
        // is `bounds.len()+1`, with the last bucket representing:
        // `(bounds[bounds.len()-1], +∞)`.
        let index = self.bounds.partition_point(|&x| x < f);
        self.value_map.measure((measurement, index), attrs);
    }
}

impl<T: Number> ComputeAggregation for Histogram<T> {
    fn compute_aggregation(&self) -> Option<AggregatedMetrics> {
        let data_points = self
            .value_map
            .collect(|attributes, buckets| data::HistogramDataPoint {
                attributes: attributes.as_slice().to_vec(),
                count: buckets.count,
                bounds: self.bounds.clone(),
                bucket_counts: buckets.counts.clone(),
                min: self.record_min_max.then_some(buckets.min),
                max: self.record_min_max.then_some(buckets.max),
                sum: buckets.total,
            });
        if data_points.is_empty() {
            return None;
        }

        Some(T::into_aggregated(MetricData::Histogram(data::Histogram {
            data_points,
            start_time: self.start,
            time: SystemTime::now(),
            temporality: Temporality::Cumulative,
        })))
    }
}
