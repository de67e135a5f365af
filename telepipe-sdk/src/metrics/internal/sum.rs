use std::collections::HashSet;
use std::sync::Arc;
use std::time::SystemTime;

use telepipe::{Key, KeyValue};

use crate::metrics::data::{self, AggregatedMetrics, MetricData, Temporality};
use crate::metrics::Number;

use super::{Aggregator, ComputeAggregation, Measure, ValueMap};

struct Increment<T> {
    value: T,
}

impl<T: Number> Aggregator for Increment<T> {
    type InitConfig = ();
    type PreComputedValue = T;

    fn create(_init: &()) -> Self {
        Increment {
            value: T::default(),
        }
    }

    fn update(&mut self, value: T) {
        self.value = self.value.add(value)
    }
}

/// Summarizes a set of measurements made as their arithmetic sum.
pub(crate) struct Sum<T: Number> {
    value_map: ValueMap<Increment<T>>,
    monotonic: bool,
    start: SystemTime,
}

impl<T: Number> Sum<T> {
    /// Each sum is scoped by attributes and accumulates since creation.
    pub(crate) fn new(monotonic: bool, filter: Option<Arc<HashSet<Key>>>) -> Self {
        Sum {
            value_map: ValueMap::new((), filter),
            monotonic,
            start: SystemTime::now(),
        }
    }
}

impl<T: Number> Measure<T> for Sum<T> {
    fn call(&self, measurement: T, attrs: &[KeyValue]) {
        self.value_map.measure(measurement, attrs)
    }
}

impl<T: Number> ComputeAggregation for Sum<T> {
    fn compute_aggregation(&self) -> Option<AggregatedMetrics> {
        let data_points = self.value_map.collect(|attributes, tracker| data::SumDataPoint {
            attributes: attributes.as_slice().to_vec(),
            value: tracker.value,
        });
        if data_points.is_empty() {
            return None;
        }

        Some(T::into_aggregated(MetricData::Sum(data::Sum {
            data_points,
            start_time: self.start,
            time: SystemTime::now(),
            temporality: Temporality::Cumulative,
            is_monotonic: self.monotonic,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_per_attribute_set() {
        let sum = Sum::<u64>::new(true, None);
        assert!(sum.compute_aggregation().is_none());

        sum.call(1, &[KeyValue::new("route", "/")]);
        sum.call(2, &[KeyValue::new("route", "/")]);
        sum.call(5, &[KeyValue::new("route", "/items")]);

        let Some(AggregatedMetrics::U64(MetricData::Sum(data))) = sum.compute_aggregation() else {
            panic!("expected a u64 sum");
        };
        assert!(data.is_monotonic);
        assert_eq!(data.temporality, Temporality::Cumulative);
        let mut values: Vec<u64> = data.data_points.iter().map(|dp| dp.value).collect();
        values.sort_unstable();
        assert_eq!(values, vec![3, 5]);
    }

    #[test]
    fn cumulative_across_collections() {
        let sum = Sum::<i64>::new(false, None);
        sum.call(4, &[]);
        sum.compute_aggregation();
        sum.call(-6, &[]);

        let Some(AggregatedMetrics::I64(MetricData::Sum(data))) = sum.compute_aggregation() else {
            panic!("expected an i64 sum");
        };
        assert!(!data.is_monotonic);
        assert_eq!(data.data_points[0].value, -2);
    }
}
