use std::collections::HashSet;
use std::sync::Arc;
use std::time::SystemTime;

use telepipe::{Key, KeyValue};

use crate::metrics::data::{self, AggregatedMetrics, MetricData, Temporality};
use crate::metrics::Number;

use super::last_value::Assign;
use super::{ComputeAggregation, Measure, ValueMap};

/// Summarizes observed totals: each measurement already is the sum, so the
/// latest one replaces the previous.
pub(crate) struct PrecomputedSum<T: Number> {
    value_map: ValueMap<Assign<T>>,
    start: SystemTime,
}

impl<T: Number> PrecomputedSum<T> {
    pub(crate) fn new(filter: Option<Arc<HashSet<Key>>>) -> Self {
        PrecomputedSum {
            value_map: ValueMap::new((), filter),
            start: SystemTime::now(),
        }
    }
}

impl<T: Number> Measure<T> for PrecomputedSum<T> {
    fn call(&self, measurement: T, attrs: &[KeyValue]) {
        self.value_map.measure(measurement, attrs)
    }
}

impl<T: Number> ComputeAggregation for PrecomputedSum<T> {
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
            is_monotonic: false,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observation_replaces_total() {
        let sum = PrecomputedSum::<i64>::new(None);
        sum.call(1024, &[]);
        sum.call(512, &[]);

        let Some(AggregatedMetrics::I64(MetricData::Sum(data))) = sum.compute_aggregation() else {
            panic!("expected an i64 sum");
        };
        assert!(!data.is_monotonic);
        assert_eq!(data.data_points[0].value, 512);
    }
}
