use std::collections::HashSet;
use std::sync::Arc;
use std::time::SystemTime;

use telepipe::{Key, KeyValue};

use crate::metrics::data::{self, AggregatedMetrics, MetricData};
use crate::metrics::Number;

use super::{Aggregator, ComputeAggregation, Measure, ValueMap};

/// Keeps the most recent value.
pub(super) struct Assign<T> {
    pub(super) value: T,
}

impl<T: Number> Aggregator for Assign<T> {
    type InitConfig = ();
    type PreComputedValue = T;

    fn create(_init: &()) -> Self {
        Assign {
            value: T::default(),
        }
    }

    fn update(&mut self, value: T) {
        self.value = value
    }
}

/// Summarizes a set of measurements as the last one made.
pub(crate) struct LastValue<T: Number> {
    value_map: ValueMap<Assign<T>>,
    start: SystemTime,
}

impl<T: Number> LastValue<T> {
    pub(crate) fn new(filter: Option<Arc<HashSet<Key>>>) -> Self {
        LastValue {
            value_map: ValueMap::new((), filter),
            start: SystemTime::now(),
        }
    }
}

impl<T: Number> Measure<T> for LastValue<T> {
    fn call(&self, measurement: T, attrs: &[KeyValue]) {
        self.value_map.measure(measurement, attrs)
    }
}

impl<T: Number> ComputeAggregation for LastValue<T> {
    fn compute_aggregation(&self) -> Option<AggregatedMetrics> {
        let data_points = self
            .value_map
            .collect(|attributes, tracker| data::GaugeDataPoint {
                attributes: attributes.as_slice().to_vec(),
                value: tracker.value,
            });
        if data_points.is_empty() {
            return None;
        }

        Some(T::into_aggregated(MetricData::Gauge(data::Gauge {
            data_points,
            start_time: Some(self.start),
            time: SystemTime::now(),
        })))
    }
}
