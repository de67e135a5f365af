mod histogram;
mod last_value;
mod precomputed_sum;
mod sum;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use telepipe::{otel_warn, Key, KeyValue};

use crate::metrics::attribute_set::AttributeSet;
use crate::metrics::data::AggregatedMetrics;
use crate::metrics::{Aggregation, InstrumentKind, Number, Stream};

pub(crate) use histogram::Histogram;
pub(crate) use last_value::LastValue;
pub(crate) use precomputed_sum::PrecomputedSum;
pub(crate) use sum::Sum;

/// Maximum number of attribute sets one stream tracks, the overflow stream
/// included.
pub(crate) const DEFAULT_CARDINALITY_LIMIT: usize = 2000;

/// Attribute set that absorbs measurements once the cardinality limit is hit.
pub(crate) fn overflow_attribute() -> KeyValue {
    KeyValue::new("otel.metric.overflow", true)
}

/// Receives measurements for a single instrument.
pub(crate) trait Measure<T>: Send + Sync + 'static {
    fn call(&self, measurement: T, attrs: &[KeyValue]);
}

/// Snapshots the accumulated state of a stream.
pub(crate) trait ComputeAggregation: Send + Sync + 'static {
    /// `None` when nothing was recorded yet.
    fn compute_aggregation(&self) -> Option<AggregatedMetrics>;
}

/// The per-attribute-set state of an aggregation.
pub(crate) trait Aggregator: Send + Sync + 'static {
    /// Shared configuration used to create new trackers.
    type InitConfig: Send + Sync + 'static;
    /// Type of the recorded values.
    type PreComputedValue;

    fn create(init: &Self::InitConfig) -> Self;

    fn update(&mut self, value: Self::PreComputedValue);
}

/// Trackers of one stream keyed by attribute set.
///
/// Every update takes a short lock on the map, so concurrent writers never
/// lose increments.
pub(crate) struct ValueMap<A: Aggregator> {
    trackers: Mutex<HashMap<AttributeSet, A>>,
    config: A::InitConfig,
    filter: Option<Arc<HashSet<Key>>>,
    cardinality_limit: usize,
    overflow_reported: AtomicBool,
}

impl<A: Aggregator> ValueMap<A> {
    pub(crate) fn new(config: A::InitConfig, filter: Option<Arc<HashSet<Key>>>) -> Self {
        ValueMap {
            trackers: Mutex::new(HashMap::new()),
            config,
            filter,
            cardinality_limit: DEFAULT_CARDINALITY_LIMIT,
            overflow_reported: AtomicBool::new(false),
        }
    }

    #[cfg(test)]
    fn with_cardinality_limit(mut self, limit: usize) -> Self {
        self.cardinality_limit = limit.max(1);
        self
    }

    pub(crate) fn measure(&self, value: A::PreComputedValue, attributes: &[KeyValue]) {
        let attributes = AttributeSet::filtered(attributes, self.filter.as_deref());
        let Ok(mut trackers) = self.trackers.lock() else {
            return;
        };

        if let Some(tracker) = trackers.get_mut(&attributes) {
            tracker.update(value);
            return;
        }

        // one slot stays reserved for the overflow stream
        let key = if trackers.len() + 1 >= self.cardinality_limit {
            if !self.overflow_reported.swap(true, Ordering::Relaxed) {
                otel_warn!(
                    name: "ValueMap.CardinalityLimitReached",
                    limit = self.cardinality_limit,
                    message = "further attribute sets are recorded in the otel.metric.overflow stream"
                );
            }
            AttributeSet::from(&[overflow_attribute()][..])
        } else {
            attributes
        };

        trackers
            .entry(key)
            .or_insert_with(|| A::create(&self.config))
            .update(value);
    }

    /// Maps every tracked attribute set, in no particular order.
    pub(crate) fn collect<R>(&self, mut f: impl FnMut(&AttributeSet, &A) -> R) -> Vec<R> {
        match self.trackers.lock() {
            Ok(trackers) => trackers
                .iter()
                .map(|(attributes, tracker)| f(attributes, tracker))
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

/// The two ends of one stream's aggregation.
pub(crate) struct AggregateFns<T> {
    pub(crate) measure: Arc<dyn Measure<T>>,
    pub(crate) collect: Arc<dyn ComputeAggregation>,
}

impl<A, T> From<Arc<A>> for AggregateFns<T>
where
    A: Measure<T> + ComputeAggregation,
{
    fn from(aggregate: Arc<A>) -> Self {
        AggregateFns {
            measure: aggregate.clone(),
            collect: aggregate,
        }
    }
}

/// Creates the aggregation state for a stream of an instrument of `kind`.
pub(crate) fn build_aggregate<T: Number>(
    stream: &Stream,
    kind: InstrumentKind,
) -> AggregateFns<T> {
    let filter = stream.allowed_attribute_keys.clone();
    match &stream.aggregation {
        Aggregation::Sum if kind.is_observable() => {
            Arc::new(PrecomputedSum::<T>::new(filter)).into()
        }
        Aggregation::Sum => {
            let monotonic = matches!(kind, InstrumentKind::Counter | InstrumentKind::Histogram);
            Arc::new(Sum::<T>::new(monotonic, filter)).into()
        }
        Aggregation::LastValue => Arc::new(LastValue::<T>::new(filter)).into(),
        Aggregation::ExplicitBucketHistogram {
            boundaries,
            record_min_max,
        } => {
            Arc::new(Histogram::<T>::new(boundaries.clone(), *record_min_max, filter)).into()
        }
    }
}
