use std::{borrow::Cow, fmt, marker::PhantomData, sync::Arc};

use telepipe::{otel_warn, InstrumentationScope, KeyValue};

use crate::metrics::data::{AggregatedMetrics, MetricData};
use crate::metrics::internal::Measure;

/// The identifier of a group of instruments that all perform the same function.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum InstrumentKind {
    /// Identifies a group of instruments that record increasing values synchronously
    /// with the code path they are measuring.
    Counter,
    /// A group of instruments that record increasing and decreasing values
    /// synchronously with the code path they are measuring.
    UpDownCounter,
    /// A group of instruments that record a distribution of values synchronously with
    /// the code path they are measuring.
    Histogram,
    /// A group of instruments that report the current value from a sampler.
    ObservableGauge,
    /// A group of instruments that report an increasing and decreasing total
    /// from a sampler.
    ObservableUpDownCounter,
}

impl InstrumentKind {
    /// Observable instruments are read by the collecting thread instead of
    /// being written by call sites.
    pub fn is_observable(&self) -> bool {
        matches!(
            self,
            InstrumentKind::ObservableGauge | InstrumentKind::ObservableUpDownCounter
        )
    }
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Describes the properties of an instrument at creation, used for matching
/// views.
#[derive(Clone, Debug, PartialEq)]
pub struct Instrument {
    pub(crate) name: Cow<'static, str>,
    pub(crate) description: Cow<'static, str>,
    pub(crate) kind: InstrumentKind,
    pub(crate) unit: Cow<'static, str>,
    pub(crate) scope: InstrumentationScope,
}

impl Instrument {
    /// Creates a descriptor, mostly useful for testing views.
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        kind: InstrumentKind,
        unit: impl Into<Cow<'static, str>>,
        description: impl Into<Cow<'static, str>>,
    ) -> Self {
        Instrument {
            name: name.into(),
            description: description.into(),
            kind,
            unit: unit.into(),
            scope: InstrumentationScope::default(),
        }
    }

    /// Instrument name.
    pub fn name(&self) -> &str {
        self.name.as_ref()
    }

    /// Instrument kind.
    pub fn kind(&self) -> InstrumentKind {
        self.kind
    }

    /// Instrument unit.
    pub fn unit(&self) -> &str {
        self.unit.as_ref()
    }

    /// Instrument description.
    pub fn description(&self) -> &str {
        self.description.as_ref()
    }

    /// Instrumentation scope of the meter that created the instrument.
    pub fn scope(&self) -> &InstrumentationScope {
        &self.scope
    }
}

mod private {
    pub trait Sealed {}
    impl Sealed for u64 {}
    impl Sealed for i64 {}
    impl Sealed for f64 {}
}

/// Value types instruments can record: `u64`, `i64` and `f64`.
pub trait Number:
    private::Sealed + Copy + Default + PartialOrd + fmt::Debug + Send + Sync + 'static
{
    /// Name of the type, part of an instrument's identity.
    const NAME: &'static str;

    /// Adds without overflowing.
    fn add(self, other: Self) -> Self;

    /// `true` for values that monotonic instruments must reject.
    fn is_invalid_increment(self) -> bool;

    /// Lossy conversion used for bucket lookup.
    fn into_float(self) -> f64;

    /// Wraps typed data into the untyped export representation.
    fn into_aggregated(data: MetricData<Self>) -> AggregatedMetrics;
}

impl Number for u64 {
    const NAME: &'static str = "u64";

    fn add(self, other: Self) -> Self {
        self.saturating_add(other)
    }

    fn is_invalid_increment(self) -> bool {
        false
    }

    fn into_float(self) -> f64 {
        // May have precision loss at high values
        self as f64
    }

    fn into_aggregated(data: MetricData<Self>) -> AggregatedMetrics {
        AggregatedMetrics::U64(data)
    }
}

impl Number for i64 {
    const NAME: &'static str = "i64";

    fn add(self, other: Self) -> Self {
        self.saturating_add(other)
    }

    fn is_invalid_increment(self) -> bool {
        self < 0
    }

    fn into_float(self) -> f64 {
        self as f64
    }

    fn into_aggregated(data: MetricData<Self>) -> AggregatedMetrics {
        AggregatedMetrics::I64(data)
    }
}

impl Number for f64 {
    const NAME: &'static str = "f64";

    fn add(self, other: Self) -> Self {
        self + other
    }

    fn is_invalid_increment(self) -> bool {
        !(self >= 0.0 && self.is_finite())
    }

    fn into_float(self) -> f64 {
        self
    }

    fn into_aggregated(data: MetricData<Self>) -> AggregatedMetrics {
        AggregatedMetrics::F64(data)
    }
}

/// An instrument that records increasing values.
///
/// Negative values are rejected with a warning and not recorded.
#[derive(Clone)]
pub struct Counter<T> {
    measure: Arc<dyn Measure<T>>,
}

impl<T: Number> Counter<T> {
    pub(crate) fn new(measure: Arc<dyn Measure<T>>) -> Self {
        Counter { measure }
    }

    /// Records an increment to the counter.
    pub fn add(&self, value: T, attributes: &[KeyValue]) {
        if value.is_invalid_increment() {
            otel_warn!(
                name: "Counter.InvalidValue",
                message = "counters only accept non-negative increments",
                value = format!("{value:?}")
            );
            return;
        }
        self.measure.call(value, attributes)
    }
}

impl<T> fmt::Debug for Counter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Counter")
    }
}

/// An instrument that records increasing or decreasing values.
#[derive(Clone)]
pub struct UpDownCounter<T> {
    measure: Arc<dyn Measure<T>>,
}

impl<T: Number> UpDownCounter<T> {
    pub(crate) fn new(measure: Arc<dyn Measure<T>>) -> Self {
        UpDownCounter { measure }
    }

    /// Records a change to the counter.
    pub fn add(&self, value: T, attributes: &[KeyValue]) {
        self.measure.call(value, attributes)
    }
}

impl<T> fmt::Debug for UpDownCounter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UpDownCounter")
    }
}

/// An instrument that records a distribution of values.
#[derive(Clone)]
pub struct Histogram<T> {
    measure: Arc<dyn Measure<T>>,
}

impl<T: Number> Histogram<T> {
    pub(crate) fn new(measure: Arc<dyn Measure<T>>) -> Self {
        Histogram { measure }
    }

    /// Adds one value to the distribution. Negative values are rejected.
    pub fn record(&self, value: T, attributes: &[KeyValue]) {
        if value.is_invalid_increment() {
            otel_warn!(
                name: "Histogram.InvalidValue",
                message = "histograms only accept non-negative values",
                value = format!("{value:?}")
            );
            return;
        }
        self.measure.call(value, attributes)
    }
}

impl<T> fmt::Debug for Histogram<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Histogram")
    }
}

/// Handle of a gauge whose value is read from a [`Sampler`] at collection.
///
/// The sampler stays registered for the provider's lifetime; the handle only
/// proves the instrument was created.
///
/// [`Sampler`]: crate::metrics::Sampler
#[derive(Clone, Debug)]
pub struct ObservableGauge<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> ObservableGauge<T> {
    pub(crate) fn new() -> Self {
        ObservableGauge {
            _marker: PhantomData,
        }
    }
}

/// Handle of an up-down counter whose total is read from a [`Sampler`] at
/// collection.
///
/// [`Sampler`]: crate::metrics::Sampler
#[derive(Clone, Debug)]
pub struct ObservableUpDownCounter<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> ObservableUpDownCounter<T> {
    pub(crate) fn new() -> Self {
        ObservableUpDownCounter {
            _marker: PhantomData,
        }
    }
}
