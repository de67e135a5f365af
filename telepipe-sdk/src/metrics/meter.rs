use std::{borrow::Cow, fmt, marker::PhantomData, sync::Arc};

use telepipe::InstrumentationScope;

use crate::metrics::internal::Measure;
use crate::metrics::{
    pipeline::Pipeline, Aggregation, Counter, Histogram, Instrument, InstrumentKind, MetricError,
    MetricResult, Number, ObservableGauge, ObservableUpDownCounter, Sampler, UpDownCounter,
};

// maximum length of instrument name
const INSTRUMENT_NAME_MAX_LENGTH: usize = 255;
// maximum length of instrument unit name
const INSTRUMENT_UNIT_NAME_MAX_LENGTH: usize = 63;
// Characters allowed in instrument name
const INSTRUMENT_NAME_ALLOWED_NON_ALPHANUMERIC_CHARS: [char; 4] = ['_', '.', '-', '/'];

// instrument validation error strings
const INSTRUMENT_NAME_EMPTY: &str = "instrument name must be non-empty";
const INSTRUMENT_NAME_LENGTH: &str = "instrument name must be less than 256 characters";
const INSTRUMENT_NAME_INVALID_CHAR: &str =
    "characters in instrument name must be ASCII and belong to the alphanumeric characters, '_', '.', '-' and '/'";
const INSTRUMENT_NAME_FIRST_ALPHABETIC: &str =
    "instrument name must start with an alphabetic character";
const INSTRUMENT_UNIT_LENGTH: &str = "instrument unit must be less than 64 characters";
const INSTRUMENT_UNIT_INVALID_CHAR: &str = "characters in instrument unit must be ASCII";
const OBSERVABLE_WITHOUT_SAMPLER: &str = "observable instruments require a sampler";

/// Creates the instruments of one instrumentation scope.
///
/// Obtained from [`SdkMeterProvider::meter`]. Creating an instrument a second
/// time with the same name (ignoring case), kind, unit, description and value
/// type returns a handle to the same stream; any other difference is a
/// [`MetricError::DuplicateInstrumentConflict`].
///
/// ```
/// use telepipe::KeyValue;
/// use telepipe_sdk::metrics::SdkMeterProvider;
///
/// let provider = SdkMeterProvider::builder().build();
/// let meter = provider.meter("checkout");
///
/// let orders = meter
///     .u64_counter("orders")
///     .with_unit("order")
///     .with_description("orders placed")
///     .build()
///     .unwrap();
/// orders.add(1, &[KeyValue::new("region", "eu")]);
///
/// let queue = meter
///     .i64_observable_up_down_counter("queue.depth")
///     .with_sampler(|| 3_i64)
///     .build()
///     .unwrap();
/// # drop(queue);
/// ```
///
/// [`SdkMeterProvider::meter`]: crate::metrics::SdkMeterProvider::meter
#[derive(Clone)]
pub struct Meter {
    scope: InstrumentationScope,
    pipeline: Arc<Pipeline>,
}

impl fmt::Debug for Meter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Meter").field("scope", &self.scope).finish()
    }
}

impl Meter {
    pub(crate) fn new(scope: InstrumentationScope, pipeline: Arc<Pipeline>) -> Self {
        Meter { scope, pipeline }
    }

    /// The instrumentation scope of this meter.
    pub fn scope(&self) -> &InstrumentationScope {
        &self.scope
    }

    /// Creates a builder for a u64 [`Counter`].
    pub fn u64_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> InstrumentBuilder<'_, Counter<u64>> {
        InstrumentBuilder::new(self, name.into())
    }

    /// Creates a builder for an f64 [`Counter`].
    pub fn f64_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> InstrumentBuilder<'_, Counter<f64>> {
        InstrumentBuilder::new(self, name.into())
    }

    /// Creates a builder for an i64 [`UpDownCounter`].
    pub fn i64_up_down_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> InstrumentBuilder<'_, UpDownCounter<i64>> {
        InstrumentBuilder::new(self, name.into())
    }

    /// Creates a builder for an f64 [`UpDownCounter`].
    pub fn f64_up_down_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> InstrumentBuilder<'_, UpDownCounter<f64>> {
        InstrumentBuilder::new(self, name.into())
    }

    /// Creates a builder for a u64 [`Histogram`].
    pub fn u64_histogram(&self, name: impl Into<Cow<'static, str>>) -> HistogramBuilder<'_, u64> {
        HistogramBuilder::new(self, name.into())
    }

    /// Creates a builder for an f64 [`Histogram`].
    pub fn f64_histogram(&self, name: impl Into<Cow<'static, str>>) -> HistogramBuilder<'_, f64> {
        HistogramBuilder::new(self, name.into())
    }

    /// Creates a builder for a u64 [`ObservableGauge`].
    pub fn u64_observable_gauge(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> ObservableBuilder<'_, ObservableGauge<u64>, u64> {
        ObservableBuilder::new(self, name.into())
    }

    /// Creates a builder for an i64 [`ObservableGauge`].
    pub fn i64_observable_gauge(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> ObservableBuilder<'_, ObservableGauge<i64>, i64> {
        ObservableBuilder::new(self, name.into())
    }

    /// Creates a builder for an f64 [`ObservableGauge`].
    pub fn f64_observable_gauge(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> ObservableBuilder<'_, ObservableGauge<f64>, f64> {
        ObservableBuilder::new(self, name.into())
    }

    /// Creates a builder for an i64 [`ObservableUpDownCounter`].
    pub fn i64_observable_up_down_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> ObservableBuilder<'_, ObservableUpDownCounter<i64>, i64> {
        ObservableBuilder::new(self, name.into())
    }

    /// Creates a builder for an f64 [`ObservableUpDownCounter`].
    pub fn f64_observable_up_down_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> ObservableBuilder<'_, ObservableUpDownCounter<f64>, f64> {
        ObservableBuilder::new(self, name.into())
    }

    fn instrument(
        &self,
        kind: InstrumentKind,
        name: Cow<'static, str>,
        description: Option<Cow<'static, str>>,
        unit: Option<Cow<'static, str>>,
    ) -> MetricResult<Instrument> {
        validate_instrument_config(&name, unit.as_deref())?;
        Ok(Instrument {
            name,
            description: description.unwrap_or_default(),
            kind,
            unit: unit.unwrap_or_default(),
            scope: self.scope.clone(),
        })
    }
}

fn validate_instrument_config(name: &str, unit: Option<&str>) -> MetricResult<()> {
    validate_instrument_name(name)?;
    unit.map_or(Ok(()), validate_instrument_unit)
}

fn validate_instrument_name(name: &str) -> MetricResult<()> {
    if name.is_empty() {
        return Err(MetricError::InvalidInstrumentConfiguration(
            INSTRUMENT_NAME_EMPTY,
        ));
    }
    if name.len() > INSTRUMENT_NAME_MAX_LENGTH {
        return Err(MetricError::InvalidInstrumentConfiguration(
            INSTRUMENT_NAME_LENGTH,
        ));
    }
    if name.starts_with(|c: char| !c.is_ascii_alphabetic()) {
        return Err(MetricError::InvalidInstrumentConfiguration(
            INSTRUMENT_NAME_FIRST_ALPHABETIC,
        ));
    }
    if name.contains(|c: char| {
        !c.is_ascii_alphanumeric() && !INSTRUMENT_NAME_ALLOWED_NON_ALPHANUMERIC_CHARS.contains(&c)
    }) {
        return Err(MetricError::InvalidInstrumentConfiguration(
            INSTRUMENT_NAME_INVALID_CHAR,
        ));
    }
    Ok(())
}

fn validate_instrument_unit(unit: &str) -> MetricResult<()> {
    if unit.len() > INSTRUMENT_UNIT_NAME_MAX_LENGTH {
        return Err(MetricError::InvalidInstrumentConfiguration(
            INSTRUMENT_UNIT_LENGTH,
        ));
    }
    if unit.contains(|c: char| !c.is_ascii()) {
        return Err(MetricError::InvalidInstrumentConfiguration(
            INSTRUMENT_UNIT_INVALID_CHAR,
        ));
    }
    Ok(())
}

/// Configuration for a synchronous instrument.
pub struct InstrumentBuilder<'a, I> {
    meter: &'a Meter,
    name: Cow<'static, str>,
    description: Option<Cow<'static, str>>,
    unit: Option<Cow<'static, str>>,
    _marker: PhantomData<I>,
}

impl<'a, I> InstrumentBuilder<'a, I> {
    fn new(meter: &'a Meter, name: Cow<'static, str>) -> Self {
        InstrumentBuilder {
            meter,
            name,
            description: None,
            unit: None,
            _marker: PhantomData,
        }
    }

    /// Set the description for this instrument
    pub fn with_description<S: Into<Cow<'static, str>>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the unit for this instrument.
    ///
    /// Unit is case sensitive(`kb` is not the same as `kB`).
    ///
    /// Unit must be:
    /// - ASCII string
    /// - No longer than 63 characters
    pub fn with_unit<S: Into<Cow<'static, str>>>(mut self, unit: S) -> Self {
        self.unit = Some(unit.into());
        self
    }

    fn register<T: Number>(
        self,
        kind: InstrumentKind,
        boundaries: Option<Vec<f64>>,
    ) -> MetricResult<Arc<dyn Measure<T>>> {
        let instrument = self
            .meter
            .instrument(kind, self.name, self.description, self.unit)?;
        self.meter.pipeline.register_sync::<T>(instrument, boundaries)
    }
}

impl<I> fmt::Debug for InstrumentBuilder<'_, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentBuilder")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("unit", &self.unit)
            .field("kind", &std::any::type_name::<I>())
            .finish()
    }
}

impl<T: Number> InstrumentBuilder<'_, Counter<T>> {
    /// Validates the configuration and creates the counter.
    pub fn build(self) -> MetricResult<Counter<T>> {
        self.register(InstrumentKind::Counter, None)
            .map(Counter::new)
    }
}

impl<T: Number> InstrumentBuilder<'_, UpDownCounter<T>> {
    /// Validates the configuration and creates the up-down counter.
    pub fn build(self) -> MetricResult<UpDownCounter<T>> {
        self.register(InstrumentKind::UpDownCounter, None)
            .map(UpDownCounter::new)
    }
}

/// Configuration for a [`Histogram`].
pub struct HistogramBuilder<'a, T> {
    instrument: InstrumentBuilder<'a, Histogram<T>>,
    boundaries: Option<Vec<f64>>,
}

impl<'a, T: Number> HistogramBuilder<'a, T> {
    fn new(meter: &'a Meter, name: Cow<'static, str>) -> Self {
        HistogramBuilder {
            instrument: InstrumentBuilder::new(meter, name),
            boundaries: None,
        }
    }

    /// Set the description for this instrument
    pub fn with_description<S: Into<Cow<'static, str>>>(mut self, description: S) -> Self {
        self.instrument = self.instrument.with_description(description);
        self
    }

    /// Set the unit for this instrument.
    pub fn with_unit<S: Into<Cow<'static, str>>>(mut self, unit: S) -> Self {
        self.instrument = self.instrument.with_unit(unit);
        self
    }

    /// Set the bucket boundaries used unless a view sets others.
    ///
    /// Boundaries must be sorted and free of NaN.
    pub fn with_boundaries(mut self, boundaries: Vec<f64>) -> Self {
        self.boundaries = Some(boundaries);
        self
    }

    /// Validates the configuration and creates the histogram.
    pub fn build(self) -> MetricResult<Histogram<T>> {
        if let Some(boundaries) = &self.boundaries {
            Aggregation::ExplicitBucketHistogram {
                boundaries: boundaries.clone(),
                record_min_max: true,
            }
            .validate()?;
        }
        self.instrument
            .register(InstrumentKind::Histogram, self.boundaries)
            .map(Histogram::new)
    }
}

impl<T> fmt::Debug for HistogramBuilder<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistogramBuilder")
            .field("instrument", &self.instrument)
            .field("boundaries", &self.boundaries)
            .finish()
    }
}

/// Configuration for an observable instrument.
pub struct ObservableBuilder<'a, I, T> {
    instrument: InstrumentBuilder<'a, I>,
    sampler: Option<Arc<dyn Sampler<T>>>,
}

impl<'a, I, T: Number> ObservableBuilder<'a, I, T> {
    fn new(meter: &'a Meter, name: Cow<'static, str>) -> Self {
        ObservableBuilder {
            instrument: InstrumentBuilder::new(meter, name),
            sampler: None,
        }
    }

    /// Set the description for this instrument
    pub fn with_description<S: Into<Cow<'static, str>>>(mut self, description: S) -> Self {
        self.instrument = self.instrument.with_description(description);
        self
    }

    /// Set the unit for this instrument.
    pub fn with_unit<S: Into<Cow<'static, str>>>(mut self, unit: S) -> Self {
        self.instrument = self.instrument.with_unit(unit);
        self
    }

    /// Set the source of values, read once per collection.
    pub fn with_sampler<S: Sampler<T>>(mut self, sampler: S) -> Self {
        self.sampler = Some(Arc::new(sampler));
        self
    }

    fn register(self, kind: InstrumentKind) -> MetricResult<()> {
        let sampler = self
            .sampler
            .ok_or(MetricError::InvalidInstrumentConfiguration(
                OBSERVABLE_WITHOUT_SAMPLER,
            ))?;
        let builder = self.instrument;
        let instrument =
            builder
                .meter
                .instrument(kind, builder.name, builder.description, builder.unit)?;
        builder
            .meter
            .pipeline
            .register_observable(instrument, sampler)
    }
}

impl<I, T> fmt::Debug for ObservableBuilder<'_, I, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableBuilder")
            .field("instrument", &self.instrument)
            .field("sampler", &self.sampler.is_some())
            .finish()
    }
}

impl<T: Number> ObservableBuilder<'_, ObservableGauge<T>, T> {
    /// Validates the configuration and registers the gauge.
    pub fn build(self) -> MetricResult<ObservableGauge<T>> {
        self.register(InstrumentKind::ObservableGauge)
            .map(|()| ObservableGauge::new())
    }
}

impl<T: Number> ObservableBuilder<'_, ObservableUpDownCounter<T>, T> {
    /// Validates the configuration and registers the up-down counter.
    pub fn build(self) -> MetricResult<ObservableUpDownCounter<T>> {
        self.register(InstrumentKind::ObservableUpDownCounter)
            .map(|()| ObservableUpDownCounter::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::data::{AggregatedMetrics, MetricData, ResourceMetrics};
    use crate::metrics::{ManualReader, MetricReader, SdkMeterProvider};
    use rstest::rstest;
    use telepipe::KeyValue;

    fn setup() -> (SdkMeterProvider, ManualReader) {
        let reader = ManualReader::default();
        let provider = SdkMeterProvider::builder()
            .with_reader(reader.clone())
            .build();
        (provider, reader)
    }

    fn collect(reader: &ManualReader) -> ResourceMetrics {
        let mut rm = ResourceMetrics::default();
        reader.collect(&mut rm).unwrap();
        rm
    }

    fn u64_sum(rm: &ResourceMetrics, name: &str) -> u64 {
        match rm.metric(name).map(|m| &m.data) {
            Some(AggregatedMetrics::U64(MetricData::Sum(sum))) => {
                sum.data_points.iter().map(|dp| dp.value).sum()
            }
            other => panic!("expected a u64 sum for {name}, got {other:?}"),
        }
    }

    #[rstest]
    #[case("traffic_volume", None)]
    #[case("http.server.request.duration", None)]
    #[case("a/b-c_d.e", None)]
    #[case("", Some(INSTRUMENT_NAME_EMPTY))]
    #[case("1st", Some(INSTRUMENT_NAME_FIRST_ALPHABETIC))]
    #[case("_private", Some(INSTRUMENT_NAME_FIRST_ALPHABETIC))]
    #[case("has space", Some(INSTRUMENT_NAME_INVALID_CHAR))]
    #[case("ünits", Some(INSTRUMENT_NAME_FIRST_ALPHABETIC))]
    #[case("a:b", Some(INSTRUMENT_NAME_INVALID_CHAR))]
    fn instrument_names(#[case] name: &'static str, #[case] error: Option<&'static str>) {
        let (provider, _reader) = setup();
        let result = provider.meter("test").u64_counter(name).build();
        match error {
            None => assert!(result.is_ok(), "{name}: {result:?}"),
            Some(message) => assert_eq!(
                result.unwrap_err(),
                MetricError::InvalidInstrumentConfiguration(message)
            ),
        }
    }

    #[test]
    fn name_length_limit() {
        let (provider, _reader) = setup();
        let meter = provider.meter("test");
        assert!(meter.u64_counter("a".repeat(255)).build().is_ok());
        assert_eq!(
            meter.u64_counter("a".repeat(256)).build().unwrap_err(),
            MetricError::InvalidInstrumentConfiguration(INSTRUMENT_NAME_LENGTH)
        );
    }

    #[rstest]
    #[case("By".to_string(), None)]
    #[case("{request}".to_string(), None)]
    #[case("°C".to_string(), Some(INSTRUMENT_UNIT_INVALID_CHAR))]
    #[case("s".repeat(64), Some(INSTRUMENT_UNIT_LENGTH))]
    fn instrument_units(#[case] unit: String, #[case] error: Option<&'static str>) {
        let (provider, _reader) = setup();
        let result = provider
            .meter("test")
            .f64_histogram("latency")
            .with_unit(unit)
            .build();
        assert_eq!(result.err(), error.map(MetricError::InvalidInstrumentConfiguration));
    }

    #[test]
    fn identical_instruments_share_stream() {
        let (provider, reader) = setup();
        let meter = provider.meter("test");
        let first = meter.u64_counter("requests").with_unit("request").build().unwrap();
        let second = meter.u64_counter("Requests").with_unit("request").build().unwrap();
        first.add(1, &[]);
        second.add(2, &[]);

        let rm = collect(&reader);
        assert_eq!(rm.scope_metrics[0].metrics.len(), 1);
        assert_eq!(u64_sum(&rm, "requests"), 3);
    }

    #[rstest]
    #[case::unit(|m: &Meter| m.u64_counter("requests").with_unit("ms").build().map(drop))]
    #[case::description(|m: &Meter| m.u64_counter("requests").with_description("other").build().map(drop))]
    #[case::number(|m: &Meter| m.f64_counter("requests").build().map(drop))]
    #[case::kind(|m: &Meter| m.i64_up_down_counter("requests").build().map(drop))]
    #[case::observable(|m: &Meter| m.u64_observable_gauge("requests").with_sampler(|| 1_u64).build().map(drop))]
    fn conflicting_instrument(#[case] create: fn(&Meter) -> MetricResult<()>) {
        let (provider, _reader) = setup();
        let meter = provider.meter("test");
        meter.u64_counter("requests").build().unwrap();
        assert!(matches!(
            create(&meter),
            Err(MetricError::DuplicateInstrumentConflict { .. })
        ));
    }

    #[test]
    fn same_name_in_other_meter_is_independent() {
        let (provider, reader) = setup();
        provider
            .meter("a")
            .u64_counter("requests")
            .build()
            .unwrap()
            .add(1, &[]);
        provider
            .meter("b")
            .f64_counter("requests")
            .build()
            .unwrap()
            .add(1.5, &[]);
        assert_eq!(collect(&reader).scope_metrics.len(), 2);
    }

    #[test]
    fn negative_increments_are_ignored() {
        let (provider, reader) = setup();
        let meter = provider.meter("test");
        let counter = meter.f64_counter("bytes").build().unwrap();
        counter.add(2.0, &[]);
        counter.add(-1.0, &[]);
        let delta = meter.i64_up_down_counter("delta").build().unwrap();
        delta.add(-1, &[]);

        let rm = collect(&reader);
        match &rm.metric("bytes").unwrap().data {
            AggregatedMetrics::F64(MetricData::Sum(sum)) => {
                assert_eq!(sum.data_points[0].value, 2.0)
            }
            other => panic!("unexpected {other:?}"),
        }
        match &rm.metric("delta").unwrap().data {
            AggregatedMetrics::I64(MetricData::Sum(sum)) => {
                assert!(!sum.is_monotonic);
                assert_eq!(sum.data_points[0].value, -1)
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn observable_requires_sampler() {
        let (provider, _reader) = setup();
        let result = provider.meter("test").f64_observable_gauge("cpu").build();
        assert_eq!(
            result.unwrap_err(),
            MetricError::InvalidInstrumentConfiguration(OBSERVABLE_WITHOUT_SAMPLER)
        );
    }

    #[test]
    fn observable_duplicate_keeps_first_sampler() {
        let (provider, reader) = setup();
        let meter = provider.meter("test");
        meter
            .i64_observable_up_down_counter("memory")
            .with_unit("By")
            .with_sampler(|| 1024_i64)
            .build()
            .unwrap();
        meter
            .i64_observable_up_down_counter("memory")
            .with_unit("By")
            .with_sampler(|| 1_i64)
            .build()
            .unwrap();

        let rm = collect(&reader);
        match &rm.metric("memory").unwrap().data {
            AggregatedMetrics::I64(MetricData::Sum(sum)) => {
                assert_eq!(sum.data_points.len(), 1);
                assert_eq!(sum.data_points[0].value, 1024);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn histogram_boundaries_advice() {
        let (provider, reader) = setup();
        let meter = provider.meter("test");
        assert!(matches!(
            meter
                .f64_histogram("bad")
                .with_boundaries(vec![2.0, 1.0])
                .build(),
            Err(MetricError::Config(_))
        ));

        let histogram = meter
            .f64_histogram("latency")
            .with_boundaries(vec![0.1, 1.0])
            .build()
            .unwrap();
        histogram.record(0.5, &[KeyValue::new("http.route", "/")]);

        let rm = collect(&reader);
        match &rm.metric("latency").unwrap().data {
            AggregatedMetrics::F64(MetricData::Histogram(h)) => {
                assert_eq!(h.data_points[0].bounds, vec![0.1, 1.0]);
                assert_eq!(h.data_points[0].bucket_counts, vec![0, 1, 0]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
