use core::fmt;
use std::{
    any::Any,
    borrow::Cow,
    collections::HashMap,
    sync::{Arc, Mutex},
};

use telepipe::{otel_debug, otel_warn, InstrumentationScope, KeyValue};

use crate::{
    metrics::{
        data::{AggregatedMetrics, Metric, ResourceMetrics, ScopeMetrics},
        internal::{self, AggregateFns, ComputeAggregation, Measure},
        view::{self, View},
        Aggregation, Instrument, InstrumentKind, MetricError, MetricResult, Number, Sampler,
    },
    Resource,
};

/// The identity of an instrument within one meter.
///
/// Names compare case-insensitively; everything else must match exactly for
/// a second creation to return the existing instrument.
#[derive(Clone, Debug, PartialEq, Eq)]
struct InstrumentId {
    name: String,
    kind: InstrumentKind,
    unit: String,
    description: String,
    number: &'static str,
}

impl InstrumentId {
    fn new<T: Number>(instrument: &Instrument) -> Self {
        InstrumentId {
            name: instrument.name.to_ascii_lowercase(),
            kind: instrument.kind,
            unit: instrument.unit.to_string(),
            description: instrument.description.to_string(),
            number: T::NAME,
        }
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}<{}>(unit: {:?}, description: {:?})",
            self.kind, self.number, self.unit, self.description
        )
    }
}

struct Registered {
    id: InstrumentId,
    handle: Box<dyn Any + Send + Sync>,
}

/// One exported stream of an instrument.
#[derive(Clone)]
struct InstrumentSync {
    name: Cow<'static, str>,
    description: Cow<'static, str>,
    unit: Cow<'static, str>,
    compute: Arc<dyn ComputeAggregation>,
}

impl fmt::Debug for InstrumentSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentSync")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("unit", &self.unit)
            .finish()
    }
}

/// Reads a sampler into its aggregation right before the aggregation is
/// collected.
struct Observed<T> {
    sampler: Arc<dyn Sampler<T>>,
    aggregate: AggregateFns<T>,
}

impl<T: Number> ComputeAggregation for Observed<T> {
    fn compute_aggregation(&self) -> Option<AggregatedMetrics> {
        self.aggregate.measure.call(self.sampler.sample(), &[]);
        self.aggregate.collect.compute_aggregation()
    }
}

/// Accepts measurements of dropped instruments without storing them.
struct NoopMeasure;

impl<T: Number> Measure<T> for NoopMeasure {
    fn call(&self, _measurement: T, _attrs: &[KeyValue]) {}
}

#[derive(Default)]
struct PipelineInner {
    instruments: HashMap<(InstrumentationScope, String), Registered>,
    streams: Vec<(InstrumentationScope, InstrumentSync)>,
}

/// The aggregation state of all instruments created through one meter
/// provider, shared by its readers.
///
/// Readers receive it through [`MetricReader::register_pipeline`] and collect
/// it on demand.
///
/// [`MetricReader::register_pipeline`]: crate::metrics::MetricReader::register_pipeline
#[doc(hidden)]
pub struct Pipeline {
    pub(crate) resource: Resource,
    views: Vec<View>,
    inner: Mutex<PipelineInner>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Pipeline")
    }
}

impl Pipeline {
    pub(crate) fn new(resource: Resource, views: Vec<View>) -> Self {
        Pipeline {
            resource,
            views,
            inner: Mutex::new(PipelineInner::default()),
        }
    }

    /// Returns the measure of a synchronous instrument, creating its stream
    /// on first use.
    pub(crate) fn register_sync<T: Number>(
        &self,
        instrument: Instrument,
        advised_boundaries: Option<Vec<f64>>,
    ) -> MetricResult<Arc<dyn Measure<T>>> {
        let mut inner = self.inner.lock()?;
        let id = InstrumentId::new::<T>(&instrument);
        if let Some(handle) =
            existing_handle::<Arc<dyn Measure<T>>>(&inner, &instrument, &id)?
        {
            return Ok(handle);
        }

        let default_aggregation = match advised_boundaries {
            Some(boundaries) if instrument.kind == InstrumentKind::Histogram => {
                Aggregation::ExplicitBucketHistogram {
                    boundaries,
                    record_min_max: true,
                }
            }
            _ => Aggregation::default_for(instrument.kind),
        };

        let measure: Arc<dyn Measure<T>> =
            match view::resolve_stream(&self.views, &instrument, default_aggregation) {
                Some(stream) => {
                    let aggregate = internal::build_aggregate::<T>(&stream, instrument.kind);
                    let measure = aggregate.measure.clone();
                    add_stream(&mut inner, &instrument, &stream, aggregate.collect);
                    measure
                }
                None => {
                    otel_debug!(
                        name: "Pipeline.InstrumentDropped",
                        instrument = instrument.name()
                    );
                    Arc::new(NoopMeasure)
                }
            };

        inner.instruments.insert(
            (instrument.scope.clone(), id.name.clone()),
            Registered {
                id,
                handle: Box::new(measure.clone()),
            },
        );
        Ok(measure)
    }

    /// Registers an observable instrument read from `sampler` at every
    /// collection. Registering an identical instrument again keeps the first
    /// sampler.
    pub(crate) fn register_observable<T: Number>(
        &self,
        instrument: Instrument,
        sampler: Arc<dyn Sampler<T>>,
    ) -> MetricResult<()> {
        let mut inner = self.inner.lock()?;
        let id = InstrumentId::new::<T>(&instrument);
        if existing_handle::<()>(&inner, &instrument, &id)?.is_some() {
            otel_debug!(
                name: "Pipeline.DuplicateObservable",
                instrument = instrument.name(),
                message = "instrument already exists, the new sampler is ignored"
            );
            return Ok(());
        }

        match view::apply_views(&self.views, &instrument) {
            Some(stream) => {
                let aggregate = internal::build_aggregate::<T>(&stream, instrument.kind);
                let observed = Arc::new(Observed { sampler, aggregate });
                add_stream(&mut inner, &instrument, &stream, observed);
            }
            None => {
                otel_debug!(
                    name: "Pipeline.InstrumentDropped",
                    instrument = instrument.name()
                );
            }
        }

        inner.instruments.insert(
            (instrument.scope.clone(), id.name.clone()),
            Registered {
                id,
                handle: Box::new(()),
            },
        );
        Ok(())
    }

    /// Collects every stream, invoking samplers, into `rm`.
    pub(crate) fn produce(&self, rm: &mut ResourceMetrics) -> MetricResult<()> {
        let streams = self.inner.lock()?.streams.clone();

        rm.resource = self.resource.clone();
        rm.scope_metrics.clear();
        for (scope, stream) in streams {
            let Some(data) = stream.compute.compute_aggregation() else {
                continue;
            };
            let metric = Metric {
                name: stream.name,
                description: stream.description,
                unit: stream.unit,
                data,
            };
            match rm.scope_metrics.iter_mut().find(|sm| sm.scope == scope) {
                Some(scope_metrics) => scope_metrics.metrics.push(metric),
                None => rm.scope_metrics.push(ScopeMetrics {
                    scope,
                    metrics: vec![metric],
                }),
            }
        }

        Ok(())
    }
}

/// Looks up an instrument created earlier under the same name, failing when
/// its identity differs.
fn existing_handle<H: Clone + 'static>(
    inner: &PipelineInner,
    instrument: &Instrument,
    id: &InstrumentId,
) -> MetricResult<Option<H>> {
    let Some(registered) = inner
        .instruments
        .get(&(instrument.scope.clone(), id.name.clone()))
    else {
        return Ok(None);
    };

    if registered.id != *id {
        return Err(MetricError::DuplicateInstrumentConflict {
            name: instrument.name().to_owned(),
            existing: registered.id.to_string(),
            requested: id.to_string(),
        });
    }

    registered
        .handle
        .downcast_ref::<H>()
        .cloned()
        .map(Some)
        .ok_or_else(|| {
            MetricError::Other(format!(
                "instrument {:?} has an unexpected handle",
                id.name
            ))
        })
}

fn add_stream(
    inner: &mut PipelineInner,
    instrument: &Instrument,
    stream: &view::Stream,
    compute: Arc<dyn ComputeAggregation>,
) {
    if inner
        .streams
        .iter()
        .any(|(scope, existing)| *scope == instrument.scope && existing.name == stream.name)
    {
        otel_warn!(
            name: "Pipeline.DuplicateStreamName",
            instrument = instrument.name(),
            stream = stream.name(),
            message = "two instruments of this meter export under the same name"
        );
    }

    otel_debug!(
        name: "Pipeline.InstrumentCreated",
        instrument = instrument.name(),
        stream = stream.name()
    );
    inner.streams.push((
        instrument.scope.clone(),
        InstrumentSync {
            name: stream.name.clone(),
            description: stream.description.clone(),
            unit: stream.unit.clone(),
            compute,
        },
    ));
}
