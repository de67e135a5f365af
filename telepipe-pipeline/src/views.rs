use telepipe_http::{PROCESS_CPU_UTILIZATION, TRAFFIC_VOLUME};
use telepipe_sdk::metrics::{Aggregation, InstrumentKind, MetricResult, View};

/// Export name of the request counter under [`standard_views`].
pub const TRAFFIC_VOLUME_EXPORT_NAME: &str = "test";

/// Bucket boundaries every histogram is exported with under
/// [`standard_views`].
pub const STANDARD_HISTOGRAM_BOUNDARIES: [f64; 5] = [1.0, 21.0, 50.0, 100.0, 1000.0];

/// The views the service ships with.
///
/// - the request counter is exported as [`TRAFFIC_VOLUME_EXPORT_NAME`],
/// - CPU utilization is not exported at all,
/// - every histogram uses [`STANDARD_HISTOGRAM_BOUNDARIES`].
///
/// ```
/// use telepipe_pipeline::standard_views;
/// use telepipe_sdk::metrics::SdkMeterProvider;
///
/// let provider = standard_views()
///     .unwrap()
///     .into_iter()
///     .fold(SdkMeterProvider::builder(), |builder, view| builder.with_view(view))
///     .build();
/// # drop(provider);
/// ```
pub fn standard_views() -> MetricResult<Vec<View>> {
    Ok(vec![
        View::builder()
            .with_instrument_name(TRAFFIC_VOLUME)
            .with_instrument_kind(InstrumentKind::Counter)
            .with_name(TRAFFIC_VOLUME_EXPORT_NAME)
            .build()?,
        View::builder()
            .with_instrument_name(PROCESS_CPU_UTILIZATION)
            .with_instrument_kind(InstrumentKind::ObservableGauge)
            .drop()
            .build()?,
        View::builder()
            .with_instrument_name("*")
            .with_instrument_kind(InstrumentKind::Histogram)
            .with_aggregation(Aggregation::ExplicitBucketHistogram {
                boundaries: STANDARD_HISTOGRAM_BOUNDARIES.to_vec(),
                record_min_max: true,
            })
            .build()?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use telepipe::KeyValue;
    use telepipe_sdk::metrics::data::{AggregatedMetrics, MetricData, ResourceMetrics};
    use telepipe_sdk::metrics::{ManualReader, MetricReader, SdkMeterProvider};

    fn provider_with_standard_views() -> (SdkMeterProvider, ManualReader) {
        let reader = ManualReader::default();
        let provider = standard_views()
            .unwrap()
            .into_iter()
            .fold(
                SdkMeterProvider::builder().with_reader(reader.clone()),
                |builder, view| builder.with_view(view),
            )
            .build();
        (provider, reader)
    }

    fn collect(reader: &ManualReader) -> ResourceMetrics {
        let mut rm = ResourceMetrics::default();
        reader.collect(&mut rm).unwrap();
        rm
    }

    #[test]
    fn traffic_volume_is_renamed() {
        let (provider, reader) = provider_with_standard_views();
        let counter = provider
            .meter("http")
            .u64_counter(TRAFFIC_VOLUME)
            .build()
            .unwrap();
        for _ in 0..3 {
            counter.add(1, &[KeyValue::new("route", "/")]);
        }

        let rm = collect(&reader);
        assert!(rm.metric(TRAFFIC_VOLUME).is_none());
        let metric = rm.metric("test").unwrap();
        let AggregatedMetrics::U64(MetricData::Sum(sum)) = &metric.data else {
            panic!("unexpected data {:?}", metric.data);
        };
        assert_eq!(sum.data_points.len(), 1);
        assert_eq!(sum.data_points[0].value, 3);
        assert_eq!(sum.data_points[0].attributes, vec![KeyValue::new("route", "/")]);
    }

    #[test]
    fn cpu_utilization_is_dropped() {
        let (provider, reader) = provider_with_standard_views();
        let meter = provider.meter("process");
        let _cpu = meter
            .f64_observable_gauge(PROCESS_CPU_UTILIZATION)
            .with_sampler(|| 0.25)
            .build()
            .unwrap();
        let _threads = meter
            .i64_observable_up_down_counter("process.threads")
            .with_sampler(|| 8_i64)
            .build()
            .unwrap();

        for _ in 0..5 {
            let rm = collect(&reader);
            assert!(rm.metric(PROCESS_CPU_UTILIZATION).is_none());
            assert!(rm.metric("process.threads").is_some());
        }
    }

    #[test]
    fn histograms_are_rebucketed() {
        let (provider, reader) = provider_with_standard_views();
        let histogram = provider
            .meter("http")
            .f64_histogram("queue.wait")
            .with_boundaries(vec![0.1, 0.2])
            .build()
            .unwrap();
        for value in [0.5, 30.0, 2000.0] {
            histogram.record(value, &[]);
        }

        let rm = collect(&reader);
        let metric = rm.metric("queue.wait").unwrap();
        let AggregatedMetrics::F64(MetricData::Histogram(hist)) = &metric.data else {
            panic!("unexpected data {:?}", metric.data);
        };
        let point = &hist.data_points[0];
        assert_eq!(point.bounds, STANDARD_HISTOGRAM_BOUNDARIES.to_vec());
        assert_eq!(point.bucket_counts, vec![1, 0, 1, 0, 0, 1]);
        assert_eq!(point.count, 3);
        assert_eq!(point.sum, 2030.5);
        assert_eq!(point.min, Some(0.5));
        assert_eq!(point.max, Some(2000.0));
    }
}
