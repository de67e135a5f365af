use telepipe_sdk::metrics::{
    Counter, CpuUtilizationSampler, Histogram, Meter, MemoryUsageSampler, MetricResult,
    ObservableGauge, ObservableUpDownCounter, Sampler,
};

/// Requests received, by `http.route`.
pub const TRAFFIC_VOLUME: &str = "traffic_volume";
/// Requests the [`ErrorClassifier`](crate::ErrorClassifier) counted as
/// failed, by `http.route` and `http.response.status_code`.
pub const ERROR_RATE: &str = "error_rate";
/// Time to serve a request in seconds.
pub const HTTP_SERVER_REQUEST_DURATION: &str = "http.server.request.duration";
/// Process CPU utilization as a ratio.
pub const PROCESS_CPU_UTILIZATION: &str = "process.cpu.utilization";
/// Memory used, in bytes.
pub const PROCESS_MEMORY_USAGE: &str = "process.memory.usage";

/// Route template or path of the request.
pub const HTTP_ROUTE: &str = "http.route";
/// Request method.
pub const HTTP_REQUEST_METHOD: &str = "http.request.method";
/// Response status code.
pub const HTTP_RESPONSE_STATUS_CODE: &str = "http.response.status_code";

/// Bucket boundaries advised for [`HTTP_SERVER_REQUEST_DURATION`].
pub const DURATION_BOUNDARIES: [f64; 14] = [
    0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0, 2.5, 5.0, 7.5, 10.0,
];

/// Where the process instruments read their values from.
#[derive(Debug)]
pub struct ProcessSamplers<C = CpuUtilizationSampler, M = MemoryUsageSampler> {
    /// Sampler of [`PROCESS_CPU_UTILIZATION`].
    pub cpu: C,
    /// Sampler of [`PROCESS_MEMORY_USAGE`].
    pub memory: M,
}

impl Default for ProcessSamplers {
    fn default() -> Self {
        ProcessSamplers {
            cpu: CpuUtilizationSampler::default(),
            memory: MemoryUsageSampler::default(),
        }
    }
}

/// The instruments of an HTTP service, created once at startup and shared by
/// every request.
#[derive(Clone, Debug)]
pub struct RequestInstruments {
    /// Incremented by the pre-handling hook.
    pub traffic_volume: Counter<u64>,
    /// Incremented by the post-handling hook for failed requests.
    pub error_rate: Counter<u64>,
    /// Recorded by the post-handling hook.
    pub request_duration: Histogram<f64>,
    /// Sampled by the reader.
    pub cpu_utilization: ObservableGauge<f64>,
    /// Sampled by the reader.
    pub memory_usage: ObservableUpDownCounter<i64>,
}

/// Creates the service instruments on `meter`.
///
/// Calling it again on the same meter returns handles to the same streams.
///
/// ```
/// use telepipe_http::{create_instruments, ProcessSamplers};
/// use telepipe_sdk::metrics::SdkMeterProvider;
///
/// let provider = SdkMeterProvider::builder().build();
/// let instruments = create_instruments(&provider.meter("app"), ProcessSamplers::default()).unwrap();
/// instruments.traffic_volume.add(1, &[]);
/// ```
pub fn create_instruments<C, M>(
    meter: &Meter,
    samplers: ProcessSamplers<C, M>,
) -> MetricResult<RequestInstruments>
where
    C: Sampler<f64>,
    M: Sampler<i64>,
{
    Ok(RequestInstruments {
        traffic_volume: meter
            .u64_counter(TRAFFIC_VOLUME)
            .with_unit("request")
            .with_description("total volume of requests to an endpoint")
            .build()?,
        error_rate: meter
            .u64_counter(ERROR_RATE)
            .with_unit("request")
            .with_description("rate of failed requests")
            .build()?,
        request_duration: meter
            .f64_histogram(HTTP_SERVER_REQUEST_DURATION)
            .with_unit("s")
            .with_description("latency for a request to be served")
            .with_boundaries(DURATION_BOUNDARIES.to_vec())
            .build()?,
        cpu_utilization: meter
            .f64_observable_gauge(PROCESS_CPU_UTILIZATION)
            .with_unit("1")
            .with_description("CPU usage")
            .with_sampler(samplers.cpu)
            .build()?,
        memory_usage: meter
            .i64_observable_up_down_counter(PROCESS_MEMORY_USAGE)
            .with_unit("By")
            .with_description("Amount of memory used")
            .with_sampler(samplers.memory)
            .build()?,
    })
}
