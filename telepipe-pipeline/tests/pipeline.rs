use telepipe::KeyValue;
use telepipe_http::{ProcessSamplers, TRAFFIC_VOLUME};
use telepipe_otlp::ExportConfig;
use telepipe_pipeline::{
    standard_views, ExporterKind, PipelineConfig, PipelineError, Signal, TelemetryPipeline,
};
use telepipe_prometheus::ServerConfig;

fn prometheus_only() -> PipelineConfig {
    PipelineConfig::default()
        .with_service_name("checkout")
        .with_service_version("2.4.1")
        .with_exporters(Signal::Traces, [])
        .unwrap()
        .with_exporters(Signal::Logs, [])
        .unwrap()
        .with_exporters(Signal::Metrics, [ExporterKind::Prometheus])
        .unwrap()
        .with_prometheus(ServerConfig::default().with_host("127.0.0.1").with_port(0))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn prometheus_pipeline_serves_viewed_metrics() {
    let pipeline = TelemetryPipeline::init(prometheus_only(), standard_views().unwrap())
        .await
        .unwrap();
    assert!(pipeline.scrape_addr().is_some());

    let _layer = pipeline
        .http_layer(ProcessSamplers {
            cpu: || 0.5,
            memory: || 4096_i64,
        })
        .unwrap();
    let counter = pipeline
        .meter("telepipe-http")
        .u64_counter(TRAFFIC_VOLUME)
        .with_unit("request")
        .with_description("total volume of requests to an endpoint")
        .build()
        .unwrap();
    for _ in 0..3 {
        counter.add(1, &[KeyValue::new("route", "/")]);
    }

    let text = pipeline.prometheus_exporter().unwrap().export().unwrap();
    assert!(text.contains("test_total{route=\"/\",otel_scope_name=\"telepipe-http\"} 3"), "{text}");
    assert!(text.contains("service_name=\"checkout\""), "{text}");
    assert!(text.contains("process_memory_usage"), "{text}");
    assert!(!text.contains("process_cpu_utilization"), "{text}");
    assert!(!text.contains("traffic_volume"), "{text}");

    pipeline.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disabled_signals_still_hand_out_providers() {
    let config = prometheus_only()
        .with_exporters(Signal::Metrics, [])
        .unwrap();
    let pipeline = TelemetryPipeline::init(config, Vec::new()).await.unwrap();

    assert!(pipeline.prometheus_exporter().is_none());
    assert!(pipeline.scrape_addr().is_none());
    drop(pipeline.tracer("checkout").start("noop"));
    pipeline.force_flush().unwrap();

    pipeline.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalid_otlp_endpoint_fails_init() {
    let config = prometheus_only()
        .with_exporters(Signal::Traces, [ExporterKind::Otlp])
        .unwrap()
        .with_exporters(Signal::Metrics, [])
        .unwrap()
        .with_otlp(ExportConfig {
            endpoint: Some("http://local host:4317".into()),
            ..ExportConfig::default()
        });

    let result = TelemetryPipeline::init(config, Vec::new()).await;
    assert!(matches!(result, Err(PipelineError::Otlp(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn secure_otlp_without_tls_is_rejected() {
    let config = prometheus_only()
        .with_exporters(Signal::Logs, [ExporterKind::Otlp])
        .unwrap()
        .with_exporters(Signal::Metrics, [])
        .unwrap()
        .with_otlp(ExportConfig {
            insecure: Some(false),
            ..ExportConfig::default()
        });

    let result = TelemetryPipeline::init(config, Vec::new()).await;
    assert!(matches!(
        result,
        Err(PipelineError::Otlp(telepipe_otlp::Error::InvalidConfig { .. }))
    ));
}
