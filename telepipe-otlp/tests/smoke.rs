use futures_util::StreamExt;
use opentelemetry_proto::tonic::collector::metrics::v1::{
    metrics_service_server::{MetricsService, MetricsServiceServer},
    ExportMetricsServiceRequest, ExportMetricsServiceResponse,
};
use opentelemetry_proto::tonic::collector::trace::v1::{
    trace_service_server::{TraceService, TraceServiceServer},
    ExportTraceServiceRequest, ExportTraceServiceResponse,
};
use opentelemetry_proto::tonic::common::v1::any_value::Value as ProtoValue;
use std::net::SocketAddr;
use std::time::Duration;
use telepipe::KeyValue;
use telepipe_otlp::{WithExportConfig, WithTonicConfig};
use telepipe_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use telepipe_sdk::trace::SdkTracerProvider;
use telepipe_sdk::{ExportError, Resource};
use tokio::sync::mpsc;
use tokio_stream::wrappers::TcpListenerStream;

struct MockCollector<T> {
    tx: mpsc::Sender<(tonic::metadata::MetadataMap, T)>,
}

#[tonic::async_trait]
impl TraceService for MockCollector<ExportTraceServiceRequest> {
    async fn export(
        &self,
        request: tonic::Request<ExportTraceServiceRequest>,
    ) -> Result<tonic::Response<ExportTraceServiceResponse>, tonic::Status> {
        let metadata = request.metadata().clone();
        self.tx
            .try_send((metadata, request.into_inner()))
            .expect("channel full");
        Ok(tonic::Response::new(ExportTraceServiceResponse::default()))
    }
}

#[tonic::async_trait]
impl MetricsService for MockCollector<ExportMetricsServiceRequest> {
    async fn export(
        &self,
        request: tonic::Request<ExportMetricsServiceRequest>,
    ) -> Result<tonic::Response<ExportMetricsServiceResponse>, tonic::Status> {
        let metadata = request.metadata().clone();
        self.tx
            .try_send((metadata, request.into_inner()))
            .expect("channel full");
        Ok(tonic::Response::new(ExportMetricsServiceResponse::default()))
    }
}

type Received<T> = mpsc::Receiver<(tonic::metadata::MetadataMap, T)>;

async fn setup() -> (
    SocketAddr,
    Received<ExportTraceServiceRequest>,
    Received<ExportMetricsServiceRequest>,
) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind");
    let addr = listener.local_addr().unwrap();
    let stream = TcpListenerStream::new(listener).map(|s| s);

    let (trace_tx, trace_rx) = mpsc::channel(10);
    let (metrics_tx, metrics_rx) = mpsc::channel(10);
    tokio::task::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(TraceServiceServer::new(MockCollector { tx: trace_tx }))
            .add_service(MetricsServiceServer::new(MockCollector { tx: metrics_tx }))
            .serve_with_incoming(stream)
            .await
            .expect("server failed")
    });
    (addr, trace_rx, metrics_rx)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn spans_reach_collector() {
    let (addr, mut trace_rx, _) = setup().await;

    let mut metadata = tonic::metadata::MetadataMap::new();
    metadata.insert("x-tenant", "checkout".parse().unwrap());
    let exporter = telepipe_otlp::SpanExporter::builder()
        .with_endpoint(format!("http://{addr}"))
        .with_insecure(true)
        .with_metadata(metadata)
        .build()
        .expect("span exporter");
    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(Resource::builder_empty().with_service_name("checkout").build())
        .build();

    provider.tracer("smoke").in_span("GET /orders", |_cx| {});
    provider.shutdown().expect("shutdown");

    let (metadata, request) = trace_rx.recv().await.expect("missing export request");
    assert_eq!(metadata.get("x-tenant").unwrap(), "checkout");
    let resource_spans = &request.resource_spans[0];
    let service_name = resource_spans
        .resource
        .as_ref()
        .and_then(|r| r.attributes.iter().find(|kv| kv.key == "service.name"))
        .and_then(|kv| kv.value.clone())
        .and_then(|v| v.value);
    assert_eq!(service_name, Some(ProtoValue::StringValue("checkout".into())));
    let scope_spans = &resource_spans.scope_spans[0];
    assert_eq!(scope_spans.scope.as_ref().unwrap().name, "smoke");
    assert_eq!(scope_spans.spans[0].name, "GET /orders");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn metrics_reach_collector() {
    let (addr, _, mut metrics_rx) = setup().await;

    let exporter = telepipe_otlp::MetricExporter::builder()
        .with_endpoint(format!("http://{addr}"))
        .with_insecure(true)
        .build()
        .expect("metric exporter");
    let provider = SdkMeterProvider::builder()
        .with_reader(
            PeriodicReader::builder(exporter)
                .with_interval(Duration::from_secs(3600))
                .build(),
        )
        .build();
    let counter = provider
        .meter("smoke")
        .u64_counter("traffic_volume")
        .build()
        .unwrap();
    counter.add(3, &[KeyValue::new("http.route", "/")]);
    provider.force_flush().expect("flush");

    let (_, request) = metrics_rx.recv().await.expect("missing export request");
    let metric = &request.resource_metrics[0].scope_metrics[0].metrics[0];
    assert_eq!(metric.name, "traffic_volume");
    provider.shutdown().expect("shutdown");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreachable_collector_fails_the_flush() {
    let closed = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = closed.local_addr().unwrap();
    drop(closed);

    let exporter = telepipe_otlp::MetricExporter::builder()
        .with_endpoint(format!("http://{addr}"))
        .with_insecure(true)
        .with_timeout(Duration::from_millis(500))
        .build()
        .expect("metric exporter");
    let provider = SdkMeterProvider::builder()
        .with_reader(
            PeriodicReader::builder(exporter)
                .with_interval(Duration::from_secs(3600))
                .build(),
        )
        .build();
    let counter = provider.meter("smoke").u64_counter("c").build().unwrap();
    counter.add(1, &[]);

    assert!(matches!(provider.force_flush(), Err(ExportError::Failed(_))));
}
