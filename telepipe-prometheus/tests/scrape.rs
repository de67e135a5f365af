use bytes::Bytes;
use http::{header, Request, StatusCode};
use http_body_util::{BodyExt, Empty};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use telepipe::KeyValue;
use telepipe_prometheus::{ScrapeServer, ServerConfig, CONTENT_TYPE};
use telepipe_sdk::metrics::SdkMeterProvider;
use tokio::net::TcpStream;

async fn get(addr: SocketAddr, path: &str) -> (StatusCode, Option<String>, String) {
    let stream = TcpStream::connect(addr).await.expect("connect");
    let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .expect("handshake");
    tokio::spawn(connection);

    let request = Request::get(path)
        .header(header::HOST, addr.to_string())
        .body(Empty::<Bytes>::new())
        .unwrap();
    let response = sender.send_request(request).await.expect("response");
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, content_type, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn serves_scrapes_until_shutdown() {
    let exporter = telepipe_prometheus::exporter().without_scope_info().build();
    let provider = SdkMeterProvider::builder()
        .with_reader(exporter.clone())
        .build();
    let counter = provider
        .meter("http")
        .u64_counter("traffic_volume")
        .with_unit("request")
        .build()
        .unwrap();
    counter.add(3, &[KeyValue::new("http.route", "/orders")]);

    let config = ServerConfig::default().with_host("127.0.0.1").with_port(0);
    let server = ScrapeServer::bind(exporter, config).await.expect("bind");
    let addr = server.local_addr();

    let (status, content_type, body) = get(addr, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some(CONTENT_TYPE));
    assert!(
        body.contains("traffic_volume_total{http_route=\"/orders\"} 3\n"),
        "{body}"
    );

    counter.add(2, &[KeyValue::new("http.route", "/orders")]);
    let (_, _, body) = get(addr, "/metrics").await;
    assert!(body.contains("traffic_volume_total{http_route=\"/orders\"} 5\n"), "{body}");

    let (status, _, _) = get(addr, "/").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    provider.shutdown().unwrap();
    let (status, _, _) = get(addr, "/metrics").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    server.shutdown().await;
    assert!(TcpStream::connect(addr).await.is_err());
}
