use std::convert::Infallible;
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{Method, Request, Response, StatusCode};
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use telepipe::{otel_debug, otel_error, otel_info, otel_warn};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::{exposition, Error, PrometheusExporter};

/// Host the scrape endpoint listens on.
pub const OTEL_EXPORTER_PROMETHEUS_HOST: &str = "OTEL_EXPORTER_PROMETHEUS_HOST";
/// Default host: all interfaces.
pub const OTEL_EXPORTER_PROMETHEUS_HOST_DEFAULT: &str = "0.0.0.0";
/// Port the scrape endpoint listens on.
pub const OTEL_EXPORTER_PROMETHEUS_PORT: &str = "OTEL_EXPORTER_PROMETHEUS_PORT";
/// Default port.
pub const OTEL_EXPORTER_PROMETHEUS_PORT_DEFAULT: u16 = 8000;
/// Path that serves metrics, every other path answers 404.
pub const DEFAULT_METRICS_PATH: &str = "/metrics";

/// Where the scrape endpoint listens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    host: String,
    port: u16,
    path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: OTEL_EXPORTER_PROMETHEUS_HOST_DEFAULT.to_owned(),
            port: OTEL_EXPORTER_PROMETHEUS_PORT_DEFAULT,
            path: DEFAULT_METRICS_PATH.to_owned(),
        }
    }
}

impl ServerConfig {
    /// Reads [OTEL_EXPORTER_PROMETHEUS_HOST] and
    /// [OTEL_EXPORTER_PROMETHEUS_PORT], falling back to the defaults for unset
    /// or unparseable values.
    pub fn from_env() -> Self {
        let mut config = ServerConfig::default();
        if let Some(host) = env::var(OTEL_EXPORTER_PROMETHEUS_HOST)
            .ok()
            .filter(|host| !host.trim().is_empty())
        {
            config.host = host.trim().to_owned();
        }
        if let Ok(port) = env::var(OTEL_EXPORTER_PROMETHEUS_PORT) {
            match port.trim().parse() {
                Ok(port) => config.port = port,
                Err(_) => {
                    otel_warn!(
                        name: "Prometheus.InvalidPort",
                        value = port.as_str(),
                        default = OTEL_EXPORTER_PROMETHEUS_PORT_DEFAULT
                    );
                }
            }
        }
        config
    }

    /// Sets the host, a name or an IP address.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the port, `0` picks a free one.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the path serving metrics.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// The configured host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The configured port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The configured path.
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// A running scrape endpoint.
///
/// Stops accepting connections on [shutdown](ScrapeServer::shutdown) or when
/// dropped.
#[derive(Debug)]
pub struct ScrapeServer {
    local_addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ScrapeServer {
    /// Binds the endpoint and starts serving on the current Tokio runtime.
    pub async fn bind(exporter: PrometheusExporter, config: ServerConfig) -> Result<Self, Error> {
        if !config.path.starts_with('/') {
            return Err(Error::InvalidConfig(format!(
                "path {:?} must start with '/'",
                config.path
            )));
        }
        let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
        let local_addr = listener.local_addr()?;
        otel_info!(
            name: "Prometheus.ServerStarted",
            address = local_addr.to_string(),
            path = config.path.as_str()
        );

        let scrape = Arc::new(Scrape {
            exporter,
            path: config.path,
        });
        let (stop, stopped) = oneshot::channel();
        let task = tokio::spawn(accept_loop(listener, scrape, stopped));
        Ok(ScrapeServer {
            local_addr,
            stop: Some(stop),
            task: Some(task),
        })
    }

    /// The bound address, useful with port `0`.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting connections and waits for the accept loop to end.
    /// Connections already accepted finish on their own.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ScrapeServer {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

async fn accept_loop(listener: TcpListener, scrape: Arc<Scrape>, mut stopped: oneshot::Receiver<()>) {
    loop {
        tokio::select! {
            _ = &mut stopped => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let scrape = Arc::clone(&scrape);
                    tokio::spawn(async move {
                        let service = service_fn(move |request| {
                            let response = scrape.respond(&request);
                            async move { Ok::<_, Infallible>(response) }
                        });
                        if let Err(err) = http1::Builder::new()
                            .serve_connection(TokioIo::new(stream), service)
                            .await
                        {
                            otel_debug!(name: "Prometheus.ConnectionFailed", error = err.to_string());
                        }
                    });
                }
                Err(err) => {
                    otel_warn!(name: "Prometheus.AcceptFailed", error = err.to_string());
                }
            },
        }
    }
    otel_debug!(name: "Prometheus.ServerStopped");
}

#[derive(Debug)]
struct Scrape {
    exporter: PrometheusExporter,
    path: String,
}

impl Scrape {
    fn respond<B>(&self, request: &Request<B>) -> Response<Full<Bytes>> {
        if request.uri().path() != self.path {
            return plain(StatusCode::NOT_FOUND, "not found\n".to_owned());
        }
        if request.method() != Method::GET && request.method() != Method::HEAD {
            return plain(StatusCode::METHOD_NOT_ALLOWED, "method not allowed\n".to_owned());
        }

        match self.exporter.export() {
            Ok(text) => {
                let mut response = Response::new(Full::new(Bytes::from(text)));
                response.headers_mut().insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static(exposition::CONTENT_TYPE),
                );
                response
            }
            Err(err) => {
                otel_error!(name: "Prometheus.ScrapeFailed", error = err.to_string());
                plain(StatusCode::INTERNAL_SERVER_ERROR, format!("{err}\n"))
            }
        }
    }
}

fn plain(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use telepipe_sdk::metrics::SdkMeterProvider;

    #[test]
    fn config_defaults() {
        temp_env::with_vars_unset(
            [OTEL_EXPORTER_PROMETHEUS_HOST, OTEL_EXPORTER_PROMETHEUS_PORT],
            || {
                assert_eq!(ServerConfig::from_env(), ServerConfig::default());
                assert_eq!(ServerConfig::default().host(), "0.0.0.0");
                assert_eq!(ServerConfig::default().port(), 8000);
                assert_eq!(ServerConfig::default().path(), "/metrics");
            },
        );
    }

    #[test]
    fn config_from_env() {
        temp_env::with_vars(
            [
                (OTEL_EXPORTER_PROMETHEUS_HOST, Some("127.0.0.1")),
                (OTEL_EXPORTER_PROMETHEUS_PORT, Some("9464")),
            ],
            || {
                let config = ServerConfig::from_env();
                assert_eq!(config.host(), "127.0.0.1");
                assert_eq!(config.port(), 9464);
            },
        );
    }

    #[test]
    fn invalid_port_falls_back() {
        temp_env::with_var(OTEL_EXPORTER_PROMETHEUS_PORT, Some("eighty"), || {
            assert_eq!(ServerConfig::from_env().port(), 8000);
        });
    }

    #[test]
    fn routes() {
        let exporter = crate::exporter().build();
        let provider = SdkMeterProvider::builder()
            .with_reader(exporter.clone())
            .build();
        let scrape = Scrape {
            exporter,
            path: DEFAULT_METRICS_PATH.to_owned(),
        };
        let request = |method: Method, path: &str| {
            let mut request = Request::new(());
            *request.method_mut() = method;
            *request.uri_mut() = path.parse().unwrap();
            request
        };

        let ok = scrape.respond(&request(Method::GET, "/metrics"));
        assert_eq!(ok.status(), StatusCode::OK);
        assert_eq!(ok.headers()[CONTENT_TYPE], exposition::CONTENT_TYPE);
        assert_eq!(
            scrape.respond(&request(Method::GET, "/other")).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            scrape.respond(&request(Method::POST, "/metrics")).status(),
            StatusCode::METHOD_NOT_ALLOWED
        );

        provider.shutdown().unwrap();
        assert_eq!(
            scrape.respond(&request(Method::GET, "/metrics")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn relative_path_is_rejected() {
        let config = ServerConfig::default().with_path("metrics");
        assert!(matches!(
            ScrapeServer::bind(crate::exporter().build(), config).await,
            Err(Error::InvalidConfig(_))
        ));
    }
}
