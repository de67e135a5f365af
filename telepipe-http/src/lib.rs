//! HTTP integration for the telepipe telemetry pipeline.
//!
//! - [`HeaderInjector`] and [`HeaderExtractor`] carry a
//!   [`Context`](telepipe::Context) through [`http::HeaderMap`]s.
//! - [`create_instruments`] creates the request and process instruments of a
//!   service once at startup.
//! - [`TelemetryLayer`] wraps a [`tower::Service`] with the pre- and
//!   post-handling hooks that open the request span, record the request
//!   metrics and make the request's context current while the handler runs.
//!
//! ```
//! use http::{Request, Response};
//! use std::convert::Infallible;
//! use telepipe_http::{create_instruments, ProcessSamplers, TelemetryLayer};
//! use telepipe_sdk::metrics::SdkMeterProvider;
//! use telepipe_sdk::trace::SdkTracerProvider;
//! use tower::{service_fn, Layer, ServiceExt};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let tracer_provider = SdkTracerProvider::builder().build();
//! let meter_provider = SdkMeterProvider::builder().build();
//! let instruments =
//!     create_instruments(&meter_provider.meter("http"), ProcessSamplers::default()).unwrap();
//!
//! let service = TelemetryLayer::new(tracer_provider.tracer("http"), instruments).layer(
//!     service_fn(|_request: Request<()>| async { Ok::<_, Infallible>(Response::new("ok")) }),
//! );
//!
//! let response = service.oneshot(Request::get("/orders").body(()).unwrap()).await.unwrap();
//! assert_eq!(response.into_body(), "ok");
//! # }
//! ```
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod carrier;
mod instruments;
mod middleware;

pub use carrier::{HeaderExtractor, HeaderInjector};
pub use instruments::{
    create_instruments, ProcessSamplers, RequestInstruments, DURATION_BOUNDARIES, ERROR_RATE,
    HTTP_REQUEST_METHOD, HTTP_RESPONSE_STATUS_CODE, HTTP_ROUTE, HTTP_SERVER_REQUEST_DURATION,
    PROCESS_CPU_UTILIZATION, PROCESS_MEMORY_USAGE, TRAFFIC_VOLUME,
};
pub use middleware::{
    ErrorClassifier, MatchedRoute, RequestScope, ResponseFuture, TelemetryLayer,
    TelemetryService,
};
