//! Request telemetry as a [`tower::Layer`].
//!
//! Every request passes through two hooks. The pre-handling hook runs in
//! [`Service::call`]: it extracts the propagated parent from the request
//! headers, opens a server span and counts the request. The post-handling hook
//! runs when the [`RequestScope`] guard is dropped, which happens once the
//! response future completes, or when it is dropped unfinished because the
//! handler panicked or the client went away.
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context as TaskContext, Poll};
use std::time::Instant;

use http::{Request, Response, StatusCode};
use pin_project_lite::pin_project;
use telepipe::context::{FutureExt, WithContext};
use telepipe::propagation::{TextMapCompositePropagator, TextMapPropagator};
use telepipe::trace::{SpanKind, Status, TraceContextExt};
use telepipe::{otel_debug, Context, KeyValue};
use telepipe_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use telepipe_sdk::trace::{Span, Tracer};
use tower::{Layer, Service};

use crate::carrier::HeaderExtractor;
use crate::instruments::{
    RequestInstruments, HTTP_REQUEST_METHOD, HTTP_RESPONSE_STATUS_CODE, HTTP_ROUTE,
};

/// Decides which responses count towards `error_rate`.
#[derive(Clone)]
pub struct ErrorClassifier(Arc<dyn Fn(StatusCode) -> bool + Send + Sync>);

impl ErrorClassifier {
    /// Uses `predicate` to classify response statuses.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(StatusCode) -> bool + Send + Sync + 'static,
    {
        ErrorClassifier(Arc::new(predicate))
    }

    /// Whether `status` is a failed request.
    pub fn is_error(&self, status: StatusCode) -> bool {
        (self.0)(status)
    }
}

/// Client and server errors, `status >= 400`.
impl Default for ErrorClassifier {
    fn default() -> Self {
        ErrorClassifier::new(|status| status.as_u16() >= 400)
    }
}

impl fmt::Debug for ErrorClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ErrorClassifier")
    }
}

/// The route template a router matched, e.g. `/orders/{id}`.
///
/// Routers insert it as a request extension before the request reaches the
/// middleware. Without it the URI path is used as the route, which can blow
/// up the number of distinct `http.route` values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchedRoute(pub String);

/// Adds spans, request metrics and context propagation to a service.
///
/// ```
/// use telepipe_http::{create_instruments, ProcessSamplers, TelemetryLayer};
/// use telepipe_sdk::metrics::SdkMeterProvider;
/// use telepipe_sdk::trace::SdkTracerProvider;
///
/// let tracer_provider = SdkTracerProvider::builder().build();
/// let meter_provider = SdkMeterProvider::builder().build();
/// let instruments =
///     create_instruments(&meter_provider.meter("http"), ProcessSamplers::default()).unwrap();
///
/// let layer = TelemetryLayer::new(tracer_provider.tracer("http"), instruments)
///     .with_error_classifier(|status| status.is_server_error());
/// # let _ = layer;
/// ```
#[derive(Clone, Debug)]
pub struct TelemetryLayer {
    tracer: Tracer,
    instruments: RequestInstruments,
    propagator: Arc<dyn TextMapPropagator + Send + Sync>,
    classifier: ErrorClassifier,
}

impl TelemetryLayer {
    /// Creates a layer extracting `traceparent` and `baggage` headers and
    /// counting every status from 400 on as an error.
    pub fn new(tracer: Tracer, instruments: RequestInstruments) -> Self {
        TelemetryLayer {
            tracer,
            instruments,
            propagator: Arc::new(TextMapCompositePropagator::new(vec![
                Box::new(TraceContextPropagator::new()),
                Box::new(BaggagePropagator::new()),
            ])),
            classifier: ErrorClassifier::default(),
        }
    }

    /// Replaces the propagator used to extract the incoming context.
    pub fn with_propagator<P>(mut self, propagator: P) -> Self
    where
        P: TextMapPropagator + Send + Sync + 'static,
    {
        self.propagator = Arc::new(propagator);
        self
    }

    /// Replaces the predicate deciding which statuses count as errors.
    pub fn with_error_classifier<F>(mut self, predicate: F) -> Self
    where
        F: Fn(StatusCode) -> bool + Send + Sync + 'static,
    {
        self.classifier = ErrorClassifier::new(predicate);
        self
    }
}

impl<S> Layer<S> for TelemetryLayer {
    type Service = TelemetryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TelemetryService {
            inner,
            layer: Arc::new(self.clone()),
        }
    }
}

/// A service wrapped by [`TelemetryLayer`].
#[derive(Clone, Debug)]
pub struct TelemetryService<S> {
    inner: S,
    layer: Arc<TelemetryLayer>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for TelemetryService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Error: fmt::Display,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let scope = RequestScope::begin(Arc::clone(&self.layer), &request);
        let cx = scope.cx.clone();

        // handlers may do work before returning their future
        let inner = {
            let _guard = cx.clone().attach();
            self.inner.call(request)
        };

        ResponseFuture {
            inner: inner.with_context(cx),
            scope: Some(scope),
        }
    }
}

pin_project! {
    /// Response future of [`TelemetryService`].
    ///
    /// Polls the handler with the request's context attached and finishes
    /// the request scope with the handler's outcome.
    pub struct ResponseFuture<F> {
        #[pin]
        inner: WithContext<F>,
        scope: Option<RequestScope>,
    }
}

impl<F> fmt::Debug for ResponseFuture<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseFuture")
            .field("scope", &self.scope)
            .finish()
    }
}

impl<F, ResBody, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<Response<ResBody>, E>>,
    E: fmt::Display,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, task_cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let result = ready!(this.inner.poll(task_cx));

        if let Some(mut scope) = this.scope.take() {
            match &result {
                Ok(response) => scope.status = Some(response.status()),
                Err(err) => scope.handler_error = Some(err.to_string()),
            }
        }
        Poll::Ready(result)
    }
}

/// One request between its pre- and post-handling hooks.
///
/// Created by the pre-handling hook; dropping it runs the post-handling hook.
/// A scope dropped without an outcome is recorded as a 500 whose span carries
/// an error.
pub struct RequestScope {
    layer: Arc<TelemetryLayer>,
    span: Span,
    cx: Context,
    method: String,
    route: String,
    start: Instant,
    status: Option<StatusCode>,
    handler_error: Option<String>,
}

impl RequestScope {
    fn begin<B>(layer: Arc<TelemetryLayer>, request: &Request<B>) -> Self {
        let method = request.method().as_str().to_owned();
        let route = request
            .extensions()
            .get::<MatchedRoute>()
            .map(|route| route.0.clone())
            .unwrap_or_else(|| request.uri().path().to_owned());

        let parent_cx = layer.propagator.extract(&HeaderExtractor(request.headers()));
        let span = layer
            .tracer
            .span_builder(format!("{method} {route}"))
            .with_kind(SpanKind::Server)
            .with_attributes([
                KeyValue::new(HTTP_REQUEST_METHOD, method.clone()),
                KeyValue::new(HTTP_ROUTE, route.clone()),
            ])
            .start_with_context(&layer.tracer, &parent_cx);
        let cx = parent_cx.with_span(span.slot());

        layer
            .instruments
            .traffic_volume
            .add(1, &[KeyValue::new(HTTP_ROUTE, route.clone())]);

        RequestScope {
            layer,
            span,
            cx,
            method,
            route,
            start: Instant::now(),
            status: None,
            handler_error: None,
        }
    }

    /// The context the handler runs in: the extracted parent with this
    /// request's span active.
    pub fn context(&self) -> &Context {
        &self.cx
    }
}

impl fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestScope")
            .field("method", &self.method)
            .field("route", &self.route)
            .field("status", &self.status)
            .finish()
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed().as_secs_f64();
        if self.status.is_none() && self.handler_error.is_none() {
            otel_debug!(
                name: "HttpMiddleware.RequestIncomplete",
                method = self.method.as_str(),
                route = self.route.as_str()
            );
            self.handler_error = Some("request did not complete".to_owned());
        }
        let status = self.status.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let status_code = KeyValue::new(HTTP_RESPONSE_STATUS_CODE, i64::from(status.as_u16()));

        self.layer.instruments.request_duration.record(
            elapsed,
            &[
                KeyValue::new(HTTP_REQUEST_METHOD, self.method.clone()),
                KeyValue::new(HTTP_ROUTE, self.route.clone()),
                status_code.clone(),
            ],
        );
        if self.layer.classifier.is_error(status) {
            self.layer.instruments.error_rate.add(
                1,
                &[KeyValue::new(HTTP_ROUTE, self.route.clone()), status_code.clone()],
            );
        }

        self.span.set_attribute(status_code);
        match self.handler_error.take() {
            Some(message) => {
                self.span.add_event(
                    "exception",
                    vec![KeyValue::new("exception.message", message.clone())],
                );
                self.span.set_status(Status::error(message));
            }
            None if status.is_server_error() => {
                self.span.set_status(Status::error(status.to_string()));
            }
            None => {}
        }
        self.span.end();
    }
}
