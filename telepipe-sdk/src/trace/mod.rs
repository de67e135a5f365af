//! # Trace SDK
//!
//! The tracing pipeline: a [`SdkTracerProvider`] owns the span processors and
//! hands out [`Tracer`]s; tracers start [`Span`]s; ended spans become
//! [`SpanData`] and flow through every registered [`SpanProcessor`] to a
//! [`SpanExporter`].
//!
//! Spans are always recorded. The sampled flag is inherited from the parent
//! span context and set on new roots.
mod export;
mod id_generator;
#[cfg(any(test, feature = "testing"))]
mod in_memory_exporter;
mod provider;
mod span;
mod span_processor;
mod tracer;

pub use export::{SpanData, SpanEvent, SpanExporter};
pub use id_generator::{IdGenerator, RandomIdGenerator};
#[cfg(any(test, feature = "testing"))]
pub use in_memory_exporter::InMemorySpanExporter;
pub use provider::{SdkTracerProvider, TracerProviderBuilder};
pub use span::Span;
pub use span_processor::{
    BatchSpanProcessor, BatchSpanProcessorBuilder, SimpleSpanProcessor, SpanProcessor,
};
pub use tracer::{SpanBuilder, Tracer};
