//! Core types shared by every part of the telepipe telemetry pipeline.
//!
//! This crate holds the pieces that instrumentation code and exporters agree
//! on without depending on any particular pipeline configuration:
//!
//! * [`Context`] and the thread-local current-context stack
//!   ([`Context::attach`], [`context::detach`]).
//! * Trace identity ([`trace::TraceId`], [`trace::SpanId`],
//!   [`trace::SpanContext`]) and the span slot carried by a context.
//! * [`baggage::Baggage`], user supplied key-values that travel with a request.
//! * Carrier traits for propagation ([`propagation::Injector`],
//!   [`propagation::Extractor`], [`propagation::TextMapPropagator`]).
//! * Attribute types ([`Key`], [`Value`], [`KeyValue`]) and
//!   [`InstrumentationScope`].
//!
//! The SDK (`telepipe_sdk`) builds providers, processors and exporters on top
//! of these types.
//!
//! # Internal logs
//!
//! With the `internal-logs` feature (enabled by default) the pipeline reports
//! its own diagnostics through [`tracing`](https://docs.rs/tracing) using the
//! `otel_debug!`, `otel_info!`, `otel_warn!` and `otel_error!` macros. Install
//! any `tracing` subscriber to see them; filter on the `telepipe` targets.
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

mod common;
pub use common::{Array, InstrumentationScope, InstrumentationScopeBuilder, Key, KeyValue, Value};

pub mod baggage;

pub mod context;
pub use context::{Context, ContextGuard, ContextToken};

pub mod propagation;

pub mod trace;

mod internal_logging;

#[doc(hidden)]
#[cfg(feature = "internal-logs")]
pub mod _private {
    pub use tracing::{debug, error, info, warn}; // Re-export
}
