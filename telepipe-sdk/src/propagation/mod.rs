//! W3C propagators: [`TraceContextPropagator`] for `traceparent` and
//! [`BaggagePropagator`] for `baggage`.
//!
//! Combine them with [`telepipe::propagation::TextMapCompositePropagator`]
//! to carry both across a request boundary.
mod baggage;
mod trace_context;

pub use baggage::BaggagePropagator;
pub use trace_context::TraceContextPropagator;
