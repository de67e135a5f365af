//! # telepipe-appender-tracing
//!
//! Bridges the [`tracing`] crate into the telepipe log pipeline. Applications
//! keep logging with `tracing::info!` and friends; every event becomes a log
//! record of an [`SdkLoggerProvider`] and travels through its processors and
//! exporters.
//!
//! Events emitted while a request span is active carry its trace id and span
//! id, so logs and traces of one request can be joined in the backend.
//!
//! Events whose target starts with `telepipe` are the pipeline's own
//! diagnostics and are never bridged. Route them to a `fmt` layer instead.
//!
//! ```
//! use telepipe_appender_tracing::layer::TelepipeTracingBridge;
//! use telepipe_sdk::logs::SdkLoggerProvider;
//! use tracing_subscriber::prelude::*;
//!
//! let provider = SdkLoggerProvider::builder().build();
//! let bridge = TelepipeTracingBridge::new(&provider);
//! let subscriber = tracing_subscriber::registry().with(bridge);
//!
//! tracing::subscriber::with_default(subscriber, || {
//!     tracing::error!(name: "CheckoutFailed", order_id = 7, "payment declined");
//! });
//! ```
//!
//! [`SdkLoggerProvider`]: telepipe_sdk::logs::SdkLoggerProvider
#![warn(missing_debug_implementations, missing_docs, rust_2018_idioms, unreachable_pub)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod layer;
