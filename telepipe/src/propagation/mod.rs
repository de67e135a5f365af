//! Carrying a [`Context`](crate::Context) across process boundaries.
//!
//! A [`TextMapPropagator`] writes the parts of a context it understands into
//! a carrier through an [`Injector`], and reads them back through an
//! [`Extractor`]. HTTP header maps, plain `HashMap`s and anything else with
//! string keys can act as carriers.
use std::collections::HashMap;

mod composite;
mod text_map_propagator;

pub use composite::TextMapCompositePropagator;
pub use text_map_propagator::{FieldIter, TextMapPropagator};

/// Injector provides an interface for adding fields to an underlying carrier.
pub trait Injector {
    /// Add a key and value to the underlying data.
    fn set(&mut self, key: &str, value: String);
}

/// Extractor provides an interface for reading fields from an underlying
/// carrier.
pub trait Extractor {
    /// Get a value from a key from the underlying data.
    fn get(&self, key: &str) -> Option<&str>;

    /// Collect all the keys from the underlying data.
    fn keys(&self) -> Vec<&str>;
}

impl<S: std::hash::BuildHasher> Injector for HashMap<String, String, S> {
    /// Set a key and value in the HashMap. Keys are stored lowercased.
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_lowercase(), value);
    }
}

impl<S: std::hash::BuildHasher> Extractor for HashMap<String, String, S> {
    /// Get a value for a key from the HashMap, ignoring case.
    fn get(&self, key: &str) -> Option<&str> {
        self.get(&key.to_lowercase()).map(String::as_str)
    }

    fn keys(&self) -> Vec<&str> {
        self.keys().map(String::as_str).collect()
    }
}

/// Reasons a propagator could not read its fields from a carrier.
///
/// Propagators never surface these to callers: a decode failure means the
/// request simply has no incoming context. They are reported through the
/// internal log.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PropagationError {
    /// The header was present but could not be parsed.
    #[error("cannot decode {header} header: {reason}")]
    Decode {
        /// Name of the offending header.
        header: &'static str,
        /// What was wrong with it.
        reason: &'static str,
    },
}

impl PropagationError {
    /// Shorthand for a [`PropagationError::Decode`].
    pub fn decode(header: &'static str, reason: &'static str) -> Self {
        PropagationError::Decode { header, reason }
    }
}
