//! Rules that reshape instruments into the streams that get exported.
//!
//! A [`View`] selects instruments by name (exact, or with a single `*`
//! wildcard) and/or kind, and changes how they are exported: rename,
//! re-describe, drop, change the aggregation, or keep only some attribute
//! keys. Views are registered on the
//! [`MeterProviderBuilder`](crate::metrics::MeterProviderBuilder) and are
//! applied when an instrument is created, so call sites never change.
//!
//! ```
//! use telepipe_sdk::metrics::{Aggregation, View};
//!
//! let latency = View::builder()
//!     .with_instrument_name("http.server.request.duration")
//!     .with_aggregation(Aggregation::ExplicitBucketHistogram {
//!         boundaries: vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0],
//!         record_min_max: true,
//!     })
//!     .build()
//!     .unwrap();
//!
//! let no_debug_metrics = View::builder()
//!     .with_instrument_name("debug.*")
//!     .drop()
//!     .build()
//!     .unwrap();
//! # drop((latency, no_debug_metrics));
//! ```
use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::Arc;

use telepipe::{otel_warn, Key};

use crate::metrics::error::{MetricError, MetricResult};
use crate::metrics::{Aggregation, Instrument, InstrumentKind};

#[derive(Clone, Debug, PartialEq)]
enum NamePattern {
    Exact(String),
    Wildcard { prefix: String, suffix: String },
}

impl NamePattern {
    fn parse(name: &str) -> MetricResult<Self> {
        let name = name.to_ascii_lowercase();
        match name.matches('*').count() {
            0 => Ok(NamePattern::Exact(name)),
            1 => {
                let (prefix, suffix) = name.split_once('*').unwrap_or((&name, ""));
                Ok(NamePattern::Wildcard {
                    prefix: prefix.to_owned(),
                    suffix: suffix.to_owned(),
                })
            }
            _ => Err(MetricError::Config(format!(
                "view: instrument name {name:?} has more than one wildcard"
            ))),
        }
    }

    fn matches(&self, name: &str) -> bool {
        let name = name.to_ascii_lowercase();
        match self {
            NamePattern::Exact(exact) => *exact == name,
            NamePattern::Wildcard { prefix, suffix } => {
                name.len() >= prefix.len() + suffix.len()
                    && name.starts_with(prefix.as_str())
                    && name.ends_with(suffix.as_str())
            }
        }
    }
}

/// A rule that changes how matching instruments are exported.
///
/// Built with [`View::builder`].
#[derive(Clone, Debug, PartialEq)]
pub struct View {
    name: Option<NamePattern>,
    kind: Option<InstrumentKind>,
    rename: Option<Cow<'static, str>>,
    description: Option<Cow<'static, str>>,
    aggregation: Option<Aggregation>,
    allowed_attribute_keys: Option<Arc<HashSet<Key>>>,
    drop: bool,
}

impl View {
    /// Starts a new view definition.
    pub fn builder() -> ViewBuilder {
        ViewBuilder::default()
    }

    /// Whether this view selects `instrument`.
    pub fn matches(&self, instrument: &Instrument) -> bool {
        self.name
            .as_ref()
            .map_or(true, |pattern| pattern.matches(instrument.name()))
            && self.kind.map_or(true, |kind| kind == instrument.kind())
    }

    fn is_exact(&self) -> bool {
        matches!(self.name, Some(NamePattern::Exact(_)))
    }
}

/// Configuration for a [`View`].
#[derive(Debug, Default)]
pub struct ViewBuilder {
    name: Option<String>,
    kind: Option<InstrumentKind>,
    rename: Option<Cow<'static, str>>,
    description: Option<Cow<'static, str>>,
    aggregation: Option<Aggregation>,
    allowed_attribute_keys: Option<HashSet<Key>>,
    drop: bool,
}

impl ViewBuilder {
    /// Selects instruments by name, case-insensitively. A single `*` matches
    /// any run of characters, so `*` alone matches every instrument.
    pub fn with_instrument_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Selects instruments by kind.
    pub fn with_instrument_kind(mut self, kind: InstrumentKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Exports matching instruments under a new name.
    ///
    /// Only allowed with an exact name selector, since renaming several
    /// instruments to the same name would merge unrelated streams.
    pub fn with_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.rename = Some(name.into());
        self
    }

    /// Replaces the description of matching instruments.
    pub fn with_description(mut self, description: impl Into<Cow<'static, str>>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Replaces the aggregation of matching instruments.
    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = Some(aggregation);
        self
    }

    /// Keeps only these attribute keys on recorded measurements. Streams that
    /// differ only in removed keys are merged.
    pub fn with_allowed_attribute_keys(
        mut self,
        keys: impl IntoIterator<Item = impl Into<Key>>,
    ) -> Self {
        self.allowed_attribute_keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Discards everything recorded by matching instruments.
    pub fn drop(mut self) -> Self {
        self.drop = true;
        self
    }

    /// Validates the rule.
    pub fn build(self) -> MetricResult<View> {
        let name = match self.name.as_deref() {
            Some("") => {
                return Err(MetricError::Config(
                    "view: instrument name selector must be non-empty".into(),
                ))
            }
            Some(name) => Some(NamePattern::parse(name)?),
            None => None,
        };
        if name.is_none() && self.kind.is_none() {
            return Err(MetricError::Config(
                "view: an instrument name or kind selector is required".into(),
            ));
        }
        if self.rename.is_some() && !matches!(name, Some(NamePattern::Exact(_))) {
            return Err(MetricError::Config(
                "view: rename requires an exact instrument name selector".into(),
            ));
        }
        if let Some(aggregation) = &self.aggregation {
            aggregation.validate()?;
            if let Some(kind) = self.kind {
                if !aggregation.is_compatible_with(kind) {
                    return Err(MetricError::Config(format!(
                        "view: {aggregation} aggregation is not compatible with {kind} instruments"
                    )));
                }
            }
        }

        Ok(View {
            name,
            kind: self.kind,
            rename: self.rename,
            description: self.description,
            aggregation: self.aggregation,
            allowed_attribute_keys: self.allowed_attribute_keys.map(Arc::new),
            drop: self.drop,
        })
    }
}

/// The effective export configuration of one instrument.
#[derive(Clone, Debug, PartialEq)]
pub struct Stream {
    pub(crate) name: Cow<'static, str>,
    pub(crate) description: Cow<'static, str>,
    pub(crate) unit: Cow<'static, str>,
    pub(crate) aggregation: Aggregation,
    pub(crate) allowed_attribute_keys: Option<Arc<HashSet<Key>>>,
}

impl Stream {
    /// Exported name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Exported description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Exported unit.
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Aggregation applied to recorded values.
    pub fn aggregation(&self) -> &Aggregation {
        &self.aggregation
    }

    /// Attribute keys kept on measurements, all when `None`.
    pub fn allowed_attribute_keys(&self) -> Option<&HashSet<Key>> {
        self.allowed_attribute_keys.as_deref()
    }
}

/// Computes the stream `instrument` is exported as, or `None` when a
/// matching view drops it.
///
/// Views selecting the exact instrument name are consulted before wildcard
/// and kind-only views, each group in registration order. Every setting is
/// taken from the first consulted view that sets it.
pub fn apply_views(views: &[View], instrument: &Instrument) -> Option<Stream> {
    resolve_stream(
        views,
        instrument,
        Aggregation::default_for(instrument.kind()),
    )
}

pub(crate) fn resolve_stream(
    views: &[View],
    instrument: &Instrument,
    default_aggregation: Aggregation,
) -> Option<Stream> {
    let matching: Vec<&View> = views
        .iter()
        .filter(|view| view.is_exact() && view.matches(instrument))
        .chain(
            views
                .iter()
                .filter(|view| !view.is_exact() && view.matches(instrument)),
        )
        .collect();

    if matching.iter().any(|view| view.drop) {
        return None;
    }

    let aggregation = match matching.iter().find_map(|view| view.aggregation.as_ref()) {
        Some(aggregation) if aggregation.is_compatible_with(instrument.kind()) => {
            aggregation.clone()
        }
        Some(aggregation) => {
            otel_warn!(
                name: "View.IncompatibleAggregation",
                instrument = instrument.name(),
                kind = instrument.kind().to_string(),
                aggregation = aggregation.to_string(),
                message = "falling back to the default aggregation"
            );
            default_aggregation
        }
        None => default_aggregation,
    };

    Some(Stream {
        name: matching
            .iter()
            .find_map(|view| view.rename.clone())
            .unwrap_or_else(|| instrument.name.clone()),
        description: matching
            .iter()
            .find_map(|view| view.description.clone())
            .unwrap_or_else(|| instrument.description.clone()),
        unit: instrument.unit.clone(),
        aggregation,
        allowed_attribute_keys: matching
            .iter()
            .find_map(|view| view.allowed_attribute_keys.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn counter(name: &'static str) -> Instrument {
        Instrument::new(name, InstrumentKind::Counter, "request", "requests served")
    }

    #[rstest]
    #[case("traffic_volume", "traffic_volume", true)]
    #[case("Traffic_Volume", "traffic_volume", true)]
    #[case("traffic_volume", "traffic", false)]
    #[case("*", "anything", true)]
    #[case("http.*", "http.server.request.duration", true)]
    #[case("http.*", "rpc.server.duration", false)]
    #[case("*.duration", "http.server.request.duration", true)]
    #[case("http.*.duration", "http.server.request.duration", true)]
    #[case("http.*.duration", "http.duration", false)]
    fn name_selector(#[case] selector: &str, #[case] name: &'static str, #[case] hit: bool) {
        let view = View::builder()
            .with_instrument_name(selector)
            .drop()
            .build()
            .unwrap();
        assert_eq!(view.matches(&counter(name)), hit);
    }

    #[test]
    fn kind_selector() {
        let view = View::builder()
            .with_instrument_kind(InstrumentKind::Histogram)
            .with_description("latency")
            .build()
            .unwrap();
        assert!(!view.matches(&counter("traffic_volume")));
        assert!(view.matches(&Instrument::new(
            "latency",
            InstrumentKind::Histogram,
            "s",
            ""
        )));
    }

    #[rstest]
    #[case(View::builder().with_description("no selector"))]
    #[case(View::builder().with_instrument_name(""))]
    #[case(View::builder().with_instrument_name("a*b*"))]
    #[case(View::builder().with_instrument_name("http.*").with_name("renamed"))]
    #[case(View::builder().with_instrument_kind(InstrumentKind::Counter).with_name("renamed"))]
    #[case(View::builder().with_instrument_name("latency").with_aggregation(
        Aggregation::ExplicitBucketHistogram { boundaries: vec![10.0, 1.0], record_min_max: true }
    ))]
    #[case(View::builder().with_instrument_kind(InstrumentKind::ObservableGauge).with_aggregation(
        Aggregation::default_for(InstrumentKind::Histogram)
    ))]
    fn invalid_views(#[case] builder: ViewBuilder) {
        assert!(matches!(builder.build(), Err(MetricError::Config(_))));
    }

    #[test]
    fn no_views_keeps_instrument() {
        let stream = apply_views(&[], &counter("traffic_volume")).unwrap();
        assert_eq!(stream.name(), "traffic_volume");
        assert_eq!(stream.description(), "requests served");
        assert_eq!(stream.unit(), "request");
        assert_eq!(stream.aggregation(), &Aggregation::Sum);
        assert!(stream.allowed_attribute_keys().is_none());
    }

    #[test]
    fn exact_match_wins_over_wildcard() {
        let views = vec![
            View::builder()
                .with_instrument_name("traffic*")
                .with_description("from wildcard")
                .with_allowed_attribute_keys(["http.route"])
                .build()
                .unwrap(),
            View::builder()
                .with_instrument_name("traffic_volume")
                .with_name("test")
                .with_description("from exact")
                .build()
                .unwrap(),
        ];
        let stream = apply_views(&views, &counter("traffic_volume")).unwrap();
        assert_eq!(stream.name(), "test");
        assert_eq!(stream.description(), "from exact");
        assert!(stream
            .allowed_attribute_keys()
            .unwrap()
            .contains(&Key::new("http.route")));
    }

    #[test]
    fn first_registered_wins_within_group() {
        let views = vec![
            View::builder()
                .with_instrument_name("*")
                .with_description("first")
                .build()
                .unwrap(),
            View::builder()
                .with_instrument_kind(InstrumentKind::Counter)
                .with_description("second")
                .build()
                .unwrap(),
        ];
        let stream = apply_views(&views, &counter("traffic_volume")).unwrap();
        assert_eq!(stream.description(), "first");
    }

    #[test]
    fn any_drop_wins() {
        let views = vec![
            View::builder()
                .with_instrument_name("traffic_volume")
                .with_name("kept")
                .build()
                .unwrap(),
            View::builder().with_instrument_name("*").drop().build().unwrap(),
        ];
        assert_eq!(apply_views(&views, &counter("traffic_volume")), None);
        assert!(apply_views(&views[..1], &counter("traffic_volume")).is_some());
    }

    #[test]
    fn incompatible_aggregation_falls_back() {
        let views = vec![View::builder()
            .with_instrument_name("*")
            .with_aggregation(Aggregation::default_for(InstrumentKind::Histogram))
            .build()
            .unwrap()];
        let gauge = Instrument::new("cpu", InstrumentKind::ObservableGauge, "1", "");
        assert_eq!(
            apply_views(&views, &gauge).unwrap().aggregation(),
            &Aggregation::LastValue
        );
    }
}
