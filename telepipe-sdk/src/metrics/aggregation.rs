use std::fmt;

use crate::metrics::error::{MetricError, MetricResult};
use crate::metrics::InstrumentKind;

/// Bucket boundaries used by histograms that no view or advice rebuckets.
pub const DEFAULT_HISTOGRAM_BOUNDARIES: [f64; 15] = [
    0.0, 5.0, 10.0, 25.0, 50.0, 75.0, 100.0, 250.0, 500.0, 750.0, 1000.0, 2500.0, 5000.0, 7500.0,
    10000.0,
];

/// The way recorded measurements are summarized.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Aggregation {
    /// An aggregation that summarizes a set of measurements as their arithmetic
    /// sum.
    Sum,

    /// An aggregation that summarizes a set of measurements as the last one made.
    LastValue,

    /// An aggregation that summarizes a set of measurements as a histogram with
    /// explicitly defined buckets.
    ExplicitBucketHistogram {
        /// The increasing bucket boundary values.
        ///
        /// Boundary values define bucket upper bounds. Buckets are exclusive of their
        /// lower boundary and inclusive of their upper bound (except at positive
        /// infinity). A measurement is defined to fall into the greatest-numbered
        /// bucket with a boundary that is greater than or equal to the measurement. As
        /// an example, boundaries defined as:
        ///
        /// vec![0.0, 5.0, 10.0, 25.0, 50.0, 75.0, 100.0, 250.0, 500.0, 750.0,
        /// 1000.0, 2500.0, 5000.0, 7500.0, 10000.0];
        ///
        /// Will define these buckets:
        ///
        /// (-∞, 0], (0, 5.0], (5.0, 10.0], (10.0, 25.0], (25.0, 50.0], (50.0,
        /// 75.0], (75.0, 100.0], (100.0, 250.0], (250.0, 500.0], (500.0,
        /// 750.0], (750.0, 1000.0], (1000.0, 2500.0], (2500.0, 5000.0],
        /// (5000.0, 7500.0], (7500.0, 10000.0], (10000.0, +∞)
        boundaries: Vec<f64>,

        /// Indicates whether to not record the min and max of the distribution.
        ///
        /// By default, these values are recorded.
        record_min_max: bool,
    },
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Aggregation::Sum => "Sum",
            Aggregation::LastValue => "LastValue",
            Aggregation::ExplicitBucketHistogram { .. } => "ExplicitBucketHistogram",
        };

        f.write_str(name)
    }
}

impl Aggregation {
    /// The aggregation an instrument of `kind` uses when no view overrides it.
    pub fn default_for(kind: InstrumentKind) -> Aggregation {
        match kind {
            InstrumentKind::Counter
            | InstrumentKind::UpDownCounter
            | InstrumentKind::ObservableUpDownCounter => Aggregation::Sum,
            InstrumentKind::Histogram => Aggregation::ExplicitBucketHistogram {
                boundaries: DEFAULT_HISTOGRAM_BOUNDARIES.to_vec(),
                record_min_max: true,
            },
            InstrumentKind::ObservableGauge => Aggregation::LastValue,
        }
    }

    /// Validate that this aggregation has correct configuration
    pub fn validate(&self) -> MetricResult<()> {
        match self {
            Aggregation::Sum | Aggregation::LastValue => Ok(()),
            Aggregation::ExplicitBucketHistogram { boundaries, .. } => {
                if boundaries.iter().any(|b| b.is_nan()) {
                    return Err(MetricError::Config(format!(
                        "aggregation: explicit bucket histogram: NaN boundary: {boundaries:?}",
                    )));
                }
                for x in boundaries.windows(2) {
                    if x[0] >= x[1] {
                        return Err(MetricError::Config(format!(
                            "aggregation: explicit bucket histogram: non-monotonic boundaries: {boundaries:?}",
                        )));
                    }
                }

                Ok(())
            }
        }
    }

    /// Whether instruments of `kind` can be summarized this way.
    ///
    /// Observable instruments report one precomputed value per collection,
    /// so they cannot build a distribution; an observable gauge cannot be
    /// summed either.
    pub(crate) fn is_compatible_with(&self, kind: InstrumentKind) -> bool {
        match (self, kind) {
            (Aggregation::ExplicitBucketHistogram { .. }, k) => {
                matches!(k, InstrumentKind::Counter | InstrumentKind::Histogram)
            }
            (Aggregation::Sum, InstrumentKind::ObservableGauge) => false,
            (Aggregation::Sum | Aggregation::LastValue, _) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(vec![], true)]
    #[case(vec![1.0, 21.0, 50.0, 100.0, 1000.0], true)]
    #[case(vec![-5.0, 0.0], true)]
    #[case(vec![5.0, 1.0], false)]
    #[case(vec![1.0, 1.0], false)]
    #[case(vec![1.0, f64::NAN], false)]
    fn histogram_boundaries(#[case] boundaries: Vec<f64>, #[case] valid: bool) {
        let aggregation = Aggregation::ExplicitBucketHistogram {
            boundaries,
            record_min_max: true,
        };
        assert_eq!(aggregation.validate().is_ok(), valid);
    }

    #[rstest]
    #[case(InstrumentKind::Counter, true)]
    #[case(InstrumentKind::Histogram, true)]
    #[case(InstrumentKind::UpDownCounter, false)]
    #[case(InstrumentKind::ObservableGauge, false)]
    #[case(InstrumentKind::ObservableUpDownCounter, false)]
    fn histogram_compatibility(#[case] kind: InstrumentKind, #[case] compatible: bool) {
        let aggregation = Aggregation::default_for(InstrumentKind::Histogram);
        assert_eq!(aggregation.is_compatible_with(kind), compatible);
    }

    #[test]
    fn defaults() {
        assert_eq!(Aggregation::default_for(InstrumentKind::Counter), Aggregation::Sum);
        assert_eq!(
            Aggregation::default_for(InstrumentKind::ObservableGauge),
            Aggregation::LastValue
        );
        assert!(Aggregation::default_for(InstrumentKind::Histogram).validate().is_ok());
    }
}
