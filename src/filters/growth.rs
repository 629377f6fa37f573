//! Fingerprint growth strategies for expanding filters.

/// Decides how long fingerprints of newly inserted elements are after a number of expansions.
///
/// Every strategy starts from the false positive rate `2^-original_fingerprint_length` of the
/// freshly constructed filter, scales it down depending on the number of expansions done so far and
/// returns the fingerprint length `ceil(log2(1 / rate))` that achieves the scaled rate.
///
/// | strategy           | false positive rate after `e` expansions            |
/// |--------------------|-----------------------------------------------------|
/// | `Uniform`          | `rate`                                              |
/// | `Polynomial`       | `rate / (e + 1)^2`                                  |
/// | `Triangular`       | `rate / ((e + 1) * (e + 2) / 2)`                    |
/// | `Geometric`        | `rate / 2^e`                                        |
/// | `PolynomialShrink` | `rate / (max(estimate - e, 0) + 1)^2`               |
///
/// `Uniform` keeps the fingerprints short and lets the false positive rate of the whole filter
/// grow with the number of generations; the others trade memory for a bounded overall rate.
/// `PolynomialShrink` is meant for filters whose final number of expansions is known in advance:
/// it starts with long fingerprints and shrinks them towards the original length.
///
/// # Examples
/// ```
/// use infinifilter::filters::growth::GrowthStrategy;
///
/// assert_eq!(GrowthStrategy::Uniform.new_fingerprint_size(8, 5, None), 8);
/// assert_eq!(GrowthStrategy::Geometric.new_fingerprint_size(8, 5, None), 13);
/// assert_eq!(GrowthStrategy::Polynomial.new_fingerprint_size(8, 3, None), 12);
/// assert_eq!(GrowthStrategy::PolynomialShrink.new_fingerprint_size(8, 0, Some(3)), 12);
/// assert_eq!(GrowthStrategy::PolynomialShrink.new_fingerprint_size(8, 3, Some(3)), 8);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GrowthStrategy {
    /// Same fingerprint length for every generation.
    #[default]
    Uniform,
    /// Rate shrinks quadratically with the number of expansions.
    Polynomial,
    /// Rate shrinks with the triangular numbers of the number of expansions.
    Triangular,
    /// Rate halves with every expansion.
    Geometric,
    /// Rate starts low and relaxes towards the original as expansions approach the estimate.
    PolynomialShrink,
}

impl GrowthStrategy {
    /// Fingerprint length for entries inserted after `num_expansions` expansions.
    ///
    /// `estimated_expansions` is only used by `PolynomialShrink`; `None` falls back to an estimate
    /// of 10 expansions.
    pub fn new_fingerprint_size(
        self,
        original_fingerprint_length: usize,
        num_expansions: usize,
        estimated_expansions: Option<usize>,
    ) -> usize {
        let e = num_expansions as f64;
        let divisor = match self {
            Self::Uniform => 1.0,
            Self::Polynomial => (e + 1.0).powi(2),
            Self::Triangular => (e + 1.0) * (e + 2.0) / 2.0,
            Self::Geometric => 2f64.powi(num_expansions as i32),
            Self::PolynomialShrink => {
                let estimate = estimated_expansions.unwrap_or(10);
                let remaining = estimate.saturating_sub(num_expansions) as f64;
                (remaining + 1.0).powi(2)
            }
        };
        original_fingerprint_length + divisor.log2().ceil() as usize
    }
}

/// Fingerprint length a filter should start with if it is expected to expand
/// `expected_expansions` times and to end up with `expected_fingerprint_length` bit fingerprints.
///
/// # Examples
/// ```
/// use infinifilter::filters::growth::derive_init_fingerprint_size;
///
/// assert_eq!(derive_init_fingerprint_size(10, 0), 10);
/// assert_eq!(derive_init_fingerprint_size(10, 3), 14);
/// assert_eq!(derive_init_fingerprint_size(10, 4), 15);
/// ```
pub fn derive_init_fingerprint_size(
    expected_fingerprint_length: usize,
    expected_expansions: usize,
) -> usize {
    GrowthStrategy::PolynomialShrink.new_fingerprint_size(
        expected_fingerprint_length,
        0,
        Some(expected_expansions),
    )
}
