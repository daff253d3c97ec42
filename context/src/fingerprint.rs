//! Length plus sampled-character fingerprint.
//!
//! Computing a fingerprint is a single pass over the text; comparing two is
//! constant time. The digest is lossy: edits that fall between sample
//! positions and leave the length within threshold are invisible.

/// Number of characters sampled from the text.
pub const SAMPLE_COUNT: usize = 10;

/// Fraction of change (length or samples) above which content counts as changed.
pub const CHANGE_THRESHOLD: f64 = 0.2;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentFingerprint {
    length: usize,
    samples: String,
}

impl ContentFingerprint {
    /// Fingerprint `text`, counting in `char`s.
    ///
    /// Samples are taken at positions `0, s, 2s, …` with stride
    /// `s = max(len / SAMPLE_COUNT, 1)`, stopping at the end of the text.
    #[must_use]
    pub fn compute(text: &str) -> Self {
        let length = text.chars().count();
        let stride = (length / SAMPLE_COUNT).max(1);
        let samples = text.chars().step_by(stride).take(SAMPLE_COUNT).collect();
        Self { length, samples }
    }

    #[must_use]
    pub const fn length(&self) -> usize {
        self.length
    }

    #[must_use]
    pub fn samples(&self) -> &str {
        &self.samples
    }

    /// Whether `newer` differs from `self` by more than [`CHANGE_THRESHOLD`].
    ///
    /// Relative length change is checked first; otherwise the share of
    /// differing samples over the shorter sample string decides.
    #[must_use]
    pub fn differs_significantly(&self, newer: &Self) -> bool {
        let length_change =
            self.length.abs_diff(newer.length) as f64 / self.length.max(1) as f64;
        if length_change > CHANGE_THRESHOLD {
            return true;
        }

        let compared = self.samples.chars().count().min(newer.samples.chars().count());
        let differing = self
            .samples
            .chars()
            .zip(newer.samples.chars())
            .filter(|(a, b)| a != b)
            .count();
        differing as f64 / compared.max(1) as f64 > CHANGE_THRESHOLD
    }
}
