//! Powers, band statistics and incoherent harmonic summation.
//!
//! A periodic signal with a narrow pulse spreads its power over the
//! fundamental and many harmonics.  Adding the power found at `f`, `2f`,
//! ..., `hf` lifts such a signal above the noise even when no single
//! harmonic is significant, at the price of more trials.
//!
//! Summation here is done on the fundamental's grid: for order `h` the
//! running sum at oversampled index `j` gains the fundamental power at
//! index `(j + h/2) / h`, i.e. the bin whose `h`-th harmonic is `j`.
//!
//! Both search drivers run the same loop, [`search_harmonics`].  They differ
//! only in how thresholds are derived and which candidate type they build,
//! and express that through an [`AdmissionPolicy`].

use ndarray::Array1;
use num_complex::Complex32;
use serde::{Deserialize, Serialize};

use crate::ranked_list::{Ranked, RankedList};

/// Power given to the DC bin (and the Nyquist mirror in aliased search).
pub const SENTINEL_POWER: f32 = 1.0;

/// Summary statistics of the raw (non-oversampled) band powers.
#[cfg_attr(feature = "python", pyo3::pyclass(get_all))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PowerStats {
    /// Mean normalised power over the searched band.
    pub average: f64,
    /// Sample variance of the normalised power over the band.
    pub variance: f64,
    /// Largest normalised power in the band.
    pub max: f64,
}

/// Normalised powers `|z|² / normalization` of bins `lo_bin..`, with bin 0
/// (DC) replaced by [`SENTINEL_POWER`].
pub fn raw_band_powers(spectrum: &[Complex32], lo_bin: usize, normalization: f32) -> Vec<f32> {
    spectrum
        .iter()
        .enumerate()
        .skip(lo_bin)
        .map(|(ii, z)| {
            if ii == 0 {
                SENTINEL_POWER
            } else {
                z.norm_sqr() / normalization
            }
        })
        .collect()
}

/// Mean, sample variance and maximum of `powers`.
pub fn band_statistics(powers: &[f32]) -> PowerStats {
    let band: Array1<f64> = powers.iter().map(|&p| p as f64).collect();
    let average = band.mean().unwrap_or(0.0);
    let variance = if band.len() > 1 { band.var(1.0) } else { 0.0 };
    let max = band.iter().copied().fold(0.0, f64::max);
    PowerStats {
        average,
        variance,
        max,
    }
}

/// Powers of the first `count` points of an oversampled buffer, scaled by
/// `scale`, with index 0 forced to [`SENTINEL_POWER`].
pub fn spectral_powers(buffer: &[Complex32], count: usize, scale: f32) -> Vec<f32> {
    let mut powers: Vec<f32> = buffer
        .iter()
        .take(count)
        .map(|z| z.norm_sqr() * scale)
        .collect();
    if let Some(dc) = powers.first_mut() {
        *dc = SENTINEL_POWER;
    }
    powers
}

/// Extend the powers of `0..n` to `0..2n` by mirroring about the Nyquist
/// index `n`: `out[2n - i] = out[i]`, and `out[n]` is [`SENTINEL_POWER`].
pub fn mirror_about_nyquist(powers: &[f32]) -> Vec<f32> {
    let n = powers.len();
    let mut out = vec![0.0; 2 * n];
    out[..n].copy_from_slice(powers);
    if n > 0 {
        out[n] = SENTINEL_POWER;
    }
    for ii in 1..n {
        out[2 * n - ii] = powers[ii];
    }
    out
}

/// Add the order-`harmonic` contribution to a running sum.
pub fn add_harmonic(sums: &mut [f32], fundamental: &[f32], harmonic: usize) {
    let offset = harmonic / 2;
    for (jj, sum) in sums.iter_mut().enumerate() {
        *sum += fundamental[(jj + offset) / harmonic];
    }
}

/// Incoherent sum of orders `1..=harmonics`.  Order 1 is the fundamental
/// itself.
pub fn harmonic_sum(fundamental: &[f32], harmonics: usize) -> Vec<f32> {
    let mut sums = fundamental.to_vec();
    for harmonic in 2..=harmonics {
        add_harmonic(&mut sums, fundamental, harmonic);
    }
    sums
}

/// How a search driver turns summed powers into ranked candidates.
pub trait AdmissionPolicy {
    type Candidate: Ranked;

    /// Power a bin must exceed at the start of the order-`harmonics` pass.
    fn order_threshold(&self, list: &RankedList<Self::Candidate>, harmonics: usize) -> f64;

    /// Power threshold right after an admission, given the list's new
    /// minimum metric.
    fn admitted_threshold(
        &self,
        list: &RankedList<Self::Candidate>,
        harmonics: usize,
        min_metric: f64,
    ) -> f64;

    /// Build the candidate for oversampled index `index`.
    fn candidate(&self, index: usize, power: f32, harmonics: usize) -> Self::Candidate;
}

/// Sum harmonics up to `max_harmonics` and offer every bin at or above
/// `start` whose summed power beats the running threshold to `list`.
///
/// The order-1 pass searches the fundamental powers directly.
pub fn search_harmonics<P: AdmissionPolicy>(
    fundamental: &[f32],
    start: usize,
    max_harmonics: usize,
    policy: &P,
    list: &mut RankedList<P::Candidate>,
) {
    let mut sums = fundamental.to_vec();
    for harmonics in 1..=max_harmonics {
        if harmonics > 1 {
            add_harmonic(&mut sums, fundamental, harmonics);
        }

        let mut threshold = policy.order_threshold(list, harmonics);
        log::debug!(
            "harmonic order {}: initial power threshold {:.3}",
            harmonics,
            threshold
        );
        for (index, &power) in sums.iter().enumerate().skip(start) {
            if power as f64 > threshold {
                let min_metric = list.admit(policy.candidate(index, power, harmonics));
                threshold = policy.admitted_threshold(list, harmonics, min_metric);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[derive(Clone, Debug, PartialEq)]
    struct Hit {
        index: usize,
        power: f32,
        harmonics: usize,
    }

    impl Ranked for Hit {
        fn metric(&self) -> f64 {
            self.power as f64
        }
        fn sentinel() -> Self {
            Hit {
                index: 0,
                power: 0.0,
                harmonics: 0,
            }
        }
    }

    struct KeepBest;

    impl AdmissionPolicy for KeepBest {
        type Candidate = Hit;

        fn order_threshold(&self, list: &RankedList<Hit>, _harmonics: usize) -> f64 {
            list.min_metric()
        }

        fn admitted_threshold(&self, _list: &RankedList<Hit>, _harmonics: usize, min: f64) -> f64 {
            min
        }

        fn candidate(&self, index: usize, power: f32, harmonics: usize) -> Hit {
            Hit {
                index,
                power,
                harmonics,
            }
        }
    }

    #[test]
    fn test_order_one_is_identity() {
        let fundamental: Vec<f32> = (0..50).map(|i| ((i * 37) % 11) as f32 * 0.5).collect();
        assert_eq!(harmonic_sum(&fundamental, 1), fundamental);
    }

    #[test]
    fn test_second_harmonic_lookup() {
        let fundamental: Vec<f32> = (0..8).map(|i| i as f32).collect();
        let summed = harmonic_sum(&fundamental, 2);
        // j + fundamental[(j + 1) / 2]
        assert_eq!(summed, vec![0.0, 2.0, 3.0, 5.0, 6.0, 8.0, 9.0, 11.0]);
    }

    #[test]
    fn test_third_harmonic_lookup() {
        let fundamental: Vec<f32> = (0..7).map(|i| (10 * i) as f32).collect();
        let mut sums = vec![0.0; 7];
        add_harmonic(&mut sums, &fundamental, 3);
        // (j + 1) / 3 -> 0, 0, 1, 1, 1, 2, 2
        assert_eq!(sums, vec![0.0, 0.0, 10.0, 10.0, 10.0, 20.0, 20.0]);
    }

    #[test]
    fn test_harmonic_sum_lines_up_lookup_bins() {
        // At j = 30 the orders 1..3 read bins 30, 31 / 2 = 15 and 31 / 3 = 10.
        let mut fundamental = vec![0.1_f32; 64];
        fundamental[10] = 4.0;
        fundamental[15] = 4.0;
        fundamental[30] = 4.0;
        let summed = harmonic_sum(&fundamental, 3);
        assert_relative_eq!(summed[30], 12.0, epsilon = 1e-5);
        assert!(summed[30] > summed[29]);
        assert!(summed[30] > summed[31]);
    }

    #[test]
    fn test_raw_powers_suppress_dc() {
        let spectrum = vec![
            Complex32::new(100.0, 0.0),
            Complex32::new(3.0, 4.0),
            Complex32::new(0.0, 2.0),
        ];
        let powers = raw_band_powers(&spectrum, 0, 5.0);
        assert_eq!(powers, vec![SENTINEL_POWER, 5.0, 0.8]);

        let band = raw_band_powers(&spectrum, 1, 1.0);
        assert_eq!(band, vec![25.0, 4.0]);
    }

    #[test]
    fn test_spectral_powers_suppress_dc() {
        let buffer = vec![Complex32::new(50.0, 50.0), Complex32::new(1.0, 1.0), Complex32::new(2.0, 0.0)];
        let powers = spectral_powers(&buffer, 2, 0.5);
        assert_eq!(powers, vec![SENTINEL_POWER, 1.0]);
    }

    #[test]
    fn test_band_statistics() {
        let stats = band_statistics(&[1.0, 2.0, 3.0, 6.0]);
        assert_relative_eq!(stats.average, 3.0);
        // sum of squared deviations 14 over n - 1 = 3
        assert_relative_eq!(stats.variance, 14.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(stats.max, 6.0);

        let single = band_statistics(&[2.5]);
        assert_eq!(single.variance, 0.0);
        assert_eq!(band_statistics(&[]), PowerStats::default());
    }

    #[test]
    fn test_mirror_about_nyquist() {
        let mirrored = mirror_about_nyquist(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(mirrored, vec![1.0, 2.0, 3.0, 4.0, SENTINEL_POWER, 4.0, 3.0, 2.0]);
    }

    #[test]
    fn test_search_harmonics_keeps_best() {
        let mut fundamental = vec![0.2_f32; 40];
        fundamental[5] = 9.0;
        fundamental[17] = 3.0;
        let mut list = RankedList::fixed(3);
        search_harmonics(&fundamental, 1, 1, &KeepBest, &mut list);

        let got = list.as_slice();
        assert_eq!(got[0].index, 5);
        assert_eq!(got[1].index, 17);
        assert_relative_eq!(got[2].power, 0.2);
    }

    #[test]
    fn test_search_harmonics_uses_summed_bin() {
        let mut fundamental = vec![0.0_f32; 32];
        fundamental[4] = 5.0;
        fundamental[8] = 5.0;
        let mut list = RankedList::fixed(1);
        search_harmonics(&fundamental, 1, 2, &KeepBest, &mut list);

        let best = &list.as_slice()[0];
        assert_eq!(best.index, 8);
        assert_eq!(best.harmonics, 2);
        assert_relative_eq!(best.power, 10.0);
    }
}
