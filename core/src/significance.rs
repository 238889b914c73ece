//! Conversions between summed power and Gaussian significance.
//!
//! For a spectrum normalised to unit mean noise power, the sum of `n`
//! harmonic powers is distributed as χ²/2 with `2n` degrees of freedom.
//! The chance probability of a power `P` is the χ² survival function at
//! `2P`, multiplied by the number of independent trials searched; the
//! significance is the Gaussian sigma with that same upper-tail
//! probability.
//!
//! Detections are often far out in the tail (probabilities of 1e-300 and
//! below), so everything is done with log-probabilities.  With an even
//! number of degrees of freedom the χ² survival function has the closed
//! form `e^{-P} Σ_{k<n} P^k / k!`, which stays exact in log space.

use statrs::distribution::{ContinuousCDF, Normal};
use statrs::function::gamma::ln_gamma;

/// Below this log-probability the Gaussian quantile is taken from the
/// asymptotic rational approximation instead of the exact inverse CDF.
const EXTENDED_LOGP: f64 = -600.0;

/// Largest significance accepted as a search cutoff.  Far beyond anything
/// physical, and small enough that its tail probability stays representable.
pub const MAX_SIGMA: f64 = 1.0e4;

/// Natural log of the χ² survival function for `2 * power` with
/// `2 * harmonics` degrees of freedom.
pub fn chi2_log_sf(power: f64, harmonics: usize) -> f64 {
    if power <= 0.0 {
        return 0.0;
    }
    if power.is_infinite() {
        return f64::NEG_INFINITY;
    }
    let n = harmonics.max(1);
    let ln_p = power.ln();

    // log-sum-exp of k ln P - ln k!, k = 0..n
    let term = |k: usize| k as f64 * ln_p - ln_gamma(k as f64 + 1.0);
    let peak = (0..n).map(term).fold(f64::NEG_INFINITY, f64::max);
    let sum: f64 = (0..n).map(|k| (term(k) - peak).exp()).sum();

    (-power + peak + sum.ln()).min(0.0)
}

/// Natural log of the standard normal upper-tail probability at `sigma`.
pub fn gaussian_log_sf(sigma: f64) -> f64 {
    let q = Normal::standard().sf(sigma);
    if q > 1e-300 {
        q.ln()
    } else {
        // Mills ratio: Q(x) ≈ φ(x) / x
        -0.5 * sigma * sigma - (sigma * (2.0 * std::f64::consts::PI).sqrt()).ln()
    }
}

/// Gaussian sigma whose upper-tail probability is `e^{logp}`.  Never
/// negative: probabilities of one half or more map to zero.
pub fn equivalent_gaussian_sigma(logp: f64) -> f64 {
    let sigma = if logp < EXTENDED_LOGP {
        extended_equivalent_sigma(logp)
    } else {
        let q = logp.exp();
        if q >= 1.0 {
            0.0
        } else {
            -Normal::standard().inverse_cdf(q)
        }
    };
    if sigma.is_finite() {
        sigma.max(0.0)
    } else {
        0.0
    }
}

/// Rational approximation of the normal quantile for tiny tail
/// probabilities (Abramowitz & Stegun 26.2.23), fed with a log-probability.
fn extended_equivalent_sigma(logp: f64) -> f64 {
    let t = (-2.0 * logp).sqrt();
    let num = 2.515517 + t * (0.802853 + t * 0.010328);
    let denom = 1.0 + t * (1.432788 + t * (0.189269 + t * 0.001308));
    t - num / denom
}

/// Significance of a summed `power` over `harmonics` harmonics after
/// `trials` independent trials.
pub fn candidate_sigma(power: f64, harmonics: usize, trials: f64) -> f64 {
    if power <= 0.0 {
        return 0.0;
    }
    let logp = chi2_log_sf(power, harmonics) + trials.max(1.0).ln();
    equivalent_gaussian_sigma(logp)
}

/// Smallest summed power over `harmonics` harmonics that reaches
/// significance `sigma` after `trials` independent trials.
///
/// Returns `f64::INFINITY` when no finite power is that significant.
pub fn power_for_sigma(sigma: f64, harmonics: usize, trials: f64) -> f64 {
    let target = gaussian_log_sf(sigma) - trials.max(1.0).ln();
    if target >= 0.0 {
        return 0.0;
    }
    if !target.is_finite() {
        return f64::INFINITY;
    }

    // chi2_log_sf is strictly decreasing in power: bracket, then bisect.
    let mut lo = 0.0;
    let mut hi = 1.0_f64.max(harmonics as f64);
    while chi2_log_sf(hi, harmonics) > target {
        lo = hi;
        hi *= 2.0;
        if !hi.is_finite() {
            return f64::INFINITY;
        }
    }
    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if chi2_log_sf(mid, harmonics) > target {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo <= 1e-12 * hi {
            break;
        }
    }
    0.5 * (lo + hi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_single_harmonic_is_exponential() {
        // One harmonic: Q = e^{-P}
        for &p in &[0.5, 3.0, 40.0, 900.0] {
            assert_relative_eq!(chi2_log_sf(p, 1), -p, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_two_harmonics_closed_form() {
        let p: f64 = 7.5;
        let expected = (-p).exp() * (1.0 + p);
        assert_relative_eq!(chi2_log_sf(p, 2).exp(), expected, max_relative = 1e-10);
    }

    #[test]
    fn test_zero_power_has_zero_sigma() {
        assert_eq!(candidate_sigma(0.0, 1, 1.0), 0.0);
        assert_eq!(candidate_sigma(0.3, 1, 1.0), 0.0);
    }

    #[test]
    fn test_sigma_increases_with_power() {
        // Three harmonics: below a summed power of about 2.7 the chance
        // probability exceeds one half and the sigma is clamped to zero.
        assert_eq!(candidate_sigma(2.0, 3, 1.0), 0.0);
        let mut last = 0.0;
        for &p in &[5.0, 10.0, 50.0, 200.0, 1000.0] {
            let s = candidate_sigma(p, 3, 1.0);
            assert!(s > last, "sigma({}) = {} <= {}", p, s, last);
            last = s;
        }
    }

    #[test]
    fn test_trials_reduce_sigma() {
        let few = candidate_sigma(30.0, 2, 1.0);
        let many = candidate_sigma(30.0, 2, 1.0e6);
        assert!(many < few);
        assert!(many > 0.0);
    }

    #[test]
    fn test_power_and_sigma_are_inverse() {
        for &(sigma, harmonics, trials) in &[(3.0, 1, 1.0), (5.0, 4, 1.0e4), (8.0, 8, 1.0e6)] {
            let power = power_for_sigma(sigma, harmonics, trials);
            assert!(power > 0.0);
            assert_relative_eq!(
                candidate_sigma(power, harmonics, trials),
                sigma,
                epsilon = 1e-4
            );
        }
    }

    #[test]
    fn test_power_for_zero_sigma_one_harmonic() {
        // Q = 1/2 = e^{-P}
        assert_relative_eq!(power_for_sigma(0.0, 1, 1.0), 2.0_f64.ln(), epsilon = 1e-9);
    }

    #[test]
    fn test_extreme_powers_stay_finite() {
        let s = candidate_sigma(5000.0, 1, 1.0);
        assert!(s.is_finite());
        assert!(s > 90.0);
        let p = power_for_sigma(60.0, 2, 1.0);
        assert!(p.is_finite());
        assert!(p > 1000.0);
    }

    #[test]
    fn test_unreachable_sigma_gives_infinite_power() {
        assert_eq!(power_for_sigma(1.0e200, 2, 100.0), f64::INFINITY);
        assert_eq!(power_for_sigma(f64::INFINITY, 1, 1.0), f64::INFINITY);
        assert_eq!(chi2_log_sf(f64::INFINITY, 3), f64::NEG_INFINITY);
    }

    #[test]
    fn test_max_sigma_threshold_is_finite() {
        let p = power_for_sigma(MAX_SIGMA, 4, 1.0e6);
        assert!(p.is_finite());
        assert!(p > 1.0e7);
    }
}
