//! Common types shared across the search pipeline.
//!
//! These are the data objects a periodicity search hands around: search
//! configuration, the two candidate flavours (plain spectral candidates and
//! mini-spectrum binary candidates), and the aggregated result of a plain
//! search.

use std::fmt;

use num_complex::Complex32;
#[cfg(feature = "python")]
use pyo3::prelude::*;
use serde::{Deserialize, Serialize};

use crate::harmonics::PowerStats;
use crate::padding::LOW_ACCURACY_HALF_WIDTH;
use crate::ranked_list::Ranked;

// ---------------------------------------------------------------------------
// Interpolation / Aliasing
// ---------------------------------------------------------------------------

/// How sub-bin values are estimated on the oversampled grid.
#[cfg_attr(feature = "python", pyclass(eq, eq_int))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    /// Finite-difference estimate of the half-bin values.  Fast, a little
    /// less sensitive, always 2x oversampled.
    #[default]
    Interbin,
    /// Full Fourier interpolation through the cached kernel.
    Interpolate,
}

impl Interpolation {
    /// Oversampling factor actually used for a requested one.
    pub fn effective_oversample(self, requested: usize) -> usize {
        match self {
            Interpolation::Interbin => 2,
            Interpolation::Interpolate => requested,
        }
    }
}

/// Whether a mini-spectrum search also looks at frequencies folded back
/// past Nyquist.
#[cfg_attr(feature = "python", pyclass(eq, eq_int))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aliasing {
    #[default]
    Ignore,
    /// Mirror the powers about Nyquist, doubling the searched range.
    Check,
}

// ---------------------------------------------------------------------------
// FftCandidate
// ---------------------------------------------------------------------------

/// A candidate from a plain spectrum search, ranked by power.
#[cfg_attr(feature = "python", pyclass(get_all, set_all))]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FftCandidate {
    /// Fourier frequency in (fractional) bins.
    pub r: f64,
    /// Normalised, harmonically summed power.
    pub power: f64,
    /// Number of harmonics searched in the call that found it.
    pub harmonics: usize,
}

impl Ranked for FftCandidate {
    fn metric(&self) -> f64 {
        self.power
    }

    fn sentinel() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// BinaryCandidate
// ---------------------------------------------------------------------------

/// A candidate from a mini-spectrum (binary pulsar) search, ranked by
/// significance.
///
/// A binary pulsar's orbit phase-modulates its pulses, which puts a comb of
/// sidebands around the spin frequency in the long spectrum.  Transforming a
/// stretch of that long spectrum again (the "mini" spectrum) turns the
/// sideband spacing, i.e. the orbital frequency, into a peak.  The
/// `mini_*` fields describe that peak; the `full_*` fields say where the
/// stretch came from so the peak can be turned back into periods.
#[cfg_attr(feature = "python", pyclass(get_all, set_all))]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BinaryCandidate {
    /// Number of points in the long transform.
    pub full_length: f64,
    /// Duration of the long time series, in seconds.
    pub full_duration: f64,
    /// First long-spectrum bin of the stretch that was re-transformed.
    pub full_lo_r: f64,
    /// Oversampled length of the mini spectrum.
    pub mini_length: f64,
    /// Detected mini-spectrum frequency, in (fractional) bins.
    pub mini_r: f64,
    /// Summed power of the detection.
    pub mini_power: f64,
    /// Number of harmonics summed for the detection.
    pub mini_harmonics: usize,
    /// Gaussian significance of the detection.
    pub mini_sigma: f64,
    /// Estimated spin period, in seconds.
    pub pulsar_period: f64,
    /// Estimated orbital period, in seconds.
    pub orbital_period: f64,
}

impl Ranked for BinaryCandidate {
    fn metric(&self) -> f64 {
        self.mini_sigma
    }

    fn sentinel() -> Self {
        Self::default()
    }
}

impl BinaryCandidate {
    /// Approximate uncertainty of [`Self::orbital_period`], in seconds.
    pub fn orbital_period_error(&self) -> f64 {
        0.5 * self.full_duration / self.mini_length
    }

    /// Approximate uncertainty of [`Self::pulsar_period`], in seconds.
    ///
    /// The stretch covers half a mini length of long-spectrum bins, so the
    /// spin frequency is only known to within that range.
    pub fn pulsar_period_error(&self) -> f64 {
        if self.full_lo_r == 0.0 {
            self.pulsar_period
        } else {
            (self.full_duration / (self.full_lo_r + 0.5 * self.mini_length)
                - self.full_duration / self.full_lo_r)
                .abs()
        }
    }

    /// `false` when `list` already holds a stronger candidate from a mini
    /// spectrum of the same length within 0.6 bins of this one.
    ///
    /// Scanning stops at the first empty slot.
    pub fn is_novel_among(&self, list: &[BinaryCandidate]) -> bool {
        !list
            .iter()
            .take_while(|c| c.mini_sigma != 0.0)
            .any(|c| {
                c.mini_length == self.mini_length
                    && (c.mini_r - self.mini_r).abs() < 0.6
                    && c.mini_sigma > self.mini_sigma
            })
    }
}

impl fmt::Display for BinaryCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Sigma       =  {:<7.3}", self.mini_sigma)?;
        writeln!(f, "  Orbit p     =  {:<8.2}", self.orbital_period)?;
        if self.pulsar_period < 0.001 {
            writeln!(f, "  Pulsar p    =  {:<12.5e}", self.pulsar_period)?;
        } else {
            writeln!(f, "  Pulsar p    =  {:<12.9}", self.pulsar_period)?;
        }
        writeln!(f, "  rlo (full)  =  {:<10.0}", self.full_lo_r)?;
        writeln!(f, "  N (mini)    =  {:<6.0}", self.mini_length)?;
        writeln!(f, "  r (detect)  =  {:<9.3}", self.mini_r)?;
        writeln!(f, "  Power       =  {:<8.3}", self.mini_power)?;
        writeln!(f, "  Numsum      =  {:<2}", self.mini_harmonics)?;
        writeln!(f, "  N (full)    =  {:<10.0}", self.full_length)?;
        writeln!(f, "  T (full)    =  {:<13.6}", self.full_duration)
    }
}

// ---------------------------------------------------------------------------
// Observation / MiniSegment
// ---------------------------------------------------------------------------

/// The long observation a set of mini spectra was cut from.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Number of points in the long transform.
    pub full_length: f64,
    /// Duration of the long time series, in seconds.
    pub duration: f64,
}

/// One mini spectrum plus the long-spectrum bin it starts at.
#[derive(Clone, Debug, PartialEq)]
pub struct MiniSegment {
    pub spectrum: Vec<Complex32>,
    pub full_lo_r: f64,
}

// ---------------------------------------------------------------------------
// SearchParams
// ---------------------------------------------------------------------------

/// Configuration of a spectrum search.
///
/// Deserialisable from JSON; missing fields take their [`Default`] values.
#[cfg_attr(feature = "python", pyclass(get_all, set_all))]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    /// Highest harmonic order to sum (1 = no summing).
    pub harmonics: usize,
    /// Interpolated points per bin.  Ignored (forced to 2) when
    /// interbinning.
    pub oversample: usize,
    pub interpolation: Interpolation,
    /// Every power is divided by this (typically the local mean power).
    pub normalization: f64,
    /// Minimum significance kept by a plain search with dynamic capacity.
    pub sigma_cutoff: f64,
    /// Fixed number of plain-search candidate slots; 0 lets the list grow
    /// as `sigma_cutoff` dictates.
    pub num_candidates: usize,
    /// Half width of the low-accuracy interpolation response, in bins.
    pub low_accuracy_half_width: usize,
    /// Rayon worker threads for batch searches.  0 uses every core.
    pub n_workers: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            harmonics: 1,
            oversample: 2,
            interpolation: Interpolation::Interbin,
            normalization: 1.0,
            sigma_cutoff: 6.0,
            num_candidates: 0,
            low_accuracy_half_width: LOW_ACCURACY_HALF_WIDTH,
            n_workers: 0,
        }
    }
}

impl SearchParams {
    /// Parse parameters from a JSON document.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

// ---------------------------------------------------------------------------
// SpectrumSearchResult
// ---------------------------------------------------------------------------

/// Output of a plain spectrum search.
#[cfg_attr(feature = "python", pyclass(get_all))]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpectrumSearchResult {
    /// Candidates in non-increasing power order.  With fixed capacity the
    /// unused slots are zero-power sentinels at the end.
    pub candidates: Vec<FftCandidate>,

    /// Number of genuine candidates in `candidates`.
    pub num_candidates: usize,

    /// Statistics of the raw powers over the searched band.
    pub stats: PowerStats,

    /// Wall-clock processing time for the search, in milliseconds.
    pub processing_time_ms: u64,
}

impl SpectrumSearchResult {
    /// Serialise the result to a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

// ---------------------------------------------------------------------------
// Python constructors and reprs
// ---------------------------------------------------------------------------

#[cfg(feature = "python")]
#[pymethods]
impl FftCandidate {
    #[new]
    #[pyo3(signature = (r, power, harmonics=1))]
    pub fn py_new(r: f64, power: f64, harmonics: usize) -> Self {
        Self { r, power, harmonics }
    }

    fn __repr__(&self) -> String {
        format!(
            "FftCandidate(r={:.3}, power={:.3}, harmonics={})",
            self.r, self.power, self.harmonics,
        )
    }
}

#[cfg(feature = "python")]
#[pymethods]
impl BinaryCandidate {
    #[new]
    pub fn py_new() -> Self {
        Self::default()
    }

    #[pyo3(name = "orbital_period_error")]
    fn py_orbital_period_error(&self) -> f64 {
        self.orbital_period_error()
    }

    #[pyo3(name = "pulsar_period_error")]
    fn py_pulsar_period_error(&self) -> f64 {
        self.pulsar_period_error()
    }

    fn __str__(&self) -> String {
        self.to_string()
    }

    fn __repr__(&self) -> String {
        format!(
            "BinaryCandidate(sigma={:.3}, p_orb={:.2} s, p_psr={:.6e} s, r={:.3})",
            self.mini_sigma, self.orbital_period, self.pulsar_period, self.mini_r,
        )
    }
}

#[cfg(feature = "python")]
#[pymethods]
impl SearchParams {
    #[new]
    #[pyo3(signature = (
        harmonics=1,
        oversample=2,
        interpolation=Interpolation::Interbin,
        normalization=1.0,
        sigma_cutoff=6.0,
        num_candidates=0,
        low_accuracy_half_width=LOW_ACCURACY_HALF_WIDTH,
        n_workers=0,
    ))]
    #[allow(clippy::too_many_arguments)]
    pub fn py_new(
        harmonics: usize,
        oversample: usize,
        interpolation: Interpolation,
        normalization: f64,
        sigma_cutoff: f64,
        num_candidates: usize,
        low_accuracy_half_width: usize,
        n_workers: usize,
    ) -> Self {
        Self {
            harmonics,
            oversample,
            interpolation,
            normalization,
            sigma_cutoff,
            num_candidates,
            low_accuracy_half_width,
            n_workers,
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "SearchParams(harmonics={}, oversample={}, interpolation={:?}, norm={:.3}, sigma={:.1}, ncands={})",
            self.harmonics,
            self.oversample,
            self.interpolation,
            self.normalization,
            self.sigma_cutoff,
            self.num_candidates,
        )
    }
}

#[cfg(feature = "python")]
#[pymethods]
impl SpectrumSearchResult {
    /// Serialise the result to a JSON string for interoperability.
    #[pyo3(name = "to_json")]
    pub fn py_to_json(&self) -> PyResult<String> {
        self.to_json()
            .map_err(|e| pyo3::exceptions::PyValueError::new_err(e.to_string()))
    }

    fn __repr__(&self) -> String {
        format!(
            "SpectrumSearchResult(candidates={}, avg={:.3}, var={:.3}, max={:.3}, time={}ms)",
            self.num_candidates,
            self.stats.average,
            self.stats.variance,
            self.stats.max,
            self.processing_time_ms,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn binary(mini_r: f64, mini_sigma: f64, mini_length: f64) -> BinaryCandidate {
        BinaryCandidate {
            mini_r,
            mini_sigma,
            mini_length,
            ..Default::default()
        }
    }

    #[test]
    fn test_interbin_always_two() {
        assert_eq!(Interpolation::Interbin.effective_oversample(8), 2);
        assert_eq!(Interpolation::Interbin.effective_oversample(1), 2);
        assert_eq!(Interpolation::Interpolate.effective_oversample(8), 8);
    }

    #[test]
    fn test_params_from_partial_json() {
        let params = SearchParams::from_json(
            r#"{"harmonics": 4, "interpolation": "interpolate", "num_candidates": 25}"#,
        )
        .unwrap();
        assert_eq!(params.harmonics, 4);
        assert_eq!(params.interpolation, Interpolation::Interpolate);
        assert_eq!(params.num_candidates, 25);
        assert_eq!(params.oversample, 2);
        assert_eq!(params.low_accuracy_half_width, LOW_ACCURACY_HALF_WIDTH);
    }

    #[test]
    fn test_params_reject_bad_json() {
        assert!(SearchParams::from_json(r#"{"harmonics": "many"}"#).is_err());
    }

    #[test]
    fn test_period_errors() {
        let cand = BinaryCandidate {
            full_duration: 1000.0,
            full_lo_r: 2000.0,
            mini_length: 400.0,
            pulsar_period: 0.45,
            ..Default::default()
        };
        assert_relative_eq!(cand.orbital_period_error(), 1.25);
        assert_relative_eq!(cand.pulsar_period_error(), 0.5 - 1000.0 / 2200.0, epsilon = 1e-12);

        let at_dc = BinaryCandidate {
            full_lo_r: 0.0,
            pulsar_period: 0.2,
            ..cand
        };
        assert_relative_eq!(at_dc.pulsar_period_error(), 0.2);
    }

    #[test]
    fn test_novelty_check() {
        let list = vec![binary(10.0, 8.0, 128.0), binary(30.0, 5.0, 128.0), binary(0.0, 0.0, 0.0)];

        // Weaker and within 0.6 bins of an entry of the same length.
        assert!(!binary(10.4, 6.0, 128.0).is_novel_among(&list));
        // Stronger than the nearby entry.
        assert!(binary(10.4, 9.0, 128.0).is_novel_among(&list));
        // Different mini length.
        assert!(binary(10.4, 6.0, 256.0).is_novel_among(&list));
        // Too far away.
        assert!(binary(11.0, 6.0, 128.0).is_novel_among(&list));
    }

    #[test]
    fn test_display_switches_to_exponent_for_fast_pulsars() {
        let slow = BinaryCandidate {
            pulsar_period: 0.5,
            ..Default::default()
        };
        let fast = BinaryCandidate {
            pulsar_period: 0.0002,
            ..Default::default()
        };
        assert!(slow.to_string().contains("Pulsar p    =  0.500000000"));
        assert!(fast.to_string().contains("Pulsar p    =  2.00000e-4"));
        assert_eq!(slow.to_string().lines().count(), 10);
    }

    #[test]
    fn test_result_json_round_trip_fields() {
        let result = SpectrumSearchResult {
            candidates: vec![FftCandidate {
                r: 12.5,
                power: 40.0,
                harmonics: 2,
            }],
            num_candidates: 1,
            stats: PowerStats {
                average: 1.0,
                variance: 1.0,
                max: 40.0,
            },
            processing_time_ms: 3,
        };
        let json = result.to_json().unwrap();
        assert!(json.contains("\"r\": 12.5"));
        assert!(json.contains("\"num_candidates\": 1"));
    }
}
