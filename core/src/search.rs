//! Spectrum search engine: oversampled, harmonic-summing periodicity search.
//!
//! # Background
//!
//! A strictly periodic signal shows up in the Fourier transform of a time
//! series as power at its spin frequency and at integer multiples of it.  Two
//! things stand between that power and a detection: the signal rarely sits
//! exactly on a bin (up to ~60% of the power is lost half-way between
//! bins), and narrow pulses spread their power over many weak harmonics.
//! The search therefore
//!
//! 1. **oversamples** the spectrum (interbinning or full Fourier
//!    interpolation) so that every frequency is close to a sample;
//! 2. **normalises** the powers and records the raw band statistics;
//! 3. **sums harmonics** incoherently, one order at a time;
//! 4. **ranks** every bin that beats the current threshold in a bounded,
//!    sorted candidate list.
//!
//! # Binary pulsars
//!
//! Orbital motion phase-modulates a pulsar's signal, surrounding the spin
//! frequency in a long spectrum with a comb of sidebands spaced by the
//! orbital frequency.  Re-transforming short stretches of the long spectrum
//! gives *mini spectra* in which that spacing becomes a peak.
//! [`SpectrumSearch::search_mini_spectrum`] searches one of them and maps
//! each peak back to a spin and orbital period;
//! [`SpectrumSearch::search_mini_spectra`] walks many stretches in parallel
//! with **rayon**.

use std::time::Instant;

use log::{debug, info};
use num_complex::Complex32;
#[cfg(feature = "python")]
use pyo3::prelude::*;
use rayon::prelude::*;

use crate::harmonics::{
    band_statistics, mirror_about_nyquist, raw_band_powers, search_harmonics, spectral_powers,
    AdmissionPolicy,
};
use crate::kernel::KernelCache;
use crate::ranked_list::{Ranked, RankedList};
use crate::significance::{candidate_sigma, power_for_sigma, MAX_SIGMA};
use crate::spread::oversample_spectrum;
use crate::types::{
    Aliasing, BinaryCandidate, FftCandidate, Interpolation, MiniSegment, Observation,
    SearchParams, SpectrumSearchResult,
};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur during a spectrum search.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("input spectrum is empty")]
    EmptySpectrum,

    #[error("oversampling factor {0} is invalid (interpolation needs at least 2)")]
    InvalidOversample(usize),

    #[error("lowest bin {lo_bin} is outside a spectrum of {len} bins")]
    LowBinOutOfRange { lo_bin: usize, len: usize },

    #[error("candidate list has no slots; at least one candidate is required")]
    NoCandidateSlots,

    #[error("search parameters invalid: {0}")]
    BadParams(String),

    #[error("invalid search configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("could not build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

// ---------------------------------------------------------------------------
// Admission policies
// ---------------------------------------------------------------------------

/// Plain search: fixed lists track their weakest power, dynamic lists use
/// the power needed for `sigma_cutoff` after `trials` trials.
struct PlainPolicy {
    /// Bins per oversampled index.
    dr: f64,
    /// `(sigma_cutoff, trials)` when the list grows dynamically.
    cutoff: Option<(f64, f64)>,
}

impl AdmissionPolicy for PlainPolicy {
    type Candidate = FftCandidate;

    fn order_threshold(&self, list: &RankedList<FftCandidate>, harmonics: usize) -> f64 {
        match self.cutoff {
            Some((sigma, trials)) => power_for_sigma(sigma, harmonics, trials),
            None => list.min_metric(),
        }
    }

    fn admitted_threshold(
        &self,
        list: &RankedList<FftCandidate>,
        harmonics: usize,
        min_metric: f64,
    ) -> f64 {
        match self.cutoff {
            // Growing lists never tighten their threshold within an order.
            Some(_) => self.order_threshold(list, harmonics),
            None => min_metric,
        }
    }

    fn candidate(&self, index: usize, power: f32, harmonics: usize) -> FftCandidate {
        FftCandidate {
            r: self.dr * index as f64,
            power: power as f64,
            harmonics,
        }
    }
}

/// Binary search: one trial, threshold is the power that would match the
/// weakest retained significance at the current order.
struct BinaryPolicy {
    dr: f64,
}

impl AdmissionPolicy for BinaryPolicy {
    type Candidate = BinaryCandidate;

    fn order_threshold(&self, list: &RankedList<BinaryCandidate>, harmonics: usize) -> f64 {
        power_for_sigma(list.min_metric(), harmonics, 1.0)
    }

    fn admitted_threshold(
        &self,
        _list: &RankedList<BinaryCandidate>,
        harmonics: usize,
        min_metric: f64,
    ) -> f64 {
        power_for_sigma(min_metric, harmonics, 1.0)
    }

    fn candidate(&self, index: usize, power: f32, harmonics: usize) -> BinaryCandidate {
        let power = power as f64;
        BinaryCandidate {
            mini_r: self.dr * index as f64,
            mini_power: power,
            mini_harmonics: harmonics,
            mini_sigma: candidate_sigma(power, harmonics, 1.0),
            ..BinaryCandidate::sentinel()
        }
    }
}

// ---------------------------------------------------------------------------
// SpectrumSearch
// ---------------------------------------------------------------------------

/// The spectrum search engine.
///
/// Construct with [`SearchParams`] and call one of the search methods with a
/// [`KernelCache`].  The cache is only touched when interpolating; keep one
/// per thread and reuse it across calls on spectra of the same length.
#[derive(Clone, Debug, Default)]
pub struct SpectrumSearch {
    params: SearchParams,
}

impl SpectrumSearch {
    pub fn new(params: SearchParams) -> Self {
        Self { params }
    }

    /// Build an engine from a JSON parameter document.
    pub fn from_json(json: &str) -> Result<Self, SearchError> {
        Ok(Self::new(SearchParams::from_json(json)?))
    }

    pub fn params(&self) -> &SearchParams {
        &self.params
    }

    /// Search a spectrum for periodic signals, starting at bin `lo_bin`.
    ///
    /// With `params.num_candidates > 0` exactly that many slots are
    /// returned, sentinels included.  With 0 the list grows to hold every
    /// bin above `params.sigma_cutoff` and is trimmed to them.
    ///
    /// A candidate's `r` and `power` both come from the oversampled bin
    /// index it was found at, never from the harmonic order.
    pub fn search_spectrum(
        &self,
        cache: &mut KernelCache,
        spectrum: &[Complex32],
        lo_bin: usize,
    ) -> Result<SpectrumSearchResult, SearchError> {
        let start = Instant::now();
        self.validate(spectrum)?;
        if lo_bin >= spectrum.len() {
            return Err(SearchError::LowBinOutOfRange {
                lo_bin,
                len: spectrum.len(),
            });
        }
        let normalization = self.params.normalization as f32;

        info!(
            "Starting spectrum search: {} bins from bin {}, {} harmonics, {:?} x{}",
            spectrum.len(),
            lo_bin,
            self.params.harmonics,
            self.params.interpolation,
            self.params.oversample,
        );

        // ------------------------------------------------------------------
        // Raw statistics, before interpolation changes the noise
        // ------------------------------------------------------------------
        let stats = band_statistics(&raw_band_powers(spectrum, lo_bin, normalization));

        // ------------------------------------------------------------------
        // Oversampled powers
        // ------------------------------------------------------------------
        let (powers, oversample) = self.oversampled_powers(cache, spectrum)?;

        // ------------------------------------------------------------------
        // Harmonic summing into the ranked list
        // ------------------------------------------------------------------
        let trials = (spectrum.len() - lo_bin) as f64;
        let (mut list, cutoff) = if self.params.num_candidates > 0 {
            (RankedList::fixed(self.params.num_candidates), None)
        } else {
            (RankedList::dynamic(), Some((self.params.sigma_cutoff, trials)))
        };
        let policy = PlainPolicy {
            dr: 1.0 / oversample as f64,
            cutoff,
        };
        search_harmonics(
            &powers,
            lo_bin * oversample,
            self.params.harmonics,
            &policy,
            &mut list,
        );

        let num_candidates = list.genuine();
        let mut candidates = list.into_candidates();
        for cand in candidates.iter_mut() {
            cand.harmonics = self.params.harmonics;
        }

        let elapsed = start.elapsed().as_millis() as u64;
        info!(
            "Spectrum search complete in {} ms: {} candidates, <P> = {:.3}, max P = {:.3}",
            elapsed, num_candidates, stats.average, stats.max,
        );

        Ok(SpectrumSearchResult {
            candidates,
            num_candidates,
            stats,
            processing_time_ms: elapsed,
        })
    }

    /// Search one mini spectrum, overwriting `candidates` in place with the
    /// best detections in non-increasing significance.
    ///
    /// `full_lo_r` is the first long-spectrum bin of the stretch the mini
    /// spectrum was made from.  Powers are used as they come (a mini
    /// spectrum is expected to be normalised already).
    pub fn search_mini_spectrum(
        &self,
        cache: &mut KernelCache,
        mini: &[Complex32],
        full_lo_r: f64,
        observation: &Observation,
        candidates: &mut [BinaryCandidate],
        aliasing: Aliasing,
    ) -> Result<(), SearchError> {
        self.validate(mini)?;
        if candidates.is_empty() {
            return Err(SearchError::NoCandidateSlots);
        }

        let oversampled = oversample_spectrum(
            mini,
            self.params.interpolation,
            self.params.oversample,
            self.params.low_accuracy_half_width,
            cache,
        );
        let mini_length = oversampled.search_len;
        let half = spectral_powers(&oversampled.buffer, mini_length, 1.0);
        let powers = match aliasing {
            Aliasing::Check => mirror_about_nyquist(&half),
            Aliasing::Ignore => half,
        };
        debug!(
            "mini spectrum: {} bins -> {} searched ({:?})",
            mini.len(),
            powers.len(),
            aliasing
        );

        let mut list = RankedList::fixed(candidates.len());
        let policy = BinaryPolicy {
            dr: 1.0 / oversampled.oversample as f64,
        };
        search_harmonics(&powers, 1, self.params.harmonics, &policy, &mut list);

        let mini_length = mini_length as f64;
        let pulsar_period = observation.duration / (full_lo_r + mini.len() as f64);
        for (slot, found) in candidates.iter_mut().zip(list.into_candidates()) {
            *slot = BinaryCandidate {
                full_length: observation.full_length,
                full_duration: observation.duration,
                full_lo_r,
                mini_length,
                pulsar_period,
                orbital_period: observation.duration * found.mini_r / mini_length,
                ..found
            };
        }
        Ok(())
    }

    /// Search many mini spectra of one observation in parallel and merge the
    /// results into at most `capacity` novel candidates, best first.
    ///
    /// Every rayon worker owns its own [`KernelCache`].
    pub fn search_mini_spectra(
        &self,
        segments: &[MiniSegment],
        observation: &Observation,
        capacity: usize,
        aliasing: Aliasing,
    ) -> Result<Vec<BinaryCandidate>, SearchError> {
        let start = Instant::now();
        if capacity == 0 {
            return Err(SearchError::NoCandidateSlots);
        }
        info!(
            "Starting batch mini-spectrum search: {} segments, {} slots each",
            segments.len(),
            capacity,
        );

        let run = || {
            segments
                .par_iter()
                .map_init(KernelCache::new, |cache, segment| {
                    let mut slots = vec![BinaryCandidate::sentinel(); capacity];
                    self.search_mini_spectrum(
                        cache,
                        &segment.spectrum,
                        segment.full_lo_r,
                        observation,
                        &mut slots,
                        aliasing,
                    )
                    .map(|()| slots)
                })
                .collect::<Result<Vec<_>, SearchError>>()
        };
        let per_segment = if self.params.n_workers > 0 {
            rayon::ThreadPoolBuilder::new()
                .num_threads(self.params.n_workers)
                .build()?
                .install(run)?
        } else {
            run()?
        };

        let merged = merge_binary_candidates(per_segment.into_iter().flatten(), capacity);

        info!(
            "Batch search complete in {} ms: {} candidates kept",
            start.elapsed().as_millis(),
            merged.len(),
        );
        Ok(merged)
    }

    /// Normalised powers of the oversampled spectrum (DC at the sentinel
    /// power) and the effective oversampling factor.
    pub fn oversampled_powers(
        &self,
        cache: &mut KernelCache,
        spectrum: &[Complex32],
    ) -> Result<(Vec<f32>, usize), SearchError> {
        self.validate(spectrum)?;
        let oversampled = oversample_spectrum(
            spectrum,
            self.params.interpolation,
            self.params.oversample,
            self.params.low_accuracy_half_width,
            cache,
        );
        let scale = 1.0 / self.params.normalization as f32;
        let powers = spectral_powers(&oversampled.buffer, oversampled.search_len, scale);
        Ok((powers, oversampled.oversample))
    }

    // ======================================================================
    // Internal helpers
    // ======================================================================

    fn validate(&self, spectrum: &[Complex32]) -> Result<(), SearchError> {
        let params = &self.params;
        if spectrum.is_empty() {
            return Err(SearchError::EmptySpectrum);
        }
        if params.harmonics == 0 {
            return Err(SearchError::BadParams("harmonics must be at least 1".into()));
        }
        if !(params.normalization.is_finite() && params.normalization > 0.0) {
            return Err(SearchError::BadParams(format!(
                "normalization must be positive, got {}",
                params.normalization
            )));
        }
        if params.num_candidates == 0 && !(params.sigma_cutoff.abs() <= MAX_SIGMA) {
            return Err(SearchError::BadParams(format!(
                "sigma cutoff must be finite and at most {}, got {}",
                MAX_SIGMA, params.sigma_cutoff
            )));
        }
        if params.interpolation == Interpolation::Interpolate && params.oversample < 2 {
            return Err(SearchError::InvalidOversample(params.oversample));
        }
        Ok(())
    }
}

/// Sort candidates by significance and keep up to `capacity` of them,
/// skipping empty slots and weaker near-duplicates of ones already kept.
pub fn merge_binary_candidates(
    candidates: impl IntoIterator<Item = BinaryCandidate>,
    capacity: usize,
) -> Vec<BinaryCandidate> {
    let mut all: Vec<BinaryCandidate> = candidates
        .into_iter()
        .filter(|c| c.mini_sigma > 0.0)
        .collect();
    all.sort_by(|a, b| {
        b.mini_sigma
            .partial_cmp(&a.mini_sigma)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut merged: Vec<BinaryCandidate> = Vec::with_capacity(capacity);
    for cand in all {
        if merged.len() == capacity {
            break;
        }
        if cand.is_novel_among(&merged) {
            merged.push(cand);
        }
    }
    merged
}

// ---------------------------------------------------------------------------
// Python interface
// ---------------------------------------------------------------------------

/// Python-facing search engine that owns its kernel cache.
#[cfg(feature = "python")]
#[pyclass(name = "SpectrumSearch", unsendable)]
#[derive(Debug)]
pub struct PySpectrumSearch {
    engine: SpectrumSearch,
    cache: KernelCache,
}

#[cfg(feature = "python")]
fn to_complex(spectrum: Vec<(f32, f32)>) -> Vec<Complex32> {
    spectrum
        .into_iter()
        .map(|(re, im)| Complex32::new(re, im))
        .collect()
}

#[cfg(feature = "python")]
#[pymethods]
impl PySpectrumSearch {
    #[new]
    #[pyo3(signature = (params=None))]
    pub fn new(params: Option<SearchParams>) -> Self {
        Self {
            engine: SpectrumSearch::new(params.unwrap_or_default()),
            cache: KernelCache::new(),
        }
    }

    /// Search a spectrum given as `(re, im)` pairs.
    #[pyo3(name = "search", signature = (spectrum, lo_bin=1))]
    pub fn py_search(
        &mut self,
        spectrum: Vec<(f32, f32)>,
        lo_bin: usize,
    ) -> PyResult<SpectrumSearchResult> {
        let spectrum = to_complex(spectrum);
        self.engine
            .search_spectrum(&mut self.cache, &spectrum, lo_bin)
            .map_err(|e| pyo3::exceptions::PyRuntimeError::new_err(e.to_string()))
    }

    /// Search a mini spectrum and return `num_candidates` binary candidates.
    #[pyo3(
        name = "search_mini",
        signature = (mini, num_candidates, full_length, full_duration, full_lo_r, check_aliased=false)
    )]
    #[allow(clippy::too_many_arguments)]
    pub fn py_search_mini(
        &mut self,
        mini: Vec<(f32, f32)>,
        num_candidates: usize,
        full_length: f64,
        full_duration: f64,
        full_lo_r: f64,
        check_aliased: bool,
    ) -> PyResult<Vec<BinaryCandidate>> {
        let mini = to_complex(mini);
        let observation = Observation {
            full_length,
            duration: full_duration,
        };
        let aliasing = if check_aliased {
            Aliasing::Check
        } else {
            Aliasing::Ignore
        };
        let mut slots = vec![BinaryCandidate::sentinel(); num_candidates];
        self.engine
            .search_mini_spectrum(
                &mut self.cache,
                &mini,
                full_lo_r,
                &observation,
                &mut slots,
                aliasing,
            )
            .map_err(|e| pyo3::exceptions::PyValueError::new_err(e.to_string()))?;
        Ok(slots)
    }

    fn __repr__(&self) -> String {
        format!("SpectrumSearch({:?})", self.engine.params)
    }
}
