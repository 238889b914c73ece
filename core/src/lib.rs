//! # fftsearch-core
//!
//! Oversampled, harmonic-summing periodicity search over Fourier spectra,
//! with optional Python bindings via [PyO3](https://pyo3.rs).
//!
//! ## Overview
//!
//! | Module            | Purpose                                                   |
//! |-------------------|-----------------------------------------------------------|
//! | [`search`]        | Search drivers: plain, mini-spectrum and batch searches  |
//! | [`spread`]        | Spreading a spectrum onto an oversampled grid             |
//! | [`kernel`]        | Fourier interpolation kernel and its per-thread cache     |
//! | [`padding`]       | Choice of padded transform lengths                        |
//! | [`harmonics`]     | Powers, band statistics and incoherent harmonic summing   |
//! | [`significance`]  | Chi-square tail probabilities and Gaussian sigmas         |
//! | [`ranked_list`]   | Bounded / growable candidate list sorted by quality       |
//! | [`types`]         | Shared data structures (candidates, params, results)      |
//!
//! ## Rust usage
//!
//! ```no_run
//! use fftsearch_core::{KernelCache, SearchParams, SpectrumSearch};
//! use num_complex::Complex32;
//!
//! let spectrum = vec![Complex32::new(0.0, 0.0); 4096];
//! let engine = SpectrumSearch::new(SearchParams {
//!     harmonics: 4,
//!     num_candidates: 20,
//!     ..SearchParams::default()
//! });
//! let mut cache = KernelCache::new();
//! let result = engine.search_spectrum(&mut cache, &spectrum, 10).unwrap();
//! for candidate in &result.candidates {
//!     println!("r = {:.2}  P = {:.2}", candidate.r, candidate.power);
//! }
//! ```
//!
//! ## Python usage
//!
//! Built with the `python` feature, the library exposes a module called
//! `fftsearch_core`:
//!
//! ```python
//! import fftsearch_core
//!
//! params = fftsearch_core.SearchParams(harmonics=4, num_candidates=20)
//! engine = fftsearch_core.SpectrumSearch(params)
//! result = engine.search(spectrum, lo_bin=10)
//!
//! for candidate in result.candidates:
//!     print(candidate)
//! ```

pub mod harmonics;
pub mod kernel;
pub mod padding;
pub mod ranked_list;
pub mod search;
pub mod significance;
pub mod spread;
pub mod types;

// Re-export the most commonly used items at crate root for convenience.
pub use harmonics::PowerStats;
pub use kernel::KernelCache;
pub use ranked_list::{Ranked, RankedList};
pub use search::{SearchError, SpectrumSearch};
pub use types::{
    Aliasing, BinaryCandidate, FftCandidate, Interpolation, MiniSegment, Observation,
    SearchParams, SpectrumSearchResult,
};

#[cfg(feature = "python")]
use pyo3::prelude::*;

/// The top-level Python module exposed by this crate.
///
/// Registered classes:
/// - `SpectrumSearch`: the search engine, owning its kernel cache
/// - `SearchParams`: search configuration
/// - `SpectrumSearchResult`: candidates plus raw band statistics
/// - `FftCandidate` / `BinaryCandidate`: single detections
/// - `PowerStats`, `Interpolation`, `Aliasing`
#[cfg(feature = "python")]
#[pymodule]
fn fftsearch_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<search::PySpectrumSearch>()?;
    m.add_class::<SearchParams>()?;
    m.add_class::<SpectrumSearchResult>()?;
    m.add_class::<FftCandidate>()?;
    m.add_class::<BinaryCandidate>()?;
    m.add_class::<PowerStats>()?;
    m.add_class::<Interpolation>()?;
    m.add_class::<Aliasing>()?;

    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    m.add("__doc__", "Oversampled harmonic-summing FFT search core.")?;

    Ok(())
}
