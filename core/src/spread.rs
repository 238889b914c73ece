//! Spreading a spectrum onto an oversampled grid.
//!
//! Bin `k` of the input lands on index `k * oversample` of a zeroed,
//! padded buffer.  The gaps are then filled either by interbinning (a cheap
//! finite-difference estimate of the half-bin value) or by correlating with
//! the cached Fourier interpolation kernel, which gives properly
//! sinc-interpolated values at every sub-bin.

use std::f32::consts::FRAC_2_PI;

use num_complex::Complex32;

use crate::kernel::{KernelCache, KernelKey};
use crate::padding::choose_padded_length;
use crate::types::Interpolation;

/// Value written over the DC and Nyquist bins.  Their true magnitudes are
/// outliers that would swamp both the statistics and the candidate list.
pub const PLACEHOLDER: Complex32 = Complex32::new(1.0, 0.0);

/// A spectrum spread onto an oversampled grid.
#[derive(Clone, Debug)]
pub struct Oversampled {
    /// Padded buffer; only the first `search_len` points are meaningful.
    pub buffer: Vec<Complex32>,
    /// Effective oversampling factor (2 whenever interbinning).
    pub oversample: usize,
    /// `spectrum.len() * oversample`.
    pub search_len: usize,
}

/// Spread `spectrum` into a zeroed buffer of `padded_len` points, bin `k`
/// going to index `k * oversample`.  Bins that do not fit are dropped.
pub fn spread_spectrum(
    spectrum: &[Complex32],
    oversample: usize,
    padded_len: usize,
) -> Vec<Complex32> {
    let mut buffer = vec![Complex32::new(0.0, 0.0); padded_len];
    for (slot, &value) in buffer.iter_mut().step_by(oversample).zip(spectrum) {
        *slot = value;
    }
    buffer
}

/// Overwrite index 0 and index `search_len` (when it lies inside the
/// buffer) with [`PLACEHOLDER`].
pub fn suppress_dc_and_nyquist(buffer: &mut [Complex32], search_len: usize) {
    if let Some(dc) = buffer.first_mut() {
        *dc = PLACEHOLDER;
    }
    if let Some(nyquist) = buffer.get_mut(search_len) {
        *nyquist = PLACEHOLDER;
    }
}

/// Fill every odd index below `search_len` with `(2/π) (x[i-1] - x[i+1])`.
///
/// Expects a buffer spread with an oversampling factor of 2.  A missing
/// right neighbour past the end of the buffer counts as zero.
pub fn interbin(buffer: &mut [Complex32], search_len: usize) {
    let end = search_len.min(buffer.len());
    for ii in (1..end).step_by(2) {
        let next = buffer.get(ii + 1).copied().unwrap_or_default();
        buffer[ii] = (buffer[ii - 1] - next) * FRAC_2_PI;
    }
}

/// Spread `spectrum` and fill in the sub-bin values according to
/// `interpolation`.
///
/// Interbinning always uses an oversampling factor of 2, whatever
/// `oversample` says.  The caller guarantees `oversample >= 1`.
pub fn oversample_spectrum(
    spectrum: &[Complex32],
    interpolation: Interpolation,
    oversample: usize,
    low_acc_half_width: usize,
    cache: &mut KernelCache,
) -> Oversampled {
    let oversample = interpolation.effective_oversample(oversample);
    let search_len = spectrum.len() * oversample;
    let layout = choose_padded_length(spectrum.len(), oversample, low_acc_half_width);

    let mut buffer = spread_spectrum(spectrum, oversample, layout.padded_len);
    suppress_dc_and_nyquist(&mut buffer, search_len);

    match interpolation {
        Interpolation::Interbin => interbin(&mut buffer, search_len),
        Interpolation::Interpolate => {
            let key = KernelKey {
                spectrum_len: spectrum.len(),
                oversample,
                padded_len: layout.padded_len,
                half_width: layout.kernel_half_width,
            };
            cache.correlate(key, &mut buffer);
        }
    }

    Oversampled {
        buffer,
        oversample,
        search_len,
    }
}
