//! Choice of an FFT-friendly oversampled length.
//!
//! The interpolating correlation is circular, so the spread spectrum needs a
//! little zero padding past its end to keep the top bins from wrapping onto
//! the bottom ones.  The pad is capped twice: at one eighth of the spectrum,
//! and at the low-accuracy half width of the Fourier response scaled by the
//! oversampling factor.  The total is then rounded up to a highly composite
//! transform length, which matters far more for FFT speed than the few extra
//! bins it costs.

/// Half width (in bins) of the low-accuracy Fourier interpolation response.
pub const LOW_ACCURACY_HALF_WIDTH: usize = 16;

/// Requirements at or below this are used as-is.
const SMALL_LENGTH: usize = 144;

/// Highly composite transform lengths, ascending.
const LENGTH_LADDER: [usize; 13] = [
    288, 540, 1080, 2100, 4200, 8232, 16464, 32805, 65610, 131220, 262440, 525000, 1050000,
];

/// Result of [`choose_padded_length`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PaddedLength {
    /// Length of the oversampled, padded transform buffer.
    pub padded_len: usize,
    /// Pad in original bins; also the interpolation kernel half width.
    pub kernel_half_width: usize,
}

/// Pick the padded transform length for a spectrum of `spectrum_len` bins
/// oversampled by `oversample`.
///
/// `spectrum_len` is expected to be a power of two.  `low_acc_half_width` is
/// normally [`LOW_ACCURACY_HALF_WIDTH`].
pub fn choose_padded_length(
    spectrum_len: usize,
    oversample: usize,
    low_acc_half_width: usize,
) -> PaddedLength {
    let pad = (spectrum_len / 8).min(low_acc_half_width * (oversample / 2));
    let required = (spectrum_len + pad) * oversample;

    let padded_len = if required <= SMALL_LENGTH {
        required
    } else {
        LENGTH_LADDER
            .iter()
            .copied()
            .find(|&len| required <= len)
            .unwrap_or((required + 1000) / 1000 * 1000)
    };

    PaddedLength {
        padded_len,
        kernel_half_width: pad,
    }
}
