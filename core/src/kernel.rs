//! Fourier interpolation kernel and its cache.
//!
//! Sub-bin interpolation correlates the spread spectrum against the complex
//! Fourier response of a sinusoid that sits exactly on a bin.  The response
//! only depends on the buffer geometry, so it is built once, transformed to
//! the frequency domain and reused for every spectrum of the same shape.
//!
//! [`KernelCache`] is an explicit value rather than global state: each
//! search call borrows it mutably, so a kernel can never be replaced while
//! another call is still reading it.  Give every worker thread its own cache.

use std::f64::consts::PI;
use std::fmt;

use log::debug;
use num_complex::Complex32;
use rustfft::FftPlanner;

/// Identity of a cached kernel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct KernelKey {
    /// Number of bins in the (un-oversampled) spectrum.
    pub spectrum_len: usize,
    /// Interpolated points per bin.
    pub oversample: usize,
    /// Length of the padded transform buffer.
    pub padded_len: usize,
    /// Kernel half width in bins.
    pub half_width: usize,
}

impl KernelKey {
    /// Number of response points: `2 * oversample * half_width`.
    pub fn num_points(&self) -> usize {
        2 * self.oversample * self.half_width
    }
}

struct CachedKernel {
    key: KernelKey,
    /// Forward transform of the wrapped response, `key.padded_len` long.
    spectrum: Vec<Complex32>,
}

/// Single-slot cache of the frequency-domain interpolation kernel, plus the
/// FFT planner used to build and apply it.
pub struct KernelCache {
    planner: FftPlanner<f32>,
    cached: Option<CachedKernel>,
    rebuilds: usize,
}

impl fmt::Debug for KernelCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelCache")
            .field("key", &self.key())
            .field("rebuilds", &self.rebuilds)
            .finish()
    }
}

impl Default for KernelCache {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelCache {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
            cached: None,
            rebuilds: 0,
        }
    }

    /// Key of the kernel currently held, if any.
    pub fn key(&self) -> Option<KernelKey> {
        self.cached.as_ref().map(|c| c.key)
    }

    /// How many times a kernel has been (re)built by this cache.
    pub fn rebuilds(&self) -> usize {
        self.rebuilds
    }

    /// Return the frequency-domain kernel for `key`, building it first when
    /// the cache holds nothing or a kernel for a different key.
    pub fn kernel(&mut self, key: KernelKey) -> &[Complex32] {
        self.ensure(key);
        match &self.cached {
            Some(cached) => &cached.spectrum,
            None => &[],
        }
    }

    /// Circularly correlate `buffer` (time-domain spread spectrum, length
    /// `key.padded_len`) against the kernel for `key`, in place.
    ///
    /// Forward transform, multiply by the conjugate kernel, inverse
    /// transform, scale by `1 / padded_len`.
    pub fn correlate(&mut self, key: KernelKey, buffer: &mut [Complex32]) {
        assert_eq!(
            buffer.len(),
            key.padded_len,
            "correlation buffer does not match the kernel length"
        );
        self.ensure(key);

        let forward = self.planner.plan_fft_forward(key.padded_len);
        let inverse = self.planner.plan_fft_inverse(key.padded_len);
        forward.process(buffer);

        let norm = 1.0 / key.padded_len as f32;
        if let Some(cached) = &self.cached {
            for (value, k) in buffer.iter_mut().zip(&cached.spectrum) {
                *value = *value * k.conj() * norm;
            }
        }
        inverse.process(buffer);
    }

    fn ensure(&mut self, key: KernelKey) {
        if self.key() == Some(key) {
            return;
        }
        debug!(
            "building interpolation kernel: {} bins x{} oversampled, {} points in {}",
            key.spectrum_len,
            key.oversample,
            key.num_points(),
            key.padded_len,
        );

        let response = fourier_response(key.oversample, key.num_points());
        let mut spectrum = place_kernel(&response, key.padded_len);
        self.planner
            .plan_fft_forward(key.padded_len)
            .process(&mut spectrum);

        self.cached = Some(CachedKernel { key, spectrum });
        self.rebuilds += 1;
    }
}

/// Complex Fourier response of a sinusoid centred on a bin, sampled
/// `oversample` times per bin over `num_points` points.
///
/// Point `i` sits at phase `r = π (num_points / (2 oversample) - i / oversample)`
/// and has value `e^{ir} sin(r) / r`; the centre point is exactly 1.
pub fn fourier_response(oversample: usize, num_points: usize) -> Vec<Complex32> {
    let start = PI * num_points as f64 / (2.0 * oversample as f64);
    let delta = -PI / oversample as f64;

    (0..num_points)
        .map(|ii| {
            let r = start + ii as f64 * delta;
            let sinc = if r.abs() < 1e-12 { 1.0 } else { r.sin() / r };
            Complex32::new((r.cos() * sinc) as f32, (r.sin() * sinc) as f32)
        })
        .collect()
}

/// Wrap a centred response into a zeroed buffer of `len` points: the upper
/// half (non-negative lags) at the start, the lower half at the end.
pub fn place_kernel(response: &[Complex32], len: usize) -> Vec<Complex32> {
    let half = response.len() / 2;
    let mut placed = vec![Complex32::new(0.0, 0.0); len];
    placed[..half].copy_from_slice(&response[half..2 * half]);
    placed[len - half..].copy_from_slice(&response[..half]);
    placed
}
