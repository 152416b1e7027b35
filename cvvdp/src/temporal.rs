//! Temporal filter bank.
//!
//! Video is split into sustained and transient temporal channels before the
//! spatial decomposition. Four FIR kernels are derived from the frame rate:
//! low-pass filters for the three sustained channels (luminance, rg, yv)
//! and a band-pass filter centered on the nominal transient frequency for
//! the luminance-transient channel. The kernels are specified in the
//! frequency domain, inverse-transformed to `fl` taps and zero-phase
//! centered. `fl` is odd and spans at least 250 ms of video.

use crate::image::ImageF;
use crate::params::CvvdpParameters;

/// Nominal temporal frequency of the transient channel in Hz.
pub const TRANSIENT_FREQ_HZ: f32 = 5.0;

/// Sustained (luminance, rg, yv) and transient FIR kernels for one frame rate.
#[derive(Debug, Clone)]
pub struct TemporalFilterBank {
    kernels: [Vec<f32>; 4],
    fl: usize,
    fps: f32,
}

impl TemporalFilterBank {
    /// Derives the four kernels for the given frame rate.
    ///
    /// The same `fps` and parameters always produce the same taps.
    #[must_use]
    pub fn new(fps: f32, params: &CvvdpParameters) -> Self {
        // filter_len > 0 pins the length; otherwise derive it from fps.
        // Anything shorter than 3 taps leaves a single frequency sample
        // and no usable band shape, so that is the floor.
        let fl = if params.filter_len > 0 {
            ((params.filter_len as usize) | 1).max(3)
        } else {
            filter_length(fps)
        };
        let n_omega = fl / 2 + 1;
        let nyquist = fps / 2.0;

        let mut responses = [
            vec![0.0f32; n_omega],
            vec![0.0f32; n_omega],
            vec![0.0f32; n_omega],
            vec![0.0f32; n_omega],
        ];

        for i in 0..n_omega {
            let omega = nyquist * i as f32 / (n_omega - 1) as f32;
            // Sustained channels: stretched-exponential low-pass.
            for cc in 0..3 {
                responses[cc][i] =
                    (-omega.powf(params.beta_tf[cc]) / params.sigma_tf[cc]).exp();
            }
            // Transient channel: band-pass centered on the transient frequency.
            let b = params.beta_tf[3];
            let d = omega.powf(b) - TRANSIENT_FREQ_HZ.powf(b);
            responses[3][i] = (-(d * d) / params.sigma_tf[3]).exp();
        }

        let kernels = [
            time_domain_kernel(&responses[0], fl),
            time_domain_kernel(&responses[1], fl),
            time_domain_kernel(&responses[2], fl),
            time_domain_kernel(&responses[3], fl),
        ];

        Self { kernels, fl, fps }
    }

    /// Kernel length in taps (odd).
    #[inline]
    #[must_use]
    pub fn filter_len(&self) -> usize {
        self.fl
    }

    /// Frame rate the bank was built for.
    #[inline]
    #[must_use]
    pub fn frames_per_second(&self) -> f32 {
        self.fps
    }

    /// The taps of one kernel (0..2 sustained, 3 transient).
    #[inline]
    #[must_use]
    pub fn kernel(&self, channel: usize) -> &[f32] {
        &self.kernels[channel]
    }

    /// Filters one temporal window of frames down to a single plane.
    ///
    /// `window` must hold exactly `fl` consecutive decoded planes, oldest
    /// first. The kernel is applied as correlation with time-reversed taps,
    /// so the newest frame is weighted by the first tap.
    ///
    /// # Panics
    /// Panics if the window length is not `fl`.
    #[must_use]
    pub fn apply_window(&self, channel: usize, window: &[&ImageF]) -> ImageF {
        let kernel = &self.kernels[channel];
        assert_eq!(window.len(), kernel.len());

        let width = window[0].width();
        let height = window[0].height();
        let fl = kernel.len();
        let mut out = ImageF::new(width, height);

        for (k, plane) in window.iter().enumerate() {
            let w = kernel[fl - 1 - k];
            for y in 0..height {
                let src = plane.row(y);
                let dst = out.row_mut(y);
                for x in 0..width {
                    dst[x] += src[x] * w;
                }
            }
        }

        out
    }
}

/// Filter length for a frame rate: odd, covering at least 250 ms.
#[must_use]
pub fn filter_length(fps: f32) -> usize {
    (0.250 * fps / 2.0).ceil() as usize * 2 + 1
}

/// Inverse real DFT of a half-spectrum to `n` taps, then zero-phase
/// centering (fftshift). `n` is odd, so every non-DC coefficient doubles.
fn time_domain_kernel(half_spectrum: &[f32], n: usize) -> Vec<f32> {
    let mut taps = vec![0.0f32; n];
    for (i, tap) in taps.iter_mut().enumerate() {
        let mut acc = f64::from(half_spectrum[0]);
        for (k, &coeff) in half_spectrum.iter().enumerate().skip(1) {
            let angle = 2.0 * std::f64::consts::PI * k as f64 * i as f64 / n as f64;
            acc += 2.0 * f64::from(coeff) * angle.cos();
        }
        *tap = (acc / n as f64) as f32;
    }

    // fftshift: move the zero-lag tap to the center.
    let shift = (n + 1) / 2;
    let mut centered = vec![0.0f32; n];
    for i in 0..n {
        centered[i] = taps[(i + shift) % n];
    }
    centered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::CvvdpParameters;

    #[test]
    fn test_filter_length_odd_and_covers_250ms() {
        for &fps in &[24.0f32, 25.0, 30.0, 50.0, 60.0, 120.0] {
            let fl = filter_length(fps);
            assert_eq!(fl % 2, 1, "fl must be odd for fps {fps}");
            assert!(
                (fl - 1) as f32 / fps >= 0.25 - 1e-6,
                "fl {fl} too short for fps {fps}"
            );
        }
    }

    #[test]
    fn test_sustained_kernels_have_unit_dc_gain() {
        let params = CvvdpParameters::default();
        let bank = TemporalFilterBank::new(30.0, &params);
        for cc in 0..3 {
            let sum: f32 = bank.kernel(cc).iter().sum();
            assert!(
                (sum - 1.0).abs() < 1e-3,
                "sustained channel {cc} DC gain {sum}"
            );
        }
    }

    #[test]
    fn test_transient_kernel_has_near_zero_dc_gain() {
        let params = CvvdpParameters::default();
        let bank = TemporalFilterBank::new(30.0, &params);
        let sum: f32 = bank.kernel(3).iter().sum();
        assert!(sum.abs() < 1e-3, "transient DC gain {sum}");
    }

    #[test]
    fn test_pinned_length_below_minimum_yields_finite_taps() {
        let mut params = CvvdpParameters::default();
        params.filter_len = 1;
        let bank = TemporalFilterBank::new(30.0, &params);
        assert_eq!(bank.filter_len(), 3);
        for cc in 0..4 {
            for &tap in bank.kernel(cc) {
                assert!(tap.is_finite(), "channel {cc} tap {tap}");
            }
        }
    }

    #[test]
    fn test_deterministic_for_same_fps() {
        let params = CvvdpParameters::default();
        let a = TemporalFilterBank::new(25.0, &params);
        let b = TemporalFilterBank::new(25.0, &params);
        for cc in 0..4 {
            assert_eq!(a.kernel(cc), b.kernel(cc));
        }
    }

    #[test]
    fn test_apply_window_constant_input() {
        let params = CvvdpParameters::default();
        let bank = TemporalFilterBank::new(30.0, &params);
        let fl = bank.filter_len();
        let plane = ImageF::filled(8, 4, 3.0);
        let window: Vec<&ImageF> = (0..fl).map(|_| &plane).collect();

        // Constant input passes through the sustained channel unchanged...
        let sustained = bank.apply_window(0, &window);
        assert!((sustained.get(2, 2) - 3.0).abs() < 1e-2);

        // ...and is rejected by the transient channel.
        let transient = bank.apply_window(3, &window);
        assert!(transient.get(2, 2).abs() < 1e-2);
    }
}
