//! Contrast sensitivity function (CSF) collaborator.
//!
//! The metric treats the CSF as an opaque, pure function of spatial
//! frequency, temporal frequency, background luminance, color channel and
//! stimulus extent. `CastleCsf` is the built-in analytic model; replace it
//! through the trait if a calibrated CSF is available.

/// The CSF interface consumed by the masking model.
///
/// Implementations must be pure (no side effects, same inputs give the same
/// output) and monotonic-sane: sensitivity must not decrease when the
/// background luminance increases.
pub trait ContrastSensitivity {
    /// Sensitivity (1 / threshold contrast) for a stimulus at
    /// `rho` cycles/degree, temporal frequency `omega` Hz, on a background
    /// of `l_bkg` cd/m². `channel` is 0 = achromatic, 1 = rg, 2 = yv.
    /// `sigma` describes the stimulus extent; negative values mean a fixed
    /// extent with no area correction.
    fn sensitivity(&self, rho: f32, omega: f32, l_bkg: f32, channel: usize, sigma: f32) -> f32;

    /// Short model name for diagnostics.
    fn name(&self) -> &str {
        "csf"
    }
}

/// Analytic stand-in for the castleCSF model.
///
/// Achromatic sensitivity is a truncated log-parabola over spatial
/// frequency; the chromatic channels are spatial low-passes; all channels
/// share a saturating luminance term. The transient response keeps the
/// achromatic spectral shape but rolls off high spatial frequencies.
#[derive(Debug, Clone, Copy, Default)]
pub struct CastleCsf;

impl CastleCsf {
    /// Peak achromatic sensitivity at photopic luminance.
    const ACH_PEAK_SENS: f32 = 230.0;
    /// Spatial frequency of the achromatic peak, cycles/degree.
    const ACH_PEAK_FREQ: f32 = 2.5;
    /// Log-parabola width, octaves.
    const ACH_WIDTH: f32 = 1.2;
    /// Low-frequency truncation relative to the peak.
    const ACH_TRUNC: f32 = 0.05;
    /// Half-saturation luminance, cd/m².
    const LUM_HALF: f32 = 7.0;
    /// Luminance saturation exponent.
    const LUM_GAMMA: f32 = 0.6;

    fn spatial_response(rho: f32, channel: usize) -> f32 {
        let rho = rho.max(1e-3);
        match channel {
            // Band-pass, truncated below the peak so very low frequencies
            // stay visible.
            0 => {
                let d = (rho / Self::ACH_PEAK_FREQ).log2();
                let parabola = (-(d * d) / (2.0 * Self::ACH_WIDTH * Self::ACH_WIDTH)).exp();
                let truncated = if rho < Self::ACH_PEAK_FREQ {
                    parabola.max(Self::ACH_TRUNC)
                } else {
                    parabola
                };
                Self::ACH_PEAK_SENS * truncated
            }
            // Chromatic channels are low-pass in spatial frequency.
            1 => 320.0 * (-(rho / 1.2).powf(1.2)).exp(),
            2 => 120.0 * (-(rho / 0.9).powf(1.2)).exp(),
            _ => 0.0,
        }
    }
}

impl ContrastSensitivity for CastleCsf {
    fn sensitivity(&self, rho: f32, omega: f32, l_bkg: f32, channel: usize, sigma: f32) -> f32 {
        let lum = l_bkg.max(1e-4);
        let s_lum = (lum / (lum + Self::LUM_HALF)).powf(Self::LUM_GAMMA);

        let mut s = Self::spatial_response(rho, channel) * s_lum;

        // Transient channel: the achromatic spectral shape with a high
        // spatial frequency roll-off and reduced overall gain.
        if omega > 0.0 {
            s *= 0.8 * (-rho / 4.0).exp();
        }

        // Rovamo-style area correction for positive stimulus extents.
        if sigma > 0.0 {
            let a = sigma * rho;
            s *= (a * a / (a * a + 0.42)).sqrt();
        }

        s
    }

    fn name(&self) -> &str {
        "castle-csf-analytic"
    }
}
