//! Contrast masking and visual-difference computation.
//!
//! Each pyramid band is first weighted by the contrast sensitivity, then a
//! masking signal built from the weaker of the two stimuli suppresses
//! differences near strong contrast. The result is a per-pixel visual
//! difference map that spatial pooling collapses into one value per
//! (channel, frame, band).

use crate::blur::gaussian_blur;
use crate::image::ImageF;
use crate::params::CvvdpParameters;
use crate::CvvdpError;

/// Masking signal construction. Only mutual masking is calibrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskingModel {
    /// Mask from the weaker of the test and reference contrasts.
    MutualMasking,
}

impl MaskingModel {
    pub fn from_name(name: &str) -> Result<Self, CvvdpError> {
        match name {
            "mutual_masking" => Ok(Self::MutualMasking),
            other => Err(CvvdpError::UnknownMaskingModel {
                value: other.to_string(),
            }),
        }
    }
}

/// Local adaptation strategy for the contrast denominator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalAdapt {
    /// Both signals adapt to the reference background.
    SimpleRef,
}

impl LocalAdapt {
    pub fn from_name(name: &str) -> Result<Self, CvvdpError> {
        match name {
            "simple_ref" => Ok(Self::SimpleRef),
            other => Err(CvvdpError::UnknownLocalAdapt {
                value: other.to_string(),
            }),
        }
    }
}

/// Saturation applied to difference values before pooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffClamp {
    /// Hard ceiling at `10^par[0]`.
    Hard,
    /// Smooth sigmoid `D^n / (off^n + D^n)` with `n = par[0]`,
    /// `off = par[1]`. Strictly increasing, so ordering of differences
    /// survives the clamp.
    Soft,
}

impl DiffClamp {
    pub fn from_name(name: &str) -> Result<Self, CvvdpError> {
        match name {
            "hard" => Ok(Self::Hard),
            "soft" => Ok(Self::Soft),
            other => Err(CvvdpError::UnknownClampType {
                value: other.to_string(),
            }),
        }
    }
}

/// Resolved masking configuration.
///
/// String-valued parameters are resolved into enums once, at metric
/// construction, so a typo in a calibration file fails fast instead of
/// halfway through a video.
#[derive(Debug, Clone)]
pub struct MaskingStage {
    model: MaskingModel,
    clamp: DiffClamp,
    mask_p: f32,
    mask_c: f32,
    pu_dilate: f32,
    mask_q_sust: f32,
    mask_q_trans: f32,
    dclamp_par: Vec<f32>,
}

impl MaskingStage {
    pub fn from_params(params: &CvvdpParameters) -> Result<Self, CvvdpError> {
        Ok(Self {
            model: MaskingModel::from_name(&params.masking_model)?,
            clamp: DiffClamp::from_name(&params.dclamp_type)?,
            mask_p: params.mask_p,
            mask_c: params.mask_c,
            pu_dilate: params.pu_dilate,
            mask_q_sust: params.mask_q_sust,
            mask_q_trans: params.mask_q_trans,
            dclamp_par: params.dclamp_par.clone(),
        })
    }

    #[inline]
    #[must_use]
    pub fn model(&self) -> MaskingModel {
        self.model
    }

    /// Masked visual difference for one non-baseband channel pair.
    ///
    /// `test` and `refr` are contrast planes, `sens` the matching CSF
    /// sensitivity plane. The transient channel uses its own masking
    /// exponent `mask_q_trans`.
    #[must_use]
    pub fn visual_difference(
        &self,
        test: &ImageF,
        refr: &ImageF,
        sens: &ImageF,
        transient: bool,
    ) -> ImageF {
        let tp = test.zip_map(sens, |t, s| t * s);
        let rp = refr.zip_map(sens, |r, s| r * s);

        let mask = match self.model {
            MaskingModel::MutualMasking => tp.zip_map(&rp, |t, r| t.abs().min(r.abs())),
        };
        let mask = self.phase_uncertainty(mask);

        let q = if transient {
            self.mask_q_trans
        } else {
            self.mask_q_sust
        };
        let p = self.mask_p;
        let mut d = tp.zip_map(&rp, |t, r| (t - r).abs());
        for y in 0..d.height() {
            let mask_row = mask.row(y);
            let row = d.row_mut(y);
            for x in 0..row.len() {
                let raw = row[x].powf(p) / (1.0 + mask_row[x].powf(q));
                row[x] = self.clamp_diff(raw);
            }
        }
        d
    }

    /// Baseband difference: no masking, just sensitivity-weighted
    /// absolute difference.
    #[must_use]
    pub fn baseband_difference(test: &ImageF, refr: &ImageF, sens: &ImageF) -> ImageF {
        let mut d = test.zip_map(refr, |t, r| (t - r).abs());
        for y in 0..d.height() {
            let sens_row = sens.row(y);
            let row = d.row_mut(y);
            for x in 0..row.len() {
                row[x] *= sens_row[x];
            }
        }
        d
    }

    /// Spreads the masking signal spatially to model phase uncertainty,
    /// then scales it by `10^mask_c`.
    fn phase_uncertainty(&self, mask: ImageF) -> ImageF {
        let scale = 10.0f32.powf(self.mask_c);
        let mut out = if self.pu_dilate != 0.0 {
            gaussian_blur(&mask, self.pu_dilate)
        } else {
            mask
        };
        out.map_inplace(|v| v * scale);
        out
    }

    fn clamp_diff(&self, d: f32) -> f32 {
        match self.clamp {
            DiffClamp::Hard => d.min(10.0f32.powf(self.dclamp_par[0])),
            DiffClamp::Soft => {
                let n = self.dclamp_par[0];
                let off = self.dclamp_par[1];
                let dn = d.powf(n);
                dn / (off.powf(n) + dn)
            }
        }
    }
}
