//! Metric parameters.
//!
//! All tunable constants of the model live in one bundle, loaded once at
//! construction and treated as immutable for the duration of a prediction.
//! The JSON schema matches the upstream `cvvdp_parameters.json` layout, so a
//! calibrated bundle can be dropped in. Unknown keys are load errors, never
//! silently ignored.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::CvvdpError;

/// Model parameter set.
///
/// String-valued fields (`contrast`, `masking_model`, `local_adapt`,
/// `dclamp_type`) are resolved into closed enums when the metric is
/// constructed; an unrecognized value is a fatal configuration error at that
/// point. The numeric defaults shipped here are uncalibrated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CvvdpParameters {
    /// Parameter-set version tag.
    pub version: String,
    /// Exponent applied to the excitation in the masking function.
    pub mask_p: f32,
    /// Content masking adjustment, log10 units.
    pub mask_c: f32,
    /// Gaussian sigma (in pixels) of the phase-uncertainty blur; 0 disables
    /// the blur.
    pub pu_dilate: f32,
    /// Spatial pooling exponent (p-norm over pixels).
    pub beta: f32,
    /// Temporal pooling exponent (p-norm over frames).
    pub beta_t: f32,
    /// Pooling exponent over temporal/chromatic channels.
    pub beta_tch: f32,
    /// Pooling exponent over spatial bands.
    pub beta_sch: f32,
    /// Stimulus-extent parameter forwarded to the CSF.
    pub csf_sigma: f32,
    /// Global CSF correction in dB; negative desensitizes the metric.
    pub sensitivity_correction: f32,
    /// Masking model name; `"mutual_masking"` is the supported model.
    pub masking_model: String,
    /// Local adaptation mode; `"simple_ref"` is the supported mode.
    pub local_adapt: String,
    /// Contrast definition: `weber_g0_ref`, `weber_g1_ref`, `weber_g1`, `log`.
    pub contrast: String,
    /// JOD regression scale.
    pub jod_a: f32,
    /// JOD regression exponent.
    pub jod_exp: f32,
    /// Masking exponent for the sustained channels.
    pub mask_q_sust: f32,
    /// Masking exponent for the transient channel.
    pub mask_q_trans: f32,
    /// Temporal filter length; -1 derives it from the frame rate.
    pub filter_len: i32,
    /// Per-channel weights: Y-sustained, rg, yv, Y-transient.
    pub ch_weights: Vec<f32>,
    /// Temporal filter scale per channel (frequency-response denominator).
    pub sigma_tf: [f32; 4],
    /// Temporal filter stretched-exponential exponent per channel.
    pub beta_tf: [f32; 4],
    /// Weight of the baseband in spatial-band pooling.
    pub baseband_weight: f32,
    /// Difference clamping: `"hard"` or `"soft"`.
    pub dclamp_type: String,
    /// Clamp parameters: `[exponent]` for hard (ceiling `10^par`),
    /// `[n, offset]` for soft.
    pub dclamp_par: Vec<f32>,
}

impl Default for CvvdpParameters {
    fn default() -> Self {
        Self {
            version: "0.1".to_string(),
            mask_p: 2.2,
            mask_c: -0.5,
            pu_dilate: 0.0,
            beta: 3.5,
            beta_t: 1.0,
            beta_tch: 2.0,
            beta_sch: 4.0,
            csf_sigma: -1.0,
            sensitivity_correction: 0.0,
            masking_model: "mutual_masking".to_string(),
            local_adapt: "simple_ref".to_string(),
            contrast: "weber_g1_ref".to_string(),
            jod_a: 0.23,
            jod_exp: 0.68,
            mask_q_sust: 3.2,
            mask_q_trans: 3.2,
            filter_len: -1,
            ch_weights: vec![1.0, 0.30, 0.15, 0.40],
            sigma_tf: [3.0, 1.5, 1.5, 40.0],
            beta_tf: [1.2, 0.85, 0.85, 2.0],
            baseband_weight: 0.2,
            dclamp_type: "soft".to_string(),
            dclamp_par: vec![1.7, 0.3],
        }
    }
}

impl CvvdpParameters {
    /// Parses a parameter bundle from a JSON string.
    ///
    /// # Errors
    /// Returns [`CvvdpError::ParameterLoad`] if the JSON is malformed,
    /// contains unknown keys, or is missing fields.
    pub fn from_json(json: &str) -> Result<Self, CvvdpError> {
        serde_json::from_str(json).map_err(|e| CvvdpError::ParameterLoad {
            message: e.to_string(),
        })
    }

    /// Loads a parameter bundle from a JSON file.
    ///
    /// # Errors
    /// Returns [`CvvdpError::ParameterLoad`] on I/O or schema errors.
    pub fn from_json_file(path: &Path) -> Result<Self, CvvdpError> {
        let json = fs::read_to_string(path).map_err(|e| CvvdpError::ParameterLoad {
            message: format!("{}: {e}", path.display()),
        })?;
        log::debug!("loading metric parameters from {}", path.display());
        Self::from_json(&json)
    }

    /// Applies a calibration override on top of this bundle.
    pub fn apply_override(&mut self, ovr: &CalibrationOverride) {
        macro_rules! take {
            ($field:ident) => {
                if let Some(v) = &ovr.$field {
                    self.$field = v.clone();
                }
            };
        }
        take!(mask_p);
        take!(mask_c);
        take!(pu_dilate);
        take!(beta);
        take!(beta_t);
        take!(beta_tch);
        take!(beta_sch);
        take!(csf_sigma);
        take!(sensitivity_correction);
        take!(jod_a);
        take!(jod_exp);
        take!(mask_q_sust);
        take!(mask_q_trans);
        take!(ch_weights);
        take!(sigma_tf);
        take!(beta_tf);
        take!(baseband_weight);
        take!(dclamp_par);
    }
}

/// Calibrated overrides for the numeric model parameters.
///
/// This replaces the upstream practice of copying arbitrary named tensors
/// out of a training checkpoint: every overridable field is named and typed
/// here, and unknown keys in the file are fatal load errors. Structural
/// fields (contrast mode, masking model, clamp type) are deliberately not
/// overridable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CalibrationOverride {
    pub mask_p: Option<f32>,
    pub mask_c: Option<f32>,
    pub pu_dilate: Option<f32>,
    pub beta: Option<f32>,
    pub beta_t: Option<f32>,
    pub beta_tch: Option<f32>,
    pub beta_sch: Option<f32>,
    pub csf_sigma: Option<f32>,
    pub sensitivity_correction: Option<f32>,
    pub jod_a: Option<f32>,
    pub jod_exp: Option<f32>,
    pub mask_q_sust: Option<f32>,
    pub mask_q_trans: Option<f32>,
    pub ch_weights: Option<Vec<f32>>,
    pub sigma_tf: Option<[f32; 4]>,
    pub beta_tf: Option<[f32; 4]>,
    pub baseband_weight: Option<f32>,
    pub dclamp_par: Option<Vec<f32>>,
}

impl CalibrationOverride {
    /// Parses a calibration override from a JSON string.
    ///
    /// # Errors
    /// Returns [`CvvdpError::ParameterLoad`] on malformed JSON or unknown keys.
    pub fn from_json(json: &str) -> Result<Self, CvvdpError> {
        serde_json::from_str(json).map_err(|e| CvvdpError::ParameterLoad {
            message: e.to_string(),
        })
    }

    /// Loads a calibration override from a JSON file.
    ///
    /// # Errors
    /// Returns [`CvvdpError::ParameterLoad`] on I/O or schema errors.
    pub fn from_json_file(path: &Path) -> Result<Self, CvvdpError> {
        let json = fs::read_to_string(path).map_err(|e| CvvdpError::ParameterLoad {
            message: format!("{}: {e}", path.display()),
        })?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_roundtrips_through_json() {
        let params = CvvdpParameters::default();
        let json = serde_json::to_string(&params).unwrap();
        let back = CvvdpParameters::from_json(&json).unwrap();
        assert_eq!(back.contrast, params.contrast);
        assert_eq!(back.ch_weights, params.ch_weights);
        assert!((back.mask_p - params.mask_p).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let params = CvvdpParameters::default();
        let mut value = serde_json::to_value(&params).unwrap();
        value["not_a_parameter"] = serde_json::json!(1.0);
        let json = serde_json::to_string(&value).unwrap();
        let err = CvvdpParameters::from_json(&json).unwrap_err();
        assert!(err.to_string().contains("not_a_parameter"), "{err}");
    }

    #[test]
    fn test_override_applies_named_fields_only() {
        let mut params = CvvdpParameters::default();
        let ovr = CalibrationOverride::from_json(r#"{"jod_a": 0.5, "mask_p": 2.0}"#).unwrap();
        params.apply_override(&ovr);
        assert!((params.jod_a - 0.5).abs() < 1e-9);
        assert!((params.mask_p - 2.0).abs() < 1e-9);
        // Untouched fields keep their defaults.
        assert!((params.beta - 3.5).abs() < 1e-9);
    }

    #[test]
    fn test_override_unknown_key_rejected() {
        let err = CalibrationOverride::from_json(r#"{"contrast": "log"}"#).unwrap_err();
        assert!(err.to_string().contains("contrast"), "{err}");
    }

    #[test]
    fn test_pooling_exponents_differ() {
        // Band and channel pooling use different exponents; with equal
        // exponents the two unnormalized norms would commute and the
        // pooling-order guarantee would be vacuous.
        let params = CvvdpParameters::default();
        assert!((params.beta_sch - params.beta_tch).abs() > 0.1);
    }
}
