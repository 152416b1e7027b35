//! A perceptual video and image quality metric.
//!
//! Estimates the perceived difference between a test and a reference
//! signal on the JOD scale, where 10 means no visible difference and lower
//! values mean increasingly objectionable distortion. The model accounts
//! for contrast sensitivity over spatial frequency, luminance and temporal
//! frequency, visual masking, and pooling of local errors into a single
//! judgment.
//!
//! The pipeline: frames arrive from a [`VideoSource`](source::VideoSource)
//! in an opponent color representation with absolute luminance, pass
//! through a temporal filter bank splitting sustained and transient
//! responses, are decomposed by a multiresolution contrast pyramid,
//! weighted by the CSF, run through the masking model, and pooled with
//! nested p-norms into the final score.
//!
//! ```no_run
//! use cvvdp::{Cvvdp, CvvdpParameters, StandardDisplay};
//! use cvvdp::source::ArrayVideoSource;
//! use cvvdp::image::ImageF;
//!
//! # fn main() -> Result<(), cvvdp::CvvdpError> {
//! let display = Box::new(StandardDisplay::standard_4k());
//! let mut metric = Cvvdp::new(CvvdpParameters::default(), display)?;
//!
//! let test = ArrayVideoSource::frame_from_luma(ImageF::filled(640, 480, 90.0));
//! let reference = ArrayVideoSource::frame_from_luma(ImageF::filled(640, 480, 100.0));
//! let source = ArrayVideoSource::from_images(test, reference)?;
//!
//! let (jod, _stats) = metric.predict_source(&source)?;
//! println!("quality: {jod:.3} JOD");
//! # Ok(())
//! # }
//! ```

pub mod block;
pub mod blur;
pub mod csf;
pub mod display;
pub mod heatmap;
pub mod image;
pub mod masking;
pub mod metric;
pub mod norm;
pub mod params;
pub mod pyramid;
pub mod source;
pub mod temporal;

pub use crate::csf::{CastleCsf, ContrastSensitivity};
pub use crate::display::{DisplayModel, StandardDisplay};
pub use crate::heatmap::HeatmapMode;
pub use crate::metric::{Cvvdp, CvvdpStats};
pub use crate::params::{CalibrationOverride, CvvdpParameters};

/// Errors produced by the metric.
///
/// Configuration errors (unknown enum-valued strings) are raised at the
/// point the value is resolved and always name the offending value;
/// nothing is silently downgraded to a default.
#[derive(Debug, Clone, PartialEq)]
pub enum CvvdpError {
    /// Test and reference disagree in size or frame count, or the input
    /// is empty.
    DimensionMismatch { message: String },
    /// Unrecognized contrast definition.
    UnknownContrast { value: String },
    /// Unrecognized masking model.
    UnknownMaskingModel { value: String },
    /// Unrecognized difference clamp type.
    UnknownClampType { value: String },
    /// Unrecognized local adaptation mode.
    UnknownLocalAdapt { value: String },
    /// Unrecognized temporal padding policy.
    UnknownPadding { value: String },
    /// A known padding policy that is not implemented.
    UnsupportedPadding { value: String },
    /// Unrecognized heatmap mode.
    UnknownHeatmap { value: String },
    /// The source cannot provide frames in the requested color
    /// representation.
    UnsupportedColorspace { value: String },
    /// The parameter or calibration file failed to parse.
    ParameterLoad { message: String },
    /// Not even a single frame fits the memory budget.
    OutOfMemory { needed: usize, budget: usize },
    /// A multi-frame source reported a non-positive frame rate.
    InvalidFrameRate { fps: f32 },
}

impl std::fmt::Display for CvvdpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DimensionMismatch { message } => {
                write!(f, "dimension mismatch: {message}")
            }
            Self::UnknownContrast { value } => {
                write!(f, "unknown contrast definition \"{value}\"")
            }
            Self::UnknownMaskingModel { value } => {
                write!(f, "unknown masking model \"{value}\"")
            }
            Self::UnknownClampType { value } => {
                write!(f, "unknown difference clamp type \"{value}\"")
            }
            Self::UnknownLocalAdapt { value } => {
                write!(f, "unknown local adaptation mode \"{value}\"")
            }
            Self::UnknownPadding { value } => {
                write!(f, "unknown temporal padding policy \"{value}\"")
            }
            Self::UnsupportedPadding { value } => {
                write!(f, "temporal padding policy \"{value}\" is not implemented")
            }
            Self::UnknownHeatmap { value } => {
                write!(f, "unknown heatmap mode \"{value}\"")
            }
            Self::UnsupportedColorspace { value } => {
                write!(f, "source cannot provide frames in {value}")
            }
            Self::ParameterLoad { message } => {
                write!(f, "failed to load parameters: {message}")
            }
            Self::OutOfMemory { needed, budget } => {
                write!(
                    f,
                    "a single frame needs {needed} bytes but the budget is {budget} bytes"
                )
            }
            Self::InvalidFrameRate { fps } => {
                write!(f, "video input requires a positive frame rate, got {fps}")
            }
        }
    }
}

impl std::error::Error for CvvdpError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_value() {
        let err = CvvdpError::UnknownContrast {
            value: "weber_g9".to_string(),
        };
        assert!(err.to_string().contains("weber_g9"));
        let err = CvvdpError::UnsupportedPadding {
            value: "pingpong".to_string(),
        };
        assert!(err.to_string().contains("pingpong"));
    }

    #[test]
    fn test_error_is_std_error() {
        fn takes_error(_: &dyn std::error::Error) {}
        takes_error(&CvvdpError::InvalidFrameRate { fps: 0.0 });
    }
}
