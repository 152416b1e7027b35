//! Video source abstraction.
//!
//! Decoding and color conversion live outside the core. A source hands the
//! metric frames already converted into the internal opponent color
//! representation with absolute luminance, so the pipeline never touches
//! encoded pixels.

use crate::image::ImageF;
use crate::CvvdpError;

/// Color representations a source can be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricColorspace {
    /// DKL opponent space adapted to D65, channel 0 in absolute cd/m².
    DklD65,
    /// Log10 of LMS cone responses, for the log-contrast pipeline.
    LogLms2006,
}

impl MetricColorspace {
    pub(crate) fn label(self) -> &'static str {
        match self {
            Self::DklD65 => "DKL-D65",
            Self::LogLms2006 => "log-LMS-2006",
        }
    }
}

/// One frame: three planes in the requested color representation.
pub type ColorFrame = [ImageF; 3];

/// Supplier of aligned test and reference frames.
///
/// The two signals must share dimensions and frame count; the metric
/// checks this once before processing starts.
pub trait VideoSource {
    /// (height, width, frame_count).
    fn video_size(&self) -> (usize, usize, usize);

    /// Frame rate; meaningful only when `frame_count > 1`.
    fn frames_per_second(&self) -> f32;

    fn test_frame(&self, index: usize, colorspace: MetricColorspace)
        -> Result<ColorFrame, CvvdpError>;

    fn reference_frame(
        &self,
        index: usize,
        colorspace: MetricColorspace,
    ) -> Result<ColorFrame, CvvdpError>;
}

/// In-memory source over pre-converted DKL-D65 frames.
///
/// Only [`MetricColorspace::DklD65`] is served; a log-contrast pipeline
/// needs a source that can produce log-LMS itself, and asking this one for
/// it is an error rather than a silent conversion.
#[derive(Debug)]
pub struct ArrayVideoSource {
    test: Vec<ColorFrame>,
    reference: Vec<ColorFrame>,
    fps: f32,
}

impl ArrayVideoSource {
    /// Wraps two equally sized frame stacks.
    ///
    /// # Errors
    /// Returns [`CvvdpError::DimensionMismatch`] when the stacks disagree
    /// in frame count or any plane's dimensions.
    pub fn new(
        test: Vec<ColorFrame>,
        reference: Vec<ColorFrame>,
        fps: f32,
    ) -> Result<Self, CvvdpError> {
        if test.is_empty() || test.len() != reference.len() {
            return Err(CvvdpError::DimensionMismatch {
                message: format!(
                    "test has {} frames, reference has {}",
                    test.len(),
                    reference.len()
                ),
            });
        }
        let w = test[0][0].width();
        let h = test[0][0].height();
        for (label, stack) in [("test", &test), ("reference", &reference)] {
            for (ff, frame) in stack.iter().enumerate() {
                for plane in frame {
                    if plane.width() != w || plane.height() != h {
                        return Err(CvvdpError::DimensionMismatch {
                            message: format!(
                                "{label} frame {ff} is {}x{}, expected {w}x{h}",
                                plane.width(),
                                plane.height()
                            ),
                        });
                    }
                }
            }
        }
        Ok(Self {
            test,
            reference,
            fps,
        })
    }

    /// Single-image convenience: one test and one reference frame.
    pub fn from_images(test: ColorFrame, reference: ColorFrame) -> Result<Self, CvvdpError> {
        Self::new(vec![test], vec![reference], 0.0)
    }

    /// Builds a frame from a luminance plane with neutral chroma.
    #[must_use]
    pub fn frame_from_luma(luma: ImageF) -> ColorFrame {
        let zero = ImageF::new(luma.width(), luma.height());
        [luma, zero.clone(), zero]
    }

    fn frame(
        stack: &[ColorFrame],
        index: usize,
        colorspace: MetricColorspace,
    ) -> Result<ColorFrame, CvvdpError> {
        if colorspace != MetricColorspace::DklD65 {
            return Err(CvvdpError::UnsupportedColorspace {
                value: colorspace.label().to_string(),
            });
        }
        Ok(stack[index].clone())
    }
}

impl VideoSource for ArrayVideoSource {
    fn video_size(&self) -> (usize, usize, usize) {
        let plane = &self.test[0][0];
        (plane.height(), plane.width(), self.test.len())
    }

    fn frames_per_second(&self) -> f32 {
        self.fps
    }

    fn test_frame(
        &self,
        index: usize,
        colorspace: MetricColorspace,
    ) -> Result<ColorFrame, CvvdpError> {
        Self::frame(&self.test, index, colorspace)
    }

    fn reference_frame(
        &self,
        index: usize,
        colorspace: MetricColorspace,
    ) -> Result<ColorFrame, CvvdpError> {
        Self::frame(&self.reference, index, colorspace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_frame(w: usize, h: usize, l: f32) -> ColorFrame {
        ArrayVideoSource::frame_from_luma(ImageF::filled(w, h, l))
    }

    #[test]
    fn test_matching_stacks_accepted() {
        let src = ArrayVideoSource::new(
            vec![gray_frame(8, 8, 100.0); 3],
            vec![gray_frame(8, 8, 100.0); 3],
            30.0,
        )
        .unwrap();
        assert_eq!(src.video_size(), (8, 8, 3));
        assert!((src.frames_per_second() - 30.0).abs() < 1e-6);
    }

    #[test]
    fn test_frame_count_mismatch_rejected() {
        let err = ArrayVideoSource::new(
            vec![gray_frame(8, 8, 100.0); 2],
            vec![gray_frame(8, 8, 100.0); 3],
            30.0,
        )
        .unwrap_err();
        assert!(err.to_string().contains("frames"));
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let err = ArrayVideoSource::new(
            vec![gray_frame(8, 8, 100.0)],
            vec![gray_frame(8, 10, 100.0)],
            0.0,
        )
        .unwrap_err();
        assert!(matches!(err, CvvdpError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_log_lms_unsupported() {
        let src =
            ArrayVideoSource::from_images(gray_frame(4, 4, 50.0), gray_frame(4, 4, 50.0)).unwrap();
        let err = src.test_frame(0, MetricColorspace::LogLms2006).unwrap_err();
        assert!(matches!(err, CvvdpError::UnsupportedColorspace { .. }));
    }
}
