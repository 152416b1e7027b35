//! Per-pixel difference heatmap assembly.
//!
//! When enabled, the per-band visual differences are re-projected through
//! a plain Laplacian pyramid back to full resolution, giving a map of
//! where the distortion is predicted to be visible. Rendering the map to
//! an image or video is left to the caller; the core exports plain
//! `ImgVec<f32>` frames in JOD-difference units.

use imgref::ImgVec;

use crate::image::{ImageF, PlaneGroup};
use crate::params::CvvdpParameters;
use crate::pyramid::LaplacianPyramid;
use crate::CvvdpError;

/// Heatmap output styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeatmapMode {
    /// Raw per-pixel JOD-difference values, unclamped.
    Raw,
}

impl HeatmapMode {
    pub fn from_name(name: &str) -> Result<Self, CvvdpError> {
        match name {
            "raw" => Ok(Self::Raw),
            other => Err(CvvdpError::UnknownHeatmap {
                value: other.to_string(),
            }),
        }
    }
}

/// Accumulates channel-weighted band differences and reconstructs one
/// heatmap frame at a time.
pub struct HeatmapBuilder {
    geometry: LaplacianPyramid,
    bands: Vec<ImageF>,
    frames: Vec<ImgVec<f32>>,
}

impl HeatmapBuilder {
    #[must_use]
    pub fn new(geometry: &LaplacianPyramid) -> Self {
        let bands = (0..geometry.band_count())
            .map(|bb| {
                let (w, h) = geometry.band_dims(bb);
                ImageF::new(w, h)
            })
            .collect();
        Self {
            geometry: geometry.clone(),
            bands,
            frames: Vec::new(),
        }
    }

    /// Clears the per-band accumulators for the next frame.
    pub fn begin_frame(&mut self) {
        for band in &mut self.bands {
            band.fill(0.0);
        }
    }

    /// Adds one channel's difference plane into a band with its channel
    /// weight.
    pub fn accumulate(&mut self, band: usize, weight: f32, diff: &ImageF) {
        let acc = &mut self.bands[band];
        for y in 0..acc.height() {
            let src = diff.row(y);
            let dst = acc.row_mut(y);
            for x in 0..dst.len() {
                dst[x] += weight * src[x];
            }
        }
    }

    /// Reconstructs the accumulated bands and stores the frame, mapped
    /// into JOD-difference units via `|jod_a| * d^jod_exp`.
    pub fn end_frame(&mut self, params: &CvvdpParameters) {
        let groups: Vec<PlaneGroup> = self
            .bands
            .iter()
            .map(|b| PlaneGroup::from_planes(vec![b.clone()], 1, 1))
            .collect();
        let recon = self.geometry.reconstruct(&groups);
        let plane = recon.plane(0, 0);

        let jod_a = params.jod_a.abs();
        let jod_exp = params.jod_exp;
        let w = plane.width();
        let h = plane.height();
        let mut buf = Vec::with_capacity(w * h);
        for y in 0..h {
            for &v in plane.row(y) {
                buf.push(jod_a * v.max(0.0).powf(jod_exp));
            }
        }
        self.frames.push(ImgVec::new(buf, w, h));
    }

    #[must_use]
    pub fn into_frames(self) -> Vec<ImgVec<f32>> {
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_difference_gives_zero_map() {
        let geom = LaplacianPyramid::new(32, 32, 60.0);
        let mut hm = HeatmapBuilder::new(&geom);
        hm.begin_frame();
        hm.end_frame(&CvvdpParameters::default());
        let frames = hm.into_frames();
        assert_eq!(frames.len(), 1);
        for row in frames[0].rows() {
            for &v in row {
                assert!(v.abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_accumulated_difference_appears_in_map() {
        let geom = LaplacianPyramid::new(32, 32, 60.0);
        let mut hm = HeatmapBuilder::new(&geom);
        hm.begin_frame();
        let (w, h) = geom.band_dims(0);
        hm.accumulate(0, 1.0, &ImageF::filled(w, h, 0.5));
        hm.end_frame(&CvvdpParameters::default());
        let frames = hm.into_frames();
        let total: f32 = frames[0].rows().flat_map(|r| r.iter()).sum();
        assert!(total > 0.0);
    }

    #[test]
    fn test_unknown_mode_rejected() {
        assert!(HeatmapMode::from_name("raw").is_ok());
        assert!(HeatmapMode::from_name("rainbow").is_err());
    }
}
