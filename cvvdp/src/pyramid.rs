//! Multiresolution contrast decomposition.
//!
//! A Laplacian pyramid splits each plane into spatial-frequency bands whose
//! resolution halves per band, down to a low-pass baseband. The contrast
//! variants wrap the plain pyramid and normalize each band by a local
//! background-luminance estimate of matching resolution, which also feeds
//! the CSF. Pyramid geometry depends only on (width, height, ppd); the
//! metric caches the pyramid and rebuilds it only when one of those changes.

use crate::blur::{separable_filter, BINOMIAL5};
use crate::image::{ImageF, PlaneGroup};
use crate::CvvdpError;

/// Spatial frequency assigned to the baseband, cycles/degree.
pub const BASEBAND_FREQ: f32 = 0.1;

/// Bands below this frequency are not worth resolving.
const MIN_FREQ: f32 = 0.2;

/// Background luminance floor, cd/m².
const BKG_FLOOR: f32 = 0.01;

/// Contrast definition used by the pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContrastMode {
    /// Weber contrast against the same level's Gaussian of the reference.
    WeberG0Ref,
    /// Weber contrast against the next level's Gaussian of the reference.
    WeberG1Ref,
    /// Weber contrast against each signal's own background.
    WeberG1,
    /// Difference of log10 luminances.
    Log,
}

impl ContrastMode {
    /// Resolves a configuration string into a contrast mode.
    ///
    /// # Errors
    /// Returns [`CvvdpError::UnknownContrast`] for unrecognized names.
    pub fn from_name(name: &str) -> Result<Self, CvvdpError> {
        match name {
            "weber_g0_ref" => Ok(Self::WeberG0Ref),
            "weber_g1_ref" => Ok(Self::WeberG1Ref),
            "weber_g1" => Ok(Self::WeberG1),
            "log" => Ok(Self::Log),
            other => Err(CvvdpError::UnknownContrast {
                value: other.to_string(),
            }),
        }
    }

    /// Whether input planes are log10 luminance rather than linear.
    #[must_use]
    pub fn is_log(self) -> bool {
        self == Self::Log
    }
}

/// Converts Weber contrast `W = (B-A)/A` to log contrast `log10(B/A)`.
#[must_use]
pub fn weber_to_log(w: f32) -> f32 {
    (1.0 + w).log10()
}

/// Plain Laplacian pyramid over a fixed (width, height, ppd) geometry.
///
/// Used directly by the heatmap path and as the base of [`ContrastPyramid`].
#[derive(Debug, Clone)]
pub struct LaplacianPyramid {
    width: usize,
    height: usize,
    ppd: f32,
    band_dims: Vec<(usize, usize)>, // (width, height) per band
}

impl LaplacianPyramid {
    /// Builds the pyramid geometry for a frame size and angular resolution.
    ///
    /// The band count stops either at `floor(log2(min(W,H))) - 1` levels or
    /// once a band's frequency would fall below the visibility floor,
    /// whichever comes first; there is always at least a baseband.
    #[must_use]
    pub fn new(width: usize, height: usize, ppd: f32) -> Self {
        let min_dim = width.min(height).max(1);
        let max_levels = ((min_dim as f32).log2().floor() as usize).saturating_sub(1).max(1);

        let mut bands = 1;
        while bands < max_levels && 0.5 * ppd * 0.5f32.powi(bands as i32) > MIN_FREQ {
            bands += 1;
        }

        let mut band_dims = Vec::with_capacity(bands);
        let (mut w, mut h) = (width, height);
        for _ in 0..bands {
            band_dims.push((w, h));
            w = w.div_ceil(2);
            h = h.div_ceil(2);
        }

        Self {
            width,
            height,
            ppd,
            band_dims,
        }
    }

    /// Full-resolution frame width.
    #[inline]
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Full-resolution frame height.
    #[inline]
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Pixels per degree the geometry was built for.
    #[inline]
    #[must_use]
    pub fn ppd(&self) -> f32 {
        self.ppd
    }

    /// Number of bands including the baseband.
    #[inline]
    #[must_use]
    pub fn band_count(&self) -> usize {
        self.band_dims.len()
    }

    /// (width, height) of one band.
    #[inline]
    #[must_use]
    pub fn band_dims(&self, band: usize) -> (usize, usize) {
        self.band_dims[band]
    }

    /// Spatial frequency per band in cycles/degree.
    ///
    /// Band k sits at `0.5 * ppd * 2^-k`; the baseband is reported as the
    /// nominal [`BASEBAND_FREQ`] constant.
    #[must_use]
    pub fn band_freqs(&self) -> Vec<f32> {
        let nb = self.band_count();
        let mut freqs: Vec<f32> = (0..nb)
            .map(|k| 0.5 * self.ppd * 0.5f32.powi(k as i32))
            .collect();
        freqs[nb - 1] = BASEBAND_FREQ;
        freqs
    }

    /// Gaussian pyramid of one plane: level 0 is the input, each further
    /// level is binomial-blurred and decimated by 2.
    #[must_use]
    pub fn gaussian_levels(&self, plane: &ImageF) -> Vec<ImageF> {
        let nb = self.band_count();
        let mut levels = Vec::with_capacity(nb);
        levels.push(plane.clone());
        for k in 1..nb {
            let blurred = separable_filter(&levels[k - 1], &BINOMIAL5);
            levels.push(decimate2(&blurred));
        }
        levels
    }

    /// Laplacian bands of one plane. Band k is the difference between
    /// Gaussian level k and the upsampled level k+1; the last band is the
    /// lowest Gaussian level itself.
    #[must_use]
    pub fn laplacian_bands(&self, levels: &[ImageF]) -> Vec<ImageF> {
        let nb = self.band_count();
        let mut bands = Vec::with_capacity(nb);
        for k in 0..nb - 1 {
            let (w, h) = self.band_dims[k];
            let up = upsample2(&levels[k + 1], w, h);
            bands.push(levels[k].zip_map(&up, |a, b| a - b));
        }
        bands.push(levels[nb - 1].clone());
        bands
    }

    /// Decomposes every plane of a group into Laplacian bands.
    ///
    /// The channel/frame layout (including test/reference interleaving) is
    /// preserved within every returned band.
    #[must_use]
    pub fn decompose(&self, input: &PlaneGroup) -> Vec<PlaneGroup> {
        let nb = self.band_count();
        let channels = input.channels();
        let frames = input.frames();

        let mut per_band: Vec<Vec<ImageF>> = (0..nb).map(|_| Vec::new()).collect();
        for cc in 0..channels {
            for ff in 0..frames {
                let levels = self.gaussian_levels(input.plane(cc, ff));
                for (bb, band) in self.laplacian_bands(&levels).into_iter().enumerate() {
                    per_band[bb].push(band);
                }
            }
        }

        per_band
            .into_iter()
            .map(|planes| PlaneGroup::from_planes(planes, channels, frames))
            .collect()
    }

    /// Inverts [`decompose`](Self::decompose) exactly (up to float rounding).
    ///
    /// # Panics
    /// Panics if the band set does not match this pyramid's geometry.
    #[must_use]
    pub fn reconstruct(&self, bands: &[PlaneGroup]) -> PlaneGroup {
        let nb = self.band_count();
        assert_eq!(bands.len(), nb);
        let channels = bands[0].channels();
        let frames = bands[0].frames();

        let mut planes = Vec::with_capacity(channels * frames);
        for cc in 0..channels {
            for ff in 0..frames {
                let mut acc = bands[nb - 1].plane(cc, ff).clone();
                for k in (0..nb - 1).rev() {
                    let (w, h) = self.band_dims[k];
                    let up = upsample2(&acc, w, h);
                    acc = up.zip_map(bands[k].plane(cc, ff), |a, b| a + b);
                }
                planes.push(acc);
            }
        }
        PlaneGroup::from_planes(planes, channels, frames)
    }
}

/// Contrast decomposition of one block tensor.
pub struct ContrastDecomposition {
    /// Contrast bands, channel layout identical to the input group.
    pub bands: Vec<PlaneGroup>,
    /// Background luminance per band: channel 0 = test, channel 1 =
    /// reference, in linear cd/m² clamped to the background floor.
    pub backgrounds: Vec<PlaneGroup>,
}

/// A Laplacian pyramid with a pluggable contrast definition.
#[derive(Debug, Clone)]
pub struct ContrastPyramid {
    lpyr: LaplacianPyramid,
    mode: ContrastMode,
}

impl ContrastPyramid {
    #[must_use]
    pub fn new(width: usize, height: usize, ppd: f32, mode: ContrastMode) -> Self {
        Self {
            lpyr: LaplacianPyramid::new(width, height, ppd),
            mode,
        }
    }

    /// The underlying geometry.
    #[inline]
    #[must_use]
    pub fn geometry(&self) -> &LaplacianPyramid {
        &self.lpyr
    }

    #[inline]
    #[must_use]
    pub fn mode(&self) -> ContrastMode {
        self.mode
    }

    #[inline]
    #[must_use]
    pub fn band_count(&self) -> usize {
        self.lpyr.band_count()
    }

    #[must_use]
    pub fn band_freqs(&self) -> Vec<f32> {
        self.lpyr.band_freqs()
    }

    /// Decomposes an interleaved test/reference block tensor into contrast
    /// bands plus the matching background-luminance pyramid.
    ///
    /// Channels 0 and 1 of the input must be the test and reference
    /// sustained-luminance planes; they define the backgrounds for every
    /// channel. For the Weber variants each band is divided by a
    /// background: the `_ref` variants use the reference background for
    /// both signals (simple_ref local adaptation), `weber_g1` uses each
    /// signal's own background except at the baseband, which always uses
    /// the shared reference background (a signal's own baseband background
    /// is the baseband itself). In log mode bands are kept as log-luminance
    /// differences and only the backgrounds are linearized.
    #[must_use]
    pub fn decompose(&self, input: &PlaneGroup) -> ContrastDecomposition {
        let nb = self.band_count();
        let frames = input.frames();
        let channels = input.channels();

        let mut bands = self.lpyr.decompose(input);

        // Background pyramids from the sustained-luminance channel pair.
        let mut backgrounds: Vec<Vec<ImageF>> = (0..nb).map(|_| Vec::new()).collect();
        for sig in 0..2 {
            for ff in 0..frames {
                let levels = self.lpyr.gaussian_levels(input.plane(sig, ff));
                for bb in 0..nb {
                    backgrounds[bb].push(self.background_plane(&levels, bb));
                }
            }
        }
        let backgrounds: Vec<PlaneGroup> = backgrounds
            .into_iter()
            .map(|planes| PlaneGroup::from_planes(planes, 2, frames))
            .collect();

        if !self.mode.is_log() {
            for bb in 0..nb {
                let is_baseband = bb == nb - 1;
                for cc in 0..channels {
                    // Even channels are test, odd are reference.
                    let own_sig = cc % 2;
                    let sig = match self.mode {
                        ContrastMode::WeberG1 if !is_baseband => own_sig,
                        _ => 1,
                    };
                    for ff in 0..frames {
                        let bkg = backgrounds[bb].plane(sig, ff).clone();
                        let band = bands[bb].plane_mut(cc, ff);
                        for y in 0..band.height() {
                            let bkg_row = bkg.row(y);
                            let row = band.row_mut(y);
                            for x in 0..row.len() {
                                row[x] /= bkg_row[x];
                            }
                        }
                    }
                }
            }
        }

        ContrastDecomposition { bands, backgrounds }
    }

    /// Background estimate for one band from a signal's Gaussian levels.
    fn background_plane(&self, levels: &[ImageF], band: usize) -> ImageF {
        let nb = self.band_count();
        let is_baseband = band == nb - 1;
        let mut bkg = if is_baseband {
            levels[nb - 1].clone()
        } else {
            match self.mode {
                ContrastMode::WeberG0Ref => levels[band].clone(),
                _ => {
                    let (w, h) = self.lpyr.band_dims(band);
                    upsample2(&levels[band + 1], w, h)
                }
            }
        };
        if self.mode.is_log() {
            // Input planes are log10 luminance; the CSF wants linear.
            bkg.map_inplace(|v| 10.0f32.powf(v).max(BKG_FLOOR));
        } else {
            bkg.map_inplace(|v| v.max(BKG_FLOOR));
        }
        bkg
    }
}

/// Takes every other pixel, keeping `ceil(n/2)` in each dimension.
fn decimate2(input: &ImageF) -> ImageF {
    let out_w = input.width().div_ceil(2);
    let out_h = input.height().div_ceil(2);
    let mut out = ImageF::new(out_w, out_h);
    for y in 0..out_h {
        let src = input.row(y * 2);
        let dst = out.row_mut(y);
        for x in 0..out_w {
            dst[x] = src[x * 2];
        }
    }
    out
}

/// Bilinear 2x upsampling to an exact target size.
fn upsample2(input: &ImageF, target_w: usize, target_h: usize) -> ImageF {
    let src_w = input.width();
    let src_h = input.height();
    let mut out = ImageF::new(target_w, target_h);
    for y in 0..target_h {
        let sy = y as f32 / 2.0;
        let y0 = (sy.floor() as usize).min(src_h - 1);
        let y1 = (y0 + 1).min(src_h - 1);
        let fy = sy - y0 as f32;
        let row0 = input.row(y0);
        let row1 = input.row(y1);
        let dst = out.row_mut(y);
        for x in 0..target_w {
            let sx = x as f32 / 2.0;
            let x0 = (sx.floor() as usize).min(src_w - 1);
            let x1 = (x0 + 1).min(src_w - 1);
            let fx = sx - x0 as f32;
            let top = row0[x0] * (1.0 - fx) + row0[x1] * fx;
            let bot = row1[x0] * (1.0 - fx) + row1[x1] * fx;
            dst[x] = top * (1.0 - fy) + bot * fy;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_plane(width: usize, height: usize) -> ImageF {
        let mut img = ImageF::new(width, height);
        for y in 0..height {
            for x in 0..width {
                let v = 50.0
                    + 30.0 * ((x as f32) * 0.37).sin()
                    + 20.0 * ((y as f32) * 0.21).cos()
                    + 5.0 * ((x * y) % 7) as f32;
                img.set(x, y, v);
            }
        }
        img
    }

    #[test]
    fn test_band_count_depends_on_size() {
        let small = LaplacianPyramid::new(16, 16, 60.0);
        let large = LaplacianPyramid::new(512, 512, 60.0);
        assert!(large.band_count() > small.band_count());
        assert!(small.band_count() >= 1);
    }

    #[test]
    fn test_band_freqs_halve_and_baseband_is_nominal() {
        let pyr = LaplacianPyramid::new(256, 256, 60.0);
        let freqs = pyr.band_freqs();
        assert!((freqs[0] - 30.0).abs() < 1e-4);
        for k in 1..freqs.len() - 1 {
            assert!((freqs[k] - freqs[k - 1] / 2.0).abs() < 1e-4);
        }
        assert!((freqs[freqs.len() - 1] - BASEBAND_FREQ).abs() < 1e-6);
    }

    #[test]
    fn test_decompose_reconstruct_roundtrip() {
        let pyr = LaplacianPyramid::new(48, 36, 45.0);
        let plane = test_plane(48, 36);
        let group = PlaneGroup::from_planes(vec![plane.clone()], 1, 1);
        let bands = pyr.decompose(&group);
        assert_eq!(bands.len(), pyr.band_count());
        let back = pyr.reconstruct(&bands);
        for y in 0..36 {
            for x in 0..48 {
                let orig = plane.get(x, y);
                let rec = back.plane(0, 0).get(x, y);
                assert!(
                    (orig - rec).abs() < 1e-3 * orig.abs().max(1.0),
                    "roundtrip mismatch at ({x},{y}): {orig} vs {rec}"
                );
            }
        }
    }

    #[test]
    fn test_band_resolution_halves() {
        let pyr = LaplacianPyramid::new(64, 48, 60.0);
        for bb in 1..pyr.band_count() {
            let (w_prev, h_prev) = pyr.band_dims(bb - 1);
            let (w, h) = pyr.band_dims(bb);
            assert_eq!(w, w_prev.div_ceil(2));
            assert_eq!(h, h_prev.div_ceil(2));
        }
    }

    #[test]
    fn test_interleaving_preserved() {
        // Test planes constant 10, reference planes constant 20; after
        // decomposition the baseband must keep the even/odd split.
        let mut group = PlaneGroup::new(4, 1, 32, 32);
        for cc in 0..4 {
            let v = if cc % 2 == 0 { 10.0 } else { 20.0 };
            group.plane_mut(cc, 0).fill(v);
        }
        let pyr = LaplacianPyramid::new(32, 32, 60.0);
        let bands = pyr.decompose(&group);
        let base = &bands[pyr.band_count() - 1];
        assert!((base.plane(0, 0).get(0, 0) - 10.0).abs() < 1e-3);
        assert!((base.plane(1, 0).get(0, 0) - 20.0).abs() < 1e-3);
        assert!((base.plane(2, 0).get(0, 0) - 10.0).abs() < 1e-3);
        assert!((base.plane(3, 0).get(0, 0) - 20.0).abs() < 1e-3);
    }

    #[test]
    fn test_weber_contrast_zero_for_identical_pair() {
        let plane = test_plane(32, 32);
        let group = PlaneGroup::from_planes(
            vec![plane.clone(), plane.clone()],
            2,
            1,
        );
        let pyr = ContrastPyramid::new(32, 32, 60.0, ContrastMode::WeberG1Ref);
        let dec = pyr.decompose(&group);
        for bb in 0..pyr.band_count() {
            let band = &dec.bands[bb];
            let diff = band
                .plane(0, 0)
                .zip_map(band.plane(1, 0), |t, r| (t - r).abs());
            for y in 0..diff.height() {
                for x in 0..diff.width() {
                    assert!(diff.get(x, y) < 1e-5, "band {bb} differs at ({x},{y})");
                }
            }
        }
    }

    #[test]
    fn test_backgrounds_positive_and_floored() {
        let mut group = PlaneGroup::new(2, 1, 32, 32);
        group.plane_mut(0, 0).fill(0.0); // below the floor
        group.plane_mut(1, 0).fill(100.0);
        let pyr = ContrastPyramid::new(32, 32, 60.0, ContrastMode::WeberG1Ref);
        let dec = pyr.decompose(&group);
        for bkg in &dec.backgrounds {
            for sig in 0..2 {
                for y in 0..bkg.height() {
                    for x in 0..bkg.width() {
                        assert!(bkg.plane(sig, 0).get(x, y) >= 0.009);
                    }
                }
            }
        }
    }

    #[test]
    fn test_unknown_contrast_name() {
        let err = ContrastMode::from_name("weber_g2").unwrap_err();
        assert!(err.to_string().contains("weber_g2"));
    }

    #[test]
    fn test_weber_to_log() {
        assert!(weber_to_log(0.0).abs() < 1e-7);
        assert!((weber_to_log(9.0) - 1.0).abs() < 1e-6);
    }
}
