//! The metric facade.
//!
//! `Cvvdp` wires the pipeline together: temporal filtering through the
//! sliding window, contrast decomposition, sensitivity and masking per
//! band, spatial pooling into the per-channel accumulator, and the final
//! norm pooling down to one JOD score. One instance serves one prediction
//! at a time; concurrent use needs independent instances.

use imgref::ImgVec;
use serde_json::json;

use crate::block::{BlockSchedule, SlidingWindow, TemporalPadding, DEFAULT_MEMORY_BUDGET};
use crate::csf::{CastleCsf, ContrastSensitivity};
use crate::display::DisplayModel;
use crate::heatmap::{HeatmapBuilder, HeatmapMode};
use crate::image::{ImageF, PlaneGroup};
use crate::masking::{LocalAdapt, MaskingStage};
use crate::norm::{pool_to_jod, QTensor};
use crate::params::CvvdpParameters;
use crate::pyramid::{ContrastMode, ContrastPyramid};
use crate::source::{MetricColorspace, VideoSource};
use crate::temporal::{TemporalFilterBank, TRANSIENT_FREQ_HZ};
use crate::CvvdpError;

/// Diagnostics returned alongside the JOD score.
#[derive(Debug)]
pub struct CvvdpStats {
    /// Pooled difference per (channel, frame, band).
    pub q_per_channel: QTensor,
    /// Spatial frequency of each band, cycles/degree.
    pub band_freqs: Vec<f32>,
    /// Frame rate of the processed video, 0 for single images.
    pub frames_per_second: f32,
    /// Frame width in pixels.
    pub width: usize,
    /// Frame height in pixels.
    pub height: usize,
    /// Number of processed frames.
    pub n_frames: usize,
    /// Per-pixel difference frames when a heatmap mode was requested.
    pub heatmap: Option<Vec<ImgVec<f32>>>,
}

impl CvvdpStats {
    /// Serializes the pooled features: one `t{cc}_b{bb}` series per
    /// channel/band pair, with per-band frequencies and the frame rate.
    #[must_use]
    pub fn to_feature_json(&self) -> serde_json::Value {
        let q = &self.q_per_channel;
        let mut map = serde_json::Map::new();
        for cc in 0..q.channels() {
            for bb in 0..q.bands() {
                let series: Vec<f32> = (0..q.frames()).map(|ff| q.get(cc, ff, bb)).collect();
                map.insert(format!("t{cc}_b{bb}"), json!(series));
            }
        }
        map.insert("rho_band".to_string(), json!(self.band_freqs));
        map.insert("frames_per_second".to_string(), json!(self.frames_per_second));
        serde_json::Value::Object(map)
    }
}

/// The ColourVideoVDP-style metric.
pub struct Cvvdp {
    params: CvvdpParameters,
    display: Box<dyn DisplayModel>,
    csf: Box<dyn ContrastSensitivity>,
    contrast: ContrastMode,
    masking: MaskingStage,
    padding: TemporalPadding,
    heatmap_mode: Option<HeatmapMode>,
    memory_budget: usize,
    block_override: Option<usize>,
    pyramid: Option<ContrastPyramid>,
}

// The display model and CSF are trait objects, so only the concrete
// configuration is printed.
impl std::fmt::Debug for Cvvdp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cvvdp")
            .field("params", &self.params)
            .field("display", &self.display.name())
            .field("contrast", &self.contrast)
            .field("masking", &self.masking)
            .field("padding", &self.padding)
            .field("heatmap_mode", &self.heatmap_mode)
            .field("memory_budget", &self.memory_budget)
            .field("block_override", &self.block_override)
            .finish_non_exhaustive()
    }
}

impl Cvvdp {
    /// Builds a metric from a parameter bundle and a display model.
    ///
    /// All string-valued configuration is resolved here, so a bad
    /// parameter file fails before any frame is touched.
    pub fn new(
        params: CvvdpParameters,
        display: Box<dyn DisplayModel>,
    ) -> Result<Self, CvvdpError> {
        let contrast = ContrastMode::from_name(&params.contrast)?;
        let masking = MaskingStage::from_params(&params)?;
        // Only checked for validity; simple_ref is baked into the
        // contrast pyramid's reference-background normalization.
        let _ = LocalAdapt::from_name(&params.local_adapt)?;
        Ok(Self {
            params,
            display,
            csf: Box::new(CastleCsf),
            contrast,
            masking,
            padding: TemporalPadding::Replicate,
            heatmap_mode: None,
            memory_budget: DEFAULT_MEMORY_BUDGET,
            block_override: None,
            pyramid: None,
        })
    }

    /// Swaps in a different CSF implementation.
    #[must_use]
    pub fn with_csf(mut self, csf: Box<dyn ContrastSensitivity>) -> Self {
        self.csf = csf;
        self
    }

    /// Enables heatmap collection.
    #[must_use]
    pub fn with_heatmap(mut self, mode: HeatmapMode) -> Self {
        self.heatmap_mode = Some(mode);
        self
    }

    /// Sets the memory budget used for block sizing.
    #[must_use]
    pub fn with_memory_budget(mut self, bytes: usize) -> Self {
        self.memory_budget = bytes;
        self
    }

    /// Pins the number of frames per block, bypassing the memory
    /// estimate. Block size only affects performance, never the score.
    #[must_use]
    pub fn with_block_frames(mut self, frames: usize) -> Self {
        self.block_override = Some(frames);
        self
    }

    /// Selects the start-of-video padding policy.
    #[must_use]
    pub fn with_padding(mut self, padding: TemporalPadding) -> Self {
        self.padding = padding;
        self
    }

    /// Human-readable description of the metric configuration.
    #[must_use]
    pub fn info_string(&self) -> String {
        format!(
            "cvvdp v{} [{} contrast, {} CSF] display: {} (peak {:.1} cd/m2, black {:.3} cd/m2, {:.1} ppd)",
            self.params.version,
            self.params.contrast,
            self.csf.name(),
            self.display.name(),
            self.display.peak_luminance(),
            self.display.black_level(),
            self.display.pixels_per_degree(),
        )
    }

    /// Runs the full pipeline on a source and returns the JOD score with
    /// diagnostics.
    pub fn predict_source(
        &mut self,
        source: &dyn VideoSource,
    ) -> Result<(f64, CvvdpStats), CvvdpError> {
        let (height, width, n_frames) = source.video_size();
        if width == 0 || height == 0 || n_frames == 0 {
            return Err(CvvdpError::DimensionMismatch {
                message: format!("empty input: {width}x{height}, {n_frames} frames"),
            });
        }
        let is_video = n_frames > 1;
        let fps = source.frames_per_second();
        if is_video && fps <= 0.0 {
            return Err(CvvdpError::InvalidFrameRate { fps });
        }

        let colorspace = if self.contrast.is_log() {
            MetricColorspace::LogLms2006
        } else {
            MetricColorspace::DklD65
        };

        // 3 sustained channels for images, plus the transient for video.
        let all_ch = if is_video { 4 } else { 3 };
        let bank = is_video.then(|| TemporalFilterBank::new(fps, &self.params));
        let fl = bank.as_ref().map_or(1, TemporalFilterBank::filter_len);

        let ppd = self.display.pixels_per_degree();
        let pyr = self.pyramid_for(width, height, ppd);
        let nb = pyr.band_count();

        let schedule = BlockSchedule::plan(
            width,
            height,
            n_frames,
            fl,
            self.memory_budget,
            self.block_override,
        )?;

        let mut win_test = SlidingWindow::new(fl, self.padding)?;
        let mut win_ref = SlidingWindow::new(fl, self.padding)?;

        let mut heatmap = self
            .heatmap_mode
            .map(|_| HeatmapBuilder::new(pyr.geometry()));

        let mut q_per_ch = QTensor::new(all_ch, n_frames, nb);
        for (start, count) in schedule.blocks() {
            win_test.load_block(start, count, &mut |ff| source.test_frame(ff, colorspace))?;
            win_ref.load_block(start, count, &mut |ff| {
                source.reference_frame(ff, colorspace)
            })?;

            let group = self.assemble_block(
                &win_test,
                &win_ref,
                bank.as_ref(),
                all_ch,
                count,
                width,
                height,
            );
            let block_q = self.process_block(&group, &pyr, all_ch, is_video, heatmap.as_mut());
            q_per_ch.write_block(start, &block_q);
        }

        let jod = pool_to_jod(&q_per_ch, &self.params, is_video);

        let stats = CvvdpStats {
            q_per_channel: q_per_ch,
            band_freqs: pyr.band_freqs(),
            frames_per_second: if is_video { fps } else { 0.0 },
            width,
            height,
            n_frames,
            heatmap: heatmap.map(HeatmapBuilder::into_frames),
        };
        Ok((jod, stats))
    }

    /// Returns the cached pyramid, rebuilding only when the geometry
    /// changes.
    fn pyramid_for(&mut self, width: usize, height: usize, ppd: f32) -> ContrastPyramid {
        if let Some(p) = &self.pyramid {
            let g = p.geometry();
            if g.width() != width || g.height() != height || (g.ppd() - ppd).abs() > f32::EPSILON {
                self.pyramid = None;
            }
        }
        let contrast = self.contrast;
        self.pyramid
            .get_or_insert_with(|| {
                log::debug!("rebuilding contrast pyramid for {width}x{height} at {ppd:.2} ppd");
                ContrastPyramid::new(width, height, ppd, contrast)
            })
            .clone()
    }

    /// Builds the channel-interleaved block tensor
    /// `[T Ysust, R Ysust, T rg, R rg, T yv, R yv, (T Ytrans, R Ytrans)]`.
    #[allow(clippy::too_many_arguments)]
    fn assemble_block(
        &self,
        win_test: &SlidingWindow,
        win_ref: &SlidingWindow,
        bank: Option<&TemporalFilterBank>,
        all_ch: usize,
        count: usize,
        width: usize,
        height: usize,
    ) -> PlaneGroup {
        let channels = 2 * all_ch;
        let mut planes = Vec::with_capacity(channels * count);
        for c in 0..channels {
            let cc = c / 2;
            let win = if c % 2 == 0 { win_test } else { win_ref };
            // The transient channel filters the luminance planes.
            let src_ch = if cc < 3 { cc } else { 0 };
            for ff in 0..count {
                let plane = match bank {
                    Some(bank) => {
                        let window = win.filter_window(src_ch, ff);
                        bank.apply_window(cc, &window)
                    }
                    None => win.current_frame(ff)[src_ch].clone(),
                };
                debug_assert_eq!((plane.width(), plane.height()), (width, height));
                planes.push(plane);
            }
        }
        PlaneGroup::from_planes(planes, channels, count)
    }

    /// Runs decomposition, sensitivity, masking and spatial pooling for
    /// one block, returning a `[all_ch, count, bands]` tensor.
    fn process_block(
        &self,
        group: &PlaneGroup,
        pyr: &ContrastPyramid,
        all_ch: usize,
        is_video: bool,
        mut heatmap: Option<&mut HeatmapBuilder>,
    ) -> QTensor {
        let dec = pyr.decompose(group);
        let nb = pyr.band_count();
        let freqs = pyr.band_freqs();
        let count = group.frames();

        let mut block_q = QTensor::new(all_ch, count, nb);
        for ff in 0..count {
            if let Some(hm) = heatmap.as_deref_mut() {
                hm.begin_frame();
            }
            for bb in 0..nb {
                let is_baseband = bb == nb - 1;
                for cc in 0..all_ch {
                    let test = dec.bands[bb].plane(2 * cc, ff);
                    let refr = dec.bands[bb].plane(2 * cc + 1, ff);
                    // Both signals adapt to the reference background.
                    let bkg = dec.backgrounds[bb].plane(1, ff);
                    let sens = self.sensitivity_plane(bkg, freqs[bb], cc);

                    let diff = if is_baseband {
                        MaskingStage::baseband_difference(test, refr, &sens)
                    } else {
                        self.masking.visual_difference(test, refr, &sens, cc == 3)
                    };

                    let pooled = pool_pixels(&diff, self.params.beta);
                    block_q.set(cc, ff, bb, pooled);

                    if let Some(hm) = heatmap.as_deref_mut() {
                        let w = if is_video {
                            *self.params.ch_weights.get(cc).unwrap_or(&1.0)
                        } else {
                            1.0
                        };
                        hm.accumulate(bb, w, &diff);
                    }
                }
            }
            if let Some(hm) = heatmap.as_deref_mut() {
                hm.end_frame(&self.params);
            }
        }
        block_q
    }

    /// Per-pixel sensitivity for one channel at one band frequency.
    fn sensitivity_plane(&self, bkg: &ImageF, rho: f32, cc: usize) -> ImageF {
        let omega = if cc == 3 { TRANSIENT_FREQ_HZ } else { 0.0 };
        // The transient channel reuses the achromatic spectral shape.
        let cch = if cc < 3 { cc } else { 0 };
        let correction = 10.0f32.powf(self.params.sensitivity_correction / 20.0);
        let sigma = self.params.csf_sigma;
        let mut sens = bkg.clone();
        sens.map_inplace(|l| self.csf.sensitivity(rho, omega, l, cch, sigma) * correction);
        sens
    }
}

/// Normalized p-norm over all pixels of a difference plane.
fn pool_pixels(diff: &ImageF, beta: f32) -> f32 {
    let mut acc = 0.0f64;
    let n = diff.width() * diff.height();
    for y in 0..diff.height() {
        for &v in diff.row(y) {
            acc += f64::from(v.abs()).powf(f64::from(beta));
        }
    }
    ((acc / n as f64).powf(1.0 / f64::from(beta))) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::StandardDisplay;
    use crate::source::ArrayVideoSource;

    fn display() -> Box<dyn DisplayModel> {
        Box::new(StandardDisplay::new("test", 200.0, 0.2, 60.0))
    }

    fn gray_source(l: f32) -> ArrayVideoSource {
        let frame = ArrayVideoSource::frame_from_luma(ImageF::filled(32, 32, l));
        ArrayVideoSource::from_images(frame.clone(), frame).unwrap()
    }

    #[test]
    fn test_identical_images_score_ten() {
        let mut metric = Cvvdp::new(CvvdpParameters::default(), display()).unwrap();
        let (jod, stats) = metric.predict_source(&gray_source(100.0)).unwrap();
        assert!((jod - 10.0).abs() < 1e-9, "jod {jod}");
        let q = &stats.q_per_channel;
        for cc in 0..q.channels() {
            for bb in 0..q.bands() {
                assert!(q.get(cc, 0, bb).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_image_uses_three_channels() {
        let mut metric = Cvvdp::new(CvvdpParameters::default(), display()).unwrap();
        let (_, stats) = metric.predict_source(&gray_source(100.0)).unwrap();
        assert_eq!(stats.q_per_channel.channels(), 3);
        assert!(stats.frames_per_second.abs() < 1e-6);
    }

    #[test]
    fn test_bad_contrast_name_fails_at_construction() {
        let mut params = CvvdpParameters::default();
        params.contrast = "weber_g7".to_string();
        let err = Cvvdp::new(params, display()).unwrap_err();
        assert!(matches!(err, CvvdpError::UnknownContrast { .. }));
    }

    #[test]
    fn test_bad_clamp_name_fails_at_construction() {
        let mut params = CvvdpParameters::default();
        params.dclamp_type = "median".to_string();
        assert!(Cvvdp::new(params, display()).is_err());
    }

    #[test]
    fn test_metric_and_stats_are_debug_printable() {
        let mut metric = Cvvdp::new(CvvdpParameters::default(), display()).unwrap();
        assert!(format!("{metric:?}").contains("Cvvdp"));
        let (_, stats) = metric.predict_source(&gray_source(100.0)).unwrap();
        assert!(format!("{stats:?}").contains("CvvdpStats"));
    }

    #[test]
    fn test_pool_pixels_constant_plane() {
        let plane = ImageF::filled(8, 8, 0.5);
        assert!((pool_pixels(&plane, 3.5) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_feature_json_has_channel_band_keys() {
        let mut metric = Cvvdp::new(CvvdpParameters::default(), display()).unwrap();
        let (_, stats) = metric.predict_source(&gray_source(100.0)).unwrap();
        let features = stats.to_feature_json();
        assert!(features.get("t0_b0").is_some());
        assert!(features.get("rho_band").is_some());
    }

    #[test]
    fn test_info_string_mentions_display() {
        let metric = Cvvdp::new(CvvdpParameters::default(), display()).unwrap();
        let info = metric.info_string();
        assert!(info.contains("cvvdp"));
        assert!(info.contains("ppd"));
    }
}
