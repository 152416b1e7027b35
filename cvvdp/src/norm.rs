//! Generalized p-norm pooling and the JOD mapping.
//!
//! Every reduction in the metric is a power-mean: spatial pooling of one
//! band, pooling across spatial bands, across temporal/chromatic channels
//! and finally across frames. The exponent may be any positive real (it is a
//! tunable model parameter), so the norm is always computed via the explicit
//! power-sum formula with f64 accumulation.

use crate::params::CvvdpParameters;

/// Computes `(sum(|x|^p) / N)^(1/p)`, with `N = x.len()` when `normalize`
/// and `N = 1` otherwise.
#[must_use]
pub fn lp_norm_slice(x: &[f32], p: f32, normalize: bool) -> f32 {
    let n = if normalize { x.len() as f64 } else { 1.0 };
    if x.is_empty() {
        return 0.0;
    }
    let p = f64::from(p);
    let sum: f64 = x.iter().map(|&v| f64::from(v).abs().powf(p)).sum();
    ((sum / n).powf(1.0 / p)) as f32
}

/// Pooled per-(channel, frame, band) differences.
///
/// Grows once to the full frame count and is written in per-block slices at
/// increasing frame offsets, never overwritten outside a block's own slice.
#[derive(Debug, Clone)]
pub struct QTensor {
    data: Vec<f32>, // [channel][frame][band] row-major
    channels: usize,
    frames: usize,
    bands: usize,
}

impl QTensor {
    /// Creates a zero-filled tensor.
    #[must_use]
    pub fn new(channels: usize, frames: usize, bands: usize) -> Self {
        Self {
            data: vec![0.0; channels * frames * bands],
            channels,
            frames,
            bands,
        }
    }

    #[inline]
    #[must_use]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    #[must_use]
    pub fn frames(&self) -> usize {
        self.frames
    }

    #[inline]
    #[must_use]
    pub fn bands(&self) -> usize {
        self.bands
    }

    #[inline]
    #[must_use]
    pub fn get(&self, channel: usize, frame: usize, band: usize) -> f32 {
        self.data[(channel * self.frames + frame) * self.bands + band]
    }

    #[inline]
    pub fn set(&mut self, channel: usize, frame: usize, band: usize, value: f32) {
        self.data[(channel * self.frames + frame) * self.bands + band] = value;
    }

    /// Copies a per-block tensor into this tensor at the given frame offset.
    ///
    /// # Panics
    /// Panics if the block does not fit at the offset or shapes disagree.
    pub fn write_block(&mut self, frame_offset: usize, block: &QTensor) {
        assert_eq!(self.channels, block.channels);
        assert_eq!(self.bands, block.bands);
        assert!(frame_offset + block.frames <= self.frames);
        for cc in 0..self.channels {
            for ff in 0..block.frames {
                for bb in 0..self.bands {
                    self.set(cc, frame_offset + ff, bb, block.get(cc, ff, bb));
                }
            }
        }
    }
}

/// Pools a `QTensor` down to a single quality scalar and maps it to JODs.
///
/// The reduction order is fixed and load-bearing: per-band and per-channel
/// weighting, then a p-norm over spatial bands (`beta_sch`, unnormalized),
/// then over channels (`beta_tch`, unnormalized), then over frames
/// (`beta_t`, normalized by frame count). The norms are nonlinear, so
/// reordering the stages changes the result. Channel weights apply to video
/// only; single images use weight 1.
#[must_use]
pub fn pool_to_jod(q: &QTensor, params: &CvvdpParameters, is_video: bool) -> f64 {
    let bands = q.bands();
    let mut q_sc = vec![0.0f32; q.channels() * q.frames()];
    let mut band_buf = vec![0.0f32; bands];

    for cc in 0..q.channels() {
        let ch_w = if is_video {
            *params.ch_weights.get(cc).unwrap_or(&1.0)
        } else {
            1.0
        };
        for ff in 0..q.frames() {
            for bb in 0..bands {
                let band_w = if bb == bands - 1 {
                    params.baseband_weight
                } else {
                    1.0
                };
                band_buf[bb] = q.get(cc, ff, bb) * ch_w * band_w;
            }
            q_sc[cc * q.frames() + ff] = lp_norm_slice(&band_buf, params.beta_sch, false);
        }
    }

    // Across temporal/chromatic channels, then across frames.
    let mut ch_buf = vec![0.0f32; q.channels()];
    let mut q_tc = vec![0.0f32; q.frames()];
    for ff in 0..q.frames() {
        for cc in 0..q.channels() {
            ch_buf[cc] = q_sc[cc * q.frames() + ff];
        }
        q_tc[ff] = lp_norm_slice(&ch_buf, params.beta_tch, false);
    }
    let quality = f64::from(lp_norm_slice(&q_tc, params.beta_t, true));

    jod_from_quality(quality, params)
}

/// Maps the pooled quality scalar to the JOD scale (10 = no difference).
#[must_use]
pub fn jod_from_quality(quality: f64, params: &CvvdpParameters) -> f64 {
    10.0 - f64::from(params.jod_a) * quality.powf(f64::from(params.jod_exp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::CvvdpParameters;

    #[test]
    fn test_lp_norm_matches_euclidean() {
        let x = [3.0f32, 4.0];
        assert!((lp_norm_slice(&x, 2.0, false) - 5.0).abs() < 1e-6);
        // Normalized: (25/2)^0.5
        assert!((lp_norm_slice(&x, 2.0, true) - (12.5f32).sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_lp_norm_fractional_exponent() {
        let x = [1.0f32, 8.0];
        let expected = (1.0f64 + 8.0f64.powf(1.5)).powf(1.0 / 1.5) as f32;
        assert!((lp_norm_slice(&x, 1.5, false) - expected).abs() < 1e-5);
    }

    #[test]
    fn test_zero_quality_maps_to_ten_jod() {
        let params = CvvdpParameters::default();
        let q = QTensor::new(3, 1, 4);
        let jod = pool_to_jod(&q, &params, false);
        assert!((jod - 10.0).abs() < 1e-9, "got {jod}");
    }

    #[test]
    fn test_write_block_offsets() {
        let mut q = QTensor::new(2, 4, 3);
        let mut block = QTensor::new(2, 2, 3);
        block.set(1, 0, 2, 5.0);
        block.set(0, 1, 1, 7.0);
        q.write_block(2, &block);
        assert!((q.get(1, 2, 2) - 5.0).abs() < 1e-6);
        assert!((q.get(0, 3, 1) - 7.0).abs() < 1e-6);
        // Frames before the block slice are untouched
        assert!(q.get(1, 1, 2).abs() < 1e-6);
    }

    #[test]
    fn test_pooling_order_is_load_bearing() {
        // Pool a synthetic tensor in the fixed order (bands, channels,
        // frames) and in a swapped order (channels first); the nonlinear
        // norms must disagree.
        let params = CvvdpParameters::default();
        let mut q = QTensor::new(2, 2, 2);
        let vals = [
            [[0.1f32, 0.9], [0.4, 0.2]],
            [[0.8, 0.3], [0.05, 0.6]],
        ];
        for cc in 0..2 {
            for ff in 0..2 {
                for bb in 0..2 {
                    q.set(cc, ff, bb, vals[cc][ff][bb]);
                }
            }
        }

        let band_first = pool_to_jod(&q, &params, true);

        // Swapped: channels pooled before bands.
        let mut q_ch = vec![0.0f32; 2 * 2]; // [frame][band]
        for ff in 0..2 {
            for bb in 0..2 {
                let band_w = if bb == 1 { params.baseband_weight } else { 1.0 };
                let col: Vec<f32> = (0..2)
                    .map(|cc| q.get(cc, ff, bb) * params.ch_weights[cc] * band_w)
                    .collect();
                q_ch[ff * 2 + bb] = lp_norm_slice(&col, params.beta_tch, false);
            }
        }
        let mut q_t = vec![0.0f32; 2];
        for ff in 0..2 {
            q_t[ff] = lp_norm_slice(&q_ch[ff * 2..ff * 2 + 2], params.beta_sch, false);
        }
        let swapped_q = f64::from(lp_norm_slice(&q_t, params.beta_t, true));
        let swapped = jod_from_quality(swapped_q, &params);

        assert!(
            (band_first - swapped).abs() > 1e-6,
            "band-before-channel pooling must differ from channel-before-band: {band_first} vs {swapped}"
        );
    }
}
