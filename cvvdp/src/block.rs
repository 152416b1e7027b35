//! Block scheduling for bounded-memory video processing.
//!
//! A video is processed in blocks of frames. The block size is chosen from
//! a byte budget and is a performance knob only: results are identical for
//! any block size because each output frame sees exactly the `fl` most
//! recent input frames through the sliding window.

use crate::source::ColorFrame;
use crate::CvvdpError;

/// Empirical working-set estimate per processed frame, bytes per pixel.
/// Covers the channel tensor, pyramid levels and masking temporaries.
const BYTES_PER_PIXEL_FRAME: usize = 450;

/// Default processing budget when the caller does not set one.
pub const DEFAULT_MEMORY_BUDGET: usize = 4 << 30;

/// How the sliding window fills the missing history at the start of the
/// video. Only replicate is implemented; the other two parse so that
/// configuration files naming them fail with a clear "unsupported" error
/// instead of "unknown".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalPadding {
    /// Repeat the first frame backward in time.
    Replicate,
    /// Wrap around to the end of the video.
    Circular,
    /// Mirror the first frames.
    Pingpong,
}

impl TemporalPadding {
    pub fn from_name(name: &str) -> Result<Self, CvvdpError> {
        match name {
            "replicate" => Ok(Self::Replicate),
            "circular" => Ok(Self::Circular),
            "pingpong" => Ok(Self::Pingpong),
            other => Err(CvvdpError::UnknownPadding {
                value: other.to_string(),
            }),
        }
    }
}

/// Frame ranges chosen for one video under a memory budget.
#[derive(Debug, Clone)]
pub struct BlockSchedule {
    n_frames: usize,
    block_frames: usize,
}

impl BlockSchedule {
    /// Picks the block size for a video.
    ///
    /// The estimate reserves a constant for the sliding window
    /// (`w*h * 4 bytes * 3 channels * 2 signals * (fl-1)` history planes)
    /// and divides the rest by the per-frame working set. `block_override`
    /// bypasses the estimate.
    ///
    /// # Errors
    /// [`CvvdpError::OutOfMemory`] when not even a single frame fits.
    pub fn plan(
        width: usize,
        height: usize,
        n_frames: usize,
        fl: usize,
        budget_bytes: usize,
        block_override: Option<usize>,
    ) -> Result<Self, CvvdpError> {
        let block_frames = if let Some(block) = block_override {
            block.clamp(1, n_frames)
        } else {
            let pixels = width * height;
            let window_bytes = pixels * 4 * 3 * 2 * (fl.saturating_sub(1));
            let per_frame = pixels * BYTES_PER_PIXEL_FRAME;
            let available = budget_bytes.saturating_sub(window_bytes);
            let fit = available / per_frame.max(1);
            if fit == 0 {
                return Err(CvvdpError::OutOfMemory {
                    needed: window_bytes + per_frame,
                    budget: budget_bytes,
                });
            }
            fit.min(n_frames)
        };

        log::debug!(
            "block schedule: {n_frames} frames in blocks of {block_frames} ({}x{}, fl={fl})",
            width,
            height
        );

        Ok(Self {
            n_frames,
            block_frames,
        })
    }

    #[inline]
    #[must_use]
    pub fn block_frames(&self) -> usize {
        self.block_frames
    }

    /// Iterates `(first_frame, frame_count)` in increasing frame order.
    pub fn blocks(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let block = self.block_frames;
        let total = self.n_frames;
        (0..total)
            .step_by(block)
            .map(move |start| (start, block.min(total - start)))
    }
}

/// Sliding history of decoded frames for one signal.
///
/// Holds up to `fl + block - 1` frames so every output frame of a block
/// can be temporally filtered against its full `fl`-frame history. Between
/// blocks the consumed prefix is dropped and fresh frames are appended,
/// so every source frame is fetched exactly once.
#[derive(Debug)]
pub struct SlidingWindow {
    fl: usize,
    frames: Vec<ColorFrame>,
    started: bool,
}

impl SlidingWindow {
    /// Creates a window for filter length `fl`.
    ///
    /// # Errors
    /// [`CvvdpError::UnsupportedPadding`] for parseable but unimplemented
    /// padding policies.
    pub fn new(fl: usize, padding: TemporalPadding) -> Result<Self, CvvdpError> {
        if padding != TemporalPadding::Replicate {
            let value = match padding {
                TemporalPadding::Circular => "circular",
                TemporalPadding::Pingpong => "pingpong",
                TemporalPadding::Replicate => unreachable!(),
            };
            return Err(CvvdpError::UnsupportedPadding {
                value: value.to_string(),
            });
        }
        Ok(Self {
            fl,
            frames: Vec::new(),
            started: false,
        })
    }

    /// Loads the frames needed for a block of `count` frames starting at
    /// `start`, pulling fresh frames through `fetch`. The first call pads
    /// the missing history by replicating the first frame.
    pub fn load_block(
        &mut self,
        start: usize,
        count: usize,
        fetch: &mut dyn FnMut(usize) -> Result<ColorFrame, CvvdpError>,
    ) -> Result<(), CvvdpError> {
        if !self.started {
            debug_assert_eq!(start, 0);
            let first = fetch(0)?;
            for _ in 0..self.fl - 1 {
                self.frames.push(first.clone());
            }
            self.frames.push(first);
            for ff in 1..count {
                self.frames.push(fetch(ff)?);
            }
            self.started = true;
        } else {
            // Keep the trailing fl-1 frames of history, drop the rest.
            let keep = self.fl - 1;
            let drop = self.frames.len() - keep;
            self.frames.drain(0..drop);
            for ff in start..start + count {
                self.frames.push(fetch(ff)?);
            }
        }
        Ok(())
    }

    /// The `fl` channel planes feeding output frame `block_frame`, oldest
    /// first.
    #[must_use]
    pub fn filter_window(&self, channel: usize, block_frame: usize) -> Vec<&crate::image::ImageF> {
        (0..self.fl)
            .map(|k| &self.frames[block_frame + k][channel])
            .collect()
    }

    /// The raw (unfiltered) frame at a block position, used for
    /// single-image input where no temporal filtering happens.
    #[must_use]
    pub fn current_frame(&self, block_frame: usize) -> &ColorFrame {
        &self.frames[self.fl - 1 + block_frame]
    }
}
