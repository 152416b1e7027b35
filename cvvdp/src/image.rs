//! Image buffer types for the metric.
//!
//! `ImageF` stores one single-channel f32 plane with row-stride padding for
//! cache-friendly access. `PlaneGroup` stacks planes over a (channel, frame)
//! grid and is the working representation for block tensors, pyramid bands
//! and background-luminance pyramids.

use std::ops::{Index, IndexMut};

/// Single-channel floating point image.
#[derive(Debug, Clone)]
pub struct ImageF {
    data: Vec<f32>,
    width: usize,
    height: usize,
    stride: usize, // pixels per row (may be > width for alignment)
}

impl ImageF {
    /// Creates a new image filled with zeros.
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        // Align stride to 16 floats (64 bytes)
        let stride = (width + 15) & !15;
        Self {
            data: vec![0.0; stride * height],
            width,
            height,
            stride,
        }
    }

    /// Creates an image from existing data in row-major order.
    ///
    /// # Panics
    /// Panics if data length doesn't match width * height.
    #[must_use]
    pub fn from_vec(data: Vec<f32>, width: usize, height: usize) -> Self {
        assert_eq!(data.len(), width * height);
        Self {
            data,
            width,
            height,
            stride: width,
        }
    }

    /// Creates an image filled with a constant value.
    #[must_use]
    pub fn filled(width: usize, height: usize, value: f32) -> Self {
        let stride = (width + 15) & !15;
        Self {
            data: vec![value; stride * height],
            width,
            height,
            stride,
        }
    }

    /// Image width in pixels.
    #[inline]
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Image height in pixels.
    #[inline]
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns a reference to a row (without padding).
    #[inline]
    #[must_use]
    pub fn row(&self, y: usize) -> &[f32] {
        let start = y * self.stride;
        &self.data[start..start + self.width]
    }

    /// Returns a mutable reference to a row (without padding).
    #[inline]
    pub fn row_mut(&mut self, y: usize) -> &mut [f32] {
        let start = y * self.stride;
        &mut self.data[start..start + self.width]
    }

    /// Gets a pixel value.
    #[inline]
    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.stride + x]
    }

    /// Sets a pixel value.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: f32) {
        self.data[y * self.stride + x] = value;
    }

    /// Checks if two images have the same dimensions.
    #[must_use]
    pub fn same_size(&self, other: &Self) -> bool {
        self.width == other.width && self.height == other.height
    }

    /// Copies data from another image of the same size.
    ///
    /// # Panics
    /// Panics if dimensions don't match.
    pub fn copy_from(&mut self, other: &Self) {
        assert!(self.same_size(other));
        for y in 0..self.height {
            self.row_mut(y).copy_from_slice(other.row(y));
        }
    }

    /// Fills the image with a constant value.
    pub fn fill(&mut self, value: f32) {
        self.data.fill(value);
    }

    /// Applies `f` to every pixel in place.
    pub fn map_inplace(&mut self, mut f: impl FnMut(f32) -> f32) {
        for y in 0..self.height {
            for v in self.row_mut(y) {
                *v = f(*v);
            }
        }
    }

    /// Builds a new image by combining two images pixel-wise.
    ///
    /// # Panics
    /// Panics if dimensions don't match.
    #[must_use]
    pub fn zip_map(&self, other: &Self, mut f: impl FnMut(f32, f32) -> f32) -> Self {
        assert!(self.same_size(other));
        let mut out = Self::new(self.width, self.height);
        for y in 0..self.height {
            let ra = self.row(y);
            let rb = other.row(y);
            let ro = out.row_mut(y);
            for x in 0..self.width {
                ro[x] = f(ra[x], rb[x]);
            }
        }
        out
    }

    /// Copies the image into a plain row-major `Vec` (no stride padding).
    #[must_use]
    pub fn to_vec(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.width * self.height);
        for y in 0..self.height {
            out.extend_from_slice(self.row(y));
        }
        out
    }
}

impl Index<(usize, usize)> for ImageF {
    type Output = f32;

    #[inline]
    fn index(&self, (x, y): (usize, usize)) -> &Self::Output {
        &self.data[y * self.stride + x]
    }
}

impl IndexMut<(usize, usize)> for ImageF {
    #[inline]
    fn index_mut(&mut self, (x, y): (usize, usize)) -> &mut Self::Output {
        &mut self.data[y * self.stride + x]
    }
}

/// A stack of equally sized planes over a (channel, frame) grid.
///
/// Block tensors index channels in test/reference interleaved order, so
/// `plane(2*cc, f)` is always a test plane and `plane(2*cc + 1, f)` always a
/// reference plane. Pyramid code relies on this invariant being preserved by
/// every per-plane operation.
#[derive(Debug, Clone)]
pub struct PlaneGroup {
    planes: Vec<ImageF>, // index = channel * frames + frame
    channels: usize,
    frames: usize,
}

impl PlaneGroup {
    /// Creates a group of zero-filled planes.
    #[must_use]
    pub fn new(channels: usize, frames: usize, width: usize, height: usize) -> Self {
        let planes = (0..channels * frames)
            .map(|_| ImageF::new(width, height))
            .collect();
        Self {
            planes,
            channels,
            frames,
        }
    }

    /// Builds a group from pre-made planes in `channel * frames + frame` order.
    ///
    /// # Panics
    /// Panics if the plane count or plane sizes are inconsistent.
    #[must_use]
    pub fn from_planes(planes: Vec<ImageF>, channels: usize, frames: usize) -> Self {
        assert_eq!(planes.len(), channels * frames);
        if let Some(first) = planes.first() {
            assert!(planes.iter().all(|p| p.same_size(first)));
        }
        Self {
            planes,
            channels,
            frames,
        }
    }

    /// Number of channels.
    #[inline]
    #[must_use]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Number of frames.
    #[inline]
    #[must_use]
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Plane width.
    #[inline]
    #[must_use]
    pub fn width(&self) -> usize {
        self.planes[0].width()
    }

    /// Plane height.
    #[inline]
    #[must_use]
    pub fn height(&self) -> usize {
        self.planes[0].height()
    }

    /// Returns a reference to one plane.
    #[inline]
    #[must_use]
    pub fn plane(&self, channel: usize, frame: usize) -> &ImageF {
        &self.planes[channel * self.frames + frame]
    }

    /// Returns a mutable reference to one plane.
    #[inline]
    pub fn plane_mut(&mut self, channel: usize, frame: usize) -> &mut ImageF {
        &mut self.planes[channel * self.frames + frame]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_creation() {
        let img = ImageF::new(100, 50);
        assert_eq!(img.width(), 100);
        assert_eq!(img.height(), 50);
    }

    #[test]
    fn test_pixel_access() {
        let mut img = ImageF::new(10, 10);
        img.set(5, 3, 42.0);
        assert!((img.get(5, 3) - 42.0).abs() < 0.001);
        assert!((img[(5, 3)] - 42.0).abs() < 0.001);
    }

    #[test]
    fn test_zip_map() {
        let a = ImageF::filled(8, 8, 2.0);
        let b = ImageF::filled(8, 8, 3.0);
        let c = a.zip_map(&b, |x, y| x * y);
        assert!((c.get(4, 4) - 6.0).abs() < 1e-6);
    }

    #[test]
    fn test_plane_group_layout() {
        let mut g = PlaneGroup::new(4, 2, 16, 8);
        assert_eq!(g.channels(), 4);
        assert_eq!(g.frames(), 2);
        g.plane_mut(3, 1).set(0, 0, 7.0);
        assert!((g.plane(3, 1).get(0, 0) - 7.0).abs() < 1e-6);
        assert!((g.plane(3, 0).get(0, 0)).abs() < 1e-6);
    }
}
