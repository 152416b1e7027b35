//! Separable Gaussian blur.
//!
//! The metric uses Gaussian blurs in two places: the phase-uncertainty step
//! of the masking model and the local-adaptation filter. Boundary handling
//! clamps to the edge and re-normalizes the kernel weights for border
//! pixels, so a constant image stays constant.

use crate::image::ImageF;

/// Computes a 1D Gaussian kernel for the given sigma.
///
/// Returns normalized weights for the interior case; border pixels
/// re-normalize over the in-bounds taps.
#[must_use]
pub fn compute_kernel(sigma: f32) -> Vec<f32> {
    const M: f32 = 2.25; // Accuracy increases when m is increased
    let scaler = -1.0 / (2.0 * sigma * sigma);
    let diff = (M * sigma.abs()).max(1.0) as i32;
    let size = (2 * diff + 1) as usize;
    let mut kernel = vec![0.0f32; size];

    let mut sum = 0.0f32;
    for i in -diff..=diff {
        let weight = (scaler * (i * i) as f32).exp();
        kernel[(i + diff) as usize] = weight;
        sum += weight;
    }

    let inv_sum = 1.0 / sum;
    for k in &mut kernel {
        *k *= inv_sum;
    }

    kernel
}

/// Horizontal convolution of a single row with clamp boundary handling.
fn convolve_row(input: &[f32], kernel: &[f32], output: &mut [f32]) {
    let width = input.len();
    if width == 0 {
        return;
    }
    let half = kernel.len() / 2;

    for x in 0..width {
        let minx = x.saturating_sub(half);
        let maxx = (x + half).min(width - 1);

        let mut weight_sum = 0.0f32;
        let mut sum = 0.0f32;
        for j in minx..=maxx {
            let k_val = kernel[j + half - x];
            weight_sum += k_val;
            sum += input[j] * k_val;
        }

        output[x] = if weight_sum > 0.0 {
            sum / weight_sum
        } else {
            0.0
        };
    }
}

/// Vertical convolution of a single column with clamp boundary handling.
fn convolve_column(image: &ImageF, x: usize, kernel: &[f32], output: &mut [f32]) {
    let height = image.height();
    if height == 0 {
        return;
    }
    let half = kernel.len() / 2;

    for y in 0..height {
        let miny = y.saturating_sub(half);
        let maxy = (y + half).min(height - 1);

        let mut weight_sum = 0.0f32;
        let mut sum = 0.0f32;
        for j in miny..=maxy {
            let k_val = kernel[j + half - y];
            weight_sum += k_val;
            sum += image.get(x, j) * k_val;
        }

        output[y] = if weight_sum > 0.0 {
            sum / weight_sum
        } else {
            0.0
        };
    }
}

/// Applies a separable 2D convolution with the given 1D kernel.
#[must_use]
pub fn separable_filter(input: &ImageF, kernel: &[f32]) -> ImageF {
    let width = input.width();
    let height = input.height();

    let mut temp = ImageF::new(width, height);
    for y in 0..height {
        convolve_row(input.row(y), kernel, temp.row_mut(y));
    }

    let mut output = ImageF::new(width, height);
    let mut col_buffer = vec![0.0f32; height];
    for x in 0..width {
        convolve_column(&temp, x, kernel, &mut col_buffer);
        for (y, &val) in col_buffer.iter().enumerate() {
            output.set(x, y, val);
        }
    }

    output
}

/// Applies a 2D Gaussian blur with the given standard deviation (in pixels).
///
/// A non-positive sigma returns a copy of the input.
#[must_use]
pub fn gaussian_blur(input: &ImageF, sigma: f32) -> ImageF {
    if sigma <= 0.0 {
        return input.clone();
    }
    separable_filter(input, &compute_kernel(sigma))
}

/// The 5-tap binomial kernel [1 4 6 4 1]/16 used by the pyramid.
pub const BINOMIAL5: [f32; 5] = [0.0625, 0.25, 0.375, 0.25, 0.0625];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_generation() {
        let kernel = compute_kernel(1.0);
        assert!(!kernel.is_empty());
        assert_eq!(kernel.len() % 2, 1); // Should be odd

        // Center should be maximum
        let center = kernel.len() / 2;
        for (i, &v) in kernel.iter().enumerate() {
            if i != center {
                assert!(v <= kernel[center]);
            }
        }

        // Should sum to ~1.0
        let sum: f32 = kernel.iter().sum();
        assert!((sum - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_blur_constant_image() {
        // Blurring a constant image should give the same constant
        let img = ImageF::filled(32, 32, 0.5);
        let blurred = gaussian_blur(&img, 2.0);

        for y in 0..32 {
            for x in 0..32 {
                assert!(
                    (blurred.get(x, y) - 0.5).abs() < 0.01,
                    "Expected 0.5, got {} at ({}, {})",
                    blurred.get(x, y),
                    x,
                    y
                );
            }
        }
    }

    #[test]
    fn test_blur_reduces_delta() {
        // A single bright pixel should spread out
        let mut img = ImageF::new(32, 32);
        img.set(16, 16, 1.0);

        let blurred = gaussian_blur(&img, 2.0);

        assert!(blurred.get(16, 16) < 1.0);
        assert!(blurred.get(15, 16) > 0.0);
        assert!(blurred.get(17, 16) > 0.0);
    }

    #[test]
    fn test_binomial5_normalized() {
        let sum: f32 = BINOMIAL5.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }
}
