//! Raster helpers shared by the region heuristics.
//!
//! Everything works on normalized grayscale (`[0, 1]`) buffers in row-major
//! order, plus a few thin wrappers over `image::imageops`.

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

use crate::geometry::Rect;

/// A connected blob of foreground pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Component {
    /// Tight bounding box of the blob.
    pub bounds: Rect,
    /// Number of pixels in the blob.
    pub area: u32,
}

impl Component {
    /// Fraction of the bounding box covered by the blob.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fill_ratio(&self) -> f32 {
        let box_area = self.bounds.area();
        if box_area == 0 {
            0.0
        } else {
            (f64::from(self.area) / box_area as f64).min(1.0) as f32
        }
    }
}

/// Luminance of one pixel in `[0, 1]` (`0.299*R + 0.587*G + 0.114*B`).
#[must_use]
pub fn luminance(px: &Rgb<u8>) -> f32 {
    (0.299 * f32::from(px[0]) + 0.587 * f32::from(px[1]) + 0.114 * f32::from(px[2])) / 255.0
}

/// Convert a whole image to grayscale float values in `[0, 1]`.
#[must_use]
pub fn to_grayscale(img: &RgbImage) -> Vec<f32> {
    img.pixels().map(luminance).collect()
}

/// Copy out a sub-image. The rectangle must already lie inside `img`.
#[must_use]
pub fn crop(img: &RgbImage, rect: Rect) -> RgbImage {
    imageops::crop_imm(img, rect.x, rect.y, rect.width, rect.height).to_image()
}

/// Shrink `img` so its larger side is at most `max_dim`.
///
/// Returns the (possibly unchanged) image and the factor that maps source
/// coordinates to the returned image (`1.0` when no resize happened).
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn downscale_to(img: &RgbImage, max_dim: u32) -> (RgbImage, f64) {
    let (w, h) = img.dimensions();
    let largest = w.max(h);
    if largest <= max_dim || largest == 0 {
        return (img.clone(), 1.0);
    }
    let factor = f64::from(max_dim) / f64::from(largest);
    let new_w = ((f64::from(w) * factor) as u32).max(1);
    let new_h = ((f64::from(h) * factor) as u32).max(1);
    (
        imageops::resize(img, new_w, new_h, FilterType::Triangle),
        factor,
    )
}

/// Compute Sobel gradient magnitude for a 2D float array.
///
/// Uses 3x3 Sobel kernels. Border pixels are set to 0.
#[must_use]
pub fn sobel_magnitude(data: &[f32], width: usize, height: usize) -> Vec<f32> {
    let mut result = vec![0.0_f32; width * height];
    if width < 3 || height < 3 {
        return result;
    }

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let idx = |yy: usize, xx: usize| -> f32 { data[yy * width + xx] };

            let gx = -idx(y - 1, x - 1) + idx(y - 1, x + 1) - 2.0 * idx(y, x - 1)
                + 2.0 * idx(y, x + 1)
                - idx(y + 1, x - 1)
                + idx(y + 1, x + 1);

            let gy = -idx(y - 1, x - 1) - 2.0 * idx(y - 1, x) - idx(y - 1, x + 1)
                + idx(y + 1, x - 1)
                + 2.0 * idx(y + 1, x)
                + idx(y + 1, x + 1);

            result[y * width + x] = (gx * gx + gy * gy).sqrt();
        }
    }

    result
}

/// Mean-adaptive threshold: a pixel is foreground when it is brighter than
/// the mean of its `block x block` neighbourhood minus `offset`.
///
/// Uniform areas therefore come out as foreground and thin dark rings appear
/// around bright shapes, which is what separates overlay text from the
/// surrounding picture.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn adaptive_threshold(
    gray: &[f32],
    width: usize,
    height: usize,
    block: usize,
    offset: f32,
) -> Vec<bool> {
    let mut mask = vec![false; width * height];
    if width == 0 || height == 0 {
        return mask;
    }

    // Summed-area table with a zero row and column in front.
    let stride = width + 1;
    let mut integral = vec![0.0_f64; stride * (height + 1)];
    for y in 0..height {
        let mut row_sum = 0.0_f64;
        for x in 0..width {
            row_sum += f64::from(gray[y * width + x]);
            integral[(y + 1) * stride + x + 1] = integral[y * stride + x + 1] + row_sum;
        }
    }

    let half = block / 2;
    for y in 0..height {
        let y0 = y.saturating_sub(half);
        let y1 = (y + half + 1).min(height);
        for x in 0..width {
            let x0 = x.saturating_sub(half);
            let x1 = (x + half + 1).min(width);
            let sum = integral[y1 * stride + x1] - integral[y0 * stride + x1]
                - integral[y1 * stride + x0]
                + integral[y0 * stride + x0];
            let count = ((y1 - y0) * (x1 - x0)) as f64;
            #[allow(clippy::cast_possible_truncation)]
            let mean = (sum / count) as f32;
            mask[y * width + x] = gray[y * width + x] > mean - offset;
        }
    }
    mask
}

/// Label 8-connected foreground blobs.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn connected_components(mask: &[bool], width: usize, height: usize) -> Vec<Component> {
    let mut visited = vec![false; width * height];
    let mut components = Vec::new();
    let mut stack = Vec::new();

    for start in 0..width * height {
        if !mask[start] || visited[start] {
            continue;
        }
        visited[start] = true;
        stack.push(start);

        let (mut min_x, mut min_y) = (usize::MAX, usize::MAX);
        let (mut max_x, mut max_y) = (0usize, 0usize);
        let mut area = 0u32;

        while let Some(idx) = stack.pop() {
            let (x, y) = (idx % width, idx / width);
            area += 1;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);

            for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                    let n = ny * width + nx;
                    if mask[n] && !visited[n] {
                        visited[n] = true;
                        stack.push(n);
                    }
                }
            }
        }

        components.push(Component {
            bounds: Rect::new(
                min_x as u32,
                min_y as u32,
                (max_x - min_x + 1) as u32,
                (max_y - min_y + 1) as u32,
            ),
            area,
        });
    }

    components
}

/// True for bright, nearly colourless pixels, the usual look of overlay text.
#[must_use]
pub fn is_bright_neutral(px: &Rgb<u8>, min_value: u8, max_spread: u8) -> bool {
    let hi = px[0].max(px[1]).max(px[2]);
    let lo = px[0].min(px[1]).min(px[2]);
    lo >= min_value && hi - lo <= max_spread
}
