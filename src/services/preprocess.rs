use image::{GrayImage, Luma};
use imageproc::filter::median_filter;

const MEDIAN_RADIUS: u32 = 3;
const CLAHE_CLIP_LIMIT: f32 = 2.0;
const CLAHE_GRID: u32 = 8;

/// Normalizes a photographed answer sheet into a binary image for text
/// recognition: grayscale, median denoise, local contrast equalization, Otsu
/// binarization. Returns `None` when the bytes cannot be decoded; never
/// panics on malformed input.
pub(crate) fn preprocess_image(bytes: &[u8]) -> Option<GrayImage> {
    let decoded = image::load_from_memory(bytes).ok()?;
    let gray = decoded.to_luma8();
    if gray.width() == 0 || gray.height() == 0 {
        return None;
    }

    let denoised = median_filter(&gray, MEDIAN_RADIUS, MEDIAN_RADIUS);
    let equalized = clahe(&denoised, CLAHE_CLIP_LIMIT, CLAHE_GRID, CLAHE_GRID);
    let threshold = otsu_threshold(&equalized);

    Some(binarize(&equalized, threshold))
}

/// Contrast-limited adaptive histogram equalization over a tile grid, with
/// bilinear interpolation between neighboring tile mappings to avoid visible
/// tile seams.
fn clahe(image: &GrayImage, clip_limit: f32, grid_cols: u32, grid_rows: u32) -> GrayImage {
    let (width, height) = image.dimensions();
    let grid_cols = grid_cols.min(width).max(1);
    let grid_rows = grid_rows.min(height).max(1);
    let tile_w = width.div_ceil(grid_cols);
    let tile_h = height.div_ceil(grid_rows);

    let mut luts = vec![[0u8; 256]; (grid_cols * grid_rows) as usize];
    for ty in 0..grid_rows {
        for tx in 0..grid_cols {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(width);
            let y1 = (y0 + tile_h).min(height);

            let mut histogram = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    histogram[image.get_pixel(x, y)[0] as usize] += 1;
                }
            }

            let pixels = (x1.saturating_sub(x0)) * (y1.saturating_sub(y0));
            if pixels == 0 {
                continue;
            }

            // Clip the histogram and spread the excess evenly over all bins.
            let limit = ((clip_limit * pixels as f32 / 256.0).max(1.0)) as u32;
            let mut excess = 0u32;
            for count in histogram.iter_mut() {
                if *count > limit {
                    excess += *count - limit;
                    *count = limit;
                }
            }
            let bonus = excess / 256;
            for count in histogram.iter_mut() {
                *count += bonus;
            }

            let lut = &mut luts[(ty * grid_cols + tx) as usize];
            let mass: u32 = histogram.iter().sum();
            let scale = 255.0 / mass as f32;
            let mut cumulative = 0u32;
            for (value, count) in histogram.iter().enumerate() {
                cumulative += count;
                lut[value] = (cumulative as f32 * scale).min(255.0) as u8;
            }
        }
    }

    let cols = grid_cols as usize;
    let mut output = GrayImage::new(width, height);
    for (x, y, pixel) in image.enumerate_pixels() {
        let value = pixel[0] as usize;

        let gx = (x as f32 + 0.5) / tile_w as f32 - 0.5;
        let gy = (y as f32 + 0.5) / tile_h as f32 - 0.5;
        let fx = (gx - gx.floor()).clamp(0.0, 1.0);
        let fy = (gy - gy.floor()).clamp(0.0, 1.0);
        let tx0 = (gx.floor() as i64).clamp(0, grid_cols as i64 - 1) as usize;
        let ty0 = (gy.floor() as i64).clamp(0, grid_rows as i64 - 1) as usize;
        let tx1 = (tx0 + 1).min(cols - 1);
        let ty1 = (ty0 + 1).min(grid_rows as usize - 1);

        let top = luts[ty0 * cols + tx0][value] as f32 * (1.0 - fx)
            + luts[ty0 * cols + tx1][value] as f32 * fx;
        let bottom = luts[ty1 * cols + tx0][value] as f32 * (1.0 - fx)
            + luts[ty1 * cols + tx1][value] as f32 * fx;
        let blended = top * (1.0 - fy) + bottom * fy;

        output.put_pixel(x, y, Luma([blended.round().clamp(0.0, 255.0) as u8]));
    }

    output
}

/// Otsu's method: pick the threshold maximizing between-class variance.
fn otsu_threshold(image: &GrayImage) -> u8 {
    let mut histogram = [0u32; 256];
    for pixel in image.pixels() {
        histogram[pixel[0] as usize] += 1;
    }
    let total_pixels = (image.width() * image.height()) as f64;

    let mut sum = 0.0;
    for (value, &count) in histogram.iter().enumerate() {
        sum += value as f64 * count as f64;
    }

    let mut sum_b = 0.0;
    let mut w_b = 0.0;
    let mut max_variance = 0.0;
    let mut threshold = 0u8;

    for (candidate, &count) in histogram.iter().enumerate() {
        w_b += count as f64;
        if w_b == 0.0 {
            continue;
        }

        let w_f = total_pixels - w_b;
        if w_f == 0.0 {
            break;
        }

        sum_b += candidate as f64 * count as f64;

        let m_b = sum_b / w_b;
        let m_f = (sum - sum_b) / w_f;
        let variance = w_b * w_f * (m_b - m_f).powi(2);

        if variance > max_variance {
            max_variance = variance;
            threshold = candidate as u8;
        }
    }

    threshold
}

fn binarize(image: &GrayImage, threshold: u8) -> GrayImage {
    let mut output = GrayImage::new(image.width(), image.height());
    for (x, y, pixel) in image.enumerate_pixels() {
        let value = if pixel[0] > threshold { 255 } else { 0 };
        output.put_pixel(x, y, Luma([value]));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn encode_png(image: &GrayImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        image::DynamicImage::ImageLuma8(image.clone())
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .expect("encode png");
        bytes
    }

    fn sheet_like_image() -> GrayImage {
        // Bright paper with a dark text-like block.
        let mut img = GrayImage::from_pixel(64, 64, Luma([230]));
        for y in 20..30 {
            for x in 8..56 {
                img.put_pixel(x, y, Luma([30]));
            }
        }
        img
    }

    #[test]
    fn preprocess_returns_binary_image() {
        let bytes = encode_png(&sheet_like_image());
        let processed = preprocess_image(&bytes).expect("processed");

        assert_eq!(processed.dimensions(), (64, 64));
        assert!(processed.pixels().all(|p| p[0] == 0 || p[0] == 255));
        // Both classes survive binarization.
        assert!(processed.pixels().any(|p| p[0] == 0));
        assert!(processed.pixels().any(|p| p[0] == 255));
    }

    #[test]
    fn preprocess_is_deterministic() {
        let bytes = encode_png(&sheet_like_image());
        let first = preprocess_image(&bytes).expect("first");
        let second = preprocess_image(&bytes).expect("second");
        assert_eq!(first.as_raw(), second.as_raw());
    }

    #[test]
    fn preprocess_rejects_undecodable_bytes() {
        assert!(preprocess_image(b"definitely not an image").is_none());
        assert!(preprocess_image(&[]).is_none());
    }

    #[test]
    fn otsu_separates_bimodal_histogram() {
        let mut img = GrayImage::from_pixel(32, 32, Luma([220]));
        for y in 0..16 {
            for x in 0..32 {
                img.put_pixel(x, y, Luma([40]));
            }
        }

        let threshold = otsu_threshold(&img);
        assert!(threshold >= 40 && threshold < 220, "threshold {threshold} out of range");
    }

    #[test]
    fn clahe_preserves_dimensions() {
        let img = sheet_like_image();
        let out = clahe(&img, 2.0, 8, 8);
        assert_eq!(out.dimensions(), img.dimensions());
    }

    #[test]
    fn clahe_handles_tiny_images() {
        let img = GrayImage::from_pixel(3, 2, Luma([128]));
        let out = clahe(&img, 2.0, 8, 8);
        assert_eq!(out.dimensions(), (3, 2));
    }
}
