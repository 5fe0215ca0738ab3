//! Image Quality Analyzer
//!
//! Pixel-level heuristics that flag scans worth a second look, independent
//! of what the text says. Four detectors run in a fixed order and each adds
//! at most one warning:
//!
//! | Detector | Metric | Warns when |
//! |----------|--------|------------|
//! | Blur | variance of the 3x3 Laplacian | `< 20` |
//! | Compression | mean absolute horizontal gradient | `< 1.2` |
//! | Layout | Otsu ink ratio per quadrant | max `> 0.65` and min `< 0.05` |
//! | ELA | mean abs diff after JPEG q90 (4:2:0) round trip | `> 10.0` |
//!
//! Payloads that are not a decodable still image produce no warnings.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{GrayImage, ImageFormat, Luma, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ImageDecodeError;

pub const WARN_BLUR: &str = "Low detail/blur detected; possible scan or tampering";
pub const WARN_COMPRESSION: &str =
    "Strong compression artifacts; image quality may affect OCR/validation";
pub const WARN_LAYOUT: &str = "Unusual text layout distribution; verify template positioning";
pub const WARN_ELA: &str = "ELA indicates potential local edits or heavy recompression";

const PHASH_SIZE: usize = 16;
const PHASH_SAMPLE: usize = PHASH_SIZE * 4;

// ============================================================================
// Configuration and report
// ============================================================================

/// Detector thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyThresholds {
    pub min_laplacian_variance: f64,
    pub min_blockiness: f64,
    pub max_quadrant_ink: f64,
    pub min_quadrant_ink: f64,
    pub max_ela_score: f64,
    pub ela_jpeg_quality: u8,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            min_laplacian_variance: 20.0,
            min_blockiness: 1.2,
            max_quadrant_ink: 0.65,
            min_quadrant_ink: 0.05,
            max_ela_score: 10.0,
            ela_jpeg_quality: 90,
        }
    }
}

/// Raw detector metrics; `None` where a metric could not be computed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMetrics {
    pub width: u32,
    pub height: u32,
    pub laplacian_variance: f64,
    pub blockiness: Option<f64>,
    /// Top-left, top-right, bottom-left, bottom-right
    pub quadrant_ink: Option<[f64; 4]>,
    pub ela_score: Option<f64>,
}

/// Full analysis of one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageQualityReport {
    pub metrics: ImageMetrics,
    /// Detection order: blur, compression, layout, ELA
    pub warnings: Vec<String>,
    /// 256-bit DCT perceptual hash, hex encoded
    pub perceptual_hash: String,
}

// ============================================================================
// Analyzer
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct ImageQualityAnalyzer {
    thresholds: AnomalyThresholds,
}

impl ImageQualityAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_thresholds(thresholds: AnomalyThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &AnomalyThresholds {
        &self.thresholds
    }

    /// Ordered anomaly warnings; empty when the payload is not a still image
    pub fn analyze(&self, image_bytes: &[u8], file_name: Option<&str>) -> Vec<String> {
        match self.inspect(image_bytes, file_name) {
            Ok(report) => report.warnings,
            Err(e) => {
                debug!("Skipping image analysis: {}", e);
                Vec::new()
            }
        }
    }

    /// Decode the payload and run every detector
    pub fn inspect(
        &self,
        image_bytes: &[u8],
        file_name: Option<&str>,
    ) -> Result<ImageQualityReport, ImageDecodeError> {
        let rgb = decode_still_image(image_bytes, file_name)?;
        let gray = rgb_to_gray(&rgb);
        let t = &self.thresholds;

        let mut warnings = Vec::new();

        let laplacian_variance = laplacian_variance(&gray);
        if laplacian_variance < t.min_laplacian_variance {
            warnings.push(WARN_BLUR.to_string());
        }

        let blockiness = blockiness(&gray);
        if blockiness.is_some_and(|b| b < t.min_blockiness) {
            warnings.push(WARN_COMPRESSION.to_string());
        }

        let quadrant_ink = quadrant_ink_ratios(&gray);
        if let Some(ink) = quadrant_ink {
            let max = ink.iter().copied().fold(f64::MIN, f64::max);
            let min = ink.iter().copied().fold(f64::MAX, f64::min);
            if max > t.max_quadrant_ink && min < t.min_quadrant_ink {
                warnings.push(WARN_LAYOUT.to_string());
            }
        }

        let ela_score = ela_score(&rgb, t.ela_jpeg_quality);
        if ela_score.is_some_and(|s| s > t.max_ela_score) {
            warnings.push(WARN_ELA.to_string());
        }

        let metrics = ImageMetrics {
            width: rgb.width(),
            height: rgb.height(),
            laplacian_variance,
            blockiness,
            quadrant_ink,
            ela_score,
        };
        debug!(?metrics, warnings = warnings.len(), "image metrics computed");

        Ok(ImageQualityReport {
            metrics,
            warnings,
            perceptual_hash: perceptual_hash(&gray),
        })
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode a still image to RGB. Documents (PDF) are rejected up front.
pub fn decode_still_image(
    bytes: &[u8],
    file_name: Option<&str>,
) -> Result<RgbImage, ImageDecodeError> {
    let is_pdf_name = file_name.is_some_and(|n| n.to_lowercase().ends_with(".pdf"));
    if is_pdf_name || bytes.starts_with(b"%PDF") {
        return Err(ImageDecodeError::Unsupported("pdf".to_string()));
    }

    let img = image::load_from_memory(bytes)
        .map_err(|e| ImageDecodeError::Undecodable(e.to_string()))?;
    let rgb = img.to_rgb8();
    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(ImageDecodeError::Empty);
    }
    Ok(rgb)
}

// ============================================================================
// Metrics
// ============================================================================

/// RGB to 8-bit luma with BT.601 weights in 14-bit fixed point
/// (the same rounding the common vision libraries use).
pub fn rgb_to_gray(rgb: &RgbImage) -> GrayImage {
    const R: u32 = 4899;
    const G: u32 = 9617;
    const B: u32 = 1868;
    const ROUND: u32 = 1 << 13;

    let (w, h) = rgb.dimensions();
    let mut gray = GrayImage::new(w, h);
    for (x, y, p) in rgb.enumerate_pixels() {
        let [r, g, b] = p.0;
        let luma = (r as u32 * R + g as u32 * G + b as u32 * B + ROUND) >> 14;
        gray.put_pixel(x, y, Luma([luma.min(255) as u8]));
    }
    gray
}

/// Reflect-101 border index for a 1-pixel kernel radius
fn reflect101(i: i64, n: i64) -> i64 {
    if n == 1 {
        0
    } else if i < 0 {
        -i
    } else if i >= n {
        2 * n - 2 - i
    } else {
        i
    }
}

/// Population variance of the 3x3 Laplacian `[0,1,0; 1,-4,1; 0,1,0]`,
/// evaluated at every pixel with reflected borders. Low values mean little
/// fine detail.
pub fn laplacian_variance(img: &GrayImage) -> f64 {
    let (w, h) = (img.width() as i64, img.height() as i64);
    if w == 0 || h == 0 {
        return 0.0;
    }
    let px = |x: i64, y: i64| -> f64 {
        img.get_pixel(reflect101(x, w) as u32, reflect101(y, h) as u32).0[0] as f64
    };

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    for y in 0..h {
        for x in 0..w {
            let lap = px(x, y - 1) + px(x, y + 1) + px(x - 1, y) + px(x + 1, y) - 4.0 * px(x, y);
            sum += lap;
            sum_sq += lap * lap;
        }
    }

    let n = (w * h) as f64;
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}

/// Mean absolute difference between horizontally adjacent pixels.
/// `None` for images narrower than two pixels.
pub fn blockiness(img: &GrayImage) -> Option<f64> {
    let (w, h) = img.dimensions();
    if w < 2 || h == 0 {
        return None;
    }
    let mut total = 0u64;
    for y in 0..h {
        for x in 0..w - 1 {
            let a = img.get_pixel(x, y).0[0] as i32;
            let b = img.get_pixel(x + 1, y).0[0] as i32;
            total += (a - b).unsigned_abs() as u64;
        }
    }
    Some(total as f64 / ((w - 1) as u64 * h as u64) as f64)
}

/// Otsu's global threshold over a 256-bin histogram. Pixels strictly above
/// the returned value are background. Returns 0 when no split exists
/// (single-valued input).
pub fn otsu_threshold(histogram: &[u64; 256]) -> u8 {
    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return 0;
    }
    let scale = 1.0 / total as f64;
    let mu: f64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &c)| i as f64 * c as f64 * scale)
        .sum();

    let eps = f32::EPSILON as f64;
    let (mut q1, mut mu1) = (0.0f64, 0.0f64);
    let (mut max_sigma, mut max_val) = (0.0f64, 0usize);

    for (i, &count) in histogram.iter().enumerate() {
        let p_i = count as f64 * scale;
        mu1 *= q1;
        q1 += p_i;
        let q2 = 1.0 - q1;

        if q1.min(q2) < eps || q1.max(q2) > 1.0 - eps {
            continue;
        }

        mu1 = (mu1 + i as f64 * p_i) / q1;
        let mu2 = (mu - q1 * mu1) / q2;
        let sigma = q1 * q2 * (mu1 - mu2) * (mu1 - mu2);
        if sigma > max_sigma {
            max_sigma = sigma;
            max_val = i;
        }
    }
    max_val as u8
}

/// Fraction of dark pixels (at or below the region's Otsu threshold)
fn ink_ratio(img: &GrayImage, x0: u32, y0: u32, x1: u32, y1: u32) -> f64 {
    let mut histogram = [0u64; 256];
    for y in y0..y1 {
        for x in x0..x1 {
            histogram[img.get_pixel(x, y).0[0] as usize] += 1;
        }
    }
    let total: u64 = histogram.iter().sum();
    let threshold = otsu_threshold(&histogram) as usize;
    let dark: u64 = histogram[..=threshold].iter().sum();
    dark as f64 / total as f64
}

/// Ink ratio per quadrant. `None` when the image is too small to split.
pub fn quadrant_ink_ratios(img: &GrayImage) -> Option<[f64; 4]> {
    let (w, h) = img.dimensions();
    let (w2, h2) = (w / 2, h / 2);
    if w2 == 0 || h2 == 0 {
        return None;
    }
    Some([
        ink_ratio(img, 0, 0, w2, h2),
        ink_ratio(img, w2, 0, w, h2),
        ink_ratio(img, 0, h2, w2, h),
        ink_ratio(img, w2, h2, w, h),
    ])
}

/// Error-level analysis: re-encode as JPEG at `quality` with 4:2:0 chroma,
/// decode, and return the mean absolute per-channel difference against the
/// original. `None` if the round trip fails.
pub fn ela_score(rgb: &RgbImage, quality: u8) -> Option<f64> {
    let mut buf = Vec::new();
    {
        // JpegEncoder writes 4:4:4, so chroma is averaged here
        let subsampled = subsample_chroma(rgb);
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
        if let Err(e) = encoder.encode_image(&subsampled) {
            warn!("ELA re-encode failed: {}", e);
            return None;
        }
    }

    let recompressed = match image::load_from_memory_with_format(&buf, ImageFormat::Jpeg) {
        Ok(img) => img.to_rgb8(),
        Err(e) => {
            warn!("ELA decode failed: {}", e);
            return None;
        }
    };
    if recompressed.dimensions() != rgb.dimensions() {
        return None;
    }

    let total: u64 = rgb
        .as_raw()
        .iter()
        .zip(recompressed.as_raw())
        .map(|(&a, &b)| (a as i32 - b as i32).unsigned_abs() as u64)
        .sum();
    Some(total as f64 / rgb.as_raw().len() as f64)
}

/// Replace each pixel's chroma with the mean over its 2x2 cell (JFIF
/// full-range YCbCr), keeping per-pixel luma
fn subsample_chroma(rgb: &RgbImage) -> RgbImage {
    let (width, height) = rgb.dimensions();
    let ycc: Vec<[f64; 3]> = rgb.pixels().map(|p| to_ycbcr(p.0)).collect();
    let at = |x: u32, y: u32| ycc[y as usize * width as usize + x as usize];

    RgbImage::from_fn(width, height, |x, y| {
        let (x0, y0) = (x & !1, y & !1);
        let (mut cb, mut cr, mut n) = (0.0, 0.0, 0.0);
        for cy in y0..(y0 + 2).min(height) {
            for cx in x0..(x0 + 2).min(width) {
                let [_, b, r] = at(cx, cy);
                cb += b;
                cr += r;
                n += 1.0;
            }
        }
        Rgb(from_ycbcr(at(x, y)[0], cb / n, cr / n))
    })
}

fn to_ycbcr([r, g, b]: [u8; 3]) -> [f64; 3] {
    let (r, g, b) = (r as f64, g as f64, b as f64);
    [
        0.299 * r + 0.587 * g + 0.114 * b,
        -0.168736 * r - 0.331264 * g + 0.5 * b + 128.0,
        0.5 * r - 0.418688 * g - 0.081312 * b + 128.0,
    ]
}

fn from_ycbcr(y: f64, cb: f64, cr: f64) -> [u8; 3] {
    let (cb, cr) = (cb - 128.0, cr - 128.0);
    let channel = |v: f64| v.round().clamp(0.0, 255.0) as u8;
    [
        channel(y + 1.402 * cr),
        channel(y - 0.344136 * cb - 0.714136 * cr),
        channel(y + 1.772 * cb),
    ]
}

/// Orthonormal 1-D DCT-II of `input`, returning the first `keep` coefficients
fn dct_1d(input: &[f64], keep: usize) -> Vec<f64> {
    let n = input.len();
    let nf = n as f64;
    (0..keep)
        .map(|k| {
            let scale = if k == 0 {
                (1.0 / nf).sqrt()
            } else {
                (2.0 / nf).sqrt()
            };
            let sum: f64 = input
                .iter()
                .enumerate()
                .map(|(i, &v)| {
                    v * (std::f64::consts::PI * (2 * i + 1) as f64 * k as f64 / (2.0 * nf)).cos()
                })
                .sum();
            scale * sum
        })
        .collect()
}

/// Perceptual hash: bicubic downsample to 64x64, 2-D DCT, keep the 16x16
/// low-frequency block and set one bit per coefficient above its median.
pub fn perceptual_hash(img: &GrayImage) -> String {
    let small = image::imageops::resize(
        img,
        PHASH_SAMPLE as u32,
        PHASH_SAMPLE as u32,
        FilterType::CatmullRom,
    );

    // Row transform, keeping only the low-frequency columns
    let rows: Vec<Vec<f64>> = (0..PHASH_SAMPLE)
        .map(|y| {
            let row: Vec<f64> = (0..PHASH_SAMPLE)
                .map(|x| small.get_pixel(x as u32, y as u32).0[0] as f64)
                .collect();
            dct_1d(&row, PHASH_SIZE)
        })
        .collect();

    // Column transform of the retained block
    let mut low = vec![0.0f64; PHASH_SIZE * PHASH_SIZE];
    for u in 0..PHASH_SIZE {
        let column: Vec<f64> = rows.iter().map(|r| r[u]).collect();
        for (v, coeff) in dct_1d(&column, PHASH_SIZE).into_iter().enumerate() {
            low[v * PHASH_SIZE + u] = coeff;
        }
    }

    let mut sorted = low.clone();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    let median = (sorted[mid - 1] + sorted[mid]) / 2.0;

    let mut bytes = vec![0u8; low.len() / 8];
    for (i, &c) in low.iter().enumerate() {
        if c > median {
            bytes[i / 8] |= 0x80 >> (i % 8);
        }
    }
    hex::encode(bytes)
}
