//! Aspect-ratio-aware image normalization.
//!
//! [`Fitter`] turns arbitrary decoder-supported input into a JPEG of the
//! configured target size, choosing between a non-uniform stretch and an
//! aspect-preserving fit centered on a black canvas. The choice hinges on
//! how far the source aspect ratio deviates from the target:
//!
//! ```text
//! diff = |orig_ratio - target_ratio| / min(orig_ratio, target_ratio)
//! diff <= fit_threshold  →  stretch (Lanczos3 resize_exact)
//! diff >  fit_threshold  →  fit within target, letterbox with black
//! ```
//!
//! Stateless apart from read-only configuration; safe to share across
//! tasks.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, RgbImage, imageops};
use tracing::debug;

use crate::{ArtgateError, Result};

/// JPEG quality for fitted output.
const JPEG_QUALITY: u8 = 95;

/// Target geometry and the stretch-vs-pad decision threshold.
#[derive(Debug, Clone, Copy)]
pub struct FitConfig {
    pub width: u32,
    pub height: u32,
    /// Relative aspect-ratio deviation below which the image is stretched
    /// instead of letterboxed.
    pub fit_threshold: f64,
}

/// Stateless image normalizer.
#[derive(Debug, Clone)]
pub struct Fitter {
    config: FitConfig,
}

impl Fitter {
    pub fn new(config: FitConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> FitConfig {
        self.config
    }

    /// Normalize raw image bytes to the target size as JPEG.
    ///
    /// Returns `(fitted, original)` where `original` is a JPEG re-encode of
    /// the undecimated source, produced only when `want_original` is set.
    /// A source already at the target size is re-encoded once and the same
    /// bytes are returned for both outputs.
    ///
    /// Undecodable input fails with no partial output.
    pub fn process(&self, data: &[u8], want_original: bool) -> Result<(Vec<u8>, Option<Vec<u8>>)> {
        let src = image::load_from_memory(data)?;
        let (orig_w, orig_h) = src.dimensions();
        let FitConfig { width, height, .. } = self.config;

        if orig_w == width && orig_h == height {
            debug!(width, height, "image already at target size");
            let encoded = encode_jpeg(&src, JPEG_QUALITY)?;
            return Ok((encoded.clone(), Some(encoded)));
        }

        let orig_ratio = f64::from(orig_w) / f64::from(orig_h);
        let target_ratio = f64::from(width) / f64::from(height);
        let diff = (orig_ratio - target_ratio).abs() / orig_ratio.min(target_ratio);

        let result = if diff <= self.config.fit_threshold {
            debug!(diff, threshold = self.config.fit_threshold, "stretch resize");
            src.resize_exact(width, height, FilterType::Lanczos3)
        } else {
            debug!(diff, threshold = self.config.fit_threshold, "fit and pad");
            let fitted = src.resize(width, height, FilterType::Lanczos3);
            pad_onto_black(&fitted, width, height)
        };

        let fitted = encode_jpeg(&result, JPEG_QUALITY)?;
        let original = if want_original {
            Some(encode_jpeg(&src, JPEG_QUALITY)?)
        } else {
            None
        };

        Ok((fitted, original))
    }
}

/// Center `src` on an opaque black canvas of `width`×`height`.
fn pad_onto_black(src: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    // RgbImage::new zero-fills, which is opaque black in RGB.
    let mut canvas = RgbImage::new(width, height);
    let (src_w, src_h) = src.dimensions();
    let x = i64::from((width - src_w.min(width)) / 2);
    let y = i64::from((height - src_h.min(height)) / 2);
    imageops::overlay(&mut canvas, &src.to_rgb8(), x, y);
    DynamicImage::ImageRgb8(canvas)
}

/// Encode to JPEG at the given quality.
fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut buf), quality);
    img.to_rgb8()
        .write_with_encoder(encoder)
        .map_err(|e| ArtgateError::Image(e.to_string()))?;
    Ok(buf)
}

/// Render the flat black placeholder served during black-image sleep
/// windows.
pub fn black_jpeg(width: u32, height: u32) -> Result<Vec<u8>> {
    let canvas = DynamicImage::ImageRgb8(RgbImage::new(width, height));
    encode_jpeg(&canvas, 100)
}
