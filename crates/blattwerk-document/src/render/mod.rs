// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Render module. Visual page reconstruction: erase each OCR region and draw
// its translation, wrapped and sized to fit the original box.

mod bitmap;
pub mod fit;
pub mod page;

use std::path::Path;

use ab_glyph::{Font, FontVec, PxScale, ScaleFont};
use blattwerk_core::error::{BlattwerkError, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_text_mut;
use tracing::{debug, info, warn};

pub use fit::{FitOutcome, FitParams, fit_text};
pub use page::reconstruct_visual_page;

/// Outline fonts tried when none is configured or the configured one fails.
pub(crate) const SYSTEM_FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/noto/NotoSans-Regular.ttf",
    "/usr/share/fonts/noto/NotoSans-Regular.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Measures and draws single lines of text at a pixel size.
pub trait TextMeasure: Send + Sync {
    /// Advance width of `text` at `size`.
    fn text_width(&self, text: &str, size: f32) -> f32;

    /// Vertical space one line occupies at `size` (ascent minus descent).
    fn line_height(&self, size: f32) -> f32;

    /// Draw `text` with its line box's top-left corner at `(x, y)`.
    fn draw_text(&self, canvas: &mut RgbImage, x: i32, y: i32, size: f32, color: Rgb<u8>, text: &str);
}

/// Font used for re-rendered text.
pub enum RenderFont {
    Outline(FontVec),
    /// Built-in 5x7 bitmap face; always available.
    Bitmap,
}

impl RenderFont {
    /// Resolve a font: the configured file, then common system fonts, then
    /// the built-in bitmap face. Never fails.
    pub fn load(configured: Option<&Path>) -> Self {
        if let Some(path) = configured {
            match Self::from_file(path) {
                Ok(font) => {
                    info!("Loaded font: {}", path.display());
                    return font;
                }
                Err(err) => warn!(error = %err, "Configured font unusable; trying system fonts"),
            }
        }

        for path in SYSTEM_FONT_PATHS {
            if let Ok(font) = Self::from_file(Path::new(path)) {
                info!("Loaded system font: {}", path);
                return font;
            }
        }

        warn!("No outline font found; using the built-in bitmap font");
        Self::Bitmap
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_bytes(data).map_err(|_| {
            BlattwerkError::ImageError(format!("failed to parse font file: {}", path.display()))
        })
    }

    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let font = FontVec::try_from_vec(data)
            .map_err(|err| BlattwerkError::ImageError(format!("invalid font data: {err}")))?;
        debug!(glyphs = font.glyph_count(), "Outline font parsed");
        Ok(Self::Outline(font))
    }
}

impl TextMeasure for RenderFont {
    fn text_width(&self, text: &str, size: f32) -> f32 {
        match self {
            Self::Outline(font) => {
                let scaled = font.as_scaled(PxScale::from(size));
                text.chars()
                    .map(|ch| scaled.h_advance(scaled.glyph_id(ch)))
                    .sum()
            }
            Self::Bitmap => bitmap::text_width(text, size),
        }
    }

    fn line_height(&self, size: f32) -> f32 {
        match self {
            Self::Outline(font) => {
                let scaled = font.as_scaled(PxScale::from(size));
                scaled.ascent() - scaled.descent()
            }
            Self::Bitmap => bitmap::line_height(size),
        }
    }

    fn draw_text(&self, canvas: &mut RgbImage, x: i32, y: i32, size: f32, color: Rgb<u8>, text: &str) {
        match self {
            Self::Outline(font) => draw_text_mut(canvas, color, x, y, PxScale::from(size), font, text),
            Self::Bitmap => bitmap::draw_text(canvas, x, y, size, color, text),
        }
    }
}
