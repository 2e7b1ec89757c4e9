// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Blattwerk translation pipeline.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BlattwerkError, Result};

/// Unique identifier for a translation run (used as a tracing field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which extraction/reconstruction strategy a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationMode {
    /// Operate on the document's embedded text layer.
    Structured,
    /// Rasterize pages and locate text with OCR (scanned documents).
    Visual,
}

impl TranslationMode {
    /// Suffix appended to the input basename when naming the output file.
    pub fn output_suffix(&self) -> &'static str {
        match self {
            Self::Structured => "translated_structured",
            Self::Visual => "translated_visual",
        }
    }
}

impl std::str::FromStr for TranslationMode {
    type Err = BlattwerkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "structured" => Ok(Self::Structured),
            "visual" | "ocr" => Ok(Self::Visual),
            other => Err(BlattwerkError::Config(format!(
                "unknown mode '{other}' (expected 'structured' or 'visual')"
            ))),
        }
    }
}

/// Rasterization quality presets for the visual path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RasterQuality {
    /// 150 DPI. Quickest, weakest OCR.
    Fast,
    /// 200 DPI.
    #[default]
    Balanced,
    /// 300 DPI. Best OCR accuracy, slowest.
    High,
}

impl RasterQuality {
    pub fn dpi(&self) -> u32 {
        match self {
            Self::Fast => 150,
            Self::Balanced => 200,
            Self::High => 300,
        }
    }

    /// Map a DPI value back onto one of the fixed presets.
    pub fn from_dpi(dpi: u32) -> Result<Self> {
        match dpi {
            150 => Ok(Self::Fast),
            200 => Ok(Self::Balanced),
            300 => Ok(Self::High),
            other => Err(BlattwerkError::Config(format!(
                "unsupported DPI {other} (choose 150, 200, or 300)"
            ))),
        }
    }
}

/// Target languages offered by default, with display names.
pub const KNOWN_LANGUAGES: &[(&str, &str)] = &[
    ("vi", "Vietnamese"),
    ("en", "English"),
    ("ja", "Japanese"),
    ("ko", "Korean"),
    ("zh-cn", "Chinese (Simplified)"),
];

/// Short target-language code such as `vi` or `zh-cn`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetLanguage(String);

impl TargetLanguage {
    /// Validate and normalise a language code.
    ///
    /// Codes are lowercased; only ASCII letters and `-` are accepted.
    pub fn parse(code: &str) -> Result<Self> {
        let code = code.trim().to_ascii_lowercase();
        let valid = !code.is_empty()
            && code.len() <= 12
            && code.chars().all(|c| c.is_ascii_lowercase() || c == '-')
            && !code.starts_with('-')
            && !code.ends_with('-');
        if !valid {
            return Err(BlattwerkError::Config(format!(
                "'{code}' is not a language code (examples: vi, en, ja, ko, zh-cn)"
            )));
        }
        Ok(Self(code))
    }

    pub fn code(&self) -> &str {
        &self.0
    }

    /// Human-readable name for the well-known codes.
    pub fn display_name(&self) -> Option<&'static str> {
        KNOWN_LANGUAGES
            .iter()
            .find(|(code, _)| *code == self.0)
            .map(|(_, name)| *name)
    }
}

impl std::fmt::Display for TargetLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Axis-aligned rectangle in page (structured) or pixel (visual) space,
/// with the origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }
}

/// 8-bit sRGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RgbColor {
    pub const BLACK: Self = Self { r: 0, g: 0, b: 0 };
    pub const WHITE: Self = Self {
        r: 255,
        g: 255,
        b: 255,
    };

    /// Build from PDF-style unit components (0.0..=1.0).
    pub fn from_unit(r: f32, g: f32, b: f32) -> Self {
        let to_byte = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        Self {
            r: to_byte(r),
            g: to_byte(g),
            b: to_byte(b),
        }
    }

    /// Build from a CMYK quadruple (0.0..=1.0) using the naive conversion.
    pub fn from_cmyk(c: f32, m: f32, y: f32, k: f32) -> Self {
        let k = k.clamp(0.0, 1.0);
        Self::from_unit(
            (1.0 - c.clamp(0.0, 1.0)) * (1.0 - k),
            (1.0 - m.clamp(0.0, 1.0)) * (1.0 - k),
            (1.0 - y.clamp(0.0, 1.0)) * (1.0 - k),
        )
    }
}

/// A rectangular area of a page holding one run of source text.
///
/// Immutable once produced by an extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRegion {
    pub page_index: usize,
    pub bbox: BoundingBox,
    pub source_text: String,
    pub font_name: Option<String>,
    pub font_size: Option<f32>,
    pub color: Option<RgbColor>,
    /// Recognition certainty (0–100); only set for OCR-derived regions.
    pub confidence: Option<f32>,
    /// Index of the content-stream operation the span was read from
    /// (structured regions only).
    pub anchor: Option<usize>,
}

impl TextRegion {
    /// A bare region with no style metadata.
    pub fn new(page_index: usize, bbox: BoundingBox, source_text: impl Into<String>) -> Self {
        Self {
            page_index,
            bbox,
            source_text: source_text.into(),
            font_name: None,
            font_size: None,
            color: None,
            confidence: None,
            anchor: None,
        }
    }

    /// Cache key: the exact source text with surrounding whitespace removed.
    pub fn key(&self) -> &str {
        self.source_text.trim()
    }

    /// OCR noise filter: rejects empty text, low-confidence regions, and
    /// boxes too thin to hold a glyph.
    pub fn passes_ocr_filter(&self, min_confidence: f32, min_box_height: f32) -> bool {
        if self.key().is_empty() || self.bbox.height <= min_box_height {
            return false;
        }
        match self.confidence {
            Some(confidence) => confidence > min_confidence,
            None => true,
        }
    }
}

/// A region paired with the text that should replace it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslatedRegion {
    pub region: TextRegion,
    pub translated_text: String,
}

/// The unit of reconstruction and of worker-pool task granularity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub index: usize,
    pub regions: Vec<TextRegion>,
}

/// An input document for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub source_path: PathBuf,
    pub output_path: PathBuf,
    pub pages: Vec<Page>,
}

impl Document {
    pub fn new(source_path: impl Into<PathBuf>, mode: TranslationMode) -> Self {
        let source_path = source_path.into();
        let output_path = output_path_for(&source_path, mode);
        Self {
            source_path,
            output_path,
            pages: Vec::new(),
        }
    }

    /// Every region of every page, in page order.
    pub fn regions(&self) -> impl Iterator<Item = &TextRegion> {
        self.pages.iter().flat_map(|page| page.regions.iter())
    }
}

/// Derive `<dir>/<basename>_<mode-suffix>.<ext>` beside the input file.
pub fn output_path_for(input: &Path, mode: TranslationMode) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    let ext = input
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "pdf".to_string());
    input.with_file_name(format!("{stem}_{}.{ext}", mode.output_suffix()))
}

/// Throughput snapshot sent to the presentation layer after each page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunStats {
    pub pages_done: usize,
    pub total_pages: usize,
    pub elapsed: Duration,
    /// `None` until at least one page has completed.
    pub estimated_remaining: Option<Duration>,
}

impl RunStats {
    /// Linear estimate: average time per finished page times pages left.
    pub fn compute(pages_done: usize, total_pages: usize, elapsed: Duration) -> Self {
        let estimated_remaining = (pages_done > 0).then(|| {
            let remaining = total_pages.saturating_sub(pages_done) as u32;
            (elapsed / pages_done as u32) * remaining
        });
        Self {
            pages_done,
            total_pages,
            elapsed,
            estimated_remaining,
        }
    }
}
