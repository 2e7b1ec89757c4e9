// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// OCR engines for the visual path.
//
// The default engine drives the `tesseract` CLI in TSV mode, which reports a
// bounding box and a recognition confidence for every word. The confidence
// feeds the noise filter applied before translation.

use std::path::PathBuf;
use std::process::Command;

use blattwerk_core::error::{BlattwerkError, Result};
use blattwerk_core::{BoundingBox, TextRegion};
use image::RgbImage;
use tracing::{debug, instrument};

/// One recognised word in pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrWord {
    pub text: String,
    pub bbox: BoundingBox,
    /// Recognition certainty, 0–100.
    pub confidence: f32,
}

/// Text recognition over a rendered page.
pub trait OcrEngine: Send + Sync {
    /// Recognise words in `image`. `language_hints` are engine language codes
    /// such as `eng` and `vie`.
    fn recognize(&self, image: &RgbImage, language_hints: &[String]) -> Result<Vec<OcrWord>>;
}

/// Turn OCR words into page regions, dropping noise.
///
/// A word survives only with confidence above `min_confidence`, box height
/// above `min_box_height`, and non-blank text.
pub fn regions_from_words(
    page_index: usize,
    words: Vec<OcrWord>,
    min_confidence: f32,
    min_box_height: f32,
) -> Vec<TextRegion> {
    let total = words.len();
    let regions: Vec<TextRegion> = words
        .into_iter()
        .map(|word| {
            let mut region = TextRegion::new(page_index, word.bbox, word.text.trim());
            region.confidence = Some(word.confidence);
            region
        })
        .filter(|region| region.passes_ocr_filter(min_confidence, min_box_height))
        .collect();
    debug!(page = page_index, total, kept = regions.len(), "OCR words filtered");
    regions
}

/// [`OcrEngine`] backed by the `tesseract` command-line program.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    program: PathBuf,
}

impl TesseractOcr {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

impl OcrEngine for TesseractOcr {
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    fn recognize(&self, image: &RgbImage, language_hints: &[String]) -> Result<Vec<OcrWord>> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("page.png");
        image
            .save(&input)
            .map_err(|err| BlattwerkError::ImageError(format!("failed to stage page for OCR: {err}")))?;

        let mut command = Command::new(&self.program);
        command.arg(&input).arg("stdout");
        if !language_hints.is_empty() {
            command.arg("-l").arg(language_hints.join("+"));
        }
        command.arg("tsv");

        let output = command.output().map_err(|err| {
            BlattwerkError::OcrError(format!("failed to launch {}: {err}", self.program.display()))
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BlattwerkError::OcrError(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }

        let words = parse_tsv(&String::from_utf8_lossy(&output.stdout));
        debug!(words = words.len(), "Tesseract recognition complete");
        Ok(words)
    }
}

/// Parse Tesseract TSV output into word-level results.
///
/// Columns: level, page_num, block_num, par_num, line_num, word_num, left,
/// top, width, height, conf, text. Only level-5 (word) rows are kept.
pub fn parse_tsv(tsv: &str) -> Vec<OcrWord> {
    tsv.lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() < 12 || cols[0] != "5" {
                return None;
            }
            let num = |i: usize| cols[i].trim().parse::<f32>().ok();
            let text = cols[11..].join("\t");
            Some(OcrWord {
                text: text.trim().to_string(),
                bbox: BoundingBox::new(num(6)?, num(7)?, num(8)?, num(9)?),
                confidence: num(10)?,
            })
        })
        .collect()
}
