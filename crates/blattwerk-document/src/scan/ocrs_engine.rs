// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-process OCR using the `ocrs` crate, a pure-Rust engine backed by neural
// network models executed via `rten`.
//
// # Feature Gate
//
// Only available when the `ocr` feature is enabled.
//
// # Model Setup
//
// The engine needs `text-detection.rten` and `text-recognition.rten`. Running
// `ocrs-cli` once downloads them to `$XDG_CACHE_HOME/ocrs` (typically
// `~/.cache/ocrs`).
//
// `ocrs` reports no per-line confidence, so every line it returns is scored
// 100 and only the box-height filter applies.

use std::path::{Path, PathBuf};

use blattwerk_core::BoundingBox;
use blattwerk_core::error::{BlattwerkError, Result};
use image::RgbImage;
use ocrs::{ImageSource, OcrEngine as OcrsCore, OcrEngineParams, TextItem};
use rten::Model;
use tracing::{debug, info, instrument};

use super::ocr::{OcrEngine, OcrWord};

const DETECTION_MODEL_FILENAME: &str = "text-detection.rten";
const RECOGNITION_MODEL_FILENAME: &str = "text-recognition.rten";

/// Default model directory: `$XDG_CACHE_HOME/ocrs`, else `~/.cache/ocrs`.
pub fn default_model_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
        PathBuf::from(xdg).join("ocrs")
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".cache").join("ocrs")
    } else {
        PathBuf::from("ocrs-models")
    }
}

/// [`OcrEngine`] running `ocrs` models in-process.
pub struct OcrsEngine {
    engine: OcrsCore,
}

impl OcrsEngine {
    /// Load both models from `dir`. Model loading is the expensive step;
    /// build once and share across pages.
    #[instrument(skip_all, fields(dir = %dir.as_ref().display()))]
    pub fn from_model_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let load = |name: &str| {
            let path = dir.join(name);
            if !path.exists() {
                return Err(BlattwerkError::OcrError(format!(
                    "model not found at {}; run `ocrs-cli` once to download models",
                    path.display()
                )));
            }
            Model::load_file(&path).map_err(|err| {
                BlattwerkError::OcrError(format!("failed to load {}: {err}", path.display()))
            })
        };

        info!("Loading OCR models");
        let engine = OcrsCore::new(OcrEngineParams {
            detection_model: Some(load(DETECTION_MODEL_FILENAME)?),
            recognition_model: Some(load(RECOGNITION_MODEL_FILENAME)?),
            ..Default::default()
        })
        .map_err(|err| BlattwerkError::OcrError(format!("failed to initialise OCR engine: {err}")))?;

        Ok(Self { engine })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::from_model_dir(default_model_dir())
    }
}

impl OcrEngine for OcrsEngine {
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    fn recognize(&self, image: &RgbImage, _language_hints: &[String]) -> Result<Vec<OcrWord>> {
        let (width, height) = image.dimensions();
        let source = ImageSource::from_bytes(image.as_raw(), (width, height)).map_err(|err| {
            BlattwerkError::OcrError(format!("failed to create image source ({width}x{height}): {err}"))
        })?;
        let input = self
            .engine
            .prepare_input(source)
            .map_err(|err| BlattwerkError::OcrError(format!("OCR preprocessing failed: {err}")))?;

        let word_rects = self
            .engine
            .detect_words(&input)
            .map_err(|err| BlattwerkError::OcrError(format!("word detection failed: {err}")))?;
        let line_rects = self.engine.find_text_lines(&input, &word_rects);
        let lines = self
            .engine
            .recognize_text(&input, &line_rects)
            .map_err(|err| BlattwerkError::OcrError(format!("line recognition failed: {err}")))?;

        let words: Vec<OcrWord> = lines
            .iter()
            .flatten()
            .filter_map(|line| {
                let text = line.to_string();
                if text.trim().is_empty() {
                    return None;
                }
                let rect = line.bounding_rect();
                Some(OcrWord {
                    text,
                    bbox: BoundingBox::new(
                        rect.left() as f32,
                        rect.top() as f32,
                        rect.width() as f32,
                        rect.height() as f32,
                    ),
                    confidence: 100.0,
                })
            })
            .collect();
        debug!(lines = words.len(), "ocrs recognition complete");
        Ok(words)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_models_are_reported() {
        let err = OcrsEngine::from_model_dir("/nonexistent/path/ocr-models").err().unwrap();
        assert!(err.to_string().contains("model not found"));
    }
}
