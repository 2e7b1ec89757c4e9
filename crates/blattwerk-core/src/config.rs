// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BlattwerkError, Result};

/// Tunables for a translation run.
///
/// Every field has a default, so a config file only needs the keys it
/// overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Executable used for OCR on the visual path.
    pub ocr_engine_path: PathBuf,
    /// Recognition languages passed to the OCR engine (`eng`, `vie`, ...).
    pub ocr_languages: Vec<String>,
    /// Executable used to rasterize PDF pages.
    pub rasterizer_path: PathBuf,
    /// TrueType/OpenType font for re-rendered text. Falls back to system
    /// fonts, then a built-in bitmap font.
    pub font_path: Option<PathBuf>,
    /// JSON file backing the translation cache.
    pub cache_file_path: PathBuf,
    /// Maximum distinct strings per translation request.
    pub chunk_size: usize,
    /// Smallest font size tried before truncating.
    pub min_font_size: u32,
    /// Starting font size as a fraction of the box height.
    pub initial_font_ratio: f32,
    /// Characters kept when text is truncated to fit.
    pub truncate_chars: usize,
    /// Pause after a failed chunk before the next one.
    pub chunk_backoff_ms: u64,
    /// Deadline for one translation chunk.
    pub chunk_timeout_ms: u64,
    /// Deadline for one visual page (raster, OCR, translate, render).
    pub page_timeout_ms: u64,
    /// Worker count for the visual path; `None` means one per spare core.
    pub pool_size: Option<usize>,
    /// Base URL of the translation endpoint.
    pub translation_endpoint: String,
    /// HTTP request timeout for the translation client.
    pub request_timeout_ms: u64,
    /// OCR regions at or below this confidence are discarded.
    pub min_confidence: f32,
    /// OCR regions at or below this height (pixels) are discarded.
    pub min_box_height: f32,
    /// Height of the preview thumbnail emitted per page.
    pub preview_max_height: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ocr_engine_path: PathBuf::from("tesseract"),
            ocr_languages: vec!["eng".into(), "vie".into()],
            rasterizer_path: PathBuf::from("pdftoppm"),
            font_path: None,
            cache_file_path: PathBuf::from("translation_cache.json"),
            chunk_size: 100,
            min_font_size: 5,
            initial_font_ratio: 0.9,
            truncate_chars: 20,
            chunk_backoff_ms: 2000,
            chunk_timeout_ms: 60_000,
            page_timeout_ms: 300_000,
            pool_size: None,
            translation_endpoint: "https://translate.googleapis.com/translate_a/single".into(),
            request_timeout_ms: 30_000,
            min_confidence: 60.0,
            min_box_height: 1.0,
            preview_max_height: 400,
        }
    }
}

impl PipelineConfig {
    /// Read a JSON config file, falling back to defaults when it is absent.
    pub fn load(path: &Path) -> Result<Self> {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(BlattwerkError::Config("chunk_size must be at least 1".into()));
        }
        if self.min_font_size == 0 {
            return Err(BlattwerkError::Config("min_font_size must be at least 1".into()));
        }
        if !(self.initial_font_ratio > 0.0 && self.initial_font_ratio <= 1.0) {
            return Err(BlattwerkError::Config(format!(
                "initial_font_ratio must be in (0, 1], got {}",
                self.initial_font_ratio
            )));
        }
        if self.pool_size == Some(0) {
            return Err(BlattwerkError::Config("pool_size must be at least 1".into()));
        }
        if self.ocr_languages.is_empty() {
            return Err(BlattwerkError::Config("ocr_languages must not be empty".into()));
        }
        Ok(())
    }

    /// Concurrency for the visual path: configured value, else cores - 1.
    pub fn effective_pool_size(&self) -> usize {
        self.pool_size
            .unwrap_or_else(|| num_cpus::get().saturating_sub(1))
            .max(1)
    }

    pub fn chunk_backoff(&self) -> Duration {
        Duration::from_millis(self.chunk_backoff_ms)
    }

    pub fn chunk_timeout(&self) -> Duration {
        Duration::from_millis(self.chunk_timeout_ms)
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_millis(self.page_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
