// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page rasterization for the visual path.

use std::path::{Path, PathBuf};
use std::process::Command;

use blattwerk_core::error::{BlattwerkError, Result};
use image::RgbImage;
use tracing::{debug, instrument};

use crate::pdf::{LopdfEngine, StructuredEngine};

/// Renders document pages to RGB images.
///
/// Each call opens its own handle to the source; implementations share no
/// state between pages, so one rasterizer can serve many workers.
pub trait PageRasterizer: Send + Sync {
    fn page_count(&self, source: &Path) -> Result<usize>;

    fn render_page(&self, source: &Path, page_index: usize, dpi: u32) -> Result<RgbImage>;
}

/// Rasterizes with poppler's `pdftoppm`.
#[derive(Debug, Clone)]
pub struct PdftoppmRasterizer {
    program: PathBuf,
}

impl PdftoppmRasterizer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for PdftoppmRasterizer {
    fn default() -> Self {
        Self::new("pdftoppm")
    }
}

impl PageRasterizer for PdftoppmRasterizer {
    fn page_count(&self, source: &Path) -> Result<usize> {
        Ok(LopdfEngine::open(source)?.page_count())
    }

    #[instrument(skip(self), fields(source = %source.display()))]
    fn render_page(&self, source: &Path, page_index: usize, dpi: u32) -> Result<RgbImage> {
        let dir = tempfile::tempdir()?;
        let prefix = dir.path().join("page");
        // pdftoppm numbers pages from 1.
        let page_number = (page_index + 1).to_string();

        let output = Command::new(&self.program)
            .arg("-r")
            .arg(dpi.to_string())
            .arg("-f")
            .arg(&page_number)
            .arg("-l")
            .arg(&page_number)
            .arg("-singlefile")
            .arg("-png")
            .arg(source)
            .arg(&prefix)
            .output()
            .map_err(|err| {
                BlattwerkError::RasterError(format!(
                    "failed to launch {}: {err}",
                    self.program.display()
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BlattwerkError::RasterError(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }

        let png = prefix.with_extension("png");
        let image = image::open(&png)
            .map_err(|err| BlattwerkError::RasterError(format!("unreadable page image: {err}")))?
            .to_rgb8();
        debug!(page = page_index, width = image.width(), height = image.height(), "Page rasterized");
        Ok(image)
    }
}
