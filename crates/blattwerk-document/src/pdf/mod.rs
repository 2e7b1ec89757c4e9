// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF module: text-layer extraction and replacement, and image-page assembly.

mod content;
pub mod font;
pub mod reader;
pub mod writer;

use std::path::Path;

use blattwerk_core::TextRegion;
use blattwerk_core::error::Result;

pub use font::UnicodeFont;
pub use reader::LopdfEngine;
pub use writer::PdfAssembler;

/// A document opened for in-place text translation.
///
/// Implementations hold their own handle to the source file; regions handed
/// back to [`replace_region_text`](Self::replace_region_text) must come from
/// [`structured_spans`](Self::structured_spans) on the same engine.
pub trait StructuredEngine: Send {
    fn page_count(&self) -> usize;

    /// Embedded text runs of one page, in content-stream order.
    fn structured_spans(&self, page_index: usize) -> Result<Vec<TextRegion>>;

    /// Replace one span's text, keeping its font, size, colour, and position.
    fn replace_region_text(&mut self, region: &TextRegion, translated: &str) -> Result<()>;

    fn save(&mut self, out_path: &Path) -> Result<()>;
}
