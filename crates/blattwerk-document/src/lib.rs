// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// blattwerk-document: Document access for the Blattwerk translator.
//
// Provides the structured text-layer engine (read spans, replace text in
// place, save), page rasterization, OCR, visual page reconstruction with
// font-fit wrapping, and image-to-PDF assembly.

pub mod image;
pub mod pdf;
pub mod raster;
pub mod render;
pub mod scan;

pub use self::image::processor::preview_thumbnail;
pub use pdf::reader::LopdfEngine;
pub use pdf::writer::PdfAssembler;
pub use pdf::StructuredEngine;
pub use pdf::font::UnicodeFont;
pub use raster::{PageRasterizer, PdftoppmRasterizer};
pub use render::{FitParams, RenderFont, TextMeasure};
pub use scan::ocr::{OcrEngine, OcrWord, TesseractOcr};

#[cfg(feature = "ocr")]
pub use scan::ocrs_engine::OcrsEngine;
