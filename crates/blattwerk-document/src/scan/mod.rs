// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scan module: OCR over rasterized pages.

pub mod ocr;

#[cfg(feature = "ocr")]
pub mod ocrs_engine;

pub use ocr::{OcrEngine, OcrWord, TesseractOcr, regions_from_words};
