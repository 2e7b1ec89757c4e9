// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Blattwerk.

use thiserror::Error;

/// Top-level error type for all Blattwerk operations.
#[derive(Debug, Error)]
pub enum BlattwerkError {
    // -- Document errors --
    #[error("unsupported document type: {0}")]
    UnsupportedDocument(String),

    #[error("PDF operation failed: {0}")]
    PdfError(String),

    #[error("image processing failed: {0}")]
    ImageError(String),

    #[error("page rasterization failed: {0}")]
    RasterError(String),

    #[error("OCR failed: {0}")]
    OcrError(String),

    // -- Translation errors --
    #[error("translation service failed: {0}")]
    Translation(String),

    #[error("translation cache store error: {0}")]
    CacheStore(String),

    // -- Pipeline --
    /// `page` is the 0-based page index; messages show it 1-based.
    #[error("page {} failed: {reason}", .page + 1)]
    PageFailed { page: usize, reason: String },

    #[error("all {pages} pages failed; first error: {first_error}")]
    AllPagesFailed { pages: usize, first_error: String },

    #[error("operation timed out: {0}")]
    TimedOut(String),

    #[error("run cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    Config(String),

    // -- Storage / persistence --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BlattwerkError {
    /// Whether this fault is fatal to the whole run rather than absorbed by
    /// the component that raised it.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::UnsupportedDocument(_)
                | Self::PdfError(_)
                | Self::Config(_)
                | Self::AllPagesFailed { .. }
                | Self::Cancelled
        )
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BlattwerkError>;
