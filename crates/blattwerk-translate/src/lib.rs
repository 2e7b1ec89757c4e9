// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// blattwerk-translate: Translation for the Blattwerk pipeline.
//
// A durable source→translation cache shared by every page of a run, a batch
// translator that deduplicates and chunks requests against it, and the
// remote translation-service client.

pub mod batch;
pub mod cache;
pub mod service;

pub use batch::{BatchReport, BatchTranslator, ChunkProgress};
pub use cache::TranslationCache;
pub use service::{GoogleTranslateClient, TranslationService};
