// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Structured runner: the text-layer path.
//
// Sequential: collect every span, translate the document's unique strings
// in one batch run, then replace spans in place and save. Document work
// happens on a blocking thread so the caller's runtime stays responsive.

use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use blattwerk_core::error::{BlattwerkError, Result};
use blattwerk_core::{Document, Page, RunStats, TargetLanguage, TextRegion, TranslatedRegion};
use blattwerk_document::StructuredEngine;
use blattwerk_translate::{BatchReport, BatchTranslator};
use tokio::task::JoinError;
use tracing::{instrument, warn};

use crate::cancel::CancelToken;
use crate::event::EventSink;

/// Counts from one structured run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StructuredSummary {
    pub pages: usize,
    pub regions: usize,
    pub replaced: usize,
    /// Regions whose translation equals the source; left as they were.
    pub unchanged: usize,
    /// Regions the engine could not rewrite; left as they were.
    pub failed: usize,
    pub batch: BatchReport,
}

pub struct StructuredRunner {
    translator: Arc<BatchTranslator>,
    events: EventSink,
    cancel: CancelToken,
}

impl StructuredRunner {
    pub fn new(translator: Arc<BatchTranslator>, events: EventSink, cancel: CancelToken) -> Self {
        Self {
            translator,
            events,
            cancel,
        }
    }

    /// Translate the document open in `engine` and save it to
    /// `document.output_path`. `document.pages` is filled from the engine.
    #[instrument(skip_all, fields(output = %document.output_path.display()))]
    pub async fn run<E>(&self, engine: E, mut document: Document, target: &TargetLanguage) -> Result<StructuredSummary>
    where
        E: StructuredEngine + 'static,
    {
        let started = Instant::now();
        self.cancel.check()?;

        self.events.info("Phase 1/3: collecting text");
        let (engine, pages) = tokio::task::spawn_blocking(move || collect_pages(engine))
            .await
            .map_err(worker_stopped)??;
        document.pages = pages;
        let regions: Vec<TextRegion> = document.regions().cloned().collect();
        let pages = document.pages.len();
        self.events.info(format!("Found {} text spans on {pages} pages", regions.len()));

        let pending = self.translator.pending_keys(&regions).len();
        self.events.info(format!("Phase 2/3: translating {pending} new strings"));
        let (events, cancel) = (self.events.clone(), self.cancel.clone());
        let (translated, batch) = self
            .translator
            .translate_with(&regions, target, move |progress| {
                if cancel.is_cancelled() {
                    return ControlFlow::Break(());
                }
                events.info(format!(
                    "Translating {}-{} of {}",
                    progress.strings_done + 1,
                    progress.strings_done + progress.chunk_len,
                    progress.strings_total
                ));
                ControlFlow::Continue(())
            })
            .await?;
        if batch.failed_chunks > 0 {
            self.events.warn(format!(
                "{} of {} chunks failed; their text stays untranslated",
                batch.failed_chunks, batch.calls
            ));
        }

        self.cancel.check()?;
        self.events.info("Phase 3/3: rebuilding pages");
        let rebuild = Rebuild {
            pages,
            output_path: document.output_path,
            events: self.events.clone(),
            cancel: self.cancel.clone(),
            started,
        };
        let mut summary = tokio::task::spawn_blocking(move || rebuild.run(engine, translated))
            .await
            .map_err(worker_stopped)??;
        summary.regions = regions.len();
        summary.batch = batch;

        if summary.failed > 0 {
            self.events.warn(format!("{} spans could not be rewritten", summary.failed));
        }
        Ok(summary)
    }
}

fn collect_pages<E: StructuredEngine>(engine: E) -> Result<(E, Vec<Page>)> {
    let mut pages = Vec::with_capacity(engine.page_count());
    for index in 0..engine.page_count() {
        let regions = engine
            .structured_spans(index)?
            .into_iter()
            .filter(|region| !region.key().is_empty())
            .collect();
        pages.push(Page { index, regions });
    }
    Ok((engine, pages))
}

struct Rebuild {
    pages: usize,
    output_path: PathBuf,
    events: EventSink,
    cancel: CancelToken,
    started: Instant,
}

impl Rebuild {
    fn run<E: StructuredEngine>(self, mut engine: E, translated: Vec<TranslatedRegion>) -> Result<StructuredSummary> {
        let mut summary = StructuredSummary {
            pages: self.pages,
            ..StructuredSummary::default()
        };

        let mut remaining = translated.as_slice();
        for page_index in 0..self.pages {
            self.cancel.check()?;
            let split = remaining
                .iter()
                .position(|t| t.region.page_index != page_index)
                .unwrap_or(remaining.len());
            let (on_page, rest) = remaining.split_at(split);
            remaining = rest;

            for t in on_page {
                if t.translated_text.trim() == t.region.key() {
                    summary.unchanged += 1;
                    continue;
                }
                match engine.replace_region_text(&t.region, &t.translated_text) {
                    Ok(()) => summary.replaced += 1,
                    Err(err) => {
                        warn!(page = page_index, error = %err, "Span left untranslated");
                        summary.failed += 1;
                    }
                }
            }

            let done = page_index + 1;
            self.events.progress(done, self.pages);
            self.events.stats(RunStats::compute(done, self.pages, self.started.elapsed()));
        }

        engine.save(&self.output_path)?;
        Ok(summary)
    }
}

fn worker_stopped(err: JoinError) -> BlattwerkError {
    BlattwerkError::PdfError(format!("document worker stopped: {err}"))
}
