// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Visual coordinator: the OCR path as a bounded pool of page tasks.
//
// One task per page: rasterize, recognise, translate against the shared
// cache, reconstruct. Tasks finish in any order; each result lands in the
// slot for its page index, so output order is source order. A failing page
// is isolated to its own outcome and never stops the other tasks.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use blattwerk_core::error::{BlattwerkError, Result};
use blattwerk_core::{PipelineConfig, RasterQuality, RunStats, TargetLanguage, TranslatedRegion};
use blattwerk_document::render::reconstruct_visual_page;
use blattwerk_document::scan::regions_from_words;
use blattwerk_document::{FitParams, OcrEngine, PageRasterizer, TextMeasure, preview_thumbnail};
use blattwerk_translate::BatchTranslator;
use image::RgbImage;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio::time::timeout_at;
use tracing::{debug, info, instrument, warn};

use crate::cancel::CancelToken;
use crate::event::EventSink;

/// Tunables for one visual run.
#[derive(Debug, Clone)]
pub struct VisualSettings {
    pub dpi: u32,
    pub pool_size: usize,
    pub page_timeout: Duration,
    pub ocr_languages: Vec<String>,
    pub min_confidence: f32,
    pub min_box_height: f32,
    pub fit: FitParams,
    pub preview_max_height: u32,
}

impl VisualSettings {
    pub fn from_config(config: &PipelineConfig, quality: RasterQuality) -> Self {
        Self {
            dpi: quality.dpi(),
            pool_size: config.effective_pool_size(),
            page_timeout: config.page_timeout(),
            ocr_languages: config.ocr_languages.clone(),
            min_confidence: config.min_confidence,
            min_box_height: config.min_box_height,
            fit: FitParams::from(config),
            preview_max_height: config.preview_max_height,
        }
    }
}

/// Why a page task gave up, with its raster when rasterization got that far.
#[derive(Debug)]
pub struct PageFailure {
    pub error: BlattwerkError,
    pub raster: Option<RgbImage>,
}

/// A reconstructed page and its preview, both built off the async runtime.
#[derive(Debug)]
pub struct RenderedPage {
    pub image: RgbImage,
    pub thumbnail: RgbImage,
}

/// The result of one page task.
#[derive(Debug)]
pub struct PageOutcome {
    pub index: usize,
    pub result: std::result::Result<RenderedPage, PageFailure>,
}

impl PageOutcome {
    fn failed(index: usize, error: BlattwerkError, raster: Option<RgbImage>) -> Self {
        Self {
            index,
            result: Err(PageFailure { error, raster }),
        }
    }
}

/// Pages of a finished visual run, in source order.
#[derive(Debug)]
pub struct VisualRun {
    pub pages: Vec<RgbImage>,
    /// Pages that failed and were kept untranslated.
    pub untranslated: Vec<usize>,
    /// Pages that failed before rasterization and are absent from `pages`.
    pub missing: Vec<usize>,
}

/// Shared, read-only state of every page task.
struct PageWorker {
    rasterizer: Arc<dyn PageRasterizer>,
    ocr: Arc<dyn OcrEngine>,
    font: Arc<dyn TextMeasure>,
    translator: Arc<BatchTranslator>,
    settings: VisualSettings,
    source: PathBuf,
    target: TargetLanguage,
    cancel: CancelToken,
}

impl PageWorker {
    async fn run(self: Arc<Self>, index: usize) -> PageOutcome {
        let deadline = tokio::time::Instant::now() + self.settings.page_timeout;
        if let Err(err) = self.cancel.check() {
            return PageOutcome::failed(index, err, None);
        }

        let raster = match timeout_at(deadline, self.rasterize(index)).await {
            Ok(Ok(raster)) => raster,
            Ok(Err(err)) => return PageOutcome::failed(index, err, None),
            Err(_) => return PageOutcome::failed(index, self.timed_out(index), None),
        };

        match timeout_at(deadline, self.translate_page(index, raster.clone())).await {
            Ok(Ok(page)) => PageOutcome {
                index,
                result: Ok(page),
            },
            Ok(Err(err)) => PageOutcome::failed(index, err, Some(raster)),
            Err(_) => PageOutcome::failed(index, self.timed_out(index), Some(raster)),
        }
    }

    async fn rasterize(&self, index: usize) -> Result<RgbImage> {
        let rasterizer = Arc::clone(&self.rasterizer);
        let source = self.source.clone();
        let dpi = self.settings.dpi;
        tokio::task::spawn_blocking(move || rasterizer.render_page(&source, index, dpi))
            .await
            .map_err(|err| stage_stopped(index, "rasterization", err))?
    }

    async fn translate_page(&self, index: usize, raster: RgbImage) -> Result<RenderedPage> {
        let ocr = Arc::clone(&self.ocr);
        let languages = self.settings.ocr_languages.clone();
        let (raster, words) = tokio::task::spawn_blocking(move || {
            let words = ocr.recognize(&raster, &languages);
            (raster, words)
        })
        .await
        .map_err(|err| stage_stopped(index, "OCR", err))?;
        let regions = regions_from_words(
            index,
            words?,
            self.settings.min_confidence,
            self.settings.min_box_height,
        );

        let cancel = self.cancel.clone();
        let (translated, report) = self
            .translator
            .translate_with(&regions, &self.target, move |_| {
                if cancel.is_cancelled() {
                    std::ops::ControlFlow::Break(())
                } else {
                    std::ops::ControlFlow::Continue(())
                }
            })
            .await?;
        debug!(page = index, regions = regions.len(), calls = report.calls, "Page translated");

        let font = Arc::clone(&self.font);
        let fit = self.settings.fit;
        let preview_height = self.settings.preview_max_height;
        tokio::task::spawn_blocking(move || {
            let image = reconstruct(raster, &translated, font.as_ref(), &fit);
            let thumbnail = preview_thumbnail(&image, preview_height);
            RenderedPage { image, thumbnail }
        })
        .await
        .map_err(|err| stage_stopped(index, "reconstruction", err))
    }

    fn timed_out(&self, index: usize) -> BlattwerkError {
        BlattwerkError::TimedOut(format!("page {} after {:?}", index + 1, self.settings.page_timeout))
    }
}

fn reconstruct(
    mut canvas: RgbImage,
    regions: &[TranslatedRegion],
    font: &dyn TextMeasure,
    fit: &FitParams,
) -> RgbImage {
    reconstruct_visual_page(&mut canvas, regions, font, fit);
    canvas
}

fn stage_stopped(index: usize, stage: &str, err: JoinError) -> BlattwerkError {
    BlattwerkError::PageFailed {
        page: index,
        reason: format!("{stage} worker stopped: {err}"),
    }
}

pub struct VisualCoordinator {
    rasterizer: Arc<dyn PageRasterizer>,
    ocr: Arc<dyn OcrEngine>,
    font: Arc<dyn TextMeasure>,
    translator: Arc<BatchTranslator>,
    settings: VisualSettings,
    events: EventSink,
    cancel: CancelToken,
}

impl VisualCoordinator {
    pub fn new(
        rasterizer: Arc<dyn PageRasterizer>,
        ocr: Arc<dyn OcrEngine>,
        font: Arc<dyn TextMeasure>,
        translator: Arc<BatchTranslator>,
        settings: VisualSettings,
    ) -> Self {
        Self {
            rasterizer,
            ocr,
            font,
            translator,
            settings,
            events: EventSink::discard(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Process every page of `source` and return them in source order.
    #[instrument(skip_all, fields(source = %source.display(), pool = self.settings.pool_size))]
    pub async fn run(&self, source: &Path, target: &TargetLanguage) -> Result<VisualRun> {
        let started = Instant::now();
        self.cancel.check()?;

        let total = {
            let rasterizer = Arc::clone(&self.rasterizer);
            let source = source.to_path_buf();
            tokio::task::spawn_blocking(move || rasterizer.page_count(&source))
                .await
                .map_err(|err| BlattwerkError::PdfError(format!("page count worker stopped: {err}")))??
        };
        if total == 0 {
            return Err(BlattwerkError::UnsupportedDocument(format!(
                "{} has no pages",
                source.display()
            )));
        }
        self.events.info(format!(
            "Processing {total} pages at {} DPI with {} workers",
            self.settings.dpi, self.settings.pool_size
        ));

        let worker = Arc::new(PageWorker {
            rasterizer: Arc::clone(&self.rasterizer),
            ocr: Arc::clone(&self.ocr),
            font: Arc::clone(&self.font),
            translator: Arc::clone(&self.translator),
            settings: self.settings.clone(),
            source: source.to_path_buf(),
            target: target.clone(),
            cancel: self.cancel.clone(),
        });
        let permits = Arc::new(Semaphore::new(self.settings.pool_size.max(1)));
        let mut tasks = JoinSet::new();
        for index in 0..total {
            let worker = Arc::clone(&worker);
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return PageOutcome::failed(index, BlattwerkError::Cancelled, None);
                };
                worker.run(index).await
            });
        }

        let mut slots: Vec<Option<RgbImage>> = (0..total).map(|_| None).collect();
        let mut untranslated = Vec::new();
        let mut missing = Vec::new();
        let mut reported = vec![false; total];
        let mut first_error: Option<String> = None;
        let mut completed = 0;

        loop {
            let joined = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    tasks.abort_all();
                    self.events.warn("Run cancelled; discarding pages in flight");
                    return Err(BlattwerkError::Cancelled);
                }
                joined = tasks.join_next() => joined,
            };
            let outcome = match joined {
                None => break,
                Some(Ok(outcome)) => outcome,
                Some(Err(err)) => {
                    // The page is found unreported after the loop.
                    warn!(error = %err, "Page task aborted");
                    first_error.get_or_insert_with(|| err.to_string());
                    completed += 1;
                    self.events.progress(completed, total);
                    continue;
                }
            };

            let index = outcome.index;
            reported[index] = true;
            match outcome.result {
                Ok(RenderedPage { image, thumbnail }) => {
                    self.events.preview(index, thumbnail);
                    slots[index] = Some(image);
                }
                Err(PageFailure { error, raster }) => {
                    if matches!(error, BlattwerkError::Cancelled) {
                        continue;
                    }
                    first_error.get_or_insert_with(|| error.to_string());
                    match raster {
                        Some(raster) => {
                            self.events.warn(format!("Page {} failed ({error}); keeping it untranslated", index + 1));
                            slots[index] = Some(raster);
                            untranslated.push(index);
                        }
                        None => {
                            self.events.warn(format!("Page {} failed ({error}); leaving it out", index + 1));
                            missing.push(index);
                        }
                    }
                }
            }

            completed += 1;
            self.events.progress(completed, total);
            self.events.stats(RunStats::compute(completed, total, started.elapsed()));
        }

        self.cancel.check()?;
        self.translator.cache().flush_logged();

        for (index, _) in reported.iter().enumerate().filter(|(_, seen)| !**seen) {
            self.events.warn(format!("Page {} produced no result; leaving it out", index + 1));
            missing.push(index);
        }
        untranslated.sort_unstable();
        missing.sort_unstable();

        let failed = untranslated.len() + missing.len();
        if failed == total {
            return Err(BlattwerkError::AllPagesFailed {
                pages: total,
                first_error: first_error.unwrap_or_else(|| "unknown".into()),
            });
        }

        info!(
            pages = total,
            failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Visual run finished"
        );
        if failed > 0 {
            warn!(?untranslated, ?missing, "Some pages were not translated");
        }

        Ok(VisualRun {
            pages: slots.into_iter().flatten().collect(),
            untranslated,
            missing,
        })
    }
}
