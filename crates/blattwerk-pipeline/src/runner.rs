// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Run entry point: wires configuration, cache, collaborators, and the chosen
// path together, then writes the output document.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use blattwerk_core::error::{BlattwerkError, Result};
use blattwerk_core::{Document, PipelineConfig, RasterQuality, RunId, TargetLanguage, TranslationMode};
use blattwerk_document::{
    LopdfEngine, OcrEngine, PageRasterizer, PdfAssembler, PdftoppmRasterizer, RenderFont, TesseractOcr, TextMeasure,
    UnicodeFont,
};
use blattwerk_translate::{BatchTranslator, TranslationCache, TranslationService};
use image::RgbImage;
use tracing::{debug, info, instrument};

use crate::cancel::CancelToken;
use crate::event::EventSink;
use crate::structured::StructuredRunner;
use crate::visual::{VisualCoordinator, VisualSettings};

/// One translation job.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub input: PathBuf,
    pub target: TargetLanguage,
    pub mode: TranslationMode,
    /// Rasterization density; visual mode only.
    pub quality: RasterQuality,
}

pub struct Pipeline {
    config: PipelineConfig,
    service: Arc<dyn TranslationService>,
    events: EventSink,
    cancel: CancelToken,
    rasterizer: Option<Arc<dyn PageRasterizer>>,
    ocr: Option<Arc<dyn OcrEngine>>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, service: Arc<dyn TranslationService>) -> Self {
        Self {
            config,
            service,
            events: EventSink::discard(),
            cancel: CancelToken::new(),
            rasterizer: None,
            ocr: None,
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

    /// Replace the configured `pdftoppm` rasterizer.
    pub fn with_rasterizer(mut self, rasterizer: Arc<dyn PageRasterizer>) -> Self {
        self.rasterizer = Some(rasterizer);
        self
    }

    /// Replace the configured `tesseract` engine.
    pub fn with_ocr(mut self, ocr: Arc<dyn OcrEngine>) -> Self {
        self.ocr = Some(ocr);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Translate `request.input` and return the path of the written output.
    ///
    /// Nothing is written when the run fails or is cancelled.
    #[instrument(skip_all, fields(input = %request.input.display(), mode = ?request.mode, target = %request.target))]
    pub async fn run(&self, request: &RunRequest) -> Result<PathBuf> {
        let started = Instant::now();
        let run_id = RunId::new();
        debug!(%run_id, "Run started");
        check_input(&request.input)?;
        let document = Document::new(request.input.clone(), request.mode);
        let output_path = document.output_path.clone();

        let cache = TranslationCache::open(&self.config.cache_file_path);
        self.events.info(format!("Loaded {} cached translations", cache.len()));
        let translator = Arc::new(BatchTranslator::from_config(
            Arc::clone(&self.service),
            cache,
            &self.config,
        ));

        match request.mode {
            TranslationMode::Structured => self.run_structured(request, translator, document).await?,
            TranslationMode::Visual => self.run_visual(request, translator, &output_path).await?,
        }

        info!(
            %run_id,
            output = %output_path.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Run finished"
        );
        self.events.info(format!("Saved {}", output_path.display()));
        self.events.finished(output_path.clone());
        Ok(output_path)
    }

    async fn run_structured(
        &self,
        request: &RunRequest,
        translator: Arc<BatchTranslator>,
        document: Document,
    ) -> Result<()> {
        let input = document.source_path.clone();
        let font_path = self.config.font_path.clone();
        let engine = tokio::task::spawn_blocking(move || {
            let engine = LopdfEngine::open(input)?;
            Ok::<_, BlattwerkError>(match UnicodeFont::load(font_path.as_deref()) {
                Some(font) => engine.with_unicode_font(font),
                None => engine,
            })
        })
        .await
        .map_err(|err| BlattwerkError::PdfError(format!("document worker stopped: {err}")))??;

        let runner = StructuredRunner::new(translator, self.events.clone(), self.cancel.clone());
        let summary = runner.run(engine, document, &request.target).await?;
        self.events.info(format!(
            "Replaced {} of {} spans on {} pages",
            summary.replaced, summary.regions, summary.pages
        ));
        Ok(())
    }

    async fn run_visual(
        &self,
        request: &RunRequest,
        translator: Arc<BatchTranslator>,
        output_path: &Path,
    ) -> Result<()> {
        let rasterizer: Arc<dyn PageRasterizer> = match &self.rasterizer {
            Some(rasterizer) => Arc::clone(rasterizer),
            None => Arc::new(PdftoppmRasterizer::new(&self.config.rasterizer_path)),
        };
        let ocr: Arc<dyn OcrEngine> = match &self.ocr {
            Some(ocr) => Arc::clone(ocr),
            None => Arc::new(TesseractOcr::new(&self.config.ocr_engine_path)),
        };
        let font: Arc<dyn TextMeasure> = Arc::new(RenderFont::load(self.config.font_path.as_deref()));
        let settings = VisualSettings::from_config(&self.config, request.quality);
        let dpi = settings.dpi;

        let coordinator = VisualCoordinator::new(rasterizer, ocr, font, translator, settings)
            .with_events(self.events.clone())
            .with_cancel_token(self.cancel.clone());
        let run = coordinator.run(&request.input, &request.target).await?;
        if !run.untranslated.is_empty() || !run.missing.is_empty() {
            self.events.warn(format!(
                "{} pages kept untranslated, {} pages missing",
                run.untranslated.len(),
                run.missing.len()
            ));
        }

        self.cancel.check()?;
        let title = document_title(&request.input);
        write_pages(run.pages, title, dpi, output_path.to_path_buf()).await
    }
}

/// Assemble the reconstructed pages, in order, into the output PDF.
async fn write_pages(pages: Vec<RgbImage>, title: String, dpi: u32, output_path: PathBuf) -> Result<()> {
    tokio::task::spawn_blocking(move || PdfAssembler::new(title, dpi).write_to_file(&pages, &output_path))
        .await
        .map_err(|err| BlattwerkError::PdfError(format!("assembly worker stopped: {err}")))?
}

fn check_input(input: &Path) -> Result<()> {
    let metadata = std::fs::metadata(input)?;
    if !metadata.is_file() {
        return Err(BlattwerkError::UnsupportedDocument(format!("{} is not a file", input.display())));
    }
    let is_pdf = input
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    if !is_pdf {
        return Err(BlattwerkError::UnsupportedDocument(format!(
            "{} is not a PDF",
            input.display()
        )));
    }
    Ok(())
}

fn document_title(input: &Path) -> String {
    input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Translated document".into())
}
