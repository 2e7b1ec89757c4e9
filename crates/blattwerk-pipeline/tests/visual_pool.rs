// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Visual coordinator: ordering, filtering, per-page isolation, cancellation.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use blattwerk_core::error::{BlattwerkError, Result};
use blattwerk_core::{BoundingBox, PipelineConfig, RasterQuality, TargetLanguage, TranslationMode};
use blattwerk_document::{FitParams, OcrEngine, OcrWord, PageRasterizer, RenderFont};
use blattwerk_pipeline::{
    CancelToken, EventSink, Pipeline, PipelineEvent, RunRequest, VisualCoordinator, VisualSettings,
};
use blattwerk_translate::{BatchTranslator, TranslationCache, TranslationService};
use image::{Rgb, RgbImage};
use tokio::sync::mpsc::UnboundedReceiver;

const TINT_STEP: u8 = 50;

/// Page `i` is a flat image whose red channel is `i * TINT_STEP`.
struct TintedRasterizer {
    delays_ms: Vec<u64>,
    fail_on: Vec<usize>,
}

impl TintedRasterizer {
    fn new(delays_ms: Vec<u64>) -> Self {
        Self {
            delays_ms,
            fail_on: Vec::new(),
        }
    }
}

impl PageRasterizer for TintedRasterizer {
    fn page_count(&self, _: &std::path::Path) -> Result<usize> {
        Ok(self.delays_ms.len())
    }

    fn render_page(&self, _: &std::path::Path, page_index: usize, _: u32) -> Result<RgbImage> {
        std::thread::sleep(Duration::from_millis(self.delays_ms[page_index]));
        if self.fail_on.contains(&page_index) {
            return Err(BlattwerkError::RasterError(format!("page {page_index} unreadable")));
        }
        Ok(RgbImage::from_pixel(80, 40, Rgb([page_index as u8 * TINT_STEP, 230, 230])))
    }
}

fn page_of(image: &RgbImage) -> usize {
    (image.get_pixel(0, 0).0[0] / TINT_STEP) as usize
}

/// One confident word per page, or a fixed word list.
struct FakeOcr {
    words: Option<Vec<OcrWord>>,
    fail_on: Vec<usize>,
}

impl FakeOcr {
    fn one_word() -> Self {
        Self {
            words: None,
            fail_on: Vec::new(),
        }
    }
}

impl OcrEngine for FakeOcr {
    fn recognize(&self, image: &RgbImage, _: &[String]) -> Result<Vec<OcrWord>> {
        let page = page_of(image);
        if self.fail_on.contains(&page) {
            return Err(BlattwerkError::OcrError("engine crashed".into()));
        }
        Ok(self.words.clone().unwrap_or_else(|| {
            vec![OcrWord {
                text: format!("page {page}"),
                bbox: BoundingBox::new(10.0, 10.0, 50.0, 20.0),
                confidence: 90.0,
            }]
        }))
    }
}

#[derive(Default)]
struct RecordingService {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl TranslationService for RecordingService {
    async fn translate_batch(&self, texts: &[String], _: &TargetLanguage) -> Result<Vec<String>> {
        self.seen.lock().unwrap().extend(texts.iter().cloned());
        Ok(texts.iter().map(|t| t.to_uppercase()).collect())
    }
}

fn settings(pool_size: usize) -> VisualSettings {
    VisualSettings {
        dpi: 100,
        pool_size,
        page_timeout: Duration::from_secs(10),
        ocr_languages: vec!["eng".into(), "vie".into()],
        min_confidence: 60.0,
        min_box_height: 1.0,
        fit: FitParams::default(),
        preview_max_height: 20,
    }
}

fn coordinator(
    rasterizer: TintedRasterizer,
    ocr: FakeOcr,
    service: Arc<RecordingService>,
    pool_size: usize,
) -> (VisualCoordinator, UnboundedReceiver<PipelineEvent>) {
    let translator =
        BatchTranslator::new(service, TranslationCache::in_memory()).with_backoff(Duration::ZERO);
    let (events, rx) = EventSink::channel();
    let coordinator = VisualCoordinator::new(
        Arc::new(rasterizer),
        Arc::new(ocr),
        Arc::new(RenderFont::Bitmap),
        Arc::new(translator),
        settings(pool_size),
    )
    .with_events(events);
    (coordinator, rx)
}

fn drain(rx: &mut UnboundedReceiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn vi() -> TargetLanguage {
    TargetLanguage::parse("vi").unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pages_come_back_in_source_order_whatever_finishes_first() {
    // Page 3 finishes first and page 1 last.
    let rasterizer = TintedRasterizer::new(vec![400, 200, 0, 100]);
    let (coordinator, mut rx) = coordinator(rasterizer, FakeOcr::one_word(), Arc::default(), 4);

    let run = coordinator.run(std::path::Path::new("scan.pdf"), &vi()).await.unwrap();

    let order: Vec<usize> = run.pages.iter().map(page_of).collect();
    assert_eq!(order, vec![0, 1, 2, 3]);
    assert!(run.untranslated.is_empty() && run.missing.is_empty());

    let events = drain(&mut rx);
    let completion: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::Preview { page_index, .. } => Some(*page_index),
            _ => None,
        })
        .collect();
    assert_eq!(completion.first(), Some(&2));
    assert_eq!(completion.last(), Some(&0));

    let progress: Vec<(usize, usize)> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::Progress { completed, total } => Some((*completed, *total)),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![(1, 4), (2, 4), (3, 4), (4, 4)]);
}

#[tokio::test]
async fn pool_of_one_still_finishes_every_page() {
    let (coordinator, _rx) =
        coordinator(TintedRasterizer::new(vec![0; 3]), FakeOcr::one_word(), Arc::default(), 1);
    let run = coordinator.run(std::path::Path::new("scan.pdf"), &vi()).await.unwrap();
    assert_eq!(run.pages.iter().map(page_of).collect::<Vec<_>>(), vec![0, 1, 2]);
}

#[tokio::test]
async fn low_confidence_and_thin_words_never_reach_the_translator() {
    let word = |text: &str, confidence: f32, height: f32| OcrWord {
        text: text.into(),
        bbox: BoundingBox::new(5.0, 5.0, 30.0, height),
        confidence,
    };
    let ocr = FakeOcr {
        words: Some(vec![
            word("keep", 61.0, 20.0),
            word("edge", 60.0, 20.0),
            word("noise", 12.0, 20.0),
            word("hairline", 95.0, 1.0),
            word("   ", 99.0, 20.0),
        ]),
        fail_on: Vec::new(),
    };
    let service = Arc::new(RecordingService::default());
    let (coordinator, _rx) = coordinator(TintedRasterizer::new(vec![0]), ocr, service.clone(), 2);

    coordinator.run(std::path::Path::new("scan.pdf"), &vi()).await.unwrap();
    assert_eq!(*service.seen.lock().unwrap(), vec!["keep".to_string()]);
}

#[tokio::test]
async fn shared_cache_translates_repeated_words_once() {
    let ocr = FakeOcr {
        words: Some(vec![OcrWord {
            text: "Invoice".into(),
            bbox: BoundingBox::new(10.0, 10.0, 50.0, 20.0),
            confidence: 90.0,
        }]),
        fail_on: Vec::new(),
    };
    let service = Arc::new(RecordingService::default());
    // Pool of one so pages run strictly one after another.
    let (coordinator, _rx) = coordinator(TintedRasterizer::new(vec![0; 4]), ocr, service.clone(), 1);
    coordinator.run(std::path::Path::new("scan.pdf"), &vi()).await.unwrap();
    assert_eq!(service.seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn failing_pages_are_isolated() {
    let rasterizer = TintedRasterizer {
        delays_ms: vec![0; 4],
        fail_on: vec![1],
    };
    let ocr = FakeOcr {
        words: None,
        fail_on: vec![2],
    };
    let (coordinator, mut rx) = coordinator(rasterizer, ocr, Arc::default(), 2);

    let run = coordinator.run(std::path::Path::new("scan.pdf"), &vi()).await.unwrap();
    assert_eq!(run.missing, vec![1]);
    assert_eq!(run.untranslated, vec![2]);
    assert_eq!(run.pages.iter().map(page_of).collect::<Vec<_>>(), vec![0, 2, 3]);

    let warnings = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, PipelineEvent::Log { level: blattwerk_pipeline::LogLevel::Warn, .. }))
        .count();
    assert!(warnings >= 2);
}

#[tokio::test]
async fn previews_arrive_already_downscaled() {
    let rasterizer = TintedRasterizer::new(vec![0, 0]);
    let (coordinator, mut rx) = coordinator(rasterizer, FakeOcr::one_word(), Arc::default(), 2);

    let run = coordinator.run(std::path::Path::new("scan.pdf"), &vi()).await.unwrap();
    assert!(run.pages.iter().all(|page| page.dimensions() == (80, 40)));

    let thumbnails: Vec<(u32, u32)> = drain(&mut rx)
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::Preview { thumbnail, .. } => Some(thumbnail.dimensions()),
            _ => None,
        })
        .collect();
    assert_eq!(thumbnails, vec![(40, 20), (40, 20)]);
}

#[tokio::test]
async fn run_fails_when_every_page_fails() {
    let rasterizer = TintedRasterizer {
        delays_ms: vec![0; 2],
        fail_on: vec![0, 1],
    };
    let (coordinator, _rx) = coordinator(rasterizer, FakeOcr::one_word(), Arc::default(), 2);
    let err = coordinator.run(std::path::Path::new("scan.pdf"), &vi()).await.unwrap_err();
    match err {
        BlattwerkError::AllPagesFailed { pages, first_error } => {
            assert_eq!(pages, 2);
            assert!(first_error.contains("unreadable"), "{first_error}");
        }
        other => panic!("expected AllPagesFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn slow_page_times_out_without_stopping_the_others() {
    let mut tight = settings(3);
    tight.page_timeout = Duration::from_millis(300);
    let coordinator = VisualCoordinator::new(
        Arc::new(TintedRasterizer::new(vec![0, 1500, 0])),
        Arc::new(FakeOcr::one_word()),
        Arc::new(RenderFont::Bitmap),
        Arc::new(BatchTranslator::new(
            Arc::new(RecordingService::default()),
            TranslationCache::in_memory(),
        )),
        tight,
    );
    let run = coordinator.run(std::path::Path::new("scan.pdf"), &vi()).await.unwrap();
    assert_eq!(run.missing, vec![1]);
    assert_eq!(run.pages.iter().map(page_of).collect::<Vec<_>>(), vec![0, 2]);
}

#[tokio::test]
async fn cancellation_stops_the_run() {
    let cancel = CancelToken::new();
    let (coordinator, _rx) =
        coordinator(TintedRasterizer::new(vec![300; 6]), FakeOcr::one_word(), Arc::default(), 1);
    let coordinator = coordinator.with_cancel_token(cancel.clone());

    let started = Instant::now();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        }
    });
    let err = coordinator.run(std::path::Path::new("scan.pdf"), &vi()).await.unwrap_err();
    assert!(matches!(err, BlattwerkError::Cancelled));
    assert!(started.elapsed() < Duration::from_millis(1500));
}

#[tokio::test]
async fn pipeline_writes_ordered_visual_output_beside_the_input() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("scan.pdf");
    std::fs::write(&input, b"%PDF-1.5\n").unwrap();
    let config = PipelineConfig {
        cache_file_path: dir.path().join("translation_cache.json"),
        pool_size: Some(2),
        ..PipelineConfig::default()
    };
    let (events, mut rx) = EventSink::channel();

    let output = Pipeline::new(config, Arc::new(RecordingService::default()))
        .with_events(events)
        .with_rasterizer(Arc::new(TintedRasterizer::new(vec![30, 0, 10])))
        .with_ocr(Arc::new(FakeOcr::one_word()))
        .run(&RunRequest {
            input: input.clone(),
            target: vi(),
            mode: TranslationMode::Visual,
            quality: RasterQuality::Fast,
        })
        .await
        .unwrap();

    assert_eq!(output, dir.path().join("scan_translated_visual.pdf"));
    let written = lopdf::Document::load(&output).unwrap();
    assert_eq!(written.get_pages().len(), 3);

    // Final flush persisted every page's string.
    let cache = TranslationCache::open(dir.path().join("translation_cache.json"));
    assert_eq!(cache.len(), 3);

    let events = drain(&mut rx);
    assert!(matches!(events.last(), Some(PipelineEvent::Finished { .. })));
}

#[tokio::test]
async fn cancelled_pipeline_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("scan.pdf");
    std::fs::write(&input, b"%PDF-1.5\n").unwrap();
    let config = PipelineConfig {
        cache_file_path: dir.path().join("translation_cache.json"),
        ..PipelineConfig::default()
    };
    let cancel = CancelToken::new();
    cancel.cancel();

    let err = Pipeline::new(config, Arc::new(RecordingService::default()))
        .with_cancel_token(cancel)
        .with_rasterizer(Arc::new(TintedRasterizer::new(vec![0])))
        .with_ocr(Arc::new(FakeOcr::one_word()))
        .run(&RunRequest {
            input,
            target: vi(),
            mode: TranslationMode::Visual,
            quality: RasterQuality::Balanced,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, BlattwerkError::Cancelled));
    assert!(!dir.path().join("scan_translated_visual.pdf").exists());
}
