// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Batch translator behaviour against a counting fake service.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use blattwerk_core::error::{BlattwerkError, Result};
use blattwerk_core::{BoundingBox, TargetLanguage, TextRegion};
use blattwerk_translate::{BatchTranslator, TranslationCache, TranslationService};

/// Records every call; fails the calls whose (0-based) index is listed.
#[derive(Default)]
struct CountingService {
    calls: AtomicUsize,
    strings: AtomicUsize,
    fail_calls: Vec<usize>,
    blank: bool,
}

#[async_trait]
impl TranslationService for CountingService {
    async fn translate_batch(&self, texts: &[String], target: &TargetLanguage) -> Result<Vec<String>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.strings.fetch_add(texts.len(), Ordering::SeqCst);
        if self.fail_calls.contains(&call) {
            return Err(BlattwerkError::Translation("HTTP 429 Too Many Requests".into()));
        }
        Ok(texts
            .iter()
            .map(|t| if self.blank { String::new() } else { format!("[{}] {t}", target.code()) })
            .collect())
    }
}

fn region(page: usize, text: &str) -> TextRegion {
    TextRegion::new(page, BoundingBox::new(10.0, 10.0, 100.0, 12.0), text)
}

fn vi() -> TargetLanguage {
    TargetLanguage::parse("vi").unwrap()
}

fn translator(service: Arc<CountingService>, cache: TranslationCache) -> BatchTranslator {
    BatchTranslator::new(service, cache).with_backoff(Duration::ZERO)
}

#[tokio::test]
async fn ten_strings_repeated_five_times_across_three_pages() {
    let regions: Vec<TextRegion> = (0..50).map(|i| region(i % 3, &format!("phrase {}", i % 10))).collect();
    let service = Arc::new(CountingService::default());
    let cache = TranslationCache::in_memory();

    let (out, report) = translator(service.clone(), cache.clone())
        .translate_regions(&regions, &vi())
        .await
        .unwrap();

    assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    assert_eq!(service.strings.load(Ordering::SeqCst), 10);
    assert_eq!(cache.len(), 10);
    assert_eq!(report.pending, 10);
    assert_eq!(out.len(), 50);
    assert_eq!(out[13].translated_text, "[vi] phrase 3");
    assert_eq!(out[13].region.page_index, 1);
}

#[tokio::test]
async fn calls_are_bounded_by_unique_strings_over_chunk_size() {
    // 250 unique strings, each twice, plus whitespace variants of the first.
    let mut regions: Vec<TextRegion> = (0..500).map(|i| region(0, &format!("s{}", i % 250))).collect();
    regions.push(region(0, "  s0  "));
    let service = Arc::new(CountingService::default());

    let (_, report) = translator(service.clone(), TranslationCache::in_memory())
        .translate_regions(&regions, &vi())
        .await
        .unwrap();

    // ceil(250 / 100)
    assert_eq!(service.calls.load(Ordering::SeqCst), 3);
    assert_eq!(report.calls, 3);
    assert_eq!(report.pending, 250);
}

#[tokio::test]
async fn warm_cache_makes_no_calls() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("translation_cache.json");
    let regions: Vec<TextRegion> = ["Invoice", "Total", "Invoice"].iter().map(|t| region(0, t)).collect();

    let first = Arc::new(CountingService::default());
    translator(first.clone(), TranslationCache::open(&store))
        .translate_regions(&regions, &vi())
        .await
        .unwrap();
    assert_eq!(first.calls.load(Ordering::SeqCst), 1);

    // Flushed after the chunk, so a fresh process sees it.
    let second = Arc::new(CountingService::default());
    let (out, report) = translator(second.clone(), TranslationCache::open(&store))
        .translate_regions(&regions, &vi())
        .await
        .unwrap();
    assert_eq!(second.calls.load(Ordering::SeqCst), 0);
    assert_eq!(report.calls, 0);
    assert_eq!(out[1].translated_text, "[vi] Total");
}

#[tokio::test]
async fn failed_chunk_falls_back_to_source_and_later_chunks_proceed() {
    let regions: Vec<TextRegion> = (0..150).map(|i| region(0, &format!("line {i}"))).collect();
    let service = Arc::new(CountingService {
        fail_calls: vec![0],
        ..CountingService::default()
    });
    let cache = TranslationCache::in_memory();

    let (out, report) = translator(service.clone(), cache.clone())
        .translate_regions(&regions, &vi())
        .await
        .unwrap();

    assert_eq!(service.calls.load(Ordering::SeqCst), 2);
    assert_eq!(report.failed_chunks, 1);
    assert_eq!(report.fallbacks, 100);
    // First chunk: source text, never empty.
    assert_eq!(out[0].translated_text, "line 0");
    assert_eq!(out[99].translated_text, "line 99");
    // Second chunk translated and cached.
    assert_eq!(out[100].translated_text, "[vi] line 100");
    assert_eq!(cache.len(), 50);
    assert!(!cache.contains("line 0"));
}

#[tokio::test]
async fn empty_translations_resolve_to_source_text() {
    let service = Arc::new(CountingService {
        blank: true,
        ..CountingService::default()
    });
    let cache = TranslationCache::in_memory();
    let (out, _) = translator(service, cache.clone())
        .translate_regions(&[region(0, " Hello ")], &vi())
        .await
        .unwrap();
    assert_eq!(out[0].translated_text, "Hello");
    assert_eq!(cache.get("Hello").as_deref(), Some("Hello"));
}

#[tokio::test]
async fn slow_chunk_times_out_and_falls_back() {
    struct Stalled;

    #[async_trait]
    impl TranslationService for Stalled {
        async fn translate_batch(&self, texts: &[String], _: &TargetLanguage) -> Result<Vec<String>> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(texts.to_vec())
        }
    }

    let translator = BatchTranslator::new(Arc::new(Stalled), TranslationCache::in_memory())
        .with_backoff(Duration::ZERO)
        .with_chunk_timeout(Duration::from_millis(20));
    let (out, report) = translator.translate_regions(&[region(0, "stuck")], &vi()).await.unwrap();
    assert_eq!(report.failed_chunks, 1);
    assert_eq!(out[0].translated_text, "stuck");
}
