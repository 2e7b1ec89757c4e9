// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Batch translator: deduplicate, chunk, translate, and resolve regions
// through the shared cache.
//
// A failed chunk is logged and skipped after a short backoff; its strings
// resolve to their own source text. The same chunk is never re-attempted.

use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use blattwerk_core::error::{BlattwerkError, Result};
use blattwerk_core::{PipelineConfig, TargetLanguage, TextRegion, TranslatedRegion};
use tracing::{debug, info, instrument, warn};

use crate::cache::TranslationCache;
use crate::service::TranslationService;

pub const DEFAULT_CHUNK_SIZE: usize = 100;

/// Progress through the pending strings, passed to the chunk hook before
/// each chunk is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkProgress {
    pub chunk: usize,
    pub chunks: usize,
    /// Strings in the chunk about to be sent.
    pub chunk_len: usize,
    pub strings_done: usize,
    pub strings_total: usize,
}

/// What one batch run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Regions handed in.
    pub regions: usize,
    /// Unique keys that were not yet cached.
    pub pending: usize,
    /// Service calls made (one per chunk).
    pub calls: usize,
    pub failed_chunks: usize,
    /// Regions that resolved to their own source text.
    pub fallbacks: usize,
}

pub struct BatchTranslator {
    service: Arc<dyn TranslationService>,
    cache: TranslationCache,
    chunk_size: usize,
    backoff: Duration,
    chunk_timeout: Duration,
}

impl BatchTranslator {
    pub fn new(service: Arc<dyn TranslationService>, cache: TranslationCache) -> Self {
        Self {
            service,
            cache,
            chunk_size: DEFAULT_CHUNK_SIZE,
            backoff: Duration::from_secs(2),
            chunk_timeout: Duration::from_secs(60),
        }
    }

    pub fn from_config(
        service: Arc<dyn TranslationService>,
        cache: TranslationCache,
        config: &PipelineConfig,
    ) -> Self {
        Self::new(service, cache)
            .with_chunk_size(config.chunk_size)
            .with_backoff(config.chunk_backoff())
            .with_chunk_timeout(config.chunk_timeout())
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_chunk_timeout(mut self, chunk_timeout: Duration) -> Self {
        self.chunk_timeout = chunk_timeout;
        self
    }

    pub fn cache(&self) -> &TranslationCache {
        &self.cache
    }

    /// Unique non-empty keys not yet in the cache, in first-seen order.
    pub fn pending_keys(&self, regions: &[TextRegion]) -> Vec<String> {
        let mut seen = HashSet::new();
        regions
            .iter()
            .map(TextRegion::key)
            .filter(|key| !key.is_empty() && !self.cache.contains(key))
            .filter(|key| seen.insert(*key))
            .map(str::to_owned)
            .collect()
    }

    /// Translate every region, resolving through the cache.
    pub async fn translate_regions(
        &self,
        regions: &[TextRegion],
        target: &TargetLanguage,
    ) -> Result<(Vec<TranslatedRegion>, BatchReport)> {
        self.translate_with(regions, target, |_| ControlFlow::Continue(())).await
    }

    /// Translate every region, calling `on_chunk` before each chunk is sent.
    ///
    /// Returning `ControlFlow::Break` from the hook stops the run with
    /// [`BlattwerkError::Cancelled`]; chunks already translated stay cached.
    #[instrument(skip_all, fields(regions = regions.len(), target = %target))]
    pub async fn translate_with<F>(
        &self,
        regions: &[TextRegion],
        target: &TargetLanguage,
        mut on_chunk: F,
    ) -> Result<(Vec<TranslatedRegion>, BatchReport)>
    where
        F: FnMut(ChunkProgress) -> ControlFlow<()> + Send,
    {
        let pending = self.pending_keys(regions);
        let mut report = BatchReport {
            regions: regions.len(),
            pending: pending.len(),
            ..BatchReport::default()
        };
        debug!(pending = pending.len(), "Collected untranslated strings");

        let chunks: Vec<&[String]> = pending.chunks(self.chunk_size).collect();
        let mut strings_done = 0;
        for (index, chunk) in chunks.iter().enumerate() {
            let progress = ChunkProgress {
                chunk: index,
                chunks: chunks.len(),
                chunk_len: chunk.len(),
                strings_done,
                strings_total: pending.len(),
            };
            if on_chunk(progress).is_break() {
                info!(chunk = index, "Translation cancelled");
                return Err(BlattwerkError::Cancelled);
            }

            report.calls += 1;
            match self.send_chunk(chunk, target).await {
                Ok(translations) => {
                    for (source, translated) in chunk.iter().zip(translations) {
                        self.cache.put(source.clone(), translated);
                    }
                    self.cache.flush_logged();
                    debug!(chunk = index, strings = chunk.len(), "Chunk translated");
                }
                Err(err) => {
                    report.failed_chunks += 1;
                    warn!(chunk = index, strings = chunk.len(), error = %err, "Chunk failed; using source text");
                    if index + 1 < chunks.len() && !self.backoff.is_zero() {
                        tokio::time::sleep(self.backoff).await;
                    }
                }
            }
            strings_done += chunk.len();
        }

        let translated: Vec<TranslatedRegion> = regions
            .iter()
            .map(|region| {
                let translated_text = match self.cache.get(region.key()) {
                    Some(text) => text,
                    None => {
                        report.fallbacks += 1;
                        region.source_text.clone()
                    }
                };
                TranslatedRegion {
                    region: region.clone(),
                    translated_text,
                }
            })
            .collect();

        Ok((translated, report))
    }

    async fn send_chunk(&self, chunk: &[String], target: &TargetLanguage) -> Result<Vec<String>> {
        let translations = tokio::time::timeout(self.chunk_timeout, self.service.translate_batch(chunk, target))
            .await
            .map_err(|_| {
                BlattwerkError::TimedOut(format!("translation chunk after {:?}", self.chunk_timeout))
            })??;
        if translations.len() != chunk.len() {
            return Err(BlattwerkError::Translation(format!(
                "expected {} translations, got {}",
                chunk.len(),
                translations.len()
            )));
        }
        Ok(translations)
    }
}

impl std::fmt::Debug for BatchTranslator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchTranslator")
            .field("cache", &self.cache)
            .field("chunk_size", &self.chunk_size)
            .field("backoff", &self.backoff)
            .field("chunk_timeout", &self.chunk_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use blattwerk_core::BoundingBox;

    struct Upper;

    #[async_trait]
    impl TranslationService for Upper {
        async fn translate_batch(&self, texts: &[String], _: &TargetLanguage) -> Result<Vec<String>> {
            Ok(texts.iter().map(|t| t.to_uppercase()).collect())
        }
    }

    struct Short;

    #[async_trait]
    impl TranslationService for Short {
        async fn translate_batch(&self, _: &[String], _: &TargetLanguage) -> Result<Vec<String>> {
            Ok(vec!["only one".into()])
        }
    }

    fn region(text: &str) -> TextRegion {
        TextRegion::new(0, BoundingBox::new(0.0, 0.0, 10.0, 10.0), text)
    }

    #[test]
    fn pending_keys_are_trimmed_unique_and_ordered() {
        let translator = BatchTranslator::new(Arc::new(Upper), TranslationCache::in_memory());
        translator.cache().put("cached", "đã lưu");
        let regions: Vec<TextRegion> = ["  b ", "a", "b", "", "   ", "cached", "a"]
            .into_iter()
            .map(region)
            .collect();
        assert_eq!(translator.pending_keys(&regions), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn wrong_length_response_counts_as_a_failed_chunk() {
        let translator = BatchTranslator::new(Arc::new(Short), TranslationCache::in_memory())
            .with_backoff(Duration::ZERO);
        let regions = vec![region("one"), region("two")];
        let target = TargetLanguage::parse("vi").unwrap();

        let (out, report) = translator.translate_regions(&regions, &target).await.unwrap();
        assert_eq!(report.failed_chunks, 1);
        assert_eq!(report.fallbacks, 2);
        assert_eq!(out[0].translated_text, "one");
        assert!(translator.cache().is_empty());
    }

    #[tokio::test]
    async fn break_from_hook_cancels_before_sending() {
        let translator = BatchTranslator::new(Arc::new(Upper), TranslationCache::in_memory());
        let target = TargetLanguage::parse("vi").unwrap();
        let result = translator
            .translate_with(&[region("x")], &target, |_| ControlFlow::Break(()))
            .await;
        assert!(matches!(result, Err(BlattwerkError::Cancelled)));
        assert!(translator.cache().is_empty());
    }

    #[tokio::test]
    async fn nothing_pending_means_no_hook_calls() {
        let translator = BatchTranslator::new(Arc::new(Upper), TranslationCache::in_memory());
        let target = TargetLanguage::parse("en").unwrap();
        let mut hooks = 0;
        let (out, report) = translator
            .translate_with(&[region("   ")], &target, |_| {
                hooks += 1;
                ControlFlow::Continue(())
            })
            .await
            .unwrap();
        assert_eq!(hooks, 0);
        assert_eq!(report.calls, 0);
        assert_eq!(out[0].translated_text, "   ");
    }
}
