// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Remote translation services.

use std::time::Duration;

use async_trait::async_trait;
use blattwerk_core::TargetLanguage;
use blattwerk_core::error::{BlattwerkError, Result};
use serde_json::Value;
use tracing::{debug, instrument};

/// Translates a batch of strings into one target language.
///
/// The result has one entry per input, in input order. Any transport or
/// quota failure fails the whole batch.
#[async_trait]
pub trait TranslationService: Send + Sync {
    async fn translate_batch(&self, texts: &[String], target: &TargetLanguage) -> Result<Vec<String>>;
}

/// Client for the public Google Translate `gtx` endpoint.
///
/// Strings are sent one request each, in order, over a pooled connection.
#[derive(Debug, Clone)]
pub struct GoogleTranslateClient {
    client: reqwest::Client,
    endpoint: String,
}

impl GoogleTranslateClient {
    pub const DEFAULT_ENDPOINT: &'static str = "https://translate.googleapis.com/translate_a/single";

    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Some(Duration::from_secs(30)))
            .build()
            .map_err(|err| BlattwerkError::Translation(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    async fn translate_one(&self, text: &str, target: &TargetLanguage) -> Result<String> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("client", "gtx"),
                ("sl", "auto"),
                ("tl", target.code()),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await
            .map_err(|err| BlattwerkError::Translation(format!("request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BlattwerkError::Translation(format!("HTTP {status}")));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|err| BlattwerkError::Translation(format!("unreadable response: {err}")))?;
        parse_gtx_response(&body)
    }
}

#[async_trait]
impl TranslationService for GoogleTranslateClient {
    #[instrument(skip_all, fields(count = texts.len(), target = %target))]
    async fn translate_batch(&self, texts: &[String], target: &TargetLanguage) -> Result<Vec<String>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.translate_one(text, target).await?);
        }
        debug!(translated = out.len(), "Batch translated");
        Ok(out)
    }
}

/// Join the translated segments of a `gtx` response: `body[0][i][0]`.
pub fn parse_gtx_response(body: &Value) -> Result<String> {
    let segments = body
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| BlattwerkError::Translation("response has no segments".into()))?;
    Ok(segments
        .iter()
        .filter_map(|segment| segment.get(0).and_then(Value::as_str))
        .collect())
}
