// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Blattwerk: layout-preserving PDF translator
//
// Entry point. Parses arguments, initialises logging, runs the pipeline, and
// owns the terminal display through a single event consumer.

mod progress;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use blattwerk_core::error::Result;
use blattwerk_core::human_errors::humanize_error;
use blattwerk_core::{KNOWN_LANGUAGES, PipelineConfig, RasterQuality, TargetLanguage, TranslationMode};
use blattwerk_pipeline::{EventSink, Pipeline, RunRequest};
use blattwerk_translate::GoogleTranslateClient;
use clap::Parser;

/// Translate a PDF while keeping its layout.
#[derive(Parser, Debug)]
#[command(name = "blattwerk", version, about, long_about = None)]
struct Args {
    /// PDF to translate. The result is written beside it.
    #[arg(required_unless_present = "list_languages")]
    input: Option<PathBuf>,

    /// Target language code (vi, en, ja, ko, zh-cn, ...)
    #[arg(short, long, default_value = "vi")]
    lang: String,

    /// `structured` for PDFs with a text layer, `visual` for scans
    #[arg(short, long, default_value = "structured")]
    mode: String,

    /// Rasterization DPI for visual mode: 150, 200, or 300
    #[arg(long, default_value_t = 200)]
    dpi: u32,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Translation cache file (overrides the configuration)
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Font for re-rendered text in visual mode
    #[arg(long)]
    font: Option<PathBuf>,

    /// Worker count for visual mode
    #[arg(short, long)]
    workers: Option<usize>,

    /// Run OCR in-process with `ocrs`, loading models from DIR or the ocrs cache
    #[cfg(feature = "ocr")]
    #[arg(long, value_name = "DIR", num_args = 0..=1)]
    ocrs: Option<Option<PathBuf>>,

    /// Print the built-in target languages and exit
    #[arg(long)]
    list_languages: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "debug,blattwerk::events=off"
    } else {
        "info,blattwerk::events=off"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    if args.list_languages {
        for (code, name) in KNOWN_LANGUAGES {
            println!("{code:8}{name}");
        }
        return ExitCode::SUCCESS;
    }

    match run(args).await {
        Ok(output) => {
            println!("{}", output.display());
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::debug!(error = ?err, "Run failed");
            eprintln!("{}", humanize_error(&err));
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<PathBuf> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(cache) = args.cache {
        config.cache_file_path = cache;
    }
    if args.font.is_some() {
        config.font_path = args.font;
    }
    if args.workers.is_some() {
        config.pool_size = args.workers;
    }
    config.validate()?;

    let request = RunRequest {
        input: args.input.unwrap_or_default(),
        target: TargetLanguage::parse(&args.lang)?,
        mode: args.mode.parse::<TranslationMode>()?,
        quality: RasterQuality::from_dpi(args.dpi)?,
    };
    tracing::info!(
        input = %request.input.display(),
        target = %request.target,
        mode = ?request.mode,
        "Blattwerk starting"
    );

    let service = Arc::new(GoogleTranslateClient::new(
        config.translation_endpoint.clone(),
        config.request_timeout(),
    )?);
    let (events, rx) = EventSink::channel();
    let pipeline = Pipeline::new(config, service).with_events(events);
    #[cfg(feature = "ocr")]
    let pipeline = match &args.ocrs {
        Some(Some(dir)) => pipeline.with_ocr(Arc::new(blattwerk_document::OcrsEngine::from_model_dir(dir)?)),
        Some(None) => pipeline.with_ocr(Arc::new(blattwerk_document::OcrsEngine::with_defaults()?)),
        None => pipeline,
    };

    let cancel = pipeline.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let display = tokio::spawn(progress::consume(rx));
    let result = pipeline.run(&request).await;
    // Closing the last sender ends the consumer loop.
    drop(pipeline);
    let _ = display.await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn argument_definitions_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn defaults_match_the_common_case() {
        let args = Args::try_parse_from(["blattwerk", "report.pdf"]).unwrap();
        assert_eq!(args.lang, "vi");
        assert_eq!(args.mode, "structured");
        assert_eq!(args.dpi, 200);
        assert!(Args::try_parse_from(["blattwerk"]).is_err());
        assert!(Args::try_parse_from(["blattwerk", "--list-languages"]).is_ok());
    }
}
