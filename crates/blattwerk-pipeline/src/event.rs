// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Run events: the only path from pipeline tasks to the presentation layer.
//
// Tasks send; a single consumer loop owns whatever display state exists.
// Every log event is mirrored to `tracing` under the `blattwerk::events`
// target.

use std::fmt;
use std::path::PathBuf;

use blattwerk_core::RunStats;
use chrono::{DateTime, Local};
use image::RgbImage;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone)]
pub enum PipelineEvent {
    Log {
        at: DateTime<Local>,
        level: LogLevel,
        message: String,
    },
    Progress {
        completed: usize,
        total: usize,
    },
    Stats(RunStats),
    Preview {
        page_index: usize,
        thumbnail: RgbImage,
    },
    Finished {
        output_path: PathBuf,
    },
}

impl fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Log { at, level, message } => match level {
                LogLevel::Info => write!(f, "[{}] {message}", at.format("%H:%M:%S")),
                LogLevel::Warn => write!(f, "[{}] warning: {message}", at.format("%H:%M:%S")),
                LogLevel::Error => write!(f, "[{}] error: {message}", at.format("%H:%M:%S")),
            },
            Self::Progress { completed, total } => write!(f, "{completed}/{total}"),
            Self::Stats(stats) => {
                write!(f, "{}/{} pages, {}s elapsed", stats.pages_done, stats.total_pages, stats.elapsed.as_secs())?;
                match stats.estimated_remaining {
                    Some(eta) => write!(f, ", ~{}s remaining", eta.as_secs()),
                    None => Ok(()),
                }
            }
            Self::Preview { page_index, thumbnail } => {
                write!(f, "preview of page {} ({}x{})", page_index + 1, thumbnail.width(), thumbnail.height())
            }
            Self::Finished { output_path } => write!(f, "saved {}", output_path.display()),
        }
    }
}

/// Sending half of the event channel. Cheap to clone; usable from blocking
/// threads. A sink with no receiver drops events silently.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<PipelineEvent>>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that discards everything except the `tracing` mirror.
    pub fn discard() -> Self {
        Self { tx: None }
    }

    pub fn info(&self, message: impl Into<String>) {
        let message = message.into();
        info!(target: "blattwerk::events", "{message}");
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        warn!(target: "blattwerk::events", "{message}");
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        error!(target: "blattwerk::events", "{message}");
        self.log(LogLevel::Error, message);
    }

    pub fn progress(&self, completed: usize, total: usize) {
        self.send(PipelineEvent::Progress { completed, total });
    }

    pub fn stats(&self, stats: RunStats) {
        self.send(PipelineEvent::Stats(stats));
    }

    pub fn preview(&self, page_index: usize, thumbnail: RgbImage) {
        self.send(PipelineEvent::Preview { page_index, thumbnail });
    }

    pub fn finished(&self, output_path: PathBuf) {
        self.send(PipelineEvent::Finished { output_path });
    }

    fn log(&self, level: LogLevel, message: String) {
        self.send(PipelineEvent::Log {
            at: Local::now(),
            level,
            message,
        });
    }

    fn send(&self, event: PipelineEvent) {
        if let Some(tx) = &self.tx {
            // Receiver gone means nobody is watching; the run carries on.
            let _ = tx.send(event);
        }
    }
}
