// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// blattwerk-pipeline: Orchestration for the Blattwerk translator.
//
// The structured path runs sequentially on a blocking thread; the visual
// path fans pages out to a bounded pool of tasks sharing one translation
// cache. Both report through a single event channel.

pub mod cancel;
pub mod event;
pub mod runner;
pub mod structured;
pub mod visual;

pub use cancel::CancelToken;
pub use event::{EventSink, LogLevel, PipelineEvent};
pub use runner::{Pipeline, RunRequest};
pub use structured::{StructuredRunner, StructuredSummary};
pub use visual::{PageFailure, PageOutcome, RenderedPage, VisualCoordinator, VisualRun, VisualSettings};
