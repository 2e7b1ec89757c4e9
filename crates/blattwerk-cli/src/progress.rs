// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Terminal display. The only owner of the progress bar.

use blattwerk_pipeline::PipelineEvent;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc::UnboundedReceiver;

pub async fn consume(mut rx: UnboundedReceiver<PipelineEvent>) {
    let bar = ProgressBar::new(0);
    if let Ok(style) =
        ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        bar.set_style(style.progress_chars("=>-"));
    }

    while let Some(event) = rx.recv().await {
        match &event {
            PipelineEvent::Log { .. } => bar.println(event.to_string()),
            PipelineEvent::Progress { completed, total } => {
                bar.set_length(*total as u64);
                bar.set_position(*completed as u64);
            }
            PipelineEvent::Stats(stats) => {
                if let Some(eta) = stats.estimated_remaining {
                    bar.set_message(format!("~{}s left", eta.as_secs()));
                }
            }
            PipelineEvent::Preview { page_index, .. } => {
                bar.set_message(format!("page {} done", page_index + 1));
            }
            PipelineEvent::Finished { .. } => bar.finish_with_message("done"),
        }
    }

    if !bar.is_finished() {
        bar.abandon();
    }
}
