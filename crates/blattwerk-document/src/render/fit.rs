// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Font-fit wrapping: pick the largest font size at which greedily wrapped text
// fits a box's height, shrinking one unit at a time down to a floor.

use blattwerk_core::PipelineConfig;

use super::TextMeasure;

/// Sizes above this are clamped before the search starts.
const MAX_FONT_SIZE: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitParams {
    /// First size tried, as a fraction of the box height.
    pub initial_ratio: f32,
    /// Smallest size tried; also the size of the truncated fallback.
    pub min_size: u32,
    /// Characters kept by the truncated fallback.
    pub truncate_chars: usize,
}

impl Default for FitParams {
    fn default() -> Self {
        Self {
            initial_ratio: 0.9,
            min_size: 5,
            truncate_chars: 20,
        }
    }
}

impl From<&PipelineConfig> for FitParams {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            initial_ratio: config.initial_font_ratio,
            min_size: config.min_font_size,
            truncate_chars: config.truncate_chars,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FitOutcome {
    /// Wrapped lines at `size`, stacked `line_height` apart from the top.
    Fitted {
        size: f32,
        line_height: f32,
        lines: Vec<String>,
    },
    /// Nothing fit; draw this shortened text on one line at `size`.
    Truncated { size: f32, text: String },
}

/// Lay out `text` inside a `width` x `height` box.
///
/// Returns `None` only when `text` has no words. Runs at most one wrap pass
/// per candidate size, so the search is bounded by the starting size.
pub fn fit_text(
    measure: &dyn TextMeasure,
    text: &str,
    width: f32,
    height: f32,
    params: &FitParams,
) -> Option<FitOutcome> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return None;
    }

    let min_size = params.min_size.max(1);
    if width > 0.0 && height > 0.0 {
        let start = (height * params.initial_ratio).floor();
        let mut size = if start.is_finite() && start > 0.0 {
            (start as u32).min(MAX_FONT_SIZE)
        } else {
            0
        };

        while size >= min_size {
            let px = size as f32;
            let lines = wrap_words(measure, &words, px, width);
            let line_height = measure.line_height(px);
            if line_height * lines.len() as f32 <= height {
                return Some(FitOutcome::Fitted {
                    size: px,
                    line_height,
                    lines,
                });
            }
            size -= 1;
        }
    }

    Some(FitOutcome::Truncated {
        size: min_size as f32,
        text: truncate(text, params.truncate_chars),
    })
}

/// Greedy wrap: extend the current line while it stays within `width`.
///
/// A word wider than `width` on its own still gets a line.
pub fn wrap_words(measure: &dyn TextMeasure, words: &[&str], size: f32, width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let Some((first, rest)) = words.split_first() else {
        return lines;
    };

    let mut current = (*first).to_string();
    for word in rest {
        let candidate = format!("{current} {word}");
        if measure.text_width(&candidate, size) <= width {
            current = candidate;
        } else {
            lines.push(std::mem::replace(&mut current, (*word).to_string()));
        }
    }
    lines.push(current);
    lines
}

fn truncate(text: &str, budget: usize) -> String {
    let mut short: String = text.trim().chars().take(budget).collect();
    short.push_str("...");
    short
}
