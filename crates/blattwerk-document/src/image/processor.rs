// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Downscaled previews of rendered pages for the progress sink.

use image::imageops::FilterType;
use image::RgbImage;
use tracing::{debug, instrument};

/// Shrink a rendered page so its height is at most `max_height`, preserving
/// aspect ratio. Pages already small enough are returned unchanged.
#[instrument(skip(page), fields(width = page.width(), height = page.height()))]
pub fn preview_thumbnail(page: &RgbImage, max_height: u32) -> RgbImage {
    let (width, height) = page.dimensions();
    if max_height == 0 || height <= max_height {
        return page.clone();
    }
    let new_width = ((width as u64 * max_height as u64) / height as u64).max(1) as u32;
    let thumb = image::imageops::resize(page, new_width, max_height, FilterType::Lanczos3);
    debug!(new_w = thumb.width(), new_h = thumb.height(), "Preview created");
    thumb
}
