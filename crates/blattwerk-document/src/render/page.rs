// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Visual page reconstruction.

use blattwerk_core::{BoundingBox, TranslatedRegion};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use tracing::{debug, instrument};

use super::TextMeasure;
use super::fit::{FitOutcome, FitParams, fit_text};

/// Integer pixel rectangle clipped to the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PixelRect {
    x: u32,
    y: u32,
    w: u32,
    h: u32,
}

fn clip(bbox: &BoundingBox, width: u32, height: u32) -> Option<PixelRect> {
    let x0 = bbox.x.floor().max(0.0);
    let y0 = bbox.y.floor().max(0.0);
    let x1 = bbox.right().ceil().min(width as f32);
    let y1 = bbox.bottom().ceil().min(height as f32);
    if !(x1 > x0 && y1 > y0) {
        return None;
    }
    Some(PixelRect {
        x: x0 as u32,
        y: y0 as u32,
        w: (x1 - x0) as u32,
        h: (y1 - y0) as u32,
    })
}

/// Median colour of the one-pixel ring around `rect`, falling back to the
/// rect's own edge when the ring is off-canvas, and to white when empty.
fn background_color(canvas: &RgbImage, rect: PixelRect) -> Rgb<u8> {
    let (x, y, w, h) = (rect.x as i64, rect.y as i64, rect.w as i64, rect.h as i64);
    let mut samples = ring_samples(canvas, x - 1, y - 1, x + w, y + h);
    if samples.is_empty() {
        samples = ring_samples(canvas, x, y, x + w - 1, y + h - 1);
    }
    if samples.is_empty() {
        return Rgb([255, 255, 255]);
    }

    let channel = |i: usize| {
        let mut values: Vec<u8> = samples.iter().map(|p| p.0[i]).collect();
        values.sort_unstable();
        values[values.len() / 2]
    };
    Rgb([channel(0), channel(1), channel(2)])
}

/// On-canvas pixels along the rectangle outline with inclusive corners.
fn ring_samples(canvas: &RgbImage, left: i64, top: i64, right: i64, bottom: i64) -> Vec<Rgb<u8>> {
    let (width, height) = canvas.dimensions();
    let horizontal = (left..=right).flat_map(|x| [(x, top), (x, bottom)]);
    let vertical = ((top + 1)..bottom).flat_map(|y| [(left, y), (right, y)]);
    horizontal
        .chain(vertical)
        .filter(|&(x, y)| x >= 0 && y >= 0 && x < width as i64 && y < height as i64)
        .map(|(x, y)| *canvas.get_pixel(x as u32, y as u32))
        .collect()
}

/// Black on light backgrounds, white on dark ones.
fn ink_for(background: Rgb<u8>) -> Rgb<u8> {
    let [r, g, b] = background.0;
    let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
    if luma < 128.0 {
        Rgb([255, 255, 255])
    } else {
        Rgb([0, 0, 0])
    }
}

/// Erase each region's box and draw its translation fitted inside it.
///
/// Degrades visually but never fails: off-canvas boxes are skipped and text
/// that cannot fit is truncated.
#[instrument(skip_all, fields(regions = regions.len()))]
pub fn reconstruct_visual_page(
    canvas: &mut RgbImage,
    regions: &[TranslatedRegion],
    font: &dyn TextMeasure,
    params: &FitParams,
) {
    let (width, height) = canvas.dimensions();
    let mut drawn = 0usize;

    for translated in regions {
        let Some(rect) = clip(&translated.region.bbox, width, height) else {
            continue;
        };
        let background = background_color(canvas, rect);
        draw_filled_rect_mut(
            canvas,
            Rect::at(rect.x as i32, rect.y as i32).of_size(rect.w, rect.h),
            background,
        );

        let ink = ink_for(background);
        let (x, y) = (rect.x as i32, rect.y as i32);
        match fit_text(font, &translated.translated_text, rect.w as f32, rect.h as f32, params) {
            Some(FitOutcome::Fitted {
                size,
                line_height,
                lines,
            }) => {
                for (i, line) in lines.iter().enumerate() {
                    let line_y = y + (i as f32 * line_height).round() as i32;
                    font.draw_text(canvas, x, line_y, size, ink, line);
                }
            }
            Some(FitOutcome::Truncated { size, text }) => {
                font.draw_text(canvas, x, y, size, ink, &text);
            }
            None => {}
        }
        drawn += 1;
    }

    debug!(drawn, "Page regions reconstructed");
}
