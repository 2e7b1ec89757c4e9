// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Content-stream text interpreter.
//
// Walks a decoded page content stream tracking just enough graphics and text
// state (CTM, text matrices, font, size, leading, horizontal scaling, fill
// colour) to place every text-showing operator on the page.

use std::collections::HashMap;

use blattwerk_core::{BoundingBox, RgbColor};
use lopdf::Object;
use lopdf::content::Operation;

/// Average glyph advance as a fraction of the font size.
const AVG_GLYPH_WIDTH: f32 = 0.5;
/// Portion of the em box above the baseline.
const ASCENT: f32 = 0.8;

/// Font facts the interpreter and the replacement step care about.
#[derive(Debug, Clone, Default)]
pub(crate) struct FontInfo {
    pub base_font: String,
    /// Type0 (CID-keyed) font; its strings are not single-byte text.
    pub composite: bool,
    /// Carries its own font program, usually a subset.
    pub embedded: bool,
}

impl FontInfo {
    /// Base-14 fonts that viewers always have and that cover WinAnsi.
    pub fn is_standard(&self) -> bool {
        const STANDARD: &[&str] = &[
            "Helvetica",
            "Helvetica-Bold",
            "Helvetica-Oblique",
            "Helvetica-BoldOblique",
            "Times-Roman",
            "Times-Bold",
            "Times-Italic",
            "Times-BoldItalic",
            "Courier",
            "Courier-Bold",
            "Courier-Oblique",
            "Courier-BoldOblique",
        ];
        !self.embedded && !self.composite && STANDARD.contains(&self.base_font.as_str())
    }
}

/// One text-showing operation, placed in top-left page coordinates.
#[derive(Debug, Clone)]
pub(crate) struct RawSpan {
    /// Index of the operation within the page's content stream.
    pub anchor: usize,
    pub text: String,
    /// Resource name of the active font (`F1`, `TT0`, ...).
    pub font_resource: Vec<u8>,
    /// Size operand of the active `Tf`.
    pub tf_size: f32,
    /// Size after the text and current transformation matrices.
    pub rendered_size: f32,
    /// Advance in unscaled text space, `Tz` included.
    pub advance: f32,
    /// Active `Tz` as a fraction (1.0 = 100 %).
    pub horizontal_scaling: f32,
    pub bbox: BoundingBox,
    pub color: RgbColor,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f32; 6]);

impl Matrix {
    const IDENTITY: Self = Self([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn translate(tx: f32, ty: f32) -> Self {
        Self([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    /// `self × other` in PDF row-vector convention.
    fn then(&self, other: &Self) -> Self {
        let [a1, b1, c1, d1, e1, f1] = self.0;
        let [a2, b2, c2, d2, e2, f2] = other.0;
        Self([
            a1 * a2 + b1 * c2,
            a1 * b2 + b1 * d2,
            c1 * a2 + d1 * c2,
            c1 * b2 + d1 * d2,
            e1 * a2 + f1 * c2 + e2,
            e1 * b2 + f1 * d2 + f2,
        ])
    }

    fn horizontal_scale(&self) -> f32 {
        (self.0[0] * self.0[0] + self.0[1] * self.0[1]).sqrt()
    }

    fn vertical_scale(&self) -> f32 {
        (self.0[2] * self.0[2] + self.0[3] * self.0[3]).sqrt()
    }
}

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    fill: RgbColor,
    /// `Tz`; text state lives in the graphics state, so `q`/`Q` cover it.
    horizontal_scaling: f32,
}

/// Page geometry needed to flip PDF user space into top-left coordinates.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PageFrame {
    pub origin_x: f32,
    pub origin_y: f32,
    pub height: f32,
}

impl Default for PageFrame {
    fn default() -> Self {
        // US Letter.
        Self {
            origin_x: 0.0,
            origin_y: 0.0,
            height: 792.0,
        }
    }
}

struct Interpreter<'a> {
    fonts: &'a HashMap<Vec<u8>, FontInfo>,
    frame: PageFrame,
    gs: GraphicsState,
    stack: Vec<GraphicsState>,
    tm: Matrix,
    tlm: Matrix,
    font: Vec<u8>,
    size: f32,
    leading: f32,
    spans: Vec<RawSpan>,
}

/// Interpret `operations` and return every non-empty text span.
///
/// Spans drawn with composite fonts are skipped; their font resource names
/// are returned so the caller can report them.
pub(crate) fn collect_spans(
    operations: &[Operation],
    fonts: &HashMap<Vec<u8>, FontInfo>,
    frame: PageFrame,
) -> (Vec<RawSpan>, Vec<Vec<u8>>) {
    let mut interp = Interpreter {
        fonts,
        frame,
        gs: GraphicsState {
            ctm: Matrix::IDENTITY,
            fill: RgbColor::BLACK,
            horizontal_scaling: 1.0,
        },
        stack: Vec::new(),
        tm: Matrix::IDENTITY,
        tlm: Matrix::IDENTITY,
        font: Vec::new(),
        size: 0.0,
        leading: 0.0,
        spans: Vec::new(),
    };
    let mut skipped = Vec::new();

    for (index, op) in operations.iter().enumerate() {
        let nums = numbers(&op.operands);
        match op.operator.as_str() {
            "q" => interp.stack.push(interp.gs.clone()),
            "Q" => {
                if let Some(saved) = interp.stack.pop() {
                    interp.gs = saved;
                }
            }
            "cm" if nums.len() == 6 => {
                let m = Matrix([nums[0], nums[1], nums[2], nums[3], nums[4], nums[5]]);
                interp.gs.ctm = m.then(&interp.gs.ctm);
            }
            "BT" => {
                interp.tm = Matrix::IDENTITY;
                interp.tlm = Matrix::IDENTITY;
            }
            "Tf" => {
                if let Some(Object::Name(name)) = op.operands.first() {
                    interp.font = name.clone();
                }
                if let Some(size) = op.operands.get(1).and_then(number) {
                    interp.size = size;
                }
            }
            "TL" if !nums.is_empty() => interp.leading = nums[0],
            "Tz" if !nums.is_empty() => interp.gs.horizontal_scaling = nums[0] / 100.0,
            "Td" if nums.len() == 2 => interp.move_line(nums[0], nums[1]),
            "TD" if nums.len() == 2 => {
                interp.leading = -nums[1];
                interp.move_line(nums[0], nums[1]);
            }
            "Tm" if nums.len() == 6 => {
                let m = Matrix([nums[0], nums[1], nums[2], nums[3], nums[4], nums[5]]);
                interp.tm = m;
                interp.tlm = m;
            }
            "T*" => interp.next_line(),
            "rg" | "sc" | "scn" if nums.len() == 3 => {
                interp.gs.fill = RgbColor::from_unit(nums[0], nums[1], nums[2]);
            }
            "g" | "sc" | "scn" if nums.len() == 1 => {
                interp.gs.fill = RgbColor::from_unit(nums[0], nums[0], nums[0]);
            }
            "k" | "sc" | "scn" if nums.len() == 4 => {
                interp.gs.fill = RgbColor::from_cmyk(nums[0], nums[1], nums[2], nums[3]);
            }
            "Tj" | "TJ" | "'" | "\"" => {
                if op.operator == "'" || op.operator == "\"" {
                    interp.next_line();
                }
                let composite = interp
                    .fonts
                    .get(&interp.font)
                    .is_some_and(|info| info.composite);
                if composite {
                    if !skipped.contains(&interp.font) {
                        skipped.push(interp.font.clone());
                    }
                    continue;
                }
                let text = shown_text(op);
                interp.show(index, text);
            }
            _ => {}
        }
    }

    (interp.spans, skipped)
}

impl Interpreter<'_> {
    fn move_line(&mut self, tx: f32, ty: f32) {
        self.tlm = Matrix::translate(tx, ty).then(&self.tlm);
        self.tm = self.tlm;
    }

    fn next_line(&mut self) {
        self.move_line(0.0, -self.leading);
    }

    fn show(&mut self, anchor: usize, text: String) {
        let scaling = self.gs.horizontal_scaling;
        let advance = single_byte_advance(text.chars().count()) * self.size * scaling;
        let trm = self.tm.then(&self.gs.ctm);

        if !text.trim().is_empty() && self.size > 0.0 {
            let rendered_size = self.size * trm.vertical_scale();
            let width = advance * trm.horizontal_scale();
            let [.., e, f] = trm.0;
            let x = e - self.frame.origin_x;
            let baseline = f - self.frame.origin_y;
            let top = self.frame.height - (baseline + rendered_size * ASCENT);
            self.spans.push(RawSpan {
                anchor,
                text,
                font_resource: self.font.clone(),
                tf_size: self.size,
                rendered_size,
                advance,
                horizontal_scaling: scaling,
                bbox: BoundingBox::new(x, top, width, rendered_size),
                color: self.gs.fill,
            });
        }

        self.tm = Matrix::translate(advance, 0.0).then(&self.tm);
    }
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

fn numbers(operands: &[Object]) -> Vec<f32> {
    operands.iter().filter_map(number).collect()
}

/// Text of a show operator. Large negative `TJ` adjustments read as spaces.
fn shown_text(op: &Operation) -> String {
    match op.operator.as_str() {
        "TJ" => {
            let mut out = String::new();
            if let Some(Object::Array(items)) = op.operands.first() {
                for item in items {
                    match item {
                        Object::String(bytes, _) => out.push_str(&decode_text(bytes)),
                        other => {
                            if number(other).is_some_and(|n| n < -200.0) && !out.ends_with(' ') {
                                out.push(' ');
                            }
                        }
                    }
                }
            }
            out
        }
        _ => match op.operands.last() {
            Some(Object::String(bytes, _)) => decode_text(bytes),
            _ => String::new(),
        },
    }
}

/// Decode a PDF string: UTF-16BE with BOM, otherwise single-byte Latin-1.
pub(crate) fn decode_text(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| b as char).collect()
}

/// Estimated advance of `glyphs` single-byte glyphs at size 1.
pub(crate) fn single_byte_advance(glyphs: usize) -> f32 {
    glyphs as f32 * AVG_GLYPH_WIDTH
}

/// Encode text for a single-byte font, or `None` if any character lies
/// outside Latin-1.
pub(crate) fn encode_latin1(text: &str) -> Option<Vec<u8>> {
    text.chars().map(|ch| u8::try_from(u32::from(ch)).ok()).collect()
}

/// Like [`encode_latin1`], but Vietnamese letters outside Latin-1 are folded
/// to their base letter. `None` if anything else is left over.
pub(crate) fn encode_latin1_folded(text: &str) -> Option<Vec<u8>> {
    text.chars()
        .map(|ch| u8::try_from(u32::from(ch)).ok().or_else(|| fold_latin(ch).map(|base| base as u8)))
        .collect()
}

fn fold_latin(ch: char) -> Option<char> {
    let code = ch as u32;
    let base = match code {
        0x0102 | 0x0103 => 'a',
        0x0110 | 0x0111 => 'd',
        0x0128 | 0x0129 => 'i',
        0x0168 | 0x0169 => 'u',
        0x01A0 | 0x01A1 => 'o',
        0x01AF | 0x01B0 => 'u',
        0x1EA0..=0x1EB7 => 'a',
        0x1EB8..=0x1EC7 => 'e',
        0x1EC8..=0x1ECB => 'i',
        0x1ECC..=0x1EE3 => 'o',
        0x1EE4..=0x1EF1 => 'u',
        0x1EF2..=0x1EF9 => 'y',
        _ => return None,
    };
    // Upper- and lowercase forms alternate, uppercase on the even code point,
    // except U+01AF/U+01B0 which start on an odd one.
    let upper = if code == 0x01AF {
        true
    } else if code == 0x01B0 {
        false
    } else {
        code % 2 == 0
    };
    Some(if upper { base.to_ascii_uppercase() } else { base })
}
