// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Outline font embedded for replacement text outside Latin-1.
//
// The whole font program goes into the document as a Type0 font with
// Identity-H encoding, so every shown code is a big-endian glyph id. A
// ToUnicode map keeps the written text extractable.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ab_glyph::{Font, FontVec};
use blattwerk_core::error::{BlattwerkError, Result};
use lopdf::{Document, Object, ObjectId, Stream, dictionary};
use tracing::{debug, info, warn};

use crate::render::SYSTEM_FONT_PATHS;

const BASE_FONT: &str = "BlattwerkUnicode";
/// `bfchar` blocks may hold at most 100 entries.
const BFCHAR_BLOCK: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outlines {
    TrueType,
    /// OpenType with CFF outlines (`OTTO`).
    Cff,
}

/// A font program that replacement text can be shown in.
pub struct UnicodeFont {
    program: Vec<u8>,
    face: FontVec,
    outlines: Outlines,
    units_per_em: f32,
    /// Glyphs shown so far and the character each one stands for.
    used: BTreeMap<u16, char>,
}

/// Glyph-id codes for one string in an embedded font.
#[derive(Debug, Clone)]
pub(crate) struct GlyphRun {
    pub codes: Vec<u8>,
    /// Advance in text space for a font size of 1.
    pub advance: f32,
}

impl UnicodeFont {
    /// The configured font file, else the first usable system font.
    pub fn load(configured: Option<&Path>) -> Option<Self> {
        if let Some(path) = configured {
            match Self::from_file(path) {
                Ok(font) => {
                    info!("Embedding font for replaced text: {}", path.display());
                    return Some(font);
                }
                Err(err) => warn!(error = %err, "Configured font cannot be embedded; trying system fonts"),
            }
        }

        for path in SYSTEM_FONT_PATHS.iter().map(PathBuf::from) {
            if let Ok(font) = Self::from_file(&path) {
                info!("Embedding system font for replaced text: {}", path.display());
                return Some(font);
            }
        }

        warn!("No embeddable font found; replaced text is limited to Latin-1");
        None
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_bytes(data).map_err(|err| {
            BlattwerkError::PdfError(format!("{}: {err}", path.display()))
        })
    }

    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let outlines = match data.get(..4) {
            Some(b"ttcf") => {
                return Err(BlattwerkError::PdfError(
                    "font collections cannot be embedded; pick a single .ttf or .otf".into(),
                ));
            }
            Some(b"OTTO") => Outlines::Cff,
            _ => Outlines::TrueType,
        };
        let face = FontVec::try_from_vec(data.clone())
            .map_err(|err| BlattwerkError::PdfError(format!("invalid font data: {err}")))?;
        let units_per_em = face
            .units_per_em()
            .filter(|units| *units > 0.0)
            .ok_or_else(|| BlattwerkError::PdfError("font has no units-per-em".into()))?;
        debug!(glyphs = face.glyph_count(), ?outlines, "Embeddable font parsed");
        Ok(Self {
            program: data,
            face,
            outlines,
            units_per_em,
            used: BTreeMap::new(),
        })
    }

    /// Encode `text` as glyph ids, failing on the first character the font
    /// has no glyph for.
    pub(crate) fn shape(&mut self, text: &str) -> Result<GlyphRun> {
        let mut codes = Vec::with_capacity(text.len() * 2);
        let mut glyphs = Vec::new();
        let mut advance = 0.0;
        for ch in text.chars() {
            let id = self.face.glyph_id(ch);
            if id.0 == 0 {
                return Err(BlattwerkError::PdfError(format!(
                    "embedded font has no glyph for {ch:?} (U+{:04X})",
                    ch as u32
                )));
            }
            advance += self.face.h_advance_unscaled(id) / self.units_per_em;
            codes.extend_from_slice(&id.0.to_be_bytes());
            glyphs.push((id.0, ch));
        }
        self.used.extend(glyphs);
        Ok(GlyphRun { codes, advance })
    }

    pub(crate) fn is_used(&self) -> bool {
        !self.used.is_empty()
    }

    /// Add the font and its descendants to `document`; returns the Type0
    /// font dictionary's id.
    pub(crate) fn embed(&self, document: &mut Document) -> ObjectId {
        let to_thousandths = |units: f32| (units * 1000.0 / self.units_per_em).round() as i64;
        let ascent = to_thousandths(self.face.ascent_unscaled());
        let descent = to_thousandths(self.face.descent_unscaled());

        let (file_key, program) = match self.outlines {
            Outlines::TrueType => (
                "FontFile2",
                Stream::new(
                    dictionary! { "Length1" => self.program.len() as i64 },
                    self.program.clone(),
                ),
            ),
            Outlines::Cff => (
                "FontFile3",
                Stream::new(dictionary! { "Subtype" => "OpenType" }, self.program.clone()),
            ),
        };
        let program_id = document.add_object(program);

        let mut descriptor = dictionary! {
            "Type" => "FontDescriptor",
            "FontName" => BASE_FONT,
            "Flags" => Object::Integer(32),
            "FontBBox" => Object::Array(vec![
                Object::Integer(0),
                Object::Integer(descent),
                Object::Integer(1000),
                Object::Integer(ascent),
            ]),
            "ItalicAngle" => Object::Integer(0),
            "Ascent" => ascent,
            "Descent" => descent,
            "CapHeight" => ascent,
            "StemV" => Object::Integer(80),
        };
        descriptor.set(file_key, program_id);
        let descriptor_id = document.add_object(descriptor);

        let mut widths = Vec::with_capacity(self.used.len() * 2);
        for &glyph in self.used.keys() {
            let advance = self.face.h_advance_unscaled(ab_glyph::GlyphId(glyph));
            widths.push(Object::Integer(i64::from(glyph)));
            widths.push(Object::Array(vec![Object::Integer(to_thousandths(advance))]));
        }

        let subtype = match self.outlines {
            Outlines::TrueType => "CIDFontType2",
            Outlines::Cff => "CIDFontType0",
        };
        let mut descendant = dictionary! {
            "Type" => "Font",
            "Subtype" => subtype,
            "BaseFont" => BASE_FONT,
            "CIDSystemInfo" => dictionary! {
                "Registry" => Object::string_literal("Adobe"),
                "Ordering" => Object::string_literal("Identity"),
                "Supplement" => Object::Integer(0),
            },
            "FontDescriptor" => descriptor_id,
            "DW" => Object::Integer(1000),
            "W" => widths,
        };
        if self.outlines == Outlines::TrueType {
            descendant.set("CIDToGIDMap", "Identity");
        }
        let descendant_id = document.add_object(descendant);

        let to_unicode = document.add_object(Stream::new(dictionary! {}, self.to_unicode_cmap().into_bytes()));
        document.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => BASE_FONT,
            "Encoding" => "Identity-H",
            "DescendantFonts" => Object::Array(vec![Object::Reference(descendant_id)]),
            "ToUnicode" => to_unicode,
        })
    }

    fn to_unicode_cmap(&self) -> String {
        let mut cmap = String::from(
            "/CIDInit /ProcSet findresource begin\n\
             12 dict begin\n\
             begincmap\n\
             /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
             /CMapName /Adobe-Identity-UCS def\n\
             /CMapType 2 def\n\
             1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n",
        );
        let entries: Vec<(&u16, &char)> = self.used.iter().collect();
        for block in entries.chunks(BFCHAR_BLOCK) {
            cmap.push_str(&format!("{} beginbfchar\n", block.len()));
            for (glyph, ch) in block {
                let mut units = [0u16; 2];
                let utf16: String = ch
                    .encode_utf16(&mut units)
                    .iter()
                    .map(|unit| format!("{unit:04X}"))
                    .collect();
                cmap.push_str(&format!("<{glyph:04X}> <{utf16}>\n"));
            }
            cmap.push_str("endbfchar\n");
        }
        cmap.push_str(
            "endcmap\n\
             CMapName currentdict /CMapName get /CMap defineresource pop\n\
             end\n\
             end\n",
        );
        cmap
    }
}
