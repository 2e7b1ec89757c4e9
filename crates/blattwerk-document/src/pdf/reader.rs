// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Structured engine: read text spans from a PDF's embedded text layer and
// replace them in place using the `lopdf` crate.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use blattwerk_core::TextRegion;
use blattwerk_core::error::{BlattwerkError, Result};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat, dictionary};
use tracing::{debug, info, instrument, warn};

use super::StructuredEngine;
use super::content::{self, FontInfo, PageFrame, RawSpan};
use super::font::UnicodeFont;

/// Resource name under which the substitute Helvetica is registered.
const SUBSTITUTE_FONT: &[u8] = b"BwHelv";
/// Resource name of the embedded Unicode font.
const UNICODE_FONT: &[u8] = b"BwUni";
/// Horizontal squeeze accepted before the size starts shrinking as well.
const MIN_SQUEEZE: f32 = 0.6;
/// Smallest fraction of the original size an overlong replacement gets.
const MIN_SHRINK: f32 = 0.5;

/// Font a replacement is shown in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShowFont {
    Original,
    Helvetica,
    Unicode,
}

/// A pending text replacement for one show operation.
#[derive(Debug, Clone)]
struct Replacement {
    codes: Vec<u8>,
    font: ShowFont,
    /// New `Tf` size; `None` keeps the original.
    size: Option<f32>,
    /// `Tz` percentage squeezing the text into the original advance.
    squeeze: Option<f32>,
    /// Font resource, `Tf` size and `Tz` fraction in force at the show.
    original: (Vec<u8>, f32, f32),
}

impl Replacement {
    fn switches_font(&self) -> bool {
        self.font != ShowFont::Original || self.size.is_some()
    }
}

/// [`StructuredEngine`] backed by `lopdf`.
///
/// Replacements are queued per page and spliced into the content streams on
/// [`save`](StructuredEngine::save), so anchors stay valid while a page is
/// being edited.
pub struct LopdfEngine {
    document: Document,
    /// Page object ids in page order.
    pages: Vec<ObjectId>,
    spans: HashMap<usize, Vec<RawSpan>>,
    edits: BTreeMap<usize, BTreeMap<usize, Replacement>>,
    unicode_font: Option<UnicodeFont>,
    /// Replacements written without their extra diacritics.
    folded: usize,
}

impl LopdfEngine {
    /// Open a PDF from the filesystem.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        info!("Opening PDF: {}", path_ref.display());

        let document = Document::load(path_ref).map_err(|err| load_err(path_ref, err))?;
        Ok(Self::from_document(document))
    }

    /// Load a PDF already in memory.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let document = Document::load_mem(data).map_err(|err| {
            BlattwerkError::PdfError(format!("failed to load PDF from memory: {err}"))
        })?;
        Ok(Self::from_document(document))
    }

    fn from_document(document: Document) -> Self {
        let pages: Vec<ObjectId> = document.get_pages().into_values().collect();
        debug!(pages = pages.len(), "PDF loaded");
        Self {
            document,
            pages,
            spans: HashMap::new(),
            edits: BTreeMap::new(),
            unicode_font: None,
            folded: 0,
        }
    }

    /// Show replacement text outside Latin-1 in `font`, embedded on save.
    pub fn with_unicode_font(mut self, font: UnicodeFont) -> Self {
        self.unicode_font = Some(font);
        self
    }

    fn page_id(&self, page_index: usize) -> Result<ObjectId> {
        self.pages.get(page_index).copied().ok_or_else(|| {
            BlattwerkError::PdfError(format!(
                "page {} out of range (document has {} pages)",
                page_index,
                self.pages.len()
            ))
        })
    }

    fn decode_page(&self, page_index: usize) -> Result<Vec<Operation>> {
        let page_id = self.page_id(page_index)?;
        let content = self
            .document
            .get_and_decode_page_content(page_id)
            .map_err(|err| {
                BlattwerkError::PdfError(format!("page {page_index}: unreadable content stream: {err}"))
            })?;
        Ok(content.operations)
    }

    /// Interpret one page and return its raw spans.
    fn scan_page(&self, page_index: usize) -> Result<Vec<RawSpan>> {
        let page_id = self.page_id(page_index)?;
        let operations = self.decode_page(page_index)?;
        let fonts = self.page_fonts(page_id);
        let frame = self.page_frame(page_id);

        let (spans, skipped) = content::collect_spans(&operations, &fonts, frame);
        for name in skipped {
            warn!(
                page = page_index,
                font = %String::from_utf8_lossy(&name),
                "Skipping text drawn with a composite font"
            );
        }
        Ok(spans)
    }

    // -- Page-tree lookups ----------------------------------------------------

    fn resolve<'a>(&'a self, obj: &'a Object) -> Option<&'a Object> {
        match obj {
            Object::Reference(id) => self.document.get_object(*id).ok(),
            other => Some(other),
        }
    }

    fn resolve_dict<'a>(&'a self, obj: &'a Object) -> Option<&'a Dictionary> {
        match self.resolve(obj)? {
            Object::Dictionary(dict) => Some(dict),
            Object::Stream(stream) => Some(&stream.dict),
            _ => None,
        }
    }

    /// Look up a page attribute, following `/Parent` for inherited keys.
    fn inherited<'a>(&'a self, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
        let mut current = self.document.get_object(page_id).ok();
        // Depth guard against cyclic page trees.
        for _ in 0..32 {
            let dict = match current? {
                Object::Dictionary(dict) => dict,
                _ => return None,
            };
            if let Ok(value) = dict.get(key) {
                return self.resolve(value);
            }
            current = match dict.get(b"Parent") {
                Ok(parent) => self.resolve(parent),
                Err(_) => None,
            };
        }
        None
    }

    fn page_fonts(&self, page_id: ObjectId) -> HashMap<Vec<u8>, FontInfo> {
        let mut fonts = HashMap::new();
        let Some(resources) = self
            .inherited(page_id, b"Resources")
            .and_then(|obj| self.resolve_dict(obj))
        else {
            return fonts;
        };
        let Some(font_dict) = resources.get(b"Font").ok().and_then(|obj| self.resolve_dict(obj))
        else {
            return fonts;
        };

        for (name, value) in font_dict.iter() {
            let Some(font) = self.resolve_dict(value) else {
                continue;
            };
            fonts.insert(name.clone(), self.font_info(font));
        }
        fonts
    }

    fn font_info(&self, font: &Dictionary) -> FontInfo {
        let name_of = |key: &[u8]| match font.get(key).ok().and_then(|obj| self.resolve(obj)) {
            Some(Object::Name(name)) => String::from_utf8_lossy(name).into_owned(),
            _ => String::new(),
        };
        let embedded = font
            .get(b"FontDescriptor")
            .ok()
            .and_then(|obj| self.resolve_dict(obj))
            .is_some_and(|descriptor| {
                [&b"FontFile"[..], b"FontFile2", b"FontFile3"]
                    .iter()
                    .any(|key| descriptor.has(key))
            });
        FontInfo {
            base_font: name_of(b"BaseFont"),
            composite: name_of(b"Subtype") == "Type0",
            embedded,
        }
    }

    fn page_frame(&self, page_id: ObjectId) -> PageFrame {
        let Some(Object::Array(values)) = self.inherited(page_id, b"MediaBox") else {
            return PageFrame::default();
        };
        let nums: Vec<f32> = values
            .iter()
            .filter_map(|obj| match self.resolve(obj)? {
                Object::Integer(i) => Some(*i as f32),
                Object::Real(r) => Some(*r),
                _ => None,
            })
            .collect();
        if nums.len() != 4 {
            return PageFrame::default();
        }
        let (lly, ury) = (nums[1].min(nums[3]), nums[1].max(nums[3]));
        PageFrame {
            origin_x: nums[0].min(nums[2]),
            origin_y: lly,
            height: ury - lly,
        }
    }

    // -- Writing --------------------------------------------------------------

    /// Register `font_id` as `name` in the page's font resources.
    ///
    /// Inherited resources are copied onto the page first so sibling pages
    /// are left alone.
    fn install_font(&mut self, page_id: ObjectId, name: &[u8], font_id: ObjectId) -> Result<()> {
        let page_resources = self
            .document
            .get_object(page_id)
            .and_then(Object::as_dict)
            .map_err(pdf_err)?
            .get(b"Resources")
            .ok()
            .cloned();

        let resources_id = match page_resources {
            Some(Object::Reference(id)) => Some(id),
            Some(Object::Dictionary(_)) => None,
            _ => {
                let inherited = self
                    .inherited(page_id, b"Resources")
                    .and_then(|obj| self.resolve_dict(obj))
                    .cloned()
                    .unwrap_or_default();
                self.page_dict_mut(page_id)?
                    .set("Resources", Object::Dictionary(inherited));
                None
            }
        };

        let font_entry = {
            let resources = match resources_id {
                Some(id) => self.document.get_object(id).and_then(Object::as_dict),
                None => self
                    .document
                    .get_object(page_id)
                    .and_then(Object::as_dict)
                    .and_then(|page| page.get(b"Resources"))
                    .and_then(Object::as_dict),
            }
            .map_err(pdf_err)?;
            resources.get(b"Font").ok().cloned()
        };

        match font_entry {
            Some(Object::Reference(fonts_id)) => {
                self.document
                    .get_object_mut(fonts_id)
                    .and_then(Object::as_dict_mut)
                    .map_err(pdf_err)?
                    .set(name, Object::Reference(font_id));
            }
            other => {
                let mut fonts = match other {
                    Some(Object::Dictionary(fonts)) => fonts,
                    _ => Dictionary::new(),
                };
                fonts.set(name, Object::Reference(font_id));
                self.resources_dict_mut(page_id, resources_id)?
                    .set("Font", Object::Dictionary(fonts));
            }
        }
        Ok(())
    }

    fn page_dict_mut(&mut self, page_id: ObjectId) -> Result<&mut Dictionary> {
        self.document
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(pdf_err)
    }

    fn resources_dict_mut(
        &mut self,
        page_id: ObjectId,
        resources_id: Option<ObjectId>,
    ) -> Result<&mut Dictionary> {
        match resources_id {
            Some(id) => self
                .document
                .get_object_mut(id)
                .and_then(Object::as_dict_mut)
                .map_err(pdf_err),
            None => self
                .page_dict_mut(page_id)?
                .get_mut(b"Resources")
                .and_then(Object::as_dict_mut)
                .map_err(pdf_err),
        }
    }

    fn apply_edits(&mut self) -> Result<()> {
        let edits = std::mem::take(&mut self.edits);
        let mut helvetica_id = None;
        let mut unicode_id = None;
        for (page_index, replacements) in edits {
            let page_id = self.page_id(page_index)?;
            let operations = self.decode_page(page_index)?;
            let uses = |font| replacements.values().any(|r| r.font == font);
            let (helvetica, unicode) = (uses(ShowFont::Helvetica), uses(ShowFont::Unicode));

            let mut rewritten = Vec::with_capacity(operations.len() + 4 * replacements.len());
            for (index, op) in operations.into_iter().enumerate() {
                match replacements.get(&index) {
                    Some(replacement) => splice(&mut rewritten, op, replacement),
                    None => rewritten.push(op),
                }
            }

            let bytes = Content {
                operations: rewritten,
            }
            .encode()
            .map_err(pdf_err)?;
            if helvetica {
                let font_id = *helvetica_id.get_or_insert_with(|| {
                    self.document.add_object(dictionary! {
                        "Type" => "Font",
                        "Subtype" => "Type1",
                        "BaseFont" => "Helvetica",
                        "Encoding" => "WinAnsiEncoding",
                    })
                });
                self.install_font(page_id, SUBSTITUTE_FONT, font_id)?;
            }
            if unicode {
                let font_id = match unicode_id {
                    Some(id) => id,
                    None => {
                        let font = self.unicode_font.as_ref().ok_or_else(|| {
                            BlattwerkError::PdfError("glyph replacement queued without a font".into())
                        })?;
                        let id = font.embed(&mut self.document);
                        unicode_id = Some(id);
                        id
                    }
                };
                self.install_font(page_id, UNICODE_FONT, font_id)?;
            }
            self.document
                .change_page_content(page_id, bytes)
                .map_err(pdf_err)?;
            debug!(page = page_index, edits = replacements.len(), "Page content rewritten");
        }
        Ok(())
    }
}

impl StructuredEngine for LopdfEngine {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    #[instrument(skip(self))]
    fn structured_spans(&self, page_index: usize) -> Result<Vec<TextRegion>> {
        let spans = self.scan_page(page_index)?;
        let page_id = self.page_id(page_index)?;
        let fonts = self.page_fonts(page_id);

        let regions: Vec<TextRegion> = spans
            .into_iter()
            .filter(|span| !span.text.trim().is_empty())
            .map(|span| {
                let font_name = fonts
                    .get(&span.font_resource)
                    .map(|info| info.base_font.clone())
                    .filter(|name| !name.is_empty())
                    .unwrap_or_else(|| String::from_utf8_lossy(&span.font_resource).into_owned());
                let mut region = TextRegion::new(page_index, span.bbox, span.text);
                region.font_name = Some(font_name);
                region.font_size = Some(span.rendered_size);
                region.color = Some(span.color);
                region.anchor = Some(span.anchor);
                region
            })
            .collect();
        debug!(page = page_index, spans = regions.len(), "Structured spans read");
        Ok(regions)
    }

    fn replace_region_text(&mut self, region: &TextRegion, translated: &str) -> Result<()> {
        let page_index = region.page_index;
        let anchor = region.anchor.ok_or_else(|| {
            BlattwerkError::PdfError("region was not read from a content stream".into())
        })?;

        if !self.spans.contains_key(&page_index) {
            let spans = self.scan_page(page_index)?;
            self.spans.insert(page_index, spans);
        }
        let span = self
            .spans
            .get(&page_index)
            .and_then(|spans| spans.iter().find(|span| span.anchor == anchor))
            .ok_or_else(|| {
                BlattwerkError::PdfError(format!("page {page_index}: no text operation at {anchor}"))
            })?;

        let original = (span.font_resource.clone(), span.tf_size, span.horizontal_scaling);
        let available = span.advance;

        let page_id = self.page_id(page_index)?;
        let single_byte_font = if self
            .page_fonts(page_id)
            .get(&original.0)
            .is_some_and(FontInfo::is_standard)
        {
            ShowFont::Original
        } else {
            ShowFont::Helvetica
        };

        let (codes, font, unit_advance) = match content::encode_latin1(translated) {
            Some(codes) => {
                let advance = content::single_byte_advance(codes.len());
                (codes, single_byte_font, advance)
            }
            None => match self.unicode_font.as_mut() {
                Some(font) => {
                    let run = font.shape(translated)?;
                    (run.codes, ShowFont::Unicode, run.advance)
                }
                None => {
                    let codes = content::encode_latin1_folded(translated).ok_or_else(|| {
                        BlattwerkError::PdfError(format!(
                            "page {page_index}: no available font can show {translated:?}; \
                             set font_path to a font covering the target script"
                        ))
                    })?;
                    self.folded += 1;
                    let advance = content::single_byte_advance(codes.len());
                    (codes, single_byte_font, advance)
                }
            },
        };

        let needed = unit_advance * original.1 * original.2;
        let (shrink, squeeze) = fit_width(available, needed);
        let replacement = Replacement {
            codes,
            font,
            size: (shrink < 1.0).then(|| original.1 * shrink),
            squeeze: (squeeze < 1.0).then(|| (original.2 * squeeze * 10_000.0).floor() / 100.0),
            original,
        };
        if replacement.squeeze.is_some() {
            debug!(page = page_index, anchor, shrink, squeeze, "Replacement narrowed to fit its span");
        }
        self.edits.entry(page_index).or_default().insert(anchor, replacement);
        Ok(())
    }

    #[instrument(skip(self), fields(out = %out_path.display()))]
    fn save(&mut self, out_path: &Path) -> Result<()> {
        if self.folded > 0 {
            warn!(
                spans = self.folded,
                "Wrote translations without their extra diacritics; set font_path to an outline font to keep them"
            );
        }
        self.apply_edits()?;
        self.document.compress();
        self.document.save(out_path).map_err(|err| {
            BlattwerkError::PdfError(format!("failed to write {}: {err}", out_path.display()))
        })?;
        info!("Wrote translated PDF to {}", out_path.display());
        Ok(())
    }
}

/// Size and horizontal scale factors that bring `needed` within `available`.
///
/// Text is squeezed with `Tz` down to [`MIN_SQUEEZE`]; past that the size
/// shrinks too, to at most [`MIN_SHRINK`], and the squeeze covers the rest.
fn fit_width(available: f32, needed: f32) -> (f32, f32) {
    if needed <= available || available <= 0.0 {
        return (1.0, 1.0);
    }
    let ratio = available / needed;
    if ratio >= MIN_SQUEEZE {
        return (1.0, ratio);
    }
    let shrink = (ratio / MIN_SQUEEZE).max(MIN_SHRINK);
    (shrink, ratio / shrink)
}

/// Emit `op` with its string replaced, wrapped in the font, size and `Tz`
/// changes the new text needs; the original state is restored after it.
fn splice(out: &mut Vec<Operation>, mut op: Operation, replacement: &Replacement) {
    let format = match replacement.font {
        ShowFont::Unicode => StringFormat::Hexadecimal,
        _ => StringFormat::Literal,
    };
    let string = Object::String(replacement.codes.clone(), format);
    match op.operator.as_str() {
        "TJ" => {
            op.operator = "Tj".into();
            op.operands = vec![string];
        }
        _ => match op.operands.last_mut() {
            Some(last) => *last = string,
            None => op.operands.push(string),
        },
    }

    let (font, size, scaling) = &replacement.original;
    let switched = replacement.switches_font();
    if switched {
        let name = match replacement.font {
            ShowFont::Original => font.clone(),
            ShowFont::Helvetica => SUBSTITUTE_FONT.to_vec(),
            ShowFont::Unicode => UNICODE_FONT.to_vec(),
        };
        let new_size = replacement.size.unwrap_or(*size);
        out.push(Operation::new("Tf", vec![Object::Name(name), Object::Real(new_size)]));
    }
    if let Some(percent) = replacement.squeeze {
        out.push(Operation::new("Tz", vec![Object::Real(percent)]));
    }
    out.push(op);
    if replacement.squeeze.is_some() {
        out.push(Operation::new("Tz", vec![Object::Real(scaling * 100.0)]));
    }
    if switched {
        out.push(Operation::new("Tf", vec![Object::Name(font.clone()), Object::Real(*size)]));
    }
}

fn pdf_err(err: lopdf::Error) -> BlattwerkError {
    BlattwerkError::PdfError(err.to_string())
}

fn load_err(path: &Path, err: lopdf::Error) -> BlattwerkError {
    match err {
        lopdf::Error::IO(io) => BlattwerkError::Io(io),
        other => BlattwerkError::PdfError(format!("failed to open {}: {other}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::Stream;

    /// One-page PDF with a Helvetica line and an embedded-font line.
    fn sample_pdf() -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let helv_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let descriptor_id = doc.add_object(dictionary! {
            "Type" => "FontDescriptor",
            "FontName" => "ABCDEF+Custom",
            "FontFile2" => Object::Null,
        });
        let custom_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "TrueType",
            "BaseFont" => "ABCDEF+Custom",
            "FontDescriptor" => descriptor_id,
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => helv_id, "F2" => custom_id },
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal("Hello")]),
                Operation::new("Tf", vec!["F2".into(), 10.into()]),
                Operation::new("Td", vec![0.into(), (-20).into()]),
                Operation::new("Tj", vec![Object::string_literal("Goodbye")]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn reads_spans_with_style_metadata() {
        let engine = LopdfEngine::from_bytes(&sample_pdf()).unwrap();
        assert_eq!(engine.page_count(), 1);

        let regions = engine.structured_spans(0).unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].source_text, "Hello");
        assert_eq!(regions[0].font_name.as_deref(), Some("Helvetica"));
        assert_eq!(regions[0].font_size, Some(12.0));
        assert_eq!(regions[1].font_name.as_deref(), Some("ABCDEF+Custom"));
        assert!(regions[1].bbox.y > regions[0].bbox.y);
    }

    #[test]
    fn replaced_text_survives_save_and_reload() {
        let mut engine = LopdfEngine::from_bytes(&sample_pdf()).unwrap();
        let regions = engine.structured_spans(0).unwrap();
        engine.replace_region_text(&regions[0], "Xin chào").unwrap();
        engine.replace_region_text(&regions[1], "Tạm biệt").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.pdf");
        engine.save(&out).unwrap();

        let reloaded = LopdfEngine::open(&out).unwrap();
        let texts: Vec<String> = reloaded
            .structured_spans(0)
            .unwrap()
            .into_iter()
            .map(|r| r.source_text)
            .collect();
        assert_eq!(texts, vec!["Xin chào".to_string(), "Tam biet".to_string()]);
    }

    #[test]
    fn embedded_fonts_are_swapped_for_helvetica() {
        let mut engine = LopdfEngine::from_bytes(&sample_pdf()).unwrap();
        let regions = engine.structured_spans(0).unwrap();
        engine.replace_region_text(&regions[1], "Bye").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.pdf");
        engine.save(&out).unwrap();

        let reloaded = LopdfEngine::open(&out).unwrap();
        let regions = reloaded.structured_spans(0).unwrap();
        assert_eq!(regions[1].font_name.as_deref(), Some("Helvetica"));
        assert_eq!(regions[1].font_size, Some(10.0));
    }

    fn save_and_reload(engine: &mut LopdfEngine) -> (tempfile::TempDir, LopdfEngine) {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.pdf");
        engine.save(&out).unwrap();
        let reloaded = LopdfEngine::open(&out).unwrap();
        (dir, reloaded)
    }

    #[test]
    fn text_no_font_can_show_keeps_the_source_span() {
        let mut engine = LopdfEngine::from_bytes(&sample_pdf()).unwrap();
        let regions = engine.structured_spans(0).unwrap();
        let err = engine.replace_region_text(&regions[0], "こんにちは").unwrap_err();
        assert!(matches!(err, BlattwerkError::PdfError(_)));

        let (_dir, reloaded) = save_and_reload(&mut engine);
        let regions = reloaded.structured_spans(0).unwrap();
        assert_eq!(regions[0].source_text, "Hello");
        assert_eq!(regions[1].source_text, "Goodbye");
    }

    #[test]
    fn overlong_translation_stays_inside_the_original_box() {
        let mut engine = LopdfEngine::from_bytes(&sample_pdf()).unwrap();
        let regions = engine.structured_spans(0).unwrap();
        let original = regions[0].bbox;
        engine
            .replace_region_text(&regions[0], "Chào mừng tất cả mọi người đến với cuộc họp")
            .unwrap();

        let (_dir, reloaded) = save_and_reload(&mut engine);
        let after = reloaded.structured_spans(0).unwrap();
        assert_eq!(after[0].source_text, "Chào mung tat ca moi nguoi den voi cuoc hop");
        assert_eq!(after[0].bbox.x, original.x);
        assert!(
            after[0].bbox.width <= original.width + 0.05,
            "width {} exceeds {}",
            after[0].bbox.width,
            original.width
        );
        let size = after[0].font_size.unwrap();
        assert!((6.0..=12.0).contains(&size), "size {size}");

        // Scaling and size are restored for the next show.
        assert_eq!(after[1].bbox.width, regions[1].bbox.width);
        assert_eq!(after[1].font_size, Some(10.0));
    }

    #[test]
    fn slightly_long_translation_is_squeezed_not_shrunk() {
        let mut engine = LopdfEngine::from_bytes(&sample_pdf()).unwrap();
        let regions = engine.structured_spans(0).unwrap();
        // Six glyphs where five were: a squeeze of 5/6.
        engine.replace_region_text(&regions[0], "Hallo!").unwrap();

        let (_dir, reloaded) = save_and_reload(&mut engine);
        let after = reloaded.structured_spans(0).unwrap();
        assert_eq!(after[0].font_size, Some(12.0));
        assert!(after[0].bbox.width <= regions[0].bbox.width + 0.05);
        assert!(after[0].bbox.width > regions[0].bbox.width * 0.95);
    }

    #[test]
    fn fit_width_squeezes_first_then_shrinks() {
        assert_eq!(fit_width(30.0, 20.0), (1.0, 1.0));
        assert_eq!(fit_width(30.0, 40.0), (1.0, 0.75));
        let (shrink, squeeze) = fit_width(30.0, 300.0);
        assert_eq!(shrink, MIN_SHRINK);
        assert!((300.0 * shrink * squeeze - 30.0).abs() < 1e-3);
    }

    #[test]
    fn non_latin_text_is_written_with_real_glyphs_when_a_font_is_available() {
        // Needs an outline font on the host.
        let Some(font) = UnicodeFont::load(None) else {
            return;
        };
        let mut engine = LopdfEngine::from_bytes(&sample_pdf()).unwrap().with_unicode_font(font);
        let regions = engine.structured_spans(0).unwrap();
        engine.replace_region_text(&regions[1], "Tạm biệt").unwrap();
        // Latin-1 text keeps the original font.
        engine.replace_region_text(&regions[0], "Hola").unwrap();

        let (_dir, reloaded) = save_and_reload(&mut engine);
        let page_id = reloaded.page_id(0).unwrap();
        let fonts = reloaded.page_fonts(page_id);
        let unicode = fonts.get(UNICODE_FONT).unwrap();
        assert!(unicode.composite);
        assert_eq!(unicode.base_font, "BlattwerkUnicode");

        let shows: Vec<(Vec<u8>, StringFormat)> = reloaded
            .decode_page(0)
            .unwrap()
            .into_iter()
            .filter(|op| op.operator == "Tj")
            .filter_map(|op| match op.operands.last() {
                Some(Object::String(bytes, format)) => Some((bytes.clone(), *format)),
                _ => None,
            })
            .collect();
        assert_eq!(shows[0], (b"Hola".to_vec(), StringFormat::Literal));
        assert_eq!(shows[1].0.len(), 16);
        assert_eq!(shows[1].1, StringFormat::Hexadecimal);

        // Spans in composite fonts are not read back.
        let texts: Vec<String> = reloaded
            .structured_spans(0)
            .unwrap()
            .into_iter()
            .map(|r| r.source_text)
            .collect();
        assert_eq!(texts, vec!["Hola".to_string()]);
    }

    #[test]
    fn out_of_range_page_is_an_error() {
        let engine = LopdfEngine::from_bytes(&sample_pdf()).unwrap();
        assert!(engine.structured_spans(3).is_err());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = LopdfEngine::open("/nonexistent/input.pdf").err().unwrap();
        assert!(err.is_terminal());
    }
}
