// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF assembly: serialise rendered page images into a new document using
// `printpdf` 0.8.
//
// printpdf 0.8 uses a data-oriented API: documents are built by constructing
// `PdfPage` structs containing `Vec<Op>` operation lists, then serialised via
// `PdfDocument::save()`.

use std::path::Path;

use blattwerk_core::error::{BlattwerkError, Result};
use image::RgbImage;
use printpdf::{
    Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Pt, RawImage, RawImageData,
    RawImageFormat, XObjectTransform,
};
use tracing::{debug, info, instrument};

/// Builds an image-only PDF, one page per raster, each page sized so the
/// image maps 1:1 at the DPI it was rendered at.
pub struct PdfAssembler {
    title: String,
    dpi: u32,
}

impl PdfAssembler {
    pub fn new(title: impl Into<String>, dpi: u32) -> Self {
        Self {
            title: title.into(),
            dpi: dpi.max(1),
        }
    }

    /// Physical page size of an image at this assembler's DPI.
    pub fn page_size(&self, image: &RgbImage) -> (Mm, Mm) {
        let to_mm = |px: u32| Mm(px as f32 / self.dpi as f32 * 25.4);
        (to_mm(image.width()), to_mm(image.height()))
    }

    /// Serialise `pages` in the order given.
    #[instrument(skip_all, fields(pages = pages.len(), dpi = self.dpi))]
    pub fn assemble(&self, pages: &[RgbImage]) -> Result<Vec<u8>> {
        if pages.is_empty() {
            return Err(BlattwerkError::PdfError("no pages to assemble".into()));
        }

        let mut doc = PdfDocument::new(&self.title);
        let mut pdf_pages = Vec::with_capacity(pages.len());

        for image in pages {
            let raw = RawImage {
                pixels: RawImageData::U8(image.as_raw().clone()),
                width: image.width() as usize,
                height: image.height() as usize,
                data_format: RawImageFormat::RGB8,
                tag: Vec::new(),
            };
            let xobject_id = doc.add_image(&raw);
            let (page_w, page_h) = self.page_size(image);

            let ops = vec![Op::UseXobject {
                id: xobject_id,
                transform: XObjectTransform {
                    translate_x: Some(Pt(0.0)),
                    translate_y: Some(Pt(0.0)),
                    scale_x: None,
                    scale_y: None,
                    dpi: Some(self.dpi as f32),
                    rotate: None,
                },
            }];
            pdf_pages.push(PdfPage::new(page_w, page_h, ops));
        }

        doc.with_pages(pdf_pages);

        let mut warnings: Vec<PdfWarnMsg> = Vec::new();
        let output = doc.save(&PdfSaveOptions::default(), &mut warnings);
        debug!(bytes = output.len(), warnings = warnings.len(), "PDF serialised");
        Ok(output)
    }

    /// Assemble and write to `path`.
    pub fn write_to_file(&self, pages: &[RgbImage], path: impl AsRef<Path>) -> Result<()> {
        let bytes = self.assemble(pages)?;
        std::fs::write(path.as_ref(), &bytes)?;
        info!("Wrote image PDF to {}", path.as_ref().display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn page_size_follows_dpi() {
        let assembler = PdfAssembler::new("t", 200);
        let (w, h) = assembler.page_size(&RgbImage::new(1700, 2200));
        assert!((w.0 - 215.9).abs() < 0.01);
        assert!((h.0 - 279.4).abs() < 0.01);
    }

    #[test]
    fn assembles_one_page_per_image() {
        let pages = vec![
            RgbImage::from_pixel(30, 40, Rgb([255, 255, 255])),
            RgbImage::from_pixel(30, 40, Rgb([0, 0, 0])),
        ];
        let bytes = PdfAssembler::new("pages", 150).assemble(&pages).unwrap();
        assert!(bytes.starts_with(b"%PDF"));

        let reloaded = lopdf::Document::load_mem(&bytes).unwrap();
        assert_eq!(reloaded.get_pages().len(), 2);
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(PdfAssembler::new("none", 150).assemble(&[]).is_err());
    }
}
