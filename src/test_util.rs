#![cfg(test)]

use image::DynamicImage;
use std::cell::Cell;
use std::path::Path;

use crate::error::Result;
use crate::ocr::{OcrEngine, OcrWord};
use crate::raster::{RasterizedPages, Rasterizer};

/// OCR stand-in that reports the same words for every image.
#[derive(Default)]
pub(crate) struct FixedOcr {
    words: Vec<OcrWord>,
    calls: Cell<usize>,
}

impl FixedOcr {
    pub(crate) fn new(words: Vec<OcrWord>) -> Self {
        Self {
            words,
            calls: Cell::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl OcrEngine for FixedOcr {
    fn words(&self, _image: &DynamicImage) -> Result<Vec<OcrWord>> {
        self.calls.set(self.calls.get() + 1);
        Ok(self.words.clone())
    }
}

/// Rasterizer stand-in returning blank pages of fixed sizes.
pub(crate) struct BlankRasterizer {
    sizes: Vec<(u32, u32)>,
}

impl BlankRasterizer {
    pub(crate) fn new(sizes: Vec<(u32, u32)>) -> Self {
        Self { sizes }
    }
}

impl Rasterizer for BlankRasterizer {
    fn rasterize(&self, _pdf_path: &Path) -> Result<RasterizedPages> {
        Ok(RasterizedPages::from_images(
            self.sizes
                .iter()
                .map(|(w, h)| DynamicImage::new_rgb8(*w, *h))
                .collect(),
        ))
    }
}

/// Builds a minimal PDF with `pages` letter-sized pages, each showing
/// `label-N` in Helvetica.
pub(crate) fn letter_pdf(pages: u32, label: &str) -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::{Dictionary, Document, Object, Stream};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut font = Dictionary::new();
    font.set("Type", Object::Name(b"Font".to_vec()));
    font.set("Subtype", Object::Name(b"Type1".to_vec()));
    font.set("BaseFont", Object::Name(b"Helvetica".to_vec()));
    let font_id = doc.add_object(font);
    let mut fonts = Dictionary::new();
    fonts.set("F1", Object::Reference(font_id));
    let mut resources = Dictionary::new();
    resources.set("Font", Object::Dictionary(fonts));
    let resources_id = doc.add_object(resources);

    let mut page_ids = Vec::new();
    for i in 0..pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(12)]),
                Operation::new("Td", vec![Object::Integer(72), Object::Integer(720)]),
                Operation::new(
                    "Tj",
                    vec![Object::String(
                        format!("{}-{}", label, i + 1).into_bytes(),
                        lopdf::StringFormat::Literal,
                    )],
                ),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            Dictionary::new(),
            content.encode().expect("encode content"),
        ));
        let page = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
            (
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(612),
                    Object::Integer(792),
                ]),
            ),
            ("Resources", Object::Reference(resources_id)),
            ("Contents", Object::Reference(content_id)),
        ]);
        page_ids.push(doc.add_object(page));
    }

    let pages_dict = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Count", Object::Integer(pages as i64)),
        (
            "Kids",
            Object::Array(page_ids.iter().map(|id| Object::Reference(*id)).collect()),
        ),
    ]);
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));
    let catalog_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).expect("save pdf");
    buffer
}

/// Strings shown with `Tj` in a decoded content stream.
pub(crate) fn shown_strings(content: &[u8]) -> Vec<String> {
    lopdf::content::Content::decode(content)
        .expect("decode content")
        .operations
        .iter()
        .filter(|op| op.operator == "Tj")
        .filter_map(|op| match op.operands.first() {
            Some(lopdf::Object::String(bytes, _)) => {
                Some(String::from_utf8_lossy(bytes).to_string())
            }
            _ => None,
        })
        .collect()
}
