//! In-memory PDFs for tests.

use std::path::Path;

use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId, Stream, dictionary};

/// A page to build: its visible text and an optional raw RGB image size.
pub(crate) struct FixturePage<'a> {
    pub text: &'a str,
    pub image: Option<(u32, u32)>,
}

/// Text-only document, one page per entry.
pub(crate) fn text_pdf(texts: &[&str]) -> Document {
    let pages: Vec<FixturePage<'_>> = texts
        .iter()
        .map(|&text| FixturePage { text, image: None })
        .collect();
    build(&pages)
}

/// Build a document. MediaBox lives on the page tree root so pages inherit
/// it; Resources live on each page.
pub(crate) fn build(pages: &[FixturePage<'_>]) -> Document {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => Object::Name(b"Font".to_vec()),
        "Subtype" => Object::Name(b"Type1".to_vec()),
        "BaseFont" => Object::Name(b"Helvetica".to_vec()),
    });

    let mut kids = Vec::new();
    for page in pages {
        let mut content = format!("BT /F1 24 Tf 72 720 Td ({}) Tj ET", page.text);
        let mut xobjects = lopdf::Dictionary::new();
        if let Some((width, height)) = page.image {
            let image_id = doc.add_object(raw_rgb_image(width, height));
            xobjects.set("Im1", Object::Reference(image_id));
            content.push_str(" q 612 0 0 792 0 0 cm /Im1 Do Q");
        }

        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => Object::Name(b"Page".to_vec()),
            "Parent" => Object::Reference(pages_id),
            "Contents" => Object::Reference(content_id),
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => Object::Reference(font_id) },
                "XObject" => xobjects,
            },
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => Object::Name(b"Pages".to_vec()),
            "Kids" => kids,
            "Count" => Object::Integer(count),
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => Object::Name(b"Catalog".to_vec()),
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));
    doc
}

fn raw_rgb_image(width: u32, height: u32) -> Stream {
    let pixels = vec![200u8; (width * height * 3) as usize];
    let mut stream = Stream::new(
        dictionary! {
            "Type" => Object::Name(b"XObject".to_vec()),
            "Subtype" => Object::Name(b"Image".to_vec()),
            "Width" => Object::Integer(i64::from(width)),
            "Height" => Object::Integer(i64::from(height)),
            "ColorSpace" => Object::Name(b"DeviceRGB".to_vec()),
            "BitsPerComponent" => Object::Integer(8),
        },
        pixels,
    );
    stream.allows_compression = false;
    stream
}

pub(crate) fn write_pdf(mut doc: Document, path: &Path) {
    doc.save(path).unwrap();
}

/// Strings shown by `Tj` operators on a page, in content order.
pub(crate) fn shown_text(doc: &Document, page_id: ObjectId) -> Vec<String> {
    let raw = doc.get_page_content(page_id).unwrap();
    let content = Content::decode(&raw).unwrap();
    content
        .operations
        .iter()
        .filter(|op| op.operator == "Tj")
        .filter_map(|op| match op.operands.first() {
            Some(Object::String(bytes, _)) => Some(String::from_utf8_lossy(bytes).into_owned()),
            _ => None,
        })
        .collect()
}

/// Operators present on a page, in content order.
pub(crate) fn operators(doc: &Document, page_id: ObjectId) -> Vec<String> {
    let raw = doc.get_page_content(page_id).unwrap();
    Content::decode(&raw)
        .unwrap()
        .operations
        .into_iter()
        .map(|op| op.operator)
        .collect()
}
