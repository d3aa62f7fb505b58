//! Stamps a one-page overlay PDF onto a page of another document.
//!
//! The overlay page becomes a Form XObject in the target document. The
//! target page's original content streams are wrapped in `q`/`Q` so their
//! graphics state cannot leak into the overlay, and the XObject is painted
//! last. Nothing in the original streams is rewritten.

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::BTreeMap;

use crate::error::{AnnotateError, Result};

const XOBJECT_PREFIX: &str = "AnnotOverlay";
const MAX_INHERITANCE_DEPTH: usize = 32;

pub(crate) fn merge_overlay(
    doc: &mut Document,
    page_id: ObjectId,
    overlay_pdf: &[u8],
) -> Result<()> {
    let overlay = Document::load_mem(overlay_pdf).map_err(AnnotateError::pdf)?;
    let overlay_page = overlay
        .get_pages()
        .values()
        .next()
        .copied()
        .ok_or_else(|| AnnotateError::Pdf("overlay has no page".to_string()))?;
    let content = overlay
        .get_page_content(overlay_page)
        .map_err(AnnotateError::pdf)?;
    let overlay_dict = overlay
        .get_dictionary(overlay_page)
        .map_err(AnnotateError::pdf)?;

    let mut imported = BTreeMap::new();
    let resources = match overlay_dict.get(b"Resources") {
        Ok(object) => import_object(doc, &overlay, object, &mut imported)?,
        Err(_) => Object::Dictionary(Dictionary::new()),
    };
    let bbox = match overlay_dict.get(b"MediaBox") {
        Ok(object) => import_object(doc, &overlay, object, &mut imported)?,
        Err(_) => return Err(AnnotateError::Pdf("overlay page has no MediaBox".to_string())),
    };

    let mut form = Dictionary::new();
    form.set("Type", Object::Name(b"XObject".to_vec()));
    form.set("Subtype", Object::Name(b"Form".to_vec()));
    form.set("BBox", bbox);
    form.set("Resources", resources);
    let form_id = doc.add_object(Stream::new(form, content));

    let name = attach_xobject(doc, page_id, form_id)?;
    paint_after_contents(doc, page_id, &name)
}

/// Deep-copies `object` from `source` into `target`, giving every referenced
/// object a fresh id. `Parent` links are dropped so the copy never drags in
/// the source page tree.
fn import_object(
    target: &mut Document,
    source: &Document,
    object: &Object,
    imported: &mut BTreeMap<ObjectId, ObjectId>,
) -> Result<Object> {
    Ok(match object {
        Object::Reference(id) => {
            if let Some(mapped) = imported.get(id) {
                return Ok(Object::Reference(*mapped));
            }
            let mapped = target.new_object_id();
            imported.insert(*id, mapped);
            let source_object = source.get_object(*id).map_err(AnnotateError::pdf)?;
            let copied = import_object(target, source, source_object, imported)?;
            target.objects.insert(mapped, copied);
            Object::Reference(mapped)
        }
        Object::Array(items) => Object::Array(
            items
                .iter()
                .map(|item| import_object(target, source, item, imported))
                .collect::<Result<Vec<_>>>()?,
        ),
        Object::Dictionary(dict) => {
            Object::Dictionary(import_dictionary(target, source, dict, imported)?)
        }
        Object::Stream(stream) => {
            let dict = import_dictionary(target, source, &stream.dict, imported)?;
            Object::Stream(Stream::new(dict, stream.content.clone()))
        }
        other => other.clone(),
    })
}

fn import_dictionary(
    target: &mut Document,
    source: &Document,
    dict: &Dictionary,
    imported: &mut BTreeMap<ObjectId, ObjectId>,
) -> Result<Dictionary> {
    let mut out = Dictionary::new();
    for (key, value) in dict.iter() {
        if key.as_slice() == b"Parent" {
            continue;
        }
        out.set(key.clone(), import_object(target, source, value, imported)?);
    }
    Ok(out)
}

/// Registers the form under a fresh name in the page's XObject resources.
/// Inherited or shared resource dictionaries are copied onto the page first.
fn attach_xobject(doc: &mut Document, page_id: ObjectId, form_id: ObjectId) -> Result<String> {
    let mut resources = effective_resources(doc, page_id)?;
    let mut xobjects = match resources.get(b"XObject") {
        Ok(Object::Reference(id)) => doc.get_dictionary(*id).map_err(AnnotateError::pdf)?.clone(),
        Ok(Object::Dictionary(dict)) => dict.clone(),
        _ => Dictionary::new(),
    };

    let mut index = 0usize;
    let name = loop {
        let candidate = format!("{}{}", XOBJECT_PREFIX, index);
        if !xobjects.has(candidate.as_bytes()) {
            break candidate;
        }
        index += 1;
    };
    xobjects.set(name.clone(), Object::Reference(form_id));
    resources.set("XObject", Object::Dictionary(xobjects));

    let page = doc
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(AnnotateError::pdf)?;
    page.set("Resources", Object::Dictionary(resources));
    Ok(name)
}

fn effective_resources(doc: &Document, page_id: ObjectId) -> Result<Dictionary> {
    let mut current = page_id;
    for _ in 0..MAX_INHERITANCE_DEPTH {
        let dict = doc.get_dictionary(current).map_err(AnnotateError::pdf)?;
        match dict.get(b"Resources") {
            Ok(Object::Reference(id)) => {
                return Ok(doc.get_dictionary(*id).map_err(AnnotateError::pdf)?.clone());
            }
            Ok(Object::Dictionary(resources)) => return Ok(resources.clone()),
            _ => {}
        }
        match dict.get(b"Parent") {
            Ok(Object::Reference(parent)) => current = *parent,
            _ => break,
        }
    }
    Ok(Dictionary::new())
}

fn paint_after_contents(doc: &mut Document, page_id: ObjectId, name: &str) -> Result<()> {
    let existing = {
        let page = doc.get_dictionary(page_id).map_err(AnnotateError::pdf)?;
        match page.get(b"Contents") {
            Ok(Object::Reference(id)) => match doc.get_object(*id) {
                Ok(Object::Array(items)) => items.clone(),
                _ => vec![Object::Reference(*id)],
            },
            Ok(Object::Array(items)) => items.clone(),
            _ => Vec::new(),
        }
    };

    let open_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let paint = format!("\nQ\nq\n/{} Do\nQ\n", name);
    let close_id = doc.add_object(Stream::new(Dictionary::new(), paint.into_bytes()));

    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(open_id));
    contents.extend(existing);
    contents.push(Object::Reference(close_id));

    let page = doc
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(AnnotateError::pdf)?;
    page.set("Contents", Object::Array(contents));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::overlay::{OverlayText, PdfColor, build_overlay};
    use crate::test_util::{letter_pdf, shown_strings};

    fn paid_overlay() -> Vec<u8> {
        build_overlay(
            612.0,
            792.0,
            &[OverlayText {
                text: "PAID".to_string(),
                x: 100.0,
                y: 200.0,
                size: 20.0,
                color: PdfColor::Blue,
            }],
            None,
        )
        .expect("overlay")
    }

    #[test]
    fn original_content_is_kept_and_overlay_painted_last() {
        let mut doc = Document::load_mem(&letter_pdf(1, "orig")).expect("load");
        let page_id = *doc.get_pages().get(&1).expect("page 1");
        let before = doc.get_page_content(page_id).expect("content");

        merge_overlay(&mut doc, page_id, &paid_overlay()).expect("merge");

        let after = doc.get_page_content(page_id).expect("content");
        let after_text = String::from_utf8_lossy(&after);
        let before_text = String::from_utf8_lossy(&before);
        assert!(after_text.starts_with("q\n"));
        assert!(after_text.contains(before_text.as_ref()));
        assert!(after_text.trim_end().ends_with("/AnnotOverlay0 Do\nQ"));

        let resources = effective_resources(&doc, page_id).expect("resources");
        assert!(resources.has(b"Font"), "existing fonts survive");
        let xobjects = resources
            .get(b"XObject")
            .and_then(Object::as_dict)
            .expect("xobjects");
        let form_id = xobjects
            .get(b"AnnotOverlay0")
            .and_then(Object::as_reference)
            .expect("form ref");
        let form = doc
            .get_object(form_id)
            .and_then(Object::as_stream)
            .expect("form stream");
        assert_eq!(shown_strings(&form.content), vec!["PAID".to_string()]);
    }

    #[test]
    fn repeated_merges_get_distinct_names() {
        let mut doc = Document::load_mem(&letter_pdf(1, "orig")).expect("load");
        let page_id = *doc.get_pages().get(&1).expect("page 1");
        merge_overlay(&mut doc, page_id, &paid_overlay()).expect("first");
        merge_overlay(&mut doc, page_id, &paid_overlay()).expect("second");

        let resources = effective_resources(&doc, page_id).expect("resources");
        let xobjects = resources
            .get(b"XObject")
            .and_then(Object::as_dict)
            .expect("xobjects");
        assert!(xobjects.has(b"AnnotOverlay0"));
        assert!(xobjects.has(b"AnnotOverlay1"));
    }

    #[test]
    fn inherited_resources_are_found_through_parent() {
        let mut doc = Document::with_version("1.5");
        let mut fonts = Dictionary::new();
        fonts.set("F1", Object::Name(b"Helvetica".to_vec()));
        let mut resources = Dictionary::new();
        resources.set("Font", Object::Dictionary(fonts));
        let pages_id = doc.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Resources", Object::Dictionary(resources)),
        ]));
        let page_id = doc.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
        ]));
        let found = effective_resources(&doc, page_id).expect("resources");
        assert!(found.has(b"Font"));
    }
}
