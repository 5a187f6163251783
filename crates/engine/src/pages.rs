//! Whole-document page operations: merge and extract

use std::collections::BTreeSet;

use lopdf::{Document, Object, ObjectId};

use crate::error::{EngineError, EngineResult};
use crate::lopdf_writer::LopdfDocument;
use crate::objects::{self, inherited};

/// Page attributes that may live on an ancestor `/Pages` node
const INHERITABLE: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

fn load(bytes: &[u8]) -> EngineResult<Document> {
    objects::reject_encrypted(bytes)?;
    Ok(Document::load_mem(bytes)?)
}

/// Copy inherited attributes onto each page so it survives re-parenting
fn materialize_inherited(doc: &mut Document) -> EngineResult<()> {
    let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
    for page_id in page_ids {
        let missing: Vec<(&[u8], Object)> = INHERITABLE
            .iter()
            .filter(|key| {
                doc.get_dictionary(page_id)
                    .map(|page| !page.has(key))
                    .unwrap_or(false)
            })
            .filter_map(|key| inherited(doc, page_id, key).map(|value| (*key, value.clone())))
            .collect();

        let page = doc.get_object_mut(page_id).and_then(Object::as_dict_mut)?;
        for (key, value) in missing {
            page.set(key.to_vec(), value);
        }
    }
    Ok(())
}

fn append_document(primary: &mut LopdfDocument, mut secondary: Document) -> EngineResult<()> {
    materialize_inherited(&mut secondary)?;
    secondary.renumber_objects_with(primary.doc.max_id + 1);

    let secondary = LopdfDocument::from_document(secondary);
    let fields = secondary.top_level_fields();
    let page_ids = secondary.page_ids;

    primary.doc.objects.extend(secondary.doc.objects);
    primary.doc.max_id = primary.doc.max_id.max(secondary.doc.max_id);

    let pages_root = primary
        .doc
        .catalog()?
        .get(b"Pages")
        .and_then(Object::as_reference)?;
    {
        let pages = primary
            .doc
            .get_object_mut(pages_root)
            .and_then(Object::as_dict_mut)?;
        let count = pages.get(b"Count").and_then(Object::as_i64).unwrap_or(0);
        let kids = pages.get_mut(b"Kids").and_then(Object::as_array_mut)?;
        kids.extend(page_ids.iter().map(|id| Object::Reference(*id)));
        pages.set("Count", count + page_ids.len() as i64);
    }
    for page_id in &page_ids {
        let page = primary
            .doc
            .get_object_mut(*page_id)
            .and_then(Object::as_dict_mut)?;
        page.set("Parent", pages_root);
    }
    primary.page_ids.extend(page_ids);

    for field in fields {
        primary.register_field(field)?;
    }
    Ok(())
}

/// Concatenate documents in order
///
/// The first document provides the catalog; pages and form fields of the
/// others are appended after it.
pub fn merge_documents<B: AsRef<[u8]>>(sources: &[B]) -> EngineResult<Vec<u8>> {
    let Some((first, rest)) = sources.split_first() else {
        return Err(EngineError::Backend("nothing to merge".to_owned()));
    };

    let mut primary = LopdfDocument::from_document(load(first.as_ref())?);
    materialize_inherited(&mut primary.doc)?;
    for source in rest {
        append_document(&mut primary, load(source.as_ref())?)?;
    }

    tracing::debug!(
        documents = sources.len(),
        pages = primary.page_ids.len(),
        "documents merged"
    );
    objects::save_document(&mut primary.doc)
}

/// Keep only `pages` (1-based), in document order
///
/// Duplicates are ignored. Every requested page must exist.
pub fn extract_pages(bytes: &[u8], pages: &[u32]) -> EngineResult<Vec<u8>> {
    let mut doc = load(bytes)?;
    let total = doc.get_pages().len() as u32;

    let keep: BTreeSet<u32> = pages.iter().copied().collect();
    if keep.is_empty() {
        return Err(EngineError::Backend("no pages selected".to_owned()));
    }
    if let Some(page) = keep.iter().copied().find(|page| *page == 0 || *page > total) {
        return Err(EngineError::PageOutOfRange {
            page,
            page_count: total,
        });
    }

    let drop: Vec<u32> = (1..=total).filter(|page| !keep.contains(page)).collect();
    if !drop.is_empty() {
        doc.delete_pages(&drop);
        doc.prune_objects();
    }
    tracing::debug!(kept = keep.len(), dropped = drop.len(), "pages extracted");
    objects::save_document(&mut doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::DocumentBuilder;
    use crate::geometry::PageSize;
    use crate::renderer::{LopdfRenderer, Renderer};

    fn sizes(bytes: &[u8]) -> Vec<PageSize> {
        let mut renderer = LopdfRenderer::new();
        let handle = renderer.load_document(bytes).expect("load");
        let count = renderer.page_count(handle).expect("count");
        (1..=count)
            .map(|page| renderer.page_size(handle, page).expect("size"))
            .collect()
    }

    fn first_text(bytes: &[u8], page: u32) -> String {
        let mut renderer = LopdfRenderer::new();
        let handle = renderer.load_document(bytes).expect("load");
        renderer
            .text_content(handle, page)
            .expect("text")
            .into_iter()
            .next()
            .map(|item| item.text)
            .unwrap_or_default()
    }

    fn numbered(prefix: &str, count: usize, width: f32) -> Vec<u8> {
        let mut builder = DocumentBuilder::new();
        for index in 1..=count {
            builder = builder
                .page(width, 700.0 + index as f32)
                .text(72.0, 600.0, 12.0, &format!("{prefix}{index}"));
        }
        builder.build().expect("fixture")
    }

    #[test]
    fn test_merge_preserves_order_and_content() {
        let a = numbered("A", 2, 500.0);
        let b = numbered("B", 3, 400.0);

        let merged = merge_documents(&[a, b]).expect("merge");
        let sizes = sizes(&merged);
        assert_eq!(sizes.len(), 5);
        assert_eq!(sizes[0], PageSize::new(500.0, 701.0));
        assert_eq!(sizes[2], PageSize::new(400.0, 701.0));
        assert_eq!(sizes[4], PageSize::new(400.0, 703.0));

        let texts: Vec<String> = (1..=5).map(|page| first_text(&merged, page)).collect();
        assert_eq!(texts, vec!["A1", "A2", "B1", "B2", "B3"]);
    }

    #[test]
    fn test_merge_carries_form_fields() {
        let a = DocumentBuilder::new()
            .page(612.0, 792.0)
            .text_field("first", [10.0, 10.0, 100.0, 30.0], "1")
            .build()
            .expect("fixture");
        let b = DocumentBuilder::new()
            .page(612.0, 792.0)
            .checkbox("second", [10.0, 10.0, 24.0, 24.0], true)
            .build()
            .expect("fixture");

        let merged = merge_documents(&[a, b]).expect("merge");
        let document = LopdfDocument::load(&merged).expect("load");
        let mut names: Vec<String> = document
            .terminal_fields()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["first".to_owned(), "second".to_owned()]);
    }

    #[test]
    fn test_merge_requires_input() {
        let empty: [Vec<u8>; 0] = [];
        assert!(merge_documents(&empty).is_err());
    }

    #[test]
    fn test_extract_keeps_selected_pages() {
        let source = numbered("P", 5, 300.0);
        let extracted = extract_pages(&source, &[4, 2, 2]).expect("extract");
        let texts: Vec<String> = (1..=2).map(|page| first_text(&extracted, page)).collect();
        assert_eq!(texts, vec!["P2", "P4"]);
        assert_eq!(sizes(&extracted).len(), 2);
    }

    #[test]
    fn test_extract_rejects_out_of_range() {
        let source = numbered("P", 2, 300.0);
        let err = extract_pages(&source, &[1, 3]).expect_err("page 3 missing");
        assert!(matches!(err, EngineError::PageOutOfRange { page: 3, page_count: 2 }));
        assert!(extract_pages(&source, &[]).is_err());
    }
}
