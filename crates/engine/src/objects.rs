//! Small helpers over the lopdf object model

use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};

use crate::error::{EngineError, EngineResult};
use crate::geometry::PageSize;

/// Inheritance chains deeper than this are treated as cycles
const MAX_PARENT_DEPTH: usize = 64;

pub(crate) fn obj_to_f32(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(f) => Some(*f as f32),
        _ => None,
    }
}

/// Follow one level of indirection
pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        other => other,
    }
}

/// Look up `key` on a page or field dictionary, walking the `/Parent` chain
pub(crate) fn inherited<'a>(doc: &'a Document, id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = Some(id);
    let mut depth = 0;
    while let Some(id) = current {
        let dict = doc.get_dictionary(id).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(resolve(doc, value));
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
        depth += 1;
        if depth > MAX_PARENT_DEPTH {
            break;
        }
    }
    None
}

/// Parse a 4-number rectangle, normalized so that x0 <= x1 and y0 <= y1
pub(crate) fn rect_from(doc: &Document, obj: &Object) -> Option<[f32; 4]> {
    let array = resolve(doc, obj).as_array().ok()?;
    if array.len() != 4 {
        return None;
    }
    let mut values = [0.0f32; 4];
    for (slot, item) in values.iter_mut().zip(array) {
        *slot = obj_to_f32(resolve(doc, item))?;
    }
    let [ax, ay, bx, by] = values;
    Some([ax.min(bx), ay.min(by), ax.max(bx), ay.max(by)])
}

pub(crate) fn rect_object(rect: [f32; 4]) -> Object {
    Object::Array(rect.iter().map(|v| Object::Real((*v).into())).collect())
}

/// Page size from the (possibly inherited) MediaBox, falling back to US Letter
pub(crate) fn page_size(doc: &Document, page_id: ObjectId) -> PageSize {
    inherited(doc, page_id, b"MediaBox")
        .and_then(|obj| rect_from(doc, obj))
        .map(|[x0, y0, x1, y1]| PageSize::new(x1 - x0, y1 - y0))
        .filter(|size| size.width_pt > 0.0 && size.height_pt > 0.0)
        .unwrap_or(PageSize::LETTER)
}

pub(crate) fn reject_encrypted(bytes: &[u8]) -> EngineResult<()> {
    if bytes.windows("/Encrypt".len()).any(|window| window == b"/Encrypt") {
        return Err(EngineError::EncryptedUnsupported);
    }
    Ok(())
}

/// Decode a PDF text string (UTF-16BE with BOM, otherwise single-byte)
pub(crate) fn decode_text(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        bytes.iter().map(|b| char::from(*b)).collect()
    }
}

/// Read a string or name object as text
pub(crate) fn object_text(doc: &Document, obj: &Object) -> Option<String> {
    match resolve(doc, obj) {
        Object::String(bytes, _) => Some(decode_text(bytes)),
        Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
        _ => None,
    }
}

/// Encode a text string for dictionary values such as `/V` and `/T`
pub(crate) fn text_string(text: &str) -> Object {
    if text.is_ascii() {
        return Object::String(text.as_bytes().to_vec(), StringFormat::Literal);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

/// Encode text for a content stream using a WinAnsi (Latin-1 subset) font
///
/// Characters outside the single-byte range become `?`.
pub(crate) fn winansi_bytes(text: &str) -> Vec<u8> {
    text.chars()
        .map(|ch| match u32::from(ch) {
            code @ 0x20..=0x7E | code @ 0xA0..=0xFF => code as u8,
            _ => b'?',
        })
        .collect()
}

/// Add `name => value` to one resource category of a page
///
/// Resources that are shared by reference or inherited from the page tree are
/// copied inline onto the page first, so other pages are not affected.
pub(crate) fn set_page_resource(
    doc: &mut Document,
    page_id: ObjectId,
    category: &[u8],
    name: &str,
    value: Object,
) -> EngineResult<()> {
    let mut resources = match inherited(doc, page_id, b"Resources") {
        Some(Object::Dictionary(dict)) => dict.clone(),
        _ => Dictionary::new(),
    };

    let mut entries = match resources.get(category) {
        Ok(Object::Dictionary(dict)) => dict.clone(),
        Ok(Object::Reference(id)) => doc
            .get_dictionary(*id)
            .map(|dict| dict.clone())
            .unwrap_or_else(|_| Dictionary::new()),
        _ => Dictionary::new(),
    };
    entries.set(name, value);
    resources.set(category.to_vec(), Object::Dictionary(entries));

    let page = doc.get_object_mut(page_id).and_then(Object::as_dict_mut)?;
    page.set("Resources", Object::Dictionary(resources));
    Ok(())
}

pub(crate) fn save_document(doc: &mut Document) -> EngineResult<Vec<u8>> {
    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|err| EngineError::Backend(format!("failed to serialize document: {err}")))?;
    Ok(buffer)
}

/// Indirect references held by an array object (direct or referenced)
pub(crate) fn reference_array(doc: &Document, obj: &Object) -> Vec<ObjectId> {
    match resolve(doc, obj) {
        Object::Array(items) => items
            .iter()
            .filter_map(|item| item.as_reference().ok())
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    #[test]
    fn test_decode_utf16_text() {
        let bytes = [0xFE, 0xFF, 0x00, 0x48, 0x00, 0xE9];
        assert_eq!(decode_text(&bytes), "Hé");
        assert_eq!(decode_text(b"plain"), "plain");
    }

    #[test]
    fn test_winansi_replaces_unsupported() {
        assert_eq!(winansi_bytes("Aé€"), vec![b'A', 0xE9, b'?']);
    }

    #[test]
    fn test_rect_normalized() {
        let doc = Document::with_version("1.7");
        let obj = Object::Array(vec![
            Object::Integer(100),
            Object::Real(50.0),
            Object::Integer(10),
            Object::Integer(20),
        ]);
        assert_eq!(rect_from(&doc, &obj), Some([10.0, 20.0, 100.0, 50.0]));
    }

    #[test]
    fn test_inherited_media_box() {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(200),
                    Object::Integer(300),
                ],
            }),
        );

        assert_eq!(page_size(&doc, page_id), PageSize::new(200.0, 300.0));
    }

    #[test]
    fn test_encrypted_rejected() {
        assert!(matches!(
            reject_encrypted(b"%PDF-1.7 /Encrypt 5 0 R"),
            Err(EngineError::EncryptedUnsupported)
        ));
        assert!(reject_encrypted(b"%PDF-1.7").is_ok());
    }
}
