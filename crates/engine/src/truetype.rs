//! TrueType metrics needed to embed a font as a simple WinAnsi font

use crate::error::{EngineError, EngineResult};

pub(crate) const FIRST_CHAR: u8 = 32;
pub(crate) const LAST_CHAR: u8 = 255;

const FLAG_FIXED_PITCH: i64 = 1;
const FLAG_NONSYMBOLIC: i64 = 1 << 5;
const FLAG_ITALIC: i64 = 1 << 6;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TrueTypeMetrics {
    pub name: String,
    /// Advance widths for `FIRST_CHAR..=LAST_CHAR` in 1/1000 em
    pub widths: Vec<i64>,
    pub bbox: [i64; 4],
    pub ascent: i64,
    pub descent: i64,
    pub cap_height: i64,
    pub flags: i64,
}

pub(crate) fn parse_metrics(data: &[u8], fallback_name: &str) -> EngineResult<TrueTypeMetrics> {
    let face = ttf_parser::Face::parse(data, 0)
        .map_err(|err| EngineError::Font(format!("invalid TrueType font: {err}")))?;

    let units = f32::from(face.units_per_em().max(1));
    let scale = |value: f32| (value * 1000.0 / units).round() as i64;

    let missing_width = face
        .glyph_hor_advance(ttf_parser::GlyphId(0))
        .map(|advance| scale(f32::from(advance)))
        .unwrap_or(500);

    let widths = (FIRST_CHAR..=LAST_CHAR)
        .map(|code| {
            face.glyph_index(char::from(code))
                .and_then(|glyph| face.glyph_hor_advance(glyph))
                .map(|advance| scale(f32::from(advance)))
                .unwrap_or(missing_width)
        })
        .collect();

    let name = face
        .names()
        .into_iter()
        .filter(|entry| entry.name_id == ttf_parser::name_id::POST_SCRIPT_NAME)
        .find_map(|entry| entry.to_string())
        .map(|name| sanitize_name(&name))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| sanitize_name(fallback_name));

    let bbox = face.global_bounding_box();
    let mut flags = FLAG_NONSYMBOLIC;
    if face.is_monospaced() {
        flags |= FLAG_FIXED_PITCH;
    }
    if face.is_italic() {
        flags |= FLAG_ITALIC;
    }

    Ok(TrueTypeMetrics {
        name,
        widths,
        bbox: [
            scale(f32::from(bbox.x_min)),
            scale(f32::from(bbox.y_min)),
            scale(f32::from(bbox.x_max)),
            scale(f32::from(bbox.y_max)),
        ],
        ascent: scale(f32::from(face.ascender())),
        descent: scale(f32::from(face.descender())),
        cap_height: face
            .capital_height()
            .map(|height| scale(f32::from(height)))
            .unwrap_or_else(|| scale(f32::from(face.ascender())) * 7 / 10),
        flags,
    })
}

/// PDF names must not contain whitespace or delimiters
fn sanitize_name(name: &str) -> String {
    name.chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '-' || *ch == '_')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_font_data() {
        let err = parse_metrics(b"definitely not a font", "Broken").expect_err("invalid font");
        assert!(matches!(err, EngineError::Font(_)));
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("Open Sans (Bold)"), "OpenSansBold");
    }
}
