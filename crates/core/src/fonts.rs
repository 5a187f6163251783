//! Font resolution for text written into exported documents
//!
//! A [`FontService`] is created per session and resolves a requested family
//! through a cascade:
//! 1. a registered font with exactly that family name
//! 2. a registered font whose normalized name matches
//! 3. the optional [`FontFetcher`], retried on transient failures
//! 4. serif / sans-serif / monospace heuristics on the family name
//! 5. Helvetica
//!
//! Resolution never fails, so text is never dropped for lack of a font.

use std::collections::HashMap;
use std::sync::Arc;

use folio_engine::{FontClass, FontData, StandardFont};
use thiserror::Error;

/// How a family was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontMatch {
    Exact,
    Normalized,
    Fetched,
    Class(FontClass),
    Default,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFont {
    pub data: FontData,
    pub matched: FontMatch,
}

/// Font fetch failure; transient failures are retried
#[derive(Debug, Clone, Error)]
#[error("font fetch failed: {message}")]
pub struct FontFetchError {
    pub message: String,
    pub transient: bool,
}

impl FontFetchError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: true,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: false,
        }
    }
}

/// Source of TrueType data for families that are not registered
pub trait FontFetcher {
    /// `Ok(None)` means the family is unknown to this source
    fn fetch(&mut self, family: &str) -> Result<Option<Vec<u8>>, FontFetchError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FontKey {
    family: String,
    bold: bool,
    italic: bool,
}

/// Session-owned font resolver with an explicit cache
pub struct FontService {
    registered: HashMap<String, Arc<[u8]>>,
    fetcher: Option<Box<dyn FontFetcher>>,
    cache: HashMap<FontKey, ResolvedFont>,
    max_attempts: u32,
}

impl std::fmt::Debug for FontService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontService")
            .field("registered", &self.registered.keys().collect::<Vec<_>>())
            .field("fetcher", &self.fetcher.is_some())
            .field("cached", &self.cache.len())
            .finish()
    }
}

impl Default for FontService {
    fn default() -> Self {
        Self::new()
    }
}

impl FontService {
    pub fn new() -> Self {
        Self {
            registered: HashMap::new(),
            fetcher: None,
            cache: HashMap::new(),
            max_attempts: 2,
        }
    }

    pub fn with_fetcher(mut self, fetcher: Box<dyn FontFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Total fetch attempts per family (at least 1)
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Register TrueType data under a family name
    pub fn register(&mut self, family: impl Into<String>, data: impl Into<Arc<[u8]>>) {
        self.registered.insert(family.into(), data.into());
        self.cache.clear();
    }

    pub fn registered_families(&self) -> impl Iterator<Item = &str> {
        self.registered.keys().map(String::as_str)
    }

    /// Resolve a family and style to font data
    pub fn resolve(&mut self, family: &str, bold: bool, italic: bool) -> ResolvedFont {
        let key = FontKey {
            family: family.to_string(),
            bold,
            italic,
        };
        if let Some(hit) = self.cache.get(&key) {
            return hit.clone();
        }

        let resolved = self.lookup(family, bold, italic);
        tracing::debug!(family, bold, italic, matched = ?resolved.matched, "font resolved");
        self.cache.insert(key, resolved.clone());
        resolved
    }

    fn lookup(&mut self, family: &str, bold: bool, italic: bool) -> ResolvedFont {
        if let Some(data) = self.registered.get(family) {
            return truetype(data, FontMatch::Exact);
        }

        let wanted = normalize(family);
        if !wanted.is_empty() {
            if let Some(data) = self
                .registered
                .iter()
                .find(|(name, _)| normalize(name) == wanted)
                .map(|(_, data)| data)
            {
                return truetype(data, FontMatch::Normalized);
            }
        }

        if let Some(data) = self.fetch(family) {
            self.registered.insert(family.to_string(), data.clone());
            return truetype(&data, FontMatch::Fetched);
        }

        match classify(family) {
            Some(class) => ResolvedFont {
                data: FontData::Standard(StandardFont::styled(class, bold, italic)),
                matched: FontMatch::Class(class),
            },
            None => ResolvedFont {
                data: FontData::Standard(StandardFont::styled(FontClass::SansSerif, bold, italic)),
                matched: FontMatch::Default,
            },
        }
    }

    fn fetch(&mut self, family: &str) -> Option<Arc<[u8]>> {
        let fetcher = self.fetcher.as_mut()?;
        for attempt in 1..=self.max_attempts {
            match fetcher.fetch(family) {
                Ok(Some(bytes)) => return Some(bytes.into()),
                Ok(None) => return None,
                Err(err) if err.transient && attempt < self.max_attempts => {
                    tracing::debug!(family, attempt, error = %err, "retrying font fetch");
                }
                Err(err) => {
                    tracing::warn!(family, attempt, error = %err, "font fetch gave up");
                    return None;
                }
            }
        }
        None
    }

    /// Forget every resolution, keeping registered fonts
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}

fn truetype(data: &Arc<[u8]>, matched: FontMatch) -> ResolvedFont {
    ResolvedFont {
        data: FontData::TrueType(data.clone()),
        matched,
    }
}

const STYLE_SUFFIXES: &[&str] = &["regular", "bold", "italic", "oblique", "psmt", "mt"];

/// Lowercase alphanumerics with trailing style words removed
pub fn normalize(family: &str) -> String {
    let mut name: String = family
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect();

    loop {
        let before = name.len();
        for suffix in STYLE_SUFFIXES {
            if name.len() > suffix.len() && name.ends_with(suffix) {
                name.truncate(name.len() - suffix.len());
            }
        }
        if name.len() == before {
            break;
        }
    }
    name
}

const MONO_HINTS: &[&str] = &["mono", "courier", "consol", "code", "menlo", "typewriter"];
const SANS_HINTS: &[&str] = &[
    "sans", "helvetica", "arial", "verdana", "inter", "roboto", "calibri", "segoe", "gothic",
    "tahoma",
];
const SERIF_HINTS: &[&str] = &[
    "serif", "times", "georgia", "garamond", "roman", "baskerville", "cambria", "palatino", "book",
];

/// Guess the generic class of a family name
pub fn classify(family: &str) -> Option<FontClass> {
    let name = family.to_lowercase();
    let has = |hints: &[&str]| hints.iter().any(|hint| name.contains(hint));

    if has(MONO_HINTS) {
        Some(FontClass::Monospace)
    } else if has(SANS_HINTS) {
        Some(FontClass::SansSerif)
    } else if has(SERIF_HINTS) {
        Some(FontClass::Serif)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedFetcher {
        responses: Vec<Result<Option<Vec<u8>>, FontFetchError>>,
        calls: std::rc::Rc<std::cell::Cell<u32>>,
    }

    impl FontFetcher for ScriptedFetcher {
        fn fetch(&mut self, _family: &str) -> Result<Option<Vec<u8>>, FontFetchError> {
            self.calls.set(self.calls.get() + 1);
            if self.responses.is_empty() {
                Ok(None)
            } else {
                self.responses.remove(0)
            }
        }
    }

    fn fetcher(
        responses: Vec<Result<Option<Vec<u8>>, FontFetchError>>,
    ) -> (Box<dyn FontFetcher>, std::rc::Rc<std::cell::Cell<u32>>) {
        let calls = std::rc::Rc::new(std::cell::Cell::new(0));
        (
            Box::new(ScriptedFetcher {
                responses,
                calls: calls.clone(),
            }),
            calls,
        )
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("Open Sans-Bold"), "opensans");
        assert_eq!(normalize("ArialMT"), "arial");
        assert_eq!(normalize("Times New Roman PSMT"), "timesnewroman");
        assert_eq!(normalize("Bold"), "bold");
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("DejaVu Sans Mono"), Some(FontClass::Monospace));
        assert_eq!(classify("Noto Sans"), Some(FontClass::SansSerif));
        assert_eq!(classify("Noto Serif"), Some(FontClass::Serif));
        assert_eq!(classify("Georgia"), Some(FontClass::Serif));
        assert_eq!(classify("Zapfino"), None);
    }

    #[test]
    fn test_cascade_exact_then_normalized() {
        let mut fonts = FontService::new();
        fonts.register("Open Sans", vec![1u8, 2, 3]);

        assert_eq!(fonts.resolve("Open Sans", false, false).matched, FontMatch::Exact);
        assert_eq!(
            fonts.resolve("OpenSans-Regular", false, false).matched,
            FontMatch::Normalized
        );
    }

    #[test]
    fn test_cascade_heuristics_and_default() {
        let mut fonts = FontService::new();

        let serif = fonts.resolve("Garamond", true, false);
        assert_eq!(serif.matched, FontMatch::Class(FontClass::Serif));
        assert_eq!(serif.data, FontData::Standard(StandardFont::TimesBold));

        let unknown = fonts.resolve("Zapfino", false, true);
        assert_eq!(unknown.matched, FontMatch::Default);
        assert_eq!(unknown.data, FontData::Standard(StandardFont::HelveticaOblique));
    }

    #[test]
    fn test_fetch_retries_transient_errors() {
        let (fetcher, calls) = fetcher(vec![
            Err(FontFetchError::transient("timeout")),
            Ok(Some(vec![9u8; 4])),
        ]);
        let mut fonts = FontService::new().with_fetcher(fetcher).with_max_attempts(3);

        assert_eq!(fonts.resolve("Lobster", false, false).matched, FontMatch::Fetched);
        assert_eq!(calls.get(), 2);
        assert!(fonts.registered_families().any(|f| f == "Lobster"));
    }

    #[test]
    fn test_fetch_gives_up_and_falls_back() {
        let (fetcher, calls) = fetcher(vec![
            Err(FontFetchError::transient("timeout")),
            Err(FontFetchError::transient("timeout")),
            Ok(Some(vec![1u8])),
        ]);
        let mut fonts = FontService::new().with_fetcher(fetcher).with_max_attempts(2);

        assert_eq!(
            fonts.resolve("Courier Prime", false, false).matched,
            FontMatch::Class(FontClass::Monospace)
        );
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_permanent_error_not_retried() {
        let (fetcher, calls) = fetcher(vec![Err(FontFetchError::permanent("404"))]);
        let mut fonts = FontService::new().with_fetcher(fetcher).with_max_attempts(5);
        fonts.resolve("Lobster", false, false);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_cache_and_clear() {
        let mut fonts = FontService::new();
        fonts.resolve("Arial", false, false);
        fonts.resolve("Arial", false, false);
        fonts.resolve("Arial", true, false);
        assert_eq!(fonts.cached_len(), 2);

        fonts.clear_cache();
        assert_eq!(fonts.cached_len(), 0);
    }
}
