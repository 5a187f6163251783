//! Page range parsing (`"1-3,5"`)

use std::fmt;

use crate::error::ValidationError;

/// Inclusive range of 1-based page numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    pub fn single(page: u32) -> Self {
        Self {
            start: page,
            end: page,
        }
    }

    pub fn pages(&self) -> impl Iterator<Item = u32> {
        self.start..=self.end
    }

    pub fn len(&self) -> usize {
        (self.end - self.start + 1) as usize
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// Parse a comma separated list of pages and ranges against `page_count`
///
/// `"2-"` runs to the last page. Whitespace is ignored.
///
/// # Example
///
/// ```
/// use folio_core::{parse_page_ranges, PageRange};
///
/// let ranges = parse_page_ranges("1-3, 5", 10).unwrap();
/// assert_eq!(ranges, vec![PageRange { start: 1, end: 3 }, PageRange::single(5)]);
/// assert!(parse_page_ranges("4-2", 10).is_err());
/// ```
pub fn parse_page_ranges(input: &str, page_count: u32) -> Result<Vec<PageRange>, ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidRange {
        input: input.to_string(),
        reason: reason.to_string(),
    };
    let number = |text: &str| -> Result<u32, ValidationError> {
        let page: u32 = text
            .trim()
            .parse()
            .map_err(|_| invalid(&format!("{:?} is not a page number", text.trim())))?;
        if page == 0 || page > page_count {
            return Err(ValidationError::PageOutOfRange { page, page_count });
        }
        Ok(page)
    };

    if input.trim().is_empty() {
        return Err(invalid("no pages given"));
    }

    input
        .split(',')
        .map(|part| {
            let part = part.trim();
            if part.is_empty() {
                return Err(invalid("empty range"));
            }
            match part.split_once('-') {
                None => number(part).map(PageRange::single),
                Some((start, end)) => {
                    let start = number(start)?;
                    let end = if end.trim().is_empty() {
                        page_count
                    } else {
                        number(end)?
                    };
                    if start > end {
                        return Err(invalid(&format!("{start} is after {end}")));
                    }
                    Ok(PageRange { start, end })
                }
            }
        })
        .collect()
}

/// Distinct pages covered by `ranges`, ascending
pub fn expand(ranges: &[PageRange]) -> Vec<u32> {
    let mut pages: Vec<u32> = ranges.iter().flat_map(PageRange::pages).collect();
    pages.sort_unstable();
    pages.dedup();
    pages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mixed() {
        let ranges = parse_page_ranges(" 1-3 ,5,7- ", 8).unwrap();
        assert_eq!(
            ranges,
            vec![
                PageRange { start: 1, end: 3 },
                PageRange::single(5),
                PageRange { start: 7, end: 8 }
            ]
        );
        assert_eq!(expand(&ranges), vec![1, 2, 3, 5, 7, 8]);
    }

    #[test]
    fn test_expand_dedups() {
        let ranges = parse_page_ranges("3,1-4,2", 5).unwrap();
        assert_eq!(expand(&ranges), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_out_of_range() {
        assert_eq!(
            parse_page_ranges("2-9", 5),
            Err(ValidationError::PageOutOfRange {
                page: 9,
                page_count: 5
            })
        );
        assert!(matches!(
            parse_page_ranges("0", 5),
            Err(ValidationError::PageOutOfRange { page: 0, .. })
        ));
    }

    #[test]
    fn test_malformed() {
        for input in ["", "  ", "1,,2", "a", "1-b", "3-1", "-2"] {
            assert!(
                matches!(
                    parse_page_ranges(input, 5),
                    Err(ValidationError::InvalidRange { .. })
                ),
                "{input:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(PageRange::single(4).to_string(), "4");
        assert_eq!(PageRange { start: 1, end: 3 }.to_string(), "1-3");
    }
}
