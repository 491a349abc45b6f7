//! HTML parser for ranking pages
//!
//! Every listed subject on a ranking page has a cover anchor such as
//! `<a href="/subject/326" class="subjectCover cover ll">`. The subject
//! identifier is the last path segment of that link.

use crate::subject::SubjectId;
use scraper::{Html, Selector};

/// Selector matching the cover anchor of each listed subject
pub const COVER_SELECTOR: &str = ".subjectCover";

/// Extracts subject identifiers from a ranking page, in document order
///
/// Anchors without an `href`, or whose link has no usable trailing segment,
/// are skipped. Duplicates are kept; callers de-duplicate across pages.
///
/// # Example
///
/// ```no_run
/// use bangumi_collector::crawler::extract_subject_ids;
///
/// let html = r#"<ul><li><a href="/subject/326" class="subjectCover">x</a></li></ul>"#;
/// let ids = extract_subject_ids(html);
/// assert_eq!(ids[0].as_str(), "326");
/// ```
pub fn extract_subject_ids(html: &str) -> Vec<SubjectId> {
    let document = Html::parse_document(html);

    let Ok(selector) = Selector::parse(COVER_SELECTOR) else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|element| element.value().attr("href"))
        .filter_map(trailing_segment)
        .map(SubjectId::new)
        .collect()
}

/// Returns the last non-empty path segment of a link
fn trailing_segment(href: &str) -> Option<&str> {
    let path = href
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim()
        .trim_end_matches('/');

    path.rsplit('/').next().filter(|segment| !segment.is_empty())
}
