//! HTML parsing and data extraction
//!
//! Pure functions over page HTML: [`listing`] turns a search-results page
//! into discovered items, [`detail`] turns a post page into a fetch outcome.
//! Missing optional fields become `None`; only a page without its main
//! container is a [`ParseError`](crate::utils::error::ParseError).

pub mod detail;
pub mod listing;
mod selectors;

pub use detail::parse_post_page;
pub use listing::{parse_listing_page, ListingPage};

use regex::Regex;
use scraper::ElementRef;
use std::sync::OnceLock;

use crate::utils::non_empty;

/// Bedroom count and floor area from a housing blurb like `/ 2br - 850ft2 -`
pub fn parse_housing(text: &str) -> (Option<u32>, Option<u32>) {
    static BEDROOMS_RE: OnceLock<Regex> = OnceLock::new();
    static AREA_RE: OnceLock<Regex> = OnceLock::new();

    let bedrooms_re =
        BEDROOMS_RE.get_or_init(|| Regex::new(r"(?i)(\d+)br").expect("Invalid regex pattern"));
    let area_re =
        AREA_RE.get_or_init(|| Regex::new(r"(?i)(\d+)ft2").expect("Invalid regex pattern"));

    let capture = |re: &Regex| {
        re.captures(text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok())
    };

    (capture(bedrooms_re), capture(area_re))
}

/// Whitespace-normalized text of an element, `None` when blank
pub(crate) fn element_text(element: ElementRef<'_>) -> Option<String> {
    non_empty(&element.text().collect::<String>())
}

/// Trimmed attribute value, `None` when absent or blank
pub(crate) fn attr(element: ElementRef<'_>, name: &str) -> Option<String> {
    element
        .value()
        .attr(name)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
