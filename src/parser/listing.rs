//! Search-results page parsing

use scraper::Html;
use url::Url;

use super::selectors::{
    NEXT_PAGE, RESULT_DATE, RESULT_HEADING_LINK, RESULT_HOUSING, RESULT_INFO, RESULT_LIST,
    RESULT_PRICE, RESULT_ROW,
};
use super::{attr, element_text, parse_housing};
use crate::models::{DiscoveredFields, DiscoveredItem, RunId};
use crate::utils::error::ParseError;

/// Items found on one search-results page
#[derive(Debug, Clone, PartialEq)]
pub struct ListingPage {
    pub items: Vec<DiscoveredItem>,
    /// Absolute URL of the following results page, if the page links one
    pub next_page: Option<String>,
}

/// Parse a search-results page fetched from `page_url`
///
/// Rows without a post id or link are skipped. Relative links are resolved
/// against `page_url`.
pub fn parse_listing_page(
    html: &str,
    page_url: &Url,
    run_id: RunId,
) -> Result<ListingPage, ParseError> {
    let document = Html::parse_document(html);

    if document.select(&RESULT_LIST).next().is_none() {
        return Err(ParseError::MissingElement("ul#search-results"));
    }

    let mut items = Vec::new();
    for row in document.select(&RESULT_ROW) {
        let Some(id) = attr(row, "data-pid") else {
            tracing::debug!("Skipping result row without data-pid");
            continue;
        };

        let info = row.select(&RESULT_INFO).next().unwrap_or(row);
        let link = info.select(&RESULT_HEADING_LINK).next();

        let Some(url) = link
            .and_then(|a| attr(a, "href"))
            .and_then(|href| page_url.join(&href).ok())
        else {
            tracing::debug!(item_id = %id, "Skipping result row without a usable link");
            continue;
        };

        let housing = info.select(&RESULT_HOUSING).next().and_then(element_text);
        let (bedrooms, floor_area) = housing
            .as_deref()
            .map(parse_housing)
            .unwrap_or((None, None));

        items.push(DiscoveredItem {
            run_id,
            id,
            url: url.to_string(),
            fields: DiscoveredFields {
                title: link.and_then(element_text),
                posted_at: info
                    .select(&RESULT_DATE)
                    .next()
                    .and_then(|time| attr(time, "datetime")),
                price: info.select(&RESULT_PRICE).next().and_then(element_text),
                bedrooms,
                floor_area,
            },
        });
    }

    let next_page = document
        .select(&NEXT_PAGE)
        .next()
        .and_then(|a| attr(a, "href"))
        .and_then(|href| page_url.join(&href).ok())
        .filter(|next| next != page_url)
        .map(|next| next.to_string());

    Ok(ListingPage { items, next_page })
}
