//! Post page parsing

use chrono::{DateTime, Utc};
use scraper::{ElementRef, Html, Selector};

use super::selectors::{
    POST_ADDRESS, POST_BODY, POST_DESCRIPTION, POST_HOUSING, POST_INFO_TIMES, POST_MAP,
    POST_PRICE, POST_REMOVED, POST_TITLE,
};
use super::{attr, element_text, parse_housing};
use crate::models::{DetailFields, FetchOutcome};
use crate::utils::error::ParseError;

/// Reason recorded when a removal notice carries no text
const DEFAULT_REMOVED_REASON: &str = "removed";

/// Parse a post page fetched at `fetched_at`
///
/// A page whose body carries a removal notice yields
/// [`FetchOutcome::Removed`] with the notice text as reason.
pub fn parse_post_page(html: &str, fetched_at: DateTime<Utc>) -> Result<FetchOutcome, ParseError> {
    let document = Html::parse_document(html);

    let body = document
        .select(&POST_BODY)
        .next()
        .ok_or(ParseError::MissingElement(".body"))?;

    if let Some(notice) = body.select(&POST_REMOVED).next() {
        let reason = element_text(notice).unwrap_or_else(|| DEFAULT_REMOVED_REASON.to_string());
        return Ok(FetchOutcome::Removed { reason, fetched_at });
    }

    let housing = first_text(body, &POST_HOUSING);
    let (bedrooms, sqft) = housing
        .as_deref()
        .map(parse_housing)
        .unwrap_or((None, None));

    let map = body.select(&POST_MAP).next();
    let mut times = body.select(&POST_INFO_TIMES);

    Ok(FetchOutcome::Detail(DetailFields {
        price: first_text(body, &POST_PRICE),
        bedrooms,
        sqft,
        latitude: map.and_then(|m| coordinate(m, "data-latitude")),
        longitude: map.and_then(|m| coordinate(m, "data-longitude")),
        accuracy: map
            .and_then(|m| attr(m, "data-accuracy"))
            .and_then(|v| v.parse().ok()),
        street_address: first_text(body, &POST_ADDRESS),
        title: first_text(body, &POST_TITLE),
        description: body.select(&POST_DESCRIPTION).next().and_then(block_text),
        posted: times.next().and_then(|t| attr(t, "datetime")),
        updated: times.next().and_then(|t| attr(t, "datetime")),
        fetched_at,
    }))
}

fn first_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope.select(selector).next().and_then(element_text)
}

fn coordinate(map: ElementRef<'_>, name: &str) -> Option<f64> {
    attr(map, name)
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// Element text with line structure kept and blank lines dropped
fn block_text(element: ElementRef<'_>) -> Option<String> {
    let text: String = element.text().collect();
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}
