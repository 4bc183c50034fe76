//! Discovery over paginated search-result pages

use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use tracing::debug;
use url::Url;

use super::fetcher::HttpFetcher;
use super::DiscoverySource;
use crate::models::{DiscoveredItem, RunId};
use crate::parser::{parse_listing_page, ListingPage};
use crate::utils::error::FetchError;

/// Walks search results from the source URL, following "next" links
pub struct ListingSource {
    fetcher: Arc<HttpFetcher>,
    max_pages: usize,
}

impl ListingSource {
    pub fn new(fetcher: Arc<HttpFetcher>, max_pages: usize) -> Self {
        Self {
            fetcher,
            max_pages: max_pages.max(1),
        }
    }

    async fn fetch_listing(&self, url: &str, run_id: RunId) -> Result<ListingPage, FetchError> {
        let page_url =
            Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))?;
        let html = self.fetcher.fetch_page(url).await?;
        let page = parse_listing_page(&html, &page_url, run_id)?;

        debug!(
            run_id,
            url,
            items = page.items.len(),
            has_next = page.next_page.is_some(),
            "Parsed search results page"
        );
        Ok(page)
    }
}

impl DiscoverySource for ListingSource {
    fn discover<'a>(
        &'a self,
        source_url: &'a str,
        run_id: RunId,
    ) -> BoxStream<'a, Result<DiscoveredItem, FetchError>> {
        let start = Some(source_url.to_string());

        stream::unfold((start, 0usize), move |(next, pages)| async move {
            let url = next?;
            if pages >= self.max_pages {
                return None;
            }

            match self.fetch_listing(&url, run_id).await {
                Ok(page) => {
                    let items: Vec<_> = page.items.into_iter().map(Ok).collect();
                    Some((items, (page.next_page, pages + 1)))
                }
                Err(e) => Some((vec![Err(e)], (None, pages + 1))),
            }
        })
        .flat_map(stream::iter)
        .boxed()
    }
}
