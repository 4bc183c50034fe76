//! Detail fetches over post pages

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use super::fetcher::HttpFetcher;
use super::DetailFetcher;
use crate::models::FetchOutcome;
use crate::parser::parse_post_page;
use crate::utils::error::FetchError;

pub struct PostFetcher {
    fetcher: Arc<HttpFetcher>,
}

impl PostFetcher {
    pub fn new(fetcher: Arc<HttpFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl DetailFetcher for PostFetcher {
    async fn fetch(&self, id: &str, url: &str) -> Result<FetchOutcome, FetchError> {
        match self.fetcher.fetch_page(url).await {
            Ok(html) => Ok(parse_post_page(&html, Utc::now())?),
            // Expired and deleted posts are eventually served as gone
            Err(e) => match e.status() {
                Some(status @ (404 | 410)) => {
                    tracing::debug!(item_id = id, status, "Post page gone");
                    Ok(FetchOutcome::Removed {
                        reason: format!("HTTP {status}"),
                        fetched_at: Utc::now(),
                    })
                }
                _ => Err(e),
            },
        }
    }
}
