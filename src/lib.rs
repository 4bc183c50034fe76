//! relist - incremental listing crawler
//!
//! Discovers items from a paginated listing source, fetches each item's
//! detail page, and recrawls them on a schedule. Every result is appended
//! to a journal that rebuilds the in-memory registry after a restart.
//!
//! # Architecture
//!
//! - [`config`] - Configuration management and settings
//! - [`registry`] - In-memory item state and batch selection
//! - [`storage`] - Journal, run-id counter and startup hydration
//! - [`crawler`] - Discovery and detail loops, rate limiting, HTTP capabilities
//! - [`parser`] - HTML extraction for search results and post pages
//! - [`models`] - Core data structures and types
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use relist::config::Config;
//! use relist::crawler::{Crawler, HttpFetcher, ListingSource, PostFetcher};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let http = Arc::new(HttpFetcher::from_config(&config.crawler)?);
//!     let crawler = Crawler::open(config).await?;
//!
//!     let source = Arc::new(ListingSource::new(Arc::clone(&http), 1));
//!     let fetcher = Arc::new(PostFetcher::new(http));
//!     crawler.run(source, fetcher).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod crawler;
pub mod error;
pub mod models;
pub mod parser;
pub mod registry;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::crawler::{Crawler, DetailFetcher, DiscoverySource};
    pub use crate::error::{Error, ErrorCategory, RelistErrorTrait, Result};
    pub use crate::models::{DetailFields, DiscoveredItem, FetchOutcome, Item, RunId};
    pub use crate::registry::{Registry, SharedRegistry};
    pub use crate::storage::{Journal, JournalRecord};
}

pub use models::{DiscoveredItem, FetchOutcome, Item};
