//! Crawl scheduling: discovery and detail loops over a shared registry
//!
//! The two capabilities the loops drive are traits, so the HTTP-backed
//! implementations in [`listing`] and [`post`] can be swapped for fakes.
//! [`Crawler`] wires everything together: it hydrates the registry from the
//! journal once, then runs both loops.

pub mod discovery;
pub mod fetcher;
pub mod listing;
pub mod post;
pub mod rate_limit;
pub mod scheduler;

pub use discovery::{DiscoveryLoop, DiscoveryReport};
pub use fetcher::HttpFetcher;
pub use listing::ListingSource;
pub use post::PostFetcher;
pub use rate_limit::StagedDelay;
pub use scheduler::{BatchReport, DetailScheduler, SchedulerState, Tick};

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{Error, RelistErrorTrait, Result};
use crate::models::{DiscoveredItem, FetchOutcome, RunId};
use crate::registry::{Registry, SharedRegistry};
use crate::storage::{hydrate, HydrationStats, Journal, RunIdStore};
use crate::utils::error::FetchError;

/// Enumerates the items currently listed at a source URL
pub trait DiscoverySource: Send + Sync {
    /// Lazy, finite sequence of items for run `run_id`
    ///
    /// An `Err` element ends the pass.
    fn discover<'a>(
        &'a self,
        source_url: &'a str,
        run_id: RunId,
    ) -> BoxStream<'a, std::result::Result<DiscoveredItem, FetchError>>;
}

/// Fetches one item's detail page
#[async_trait]
pub trait DetailFetcher: Send + Sync {
    async fn fetch(&self, id: &str, url: &str) -> std::result::Result<FetchOutcome, FetchError>;
}

/// Hydrated crawl state plus the loops that advance it
pub struct Crawler {
    config: Config,
    registry: SharedRegistry,
    journal: Arc<Journal>,
    run_ids: Arc<RunIdStore>,
    hydration: HydrationStats,
}

impl Crawler {
    /// Validate `config`, open storage and replay the journal
    pub async fn open(config: Config) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::config(format!("{e:#}")))?;

        let journal = Journal::open(config.journal_path()).await?;
        let mut registry = Registry::from_config(&config.schedule);
        let hydration = hydrate(&journal, &mut registry).await?;

        Ok(Self::from_parts(config, registry, journal, hydration))
    }

    /// Assemble a crawler around a registry already consistent with `journal`
    ///
    /// No validation or replay happens here; [`Crawler::open`] is the usual
    /// entry point.
    pub fn from_parts(
        config: Config,
        registry: Registry,
        journal: Journal,
        hydration: HydrationStats,
    ) -> Self {
        let run_ids = RunIdStore::new(config.run_id_path());

        Self {
            config,
            registry: registry.into_shared(),
            journal: Arc::new(journal),
            run_ids: Arc::new(run_ids),
            hydration,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn journal(&self) -> &Arc<Journal> {
        &self.journal
    }

    pub fn run_ids(&self) -> &Arc<RunIdStore> {
        &self.run_ids
    }

    /// What startup replay found
    pub fn hydration(&self) -> HydrationStats {
        self.hydration
    }

    pub fn discovery_loop(&self, source: Arc<dyn DiscoverySource>) -> DiscoveryLoop {
        DiscoveryLoop::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.journal),
            source,
            Arc::clone(&self.run_ids),
            self.config.crawler.source_url.clone(),
            self.config.schedule.discovery_period(),
        )
    }

    pub fn detail_scheduler(&self, fetcher: Arc<dyn DetailFetcher>) -> DetailScheduler {
        DetailScheduler::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.journal),
            fetcher,
            &self.config.schedule,
        )
    }

    /// Run both loops until the detail scheduler stops
    ///
    /// The discovery loop runs as its own task. If it fails, the error is
    /// logged and the scheduler keeps going without new discovery; restarting
    /// the process is left to a supervisor.
    pub async fn run(
        &self,
        source: Arc<dyn DiscoverySource>,
        fetcher: Arc<dyn DetailFetcher>,
    ) -> Result<()> {
        let discovery = self.discovery_loop(source);
        let discovery_task = tokio::spawn(async move {
            if let Err(e) = discovery.run().await {
                tracing::error!(
                    category = ?e.category(),
                    error = %e,
                    "Discovery loop stopped, no new items will be discovered until restart"
                );
            }
        });

        let result = self.detail_scheduler(fetcher).run().await;
        discovery_task.abort();

        if let Err(e) = &result {
            tracing::error!(category = ?e.category(), error = %e, "Detail scheduler stopped");
        }
        result
    }
}
