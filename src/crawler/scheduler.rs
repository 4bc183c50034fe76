//! Detail scheduler loop
//!
//! Alternates between two states. `Selecting` asks the registry for a batch
//! and fetches it item by item, each fetch gated by the [`StagedDelay`].
//! `Waiting` sleeps for the recheck delay when nothing is due.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::rate_limit::StagedDelay;
use super::DetailFetcher;
use crate::config::ScheduleConfig;
use crate::error::{Error, RelistErrorTrait, Result};
use crate::registry::SharedRegistry;
use crate::storage::journal::{DetailRecord, Journal, JournalRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Selecting,
    Waiting,
}

/// Outcome counts for one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub selected: usize,
    pub fetched: usize,
    pub removed: usize,
    /// Fetches that errored; those items stay eligible
    pub failed: usize,
}

/// Result of one selection step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Batch(BatchReport),
    /// Nothing due
    Idle,
}

pub struct DetailScheduler {
    registry: SharedRegistry,
    journal: Arc<Journal>,
    fetcher: Arc<dyn DetailFetcher>,
    limiter: StagedDelay,
    batch_size: usize,
    recheck_delay: Duration,
}

impl DetailScheduler {
    pub fn new(
        registry: SharedRegistry,
        journal: Arc<Journal>,
        fetcher: Arc<dyn DetailFetcher>,
        config: &ScheduleConfig,
    ) -> Self {
        Self {
            registry,
            journal,
            fetcher,
            limiter: StagedDelay::new(config.base_interval()),
            batch_size: config.batch_size,
            recheck_delay: config.recheck_delay(),
        }
    }

    /// Select one batch and fetch it
    ///
    /// Per-item fetch errors are logged and counted. A journal or registry
    /// error aborts the batch and is returned.
    pub async fn tick(&self) -> Result<Tick> {
        let batch = self.registry.read().await.select_next_batch(self.batch_size);
        if batch.is_empty() {
            return Ok(Tick::Idle);
        }

        let mut report = BatchReport {
            selected: batch.len(),
            ..Default::default()
        };
        debug!(batch_size = batch.len(), "Selected detail batch");

        for id in batch {
            let url = self
                .registry
                .read()
                .await
                .get(&id)
                .map(|item| item.url.clone())
                .ok_or_else(|| Error::unknown_item(&id))?;

            self.limiter.stage().await;

            let outcome = match self.fetcher.fetch(&id, &url).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(
                        item_id = %id,
                        url = %url,
                        category = ?e.category(),
                        status = ?e.status(),
                        error = %e,
                        "Detail fetch failed"
                    );
                    report.failed += 1;
                    continue;
                }
            };

            if outcome.is_removed() {
                report.removed += 1;
                info!(item_id = %id, "Item removed at source");
            } else {
                report.fetched += 1;
            }

            let record = JournalRecord::Detail(DetailRecord { id, url, outcome });
            self.journal.append(&record).await?;
            self.registry.write().await.apply(&record)?;
        }

        Ok(Tick::Batch(report))
    }

    /// Run until a fatal error
    pub async fn run(&self) -> Result<()> {
        let mut state = SchedulerState::Selecting;

        loop {
            state = match state {
                SchedulerState::Selecting => match self.tick().await? {
                    Tick::Batch(report) => {
                        info!(
                            selected = report.selected,
                            fetched = report.fetched,
                            removed = report.removed,
                            failed = report.failed,
                            "Detail batch complete"
                        );
                        SchedulerState::Selecting
                    }
                    Tick::Idle => SchedulerState::Waiting,
                },
                SchedulerState::Waiting => {
                    debug!(
                        recheck_secs = self.recheck_delay.as_secs(),
                        "No items due, waiting"
                    );
                    tokio::time::sleep(self.recheck_delay).await;
                    SchedulerState::Selecting
                }
            };
        }
    }
}
