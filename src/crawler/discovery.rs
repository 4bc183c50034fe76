//! Discovery loop
//!
//! Each pass takes a fresh run id, persisted before the source is touched, so
//! ids count attempted runs and a crash mid-pass never reuses one.

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::DiscoverySource;
use crate::error::{RelistErrorTrait, Result};
use crate::models::RunId;
use crate::registry::SharedRegistry;
use crate::storage::journal::{Journal, JournalRecord};
use crate::storage::run_id::RunIdStore;

/// Summary of one discovery pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    pub run_id: RunId,
    /// Items the source yielded
    pub found: usize,
    /// Items not previously in the registry
    pub new_items: usize,
    /// Fetch error that ended the pass early
    pub error: Option<String>,
}

pub struct DiscoveryLoop {
    registry: SharedRegistry,
    journal: Arc<Journal>,
    source: Arc<dyn DiscoverySource>,
    run_ids: Arc<RunIdStore>,
    source_url: String,
    period: Duration,
}

impl DiscoveryLoop {
    pub fn new(
        registry: SharedRegistry,
        journal: Arc<Journal>,
        source: Arc<dyn DiscoverySource>,
        run_ids: Arc<RunIdStore>,
        source_url: impl Into<String>,
        period: Duration,
    ) -> Self {
        Self {
            registry,
            journal,
            source,
            run_ids,
            source_url: source_url.into(),
            period,
        }
    }

    /// One discovery pass
    ///
    /// A fetch error from the source ends the pass and is reported, not
    /// returned; items seen before it are kept.
    pub async fn run_once(&self) -> Result<DiscoveryReport> {
        let run_id = self.run_ids.next().await?;
        info!(run_id, source_url = %self.source_url, "Starting discovery run");

        let mut report = DiscoveryReport {
            run_id,
            ..Default::default()
        };

        let mut items = self.source.discover(&self.source_url, run_id);
        while let Some(next) = items.next().await {
            let found = match next {
                Ok(found) => found,
                Err(e) => {
                    warn!(
                        run_id,
                        category = ?e.category(),
                        status = ?e.status(),
                        error = %e,
                        "Discovery run ended early"
                    );
                    report.error = Some(e.to_string());
                    break;
                }
            };

            let record = JournalRecord::Discovery(found);
            self.journal.append(&record).await?;
            let applied = self.registry.write().await.apply(&record)?;

            report.found += 1;
            if applied.inserted {
                report.new_items += 1;
            }
        }

        info!(
            run_id,
            found = report.found,
            new_items = report.new_items,
            "Discovery run complete"
        );
        Ok(report)
    }

    /// Run passes forever, `period` apart
    ///
    /// Returns only on an error outside the source itself, such as a failed
    /// journal append or run-id write.
    pub async fn run(&self) -> Result<()> {
        loop {
            self.run_once().await?;
            tokio::time::sleep(self.period).await;
        }
    }
}
