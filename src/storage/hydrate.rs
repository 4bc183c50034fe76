//! Rebuild the registry from the journal at startup

use futures::TryStreamExt;
use std::time::Instant;

use crate::error::Result;
use crate::registry::Registry;
use crate::storage::journal::{Journal, JournalRecord};

/// Counters from one hydration pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HydrationStats {
    pub records: usize,
    pub discovery_records: usize,
    pub detail_records: usize,
    /// Items in the registry afterwards
    pub items: usize,
}

/// Replay every journal record, in file order, into `registry`
///
/// Records go through [`Registry::apply`], the same path the live loops use.
pub async fn hydrate(journal: &Journal, registry: &mut Registry) -> Result<HydrationStats> {
    let started = Instant::now();
    let mut stats = HydrationStats::default();
    let mut records = journal.read_all();

    while let Some(record) = records.try_next().await? {
        match &record {
            JournalRecord::Discovery(_) => stats.discovery_records += 1,
            JournalRecord::Detail(_) => stats.detail_records += 1,
        }
        registry.apply(&record)?;
        stats.records += 1;
    }
    stats.items = registry.len();

    tracing::info!(
        path = %journal.path().display(),
        records = stats.records,
        items = stats.items,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Hydrated registry from journal"
    );

    Ok(stats)
}
