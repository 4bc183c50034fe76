//! In-memory registry of known items
//!
//! The registry is the authoritative view of crawl state while the process
//! runs and is rebuilt from the journal on startup. Both loops share one
//! instance through [`SharedRegistry`]; every operation below is complete
//! on its own, so interleaving the loops' calls cannot leave an item half
//! updated.
//!
//! # Selection
//!
//! [`Registry::select_next_batch`] picks work in two tiers:
//!
//! 1. items never fetched, in discovery order;
//! 2. only when tier 1 is empty, non-removed items whose last fetch is older
//!    than the recrawl period, oldest first.
//!
//! An empty result means nothing is due yet.

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::config::ScheduleConfig;
use crate::error::{Error, Result};
use crate::models::{DetailFields, DiscoveredItem, FetchOutcome, Item};
use crate::storage::journal::JournalRecord;

/// Registry handle shared by the discovery and detail loops
pub type SharedRegistry = Arc<RwLock<Registry>>;

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    /// Discovery order
    seq: u64,
    item: Item,
}

/// Effect of applying one journal record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Applied {
    /// The record introduced a new item
    pub inserted: bool,
    /// The record advanced `last_fetched_at`
    pub fetched: bool,
}

/// Point-in-time counters over the registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistrySummary {
    pub total: usize,
    pub never_fetched: usize,
    pub due: usize,
    pub removed: usize,
}

/// Map of item id to crawl state
#[derive(Debug, Clone)]
pub struct Registry {
    items: HashMap<String, Entry>,
    next_seq: u64,
    recrawl_period: TimeDelta,
    refresh_discovered_fields: bool,
}

impl PartialEq for Registry {
    fn eq(&self, other: &Self) -> bool {
        self.recrawl_period == other.recrawl_period
            && self.refresh_discovered_fields == other.refresh_discovered_fields
            && self.ordered_items().eq(other.ordered_items())
    }
}

impl Registry {
    /// Create an empty registry with the given recrawl period
    pub fn new(recrawl_period: Duration) -> Self {
        Self {
            items: HashMap::new(),
            next_seq: 0,
            recrawl_period: TimeDelta::from_std(recrawl_period).unwrap_or(TimeDelta::MAX),
            refresh_discovered_fields: false,
        }
    }

    /// Create a registry from the schedule configuration
    pub fn from_config(config: &ScheduleConfig) -> Self {
        Self::new(config.recrawl_period())
            .with_refresh_discovered_fields(config.refresh_discovered_fields)
    }

    /// Let repeated discoveries overwrite title, price and the other soft fields
    #[must_use]
    pub fn with_refresh_discovered_fields(mut self, refresh: bool) -> Self {
        self.refresh_discovered_fields = refresh;
        self
    }

    /// Wrap into a handle for the loops
    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(RwLock::new(self))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Item> {
        self.items.get(id).map(|entry| &entry.item)
    }

    /// Items in discovery order
    pub fn items(&self) -> Vec<&Item> {
        self.ordered_items().collect()
    }

    fn ordered_items(&self) -> impl Iterator<Item = &Item> {
        let mut entries: Vec<&Entry> = self.items.values().collect();
        entries.sort_by_key(|entry| entry.seq);
        entries.into_iter().map(|entry| &entry.item)
    }

    fn entry_mut(&mut self, id: &str) -> Result<&mut Item> {
        self.items
            .get_mut(id)
            .map(|entry| &mut entry.item)
            .ok_or_else(|| Error::unknown_item(id))
    }

    /// Insert `item` unless its id is already known
    ///
    /// Returns `true` when the item was inserted. An existing entry is left
    /// untouched.
    pub fn record_found(&mut self, item: Item) -> bool {
        if self.items.contains_key(&item.id) {
            return false;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.items.insert(item.id.clone(), Entry { seq, item });
        true
    }

    /// Record a discovery result, refreshing soft fields if configured
    pub fn record_discovered(&mut self, found: &DiscoveredItem) -> bool {
        if self.record_found(Item::discovered(found)) {
            return true;
        }

        if self.refresh_discovered_fields {
            if let Some(entry) = self.items.get_mut(&found.id) {
                entry.item.discovered = found.fields.clone();
            }
        }
        false
    }

    /// Set `last_fetched_at`, ignoring timestamps older than the current one
    ///
    /// Returns `true` when the timestamp was applied.
    pub fn mark_fetched(&mut self, id: &str, at: DateTime<Utc>) -> Result<bool> {
        let item = self.entry_mut(id)?;
        if item.last_fetched_at.is_some_and(|current| at < current) {
            tracing::debug!(item_id = id, at = %at, "Ignoring out-of-order fetch time");
            return Ok(false);
        }
        item.last_fetched_at = Some(at);
        Ok(true)
    }

    /// Flag an item as removed at the source
    pub fn mark_removed(&mut self, id: &str, reason: impl Into<String>) -> Result<()> {
        let item = self.entry_mut(id)?;
        item.removed = Some(reason.into());
        Ok(())
    }

    /// Store detail fields, subject to the same ordering guard as [`Self::mark_fetched`]
    pub fn record_detail(&mut self, id: &str, detail: DetailFields) -> Result<bool> {
        if !self.mark_fetched(id, detail.fetched_at)? {
            return Ok(false);
        }
        self.entry_mut(id)?.detail = Some(detail);
        Ok(true)
    }

    /// Apply a journal record
    ///
    /// The live loops and startup hydration both go through here, which is
    /// what makes replay reproduce the pre-crash state.
    pub fn apply(&mut self, record: &JournalRecord) -> Result<Applied> {
        match record {
            JournalRecord::Discovery(found) => Ok(Applied {
                inserted: self.record_discovered(found),
                fetched: false,
            }),
            JournalRecord::Detail(detail) => {
                let inserted = self.record_found(Item::new(detail.id.clone(), detail.url.clone()));
                let fetched = match &detail.outcome {
                    FetchOutcome::Detail(fields) => self.record_detail(&detail.id, fields.clone())?,
                    FetchOutcome::Removed { reason, fetched_at } => {
                        let fetched = self.mark_fetched(&detail.id, *fetched_at)?;
                        self.mark_removed(&detail.id, reason.clone())?;
                        fetched
                    }
                };
                Ok(Applied { inserted, fetched })
            }
        }
    }

    /// Select up to `limit` ids due for a detail fetch now
    pub fn select_next_batch(&self, limit: usize) -> Vec<String> {
        self.select_next_batch_at(limit, Utc::now())
    }

    /// Select up to `limit` ids due for a detail fetch at `now`
    pub fn select_next_batch_at(&self, limit: usize, now: DateTime<Utc>) -> Vec<String> {
        if limit == 0 {
            return Vec::new();
        }

        let mut never_fetched: Vec<&Entry> = self
            .items
            .values()
            .filter(|entry| !entry.item.is_removed() && entry.item.last_fetched_at.is_none())
            .collect();

        if !never_fetched.is_empty() {
            never_fetched.sort_by_key(|entry| entry.seq);
            return never_fetched
                .into_iter()
                .take(limit)
                .map(|entry| entry.item.id.clone())
                .collect();
        }

        let mut stale: Vec<(DateTime<Utc>, u64, &str)> = self
            .items
            .values()
            .filter(|entry| !entry.item.is_removed())
            .filter_map(|entry| {
                let last = entry.item.last_fetched_at?;
                self.is_overdue(last, now)
                    .then_some((last, entry.seq, entry.item.id.as_str()))
            })
            .collect();

        stale.sort();
        stale
            .into_iter()
            .take(limit)
            .map(|(_, _, id)| id.to_string())
            .collect()
    }

    fn is_overdue(&self, last_fetched_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - last_fetched_at > self.recrawl_period
    }

    /// Counters for status reporting
    pub fn summary_at(&self, now: DateTime<Utc>) -> RegistrySummary {
        let mut summary = RegistrySummary {
            total: self.items.len(),
            ..Default::default()
        };

        for entry in self.items.values() {
            let item = &entry.item;
            if item.is_removed() {
                summary.removed += 1;
            } else {
                match item.last_fetched_at {
                    None => summary.never_fetched += 1,
                    Some(last) if self.is_overdue(last, now) => summary.due += 1,
                    Some(_) => {}
                }
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DiscoveredFields;
    use crate::storage::journal::DetailRecord;
    use chrono::TimeZone;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 3, 1, 12, 0, 0).unwrap()
    }

    fn found(id: &str, title: &str) -> DiscoveredItem {
        DiscoveredItem {
            run_id: 1,
            id: id.to_string(),
            url: format!("https://example.org/apa/{id}.html"),
            fields: DiscoveredFields {
                title: Some(title.to_string()),
                ..Default::default()
            },
        }
    }

    fn registry_with(ids: &[&str]) -> Registry {
        let mut registry = Registry::new(DAY);
        for id in ids {
            registry.record_discovered(&found(id, "title"));
        }
        registry
    }

    #[test]
    fn test_record_found_is_insert_if_absent() {
        let mut registry = Registry::new(DAY);
        assert!(registry.record_discovered(&found("a", "first")));
        assert!(!registry.record_discovered(&found("a", "second")));

        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get("a").unwrap().discovered.title.as_deref(),
            Some("first")
        );
    }

    #[test]
    fn test_refresh_policy_updates_soft_fields_only() {
        let mut registry = Registry::new(DAY).with_refresh_discovered_fields(true);
        registry.record_discovered(&found("a", "first"));

        let mut again = found("a", "second");
        again.url = "https://example.org/elsewhere.html".to_string();
        assert!(!registry.record_discovered(&again));

        let item = registry.get("a").unwrap();
        assert_eq!(item.discovered.title.as_deref(), Some("second"));
        assert_eq!(item.url, "https://example.org/apa/a.html");
    }

    #[test]
    fn test_mark_fetched_unknown_item() {
        let mut registry = Registry::new(DAY);
        let err = registry.mark_fetched("missing", t0()).unwrap_err();
        assert!(matches!(err, Error::UnknownItem { ref id } if id == "missing"));
        assert!(registry.mark_removed("missing", "gone").is_err());
    }

    #[test]
    fn test_mark_fetched_is_monotonic() {
        let mut registry = registry_with(&["a"]);
        let t1 = t0() + TimeDelta::hours(1);

        assert!(registry.mark_fetched("a", t1).unwrap());
        assert!(!registry.mark_fetched("a", t0()).unwrap());
        assert_eq!(registry.get("a").unwrap().last_fetched_at, Some(t1));

        // Equal timestamps are not older.
        assert!(registry.mark_fetched("a", t1).unwrap());
    }

    #[test]
    fn test_stale_detail_is_discarded() {
        let mut registry = registry_with(&["a"]);
        let mut newer = DetailFields::fetched_at(t0() + TimeDelta::hours(2));
        newer.title = Some("newer".to_string());
        let mut older = DetailFields::fetched_at(t0());
        older.title = Some("older".to_string());

        assert!(registry.record_detail("a", newer).unwrap());
        assert!(!registry.record_detail("a", older).unwrap());
        assert_eq!(
            registry.get("a").unwrap().detail.as_ref().unwrap().title.as_deref(),
            Some("newer")
        );
    }

    #[test]
    fn test_never_fetched_first_in_discovery_order() {
        let registry = registry_with(&["c", "a", "b"]);
        assert_eq!(registry.select_next_batch_at(10, t0()), vec!["c", "a", "b"]);
        assert_eq!(registry.select_next_batch_at(2, t0()), vec!["c", "a"]);
        assert!(registry.select_next_batch_at(0, t0()).is_empty());
    }

    #[test]
    fn test_batch_prioritization() {
        let mut registry = registry_with(&["b", "c", "a"]);
        let now = t0();
        registry.mark_fetched("b", now - TimeDelta::days(2)).unwrap();
        registry.mark_fetched("c", now - TimeDelta::hours(1)).unwrap();

        assert_eq!(registry.select_next_batch_at(10, now), vec!["a"]);

        registry.mark_fetched("a", now).unwrap();
        assert_eq!(registry.select_next_batch_at(10, now), vec!["b"]);
    }

    #[test]
    fn test_stale_tier_oldest_first() {
        let mut registry = registry_with(&["a", "b", "c"]);
        let now = t0();
        registry.mark_fetched("a", now - TimeDelta::days(2)).unwrap();
        registry.mark_fetched("b", now - TimeDelta::days(5)).unwrap();
        registry.mark_fetched("c", now - TimeDelta::days(3)).unwrap();

        assert_eq!(registry.select_next_batch_at(10, now), vec!["b", "c", "a"]);
        assert_eq!(registry.select_next_batch_at(1, now), vec!["b"]);
    }

    #[test]
    fn test_recrawl_boundary() {
        let mut registry = registry_with(&["exact", "past"]);
        let now = t0();
        registry.mark_fetched("exact", now - TimeDelta::days(1)).unwrap();
        registry
            .mark_fetched("past", now - TimeDelta::days(1) - TimeDelta::milliseconds(1))
            .unwrap();

        assert_eq!(registry.select_next_batch_at(10, now), vec!["past"]);
    }

    #[test]
    fn test_removed_items_never_selected() {
        let mut registry = registry_with(&["a", "b"]);
        let now = t0();
        registry.mark_fetched("a", now - TimeDelta::days(30)).unwrap();
        registry.mark_removed("a", "This posting has been flagged for removal.").unwrap();
        registry.mark_removed("b", "gone").unwrap();

        assert!(registry.select_next_batch_at(10, now).is_empty());
    }

    #[test]
    fn test_removed_survives_rediscovery() {
        let mut registry = registry_with(&["a"]).with_refresh_discovered_fields(true);
        registry.mark_removed("a", "expired").unwrap();
        registry.record_discovered(&found("a", "relisted"));

        assert!(registry.get("a").unwrap().is_removed());
    }

    #[test]
    fn test_apply_detail_for_unseen_item_inserts_it() {
        let mut registry = Registry::new(DAY);
        let record = JournalRecord::Detail(DetailRecord {
            id: "late".to_string(),
            url: "https://example.org/apa/late.html".to_string(),
            outcome: FetchOutcome::Removed {
                reason: "deleted".to_string(),
                fetched_at: t0(),
            },
        });

        let applied = registry.apply(&record).unwrap();
        assert!(applied.inserted && applied.fetched);

        let item = registry.get("late").unwrap();
        assert_eq!(item.last_fetched_at, Some(t0()));
        assert_eq!(item.removed.as_deref(), Some("deleted"));
    }

    #[test]
    fn test_summary() {
        let mut registry = registry_with(&["new", "due", "fresh", "gone"]);
        let now = t0();
        registry.mark_fetched("due", now - TimeDelta::days(2)).unwrap();
        registry.mark_fetched("fresh", now).unwrap();
        registry.mark_removed("gone", "deleted").unwrap();

        assert_eq!(
            registry.summary_at(now),
            RegistrySummary {
                total: 4,
                never_fetched: 1,
                due: 1,
                removed: 1,
            }
        );
    }
}
