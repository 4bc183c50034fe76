//! Common test utilities: scripted capabilities and fixtures

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use relist::crawler::{DetailFetcher, DiscoverySource};
use relist::models::{DetailFields, DiscoveredFields, DiscoveredItem, FetchOutcome, RunId};
use relist::registry::Registry;
use relist::storage::{Journal, JournalRecord};
use relist::utils::error::FetchError;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::time::Instant;

/// Discovered item with a predictable URL and title
pub fn found(run_id: RunId, id: &str) -> DiscoveredItem {
    DiscoveredItem {
        run_id,
        id: id.to_string(),
        url: format!("https://vancouver.example.org/apa/d/{id}.html"),
        fields: DiscoveredFields {
            title: Some(format!("Listing {id}")),
            price: Some("$1,900".to_string()),
            bedrooms: Some(1),
            ..Default::default()
        },
    }
}

/// Live detail outcome fetched at `at`
pub fn detail_at(at: DateTime<Utc>) -> FetchOutcome {
    FetchOutcome::Detail(DetailFields {
        title: Some("Detail title".to_string()),
        latitude: Some(49.26),
        longitude: Some(-123.11),
        ..DetailFields::fetched_at(at)
    })
}

/// Record discoveries the way the discovery loop does: journal first, then registry
pub async fn seed(journal: &Journal, registry: &mut Registry, ids: &[&str]) {
    for id in ids {
        let record = JournalRecord::Discovery(found(1, id));
        journal.append(&record).await.unwrap();
        registry.apply(&record).unwrap();
    }
}

/// One scripted element of a discovery pass
#[derive(Debug, Clone)]
pub enum Row {
    Item(&'static str),
    Fail,
}

/// Discovery source that plays back one script per pass
#[derive(Default)]
pub struct FakeSource {
    passes: Mutex<VecDeque<Vec<Row>>>,
    runs: Mutex<Vec<RunId>>,
}

impl FakeSource {
    pub fn new(passes: Vec<Vec<Row>>) -> Self {
        Self {
            passes: Mutex::new(passes.into()),
            runs: Mutex::new(Vec::new()),
        }
    }

    /// Run ids the source was invoked with, in order
    pub fn runs(&self) -> Vec<RunId> {
        self.runs.lock().unwrap().clone()
    }
}

impl DiscoverySource for FakeSource {
    fn discover<'a>(
        &'a self,
        _source_url: &'a str,
        run_id: RunId,
    ) -> BoxStream<'a, Result<DiscoveredItem, FetchError>> {
        self.runs.lock().unwrap().push(run_id);
        let rows = self.passes.lock().unwrap().pop_front().unwrap_or_default();

        stream::iter(rows.into_iter().map(move |row| match row {
            Row::Item(id) => Ok(found(run_id, id)),
            Row::Fail => Err(FetchError::ServerError(503)),
        }))
        .boxed()
    }
}

/// Detail fetcher with per-id scripted results and a dispatch log
#[derive(Default)]
pub struct FakeFetcher {
    scripted: Mutex<HashMap<String, VecDeque<Result<FetchOutcome, FetchError>>>>,
    calls: Mutex<Vec<(String, Instant)>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a result for `id`; unscripted calls return a live detail fetched now
    pub fn script(&self, id: &str, result: Result<FetchOutcome, FetchError>) {
        self.scripted
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_default()
            .push_back(result);
    }

    /// Ids fetched with the instant of each dispatch
    pub fn calls(&self) -> Vec<(String, Instant)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_ids(&self) -> Vec<String> {
        self.calls().into_iter().map(|(id, _)| id).collect()
    }
}

#[async_trait]
impl DetailFetcher for FakeFetcher {
    async fn fetch(&self, id: &str, _url: &str) -> Result<FetchOutcome, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((id.to_string(), Instant::now()));

        let scripted = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(id)
            .and_then(VecDeque::pop_front);
        scripted.unwrap_or_else(|| Ok(detail_at(Utc::now())))
    }
}
