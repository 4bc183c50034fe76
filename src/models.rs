// Core data structures for the relist crawler

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of one discovery pass
pub type RunId = u64;

/// Fields the listing source shows for an item in search results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredFields {
    pub title: Option<String>,
    pub posted_at: Option<String>,
    pub price: Option<String>,
    pub bedrooms: Option<u32>,
    pub floor_area: Option<u32>,
}

/// One row produced by the discovery capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredItem {
    pub run_id: RunId,
    pub id: String,
    pub url: String,
    pub fields: DiscoveredFields,
}

/// Attributes only available from an item's detail page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailFields {
    pub price: Option<String>,
    pub bedrooms: Option<u32>,
    pub sqft: Option<u32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub accuracy: Option<u32>,
    pub street_address: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub posted: Option<String>,
    pub updated: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl DetailFields {
    /// Empty detail record fetched at the given time
    pub fn fetched_at(fetched_at: DateTime<Utc>) -> Self {
        Self {
            price: None,
            bedrooms: None,
            sqft: None,
            latitude: None,
            longitude: None,
            accuracy: None,
            street_address: None,
            title: None,
            description: None,
            posted: None,
            updated: None,
            fetched_at,
        }
    }
}

/// Result of a successful detail fetch
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The page was live and parsed
    Detail(DetailFields),
    /// The source reports the item as taken down
    Removed {
        reason: String,
        fetched_at: DateTime<Utc>,
    },
}

impl FetchOutcome {
    /// Time at which the page was fetched
    pub fn fetched_at(&self) -> DateTime<Utc> {
        match self {
            Self::Detail(detail) => detail.fetched_at,
            Self::Removed { fetched_at, .. } => *fetched_at,
        }
    }

    pub fn is_removed(&self) -> bool {
        matches!(self, Self::Removed { .. })
    }
}

/// Registry entry for one item
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: String,
    pub url: String,
    pub discovered: DiscoveredFields,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub removed: Option<String>,
    pub detail: Option<DetailFields>,
}

impl Item {
    /// New, never-fetched item
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            discovered: DiscoveredFields::default(),
            last_fetched_at: None,
            removed: None,
            detail: None,
        }
    }

    /// Item as first seen by discovery
    pub fn discovered(item: &DiscoveredItem) -> Self {
        Self {
            discovered: item.fields.clone(),
            ..Self::new(item.id.clone(), item.url.clone())
        }
    }

    pub fn is_removed(&self) -> bool {
        self.removed.is_some()
    }

    pub fn is_fetched(&self) -> bool {
        self.last_fetched_at.is_some()
    }
}
