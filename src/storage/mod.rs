//! Durable state: the journal and the run-id counter
//!
//! Nothing else is persisted. The registry is rebuilt from the journal with
//! [`hydrate`] on every start.

pub mod hydrate;
pub mod journal;
pub mod run_id;

pub use hydrate::{hydrate, HydrationStats};
pub use journal::{DetailRecord, Journal, JournalRecord};
pub use run_id::RunIdStore;
