//! Append-only journal of discovery and detail-fetch results
//!
//! The journal is the only durable state besides the run id. Each line is one
//! record, externally tagged by kind, whose payload is a fixed-order JSON
//! array of fields:
//!
//! ```text
//! {"discovery":[3,"7801","Sunny 2br","2021-03-01 10:12","https://…/7801.html","$2100",2,850]}
//! {"detail":["7801","https://…/7801.html","$2100",2,850,49.26,-123.11,22,"123 Main St",…,null,"2021-03-02T08:00:00Z"]}
//! ```
//!
//! Appends are written and synced one record at a time. A failed append is
//! cut back to the last complete record; if that fails too the journal
//! refuses every later append. Opening the journal drops a torn tail left by
//! a crash mid-append. Replay streams the file from
//! the start; an unparsable final line (an append still in flight) is
//! skipped, any other unparsable line is reported as corrupt.

use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader, Lines};
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::models::{DetailFields, DiscoveredFields, DiscoveredItem, FetchOutcome};

/// Outcome of one detail fetch as written to the journal
#[derive(Debug, Clone, PartialEq)]
pub struct DetailRecord {
    pub id: String,
    pub url: String,
    pub outcome: FetchOutcome,
}

/// One journal line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalRecord {
    Discovery(#[serde(with = "discovery_row")] DiscoveredItem),
    Detail(#[serde(with = "detail_row")] DetailRecord),
}

impl JournalRecord {
    /// Id of the item this record is about
    pub fn item_id(&self) -> &str {
        match self {
            Self::Discovery(found) => &found.id,
            Self::Detail(record) => &record.id,
        }
    }
}

mod discovery_row {
    use super::*;

    type Row = (
        u64,
        String,
        Option<String>,
        Option<String>,
        String,
        Option<String>,
        Option<u32>,
        Option<u32>,
    );

    pub fn serialize<S: serde::Serializer>(
        item: &DiscoveredItem,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        let fields = &item.fields;
        (
            item.run_id,
            &item.id,
            &fields.title,
            &fields.posted_at,
            &item.url,
            &fields.price,
            fields.bedrooms,
            fields.floor_area,
        )
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<DiscoveredItem, D::Error> {
        let (run_id, id, title, posted_at, url, price, bedrooms, floor_area) =
            Row::deserialize(deserializer)?;
        Ok(DiscoveredItem {
            run_id,
            id,
            url,
            fields: DiscoveredFields {
                title,
                posted_at,
                price,
                bedrooms,
                floor_area,
            },
        })
    }
}

mod detail_row {
    use super::*;

    type Row = (
        String,
        String,
        Option<String>,
        Option<u32>,
        Option<u32>,
        Option<f64>,
        Option<f64>,
        Option<u32>,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
        DateTime<Utc>,
    );

    pub fn serialize<S: serde::Serializer>(
        record: &DetailRecord,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        let empty;
        let (detail, removed) = match &record.outcome {
            FetchOutcome::Detail(detail) => (detail, None),
            FetchOutcome::Removed { reason, fetched_at } => {
                empty = DetailFields::fetched_at(*fetched_at);
                (&empty, Some(reason))
            }
        };
        (
            &record.id,
            &record.url,
            &detail.price,
            detail.bedrooms,
            detail.sqft,
            detail.latitude,
            detail.longitude,
            detail.accuracy,
            &detail.street_address,
            &detail.title,
            &detail.description,
            &detail.posted,
            &detail.updated,
            removed,
            detail.fetched_at,
        )
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<DetailRecord, D::Error> {
        let (
            id,
            url,
            price,
            bedrooms,
            sqft,
            latitude,
            longitude,
            accuracy,
            street_address,
            title,
            description,
            posted,
            updated,
            removed,
            fetched_at,
        ) = Row::deserialize(deserializer)?;

        let outcome = match removed {
            Some(reason) => FetchOutcome::Removed { reason, fetched_at },
            None => FetchOutcome::Detail(DetailFields {
                price,
                bedrooms,
                sqft,
                latitude,
                longitude,
                accuracy,
                street_address,
                title,
                description,
                posted,
                updated,
                fetched_at,
            }),
        };

        Ok(DetailRecord { id, url, outcome })
    }
}

/// Durable, append-only record log
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    writer: Mutex<Writer>,
}

#[derive(Debug)]
struct Writer {
    file: File,
    /// File length up to the end of the last complete record
    committed: u64,
    poisoned: bool,
}

impl Writer {
    async fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
        self.file.write_all(line).await?;
        self.file.flush().await?;
        self.file.sync_data().await
    }

    /// Cut the file back to the last complete record
    async fn roll_back(&mut self) -> io::Result<()> {
        self.file.set_len(self.committed).await?;
        self.file.sync_data().await
    }
}

impl Journal {
    /// Open (creating if needed) the journal at `path` for appending
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| Error::JournalWrite {
                path: path.clone(),
                source,
            })?;

        truncate_torn_tail(&mut file, &path).await?;
        let committed = file.metadata().await?.len();

        tracing::debug!(path = %path.display(), bytes = committed, "Journal opened");

        Ok(Self {
            path,
            writer: Mutex::new(Writer {
                file,
                committed,
                poisoned: false,
            }),
        })
    }

    /// Path of the journal file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Durably append one record
    ///
    /// On failure nothing of the record is left in the file. If the partial
    /// write cannot be removed, this and every later append fails.
    pub async fn append(&self, record: &JournalRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut writer = self.writer.lock().await;
        if writer.poisoned {
            return Err(self.write_error(io::Error::other(
                "journal holds a partial record that could not be removed",
            )));
        }

        match writer.write_line(line.as_bytes()).await {
            Ok(()) => {
                writer.committed += line.len() as u64;
                Ok(())
            }
            Err(source) => {
                match writer.roll_back().await {
                    Ok(()) => tracing::warn!(
                        path = %self.path.display(),
                        error = %source,
                        "Journal append failed, partial record removed"
                    ),
                    Err(e) => {
                        writer.poisoned = true;
                        tracing::error!(
                            path = %self.path.display(),
                            error = %e,
                            "Could not remove partial journal record, refusing further appends"
                        );
                    }
                }
                Err(self.write_error(source))
            }
        }
    }

    fn write_error(&self, source: io::Error) -> Error {
        Error::JournalWrite {
            path: self.path.clone(),
            source,
        }
    }

    /// Append a discovery result
    pub async fn append_discovery(&self, item: &DiscoveredItem) -> Result<()> {
        self.append(&JournalRecord::Discovery(item.clone())).await
    }

    /// Append a detail-fetch result
    pub async fn append_detail(&self, record: &DetailRecord) -> Result<()> {
        self.append(&JournalRecord::Detail(record.clone())).await
    }

    /// Stream every record from the start of the file, in write order
    pub fn read_all(&self) -> BoxStream<'static, Result<JournalRecord>> {
        stream::try_unfold(Replay::Closed(self.path.clone()), |state| async move {
            let (mut lines, mut line_no) = match state {
                Replay::Closed(path) => {
                    let file = File::open(&path).await?;
                    (BufReader::new(file).lines(), 0)
                }
                Replay::Open { lines, line_no } => (lines, line_no),
            };

            while let Some(line) = lines.next_line().await? {
                line_no += 1;
                if line.trim().is_empty() {
                    continue;
                }

                match serde_json::from_str::<JournalRecord>(&line) {
                    Ok(record) => return Ok(Some((record, Replay::Open { lines, line_no }))),
                    Err(e) => {
                        if has_more_records(&mut lines).await? {
                            return Err(Error::JournalCorrupt {
                                line: line_no,
                                reason: e.to_string(),
                            });
                        }
                        tracing::warn!(line = line_no, error = %e, "Skipping torn final journal line");
                        return Ok(None);
                    }
                }
            }

            Ok(None)
        })
        .boxed()
    }
}

/// Drop bytes after the last newline, left behind by a crash mid-append
async fn truncate_torn_tail(file: &mut File, path: &Path) -> Result<()> {
    let len = file.metadata().await?.len();
    let mut buf = vec![0u8; 8192];
    let mut end = len;

    while end > 0 {
        let start = end.saturating_sub(buf.len() as u64);
        let chunk = &mut buf[..(end - start) as usize];
        file.seek(SeekFrom::Start(start)).await?;
        file.read_exact(chunk).await?;

        if let Some(pos) = chunk.iter().rposition(|b| *b == b'\n') {
            let keep = start + pos as u64 + 1;
            if keep < len {
                tracing::warn!(
                    path = %path.display(),
                    dropped_bytes = len - keep,
                    "Journal ends mid-record, dropping torn tail"
                );
                file.set_len(keep).await?;
                file.sync_data().await?;
            }
            return Ok(());
        }
        end = start;
    }

    if len > 0 {
        tracing::warn!(path = %path.display(), "Journal holds no complete record, truncating");
        file.set_len(0).await?;
        file.sync_data().await?;
    }
    Ok(())
}

enum Replay {
    Closed(PathBuf),
    Open {
        lines: Lines<BufReader<File>>,
        line_no: usize,
    },
}

async fn has_more_records(lines: &mut Lines<BufReader<File>>) -> Result<bool> {
    while let Some(line) = lines.next_line().await? {
        if !line.trim().is_empty() {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use futures::TryStreamExt;
    use tempfile::TempDir;

    fn found(run_id: u64, id: &str) -> DiscoveredItem {
        DiscoveredItem {
            run_id,
            id: id.to_string(),
            url: format!("https://example.org/apa/{id}.html"),
            fields: DiscoveredFields {
                title: Some(format!("Listing {id}")),
                price: Some("$1,850".to_string()),
                bedrooms: Some(1),
                ..Default::default()
            },
        }
    }

    fn removed(id: &str) -> DetailRecord {
        DetailRecord {
            id: id.to_string(),
            url: format!("https://example.org/apa/{id}.html"),
            outcome: FetchOutcome::Removed {
                reason: "This posting has expired.".to_string(),
                fetched_at: Utc.with_ymd_and_hms(2021, 3, 2, 8, 0, 0).unwrap(),
            },
        }
    }

    #[test]
    fn test_discovery_line_is_tagged_array() {
        let line = serde_json::to_string(&JournalRecord::Discovery(found(3, "7801"))).unwrap();
        assert!(line.starts_with(r#"{"discovery":[3,"7801","Listing 7801",null,"#));
    }

    #[test]
    fn test_removed_record_keeps_reason() {
        let record = JournalRecord::Detail(removed("7801"));
        let line = serde_json::to_string(&record).unwrap();
        assert!(line.contains("This posting has expired."));

        let decoded: JournalRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(decoded, record);
    }

    #[tokio::test]
    async fn test_append_then_read_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let journal = Journal::open(temp_dir.path().join("journal.jsonl"))
            .await
            .unwrap();

        journal.append_discovery(&found(1, "a")).await.unwrap();
        journal.append_discovery(&found(1, "b")).await.unwrap();
        journal.append_detail(&removed("a")).await.unwrap();

        let records: Vec<JournalRecord> = journal.read_all().try_collect().await.unwrap();
        let ids: Vec<&str> = records.iter().map(JournalRecord::item_id).collect();
        assert_eq!(ids, vec!["a", "b", "a"]);
        assert!(matches!(records[2], JournalRecord::Detail(_)));
    }

    #[tokio::test]
    async fn test_open_creates_parent_directory() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("journal.jsonl");
        let journal = Journal::open(&path).await.unwrap();

        assert!(path.exists());
        let records: Vec<JournalRecord> = journal.read_all().try_collect().await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_open_drops_torn_tail() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("journal.jsonl");
        let complete = serde_json::to_string(&JournalRecord::Discovery(found(1, "a"))).unwrap();
        std::fs::write(&path, format!("{complete}\n{{\"discovery\":[1,\"b\"")).unwrap();

        let journal = Journal::open(&path).await.unwrap();
        journal.append_discovery(&found(2, "c")).await.unwrap();

        let records: Vec<JournalRecord> = journal.read_all().try_collect().await.unwrap();
        let ids: Vec<&str> = records.iter().map(JournalRecord::item_id).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_in_flight_tail_tolerated_on_replay() {
        use std::io::Write;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("journal.jsonl");
        let journal = Journal::open(&path).await.unwrap();
        journal.append_discovery(&found(1, "a")).await.unwrap();

        let mut raw = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        raw.write_all(br#"{"detail":["a""#).unwrap();

        let records: Vec<JournalRecord> = journal.read_all().try_collect().await.unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_append_leaves_no_partial_record() {
        use std::io::Write;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("journal.jsonl");
        let journal = Journal::open(&path).await.unwrap();
        journal.append_discovery(&found(1, "a")).await.unwrap();

        // Half a record, as a write cut short by a full disk leaves it
        let mut raw = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        raw.write_all(br#"{"discovery":[1,"b","Listing"#).unwrap();
        drop(raw);
        journal.writer.lock().await.roll_back().await.unwrap();

        journal.append_discovery(&found(1, "b")).await.unwrap();
        journal.append_discovery(&found(1, "c")).await.unwrap();
        drop(journal);

        let reopened = Journal::open(&path).await.unwrap();
        let records: Vec<JournalRecord> = reopened.read_all().try_collect().await.unwrap();
        let ids: Vec<&str> = records.iter().map(JournalRecord::item_id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_unrecoverable_write_refuses_later_appends() {
        // Writes to /dev/full fail with ENOSPC and it cannot be truncated
        let journal = Journal::open("/dev/full").await.unwrap();

        let first = journal.append_discovery(&found(1, "a")).await;
        assert!(matches!(first, Err(Error::JournalWrite { .. })));
        assert!(journal.writer.lock().await.poisoned);

        let second = journal.append_discovery(&found(1, "b")).await;
        let Err(Error::JournalWrite { source, .. }) = second else {
            panic!("expected a journal write error");
        };
        assert!(source.to_string().contains("partial record"));
    }

    #[tokio::test]
    async fn test_corrupt_middle_line_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("journal.jsonl");
        let complete = serde_json::to_string(&JournalRecord::Discovery(found(1, "a"))).unwrap();
        std::fs::write(&path, format!("not json\n{complete}\n")).unwrap();

        let journal = Journal::open(&path).await.unwrap();
        let result: Result<Vec<JournalRecord>> = journal.read_all().try_collect().await;
        assert!(matches!(result, Err(Error::JournalCorrupt { line: 1, .. })));
    }
}
