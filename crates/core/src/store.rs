//! Persistence for transcript snapshots, report models and overrides.

use crate::merge::Merge;
use crate::report::{ReportModel, ReportPatch};
use crate::transcript::SnapshotTurn;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60 * 2);
const MAX_ID_LEN: usize = 128;

const SNAPSHOT_FILE: &str = "snapshot.json";
const MODEL_FILE: &str = "report_model.json";
const OVERRIDES_FILE: &str = "report_overrides.json";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not encode record: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid interview id '{0}'")]
    InvalidId(String),
}

/// The transcript as it stood when the interview was finalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub interview_id: String,
    pub transcripts: Vec<SnapshotTurn>,
    pub saved_at: String,
}

impl Snapshot {
    pub fn new(interview_id: &str, transcripts: Vec<SnapshotTurn>) -> Self {
        Self {
            interview_id: interview_id.to_string(),
            transcripts,
            saved_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// A generated report and the human edits layered on it.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportState {
    pub model: ReportModel,
    pub overrides: ReportPatch,
}

impl ReportState {
    pub fn final_report(&self) -> ReportModel {
        self.model.merge(&self.overrides)
    }
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError>;

    async fn snapshot(&self, interview_id: &str) -> Result<Option<Snapshot>, StoreError>;

    async fn save_report(
        &self,
        interview_id: &str,
        model: &ReportModel,
        overrides: &ReportPatch,
    ) -> Result<(), StoreError>;

    /// `None` until a report model has been saved.
    async fn report_state(&self, interview_id: &str) -> Result<Option<ReportState>, StoreError>;

    async fn save_overrides(
        &self,
        interview_id: &str,
        overrides: &ReportPatch,
    ) -> Result<(), StoreError>;
}

/// Accepts ids that are a single safe path segment.
pub fn validate_id(interview_id: &str) -> Result<&str, StoreError> {
    let valid = !interview_id.is_empty()
        && interview_id.len() <= MAX_ID_LEN
        && interview_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(interview_id)
    } else {
        Err(StoreError::InvalidId(interview_id.to_string()))
    }
}

#[derive(Debug, Clone, Default)]
struct Record {
    snapshot: Option<Snapshot>,
    model: Option<ReportModel>,
    overrides: Option<ReportPatch>,
}

impl Record {
    fn is_empty(&self) -> bool {
        self.snapshot.is_none() && self.model.is_none() && self.overrides.is_none()
    }
}

fn snapshot_slot(record: &mut Record) -> &mut Option<Snapshot> {
    &mut record.snapshot
}

fn model_slot(record: &mut Record) -> &mut Option<ReportModel> {
    &mut record.model
}

fn overrides_slot(record: &mut Record) -> &mut Option<ReportPatch> {
    &mut record.overrides
}

/// JSON files under `<root>/interviews/<id>/`.
///
/// Values whose disk write failed are kept in an in-process cache, so this
/// process keeps seeing its own writes. A later successful write of the same
/// file evicts the cached value.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    cache: RwLock<HashMap<String, Record>>,
}

impl FileStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: data_dir.into().join("interviews"),
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn dir(&self, interview_id: &str) -> Result<PathBuf, StoreError> {
        Ok(self.root.join(validate_id(interview_id)?))
    }

    async fn write_json<T: Serialize>(
        &self,
        interview_id: &str,
        file: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let dir = self.dir(interview_id)?;
        let json = serde_json::to_string_pretty(value)?;
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(file), json).await?;
        tracing::debug!(interview_id = %interview_id, file, "record written");
        Ok(())
    }

    /// Writes one file and keeps the value cached only if the write failed.
    async fn persist<T: Serialize + Clone>(
        &self,
        interview_id: &str,
        file: &str,
        value: &T,
        slot: fn(&mut Record) -> &mut Option<T>,
    ) -> Result<(), StoreError> {
        let result = self.write_json(interview_id, file, value).await;
        let mut cache = self.cache.write().await;
        match &result {
            Ok(()) => {
                if let Some(record) = cache.get_mut(interview_id) {
                    *slot(record) = None;
                    if record.is_empty() {
                        cache.remove(interview_id);
                    }
                }
            }
            Err(_) => {
                *slot(cache.entry(interview_id.to_string()).or_default()) = Some(value.clone());
            }
        }
        result
    }

    async fn cached<T, F: FnOnce(&Record) -> Option<T>>(&self, interview_id: &str, get: F) -> Option<T> {
        self.cache.read().await.get(interview_id).and_then(get)
    }

    #[cfg(test)]
    async fn cached_ids(&self) -> Vec<String> {
        self.cache.read().await.keys().cloned().collect()
    }
}

/// Reads a JSON file, treating a missing or unreadable record as absent.
async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            tracing::warn!(path = %path.display(), "ignoring unreadable record: {}", e);
            Ok(None)
        }
    }
}

#[async_trait]
impl ReportStore for FileStore {
    async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let id = validate_id(&snapshot.interview_id)?;
        self.persist(id, SNAPSHOT_FILE, snapshot, snapshot_slot).await
    }

    async fn snapshot(&self, interview_id: &str) -> Result<Option<Snapshot>, StoreError> {
        let dir = self.dir(interview_id)?;
        if let Some(snapshot) = self.cached(interview_id, |r| r.snapshot.clone()).await {
            return Ok(Some(snapshot));
        }
        read_json(&dir.join(SNAPSHOT_FILE)).await
    }

    async fn save_report(
        &self,
        interview_id: &str,
        model: &ReportModel,
        overrides: &ReportPatch,
    ) -> Result<(), StoreError> {
        validate_id(interview_id)?;
        let model_result = self.persist(interview_id, MODEL_FILE, model, model_slot).await;
        let overrides_result = self
            .persist(interview_id, OVERRIDES_FILE, overrides, overrides_slot)
            .await;
        model_result.and(overrides_result)
    }

    async fn report_state(&self, interview_id: &str) -> Result<Option<ReportState>, StoreError> {
        let dir = self.dir(interview_id)?;
        let model = match self.cached(interview_id, |r| r.model.clone()).await {
            Some(model) => Some(model),
            None => read_json::<ReportModel>(&dir.join(MODEL_FILE)).await?,
        };
        let Some(model) = model else {
            return Ok(None);
        };
        let overrides = match self.cached(interview_id, |r| r.overrides.clone()).await {
            Some(overrides) => overrides,
            None => read_json(&dir.join(OVERRIDES_FILE))
                .await?
                .unwrap_or_default(),
        };
        Ok(Some(ReportState { model, overrides }))
    }

    async fn save_overrides(
        &self,
        interview_id: &str,
        overrides: &ReportPatch,
    ) -> Result<(), StoreError> {
        validate_id(interview_id)?;
        self.persist(interview_id, OVERRIDES_FILE, overrides, overrides_slot)
            .await
    }
}

#[derive(Debug, Clone)]
struct Expiring {
    record: Record,
    expires_at: Instant,
}

/// Process-local store. An interview's snapshot, model and overrides share
/// one record that expires `ttl` after its last write.
#[derive(Debug)]
pub struct MemoryStore {
    ttl: Duration,
    records: RwLock<HashMap<String, Expiring>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl MemoryStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            records: RwLock::new(HashMap::new()),
        }
    }

    async fn live<T, F: FnOnce(&Record) -> Option<T>>(&self, interview_id: &str, get: F) -> Option<T> {
        let records = self.records.read().await;
        records
            .get(interview_id)
            .filter(|entry| entry.expires_at > Instant::now())
            .and_then(|entry| get(&entry.record))
    }

    /// Applies `apply` to the live record for `interview_id`, refreshing its
    /// expiry. Expired records of every id are dropped first.
    async fn write<F: FnOnce(&mut Record)>(&self, interview_id: &str, apply: F) {
        let now = Instant::now();
        let mut records = self.records.write().await;
        records.retain(|_, entry| entry.expires_at > now);
        let entry = records
            .entry(interview_id.to_string())
            .or_insert_with(|| Expiring {
                record: Record::default(),
                expires_at: now,
            });
        apply(&mut entry.record);
        entry.expires_at = now + self.ttl;
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let id = validate_id(&snapshot.interview_id)?;
        self.write(id, |record| record.snapshot = Some(snapshot.clone()))
            .await;
        Ok(())
    }

    async fn snapshot(&self, interview_id: &str) -> Result<Option<Snapshot>, StoreError> {
        validate_id(interview_id)?;
        Ok(self.live(interview_id, |r| r.snapshot.clone()).await)
    }

    async fn save_report(
        &self,
        interview_id: &str,
        model: &ReportModel,
        overrides: &ReportPatch,
    ) -> Result<(), StoreError> {
        validate_id(interview_id)?;
        self.write(interview_id, |record| {
            record.model = Some(model.clone());
            record.overrides = Some(overrides.clone());
        })
        .await;
        Ok(())
    }

    async fn report_state(&self, interview_id: &str) -> Result<Option<ReportState>, StoreError> {
        validate_id(interview_id)?;
        Ok(self
            .live(interview_id, |r| {
                r.model.clone().map(|model| ReportState {
                    model,
                    overrides: r.overrides.clone().unwrap_or_default(),
                })
            })
            .await)
    }

    async fn save_overrides(
        &self,
        interview_id: &str,
        overrides: &ReportPatch,
    ) -> Result<(), StoreError> {
        validate_id(interview_id)?;
        if self.live(interview_id, |r| r.model.as_ref().map(|_| ())).await.is_none() {
            tracing::warn!(interview_id = %interview_id, "overrides dropped, no report model stored");
            return Ok(());
        }
        self.write(interview_id, |record| record.overrides = Some(overrides.clone()))
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::fixtures::sample_model;
    use crate::transcript::Role;
    use serde_json::json;
    use tempfile::tempdir;

    fn snapshot(id: &str) -> Snapshot {
        Snapshot::new(
            id,
            vec![
                SnapshotTurn::new(Role::Interviewer, "What's your role?"),
                SnapshotTurn::new(Role::Participant, "I'm a CSM"),
            ],
        )
    }

    fn notes_patch() -> ReportPatch {
        ReportPatch::from_value(json!({ "ratings": { "notes": "updated" } })).unwrap()
    }

    #[test]
    fn test_validate_id_rejects_path_tricks() {
        assert!(validate_id("0b6f5f0e-1c2d-4e7b-9a55-3f1d2c3b4a5e").is_ok());
        assert!(validate_id("iv_1").is_ok());
        let too_long = "x".repeat(129);
        for bad in ["", "..", "a/b", "a\\b", "iv 1", too_long.as_str()] {
            assert!(matches!(validate_id(bad), Err(StoreError::InvalidId(_))), "{bad}");
        }
    }

    #[tokio::test]
    async fn test_file_store_writes_pretty_json_layout() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store.save_snapshot(&snapshot("iv-1")).await.unwrap();
        store
            .save_report("iv-1", &sample_model(), &ReportPatch::default())
            .await
            .unwrap();

        let base = dir.path().join("interviews").join("iv-1");
        let raw = std::fs::read_to_string(base.join("snapshot.json")).unwrap();
        assert!(raw.contains("\n  \"interview_id\": \"iv-1\""));
        let overrides = std::fs::read_to_string(base.join("report_overrides.json")).unwrap();
        assert_eq!(overrides, "{}");
        assert!(base.join("report_model.json").is_file());
    }

    #[tokio::test]
    async fn test_file_store_reads_back_from_a_fresh_process() {
        let dir = tempdir().unwrap();
        {
            let store = FileStore::new(dir.path());
            store.save_snapshot(&snapshot("iv-1")).await.unwrap();
            store
                .save_report("iv-1", &sample_model(), &ReportPatch::default())
                .await
                .unwrap();
            store.save_overrides("iv-1", &notes_patch()).await.unwrap();
        }

        let store = FileStore::new(dir.path());
        let saved = store.snapshot("iv-1").await.unwrap().unwrap();
        assert_eq!(saved.transcripts.len(), 2);
        assert_eq!(saved.transcripts[1].text, "I'm a CSM");

        let state = store.report_state("iv-1").await.unwrap().unwrap();
        assert_eq!(state.model, sample_model());
        assert_eq!(state.overrides, notes_patch());
        assert_eq!(state.final_report().ratings.notes.as_deref(), Some("updated"));
    }

    #[tokio::test]
    async fn test_file_store_unknown_id_is_absent() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert!(store.snapshot("missing").await.unwrap().is_none());
        assert!(store.report_state("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_treats_corrupt_record_as_absent() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("interviews").join("iv-2");
        std::fs::create_dir_all(&base).unwrap();
        std::fs::write(base.join("report_model.json"), "{ not json").unwrap();

        let store = FileStore::new(dir.path());
        assert!(store.report_state("iv-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_cache_survives_failed_disk_write() {
        let dir = tempdir().unwrap();
        // A plain file where the interviews directory should be makes every write fail.
        std::fs::write(dir.path().join("interviews"), "blocked").unwrap();
        let store = FileStore::new(dir.path());

        let result = store.save_snapshot(&snapshot("iv-3")).await;

        assert!(matches!(result, Err(StoreError::Io(_))));
        let cached = store.snapshot("iv-3").await.unwrap().unwrap();
        assert_eq!(cached.interview_id, "iv-3");
    }

    #[tokio::test]
    async fn test_file_store_rejects_invalid_id() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert!(matches!(
            store.snapshot("../etc").await,
            Err(StoreError::InvalidId(_))
        ));
    }

    #[tokio::test]
    async fn test_file_store_cache_forgets_ids_after_successful_write() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store.save_snapshot(&snapshot("iv-1")).await.unwrap();
        store
            .save_report("iv-1", &sample_model(), &ReportPatch::default())
            .await
            .unwrap();
        store.save_overrides("iv-1", &notes_patch()).await.unwrap();

        assert!(store.cached_ids().await.is_empty());
        let state = store.report_state("iv-1").await.unwrap().unwrap();
        assert_eq!(state.overrides, notes_patch());
    }

    #[tokio::test]
    async fn test_file_store_cache_evicted_once_disk_recovers() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("interviews");
        std::fs::write(&blocker, "blocked").unwrap();
        let store = FileStore::new(dir.path());
        assert!(store.save_snapshot(&snapshot("iv-4")).await.is_err());
        assert_eq!(store.cached_ids().await, vec!["iv-4".to_string()]);

        std::fs::remove_file(&blocker).unwrap();
        store.save_snapshot(&snapshot("iv-4")).await.unwrap();

        assert!(store.cached_ids().await.is_empty());
        assert!(store.snapshot("iv-4").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_store_expires_records_after_ttl() {
        let store = MemoryStore::new(Duration::from_secs(60));
        store.save_snapshot(&snapshot("iv-1")).await.unwrap();
        store
            .save_report("iv-1", &sample_model(), &ReportPatch::default())
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;

        assert!(store.snapshot("iv-1").await.unwrap().is_none());
        assert!(store.report_state("iv-1").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_store_override_write_keeps_snapshot_alive() {
        let store = MemoryStore::new(Duration::from_millis(300));
        store.save_snapshot(&snapshot("iv-1")).await.unwrap();
        store
            .save_report("iv-1", &sample_model(), &ReportPatch::default())
            .await
            .unwrap();

        tokio::time::advance(Duration::from_millis(200)).await;
        store.save_overrides("iv-1", &notes_patch()).await.unwrap();
        tokio::time::advance(Duration::from_millis(200)).await;

        assert!(store.snapshot("iv-1").await.unwrap().is_some());
        let state = store.report_state("iv-1").await.unwrap().unwrap();
        assert_eq!(state.overrides, notes_patch());
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_store_overrides_without_model_are_dropped() {
        let store = MemoryStore::default();
        store.save_snapshot(&snapshot("iv-1")).await.unwrap();

        store.save_overrides("iv-1", &notes_patch()).await.unwrap();

        assert!(store.report_state("iv-1").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_store_sweeps_expired_ids_on_write() {
        let store = MemoryStore::new(Duration::from_secs(60));
        store.save_snapshot(&snapshot("iv-1")).await.unwrap();
        store.save_snapshot(&snapshot("iv-2")).await.unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        store.save_snapshot(&snapshot("iv-3")).await.unwrap();

        let ids: Vec<String> = store.records.read().await.keys().cloned().collect();
        assert_eq!(ids, vec!["iv-3".to_string()]);
    }
}
