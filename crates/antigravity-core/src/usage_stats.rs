//! Usage Stats Recorder (spec §4.H): hour-bucketed request counts by model
//! family and short model name, flushed to `usage-history.json` on a dirty
//! timer and pruned of anything older than 30 days.
//!
//! Grounded in the teacher's atomic temp-file-then-rename persistence
//! (mirrors [`crate::account::store::AccountStore::persist`]), generalised
//! to this component's JSON shape instead of the teacher's SQLite
//! `request_logs` table, per the spec's data model for this one piece.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::DispatchResult;
use crate::translator::ModelFamily;

const PRUNE_MAX_AGE_DAYS: i64 = 30;
const FLUSH_INTERVAL_SECS: u64 = 60;

/// One hour's counters: family -> (model short name | `_subtotal`) -> count,
/// plus the bucket-wide `_total`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HourBucket {
    #[serde(flatten)]
    pub families: HashMap<String, HashMap<String, u64>>,
    #[serde(rename = "_total", default)]
    pub total: u64,
}

pub type UsageHistory = HashMap<String, HourBucket>;

/// Strip the model's family prefix, e.g. `claude-opus-4-6` -> `opus-4-6`.
fn short_name(model: &str, family: ModelFamily) -> String {
    let prefix = family.as_str();
    model.strip_prefix(prefix).map(|rest| rest.trim_start_matches('-').to_string()).unwrap_or_else(|| model.to_string())
}

fn hour_bucket_key(now: i64) -> String {
    chrono::DateTime::from_timestamp(now, 0).unwrap_or_default().format("%Y-%m-%dT%H").to_string()
}

pub struct UsageStatsRecorder {
    path: PathBuf,
    history: Mutex<UsageHistory>,
    dirty: AtomicBool,
}

impl UsageStatsRecorder {
    /// Load `path`, migrating a legacy file location to it if the canonical
    /// path doesn't exist yet but the legacy one does.
    pub async fn load(path: PathBuf, legacy_path: Option<PathBuf>) -> DispatchResult<Self> {
        let history = match read_history(&path).await? {
            Some(history) => history,
            None => match legacy_path {
                Some(legacy) => read_history(&legacy).await?.unwrap_or_default(),
                None => UsageHistory::new(),
            },
        };
        let recorder = Self { path, history: Mutex::new(history), dirty: AtomicBool::new(false) };
        recorder.flush_if_dirty().await.ok();
        Ok(recorder)
    }

    /// Record one completed request, incrementing the per-model, per-family
    /// subtotal, and bucket-total counters atomically under the same lock.
    pub async fn record(&self, family: ModelFamily, model: &str, now: i64) {
        let bucket_key = hour_bucket_key(now);
        let short = short_name(model, family);

        let mut history = self.history.lock().await;
        let bucket = history.entry(bucket_key).or_default();
        let family_counts = bucket.families.entry(family.as_str().to_string()).or_default();
        *family_counts.entry(short).or_insert(0) += 1;
        *family_counts.entry("_subtotal".to_string()).or_insert(0) += 1;
        bucket.total += 1;
        drop(history);

        self.dirty.store(true, Ordering::Relaxed);
    }

    /// Write `usage-history.json` atomically if anything changed since the
    /// last flush.
    pub async fn flush_if_dirty(&self) -> DispatchResult<()> {
        if !self.dirty.swap(false, Ordering::Relaxed) {
            return Ok(());
        }
        let history = self.history.lock().await;
        let serialized = serde_json::to_string_pretty(&*history)?;
        drop(history);

        let tmp_path = self.path.with_extension("json.tmp");
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&tmp_path, serialized).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }

    /// Drop any hour bucket older than 30 days.
    pub async fn prune(&self, now: i64) {
        let cutoff = now - PRUNE_MAX_AGE_DAYS * 24 * 3600;
        let cutoff_key = hour_bucket_key(cutoff);
        let mut history = self.history.lock().await;
        let before = history.len();
        history.retain(|bucket_key, _| bucket_key.as_str() >= cutoff_key.as_str());
        if history.len() != before {
            drop(history);
            self.dirty.store(true, Ordering::Relaxed);
        }
    }

    /// A read-only snapshot for `GET /account-limits?includeHistory=true`.
    pub async fn snapshot(&self) -> UsageHistory {
        self.history.lock().await.clone()
    }

    /// Spawn the one-minute dirty-flush-and-prune background timer.
    pub fn spawn_flush_timer(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(FLUSH_INTERVAL_SECS));
            loop {
                interval.tick().await;
                let now = chrono::Utc::now().timestamp();
                self.prune(now).await;
                if let Err(err) = self.flush_if_dirty().await {
                    tracing::warn!(%err, "usage-history.json flush failed");
                }
            }
        });
    }
}

async fn read_history(path: &Path) -> DispatchResult<Option<UsageHistory>> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn record_increments_model_family_and_total_counters() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = UsageStatsRecorder::load(dir.path().join("usage-history.json"), None).await.unwrap();
        let now = 1_700_000_000;
        recorder.record(ModelFamily::Claude, "claude-opus-4-6", now).await;
        recorder.record(ModelFamily::Claude, "claude-opus-4-6", now).await;
        recorder.record(ModelFamily::Gemini, "gemini-3-pro", now).await;

        let snapshot = recorder.snapshot().await;
        let bucket = snapshot.get(&hour_bucket_key(now)).unwrap();
        assert_eq!(bucket.total, 3);
        assert_eq!(bucket.families["claude"]["opus-4-6"], 2);
        assert_eq!(bucket.families["claude"]["_subtotal"], 2);
        assert_eq!(bucket.families["gemini"]["3-pro"], 1);
    }

    #[tokio::test]
    async fn flush_then_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage-history.json");
        let recorder = UsageStatsRecorder::load(path.clone(), None).await.unwrap();
        recorder.record(ModelFamily::Gemini, "gemini-2.5-flash", 1_700_000_000).await;
        recorder.flush_if_dirty().await.unwrap();

        let reloaded = UsageStatsRecorder::load(path, None).await.unwrap();
        let snapshot = reloaded.snapshot().await;
        assert_eq!(snapshot.len(), 1);
    }

    #[tokio::test]
    async fn legacy_path_is_migrated_when_canonical_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let legacy_path = dir.path().join("old-usage.json");
        let canonical_path = dir.path().join("usage-history.json");

        let legacy_recorder = UsageStatsRecorder::load(legacy_path.clone(), None).await.unwrap();
        legacy_recorder.record(ModelFamily::Claude, "claude-haiku-4-6", 1_700_000_000).await;
        legacy_recorder.flush_if_dirty().await.unwrap();

        let migrated = UsageStatsRecorder::load(canonical_path, Some(legacy_path)).await.unwrap();
        let snapshot = migrated.snapshot().await;
        assert_eq!(snapshot.len(), 1);
    }

    #[tokio::test]
    async fn prune_drops_buckets_older_than_thirty_days() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = UsageStatsRecorder::load(dir.path().join("usage-history.json"), None).await.unwrap();
        let old_ts = 1_700_000_000;
        let now = old_ts + 31 * 24 * 3600;
        recorder.record(ModelFamily::Claude, "claude-opus-4-6", old_ts).await;
        recorder.prune(now).await;
        assert!(recorder.snapshot().await.is_empty());
    }
}
