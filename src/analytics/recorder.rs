//! Analytics Recorder — bounded queue feeding one SQLite writer thread.
//!
//! `record()` is fire-and-forget: it never blocks the decision path and
//! never lets an error escape. When the queue is full the OLDEST pending
//! record is dropped, so a stalled writer degrades recency, not latency.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use chrono::Utc;

use super::{fingerprint, LearningRecord};
use crate::config::AnalyticsConfig;
use crate::event::Event;
use crate::policy::ExecutionResult;
use crate::storage::database;

struct QueueState {
    records: VecDeque<LearningRecord>,
    shutdown: bool,
    dropped: u64,
}

struct Shared {
    queue: Mutex<QueueState>,
    cond: Condvar,
    capacity: usize,
}

pub struct AnalyticsRecorder {
    enabled: bool,
    project_signature: String,
    shared: Arc<Shared>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl AnalyticsRecorder {
    /// Start the recorder for a project. A disabled recorder spawns no
    /// thread and turns `record()` into a no-op.
    pub fn start(db_path: PathBuf, project_signature: &str, config: &AnalyticsConfig) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(QueueState {
                records: VecDeque::new(),
                shutdown: false,
                dropped: 0,
            }),
            cond: Condvar::new(),
            capacity: config.queue_capacity.max(1),
        });

        let writer = if config.enabled {
            let shared = shared.clone();
            std::thread::Builder::new()
                .name("analytics-writer".to_string())
                .spawn(move || writer_loop(shared, db_path))
                .map_err(|e| {
                    tracing::warn!(error = %e, "Failed to spawn analytics writer — recording disabled");
                    e
                })
                .ok()
        } else {
            None
        };

        Self {
            enabled: config.enabled && writer.is_some(),
            project_signature: project_signature.to_string(),
            shared,
            writer: Mutex::new(writer),
        }
    }

    /// Queue one outcome. Never blocks, never errors back into the caller.
    pub fn record(&self, result: &ExecutionResult, event: &Event) {
        if !self.enabled {
            return;
        }

        let record = LearningRecord {
            policy_id: result.policy_id.clone(),
            fingerprint: fingerprint(&result.policy_id, event, &self.project_signature),
            verdict: result.verdict.as_str().to_string(),
            timestamp: Utc::now(),
            context_features: serde_json::json!({
                "operation": event.operation_kind.as_str(),
                "file_kind": event.file_kind(),
                "from_cache": result.from_cache,
                "errored": result.error.is_some(),
                "duration_ms": result.duration_ms,
            }),
        };

        enqueue(&self.shared, record);
    }

    /// Wait until every queued record reached the writer. Test/CLI helper.
    pub fn flush(&self) {
        if !self.enabled {
            return;
        }
        let queue = self.shared.queue.lock().unwrap_or_else(|p| p.into_inner());
        let _guard = self
            .shared
            .cond
            .wait_while(queue, |q| !q.records.is_empty() && !q.shutdown)
            .unwrap_or_else(|p| p.into_inner());
    }

    /// Records dropped so far because the queue was full.
    pub fn dropped_count(&self) -> u64 {
        self.shared
            .queue
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .dropped
    }
}

impl Drop for AnalyticsRecorder {
    fn drop(&mut self) {
        let dropped = self.dropped_count();
        if dropped > 0 {
            tracing::warn!(dropped, "Analytics records lost to queue overflow this session");
        }
        {
            let mut queue = self.shared.queue.lock().unwrap_or_else(|p| p.into_inner());
            queue.shutdown = true;
        }
        self.shared.cond.notify_all();
        if let Some(handle) = self.writer.lock().unwrap_or_else(|p| p.into_inner()).take() {
            handle.join().ok();
        }
    }
}

/// Drop-oldest push: losing the stalest pending record beats applying
/// backpressure to the real-time decision path.
fn enqueue(shared: &Shared, record: LearningRecord) {
    let mut queue = shared.queue.lock().unwrap_or_else(|p| p.into_inner());
    if queue.records.len() >= shared.capacity {
        queue.records.pop_front();
        queue.dropped += 1;
        tracing::warn!(dropped = queue.dropped, "Analytics queue full — oldest record dropped");
    }
    queue.records.push_back(record);
    drop(queue);
    shared.cond.notify_all();
}

/// Drains the queue into SQLite. Exits once shutdown is flagged and the
/// queue is empty. Database failures are logged and the batch discarded —
/// analytics loss is acceptable, pipeline stalls are not.
fn writer_loop(shared: Arc<Shared>, db_path: PathBuf) {
    let conn = match database::open_analytics_db(&db_path) {
        Ok(conn) => conn,
        Err(e) => {
            tracing::warn!(error = %e, "Analytics store unavailable — draining without persistence");
            drain_forever(shared);
            return;
        }
    };

    loop {
        let batch: Vec<LearningRecord> = {
            let queue = shared.queue.lock().unwrap_or_else(|p| p.into_inner());
            let mut queue = shared
                .cond
                .wait_while(queue, |q| q.records.is_empty() && !q.shutdown)
                .unwrap_or_else(|p| p.into_inner());
            if queue.records.is_empty() && queue.shutdown {
                return;
            }
            queue.records.drain(..).collect()
        };

        if let Err(e) = insert_batch(&conn, &batch) {
            tracing::warn!(error = %e, count = batch.len(), "Failed to persist analytics batch");
        }
        // Wake any flush() waiting on the drained queue
        shared.cond.notify_all();
    }
}

fn drain_forever(shared: Arc<Shared>) {
    loop {
        let queue = shared.queue.lock().unwrap_or_else(|p| p.into_inner());
        let mut queue = shared
            .cond
            .wait_while(queue, |q| q.records.is_empty() && !q.shutdown)
            .unwrap_or_else(|p| p.into_inner());
        if queue.records.is_empty() && queue.shutdown {
            return;
        }
        queue.records.clear();
        drop(queue);
        shared.cond.notify_all();
    }
}

fn insert_batch(conn: &rusqlite::Connection, batch: &[LearningRecord]) -> crate::GuardResult<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO learning_records (policy_id, fingerprint, verdict, timestamp, context_features)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for record in batch {
        stmt.execute(rusqlite::params![
            record.policy_id,
            record.fingerprint,
            record.verdict,
            record.timestamp.to_rfc3339(),
            record.context_features.to_string(),
        ])?;
    }
    Ok(())
}
