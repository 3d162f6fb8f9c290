//! Batch job bookkeeping.

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use tierflow_types::{JobKind, JobRun, JobStatus};

/// Running counters for one batch invocation
#[derive(Debug)]
pub struct JobTracker {
    id: Uuid,
    kind: JobKind,
    started_at: DateTime<Utc>,
    processed: u32,
    succeeded: u32,
    failed: u32,
    notes: Vec<String>,
}

impl JobTracker {
    pub fn start(kind: JobKind, started_at: DateTime<Utc>) -> Self {
        Self { id: Uuid::new_v4(), kind, started_at, processed: 0, succeeded: 0, failed: 0, notes: Vec::new() }
    }

    pub fn succeeded(&mut self) {
        self.processed += 1;
        self.succeeded += 1;
    }

    pub fn failed(&mut self, note: impl Into<String>) {
        self.processed += 1;
        self.failed += 1;
        self.notes.push(note.into());
    }

    pub fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    pub fn finish(self, finished_at: DateTime<Utc>) -> JobRun {
        let status = JobStatus::from_counts(self.succeeded, self.failed);
        let run = JobRun {
            id: self.id,
            kind: self.kind,
            started_at: self.started_at,
            finished_at,
            processed: self.processed,
            succeeded: self.succeeded,
            failed: self.failed,
            status,
            notes: self.notes,
        };
        match status {
            JobStatus::Success => info!(job = ?run.kind, id = %run.id, processed = run.processed, "job finished"),
            _ => warn!(
                job = ?run.kind,
                id = %run.id,
                processed = run.processed,
                failed = run.failed,
                ?status,
                "job finished with failures"
            ),
        }
        run
    }
}
