//! Scan session model and the job-queue collaborator interface.
//!
//! The session is a singleton named record with a defined lifecycle and a
//! single writer (the chunk processor); status polling reads snapshots of
//! it without taking any lock.

pub mod orchestrator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::normalize::Decision;

pub use orchestrator::{ApplyReport, Orchestrator};

/// Name of the singleton session record.
pub const SESSION_RECORD: &str = "scan_session";

/// Name of the per-mode dry-run cache record.
pub fn cache_record(mode: ScanMode) -> String {
    format!("scan_cache:{}", mode.as_str())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    OrganizeUnassigned,
    ReanalyzeAll,
    ReorganizeAll,
}

impl ScanMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanMode::OrganizeUnassigned => "organize_unassigned",
            ScanMode::ReanalyzeAll => "reanalyze_all",
            ScanMode::ReorganizeAll => "reorganize_all",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().replace('-', "_").as_str() {
            "organize_unassigned" => Some(ScanMode::OrganizeUnassigned),
            "reanalyze_all" => Some(ScanMode::ReanalyzeAll),
            "reorganize_all" => Some(ScanMode::ReorganizeAll),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Idle => "idle",
            ScanStatus::Running => "running",
            ScanStatus::Completed => "completed",
            ScanStatus::Cancelled => "cancelled",
            ScanStatus::Failed => "failed",
        }
    }
}

/// One entry of the recent-results ring buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanEntry {
    pub media_id: i64,
    pub filename: String,
    pub decision: Decision,
}

/// The singleton scan session. Mutated only by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSession {
    pub status: ScanStatus,
    pub mode: ScanMode,
    pub dry_run: bool,
    pub total: u64,
    pub processed: u64,
    pub applied: u64,
    pub failed: u64,
    /// Most recent decisions, bounded by the configured capacity.
    pub results: VecDeque<ScanEntry>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    /// Heartbeat bumped on every chunk commit; drives stale-job detection.
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for ScanSession {
    fn default() -> Self {
        Self {
            status: ScanStatus::Idle,
            mode: ScanMode::OrganizeUnassigned,
            dry_run: false,
            total: 0,
            processed: 0,
            applied: 0,
            failed: 0,
            results: VecDeque::new(),
            started_at: None,
            completed_at: None,
            error: None,
            updated_at: None,
        }
    }
}

impl ScanSession {
    /// Derived progress, `round(processed/total*100)`; 0 when total is 0.
    pub fn percentage(&self) -> u8 {
        if self.total == 0 {
            0
        } else {
            ((self.processed as f64 / self.total as f64) * 100.0)
                .round()
                .min(100.0) as u8
        }
    }

    pub fn push_result(&mut self, entry: ScanEntry, capacity: usize) {
        if capacity == 0 {
            return;
        }
        while self.results.len() >= capacity {
            self.results.pop_front();
        }
        self.results.push_back(entry);
    }
}

/// One (media id, decision) pair of a dry-run cache, in original order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedDecision {
    pub media_id: i64,
    pub decision: Decision,
}

/// A bounded batch of media items processed in one queue invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkDescriptor {
    pub index: usize,
    pub mode: ScanMode,
    pub dry_run: bool,
    pub media_ids: Vec<i64>,
}

/// External job-queue collaborator. The orchestrator only ever schedules
/// and cancels; execution (and any parallelism) belongs to the queue.
pub trait JobQueue {
    fn enqueue(&mut self, chunk: ChunkDescriptor);

    /// Drop not-yet-started chunks. Best effort.
    fn cancel_pending(&mut self);

    fn is_idle(&self) -> bool;
}

/// In-process FIFO queue drained synchronously by the CLI.
#[derive(Default)]
pub struct FifoJobQueue {
    pending: VecDeque<ChunkDescriptor>,
}

impl FifoJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> Option<ChunkDescriptor> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl JobQueue for FifoJobQueue {
    fn enqueue(&mut self, chunk: ChunkDescriptor) {
        self.pending.push_back(chunk);
    }

    fn cancel_pending(&mut self) {
        self.pending.clear();
    }

    fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::Decision;

    #[test]
    fn test_percentage_bounds() {
        let mut session = ScanSession::default();
        assert_eq!(session.percentage(), 0);

        session.total = 3;
        session.processed = 1;
        assert_eq!(session.percentage(), 33);
        session.processed = 2;
        assert_eq!(session.percentage(), 67);
        session.processed = 3;
        assert_eq!(session.percentage(), 100);
    }

    #[test]
    fn test_results_ring_buffer_is_bounded() {
        let mut session = ScanSession::default();
        for i in 0..10 {
            session.push_result(
                ScanEntry {
                    media_id: i,
                    filename: format!("{i}.jpg"),
                    decision: Decision::skip("test"),
                },
                3,
            );
        }
        assert_eq!(session.results.len(), 3);
        assert_eq!(session.results.front().unwrap().media_id, 7);
        assert_eq!(session.results.back().unwrap().media_id, 9);
    }

    #[test]
    fn test_mode_parse_accepts_both_separators() {
        assert_eq!(
            ScanMode::parse("organize-unassigned"),
            Some(ScanMode::OrganizeUnassigned)
        );
        assert_eq!(ScanMode::parse("reorganize_all"), Some(ScanMode::ReorganizeAll));
        assert_eq!(ScanMode::parse("bogus"), None);
    }

    #[test]
    fn test_fifo_queue_cancel_pending() {
        let mut queue = FifoJobQueue::new();
        for index in 0..3 {
            queue.enqueue(ChunkDescriptor {
                index,
                mode: ScanMode::ReanalyzeAll,
                dry_run: false,
                media_ids: vec![index as i64],
            });
        }
        assert!(!queue.is_idle());
        queue.cancel_pending();
        assert!(queue.is_idle());
        assert!(queue.next().is_none());
    }
}
