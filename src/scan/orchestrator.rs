//! Scan orchestrator: the session state machine and chunk processor.
//!
//! Lifecycle: idle -> running -> completed, with running -> cancelled on
//! request and running -> failed on infrastructure errors. Reset returns
//! any terminal state to idle. At most one scan runs per install; the
//! running status doubles as the mutual-exclusion lock.

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::backup::BackupManager;
use crate::config::Config;
use crate::db::Database;
use crate::error::StartError;
use crate::hierarchy::{HierarchyState, Resolver};
use crate::media::{MediaItem, MediaKind};
use crate::normalize::{self, Decision, DecisionAction};
use crate::provider::{encode_image, AnalyzeRequest, ProviderClient};

use super::{
    cache_record, CachedDecision, ChunkDescriptor, JobQueue, ScanEntry, ScanMode, ScanSession,
    ScanStatus, SESSION_RECORD,
};

/// Result of replaying a dry-run cache for real.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ApplyReport {
    pub applied: u64,
    pub failed: u64,
}

pub struct Orchestrator<'a> {
    db: &'a Database,
    client: &'a ProviderClient,
    config: &'a Config,
}

impl<'a> Orchestrator<'a> {
    pub fn new(db: &'a Database, client: &'a ProviderClient, config: &'a Config) -> Self {
        Self { db, client, config }
    }

    /// Lock-free snapshot of the persisted session record.
    pub fn status(&self) -> Result<ScanSession> {
        Ok(self
            .db
            .get_record(SESSION_RECORD)?
            .unwrap_or_default())
    }

    /// Start a new scan and schedule its chunks on the queue.
    pub fn start(
        &self,
        mode: ScanMode,
        dry_run: bool,
        queue: &mut dyn JobQueue,
    ) -> Result<(), StartError> {
        let session = self.status()?;
        if session.status == ScanStatus::Running {
            return Err(StartError::AlreadyRunning);
        }

        if !self.client.is_configured() {
            return Err(StartError::Unconfigured(self.client.name()));
        }

        let media_ids = match mode {
            ScanMode::OrganizeUnassigned => self.db.unassigned_media_ids()?,
            ScanMode::ReanalyzeAll | ScanMode::ReorganizeAll => self.db.all_media_ids()?,
        };

        // Destructive reorganization: the backup export must succeed before
        // any folder deletion proceeds.
        if mode == ScanMode::ReorganizeAll && !dry_run {
            BackupManager::new(self.db)
                .export()
                .context("backup export failed, aborting reorganization")?;
            self.db.delete_all_folders()?;
        }

        // A fresh dry run rebuilds this mode's cache from scratch.
        if dry_run {
            self.db.delete_record(&cache_record(mode))?;
        }

        let now = Utc::now();
        let total = media_ids.len() as u64;
        // Stale completed_at/error are cleared here, before the record is
        // visible to any status read of the new run.
        let fresh = ScanSession {
            status: if total == 0 {
                ScanStatus::Completed
            } else {
                ScanStatus::Running
            },
            mode,
            dry_run,
            total,
            processed: 0,
            applied: 0,
            failed: 0,
            results: Default::default(),
            started_at: Some(now),
            completed_at: if total == 0 { Some(now) } else { None },
            error: None,
            updated_at: Some(now),
        };
        self.db.put_record(SESSION_RECORD, &fresh)?;

        for (index, ids) in media_ids.chunks(self.config.scan.chunk_size.max(1)).enumerate() {
            queue.enqueue(ChunkDescriptor {
                index,
                mode,
                dry_run,
                media_ids: ids.to_vec(),
            });
        }

        tracing::info!(
            mode = mode.as_str(),
            dry_run,
            total,
            provider = self.client.name(),
            "scan started"
        );
        Ok(())
    }

    /// Folder knowledge for this scan, rebuilt on resume: seeded from the
    /// live tree (or an emptied tree for reorganize-all previews), then
    /// from every creation recorded in the dry-run cache so far.
    pub fn hierarchy_state(&self, session: &ScanSession) -> Result<HierarchyState> {
        let mut state = if session.mode == ScanMode::ReorganizeAll && session.dry_run {
            HierarchyState::empty()
        } else {
            HierarchyState::from_tree(&self.db.folder_tree()?)
        };

        if session.dry_run {
            let cached: Vec<CachedDecision> = self
                .db
                .get_record(&cache_record(session.mode))?
                .unwrap_or_default();
            let mut resolver = Resolver::new(self.db, &mut state, true);
            for entry in &cached {
                if entry.decision.action == DecisionAction::Create {
                    if let Some(path) = entry.decision.new_folder_path.as_deref() {
                        let _ = resolver.ensure_path(path);
                    }
                }
            }
        }

        Ok(state)
    }

    /// Process one chunk. Per-item failures are isolated as skip decisions;
    /// only infrastructure failures (storage of the session itself) return
    /// an error. The whole counter delta commits in one transaction.
    pub fn process_chunk(
        &self,
        chunk: &ChunkDescriptor,
        state: &mut HierarchyState,
    ) -> Result<()> {
        let session = self.status()?;
        if session.status != ScanStatus::Running
            || session.mode != chunk.mode
            || session.dry_run != chunk.dry_run
        {
            // Cancellation is cooperative and checked at chunk boundaries;
            // a stale chunk from a superseded scan lands here too.
            tracing::debug!(chunk = chunk.index, "skipping chunk, session no longer running");
            return Ok(());
        }

        let simulate = chunk.dry_run;
        let mut entries: Vec<ScanEntry> = Vec::with_capacity(chunk.media_ids.len());
        let mut cached: Vec<CachedDecision> = Vec::new();
        let mut applied_delta = 0u64;
        let mut failed_delta = 0u64;

        for &media_id in &chunk.media_ids {
            let item = match self.db.media_item(media_id) {
                Ok(Some(item)) => item,
                Ok(None) => {
                    failed_delta += 1;
                    entries.push(ScanEntry {
                        media_id,
                        filename: String::new(),
                        decision: Decision::skip("item vanished before analysis"),
                    });
                    continue;
                }
                Err(e) => {
                    failed_delta += 1;
                    entries.push(ScanEntry {
                        media_id,
                        filename: String::new(),
                        decision: Decision::skip(format!("storage error: {e}")),
                    });
                    continue;
                }
            };

            let (outcome, item_failed) = self.process_item(&item, chunk, state, simulate);
            if outcome.applied {
                applied_delta += 1;
            }
            if item_failed {
                failed_delta += 1;
            }
            if simulate {
                cached.push(CachedDecision {
                    media_id,
                    decision: outcome.decision.clone(),
                });
            }
            entries.push(ScanEntry {
                media_id,
                filename: item.filename.clone(),
                decision: outcome.decision,
            });
        }

        if simulate && !cached.is_empty() {
            self.db.update_record(
                &cache_record(chunk.mode),
                Vec::<CachedDecision>::new(),
                |all| all.extend(cached),
            )?;
        }

        let processed_delta = entries.len() as u64;
        let capacity = self.config.scan.recent_results;
        let now = Utc::now();
        let committed = self.db.update_record(
            SESSION_RECORD,
            ScanSession::default(),
            move |s| {
                s.processed += processed_delta;
                s.applied += applied_delta;
                s.failed += failed_delta;
                for entry in entries.drain(..) {
                    s.push_result(entry, capacity);
                }
                s.updated_at = Some(now);
                // A chunk finishing after cancellation still commits its
                // counters, but never flips the status back.
                if s.status == ScanStatus::Running && s.processed >= s.total {
                    s.status = ScanStatus::Completed;
                    s.completed_at = Some(now);
                }
            },
        )?;

        tracing::debug!(
            chunk = chunk.index,
            processed = committed.processed,
            total = committed.total,
            failed = committed.failed,
            "chunk committed"
        );
        Ok(())
    }

    /// Classify and resolve one item. Never fails: every error becomes a
    /// skip decision. The bool marks per-item failures for the counter.
    fn process_item(
        &self,
        item: &MediaItem,
        chunk: &ChunkDescriptor,
        state: &mut HierarchyState,
        simulate: bool,
    ) -> (crate::hierarchy::AppliedDecision, bool) {
        let mut resolver = Resolver::new(self.db, state, simulate);

        // Deterministic type routing: documents and videos never reach AI.
        if item.kind() != MediaKind::Image {
            return match resolver.route_fixed(item) {
                Ok(outcome) => (outcome, false),
                Err(e) => (skipped(format!("storage error: {e}")), true),
            };
        }

        let folder_context = resolver.context_paths();
        let allow_new_folders =
            self.config.scan.allow_new_folders || chunk.mode == ScanMode::ReorganizeAll;
        let image = item
            .payload_path
            .as_deref()
            .filter(|p| p.exists())
            .and_then(|p| match encode_image(p) {
                Ok(encoded) => Some(encoded),
                Err(e) => {
                    tracing::debug!(file = %item.filename, error = %e, "image payload unavailable");
                    None
                }
            });

        let request = AnalyzeRequest {
            item,
            folder_context: &folder_context,
            max_depth: self.config.scan.max_depth,
            allow_new_folders,
            image,
            suggested_folders: &self.config.scan.suggested_folders,
            custom_context: self.config.provider.custom_context.as_deref(),
        };

        let raw = match self.client.analyze(&request) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(file = %item.filename, error = %e, "provider call failed");
                return (skipped(format!("provider error: {e}")), true);
            }
        };

        let decision = match normalize::parse(&raw, &resolver.path_map()) {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(file = %item.filename, error = %e, "unparseable provider reply");
                return (skipped(format!("unparseable reply: {e}")), true);
            }
        };

        match resolver.apply(item, decision) {
            Ok(outcome) => (outcome, false),
            Err(e) => {
                tracing::warn!(file = %item.filename, error = %e, "decision could not be applied");
                (skipped(format!("storage error: {e}")), true)
            }
        }
    }

    /// Request cancellation. Idempotent and monotonic: only a running
    /// session transitions; terminal states are left untouched.
    pub fn cancel(&self, queue: &mut dyn JobQueue) -> Result<ScanSession> {
        let now = Utc::now();
        let session = self
            .db
            .update_record(SESSION_RECORD, ScanSession::default(), |s| {
                if s.status == ScanStatus::Running {
                    s.status = ScanStatus::Cancelled;
                    s.completed_at = Some(now);
                    s.updated_at = Some(now);
                }
            })?;
        queue.cancel_pending();
        Ok(session)
    }

    /// Return a terminal session to idle. Rejected while running. Clears
    /// counters, results and the affected mode's dry-run cache; the backup
    /// snapshot is never touched.
    pub fn reset(&self) -> Result<()> {
        let session = self.status()?;
        if session.status == ScanStatus::Running {
            bail!("cannot reset while a scan is running");
        }
        self.db.delete_record(&cache_record(session.mode))?;
        self.db.put_record(SESSION_RECORD, &ScanSession::default())?;
        Ok(())
    }

    pub fn get_cached_count(&self, mode: ScanMode) -> Result<usize> {
        let cached: Vec<CachedDecision> = self
            .db
            .get_record(&cache_record(mode))?
            .unwrap_or_default();
        Ok(cached.len())
    }

    /// Replay a prior dry run for real, in original order. The cache is
    /// cleared only when every decision applied cleanly.
    pub fn apply_cached(&self, mode: ScanMode) -> Result<ApplyReport> {
        let session = self.status()?;
        if session.status == ScanStatus::Running {
            bail!("cannot apply cached results while a scan is running");
        }

        let cached: Vec<CachedDecision> = self
            .db
            .get_record(&cache_record(mode))?
            .unwrap_or_default();
        if cached.is_empty() {
            bail!("no cached results for mode {}", mode.as_str());
        }

        // Replaying a reorganization repeats its destructive preamble.
        if mode == ScanMode::ReorganizeAll {
            BackupManager::new(self.db)
                .export()
                .context("backup export failed, aborting reorganization")?;
            self.db.delete_all_folders()?;
        }

        let mut state = HierarchyState::from_tree(&self.db.folder_tree()?);
        let mut resolver = Resolver::new(self.db, &mut state, false);
        let mut report = ApplyReport {
            applied: 0,
            failed: 0,
        };

        for entry in &cached {
            let item = match self.db.media_item(entry.media_id)? {
                Some(item) => item,
                None => {
                    report.failed += 1;
                    continue;
                }
            };
            match resolver.apply(&item, entry.decision.clone()) {
                Ok(outcome) if outcome.applied => report.applied += 1,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(media_id = entry.media_id, error = %e, "cached decision failed");
                    report.failed += 1;
                }
            }
        }

        let now = Utc::now();
        self.db
            .update_record(SESSION_RECORD, ScanSession::default(), |s| {
                s.applied += report.applied;
                s.failed += report.failed;
                s.updated_at = Some(now);
            })?;

        if report.failed == 0 {
            self.db.delete_record(&cache_record(mode))?;
        }

        tracing::info!(
            mode = mode.as_str(),
            applied = report.applied,
            failed = report.failed,
            "cached results applied"
        );
        Ok(report)
    }

    /// Killed-worker recovery: a session stuck in running with an idle
    /// queue past the staleness window is failed rather than left running
    /// forever. Returns true when the transition happened.
    pub fn check_stale(&self, queue: &dyn JobQueue) -> Result<bool> {
        let session = self.status()?;
        if session.status != ScanStatus::Running || !queue.is_idle() {
            return Ok(false);
        }

        let last_activity = session
            .updated_at
            .or(session.started_at)
            .ok_or_else(|| anyhow!("running session without timestamps"))?;
        let idle_for = Utc::now().signed_duration_since(last_activity);
        if idle_for.num_seconds() <= self.config.scan.stale_after_secs {
            return Ok(false);
        }

        let now = Utc::now();
        self.db
            .update_record(SESSION_RECORD, ScanSession::default(), |s| {
                if s.status == ScanStatus::Running {
                    s.status = ScanStatus::Failed;
                    s.error = Some(format!(
                        "scan worker produced no progress for {}s; marking session failed",
                        idle_for.num_seconds()
                    ));
                    s.completed_at = Some(now);
                    s.updated_at = Some(now);
                }
            })?;
        tracing::warn!("stale running session transitioned to failed");
        Ok(true)
    }
}

fn skipped(reason: String) -> crate::hierarchy::AppliedDecision {
    crate::hierarchy::AppliedDecision {
        decision: Decision::skip(reason),
        applied: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::provider::{AnalysisProvider, AnalyzeRequest};
    use crate::scan::FifoJobQueue;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Scripted provider: pops one canned reply per call.
    struct ScriptedProvider {
        replies: Mutex<Vec<Result<String, ProviderError>>>,
    }

    impl ScriptedProvider {
        fn new(replies: Vec<Result<String, ProviderError>>) -> Self {
            let mut replies = replies;
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
            }
        }
    }

    impl AnalysisProvider for ScriptedProvider {
        fn analyze(&self, _request: &AnalyzeRequest) -> Result<String, ProviderError> {
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(r#"{"action":"skip","reason":"script exhausted"}"#.into()))
        }

        fn test(&self) -> Option<String> {
            None
        }

        fn is_configured(&self) -> bool {
            true
        }

        fn available_models(&self) -> Vec<String> {
            Vec::new()
        }

        fn name(&self) -> &'static str {
            "Scripted"
        }
    }

    struct UnconfiguredProvider;

    impl AnalysisProvider for UnconfiguredProvider {
        fn analyze(&self, _request: &AnalyzeRequest) -> Result<String, ProviderError> {
            unreachable!("unconfigured provider must never be called")
        }

        fn test(&self) -> Option<String> {
            Some("missing api key".to_string())
        }

        fn is_configured(&self) -> bool {
            false
        }

        fn available_models(&self) -> Vec<String> {
            Vec::new()
        }

        fn name(&self) -> &'static str {
            "Unconfigured"
        }
    }

    fn setup(n_images: usize) -> (tempfile::TempDir, Database, Config) {
        let dir = tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.db")).unwrap();
        db.initialize().unwrap();
        for i in 0..n_images {
            db.upsert_media(
                &format!("/pics/img_{i}.jpg"),
                &format!("img_{i}.jpg"),
                "image/jpeg",
                &Default::default(),
            )
            .unwrap();
        }
        let config = Config {
            db_path: dir.path().join("test.db"),
            ..Default::default()
        };
        (dir, db, config)
    }

    fn client(replies: Vec<Result<String, ProviderError>>) -> ProviderClient {
        ProviderClient::new(Box::new(ScriptedProvider::new(replies)))
    }

    fn drain(orch: &Orchestrator, queue: &mut FifoJobQueue) {
        let session = orch.status().unwrap();
        let mut state = orch.hierarchy_state(&session).unwrap();
        while let Some(chunk) = queue.next() {
            orch.process_chunk(&chunk, &mut state).unwrap();
        }
    }

    fn assign_reply(path: &str) -> Result<String, ProviderError> {
        Ok(format!(
            r#"{{"action":"create","new_folder_path":"{path}","confidence":0.8,"reason":"t"}}"#
        ))
    }

    fn assign_replies(path: &str, n: usize) -> Vec<Result<String, ProviderError>> {
        (0..n).map(|_| assign_reply(path)).collect()
    }

    #[test]
    fn test_scan_completes_despite_timeouts() {
        let (_dir, db, config) = setup(10);
        let mut replies: Vec<Result<String, ProviderError>> = Vec::new();
        for i in 0..10 {
            if i % 3 == 0 {
                replies.push(Err(ProviderError::Timeout(60)));
            } else {
                replies.push(assign_reply("Sorted"));
            }
        }
        let client = client(replies);
        let orch = Orchestrator::new(&db, &client, &config);
        let mut queue = FifoJobQueue::new();

        orch.start(ScanMode::ReanalyzeAll, false, &mut queue).unwrap();
        drain(&orch, &mut queue);

        let session = orch.status().unwrap();
        assert_eq!(session.status, ScanStatus::Completed);
        assert_eq!(session.processed, 10);
        assert!(session.failed >= 3);
        assert!(session.completed_at.is_some());
        assert_eq!(session.percentage(), 100);
    }

    #[test]
    fn test_start_rejects_concurrent_scan() {
        let (_dir, db, config) = setup(3);
        let client = client(assign_replies("A", 3));
        let orch = Orchestrator::new(&db, &client, &config);
        let mut queue = FifoJobQueue::new();

        orch.start(ScanMode::ReanalyzeAll, false, &mut queue).unwrap();
        let err = orch
            .start(ScanMode::ReanalyzeAll, false, &mut queue)
            .unwrap_err();
        assert!(matches!(err, StartError::AlreadyRunning));
    }

    #[test]
    fn test_start_clears_stale_terminal_fields() {
        let (_dir, db, config) = setup(1);
        let client = client(vec![assign_reply("A")]);
        let orch = Orchestrator::new(&db, &client, &config);

        // plant a failed prior session
        let mut prior = ScanSession::default();
        prior.status = ScanStatus::Failed;
        prior.error = Some("old failure".to_string());
        prior.completed_at = Some(Utc::now());
        db.put_record(SESSION_RECORD, &prior).unwrap();

        let mut queue = FifoJobQueue::new();
        orch.start(ScanMode::ReanalyzeAll, false, &mut queue).unwrap();

        let session = orch.status().unwrap();
        assert_eq!(session.status, ScanStatus::Running);
        assert!(session.error.is_none());
        assert!(session.completed_at.is_none());
    }

    #[test]
    fn test_unconfigured_provider_never_enters_running() {
        let (_dir, db, config) = setup(2);
        let client = ProviderClient::new(Box::new(UnconfiguredProvider));
        let orch = Orchestrator::new(&db, &client, &config);
        let mut queue = FifoJobQueue::new();

        let err = orch
            .start(ScanMode::ReanalyzeAll, false, &mut queue)
            .unwrap_err();
        assert!(matches!(err, StartError::Unconfigured(_)));
        assert_eq!(orch.status().unwrap().status, ScanStatus::Idle);
        assert!(queue.is_idle());
    }

    #[test]
    fn test_cancel_is_idempotent_and_monotonic() {
        let (_dir, db, config) = setup(4);
        let client = client(assign_replies("A", 4));
        let orch = Orchestrator::new(&db, &client, &config);
        let mut queue = FifoJobQueue::new();

        orch.start(ScanMode::ReanalyzeAll, false, &mut queue).unwrap();
        let after_first = orch.cancel(&mut queue).unwrap();
        assert_eq!(after_first.status, ScanStatus::Cancelled);
        let first_completed_at = after_first.completed_at;

        // cancelling again changes nothing
        let after_second = orch.cancel(&mut queue).unwrap();
        assert_eq!(after_second.status, ScanStatus::Cancelled);
        assert_eq!(after_second.completed_at, first_completed_at);

        // a chunk finishing late still commits counters without reviving
        // the session
        let session = orch.status().unwrap();
        let mut state = orch.hierarchy_state(&session).unwrap();
        let late_chunk = ChunkDescriptor {
            index: 9,
            mode: ScanMode::ReanalyzeAll,
            dry_run: false,
            media_ids: vec![1],
        };
        orch.process_chunk(&late_chunk, &mut state).unwrap();
        assert_eq!(orch.status().unwrap().status, ScanStatus::Cancelled);
    }

    #[test]
    fn test_cancel_after_completion_keeps_completed() {
        let (_dir, db, config) = setup(1);
        let client = client(vec![assign_reply("A")]);
        let orch = Orchestrator::new(&db, &client, &config);
        let mut queue = FifoJobQueue::new();

        orch.start(ScanMode::ReanalyzeAll, false, &mut queue).unwrap();
        drain(&orch, &mut queue);
        assert_eq!(orch.status().unwrap().status, ScanStatus::Completed);

        orch.cancel(&mut queue).unwrap();
        assert_eq!(orch.status().unwrap().status, ScanStatus::Completed);
    }

    #[test]
    fn test_reset_rules() {
        let (_dir, db, config) = setup(2);
        let client = client(assign_replies("A", 2));
        let orch = Orchestrator::new(&db, &client, &config);
        let mut queue = FifoJobQueue::new();

        orch.start(ScanMode::ReanalyzeAll, false, &mut queue).unwrap();
        assert!(orch.reset().is_err());

        drain(&orch, &mut queue);
        orch.reset().unwrap();
        let session = orch.status().unwrap();
        assert_eq!(session.status, ScanStatus::Idle);
        assert_eq!(session.processed, 0);
        assert!(session.results.is_empty());
    }

    #[test]
    fn test_dry_run_caches_and_apply_replays() {
        let (_dir, db, config) = setup(3);
        let client = client(vec![
            assign_reply("Trips"),
            assign_reply("Trips/Beach"),
            Ok(r#"{"action":"skip","reason":"nothing fits"}"#.to_string()),
        ]);
        let orch = Orchestrator::new(&db, &client, &config);
        let mut queue = FifoJobQueue::new();

        orch.start(ScanMode::OrganizeUnassigned, true, &mut queue)
            .unwrap();
        drain(&orch, &mut queue);

        // preview touched nothing
        assert_eq!(db.folder_count().unwrap(), 0);
        assert_eq!(db.assignment_count().unwrap(), 0);
        assert_eq!(
            orch.get_cached_count(ScanMode::OrganizeUnassigned).unwrap(),
            3
        );

        let report = orch.apply_cached(ScanMode::OrganizeUnassigned).unwrap();
        assert_eq!(report.applied, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(db.assignment_count().unwrap(), 2);

        let tree = db.folder_tree().unwrap();
        let paths: Vec<&str> = tree.iter().map(|n| n.path.as_str()).collect();
        assert_eq!(paths, vec!["Trips", "Trips/Beach"]);

        // cache cleared on full success
        assert_eq!(
            orch.get_cached_count(ScanMode::OrganizeUnassigned).unwrap(),
            0
        );
    }

    #[test]
    fn test_reorganize_dry_run_simulates_empty_tree() {
        let (_dir, db, config) = setup(2);
        let pets = db.create_folder("Pets", None).unwrap();
        db.assign(1, pets).unwrap();

        let client = client(vec![assign_reply("Animals"), assign_reply("Animals")]);
        let orch = Orchestrator::new(&db, &client, &config);
        let mut queue = FifoJobQueue::new();

        orch.start(ScanMode::ReorganizeAll, true, &mut queue).unwrap();
        drain(&orch, &mut queue);

        // the real tree survived the preview untouched
        assert_eq!(db.folder_count().unwrap(), 1);
        assert_eq!(db.assignments(pets).unwrap(), vec![1]);
        assert!(!BackupManager::new(&db).has_backup().unwrap());

        let session = orch.status().unwrap();
        assert_eq!(session.status, ScanStatus::Completed);
        assert_eq!(session.applied, 2);
    }

    #[test]
    fn test_reorganize_real_run_backs_up_then_wipes() {
        let (_dir, db, config) = setup(2);
        let pets = db.create_folder("Pets", None).unwrap();
        db.assign(1, pets).unwrap();

        let client = client(vec![assign_reply("Animals"), assign_reply("Animals")]);
        let orch = Orchestrator::new(&db, &client, &config);
        let mut queue = FifoJobQueue::new();

        orch.start(ScanMode::ReorganizeAll, false, &mut queue).unwrap();
        drain(&orch, &mut queue);

        let backups = BackupManager::new(&db);
        let info = backups.get_backup_info().unwrap().unwrap();
        assert_eq!(info.folder_count, 1);
        assert_eq!(info.assignment_count, 1);

        let tree = db.folder_tree().unwrap();
        let paths: Vec<&str> = tree.iter().map(|n| n.path.as_str()).collect();
        assert_eq!(paths, vec!["Animals"]);
        assert_eq!(db.assignment_count().unwrap(), 2);
    }

    #[test]
    fn test_stale_running_session_fails() {
        let (_dir, db, config) = setup(2);
        let client = client(assign_replies("A", 2));
        let orch = Orchestrator::new(&db, &client, &config);
        let mut queue = FifoJobQueue::new();

        orch.start(ScanMode::ReanalyzeAll, false, &mut queue).unwrap();
        queue.cancel_pending(); // simulate a killed worker: queue empty, session running

        // fresh heartbeat: not stale yet
        assert!(!orch.check_stale(&queue).unwrap());

        // age the heartbeat past the window
        let old = Utc::now() - chrono::Duration::seconds(config.scan.stale_after_secs + 60);
        db.update_record(SESSION_RECORD, ScanSession::default(), |s| {
            s.updated_at = Some(old);
        })
        .unwrap();

        assert!(orch.check_stale(&queue).unwrap());
        let session = orch.status().unwrap();
        assert_eq!(session.status, ScanStatus::Failed);
        assert!(session.error.as_deref().unwrap().contains("no progress"));
    }

    #[test]
    fn test_empty_library_completes_immediately() {
        let (_dir, db, config) = setup(0);
        let client = client(Vec::new());
        let orch = Orchestrator::new(&db, &client, &config);
        let mut queue = FifoJobQueue::new();

        orch.start(ScanMode::OrganizeUnassigned, false, &mut queue)
            .unwrap();
        assert!(queue.is_idle());
        let session = orch.status().unwrap();
        assert_eq!(session.status, ScanStatus::Completed);
        assert_eq!(session.percentage(), 0);
    }

    #[test]
    fn test_documents_and_videos_bypass_provider() {
        let (_dir, db, config) = setup(0);
        db.upsert_media("/a.pdf", "a.pdf", "application/pdf", &Default::default())
            .unwrap();
        db.upsert_media("/b.mp4", "b.mp4", "video/mp4", &Default::default())
            .unwrap();

        // a provider that fails loudly if ever consulted
        struct Exploding;
        impl AnalysisProvider for Exploding {
            fn analyze(&self, _r: &AnalyzeRequest) -> Result<String, ProviderError> {
                panic!("non-image media must not reach the provider");
            }
            fn test(&self) -> Option<String> {
                None
            }
            fn is_configured(&self) -> bool {
                true
            }
            fn available_models(&self) -> Vec<String> {
                Vec::new()
            }
            fn name(&self) -> &'static str {
                "Exploding"
            }
        }

        let client = ProviderClient::new(Box::new(Exploding));
        let orch = Orchestrator::new(&db, &client, &config);
        let mut queue = FifoJobQueue::new();

        orch.start(ScanMode::ReanalyzeAll, false, &mut queue).unwrap();
        drain(&orch, &mut queue);

        let session = orch.status().unwrap();
        assert_eq!(session.status, ScanStatus::Completed);
        assert_eq!(session.applied, 2);

        let tree = db.folder_tree().unwrap();
        let paths: Vec<&str> = tree.iter().map(|n| n.path.as_str()).collect();
        assert_eq!(paths, vec!["Documents", "Videos"]);
    }
}
