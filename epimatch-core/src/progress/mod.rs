//! Thread-safe per-request progress tracking, rolling metrics, and event
//! fan-out.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::trace;

use crate::error::{Error, Result};
use crate::types::{BulkOptions, BulkPhase, FileProcessingResult, FileStatus, Progress};

/// A deep-copied progress snapshot delivered to subscribers. Cloned under
/// the per-request lock so concurrent mutations can never race with a
/// consumer reading it.
pub type ProgressSnapshot = Progress;

type Subscriber = Box<dyn Fn(&str, &ProgressSnapshot) + Send + Sync>;

/// Owns every in-flight request's [`Progress`] record behind its own lock,
/// plus the subscriber list behind a separate lock, matching §4.3/§5's
/// concurrency model.
#[derive(Default)]
pub struct ProgressTracker {
    records: RwLock<HashMap<String, Arc<Mutex<Progress>>>>,
    max_errors: RwLock<HashMap<String, Option<usize>>>,
    subscribers: RwLock<Vec<Subscriber>>,
}

impl ProgressTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber invoked with a deep-copied snapshot every time
    /// `report`/`mark_completed` commits an update.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&str, &ProgressSnapshot) + Send + Sync + 'static,
    {
        self.subscribers.write().push(Box::new(callback));
    }

    /// Must be called before any other operation on `request_id`.
    pub fn initialize(&self, request_id: &str, total_files: usize, options: &BulkOptions) {
        let progress = Progress::new(total_files);
        self.records
            .write()
            .insert(request_id.to_string(), Arc::new(Mutex::new(progress)));
        self.max_errors
            .write()
            .insert(request_id.to_string(), options.max_errors_before_abort);
    }

    /// Update `total_files` once discovery has resolved the actual
    /// worklist size. Must be called before any `report_file_result` for
    /// `request_id`, since that call's total invariant assumes an accurate
    /// total.
    ///
    /// # Errors
    ///
    /// Returns `Err` if `request_id` was never initialized.
    pub fn set_total(&self, request_id: &str, total_files: usize) -> Result<()> {
        let record = self.record(request_id)?;
        let mut progress = record.lock();
        progress.total_files = total_files;
        progress.last_update = chrono::Utc::now();
        self.notify(request_id, &progress);
        Ok(())
    }

    fn record(&self, request_id: &str) -> Result<Arc<Mutex<Progress>>> {
        self.records
            .read()
            .get(request_id)
            .cloned()
            .ok_or_else(|| Error::InvalidInput(format!("unknown request id: {request_id}")))
    }

    /// Move the run to a new phase. Refuses to move backward, mirroring the
    /// forward-only phase invariant in §3 (`BulkPhase` is itself ordered so
    /// `new_phase < current` is simply ignored rather than applied).
    ///
    /// # Errors
    ///
    /// Returns `Err` if `request_id` was never [`initialize`](Self::initialize)d.
    pub fn set_phase(&self, request_id: &str, new_phase: BulkPhase) -> Result<()> {
        let record = self.record(request_id)?;
        let mut progress = record.lock();
        if new_phase >= progress.phase {
            progress.phase = new_phase;
            progress.last_update = chrono::Utc::now();
        }
        self.notify(request_id, &progress);
        Ok(())
    }

    /// Record one file's terminal outcome against the running totals.
    ///
    /// # Errors
    ///
    /// Returns `Err` if `request_id` was never initialized.
    pub fn report_file_result(&self, request_id: &str, result: &FileProcessingResult) -> Result<()> {
        let record = self.record(request_id)?;
        let mut progress = record.lock();

        match result.status {
            FileStatus::Success => progress.processed_files += 1,
            FileStatus::Failed | FileStatus::Cancelled => {
                progress.failed_files += 1;
                if let Some(err) = &result.error {
                    progress.errors.push(err.clone());
                }
            }
            FileStatus::Skipped => {
                progress.skipped_files += 1;
                progress.metrics.record_skip(
                    result
                        .error
                        .clone()
                        .unwrap_or_else(|| "unspecified".to_string()),
                );
            }
            FileStatus::Processing => {}
        }

        if let (Some(start), Some(end)) = (Some(result.start), result.end) {
            let duration_ms = (end - start).num_milliseconds().max(0) as f64;
            let sample_count = (progress.processed_files + progress.failed_files) as u64;
            progress.metrics.record_duration(duration_ms, sample_count.saturating_sub(1));
        }

        progress.current_file = Some(result.file_path.clone());
        progress.last_update = chrono::Utc::now();

        debug_assert!(progress.upholds_total_invariant());
        self.notify(request_id, &progress);
        Ok(())
    }

    /// `true` iff `failedFiles + currentErrors.count ≥ maxErrorsBeforeAbort`
    /// and that option is set.
    ///
    /// # Errors
    ///
    /// Returns `Err` if `request_id` was never initialized.
    pub fn has_exceeded_error_limit(&self, request_id: &str) -> Result<bool> {
        let record = self.record(request_id)?;
        let progress = record.lock();
        let Some(Some(max)) = self.max_errors.read().get(request_id).copied() else {
            return Ok(false);
        };
        Ok(progress.failed_files + progress.errors.len() >= max)
    }

    /// Idempotent terminal transition. Maps {Completed,
    /// CompletedWithWarnings} → their own phase, Cancelled → Cancelled,
    /// Failed → Failed.
    ///
    /// # Errors
    ///
    /// Returns `Err` if `request_id` was never initialized.
    pub fn mark_completed(&self, request_id: &str, status: BulkPhase) -> Result<()> {
        let record = self.record(request_id)?;
        let mut progress = record.lock();
        if progress.phase.is_terminal() {
            return Ok(());
        }
        progress.phase = status;
        progress.last_update = chrono::Utc::now();
        self.notify(request_id, &progress);
        Ok(())
    }

    /// Current progress snapshot for `request_id`, if it exists.
    #[must_use]
    pub fn progress(&self, request_id: &str) -> Option<Progress> {
        self.records.read().get(request_id).map(|r| r.lock().clone())
    }

    /// Update rolling batch-progress metrics (current/total batch index).
    ///
    /// # Errors
    ///
    /// Returns `Err` if `request_id` was never initialized.
    pub fn set_batch_progress(&self, request_id: &str, current: usize, total: usize) -> Result<()> {
        let record = self.record(request_id)?;
        let mut progress = record.lock();
        progress.metrics.current_batch = current;
        progress.metrics.total_batches = total;
        self.notify(request_id, &progress);
        Ok(())
    }

    /// Drop bookkeeping for a completed request, freeing memory. Safe to
    /// call multiple times.
    pub fn forget(&self, request_id: &str) {
        self.records.write().remove(request_id);
        self.max_errors.write().remove(request_id);
    }

    fn notify(&self, request_id: &str, progress: &Progress) {
        let snapshot = progress.clone();
        for subscriber in self.subscribers.read().iter() {
            subscriber(request_id, &snapshot);
        }
        trace!(request_id, phase = ?snapshot.phase, "progress updated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn success_result(path: &str) -> FileProcessingResult {
        let mut r = FileProcessingResult::started(PathBuf::from(path));
        r.status = FileStatus::Success;
        r.end = Some(chrono::Utc::now());
        r
    }

    #[test]
    fn total_invariant_holds_after_mixed_results() {
        let tracker = ProgressTracker::new();
        tracker.initialize("req1", 3, &BulkOptions::default());
        tracker.report_file_result("req1", &success_result("a.mkv")).unwrap();

        let mut failed = FileProcessingResult::started(PathBuf::from("b.mkv"));
        failed.status = FileStatus::Failed;
        failed.error = Some("boom".to_string());
        tracker.report_file_result("req1", &failed).unwrap();

        let progress = tracker.progress("req1").unwrap();
        assert!(progress.upholds_total_invariant());
        assert_eq!(progress.processed_files, 1);
        assert_eq!(progress.failed_files, 1);
    }

    #[test]
    fn error_limit_gate_trips_at_threshold() {
        let tracker = ProgressTracker::new();
        let mut options = BulkOptions::default();
        options.max_errors_before_abort = Some(2);
        tracker.initialize("req1", 5, &options);

        for i in 0..2 {
            let mut failed = FileProcessingResult::started(PathBuf::from(format!("f{i}.mkv")));
            failed.status = FileStatus::Failed;
            failed.error = Some("boom".to_string());
            tracker.report_file_result("req1", &failed).unwrap();
        }

        assert!(tracker.has_exceeded_error_limit("req1").unwrap());
    }

    #[test]
    fn mark_completed_is_idempotent() {
        let tracker = ProgressTracker::new();
        tracker.initialize("req1", 1, &BulkOptions::default());
        tracker.mark_completed("req1", BulkPhase::Completed).unwrap();
        tracker.mark_completed("req1", BulkPhase::Failed).unwrap();
        assert_eq!(tracker.progress("req1").unwrap().phase, BulkPhase::Completed);
    }

    #[test]
    fn phase_transitions_only_move_forward() {
        let tracker = ProgressTracker::new();
        tracker.initialize("req1", 1, &BulkOptions::default());
        tracker.set_phase("req1", BulkPhase::Processing).unwrap();
        tracker.set_phase("req1", BulkPhase::Validating).unwrap();
        assert_eq!(tracker.progress("req1").unwrap().phase, BulkPhase::Processing);
    }

    #[test]
    fn subscribers_receive_deep_copied_snapshots() {
        let tracker = ProgressTracker::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        tracker.subscribe(move |_, _| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });
        tracker.initialize("req1", 1, &BulkOptions::default());
        tracker.report_file_result("req1", &success_result("a.mkv")).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unknown_request_id_is_invalid_input() {
        let tracker = ProgressTracker::new();
        assert!(tracker.report_file_result("missing", &success_result("a.mkv")).is_err());
    }
}
