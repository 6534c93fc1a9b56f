//! Job worker and shared engine state.
//!
//! The engine holds exactly one job slot. Counters are atomics advanced only
//! by the worker that owns the current epoch, so progress reads never lock.
//! Every job gets a fresh epoch; an emergency reset bumps it again, which
//! turns any late writes from an orphaned worker into no-ops.

use crate::protocol;
use crate::source::EntrySource;
use crate::transport::ConnectionTarget;
use crate::types::{
    BatchFailure, BindAction, EngineState, Entry, Event, JobId, JobOutcome, JobReport, JobShape,
    Progress, UidMessage,
};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::Dispatcher;

/// Handle to the running job
pub(crate) struct ActiveJob {
    pub(crate) id: JobId,
    pub(crate) epoch: u64,
    pub(crate) cancel: CancellationToken,
    pub(crate) handle: Option<JoinHandle<()>>,
}

/// Engine state shared by every `Dispatcher` clone
pub(crate) struct EngineCore {
    state: AtomicU8,
    epoch: AtomicU64,
    next_job_id: AtomicU64,
    /// 0 when no job has run since the last reset
    current_job: AtomicU64,
    sent: AtomicU64,
    total: AtomicU64,
    active: Mutex<Option<ActiveJob>>,
    last_report: Mutex<Option<JobReport>>,
}

impl EngineCore {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(EngineState::Idle as u8),
            epoch: AtomicU64::new(0),
            next_job_id: AtomicU64::new(1),
            current_job: AtomicU64::new(0),
            sent: AtomicU64::new(0),
            total: AtomicU64::new(0),
            active: Mutex::new(None),
            last_report: Mutex::new(None),
        }
    }

    /// Lock the job slot; poisoning is ignored because the slot is always left consistent
    pub(crate) fn lock_active(&self) -> MutexGuard<'_, Option<ActiveJob>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn state(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Single compare-and-set claiming the engine; caller must hold the slot lock
    pub(crate) fn try_claim(&self) -> bool {
        self.state
            .compare_exchange(
                EngineState::Idle as u8,
                EngineState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// `Running -> Stopping`; a no-op in any other state
    pub(crate) fn mark_stopping(&self) {
        let _ = self.state.compare_exchange(
            EngineState::Running as u8,
            EngineState::Stopping as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Prepare counters for a freshly claimed job and return its (id, epoch)
    pub(crate) fn begin_job(&self, total: u64) -> (JobId, u64) {
        let id = JobId(self.next_job_id.fetch_add(1, Ordering::Relaxed));
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        self.current_job.store(id.get(), Ordering::Release);
        self.sent.store(0, Ordering::Release);
        self.total.store(total, Ordering::Release);
        (id, epoch)
    }

    /// Advance `sent` for the job owning `epoch`; stale workers are ignored
    pub(crate) fn add_sent(&self, epoch: u64, count: u64) {
        if self.current_epoch() == epoch {
            self.sent.fetch_add(count, Ordering::AcqRel);
        }
    }

    pub(crate) fn progress(&self) -> Progress {
        let state = self.state();
        let job_id = match self.current_job.load(Ordering::Acquire) {
            0 => None,
            id => Some(JobId(id)),
        };
        Progress {
            job_id,
            sent: self.sent.load(Ordering::Acquire),
            total: self.total.load(Ordering::Acquire),
            running: state != EngineState::Idle,
            state,
        }
    }

    pub(crate) fn last_report(&self) -> Option<JobReport> {
        self.last_report
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Store a report unless a newer job already stored one
    fn store_report(&self, report: JobReport) {
        let mut slot = self.last_report.lock().unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().is_none_or(|r| r.job_id <= report.job_id) {
            *slot = Some(report);
        }
    }

    /// Release the job slot for `epoch`; returns false when the epoch is stale
    fn finish(&self, epoch: u64) -> bool {
        let mut active = self.lock_active();
        if self.current_epoch() != epoch {
            return false;
        }
        if active.as_ref().is_some_and(|job| job.epoch == epoch) {
            *active = None;
        }
        self.state
            .store(EngineState::Idle as u8, Ordering::Release);
        true
    }

    /// Forced reset after an emergency stop
    ///
    /// Skipped (returns false) when a new job claimed the engine after
    /// `expected_epoch` was observed.
    pub(crate) fn force_reset(&self, expected_epoch: u64) -> bool {
        let mut active = self.lock_active();
        if self.current_epoch() != expected_epoch {
            return false;
        }
        self.epoch.fetch_add(1, Ordering::AcqRel);
        *active = None;
        self.current_job.store(0, Ordering::Release);
        self.sent.store(0, Ordering::Release);
        self.total.store(0, Ordering::Release);
        self.state
            .store(EngineState::Idle as u8, Ordering::Release);
        true
    }
}

/// Everything a worker needs to run one job
pub(crate) struct JobPlan {
    pub(crate) shape: JobShape,
    pub(crate) action: BindAction,
    pub(crate) target: ConnectionTarget,
    pub(crate) source: EntrySource,
    pub(crate) batch_size: usize,
    pub(crate) total: u64,
    /// Logged estimate for range jobs
    pub(crate) estimated_batches: Option<u128>,
}

/// Per-job bookkeeping that finalizes the job on every exit path
///
/// Dropping the guard (normal return, abort or panic) stores the report,
/// releases the job slot and emits `JobFinished`. A guard whose epoch has
/// been superseded by an emergency reset only stores its report.
pub(crate) struct JobGuard {
    engine: Arc<EngineCore>,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
    pub(crate) job_id: JobId,
    pub(crate) epoch: u64,
    shape: JobShape,
    action: BindAction,
    endpoint: String,
    total: u64,
    started_at: DateTime<Utc>,
    max_failures: usize,
    pub(crate) outcome: Option<JobOutcome>,
    pub(crate) sent: u64,
    pub(crate) batches_sent: u64,
    pub(crate) batches_failed: u64,
    failures: Vec<BatchFailure>,
}

impl JobGuard {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        engine: Arc<EngineCore>,
        event_tx: broadcast::Sender<Event>,
        cancel: CancellationToken,
        job_id: JobId,
        epoch: u64,
        plan: &JobPlan,
        max_failures: usize,
    ) -> Self {
        Self {
            engine,
            event_tx,
            cancel,
            job_id,
            epoch,
            shape: plan.shape,
            action: plan.action,
            endpoint: plan.target.endpoint.clone(),
            total: plan.total,
            started_at: Utc::now(),
            max_failures,
            outcome: None,
            sent: 0,
            batches_sent: 0,
            batches_failed: 0,
            failures: Vec::new(),
        }
    }

    fn batch_index(&self) -> u64 {
        self.batches_sent + self.batches_failed
    }

    fn record_failure(&mut self, failure: BatchFailure) {
        self.batches_failed += 1;
        if self.failures.len() < self.max_failures {
            self.failures.push(failure);
        }
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        let outcome = self.outcome.unwrap_or(if self.cancel.is_cancelled() {
            JobOutcome::Cancelled
        } else {
            JobOutcome::Failed
        });

        self.engine.store_report(JobReport {
            job_id: self.job_id,
            shape: self.shape,
            action: self.action,
            endpoint: std::mem::take(&mut self.endpoint),
            outcome,
            sent: self.sent,
            total: self.total,
            batches_sent: self.batches_sent,
            batches_failed: self.batches_failed,
            failures: std::mem::take(&mut self.failures),
            started_at: self.started_at,
            finished_at: Utc::now(),
        });

        if !self.engine.finish(self.epoch) {
            tracing::debug!(
                job_id = %self.job_id,
                epoch = self.epoch,
                "discarding cleanup from superseded job"
            );
            return;
        }

        match outcome {
            JobOutcome::Completed => {
                tracing::info!(job_id = %self.job_id, sent = self.sent, "job completed")
            }
            JobOutcome::Cancelled => {
                tracing::warn!(job_id = %self.job_id, sent = self.sent, "job cancelled")
            }
            JobOutcome::Failed => {
                tracing::error!(job_id = %self.job_id, sent = self.sent, "job worker failed")
            }
        }

        self.event_tx
            .send(Event::JobFinished {
                job_id: self.job_id,
                outcome,
                sent: self.sent,
            })
            .ok();
    }
}

impl Dispatcher {
    /// Worker body: drain the source in batches until exhaustion or cancellation
    pub(crate) async fn run_job(
        self,
        mut plan: JobPlan,
        cancel: CancellationToken,
        mut guard: JobGuard,
    ) {
        match plan.estimated_batches {
            Some(estimate) => tracing::info!(
                job_id = %guard.job_id,
                batch_size = plan.batch_size,
                estimated_batches = %estimate,
                "batching started"
            ),
            None => tracing::info!(
                job_id = %guard.job_id,
                batch_size = plan.batch_size,
                total = plan.total,
                "batching started"
            ),
        }

        let outcome = self.drive(&mut plan, &cancel, &mut guard).await;
        guard.outcome = Some(outcome);
    }

    async fn drive(
        &self,
        plan: &mut JobPlan,
        cancel: &CancellationToken,
        guard: &mut JobGuard,
    ) -> JobOutcome {
        let mut batch: Vec<Entry> = Vec::with_capacity(plan.batch_size);

        loop {
            if cancel.is_cancelled() {
                tracing::warn!(job_id = %guard.job_id, "stop detected, abandoning unsent entries");
                return JobOutcome::Cancelled;
            }
            let Some(entry) = plan.source.next() else {
                break;
            };
            batch.push(entry);
            if batch.len() < plan.batch_size {
                continue;
            }

            if cancel.is_cancelled() {
                tracing::warn!(job_id = %guard.job_id, "stop detected before network call");
                return JobOutcome::Cancelled;
            }
            self.send_batch(plan, &mut batch, guard).await;
            self.pause_after_batch(plan, cancel, guard).await;
        }

        if !batch.is_empty() {
            if cancel.is_cancelled() {
                tracing::warn!(job_id = %guard.job_id, "stop detected before final batch");
                return JobOutcome::Cancelled;
            }
            self.send_batch(plan, &mut batch, guard).await;
        }

        JobOutcome::Completed
    }

    /// Encode and send the buffered batch once, then account for it
    async fn send_batch(&self, plan: &JobPlan, batch: &mut Vec<Entry>, guard: &mut JobGuard) {
        let entries = std::mem::replace(batch, Vec::with_capacity(plan.batch_size));
        let size = entries.len();
        let batch_index = guard.batch_index();
        let document = protocol::encode(&UidMessage::Bindings {
            action: plan.action,
            entries,
        });

        tracing::debug!(job_id = %guard.job_id, batch_index, size, "sending batch");
        let result = self.transport.send(&document, &plan.target).await;

        // Counted whether or not delivery succeeded: the call has returned.
        guard.sent += size as u64;
        self.engine.add_sent(guard.epoch, size as u64);

        match result {
            Ok(_) => {
                guard.batches_sent += 1;
                self.emit_event(Event::BatchSent {
                    job_id: guard.job_id,
                    batch_index,
                    size,
                    sent: guard.sent,
                });
            }
            Err(e) => {
                tracing::warn!(
                    job_id = %guard.job_id,
                    batch_index,
                    size,
                    error = %e,
                    "batch delivery failed, continuing with next batch"
                );
                guard.record_failure(BatchFailure {
                    batch_index,
                    size,
                    error: e.to_string(),
                });
                self.emit_event(Event::BatchFailed {
                    job_id: guard.job_id,
                    batch_index,
                    size,
                    error: e.to_string(),
                });
            }
        }

        let every = self.config.dispatch.progress_log_every.max(1);
        if (batch_index + 1) % every == 0 {
            match plan.estimated_batches {
                Some(estimate) => tracing::info!(
                    job_id = %guard.job_id,
                    "processed {}/{} batches",
                    batch_index + 1,
                    estimate
                ),
                None => tracing::info!(
                    job_id = %guard.job_id,
                    "sent {} of {} entries",
                    guard.sent,
                    plan.total
                ),
            }
        }
    }

    /// Short pause after every batch; count jobs take the long pause at each rate-limit boundary
    async fn pause_after_batch(&self, plan: &JobPlan, cancel: &CancellationToken, guard: &JobGuard) {
        let dispatch = &self.config.dispatch;
        let pause = if plan.shape == JobShape::Count
            && guard.sent > 0
            && guard.sent % dispatch.rate_limit_every == 0
        {
            tracing::info!(job_id = %guard.job_id, sent = guard.sent, "rate limit pause");
            dispatch.rate_limit_pause
        } else {
            dispatch.batch_pause
        };

        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(pause) => {}
        }
    }
}
