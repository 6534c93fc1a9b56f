//! Job registry — start, stop, emergency stop, progress.

use crate::error::{Error, Result};
use crate::source::{CountSource, EntrySource, Network, RangeSource};
use crate::transport::ConnectionTarget;
use crate::types::{CountJobSpec, Event, JobId, JobReport, JobShape, Progress, RangeJobSpec};
use tokio_util::sync::CancellationToken;

use super::Dispatcher;
use super::engine::{ActiveJob, JobGuard, JobPlan};

impl Dispatcher {
    /// Start a range-driven job over every usable host of `spec.subnet`
    ///
    /// Input is validated before the engine is claimed. Rejected with
    /// [`Error::AlreadyRunning`] while another job holds the engine; requests
    /// are never queued.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use uid_bridge::*;
    /// # async fn example(dispatcher: Dispatcher) -> Result<()> {
    /// let job_id = dispatcher
    ///     .start_range_job(RangeJobSpec {
    ///         subnet: "10.0.0.0/24".into(),
    ///         user_prefix: "corp\\host".into(),
    ///         timeout: 3600,
    ///         batch_size: Some(100),
    ///         endpoint: None,
    ///         cert_bundle: None,
    ///         operation: BindAction::Login,
    ///     })
    ///     .await?;
    /// println!("started job {job_id}");
    /// # Ok(())
    /// # }
    /// ```
    pub async fn start_range_job(&self, spec: RangeJobSpec) -> Result<JobId> {
        let network: Network = spec.subnet.parse()?;
        let batch_size = spec
            .batch_size
            .unwrap_or(self.config.dispatch.default_batch_size);
        if batch_size == 0 {
            return Err(Error::Validation("batch_size must be at least 1".into()));
        }
        let target = self.resolve_target(spec.endpoint, spec.cert_bundle)?;

        let source = RangeSource::new(network, spec.user_prefix, spec.timeout);
        let estimated_batches = source.estimated_batches(batch_size);
        tracing::info!(
            subnet = %network,
            addresses = %network.address_count(),
            operation = %spec.operation,
            endpoint = %target.endpoint,
            "starting mass mapping"
        );

        self.launch(JobPlan {
            shape: JobShape::Range,
            action: spec.operation,
            target,
            source: EntrySource::Range(source),
            batch_size,
            // Range jobs report an unknown total
            total: 0,
            estimated_batches: Some(estimated_batches),
        })
    }

    /// Start a count-driven job of `spec.count` consecutive addresses
    ///
    /// The batch size is fixed by `dispatch.count_batch_size`.
    pub async fn start_count_job(&self, spec: CountJobSpec) -> Result<JobId> {
        let base = spec
            .base_ip
            .trim()
            .parse()
            .map_err(|_| Error::Validation(format!("invalid base_ip {:?}", spec.base_ip)))?;
        let source = CountSource::new(base, spec.count, spec.user_prefix, spec.timeout)?;
        let target = self.resolve_target(spec.endpoint, spec.cert_bundle)?;

        tracing::info!(
            count = spec.count,
            base_ip = %base,
            operation = %spec.operation,
            endpoint = %target.endpoint,
            "starting bulk mapping"
        );

        self.launch(JobPlan {
            shape: JobShape::Count,
            action: spec.operation,
            target,
            source: EntrySource::Count(source),
            batch_size: self.config.dispatch.count_batch_size,
            total: spec.count,
            estimated_batches: None,
        })
    }

    /// Claim the engine and spawn the worker, as one step under the slot lock
    fn launch(&self, plan: JobPlan) -> Result<JobId> {
        let mut active = self.engine.lock_active();

        if !self.engine.try_claim() {
            let job_id = active
                .as_ref()
                .map(|job| job.id)
                .or(self.engine.progress().job_id)
                .unwrap_or(JobId(0));
            tracing::warn!(job_id = %job_id, "job rejected: another job is running");
            return Err(Error::AlreadyRunning { job_id });
        }

        let (job_id, epoch) = self.engine.begin_job(plan.total);
        let cancel = CancellationToken::new();
        let guard = JobGuard::new(
            self.engine.clone(),
            self.event_tx.clone(),
            cancel.clone(),
            job_id,
            epoch,
            &plan,
            self.config.dispatch.max_recorded_failures,
        );

        self.emit_event(Event::JobStarted {
            job_id,
            shape: plan.shape,
            action: plan.action,
            total: plan.total,
        });

        let handle = tokio::spawn(self.clone().run_job(plan, cancel.clone(), guard));
        *active = Some(ActiveJob {
            id: job_id,
            epoch,
            cancel,
            handle: Some(handle),
        });

        Ok(job_id)
    }

    /// Current progress, read without locking
    ///
    /// `sent` may be momentarily stale while a batch is in flight but is never torn.
    pub fn get_progress(&self) -> Progress {
        self.engine.progress()
    }

    /// Report of the most recently finished job
    pub fn last_report(&self) -> Option<JobReport> {
        self.engine.last_report()
    }

    /// Request cooperative termination of the running job
    ///
    /// Idempotent; succeeds when idle. An in-flight batch is allowed to finish
    /// and is counted. Returns the job that was signalled, if any.
    pub fn stop(&self) -> Option<JobId> {
        let active = self.engine.lock_active();
        let job = active.as_ref()?;

        self.engine.mark_stopping();
        job.cancel.cancel();
        tracing::warn!(job_id = %job.id, "stop signal sent, cancelling active job");
        Some(job.id)
    }

    /// Stop the running job and force the engine back to idle
    ///
    /// Cancels the job, waits up to `dispatch.emergency_grace` for the worker
    /// to unwind, aborts it if it has not, then clears the counters, the job
    /// slot and the state regardless of the outcome. Any late writes from the
    /// old worker are discarded.
    pub async fn emergency_stop(&self) -> Option<JobId> {
        let (expected_epoch, job_id, handle) = {
            let mut active = self.engine.lock_active();
            let epoch = self.engine.current_epoch();
            match active.as_mut() {
                Some(job) => {
                    self.engine.mark_stopping();
                    job.cancel.cancel();
                    (epoch, Some(job.id), job.handle.take())
                }
                None => (epoch, None, None),
            }
        };

        if let Some(mut handle) = handle {
            tracing::warn!(job_id = ?job_id, "force cancelling active job");
            let grace = self.config.dispatch.emergency_grace;
            if tokio::time::timeout(grace, &mut handle).await.is_err() {
                tracing::warn!(
                    job_id = ?job_id,
                    grace_ms = grace.as_millis() as u64,
                    "worker did not unwind within grace period, aborting"
                );
                handle.abort();
            }
        }

        if self.engine.force_reset(expected_epoch) {
            tracing::warn!("EMERGENCY STOP: all operations halted, state reset");
        } else {
            tracing::info!("a new job started during emergency stop; leaving it running");
        }
        self.emit_event(Event::EmergencyStop { job_id });
        job_id
    }

    /// Stop any running job and wait for the engine to go idle
    ///
    /// Falls back to [`emergency_stop`](Self::emergency_stop) when the worker
    /// does not unwind within the grace period.
    pub async fn shutdown(&self) {
        let Some(job_id) = self.stop() else {
            return;
        };

        let grace = self.config.dispatch.emergency_grace;
        let deadline = tokio::time::Instant::now() + grace;
        while self.get_progress().running {
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(job_id = %job_id, "job still running at shutdown, forcing reset");
                self.emergency_stop().await;
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        tracing::info!(job_id = %job_id, "job stopped for shutdown");
    }

    /// Build the connection target for a request, defaulting to the stored endpoint
    pub(crate) fn resolve_target(
        &self,
        endpoint: Option<String>,
        cert_bundle: Option<String>,
    ) -> Result<ConnectionTarget> {
        let endpoint = match endpoint.filter(|e| !e.trim().is_empty()) {
            Some(endpoint) => endpoint.trim().to_string(),
            None => self.agent_endpoint(),
        };
        let cert_bundle = cert_bundle
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| self.config.agent.cert_bundle.clone());

        let target = ConnectionTarget::new(endpoint, cert_bundle);
        target.parse_endpoint()?;
        Ok(target)
    }
}
