use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{debug, error, info, info_span, warn, Dispatch, Instrument};

use crate::classify::{classify, is_over_age, running_hours, Classification};
use crate::ecs::{EcsClient, TaskInfo, DESCRIBE_BATCH_SIZE};
use crate::enumerate::Enumerator;
use crate::notify::{Notifier, Termination};
use crate::query::{ClusterQuery, SweepMode};
use crate::retry::RetryPolicy;

/// The reason recorded on every task the janitor stops.
pub const STOP_REASON: &str = "Killing task due to old age";

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// What should happen to a task, decided from its description alone.
pub enum Decision {
    Excluded,
    PrefixMismatch,
    StillStarting,
    UnderAge { running_hours: i64 },
    Terminate { running_hours: i64 },
}

/// Decide the fate of `task` at instant `now`. Pure.
pub fn decide(task: &TaskInfo, query: &ClusterQuery, now: DateTime<Utc>) -> Decision {
    match classify(task, query) {
        Classification::Excluded => Decision::Excluded,
        Classification::PrefixMismatch => Decision::PrefixMismatch,
        Classification::StillStarting => Decision::StillStarting,
        Classification::Candidate { started_at } => {
            let running_hours = running_hours(started_at, now);
            if is_over_age(running_hours, query.max_age_hours) {
                Decision::Terminate { running_hours }
            } else {
                Decision::UnderAge { running_hours }
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// The terminal state a task reached during one sweep.
pub enum Disposition {
    Excluded,
    PrefixMismatch,
    StillStarting,
    UnderAge { running_hours: i64 },
    Terminated { running_hours: i64 },
    DryRunFlagged { running_hours: i64 },
    StopFailed { running_hours: i64, error: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskOutcome {
    pub arn: String,
    pub family: String,
    pub disposition: Disposition,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub outcomes: Vec<TaskOutcome>,
    /// The sweep stopped early because its cancellation token was raised.
    pub cancelled: bool,
}

impl SweepSummary {
    fn count(&self, predicate: impl Fn(&Disposition) -> bool) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| predicate(&outcome.disposition))
            .count()
    }

    /// Tasks actually stopped.
    pub fn terminated(&self) -> usize {
        self.count(|d| matches!(d, Disposition::Terminated { .. }))
    }

    /// Tasks that would have been stopped outside of dry run.
    pub fn flagged(&self) -> usize {
        self.count(|d| matches!(d, Disposition::DryRunFlagged { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|d| matches!(d, Disposition::StopFailed { .. }))
    }

    pub fn examined(&self) -> usize {
        self.outcomes.len()
    }

    pub fn terminated_arns(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome.disposition, Disposition::Terminated { .. }))
            .map(|outcome| outcome.arn.as_str())
            .collect()
    }
}

/// The cleanup engine. Holds no state between sweeps.
pub struct Cleaner {
    client: Arc<dyn EcsClient>,
    notifier: Arc<dyn Notifier>,
    retry: RetryPolicy,
    describe_concurrency: usize,
    clock: Clock,
    dispatch: Option<Dispatch>,
}

impl Cleaner {
    pub fn new(client: Arc<dyn EcsClient>, notifier: Arc<dyn Notifier>) -> Self {
        Cleaner {
            client,
            notifier,
            retry: RetryPolicy::never(),
            describe_concurrency: 1,
            clock: Arc::new(Utc::now),
            dispatch: None,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// How many DescribeTasks batches may be in flight at once.
    pub fn with_describe_concurrency(mut self, concurrency: usize) -> Self {
        self.describe_concurrency = concurrency.max(1);
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Route every event the sweep emits to `dispatch` instead of the global default.
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    /// Run one complete sweep over the cluster named by `query`.
    ///
    /// Once `cancel` is raised no further API calls are issued and the summary
    /// of the work done so far is returned.
    pub async fn sweep(&self, query: &ClusterQuery, cancel: &CancellationToken) -> SweepSummary {
        let span = || {
            info_span!(
                "sweep",
                cluster = query.cluster().unwrap_or("default"),
                prefix = %query.task_prefix,
                dry_run = query.dry_run
            )
        };

        match &self.dispatch {
            // The span has to be registered with the injected subscriber too.
            Some(dispatch) => {
                let span = tracing::dispatcher::with_default(dispatch, span);
                self.run(query, cancel)
                    .instrument(span)
                    .with_subscriber(dispatch.clone())
                    .await
            }
            None => self.run(query, cancel).instrument(span()).await,
        }
    }

    async fn run(&self, query: &ClusterQuery, cancel: &CancellationToken) -> SweepSummary {
        info!(
            "Looking for tasks matching {} in the {} cluster",
            query.task_prefix,
            query.cluster().unwrap_or("default")
        );
        info!(
            "Any tasks older than {} hours will be terminated",
            query.max_age_hours
        );

        let enumerator = Enumerator::new(self.client.as_ref(), &self.retry, cancel);
        let mut summary = SweepSummary::default();

        match query.mode {
            SweepMode::Cluster => {
                let listing = enumerator.list_running_tasks(query.cluster(), None).await;
                info!(
                    complete = listing.complete,
                    "Found {} running tasks in the cluster",
                    listing.items.len()
                );
                self.process_arns(&enumerator, query, &listing.items, cancel, &mut summary)
                    .await;
            }
            SweepMode::Family => {
                let families = enumerator.list_active_families(&query.task_prefix).await;
                info!(
                    complete = families.complete,
                    "Found {} active task definition families",
                    families.items.len()
                );

                for family in &families.items {
                    if cancel.is_cancelled() {
                        break;
                    }
                    if query.is_excluded(family) {
                        debug!(family = %family, "Excluding task definition family matching an exclude filter");
                        continue;
                    }

                    info!(family = %family, "Finding all running tasks for this task definition family");
                    let listing = enumerator
                        .list_running_tasks(query.cluster(), Some(family))
                        .await;
                    self.process_arns(&enumerator, query, &listing.items, cancel, &mut summary)
                        .await;
                }
            }
        }

        summary.cancelled = cancel.is_cancelled();
        if summary.cancelled {
            warn!(
                examined = summary.examined(),
                terminated = summary.terminated(),
                "Sweep cancelled before it completed"
            );
        } else {
            info!(
                examined = summary.examined(),
                terminated = summary.terminated(),
                flagged = summary.flagged(),
                failed = summary.failed(),
                "Sweep finished"
            );
        }

        summary
    }

    async fn process_arns(
        &self,
        enumerator: &Enumerator<'_>,
        query: &ClusterQuery,
        arns: &[String],
        cancel: &CancellationToken,
        summary: &mut SweepSummary,
    ) {
        let cluster = query.cluster();
        let batches = stream::iter(arns.chunks(DESCRIBE_BATCH_SIZE))
            .map(|batch| enumerator.describe_batch(cluster, batch))
            .buffered(self.describe_concurrency);
        let mut batches = std::pin::pin!(batches);

        while let Some(described) = batches.next().await {
            let Some(tasks) = described else {
                continue;
            };

            for task in tasks {
                if cancel.is_cancelled() {
                    return;
                }
                let outcome = self.process_task(query, task).await;
                summary.outcomes.push(outcome);
            }
        }
    }

    async fn process_task(&self, query: &ClusterQuery, task: TaskInfo) -> TaskOutcome {
        debug!(task_arn = %task.arn, family = %task.family, "Processing task");

        let disposition = match decide(&task, query, (self.clock)()) {
            Decision::Excluded => {
                debug!(family = %task.family, "Excluding: the task family is in the exclude list");
                Disposition::Excluded
            }
            Decision::PrefixMismatch => {
                debug!(family = %task.family, "Skipping: the task family doesn't match the given prefix");
                Disposition::PrefixMismatch
            }
            Decision::StillStarting => {
                warn!(task_arn = %task.arn, "No startedAt time, ignoring for now");
                Disposition::StillStarting
            }
            Decision::UnderAge { running_hours } => {
                debug!(task_arn = %task.arn, running_hours, "Task is within its maximum age");
                Disposition::UnderAge { running_hours }
            }
            Decision::Terminate { running_hours } => {
                self.terminate(query, &task, running_hours).await
            }
        };

        TaskOutcome {
            arn: task.arn,
            family: task.family,
            disposition,
        }
    }

    async fn terminate(&self, query: &ClusterQuery, task: &TaskInfo, running_hours: i64) -> Disposition {
        info!(
            task_arn = %task.arn,
            running_hours,
            "*** Terminating task due to old age (> {} hours)",
            query.max_age_hours
        );

        if query.dry_run {
            warn!(task_arn = %task.arn, "*** Dry run selected, task will not be stopped");
            return Disposition::DryRunFlagged { running_hours };
        }

        if let Err(e) = self
            .client
            .stop_task(query.cluster(), &task.arn, STOP_REASON)
            .await
        {
            error!(task_arn = %task.arn, "Failed to stop task: {}", e);
            return Disposition::StopFailed {
                running_hours,
                error: e.to_string(),
            };
        }

        if !query.notify_targets.is_empty() {
            let termination = Termination {
                cluster: query.cluster_name.clone(),
                task_arn: task.arn.clone(),
                family: task.family.clone(),
                running_hours,
                max_age_hours: query.max_age_hours,
            };
            if let Err(e) = self
                .notifier
                .notify(&query.notify_targets, &termination)
                .await
            {
                warn!(task_arn = %task.arn, "Failed to send termination notification: {}", e);
            }
        }

        Disposition::Terminated { running_hours }
    }
}
