use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use janitor_common::query::{ClusterQuery, QueryError, SweepMode, DEFAULT_MAX_AGE_HOURS};
use janitor_common::retry::RetryPolicy;

/// Stop ECS tasks that have been running for longer than a maximum age.
#[derive(Parser, Debug)]
#[command(name = "ecs-task-janitor", version)]
pub struct Args {
    /// Only tasks whose family contains this text are cleaned up
    #[arg(long = "task-name-prefix")]
    pub task_prefix: String,

    /// Skip any task whose family contains one of these
    #[arg(long = "exclude-filters", num_args = 1..)]
    pub exclude_filters: Vec<String>,

    /// Maximum age in hours; tasks running for longer are stopped
    #[arg(long = "max-age", default_value_t = DEFAULT_MAX_AGE_HOURS)]
    pub max_age: u32,

    /// Cluster to search; defaults to the cluster this process runs in
    #[arg(long = "cluster-name")]
    pub cluster_name: Option<String>,

    /// Chat channels to notify about every stopped task
    #[arg(long = "notify", num_args = 1..)]
    pub notify: Vec<String>,

    /// Webhook that receives notifications; without it notifications are only logged
    #[arg(long = "slack-webhook-url", env = "SLACK_WEBHOOK_URL")]
    pub slack_webhook_url: Option<String>,

    /// The AWS region the cluster is in
    #[arg(long)]
    pub region: String,

    /// The name of an AWS CLI profile to use
    #[arg(long)]
    pub profile: Option<String>,

    /// How to enumerate tasks: "family" lists matching task definition families first,
    /// "cluster" lists every running task in the cluster
    #[arg(long, default_value = "family")]
    pub mode: SweepMode,

    /// Turn on DEBUG logging on the console
    #[arg(long)]
    pub verbose: bool,

    /// Log decisions without stopping any task
    #[arg(long = "dryrun")]
    pub dry_run: bool,

    /// File that receives DEBUG logs, rotated by size
    #[arg(long = "log-file", default_value = "task_cleanup.log")]
    pub log_file: PathBuf,

    /// Keep running and sweep every this many seconds
    #[arg(long = "interval-secs", value_parser = clap::value_parser!(u64).range(1..))]
    pub interval_secs: Option<u64>,

    /// Retries for failed list and describe calls
    #[arg(long = "list-retries", default_value_t = 0)]
    pub list_retries: u32,

    /// DescribeTasks batches in flight at once
    #[arg(long = "describe-concurrency", default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..=16))]
    pub describe_concurrency: u64,
}

impl Args {
    pub fn query(&self, cluster_name: Option<String>) -> Result<ClusterQuery, QueryError> {
        ClusterQuery::builder(self.task_prefix.clone())
            .cluster_name(cluster_name)
            .exclude_filters(self.exclude_filters.iter().cloned())
            .max_age_hours(self.max_age)
            .dry_run(self.dry_run)
            .notify_targets(self.notify.iter().cloned())
            .mode(self.mode)
            .build()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(2, Duration::from_millis(500))
            .maximum_interval(Duration::from_secs(10))
            .max_retries(self.list_retries)
            .provide()
    }
}
