use eyre::{eyre, Result};
use janitor_common::query::{ClusterQuery, SweepMode, DEFAULT_MAX_AGE_HOURS};
use janitor_common::sweep::SweepSummary;
use serde_derive::{Deserialize, Serialize};

fn default_max_age() -> u32 {
    DEFAULT_MAX_AGE_HOURS
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
/// The invocation payload, usually sent by a scheduled rule.
pub struct SweepEvent {
    pub cluster_name: Option<String>,
    pub task_name_prefix: Option<String>,
    #[serde(default)]
    pub exclude_filters: Vec<String>,
    #[serde(default = "default_max_age")]
    pub max_age: u32,
    pub region: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub notify: Vec<String>,
    #[serde(default)]
    pub mode: SweepMode,
}

impl SweepEvent {
    pub fn query(&self, cluster_name: Option<String>) -> Result<ClusterQuery> {
        let prefix = self
            .task_name_prefix
            .clone()
            .ok_or_else(|| eyre!("the event has no task_name_prefix"))?;

        let query = ClusterQuery::builder(prefix)
            .cluster_name(cluster_name)
            .exclude_filters(self.exclude_filters.iter().cloned())
            .max_age_hours(self.max_age)
            .dry_run(self.dry_run)
            .notify_targets(self.notify.iter().cloned())
            .mode(self.mode)
            .build()?;

        Ok(query)
    }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
/// What the function returns to its invoker.
pub struct SweepReport {
    pub cluster: Option<String>,
    pub examined: usize,
    pub terminated: usize,
    pub flagged: usize,
    pub failed: usize,
    pub cancelled: bool,
}

impl SweepReport {
    pub fn new(query: &ClusterQuery, summary: &SweepSummary) -> Self {
        SweepReport {
            cluster: query.cluster_name.clone(),
            examined: summary.examined(),
            terminated: summary.terminated(),
            flagged: summary.flagged(),
            failed: summary.failed(),
            cancelled: summary.cancelled,
        }
    }
}
