use std::str::FromStr;

use serde_derive::{Deserialize, Serialize};
use thiserror::Error;

/// Hours a task may run before it is stopped, unless configured otherwise.
pub const DEFAULT_MAX_AGE_HOURS: u32 = 48;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum QueryError {
    #[error("task name prefix must not be empty")]
    EmptyPrefix,
    #[error("unknown sweep mode {0:?}, expected \"cluster\" or \"family\"")]
    UnknownMode(String),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// How the running tasks of a cluster are enumerated.
pub enum SweepMode {
    /// List every running task in the cluster once, then filter by name.
    #[default]
    Cluster,
    /// List the active task definition families matching the prefix first,
    /// then list the running tasks of each surviving family.
    Family,
}

impl FromStr for SweepMode {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cluster" => Ok(SweepMode::Cluster),
            "family" => Ok(SweepMode::Family),
            _ => Err(QueryError::UnknownMode(s.to_owned())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// The immutable configuration of one sweep.
pub struct ClusterQuery {
    pub cluster_name: Option<String>,
    /// Matched as a case-sensitive substring of the task family, not as an anchored prefix.
    pub task_prefix: String,
    /// Any of these occurring in the task family vetoes the task.
    pub exclude_filters: Vec<String>,
    pub max_age_hours: u32,
    pub dry_run: bool,
    pub notify_targets: Vec<String>,
    pub mode: SweepMode,
}

impl ClusterQuery {
    pub fn builder(task_prefix: impl Into<String>) -> ClusterQueryBuilder {
        ClusterQueryBuilder::new(task_prefix)
    }

    pub fn cluster(&self) -> Option<&str> {
        self.cluster_name.as_deref()
    }

    /// Whether any exclude filter occurs in `family`.
    pub fn is_excluded(&self, family: &str) -> bool {
        self.exclude_filters
            .iter()
            .any(|filter| family.contains(filter.as_str()))
    }
}

pub struct ClusterQueryBuilder {
    cluster_name: Option<String>,
    task_prefix: String,
    exclude_filters: Vec<String>,
    max_age_hours: u32,
    dry_run: bool,
    notify_targets: Vec<String>,
    mode: SweepMode,
}

impl ClusterQueryBuilder {
    pub fn new(task_prefix: impl Into<String>) -> Self {
        Self {
            cluster_name: None,
            task_prefix: task_prefix.into(),
            exclude_filters: Vec::new(),
            max_age_hours: DEFAULT_MAX_AGE_HOURS,
            dry_run: false,
            notify_targets: Vec::new(),
            mode: SweepMode::default(),
        }
    }

    pub fn cluster_name(mut self, cluster_name: Option<String>) -> Self {
        self.cluster_name = cluster_name;
        self
    }

    pub fn exclude_filters<I, S>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_filters = filters.into_iter().map(Into::into).collect();
        self
    }

    pub fn max_age_hours(mut self, hours: u32) -> Self {
        self.max_age_hours = hours;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn notify_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.notify_targets = targets.into_iter().map(Into::into).collect();
        self
    }

    pub fn mode(mut self, mode: SweepMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn build(self) -> Result<ClusterQuery, QueryError> {
        // An empty prefix would match every task in the cluster.
        if self.task_prefix.is_empty() {
            return Err(QueryError::EmptyPrefix);
        }

        let mut exclude_filters: Vec<String> = Vec::with_capacity(self.exclude_filters.len());
        for filter in self.exclude_filters {
            if !exclude_filters.contains(&filter) {
                exclude_filters.push(filter);
            }
        }

        Ok(ClusterQuery {
            cluster_name: self.cluster_name.filter(|name| !name.is_empty()),
            task_prefix: self.task_prefix,
            exclude_filters,
            max_age_hours: self.max_age_hours,
            dry_run: self.dry_run,
            notify_targets: self.notify_targets,
            mode: self.mode,
        })
    }
}
