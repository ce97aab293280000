use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// The maximum number of task ARNs DescribeTasks accepts in one request.
pub const DESCRIBE_BATCH_SIZE: usize = 100;

#[derive(Error, Debug)]
/// Failures surfaced by the orchestration API.
pub enum EcsError {
    #[error("{operation} request failed: {message}")]
    Api {
        operation: &'static str,
        message: String,
    },
}

impl EcsError {
    pub fn api(operation: &'static str, message: impl Into<String>) -> Self {
        EcsError::Api {
            operation,
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// A task as reported by DescribeTasks. Never mutated or persisted by the janitor.
pub struct TaskInfo {
    pub arn: String,
    /// The task group, e.g. `family:web-prod`. All name filters match against this.
    pub family: String,
    /// Absent while the task is still starting up.
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
/// One page of a paginated listing.
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Page {
            items,
            next_token: None,
        }
    }

    pub fn with_token(items: Vec<T>, next_token: impl Into<String>) -> Self {
        Page {
            items,
            next_token: Some(next_token.into()),
        }
    }
}

/// The subset of the container orchestration API the janitor needs.
///
/// A `None` cluster means the API's default cluster.
#[async_trait]
pub trait EcsClient: Send + Sync {
    /// ListTasks, restricted to running tasks and optionally to one task definition family.
    async fn list_tasks(
        &self,
        cluster: Option<&str>,
        family: Option<&str>,
        next_token: Option<String>,
    ) -> Result<Page<String>, EcsError>;

    /// ListTaskDefinitionFamilies with status ACTIVE.
    async fn list_task_definition_families(
        &self,
        family_prefix: &str,
        next_token: Option<String>,
    ) -> Result<Page<String>, EcsError>;

    /// DescribeTasks for at most [`DESCRIBE_BATCH_SIZE`] ARNs.
    async fn describe_tasks(
        &self,
        cluster: Option<&str>,
        task_arns: &[String],
    ) -> Result<Vec<TaskInfo>, EcsError>;

    async fn stop_task(
        &self,
        cluster: Option<&str>,
        task_arn: &str,
        reason: &str,
    ) -> Result<(), EcsError>;
}
