//! [`EcsClient`] backed by the AWS SDK.

use async_trait::async_trait;
use aws_sdk_ecs::error::DisplayErrorContext;
use aws_sdk_ecs::primitives::DateTime as SmithyDateTime;
use aws_sdk_ecs::types::{DesiredStatus, Task, TaskDefinitionFamilyStatus};
use chrono::{DateTime, Utc};

use crate::ecs::{EcsClient, EcsError, Page, TaskInfo, DESCRIBE_BATCH_SIZE};

#[derive(Clone, Debug)]
pub struct AwsEcsClient {
    client: aws_sdk_ecs::Client,
}

impl AwsEcsClient {
    pub fn new(client: aws_sdk_ecs::Client) -> Self {
        Self { client }
    }
}

fn to_utc(timestamp: &SmithyDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(timestamp.secs(), timestamp.subsec_nanos())
}

/// `None` for a described task that carries no ARN; the rest of its batch is kept.
fn task_info(task: &Task) -> Option<TaskInfo> {
    let Some(arn) = task.task_arn() else {
        tracing::warn!(
            group = task.group().unwrap_or_default(),
            "DescribeTasks returned a task without a taskArn, skipping it"
        );
        return None;
    };

    Some(TaskInfo {
        arn: arn.to_owned(),
        family: task.group().unwrap_or_default().to_owned(),
        started_at: task.started_at().and_then(to_utc),
    })
}

#[async_trait]
impl EcsClient for AwsEcsClient {
    async fn list_tasks(
        &self,
        cluster: Option<&str>,
        family: Option<&str>,
        next_token: Option<String>,
    ) -> Result<Page<String>, EcsError> {
        let output = self
            .client
            .list_tasks()
            .set_cluster(cluster.map(str::to_owned))
            .set_family(family.map(str::to_owned))
            .desired_status(DesiredStatus::Running)
            .set_next_token(next_token)
            .send()
            .await
            .map_err(|e| EcsError::api("ListTasks", DisplayErrorContext(e).to_string()))?;

        Ok(Page {
            items: output.task_arns().to_vec(),
            next_token: output.next_token().map(str::to_owned),
        })
    }

    async fn list_task_definition_families(
        &self,
        family_prefix: &str,
        next_token: Option<String>,
    ) -> Result<Page<String>, EcsError> {
        let output = self
            .client
            .list_task_definition_families()
            .family_prefix(family_prefix)
            .status(TaskDefinitionFamilyStatus::Active)
            .set_next_token(next_token)
            .send()
            .await
            .map_err(|e| {
                EcsError::api(
                    "ListTaskDefinitionFamilies",
                    DisplayErrorContext(e).to_string(),
                )
            })?;

        Ok(Page {
            items: output.families().to_vec(),
            next_token: output.next_token().map(str::to_owned),
        })
    }

    async fn describe_tasks(
        &self,
        cluster: Option<&str>,
        task_arns: &[String],
    ) -> Result<Vec<TaskInfo>, EcsError> {
        if task_arns.len() > DESCRIBE_BATCH_SIZE {
            return Err(EcsError::api(
                "DescribeTasks",
                format!(
                    "{} task ARNs requested, the limit is {}",
                    task_arns.len(),
                    DESCRIBE_BATCH_SIZE
                ),
            ));
        }

        let output = self
            .client
            .describe_tasks()
            .set_cluster(cluster.map(str::to_owned))
            .set_tasks(Some(task_arns.to_vec()))
            .send()
            .await
            .map_err(|e| EcsError::api("DescribeTasks", DisplayErrorContext(e).to_string()))?;

        for failure in output.failures() {
            tracing::warn!(
                task_arn = failure.arn().unwrap_or_default(),
                reason = failure.reason().unwrap_or_default(),
                "DescribeTasks could not describe task"
            );
        }

        Ok(output.tasks().iter().filter_map(task_info).collect())
    }

    async fn stop_task(
        &self,
        cluster: Option<&str>,
        task_arn: &str,
        reason: &str,
    ) -> Result<(), EcsError> {
        self.client
            .stop_task()
            .set_cluster(cluster.map(str::to_owned))
            .task(task_arn)
            .reason(reason)
            .send()
            .await
            .map_err(|e| EcsError::api("StopTask", DisplayErrorContext(e).to_string()))?;

        Ok(())
    }
}
