use std::time::Duration;

use async_trait::async_trait;
use serde_derive::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("failed to send notification: {0}")]
    Request(#[from] reqwest::Error),
    #[error("notification to channel {channel} was rejected with status {status}")]
    Rejected { channel: String, status: u16 },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
/// A task the janitor stopped.
pub struct Termination {
    pub cluster: Option<String>,
    pub task_arn: String,
    pub family: String,
    pub running_hours: i64,
    pub max_age_hours: u32,
}

impl Termination {
    pub fn message(&self) -> String {
        format!(
            "Stopped task {} ({}) in cluster {}: running for {} hours, limit is {} hours",
            self.task_arn,
            self.family,
            self.cluster.as_deref().unwrap_or("default"),
            self.running_hours,
            self.max_age_hours
        )
    }
}

/// Tells a set of channels about a termination. Callers log and drop failures.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, channels: &[String], termination: &Termination)
        -> Result<(), NotifyError>;
}

/// Only logs that a notification would have been sent.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        channels: &[String],
        termination: &Termination,
    ) -> Result<(), NotifyError> {
        for channel in channels {
            tracing::debug!(channel = %channel, task_arn = %termination.task_arn, "notification: {}", termination.message());
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookMessage<'a> {
    channel: &'a str,
    text: String,
}

/// Posts one message per channel to a chat webhook.
#[derive(Clone, Debug)]
pub struct SlackNotifier {
    client: reqwest::Client,
    webhook_url: String,
}

impl SlackNotifier {
    pub fn new(webhook_url: impl Into<String>) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
        })
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    /// Every channel is attempted. The first failure is returned.
    async fn notify(
        &self,
        channels: &[String],
        termination: &Termination,
    ) -> Result<(), NotifyError> {
        let mut first_error = None;

        for channel in channels {
            let body = WebhookMessage {
                channel: channel.as_str(),
                text: termination.message(),
            };

            let result = match self.client.post(&self.webhook_url).json(&body).send().await {
                Ok(response) if response.status().is_success() => Ok(()),
                Ok(response) => Err(NotifyError::Rejected {
                    channel: channel.clone(),
                    status: response.status().as_u16(),
                }),
                Err(e) => Err(NotifyError::from(e)),
            };

            if let Err(e) = result {
                tracing::debug!(channel = %channel, "notification failed: {}", e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
