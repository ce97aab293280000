use std::time::Duration;

use envconfig::Envconfig;
use janitor_common::retry::RetryPolicy;
use tracing_subscriber::filter::LevelFilter;

#[derive(Envconfig)]
pub struct Config {
    #[envconfig(from = "LOG_LEVEL", default = "INFO")]
    pub log_level: String,

    #[envconfig(from = "SLACK_WEBHOOK_URL")]
    pub slack_webhook_url: Option<String>,

    #[envconfig(from = "DEADLINE_MARGIN_MS", default = "2000")]
    pub deadline_margin_ms: u64,

    #[envconfig(from = "LIST_RETRIES", default = "0")]
    pub list_retries: u32,

    #[envconfig(from = "DESCRIBE_CONCURRENCY", default = "1")]
    pub describe_concurrency: usize,
}

impl Config {
    /// DEBUG when LOG_LEVEL mentions debug in any case, INFO otherwise.
    pub fn level(&self) -> LevelFilter {
        if self.log_level.to_ascii_lowercase().contains("debug") {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        }
    }

    pub fn deadline_margin(&self) -> Duration {
        Duration::from_millis(self.deadline_margin_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(2, Duration::from_millis(200))
            .maximum_interval(Duration::from_secs(2))
            .max_retries(self.list_retries)
            .provide()
    }
}
