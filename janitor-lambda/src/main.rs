use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use aws_config::{BehaviorVersion, Region};
use config::Config;
use envconfig::Envconfig;
use event::{SweepEvent, SweepReport};
use janitor_common::aws::AwsEcsClient;
use janitor_common::metadata::resolve_cluster;
use janitor_common::notify::{LogNotifier, Notifier, SlackNotifier};
use janitor_common::sweep::Cleaner;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod event;

/// How long the sweep may run before it has to wind down to meet the invocation deadline.
fn time_until_cancel(deadline_ms: u64, margin: Duration, now: SystemTime) -> Duration {
    let deadline = UNIX_EPOCH + Duration::from_millis(deadline_ms);
    deadline
        .duration_since(now)
        .unwrap_or_default()
        .saturating_sub(margin)
}

fn cancel_before_deadline(
    cancel: &CancellationToken,
    deadline_ms: u64,
    margin: Duration,
) -> tokio::task::JoinHandle<()> {
    let remaining = time_until_cancel(deadline_ms, margin, SystemTime::now());
    let token = cancel.clone();

    tokio::spawn(async move {
        tokio::time::sleep(remaining).await;
        tracing::warn!("invocation deadline is near, cancelling the sweep");
        token.cancel();
    })
}

async fn handle(event: LambdaEvent<SweepEvent>, config: &Config) -> Result<SweepReport, Error> {
    let LambdaEvent { payload, context } = event;
    tracing::debug!(?payload, "Event");

    let cluster_name = resolve_cluster(payload.cluster_name.clone()).await;
    let query = payload.query(cluster_name)?;

    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = &payload.region {
        loader = loader.region(Region::new(region.clone()));
    }
    let sdk_config = loader.load().await;
    let client = AwsEcsClient::new(aws_sdk_ecs::Client::new(&sdk_config));

    let notifier: Arc<dyn Notifier> = match &config.slack_webhook_url {
        Some(url) => Arc::new(SlackNotifier::new(url.clone())?),
        None => Arc::new(LogNotifier),
    };

    let cleaner = Cleaner::new(Arc::new(client), notifier)
        .with_retry_policy(config.retry_policy())
        .with_describe_concurrency(config.describe_concurrency);

    let cancel = CancellationToken::new();
    let deadline = cancel_before_deadline(&cancel, context.deadline, config.deadline_margin());
    let summary = cleaner.sweep(&query, &cancel).await;
    deadline.abort();

    Ok(SweepReport::new(&query, &summary))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::init_from_env()?;

    let filter = Targets::new()
        .with_default(config.level())
        .with_target("aws_config", LevelFilter::WARN)
        .with_target("aws_smithy", LevelFilter::WARN)
        .with_target("hyper", LevelFilter::WARN)
        .with_target("reqwest", LevelFilter::WARN);
    tracing_subscriber::registry()
        .with(fmt::layer().without_time().with_ansi(false).with_target(false))
        .with(filter)
        .init();

    let config = Arc::new(config);
    lambda_runtime::run(service_fn(move |event: LambdaEvent<SweepEvent>| {
        let config = config.clone();
        async move { handle(event, &config).await }
    }))
    .await
}
