use std::sync::Arc;
use std::time::Duration;

use aws_config::{BehaviorVersion, Region};
use clap::Parser;
use config::Args;
use eyre::Result;
use janitor_common::aws::AwsEcsClient;
use janitor_common::metadata::resolve_cluster;
use janitor_common::notify::{LogNotifier, Notifier, SlackNotifier};
use janitor_common::query::ClusterQuery;
use janitor_common::sweep::Cleaner;
use tokio_util::sync::CancellationToken;

mod config;
mod logging;

async fn cleanup_loop(
    cleaner: Cleaner,
    query: ClusterQuery,
    interval_secs: u64,
    cancel: CancellationToken,
) -> Result<()> {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = interval.tick() => {}
        }

        let summary = cleaner.sweep(&query, &cancel).await;
        if summary.cancelled {
            return Ok(());
        }
    }
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, finishing after the current call");
            token.cancel();
        }
    });

    cancel
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logging::init(args.verbose, &args.log_file)?;

    let cluster_name = resolve_cluster(args.cluster_name.clone()).await;
    let query = args.query(cluster_name)?;

    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(args.region.clone()));
    if let Some(profile) = &args.profile {
        loader = loader.profile_name(profile);
    }
    let sdk_config = loader.load().await;
    let client = AwsEcsClient::new(aws_sdk_ecs::Client::new(&sdk_config));

    let notifier: Arc<dyn Notifier> = match &args.slack_webhook_url {
        Some(url) => Arc::new(SlackNotifier::new(url.clone())?),
        None => Arc::new(LogNotifier),
    };

    let cleaner = Cleaner::new(Arc::new(client), notifier)
        .with_retry_policy(args.retry_policy())
        .with_describe_concurrency(args.describe_concurrency as usize);
    let cancel = cancel_on_ctrl_c();

    match args.interval_secs {
        Some(interval_secs) => cleanup_loop(cleaner, query, interval_secs, cancel).await?,
        None => {
            cleaner.sweep(&query, &cancel).await;
        }
    }

    Ok(())
}
