//! Resolves the cluster hosting the current process from the ECS task metadata endpoint.

use std::time::Duration;

use serde_derive::Deserialize;

pub const METADATA_URI_ENV: &str = "ECS_CONTAINER_METADATA_URI_V4";

#[derive(Deserialize)]
struct TaskMetadata {
    #[serde(rename = "Cluster")]
    cluster: String,
}

/// `explicit` when given, otherwise the cluster this process runs in.
/// `None` leaves the choice to the API, which falls back to its default cluster.
pub async fn resolve_cluster(explicit: Option<String>) -> Option<String> {
    if let Some(cluster) = explicit.filter(|name| !name.is_empty()) {
        return Some(cluster);
    }

    let metadata_uri = match std::env::var(METADATA_URI_ENV) {
        Ok(uri) => uri,
        Err(_) => {
            tracing::debug!("no cluster given and no task metadata endpoint, using the default cluster");
            return None;
        }
    };

    match current_cluster(&metadata_uri).await {
        Ok(cluster) => {
            tracing::info!(cluster = %cluster, "no cluster given, using the cluster this task runs in");
            Some(cluster)
        }
        Err(e) => {
            tracing::warn!("failed to read task metadata, using the default cluster: {}", e);
            None
        }
    }
}

pub async fn current_cluster(metadata_uri: &str) -> Result<String, reqwest::Error> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()?;

    let metadata: TaskMetadata = client
        .get(format!("{}/task", metadata_uri.trim_end_matches('/')))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    Ok(metadata.cluster)
}
