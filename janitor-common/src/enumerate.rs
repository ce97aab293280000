use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::ecs::{EcsClient, EcsError, TaskInfo};
use crate::retry::RetryPolicy;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
/// The result of following a paginated listing.
pub struct Listing<T> {
    pub items: Vec<T>,
    /// False when a failed call or a cancellation cut pagination short.
    pub complete: bool,
}

impl<T> Listing<T> {
    fn complete(items: Vec<T>) -> Self {
        Listing {
            items,
            complete: true,
        }
    }

    fn partial(items: Vec<T>) -> Self {
        Listing {
            items,
            complete: false,
        }
    }
}

/// Enumerates running tasks and task definition families through an [`EcsClient`].
///
/// Pagination is an explicit loop over continuation tokens. A failed call halts the
/// chain and yields whatever was accumulated before it.
pub struct Enumerator<'a> {
    client: &'a dyn EcsClient,
    retry: &'a RetryPolicy,
    cancel: &'a CancellationToken,
}

impl<'a> Enumerator<'a> {
    pub fn new(
        client: &'a dyn EcsClient,
        retry: &'a RetryPolicy,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            client,
            retry,
            cancel,
        }
    }

    /// Every running task ARN in `cluster`, optionally restricted to one family,
    /// in the order the API returned them.
    pub async fn list_running_tasks(
        &self,
        cluster: Option<&str>,
        family: Option<&str>,
    ) -> Listing<String> {
        let client = self.client;
        let mut arns = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            if self.cancel.is_cancelled() {
                return Listing::partial(arns);
            }

            let token = next_token.take();
            let page = self
                .call_with_retry("ListTasks", move || {
                    client.list_tasks(cluster, family, token.clone())
                })
                .await;

            match page {
                Ok(page) => {
                    debug!(count = page.items.len(), "received page of task ARNs");
                    arns.extend(page.items);
                    match page.next_token {
                        Some(token) => next_token = Some(token),
                        None => return Listing::complete(arns),
                    }
                }
                Err(e) => {
                    warn!(
                        cluster = cluster.unwrap_or("default"),
                        family = family.unwrap_or_default(),
                        collected = arns.len(),
                        "listing running tasks failed, continuing with a partial list: {}",
                        e
                    );
                    return Listing::partial(arns);
                }
            }
        }
    }

    /// Every active task definition family whose name starts with `family_prefix`.
    pub async fn list_active_families(&self, family_prefix: &str) -> Listing<String> {
        let client = self.client;
        let mut families = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            if self.cancel.is_cancelled() {
                return Listing::partial(families);
            }

            let token = next_token.take();
            let page = self
                .call_with_retry("ListTaskDefinitionFamilies", move || {
                    client.list_task_definition_families(family_prefix, token.clone())
                })
                .await;

            match page {
                Ok(page) => {
                    families.extend(page.items);
                    match page.next_token {
                        Some(token) => next_token = Some(token),
                        None => return Listing::complete(families),
                    }
                }
                Err(e) => {
                    warn!(
                        family_prefix,
                        collected = families.len(),
                        "listing task definition families failed, continuing with a partial list: {}",
                        e
                    );
                    return Listing::partial(families);
                }
            }
        }
    }

    /// Describe one batch of at most 100 task ARNs. `None` when the call failed
    /// or the sweep was cancelled.
    pub async fn describe_batch(
        &self,
        cluster: Option<&str>,
        task_arns: &[String],
    ) -> Option<Vec<TaskInfo>> {
        if self.cancel.is_cancelled() {
            return None;
        }

        let client = self.client;
        match self
            .call_with_retry("DescribeTasks", move || {
                client.describe_tasks(cluster, task_arns)
            })
            .await
        {
            Ok(tasks) => Some(tasks),
            Err(e) => {
                warn!(
                    batch_size = task_arns.len(),
                    "describing tasks failed, skipping batch: {}", e
                );
                None
            }
        }
    }

    async fn call_with_retry<T, F, Fut>(
        &self,
        operation: &'static str,
        mut call: F,
    ) -> Result<T, EcsError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, EcsError>>,
    {
        let mut attempt = 0;

        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if self.retry.should_retry(attempt) => {
                    let backoff = self.retry.time_until_next_retry(attempt);
                    warn!(
                        operation,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "call failed, retrying: {}",
                        e
                    );

                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(e),
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::FakeEcs;

    fn arns(range: std::ops::Range<usize>) -> Vec<String> {
        range.map(|i| format!("arn:task/{}", i)).collect()
    }

    #[tokio::test]
    async fn test_follows_continuation_tokens_in_page_order() {
        let fake = FakeEcs::new().with_task_pages(vec![
            Ok(arns(0..100)),
            Ok(arns(100..200)),
            Ok(arns(200..237)),
        ]);
        let retry = RetryPolicy::never();
        let cancel = CancellationToken::new();

        let listing = Enumerator::new(&fake, &retry, &cancel)
            .list_running_tasks(Some("cluster"), None)
            .await;

        assert!(listing.complete);
        assert_eq!(listing.items.len(), 237);
        assert_eq!(listing.items, arns(0..237));
        assert_eq!(
            fake.list_task_tokens(),
            vec![None, Some("token-1".to_owned()), Some("token-2".to_owned())]
        );
    }

    #[tokio::test]
    async fn test_failed_page_yields_partial_result() {
        let fake = FakeEcs::new().with_task_pages(vec![
            Ok(arns(0..100)),
            Err("throttled"),
            Ok(arns(200..237)),
        ]);
        let retry = RetryPolicy::never();
        let cancel = CancellationToken::new();

        let listing = Enumerator::new(&fake, &retry, &cancel)
            .list_running_tasks(None, None)
            .await;

        assert!(!listing.complete);
        assert_eq!(listing.items, arns(0..100));
        assert_eq!(fake.list_task_tokens().len(), 2);
    }

    #[tokio::test]
    async fn test_retry_policy_recovers_failed_page() {
        let fake = FakeEcs::new().with_task_pages(vec![
            Ok(arns(0..100)),
            Err("throttled"),
            Ok(arns(100..150)),
        ]);
        let retry = RetryPolicy::new(2, Duration::from_millis(1))
            .max_retries(1)
            .provide();
        let cancel = CancellationToken::new();

        let listing = Enumerator::new(&fake, &retry, &cancel)
            .list_running_tasks(None, None)
            .await;

        assert!(listing.complete);
        assert_eq!(listing.items, arns(0..150));
        // The retried call reuses the token of the failed one.
        assert_eq!(
            fake.list_task_tokens(),
            vec![
                None,
                Some("token-1".to_owned()),
                Some("token-1".to_owned())
            ]
        );
    }

    #[tokio::test]
    async fn test_family_listing_keeps_every_page() {
        let fake = FakeEcs::new().with_family_pages(vec![
            Ok(vec!["web-prod".to_owned(), "web-prod-api".to_owned()]),
            Ok(vec!["web-staging".to_owned()]),
        ]);
        let retry = RetryPolicy::never();
        let cancel = CancellationToken::new();

        let listing = Enumerator::new(&fake, &retry, &cancel)
            .list_active_families("web")
            .await;

        assert!(listing.complete);
        assert_eq!(listing.items, vec!["web-prod", "web-prod-api", "web-staging"]);
    }

    #[tokio::test]
    async fn test_failed_family_page_yields_partial_result() {
        let fake = FakeEcs::new().with_family_pages(vec![
            Ok(vec!["web-prod".to_owned(), "web-prod-api".to_owned()]),
            Err("throttled"),
            Ok(vec!["web-staging".to_owned()]),
        ]);
        let retry = RetryPolicy::never();
        let cancel = CancellationToken::new();

        let listing = Enumerator::new(&fake, &retry, &cancel)
            .list_active_families("web")
            .await;

        assert!(!listing.complete);
        assert_eq!(listing.items, vec!["web-prod", "web-prod-api"]);
        assert_eq!(fake.list_family_calls(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_enumeration_issues_no_calls() {
        let fake = FakeEcs::new().with_task_pages(vec![Ok(arns(0..10))]);
        let retry = RetryPolicy::never();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let enumerator = Enumerator::new(&fake, &retry, &cancel);
        let listing = enumerator.list_running_tasks(None, None).await;

        assert!(!listing.complete);
        assert!(listing.items.is_empty());
        assert!(fake.list_task_tokens().is_empty());
        assert!(enumerator.describe_batch(None, &arns(0..10)).await.is_none());
    }
}
