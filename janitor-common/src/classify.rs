use chrono::{DateTime, Utc};

use crate::ecs::TaskInfo;
use crate::query::ClusterQuery;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Why a task is, or is not, a cleanup candidate.
pub enum Classification {
    /// An exclude filter occurs in the task family. Takes precedence over everything else.
    Excluded,
    /// The task prefix does not occur in the task family.
    PrefixMismatch,
    /// The task has no start time yet.
    StillStarting,
    Candidate { started_at: DateTime<Utc> },
}

/// Classify `task` against the name filters of `query`.
pub fn classify(task: &TaskInfo, query: &ClusterQuery) -> Classification {
    if query.is_excluded(&task.family) {
        return Classification::Excluded;
    }

    if !task.family.contains(query.task_prefix.as_str()) {
        return Classification::PrefixMismatch;
    }

    match task.started_at {
        Some(started_at) => Classification::Candidate { started_at },
        None => Classification::StillStarting,
    }
}

pub fn is_candidate(task: &TaskInfo, query: &ClusterQuery) -> bool {
    matches!(classify(task, query), Classification::Candidate { .. })
}

/// Whole hours elapsed between `started_at` and `now`, floored.
/// Negative when the start time lies in the future.
pub fn running_hours(started_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - started_at).num_seconds().div_euclid(3600)
}

/// Strictly greater than: a task at exactly `max_age_hours` survives.
pub fn is_over_age(running_hours: i64, max_age_hours: u32) -> bool {
    running_hours > i64::from(max_age_hours)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn task(family: &str, started_at: Option<DateTime<Utc>>) -> TaskInfo {
        TaskInfo {
            arn: format!("arn:aws:ecs:us-east-1:123456789012:task/{}", family),
            family: family.to_owned(),
            started_at,
        }
    }

    fn query(prefix: &str, excludes: &[&str]) -> ClusterQuery {
        ClusterQuery::builder(prefix)
            .exclude_filters(excludes.iter().copied())
            .build()
            .unwrap()
    }

    fn started() -> Option<DateTime<Utc>> {
        Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }

    #[test]
    fn test_exclusion_dominates_prefix_match() {
        let q = query("web-prod", &["prod"]);

        assert_eq!(classify(&task("web-prod", started()), &q), Classification::Excluded);
        assert!(!is_candidate(&task("web-prod", started()), &q));
    }

    #[test]
    fn test_exclusion_applies_without_start_time() {
        let q = query("web", &["staging"]);

        assert_eq!(classify(&task("web-staging", None), &q), Classification::Excluded);
    }

    #[test]
    fn test_empty_exclude_filter_excludes_every_family() {
        let q = query("web", &[""]);

        assert_eq!(classify(&task("web-prod", started()), &q), Classification::Excluded);
        assert!(!is_candidate(&task("web-prod", started()), &q));
        assert_eq!(classify(&task("", started()), &q), Classification::Excluded);
    }

    #[test]
    fn test_prefix_is_substring_containment() {
        let q = query("prod", &[]);

        assert!(is_candidate(&task("family:web-prod-api", started()), &q));
        assert_eq!(
            classify(&task("family:web-staging", started()), &q),
            Classification::PrefixMismatch
        );
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        let q = query("Web", &["STAGING"]);

        assert_eq!(classify(&task("web-prod", started()), &q), Classification::PrefixMismatch);
        assert!(is_candidate(&task("Web-staging", started()), &q));
    }

    #[test]
    fn test_missing_start_time_is_never_a_candidate() {
        let q = query("web", &[]);

        assert_eq!(classify(&task("web", None), &q), Classification::StillStarting);
        assert!(!is_candidate(&task("web", None), &q));
    }

    #[test]
    fn test_running_hours_floor_and_strict_boundary() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();

        let over = now - Duration::hours(48) - Duration::minutes(1);
        let under = now - Duration::hours(47) - Duration::minutes(59);

        // 48h01m floors to 48, which is not strictly greater than 48.
        assert_eq!(running_hours(over, now), 48);
        assert!(!is_over_age(running_hours(over, now), 48));
        assert_eq!(running_hours(under, now), 47);
        assert!(!is_over_age(running_hours(under, now), 48));

        let well_over = now - Duration::hours(49);
        assert!(is_over_age(running_hours(well_over, now), 48));
    }

    #[test]
    fn test_future_start_time_is_never_over_age() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        let started_at = now + Duration::minutes(30);

        assert_eq!(running_hours(started_at, now), -1);
        assert!(!is_over_age(running_hours(started_at, now), 0));
    }
}
