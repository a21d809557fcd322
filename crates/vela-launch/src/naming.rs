//! Staging artifact names.
//!
//! Every launch stages two objects under the staging location: the
//! serialized model and the worker payload. Names combine a process-wide
//! counter with the wall-clock time in nanoseconds, so launches running
//! concurrently in one process never collide.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};

use chrono::Utc;
use serde::Serialize;

use vela_core::join_uri;

/// Remote locations for one launch's staged artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StagingPlan {
    /// Counter value this plan was built from.
    pub id: u64,
    /// Wall-clock nanoseconds this plan was built at.
    pub timestamp_nanos: i64,
    /// Where the serialized model is staged.
    pub model_location: String,
    /// Where the worker payload is staged.
    pub worker_location: String,
}

static PROCESS_NAMER: LazyLock<Arc<ArtifactNamer>> =
    LazyLock::new(|| Arc::new(ArtifactNamer::new()));

/// Hands out collision-free [`StagingPlan`]s.
///
/// Orchestrators use [`ArtifactNamer::shared`] unless given another namer.
/// The counter is only ever touched through a single atomic increment.
#[derive(Debug, Default)]
pub struct ArtifactNamer {
    counter: AtomicU64,
}

impl ArtifactNamer {
    /// Creates a namer starting at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    /// The namer shared by every orchestrator in the process.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::clone(&PROCESS_NAMER)
    }

    /// Increments the counter and returns the new value.
    pub fn next_id(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Builds the next staging plan under `staging_location`.
    ///
    /// Never blocks and never fails.
    pub fn next_staging_plan(&self, staging_location: &str) -> StagingPlan {
        let id = self.next_id();
        let timestamp_nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();

        StagingPlan {
            id,
            timestamp_nanos,
            model_location: join_uri(staging_location, &format!("model-{id}-{timestamp_nanos}")),
            worker_location: join_uri(
                staging_location,
                &format!("worker-{id}-{timestamp_nanos}"),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn plan_locations_follow_naming_scheme() {
        let namer = ArtifactNamer::new();
        let plan = namer.next_staging_plan("gs://bucket/staging/");

        assert_eq!(plan.id, 1);
        assert_eq!(
            plan.model_location,
            format!("gs://bucket/staging/model-1-{}", plan.timestamp_nanos)
        );
        assert_eq!(
            plan.worker_location,
            format!("gs://bucket/staging/worker-1-{}", plan.timestamp_nanos)
        );
    }

    #[test]
    fn ids_increase() {
        let namer = ArtifactNamer::new();
        assert_eq!(namer.next_id(), 1);
        assert_eq!(namer.next_id(), 2);
        assert_eq!(namer.next_staging_plan("gs://b").id, 3);
    }

    #[test]
    fn shared_namer_is_one_instance() {
        let a = ArtifactNamer::shared();
        let b = ArtifactNamer::shared();
        assert!(Arc::ptr_eq(&a, &b));

        let first = a.next_id();
        assert!(b.next_id() > first);
    }

    #[test]
    fn concurrent_plans_are_distinct() {
        let namer = Arc::new(ArtifactNamer::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let namer = Arc::clone(&namer);
                std::thread::spawn(move || {
                    (0..250)
                        .map(|_| namer.next_staging_plan("gs://bucket/staging"))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut names = HashSet::new();
        for handle in handles {
            for plan in handle.join().unwrap() {
                assert!(names.insert(plan.model_location));
                assert!(names.insert(plan.worker_location));
            }
        }
        assert_eq!(names.len(), 8 * 250 * 2);
    }
}
