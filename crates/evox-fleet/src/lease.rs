use chrono::{Duration, Utc};
use evox_core::EvoxResult;
use evox_store::EntityStore;
use std::future::Future;
use tracing::warn;

/// Lease guarding the periodic dispatch cycle.
pub const FLEET_CYCLE_LEASE: &str = "fleet_cycle";
/// Lease guarding autoscale passes.
pub const AUTOSCALE_LEASE: &str = "autoscale";
/// Lease guarding standup generation.
pub const STANDUP_LEASE: &str = "standup";

/// Default lease lifetime when callers do not configure one.
pub fn default_lease_ttl() -> Duration {
    Duration::minutes(5)
}

/// Run `job` only if `holder` can take the lease named `name`.
///
/// Returns `Ok(None)` when another holder owns an unexpired lease. The lease
/// is released after `job` finishes, whether it succeeded or not; the job's
/// own error takes precedence over a release failure.
pub async fn run_exclusive<T, F, Fut>(
    store: &dyn EntityStore,
    name: &str,
    holder: &str,
    ttl: Duration,
    job: F,
) -> EvoxResult<Option<T>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = EvoxResult<T>>,
{
    if !store.acquire_lease(name, holder, Utc::now(), ttl).await? {
        warn!(lease = name, holder, "Lease held elsewhere, skipping run");
        return Ok(None);
    }

    let result = job().await;
    let released = store.release_lease(name, holder).await;
    let value = result?;
    if !released? {
        warn!(lease = name, holder, "Lease expired before the run finished");
    }
    Ok(Some(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use evox_core::EvoxError;
    use evox_store::MemoryStore;

    #[tokio::test]
    async fn test_runs_and_releases() {
        let store = MemoryStore::new();
        let out = run_exclusive(&store, "job", "a", default_lease_ttl(), || async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(out, Some(7));
        // Released, so another holder may take it.
        assert!(store
            .acquire_lease("job", "b", Utc::now(), default_lease_ttl())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_skips_when_held_elsewhere() {
        let store = MemoryStore::new();
        store
            .acquire_lease("job", "other", Utc::now(), default_lease_ttl())
            .await
            .unwrap();
        let out = run_exclusive(&store, "job", "me", default_lease_ttl(), || async {
            Ok::<_, EvoxError>(1)
        })
        .await
        .unwrap();
        assert_eq!(out, None);
    }

    #[tokio::test]
    async fn test_releases_on_failure() {
        let store = MemoryStore::new();
        let err = run_exclusive(&store, "job", "a", default_lease_ttl(), || async {
            Err::<(), _>(EvoxError::Integrity("boom".into()))
        })
        .await
        .unwrap_err();
        assert!(err.is_fatal());
        assert!(store
            .acquire_lease("job", "b", Utc::now(), default_lease_ttl())
            .await
            .unwrap());
    }
}
