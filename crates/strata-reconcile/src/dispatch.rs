//! Per-resource event serialization.

use std::future::Future;

use strata_core::KeyedLocks;
use tracing::trace;

/// Runs jobs so that at most one job per key is in flight.
///
/// A delete that arrives while an apply for the same resource is running
/// waits for the apply to finish. Jobs for different keys run
/// concurrently.
#[derive(Clone, Default)]
pub struct Dispatcher {
    locks: KeyedLocks,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn run<F, Fut, T>(&self, key: &str, job: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.locks.lock(key).await;
        trace!(key, "dispatching");
        job().await
    }

    /// Keys with a running or waiting job.
    pub fn in_flight(&self) -> usize {
        self.locks.active_keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_jobs_never_overlap() {
        let dispatcher = Dispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let apply = {
            let dispatcher = dispatcher.clone();
            let log = log.clone();
            tokio::spawn(async move {
                dispatcher
                    .run("StrataDeployment/neon/main", || async {
                        log.lock().unwrap().push("apply:start");
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        log.lock().unwrap().push("apply:end");
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        let delete = {
            let dispatcher = dispatcher.clone();
            let log = log.clone();
            tokio::spawn(async move {
                dispatcher
                    .run("StrataDeployment/neon/main", || async {
                        log.lock().unwrap().push("delete");
                    })
                    .await
            })
        };
        apply.await.unwrap();
        delete.await.unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["apply:start", "apply:end", "delete"]
        );
    }

    #[tokio::test]
    async fn different_keys_run_concurrently() {
        let dispatcher = Dispatcher::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let first = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.run("a", || async { rx.await.is_ok() }).await })
        };
        // "b" must complete while "a" is still blocked.
        dispatcher
            .run("b", || async move {
                let _ = tx.send(());
            })
            .await;
        assert!(first.await.unwrap());
    }

    #[tokio::test]
    async fn returns_job_output() {
        let dispatcher = Dispatcher::new();
        let value = dispatcher.run("k", || async { 42 }).await;
        assert_eq!(value, 42);
        assert_eq!(dispatcher.in_flight(), 0);
    }
}
