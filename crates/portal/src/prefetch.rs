//! Cache warming ahead of navigation.
//!
//! Prefetches never surface errors: a failure is dropped (and logged when
//! diagnostics are on) and leaves no error on the entry, so the screen that
//! later reads it fetches again as if nothing happened.

use futures::future::join_all;
use portal_cache::QueryCache;
use portal_core::PortalApi;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::resource::Resource;

/// Warms cache entries for a housing unit.
#[derive(Clone, Debug)]
pub struct Prefetcher {
    cache: QueryCache,
    api: Arc<dyn PortalApi>,
    diagnostics: bool,
}

impl Prefetcher {
    /// Creates a prefetcher filling `cache` from `api`.
    #[must_use]
    pub fn new(cache: QueryCache, api: Arc<dyn PortalApi>) -> Self {
        Self {
            cache,
            api,
            diagnostics: false,
        }
    }

    /// Logs swallowed failures when `diagnostics` is true.
    #[must_use]
    pub const fn with_diagnostics(mut self, diagnostics: bool) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Warms one resource unless it is already fresh.
    pub async fn prefetch(&self, resource: Resource) {
        let query = resource.query(&self.cache.config().windows);
        let fetcher = resource.fetcher(Arc::clone(&self.api));
        if let Err(e) = self.cache.prefetch(&query, fetcher).await {
            if self.diagnostics {
                warn!(resource = %resource, error = %e, "Prefetch failed");
            }
        }
    }

    /// Warms the detail record of a housing unit.
    pub async fn prefetch_primary(&self, pk_logement: i64) {
        self.prefetch(Resource::Logement(pk_logement)).await;
    }

    /// Warms interventions, leaks, anomalies and dysfunctions in parallel.
    pub async fn prefetch_related(&self, pk_logement: i64) {
        join_all(
            Resource::related(pk_logement)
                .into_iter()
                .map(|resource| self.prefetch(resource)),
        )
        .await;
    }

    /// Warms the detail record and the related lists concurrently.
    pub async fn prefetch_complete(&self, pk_logement: i64) {
        futures::join!(
            self.prefetch_primary(pk_logement),
            self.prefetch_related(pk_logement)
        );
    }

    /// Opens a scope for background prefetches.
    #[must_use]
    pub fn scope(&self) -> PrefetchScope {
        PrefetchScope {
            prefetcher: self.clone(),
            tasks: Vec::new(),
        }
    }
}

/// Background prefetches tied to the lifetime of a UI element.
///
/// Each call spawns a task and returns immediately. Dropping the scope or
/// calling [`cancel`](Self::cancel) aborts the tasks still running; a fetch
/// they started is abandoned unless a query joined it meanwhile.
///
/// Spawning panics outside a Tokio runtime.
#[derive(Debug)]
pub struct PrefetchScope {
    prefetcher: Prefetcher,
    tasks: Vec<JoinHandle<()>>,
}

impl PrefetchScope {
    /// Warms the detail record of a housing unit in the background.
    pub fn primary(&mut self, pk_logement: i64) {
        let prefetcher = self.prefetcher.clone();
        self.spawn(async move { prefetcher.prefetch_primary(pk_logement).await });
    }

    /// Warms the related lists of a housing unit in the background.
    pub fn related(&mut self, pk_logement: i64) {
        let prefetcher = self.prefetcher.clone();
        self.spawn(async move { prefetcher.prefetch_related(pk_logement).await });
    }

    /// Warms everything about a housing unit in the background.
    pub fn complete(&mut self, pk_logement: i64) {
        let prefetcher = self.prefetcher.clone();
        self.spawn(async move { prefetcher.prefetch_complete(pk_logement).await });
    }

    /// Returns the number of tasks still running.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tasks.iter().filter(|task| !task.is_finished()).count()
    }

    /// Aborts every running task.
    pub fn cancel(&mut self) {
        let running = self.pending();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        if running > 0 {
            debug!(running, "Cancelled prefetches");
        }
    }

    /// Waits for every task to finish.
    pub async fn join(mut self) {
        let tasks = std::mem::take(&mut self.tasks);
        join_all(tasks).await;
    }

    fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.retain(|task| !task.is_finished());
        self.tasks.push(tokio::spawn(task));
    }
}

impl Drop for PrefetchScope {
    fn drop(&mut self) {
        self.cancel();
    }
}
