//! The portal service.

use portal_cache::{QueryCache, QueryView};
use portal_core::{FieldMap, PortalApi, PortalError, Query, Result, SystemClock};
use portal_http::HttpPortalApi;
use portal_series::{ConsumptionSeries, SeriesDecoder};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::{
    config::PortalConfig,
    prefetch::Prefetcher,
    resource::{IMMEUBLE_FIELDS, Resource},
    view::{ChartView, split_years},
};

/// Cached access to every portal resource.
///
/// Cheap to clone; clones share the cache.
///
/// # Example
///
/// ```no_run
/// use portal::{Portal, PortalConfig, Resource};
///
/// # async fn example() -> portal::Result<()> {
/// let portal = Portal::from_config(&PortalConfig::from_env()?)?;
///
/// portal.prefetcher().prefetch_complete(42).await;
/// let logement = portal.get(Resource::Logement(42)).await?;
/// let chart = portal.consumption_chart(42).await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Portal {
    cache: QueryCache,
    api: Arc<dyn PortalApi>,
    decoder: SeriesDecoder,
    diagnostics: bool,
}

impl Portal {
    /// Creates a portal reading `api` through `cache`.
    #[must_use]
    pub fn new(api: Arc<dyn PortalApi>, cache: QueryCache) -> Self {
        Self {
            cache,
            api,
            decoder: SeriesDecoder::new(),
            diagnostics: false,
        }
    }

    /// Builds the HTTP backend, snapshot store and cache from `config`.
    ///
    /// # Errors
    /// Returns an error if the HTTP client or the snapshot store cannot be
    /// created.
    pub fn from_config(config: &PortalConfig) -> Result<Self> {
        let api = HttpPortalApi::from_config(config.client_config())?;
        let store = config.snapshot_store()?;
        let cache = QueryCache::new(config.cache.clone(), store, Arc::new(SystemClock::new()));
        debug!(api_url = %config.api_url, entries = cache.len(), "Portal ready");
        Ok(Self::new(Arc::new(api), cache).with_diagnostics(config.diagnostics))
    }

    /// Sets the consumption decoder.
    #[must_use]
    pub const fn with_decoder(mut self, decoder: SeriesDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    /// Logs swallowed prefetch failures when `diagnostics` is true.
    #[must_use]
    pub const fn with_diagnostics(mut self, diagnostics: bool) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Returns the cache.
    #[must_use]
    pub const fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Returns the backend.
    #[must_use]
    pub fn api(&self) -> &Arc<dyn PortalApi> {
        &self.api
    }

    /// Returns a prefetcher sharing this portal's cache.
    #[must_use]
    pub fn prefetcher(&self) -> Prefetcher {
        Prefetcher::new(self.cache.clone(), Arc::clone(&self.api)).with_diagnostics(self.diagnostics)
    }

    fn query(&self, resource: Resource) -> Query {
        resource.query(&self.cache.config().windows)
    }

    /// Returns the resource, from the cache if fresh.
    ///
    /// # Errors
    /// Returns the fetch error after the retry is exhausted.
    pub async fn get(&self, resource: Resource) -> Result<Value> {
        let query = self.query(resource);
        self.cache
            .query(&query, resource.fetcher(Arc::clone(&self.api)))
            .await
    }

    /// Fetches the resource even if the cached copy is fresh.
    ///
    /// # Errors
    /// Returns the fetch error after the retry is exhausted.
    pub async fn refetch(&self, resource: Resource) -> Result<Value> {
        let query = self.query(resource);
        self.cache
            .refetch(&query, resource.fetcher(Arc::clone(&self.api)))
            .await
    }

    /// Reads the resource and returns everything a screen needs to render.
    ///
    /// Never fails: on error the view carries the error next to whatever
    /// data was cached before.
    #[instrument(skip_all, fields(resource = %resource))]
    pub async fn load(&self, resource: Resource) -> QueryView {
        let outcome = self.get(resource).await;
        let mut view = self.cache.view(&self.query(resource));
        if let Err(e) = outcome {
            view.error.get_or_insert(e);
        }
        view
    }

    /// Returns the cached state of the resource without fetching.
    #[must_use]
    pub fn view(&self, resource: Resource) -> QueryView {
        self.cache.view(&self.query(resource))
    }

    /// Marks the resource and everything keyed under it stale.
    pub fn invalidate(&self, resource: Resource) -> usize {
        self.cache.invalidate(&resource.key())
    }

    /// Creates a support ticket, then invalidates the ticket list.
    ///
    /// # Errors
    /// Returns the backend error. Mutations are not retried.
    pub async fn create_ticket(&self, ticket: &Value) -> Result<Value> {
        self.cache
            .mutate(
                || self.api.create_ticket(ticket),
                &[Resource::Tickets.key()],
            )
            .await
    }

    /// Returns the building listing with normalized field names.
    ///
    /// # Errors
    /// Returns the fetch error, or [`PortalError::Unexpected`] if the backend
    /// did not send a list.
    pub async fn immeubles(&self) -> Result<Vec<Value>> {
        match self.get(Resource::Immeubles).await? {
            Value::Array(items) => Ok(items
                .iter()
                .map(|item| FieldMap::normalize(item, IMMEUBLE_FIELDS))
                .collect()),
            Value::Null => Ok(Vec::new()),
            other => Err(PortalError::Unexpected(format!(
                "expected a building list, got {other}"
            ))),
        }
    }

    /// Returns the current and previous year consumption of a housing unit.
    ///
    /// # Errors
    /// Returns the fetch error. Malformed readings are skipped, not reported.
    pub async fn consumption(
        &self,
        pk_logement: i64,
    ) -> Result<(ConsumptionSeries, ConsumptionSeries)> {
        let data = self.get(Resource::Consommation(pk_logement)).await?;
        Ok(split_years(&data, &self.decoder))
    }

    /// Loads the consumption chart of a housing unit.
    pub async fn consumption_chart(&self, pk_logement: i64) -> ChartView {
        let view = self.load(Resource::Consommation(pk_logement)).await;
        ChartView::from_view(&view, &self.decoder)
    }
}
