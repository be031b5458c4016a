//! In-memory backend for tests.

use async_trait::async_trait;
use portal_core::{PortalApi, PortalError, Result};
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

/// Backend answering from memory and counting calls per route.
///
/// Routes answer `{ "route": name, "pk": pk }` unless a response was set.
#[derive(Debug, Default)]
pub(crate) struct FakeApi {
    calls: Mutex<HashMap<&'static str, usize>>,
    responses: Mutex<HashMap<&'static str, Value>>,
    failing: Mutex<HashSet<&'static str>>,
    hanging: Mutex<HashSet<&'static str>>,
    delay: Duration,
}

impl FakeApi {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps for `delay` before answering.
    pub(crate) fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self, route: &str) -> usize {
        self.calls.lock().unwrap().get(route).copied().unwrap_or(0)
    }

    pub(crate) fn respond(&self, route: &'static str, value: Value) {
        self.responses.lock().unwrap().insert(route, value);
    }

    pub(crate) fn fail(&self, route: &'static str) {
        self.failing.lock().unwrap().insert(route);
    }

    pub(crate) fn recover(&self, route: &str) {
        self.failing.lock().unwrap().remove(route);
    }

    /// Calls to `route` never complete.
    pub(crate) fn hang(&self, route: &'static str) {
        self.hanging.lock().unwrap().insert(route);
    }

    async fn answer(&self, route: &'static str, pk: Option<i64>) -> Result<Value> {
        *self.calls.lock().unwrap().entry(route).or_default() += 1;

        let hangs = self.hanging.lock().unwrap().contains(route);
        if hangs {
            futures::future::pending::<()>().await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let fails = self.failing.lock().unwrap().contains(route);
        if fails {
            return Err(PortalError::Network(format!("{route} unreachable")));
        }

        let response = self.responses.lock().unwrap().get(route).cloned();
        Ok(response.unwrap_or_else(|| json!({ "route": route, "pk": pk })))
    }
}

#[async_trait]
impl PortalApi for FakeApi {
    async fn logement(&self, pk_logement: i64) -> Result<Value> {
        self.answer("logement", Some(pk_logement)).await
    }

    async fn logement_interventions(&self, pk_logement: i64) -> Result<Value> {
        self.answer("interventions", Some(pk_logement)).await
    }

    async fn logement_fuites(&self, pk_logement: i64) -> Result<Value> {
        self.answer("fuites", Some(pk_logement)).await
    }

    async fn logement_anomalies(&self, pk_logement: i64) -> Result<Value> {
        self.answer("anomalies", Some(pk_logement)).await
    }

    async fn logement_dysfonctionnements(&self, pk_logement: i64) -> Result<Value> {
        self.answer("dysfonctionnements", Some(pk_logement)).await
    }

    async fn logement_consommation(&self, pk_logement: i64) -> Result<Value> {
        self.answer("consommation", Some(pk_logement)).await
    }

    async fn immeubles(&self) -> Result<Value> {
        self.answer("immeubles", None).await
    }

    async fn immeuble(&self, pk_immeuble: i64) -> Result<Value> {
        self.answer("immeuble", Some(pk_immeuble)).await
    }

    async fn parc(&self) -> Result<Value> {
        self.answer("parc", None).await
    }

    async fn gestion_parc(&self) -> Result<Value> {
        self.answer("gestion_parc", None).await
    }

    async fn factures(&self) -> Result<Value> {
        self.answer("factures", None).await
    }

    async fn dashboard(&self) -> Result<Value> {
        self.answer("dashboard", None).await
    }

    async fn tickets(&self) -> Result<Value> {
        self.answer("tickets", None).await
    }

    async fn create_ticket(&self, ticket: &Value) -> Result<Value> {
        self.answer("create_ticket", None).await?;
        Ok(json!({ "created": ticket }))
    }

    async fn mentions_legales(&self) -> Result<Value> {
        self.answer("mentions_legales", None).await
    }

    async fn current_user(&self) -> Result<Value> {
        self.answer("current_user", None).await
    }
}
