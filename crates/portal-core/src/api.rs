//! Backend API trait.
//!
//! [`PortalApi`] lists every backend call the cache layer knows how to key.
//! Payloads are returned as raw JSON; decoding and normalization happen after
//! the cache so that what is cached is exactly what the backend sent.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Debug;

use crate::error::Result;

/// Backend for the metering portal.
///
/// Implemented over HTTP by `portal-http`; tests provide in-memory fakes.
#[async_trait]
pub trait PortalApi: Send + Sync + Debug {
    /// Fetches the detail record of one housing unit.
    async fn logement(&self, pk_logement: i64) -> Result<Value>;

    /// Fetches the interventions recorded for a housing unit.
    async fn logement_interventions(&self, pk_logement: i64) -> Result<Value>;

    /// Fetches the leaks detected for a housing unit.
    async fn logement_fuites(&self, pk_logement: i64) -> Result<Value>;

    /// Fetches the reading anomalies of a housing unit.
    async fn logement_anomalies(&self, pk_logement: i64) -> Result<Value>;

    /// Fetches the meter dysfunctions of a housing unit.
    async fn logement_dysfonctionnements(&self, pk_logement: i64) -> Result<Value>;

    /// Fetches the consumption series of a housing unit.
    async fn logement_consommation(&self, pk_logement: i64) -> Result<Value>;

    /// Lists the buildings visible to the current user.
    async fn immeubles(&self) -> Result<Value>;

    /// Fetches the detail record of one building.
    async fn immeuble(&self, pk_immeuble: i64) -> Result<Value>;

    /// Fetches the meter park summary.
    async fn parc(&self) -> Result<Value>;

    /// Fetches the meter park management listing.
    async fn gestion_parc(&self) -> Result<Value>;

    /// Lists invoices.
    async fn factures(&self) -> Result<Value>;

    /// Fetches dashboard aggregates.
    async fn dashboard(&self) -> Result<Value>;

    /// Lists support tickets.
    async fn tickets(&self) -> Result<Value>;

    /// Creates a support ticket.
    async fn create_ticket(&self, ticket: &Value) -> Result<Value>;

    /// Fetches the legal notice content.
    async fn mentions_legales(&self) -> Result<Value>;

    /// Fetches the identity of the signed-in user.
    async fn current_user(&self) -> Result<Value>;
}
