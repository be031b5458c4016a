//! Catalog of cached backend resources.

use futures::FutureExt;
use futures::future::BoxFuture;
use portal_core::{
    CacheKey, FieldMap, FreshnessWindows, PortalApi, Query, QueryFamily, Result, cache_key,
};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Normalized fields of a building listing entry.
pub const IMMEUBLE_FIELDS: &[FieldMap] = &[
    FieldMap::new("pk", &["pk", "pkImmeuble", "pk_immeuble", "id"]),
    FieldMap::new("nom", &["nom", "Nom", "NOM", "libelle"]),
    FieldMap::new("adresse", &["adresse.rue", "adresse", "Adresse", "ADRESSE"]),
    FieldMap::new("ville", &["ville", "Ville", "adresse.ville", "VILLE"]),
    FieldMap::new("code_postal", &["codePostal", "cp", "CP", "adresse.codePostal"]),
    FieldMap::new("nb_logements", &["nbLogements", "nb_logements", "NbLogements"]),
];

/// A backend resource the portal caches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Resource {
    /// Detail of one housing unit.
    Logement(i64),
    /// Interventions on a housing unit.
    Interventions(i64),
    /// Leaks detected on a housing unit.
    Fuites(i64),
    /// Reading anomalies of a housing unit.
    Anomalies(i64),
    /// Meter dysfunctions of a housing unit.
    Dysfonctionnements(i64),
    /// Consumption of a housing unit.
    Consommation(i64),
    /// Building listing.
    Immeubles,
    /// Detail of one building.
    Immeuble(i64),
    /// Meter park summary.
    Parc,
    /// Meter park management listing.
    GestionParc,
    /// Invoices.
    Factures,
    /// Dashboard aggregates.
    Dashboard,
    /// Support tickets.
    Tickets,
    /// Legal notice.
    MentionsLegales,
    /// Signed-in user.
    CurrentUser,
}

impl Resource {
    /// Related lists warmed together when a housing unit is about to be opened.
    #[must_use]
    pub const fn related(pk_logement: i64) -> [Self; 4] {
        [
            Self::Interventions(pk_logement),
            Self::Fuites(pk_logement),
            Self::Anomalies(pk_logement),
            Self::Dysfonctionnements(pk_logement),
        ]
    }

    /// Returns the cache key.
    #[must_use]
    pub fn key(&self) -> CacheKey {
        match *self {
            Self::Logement(pk) => cache_key!["logements", pk],
            Self::Interventions(pk) => cache_key!["logements", pk, "interventions"],
            Self::Fuites(pk) => cache_key!["logements", pk, "fuites"],
            Self::Anomalies(pk) => cache_key!["logements", pk, "anomalies"],
            Self::Dysfonctionnements(pk) => cache_key!["logements", pk, "dysfonctionnements"],
            Self::Consommation(pk) => cache_key!["logements", pk, "consommation"],
            Self::Immeubles => cache_key!["immeubles"],
            Self::Immeuble(pk) => cache_key!["immeubles", pk],
            Self::Parc => cache_key!["parc"],
            Self::GestionParc => cache_key!["gestion-parc"],
            Self::Factures => cache_key!["factures"],
            Self::Dashboard => cache_key!["dashboard"],
            Self::Tickets => cache_key!["tickets"],
            Self::MentionsLegales => cache_key!["mentions-legales"],
            Self::CurrentUser => cache_key!["user"],
        }
    }

    /// Returns the freshness family.
    #[must_use]
    pub const fn family(&self) -> QueryFamily {
        match self {
            Self::Interventions(_) | Self::Tickets => QueryFamily::Operational,
            Self::MentionsLegales => QueryFamily::Reference,
            Self::CurrentUser => QueryFamily::Identity,
            Self::Logement(_)
            | Self::Fuites(_)
            | Self::Anomalies(_)
            | Self::Dysfonctionnements(_)
            | Self::Consommation(_)
            | Self::Immeubles
            | Self::Immeuble(_)
            | Self::Parc
            | Self::GestionParc
            | Self::Factures
            | Self::Dashboard => QueryFamily::Batch,
        }
    }

    /// Returns the query descriptor.
    #[must_use]
    pub fn query(&self, windows: &FreshnessWindows) -> Query {
        Query::for_family(self.key(), self.family(), windows)
    }

    /// Fetches the resource from `api`.
    ///
    /// # Errors
    /// Returns the backend error.
    pub async fn fetch(&self, api: &dyn PortalApi) -> Result<Value> {
        match *self {
            Self::Logement(pk) => api.logement(pk).await,
            Self::Interventions(pk) => api.logement_interventions(pk).await,
            Self::Fuites(pk) => api.logement_fuites(pk).await,
            Self::Anomalies(pk) => api.logement_anomalies(pk).await,
            Self::Dysfonctionnements(pk) => api.logement_dysfonctionnements(pk).await,
            Self::Consommation(pk) => api.logement_consommation(pk).await,
            Self::Immeubles => api.immeubles().await,
            Self::Immeuble(pk) => api.immeuble(pk).await,
            Self::Parc => api.parc().await,
            Self::GestionParc => api.gestion_parc().await,
            Self::Factures => api.factures().await,
            Self::Dashboard => api.dashboard().await,
            Self::Tickets => api.tickets().await,
            Self::MentionsLegales => api.mentions_legales().await,
            Self::CurrentUser => api.current_user().await,
        }
    }

    /// Returns a fetch closure the cache can call again on retry.
    pub fn fetcher(
        self,
        api: Arc<dyn PortalApi>,
    ) -> impl Fn() -> BoxFuture<'static, Result<Value>> + Send + Sync + 'static {
        move || {
            let api = Arc::clone(&api);
            async move { self.fetch(api.as_ref()).await }.boxed()
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}
