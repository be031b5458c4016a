//! [`PortalApi`] over HTTP.

use async_trait::async_trait;
use portal_core::{PortalApi, Result};
use serde_json::Value;

use crate::client::{ApiClient, ClientConfig};
use crate::download::Download;

/// The portal backend reached through [`ApiClient`].
#[derive(Debug, Clone)]
pub struct HttpPortalApi {
    client: ApiClient,
}

impl HttpPortalApi {
    /// Wraps an existing client.
    #[must_use]
    pub const fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Builds the client from `config`.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        ApiClient::new(config).map(Self::new)
    }

    /// Returns the underlying client.
    #[must_use]
    pub const fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Downloads the PDF of one invoice.
    ///
    /// # Errors
    /// Returns the request error.
    pub async fn facture_pdf(&self, pk_facture: i64) -> Result<Download> {
        self.client
            .download(&format!("/factures/{pk_facture}/pdf"), &format!("facture_{pk_facture}"))
            .await
    }

    /// Downloads the meter park spreadsheet.
    ///
    /// # Errors
    /// Returns the request error.
    pub async fn parc_export(&self) -> Result<Download> {
        self.client.download("/parc/export", "parc").await
    }
}

#[async_trait]
impl PortalApi for HttpPortalApi {
    async fn logement(&self, pk_logement: i64) -> Result<Value> {
        self.client.get(&format!("/logements/{pk_logement}")).await
    }

    async fn logement_interventions(&self, pk_logement: i64) -> Result<Value> {
        self.client
            .get(&format!("/logements/{pk_logement}/interventions"))
            .await
    }

    async fn logement_fuites(&self, pk_logement: i64) -> Result<Value> {
        self.client.get(&format!("/logements/{pk_logement}/fuites")).await
    }

    async fn logement_anomalies(&self, pk_logement: i64) -> Result<Value> {
        self.client
            .get(&format!("/logements/{pk_logement}/anomalies"))
            .await
    }

    async fn logement_dysfonctionnements(&self, pk_logement: i64) -> Result<Value> {
        self.client
            .get(&format!("/logements/{pk_logement}/dysfonctionnements"))
            .await
    }

    async fn logement_consommation(&self, pk_logement: i64) -> Result<Value> {
        self.client
            .get(&format!("/logements/{pk_logement}/consommation"))
            .await
    }

    async fn immeubles(&self) -> Result<Value> {
        self.client.get("/immeubles").await
    }

    async fn immeuble(&self, pk_immeuble: i64) -> Result<Value> {
        self.client.get(&format!("/immeubles/{pk_immeuble}")).await
    }

    async fn parc(&self) -> Result<Value> {
        self.client.get("/parc").await
    }

    async fn gestion_parc(&self) -> Result<Value> {
        self.client.get("/gestion-parc").await
    }

    async fn factures(&self) -> Result<Value> {
        self.client.get("/factures").await
    }

    async fn dashboard(&self) -> Result<Value> {
        self.client.get("/dashboard").await
    }

    async fn tickets(&self) -> Result<Value> {
        self.client.get("/tickets").await
    }

    async fn create_ticket(&self, ticket: &Value) -> Result<Value> {
        self.client.post("/tickets", ticket).await
    }

    async fn mentions_legales(&self) -> Result<Value> {
        self.client.get("/mentions-legales").await
    }

    async fn current_user(&self) -> Result<Value> {
        self.client.get("/users/me").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount(server: &MockServer, verb: &str, route: &str, data: Value) {
        Mock::given(method(verb))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "success": true, "data": data })),
            )
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_housing_unit_routes() {
        let server = MockServer::start().await;
        mount(&server, "GET", "/logements/12", json!({ "pk": 12 })).await;
        mount(&server, "GET", "/logements/12/fuites", json!([])).await;
        mount(&server, "GET", "/logements/12/consommation", json!("2024-01-01|0|3")).await;

        let api = HttpPortalApi::from_config(ClientConfig::new(server.uri())).unwrap();
        assert_eq!(api.logement(12).await.unwrap(), json!({ "pk": 12 }));
        assert_eq!(api.logement_fuites(12).await.unwrap(), json!([]));
        assert_eq!(
            api.logement_consommation(12).await.unwrap(),
            json!("2024-01-01|0|3")
        );
    }

    #[tokio::test]
    async fn test_ticket_creation_route() {
        let server = MockServer::start().await;
        mount(&server, "POST", "/tickets", json!({ "pk": 5 })).await;

        let api = HttpPortalApi::from_config(ClientConfig::new(format!("{}/", server.uri()))).unwrap();
        let created = api.create_ticket(&json!({ "objet": "Relevé" })).await.unwrap();
        assert_eq!(created, json!({ "pk": 5 }));
    }
}
