//! Order API client (order collaborator → dlvr server).

use reqwest::Client;
use url::Url;
use uuid::Uuid;

use super::ClientError;
use crate::objects::simulation::{PlanSnapshot, SimulationAccepted, StartSimulationRequest};

/// Typed HTTP client for the order simulation endpoints.
#[derive(Debug, Clone)]
pub struct OrderClient {
    http: Client,
    base_url: Url,
}

impl OrderClient {
    /// Create a new `OrderClient` talking to the server at `base_url`.
    pub fn new(base_url: Url) -> Self {
        Self {
            http: Client::new(),
            base_url,
        }
    }

    /// Replace the default `reqwest::Client` with a custom one.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// `POST /api/v1/orders/{order_id}/simulation` – start the lifecycle
    /// simulation for a confirmed order.
    pub async fn start_simulation(
        &self,
        order_id: Uuid,
        request: &StartSimulationRequest,
    ) -> Result<SimulationAccepted, ClientError> {
        let url = self
            .base_url
            .join(&format!("/api/v1/orders/{order_id}/simulation"))?;

        let resp = self.http.post(url).json(request).send().await?;

        parse_response(resp).await
    }

    /// `POST /api/v1/orders/{order_id}/cancel` – cancel the simulation.
    ///
    /// Safe to call any number of times.
    pub async fn cancel_simulation(&self, order_id: Uuid) -> Result<(), ClientError> {
        let url = self
            .base_url
            .join(&format!("/api/v1/orders/{order_id}/cancel"))?;

        let resp = self.http.post(url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Api { status, body });
        }
        Ok(())
    }

    /// `GET /api/v1/orders/{order_id}/simulation` – inspect an active plan.
    pub async fn get_simulation(&self, order_id: Uuid) -> Result<PlanSnapshot, ClientError> {
        let url = self
            .base_url
            .join(&format!("/api/v1/orders/{order_id}/simulation"))?;

        let resp = self.http.get(url).send().await?;

        parse_response(resp).await
    }
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, ClientError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ClientError::Api { status, body });
    }
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(ClientError::Json)
}
