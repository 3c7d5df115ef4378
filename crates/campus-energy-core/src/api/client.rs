//! HTTP implementation of the backend gateway.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use super::{RemoteError, RemoteGateway};
use crate::models::{
    Asset, BackendMetrics, Campus, CampusId, ConsumptionRecord, DashboardResponse,
    InfrastructureUnit, NewAsset,
};

/// Default HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// API client for the campus energy backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new API client for `base_url` (e.g. `http://host/api/v1`)
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Set the bearer token for authenticated requests
    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match self.token {
            Some(ref token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(RemoteError::from_status(status, &body))
        }
    }

    async fn decode<T: DeserializeOwned>(
        response: reqwest::Response,
        url: &str,
    ) -> Result<T, RemoteError> {
        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| RemoteError::InvalidResponse(format!("{}: {}", url, e)))
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, RemoteError> {
        debug!(url = url, "GET");
        let response = self.request(Method::GET, url).send().await?;
        let response = Self::check_response(response).await?;
        Self::decode(response, url).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, RemoteError> {
        debug!(url = url, "POST");
        let response = self.request(Method::POST, url).json(body).send().await?;
        let response = Self::check_response(response).await?;
        Self::decode(response, url).await
    }
}

#[async_trait]
impl RemoteGateway for ApiClient {
    async fn list_campuses(&self) -> Result<Vec<Campus>, RemoteError> {
        self.get(&self.url("campus/campuses")).await
    }

    async fn campus(&self, campus_id: CampusId) -> Result<Campus, RemoteError> {
        self.get(&self.url(&format!("campus/campuses/{}", campus_id)))
            .await
    }

    async fn assets(&self, campus_id: CampusId) -> Result<Vec<Asset>, RemoteError> {
        let units: Vec<InfrastructureUnit> = self
            .get(&self.url(&format!("campus/campuses/{}/infrastructure", campus_id)))
            .await?;
        Ok(units.into_iter().map(Asset::from).collect())
    }

    async fn consumption_history(
        &self,
        campus_id: CampusId,
    ) -> Result<Vec<ConsumptionRecord>, RemoteError> {
        self.get(&self.url(&format!(
            "campus/campuses/{}/consumption-history",
            campus_id
        )))
        .await
    }

    async fn dashboard_metrics(
        &self,
        campus_id: Option<CampusId>,
    ) -> Result<BackendMetrics, RemoteError> {
        let url = match campus_id {
            Some(id) => self.url(&format!("campus/global-dashboard?campus_id={}", id)),
            None => self.url("campus/global-dashboard"),
        };
        let response: DashboardResponse = self.get(&url).await?;
        Ok(response.into_metrics(campus_id))
    }

    async fn create_asset(
        &self,
        campus_id: CampusId,
        asset: &NewAsset,
    ) -> Result<Asset, RemoteError> {
        let url = self.url(&format!("campus/campuses/{}/infrastructure", campus_id));
        let unit: InfrastructureUnit = self.post(&url, &asset.to_create_body()).await?;
        Ok(Asset::from(unit))
    }
}
