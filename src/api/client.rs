//! HTTP client for the orders backend

use std::sync::Arc;

use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use super::config::ApiConfig;
use super::types::{ClientTokenResponse, NewOrder, OrderUpdate};
use crate::config::AuthToken;
use crate::error::{ApiError, FetchError};
use crate::query::{CollectionFetcher, FetchFuture};
use crate::record::Record;

/// REST client
///
/// Cheap to clone; clones share the connection pool and the [`AuthToken`].
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    config: Arc<ApiConfig>,
    token: AuthToken,
}

impl RestClient {
    pub fn new(config: ApiConfig, token: AuthToken) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            config: Arc::new(config),
            token,
        })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Token cell used for the `Authorization` header
    pub fn token(&self) -> &AuthToken {
        &self.token
    }

    /// Register this client with the backend and store the returned token.
    pub async fn create_client(&self) -> Result<String, ApiError> {
        let request = self.request(Method::POST, "clients", None)?;
        let response: ClientTokenResponse = self.send_json(request).await?;

        self.token.set(response.client_token.clone());
        tracing::info!("Client token obtained");
        Ok(response.client_token)
    }

    /// Newest orders first, limited to the configured page size
    pub async fn fetch_orders(&self) -> Result<Vec<Record>, ApiError> {
        self.fetch_orders_with(self.token.get()).await
    }

    /// Like [`fetch_orders`](Self::fetch_orders) with an explicit token,
    /// falling back to the stored one when `None`
    pub async fn fetch_orders_with(&self, token: Option<String>) -> Result<Vec<Record>, ApiError> {
        let limit = self.config.page_size.to_string();
        let request = self
            .request(Method::GET, "orders", token.as_deref())?
            .query(&[("asc", "false"), ("limit", limit.as_str())]);
        let orders: Vec<Record> = self.send_json(request).await?;

        tracing::debug!(count = orders.len(), "Orders fetched");
        Ok(orders)
    }

    /// Orders belong to a client, so writes need a token.
    pub async fn create_order(&self, order: &NewOrder) -> Result<Value, ApiError> {
        let token = self.token.get().ok_or(ApiError::MissingToken)?;
        let request = self.request(Method::POST, "orders", Some(&token))?.json(order);
        self.send_json(request).await
    }

    pub async fn update_order(&self, update: &OrderUpdate) -> Result<Value, ApiError> {
        let token = self.token.get().ok_or(ApiError::MissingToken)?;
        let request = self.request(Method::PATCH, "orders", Some(&token))?.json(update);
        tracing::debug!(order = %update.id, status = %update.status, "Updating order");
        self.send_json(request).await
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.config.base_url.join(path)?)
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
    ) -> Result<RequestBuilder, ApiError> {
        let url = self.endpoint(path)?;
        let request = self.http.request(method, url);
        match token.map(str::to_owned).or_else(|| self.token.get()) {
            Some(token) => Ok(request.bearer_auth(token)),
            None => Ok(request),
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "Request rejected");
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

impl CollectionFetcher for RestClient {
    fn fetch_collection(&self, token: Option<String>) -> FetchFuture {
        let client = self.clone();
        Box::pin(async move {
            client
                .fetch_orders_with(token)
                .await
                .map_err(FetchError::from)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(token: AuthToken) -> RestClient {
        let config = ApiConfig::parse("https://api.example.com/dev").unwrap().page_size(5);
        RestClient::new(config, token).unwrap()
    }

    #[test]
    fn test_endpoint_joins_under_base() {
        let client = client(AuthToken::default());

        assert_eq!(
            client.endpoint("clients").unwrap().as_str(),
            "https://api.example.com/dev/clients"
        );
    }

    #[test]
    fn test_request_carries_bearer_token() {
        let client = client(AuthToken::new("jwt.value"));

        let request = client
            .request(Method::GET, "orders", None)
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(
            request.headers().get(reqwest::header::AUTHORIZATION).unwrap(),
            "Bearer jwt.value"
        );
    }

    #[test]
    fn test_request_without_token_has_no_header() {
        let client = client(AuthToken::default());

        let request = client
            .request(Method::POST, "clients", None)
            .unwrap()
            .build()
            .unwrap();

        assert!(request.headers().get(reqwest::header::AUTHORIZATION).is_none());
    }

    #[test]
    fn test_explicit_token_wins() {
        let client = client(AuthToken::new("stored"));

        let request = client
            .request(Method::GET, "orders", Some("explicit"))
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(
            request.headers().get(reqwest::header::AUTHORIZATION).unwrap(),
            "Bearer explicit"
        );
    }

    #[test]
    fn test_fetch_orders_query() {
        let client = client(AuthToken::default());

        let request = client
            .request(Method::GET, "orders", None)
            .unwrap()
            .query(&[("asc", "false"), ("limit", "5")])
            .build()
            .unwrap();

        assert_eq!(
            request.url().as_str(),
            "https://api.example.com/dev/orders?asc=false&limit=5"
        );
    }

    #[tokio::test]
    async fn test_writes_require_token() {
        let client = client(AuthToken::default());

        let result = client
            .update_order(&OrderUpdate::status("c1#2024", "shipped"))
            .await;

        assert!(matches!(result, Err(ApiError::MissingToken)));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_a_network_error() {
        let config = ApiConfig::parse("http://127.0.0.1:9/").unwrap();
        let client = RestClient::new(config, AuthToken::default()).unwrap();

        let result = client.fetch_collection(None).await;

        assert!(matches!(result, Err(FetchError::Network(_))));
    }
}
