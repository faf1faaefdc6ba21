//! Remote cart API contract and its HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use crate::api::dto::{AddLineRequest, ErrorBody, LineRef, SetQuantityRequest};
use crate::api::USER_HEADER;
use crate::domain::aggregates::{Cart, NewLine, Wishlist};
use crate::domain::value_objects::{LineKey, UserId};
use crate::{Result, StoreError};

/// Server-side persistence for signed-in shoppers.
///
/// Every call returns the resulting state as the remote sees it.
#[async_trait]
pub trait RemoteCartApi: Send + Sync {
    async fn get_cart(&self, user: &UserId) -> Result<Cart>;
    async fn add_line(&self, user: &UserId, line: &NewLine) -> Result<Cart>;
    async fn set_quantity(&self, user: &UserId, key: &LineKey, quantity: i64) -> Result<Cart>;
    async fn delete_line(&self, user: &UserId, key: &LineKey) -> Result<Cart>;
    async fn delete_cart(&self, user: &UserId) -> Result<Cart>;

    async fn get_wishlist(&self, user: &UserId) -> Result<Wishlist>;
    async fn add_wishlist_entry(&self, user: &UserId, key: &LineKey) -> Result<Wishlist>;
    async fn delete_wishlist_entry(&self, user: &UserId, key: &LineKey) -> Result<Wishlist>;
    async fn delete_wishlist(&self, user: &UserId) -> Result<Wishlist>;
}

/// `RemoteCartApi` over HTTP. No retries; a timeout is a `Network` error.
#[derive(Clone, Debug)]
pub struct HttpCartApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCartApi {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Network(format!("failed to build http client: {e}")))?;
        Ok(Self { client, base_url: base_url.into().trim_end_matches('/').to_string() })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, user: &UserId, request: RequestBuilder) -> Result<T> {
        let response = request
            .header(USER_HEADER, user.as_str())
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| StoreError::Network(format!("malformed response: {e}")));
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.error)
            .unwrap_or_else(|_| if text.is_empty() { status.to_string() } else { text });

        tracing::debug!(status = %status, error = %message, "cart api request failed");
        match status {
            StatusCode::UNAUTHORIZED => Err(StoreError::NotAuthenticated),
            s if s.is_client_error() => Err(StoreError::RemoteValidation(message)),
            s => Err(StoreError::Network(format!("{s}: {message}"))),
        }
    }
}

#[async_trait]
impl RemoteCartApi for HttpCartApi {
    async fn get_cart(&self, user: &UserId) -> Result<Cart> {
        self.send(user, self.client.get(self.url("cart"))).await
    }

    async fn add_line(&self, user: &UserId, line: &NewLine) -> Result<Cart> {
        let body = AddLineRequest::from(line);
        self.send(user, self.client.post(self.url("cart/lines")).json(&body)).await
    }

    async fn set_quantity(&self, user: &UserId, key: &LineKey, quantity: i64) -> Result<Cart> {
        let body = SetQuantityRequest {
            product_id: key.product_id.clone(),
            variant_id: key.variant_id.clone(),
            quantity,
        };
        self.send(user, self.client.put(self.url("cart/lines")).json(&body)).await
    }

    async fn delete_line(&self, user: &UserId, key: &LineKey) -> Result<Cart> {
        let body = LineRef::from(key);
        self.send(user, self.client.delete(self.url("cart/lines")).json(&body)).await
    }

    async fn delete_cart(&self, user: &UserId) -> Result<Cart> {
        self.send(user, self.client.delete(self.url("cart"))).await
    }

    async fn get_wishlist(&self, user: &UserId) -> Result<Wishlist> {
        self.send(user, self.client.get(self.url("wishlist"))).await
    }

    async fn add_wishlist_entry(&self, user: &UserId, key: &LineKey) -> Result<Wishlist> {
        let body = LineRef::from(key);
        self.send(user, self.client.post(self.url("wishlist/entries")).json(&body)).await
    }

    async fn delete_wishlist_entry(&self, user: &UserId, key: &LineKey) -> Result<Wishlist> {
        let body = LineRef::from(key);
        self.send(user, self.client.delete(self.url("wishlist/entries")).json(&body)).await
    }

    async fn delete_wishlist(&self, user: &UserId) -> Result<Wishlist> {
        self.send(user, self.client.delete(self.url("wishlist"))).await
    }
}
