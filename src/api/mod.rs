//! Remote cart API server.
//!
//! Every route is scoped to the shopper named in the [`USER_HEADER`] header,
//! which the upstream auth gateway sets after authenticating the request.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use thiserror::Error;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use validator::Validate;

use crate::domain::aggregates::{Cart, CartError, Wishlist};
use crate::domain::events::{CartEvent, Owner};
use crate::domain::value_objects::{LineKey, LineKeyError, UserId};
use crate::pricing::{RateConfig, RateSource};

pub mod dto;
pub mod repository;

use dto::{AddLineRequest, ErrorBody, LineRef, SetQuantityRequest};
use repository::{CartRepository, RepositoryError};

pub const USER_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn CartRepository>,
    pub rates: Arc<dyn RateSource>,
    pub nats: Option<async_nats::Client>,
}

impl AppState {
    pub fn new(repo: Arc<dyn CartRepository>, rates: Arc<dyn RateSource>) -> Self {
        Self { repo, rates, nats: None }
    }

    pub fn with_nats(mut self, nats: Option<async_nats::Client>) -> Self {
        self.nats = nats;
        self
    }

    /// Best effort; a failed publish never fails the request.
    async fn publish(&self, event: CartEvent) {
        let Some(nats) = &self.nats else { return };
        let payload = match serde_json::to_vec(&event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode cart event");
                return;
            }
        };
        if let Err(e) = nats.publish(event.subject().to_string(), payload.into()).await {
            tracing::warn!(subject = event.subject(), error = %e, "failed to publish cart event");
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing caller identity")]
    Unauthorized,

    #[error("{0}")]
    Validation(String),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

impl From<LineKeyError> for ApiError {
    fn from(e: LineKeyError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<CartError> for ApiError {
    fn from(e: CartError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            Self::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            Self::Repository(e) => {
                tracing::error!(error = %e, "cart repository failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// =============================================================================
// Caller identity
// =============================================================================

pub struct CurrentUser(pub UserId);

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| CurrentUser(UserId::new(value)))
            .ok_or(ApiError::Unauthorized)
    }
}

// =============================================================================
// Router
// =============================================================================

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "storefront-cart"})) }))
        .route("/api/v1/rates", get(current_rates))
        .route("/api/v1/cart", get(get_cart).delete(clear_cart))
        .route("/api/v1/cart/lines", axum::routing::post(add_line).put(set_quantity).delete(delete_line))
        .route("/api/v1/wishlist", get(get_wishlist).delete(clear_wishlist))
        .route(
            "/api/v1/wishlist/entries",
            axum::routing::post(add_wishlist_entry).delete(delete_wishlist_entry),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn current_rates(State(s): State<AppState>) -> Json<RateConfig> {
    Json(s.rates.current())
}

async fn get_cart(State(s): State<AppState>, CurrentUser(user): CurrentUser) -> ApiResult<Cart> {
    Ok(Json(s.repo.cart(&user).await?))
}

async fn add_line(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<AddLineRequest>,
) -> ApiResult<Cart> {
    req.validate()?;
    let line = req.into_line()?;
    line.validate()?;
    let (key, quantity) = (line.key.clone(), line.quantity);
    let cart = s.repo.upsert_line(&user, line).await?;
    s.publish(CartEvent::LineAdded { owner: Owner::User(user), key, quantity }).await;
    Ok(Json(cart))
}

async fn set_quantity(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<SetQuantityRequest>,
) -> ApiResult<Cart> {
    req.validate()?;
    let key = LineKey::new(req.product_id, req.variant_id)?;
    let cart = s.repo.set_quantity(&user, &key, req.quantity).await?;
    s.publish(CartEvent::QuantityUpdated { owner: Owner::User(user), key, quantity: req.quantity }).await;
    Ok(Json(cart))
}

async fn delete_line(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<LineRef>,
) -> ApiResult<Cart> {
    req.validate()?;
    let key = req.key()?;
    let cart = s.repo.delete_line(&user, &key).await?;
    s.publish(CartEvent::LineRemoved { owner: Owner::User(user), key }).await;
    Ok(Json(cart))
}

async fn clear_cart(State(s): State<AppState>, CurrentUser(user): CurrentUser) -> ApiResult<Cart> {
    let cart = s.repo.clear_cart(&user).await?;
    s.publish(CartEvent::Cleared { owner: Owner::User(user) }).await;
    Ok(Json(cart))
}

async fn get_wishlist(State(s): State<AppState>, CurrentUser(user): CurrentUser) -> ApiResult<Wishlist> {
    Ok(Json(s.repo.wishlist(&user).await?))
}

async fn add_wishlist_entry(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<LineRef>,
) -> ApiResult<Wishlist> {
    req.validate()?;
    let key = req.key()?;
    let list = s.repo.add_wishlist_entry(&user, &key).await?;
    s.publish(CartEvent::WishlistChanged { owner: Owner::User(user), key: Some(key), present: true }).await;
    Ok(Json(list))
}

async fn delete_wishlist_entry(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<LineRef>,
) -> ApiResult<Wishlist> {
    req.validate()?;
    let key = req.key()?;
    let list = s.repo.delete_wishlist_entry(&user, &key).await?;
    s.publish(CartEvent::WishlistChanged { owner: Owner::User(user), key: Some(key), present: false }).await;
    Ok(Json(list))
}

async fn clear_wishlist(State(s): State<AppState>, CurrentUser(user): CurrentUser) -> ApiResult<Wishlist> {
    let list = s.repo.clear_wishlist(&user).await?;
    s.publish(CartEvent::WishlistChanged { owner: Owner::User(user), key: None, present: false }).await;
    Ok(Json(list))
}
