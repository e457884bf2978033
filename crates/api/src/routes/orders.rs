//! Order placement and lookup endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use common::{Money, OrderId, UserId};
use domain::{Order, OrderItem};
use ordering::AuthToken;
use serde::Deserialize;

use crate::error::ApiError;
use crate::{AppState, AppStore};

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub user_id: u64,
    pub items: Vec<OrderItem>,
    pub amount: Money,
}

/// POST /orders: debit the user and record the order.
///
/// A declined debit still returns 201 with a `failed` order. The bearer
/// token, if any, is forwarded to the ledger.
#[tracing::instrument(skip(state, headers, req), fields(user_id = req.user_id))]
pub async fn create<S: AppStore>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order = state
        .orders
        .create_order(
            UserId::new(req.user_id),
            req.items,
            req.amount,
            bearer_token(&headers),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /orders/:id
#[tracing::instrument(skip(state))]
pub async fn get<S: AppStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<u64>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(state.orders.get_order(OrderId::new(id)).await?))
}

fn bearer_token(headers: &HeaderMap) -> Option<AuthToken> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then(|| AuthToken::new(token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_token_extraction() {
        assert_eq!(
            bearer_token(&headers("Bearer abc123")).map(|t| t.as_str().to_string()),
            Some("abc123".to_string())
        );
        assert!(bearer_token(&headers("Basic dXNlcjpwYXNz")).is_none());
        assert!(bearer_token(&headers("Bearer  ")).is_none());
        assert!(bearer_token(&HeaderMap::new()).is_none());
    }
}
