//! User registration, lookup, order history and balance top-ups.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{Money, Page, UserId};
use domain::routing::{BILLING_DEPOSIT_KEY, BILLING_EVENTS_EXCHANGE};
use domain::{Deposit, InboundEvent, Order, User};
use serde::{Deserialize, Serialize};
use transport::MessageTransportExt;

use super::PageQuery;
use crate::error::ApiError;
use crate::{AppState, AppStore};

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
}

#[derive(Deserialize)]
pub struct DepositRequest {
    pub amount: Money,
    #[serde(default)]
    pub operation_type: Option<String>,
}

#[derive(Serialize)]
pub struct DepositResponse {
    pub user_id: UserId,
    pub amount: Money,
    pub balance: Money,
}

/// POST /users: register a user and open their ledger account.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: AppStore>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let user = state.orders.create_user(&req.username, &req.email).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /users/:id
#[tracing::instrument(skip(state))]
pub async fn get<S: AppStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<u64>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.orders.get_user(UserId::new(id)).await?))
}

/// GET /users/:id/orders?limit&offset
#[tracing::instrument(skip(state, query))]
pub async fn orders<S: AppStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<u64>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<Order>>, ApiError> {
    let page = state
        .orders
        .list_user_orders(UserId::new(id), query.into())
        .await?;
    Ok(Json(page))
}

/// POST /users/:id/deposits: top up the in-memory ledger.
///
/// Publishes a `billing.deposit` event so the user is notified. A publish
/// failure is logged and does not fail the request. A deposit that would
/// overflow the balance is rejected with 400 and publishes nothing.
#[tracing::instrument(skip(state, req), fields(amount = %req.amount))]
pub async fn deposit<S: AppStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<u64>,
    Json(req): Json<DepositRequest>,
) -> Result<Json<DepositResponse>, ApiError> {
    if req.amount <= Money::zero() {
        return Err(ApiError::BadRequest(format!(
            "Deposit amount must be positive, got {}",
            req.amount
        )));
    }

    let user = state.orders.get_user(UserId::new(id)).await?;
    let balance = state
        .ledger
        .deposit(user.id, req.amount)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let event = InboundEvent::Deposit(Deposit {
        user_id: user.id,
        email: user.email,
        amount: req.amount,
        operation_type: req.operation_type.unwrap_or_else(|| "deposit".to_string()),
    });
    publish_deposit(&state, &event).await;

    Ok(Json(DepositResponse {
        user_id: user.id,
        amount: req.amount,
        balance,
    }))
}

async fn publish_deposit<S: AppStore>(state: &AppState<S>, event: &InboundEvent) {
    let result = match event.to_json() {
        Ok(payload) => state
            .transport
            .publish_with_retry(
                BILLING_EVENTS_EXCHANGE,
                BILLING_DEPOSIT_KEY,
                payload,
                state.publish_max_attempts,
            )
            .await
            .map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    if let Err(error) = result {
        metrics::counter!("deposit_publish_failures_total").increment(1);
        tracing::error!(user_id = %event.user_id(), %error, "deposit event not published");
    }
}
