//! Notification history endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use common::{NotificationId, Page, UserId};
use domain::Notification;

use super::PageQuery;
use crate::error::ApiError;
use crate::{AppState, AppStore};

/// GET /notifications?limit&offset
#[tracing::instrument(skip(state, query))]
pub async fn list<S: AppStore>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<Notification>>, ApiError> {
    let page = state
        .notifications
        .list_all_notifications(query.into())
        .await?;
    Ok(Json(page))
}

/// GET /notifications/:id
#[tracing::instrument(skip(state))]
pub async fn get<S: AppStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<u64>,
) -> Result<Json<Notification>, ApiError> {
    let notification = state
        .notifications
        .get_notification(NotificationId::new(id))
        .await?;
    Ok(Json(notification))
}

/// GET /users/:id/notifications?limit&offset
#[tracing::instrument(skip(state, query))]
pub async fn list_for_user<S: AppStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<u64>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<Notification>>, ApiError> {
    let page = state
        .notifications
        .list_user_notifications(UserId::new(id), query.into())
        .await?;
    Ok(Json(page))
}
