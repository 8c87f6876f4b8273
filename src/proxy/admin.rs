//! Queue status and runtime tuning endpoints

use crate::proxy::service::GatewayState;
use crate::scheduler::{IntervalUpdate, QueueStatus};
use axum::{extract::State, Json};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ConcurrencyUpdate {
    pub limit: usize,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ActivityUpdate {
    pub active: bool,
}

/// `GET /v1/queue/status`
pub async fn queue_status(State(state): State<GatewayState>) -> Json<QueueStatus> {
    Json(state.scheduler.status())
}

/// `POST /v1/queue/concurrency`
pub async fn set_concurrency(
    State(state): State<GatewayState>,
    Json(update): Json<ConcurrencyUpdate>,
) -> Json<QueueStatus> {
    state.scheduler.set_concurrency(update.limit);
    Json(state.scheduler.status())
}

/// `POST /v1/queue/activity`
pub async fn set_activity(
    State(state): State<GatewayState>,
    Json(update): Json<ActivityUpdate>,
) -> Json<QueueStatus> {
    state.scheduler.set_activity_level(update.active);
    Json(state.scheduler.status())
}

/// `POST /v1/queue/intervals`
pub async fn update_intervals(
    State(state): State<GatewayState>,
    Json(update): Json<IntervalUpdate>,
) -> Json<QueueStatus> {
    state.scheduler.update_interval_settings(update);
    Json(state.scheduler.status())
}
