//! REST endpoint for dashboard analytics.

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use serde::Deserialize;

use crate::server::{ApiError, ApiQuery, AppState};
use crate::session::Session;

/// Window used when `days` is omitted.
const DEFAULT_WINDOW_DAYS: u32 = 30;

pub fn analytics_routes() -> Router<AppState> {
    Router::new().route("/api/analytics/summary", get(summary))
}

#[derive(Deserialize)]
struct SummaryQuery {
    days: Option<u32>,
}

/// GET /api/analytics/summary?days=N
///
/// Counts, resolution time, SLA breach rate, aging, and a daily series over
/// complaints submitted in the last N days. Staff only.
async fn summary(
    State(state): State<AppState>,
    session: Session,
    ApiQuery(query): ApiQuery<SummaryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let days = query.days.unwrap_or(DEFAULT_WINDOW_DAYS);
    let summary = state.complaints.analytics(&session, days).await?;
    Ok(Json(summary))
}
