//! REST endpoints for assignment rules, categories, and SLA policies.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;

use super::admin::{CategoryDraft, RuleDraft, SlaUpdate};
use super::rules::ComplaintFacts;
use crate::complaints::model::Priority;
use crate::server::{ApiError, ApiJson, ApiQuery, AppState, parse_id};
use crate::session::Session;

/// Admin routes for the reference data that drives routing and deadlines.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/api/assignment-rules", get(list_rules).post(create_rule))
        .route("/api/assignment-rules/preview", post(preview_rules))
        .route(
            "/api/assignment-rules/{id}",
            get(get_rule).put(update_rule).delete(delete_rule),
        )
        .route("/api/categories", get(list_categories).post(create_category))
        .route(
            "/api/categories/{id}",
            put(update_category).delete(delete_category),
        )
        .route("/api/sla-policies", get(list_sla_policies))
        .route(
            "/api/sla-policies/{priority}",
            get(get_sla_policy).put(update_sla_policy),
        )
}

// ── Assignment rules ────────────────────────────────────────────────────

async fn list_rules(
    State(state): State<AppState>,
    session: Session,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.admin.list_rules(&session).await?))
}

async fn create_rule(
    State(state): State<AppState>,
    session: Session,
    ApiJson(draft): ApiJson<RuleDraft>,
) -> Result<impl IntoResponse, ApiError> {
    let rule = state.admin.create_rule(&session, draft).await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

async fn get_rule(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "rule")?;
    Ok(Json(state.admin.get_rule(&session, id).await?))
}

async fn update_rule(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    ApiJson(draft): ApiJson<RuleDraft>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "rule")?;
    Ok(Json(state.admin.update_rule(&session, id, draft).await?))
}

async fn delete_rule(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "rule")?;
    state.admin.delete_rule(&session, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Dry run: which rule would pick up a complaint with these fields.
async fn preview_rules(
    State(state): State<AppState>,
    session: Session,
    ApiJson(facts): ApiJson<ComplaintFacts>,
) -> Result<impl IntoResponse, ApiError> {
    let matched = state.admin.preview(&session, &facts).await?;
    Ok(Json(serde_json::json!({ "matched": matched })))
}

// ── Categories ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CategoryQuery {
    #[serde(default)]
    include_inactive: bool,
}

async fn list_categories(
    State(state): State<AppState>,
    session: Session,
    ApiQuery(query): ApiQuery<CategoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let categories = state
        .admin
        .list_categories(&session, query.include_inactive)
        .await?;
    Ok(Json(categories))
}

async fn create_category(
    State(state): State<AppState>,
    session: Session,
    ApiJson(draft): ApiJson<CategoryDraft>,
) -> Result<impl IntoResponse, ApiError> {
    let category = state.admin.create_category(&session, draft).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

async fn update_category(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    ApiJson(draft): ApiJson<CategoryDraft>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "category")?;
    Ok(Json(state.admin.update_category(&session, id, draft).await?))
}

async fn delete_category(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "category")?;
    state.admin.delete_category(&session, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── SLA policies ────────────────────────────────────────────────────────

async fn list_sla_policies(
    State(state): State<AppState>,
    session: Session,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.admin.list_sla_policies(&session).await?))
}

async fn get_sla_policy(
    State(state): State<AppState>,
    session: Session,
    Path(priority): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let priority: Priority = priority.parse()?;
    Ok(Json(state.admin.get_sla_policy(&session, priority).await?))
}

async fn update_sla_policy(
    State(state): State<AppState>,
    session: Session,
    Path(priority): Path<String>,
    ApiJson(update): ApiJson<SlaUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let priority: Priority = priority.parse()?;
    Ok(Json(
        state
            .admin
            .update_sla_policy(&session, priority, update)
            .await?,
    ))
}
