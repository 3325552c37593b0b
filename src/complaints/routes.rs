//! REST endpoints for complaints and their comments.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use super::model::{ComplaintFilter, ComplaintStatus, NewComplaint};
use crate::server::{ApiError, ApiJson, ApiQuery, AppState, parse_id};
use crate::session::Session;

/// Complaint routes, mounted under `/api/complaints`.
pub fn complaint_routes() -> Router<AppState> {
    Router::new()
        .route("/api/complaints", get(list_complaints).post(submit_complaint))
        .route("/api/complaints/ticket/{ticket}", get(get_by_ticket))
        .route("/api/complaints/{id}", get(get_complaint))
        .route("/api/complaints/{id}/status", post(update_status))
        .route("/api/complaints/{id}/assign", post(assign_complaint))
        .route(
            "/api/complaints/{id}/comments",
            get(list_comments).post(add_comment),
        )
}

async fn list_complaints(
    State(state): State<AppState>,
    session: Session,
    ApiQuery(filter): ApiQuery<ComplaintFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let complaints = state.complaints.list(&session, filter).await?;
    Ok(Json(complaints))
}

async fn submit_complaint(
    State(state): State<AppState>,
    session: Session,
    ApiJson(body): ApiJson<NewComplaint>,
) -> Result<impl IntoResponse, ApiError> {
    let complaint = state.complaints.submit(&session, body).await?;
    Ok((StatusCode::CREATED, Json(complaint)))
}

async fn get_complaint(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "complaint")?;
    Ok(Json(state.complaints.get(&session, id).await?))
}

async fn get_by_ticket(
    State(state): State<AppState>,
    session: Session,
    Path(ticket): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.complaints.get_by_ticket(&session, &ticket).await?))
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct StatusRequest {
    status: ComplaintStatus,
}

async fn update_status(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<StatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "complaint")?;
    let complaint = state
        .complaints
        .update_status(&session, id, body.status)
        .await?;
    Ok(Json(complaint))
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct AssignRequest {
    /// `null` clears the assignee (admin only).
    assigned_to: Option<String>,
}

async fn assign_complaint(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<AssignRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "complaint")?;
    let complaint = state
        .complaints
        .assign(&session, id, body.assigned_to)
        .await?;
    Ok(Json(complaint))
}

async fn list_comments(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "complaint")?;
    Ok(Json(state.complaints.comments(&session, id).await?))
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CommentRequest {
    body: String,
    #[serde(default)]
    is_internal: bool,
}

async fn add_comment(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<CommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "complaint")?;
    let comment = state
        .complaints
        .add_comment(&session, id, &body.body, body.is_internal)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use axum::response::Response;
    use tower::ServiceExt;

    use crate::server::{USER_ID_HEADER, USER_ROLE_HEADER, build_router};
    use crate::store::{Database, LibSqlBackend};

    use super::*;

    async fn app() -> Router {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        build_router(AppState::new(db, "CMP"), &[])
    }

    fn request(method: &str, uri: &str, user: &str, role: &str, body: Option<&str>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(USER_ID_HEADER, user)
            .header(USER_ROLE_HEADER, role);
        match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn submit_then_fetch() {
        let app = app().await;
        let created = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/complaints",
                "alice",
                "student",
                Some(r#"{"title":"Broken AC","description":"room is hot","priority":"high"}"#),
            ))
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::CREATED);
        let created = json(created).await;
        assert_eq!(created["priority"], "high");
        assert_eq!(created["status"], "open");
        let id = created["id"].as_str().unwrap().to_string();
        let ticket = created["ticket_number"].as_str().unwrap().to_string();

        let fetched = app
            .clone()
            .oneshot(request("GET", &format!("/api/complaints/{id}"), "alice", "student", None))
            .await
            .unwrap();
        assert_eq!(fetched.status(), StatusCode::OK);

        let by_ticket = app
            .clone()
            .oneshot(request(
                "GET",
                &format!("/api/complaints/ticket/{ticket}"),
                "s1",
                "staff",
                None,
            ))
            .await
            .unwrap();
        assert_eq!(json(by_ticket).await["id"], id.as_str());

        let hidden = app
            .oneshot(request("GET", &format!("/api/complaints/{id}"), "bob", "student", None))
            .await
            .unwrap();
        assert_eq!(hidden.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn bad_ids_and_tickets_are_400() {
        let app = app().await;
        let bad_id = app
            .clone()
            .oneshot(request("GET", "/api/complaints/not-a-uuid", "s1", "staff", None))
            .await
            .unwrap();
        assert_eq!(bad_id.status(), StatusCode::BAD_REQUEST);

        let bad_ticket = app
            .oneshot(request("GET", "/api/complaints/ticket/XYZ", "s1", "staff", None))
            .await
            .unwrap();
        assert_eq!(bad_ticket.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn status_transition_errors_map_to_http() {
        let app = app().await;
        let created = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/complaints",
                "alice",
                "student",
                Some(r#"{"title":"Wifi","description":"down again"}"#),
            ))
            .await
            .unwrap();
        let id = json(created).await["id"].as_str().unwrap().to_string();
        let uri = format!("/api/complaints/{id}/status");

        let forbidden = app
            .clone()
            .oneshot(request("POST", &uri, "alice", "student", Some(r#"{"status":"resolved"}"#)))
            .await
            .unwrap();
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

        let conflict = app
            .clone()
            .oneshot(request("POST", &uri, "s1", "staff", Some(r#"{"status":"closed"}"#)))
            .await
            .unwrap();
        assert_eq!(conflict.status(), StatusCode::CONFLICT);

        let ok = app
            .oneshot(request("POST", &uri, "s1", "staff", Some(r#"{"status":"in_progress"}"#)))
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
        assert_eq!(json(ok).await["status"], "in_progress");
    }

    #[tokio::test]
    async fn list_filters_by_query() {
        let app = app().await;
        for (priority, user) in [("urgent", "alice"), ("low", "alice"), ("urgent", "bob")] {
            let body = format!(r#"{{"title":"t","description":"d","priority":"{priority}"}}"#);
            app.clone()
                .oneshot(request("POST", "/api/complaints", user, "student", Some(&body)))
                .await
                .unwrap();
        }

        let urgent = app
            .clone()
            .oneshot(request("GET", "/api/complaints?priority=urgent", "s1", "staff", None))
            .await
            .unwrap();
        assert_eq!(json(urgent).await.as_array().unwrap().len(), 2);

        let mine = app
            .clone()
            .oneshot(request("GET", "/api/complaints", "alice", "student", None))
            .await
            .unwrap();
        assert_eq!(json(mine).await.as_array().unwrap().len(), 2);

        let bad = app
            .oneshot(request("GET", "/api/complaints?priority=extreme", "s1", "staff", None))
            .await
            .unwrap();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    }
}
