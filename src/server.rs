//! HTTP server wiring: shared state, caller identity, error responses, router.
//!
//! Identity comes from the authenticating gateway in front of this service
//! as `X-User-Id` / `X-User-Role` headers. When a gateway secret is
//! configured, requests must also carry it in `X-Gateway-Secret`.

use std::sync::Arc;

use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::request::Parts;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, warn};
use uuid::Uuid;

use crate::analytics::routes::analytics_routes;
use crate::assignment::admin::AdminService;
use crate::assignment::routes::admin_routes;
use crate::complaints::routes::complaint_routes;
use crate::complaints::service::ComplaintService;
use crate::complaints::ws::complaint_ws_routes;
use crate::error::{AuthError, ComplaintError, DatabaseError, Error};
use crate::session::{Role, Session};
use crate::store::Database;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const GATEWAY_SECRET_HEADER: &str = "x-gateway-secret";

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub complaints: Arc<ComplaintService>,
    pub admin: Arc<AdminService>,
    /// Shared secret the gateway must present (None = trust the headers).
    pub gateway_secret: Option<Arc<SecretString>>,
}

impl AppState {
    pub fn new(db: Arc<dyn Database>, ticket_prefix: &str) -> Self {
        Self {
            complaints: ComplaintService::new(Arc::clone(&db), ticket_prefix),
            admin: AdminService::new(db),
            gateway_secret: None,
        }
    }

    /// Builder: require the gateway secret on every request.
    pub fn with_gateway_secret(mut self, secret: SecretString) -> Self {
        self.gateway_secret = Some(Arc::new(secret));
        self
    }
}

// ── Errors ──────────────────────────────────────────────────────────────

/// Error response: JSON `{"error": "..."}` with a status derived from the cause.
#[derive(Debug)]
pub enum ApiError {
    Service(Error),
    /// Request could not be parsed (bad JSON, query string, or id).
    BadRequest(String),
}

impl<E> From<E> for ApiError
where
    E: Into<Error>,
{
    fn from(err: E) -> Self {
        Self::Service(err.into())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        let err = match self {
            Self::BadRequest(_) => return StatusCode::BAD_REQUEST,
            Self::Service(err) => err,
        };
        match err {
            Error::Auth(AuthError::Unauthenticated(_)) => StatusCode::UNAUTHORIZED,
            Error::Auth(AuthError::Forbidden { .. }) => StatusCode::FORBIDDEN,
            Error::Complaint(ComplaintError::NotFound { .. }) => StatusCode::NOT_FOUND,
            Error::Complaint(ComplaintError::InvalidTransition { .. }) => StatusCode::CONFLICT,
            Error::Complaint(
                ComplaintError::Validation { .. }
                | ComplaintError::UnknownReference { .. }
                | ComplaintError::MalformedTicket(_),
            ) => StatusCode::BAD_REQUEST,
            Error::Database(DatabaseError::NotFound { .. }) => StatusCode::NOT_FOUND,
            Error::Database(DatabaseError::Constraint(_)) => StatusCode::CONFLICT,
            Error::Database(_) | Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::BadRequest(msg) => msg.clone(),
            Self::Service(err) if status == StatusCode::INTERNAL_SERVER_ERROR => {
                error!(error = %err, "Request failed");
                "Internal server error".to_string()
            }
            Self::Service(err) => err.to_string(),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Parse a path id, answering 400 on garbage.
pub fn parse_id(raw: &str, entity: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("Invalid {entity} ID")))
}

// ── Extractors ──────────────────────────────────────────────────────────

/// `Json` whose rejection is a JSON error body.
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError::BadRequest(rejection.body_text())),
        }
    }
}

/// `Query` whose rejection is a JSON error body.
pub struct ApiQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError::BadRequest(rejection.body_text())),
        }
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

impl FromRequestParts<AppState> for Session {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(secret) = &state.gateway_secret {
            if header(parts, GATEWAY_SECRET_HEADER) != Some(secret.expose_secret()) {
                warn!(path = %parts.uri.path(), "Request without valid gateway secret");
                return Err(AuthError::Unauthenticated("gateway secret missing or wrong".into()).into());
            }
        }

        let user_id = header(parts, USER_ID_HEADER)
            .ok_or_else(|| AuthError::Unauthenticated(format!("{USER_ID_HEADER} header missing")))?;
        let role: Role = header(parts, USER_ROLE_HEADER)
            .ok_or_else(|| AuthError::Unauthenticated(format!("{USER_ROLE_HEADER} header missing")))?
            .parse()?;

        Ok(Session::new(user_id, role))
    }
}

// ── Router ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "complaint-desk",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// CORS for the front-end. No origins configured means any origin.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

/// Build the full router: REST API, staff WebSocket feed, health check.
pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(complaint_routes())
        .merge(complaint_ws_routes())
        .merge(admin_routes())
        .merge(analytics_routes())
        .layer(cors_layer(cors_origins))
        .with_state(state)
}
