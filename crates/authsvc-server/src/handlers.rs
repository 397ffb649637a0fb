//! HTTP handlers for health, readiness and token introspection.
//!
//! # Request Format
//!
//! ```text
//! POST /introspect
//! Content-Type: application/x-www-form-urlencoded
//!
//! token=<token_to_introspect>
//! ```
//!
//! or `GET /introspect` / `POST /introspect` with `Authorization: Bearer <token>`.
//!
//! # Response
//!
//! `200` with `{"active": true, ...}` or exactly `{"active": false}`. The
//! reason a token is inactive is never revealed.

use axum::{
    Form, Json,
    extract::{State, rejection::FormRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use authsvc_introspect::{IntrospectError, IntrospectionResponse, IntrospectionResult};

use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse<'a> {
    status: &'a str,
}

/// Form parameters accepted by `POST /introspect`.
#[derive(Debug, Default, Deserialize)]
pub struct IntrospectionForm {
    /// The token to introspect.
    #[serde(default)]
    pub token: Option<String>,
    /// Accepted for compatibility and ignored.
    #[serde(default)]
    pub token_type_hint: Option<String>,
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    if state.engine.ready() {
        (StatusCode::OK, Json(HealthResponse { status: "ready" }))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "unavailable",
            }),
        )
    }
}

/// `GET /introspect`: token from the bearer header only.
pub async fn introspect_get(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match bearer_token(&headers) {
        Some(token) => run_introspection(&state, token).await,
        None => missing_token(),
    }
}

/// `POST /introspect`: token from the form body, falling back to the bearer header.
pub async fn introspect_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: Result<Form<IntrospectionForm>, FormRejection>,
) -> Response {
    let form = match form {
        Ok(Form(form)) => form,
        Err(e) => {
            tracing::debug!(error = %e, "No usable form body, trying Authorization header");
            IntrospectionForm::default()
        }
    };

    let token = form
        .token
        .as_deref()
        .filter(|t| !t.is_empty())
        .or_else(|| bearer_token(&headers));

    match token {
        Some(token) => run_introspection(&state, token).await,
        None => missing_token(),
    }
}

async fn run_introspection(state: &AppState, token: &str) -> Response {
    match state.engine.introspect(token).await {
        Ok(result) => introspection_response(&result),
        Err(IntrospectError::NoKeyMaterial) => {
            tracing::warn!("Introspection unavailable: no key material loaded");
            let mut response = (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "error": "temporarily_unavailable",
                    "error_description": "No verification keys are loaded",
                })),
            )
                .into_response();
            no_store(&mut response);
            response
        }
        Err(e) => {
            // Non-fatal errors never leave the engine; treat any stray one as inactive.
            tracing::error!(error = %e, "Unexpected introspection error");
            let result = IntrospectionResult::inactive(
                e.inactive_reason()
                    .unwrap_or(authsvc_introspect::IntrospectionReason::Malformed),
            );
            introspection_response(&result)
        }
    }
}

fn introspection_response(result: &IntrospectionResult) -> Response {
    tracing::debug!(active = result.active, reason = %result.reason, "Token introspection completed");
    let mut response = (StatusCode::OK, Json(IntrospectionResponse::from(result))).into_response();
    no_store(&mut response);
    response
}

fn no_store(response: &mut Response) {
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
}

fn missing_token() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "error": "invalid_request",
            "error_description": "Missing token parameter or bearer Authorization header",
        })),
    )
        .into_response()
}

/// Extracts the token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
