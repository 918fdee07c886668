use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::api::assignment::store_error_response;
use crate::api::check_auth;
use crate::store::CallDirection;
use crate::AppState;

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 500;

#[derive(Debug, Deserialize)]
pub struct CallsQuery {
    pub account_id: String,
    #[serde(default)]
    pub direction: Option<CallDirection>,
    #[serde(default)]
    pub limit: Option<u32>,
}

/// GET /api/calls — recent calls for an account, newest first.
pub async fn handle_recent_calls(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CallsQuery>,
) -> Response {
    if let Err(resp) = check_auth(&headers, &state.config.api.token) {
        return resp;
    }

    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    match state
        .store
        .find_recent_calls(&query.account_id, query.direction, limit)
        .await
    {
        Ok(calls) => (StatusCode::OK, Json(calls)).into_response(),
        Err(e) => store_error_response(e),
    }
}
