use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::{check_auth, ErrorResponse};
use crate::store::{Agent, StoreError};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub account_id: String,
    pub agent_id: String,
    /// E.164 format, e.g. "+1234567890"
    pub phone_number: String,
}

#[derive(Debug, Serialize)]
pub struct AssignResponse {
    pub success: bool,
    pub agent: Agent,
}

#[derive(Debug, Deserialize)]
pub struct UnassignRequest {
    pub account_id: String,
    pub agent_id: String,
}

#[derive(Debug, Serialize)]
pub struct UnassignResponse {
    pub success: bool,
}

/// POST /api/phone-assignment/assign — bind a number to an agent.
///
/// If another agent in the account holds the number, the prior assignment
/// is cleared in the same transaction; the new holder wins.
pub async fn handle_assign(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AssignRequest>,
) -> Response {
    if let Err(resp) = check_auth(&headers, &state.config.api.token) {
        return resp;
    }

    if !is_e164(&req.phone_number) {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse {
                error: format!("Not an E.164 phone number: {}", req.phone_number),
            }),
        )
            .into_response();
    }

    match state
        .store
        .assign_phone(&req.account_id, &req.agent_id, &req.phone_number)
        .await
    {
        Ok(agent) => {
            tracing::info!(
                agent_id = %agent.id,
                phone_number = %req.phone_number,
                "Phone number assigned"
            );
            (
                StatusCode::OK,
                Json(AssignResponse {
                    success: true,
                    agent,
                }),
            )
                .into_response()
        }
        Err(e) => store_error_response(e),
    }
}

/// POST /api/phone-assignment/unassign — release an agent's number.
pub async fn handle_unassign(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<UnassignRequest>,
) -> Response {
    if let Err(resp) = check_auth(&headers, &state.config.api.token) {
        return resp;
    }

    match state
        .store
        .unassign_phone(&req.account_id, &req.agent_id)
        .await
    {
        Ok(()) => {
            tracing::info!(agent_id = %req.agent_id, "Phone number unassigned");
            (StatusCode::OK, Json(UnassignResponse { success: true })).into_response()
        }
        Err(e) => store_error_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct InboundQuery {
    pub account_id: String,
}

/// GET /api/phone-assignment/inbound — inbound agents with a number assigned.
pub async fn handle_list_inbound(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<InboundQuery>,
) -> Response {
    if let Err(resp) = check_auth(&headers, &state.config.api.token) {
        return resp;
    }

    match state.store.list_inbound_assigned(&query.account_id).await {
        Ok(agents) => (StatusCode::OK, Json(agents)).into_response(),
        Err(e) => store_error_response(e),
    }
}

pub(crate) fn store_error_response(e: StoreError) -> Response {
    match e {
        StoreError::NotFound(what) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("{what} not found"),
            }),
        )
            .into_response(),
        e => {
            tracing::error!("Store operation failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// Light E.164 shape check — leading '+' followed by 7 to 15 digits.
fn is_e164(s: &str) -> bool {
    let Some(digits) = s.strip_prefix('+') else {
        return false;
    };
    (7..=15).contains(&digits.len()) && digits.bytes().all(|b| b.is_ascii_digit())
}
