//! HTTP control-plane handlers.

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use carapace_core::{HistoryEntry, SessionId};
use carapace_session::{SessionError, SessionInfo};

use crate::state::AppState;

/// Extract the bearer token from an `Authorization` header.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Reject requests that do not carry the server token.
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), StatusCode> {
    match bearer_token(headers) {
        Some(token) if token == state.token => Ok(()),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

fn map_session_error(e: &SessionError) -> StatusCode {
    match e {
        SessionError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Request body for `POST /sessions`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct CreateSessionRequest {
    channel_type: Option<String>,
    channel_ref: Option<String>,
}

/// `GET /sessions`
pub(crate) async fn list_sessions(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<SessionInfo>>, StatusCode> {
    authorize(&state, &headers)?;
    Ok(Json(state.sessions.list()))
}

/// `POST /sessions`
pub(crate) async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<CreateSessionRequest>>,
) -> Result<Json<SessionInfo>, StatusCode> {
    authorize(&state, &headers)?;
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let session = state
        .sessions
        .create(
            body.channel_type.unwrap_or_else(|| "cli".to_string()),
            body.channel_ref.unwrap_or_default(),
        )
        .map_err(|e| map_session_error(&e))?;
    Ok(Json(SessionInfo::from(&session)))
}

/// `GET /sessions/{id}`
pub(crate) async fn get_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<SessionInfo>, StatusCode> {
    authorize(&state, &headers)?;
    let session = state
        .sessions
        .load_state(&SessionId(id))
        .map_err(|e| map_session_error(&e))?;
    Ok(Json(SessionInfo::from(&session)))
}

/// `DELETE /sessions/{id}`: 204 on success, 404 if missing.
pub(crate) async fn delete_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    authorize(&state, &headers)?;
    state
        .sessions
        .delete(&SessionId(id))
        .map_err(|e| map_session_error(&e))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Query parameters for the history endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct HistoryQuery {
    limit: Option<usize>,
}

/// One row of `GET /sessions/{id}/history`.
#[derive(Debug, Serialize)]
pub(crate) struct HistoryMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<Value>,
    at: DateTime<Utc>,
}

impl HistoryMessage {
    fn from_entry(entry: &HistoryEntry) -> Option<Self> {
        let at = entry.at();
        match entry {
            HistoryEntry::UserMessage { content, .. } => Some(Self {
                role: "user",
                content: content.clone(),
                tool: None,
                args: None,
                at,
            }),
            HistoryEntry::AssistantMessage { content, .. } => Some(Self {
                role: "assistant",
                content: content.clone(),
                tool: None,
                args: None,
                at,
            }),
            HistoryEntry::ToolCall { tool, args, .. } => Some(Self {
                role: "tool_call",
                content: String::new(),
                tool: Some(tool.clone()),
                args: Some(args.clone()),
                at,
            }),
            // Classifications are pipeline bookkeeping, not conversation.
            HistoryEntry::Classification { .. } => None,
            HistoryEntry::ApprovalRequest { tool, .. } => Some(Self {
                role: "command",
                content: format!("approval requested for {tool}"),
                tool: Some(tool.clone()),
                args: None,
                at,
            }),
            HistoryEntry::ApprovalResponse { approved, .. } => Some(Self {
                role: "command",
                content: if *approved {
                    "approved".to_string()
                } else {
                    "denied".to_string()
                },
                tool: None,
                args: None,
                at,
            }),
            HistoryEntry::Error { detail, .. } => Some(Self {
                role: "command",
                content: detail.clone(),
                tool: None,
                args: None,
                at,
            }),
        }
    }
}

/// `GET /sessions/{id}/history?limit=N`
pub(crate) async fn get_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryMessage>>, StatusCode> {
    authorize(&state, &headers)?;
    let id = SessionId(id);
    // 404 for sessions that never existed, even with an empty history.
    state
        .sessions
        .load_state(&id)
        .map_err(|e| map_session_error(&e))?;

    let entries = state
        .sessions
        .load_history(&id)
        .map_err(|e| map_session_error(&e))?;
    let mut rows: Vec<HistoryMessage> = entries.iter().filter_map(HistoryMessage::from_entry).collect();
    if let Some(limit) = query.limit {
        if rows.len() > limit {
            rows.drain(..rows.len() - limit);
        }
    }
    Ok(Json(rows))
}
