use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use linkus_db::StoreError;
use linkus_db::messages::NewMessage;
use linkus_types::api::{Claims, SendMessageRequest};
use linkus_types::models::Message;

use crate::auth::{AppState, run_db};
use crate::conversations::require_participant;
use crate::convert;
use crate::error::{ApiError, validate};
use crate::extract::ApiJson;

const MAX_PAGE: u32 = 200;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Number of newer messages to skip; 0 is the latest page.
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    50
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// Non-participants get an empty page rather than an error.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let cid = conversation_id.to_string();
    let uid = claims.sub.to_string();
    let limit = query.limit.min(MAX_PAGE);
    let offset = query.offset;

    let rows = run_db(&state, move |db| {
        match db.get_conversation_messages(&cid, &uid, limit, offset) {
            Err(StoreError::Unauthorized) => {
                debug!("User {} is not in conversation {}", uid, cid);
                Ok(vec![])
            }
            other => other,
        }
    })
    .await?;

    Ok(Json(rows.into_iter().map(convert::message).collect()))
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate(&req)?;
    require_participant(&state, conversation_id, claims.sub).await?;

    let new_message = NewMessage {
        conversation_id: conversation_id.to_string(),
        sender_id: claims.sub.to_string(),
        content: req.content,
        message_type: req.message_type.as_str().to_string(),
        file_url: req.file_url,
        file_name: req.file_name,
        file_size: req.file_size,
    };
    let row = run_db(&state, move |db| db.create_message(new_message)).await?;

    debug!("User {} posted {} in {}", claims.sub, row.id, conversation_id);
    Ok((StatusCode::CREATED, Json(convert::message(row))))
}

pub async fn search_messages(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let uid = claims.sub.to_string();
    let rows = run_db(&state, move |db| db.search_messages(&uid, &query.q)).await?;
    Ok(Json(rows.into_iter().map(convert::message).collect()))
}
