use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{debug, info};
use uuid::Uuid;

use linkus_db::StoreError;
use linkus_types::api::{
    AddParticipantRequest, Claims, ConversationIdResponse, CreateGroupRequest,
    OpenPrivateConversationRequest,
};
use linkus_types::models::ConversationSummary;

use crate::auth::{AppState, run_db};
use crate::convert::{self, parse_id};
use crate::error::ApiError;
use crate::extract::ApiJson;

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    let uid = claims.sub.to_string();
    let rows = run_db(&state, move |db| db.get_user_conversations(&uid)).await?;
    Ok(Json(rows.into_iter().map(convert::conversation).collect()))
}

pub async fn open_private(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<OpenPrivateConversationRequest>,
) -> Result<Json<ConversationIdResponse>, ApiError> {
    let uid = claims.sub.to_string();
    let other = req.user_id.to_string();
    let id = run_db(&state, move |db| db.get_or_create_private_conversation(&uid, &other)).await?;

    debug!("Private conversation {} for {} and {}", id, claims.sub, req.user_id);
    Ok(Json(ConversationIdResponse {
        conversation_id: parse_id(&id, "conversation"),
    }))
}

pub async fn create_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<CreateGroupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = claims.sub.to_string();
    let members: Vec<String> = req.member_ids.iter().map(Uuid::to_string).collect();
    let id = run_db(&state, move |db| db.create_group_conversation(&uid, &members)).await?;

    info!("User {} created group conversation {}", claims.sub, id);
    Ok((
        StatusCode::CREATED,
        Json(ConversationIdResponse {
            conversation_id: parse_id(&id, "conversation"),
        }),
    ))
}

pub async fn add_participant(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<AddParticipantRequest>,
) -> Result<StatusCode, ApiError> {
    let cid = conversation_id.to_string();
    let actor = claims.sub.to_string();
    let new_member = req.user_id.to_string();
    run_db(&state, move |db| db.add_participant(&cid, &actor, &new_member)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Leave a conversation. The conversation itself goes away with its last member.
pub async fn leave_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, ApiError> {
    let cid = conversation_id.to_string();
    let uid = claims.sub.to_string();
    let removed = run_db(&state, move |db| db.delete_conversation(&cid, &uid)).await?;

    if removed {
        info!("Conversation {} removed after its last participant left", conversation_id);
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, ApiError> {
    let cid = conversation_id.to_string();
    let uid = claims.sub.to_string();
    run_db(&state, move |db| db.update_last_read(&cid, &uid)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Membership check shared by the message handlers. Non-members get 404.
pub(crate) async fn require_participant(
    state: &AppState,
    conversation_id: Uuid,
    user_id: Uuid,
) -> Result<(), ApiError> {
    let cid = conversation_id.to_string();
    let uid = user_id.to_string();
    if run_db(state, move |db| db.is_participant(&cid, &uid)).await? {
        Ok(())
    } else {
        Err(StoreError::Unauthorized.into())
    }
}
