use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::debug;
use uuid::Uuid;

use linkus_types::api::{AddContactRequest, Claims, IsContactResponse};
use linkus_types::models::ContactDetail;

use crate::auth::{AppState, run_db};
use crate::convert;
use crate::error::ApiError;
use crate::extract::ApiJson;

pub async fn list_contacts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ContactDetail>>, ApiError> {
    let uid = claims.sub.to_string();
    let rows = run_db(&state, move |db| db.list_contacts(&uid)).await?;
    Ok(Json(rows.into_iter().map(convert::contact_detail).collect()))
}

pub async fn add_contact(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<AddContactRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = claims.sub.to_string();
    let other = req.contact_user_id.to_string();
    let row = run_db(&state, move |db| db.add_contact(&uid, &other)).await?;

    debug!("User {} added contact {}", claims.sub, req.contact_user_id);
    Ok((StatusCode::CREATED, Json(convert::contact(row))))
}

pub async fn is_contact(
    State(state): State<AppState>,
    Path(contact_user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<IsContactResponse>, ApiError> {
    let uid = claims.sub.to_string();
    let other = contact_user_id.to_string();
    let is_contact = run_db(&state, move |db| db.is_contact(&uid, &other)).await?;
    Ok(Json(IsContactResponse { is_contact }))
}

pub async fn remove_contact(
    State(state): State<AppState>,
    Path(contact_user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, ApiError> {
    let uid = claims.sub.to_string();
    let other = contact_user_id.to_string();
    if run_db(&state, move |db| db.remove_contact(&uid, &other)).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}
