use crate::entities::{check_in, recipient, prelude::*};
use crate::pipeline::{CheckInPipeline, PipelineError};
use axum::{
    extract::{Extension, Json, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, ModelTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

/// Strict E.164-like check: leading '+' followed by 8-15 digits.
pub fn is_valid_phone(phone: &str) -> bool {
    let Some(digits) = phone.strip_prefix('+') else {
        return false;
    };
    (8..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
}

/// Preferred check-in time, "HH:MM" interpreted as UTC.
pub fn is_valid_preferred_time(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.len() != 5 || bytes[2] != b':' {
        return false;
    }
    let (Ok(h), Ok(m)) = (value[0..2].parse::<u8>(), value[3..5].parse::<u8>()) else {
        return false;
    };
    h < 24 && m < 60
}

#[derive(Serialize)]
pub struct RecipientWithCheckIns {
    #[serde(flatten)]
    pub recipient: recipient::Model,
    pub check_ins: Vec<check_in::Model>,
}

#[derive(Deserialize)]
pub struct CreateRecipientRequest {
    pub name: String,
    pub phone_number: String,
    pub condition: String,
    pub preferred_time: String,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
    pub emergency_contact_email: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateRecipientRequest {
    pub name: Option<String>,
    pub phone_number: Option<String>,
    pub condition: Option<String>,
    pub preferred_time: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
    pub emergency_contact_email: Option<String>,
}

pub async fn list_recipients(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(user_id): Extension<i32>,
) -> Response {
    match Recipient::find()
        .filter(recipient::Column::UserId.eq(user_id))
        .find_with_related(CheckIn)
        .order_by_desc(check_in::Column::CreatedAt)
        .all(db.as_ref())
        .await
    {
        Ok(rows) => {
            let response: Vec<RecipientWithCheckIns> = rows
                .into_iter()
                .map(|(recipient, check_ins)| RecipientWithCheckIns {
                    recipient,
                    check_ins,
                })
                .collect();
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => {
            error!("Failed to list recipients: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": e.to_string()})),
            )
                .into_response()
        }
    }
}

pub async fn get_recipient(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(user_id): Extension<i32>,
    Path(recipient_id): Path<i32>,
) -> Response {
    let recipient = match Recipient::find_by_id(recipient_id)
        .filter(recipient::Column::UserId.eq(user_id))
        .one(db.as_ref())
        .await
    {
        Ok(Some(r)) => r,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({"error": "Recipient not found"})),
            )
                .into_response()
        }
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": e.to_string()})),
            )
                .into_response()
        }
    };

    match recipient
        .find_related(CheckIn)
        .order_by_desc(check_in::Column::CreatedAt)
        .all(db.as_ref())
        .await
    {
        Ok(check_ins) => (
            StatusCode::OK,
            Json(RecipientWithCheckIns {
                recipient,
                check_ins,
            }),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}

pub async fn create_recipient(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(user_id): Extension<i32>,
    Json(payload): Json<CreateRecipientRequest>,
) -> Response {
    if !is_valid_phone(&payload.phone_number) {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"error": "phone_number must be E.164, e.g. +15551234567"})),
        )
            .into_response();
    }
    if let Some(phone) = payload.emergency_contact_phone.as_deref() {
        if !is_valid_phone(phone) {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({"error": "emergency_contact_phone must be E.164"})),
            )
                .into_response();
        }
    }
    if !is_valid_preferred_time(&payload.preferred_time) {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"error": "preferred_time must be HH:MM"})),
        )
            .into_response();
    }

    let now = chrono::Utc::now().naive_utc();
    let new_recipient = recipient::ActiveModel {
        user_id: Set(user_id),
        name: Set(payload.name),
        phone_number: Set(payload.phone_number),
        condition: Set(payload.condition),
        preferred_time: Set(payload.preferred_time),
        emergency_contact_name: Set(payload.emergency_contact_name),
        emergency_contact_phone: Set(payload.emergency_contact_phone),
        emergency_contact_email: Set(payload.emergency_contact_email),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    match new_recipient.insert(db.as_ref()).await {
        Ok(r) => {
            info!(recipient_id = r.id, user_id, "Recipient created");
            crate::metrics::increment_recipients();
            (StatusCode::CREATED, Json(r)).into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}

pub async fn update_recipient(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(user_id): Extension<i32>,
    Path(recipient_id): Path<i32>,
    Json(payload): Json<UpdateRecipientRequest>,
) -> Response {
    let recipient = match Recipient::find_by_id(recipient_id)
        .filter(recipient::Column::UserId.eq(user_id))
        .one(db.as_ref())
        .await
    {
        Ok(Some(r)) => r,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({"error": "Recipient not found"})),
            )
                .into_response()
        }
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": e.to_string()})),
            )
                .into_response()
        }
    };

    if let Some(phone) = payload.phone_number.as_deref() {
        if !is_valid_phone(phone) {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({"error": "phone_number must be E.164, e.g. +15551234567"})),
            )
                .into_response();
        }
    }
    if let Some(time) = payload.preferred_time.as_deref() {
        if !is_valid_preferred_time(time) {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({"error": "preferred_time must be HH:MM"})),
            )
                .into_response();
        }
    }

    let mut active = recipient.into_active_model();
    if let Some(name) = payload.name {
        active.name = Set(name);
    }
    if let Some(phone) = payload.phone_number {
        active.phone_number = Set(phone);
    }
    if let Some(condition) = payload.condition {
        active.condition = Set(condition);
    }
    if let Some(time) = payload.preferred_time {
        active.preferred_time = Set(time);
    }
    if let Some(name) = payload.emergency_contact_name {
        active.emergency_contact_name = Set(Some(name));
    }
    if let Some(phone) = payload.emergency_contact_phone {
        active.emergency_contact_phone = Set(Some(phone));
    }
    if let Some(email) = payload.emergency_contact_email {
        active.emergency_contact_email = Set(Some(email));
    }
    active.updated_at = Set(chrono::Utc::now().naive_utc());

    match active.update(db.as_ref()).await {
        Ok(r) => {
            info!(recipient_id = r.id, user_id, "Recipient updated");
            (StatusCode::OK, Json(r)).into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}

pub async fn delete_recipient(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(user_id): Extension<i32>,
    Path(recipient_id): Path<i32>,
) -> Response {
    let recipient = match Recipient::find_by_id(recipient_id)
        .filter(recipient::Column::UserId.eq(user_id))
        .one(db.as_ref())
        .await
    {
        Ok(Some(r)) => r,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({"error": "Recipient not found"})),
            )
                .into_response()
        }
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": e.to_string()})),
            )
                .into_response()
        }
    };

    // Check-ins go with the recipient via the FK cascade.
    match recipient.delete(db.as_ref()).await {
        Ok(_) => {
            info!(recipient_id, user_id, "Recipient deleted");
            crate::metrics::decrement_recipients();
            (StatusCode::OK, Json(json!({"message": "Recipient deleted"}))).into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}

/// Triggers an immediate check-in call. Ownership is verified here; the
/// pipeline itself does not know about caregivers.
pub async fn call_now(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(user_id): Extension<i32>,
    Extension(pipeline): Extension<CheckInPipeline>,
    Path(recipient_id): Path<i32>,
) -> Response {
    match Recipient::find_by_id(recipient_id)
        .filter(recipient::Column::UserId.eq(user_id))
        .one(db.as_ref())
        .await
    {
        Ok(Some(_)) => {}
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({"error": "Recipient not found"})),
            )
                .into_response()
        }
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": e.to_string()})),
            )
                .into_response()
        }
    }

    match pipeline.trigger(recipient_id).await {
        Ok(record) => {
            tracing::Span::current()
                .record("check_in_id", record.id)
                .record("action", "trigger_check_in");
            (StatusCode::CREATED, Json(record)).into_response()
        }
        Err(PipelineError::RecipientNotFound) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Recipient not found"})),
        )
            .into_response(),
        Err(PipelineError::Db(e)) => {
            error!("Check-in trigger failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": e.to_string()})),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{is_valid_phone, is_valid_preferred_time};

    #[test]
    fn phone_validation_accepts_e164() {
        assert!(is_valid_phone("+15551234567"));
        assert!(is_valid_phone("+4915112345678"));
    }

    #[test]
    fn phone_validation_rejects_malformed_numbers() {
        assert!(!is_valid_phone("15551234567")); // missing '+'
        assert!(!is_valid_phone("+1555123")); // too short
        assert!(!is_valid_phone("+1555123456789012")); // too long
        assert!(!is_valid_phone("+1555-123-4567"));
        assert!(!is_valid_phone(""));
    }

    #[test]
    fn preferred_time_validation() {
        assert!(is_valid_preferred_time("09:00"));
        assert!(is_valid_preferred_time("23:59"));
        assert!(!is_valid_preferred_time("24:00"));
        assert!(!is_valid_preferred_time("9:00"));
        assert!(!is_valid_preferred_time("09:60"));
        assert!(!is_valid_preferred_time("0900"));
    }
}
