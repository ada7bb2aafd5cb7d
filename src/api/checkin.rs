use crate::entities::{check_in, recipient, prelude::*};
use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::error;

fn default_days() -> i64 {
    7
}

const MAX_HISTORY_DAYS: i64 = 3650;

/// `Duration::days` panics outside its supported range, so the
/// caller-supplied day count is clamped before the subtraction.
fn history_cutoff(days: i64) -> chrono::NaiveDateTime {
    chrono::Utc::now().naive_utc() - chrono::Duration::days(days.clamp(0, MAX_HISTORY_DAYS))
}

#[derive(Deserialize)]
pub struct CheckInListQuery {
    pub recipient_id: i32,
    #[serde(default = "default_days")]
    pub days: i64,
}

/// Check-in history for one recipient, newest first, within the last `days`.
pub async fn list_checkins(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(user_id): Extension<i32>,
    Query(query): Query<CheckInListQuery>,
) -> Response {
    // The recipient must belong to the calling caregiver.
    match Recipient::find_by_id(query.recipient_id)
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

    let cutoff = history_cutoff(query.days);

    match CheckIn::find()
        .filter(check_in::Column::RecipientId.eq(query.recipient_id))
        .filter(check_in::Column::CreatedAt.gte(cutoff))
        .order_by_desc(check_in::Column::CreatedAt)
        .all(db.as_ref())
        .await
    {
        Ok(check_ins) => (StatusCode::OK, Json(check_ins)).into_response(),
        Err(e) => {
            error!("Failed to list check-ins: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": e.to_string()})),
            )
                .into_response()
        }
    }
}

pub async fn get_checkin(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(user_id): Extension<i32>,
    Path(checkin_id): Path<i32>,
) -> Response {
    match CheckIn::find_by_id(checkin_id)
        .find_also_related(Recipient)
        .one(db.as_ref())
        .await
    {
        Ok(Some((check_in, Some(recipient)))) if recipient.user_id == user_id => {
            (StatusCode::OK, Json(check_in)).into_response()
        }
        Ok(Some(_)) | Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Check-in not found"})),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::history_cutoff;

    #[test]
    fn history_cutoff_survives_extreme_day_counts() {
        let _ = history_cutoff(i64::MAX);
        let _ = history_cutoff(i64::MIN);
        let _ = history_cutoff(-1);
    }

    #[test]
    fn history_cutoff_clamps_negatives_to_now() {
        let before = chrono::Utc::now().naive_utc();
        let cutoff = history_cutoff(-30);
        let after = chrono::Utc::now().naive_utc();
        assert!(cutoff >= before && cutoff <= after);
    }

    #[test]
    fn history_cutoff_honors_the_window() {
        let cutoff = history_cutoff(7);
        let elapsed = chrono::Utc::now().naive_utc() - cutoff;
        assert!(elapsed >= chrono::Duration::days(7));
        assert!(elapsed < chrono::Duration::days(8));
    }
}
