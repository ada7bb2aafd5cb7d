use crate::entities::{check_in, recipient, user};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter};

pub async fn init_metrics(db: &DatabaseConnection) {
    // Total counts
    let user_count = user::Entity::find().count(db).await.unwrap_or(0);
    metrics::gauge!("carecall_users_total").set(user_count as f64);

    let recipient_count = recipient::Entity::find().count(db).await.unwrap_or(0);
    metrics::gauge!("carecall_recipients_total").set(recipient_count as f64);

    let check_in_count = check_in::Entity::find().count(db).await.unwrap_or(0);
    metrics::gauge!("carecall_check_ins_total").set(check_in_count as f64);

    // Per-status breakdown so dashboards can show answer rates.
    use check_in::CheckInStatus;
    for status in [
        CheckInStatus::Pending,
        CheckInStatus::NoAnswer,
        CheckInStatus::Ok,
        CheckInStatus::Concern,
        CheckInStatus::Emergency,
    ] {
        let count = check_in::Entity::find()
            .filter(check_in::Column::Status.eq(status))
            .count(db)
            .await
            .unwrap_or(0);
        metrics::gauge!("carecall_check_ins_by_status", "status" => status.as_str())
            .set(count as f64);
    }

    tracing::info!(
        "Initialized metrics: Users={}, Recipients={}, CheckIns={}",
        user_count,
        recipient_count,
        check_in_count
    );
}

pub fn increment_users_registered() {
    metrics::counter!("carecall_users_registered_total").increment(1);
    metrics::gauge!("carecall_users_total").increment(1.0);
}

pub fn increment_recipients() {
    metrics::gauge!("carecall_recipients_total").increment(1.0);
}

pub fn decrement_recipients() {
    metrics::gauge!("carecall_recipients_total").decrement(1.0);
}

pub fn increment_checkins_triggered() {
    metrics::counter!("carecall_check_ins_triggered_total").increment(1);
    metrics::gauge!("carecall_check_ins_total").increment(1.0);
}

pub fn increment_checkins_completed(status: &'static str) {
    metrics::counter!("carecall_check_ins_completed_total", "status" => status).increment(1);
}

pub fn increment_notifications_sent(channel: &str) {
    metrics::counter!("carecall_notifications_sent_total", "channel" => channel.to_string())
        .increment(1);
}

pub fn increment_notifications_failed(channel: &str) {
    metrics::counter!("carecall_notifications_failed_total", "channel" => channel.to_string())
        .increment(1);
}

pub fn increment_login_codes_sent() {
    metrics::counter!("carecall_login_codes_sent_total").increment(1);
}
