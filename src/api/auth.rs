use crate::entities::user;
use crate::notifications::{NotificationTemplates, TwilioNotifier};
use axum::{
    extract::{Extension, Json},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use async_trait::async_trait;
use redis::AsyncCommands;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde_json::json;
use std::sync::Arc;
use tower_cookies::{Cookie, Cookies};
use tracing::{error, info, warn};

pub const SESSION_COOKIE: &str = "carecall_session";
const SESSION_TTL_SECS: u64 = 60 * 60 * 24; // 24 hours
const CODE_TTL_SECS: u64 = 60 * 10;
const RATE_WINDOW_SECS: i64 = 60 * 15;
const RATE_MAX_ATTEMPTS: i64 = 5;
const VERIFY_MAX_ATTEMPTS: i64 = 5;

fn session_key(token: &str) -> String {
    format!("session:{}", token)
}

fn code_key(email: &str) -> String {
    format!("login_code:{}", email.to_lowercase())
}

fn rate_key(email: &str) -> String {
    format!("login_rate:{}", email.to_lowercase())
}

fn verify_rate_key(email: &str) -> String {
    format!("login_verify_rate:{}", email.to_lowercase())
}

/// Counter bumps shared by the issuance and verification limits. The seam
/// exists so the TTL behavior is testable without a Redis server.
#[async_trait]
trait AttemptStore: Send {
    async fn incr(&mut self, key: &str) -> Result<i64, String>;
    async fn expire(&mut self, key: &str, secs: i64) -> Result<(), String>;
}

#[async_trait]
impl AttemptStore for redis::aio::MultiplexedConnection {
    async fn incr(&mut self, key: &str) -> Result<i64, String> {
        AsyncCommands::incr(self, key, 1)
            .await
            .map_err(|e| e.to_string())
    }

    async fn expire(&mut self, key: &str, secs: i64) -> Result<(), String> {
        let _: () = AsyncCommands::expire(self, key, secs)
            .await
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}

/// Increments the attempt counter and refreshes its TTL on every call; a
/// one-shot EXPIRE that gets lost would leave the counter permanent.
async fn bump_attempts<S: AttemptStore>(store: &mut S, key: &str) -> Result<i64, String> {
    let attempts = store.incr(key).await?;
    let _ = store.expire(key, RATE_WINDOW_SECS).await;
    Ok(attempts)
}

#[derive(Debug, PartialEq)]
enum CodeCheck {
    TooManyAttempts,
    Rejected,
    Accepted,
}

/// The attempt limit is checked before the comparison, so once an address
/// is over the limit even the right code is refused.
fn check_submitted_code(stored: Option<&str>, submitted: &str, attempts: i64) -> CodeCheck {
    if attempts > VERIFY_MAX_ATTEMPTS {
        return CodeCheck::TooManyAttempts;
    }
    match stored {
        Some(code) if code == submitted.trim() => CodeCheck::Accepted,
        _ => CodeCheck::Rejected,
    }
}

#[derive(serde::Deserialize)]
pub struct EmailLoginRequest {
    email: String,
}

/// Starts the email login flow: rate-limits per address, stores a four-digit
/// code under a TTL key and emails it. Codes and limits live in Redis so any
/// instance can verify what another one issued.
pub async fn login_email(
    Extension(redis_client): Extension<redis::Client>,
    Extension(notifier): Extension<TwilioNotifier>,
    Json(payload): Json<EmailLoginRequest>,
) -> Response {
    let email = payload.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"error": "Invalid email address"})),
        )
            .into_response();
    }

    let mut conn = match redis_client.get_multiplexed_async_connection().await {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to get redis conn: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Service unavailable"})),
            )
                .into_response();
        }
    };

    // Max 5 code requests per address per 15 minutes.
    let attempts = match bump_attempts(&mut conn, &rate_key(&email)).await {
        Ok(n) => n,
        Err(e) => {
            error!("Rate limit check failed: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Service unavailable"})),
            )
                .into_response();
        }
    };
    if attempts > RATE_MAX_ATTEMPTS {
        warn!(email = %email, "Login code rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"error": "Too many verification code requests. Please wait 15 minutes."})),
        )
            .into_response();
    }

    // Four digits reads well over the phone and in email.
    let code = format!("{:04}", uuid::Uuid::new_v4().as_u128() % 10_000);
    if let Err(e) = conn
        .set_ex::<_, _, ()>(code_key(&email), &code, CODE_TTL_SECS)
        .await
    {
        error!("Failed to store login code: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "Service unavailable"})),
        )
            .into_response();
    }

    let body = NotificationTemplates::login_code_email(&code);
    if let Err(e) = notifier
        .send_email(&email, "Your CareCall verification code", &body)
        .await
    {
        error!("Failed to send login code email: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "Failed to send verification code"})),
        )
            .into_response();
    }

    crate::metrics::increment_login_codes_sent();
    info!(email = %email, "Verification code sent");
    (StatusCode::OK, Json(json!({"message": "Verification code sent"}))).into_response()
}

#[derive(serde::Deserialize)]
pub struct VerifyCodeRequest {
    email: String,
    code: String,
    name: Option<String>,
}

/// Verifies the emailed code, creates the caregiver account on first login
/// and sets the session cookie. Sessions are UUID tokens in Redis with a
/// 24h TTL.
pub async fn verify_code(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(redis_client): Extension<redis::Client>,
    cookies: Cookies,
    Json(payload): Json<VerifyCodeRequest>,
) -> Response {
    let email = payload.email.trim().to_lowercase();

    let mut conn = match redis_client.get_multiplexed_async_connection().await {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to get redis conn: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Service unavailable"})),
            )
                .into_response();
        }
    };

    // A four-digit code cannot survive unlimited guessing inside its TTL,
    // so verification attempts are limited per address as well.
    let attempts = match bump_attempts(&mut conn, &verify_rate_key(&email)).await {
        Ok(n) => n,
        Err(e) => {
            error!("Verify rate limit check failed: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Service unavailable"})),
            )
                .into_response();
        }
    };

    let stored: Option<String> = match conn.get(code_key(&email)).await {
        Ok(v) => v,
        Err(e) => {
            error!("Failed to read login code: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Service unavailable"})),
            )
                .into_response();
        }
    };

    match check_submitted_code(stored.as_deref(), &payload.code, attempts) {
        CodeCheck::TooManyAttempts => {
            warn!(email = %email, "Verification attempt limit exceeded");
            return (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({"error": "Too many verification attempts. Please request a new code."})),
            )
                .into_response();
        }
        CodeCheck::Rejected => {
            warn!(email = %email, "Invalid or expired verification code");
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "Invalid or expired verification code"})),
            )
                .into_response();
        }
        CodeCheck::Accepted => {
            // Single use.
            let _: Result<(), _> = conn.del(code_key(&email)).await;
            let _: Result<(), _> = conn.del(verify_rate_key(&email)).await;
        }
    }

    let existing = match user::Entity::find()
        .filter(user::Column::Email.eq(email.clone()))
        .one(db.as_ref())
        .await
    {
        Ok(u) => u,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": e.to_string()})),
            )
                .into_response()
        }
    };

    let user = match existing {
        Some(u) => u,
        None => {
            let now = chrono::Utc::now().naive_utc();
            let name = payload
                .name
                .unwrap_or_else(|| email.split('@').next().unwrap_or("Caregiver").to_string());
            let new_user = user::ActiveModel {
                email: Set(email.clone()),
                name: Set(name),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            };
            match new_user.insert(db.as_ref()).await {
                Ok(u) => {
                    crate::metrics::increment_users_registered();
                    info!(user_id = u.id, "Caregiver registered");
                    u
                }
                Err(e) => {
                    return (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({"error": e.to_string()})),
                    )
                        .into_response()
                }
            }
        }
    };

    let token = uuid::Uuid::new_v4().to_string();
    if let Err(e) = conn
        .set_ex::<_, _, ()>(session_key(&token), user.id, SESSION_TTL_SECS)
        .await
    {
        error!("Failed to store session: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "Service unavailable"})),
        )
            .into_response();
    }

    let mut cookie = Cookie::new(SESSION_COOKIE, token);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookies.add(cookie);

    tracing::Span::current()
        .record("user_id", user.id)
        .record("action", "login_user");

    (
        StatusCode::OK,
        Json(json!({"id": user.id, "email": user.email, "name": user.name})),
    )
        .into_response()
}

pub async fn me(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(user_id): Extension<i32>,
) -> Response {
    match user::Entity::find_by_id(user_id).one(db.as_ref()).await {
        Ok(Some(u)) => (
            StatusCode::OK,
            Json(json!({"id": u.id, "email": u.email, "name": u.name})),
        )
            .into_response(),
        Ok(None) => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "User not found"})),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}

pub async fn logout(
    Extension(redis_client): Extension<redis::Client>,
    cookies: Cookies,
) -> Response {
    if let Some(cookie) = cookies.get(SESSION_COOKIE) {
        if let Ok(mut conn) = redis_client.get_multiplexed_async_connection().await {
            let _: Result<(), _> = conn.del(session_key(cookie.value())).await;
        }
        let mut removal = Cookie::new(SESSION_COOKIE, "");
        removal.set_path("/");
        cookies.remove(removal);
    }

    (StatusCode::OK, Json(json!({"message": "Logged out"}))).into_response()
}

#[cfg(test)]
mod tests {
    use super::{bump_attempts, check_submitted_code, AttemptStore, CodeCheck, VERIFY_MAX_ATTEMPTS};
    use async_trait::async_trait;

    struct FakeAttemptStore {
        attempts: i64,
        expire_calls: usize,
    }

    #[async_trait]
    impl AttemptStore for FakeAttemptStore {
        async fn incr(&mut self, _key: &str) -> Result<i64, String> {
            self.attempts += 1;
            Ok(self.attempts)
        }

        async fn expire(&mut self, _key: &str, _secs: i64) -> Result<(), String> {
            self.expire_calls += 1;
            Ok(())
        }
    }

    #[tokio::test]
    async fn every_counter_bump_refreshes_the_ttl() {
        let mut store = FakeAttemptStore {
            attempts: 0,
            expire_calls: 0,
        };
        for expected in 1..=3 {
            let n = bump_attempts(&mut store, "login_rate:a@b.c").await.unwrap();
            assert_eq!(n, expected);
        }
        assert_eq!(store.expire_calls, 3);
    }

    #[test]
    fn matching_code_is_accepted_within_the_limit() {
        assert_eq!(
            check_submitted_code(Some("1234"), "1234", 1),
            CodeCheck::Accepted
        );
        assert_eq!(
            check_submitted_code(Some("1234"), " 1234 ", 1),
            CodeCheck::Accepted
        );
    }

    #[test]
    fn wrong_or_expired_codes_are_rejected() {
        assert_eq!(
            check_submitted_code(Some("1234"), "9999", 1),
            CodeCheck::Rejected
        );
        assert_eq!(check_submitted_code(None, "1234", 1), CodeCheck::Rejected);
    }

    #[test]
    fn guessing_is_cut_off_even_with_the_right_code() {
        assert_eq!(
            check_submitted_code(Some("1234"), "1234", VERIFY_MAX_ATTEMPTS + 1),
            CodeCheck::TooManyAttempts
        );
    }
}
