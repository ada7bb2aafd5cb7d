use axum::{
    extract::{Extension, Request},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use redis::AsyncCommands;
use serde_json::json;
use tower_cookies::Cookies;

/// Resolves the session cookie against Redis and injects the caregiver id as
/// a request extension. Sessions expire server-side via the key TTL.
pub async fn auth_middleware(
    cookies: Cookies,
    Extension(redis_client): Extension<redis::Client>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(cookie) = cookies.get(super::auth::SESSION_COOKIE) {
        if let Ok(mut conn) = redis_client.get_multiplexed_async_connection().await {
            let key = format!("session:{}", cookie.value());
            if let Ok(Some(user_id)) = conn.get::<_, Option<i32>>(key).await {
                request.extensions_mut().insert(user_id);
                return next.run(request).await;
            }
        }
    }
    (StatusCode::UNAUTHORIZED, Json(json!({"error": "Unauthorized"}))).into_response()
}
