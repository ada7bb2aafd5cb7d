use axum::{
    routing::{get, post},
    Extension, Router,
};
use carecall_server::calls::TwilioCallClient;
use carecall_server::gemini::GeminiClient;
use carecall_server::notifications::TwilioNotifier;
use carecall_server::pipeline::CheckInPipeline;
use carecall_server::scripts::ScriptGenerator;
use carecall_server::{api, migrator};
use sea_orm::{Database, DatabaseConnection};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Load .env if present (dotenvy)
    dotenvy::dotenv().ok();

    carecall_server::telemetry::init_telemetry("carecall-server");

    let (prometheus_layer, metric_handle) = axum_prometheus::PrometheusMetricLayer::pair();

    // Database Connection
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let db = Arc::new(
        Database::connect(&database_url)
            .await
            .expect("Failed to connect to database"),
    );

    // Redis Connection (sessions, login codes, rate limits)
    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    let redis_client = redis::Client::open(redis_url).expect("Invalid Redis URL");

    // Run migrations
    use sea_orm_migration::MigratorTrait;
    migrator::Migrator::up(db.as_ref(), None)
        .await
        .expect("Failed to run migrations");

    // Initialize Metrics
    carecall_server::metrics::init_metrics(db.as_ref()).await;

    // Twilio must be able to reach the webhook endpoints under this URL.
    let base_url =
        std::env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:8000".to_string());

    let notifier = TwilioNotifier::new();
    let pipeline = CheckInPipeline::new(
        db.clone(),
        Arc::new(TwilioCallClient::new()),
        Arc::new(notifier.clone()),
        ScriptGenerator::new(GeminiClient::new()),
        base_url,
    );

    let app = app(db, redis_client, notifier, pipeline, prometheus_layer, metric_handle);

    let addr = SocketAddr::from(([0, 0, 0, 0], 8000));
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

async fn health_check() -> &'static str {
    "OK"
}

fn app(
    db: Arc<DatabaseConnection>,
    redis_client: redis::Client,
    notifier: TwilioNotifier,
    pipeline: CheckInPipeline,
    prometheus_layer: axum_prometheus::PrometheusMetricLayer<'static>,
    metric_handle: metrics_exporter_prometheus::PrometheusHandle,
) -> Router {
    // Twilio webhooks and the login flow have no session to present.
    let public_routes = Router::new()
        .route("/api/auth/login/email", post(api::auth::login_email))
        .route("/api/auth/verify", post(api::auth::verify_code))
        .route("/api/twilio/voice", post(api::webhook::handle_voice))
        .route("/api/twilio/status", post(api::webhook::handle_status));

    let protected_routes = Router::new()
        .route("/api/auth/me", get(api::auth::me))
        .route("/api/auth/logout", post(api::auth::logout))
        .route(
            "/api/recipients",
            get(api::recipient::list_recipients).post(api::recipient::create_recipient),
        )
        .route(
            "/api/recipients/:id",
            get(api::recipient::get_recipient)
                .put(api::recipient::update_recipient)
                .delete(api::recipient::delete_recipient),
        )
        .route("/api/recipients/:id/call-now", post(api::recipient::call_now))
        .route("/api/checkins", get(api::checkin::list_checkins))
        .route("/api/checkins/:id", get(api::checkin::get_checkin))
        .route_layer(axum::middleware::from_fn(api::middleware::auth_middleware));

    Router::new()
        .route("/health", get(health_check))
        .merge(public_routes)
        .merge(protected_routes)
        .layer(Extension(db))
        .layer(Extension(redis_client))
        .layer(Extension(notifier))
        .layer(Extension(pipeline))
        .layer(tower_cookies::CookieManagerLayer::new())
        .layer(prometheus_layer)
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<axum::body::Body>| {
                    let matched_path = request
                        .extensions()
                        .get::<axum::extract::MatchedPath>()
                        .map(|matched| matched.as_str());

                    // Span name: "METHOD /path" (e.g., "POST /api/recipients")
                    let span_name = if let Some(path) = matched_path {
                        format!("{} {}", request.method(), path)
                    } else {
                        format!("{} {}", request.method(), request.uri().path())
                    };

                    tracing::info_span!(
                        "request",
                        "otel.name" = span_name,
                        method = ?request.method(),
                        uri = ?request.uri(),
                        // Fields filled in by handlers
                        action = tracing::field::Empty,
                        user_id = tracing::field::Empty,
                        check_in_id = tracing::field::Empty,
                        error = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency = tracing::field::Empty,
                    )
                })
                .on_request(
                    |_request: &axum::http::Request<axum::body::Body>, _span: &tracing::Span| {
                        // Skip the default "started processing request" event
                    },
                )
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        span.record("status", tracing::field::display(response.status()));
                        span.record("latency", tracing::field::debug(latency));
                        tracing::info!("request completed");
                    },
                ),
        )
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin([
                    "https://carecall.club"
                        .parse::<axum::http::HeaderValue>()
                        .unwrap(),
                    "https://www.carecall.club"
                        .parse::<axum::http::HeaderValue>()
                        .unwrap(),
                    "http://localhost:3000"
                        .parse::<axum::http::HeaderValue>()
                        .unwrap(),
                ])
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::PUT,
                    axum::http::Method::DELETE,
                ])
                .allow_headers([axum::http::header::CONTENT_TYPE])
                .allow_credentials(true),
        )
        .route("/metrics", get(|| async move { metric_handle.render() }))
}
