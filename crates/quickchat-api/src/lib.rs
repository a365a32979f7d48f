use axum::{
    extract::Request,
    http::{Method, StatusCode},
    middleware::{from_fn, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use quickchat_core::AppState;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

pub mod error;
pub mod middleware;
pub mod routes;

pub fn build_router() -> Router<AppState> {
    let cors = build_cors_layer();
    Router::new()
        // Health
        .route("/health", get(health))
        // Auth
        .route("/api/auth/signup", post(routes::auth::signup))
        .route("/api/auth/login", post(routes::auth::login))
        .route("/api/auth/check", get(routes::auth::check))
        .route("/api/auth/profile", put(routes::auth::update_profile))
        // Messages
        .route("/api/messages/users", get(routes::messages::list_contacts))
        .route(
            "/api/messages/send/{user_id}",
            post(routes::messages::send_message),
        )
        .route(
            "/api/messages/mark/{message_id}",
            put(routes::messages::mark_seen),
        )
        .route(
            "/api/messages/{user_id}",
            get(routes::messages::get_conversation),
        )
        // Stored files (avatars and message images)
        .route("/api/files/{*key}", get(routes::files::download_file))
        // Middleware layers
        .layer(cors)
        .layer(from_fn(rate_limit_middleware))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn build_cors_layer() -> tower_http::cors::CorsLayer {
    // Browser clients are served from a different origin during development
    // (vite dev server). Credentials never travel in cookies, so a permissive
    // policy is fine here.
    tower_http::cors::CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(tower_http::cors::Any)
}

async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "service": "quickchat" })),
    )
}

static RATE_LIMIT_STATE: OnceLock<Mutex<HashMap<String, (i64, u32)>>> = OnceLock::new();

const RATE_LIMIT_PER_SECOND: u32 = 100;

fn rate_limit_state() -> &'static Mutex<HashMap<String, (i64, u32)>> {
    RATE_LIMIT_STATE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Fixed-window per-IP limiter, keyed on the first `x-forwarded-for` entry
/// when a proxy sits in front.
async fn rate_limit_middleware(req: Request, next: Next) -> Response {
    let now = chrono::Utc::now().timestamp();
    let key = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("local")
        .to_string();

    let allowed = {
        let mut map = match rate_limit_state().lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let entry = map.entry(key).or_insert((now, 0));
        if entry.0 != now {
            *entry = (now, 0);
        }
        if entry.1 >= RATE_LIMIT_PER_SECOND {
            false
        } else {
            entry.1 += 1;
            true
        }
    };

    if !allowed {
        return crate::error::ApiError::RateLimited.into_response();
    }

    next.run(req).await
}
