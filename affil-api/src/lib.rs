use axum::{
    extract::State,
    http::Method,
    response::IntoResponse,
    Router,
};
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod commissions;
pub mod error;
pub mod relays;
pub mod scheduler;
pub mod settlements;
pub mod state;
pub mod tracking;
pub mod worker;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    // The click endpoint is the only public, unauthenticated surface, so it
    // alone sits behind the per-IP rate limit.
    let click_routes = tracking::routes()
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), rate_limit_middleware));

    Router::new()
        .merge(click_routes)
        .merge(commissions::routes())
        .merge(settlements::routes())
        .merge(relays::routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn rate_limit_middleware(
    State(state): State<AppState>,
    axum::extract::ConnectInfo(addr): axum::extract::ConnectInfo<SocketAddr>,
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> Result<impl IntoResponse, impl IntoResponse> {
    let ip = addr.ip().to_string();
    let key = format!("ratelimit:click:{}", ip);

    match state.redis.check_rate_limit(&key, state.click_rate_limit_per_minute, 60).await {
        Ok(true) => Ok(next.run(req).await),
        Ok(false) => Err((axum::http::StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded")),
        Err(_) => Ok(next.run(req).await), // Fail open
    }
}
