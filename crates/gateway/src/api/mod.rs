pub mod auth;
pub mod error;
pub mod login;
pub mod session;

use axum::http::{header, HeaderValue, Method};
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use ng_domain::config::CorsConfig;

use crate::channel;
use crate::state::AppState;

/// Build the full request pipeline around `business`.
///
/// Layers, outermost first:
/// - CORS (so preflights and every response, 429 included, carry the headers)
/// - optional per-IP rate limit
/// - concurrency limit
/// - request tracing
/// - error boundary (panics become the fixed internal-error body)
/// - session attach
/// - basic-auth gate
///
/// The gate is applied with `layer`, not `route_layer`, so it also covers
/// the business router's fallback (static files such as `/lnd.html`).
pub fn app(state: AppState, business: Router<AppState>) -> Router {
    let server = &state.config.server;

    let router = Router::new()
        .route(&server.channel_path, get(channel::channel_ws))
        .route("/connect/:provider", get(login::connect))
        .route("/connect/:provider/callback", get(login::callback))
        .route("/session", get(login::current_session))
        .route("/logout", post(login::logout))
        .merge(business)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::basic_auth_gate,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            session::attach_session,
        ))
        .layer(CatchPanicLayer::custom(error::panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(tower::limit::ConcurrencyLimitLayer::new(
            server.max_concurrent_requests.max(1),
        ));

    // ── Rate-limit layer (per-IP token bucket via governor) ─────────
    let governor_layer = server.rate_limit.as_ref().and_then(|rl| {
        use tower_governor::governor::GovernorConfigBuilder;
        use tower_governor::GovernorLayer;

        let Some(gov_config) = GovernorConfigBuilder::default()
            .per_second(rl.requests_per_second)
            .burst_size(rl.burst_size)
            .finish()
        else {
            tracing::error!("rate_limit: requests_per_second and burst_size must be > 0, limiter disabled");
            return None;
        };

        tracing::info!(
            requests_per_second = rl.requests_per_second,
            burst_size = rl.burst_size,
            "per-IP rate limiting enabled"
        );

        Some(GovernorLayer {
            config: std::sync::Arc::new(gov_config),
        })
    });

    let router = match governor_layer {
        Some(gov) => router.layer(gov),
        None => router,
    };

    router
        .layer(build_cors_layer(&server.cors))
        .with_state(state)
}

/// Build a [`CorsLayer`] from the configured allowed origins.
///
/// Origins may contain a trailing `*` wildcard for the port segment
/// (e.g. `http://localhost:*`).  A literal `"*"` allows all origins.
pub fn build_cors_layer(cors: &CorsConfig) -> CorsLayer {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ];

    // allow_credentials is incompatible with wildcard origins.
    if cors.is_wildcard() {
        tracing::info!("CORS: all origins allowed");
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    }

    let mut exact: Vec<HeaderValue> = Vec::new();
    let mut wildcard_prefixes: Vec<String> = Vec::new();

    for origin in &cors.allowed_origins {
        if origin.ends_with(":*") {
            wildcard_prefixes.push(origin.trim_end_matches('*').to_owned());
        } else if let Ok(hv) = origin.parse::<HeaderValue>() {
            exact.push(hv);
        } else {
            tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
        }
    }

    let allow_origin = if wildcard_prefixes.is_empty() {
        AllowOrigin::list(exact)
    } else {
        AllowOrigin::predicate(move |origin, _| {
            if exact.iter().any(|e| e.as_bytes() == origin.as_bytes()) {
                return true;
            }
            let origin_str = origin.to_str().unwrap_or("");
            wildcard_prefixes.iter().any(|prefix| {
                origin_str
                    .strip_prefix(prefix.as_str())
                    .map(|port| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()))
                    .unwrap_or(false)
            })
        })
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(methods)
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
