use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::middleware::from_fn_with_state;
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::AppConfig;
use crate::AppState;

mod auth;
mod envelope;
mod error;
mod extract;
mod handlers;
mod middleware;
mod routes;

pub use auth::{AdminUser, AuthUser};
pub use error::AppError;

use middleware::rate_limit::ip_rate_limit_middleware;
use middleware::static_files::{static_headers_middleware, StaticCachePolicy};

/// Room for multipart boundaries and text fields on top of the file itself.
const FORM_OVERHEAD_BYTES: usize = 256 * 1024;

pub fn router(state: AppState, config: &AppConfig) -> Router {
    let api = Router::new()
        .merge(routes::health())
        .merge(routes::auth())
        .merge(routes::threads())
        .merge(routes::comments())
        .merge(routes::categories())
        .merge(routes::users())
        .merge(routes::reports())
        .merge(routes::admin());

    let static_files = Router::new()
        .nest_service("/static", ServeDir::new(state.storage.root()))
        .layer(from_fn_with_state(
            StaticCachePolicy {
                production: config.production,
            },
            static_headers_middleware,
        ));

    let body_limit = state.storage.max_bytes() + FORM_OVERHEAD_BYTES;

    Router::new()
        .nest("/api", api)
        .layer(from_fn_with_state(state.clone(), ip_rate_limit_middleware))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
        .merge(static_files)
        .layer(cors_layer(&config.cors_origins))
        .layer(CompressionLayer::new())
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            HeaderName::from_static("cross-origin-resource-policy"),
            HeaderValue::from_static("cross-origin"),
        ))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = origin.as_str(), "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
        .expose_headers([
            HeaderName::from_static("x-ratelimit-limit"),
            HeaderName::from_static("x-ratelimit-remaining"),
            HeaderName::from_static("x-request-id"),
        ])
}
