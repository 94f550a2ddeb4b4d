use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;

use crate::app::rate_limiter::{RateLimitInfo, RateLimiter};
use crate::config::rate_limits::{classify, LimitClass};
use crate::http::AppError;
use crate::AppState;

const LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// Per-IP limiter covering every `/api` route except health. Each request
/// is checked against all classes it belongs to, general first.
pub async fn ip_rate_limit_middleware(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let classes = classify(request.method().as_str(), request.uri().path());
    if classes.is_empty() {
        return next.run(request).await;
    }

    let ip = addr.ip().to_string();
    let limiter = RateLimiter::new(state.cache.clone());

    let mut recorded: Vec<(LimitClass, RateLimitInfo)> = Vec::with_capacity(classes.len());
    for class in classes {
        let info = match limiter.hit(&ip, class).await {
            Ok(info) => info,
            Err(err) => {
                tracing::error!(error = ?err, ip = ip, class = class.as_str(), "failed to check rate limit");
                return AppError::internal("failed to check rate limit").into_response();
            }
        };

        if info.limited {
            tracing::warn!(ip = ip, class = class.as_str(), "IP rate limit exceeded");
            let mut response = AppError::rate_limited(class.policy().message).into_response();
            set_quota_headers(&mut response, &info);
            return response;
        }
        recorded.push((class, info));
    }

    let mut response = next.run(request).await;

    if response.status().is_success() {
        for (class, info) in &recorded {
            if !class.policy().skip_successful {
                continue;
            }
            if let Err(err) = limiter.refund(&ip, *class, &info.member).await {
                tracing::warn!(error = ?err, ip = ip, class = class.as_str(), "failed to refund rate limit hit");
            }
        }
    }

    if let Some((_, info)) = recorded.last() {
        set_quota_headers(&mut response, info);
    }
    response
}

fn set_quota_headers(response: &mut Response, info: &RateLimitInfo) {
    let headers = response.headers_mut();
    headers.insert(LIMIT_HEADER, HeaderValue::from(info.limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(info.remaining));
}
