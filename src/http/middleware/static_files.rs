use axum::extract::{Request, State};
use axum::http::{header, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;

const IMAGE_MAX_AGE: &str = "public, max-age=604800";
const PRODUCTION_MAX_AGE: &str = "public, max-age=604800";
const DEVELOPMENT_MAX_AGE: &str = "public, max-age=3600";

#[derive(Debug, Clone, Copy)]
pub struct StaticCachePolicy {
    pub production: bool,
}

impl StaticCachePolicy {
    fn cache_control(&self, content_type: Option<&str>) -> &'static str {
        let is_image = content_type
            .map(|value| value.starts_with("image/"))
            .unwrap_or(false);
        if is_image {
            IMAGE_MAX_AGE
        } else if self.production {
            PRODUCTION_MAX_AGE
        } else {
            DEVELOPMENT_MAX_AGE
        }
    }
}

/// Cache and cross-origin headers for files served from `/static`.
pub async fn static_headers_middleware(
    State(policy): State<StaticCachePolicy>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    if !response.status().is_success() {
        return response;
    }

    let cache_control = policy.cache_control(
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok()),
    );
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(cache_control));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        "cross-origin-resource-policy",
        HeaderValue::from_static("cross-origin"),
    );
    response
}
