use std::time::Duration;

/// Independent per-IP limiter classes. A request may fall into several
/// classes (every API call counts against `General`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitClass {
    General,
    Auth,
    ContentCreation,
    Comments,
    Reports,
}

#[derive(Debug, Clone, Copy)]
pub struct RatePolicy {
    pub window: Duration,
    pub max_requests: u32,
    pub message: &'static str,
    /// Successful responses are refunded instead of counting against the quota.
    pub skip_successful: bool,
}

impl LimitClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitClass::General => "general",
            LimitClass::Auth => "auth",
            LimitClass::ContentCreation => "create",
            LimitClass::Comments => "comment",
            LimitClass::Reports => "report",
        }
    }

    pub fn policy(&self) -> RatePolicy {
        match self {
            LimitClass::General => RatePolicy {
                window: Duration::from_secs(15 * 60),
                max_requests: 100,
                message: "Too many requests, please try again later.",
                skip_successful: false,
            },
            LimitClass::Auth => RatePolicy {
                window: Duration::from_secs(15 * 60),
                max_requests: 5,
                message: "Too many authentication attempts, please wait a moment.",
                skip_successful: true,
            },
            LimitClass::ContentCreation => RatePolicy {
                window: Duration::from_secs(60 * 60),
                max_requests: 10,
                message: "Too many threads created, please wait before posting again.",
                skip_successful: false,
            },
            LimitClass::Comments => RatePolicy {
                window: Duration::from_secs(60 * 60),
                max_requests: 30,
                message: "Too many comments, please slow down.",
                skip_successful: false,
            },
            LimitClass::Reports => RatePolicy {
                window: Duration::from_secs(24 * 60 * 60),
                max_requests: 5,
                message: "Too many reports today, please try again tomorrow.",
                skip_successful: false,
            },
        }
    }
}

/// Limiter classes that gate a request, in the order they are checked.
pub fn classify(method: &str, path: &str) -> Vec<LimitClass> {
    let Some(rest) = path.strip_prefix("/api") else {
        return Vec::new();
    };
    if rest == "/health" {
        return Vec::new();
    }
    if !rest.is_empty() && !rest.starts_with('/') {
        return Vec::new();
    }

    let mut classes = vec![LimitClass::General];
    if method != "POST" {
        return classes;
    }

    let segments: Vec<&str> = rest.trim_matches('/').split('/').collect();
    match segments.as_slice() {
        ["register"] | ["login"] | ["verify-email"] | ["forgot-password"] => {
            classes.push(LimitClass::Auth)
        }
        ["threads"] => classes.push(LimitClass::ContentCreation),
        ["threads", _, "comments"] => classes.push(LimitClass::Comments),
        ["reports"] => classes.push(LimitClass::Reports),
        _ => {}
    }

    classes
}
