use axum::Json;
use serde::Serialize;

/// Success body shared by every endpoint: `{ok: true, message?, ...payload}`.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(flatten)]
    payload: T,
}

/// Payload for responses that only acknowledge.
#[derive(Debug, Serialize)]
pub struct Empty {}

impl<T: Serialize> Envelope<T> {
    pub fn ok(payload: T) -> Json<Self> {
        Json(Self {
            ok: true,
            message: None,
            payload,
        })
    }

    pub fn with_message(message: impl Into<String>, payload: T) -> Json<Self> {
        Json(Self {
            ok: true,
            message: Some(message.into()),
            payload,
        })
    }
}

impl Envelope<Empty> {
    pub fn message(message: impl Into<String>) -> Json<Self> {
        Self::with_message(message, Empty {})
    }
}
