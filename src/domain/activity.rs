use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    Register,
    Login,
    CreateThread,
    EditThread,
    DeleteThread,
    CreateComment,
    EditComment,
    DeleteComment,
    Report,
    EmailVerifyAttempt,
    PasswordReset,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub user_id: Uuid,
    pub username: String,
    pub action: ActivityAction,
    pub details: String,
    pub ip: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLog {
    pub id: Uuid,
    #[serde(flatten)]
    pub entry: ActivityEntry,
}
