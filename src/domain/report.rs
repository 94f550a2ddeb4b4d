use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Body of a report document. Thread and reporter fields are snapshots taken
/// when the report was filed; nothing ties them to live rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportBody {
    pub thread_id: Uuid,
    pub thread_title: String,
    pub reporter_id: Uuid,
    pub reporter_email: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: Uuid,
    #[serde(flatten)]
    pub body: ReportBody,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
