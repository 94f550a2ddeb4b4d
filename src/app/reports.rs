use anyhow::Result;
use serde_json::json;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::report::{Report, ReportBody};
use crate::infra::documents::{Document, DocumentStore};

const REPORTS: &str = "reports";

#[derive(Clone)]
pub struct ReportService {
    documents: DocumentStore,
}

impl ReportService {
    pub fn new(documents: DocumentStore) -> Self {
        Self { documents }
    }

    pub async fn create_report(&self, body: ReportBody) -> Result<Report> {
        let document = self
            .documents
            .insert(REPORTS, OffsetDateTime::now_utc(), &body)
            .await?;
        Ok(report_from_document(document))
    }

    /// Newest first.
    pub async fn list_reports(&self) -> Result<Vec<Report>> {
        let documents = self.documents.list::<ReportBody>(REPORTS, 0, None).await?;
        Ok(documents.into_iter().map(report_from_document).collect())
    }

    pub async fn get_report(&self, report_id: Uuid) -> Result<Option<Report>> {
        let document = self.documents.get::<ReportBody>(REPORTS, report_id).await?;
        Ok(document.map(report_from_document))
    }

    pub async fn update_reason(&self, report_id: Uuid, reason: &str) -> Result<Option<Report>> {
        let document = self
            .documents
            .merge::<ReportBody>(REPORTS, report_id, json!({ "reason": reason }))
            .await?;
        Ok(document.map(report_from_document))
    }

    pub async fn delete_report(&self, report_id: Uuid) -> Result<bool> {
        self.documents.delete(REPORTS, report_id).await
    }
}

fn report_from_document(document: Document<ReportBody>) -> Report {
    Report {
        id: document.id,
        body: document.body,
        created_at: document.created_at,
    }
}
