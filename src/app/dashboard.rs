use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use time::OffsetDateTime;
use time::macros::format_description;

use crate::infra::db::Db;

const RECENT_USER_SAMPLE: i64 = 100;
const HISTOGRAM_DAYS: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyCount {
    pub date: String,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub user_count: i64,
    pub thread_count: i64,
    pub daily_users: Vec<DailyCount>,
}

#[derive(Clone)]
pub struct DashboardService {
    db: Db,
}

impl DashboardService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn stats(&self) -> Result<DashboardStats> {
        let user_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(self.db.pool())
            .await?;
        let thread_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM threads")
            .fetch_one(self.db.pool())
            .await?;
        let recent: Vec<OffsetDateTime> = sqlx::query_scalar(
            "SELECT created_at FROM users ORDER BY created_at DESC LIMIT $1",
        )
        .bind(RECENT_USER_SAMPLE)
        .fetch_all(self.db.pool())
        .await?;

        Ok(DashboardStats {
            user_count,
            thread_count,
            daily_users: daily_histogram(&recent)?,
        })
    }
}

/// Buckets timestamps by UTC calendar day, newest day first, keeping at most
/// seven days.
pub fn daily_histogram(timestamps: &[OffsetDateTime]) -> Result<Vec<DailyCount>> {
    let format = format_description!("[year]-[month]-[day]");
    let mut buckets: BTreeMap<String, u32> = BTreeMap::new();
    for timestamp in timestamps {
        let day = timestamp.to_offset(time::UtcOffset::UTC).format(&format)?;
        *buckets.entry(day).or_default() += 1;
    }

    Ok(buckets
        .into_iter()
        .rev()
        .take(HISTOGRAM_DAYS)
        .map(|(date, count)| DailyCount { date, count })
        .collect())
}
