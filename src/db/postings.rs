//! The `job_postings` table holds everything the scraper has collected.

use super::StoreError;
use anyhow::Context as _;
use chrono::{DateTime, Utc};
use tokio_postgres::Client as DbClient;

/// One row of `job_postings`. Only `id` is guaranteed by the schema;
/// everything else is whatever the scraper managed to extract.
#[derive(Debug, Clone)]
pub struct PostingRecord {
    pub id: i64,
    pub title: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub url: Option<String>,
    pub salary: Option<String>,
    pub description: Option<String>,
}

impl PostingRecord {
    /// A record needs at least a non-blank title to be worth reporting.
    pub fn is_well_formed(&self) -> bool {
        self.title.as_deref().is_some_and(|t| !t.trim().is_empty())
    }
}

pub async fn fetch_all_postings(db: &DbClient) -> Result<Vec<PostingRecord>, StoreError> {
    tracing::trace!("fetch_all_postings");

    let rows = db
        .query(
            "
        SELECT id, title, company, location, posted_at, url, salary, description
        FROM job_postings
        ORDER BY id",
            &[],
        )
        .await
        .context("Getting postings data")
        .map_err(StoreError::Query)?;

    let mut data = Vec::with_capacity(rows.len());
    for row in rows {
        let id: i64 = row.get(0);
        let title: Option<String> = row.get(1);
        let company: Option<String> = row.get(2);
        let location: Option<String> = row.get(3);
        let posted_at: Option<DateTime<Utc>> = row.get(4);
        let url: Option<String> = row.get(5);
        let salary: Option<String> = row.get(6);
        let description: Option<String> = row.get(7);

        data.push(PostingRecord {
            id,
            title,
            company,
            location,
            posted_at,
            url,
            salary,
            description,
        });
    }

    Ok(data)
}
