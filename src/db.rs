use anyhow::Context as _;
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use std::fmt;

pub mod postings;

pub use postings::PostingRecord;

#[derive(Debug)]
pub enum StoreError {
    /// The database could not be reached or authenticated against.
    Connection(anyhow::Error),
    /// The database answered, but the postings query failed.
    Query(anyhow::Error),
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Connection(e) | StoreError::Query(e) => Some(e.as_ref()),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StoreError::Connection(e) => write!(f, "postings store unreachable: {:#}", e),
            StoreError::Query(e) => write!(f, "postings query failed: {:#}", e),
        }
    }
}

/// Where postings come from. The production impl talks to Postgres; tests
/// substitute an in-memory source.
#[async_trait::async_trait]
pub trait PostingsSource: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<PostingRecord>, StoreError>;
}

pub struct PostgresSource {
    database_url: String,
}

impl PostgresSource {
    pub fn new(database_url: impl Into<String>) -> Self {
        PostgresSource {
            database_url: database_url.into(),
        }
    }
}

#[async_trait::async_trait]
impl PostingsSource for PostgresSource {
    async fn fetch_all(&self) -> Result<Vec<PostingRecord>, StoreError> {
        let client = make_client(&self.database_url).await?;
        postings::fetch_all_postings(&client).await
    }
}

async fn make_client(db_url: &str) -> Result<tokio_postgres::Client, StoreError> {
    if wants_tls(db_url) {
        let connector = TlsConnector::builder()
            .build()
            .context("built TlsConnector")
            .map_err(StoreError::Connection)?;
        let connector = MakeTlsConnector::new(connector);

        let (db_client, connection) = tokio_postgres::connect(db_url, connector)
            .await
            .context("failed to connect to DB")
            .map_err(StoreError::Connection)?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("database connection error: {}", e);
            }
        });

        Ok(db_client)
    } else {
        tracing::warn!("non-TLS connection to the postings store");
        let (db_client, connection) = tokio_postgres::connect(db_url, tokio_postgres::NoTls)
            .await
            .context("failed to connect to DB")
            .map_err(StoreError::Connection)?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("database connection error: {}", e);
            }
        });

        Ok(db_client)
    }
}

fn wants_tls(db_url: &str) -> bool {
    db_url.contains("sslmode=require") || db_url.contains("rds.amazonaws.com")
}
