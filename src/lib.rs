use crate::config::Config;
use crate::db::PostgresSource;
use crate::graph::GraphClient;

pub mod config;
pub mod db;
pub mod graph;
pub mod notify;
pub mod pipeline;
pub mod report;
pub mod server;

/// Shared state for the HTTP server and the one-shot runner.
pub struct Context {
    pub config: Config,
    pub store: PostgresSource,
    pub graph: GraphClient,
}

impl Context {
    pub fn from_config(config: Config) -> anyhow::Result<Context> {
        let store = PostgresSource::new(config.database_url.clone());
        let graph = GraphClient::from_config(&config)?;
        Ok(Context {
            config,
            store,
            graph,
        })
    }
}
