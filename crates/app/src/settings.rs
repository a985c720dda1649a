//! Handles settings for the application.
//!
//! Values come from built-in defaults, then an optional `settings.toml` in
//! the working directory, then `LEDGERD__*` environment variables
//! (`LEDGERD__DATABASE__URL`, `LEDGERD__SERVER__PORT`, ...).
use config::{Config, ConfigError, Environment, File, builder::DefaultState};
use serde::Deserialize;

pub const DEFAULT_DATABASE_URL: &str = "sqlite:./ledgerd.db?mode=rwc";

#[derive(Debug, Deserialize)]
pub struct App {
    pub level: String,
}

#[derive(Debug, Deserialize)]
pub struct Database {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct Server {
    pub bind: Option<String>,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct Ingest {
    pub workers: usize,
    pub queue_capacity: usize,
}

#[derive(Debug, Deserialize)]
pub struct Cache {
    /// 0 disables the idempotency cache.
    pub ttl_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct Reconciliation {
    pub interval_secs: u64,
    #[serde(default)]
    pub accounts: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub app: App,
    pub database: Database,
    pub server: Option<Server>,
    pub ingest: Ingest,
    pub cache: Cache,
    pub reconciliation: Option<Reconciliation>,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        defaults()?
            .add_source(File::with_name("settings").required(false))
            .add_source(
                Environment::with_prefix("LEDGERD")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("reconciliation.accounts")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

fn defaults() -> Result<config::ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("app.level", "info")?
        .set_default("database.url", DEFAULT_DATABASE_URL)?
        .set_default("ingest.workers", 4)?
        .set_default("ingest.queue_capacity", 1024)?
        .set_default("cache.ttl_secs", 300)
}
