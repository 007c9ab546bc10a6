use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;

/// CLI overlay on top of the config file / environment
/// (clap::Parser layered over a config file).
#[derive(Debug, Parser)]
#[command(version)]
pub struct Opt {
    /// Path to a config file (TOML/YAML/JSON, resolved by the `config` crate).
    #[arg(long, short, env = "DATAS3T_CONFIG")]
    pub config: Option<String>,

    /// Address to bind the HTTP API on.
    #[arg(long, env = "DATAS3T_BIND_ADDRESS")]
    pub bind_address: Option<SocketAddr>,

    /// Postgres connection string for the catalog store.
    #[arg(long, env = "DATAS3T_DATABASE_URL")]
    pub database_url: Option<String>,

    /// `info`, `debug`, `warn`, ... or an `EnvFilter` directive string.
    #[arg(long, env = "DATAS3T_LOG_LEVEL")]
    pub log_level: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub bind_address: SocketAddr,
    pub database_url: String,

    /// Base64-encoded 32-byte key for the (out-of-scope) credential AEAD
    /// cipher. Only validated for length/decodability here; see
    /// `crate::crypto`.
    pub credential_cipher_key: String,

    pub cache_dir: PathBuf,
    pub cache_budget_bytes: u64,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_worker_interval_secs", rename = "deletion_worker_interval_secs")]
    pub deletion_worker_interval_secs: u64,

    #[serde(default = "default_parallelism")]
    pub s3_client_parallelism: usize,

    #[serde(default = "default_parallelism")]
    pub import_parallelism: usize,
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_worker_interval_secs() -> u64 {
    30
}

fn default_parallelism() -> usize {
    4
}

impl Settings {
    /// Loads configuration from (in increasing priority order) the config
    /// file, the `DATAS3T_` environment prefix, and CLI flags.
    pub fn load(opt: &Opt) -> anyhow::Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = &opt.config {
            builder = builder.add_source(File::with_name(path));
        }
        builder = builder.add_source(Environment::with_prefix("DATAS3T").separator("__"));

        let mut settings: Settings = builder.build()?.try_deserialize()?;

        if let Some(addr) = opt.bind_address {
            settings.bind_address = addr;
        }
        if let Some(url) = &opt.database_url {
            settings.database_url = url.clone();
        }
        if let Some(level) = &opt.log_level {
            settings.log_level = level.clone();
        }

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let decoded = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &self.credential_cipher_key)
            .map_err(|e| anyhow::anyhow!("credential_cipher_key is not valid base64: {e}"))?;
        anyhow::ensure!(
            decoded.len() == 32,
            "credential_cipher_key must decode to 32 bytes, got {}",
            decoded.len()
        );
        Ok(())
    }

    pub fn deletion_worker_interval(&self) -> Duration {
        Duration::from_secs(self.deletion_worker_interval_secs)
    }
}
