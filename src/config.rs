use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::db::executor::ExecutionPolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: String,
    #[serde(default = "default_true")]
    pub bootstrap: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
    /// Sessions untouched for this long are dropped with their logs.
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    pub backend: String, // "gemini", "remote", or "ollama"
    pub model: String,
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ExecutorConfig {
    #[serde(default)]
    pub policy: ExecutionPolicy,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub web: WebConfig,
    pub llm: LlmConfig,
    pub retry: RetryConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_true() -> bool {
    true
}

fn default_session_idle_secs() -> u64 {
    3600
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_temperature() -> f32 {
    0.1
}

#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// DuckDB database file
    #[arg(long)]
    pub database: Option<String>,

    /// LLM backend (gemini, remote, ollama)
    #[arg(long)]
    pub backend: Option<String>,
}

impl AppConfig {
    pub fn new(args: &CliArgs) -> Result<Self, ConfigError> {
        let defaults = AppConfig::default();

        // Defaults first so a partial file is enough
        let mut config_builder = Config::builder()
            .set_default("database.path", defaults.database.path)?
            .set_default("database.bootstrap", defaults.database.bootstrap)?
            .set_default("web.host", defaults.web.host)?
            .set_default("web.port", defaults.web.port as i64)?
            .set_default("web.session_idle_secs", defaults.web.session_idle_secs)?
            .set_default("llm.backend", defaults.llm.backend)?
            .set_default("llm.model", defaults.llm.model)?
            .set_default("llm.timeout_secs", defaults.llm.timeout_secs)?
            .set_default("llm.temperature", defaults.llm.temperature as f64)?
            .set_default("retry.max_attempts", defaults.retry.max_attempts as i64)?
            .set_default("retry.initial_delay_ms", defaults.retry.initial_delay_ms)?;

        if let Some(config_path) = &args.config {
            config_builder = config_builder.add_source(File::from(config_path.as_path()));
        } else {
            let default_locations = vec![
                "config.toml",
                "config/config.toml",
                "/etc/pharma-nlsql/config.toml",
            ];

            for location in default_locations {
                if Path::new(location).exists() {
                    config_builder =
                        config_builder.add_source(File::new(location, config::FileFormat::Toml));
                    break;
                }
            }
        }

        config_builder = config_builder.add_source(
            Environment::with_prefix("PHARMA_NLSQL")
                .prefix_separator("_")
                .separator("__"),
        );

        let mut config: AppConfig = config_builder.build()?.try_deserialize()?;

        if let Some(host) = &args.host {
            config.web.host = host.clone();
        }
        if let Some(port) = args.port {
            config.web.port = port;
        }
        if let Some(database) = &args.database {
            config.database.path = database.clone();
        }
        if let Some(backend) = &args.backend {
            config.llm.backend = backend.clone();
        }

        // Gemini keys conventionally live in GOOGLE_API_KEY
        if config.llm.api_key.is_none() && config.llm.backend == "gemini" {
            config.llm.api_key = std::env::var("GOOGLE_API_KEY").ok();
        }

        Ok(config)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                path: "data/pharmacy.duckdb".to_string(),
                bootstrap: true,
            },
            web: WebConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
                session_idle_secs: default_session_idle_secs(),
            },
            llm: LlmConfig {
                backend: "gemini".to_string(),
                model: "gemini-2.0-flash".to_string(),
                api_key: None,
                api_url: None,
                timeout_secs: default_timeout_secs(),
                temperature: default_temperature(),
            },
            retry: RetryConfig {
                max_attempts: 3,
                initial_delay_ms: 5000,
            },
            executor: ExecutorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
