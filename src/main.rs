use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};

mod config;
mod db;
mod llm;
mod pipeline;
mod schema;
mod util;
mod web;

use crate::config::{AppConfig, CliArgs};
use crate::db::bootstrap::bootstrap;
use crate::db::executor::ExecutionPolicy;
use crate::pipeline::Pipeline;
use crate::util::logging::init_tracing;
use crate::web::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Pick up GOOGLE_API_KEY and friends from .env before reading config
    dotenv::dotenv().ok();

    // Parse command line arguments
    let args = CliArgs::parse();

    // Load configuration
    let config = AppConfig::new(&args)?;

    init_tracing(config.logging.json);

    let pipeline = Pipeline::from_config(&config).inspect_err(|e| {
        error!("Startup failed with backend '{}': {}", config.llm.backend, e);
    })?;

    if config.database.bootstrap {
        info!("Bootstrapping schema in {}", config.database.path);
        bootstrap(pipeline.executor())?;
    }

    if config.executor.policy == ExecutionPolicy::Permissive {
        warn!("Generated SQL runs unrestricted; set executor.policy = \"read_only\" to allow SELECT only");
    }

    let app_state = Arc::new(AppState::new(config.clone(), pipeline));

    // Start the web server
    info!(
        "Starting pharmacy NL-to-SQL server on {}:{} with {} backend",
        config.web.host, config.web.port, config.llm.backend
    );
    match web::run_server(config.web, app_state).await {
        Ok(_) => info!("Server stopped gracefully"),
        Err(e) => {
            error!("Server error: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}
