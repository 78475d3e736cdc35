use brrtrouter_cors::cli::run_cli;
use brrtrouter_cors::logging::{init_logging_with_config, LogConfig};

fn main() -> anyhow::Result<()> {
    let mut config = LogConfig::from_env();
    // Reports go to stdout; keep routine middleware logs out of them
    if std::env::var("BRRTR_CORS_LOG_LEVEL").is_err() {
        config.log_level = "warn".to_string();
    }
    init_logging_with_config(&config)?;
    run_cli()
}
