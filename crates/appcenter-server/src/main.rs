use std::process::ExitCode;

use appcenter_server::config::loader::load_config;
use appcenter_server::{ServerBuilder, metrics, observability};

const DEFAULT_CONFIG: &str = "appcenter.toml";
const CONFIG_ENV: &str = "APPCENTER_CONFIG";

/// `--config <path>`, then `APPCENTER_CONFIG`, then `appcenter.toml`.
fn config_location() -> (String, &'static str) {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Some(path) = args
        .windows(2)
        .find(|pair| pair[0] == "--config")
        .map(|pair| pair[1].clone())
    {
        return (path, "--config");
    }
    match std::env::var(CONFIG_ENV) {
        Ok(path) if !path.is_empty() => (path, CONFIG_ENV),
        _ => (DEFAULT_CONFIG.to_string(), "default"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match dotenvy::dotenv() {
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => eprintln!("Warning: failed to load .env: {err}"),
        Ok(_) => {}
    }

    observability::init_tracing();

    let (path, source) = config_location();
    let cfg = match load_config(Some(&path)) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("Configuration error: {err}");
            return ExitCode::from(2);
        }
    };
    tracing::info!(%path, source, "Configuration loaded");

    observability::apply_logging_level(&cfg.logging.level);
    if !metrics::init_metrics() {
        tracing::warn!("Prometheus recorder not installed; /metrics will be unavailable");
    }

    let server = match ServerBuilder::new().with_config(cfg).build().await {
        Ok(server) => server,
        Err(err) => {
            tracing::error!(error = %err, "Startup failed");
            return ExitCode::from(2);
        }
    };

    match server.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "Server stopped with error");
            ExitCode::FAILURE
        }
    }
}
