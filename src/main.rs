//! # Taxdesk API server

use std::process::ExitCode;

use taxdesk::{config::ConfigLoader, server::run_server};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match ConfigLoader::new().load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("taxdesk: invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Tracing is not installed yet; stdout is the only sink here.
    println!("taxdesk starting with profile {}", config.profile);
    if let Ok(redacted) = config.redacted_json() {
        println!("effective configuration: {redacted}");
    }

    match run_server(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("taxdesk: {e}");
            ExitCode::FAILURE
        }
    }
}
