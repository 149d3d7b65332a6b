use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use env_logger::Env;
use log::{error, info};

use ntlmock::{Config, ConfigAuthenticator, NtlmHandler, Server, WhoAmI};


const DEFAULT_CONFIG_PATH: &str = "config.toml";


#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .init();

    // load config
    let config_path = env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            error!("{}: {}", config_path.display(), e);
            return ExitCode::FAILURE;
        },
    };
    let settings = match config.handshake_settings() {
        Ok(s) => s,
        Err(e) => {
            error!("{}: {}", config_path.display(), e);
            return ExitCode::FAILURE;
        },
    };

    let handler = NtlmHandler::new(
        settings,
        ConfigAuthenticator::from_config(&config),
        WhoAmI,
    );
    info!(
        "challenging as {:?} ({:?} challenge)",
        handler.settings().target_name, handler.settings().challenge,
    );
    let server = match Server::bind(config.listen_address, handler).await {
        Ok(s) => s,
        Err(e) => {
            error!("failed to listen on {}: {}", config.listen_address, e);
            return ExitCode::FAILURE;
        },
    };
    info!(
        "serving domain {:?} with {} user(s) on {}",
        config.domain, config.users.len(), config.listen_address,
    );

    if let Err(e) = server.run().await {
        error!("server failed: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
