use labgrade::config::AppConfig;
use labgrade::{db, ipc};
use std::io;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &AppConfig) {
    // stdout carries the protocol; logs go to stderr.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();
}

fn main() {
    let config = AppConfig::load_or_default();
    init_tracing(&config);

    let mut state = ipc::AppState::new(config);
    if let Some(path) = state.config.workspace.clone() {
        match db::open_db(&path, &state.config.db_file_name) {
            Ok(conn) => {
                info!(path = %path.to_string_lossy(), "workspace opened from configuration");
                state.db = Some(conn);
                state.workspace = Some(path);
            }
            Err(e) => warn!(path = %path.to_string_lossy(), error = ?e, "configured workspace could not be opened"),
        }
    }

    info!(version = env!("CARGO_PKG_VERSION"), "labgraded ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    if let Err(e) = ipc::serve(&mut state, stdin.lock(), &mut stdout) {
        error!(error = %e, "failed to write response");
    }

    info!("stdin closed, shutting down");
}
