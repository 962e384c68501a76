pub mod db;
pub mod error;
mod migrations;
pub mod server;
pub mod services;
pub mod signals;
pub mod state;
pub mod types;

use state::AppState;

/// Load config, build shared state and serve the HTTP API until shutdown.
pub fn run() -> Result<(), String> {
    let state = AppState::from_env()?;
    log::info!(
        "opsdesk {} using database {}",
        env!("CARGO_PKG_VERSION"),
        state.db_path.display()
    );
    if !state.db_path.exists() {
        log::warn!(
            "Database {} does not exist yet; feeds will report it unavailable",
            state.db_path.display()
        );
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start async runtime: {}", e))?;

    runtime
        .block_on(server::run_server(state))
        .map_err(|e| format!("Server error: {}", e))
}
