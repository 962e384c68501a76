use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::db::OpsDb;
use crate::types::Config;

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV: &str = "OPSDESK_CONFIG";

/// Shared, read-only application state handed to every request.
///
/// Nothing in here is mutated after startup; each feed request opens its
/// own read-only database handles from `db_path`.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db_path: PathBuf,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, String> {
        let db_path = resolve_db_path(config.db_path.as_deref())?;
        Ok(Self {
            config: Arc::new(config),
            db_path,
        })
    }

    /// Load config from the default location and build state from it.
    pub fn from_env() -> Result<Self, String> {
        let path = config_path()?;
        let config = load_config(&path)?;
        Self::new(config)
    }
}

/// `$OPSDESK_CONFIG`, else `~/.opsdesk/config.json`.
pub fn config_path() -> Result<PathBuf, String> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        if !path.trim().is_empty() {
            return Ok(expand_home(&path)?);
        }
    }
    let home = dirs::home_dir().ok_or("Could not find home directory")?;
    Ok(home.join(".opsdesk").join("config.json"))
}

/// Load configuration from disk. A missing file yields built-in defaults.
pub fn load_config(path: &Path) -> Result<Config, String> {
    if !path.exists() {
        log::info!(
            "No config file at {}; using built-in defaults",
            path.display()
        );
        return Ok(Config::default());
    }

    let content =
        fs::read_to_string(path).map_err(|e| format!("Failed to read config: {}", e))?;

    let config: Config =
        serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {}", e))?;

    config
        .validate()
        .map_err(|e| format!("Invalid config {}: {}", path.display(), e))?;

    Ok(config)
}

/// Resolve the configured database path, defaulting to `~/.opsdesk/opsdesk.db`.
pub fn resolve_db_path(configured: Option<&str>) -> Result<PathBuf, String> {
    match configured {
        Some(raw) if !raw.trim().is_empty() => expand_home(raw.trim()),
        _ => OpsDb::default_path().map_err(|e| e.to_string()),
    }
}

fn expand_home(raw: &str) -> Result<PathBuf, String> {
    if let Some(rest) = raw.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or("Could not find home directory")?;
        return Ok(home.join(rest));
    }
    Ok(PathBuf::from(raw))
}
