use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;
use tracing::warn;

/// Load a JSON document from disk, returning `None` if it doesn't exist yet
/// or fails to parse (a corrupt state file must never block startup).
pub async fn load_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    match fs::read_to_string(path).await {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to parse persisted state, starting fresh");
                None
            }
        },
        Err(_) => None,
    }
}

pub async fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let contents = serde_json::to_string_pretty(value)?;
    fs::write(path, contents).await?;
    Ok(())
}

pub fn breaker_state_path(data_dir: &str, name: &str) -> PathBuf {
    Path::new(data_dir).join(format!("circuit_breaker_{name}.json"))
}

pub fn recovery_history_path(data_dir: &str, name: &str) -> PathBuf {
    Path::new(data_dir).join(format!("{name}_recovery.json"))
}
