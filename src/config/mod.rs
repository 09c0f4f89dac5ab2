//! Configuration reading and data directory paths.
//!
//! Two JSON files live in the data directory, both written by the UI shell:
//! `settings.json` (server address, request timeout) and `session.json`
//! (the logged-in user's token). Both are read once at startup and passed
//! into the components that need them — nothing reads config globally.

pub mod paths;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use paths::get_data_dir;

fn default_server_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_api_timeout() -> u64 {
    5
}

/// settings.json shape (written by the shell's settings screen).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// Request timeout in seconds for HTTP and WebSocket connects.
    #[serde(default = "default_api_timeout")]
    pub api_timeout: u64,
    #[serde(default)]
    pub show_debug: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            api_timeout: default_api_timeout(),
            show_debug: false,
        }
    }
}

/// session.json shape (written by the shell after login).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSession {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub token: String,
}

/// Read settings.json from the data directory.
pub fn read_settings() -> Settings {
    read_json_file(&get_settings_path()).unwrap_or_default()
}

/// Read session.json from the data directory.
pub fn read_user_session() -> UserSession {
    read_json_file(&get_session_path()).unwrap_or_default()
}

/// Path to settings.json.
pub fn get_settings_path() -> PathBuf {
    get_data_dir().join("settings.json")
}

/// Path to session.json.
pub fn get_session_path() -> PathBuf {
    get_data_dir().join("session.json")
}

/// Generic helper: read a JSON file and deserialize it.
fn read_json_file<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Option<T> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(val) => Some(val),
            Err(e) => {
                warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        },
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to read {}: {}", path.display(), e);
            }
            None
        }
    }
}
