use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;

/// Settings persisted in the user's config directory. Flags and env vars win.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StoredSettings {
    #[serde(default)]
    pub token_endpoint: Option<String>,
    #[serde(default)]
    pub sso_url: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

pub fn client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| exit_error(&format!("Failed to build HTTP client: {e}"), None))
}

pub fn exit_error(message: &str, docs_hint: Option<&str>) -> ! {
    let mut err = json!({
        "error": "cli_error",
        "message": message
    });
    if let Some(hint) = docs_hint {
        err["docs_hint"] = json!(hint);
    }
    eprintln!("{}", to_pretty(&err));
    std::process::exit(4);
}

pub fn to_pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

pub fn print_json(value: &serde_json::Value) {
    println!("{}", to_pretty(value));
}

pub fn config_path() -> std::path::PathBuf {
    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("formgate");
    config_dir.join("config.json")
}

pub fn load_settings() -> StoredSettings {
    let path = config_path();
    let Ok(data) = std::fs::read_to_string(&path) else {
        return StoredSettings::default();
    };
    match serde_json::from_str(&data) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable settings file");
            StoredSettings::default()
        }
    }
}

/// Read a file path, or stdin when path is "-".
pub fn read_source(path: &str) -> Result<String, String> {
    if path == "-" {
        let mut buf = String::new();
        std::io::Read::read_to_string(&mut std::io::stdin(), &mut buf)
            .map_err(|e| format!("Failed to read stdin: {e}"))?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).map_err(|e| format!("Failed to read file '{path}': {e}"))
}

/// Split `key=value` arguments. The value may itself contain `=`.
pub fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected INPUT=VALUE, got '{raw}'")),
    }
}
