// src/config/mod.rs
pub mod sources;

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub use sources::RefreshConfig;

pub const ENV_CONFIG_PATH: &str = "REFRESH_CONFIG_PATH";
pub const DEFAULT_TOML_PATH: &str = "config/refresh.toml";
pub const DEFAULT_JSON_PATH: &str = "config/refresh.json";

/// Load config from an explicit path. Supports TOML or JSON formats.
pub fn load_from(path: &Path) -> Result<RefreshConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading refresh config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let cfg = parse_config(&content, ext.as_str())
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(cfg.resolve()?)
}

/// Load config using env var + fallbacks:
/// 1) $REFRESH_CONFIG_PATH
/// 2) config/refresh.toml
/// 3) config/refresh.json
/// 4) built-in defaults (nothing scheduled)
pub fn load_default() -> Result<RefreshConfig> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_from(&pb);
        }
        return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
    }
    let toml_p = PathBuf::from(DEFAULT_TOML_PATH);
    if toml_p.exists() {
        return load_from(&toml_p);
    }
    let json_p = PathBuf::from(DEFAULT_JSON_PATH);
    if json_p.exists() {
        return load_from(&json_p);
    }
    tracing::warn!("no refresh config found; no sources will be scheduled");
    Ok(RefreshConfig::default())
}

fn parse_config(s: &str, hint_ext: &str) -> Result<RefreshConfig> {
    match hint_ext {
        "toml" => toml::from_str(s).context("invalid TOML"),
        "json" => serde_json::from_str(s).context("invalid JSON"),
        _ => {
            if let Ok(v) = serde_json::from_str(s) {
                return Ok(v);
            }
            toml::from_str(s).map_err(|e| anyhow!("unsupported config format: {e}"))
        }
    }
}
