use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{env_subst::substitute_env, schema::RealtimeConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["rally.toml", "rally.yaml", "rally.yml", "rally.json"];

/// Environment variable overriding `transport.endpoint`.
pub const ENDPOINT_ENV: &str = "RALLY_ENDPOINT";
/// Environment variable overriding `transport.auth_token`.
pub const AUTH_TOKEN_ENV: &str = "RALLY_AUTH_TOKEN";

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<RealtimeConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations, then apply env overrides.
///
/// Search order:
/// 1. `./rally.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/rally/rally.{toml,yaml,yml,json}` (user-global)
///
/// Falls back to `RealtimeConfig::default()` if no file is found or the file
/// fails to parse.
pub fn discover_and_load() -> RealtimeConfig {
    let mut config = match find_config_file() {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            load_config(&path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                RealtimeConfig::default()
            })
        },
        None => {
            debug!("no config file found, using defaults");
            RealtimeConfig::default()
        },
    };
    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    config
}

/// Apply `RALLY_*` overrides on top of a loaded config.
pub fn apply_env_overrides(config: &mut RealtimeConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(endpoint) = lookup(ENDPOINT_ENV).filter(|v| !v.is_empty()) {
        debug!(endpoint = %endpoint, "endpoint overridden from environment");
        config.transport.endpoint = endpoint;
    }
    if let Some(token) = lookup(AUTH_TOKEN_ENV).filter(|v| !v.is_empty()) {
        config.transport.auth_token = Some(Secret::new(token));
    }
}

/// Find the first config file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    let local = CONFIG_FILENAMES.iter().map(PathBuf::from);
    let global = config_dir()
        .into_iter()
        .flat_map(|dir| CONFIG_FILENAMES.iter().map(move |name| dir.join(name)));
    local.chain(global).find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/rally/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "rally").map(|d| d.config_dir().to_path_buf())
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<RealtimeConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
