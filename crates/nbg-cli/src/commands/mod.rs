//! Command implementations for the CLI

mod config;
mod edge;
mod key;
mod session;
mod status;

pub use config::{config_edit, config_get, config_init, config_set, config_show, config_validate};
pub use edge::{edge_check, edge_render};
pub use key::{key_rotate, key_show};
pub use session::{kill_command, login_command, logout_command, sessions_command, whoami_command};
pub use status::status_command;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use nbg_core::config::{self as core_config, HubConfig};

use crate::client::HubClient;
use crate::credentials::{credentials_path, read_credentials, Credentials};

/// Config file in use: `--config` or the default location
pub fn config_file(config_path: Option<&PathBuf>) -> PathBuf {
    config_path
        .cloned()
        .unwrap_or_else(core_config::default_config_path)
}

/// Directory holding the config file, the key and stored credentials
pub fn config_dir(config_path: Option<&PathBuf>) -> PathBuf {
    config_path
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(core_config::default_config_dir)
}

/// Load the hub config if the file exists, defaults otherwise.
///
/// Not validated: commands that only read a field should still work on a
/// config the hub would refuse.
pub fn load_or_default(config_path: Option<&PathBuf>) -> Result<HubConfig> {
    let path = config_file(config_path);
    if !path.exists() {
        tracing::debug!("No config at {:?}, using defaults", path);
        return Ok(HubConfig::default());
    }
    core_config::load_config(&path).with_context(|| format!("Failed to load config from {:?}", path))
}

/// Hub URL: `--url`, then the config's `public_url`
pub fn resolve_url(config_path: Option<&PathBuf>, url: Option<&str>) -> Result<String> {
    if let Some(url) = url {
        return Ok(url.to_string());
    }
    load_or_default(config_path)?.public_url.ok_or_else(|| {
        anyhow::anyhow!("No hub URL. Pass --url or set public_url in the config")
    })
}

/// Credentials saved by `nbgate login`, if any
pub fn stored_credentials(config_path: Option<&PathBuf>) -> Result<Option<Credentials>> {
    let path = credentials_path(&config_dir(config_path));
    read_credentials(&path).with_context(|| format!("Failed to read credentials from {:?}", path))
}

/// Client carrying the stored session token
pub fn authenticated_client(
    config_path: Option<&PathBuf>,
    url: Option<&str>,
) -> Result<(HubClient, Credentials)> {
    let credentials = stored_credentials(config_path)?
        .ok_or_else(|| anyhow::anyhow!("Not logged in. Run 'nbgate login' first"))?;

    let base_url = url.unwrap_or(&credentials.url);
    let client = HubClient::new(base_url)?.with_token(credentials.token.clone());
    Ok((client, credentials))
}

/// Ask a yes/no question on stdin. Anything but `y`/`yes` is a no.
pub fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
