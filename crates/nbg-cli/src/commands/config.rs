//! Config command implementations

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::{config_dir, config_file};
use crate::output::{print_error, print_info, print_success, print_warning};
use nbg_core::config::{self, HubConfig};

/// Get a config value by key
pub fn config_get(config_path: Option<&PathBuf>, key: &str) -> Result<()> {
    let path = config_file(config_path);

    if !path.exists() {
        print_error(&format!("Config file not found: {:?}", path));
        print_info("Run 'nbgate config init' to create one");
        return Ok(());
    }

    let table = read_table(&path)?;
    let value = match lookup(&table, key) {
        Some(value) => value,
        None => {
            print_error(&format!("Key not found: {}", key));
            return Ok(());
        }
    };

    match value {
        toml::Value::String(s) => println!("{}", s),
        toml::Value::Integer(i) => println!("{}", i),
        toml::Value::Float(f) => println!("{}", f),
        toml::Value::Boolean(b) => println!("{}", b),
        toml::Value::Array(a) => {
            for item in a {
                println!("{}", item);
            }
        }
        toml::Value::Table(_) => {
            println!("{}", toml::to_string_pretty(value)?);
        }
        toml::Value::Datetime(d) => println!("{}", d),
    }

    Ok(())
}

/// Set a config value by key
pub fn config_set(config_path: Option<&PathBuf>, key: &str, value: &str) -> Result<()> {
    let path = config_file(config_path);

    if !path.exists() {
        print_info("Creating default configuration...");
        config_init(config_path, false)?;
    }

    let mut table = read_table(&path)?;
    insert(&mut table, key, parse_value(value))?;

    let new_content = toml::to_string_pretty(&table)?;

    // Refuse to write a file the hub could not even parse
    let parsed: HubConfig = toml::from_str(&new_content)
        .with_context(|| format!("{} = {} is not a valid setting", key, value))?;

    config::save_config(&path, &table)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    print_success(&format!("Set {} = {}", key, value));
    if let Err(e) = parsed.validate() {
        print_warning(&format!("The hub will refuse this configuration: {}", e));
    }
    Ok(())
}

/// Show current configuration
pub fn config_show(config_path: Option<&PathBuf>) -> Result<()> {
    let path = config_file(config_path);

    if !path.exists() {
        print_warning(&format!("No configuration file found at {:?}", path));
        print_info("Run 'nbgate config init' to create one");
        return Ok(());
    }

    print_info(&format!("Configuration file: {:?}", path));
    println!();

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    println!("{}", content);

    Ok(())
}

/// Check the config the way the hub does at startup
pub fn config_validate(config_path: Option<&PathBuf>) -> Result<()> {
    let path = config_file(config_path);

    match config::load_hub_config(&path) {
        Ok(config) => {
            print_success(&format!("{:?} is valid", path));
            print_info(&format!(
                "Access mode: {} ({} admin(s)), bind {}",
                config.access.mode_name(),
                config.access.admin_users.len(),
                config.bind_address
            ));
            Ok(())
        }
        Err(e) => {
            print_error(&e.to_string());
            Err(e).with_context(|| format!("Invalid configuration at {:?}", path))
        }
    }
}

/// Initialize default configuration
pub fn config_init(config_path: Option<&PathBuf>, force: bool) -> Result<()> {
    let config_dir = config_dir(config_path);
    let config_file = config_file(config_path);

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create config directory: {:?}", config_dir))?;
        print_success(&format!("Created config directory: {:?}", config_dir));
    }

    if config_file.exists() && !force {
        print_error(&format!("Config file already exists: {:?}", config_file));
        print_info("Use --force to overwrite");
        return Ok(());
    }

    let default_config = generate_default_config(&config_dir);

    std::fs::write(&config_file, default_config)
        .with_context(|| format!("Failed to write config file: {:?}", config_file))?;

    print_success(&format!("Created configuration file: {:?}", config_file));
    print_info("Set public_url and access.group before starting the hub");

    Ok(())
}

/// Open config in editor
pub fn config_edit(config_path: Option<&PathBuf>) -> Result<()> {
    let path = config_file(config_path);

    if !path.exists() {
        print_error(&format!("Config file not found: {:?}", path));
        print_info("Run 'nbgate config init' to create one");
        return Ok(());
    }

    let editor = std::env::var("EDITOR")
        .or_else(|_| std::env::var("VISUAL"))
        .unwrap_or_else(|_| "vi".to_string());

    print_info(&format!("Opening config with: {}", editor));

    std::process::Command::new(&editor)
        .arg(&path)
        .status()
        .with_context(|| format!("Failed to open editor: {}", editor))?;

    Ok(())
}

fn read_table(path: &Path) -> Result<toml::Table> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    toml::from_str(&content).with_context(|| "Failed to parse config file")
}

/// Follow a dotted key path (e.g. `idle.timeout`)
fn lookup<'a>(table: &'a toml::Table, key: &str) -> Option<&'a toml::Value> {
    let mut parts = key.split('.');
    let mut current = table.get(parts.next()?)?;
    for part in parts {
        current = current.as_table()?.get(part)?;
    }
    Some(current)
}

/// Insert at a dotted key path, creating intermediate tables
fn insert(table: &mut toml::Table, key: &str, value: toml::Value) -> Result<()> {
    let parts: Vec<&str> = key.split('.').collect();
    let (last, parents) = parts
        .split_last()
        .filter(|(last, _)| !last.is_empty())
        .ok_or_else(|| anyhow::anyhow!("Invalid key: {:?}", key))?;

    let mut current = table;
    for part in parents {
        current = current
            .entry(part.to_string())
            .or_insert_with(|| toml::Value::Table(toml::Table::new()))
            .as_table_mut()
            .ok_or_else(|| anyhow::anyhow!("Cannot navigate to key: {}", key))?;
    }

    current.insert(last.to_string(), value);
    Ok(())
}

/// Parse a command-line value as the most specific TOML type
fn parse_value(value: &str) -> toml::Value {
    if value == "true" {
        toml::Value::Boolean(true)
    } else if value == "false" {
        toml::Value::Boolean(false)
    } else if let Ok(i) = value.parse::<i64>() {
        toml::Value::Integer(i)
    } else if let Ok(f) = value.parse::<f64>() {
        toml::Value::Float(f)
    } else {
        toml::Value::String(value.to_string())
    }
}

/// Generate default configuration content
fn generate_default_config(config_dir: &Path) -> String {
    let key_path = toml::Value::String(config_dir.join("cookie_secret").display().to_string());

    format!(
        r#"# nbgate hub configuration

# Loopback address the hub listens on. Only the edge proxy talks to it.
bind_address = "127.0.0.1:8081"

# Peer whose X-Forwarded-For / X-Forwarded-Proto headers are trusted
trusted_proxy = "127.0.0.1"

# Public URL served by the edge proxy
# public_url = "https://hub.example.org"

# Session signing key (generated on first start, mode 0600).
# Deleting or rotating it logs everybody out.
signing_key_path = {key_path}

# Session lifetime in seconds (7 days)
session_lifetime = 604800

[access]
# One of: allow_all, allow_list, group_gate
mode = "group_gate"
group = "jhub"
# Usernames with access to the admin API (must still pass the gate)
admin_users = []

[idle]
enabled = true
# Seconds without activity before a runtime is stopped
timeout = 3600
# Seconds between sweeps
interval = 300
# Simultaneous terminations per sweep
concurrency = 5
shutdown_timeout = 30

[capabilities]
terminals_enabled = false
# default_url = "/lab"
debug = false

[accounts]
passwd_path = "/etc/passwd"
shadow_path = "/etc/shadow"
group_path = "/etc/group"
timeout = 10

[spawner]
command = "jupyterhub-singleuser"
args = []
"#
    )
}
