//! Signing key commands

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};

use super::{confirm, load_or_default};
use crate::output::{print_info, print_success, print_warning};
use nbg_core::error::KeyError;
use nbg_core::signing_key;

/// Show the signing key's path and fingerprint
pub fn key_show(config_path: Option<&PathBuf>) -> Result<()> {
    let config = load_or_default(config_path)?;
    let path = &config.signing_key_path;

    match signing_key::load(path) {
        Ok(key) => {
            println!("Path: {}", path.display());
            println!("Fingerprint: {}", key.fingerprint());
            Ok(())
        }
        Err(KeyError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
            print_warning(&format!("No signing key at {:?}", path));
            print_info("The hub generates one on first start");
            Ok(())
        }
        Err(e) => Err(e).context("Failed to load signing key"),
    }
}

/// Replace the signing key. Every outstanding session stops validating
/// once the hub restarts with the new key.
pub fn key_rotate(config_path: Option<&PathBuf>, yes: bool) -> Result<()> {
    let config = load_or_default(config_path)?;
    let path = &config.signing_key_path;

    if !yes && !confirm("Rotate the signing key and log out every user?")? {
        print_info("Aborted");
        return Ok(());
    }

    let key = signing_key::rotate(path).context("Failed to rotate signing key")?;

    print_success(&format!("New signing key {} at {:?}", key.fingerprint(), path));
    print_info("Restart the hub to apply it. All existing sessions will be rejected.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_key(dir: &std::path::Path) -> PathBuf {
        let config_path = dir.join("config.toml");
        let key_path = toml::Value::String(dir.join("cookie_secret").display().to_string());
        std::fs::write(&config_path, format!("signing_key_path = {}\n", key_path)).unwrap();
        config_path
    }

    #[test]
    fn test_rotate_replaces_key() {
        let dir = tempfile::TempDir::new().unwrap();
        let config_path = config_with_key(dir.path());
        let key_path = dir.path().join("cookie_secret");

        let original = signing_key::load_or_generate(&key_path).unwrap();
        key_rotate(Some(&config_path), true).unwrap();
        let rotated = signing_key::load(&key_path).unwrap();

        assert_ne!(original.fingerprint(), rotated.fingerprint());
    }

    #[test]
    fn test_show_without_key_is_ok() {
        let dir = tempfile::TempDir::new().unwrap();
        let config_path = config_with_key(dir.path());
        key_show(Some(&config_path)).unwrap();
    }

    #[test]
    fn test_show_corrupt_key_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let config_path = config_with_key(dir.path());
        std::fs::write(dir.path().join("cookie_secret"), "zz").unwrap();
        assert!(key_show(Some(&config_path)).is_err());
    }
}
