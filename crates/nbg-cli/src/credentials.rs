//! Stored admin credentials
//!
//! `nbgate login` keeps the session token it obtained in a JSON file in the
//! config directory so later commands can call the admin API. The file has
//! mode 0600 on Unix. The token is as sensitive as the session cookie.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Credentials file name
const CREDENTIALS_FILENAME: &str = "credentials.json";

/// Contents of the credentials file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Hub URL the token was issued by
    pub url: String,
    pub username: String,
    pub token: String,
}

/// Credentials file inside `config_dir`
pub fn credentials_path(config_dir: &Path) -> PathBuf {
    config_dir.join(CREDENTIALS_FILENAME)
}

/// Write credentials with owner-only permissions
pub fn write_credentials(path: &Path, credentials: &Credentials) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(credentials)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)?;
        file.write_all(json.as_bytes())?;
        // Tighten a file that pre-existed with looser permissions
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }

    #[cfg(not(unix))]
    fs::write(path, json)?;

    Ok(())
}

/// Read stored credentials, if any
pub fn read_credentials(path: &Path) -> io::Result<Option<Credentials>> {
    match fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Delete stored credentials. Missing files are fine.
pub fn clear_credentials(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
