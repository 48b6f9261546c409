//! Status command implementation

use std::path::PathBuf;

use anyhow::Result;

use super::{resolve_url, stored_credentials};
use crate::client::HubClient;
use crate::output::{format_status, print_error, print_info, print_success};

/// Check hub health and, when logged in, show the admin status
pub async fn status_command(config_path: Option<&PathBuf>, url: Option<&str>) -> Result<()> {
    let credentials = stored_credentials(config_path)?;
    let base_url = match (url, &credentials) {
        (Some(url), _) => url.to_string(),
        (None, Some(credentials)) => credentials.url.clone(),
        (None, None) => resolve_url(config_path, None)?,
    };

    let client = HubClient::new(&base_url)?;
    match client.health().await {
        Ok(true) => print_success(&format!("Hub at {} is healthy", client.base_url())),
        Ok(false) => {
            print_error(&format!("Hub at {} is unhealthy", client.base_url()));
            anyhow::bail!("Health check failed");
        }
        Err(e) => {
            print_error(&format!("Failed to reach hub: {}", e));
            print_error("Is the hub running? Try: nbg-hub --foreground");
            return Err(e);
        }
    }

    let Some(credentials) = credentials else {
        print_info("Log in as an admin for details: nbgate login");
        return Ok(());
    };

    let status = client.with_token(credentials.token).status().await?;
    println!();
    println!("{}", format_status(&status));
    Ok(())
}
