//! Edge proxy commands

use std::path::PathBuf;

use anyhow::Result;

use super::{load_or_default, resolve_url};
use crate::edge::{check_url, render_caddyfile, EdgeSite};
use crate::output::{format_edge_report, print_error, print_info, print_success};

/// Print a Caddy site block for the configured hub
pub fn edge_render(
    config_path: Option<&PathBuf>,
    domain: Option<&str>,
    email: Option<&str>,
) -> Result<()> {
    let config = load_or_default(config_path)?;
    let site = EdgeSite::from_config(&config, domain, email)?;
    print!("{}", render_caddyfile(&site));
    Ok(())
}

/// Check a live URL against the edge header contract
pub async fn edge_check(config_path: Option<&PathBuf>, url: Option<&str>) -> Result<()> {
    let url = match url {
        Some(url) => url.to_string(),
        None => format!(
            "{}/hub/health",
            resolve_url(config_path, None)?.trim_end_matches('/')
        ),
    };

    print_info(&format!("Checking {}", url));
    let report = check_url(&url).await?;

    if report.is_compliant() {
        print_success(&format!("{} satisfies the edge header contract", url));
        return Ok(());
    }

    print_error("Edge contract violations:");
    print!("{}", format_edge_report(&report));
    anyhow::bail!(
        "{} violation(s) at {}",
        report.violations.len() + usize::from(!report.https),
        url
    )
}
