//! Edge proxy configuration
//!
//! Renders a Caddy site block that satisfies the hub's header contract and
//! checks a live endpoint against it.

use std::fmt::Write;

use anyhow::{Context, Result};
use reqwest::Url;

use nbg_core::config::HubConfig;
use nbg_core::headers::{check_edge_headers, EdgeViolation, EDGE_RESPONSE_HEADERS};

/// Inputs for a rendered site block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeSite {
    /// Public hostname served over TLS
    pub domain: String,
    /// Hub loopback address (`bind_address`)
    pub upstream: String,
    /// ACME account email
    pub email: Option<String>,
}

impl EdgeSite {
    /// Derive the site from hub config, with an optional domain override
    pub fn from_config(config: &HubConfig, domain: Option<&str>, email: Option<&str>) -> Result<Self> {
        let domain = match domain {
            Some(domain) => domain.to_string(),
            None => {
                let public_url = config.public_url.as_deref().ok_or_else(|| {
                    anyhow::anyhow!("No domain given and public_url is not set in the config")
                })?;
                let url = Url::parse(public_url)
                    .with_context(|| format!("Invalid public_url: {}", public_url))?;
                url.host_str()
                    .ok_or_else(|| anyhow::anyhow!("public_url has no host: {}", public_url))?
                    .to_string()
            }
        };

        Ok(Self {
            domain,
            upstream: config.bind_address.clone(),
            email: email.map(String::from),
        })
    }
}

/// `strict-transport-security` -> `Strict-Transport-Security`
fn canonical_header_name(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Render a Caddyfile site block for `site`
pub fn render_caddyfile(site: &EdgeSite) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} {{", site.domain);
    if let Some(email) = &site.email {
        let _ = writeln!(out, "\ttls {}", email);
    }
    let _ = writeln!(out, "\tencode gzip");
    let _ = writeln!(out);
    let _ = writeln!(out, "\theader {{");
    for (name, value) in EDGE_RESPONSE_HEADERS {
        let _ = writeln!(out, "\t\t{} \"{}\"", canonical_header_name(name), value);
    }
    let _ = writeln!(out, "\t\t-Server");
    let _ = writeln!(out, "\t}}");
    let _ = writeln!(out);
    let _ = writeln!(out, "\treverse_proxy {} {{", site.upstream);
    // Overwrite rather than append so clients cannot inject the first hop.
    let _ = writeln!(out, "\t\theader_up X-Forwarded-Proto {{scheme}}");
    let _ = writeln!(out, "\t\theader_up X-Forwarded-For {{remote_host}}");
    let _ = writeln!(out, "\t}}");
    let _ = writeln!(out, "}}");
    out
}

/// Result of checking a live endpoint
#[derive(Debug, Clone)]
pub struct EdgeReport {
    pub url: String,
    pub status: u16,
    pub https: bool,
    pub violations: Vec<EdgeViolation>,
}

impl EdgeReport {
    pub fn is_compliant(&self) -> bool {
        self.https && self.violations.is_empty()
    }
}

/// Fetch `url` and compare its response headers with the edge contract
pub async fn check_url(url: &str) -> Result<EdgeReport> {
    let parsed = Url::parse(url).with_context(|| format!("Invalid URL: {}", url))?;
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .context("Failed to build HTTP client")?;

    let response = client
        .get(parsed.clone())
        .send()
        .await
        .with_context(|| format!("Failed to fetch {}", url))?;

    let headers = response.headers();
    let violations = check_edge_headers(|name| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
    });

    Ok(EdgeReport {
        url: url.to_string(),
        status: response.status().as_u16(),
        https: parsed.scheme() == "https",
        violations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> EdgeSite {
        EdgeSite {
            domain: "hub.example.org".to_string(),
            upstream: "127.0.0.1:8081".to_string(),
            email: Some("ops@example.org".to_string()),
        }
    }

    #[test]
    fn test_canonical_header_name() {
        assert_eq!(
            canonical_header_name("strict-transport-security"),
            "Strict-Transport-Security"
        );
        assert_eq!(canonical_header_name("x-frame-options"), "X-Frame-Options");
    }

    #[test]
    fn test_render_contains_contract() {
        let caddyfile = render_caddyfile(&site());
        assert!(caddyfile.starts_with("hub.example.org {"));
        assert!(caddyfile.contains("tls ops@example.org"));
        assert!(caddyfile
            .contains("Strict-Transport-Security \"max-age=31536000; includeSubDomains\""));
        assert!(caddyfile.contains("X-Content-Type-Options \"nosniff\""));
        assert!(caddyfile.contains("X-Frame-Options \"DENY\""));
        assert!(caddyfile.contains("Referrer-Policy \"strict-origin-when-cross-origin\""));
        assert!(caddyfile.contains("reverse_proxy 127.0.0.1:8081"));
        assert!(caddyfile.contains("header_up X-Forwarded-Proto {scheme}"));
        assert!(caddyfile.trim_end().ends_with('}'));
    }

    #[test]
    fn test_site_from_public_url() {
        let config = HubConfig {
            public_url: Some("https://notebooks.example.edu/".to_string()),
            ..Default::default()
        };
        let site = EdgeSite::from_config(&config, None, None).unwrap();
        assert_eq!(site.domain, "notebooks.example.edu");
        assert_eq!(site.upstream, "127.0.0.1:8081");
    }

    #[test]
    fn test_site_requires_domain() {
        let config = HubConfig::default();
        assert!(EdgeSite::from_config(&config, None, None).is_err());
        let site = EdgeSite::from_config(&config, Some("hub.local"), None).unwrap();
        assert_eq!(site.domain, "hub.local");
    }
}
