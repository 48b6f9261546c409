//! Login, logout and admin session commands

use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};

use super::{authenticated_client, config_dir, confirm, resolve_url, stored_credentials};
use crate::client::HubClient;
use crate::credentials::{clear_credentials, credentials_path, write_credentials, Credentials};
use crate::output::{format_sessions, format_user, print_error, print_info, print_success, print_warning};
use nbg_core::time::current_time_millis;

/// Environment variable consulted before prompting for a password
pub const PASSWORD_ENV: &str = "NBGATE_PASSWORD";

/// Log in to the hub and store the session token
pub async fn login_command(
    config_path: Option<&PathBuf>,
    url: Option<&str>,
    user: Option<&str>,
) -> Result<()> {
    let base_url = resolve_url(config_path, url)?;
    let client = HubClient::new(&base_url)?;

    let username = user.map(String::from).unwrap_or_else(whoami::username);
    let password = read_password(&username)?;

    let token = match client.login(&username, &password).await {
        Ok(token) => token,
        Err(e) => {
            print_error(&format!("Login failed: {}", e));
            return Err(e);
        }
    };

    let client = client.with_token(token.clone());
    let user = client.whoami().await?;

    let credentials = Credentials {
        url: client.base_url().to_string(),
        username: user.username.clone(),
        token,
    };
    let path = credentials_path(&config_dir(config_path));
    write_credentials(&path, &credentials)
        .with_context(|| format!("Failed to store credentials at {:?}", path))?;

    print_success(&format!(
        "Logged in to {} as {}{}",
        credentials.url,
        user.username,
        if user.admin { " (admin)" } else { "" }
    ));
    Ok(())
}

/// Revoke the stored session and forget it locally
pub async fn logout_command(config_path: Option<&PathBuf>, url: Option<&str>) -> Result<()> {
    let credentials = match stored_credentials(config_path)? {
        Some(credentials) => credentials,
        None => {
            print_warning("Not logged in");
            return Ok(());
        }
    };

    let client =
        HubClient::new(url.unwrap_or(&credentials.url))?.with_token(credentials.token.clone());
    if let Err(e) = client.logout().await {
        // The local copy goes regardless; an unreachable hub keeps the
        // session until it expires or the reclaimer ends it.
        print_warning(&format!("Hub did not confirm the logout: {}", e));
    }

    clear_credentials(&credentials_path(&config_dir(config_path)))
        .context("Failed to remove stored credentials")?;
    print_success(&format!("Logged out {}", credentials.username));
    Ok(())
}

/// Show the identity behind the stored session
pub async fn whoami_command(config_path: Option<&PathBuf>, url: Option<&str>) -> Result<()> {
    let (client, _) = authenticated_client(config_path, url)?;
    let user = client.whoami().await?;
    print!("{}", format_user(&user));
    Ok(())
}

/// List live sessions (admin)
pub async fn sessions_command(
    config_path: Option<&PathBuf>,
    url: Option<&str>,
    json: bool,
) -> Result<()> {
    let (client, _) = authenticated_client(config_path, url)?;
    let sessions = client.list_sessions().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
    } else {
        println!("{}", format_sessions(&sessions, current_time_millis()));
    }
    Ok(())
}

/// Force-terminate the sessions of the given users (admin)
pub async fn kill_command(
    config_path: Option<&PathBuf>,
    url: Option<&str>,
    users: &[String],
    force: bool,
) -> Result<()> {
    let (client, _) = authenticated_client(config_path, url)?;

    if !force {
        let prompt = format!("Terminate sessions for {}?", users.join(", "));
        if !confirm(&prompt)? {
            print_info("Aborted");
            return Ok(());
        }
    }

    let mut failed = 0;
    for username in users {
        match client.kill_session(username).await {
            Ok(true) => print_success(&format!("Terminated session for {}", username)),
            Ok(false) => print_warning(&format!("No session for {}", username)),
            Err(e) => {
                print_error(&format!("Failed to terminate {}: {}", username, e));
                failed += 1;
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("Failed to terminate {} session(s)", failed);
    }
    Ok(())
}

/// Password from `NBGATE_PASSWORD`, a hidden prompt, or a line on stdin
fn read_password(username: &str) -> Result<String> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Ok(password);
    }

    let stdin = io::stdin();
    if stdin.is_terminal() {
        return read_hidden(&format!("Password for {}: ", username));
    }

    let mut line = String::new();
    stdin
        .lock()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Prompt on stderr and read a line without echoing it
fn read_hidden(prompt: &str) -> Result<String> {
    use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
    use crossterm::terminal;

    eprint!("{}", prompt);
    io::stderr().flush()?;

    terminal::enable_raw_mode().context("Failed to switch terminal to raw mode")?;
    let result = (|| -> Result<String> {
        let mut password = String::new();
        loop {
            if let Event::Key(KeyEvent {
                code,
                modifiers,
                kind,
                ..
            }) = event::read()?
            {
                if kind == KeyEventKind::Release {
                    continue;
                }
                match code {
                    KeyCode::Enter => return Ok(password),
                    KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                        anyhow::bail!("Interrupted")
                    }
                    KeyCode::Esc => anyhow::bail!("Interrupted"),
                    KeyCode::Backspace => {
                        password.pop();
                    }
                    KeyCode::Char(c) => password.push(c),
                    _ => {}
                }
            }
        }
    })();
    let _ = terminal::disable_raw_mode();
    eprintln!();

    result
}
