//! Output formatting utilities for the CLI
//!
//! Tables for the admin session listing, the hub status display, edge check
//! reports, and colored status messages.

use tabled::{settings::Style, Table, Tabled};

use nbg_core::api::{HubStatus, SessionInfo, UserInfo};
use nbg_core::headers::EdgeViolation;
use nbg_core::time::current_time_millis;

use crate::edge::EdgeReport;

/// Format the admin session listing as an ASCII table
///
/// Timestamps are shown relative to `now_ms` so the output stays readable
/// regardless of the viewer's timezone.
pub fn format_sessions(sessions: &[SessionInfo], now_ms: u64) -> String {
    if sessions.is_empty() {
        return "No active sessions".to_string();
    }

    #[derive(Tabled)]
    struct SessionRow {
        #[tabled(rename = "USER")]
        username: String,
        #[tabled(rename = "ADMIN")]
        admin: &'static str,
        #[tabled(rename = "RUNTIME")]
        runtime: String,
        #[tabled(rename = "TERMINALS")]
        terminals: &'static str,
        #[tabled(rename = "LOGGED IN")]
        issued: String,
        #[tabled(rename = "LAST ACTIVITY")]
        activity: String,
        #[tabled(rename = "EXPIRES")]
        expires: String,
    }

    let rows: Vec<SessionRow> = sessions
        .iter()
        .map(|s| SessionRow {
            username: s.username.clone(),
            admin: yes_no(s.admin),
            runtime: s
                .runtime
                .as_deref()
                .map(|r| truncate(r, 24))
                .unwrap_or_else(|| "-".to_string()),
            terminals: if s.terminals_enabled { "on" } else { "off" },
            issued: format_ago(s.issued_at, now_ms),
            activity: s
                .last_activity_at
                .map(|t| format_ago(t, now_ms))
                .unwrap_or_else(|| "never".to_string()),
            expires: format_in(s.expires_at, now_ms),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format hub status as a human-readable string
pub fn format_status(status: &HubStatus) -> String {
    let mut output = String::new();

    output.push_str(&format!("Hub Version: {}\n", status.version));
    output.push_str(&format!("Uptime: {}\n", format_duration(status.uptime_secs)));
    output.push_str(&format!("Active Sessions: {}\n", status.session_count));
    output.push_str(&format!("Access Mode: {}\n", status.access_mode));
    if status.idle_enabled {
        output.push_str(&format!(
            "Idle Reclaim: after {}\n",
            format_duration(status.idle_timeout_secs)
        ));
    } else {
        output.push_str("Idle Reclaim: disabled\n");
    }
    output.push_str(&format!("Signing Key: {}\n", status.key_fingerprint));

    output
}

/// Format the caller's own identity
pub fn format_user(user: &UserInfo) -> String {
    let groups = if user.groups.is_empty() {
        "-".to_string()
    } else {
        user.groups.join(", ")
    };
    format!(
        "User: {}\nGroups: {}\nAdmin: {}\nSession expires: {}\n",
        user.username,
        groups,
        yes_no(user.admin),
        format_in(user.expires_at, current_time_millis())
    )
}

/// Format the result of an edge check
pub fn format_edge_report(report: &EdgeReport) -> String {
    let mut output = format!("{} -> HTTP {}\n", report.url, report.status);
    if !report.https {
        output.push_str("  scheme: expected https\n");
    }
    output.push_str(&format_violations(&report.violations));
    output
}

/// One line per header violation
pub fn format_violations(violations: &[EdgeViolation]) -> String {
    violations
        .iter()
        .map(|v| format!("  {}\n", v))
        .collect()
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn format_ago(then_ms: u64, now_ms: u64) -> String {
    format!("{} ago", format_duration(now_ms.saturating_sub(then_ms) / 1000))
}

fn format_in(then_ms: u64, now_ms: u64) -> String {
    if then_ms <= now_ms {
        "expired".to_string()
    } else {
        format!("in {}", format_duration((then_ms - now_ms) / 1000))
    }
}

/// Format duration in human-readable form
pub fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        let mins = secs / 60;
        let remaining_secs = secs % 60;
        format!("{}m {}s", mins, remaining_secs)
    } else if secs < 86400 {
        let hours = secs / 3600;
        let remaining_mins = (secs % 3600) / 60;
        format!("{}h {}m", hours, remaining_mins)
    } else {
        let days = secs / 86400;
        let remaining_hours = (secs % 86400) / 3600;
        format!("{}d {}h", days, remaining_hours)
    }
}

/// Truncate a string with ellipsis if too long
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix (stderr)
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow (stderr)
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan
pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(username: &str, last_activity_at: Option<u64>) -> SessionInfo {
        SessionInfo {
            username: username.to_string(),
            admin: false,
            issued_at: 1_000_000,
            expires_at: 1_000_000 + 7 * 86_400_000,
            last_activity_at,
            runtime: Some("rt-1".to_string()),
            terminals_enabled: false,
        }
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(42), "42s");
        assert_eq!(format_duration(61), "1m 1s");
        assert_eq!(format_duration(3600), "1h 0m");
        assert_eq!(format_duration(90_000), "1d 1h");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a-very-long-runtime-name", 10), "a-very-...");
    }

    #[test]
    fn test_empty_session_table() {
        assert_eq!(format_sessions(&[], 0), "No active sessions");
    }

    #[test]
    fn test_session_table_columns() {
        let now = 1_000_000 + 120_000;
        let table = format_sessions(
            &[session("alice", Some(1_000_000 + 60_000)), session("bob", None)],
            now,
        );
        assert!(table.contains("USER"));
        assert!(table.contains("alice"));
        assert!(table.contains("1m 0s ago"));
        assert!(table.contains("never"));
        assert!(table.contains("off"));
    }

    #[test]
    fn test_format_in_past_is_expired() {
        assert_eq!(format_in(10, 20), "expired");
        assert_eq!(format_in(61_000, 0), "in 1m 1s");
    }

    #[test]
    fn test_format_status() {
        let status = HubStatus {
            version: "0.1.0".to_string(),
            uptime_secs: 3700,
            session_count: 2,
            access_mode: "group_gate".to_string(),
            idle_enabled: false,
            idle_timeout_secs: 3600,
            key_fingerprint: "SHA256:0011".to_string(),
        };
        let text = format_status(&status);
        assert!(text.contains("Uptime: 1h 1m"));
        assert!(text.contains("Access Mode: group_gate"));
        assert!(text.contains("Idle Reclaim: disabled"));
    }
}
