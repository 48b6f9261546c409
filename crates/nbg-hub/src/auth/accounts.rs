//! Parsers for the host account databases
//!
//! All three files use the classic colon-separated layout, one record per
//! line. Blank lines and `#` comments are skipped; malformed lines are
//! skipped with a debug log rather than failing the whole lookup.

use std::collections::BTreeSet;

/// A `passwd` record (`name:x:uid:gid:gecos:home:shell`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswdEntry {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: String,
    pub shell: String,
}

/// A `group` record (`name:x:gid:member,member`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEntry {
    pub name: String,
    pub gid: u32,
    pub members: Vec<String>,
}

/// Password field of a `shadow` record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShadowPassword {
    /// `!` or `*` prefix
    Locked,
    /// Empty field
    Empty,
    /// A hash string
    Hash(String),
}

impl ShadowPassword {
    fn parse(field: &str) -> Self {
        if field.starts_with('!') || field.starts_with('*') {
            ShadowPassword::Locked
        } else if field.is_empty() {
            ShadowPassword::Empty
        } else {
            ShadowPassword::Hash(field.to_string())
        }
    }
}

/// Whether `name` can be looked up in a colon-separated database
pub fn is_valid_username(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && !name.starts_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn records(text: &str) -> impl Iterator<Item = (usize, Vec<&str>)> {
    text.lines().enumerate().filter_map(|(idx, line)| {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() || line.starts_with('#') {
            None
        } else {
            Some((idx + 1, line.split(':').collect()))
        }
    })
}

/// Parse every well-formed `passwd` record
pub fn parse_passwd(text: &str) -> Vec<PasswdEntry> {
    records(text)
        .filter_map(|(line_num, fields)| {
            if fields.len() < 7 {
                tracing::debug!("Skipping malformed passwd line {}", line_num);
                return None;
            }
            let uid = fields[2].parse().ok()?;
            let gid = fields[3].parse().ok()?;
            Some(PasswdEntry {
                name: fields[0].to_string(),
                uid,
                gid,
                home: fields[5].to_string(),
                shell: fields[6].to_string(),
            })
        })
        .collect()
}

/// Look up one user's `passwd` record
pub fn find_passwd(text: &str, username: &str) -> Option<PasswdEntry> {
    parse_passwd(text).into_iter().find(|e| e.name == username)
}

/// Look up one user's password field in a `shadow` file
pub fn find_shadow(text: &str, username: &str) -> Option<ShadowPassword> {
    records(text)
        .find(|(_, fields)| fields.len() >= 2 && fields[0] == username)
        .map(|(_, fields)| ShadowPassword::parse(fields[1]))
}

/// Parse every well-formed `group` record
pub fn parse_group(text: &str) -> Vec<GroupEntry> {
    records(text)
        .filter_map(|(line_num, fields)| {
            if fields.len() < 4 {
                tracing::debug!("Skipping malformed group line {}", line_num);
                return None;
            }
            let gid = fields[2].parse().ok()?;
            let members = fields[3]
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(String::from)
                .collect();
            Some(GroupEntry {
                name: fields[0].to_string(),
                gid,
                members,
            })
        })
        .collect()
}

/// Names of the groups `username` belongs to, including its primary group
pub fn memberships(groups: &[GroupEntry], username: &str, primary_gid: u32) -> BTreeSet<String> {
    groups
        .iter()
        .filter(|g| g.gid == primary_gid || g.members.iter().any(|m| m == username))
        .map(|g| g.name.clone())
        .collect()
}
