//! Access gate
//!
//! Decides whether a verified identity may log in and whether it is an
//! administrator. The decision is a pure function of the identity and the
//! policy, so it is re-run on every login and every privileged request
//! instead of being cached in the session.
//!
//! Denial reasons are meant for audit logs only. Callers that face
//! unauthenticated clients must collapse them into a single "access denied".

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::AccessError;
use crate::types::Identity;

/// Which identities may log in. Exactly one mode is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AccessMode {
    /// Any identity the verifier accepts
    AllowAll,
    /// Only the listed usernames
    AllowList {
        #[serde(default)]
        users: BTreeSet<String>,
    },
    /// Only members of a single gate group
    GroupGate { group: String },
}

/// Global login policy, loaded at startup and read-only afterwards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    #[serde(flatten)]
    pub mode: AccessMode,

    /// Usernames granted the admin surface (only effective if they pass the gate)
    #[serde(default)]
    pub admin_users: BTreeSet<String>,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self {
            mode: AccessMode::AllowList {
                users: BTreeSet::new(),
            },
            admin_users: BTreeSet::new(),
        }
    }
}

impl AccessPolicy {
    /// Policy admitting every verified identity
    pub fn allow_all() -> Self {
        Self {
            mode: AccessMode::AllowAll,
            admin_users: BTreeSet::new(),
        }
    }

    /// Policy admitting the listed users
    pub fn allow_list<I, S>(users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode: AccessMode::AllowList {
                users: users.into_iter().map(Into::into).collect(),
            },
            admin_users: BTreeSet::new(),
        }
    }

    /// Policy admitting members of `group`
    pub fn group_gate(group: impl Into<String>) -> Self {
        Self {
            mode: AccessMode::GroupGate {
                group: group.into(),
            },
            admin_users: BTreeSet::new(),
        }
    }

    /// Builder-style helper to set the admin users
    pub fn with_admins<I, S>(mut self, admins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.admin_users = admins.into_iter().map(Into::into).collect();
        self
    }

    /// Short mode label for logs and status output
    pub fn mode_name(&self) -> &'static str {
        match self.mode {
            AccessMode::AllowAll => "allow_all",
            AccessMode::AllowList { .. } => "allow_list",
            AccessMode::GroupGate { .. } => "group_gate",
        }
    }
}

/// Outcome of running the access gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Login permitted
    Allowed { is_admin: bool },
    /// Login refused, with the audit reason
    Denied(AccessError),
}

impl Decision {
    /// Convert into a `Result`, yielding the admin flag on success
    pub fn into_result(self) -> Result<bool, AccessError> {
        match self {
            Decision::Allowed { is_admin } => Ok(is_admin),
            Decision::Denied(reason) => Err(reason),
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }
}

/// Decide whether `identity` may log in under `policy`.
pub fn authorize(identity: &Identity, policy: &AccessPolicy) -> Decision {
    let admitted = match &policy.mode {
        AccessMode::AllowAll => Ok(()),
        AccessMode::AllowList { users } => {
            if users.contains(&identity.username) {
                Ok(())
            } else {
                Err(AccessError::NotInAllowlist)
            }
        }
        AccessMode::GroupGate { group } => {
            if identity.in_group(group) {
                Ok(())
            } else {
                Err(AccessError::NotInGroup)
            }
        }
    };

    match admitted {
        Ok(()) => Decision::Allowed {
            is_admin: policy.admin_users.contains(&identity.username),
        },
        Err(reason) => Decision::Denied(reason),
    }
}
