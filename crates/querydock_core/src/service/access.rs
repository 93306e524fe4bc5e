//! Acting identity and mutation allow-list.
//!
//! The acting user is passed explicitly into every mutation instead of
//! being read from a process-wide session.

use std::collections::BTreeSet;

/// User performing a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    email: String,
}

impl Actor {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into().trim().to_ascii_lowercase(),
        }
    }

    pub fn email(&self) -> &str {
        self.email.as_str()
    }
}

/// Decides which actors may mutate the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowList {
    /// Every actor is allowed.
    Open,
    /// Only listed emails (lowercased) are allowed.
    Restricted(BTreeSet<String>),
}

impl AllowList {
    pub fn restricted<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::Restricted(
            emails
                .into_iter()
                .map(|email| email.as_ref().trim().to_ascii_lowercase())
                .filter(|email| !email.is_empty())
                .collect(),
        )
    }

    pub fn permits(&self, actor: &Actor) -> bool {
        match self {
            Self::Open => true,
            Self::Restricted(emails) => {
                !actor.email().is_empty() && emails.contains(actor.email())
            }
        }
    }
}

impl Default for AllowList {
    fn default() -> Self {
        Self::Open
    }
}
