//! Entry ownership scopes.
//!
//! An entry belongs to exactly one scope. [`Scope`] carries the owning
//! account alongside the thread or agent id, [`ScopeKey`] is the lookup key
//! (kind + id) used for listing and context assembly.
//!
//! Thread and agent ids are expected to be globally unique (the host
//! application issues them, typically as UUIDs), so a thread or agent scope is
//! identified by its id alone. The account id stored with such an entry
//! records ownership and drives account purges; it is not part of the key.
//! Two accounts that reuse the same thread id share one namespace.

use super::ScopeKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Owner of a knowledge entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Scope {
    /// Account-wide entry.
    Global {
        /// Owning account.
        account_id: String,
    },
    /// Thread-specific entry.
    Thread {
        /// Owning account.
        account_id: String,
        /// Thread the entry is attached to.
        thread_id: String,
    },
    /// Agent-specific entry.
    Agent {
        /// Owning account.
        account_id: String,
        /// Agent the entry is attached to.
        agent_id: String,
    },
}

impl Scope {
    /// Creates a global scope.
    #[must_use]
    pub fn global(account_id: impl Into<String>) -> Self {
        Self::Global {
            account_id: account_id.into(),
        }
    }

    /// Creates a thread scope.
    #[must_use]
    pub fn thread(account_id: impl Into<String>, thread_id: impl Into<String>) -> Self {
        Self::Thread {
            account_id: account_id.into(),
            thread_id: thread_id.into(),
        }
    }

    /// Creates an agent scope.
    #[must_use]
    pub fn agent(account_id: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self::Agent {
            account_id: account_id.into(),
            agent_id: agent_id.into(),
        }
    }

    /// Rebuilds a scope from its stored columns.
    #[must_use]
    pub fn from_parts(kind: ScopeKind, account_id: String, scope_id: String) -> Self {
        match kind {
            ScopeKind::Global => Self::Global { account_id },
            ScopeKind::Thread => Self::Thread {
                account_id,
                thread_id: scope_id,
            },
            ScopeKind::Agent => Self::Agent {
                account_id,
                agent_id: scope_id,
            },
        }
    }

    /// Returns the scope kind.
    #[must_use]
    pub const fn kind(&self) -> ScopeKind {
        match self {
            Self::Global { .. } => ScopeKind::Global,
            Self::Thread { .. } => ScopeKind::Thread,
            Self::Agent { .. } => ScopeKind::Agent,
        }
    }

    /// Returns the owning account.
    #[must_use]
    pub fn account_id(&self) -> &str {
        match self {
            Self::Global { account_id }
            | Self::Thread { account_id, .. }
            | Self::Agent { account_id, .. } => account_id,
        }
    }

    /// Returns the id the scope is keyed by (account, thread or agent id).
    #[must_use]
    pub fn scope_id(&self) -> &str {
        match self {
            Self::Global { account_id } => account_id,
            Self::Thread { thread_id, .. } => thread_id,
            Self::Agent { agent_id, .. } => agent_id,
        }
    }

    /// Returns the lookup key for this scope.
    #[must_use]
    pub fn key(&self) -> ScopeKey {
        ScopeKey::new(self.kind(), self.scope_id())
    }
}

/// Lookup key for the entries of one scope.
///
/// Global keys carry the account id; thread and agent keys carry only the
/// thread or agent id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeKey {
    /// Scope kind.
    pub kind: ScopeKind,
    /// Account id for global scopes, thread id or agent id otherwise.
    pub id: String,
}

impl ScopeKey {
    /// Creates a scope key.
    #[must_use]
    pub fn new(kind: ScopeKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    /// Key for an account's global entries.
    #[must_use]
    pub fn global(account_id: impl Into<String>) -> Self {
        Self::new(ScopeKind::Global, account_id)
    }

    /// Key for a thread's entries.
    #[must_use]
    pub fn thread(thread_id: impl Into<String>) -> Self {
        Self::new(ScopeKind::Thread, thread_id)
    }

    /// Key for an agent's entries.
    #[must_use]
    pub fn agent(agent_id: impl Into<String>) -> Self {
        Self::new(ScopeKind::Agent, agent_id)
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_key_uses_thread_id() {
        let scope = Scope::thread("acct", "t-1");
        assert_eq!(scope.kind(), ScopeKind::Thread);
        assert_eq!(scope.account_id(), "acct");
        assert_eq!(scope.key(), ScopeKey::thread("t-1"));
    }

    #[test]
    fn test_global_scope_keyed_by_account() {
        let scope = Scope::global("acct");
        assert_eq!(scope.key(), ScopeKey::global("acct"));
        assert_eq!(scope.key().to_string(), "global:acct");
    }

    #[test]
    fn test_from_parts_roundtrip() {
        let scope = Scope::agent("acct", "agent-7");
        let rebuilt = Scope::from_parts(
            scope.kind(),
            scope.account_id().to_string(),
            scope.scope_id().to_string(),
        );
        assert_eq!(rebuilt, scope);
    }
}
