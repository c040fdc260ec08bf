//! Enumerations shared by knowledge entries: scope kind, usage context, source type.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The three kinds of scope an entry can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    /// Account-wide knowledge, shared by every thread and agent of the account.
    #[default]
    Global,
    /// Knowledge attached to a single conversation thread.
    Thread,
    /// Knowledge attached to a single agent.
    Agent,
}

impl ScopeKind {
    /// Returns all scope kinds in context assembly order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Global, Self::Thread, Self::Agent]
    }

    /// Returns the scope kind as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Thread => "thread",
            Self::Agent => "agent",
        }
    }

    /// Parses a scope kind from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "global" | "account" => Some(Self::Global),
            "thread" => Some(Self::Thread),
            "agent" => Some(Self::Agent),
            _ => None,
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// When an entry is injected into prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageContext {
    /// Always included in assembled context.
    #[default]
    Always,
    /// Included in assembled context; intended for situational reference.
    Contextual,
    /// Never auto-assembled; only surfaced by an explicit query.
    OnRequest,
}

impl UsageContext {
    /// Returns all usage contexts.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Always, Self::Contextual, Self::OnRequest]
    }

    /// Returns the usage context as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::Contextual => "contextual",
            Self::OnRequest => "on_request",
        }
    }

    /// Returns true if entries with this usage context take part in automatic assembly.
    #[must_use]
    pub const fn is_auto_assembled(&self) -> bool {
        matches!(self, Self::Always | Self::Contextual)
    }

    /// Parses a usage context from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "always" => Some(Self::Always),
            "contextual" => Some(Self::Contextual),
            "on_request" | "on-request" | "onrequest" => Some(Self::OnRequest),
            _ => None,
        }
    }
}

impl fmt::Display for UsageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where the content of an entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Typed in by a user.
    #[default]
    Manual,
    /// Extracted from an uploaded document.
    FileUpload,
    /// Created through the REST API by another system.
    Api,
}

impl SourceType {
    /// Returns the source type as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::FileUpload => "file_upload",
            Self::Api => "api",
        }
    }

    /// Parses a source type from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "manual" => Some(Self::Manual),
            "file_upload" | "file-upload" | "file" => Some(Self::FileUpload),
            "api" => Some(Self::Api),
            _ => None,
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_context_parse() {
        assert_eq!(UsageContext::parse("ALWAYS"), Some(UsageContext::Always));
        assert_eq!(UsageContext::parse("on-request"), Some(UsageContext::OnRequest));
        assert_eq!(UsageContext::parse("sometimes"), None);
    }

    #[test]
    fn test_usage_context_auto_assembly() {
        assert!(UsageContext::Always.is_auto_assembled());
        assert!(UsageContext::Contextual.is_auto_assembled());
        assert!(!UsageContext::OnRequest.is_auto_assembled());
    }

    #[test]
    fn test_serde_wire_names() {
        let json = serde_json::to_string(&UsageContext::OnRequest).unwrap_or_default();
        assert_eq!(json, "\"on_request\"");
        let json = serde_json::to_string(&SourceType::FileUpload).unwrap_or_default();
        assert_eq!(json, "\"file_upload\"");
        let kind: ScopeKind = serde_json::from_str("\"thread\"").unwrap_or_default();
        assert_eq!(kind, ScopeKind::Thread);
    }

    #[test]
    fn test_scope_kind_roundtrip() {
        for kind in ScopeKind::all() {
            assert_eq!(ScopeKind::parse(kind.as_str()), Some(*kind));
        }
    }
}
