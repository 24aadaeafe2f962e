//! # Node Identifier Policy
//!
//! Syntactic gate for identifiers claimed by joining nodes.
//!
//! ## Rules
//!
//! An identifier is eligible when, after trimming surrounding whitespace:
//!
//! 1. it is non-empty,
//! 2. it is not the reserved control-plane identifier,
//! 3. it fully matches the identifier pattern
//!    (default `^[a-z0-9][a-z0-9-]{1,62}$`).
//!
//! [`IdentityPolicy::parse`] is the only constructor of [`NodeIdentifier`],
//! so holding a `NodeIdentifier` means the rules above were checked.
//! Validation is pure: no I/O, no clock, no logging.

use std::fmt;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

/// Identifier of the fleet's control-plane node. Never admitted through
/// the verification protocol.
pub const DEFAULT_RESERVED_IDENTIFIER: &str = "production-control-plane";

/// Default identifier pattern (lowercase DNS-label style, 2–63 chars).
pub const DEFAULT_IDENTIFIER_PATTERN: &str = r"^[a-z0-9][a-z0-9-]{1,62}$";

// ════════════════════════════════════════════════════════════════════════════════
// ERRORS
// ════════════════════════════════════════════════════════════════════════════════

/// Reason an identifier was refused by [`IdentityPolicy::parse`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentityError {
    /// Empty or whitespace-only input.
    #[error("identifier is empty")]
    Empty,

    /// The reserved control-plane identifier.
    #[error("identifier '{0}' is reserved for the control plane")]
    Reserved(String),

    /// Does not fully match the configured pattern.
    #[error("identifier '{0}' does not match the identifier pattern")]
    PatternMismatch(String),
}

// ════════════════════════════════════════════════════════════════════════════════
// NODE IDENTIFIER
// ════════════════════════════════════════════════════════════════════════════════

/// A validated node identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodeIdentifier(String);

impl NodeIdentifier {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NodeIdentifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// POLICY
// ════════════════════════════════════════════════════════════════════════════════

/// Reserved identifier plus compiled pattern.
///
/// Built once from configuration and shared by reference; cloning is cheap
/// (`Regex` is internally reference counted).
#[derive(Debug, Clone)]
pub struct IdentityPolicy {
    reserved: String,
    pattern: Regex,
}

impl IdentityPolicy {
    /// The control-plane reserved id with the stock identifier pattern.
    pub fn standard() -> Result<Self, regex::Error> {
        Self::new(DEFAULT_RESERVED_IDENTIFIER, DEFAULT_IDENTIFIER_PATTERN)
    }

    /// Compiles `pattern` and pairs it with the reserved identifier.
    pub fn new(reserved: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            reserved: reserved.into(),
            pattern: Regex::new(pattern)?,
        })
    }

    pub fn reserved(&self) -> &str {
        &self.reserved
    }

    /// `true` when `raw` is eligible for admission.
    pub fn validate(&self, raw: &str) -> bool {
        self.parse(raw).is_ok()
    }

    /// Trims `raw` and checks every rule, returning the typed identifier.
    ///
    /// Rule order is fixed: empty, reserved, pattern. The reserved check
    /// runs first so the control-plane id is refused even if a custom
    /// pattern would accept it.
    pub fn parse(&self, raw: &str) -> Result<NodeIdentifier, IdentityError> {
        let candidate = raw.trim();
        if candidate.is_empty() {
            return Err(IdentityError::Empty);
        }
        if candidate == self.reserved {
            return Err(IdentityError::Reserved(candidate.to_string()));
        }
        if !self.full_match(candidate) {
            return Err(IdentityError::PatternMismatch(candidate.to_string()));
        }
        Ok(NodeIdentifier(candidate.to_string()))
    }

    // Custom patterns may omit anchors; require the match to span the input.
    fn full_match(&self, candidate: &str) -> bool {
        self.pattern
            .find(candidate)
            .map(|m| m.start() == 0 && m.end() == candidate.len())
            .unwrap_or(false)
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// UNIT TESTS
// ════════════════════════════════════════════════════════════════════════════════
