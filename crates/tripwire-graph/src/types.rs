//! Core types for the tripwire graph abstraction layer.
//!
//! These types form the vocabulary shared between the
//! [`DependencyGraph`](crate::DependencyGraph) trait and the analyzer crate.
//! They intentionally contain no scheduler or graph-engine types — the
//! backing graph is an implementation detail.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

// ---------------------------------------------------------------------------
// ActionId
// ---------------------------------------------------------------------------

/// Identifier of one build action (a scheduled unit of work).
///
/// Opaque to the analyzer: ids are assigned by whoever owns the dependency
/// graph and are only compared for equality or fed back into graph queries.
/// Displays as `a#<n>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(u32);

impl ActionId {
    /// Create an `ActionId` from its raw index.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Return the raw index.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ContentHash
// ---------------------------------------------------------------------------

/// A content hash (SHA-256, 32 bytes).
///
/// Stored as raw bytes for efficient comparison, hashing, and Copy semantics.
/// Displays and serializes as 64 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Create a `ContentHash` from raw digest bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Hash a byte slice.
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        Self(digest.into())
    }

    /// Return the raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({self})")
    }
}

/// Error parsing a [`ContentHash`] from a hex string.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid content hash `{value}`: {reason}")]
pub struct HashParseError {
    /// The raw value that failed to parse.
    pub value: String,
    /// Why parsing failed.
    pub reason: String,
}

impl FromStr for ContentHash {
    type Err = HashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 64 {
            return Err(HashParseError {
                value: s.to_owned(),
                reason: format!("expected 64 hex characters, got {}", s.len()),
            });
        }
        let mut bytes = [0u8; 32];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let pair = &s[i * 2..i * 2 + 2];
            *byte = u8::from_str_radix(pair, 16).map_err(|_| HashParseError {
                value: s.to_owned(),
                reason: format!("non-hex characters at offset {}", i * 2),
            })?;
        }
        if s.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(HashParseError {
                value: s.to_owned(),
                reason: "must be lowercase hex".to_owned(),
            });
        }
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for ContentHash {
    type Error = HashParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.to_string()
    }
}

// ---------------------------------------------------------------------------
// Producer
// ---------------------------------------------------------------------------

/// How a path comes to exist according to the static graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProducerKind {
    /// The path is a source file; its "producer" is the hashing node that
    /// seals its content into the graph.
    Source,
    /// The path is a declared output of a build action.
    Output,
}

/// One declared producer of a path.
///
/// A path may have several producers when it is rewritten along a dependency
/// chain; `rewrite_count` disambiguates the versions (1 = first write).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Producer {
    /// The action (or source-hash node) that produces the path.
    pub action: ActionId,
    /// Whether this is a source file or a built output.
    pub kind: ProducerKind,
    /// Declaration version of this producer (source files are version 0).
    pub rewrite_count: u32,
    /// Whether the declaration is a temporary output (source files never
    /// are).
    pub temporary: bool,
}

impl Producer {
    /// `true` if this producer is a source-hash node rather than a build action.
    #[must_use]
    pub const fn is_source(&self) -> bool {
        matches!(self.kind, ProducerKind::Source)
    }
}

// ---------------------------------------------------------------------------
// DirectoryKind
// ---------------------------------------------------------------------------

/// Kind of a dynamically-populated output directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectoryKind {
    /// Multiple actions may write under the directory root.
    SharedOpaque,
    /// Exactly one action owns the directory root.
    ExclusiveOpaque,
}

impl fmt::Display for DirectoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SharedOpaque => write!(f, "shared opaque"),
            Self::ExclusiveOpaque => write!(f, "exclusive opaque"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
