//! Core type definitions for zonewise
//!
//! This module defines the identifiers and value types shared by the
//! placement engine and its callers.

use crate::error::{Error, Result};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Sentinel used by the membership registry for its read-only subtree.
/// It can never name a storage node.
pub const READ_ONLY_SENTINEL: &str = "readonly";

/// Opaque per-ledger metadata handed through placement untouched
pub type CustomMetadata = BTreeMap<String, Vec<u8>>;

/// Identifier of a storage node, in canonical `host:port` form
#[derive(
    Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
)]
#[serde(try_from = "String", into = "String")]
#[display("{_0}")]
pub struct NodeId(String);

impl NodeId {
    /// Parse and canonicalize a node address
    pub fn parse(addr: &str) -> Result<Self> {
        let trimmed = addr.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(READ_ONLY_SENTINEL) {
            return Err(Error::InvalidNodeId(addr.to_string()));
        }
        let valid = trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, ':' | '.' | '_' | '-'));
        if !valid {
            return Err(Error::InvalidNodeId(addr.to_string()));
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    /// Get the canonical address
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Host part of the address (without the port)
    #[must_use]
    pub fn host(&self) -> &str {
        match self.0.rsplit_once(':') {
            Some((host, port))
                if !host.is_empty()
                    && !port.is_empty()
                    && port.bytes().all(|b| b.is_ascii_digit()) =>
            {
                host
            }
            _ => &self.0,
        }
    }

    /// Port part of the address, if any
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        let host = self.host();
        if host.len() == self.0.len() {
            return None;
        }
        self.0[host.len() + 1..].parse().ok()
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl FromStr for NodeId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for NodeId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

/// Hierarchical location of a node, e.g. `/region-a/rack-1`
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DomainPath(Vec<String>);

impl DomainPath {
    /// Region segment of the reserved unknown domain
    pub const UNKNOWN_REGION: &'static str = "default-region";
    /// Rack segment of the reserved unknown domain
    pub const UNKNOWN_RACK: &'static str = "default-rack";

    /// Parse a `/`-separated path. An empty path denotes the unknown domain.
    pub fn parse(path: &str) -> Result<Self> {
        let segments: Vec<String> = path
            .trim()
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        if segments.is_empty() {
            return Ok(Self::unknown());
        }
        let valid = segments.iter().all(|s| {
            s.chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        });
        if !valid {
            return Err(Error::InvalidDomainPath(path.to_string()));
        }
        Ok(Self(segments))
    }

    /// The reserved domain for nodes whose location cannot be resolved
    #[must_use]
    pub fn unknown() -> Self {
        Self(vec![
            Self::UNKNOWN_REGION.to_string(),
            Self::UNKNOWN_RACK.to_string(),
        ])
    }

    /// Check if this is the reserved unknown domain
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.0.first().is_some_and(|s| s == Self::UNKNOWN_REGION)
    }

    /// Top-level segment (the zone), or `None` for the unknown domain
    #[must_use]
    pub fn zone(&self) -> Option<&str> {
        if self.is_unknown() {
            None
        } else {
            self.0.first().map(String::as_str)
        }
    }

    /// All path segments, outermost first
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for DomainPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.0 {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for DomainPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DomainPath({self})")
    }
}

impl FromStr for DomainPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DomainPath {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<DomainPath> for String {
    fn from(path: DomainPath) -> Self {
        path.to_string()
    }
}

/// How well an ensemble's spread satisfies the configured zone thresholds.
///
/// Ordered from worst to best, so the overall level of several write-quorum
/// windows is their minimum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlacementPolicyAdherence {
    /// Fewer than `min_zones` zones in some window
    Fail,
    /// At least `min_zones` but fewer than `desired_zones` zones
    MeetsSoft,
    /// At least `desired_zones` zones in every window
    MeetsStrict,
}

impl PlacementPolicyAdherence {
    /// Classify a window by its distinct zone count
    #[must_use]
    pub const fn classify(zones: usize, desired_zones: usize, min_zones: usize) -> Self {
        if zones >= desired_zones {
            Self::MeetsStrict
        } else if zones >= min_zones {
            Self::MeetsSoft
        } else {
            Self::Fail
        }
    }

    /// Stable name, used for metric labels and CLI output
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fail => "FAIL",
            Self::MeetsSoft => "MEETS_SOFT",
            Self::MeetsStrict => "MEETS_STRICT",
        }
    }
}

impl fmt::Display for PlacementPolicyAdherence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
