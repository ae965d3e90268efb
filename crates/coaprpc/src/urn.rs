//! # Service URNs
//!
//! Logical names of remotely invocable services, e.g. `urn:dmns:par`.
//!
//! ## Grammar
//!
//! `urn:<nid>:<nss>` where
//! - the `urn` scheme is matched case-insensitively,
//! - `nid` is 1-32 ASCII alphanumerics or `-`, not starting with `-`,
//! - `nss` is non-empty printable ASCII, no whitespace, no `?`.
//!
//! `?` is excluded because it terminates the address on the wire.

use std::fmt;
use std::str::FromStr;

use crate::policy::SERVICE_TERMINATOR;

const MAX_NID_LEN: usize = 32;

/// Reasons a string is not a service URN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrnError {
    /// The string does not start with `urn:`.
    MissingScheme(String),
    /// The namespace identifier is empty, too long, or has a bad character.
    InvalidNid(String),
    /// Nothing follows the namespace identifier.
    EmptyNss(String),
    /// The namespace-specific string contains a forbidden character.
    InvalidChar { urn: String, ch: char },
}

impl fmt::Display for UrnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingScheme(s) => write!(f, "Not a URN (missing 'urn:' scheme): {:?}", s),
            Self::InvalidNid(s) => write!(f, "Invalid namespace identifier in {:?}", s),
            Self::EmptyNss(s) => write!(f, "Empty namespace-specific string in {:?}", s),
            Self::InvalidChar { urn, ch } => write!(f, "Invalid character {:?} in {:?}", ch, urn),
        }
    }
}

impl std::error::Error for UrnError {}

/// An immutable, validated service identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceUrn(String);

impl ServiceUrn {
    /// Validates and wraps a URN string.
    pub fn parse(s: impl Into<String>) -> Result<Self, UrnError> {
        let s = s.into();
        validate(&s)?;
        Ok(Self(s))
    }

    /// Builds `urn:<nid>:<nss>`.
    pub fn from_parts(nid: &str, nss: &str) -> Result<Self, UrnError> {
        Self::parse(format!("urn:{}:{}", nid, nss))
    }

    /// Decodes address bytes one byte per char, then validates.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, UrnError> {
        Self::parse(bytes.iter().map(|&b| b as char).collect::<String>())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// The namespace identifier, e.g. `dmns`.
    pub fn nid(&self) -> &str {
        let rest = &self.0[4..];
        rest.split_once(':').map(|(nid, _)| nid).unwrap_or(rest)
    }

    /// The namespace-specific string, e.g. `par`.
    pub fn nss(&self) -> &str {
        let rest = &self.0[4..];
        rest.split_once(':').map(|(_, nss)| nss).unwrap_or("")
    }
}

fn validate(s: &str) -> Result<(), UrnError> {
    let scheme_ok = s.len() >= 4 && s.is_char_boundary(4) && s[..4].eq_ignore_ascii_case("urn:");
    if !scheme_ok {
        return Err(UrnError::MissingScheme(s.to_string()));
    }

    let rest = &s[4..];
    let Some((nid, nss)) = rest.split_once(':') else {
        return Err(UrnError::InvalidNid(s.to_string()));
    };

    let nid_ok = !nid.is_empty()
        && nid.len() <= MAX_NID_LEN
        && !nid.starts_with('-')
        && nid.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if !nid_ok {
        return Err(UrnError::InvalidNid(s.to_string()));
    }

    if nss.is_empty() {
        return Err(UrnError::EmptyNss(s.to_string()));
    }

    if let Some(ch) = nss.chars().find(|&c| !c.is_ascii_graphic() || c == SERVICE_TERMINATOR as char) {
        return Err(UrnError::InvalidChar { urn: s.to_string(), ch });
    }

    Ok(())
}

impl fmt::Display for ServiceUrn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ServiceUrn {
    type Err = UrnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for ServiceUrn {
    type Error = UrnError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}
