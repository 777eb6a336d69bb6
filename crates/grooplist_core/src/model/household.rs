//! Household, membership and member-location records.
//!
//! # Responsibility
//! - Define household codes and the documents that describe membership.
//! - Generate short human-enterable codes for new households.
//!
//! # Invariants
//! - A `HouseholdCode` is always 6 uppercase base-36 characters.
//! - A user is a member only when both the member record and the user
//!   index record exist.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub const HOUSEHOLD_CODE_LEN: usize = 6;
const CODE_ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

static HOUSEHOLD_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9A-Z]{6}$").expect("valid household code regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidHouseholdCode(pub String);

impl Display for InvalidHouseholdCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid household code `{}`", self.0)
    }
}

impl Error for InvalidHouseholdCode {}

/// Short code identifying a household, e.g. `K7Q2ZD`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HouseholdCode(String);

impl HouseholdCode {
    /// Parses user input: surrounding whitespace is ignored, case folded.
    pub fn parse(raw: &str) -> Result<Self, InvalidHouseholdCode> {
        let normalized = raw.trim().to_ascii_uppercase();
        if !HOUSEHOLD_CODE_RE.is_match(&normalized) {
            return Err(InvalidHouseholdCode(raw.trim().to_string()));
        }
        Ok(Self(normalized))
    }

    /// Generates a fresh random code.
    pub fn generate() -> Self {
        let bytes = Uuid::new_v4().into_bytes();
        let code = bytes
            .iter()
            .take(HOUSEHOLD_CODE_LEN)
            .map(|byte| CODE_ALPHABET[usize::from(*byte) % CODE_ALPHABET.len()] as char)
            .collect::<String>();
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for HouseholdCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for HouseholdCode {
    type Error = InvalidHouseholdCode;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<HouseholdCode> for String {
    fn from(value: HouseholdCode) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Owner,
    Member,
}

/// Remote document shape of `households/{code}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HouseholdDocument {
    pub name: String,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub created_by: Option<String>,
}

/// Remote document shape of `households/{code}/members/{uid}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDocument {
    pub uid: String,
    #[serde(default)]
    pub name: String,
    pub role: MemberRole,
    #[serde(default)]
    pub joined_at: Option<i64>,
}

/// Remote document shape of `users/{uid}/households/{code}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserHousehold {
    pub household_id: HouseholdCode,
    #[serde(default)]
    pub name: String,
    pub role: MemberRole,
    #[serde(default)]
    pub joined_at: Option<i64>,
    #[serde(default)]
    pub unread_count: u32,
}

/// Household selection bound into a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HouseholdRef {
    pub code: HouseholdCode,
    pub name: String,
}

/// Remote document shape of `households/{code}/locations/{uid}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationDocument {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// Last published position of one member.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberLocation {
    pub user_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub updated_at_ms: i64,
}

/// Remote document shape of `households/{code}/members/{uid}/tokens/{token}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushTokenDocument {
    pub token: String,
    pub updated_at: i64,
}

#[cfg(test)]
mod tests {
    use super::{HouseholdCode, HOUSEHOLD_CODE_LEN};

    #[test]
    fn parse_normalizes_case_and_whitespace() {
        let code = HouseholdCode::parse("  ab12cd ").unwrap();
        assert_eq!(code.as_str(), "AB12CD");
    }

    #[test]
    fn parse_rejects_wrong_length_and_symbols() {
        assert!(HouseholdCode::parse("ABC").is_err());
        assert!(HouseholdCode::parse("AB-12C").is_err());
    }

    #[test]
    fn generated_codes_are_parseable() {
        for _ in 0..32 {
            let code = HouseholdCode::generate();
            assert_eq!(code.as_str().len(), HOUSEHOLD_CODE_LEN);
            assert_eq!(HouseholdCode::parse(code.as_str()).unwrap(), code);
        }
    }
}
