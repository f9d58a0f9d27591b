//! Identifier and address types
//!
//! - `RandomId`: UUID-style workspace and device identifiers
//! - `UserId`: human-friendly workspace names
//! - `Domain`: organization domains
//! - `MAddress` / `WAddress`: `id/domain` addresses

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::error::{MensagoError, Result};

static RANDOM_ID_PATTERN: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"^[\da-fA-F]{8}-?[\da-fA-F]{4}-?[\da-fA-F]{4}-?[\da-fA-F]{4}-?[\da-fA-F]{12}$",
    )
    .expect("valid random id regex")
});

static USER_ID_ILLEGAL: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r#"[\s\\/"]"#).expect("valid user id regex"));

static DOMAIN_PATTERN: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^([a-z0-9\-]+\.)+[a-z0-9\-]+$").expect("valid domain regex")
});

/// Maximum length of a user ID, in characters
pub const MAX_USER_ID_LENGTH: usize = 64;

// ============== RandomId ==============

/// A UUID-shaped identifier used for workspaces and devices
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RandomId(String);

impl RandomId {
    /// Generates a new random (v4) identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn is_valid(s: &str) -> bool {
        RANDOM_ID_PATTERN.is_match(s.trim())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for RandomId {
    type Err = MensagoError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if !RANDOM_ID_PATTERN.is_match(trimmed) {
            return Err(MensagoError::BadValue(format!("bad random ID '{}'", s)));
        }
        Ok(Self(trimmed.to_lowercase()))
    }
}

impl TryFrom<String> for RandomId {
    type Error = MensagoError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<RandomId> for String {
    fn from(value: RandomId) -> Self {
        value.0
    }
}

impl fmt::Display for RandomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============== UserId ==============

/// A user-chosen workspace name, such as `csimons`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    pub fn is_valid(s: &str) -> bool {
        let trimmed = s.trim();
        !trimmed.is_empty()
            && trimmed.chars().count() <= MAX_USER_ID_LENGTH
            && !USER_ID_ILLEGAL.is_match(trimmed)
    }

    /// Returns true if the user ID is also a valid workspace ID
    pub fn is_wid(&self) -> bool {
        RandomId::is_valid(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for UserId {
    type Err = MensagoError;

    fn from_str(s: &str) -> Result<Self> {
        if !Self::is_valid(s) {
            return Err(MensagoError::BadValue(format!("bad user ID '{}'", s)));
        }
        Ok(Self(s.trim().to_lowercase()))
    }
}

impl TryFrom<String> for UserId {
    type Error = MensagoError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<UserId> for String {
    fn from(value: UserId) -> Self {
        value.0
    }
}

impl From<RandomId> for UserId {
    fn from(value: RandomId) -> Self {
        Self(value.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============== Domain ==============

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Domain(String);

impl Domain {
    pub fn is_valid(s: &str) -> bool {
        DOMAIN_PATTERN.is_match(&s.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Domain {
    type Err = MensagoError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase();
        if !DOMAIN_PATTERN.is_match(&normalized) {
            return Err(MensagoError::BadValue(format!("bad domain '{}'", s)));
        }
        Ok(Self(normalized))
    }
}

impl TryFrom<String> for Domain {
    type Error = MensagoError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Domain> for String {
    fn from(value: Domain) -> Self {
        value.0
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============== Addresses ==============

/// Which kind of identifier an address carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdType {
    Workspace,
    UserId,
}

/// A Mensago address: either `wid/domain` or `userid/domain`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MAddress {
    pub id: UserId,
    pub domain: Domain,
}

impl MAddress {
    pub fn new(id: UserId, domain: Domain) -> Self {
        Self { id, domain }
    }

    pub fn id_type(&self) -> IdType {
        if self.id.is_wid() {
            IdType::Workspace
        } else {
            IdType::UserId
        }
    }

    pub fn is_valid(s: &str) -> bool {
        s.parse::<MAddress>().is_ok()
    }
}

impl FromStr for MAddress {
    type Err = MensagoError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim().split('/').collect();
        if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
            return Err(MensagoError::BadValue(format!("bad address '{}'", s)));
        }
        Ok(Self {
            id: parts[0].parse()?,
            domain: parts[1].parse()?,
        })
    }
}

impl TryFrom<String> for MAddress {
    type Error = MensagoError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<MAddress> for String {
    fn from(value: MAddress) -> Self {
        value.to_string()
    }
}

impl fmt::Display for MAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.id, self.domain)
    }
}

/// A workspace address, which always uses the workspace ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WAddress {
    pub wid: RandomId,
    pub domain: Domain,
}

impl WAddress {
    pub fn new(wid: RandomId, domain: Domain) -> Self {
        Self { wid, domain }
    }

    pub fn as_maddress(&self) -> MAddress {
        MAddress::new(UserId::from(self.wid.clone()), self.domain.clone())
    }
}

impl FromStr for WAddress {
    type Err = MensagoError;

    fn from_str(s: &str) -> Result<Self> {
        let (wid, domain) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| MensagoError::BadValue(format!("bad workspace address '{}'", s)))?;
        Ok(Self {
            wid: wid.parse()?,
            domain: domain.parse()?,
        })
    }
}

impl TryFrom<&MAddress> for WAddress {
    type Error = MensagoError;

    fn try_from(value: &MAddress) -> Result<Self> {
        Ok(Self {
            wid: value.id.as_str().parse()?,
            domain: value.domain.clone(),
        })
    }
}

impl TryFrom<String> for WAddress {
    type Error = MensagoError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<WAddress> for String {
    fn from(value: WAddress) -> Self {
        value.to_string()
    }
}

impl fmt::Display for WAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.wid, self.domain)
    }
}
