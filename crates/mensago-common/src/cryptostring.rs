//! CryptoString: an algorithm prefix paired with Base85-encoded data
//!
//! Keys, hashes, and signatures all travel as `PREFIX:DATA`, for example
//! `ED25519:r#r*RiXIN-0n)BzP3bv`.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::base85;
use crate::error::{MensagoError, Result};

static PREFIX_PATTERN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^[A-Z0-9-]{1,15}$").expect("valid prefix regex"));

/// A validated `PREFIX:DATA` string
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CryptoString {
    text: String,
    split: usize,
}

impl CryptoString {
    /// Builds a CryptoString from a prefix and raw binary data
    pub fn from_raw(prefix: &str, data: &[u8]) -> Result<Self> {
        if !PREFIX_PATTERN.is_match(prefix) {
            return Err(MensagoError::BadValue(format!("bad prefix '{}'", prefix)));
        }
        if data.is_empty() {
            return Err(MensagoError::EmptyData);
        }
        Ok(Self::join(prefix, &base85::encode(data)))
    }

    /// Builds a CryptoString from a fixed algorithm name and key or digest
    /// bytes. The prefix must be a valid prefix and `data` must not be empty.
    pub fn new_unchecked(prefix: &'static str, data: &[u8]) -> Self {
        debug_assert!(PREFIX_PATTERN.is_match(prefix) && !data.is_empty());
        Self::join(prefix, &base85::encode(data))
    }

    fn join(prefix: &str, data: &str) -> Self {
        Self {
            text: format!("{}:{}", prefix, data),
            split: prefix.len(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.text[..self.split]
    }

    /// The Base85-encoded portion
    pub fn data(&self) -> &str {
        &self.text[self.split + 1..]
    }

    /// Decodes the data portion back into bytes
    pub fn as_raw(&self) -> Result<Vec<u8>> {
        base85::decode(self.data())
    }

    /// The full `PREFIX:DATA` text
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Returns true if the string is a well-formed CryptoString
    pub fn is_cryptostring(s: &str) -> bool {
        s.parse::<CryptoString>().is_ok()
    }
}

impl FromStr for CryptoString {
    type Err = MensagoError;

    fn from_str(s: &str) -> Result<Self> {
        let (prefix, data) = s
            .split_once(':')
            .ok_or_else(|| MensagoError::BadValue(format!("'{}' is missing a prefix", s)))?;

        if !PREFIX_PATTERN.is_match(prefix) {
            return Err(MensagoError::BadValue(format!("bad prefix '{}'", prefix)));
        }
        if data.is_empty() {
            return Err(MensagoError::EmptyData);
        }
        base85::decode(data)?;

        Ok(Self::join(prefix, data))
    }
}

impl TryFrom<String> for CryptoString {
    type Error = MensagoError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl TryFrom<&str> for CryptoString {
    type Error = MensagoError;

    fn try_from(value: &str) -> Result<Self> {
        value.parse()
    }
}

impl From<CryptoString> for String {
    fn from(value: CryptoString) -> Self {
        value.text
    }
}

impl fmt::Display for CryptoString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        let cs: CryptoString = "CURVE25519:(B2XX5|<+lOSR>_0mQ=KX4o<aOvXe6M`Z5ldINd`".parse().unwrap();
        assert_eq!(cs.prefix(), "CURVE25519");
        assert_eq!(cs.data(), "(B2XX5|<+lOSR>_0mQ=KX4o<aOvXe6M`Z5ldINd`");
        assert_eq!(cs.as_raw().unwrap().len(), 32);
        assert_eq!(
            cs.as_str(),
            "CURVE25519:(B2XX5|<+lOSR>_0mQ=KX4o<aOvXe6M`Z5ldINd`"
        );
    }

    #[test]
    fn test_parse_invalid() {
        assert!("".parse::<CryptoString>().is_err());
        assert!("noprefix".parse::<CryptoString>().is_err());
        assert!("lower:abcde".parse::<CryptoString>().is_err());
        assert!("ED25519:".parse::<CryptoString>().is_err());
        assert!("ED25519:has space".parse::<CryptoString>().is_err());
        assert!("SIXTEENCHARSLONG:abcde".parse::<CryptoString>().is_err());
    }

    #[test]
    fn test_from_raw_and_display() {
        let cs = CryptoString::from_raw("TEST", b"hello").unwrap();
        assert_eq!(cs.to_string(), "TEST:Xk~0{Zv");
        assert_eq!(cs.as_str(), "TEST:Xk~0{Zv");
        assert_eq!(cs.prefix(), "TEST");
        assert_eq!(cs.as_raw().unwrap(), b"hello");
        assert!(CryptoString::from_raw("TEST", b"").is_err());
    }

    #[test]
    fn test_serde_string_form() {
        let cs = CryptoString::from_raw("TEST", b"hello").unwrap();
        let json = serde_json::to_string(&cs).unwrap();
        assert_eq!(json, "\"TEST:Xk~0{Zv\"");
        let back: CryptoString = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cs);
        assert!(serde_json::from_str::<CryptoString>("\"bad\"").is_err());
    }

    #[test]
    fn test_is_cryptostring() {
        assert!(CryptoString::is_cryptostring("BLAKE2B-256:Xk~0{Zv"));
        assert!(!CryptoString::is_cryptostring("BLAKE2B-256"));
    }
}
