//! Compliance checks for keycard entries

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime, Utc};

use mensago_common::{CryptoString, Domain, MensagoError, RandomId, Result, UserId, WAddress};

use super::entry::{AuthItem, Entry, EntryType};

static EXPIRES_PATTERN: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^([0-9]{4})([0-9]{2})([0-9]{2})$").expect("valid expiration regex")
});

static TIMESTAMP_PATTERN: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^([0-9]{4})([0-9]{2})([0-9]{2})T([0-9]{2})([0-9]{2})([0-9]{2})Z$")
        .expect("valid timestamp regex")
});

static LANGUAGE_PATTERN: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^[a-zA-Z]{2,3}(,[a-zA-Z]{2,3})*$").expect("valid language regex")
});

static NAME_PATTERN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^\w").expect("valid name regex"));

/// Entries dated before this year are rejected
const MIN_YEAR: i32 = 2020;

/// Names and user IDs in entries must be shorter than this
const MAX_NAME_LENGTH: usize = 64;

fn bad(msg: impl Into<String>) -> MensagoError {
    MensagoError::BadData(msg.into())
}

fn capture_num<T: std::str::FromStr>(caps: &regex::Captures<'_>, i: usize) -> Option<T> {
    caps.get(i)?.as_str().parse().ok()
}

fn parse_expires(value: &str) -> Option<NaiveDate> {
    let caps = EXPIRES_PATTERN.captures(value)?;
    let year: i32 = capture_num(&caps, 1)?;
    if year < MIN_YEAR {
        return None;
    }
    NaiveDate::from_ymd_opt(year, capture_num(&caps, 2)?, capture_num(&caps, 3)?)
}

fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let caps = TIMESTAMP_PATTERN.captures(value)?;
    let year: i32 = capture_num(&caps, 1)?;
    if year < MIN_YEAR {
        return None;
    }
    NaiveDate::from_ymd_opt(year, capture_num(&caps, 2)?, capture_num(&caps, 3)?)?.and_hms_opt(
        capture_num(&caps, 4)?,
        capture_num(&caps, 5)?,
        capture_num(&caps, 6)?,
    )
}

impl Entry {
    fn require(&self, name: &str) -> Result<&str> {
        self.field(name)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| MensagoError::RequiredFieldMissing(name.to_string()))
    }

    fn validate_integer(&self, name: &str, min: u32, max: Option<u32>) -> Result<()> {
        let value = self.require(name)?;
        if !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(bad(format!("bad value for field {}", name)));
        }
        let number: u32 = value
            .parse()
            .map_err(|_| bad(format!("bad value for field {}", name)))?;
        if number < min {
            return Err(bad(format!("field {} less than minimum", name)));
        }
        if max.is_some_and(|max| number > max) {
            return Err(bad(format!("field {} greater than maximum", name)));
        }
        Ok(())
    }

    fn validate_keys(&self, names: &[&str]) -> Result<()> {
        for name in names {
            if let Some(value) = self.field(name) {
                if !CryptoString::is_cryptostring(value) {
                    return Err(bad(format!("bad key field {}", name)));
                }
            }
        }
        Ok(())
    }

    /// Checks Timestamp and Expires for validity and ordering. Does not check
    /// whether the entry has expired.
    pub fn is_timestamp_valid(&self) -> Result<()> {
        let expires = parse_expires(self.require("Expires")?)
            .ok_or_else(|| bad("bad expiration date"))?;
        let timestamp = parse_timestamp(self.require("Timestamp")?)
            .ok_or_else(|| bad("bad timestamp"))?;

        if timestamp > expires.and_time(chrono::NaiveTime::MIN) {
            return Err(bad("timestamp is later than expiration"));
        }
        Ok(())
    }

    /// Returns true if the expiration date has passed
    pub fn is_expired(&self) -> Result<bool> {
        let expires = parse_expires(self.require("Expires")?)
            .ok_or_else(|| bad("bad expiration date"))?;
        Ok(Utc::now().naive_utc() > expires.and_time(chrono::NaiveTime::MIN))
    }

    fn validate_common_data(&self) -> Result<()> {
        self.validate_integer("Index", 1, None)?;

        if let Some(name) = self.field("Name") {
            if !NAME_PATTERN.is_match(name) || name.chars().count() >= MAX_NAME_LENGTH {
                return Err(bad("bad name value"));
            }
        }

        self.validate_integer("Time-To-Live", 1, Some(30))?;
        self.is_timestamp_valid()
    }

    fn validate_org_data(&self) -> Result<()> {
        if self.require("Contact-Admin")?.parse::<WAddress>().is_err() {
            return Err(bad("bad admin contact address"));
        }
        for name in ["Contact-Support", "Contact-Abuse"] {
            if let Some(value) = self.field(name) {
                if value.parse::<WAddress>().is_err() {
                    return Err(bad(format!("bad contact address {}", name)));
                }
            }
        }

        if let Some(language) = self.field("Language") {
            if !LANGUAGE_PATTERN.is_match(language) {
                return Err(bad("bad language list"));
            }
        }

        self.validate_keys(&[
            "Primary-Verification-Key",
            "Secondary-Verification-Key",
            "Encryption-Key",
        ])
    }

    fn validate_user_data(&self) -> Result<()> {
        if !RandomId::is_valid(self.require("Workspace-ID")?) {
            return Err(bad("bad workspace ID"));
        }

        let domain = self.require("Domain")?;
        if !Domain::is_valid(domain) || domain.len() >= MAX_NAME_LENGTH {
            return Err(bad("bad domain value"));
        }

        self.validate_keys(&[
            "Contact-Request-Verification-Key",
            "Contact-Request-Encryption-Key",
            "Encryption-Key",
            "Verification-Key",
        ])?;

        if let Some(uid) = self.field("User-ID") {
            if !UserId::is_valid(uid) || uid.chars().count() >= MAX_NAME_LENGTH {
                return Err(bad("bad user id value"));
            }
        }
        Ok(())
    }

    /// Checks the data fields only, ignoring signatures and hashes
    pub fn is_data_compliant(&self) -> Result<()> {
        for name in self.entry_type().required_fields() {
            let value = self.require(name)?;
            if value.trim() != value {
                return Err(bad(format!("leading/trailing whitespace in field {}", name)));
            }
        }

        self.validate_common_data()?;
        match self.entry_type() {
            EntryType::Organization => self.validate_org_data(),
            EntryType::User => self.validate_user_data(),
        }
    }

    /// Checks the data fields and the presence of every required signature
    /// and hash
    pub fn is_compliant(&self) -> Result<()> {
        self.is_data_compliant()?;

        for item in self.entry_type().auth_order() {
            match item {
                AuthItem::Hashes => {
                    if self.hash().is_empty() {
                        return Err(MensagoError::SignatureMissing("Hash".to_string()));
                    }
                }
                AuthItem::Signature { sig, optional } => {
                    let missing = match self.signature(*sig) {
                        Some(value) => value.is_empty(),
                        None => !optional,
                    };
                    if missing {
                        return Err(MensagoError::SignatureMissing(format!("{}-Signature", sig)));
                    }
                }
            }
        }
        Ok(())
    }
}
