//! Keycard entries
//!
//! An entry is a set of `Field:Value` lines followed by an ordered list of
//! authentication items (signatures and hashes). Each signature covers every
//! line that precedes it, so the order of those items is fixed per entry
//! type:
//!
//! - Organization: Custody, Previous-Hash/Hash, Organization
//! - User: Custody, Organization, Previous-Hash/Hash, User

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Duration, Utc};
use tracing::debug;

use mensago_common::{
    CryptoString, EXPIRES_FORMAT, HashAlgorithm, MensagoError, Result, TIMESTAMP_FORMAT, hash,
};

use crate::encryption::{ED25519, EncryptionPair, SigningPair, VerificationKey};

/// Longest expiration allowed for any entry, in days
pub const MAX_EXPIRATION_DAYS: u32 = 1095;

pub const ORG_FIELDS: &[&str] = &[
    "Index",
    "Name",
    "Contact-Admin",
    "Contact-Abuse",
    "Contact-Support",
    "Language",
    "Primary-Verification-Key",
    "Secondary-Verification-Key",
    "Encryption-Key",
    "Time-To-Live",
    "Expires",
    "Timestamp",
];

pub const ORG_REQUIRED_FIELDS: &[&str] = &[
    "Index",
    "Name",
    "Contact-Admin",
    "Primary-Verification-Key",
    "Encryption-Key",
    "Time-To-Live",
    "Expires",
    "Timestamp",
];

pub const USER_FIELDS: &[&str] = &[
    "Index",
    "Name",
    "Workspace-ID",
    "User-ID",
    "Domain",
    "Contact-Request-Verification-Key",
    "Contact-Request-Encryption-Key",
    "Encryption-Key",
    "Verification-Key",
    "Time-To-Live",
    "Expires",
    "Timestamp",
];

pub const USER_REQUIRED_FIELDS: &[&str] = &[
    "Index",
    "Workspace-ID",
    "Domain",
    "Contact-Request-Verification-Key",
    "Contact-Request-Encryption-Key",
    "Encryption-Key",
    "Verification-Key",
    "Time-To-Live",
    "Expires",
    "Timestamp",
];

// ============== Entry and signature types ==============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    Organization,
    User,
}

impl EntryType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryType::Organization => "Organization",
            EntryType::User => "User",
        }
    }

    pub fn field_names(self) -> &'static [&'static str] {
        match self {
            EntryType::Organization => ORG_FIELDS,
            EntryType::User => USER_FIELDS,
        }
    }

    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            EntryType::Organization => ORG_REQUIRED_FIELDS,
            EntryType::User => USER_REQUIRED_FIELDS,
        }
    }

    pub(crate) fn auth_order(self) -> &'static [AuthItem] {
        match self {
            EntryType::Organization => ORG_AUTH_ORDER,
            EntryType::User => USER_AUTH_ORDER,
        }
    }

    /// Days a cached copy of the card stays fresh when no TTL is given
    pub fn default_ttl(self) -> u32 {
        match self {
            EntryType::Organization => 30,
            EntryType::User => 7,
        }
    }

    fn default_expiration(self) -> u32 {
        match self {
            EntryType::Organization => 365,
            EntryType::User => 90,
        }
    }

    /// Field holding the key that signs the next entry's custody signature
    fn custody_key_field(self) -> &'static str {
        match self {
            EntryType::Organization => "Primary-Verification-Key",
            EntryType::User => "Contact-Request-Verification-Key",
        }
    }

    /// Header word used in server keycard transfers
    pub(crate) fn transfer_tag(self) -> &'static str {
        match self {
            EntryType::Organization => "ORG",
            EntryType::User => "USER",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = MensagoError;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("organization") {
            Ok(EntryType::Organization)
        } else if s.eq_ignore_ascii_case("user") {
            Ok(EntryType::User)
        } else {
            Err(MensagoError::UnsupportedKeycardType(s.to_string()))
        }
    }
}

/// Signature kinds found in keycard entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SigType {
    Custody,
    Organization,
    User,
}

impl SigType {
    pub fn as_str(self) -> &'static str {
        match self {
            SigType::Custody => "Custody",
            SigType::Organization => "Organization",
            SigType::User => "User",
        }
    }
}

impl fmt::Display for SigType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SigType {
    type Err = MensagoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Custody" => Ok(SigType::Custody),
            "Organization" => Ok(SigType::Organization),
            "User" => Ok(SigType::User),
            other => Err(MensagoError::BadData(format!("bad signature line {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AuthItem {
    Signature { sig: SigType, optional: bool },
    Hashes,
}

const ORG_AUTH_ORDER: &[AuthItem] = &[
    AuthItem::Signature {
        sig: SigType::Custody,
        optional: true,
    },
    AuthItem::Hashes,
    AuthItem::Signature {
        sig: SigType::Organization,
        optional: false,
    },
];

const USER_AUTH_ORDER: &[AuthItem] = &[
    AuthItem::Signature {
        sig: SigType::Custody,
        optional: true,
    },
    AuthItem::Signature {
        sig: SigType::Organization,
        optional: false,
    },
    AuthItem::Hashes,
    AuthItem::Signature {
        sig: SigType::User,
        optional: false,
    },
];

// ============== Entry ==============

/// A single keycard entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    entry_type: EntryType,
    pub(crate) fields: BTreeMap<String, String>,
    signatures: BTreeMap<SigType, String>,
    prev_hash: String,
    hash: String,
}

impl Entry {
    /// Creates an entry populated with default index, TTL, timestamp, and
    /// expiration
    pub fn new(entry_type: EntryType) -> Self {
        let mut entry = Self::empty(entry_type);
        entry.set_field("Index", "1");
        entry.set_field("Time-To-Live", &entry_type.default_ttl().to_string());
        entry.set_field("Timestamp", &default_timestamp(entry_type));
        entry.set_expiration(None);
        entry
    }

    pub fn new_org() -> Self {
        Self::new(EntryType::Organization)
    }

    pub fn new_user() -> Self {
        Self::new(EntryType::User)
    }

    fn empty(entry_type: EntryType) -> Self {
        Self {
            entry_type,
            fields: BTreeMap::new(),
            signatures: BTreeMap::new(),
            prev_hash: String::new(),
            hash: String::new(),
        }
    }

    /// Parses an entry from its CRLF text form
    pub fn from_bytes(entry_type: EntryType, data: &[u8]) -> Result<Self> {
        let mut entry = Self::empty(entry_type);
        entry.set(data)?;
        Ok(entry)
    }

    pub fn entry_type(&self) -> EntryType {
        self.entry_type
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn index(&self) -> Result<u32> {
        self.field("Index")
            .ok_or_else(|| MensagoError::RequiredFieldMissing("Index".to_string()))?
            .parse()
            .map_err(|_| MensagoError::BadData("invalid entry index".to_string()))
    }

    /// Sets a field. Any edit invalidates the signatures and hash.
    pub fn set_field(&mut self, name: &str, value: &str) {
        self.fields.insert(name.to_string(), value.to_string());
        self.signatures.clear();
        self.hash.clear();
    }

    pub fn set_fields<'a, I>(&mut self, fields: I)
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (name, value) in fields {
            self.fields.insert(name.to_string(), value.to_string());
        }
        self.signatures.clear();
        self.hash.clear();
    }

    pub fn remove_field(&mut self, name: &str) {
        self.fields.remove(name);
        self.signatures.clear();
        self.hash.clear();
    }

    pub fn signature(&self, sig: SigType) -> Option<&str> {
        self.signatures.get(&sig).map(String::as_str)
    }

    /// Stores a signature supplied by another party, such as the server's
    /// organization signature. Nothing else is cleared.
    pub fn set_signature(&mut self, sig: SigType, value: &CryptoString) {
        self.signatures.insert(sig, value.to_string());
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Stores a hash supplied by another party. Use `generate_hash` to
    /// compute one locally.
    pub fn set_hash(&mut self, value: &CryptoString) {
        self.hash = value.to_string();
    }

    pub fn prev_hash(&self) -> &str {
        &self.prev_hash
    }

    pub fn set_prev_hash(&mut self, value: &CryptoString) {
        self.prev_hash = value.to_string();
    }

    /// Sets the expiration date the given number of days from today, using
    /// the type's default when `None`
    pub fn set_expiration(&mut self, days: Option<u32>) {
        let days = days
            .unwrap_or_else(|| self.entry_type.default_expiration())
            .min(MAX_EXPIRATION_DAYS);
        let expires = Utc::now() + Duration::days(i64::from(days));
        self.set_field("Expires", &expires.format(EXPIRES_FORMAT).to_string());
    }

    // ---------------------------------------------------------------------
    // Text form
    // ---------------------------------------------------------------------

    /// Builds the entry's text, including the first `level` authentication
    /// items. Lines always end in CRLF.
    pub fn make_bytestring(&self, level: usize) -> Vec<u8> {
        let mut out = Vec::new();
        push_line(&mut out, "Type", self.entry_type.as_str());

        for name in self.entry_type.field_names() {
            if let Some(value) = self.fields.get(*name).filter(|v| !v.is_empty()) {
                push_line(&mut out, name, value);
            }
        }

        for item in self.entry_type.auth_order().iter().take(level) {
            match item {
                AuthItem::Hashes => {
                    if !self.prev_hash.is_empty() {
                        push_line(&mut out, "Previous-Hash", &self.prev_hash);
                    }
                    if !self.hash.is_empty() {
                        push_line(&mut out, "Hash", &self.hash);
                    }
                }
                AuthItem::Signature { sig, .. } => {
                    if let Some(value) = self.signatures.get(sig).filter(|v| !v.is_empty()) {
                        push_line(&mut out, &format!("{}-Signature", sig), value);
                    }
                }
            }
        }
        out
    }

    /// The complete text of the entry
    pub fn to_bytes(&self) -> Vec<u8> {
        self.make_bytestring(self.entry_type.auth_order().len())
    }

    /// Populates the entry from CRLF text. Unknown fields are kept but are
    /// not written back out.
    pub fn set(&mut self, data: &[u8]) -> Result<()> {
        let text = std::str::from_utf8(data)
            .map_err(|_| MensagoError::BadData("entry is not valid UTF-8".to_string()))?;

        for line in text.split("\r\n") {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| MensagoError::BadData(format!("bad entry line '{}'", line)))?;

            if name == "Type" {
                if value != self.entry_type.as_str() {
                    return Err(MensagoError::BadData(format!(
                        "can't use {} data on a {} entry",
                        value, self.entry_type
                    )));
                }
            } else if let Some(sig) = name.strip_suffix("-Signature") {
                self.signatures.insert(sig.parse()?, value.to_string());
            } else if name == "Hash" {
                self.hash = value.to_string();
            } else if name == "Previous-Hash" {
                self.prev_hash = value.to_string();
            } else {
                self.fields.insert(name.to_string(), value.to_string());
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Hashing and signing
    // ---------------------------------------------------------------------

    fn hash_position(&self) -> usize {
        self.entry_type
            .auth_order()
            .iter()
            .position(|item| *item == AuthItem::Hashes)
            .unwrap_or(0)
    }

    fn signature_position(&self, sig: SigType) -> Result<usize> {
        self.entry_type
            .auth_order()
            .iter()
            .position(|item| matches!(item, AuthItem::Signature { sig: s, .. } if *s == sig))
            .ok_or_else(|| {
                MensagoError::BadValue(format!(
                    "{} entries have no {} signature",
                    self.entry_type, sig
                ))
            })
    }

    /// The hashed text: everything before the hash item plus the previous
    /// hash, if any
    fn hash_bytestring(&self) -> Vec<u8> {
        let mut data = self.make_bytestring(self.hash_position());
        if !self.prev_hash.is_empty() {
            push_line(&mut data, "Previous-Hash", &self.prev_hash);
        }
        data
    }

    pub fn get_hash(&self, algorithm: HashAlgorithm) -> CryptoString {
        hash::hash(algorithm, &self.hash_bytestring())
    }

    pub fn generate_hash(&mut self, algorithm: HashAlgorithm) {
        self.hash = self.get_hash(algorithm).to_string();
    }

    /// Confirms the stored hash matches the entry's contents
    pub fn verify_hash(&self) -> Result<()> {
        let current: CryptoString = self
            .hash
            .parse()
            .map_err(|_| MensagoError::BadData(format!("invalid hash '{}'", self.hash)))?;
        let algorithm: HashAlgorithm = current.prefix().parse()?;
        if self.get_hash(algorithm) != current {
            return Err(MensagoError::HashMismatch);
        }
        Ok(())
    }

    /// Signs the entry with an ED25519 private key. The named signature and
    /// every authentication item after it are cleared first.
    pub fn sign(&mut self, signing_key: &CryptoString, sig: SigType) -> Result<()> {
        if signing_key.prefix() != ED25519 {
            return Err(MensagoError::UnsupportedAlgorithm(
                signing_key.prefix().to_string(),
            ));
        }
        let position = self.signature_position(sig)?;

        for item in &self.entry_type.auth_order()[position..] {
            match item {
                AuthItem::Signature { sig, .. } => {
                    self.signatures.remove(sig);
                }
                AuthItem::Hashes => self.hash.clear(),
            }
        }

        let pair = SigningPair::from_seed(signing_key.data())?;
        let signature = pair.sign(&self.make_bytestring(position))?;
        debug!(entry_type = %self.entry_type, signature = %sig, "signed keycard entry");
        self.signatures.insert(sig, signature.to_string());
        Ok(())
    }

    pub fn verify_signature(&self, verify_key: &CryptoString, sig: SigType) -> Result<()> {
        if verify_key.prefix() != ED25519 {
            return Err(MensagoError::UnsupportedAlgorithm(
                verify_key.prefix().to_string(),
            ));
        }
        let position = self.signature_position(sig)?;

        let value = self
            .signatures
            .get(&sig)
            .ok_or_else(|| MensagoError::SignatureMissing(format!("{}-Signature", sig)))?;
        if value.is_empty() {
            return Err(MensagoError::NotCompliant(format!("empty signature {}", sig)));
        }
        let signature: CryptoString = value
            .parse()
            .map_err(|_| MensagoError::BadData(format!("bad {} signature", sig)))?;

        VerificationKey::new(verify_key.clone())?
            .verify(&self.make_bytestring(position), &signature)
            .map_err(|_| {
                MensagoError::InvalidKeycard(format!("{} signature does not verify", sig))
            })
    }

    // ---------------------------------------------------------------------
    // Chaining
    // ---------------------------------------------------------------------

    /// Creates the next entry in the chain with new keys, custody-signed by
    /// `custody_key`.
    ///
    /// Organization entries get new primary signing and encryption keys. The
    /// old primary key becomes the secondary key unless `rotate_optional` is
    /// set, in which case a new secondary key is generated as well. User
    /// entries get all four keys replaced.
    pub fn chain(&self, custody_key: &CryptoString, rotate_optional: bool) -> Result<ChainedEntry> {
        if custody_key.prefix() != ED25519 {
            return Err(MensagoError::BadValue(format!(
                "wrong key type {}",
                custody_key.prefix()
            )));
        }
        self.is_compliant()?;

        let mut next = Entry::new(self.entry_type);
        let fresh_timestamp = next.fields.get("Timestamp").cloned();
        let fresh_expires = next.fields.get("Expires").cloned();
        next.fields = self.fields.clone();
        if let Some(ts) = fresh_timestamp {
            next.fields.insert("Timestamp".to_string(), ts);
        }
        if let Some(expires) = fresh_expires {
            next.fields.insert("Expires".to_string(), expires);
        }
        next.fields
            .insert("Index".to_string(), (self.index()? + 1).to_string());

        let keys = match self.entry_type {
            EntryType::Organization => {
                let sign = SigningPair::generate();
                let encrypt = EncryptionPair::generate();
                next.fields.insert(
                    "Primary-Verification-Key".to_string(),
                    sign.public_key().to_string(),
                );
                next.fields
                    .insert("Encryption-Key".to_string(), encrypt.public_key().to_string());

                let altsign = if rotate_optional {
                    let altsign = SigningPair::generate();
                    next.fields.insert(
                        "Secondary-Verification-Key".to_string(),
                        altsign.public_key().to_string(),
                    );
                    Some(altsign)
                } else {
                    let previous = self.field("Primary-Verification-Key").unwrap_or_default();
                    next.fields.insert(
                        "Secondary-Verification-Key".to_string(),
                        previous.to_string(),
                    );
                    None
                };
                ChainKeys::Organization {
                    sign,
                    encrypt,
                    altsign,
                }
            }
            EntryType::User => {
                let crsign = SigningPair::generate();
                let crencrypt = EncryptionPair::generate();
                let sign = SigningPair::generate();
                let encrypt = EncryptionPair::generate();
                for (name, value) in [
                    ("Contact-Request-Verification-Key", crsign.public_key()),
                    ("Contact-Request-Encryption-Key", crencrypt.public_key()),
                    ("Encryption-Key", encrypt.public_key()),
                    ("Verification-Key", sign.public_key()),
                ] {
                    next.fields.insert(name.to_string(), value.to_string());
                }
                ChainKeys::User {
                    crsign,
                    crencrypt,
                    sign,
                    encrypt,
                }
            }
        };

        next.sign(custody_key, SigType::Custody)?;
        Ok(ChainedEntry { entry: next, keys })
    }

    /// Verifies the custody chain between `previous` and this entry
    pub fn verify_chain(&self, previous: &Entry) -> Result<()> {
        if previous.entry_type != self.entry_type {
            return Err(MensagoError::BadValue("entry type mismatch".to_string()));
        }
        if self.signature(SigType::Custody).is_none_or(str::is_empty) {
            return Err(MensagoError::NotFound("custody signature missing".to_string()));
        }

        let key_field = self.entry_type.custody_key_field();
        let key: CryptoString = previous
            .field(key_field)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| MensagoError::NotFound(format!("{} missing", key_field)))?
            .parse()?;

        if self.index()? != previous.index()? + 1 {
            return Err(MensagoError::InvalidKeycard(
                "entry index compliance failure".to_string(),
            ));
        }

        self.verify_signature(&key, SigType::Custody)
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.to_bytes()))
    }
}

fn push_line(out: &mut Vec<u8>, name: &str, value: &str) {
    out.extend_from_slice(name.as_bytes());
    out.push(b':');
    out.extend_from_slice(value.as_bytes());
    out.extend_from_slice(b"\r\n");
}

fn default_timestamp(entry_type: EntryType) -> String {
    let now = Utc::now();
    // User entries are backdated so small clock differences with the
    // server do not make them appear to come from the future.
    let stamp = match entry_type {
        EntryType::Organization => now,
        EntryType::User => now - Duration::minutes(5),
    };
    stamp.format(TIMESTAMP_FORMAT).to_string()
}

// ============== Chaining results ==============

/// Keys generated while chaining an entry
#[derive(Debug, Clone)]
pub enum ChainKeys {
    Organization {
        sign: SigningPair,
        encrypt: EncryptionPair,
        /// Present only when optional keys were rotated
        altsign: Option<SigningPair>,
    },
    User {
        crsign: SigningPair,
        crencrypt: EncryptionPair,
        sign: SigningPair,
        encrypt: EncryptionPair,
    },
}

impl ChainKeys {
    /// The primary signing pair of the new entry
    pub fn signing_pair(&self) -> &SigningPair {
        match self {
            ChainKeys::Organization { sign, .. } | ChainKeys::User { sign, .. } => sign,
        }
    }

    pub fn encryption_pair(&self) -> &EncryptionPair {
        match self {
            ChainKeys::Organization { encrypt, .. } | ChainKeys::User { encrypt, .. } => encrypt,
        }
    }
}

/// A newly chained entry and the keys it was built with
#[derive(Debug, Clone)]
pub struct ChainedEntry {
    pub entry: Entry,
    pub keys: ChainKeys,
}
