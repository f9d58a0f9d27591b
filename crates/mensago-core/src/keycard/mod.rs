//! Keycards: append-only chains of signed entries
//!
//! A keycard publishes an organization's or user's current public keys.
//! Each new entry is custody-signed by a key from the entry before it, so
//! the whole chain can be verified from the root entry onward.

mod entry;
mod validate;

use std::path::Path;

use tracing::debug;

use mensago_common::{CryptoString, HashAlgorithm, MensagoError, Result};

pub use entry::{
    ChainKeys, ChainedEntry, Entry, EntryType, MAX_EXPIRATION_DAYS, ORG_FIELDS,
    ORG_REQUIRED_FIELDS, SigType, USER_FIELDS, USER_REQUIRED_FIELDS,
};

const BEGIN_ENTRY: &str = "----- BEGIN ENTRY -----";
const END_ENTRY: &str = "----- END ENTRY -----";

/// A chain of keycard entries of a single type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keycard {
    entry_type: EntryType,
    pub entries: Vec<Entry>,
}

impl Keycard {
    pub fn new(entry_type: EntryType) -> Self {
        Self {
            entry_type,
            entries: Vec::new(),
        }
    }

    /// Creates a keycard holding a single root entry
    pub fn with_root(entry: Entry) -> Self {
        Self {
            entry_type: entry.entry_type(),
            entries: vec![entry],
        }
    }

    pub fn entry_type(&self) -> EntryType {
        self.entry_type
    }

    /// The most recent entry
    pub fn current(&self) -> Option<&Entry> {
        self.entries.last()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Appends an entry after checking it belongs to this card
    pub fn push(&mut self, entry: Entry) -> Result<()> {
        if entry.entry_type() != self.entry_type {
            return Err(MensagoError::BadValue(format!(
                "can't add a {} entry to a {} keycard",
                entry.entry_type(),
                self.entry_type
            )));
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Appends a new entry to the chain.
    ///
    /// Organization entries come back complete: previous hash, hash, and
    /// organization signature are all filled in. User entries only carry the
    /// custody signature, because the organization must sign them next.
    pub fn chain(&mut self, custody_key: &CryptoString, rotate_optional: bool) -> Result<ChainedEntry> {
        let current = self
            .entries
            .last()
            .ok_or_else(|| MensagoError::NotFound("missing root entry".to_string()))?;

        let mut chained = current.chain(custody_key, rotate_optional)?;
        if self.entry_type == EntryType::Organization {
            let prev_hash: CryptoString = current.hash().parse()?;
            let entry = &mut chained.entry;
            entry.set_prev_hash(&prev_hash);
            entry.generate_hash(HashAlgorithm::Blake2b256);
            let signing_key = chained.keys.signing_pair().private_key().clone();
            entry.sign(&signing_key, SigType::Organization)?;
        }

        debug!(
            entry_type = %self.entry_type,
            index = self.entries.len() + 1,
            "chained keycard entry"
        );
        self.entries.push(chained.entry.clone());
        Ok(chained)
    }

    /// Verifies every link in the chain
    pub fn verify(&self) -> Result<()> {
        if self.entries.is_empty() {
            return Err(MensagoError::NotFound("keycard contains no entries".to_string()));
        }
        for pair in self.entries.windows(2) {
            pair[1].verify_chain(&pair[0])?;
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // File and transfer formats
    // ---------------------------------------------------------------------

    /// Serializes the card with BEGIN/END ENTRY delimiters and CRLF line
    /// endings
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for entry in &self.entries {
            out.extend_from_slice(BEGIN_ENTRY.as_bytes());
            out.extend_from_slice(b"\r\n");
            out.extend_from_slice(&entry.to_bytes());
            out.extend_from_slice(END_ENTRY.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out
    }

    pub fn save(&self, path: impl AsRef<Path>, clobber: bool) -> Result<()> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(MensagoError::BadValue("path may not be empty".to_string()));
        }
        if path.exists() && !clobber {
            return Err(MensagoError::Exists(path.display().to_string()));
        }
        std::fs::write(path, self.to_bytes())?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MensagoError::NotFound(path.display().to_string()));
        }
        Self::parse(&std::fs::read_to_string(path)?)
    }

    /// Parses the BEGIN/END ENTRY file format. The card type is taken from
    /// the first `Type` line.
    pub fn parse(text: &str) -> Result<Self> {
        let mut card: Option<Keycard> = None;
        let mut accumulator: Vec<&str> = Vec::new();

        for (number, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            if line == BEGIN_ENTRY {
                accumulator.clear();
            } else if line == END_ENTRY {
                let entry_type = card.as_ref().map(Keycard::entry_type).ok_or_else(|| {
                    MensagoError::UnsupportedKeycardType("entry has no type".to_string())
                })?;
                let data = accumulator.join("\r\n");
                let entry = Entry::from_bytes(entry_type, data.as_bytes()).map_err(|e| {
                    let index = card.as_ref().map_or(0, |c| c.len()) + 1;
                    MensagoError::BadData(format!("keycard entry {}: {}", index, e))
                })?;
                if let Some(card) = card.as_mut() {
                    card.entries.push(entry);
                }
                accumulator.clear();
            } else {
                let (name, value) = line.split_once(':').ok_or_else(|| {
                    MensagoError::BadData(format!("invalid line {}", number + 1))
                })?;
                if name == "Type" {
                    let entry_type: EntryType = value.parse()?;
                    match &card {
                        Some(existing) if existing.entry_type != entry_type => {
                            return Err(MensagoError::BadData(
                                "entry type does not match keycard".to_string(),
                            ));
                        }
                        Some(_) => {}
                        None => card = Some(Keycard::new(entry_type)),
                    }
                }
                accumulator.push(line);
            }
        }

        card.ok_or_else(|| MensagoError::NotFound("keycard contains no entries".to_string()))
    }

    /// Parses a keycard as sent by a server, where entries are wrapped in
    /// `----- BEGIN ORG ENTRY -----` (or `USER ENTRY`) delimiters
    pub fn from_transfer(text: &str, entry_type: EntryType) -> Result<Self> {
        let begin = format!("----- BEGIN {} ENTRY -----\r\n", entry_type.transfer_tag());
        let end = format!("----- END {} ENTRY -----\r\n", entry_type.transfer_tag());

        let mut card = Keycard::new(entry_type);
        for chunk in text.split(end.as_str()) {
            if let Some(body) = chunk.strip_prefix(begin.as_str()) {
                card.entries
                    .push(Entry::from_bytes(entry_type, body.as_bytes())?);
            }
        }
        Ok(card)
    }
}
