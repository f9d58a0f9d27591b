//! Keycard generation and verification

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use tracing::{debug, info, warn};

use mensago_common::{Domain, HashAlgorithm, RandomId, UserId, WAddress};
use mensago_core::{EncryptionPair, Entry, EntryType, Keycard, SigType, SigningPair};

pub const ORG_KEYCARD: &str = "org.keycard";
pub const USER_KEYCARD: &str = "user.keycard";

/// Settings for a new organization keycard
#[derive(Debug, Clone)]
pub struct OrgOptions {
    pub name: String,
    pub domain: Domain,
    pub admin: String,
    pub abuse: Option<String>,
    pub support: Option<String>,
    pub language: Option<String>,
}

/// Settings for a new user keycard
#[derive(Debug, Clone)]
pub struct UserOptions {
    pub domain: Domain,
    pub wid: Option<RandomId>,
    pub uid: Option<UserId>,
    pub name: Option<String>,
}

/// Accepts either a full workspace address or a bare workspace ID, which is
/// placed in the organization's domain
fn contact_address(value: &str, domain: &Domain) -> anyhow::Result<WAddress> {
    let text = if value.contains('/') {
        value.to_string()
    } else {
        format!("{}/{}", value, domain)
    };
    text.parse()
        .with_context(|| format!("'{}' is not a workspace address", value))
}

fn prepare_dir(out: &Path, card_name: &str) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(out)
        .with_context(|| format!("Failed to create {}", out.display()))?;
    let card_path = out.join(card_name);
    if card_path.exists() {
        bail!("{} already exists", card_path.display());
    }
    Ok(card_path)
}

/// Generates the organization's keys and its signed root keycard entry
pub fn generate_org(options: &OrgOptions, out: &Path) -> anyhow::Result<Keycard> {
    let card_path = prepare_dir(out, ORG_KEYCARD)?;

    let admin = contact_address(&options.admin, &options.domain)?;
    let abuse = options
        .abuse
        .as_deref()
        .map(|a| contact_address(a, &options.domain))
        .transpose()?;
    let support = options
        .support
        .as_deref()
        .map(|a| contact_address(a, &options.domain))
        .transpose()?;

    let sign = SigningPair::generate();
    let encrypt = EncryptionPair::generate();

    let mut entry = Entry::new_org();
    entry.set_fields([
        ("Name", options.name.as_str()),
        ("Contact-Admin", admin.to_string().as_str()),
        ("Primary-Verification-Key", sign.public_key().as_str()),
        ("Encryption-Key", encrypt.public_key().as_str()),
    ]);
    if let Some(abuse) = abuse {
        entry.set_field("Contact-Abuse", &abuse.to_string());
    }
    if let Some(support) = support {
        entry.set_field("Contact-Support", &support.to_string());
    }
    if let Some(language) = options.language.as_deref() {
        entry.set_field("Language", language);
    }

    entry.generate_hash(HashAlgorithm::Blake2b256);
    entry.sign(sign.private_key(), SigType::Organization)?;
    entry
        .is_compliant()
        .context("Generated organization entry is not compliant")?;

    sign.save(out.join("org_signing_keypair.jk"))?;
    encrypt.save(out.join("org_encryption_keypair.jk"))?;

    let card = Keycard::with_root(entry);
    card.save(&card_path, false)?;
    info!(path = %card_path.display(), domain = %options.domain, "wrote organization keycard");
    Ok(card)
}

/// Generates a user's four key pairs and an unsigned root entry. The entry
/// still needs the organization's signature before it can be published.
pub fn generate_user(options: &UserOptions, out: &Path) -> anyhow::Result<Keycard> {
    let card_path = prepare_dir(out, USER_KEYCARD)?;

    let wid = options.wid.clone().unwrap_or_else(RandomId::generate);
    let crsign = SigningPair::generate();
    let crencrypt = EncryptionPair::generate();
    let sign = SigningPair::generate();
    let encrypt = EncryptionPair::generate();

    let mut entry = Entry::new_user();
    entry.set_fields([
        ("Workspace-ID", wid.as_str()),
        ("Domain", options.domain.as_str()),
        ("Contact-Request-Verification-Key", crsign.public_key().as_str()),
        ("Contact-Request-Encryption-Key", crencrypt.public_key().as_str()),
        ("Encryption-Key", encrypt.public_key().as_str()),
        ("Verification-Key", sign.public_key().as_str()),
    ]);
    if let Some(uid) = &options.uid {
        entry.set_field("User-ID", uid.as_str());
    }
    if let Some(name) = options.name.as_deref() {
        entry.set_field("Name", name);
    }
    entry
        .is_data_compliant()
        .context("Generated user entry is not compliant")?;

    crsign.save(out.join("user_crsigning_keypair.jk"))?;
    crencrypt.save(out.join("user_crencryption_keypair.jk"))?;
    sign.save(out.join("user_signing_keypair.jk"))?;
    encrypt.save(out.join("user_encryption_keypair.jk"))?;

    let card = Keycard::with_root(entry);
    card.save(&card_path, false)?;
    info!(path = %card_path.display(), wid = %wid, "wrote user keycard");
    Ok(card)
}

/// Loads a keycard file and verifies its chain of custody
pub fn verify(path: &Path) -> anyhow::Result<Keycard> {
    let card = Keycard::load(path)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    card.verify()
        .with_context(|| format!("{} failed verification", path.display()))?;

    for entry in &card.entries {
        let index = entry.index().unwrap_or_default();
        entry
            .is_data_compliant()
            .with_context(|| format!("Entry {} is not compliant", index))?;
        if entry.hash().is_empty() {
            warn!(index, "entry has no hash");
        } else {
            entry.verify_hash()?;
        }
        if card.entry_type() == EntryType::User && entry.signature(SigType::User).is_none() {
            warn!(index, "entry is not signed by its owner");
        }
        debug!(index, "entry checked");
    }

    info!(
        path = %path.display(),
        entry_type = %card.entry_type(),
        entries = card.len(),
        "keycard verified"
    );
    Ok(card)
}
