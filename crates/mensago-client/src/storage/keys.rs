//! Key storage

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use sea_orm::*;
use tracing::debug;

use mensago_common::{CryptoString, MensagoError};
use mensago_core::{CryptoKey, EncryptionPair, KeyType, SecretKey, SigningPair};

use super::Storage;
use super::entity::keys;
use crate::error::{ClientError, Result};

/// Sub-second precision keeps "newest key of a category" unambiguous when
/// several keys are stored in quick succession
const KEY_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.6fZ";

/// Role a stored key plays for its workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCategory {
    CrEncrypt,
    CrSign,
    Encrypt,
    Sign,
    Storage,
    Folder,
}

impl KeyCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyCategory::CrEncrypt => "crencrypt",
            KeyCategory::CrSign => "crsign",
            KeyCategory::Encrypt => "encrypt",
            KeyCategory::Sign => "sign",
            KeyCategory::Storage => "storage",
            KeyCategory::Folder => "folder",
        }
    }
}

impl fmt::Display for KeyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyCategory {
    type Err = MensagoError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "crencrypt" => Ok(KeyCategory::CrEncrypt),
            "crsign" => Ok(KeyCategory::CrSign),
            "encrypt" => Ok(KeyCategory::Encrypt),
            "sign" => Ok(KeyCategory::Sign),
            "storage" => Ok(KeyCategory::Storage),
            "folder" => Ok(KeyCategory::Folder),
            other => Err(MensagoError::BadValue(format!(
                "unknown key category '{}'",
                other
            ))),
        }
    }
}

/// A key as kept in the profile database
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredKey {
    Encryption(EncryptionPair),
    Signing(SigningPair),
    Secret(SecretKey),
}

impl StoredKey {
    pub fn key_type(&self) -> KeyType {
        match self {
            StoredKey::Encryption(_) => KeyType::Asymmetric,
            StoredKey::Signing(_) => KeyType::Signing,
            StoredKey::Secret(_) => KeyType::Symmetric,
        }
    }

    pub fn key_hash(&self) -> CryptoString {
        match self {
            StoredKey::Encryption(k) => k.key_hash(),
            StoredKey::Signing(k) => k.key_hash(),
            StoredKey::Secret(k) => k.key_hash(),
        }
    }

    pub fn algorithm(&self) -> &str {
        match self {
            StoredKey::Encryption(k) => k.algorithm(),
            StoredKey::Signing(k) => k.algorithm(),
            StoredKey::Secret(k) => k.algorithm(),
        }
    }

    pub fn into_encryption_pair(self) -> Result<EncryptionPair> {
        match self {
            StoredKey::Encryption(k) => Ok(k),
            other => Err(wrong_type(KeyType::Asymmetric, other.key_type())),
        }
    }

    pub fn into_signing_pair(self) -> Result<SigningPair> {
        match self {
            StoredKey::Signing(k) => Ok(k),
            other => Err(wrong_type(KeyType::Signing, other.key_type())),
        }
    }

    pub fn into_secret_key(self) -> Result<SecretKey> {
        match self {
            StoredKey::Secret(k) => Ok(k),
            other => Err(wrong_type(KeyType::Symmetric, other.key_type())),
        }
    }

    fn from_model(model: keys::Model) -> Result<Self> {
        let private: CryptoString = model.private.parse()?;
        let public = || -> Result<CryptoString> {
            let text = model.public.as_deref().ok_or_else(|| {
                ClientError::Mensago(MensagoError::BadData(format!(
                    "key {} has no public half",
                    model.keyid
                )))
            })?;
            Ok(text.parse()?)
        };

        let key = match model.ktype.parse::<KeyType>()? {
            KeyType::Asymmetric => StoredKey::Encryption(EncryptionPair::from_strings(public()?, private)?),
            KeyType::Signing => StoredKey::Signing(SigningPair::from_strings(public()?, private)?),
            KeyType::Symmetric => StoredKey::Secret(SecretKey::from_string(private)?),
        };
        Ok(key)
    }
}

fn wrong_type(wanted: KeyType, got: KeyType) -> ClientError {
    ClientError::bad_value(format!(
        "expected {} key, found {}",
        wanted.as_str(),
        got.as_str()
    ))
}

impl From<EncryptionPair> for StoredKey {
    fn from(key: EncryptionPair) -> Self {
        StoredKey::Encryption(key)
    }
}

impl From<SigningPair> for StoredKey {
    fn from(key: SigningPair) -> Self {
        StoredKey::Signing(key)
    }
}

impl From<SecretKey> for StoredKey {
    fn from(key: SecretKey) -> Self {
        StoredKey::Secret(key)
    }
}

/// Inserts a key on any connection, so it can share a caller's transaction
pub(super) async fn insert_key<C: ConnectionTrait>(
    conn: &C,
    key: &StoredKey,
    address: &str,
    category: KeyCategory,
) -> Result<()> {
    let keyid = key.key_hash().to_string();
    if keys::Entity::find_by_id(keyid.as_str())
        .one(conn)
        .await?
        .is_some()
    {
        return Err(ClientError::exists(format!("key {}", keyid)));
    }

    let (private, public) = match key {
        StoredKey::Encryption(k) => (k.private_key().to_string(), Some(k.public_key().to_string())),
        StoredKey::Signing(k) => (k.private_key().to_string(), Some(k.public_key().to_string())),
        StoredKey::Secret(k) => (k.key().to_string(), None),
    };

    let entity = keys::ActiveModel {
        keyid: Set(keyid.clone()),
        address: Set(address.to_string()),
        ktype: Set(key.key_type().as_str().to_string()),
        category: Set(category.as_str().to_string()),
        private: Set(private),
        public: Set(public),
        algorithm: Set(key.algorithm().to_string()),
        timestamp: Set(Utc::now().format(KEY_TIMESTAMP_FORMAT).to_string()),
    };
    keys::Entity::insert(entity).exec(conn).await?;

    debug!(keyid = %keyid, category = %category, "stored key");
    Ok(())
}

impl Storage {
    /// Stores a key for a workspace address. The key's hash is its ID.
    pub async fn add_key(
        &self,
        key: &StoredKey,
        address: &str,
        category: KeyCategory,
    ) -> Result<()> {
        insert_key(self.db(), key, address, category).await
    }

    pub async fn remove_key(&self, keyid: &str) -> Result<()> {
        let result = keys::Entity::delete_by_id(keyid).exec(self.db()).await?;
        if result.rows_affected == 0 {
            return Err(ClientError::not_found(format!("key {}", keyid)));
        }
        Ok(())
    }

    pub async fn get_key(&self, keyid: &str) -> Result<StoredKey> {
        let model = keys::Entity::find_by_id(keyid)
            .one(self.db())
            .await?
            .ok_or_else(|| ClientError::not_found(format!("key {}", keyid)))?;
        StoredKey::from_model(model)
    }

    /// Returns the most recently stored key of a category
    pub async fn get_key_by_category(&self, category: KeyCategory) -> Result<StoredKey> {
        let model = keys::Entity::find()
            .filter(keys::Column::Category.eq(category.as_str()))
            .order_by_desc(keys::Column::Timestamp)
            .one(self.db())
            .await?
            .ok_or_else(|| ClientError::not_found(format!("{} key", category)))?;
        StoredKey::from_model(model)
    }
}
