//! Encryption and signing keys
//!
//! All key material is carried as CryptoStrings:
//! - `CURVE25519` asymmetric encryption (libsodium sealed boxes)
//! - `ED25519` signing
//! - `XSALSA20` symmetric encryption (libsodium secret boxes)
//!
//! Encrypted output is Base85-encoded so it can be embedded in JSON and
//! keycard text.

use std::path::Path;

use crypto_box::aead::OsRng;
use crypto_secretbox::aead::Aead;
use crypto_secretbox::{KeyInit, Nonce, XSalsa20Poly1305};
use ed25519_dalek::{Signer, Verifier};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use mensago_common::{CryptoString, MensagoError, Result, base85, blake2hash};

pub const CURVE25519: &str = "CURVE25519";
pub const ED25519: &str = "ED25519";
pub const XSALSA20: &str = "XSALSA20";

const NONCE_SIZE: usize = 24;

/// Storage class of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Asymmetric,
    Signing,
    Symmetric,
}

impl KeyType {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyType::Asymmetric => "asymmetric",
            KeyType::Signing => "signing",
            KeyType::Symmetric => "symmetric",
        }
    }
}

impl std::str::FromStr for KeyType {
    type Err = MensagoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "asymmetric" => Ok(KeyType::Asymmetric),
            "signing" => Ok(KeyType::Signing),
            "symmetric" => Ok(KeyType::Symmetric),
            other => Err(MensagoError::BadValue(format!("unknown key type '{}'", other))),
        }
    }
}

/// Common interface over every key kind
pub trait CryptoKey {
    /// Algorithm name, which is also the CryptoString prefix
    fn algorithm(&self) -> &str;

    fn key_type(&self) -> KeyType;

    /// BLAKE2B-256 hash of the public half, or of the key itself for
    /// symmetric keys. Used as the key's ID in local storage.
    fn key_hash(&self) -> CryptoString;
}

// ============== Helpers ==============

fn raw_key<const N: usize>(key: &CryptoString) -> Result<[u8; N]> {
    let raw = key.as_raw()?;
    <[u8; N]>::try_from(raw.as_slice()).map_err(|_| {
        MensagoError::BadValue(format!(
            "{} key must be {} bytes, got {}",
            key.prefix(),
            N,
            raw.len()
        ))
    })
}

fn require_algorithm(key: &CryptoString, algorithm: &str) -> Result<()> {
    if key.prefix() != algorithm {
        return Err(MensagoError::UnsupportedAlgorithm(key.prefix().to_string()));
    }
    Ok(())
}

fn write_keyfile<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(MensagoError::BadValue("path may not be empty".to_string()));
    }
    if path.exists() {
        return Err(MensagoError::Exists(path.display().to_string()));
    }
    std::fs::write(path, serde_json::to_string_pretty(data)?)?;
    Ok(())
}

fn read_keyfile<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(MensagoError::NotFound(path.display().to_string()));
    }
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text)
        .map_err(|e| MensagoError::BadData(format!("bad key file {}: {}", path.display(), e)))
}

fn seal(public: &CryptoString, data: &[u8]) -> Result<String> {
    let key = crypto_box::PublicKey::from(raw_key::<32>(public)?);
    let sealed = key
        .seal(&mut OsRng, data)
        .map_err(|_| MensagoError::EncryptionFailed)?;
    Ok(base85::encode(&sealed))
}

// ============== Asymmetric encryption ==============

/// An encryption-only public key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    public: CryptoString,
}

impl PublicKey {
    pub fn new(public: CryptoString) -> Result<Self> {
        require_algorithm(&public, CURVE25519)?;
        raw_key::<32>(&public)?;
        Ok(Self { public })
    }

    pub fn public_key(&self) -> &CryptoString {
        &self.public
    }

    /// Encrypts data into a Base85-encoded sealed box
    pub fn encrypt(&self, data: &[u8]) -> Result<String> {
        seal(&self.public, data)
    }
}

impl CryptoKey for PublicKey {
    fn algorithm(&self) -> &str {
        CURVE25519
    }

    fn key_type(&self) -> KeyType {
        KeyType::Asymmetric
    }

    fn key_hash(&self) -> CryptoString {
        blake2hash(self.public.data().as_bytes())
    }
}

#[derive(Serialize, Deserialize)]
struct EncryptionPairFile {
    #[serde(rename = "PublicKey")]
    public_key: String,
    #[serde(rename = "PublicHash", default)]
    public_hash: String,
    #[serde(rename = "PrivateKey")]
    private_key: String,
    #[serde(rename = "PrivateHash", default)]
    private_hash: String,
}

/// A CURVE25519 encryption key pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionPair {
    public: CryptoString,
    private: CryptoString,
}

impl EncryptionPair {
    pub fn generate() -> Self {
        let secret = crypto_box::SecretKey::from(rand::random::<[u8; 32]>());
        let public = secret.public_key();
        Self {
            public: CryptoString::new_unchecked(CURVE25519, public.as_bytes()),
            private: CryptoString::new_unchecked(CURVE25519, &secret.to_bytes()),
        }
    }

    pub fn from_strings(public: CryptoString, private: CryptoString) -> Result<Self> {
        if public.prefix() != private.prefix() {
            return Err(MensagoError::BadValue(
                "public and private key algorithms differ".to_string(),
            ));
        }
        require_algorithm(&public, CURVE25519)?;
        raw_key::<32>(&public)?;
        raw_key::<32>(&private)?;
        Ok(Self { public, private })
    }

    pub fn public_key(&self) -> &CryptoString {
        &self.public
    }

    pub fn private_key(&self) -> &CryptoString {
        &self.private
    }

    pub fn private_hash(&self) -> CryptoString {
        blake2hash(self.private.data().as_bytes())
    }

    pub fn as_public(&self) -> PublicKey {
        PublicKey {
            public: self.public.clone(),
        }
    }

    /// Encrypts data into a Base85-encoded sealed box
    pub fn encrypt(&self, data: &[u8]) -> Result<String> {
        seal(&self.public, data)
    }

    /// Opens a Base85-encoded sealed box
    pub fn decrypt(&self, data: &str) -> Result<Vec<u8>> {
        let secret = crypto_box::SecretKey::from(raw_key::<32>(&self.private)?);
        let sealed = base85::decode(data)?;
        secret
            .unseal(&sealed)
            .map_err(|_| MensagoError::DecryptionFailed)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        write_keyfile(
            path.as_ref(),
            &EncryptionPairFile {
                public_key: self.public.to_string(),
                public_hash: self.key_hash().to_string(),
                private_key: self.private.to_string(),
                private_hash: self.private_hash().to_string(),
            },
        )
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file: EncryptionPairFile = read_keyfile(path.as_ref())?;
        Self::from_strings(
            file.public_key.parse().map_err(bad_key)?,
            file.private_key.parse().map_err(bad_key)?,
        )
    }
}

impl CryptoKey for EncryptionPair {
    fn algorithm(&self) -> &str {
        CURVE25519
    }

    fn key_type(&self) -> KeyType {
        KeyType::Asymmetric
    }

    fn key_hash(&self) -> CryptoString {
        blake2hash(self.public.data().as_bytes())
    }
}

fn bad_key(e: MensagoError) -> MensagoError {
    MensagoError::BadData(format!("bad key in key file: {}", e))
}

// ============== Signing ==============

/// A signature verification key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationKey {
    public: CryptoString,
}

impl VerificationKey {
    pub fn new(public: CryptoString) -> Result<Self> {
        require_algorithm(&public, ED25519)?;
        raw_key::<32>(&public)?;
        Ok(Self { public })
    }

    pub fn public_key(&self) -> &CryptoString {
        &self.public
    }

    pub fn verify(&self, data: &[u8], signature: &CryptoString) -> Result<()> {
        verify_signature(&self.public, data, signature)
    }
}

impl CryptoKey for VerificationKey {
    fn algorithm(&self) -> &str {
        ED25519
    }

    fn key_type(&self) -> KeyType {
        KeyType::Signing
    }

    fn key_hash(&self) -> CryptoString {
        blake2hash(self.public.data().as_bytes())
    }
}

fn verify_signature(public: &CryptoString, data: &[u8], signature: &CryptoString) -> Result<()> {
    require_algorithm(signature, ED25519)?;
    let key = ed25519_dalek::VerifyingKey::from_bytes(&raw_key::<32>(public)?)
        .map_err(|_| MensagoError::BadValue("invalid verification key".to_string()))?;
    let sig = ed25519_dalek::Signature::from_slice(&signature.as_raw()?)
        .map_err(|_| MensagoError::VerificationFailed)?;
    key.verify(data, &sig)
        .map_err(|_| MensagoError::VerificationFailed)
}

#[derive(Serialize, Deserialize)]
struct SigningPairFile {
    #[serde(rename = "VerificationKey")]
    verification_key: String,
    #[serde(rename = "VerificationHash", default)]
    verification_hash: String,
    #[serde(rename = "SigningKey")]
    signing_key: String,
    #[serde(rename = "SigningHash", default)]
    signing_hash: String,
}

/// An ED25519 signing key pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningPair {
    public: CryptoString,
    private: CryptoString,
}

impl SigningPair {
    pub fn generate() -> Self {
        Self::from_seed_bytes(&rand::random::<[u8; 32]>())
    }

    fn from_seed_bytes(seed: &[u8; 32]) -> Self {
        let key = ed25519_dalek::SigningKey::from_bytes(seed);
        Self {
            public: CryptoString::new_unchecked(ED25519, key.verifying_key().as_bytes()),
            private: CryptoString::new_unchecked(ED25519, &key.to_bytes()),
        }
    }

    /// Rebuilds a pair from a Base85-encoded private key seed
    pub fn from_seed(seed: &str) -> Result<Self> {
        let raw = base85::decode(seed)?;
        let seed = <[u8; 32]>::try_from(raw.as_slice())
            .map_err(|_| MensagoError::BadValue("signing key seed must be 32 bytes".to_string()))?;
        Ok(Self::from_seed_bytes(&seed))
    }

    pub fn from_strings(public: CryptoString, private: CryptoString) -> Result<Self> {
        if public.prefix() != private.prefix() {
            return Err(MensagoError::BadValue(
                "public and private key algorithms differ".to_string(),
            ));
        }
        require_algorithm(&public, ED25519)?;
        raw_key::<32>(&public)?;
        raw_key::<32>(&private)?;
        Ok(Self { public, private })
    }

    pub fn public_key(&self) -> &CryptoString {
        &self.public
    }

    pub fn private_key(&self) -> &CryptoString {
        &self.private
    }

    pub fn private_hash(&self) -> CryptoString {
        blake2hash(self.private.data().as_bytes())
    }

    pub fn as_verification_key(&self) -> VerificationKey {
        VerificationKey {
            public: self.public.clone(),
        }
    }

    /// Signs data, returning an `ED25519:` CryptoString
    pub fn sign(&self, data: &[u8]) -> Result<CryptoString> {
        let key = ed25519_dalek::SigningKey::from_bytes(&raw_key::<32>(&self.private)?);
        let signature = key.sign(data);
        CryptoString::from_raw(ED25519, &signature.to_bytes())
    }

    pub fn verify(&self, data: &[u8], signature: &CryptoString) -> Result<()> {
        verify_signature(&self.public, data, signature)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        write_keyfile(
            path.as_ref(),
            &SigningPairFile {
                verification_key: self.public.to_string(),
                verification_hash: self.key_hash().to_string(),
                signing_key: self.private.to_string(),
                signing_hash: self.private_hash().to_string(),
            },
        )
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file: SigningPairFile = read_keyfile(path.as_ref())?;
        Self::from_strings(
            file.verification_key.parse().map_err(bad_key)?,
            file.signing_key.parse().map_err(bad_key)?,
        )
    }
}

impl CryptoKey for SigningPair {
    fn algorithm(&self) -> &str {
        ED25519
    }

    fn key_type(&self) -> KeyType {
        KeyType::Signing
    }

    fn key_hash(&self) -> CryptoString {
        blake2hash(self.public.data().as_bytes())
    }
}

// ============== Symmetric encryption ==============

#[derive(Serialize, Deserialize)]
struct SecretKeyFile {
    #[serde(rename = "SecretKey")]
    secret_key: String,
}

/// An XSALSA20 secret key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretKey {
    key: CryptoString,
}

impl SecretKey {
    pub fn generate() -> Self {
        Self {
            key: CryptoString::new_unchecked(XSALSA20, &rand::random::<[u8; 32]>()),
        }
    }

    pub fn from_string(key: CryptoString) -> Result<Self> {
        require_algorithm(&key, XSALSA20)?;
        raw_key::<32>(&key)?;
        Ok(Self { key })
    }

    pub fn key(&self) -> &CryptoString {
        &self.key
    }

    fn cipher(&self) -> Result<XSalsa20Poly1305> {
        XSalsa20Poly1305::new_from_slice(&raw_key::<32>(&self.key)?)
            .map_err(|_| MensagoError::BadValue("invalid secret key length".to_string()))
    }

    /// Encrypts data, returning Base85 of the nonce followed by the box
    pub fn encrypt(&self, data: &[u8]) -> Result<String> {
        let nonce_bytes = rand::random::<[u8; NONCE_SIZE]>();
        let ciphertext = self
            .cipher()?
            .encrypt(Nonce::from_slice(&nonce_bytes), data)
            .map_err(|_| MensagoError::EncryptionFailed)?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(base85::encode(&out))
    }

    pub fn decrypt(&self, data: &str) -> Result<Vec<u8>> {
        let raw = base85::decode(data)?;
        if raw.len() <= NONCE_SIZE {
            return Err(MensagoError::DecryptionFailed);
        }
        let (nonce, ciphertext) = raw.split_at(NONCE_SIZE);
        self.cipher()?
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| MensagoError::DecryptionFailed)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        write_keyfile(
            path.as_ref(),
            &SecretKeyFile {
                secret_key: self.key.to_string(),
            },
        )
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file: SecretKeyFile = read_keyfile(path.as_ref())?;
        Self::from_string(file.secret_key.parse().map_err(bad_key)?)
    }
}

impl CryptoKey for SecretKey {
    fn algorithm(&self) -> &str {
        XSALSA20
    }

    fn key_type(&self) -> KeyType {
        KeyType::Symmetric
    }

    fn key_hash(&self) -> CryptoString {
        blake2hash(self.key.data().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encryption_pair_roundtrip() {
        let pair = EncryptionPair::generate();
        assert_eq!(pair.public_key().prefix(), CURVE25519);

        let encrypted = pair.encrypt(b"This is some test data").unwrap();
        assert_eq!(pair.decrypt(&encrypted).unwrap(), b"This is some test data");

        // Encrypting with only the public half opens with the pair
        let sealed = pair.as_public().encrypt(b"public only").unwrap();
        assert_eq!(pair.decrypt(&sealed).unwrap(), b"public only");

        let other = EncryptionPair::generate();
        assert!(matches!(
            other.decrypt(&encrypted),
            Err(MensagoError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_encryption_pair_from_strings() {
        let pair = EncryptionPair::from_strings(
            "CURVE25519:(B2XX5|<+lOSR>_0mQ=KX4o<aOvXe6M`Z5ldINd`".parse().unwrap(),
            "CURVE25519:(Rj5)mmd1|YqlLCUP0vE;YZ#o;tJxtlAIzmPD7b&".parse().unwrap(),
        )
        .unwrap();
        assert_eq!(pair.key_type(), KeyType::Asymmetric);
        assert_eq!(pair.key_hash().prefix(), "BLAKE2B-256");

        let mismatched = EncryptionPair::from_strings(
            "CURVE25519:(B2XX5|<+lOSR>_0mQ=KX4o<aOvXe6M`Z5ldINd`".parse().unwrap(),
            "ED25519:(Rj5)mmd1|YqlLCUP0vE;YZ#o;tJxtlAIzmPD7b&".parse().unwrap(),
        );
        assert!(mismatched.is_err());
    }

    #[test]
    fn test_signing_pair() {
        let pair = SigningPair::generate();
        let signature = pair.sign(b"sign me").unwrap();
        assert_eq!(signature.prefix(), ED25519);
        assert!(pair.verify(b"sign me", &signature).is_ok());
        assert!(matches!(
            pair.verify(b"tampered", &signature),
            Err(MensagoError::VerificationFailed)
        ));

        let vkey = pair.as_verification_key();
        assert!(vkey.verify(b"sign me", &signature).is_ok());
    }

    #[test]
    fn test_signing_pair_from_seed() {
        let pair = SigningPair::generate();
        let restored = SigningPair::from_seed(pair.private_key().data()).unwrap();
        assert_eq!(restored, pair);
        assert!(SigningPair::from_seed("Xk~0{Zv").is_err());
    }

    #[test]
    fn test_secret_key() {
        let key = SecretKey::generate();
        let encrypted = key.encrypt(b"secret data").unwrap();
        assert_eq!(key.decrypt(&encrypted).unwrap(), b"secret data");
        assert!(SecretKey::generate().decrypt(&encrypted).is_err());
        assert!(key.decrypt("Xk~0{Zv").is_err());
    }

    #[test]
    fn test_keyfiles() {
        let dir = tempfile::tempdir().unwrap();

        let epair = EncryptionPair::generate();
        let epath = dir.path().join("encryption.jk");
        epair.save(&epath).unwrap();
        assert_eq!(EncryptionPair::load(&epath).unwrap(), epair);
        assert!(matches!(epair.save(&epath), Err(MensagoError::Exists(_))));

        let spair = SigningPair::generate();
        let spath = dir.path().join("signing.jk");
        spair.save(&spath).unwrap();
        assert_eq!(SigningPair::load(&spath).unwrap(), spair);

        let skey = SecretKey::generate();
        let kpath = dir.path().join("secret.jk");
        skey.save(&kpath).unwrap();
        assert_eq!(SecretKey::load(&kpath).unwrap(), skey);

        assert!(matches!(
            SecretKey::load(dir.path().join("missing.jk")),
            Err(MensagoError::NotFound(_))
        ));

        let bad = dir.path().join("bad.jk");
        std::fs::write(&bad, "{\"SecretKey\": 5}").unwrap();
        assert!(matches!(SecretKey::load(&bad), Err(MensagoError::BadData(_))));
    }
}
