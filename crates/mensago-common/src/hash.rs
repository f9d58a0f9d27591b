//! Hashing helpers producing CryptoStrings

use std::fmt;
use std::str::FromStr;

use blake2::Blake2b;
use blake2::digest::consts::U32;
use sha2::{Digest, Sha256};
use sha3::Sha3_256;

use crate::cryptostring::CryptoString;
use crate::error::{MensagoError, Result};

type Blake2b256 = Blake2b<U32>;

/// Supported hash algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashAlgorithm {
    #[default]
    Blake2b256,
    Blake3_256,
    Sha256,
    Sha3_256,
}

impl HashAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            HashAlgorithm::Blake2b256 => "BLAKE2B-256",
            HashAlgorithm::Blake3_256 => "BLAKE3-256",
            HashAlgorithm::Sha256 => "SHA-256",
            HashAlgorithm::Sha3_256 => "SHA3-256",
        }
    }

    fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Blake2b256 => Blake2b256::digest(data).to_vec(),
            HashAlgorithm::Blake3_256 => blake3::hash(data).as_bytes().to_vec(),
            HashAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            HashAlgorithm::Sha3_256 => Sha3_256::digest(data).to_vec(),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = MensagoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "BLAKE2B-256" => Ok(HashAlgorithm::Blake2b256),
            "BLAKE3-256" => Ok(HashAlgorithm::Blake3_256),
            "SHA-256" => Ok(HashAlgorithm::Sha256),
            "SHA3-256" => Ok(HashAlgorithm::Sha3_256),
            other => Err(MensagoError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// Hashes data with the given algorithm
pub fn hash(algorithm: HashAlgorithm, data: &[u8]) -> CryptoString {
    CryptoString::new_unchecked(algorithm.as_str(), &algorithm.digest(data))
}

pub fn blake2hash(data: &[u8]) -> CryptoString {
    hash(HashAlgorithm::Blake2b256, data)
}

pub fn blake3hash(data: &[u8]) -> CryptoString {
    hash(HashAlgorithm::Blake3_256, data)
}

pub fn sha256hash(data: &[u8]) -> CryptoString {
    hash(HashAlgorithm::Sha256, data)
}

pub fn sha3_256hash(data: &[u8]) -> CryptoString {
    hash(HashAlgorithm::Sha3_256, data)
}
