//! Mensago Core - Keys, keycards, and message envelopes
//!
//! This crate provides the cryptographic building blocks of the Mensago
//! client:
//! - Encryption, signing, and secret keys with key-file storage
//! - Password strength checks and Argon2id hashing
//! - Keycard entries, chaining, and chain verification
//! - Encrypted message envelopes

pub mod encryption;
pub mod envelope;
pub mod keycard;
pub mod password;

pub use encryption::{
    CryptoKey, EncryptionPair, KeyType, PublicKey, SecretKey, SigningPair, VerificationKey,
};
pub use envelope::{Envelope, UserMessage};
pub use keycard::{ChainKeys, ChainedEntry, Entry, EntryType, Keycard, SigType};
pub use password::{Password, Strength, check_password_complexity};
