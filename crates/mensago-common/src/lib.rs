//! Mensago Common - Shared types and encodings
//!
//! This crate provides the foundational pieces used across all Mensago
//! components:
//! - Error types and protocol response codes
//! - Base85 encoding and CryptoStrings
//! - Hashing
//! - Identifiers, domains, and addresses
//! - Dates and server paths

pub mod base85;
pub mod cryptostring;
pub mod error;
pub mod hash;
pub mod mdate;
pub mod mpath;
pub mod status;
pub mod types;

// Re-exports for convenience
pub use cryptostring::CryptoString;
pub use error::{MensagoError, Result};
pub use hash::{HashAlgorithm, blake2hash};
pub use mdate::MDate;
pub use status::ResponseCode;
pub use types::{Domain, IdType, MAddress, RandomId, UserId, WAddress};

/// Protocol version spoken by this library
pub const PROTOCOL_VERSION: &str = "1.0";

/// Default port for Mensago servers
pub const DEFAULT_PORT: u16 = 2001;

/// Timestamp format used in keycards and envelopes
pub const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Date format used for keycard expiration
pub const EXPIRES_FORMAT: &str = "%Y%m%d";
