//! Mensago Client - Protocol client, profiles, and local storage
//!
//! This crate provides everything an application needs to use a Mensago
//! account:
//! - A line-oriented JSON connection to a Mensago server
//! - Protocol commands for authentication, registration, keycards, and files
//! - Profiles with their own SQLite storage
//! - A caching keycard resolver
//! - `MensagoClient`, which ties it all together

pub mod client;
pub mod commands;
pub mod conn;
pub mod error;
pub mod kcresolver;
pub mod profile;
pub mod settings;
pub mod storage;

pub use client::MensagoClient;
pub use conn::{ClientRequest, ServerConnection, ServerResponse};
pub use error::{ClientError, Result};
pub use kcresolver::{KCResolver, MgmtRecord};
pub use profile::{Profile, ProfileManager};
pub use settings::ClientSettings;
pub use storage::{FolderMap, KeyCategory, Name, Storage, StoredKey, Workspace};
