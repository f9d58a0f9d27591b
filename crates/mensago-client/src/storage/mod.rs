//! Profile database
//!
//! Each profile keeps a SQLite database (`storage.db`) holding its
//! workspaces, folder mappings, device sessions, keys, cached keycards, the
//! user's own contact details, and application settings.

mod appconfig;
pub mod entity;
mod keycards;
mod keys;
mod sessions;
mod userinfo;
mod workspace;

use std::path::{Path, PathBuf};

use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema,
};
use tracing::{debug, info};

use crate::error::Result;

pub use keycards::card_ttl;
pub use keys::{KeyCategory, StoredKey};
pub use userinfo::{ALL_FIELDS, FORMATTED_NAME, Name};
pub use workspace::{FolderMap, IDENTITY_WORKSPACE, Workspace};

/// Handle to a profile's database. Cloning shares the underlying
/// connection.
#[derive(Clone, Debug)]
pub struct Storage {
    db: DatabaseConnection,
    path: PathBuf,
}

impl Storage {
    /// Opens the database, creating the file and any missing tables
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let url = format!("sqlite://{}?mode=rwc", path.display());

        let mut opt = ConnectOptions::new(url);
        opt.max_connections(1)
            .min_connections(1)
            .sqlx_logging(false);

        let db = Database::connect(opt).await?;
        let storage = Storage { db, path };
        storage.create_tables().await?;

        debug!(path = %storage.path.display(), "opened profile database");
        Ok(storage)
    }

    /// Deletes the database file and opens a fresh, empty one
    pub async fn reset(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        info!(path = %path.display(), "resetting profile database");
        Self::open(path).await
    }

    pub async fn close(self) -> Result<()> {
        self.db.close().await?;
        Ok(())
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn create_tables(&self) -> Result<()> {
        let schema = Schema::new(self.db.get_database_backend());
        self.create_table(&schema, entity::workspaces::Entity).await?;
        self.create_table(&schema, entity::folders::Entity).await?;
        self.create_table(&schema, entity::sessions::Entity).await?;
        self.create_table(&schema, entity::keys::Entity).await?;
        self.create_table(&schema, entity::keycards::Entity).await?;
        self.create_table(&schema, entity::appconfig::Entity).await?;
        self.create_table(&schema, entity::userinfo::Entity).await?;
        Ok(())
    }

    async fn create_table<E: EntityTrait>(&self, schema: &Schema, entity: E) -> Result<()> {
        let mut stmt = schema.create_table_from_entity(entity);
        stmt.if_not_exists();
        let backend = self.db.get_database_backend();
        self.db.execute(backend.build(&stmt)).await?;
        Ok(())
    }
}
