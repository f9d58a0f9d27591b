//! `SeaORM` entities for the profile database

pub mod appconfig;
pub mod folders;
pub mod keycards;
pub mod keys;
pub mod sessions;
pub mod userinfo;
pub mod workspaces;

pub mod prelude {
    pub use super::appconfig::Entity as AppConfig;
    pub use super::folders::Entity as Folders;
    pub use super::keycards::Entity as Keycards;
    pub use super::keys::Entity as Keys;
    pub use super::sessions::Entity as Sessions;
    pub use super::userinfo::Entity as UserInfo;
    pub use super::workspaces::Entity as Workspaces;
}
