//! Workspaces and folder mappings

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use sea_orm::sea_query::Expr;
use sea_orm::*;
use tracing::{debug, info};

use mensago_common::{Domain, MAddress, RandomId, UserId, WAddress};
use mensago_core::{CryptoKey, EncryptionPair, Password, SecretKey, SigningPair};

use super::entity::{folders, keys, sessions, workspaces};
use super::{KeyCategory, Storage, StoredKey};
use crate::error::{ClientError, Result};

/// Workspace type of a profile's own account
pub const IDENTITY_WORKSPACE: &str = "identity";

/// Server folders every new workspace starts with
const STANDARD_FOLDERS: &[&str] = &[
    "/messages",
    "/contacts",
    "/events",
    "/tasks",
    "/notes",
    "/files",
    "/files/attachments",
];

// ============== Folder maps ==============

/// Maps a folder ID to a path within a workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderMap {
    pub fid: RandomId,
    pub address: WAddress,
    pub keyid: String,
    pub path: String,
    pub permissions: String,
}

impl FolderMap {
    /// Creates a mapping with a freshly generated folder ID
    pub fn new(address: &WAddress, keyid: &str, path: &str, permissions: &str) -> Self {
        Self {
            fid: RandomId::generate(),
            address: address.clone(),
            keyid: keyid.to_string(),
            path: path.to_string(),
            permissions: permissions.to_string(),
        }
    }

    /// Last component of the folder's path
    pub fn name(&self) -> &str {
        self.path
            .trim_end_matches('/')
            .rsplit(['/', ' '])
            .next()
            .unwrap_or_default()
    }

    fn from_model(model: folders::Model) -> Result<Self> {
        Ok(Self {
            fid: model.fid.parse()?,
            address: model.address.parse()?,
            keyid: model.keyid,
            path: model.path,
            permissions: model.permissions,
        })
    }
}

impl Storage {
    /// Returns every folder ID mapped to its workspace-relative path
    pub async fn load_folder_maps(&self) -> Result<HashMap<String, String>> {
        let maps: HashMap<String, String> = folders::Entity::find()
            .select_only()
            .column(folders::Column::Fid)
            .column(folders::Column::Path)
            .into_tuple::<(String, String)>()
            .all(self.db())
            .await?
            .into_iter()
            .collect();

        if maps.is_empty() {
            return Err(ClientError::not_found("folder mappings"));
        }
        Ok(maps)
    }
}

// ============== Workspace ==============

/// A workspace and the local data that belongs to it
#[derive(Debug, Clone)]
pub struct Workspace {
    storage: Storage,
    path: PathBuf,
    pub uid: Option<UserId>,
    pub wid: RandomId,
    pub domain: Domain,
    pub wtype: String,
    pw: Option<Password>,
}

impl Workspace {
    /// Creates the keys, folder mappings, and local directories for a new
    /// workspace. The workspace itself is not added to the database.
    pub async fn generate(
        storage: &Storage,
        path: impl AsRef<Path>,
        uid: Option<&UserId>,
        domain: &Domain,
        wid: &RandomId,
        pw: &Password,
    ) -> Result<Self> {
        if !pw.is_valid() {
            return Err(ClientError::bad_value("password not valid"));
        }

        let workspace = Workspace {
            storage: storage.clone(),
            path: std::path::absolute(path.as_ref())?,
            uid: uid.cloned(),
            wid: wid.clone(),
            domain: domain.clone(),
            wtype: IDENTITY_WORKSPACE.to_string(),
            pw: Some(pw.clone()),
        };
        let address = workspace.address().to_string();

        let folder_key = SecretKey::generate();
        let folder_keyid = folder_key.key_hash().to_string();
        let keyset: [(StoredKey, KeyCategory); 6] = [
            (EncryptionPair::generate().into(), KeyCategory::CrEncrypt),
            (SigningPair::generate().into(), KeyCategory::CrSign),
            (EncryptionPair::generate().into(), KeyCategory::Encrypt),
            (SigningPair::generate().into(), KeyCategory::Sign),
            (SecretKey::generate().into(), KeyCategory::Storage),
            (folder_key.into(), KeyCategory::Folder),
        ];
        for (key, category) in &keyset {
            storage.add_key(key, &address, *category).await?;
        }

        for folder in STANDARD_FOLDERS {
            let map = FolderMap::new(&workspace.address(), &folder_keyid, folder, "root");
            workspace.add_folder(&map).await?;
        }

        std::fs::create_dir_all(workspace.path.join("files").join("attachments"))?;

        info!(address = %address, "generated workspace");
        Ok(workspace)
    }

    /// Loads a workspace from the database, defaulting to the profile's
    /// identity workspace
    pub async fn load_from_db(
        storage: &Storage,
        path: impl AsRef<Path>,
        wid: Option<&RandomId>,
    ) -> Result<Self> {
        let query = match wid {
            Some(wid) => workspaces::Entity::find_by_id(wid.as_str()),
            None => workspaces::Entity::find()
                .filter(workspaces::Column::Wtype.eq(IDENTITY_WORKSPACE)),
        };
        let model = query
            .one(storage.db())
            .await?
            .ok_or_else(|| ClientError::not_found("workspace data"))?;

        let uid = match model.userid.as_deref() {
            Some(uid) if !uid.is_empty() => Some(uid.parse()?),
            _ => None,
        };

        Ok(Workspace {
            storage: storage.clone(),
            path: path.as_ref().to_path_buf(),
            uid,
            wid: model.wid.parse()?,
            domain: model.domain.parse()?,
            wtype: model.wtype,
            pw: None,
        })
    }

    pub fn address(&self) -> WAddress {
        WAddress::new(self.wid.clone(), self.domain.clone())
    }

    /// The user ID address if the workspace has one, otherwise the workspace
    /// address
    pub fn identity(&self) -> MAddress {
        match &self.uid {
            Some(uid) => MAddress::new(uid.clone(), self.domain.clone()),
            None => self.address().as_maddress(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn password(&self) -> Option<&Password> {
        self.pw.as_ref()
    }

    pub(crate) fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Adds the workspace to the database. A profile may hold only one
    /// identity workspace.
    pub async fn add_to_db(&mut self, pw: &Password) -> Result<()> {
        let existing = workspaces::Entity::find()
            .filter(workspaces::Column::Wtype.eq(IDENTITY_WORKSPACE))
            .one(self.storage.db())
            .await?;
        if let Some(existing) = existing {
            return Err(ClientError::exists(format!(
                "identity workspace {}",
                existing.wid
            )));
        }

        let entity = workspaces::ActiveModel {
            wid: Set(self.wid.to_string()),
            userid: Set(self.uid.as_ref().map(UserId::to_string)),
            domain: Set(self.domain.to_string()),
            password: Set(pw.hash().to_string()),
            pwhashtype: Set(pw.hash_type().to_string()),
            wtype: Set(self.wtype.clone()),
        };
        workspaces::Entity::insert(entity)
            .exec(self.storage.db())
            .await?;
        self.pw = Some(pw.clone());

        debug!(address = %self.address(), "added workspace to database");
        Ok(())
    }

    /// Removes the workspace along with its folders, sessions, and keys
    pub async fn remove_from_db(&self) -> Result<()> {
        let address = self.address().to_string();
        let txn = self.storage.db().begin().await?;

        let result = workspaces::Entity::delete_many()
            .filter(workspaces::Column::Wid.eq(self.wid.as_str()))
            .filter(workspaces::Column::Domain.eq(self.domain.as_str()))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            txn.rollback().await?;
            return Err(ClientError::not_found(format!("workspace {}", address)));
        }

        folders::Entity::delete_many()
            .filter(folders::Column::Address.eq(address.as_str()))
            .exec(&txn)
            .await?;
        sessions::Entity::delete_many()
            .filter(sessions::Column::Address.eq(address.as_str()))
            .exec(&txn)
            .await?;
        keys::Entity::delete_many()
            .filter(keys::Column::Address.eq(address.as_str()))
            .exec(&txn)
            .await?;

        txn.commit().await?;
        info!(address = %address, "removed workspace");
        Ok(())
    }

    /// Removes only the workspace row, leaving keys and sessions in place
    pub async fn remove_workspace_entry(&self, wid: &RandomId, domain: &Domain) -> Result<()> {
        let result = workspaces::Entity::delete_many()
            .filter(workspaces::Column::Wid.eq(wid.as_str()))
            .filter(workspaces::Column::Domain.eq(domain.as_str()))
            .exec(self.storage.db())
            .await?;
        if result.rows_affected == 0 {
            return Err(ClientError::not_found(format!("{}/{}", wid, domain)));
        }
        Ok(())
    }

    pub async fn add_folder(&self, folder: &FolderMap) -> Result<()> {
        if folders::Entity::find_by_id(folder.fid.as_str())
            .one(self.storage.db())
            .await?
            .is_some()
        {
            return Err(ClientError::exists(format!("folder {}", folder.fid)));
        }

        let entity = folders::ActiveModel {
            fid: Set(folder.fid.to_string()),
            address: Set(folder.address.to_string()),
            keyid: Set(folder.keyid.clone()),
            path: Set(folder.path.clone()),
            name: Set(folder.name().to_string()),
            permissions: Set(folder.permissions.clone()),
        };
        folders::Entity::insert(entity)
            .exec(self.storage.db())
            .await?;
        Ok(())
    }

    pub async fn remove_folder(&self, fid: &RandomId) -> Result<()> {
        let result = folders::Entity::delete_by_id(fid.as_str())
            .exec(self.storage.db())
            .await?;
        if result.rows_affected == 0 {
            return Err(ClientError::not_found(format!("folder {}", fid)));
        }
        Ok(())
    }

    pub async fn get_folder(&self, fid: &RandomId) -> Result<FolderMap> {
        let model = folders::Entity::find_by_id(fid.as_str())
            .one(self.storage.db())
            .await?
            .ok_or_else(|| ClientError::not_found(format!("folder {}", fid)))?;
        FolderMap::from_model(model)
    }

    /// Sets the human-friendly name for the workspace
    pub async fn set_userid(&mut self, uid: &UserId) -> Result<()> {
        if uid.as_str().contains([' ', '"']) {
            return Err(ClientError::bad_value("spaces and quotes are not permitted in user IDs"));
        }

        workspaces::Entity::update_many()
            .col_expr(workspaces::Column::Userid, Expr::value(uid.to_string()))
            .filter(workspaces::Column::Wid.eq(self.wid.as_str()))
            .filter(workspaces::Column::Domain.eq(self.domain.as_str()))
            .exec(self.storage.db())
            .await?;
        self.uid = Some(uid.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::PaginatorTrait;

    async fn setup() -> (tempfile::TempDir, Storage, Workspace) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path().join("storage.db")).await.unwrap();
        let pw = Password::new("MyS3cretPassw*rd").unwrap();
        let workspace = Workspace::generate(
            &storage,
            dir.path(),
            Some(&"csimons".parse().unwrap()),
            &"example.com".parse().unwrap(),
            &"5a56260b-aa5c-4013-9217-a78f094432c3".parse().unwrap(),
            &pw,
        )
        .await
        .unwrap();
        (dir, storage, workspace)
    }

    #[tokio::test]
    async fn test_generate() {
        let (dir, storage, workspace) = setup().await;

        assert!(dir.path().join("files").join("attachments").is_dir());
        for category in [
            KeyCategory::CrEncrypt,
            KeyCategory::CrSign,
            KeyCategory::Encrypt,
            KeyCategory::Sign,
            KeyCategory::Storage,
            KeyCategory::Folder,
        ] {
            storage.get_key_by_category(category).await.unwrap();
        }

        let maps = storage.load_folder_maps().await.unwrap();
        assert_eq!(maps.len(), STANDARD_FOLDERS.len());
        assert!(maps.values().any(|p| p == "/files/attachments"));

        let fid: RandomId = maps
            .iter()
            .find(|(_, p)| p.as_str() == "/messages")
            .map(|(fid, _)| fid.parse().unwrap())
            .unwrap();
        let folder = workspace.get_folder(&fid).await.unwrap();
        assert_eq!(folder.name(), "messages");
        assert_eq!(folder.permissions, "root");
        assert_eq!(folder.address, workspace.address());
    }

    #[tokio::test]
    async fn test_add_and_load() {
        let (dir, storage, mut workspace) = setup().await;
        let pw = workspace.password().unwrap().clone();
        workspace.add_to_db(&pw).await.unwrap();

        let err = workspace.add_to_db(&pw).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Mensago(mensago_common::MensagoError::Exists(_))
        ));

        let loaded = Workspace::load_from_db(&storage, dir.path(), None).await.unwrap();
        assert_eq!(loaded.wid, workspace.wid);
        assert_eq!(loaded.uid.as_ref().map(UserId::as_str), Some("csimons"));
        assert_eq!(loaded.identity().to_string(), "csimons/example.com");

        let creds = storage.get_credentials(&workspace.address()).await.unwrap();
        assert_eq!(creds.hash(), pw.hash());
    }

    #[tokio::test]
    async fn test_set_userid() {
        let (_dir, storage, mut workspace) = setup().await;
        let pw = workspace.password().unwrap().clone();
        workspace.add_to_db(&pw).await.unwrap();

        workspace.set_userid(&"cavs".parse().unwrap()).await.unwrap();
        let loaded = Workspace::load_from_db(&storage, workspace.path(), Some(&workspace.wid))
            .await
            .unwrap();
        assert_eq!(loaded.uid.unwrap().as_str(), "cavs");
    }

    #[tokio::test]
    async fn test_folders() {
        let (_dir, _storage, workspace) = setup().await;
        let map = FolderMap::new(&workspace.address(), "keyid", "/files/photos", "root");

        workspace.add_folder(&map).await.unwrap();
        assert!(workspace.add_folder(&map).await.is_err());
        assert_eq!(workspace.get_folder(&map.fid).await.unwrap(), map);

        workspace.remove_folder(&map.fid).await.unwrap();
        assert!(workspace.get_folder(&map.fid).await.is_err());
        assert!(workspace.remove_folder(&map.fid).await.is_err());
    }

    #[tokio::test]
    async fn test_remove_from_db() {
        let (_dir, storage, mut workspace) = setup().await;
        let pw = workspace.password().unwrap().clone();
        workspace.add_to_db(&pw).await.unwrap();

        workspace.remove_from_db().await.unwrap();
        assert!(storage.load_folder_maps().await.is_err());
        assert_eq!(keys::Entity::find().count(storage.db()).await.unwrap(), 0);
        assert!(workspace.remove_from_db().await.is_err());
    }

    #[tokio::test]
    async fn test_remove_workspace_entry() {
        let (_dir, storage, mut workspace) = setup().await;
        let pw = workspace.password().unwrap().clone();
        workspace.add_to_db(&pw).await.unwrap();

        let (wid, domain) = (workspace.wid.clone(), workspace.domain.clone());
        workspace.remove_workspace_entry(&wid, &domain).await.unwrap();
        assert!(Workspace::load_from_db(&storage, workspace.path(), None).await.is_err());

        // Keys are left behind
        storage.get_key_by_category(KeyCategory::Sign).await.unwrap();
        assert!(workspace.remove_workspace_entry(&wid, &domain).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_folder_maps() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path().join("storage.db")).await.unwrap();
        assert!(matches!(
            storage.load_folder_maps().await,
            Err(ClientError::Mensago(mensago_common::MensagoError::NotFound(_)))
        ));
    }
}
