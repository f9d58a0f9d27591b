//! User profiles
//!
//! A profile is a directory under the profile folder. It holds
//! `config.json` with the device ID, an optional `default.txt` marker, and
//! the profile database `storage.db`. Each profile may hold one identity
//! workspace.

use std::path::{Path, PathBuf};

use sea_orm::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use mensago_common::{Domain, IdType, MAddress, RandomId, UserId};

use crate::error::{ClientError, Result};
use crate::storage::entity::workspaces;
use crate::storage::{Storage, Workspace};

const CONFIG_FILE: &str = "config.json";
const DEFAULT_MARKER: &str = "default.txt";
const DATABASE_FILE: &str = "storage.db";

/// Name given to the profile created when none exist
pub const PRIMARY_PROFILE: &str = "primary";

#[derive(Debug, Serialize, Deserialize)]
struct ProfileConfig {
    #[serde(rename = "Device-ID")]
    device_id: String,
}

// ============== Profile ==============

#[derive(Debug)]
pub struct Profile {
    name: String,
    path: PathBuf,
    default: bool,
    devid: RandomId,
    uid: Option<UserId>,
    wid: Option<RandomId>,
    domain: Option<Domain>,
    storage: Option<Storage>,
}

impl Profile {
    /// Reads a profile directory, generating and saving a device ID if the
    /// config file is missing or unreadable
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ClientError::bad_value("profile path has no name"))?;

        let (devid, needs_save) = match read_config(&path.join(CONFIG_FILE)) {
            Some(devid) => (devid, false),
            None => (RandomId::generate(), true),
        };

        let profile = Profile {
            name,
            default: path.join(DEFAULT_MARKER).exists(),
            path,
            devid,
            uid: None,
            wid: None,
            domain: None,
            storage: None,
        };
        if needs_save {
            profile.save_config()?;
        }
        Ok(profile)
    }

    fn save_config(&self) -> Result<()> {
        let config = ProfileConfig {
            device_id: self.devid.to_string(),
        };
        std::fs::write(self.path.join(CONFIG_FILE), serde_json::to_string(&config)?)?;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn devid(&self) -> &RandomId {
        &self.devid
    }

    pub fn uid(&self) -> Option<&UserId> {
        self.uid.as_ref()
    }

    pub fn wid(&self) -> Option<&RandomId> {
        self.wid.as_ref()
    }

    pub fn domain(&self) -> Option<&Domain> {
        self.domain.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.storage.is_some()
    }

    /// The profile database. Only available while the profile is active.
    pub fn storage(&self) -> Result<&Storage> {
        self.storage.as_ref().ok_or(ClientError::NoActiveProfile)
    }

    /// Opens the profile database, creating it if needed
    pub async fn activate(&mut self) -> Result<()> {
        std::fs::create_dir_all(&self.path)?;
        if self.storage.is_none() {
            self.storage = Some(Storage::open(self.path.join(DATABASE_FILE)).await?);
            debug!(profile = %self.name, "activated profile");
        }
        Ok(())
    }

    pub async fn deactivate(&mut self) -> Result<()> {
        if let Some(storage) = self.storage.take() {
            storage.close().await?;
            debug!(profile = %self.name, "deactivated profile");
        }
        Ok(())
    }

    /// Replaces the profile database with an empty one
    pub async fn reset_db(&mut self) -> Result<()> {
        if let Some(storage) = self.storage.take() {
            storage.close().await?;
        }
        std::fs::create_dir_all(&self.path)?;
        self.storage = Some(Storage::reset(self.path.join(DATABASE_FILE)).await?);
        self.uid = None;
        self.wid = None;
        self.domain = None;
        Ok(())
    }

    pub fn set_default(&mut self, is_default: bool) -> Result<()> {
        let marker = self.path.join(DEFAULT_MARKER);
        if is_default {
            if !marker.exists() {
                std::fs::write(&marker, "")?;
            }
        } else if marker.exists() {
            std::fs::remove_file(&marker)?;
        }
        self.default = is_default;
        Ok(())
    }

    pub fn is_default(&self) -> bool {
        self.default
    }

    /// Returns the identity address, preferring the user ID over the
    /// workspace ID
    pub async fn get_identity(&mut self) -> Result<MAddress> {
        if let Some(addr) = self.cached_identity() {
            return Ok(addr);
        }

        let workspace = Workspace::load_from_db(self.storage()?, &self.path, None).await?;
        self.wid.get_or_insert(workspace.wid);
        self.domain.get_or_insert(workspace.domain);
        if self.uid.is_none() {
            self.uid = workspace.uid;
        }

        self.cached_identity()
            .ok_or_else(|| ClientError::not_found("identity workspace"))
    }

    fn cached_identity(&self) -> Option<MAddress> {
        let domain = self.domain.as_ref()?;
        if let Some(uid) = &self.uid {
            return Some(MAddress::new(uid.clone(), domain.clone()));
        }
        self.wid
            .as_ref()
            .map(|wid| MAddress::new(UserId::from(wid.clone()), domain.clone()))
    }

    /// Makes a workspace the profile's identity. This can only be done once.
    pub async fn set_identity(&mut self, workspace: &mut Workspace) -> Result<()> {
        let storage = self.storage()?;
        if workspace.storage().path() != storage.path() {
            return Err(ClientError::bad_value(format!(
                "workspace {} belongs to another profile",
                workspace.wid
            )));
        }

        let pw = workspace
            .password()
            .cloned()
            .ok_or_else(|| ClientError::bad_value("workspace has no password"))?;
        workspace.add_to_db(&pw).await?;

        self.wid = Some(workspace.wid.clone());
        self.uid = workspace.uid.clone();
        self.domain = Some(workspace.domain.clone());
        info!(profile = %self.name, identity = %workspace.identity(), "set profile identity");
        Ok(())
    }

    /// Looks up the workspace ID for an address in the profile database
    pub async fn resolve_address(&self, addr: &MAddress) -> Result<RandomId> {
        if addr.id_type() == IdType::Workspace {
            return Ok(addr.id.as_str().parse()?);
        }

        let wid = workspaces::Entity::find()
            .select_only()
            .column(workspaces::Column::Wid)
            .filter(workspaces::Column::Userid.eq(addr.id.as_str()))
            .filter(workspaces::Column::Domain.eq(addr.domain.as_str()))
            .into_tuple::<String>()
            .one(self.storage()?.db())
            .await?
            .ok_or_else(|| ClientError::not_found(format!("workspace for {}", addr)))?;
        Ok(wid.parse()?)
    }
}

fn read_config(path: &Path) -> Option<RandomId> {
    let text = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<ProfileConfig>(&text) {
        Ok(config) => config.device_id.parse().ok(),
        Err(e) => {
            warn!(path = %path.display(), "unreadable profile config: {}", e);
            None
        }
    }
}

// ============== ProfileManager ==============

/// Platform default location for profiles
pub fn default_profile_folder() -> Result<PathBuf> {
    let (var, parts): (&str, &[&str]) = if cfg!(windows) {
        ("LOCALAPPDATA", &["mensago"])
    } else {
        ("HOME", &[".config", "mensago"])
    };
    let base = std::env::var_os(var)
        .ok_or_else(|| ClientError::not_found(format!("environment variable {}", var)))?;
    Ok(parts.iter().fold(PathBuf::from(base), |p, part| p.join(part)))
}

#[derive(Debug)]
pub struct ProfileManager {
    folder: PathBuf,
    profiles: Vec<Profile>,
    active: Option<usize>,
}

impl ProfileManager {
    /// Loads every profile in the folder and activates the default one. A
    /// `primary` profile is created if there are none.
    pub async fn load_profiles(folder: Option<PathBuf>) -> Result<Self> {
        let folder = match folder {
            Some(folder) => folder,
            None => default_profile_folder()?,
        };
        std::fs::create_dir_all(&folder)?;

        let mut dirs: Vec<PathBuf> = std::fs::read_dir(&folder)?
            .filter_map(|item| item.ok().map(|i| i.path()))
            .filter(|p| p.is_dir())
            .collect();
        dirs.sort();

        let mut manager = ProfileManager {
            folder,
            profiles: Vec::with_capacity(dirs.len()),
            active: None,
        };

        let mut have_default = false;
        for dir in dirs {
            let mut profile = Profile::load(&dir)?;
            if profile.is_default() {
                if have_default {
                    // Only the first default marker counts
                    profile.set_default(false)?;
                } else {
                    have_default = true;
                }
            }
            manager.profiles.push(profile);
        }

        if manager.profiles.is_empty() {
            manager.create_profile(PRIMARY_PROFILE)?;
        }
        if !have_default {
            if let Some(first) = manager.profiles.first_mut() {
                first.set_default(true)?;
            }
        }

        if let Some(name) = manager.get_default_profile().map(str::to_string) {
            manager.activate_profile(&name).await?;
        }

        info!(
            folder = %manager.folder.display(),
            profiles = manager.profiles.len(),
            "loaded profiles"
        );
        Ok(manager)
    }

    pub fn profile_folder(&self) -> &Path {
        &self.folder
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        let squashed = name.to_lowercase();
        self.profiles.iter().position(|p| p.name == squashed)
    }

    /// Creates a profile. Names are stored in lowercase.
    pub fn create_profile(&mut self, name: &str) -> Result<&Profile> {
        if name.trim().is_empty() {
            return Err(ClientError::bad_value("profile name may not be empty"));
        }
        let squashed = name.to_lowercase();
        if self.index_of(&squashed).is_some() {
            return Err(ClientError::exists(format!("profile {}", name)));
        }

        let path = self.folder.join(&squashed);
        std::fs::create_dir(&path)?;
        let mut profile = Profile::load(&path)?;
        if self.profiles.is_empty() {
            profile.set_default(true)?;
        }
        self.profiles.push(profile);

        debug!(profile = %squashed, "created profile");
        let index = self.profiles.len() - 1;
        Ok(&self.profiles[index])
    }

    /// Deletes a profile and everything on disk belonging to it
    pub async fn delete_profile(&mut self, name: &str) -> Result<()> {
        if name == "default" {
            return Err(ClientError::bad_value("'default' is reserved"));
        }
        let index = self
            .index_of(name)
            .ok_or_else(|| ClientError::not_found(format!("profile {}", name)))?;

        match self.active {
            Some(active) if active == index => {
                self.profiles[index].deactivate().await?;
                self.active = None;
            }
            Some(active) if active > index => self.active = Some(active - 1),
            _ => {}
        }

        let profile = self.profiles.remove(index);
        if profile.path.exists() {
            std::fs::remove_dir_all(&profile.path)?;
        }
        if profile.is_default() {
            if let Some(first) = self.profiles.first_mut() {
                first.set_default(true)?;
            }
        }

        info!(profile = %profile.name, "deleted profile");
        Ok(())
    }

    /// Renames a profile. The device ID is unchanged.
    pub async fn rename_profile(&mut self, old_name: &str, new_name: &str) -> Result<()> {
        if old_name.trim().is_empty() || new_name.trim().is_empty() {
            return Err(ClientError::bad_value("profile names may not be empty"));
        }
        let old_squashed = old_name.to_lowercase();
        let new_squashed = new_name.to_lowercase();
        if old_squashed == new_squashed {
            return Ok(());
        }

        let index = self
            .index_of(&old_squashed)
            .ok_or_else(|| ClientError::not_found(format!("profile {}", old_name)))?;
        if self.index_of(&new_squashed).is_some() {
            return Err(ClientError::exists(format!("profile {}", new_name)));
        }

        let was_active = self.active == Some(index);
        let profile = &mut self.profiles[index];
        if was_active {
            profile.deactivate().await?;
        }

        let new_path = self.folder.join(&new_squashed);
        let renamed = std::fs::rename(&profile.path, &new_path);
        if renamed.is_ok() {
            profile.name = new_squashed;
            profile.path = new_path;
        }
        if was_active {
            profile.activate().await?;
        }
        renamed?;
        Ok(())
    }

    pub fn get_profiles(&self) -> &[Profile] {
        &self.profiles
    }

    /// Name of the default profile, if one is set
    pub fn get_default_profile(&self) -> Option<&str> {
        self.profiles
            .iter()
            .find(|p| p.is_default())
            .map(|p| p.name.as_str())
    }

    pub fn set_default_profile(&mut self, name: &str) -> Result<()> {
        let index = self
            .index_of(name)
            .ok_or_else(|| ClientError::not_found(format!("profile {}", name)))?;

        for (i, profile) in self.profiles.iter_mut().enumerate() {
            if i != index && profile.is_default() {
                profile.set_default(false)?;
            }
        }
        self.profiles[index].set_default(true)
    }

    /// Activates a profile, deactivating whichever was active before
    pub async fn activate_profile(&mut self, name: &str) -> Result<&mut Profile> {
        let index = self
            .index_of(name)
            .ok_or_else(|| ClientError::not_found(format!("profile {}", name)))?;

        if let Some(active) = self.active.take() {
            self.profiles[active].deactivate().await?;
        }

        let profile = &mut self.profiles[index];
        profile.activate().await?;
        // Loads identity info up front; a new profile has none yet
        if let Err(e) = profile.get_identity().await {
            debug!(profile = %profile.name, "no identity loaded: {}", e);
        }
        self.active = Some(index);
        Ok(profile)
    }

    pub fn active_profile(&self) -> Result<&Profile> {
        self.active
            .map(|i| &self.profiles[i])
            .ok_or(ClientError::NoActiveProfile)
    }

    pub fn active_profile_mut(&mut self) -> Result<&mut Profile> {
        match self.active {
            Some(i) => Ok(&mut self.profiles[i]),
            None => Err(ClientError::NoActiveProfile),
        }
    }
}
