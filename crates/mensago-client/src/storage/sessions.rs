//! Credentials and device sessions

use sea_orm::*;
use tracing::{debug, info};

use mensago_common::{MensagoError, RandomId, WAddress};
use mensago_core::{CryptoKey, EncryptionPair, Password};
use mensago_core::encryption::CURVE25519;

use super::Storage;
use super::entity::{sessions, workspaces};
use crate::error::{ClientError, Result};

impl Storage {
    /// Returns the stored password hash for a workspace
    pub async fn get_credentials(&self, addr: &WAddress) -> Result<Password> {
        let model = self
            .find_workspace(addr)
            .await?
            .filter(|m| !m.password.is_empty())
            .ok_or_else(|| ClientError::not_found(format!("credentials for {}", addr)))?;
        Ok(Password::from_hash(&model.password)?)
    }

    pub async fn set_credentials(&self, addr: &WAddress, pw: &Password) -> Result<()> {
        let model = self
            .find_workspace(addr)
            .await?
            .ok_or_else(|| ClientError::not_found(format!("workspace {}", addr)))?;

        let mut workspace: workspaces::ActiveModel = model.into();
        workspace.password = Set(pw.hash().to_string());
        workspace.pwhashtype = Set(pw.hash_type().to_string());
        workspace.update(self.db()).await?;
        Ok(())
    }

    /// Records the device key used to log in to a workspace. A workspace
    /// address may have only one session.
    pub async fn add_device_session(
        &self,
        addr: &WAddress,
        devid: &RandomId,
        devpair: &EncryptionPair,
        devname: Option<&str>,
    ) -> Result<()> {
        if devpair.algorithm() != CURVE25519 {
            return Err(MensagoError::UnsupportedAlgorithm(format!(
                "device keys must be {}",
                CURVE25519
            ))
            .into());
        }

        if workspaces::Entity::find_by_id(addr.wid.as_str())
            .one(self.db())
            .await?
            .is_none()
        {
            return Err(ClientError::not_found(format!("workspace {}", addr)));
        }

        let existing = sessions::Entity::find()
            .filter(sessions::Column::Address.eq(addr.to_string()))
            .one(self.db())
            .await?;
        if existing.is_some() {
            return Err(ClientError::exists(format!("session for {}", addr)));
        }

        let devname = match devname {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => hostname::get()
                .map(|h| h.to_string_lossy().to_lowercase())
                .unwrap_or_default(),
        };

        let entity = sessions::ActiveModel {
            devid: Set(devid.to_string()),
            address: Set(addr.to_string()),
            devname: Set(devname.clone()),
            public_key: Set(devpair.public_key().to_string()),
            private_key: Set(devpair.private_key().to_string()),
            os: Set(std::env::consts::OS.to_string()),
        };
        sessions::Entity::insert(entity).exec(self.db()).await?;

        info!(address = %addr, device = %devname, "added device session");
        Ok(())
    }

    pub async fn remove_device_session(&self, devid: &RandomId) -> Result<()> {
        let result = sessions::Entity::delete_by_id(devid.as_str())
            .exec(self.db())
            .await?;
        if result.rows_affected == 0 {
            return Err(ClientError::not_found(format!("device session {}", devid)));
        }
        debug!(devid = %devid, "removed device session");
        Ok(())
    }

    /// Returns the device ID and key pair of a workspace's session
    pub async fn get_session_keypair(&self, addr: &WAddress) -> Result<(RandomId, EncryptionPair)> {
        let model = sessions::Entity::find()
            .filter(sessions::Column::Address.eq(addr.to_string()))
            .one(self.db())
            .await?
            .ok_or_else(|| ClientError::not_found(format!("session for {}", addr)))?;

        let devid: RandomId = model.devid.parse()?;
        let pair = EncryptionPair::from_strings(model.public_key.parse()?, model.private_key.parse()?)?;
        Ok((devid, pair))
    }

    async fn find_workspace(&self, addr: &WAddress) -> Result<Option<workspaces::Model>> {
        let model = workspaces::Entity::find()
            .filter(workspaces::Column::Wid.eq(addr.wid.as_str()))
            .filter(workspaces::Column::Domain.eq(addr.domain.as_str()))
            .one(self.db())
            .await?;
        Ok(model)
    }
}
