//! High-level client
//!
//! `MensagoClient` ties together the server connection, the profile
//! manager, and the keycard resolver. Applications drive everything through
//! it.

use std::path::PathBuf;

use tracing::{debug, info};

use mensago_common::{Domain, IdType, MAddress, MensagoError, RandomId, UserId, WAddress};
use mensago_core::{ChainKeys, EncryptionPair, Entry, Keycard, Password, SigningPair};

use crate::commands::{self, PreregInfo, RegistrationInfo};
use crate::conn::ServerConnection;
use crate::error::{ClientError, Result};
use crate::kcresolver::KCResolver;
use crate::profile::{Profile, ProfileManager};
use crate::settings::ClientSettings;
use crate::storage::{FORMATTED_NAME, KeyCategory, Name, StoredKey, Workspace, card_ttl};

/// What a finished registration leaves to be set up locally
struct WorkspaceSetup {
    uid: Option<UserId>,
    domain: Domain,
    wid: RandomId,
    devid: RandomId,
    devpair: EncryptionPair,
    password: Password,
    name: Option<Name>,
}

pub struct MensagoClient {
    conn: ServerConnection,
    profiles: ProfileManager,
    resolver: KCResolver,
    login_active: bool,
    is_admin: bool,
}

impl MensagoClient {
    /// Creates a client using settings from the environment and the local
    /// server config
    pub async fn new(profile_folder: Option<PathBuf>) -> Result<Self> {
        Self::with_settings(profile_folder, ClientSettings::load()?).await
    }

    pub async fn with_settings(
        profile_folder: Option<PathBuf>,
        settings: ClientSettings,
    ) -> Result<Self> {
        let profiles = ProfileManager::load_profiles(profile_folder).await?;
        let storage = profiles
            .active_profile()
            .ok()
            .and_then(|p| p.storage().ok().cloned());
        let conn = ServerConnection::with_timeouts(settings.connect_timeout(), settings.read_timeout());

        Ok(Self {
            conn,
            profiles,
            resolver: KCResolver::new(settings, storage),
            login_active: false,
            is_admin: false,
        })
    }

    pub fn profiles(&self) -> &ProfileManager {
        &self.profiles
    }

    pub fn profiles_mut(&mut self) -> &mut ProfileManager {
        &mut self.profiles
    }

    pub fn resolver(&self) -> &KCResolver {
        &self.resolver
    }

    /// Activates a profile and points the keycard cache at its database
    pub async fn activate_profile(&mut self, name: &str) -> Result<()> {
        let profile = self.profiles.activate_profile(name).await?;
        let storage = profile.storage()?.clone();
        self.resolver.set_storage(Some(storage));
        Ok(())
    }

    fn active_profile(&self) -> Result<&Profile> {
        self.profiles.active_profile()
    }

    // ============== Connection ==============

    /// Connects to the server for a domain. No login is performed.
    pub async fn connect(&mut self, domain: &Domain) -> Result<()> {
        let (host, port) = self.resolver.settings().server_for(domain)?;
        self.conn.connect(&host, port).await
    }

    /// True if there is an open connection, whether or not it is logged in
    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    pub async fn disconnect(&mut self) -> Result<()> {
        self.login_active = false;
        self.is_admin = false;
        self.conn.disconnect().await
    }

    // ============== Sessions ==============

    /// Logs in to the server for an address, connecting first if needed
    pub async fn login(&mut self, address: &MAddress) -> Result<()> {
        if !self.conn.is_connected() {
            self.connect(&address.domain).await?;
        }

        let record = self.resolver.get_mgmt_record(&address.domain).await?;

        let profile = self.active_profile()?;
        let storage = profile.storage()?.clone();
        let devid = profile.devid().clone();
        let wid = match address.id_type() {
            IdType::Workspace => address.id.as_str().parse()?,
            IdType::UserId => profile.resolve_address(address).await?,
        };
        let waddr = WAddress::new(wid, address.domain.clone());

        commands::login(&mut self.conn, &waddr.wid, &record.ek).await?;
        let pw = storage.get_credentials(&waddr).await?;
        commands::password(&mut self.conn, pw.hash()).await?;
        let (_, devpair) = storage.get_session_keypair(&waddr).await?;
        self.is_admin = commands::device(&mut self.conn, &devid, &devpair).await?;
        self.login_active = true;

        info!(address = %waddr, admin = self.is_admin, "logged in");
        Ok(())
    }

    /// True once a login has completed on a still-open connection
    pub fn is_logged_in(&mut self) -> bool {
        if !self.conn.is_connected() {
            self.login_active = false;
        }
        self.login_active
    }

    pub fn is_admin(&self) -> bool {
        self.is_admin
    }

    pub async fn logout(&mut self) -> Result<()> {
        self.login_active = false;
        self.is_admin = false;
        commands::logout(&mut self.conn).await
    }

    // ============== Accounts ==============

    /// Creates an account on the connected server without a local profile.
    /// An ID that looks like a workspace ID is sent as one.
    pub async fn preregister_account(
        &mut self,
        id: Option<&UserId>,
        domain: Option<&Domain>,
    ) -> Result<PreregInfo> {
        if !self.is_logged_in() {
            return Err(ClientError::NotLoggedIn);
        }
        if !self.is_admin {
            return Err(ClientError::NotAdmin);
        }

        let (wid, uid) = match id {
            Some(id) if id.is_wid() => (Some(id.as_str().parse::<RandomId>()?), None),
            Some(id) => (None, Some(id)),
            None => (None, None),
        };
        commands::preregister(&mut self.conn, wid.as_ref(), uid, domain).await
    }

    /// Completes setup of a preregistered account on the active profile
    pub async fn redeem_regcode(
        &mut self,
        address: &MAddress,
        regcode: &str,
        userpass: &str,
    ) -> Result<RegistrationInfo> {
        self.require_no_identity()?;
        let password = Password::new(userpass)?;
        let devid = self.active_profile()?.devid().clone();
        let devpair = EncryptionPair::generate();

        self.connect(&address.domain).await?;
        let result = commands::regcode(
            &mut self.conn,
            address,
            regcode,
            password.hash(),
            &devid,
            &devpair,
        )
        .await;
        self.disconnect().await?;
        let info = result?;

        self.setup_workspace(WorkspaceSetup {
            uid: info.uid.clone(),
            domain: info.domain.clone(),
            wid: info.wid.clone(),
            devid: info.devid.clone(),
            devpair,
            password,
            name: None,
        })
        .await?;
        Ok(info)
    }

    /// Registers a new account on a domain's server for the active profile
    pub async fn register_account(
        &mut self,
        domain: &Domain,
        userpass: &str,
        uid: Option<&UserId>,
        name: Option<&Name>,
    ) -> Result<RegistrationInfo> {
        self.require_no_identity()?;
        let password = Password::new(userpass)?;
        let devid = self.active_profile()?.devid().clone();
        let devpair = EncryptionPair::generate();

        self.connect(domain).await?;
        let info = match commands::register(
            &mut self.conn,
            uid,
            password.hash(),
            &devid,
            devpair.public_key(),
        )
        .await
        {
            Ok(info) => info,
            Err(e) => {
                self.disconnect().await?;
                return Err(e);
            }
        };

        let result = self
            .setup_workspace(WorkspaceSetup {
                uid: info.uid.clone(),
                domain: info.domain.clone(),
                wid: info.wid.clone(),
                devid: info.devid.clone(),
                devpair,
                password,
                name: name.cloned(),
            })
            .await;
        self.disconnect().await?;
        result?;
        Ok(info)
    }

    fn require_no_identity(&self) -> Result<()> {
        let profile = self.active_profile()?;
        if profile.domain().is_some() {
            return Err(ClientError::exists(format!(
                "identity workspace on profile {}",
                profile.name()
            )));
        }
        Ok(())
    }

    /// Local setup shared by both ways of registering
    async fn setup_workspace(&mut self, setup: WorkspaceSetup) -> Result<()> {
        let profile = self.profiles.active_profile_mut()?;
        let storage = profile.storage()?.clone();

        let mut workspace = Workspace::generate(
            &storage,
            profile.path(),
            setup.uid.as_ref(),
            &setup.domain,
            &setup.wid,
            &setup.password,
        )
        .await?;
        profile.set_identity(&mut workspace).await?;

        if let Some(name) = setup.name.as_ref() {
            storage.save_name(name).await?;
        }

        storage
            .add_device_session(&workspace.address(), &setup.devid, &setup.devpair, None)
            .await?;

        self.update_keycard().await
    }

    // ============== Keycards ==============

    /// Adds a new entry to the user's keycard. The first entry is built from
    /// the stored workspace keys; later entries are chained from the cached
    /// card, which generates and stores a fresh set of keys.
    pub async fn update_keycard(&mut self) -> Result<()> {
        let profile = self.profiles.active_profile_mut()?;
        profile.get_identity().await?;
        let storage = profile.storage()?.clone();
        let (wid, domain) = match (profile.wid(), profile.domain()) {
            (Some(wid), Some(domain)) => (wid.clone(), domain.clone()),
            _ => return Err(ClientError::not_found("identity workspace")),
        };
        let uid = profile.uid().cloned();
        let waddr = WAddress::new(wid.clone(), domain.clone());
        let owner = waddr.to_string();

        // Keys from chaining are only stored once the server has accepted
        // the entry they belong to
        let (mut card, mut entry, spair, new_keys) = match storage.get_card(&owner).await? {
            None => {
                let crencrypt = storage
                    .get_key_by_category(KeyCategory::CrEncrypt)
                    .await?
                    .into_encryption_pair()?;
                let crsign = storage
                    .get_key_by_category(KeyCategory::CrSign)
                    .await?
                    .into_signing_pair()?;
                let encrypt = storage
                    .get_key_by_category(KeyCategory::Encrypt)
                    .await?
                    .into_encryption_pair()?;
                let sign = storage
                    .get_key_by_category(KeyCategory::Sign)
                    .await?
                    .into_signing_pair()?;

                let mut entry = Entry::new_user();
                entry.set_fields([
                    ("Contact-Request-Encryption-Key", crencrypt.public_key().as_str()),
                    ("Contact-Request-Verification-Key", crsign.public_key().as_str()),
                    ("Encryption-Key", encrypt.public_key().as_str()),
                    ("Verification-Key", sign.public_key().as_str()),
                    ("Workspace-ID", wid.as_str()),
                    ("Domain", domain.as_str()),
                ]);
                if let Some(uid) = uid.as_ref().filter(|u| !u.is_wid()) {
                    entry.set_field("User-ID", uid.as_str());
                }
                match storage.load_user_field(FORMATTED_NAME).await {
                    Ok(name) => entry.set_field("Name", &name),
                    Err(ClientError::Mensago(MensagoError::NotFound(_))) => {}
                    Err(e) => return Err(e),
                }
                (Keycard::new(entry.entry_type()), entry, sign, Vec::new())
            }
            Some((mut card, _)) => {
                card.verify()?;
                let crsign = storage
                    .get_key_by_category(KeyCategory::CrSign)
                    .await?
                    .into_signing_pair()?;
                let chained = card.chain(crsign.private_key(), true)?;
                // The chained entry goes back in once it is fully signed
                card.entries.pop();

                let (spair, new_keys) = chain_keyset(chained.keys)?;
                (card, chained.entry, spair, new_keys)
            }
        };

        if !self.is_logged_in() {
            self.login(&waddr.as_maddress()).await?;
        }
        let record = self.resolver.get_mgmt_record(&domain).await?;
        commands::addentry(&mut self.conn, &mut entry, &record.pvk, &spair).await?;

        card.push(entry)?;
        storage
            .add_card_with_keys(&owner, &card, card_ttl(&card), &new_keys)
            .await?;
        debug!(owner = %owner, entries = card.len(), "updated keycard");
        Ok(())
    }
}

/// Splits the keys generated by chaining a user entry into storable form,
/// returning the new signing pair alongside them
fn chain_keyset(keys: ChainKeys) -> Result<(SigningPair, Vec<(StoredKey, KeyCategory)>)> {
    let ChainKeys::User {
        crsign,
        crencrypt,
        sign,
        encrypt,
    } = keys
    else {
        return Err(ClientError::bad_value("expected user keycard keys"));
    };

    let keyset: Vec<(StoredKey, KeyCategory)> = vec![
        (crsign.into(), KeyCategory::CrSign),
        (crencrypt.into(), KeyCategory::CrEncrypt),
        (sign.clone().into(), KeyCategory::Sign),
        (encrypt.into(), KeyCategory::Encrypt),
    ];
    Ok((sign, keyset))
}
