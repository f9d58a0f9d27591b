//! Workspace registration commands

use std::time::Duration;

use tracing::{debug, info, warn};

use mensago_common::{CryptoString, Domain, IdType, MAddress, RandomId, UserId};
use mensago_core::EncryptionPair;

use crate::conn::{ClientRequest, ServerConnection};
use crate::error::{ClientError, Result};

/// Workspace ID collisions tolerated before backing off
const REGISTER_BACKOFF_TRIES: u32 = 10;
const REGISTER_BACKOFF: Duration = Duration::from_secs(3);

/// Result of a successful registration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistrationInfo {
    pub wid: RandomId,
    pub devid: RandomId,
    pub domain: Domain,
    pub uid: Option<UserId>,
    /// True when the server accepted the request but an administrator must
    /// still approve it
    pub pending: bool,
}

/// Result of a preregistration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreregInfo {
    pub wid: RandomId,
    pub uid: Option<UserId>,
    pub domain: Domain,
    pub regcode: String,
}

/// Workspace activity states settable by an administrator
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkspaceStatus {
    Active,
    Disabled,
    Approved,
}

impl WorkspaceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkspaceStatus::Active => "active",
            WorkspaceStatus::Disabled => "disabled",
            WorkspaceStatus::Approved => "approved",
        }
    }
}

impl std::str::FromStr for WorkspaceStatus {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(WorkspaceStatus::Active),
            "disabled" => Ok(WorkspaceStatus::Disabled),
            "approved" => Ok(WorkspaceStatus::Approved),
            other => Err(ClientError::bad_value(format!(
                "status must be 'active', 'disabled', or 'approved', not '{}'",
                other
            ))),
        }
    }
}

/// Creates a workspace on the server. A fresh workspace ID is generated for
/// every attempt so that an ID collision can be retried.
pub async fn register(
    conn: &mut ServerConnection,
    uid: Option<&UserId>,
    pwhash: &str,
    devid: &RandomId,
    devkey: &CryptoString,
) -> Result<RegistrationInfo> {
    if pwhash.is_empty() {
        return Err(ClientError::bad_value("password hash may not be empty"));
    }

    let mut tries: u32 = 1;
    loop {
        if tries % REGISTER_BACKOFF_TRIES == 0 {
            warn!(tries, "repeated workspace ID collisions, backing off");
            tokio::time::sleep(REGISTER_BACKOFF).await;
        }

        let wid = RandomId::generate();
        let mut request = ClientRequest::new("REGISTER")
            .with("Workspace-ID", wid.as_str())
            .with("Password-Hash", pwhash)
            .with("Device-ID", devid.as_str())
            .with("Device-Key", devkey.as_str());
        if let Some(uid) = uid {
            request.set("User-ID", uid.as_str());
        }

        let response = conn.request(&request).await?;
        match response.code {
            101 | 201 => {
                let domain: Domain = response.require_parsed("Domain")?;
                info!(wid = %wid, domain = %domain, pending = response.code == 101, "registered workspace");
                return Ok(RegistrationInfo {
                    wid,
                    devid: devid.clone(),
                    domain,
                    uid: uid.cloned(),
                    pending: response.code == 101,
                });
            }
            408 => match response.field("Field") {
                Some("Workspace-ID") => {
                    debug!(wid = %wid, "workspace ID already exists, retrying");
                    tries += 1;
                }
                Some("User-ID") => return Err(ClientError::exists("user id")),
                Some(other) => {
                    return Err(ClientError::Protocol(format!(
                        "server sent bad 408 response for field {}",
                        other
                    )));
                }
                None => {
                    return Err(ClientError::Protocol(
                        "server sent 408 without telling what existed".to_string(),
                    ));
                }
            },
            _ => return Err(response.into_error()),
        }
    }
}

/// Provisions a preregistered account. Requires an administrator session.
pub async fn preregister(
    conn: &mut ServerConnection,
    wid: Option<&RandomId>,
    uid: Option<&UserId>,
    domain: Option<&Domain>,
) -> Result<PreregInfo> {
    let mut request = ClientRequest::new("PREREG");
    if let Some(wid) = wid {
        request.set("Workspace-ID", wid.as_str());
    }
    if let Some(uid) = uid {
        request.set("User-ID", uid.as_str());
    }
    if let Some(domain) = domain {
        request.set("Domain", domain.as_str());
    }

    let response = conn.request(&request).await?.expect(200)?;
    let uid = match response.data.get("User-ID") {
        Some(_) => Some(response.require_parsed::<UserId>("User-ID")?),
        None => None,
    };

    Ok(PreregInfo {
        wid: response.require_parsed("Workspace-ID")?,
        uid,
        domain: response.require_parsed("Domain")?,
        regcode: response.require("Reg-Code")?.to_string(),
    })
}

/// Finishes registration of a preregistered workspace
pub async fn regcode(
    conn: &mut ServerConnection,
    address: &MAddress,
    code: &str,
    pwhash: &str,
    devid: &RandomId,
    devpair: &EncryptionPair,
) -> Result<RegistrationInfo> {
    if code.is_empty() || pwhash.is_empty() {
        return Err(ClientError::bad_value(
            "registration code and password hash are required",
        ));
    }

    let mut request = ClientRequest::new("REGCODE")
        .with("Reg-Code", code)
        .with("Password-Hash", pwhash)
        .with("Device-ID", devid.as_str())
        .with("Device-Key", devpair.public_key().as_str())
        .with("Domain", address.domain.as_str());
    match address.id_type() {
        IdType::Workspace => request.set("Workspace-ID", address.id.as_str()),
        IdType::UserId => request.set("User-ID", address.id.as_str()),
    }

    let response = conn.request(&request).await?.expect(201)?;
    let uid = match address.id_type() {
        IdType::UserId => Some(address.id.clone()),
        IdType::Workspace => None,
    };

    Ok(RegistrationInfo {
        wid: response.require_parsed("Workspace-ID")?,
        devid: devid.clone(),
        domain: address.domain.clone(),
        uid,
        pending: false,
    })
}

/// Deletes a workspace on the server. Administrators may name another
/// workspace.
pub async fn unregister(
    conn: &mut ServerConnection,
    pwhash: &str,
    wid: Option<&RandomId>,
) -> Result<()> {
    if pwhash.is_empty() {
        return Err(ClientError::bad_value("password hash may not be empty"));
    }

    let mut request = ClientRequest::new("UNREGISTER").with("Password-Hash", pwhash);
    if let Some(wid) = wid {
        request.set("Workspace-ID", wid.as_str());
    }
    conn.request(&request).await?.expect(202)?;
    Ok(())
}

/// Sets the activity status of a workspace. Requires an administrator
/// session.
pub async fn setstatus(
    conn: &mut ServerConnection,
    wid: &RandomId,
    status: WorkspaceStatus,
) -> Result<()> {
    let request = ClientRequest::new("SETSTATUS")
        .with("Workspace-ID", wid.as_str())
        .with("Status", status.as_str());
    conn.request(&request).await?.expect(200)?;
    Ok(())
}
