//! Session commands: login, device authentication, and password handling

use tracing::{debug, warn};

use mensago_common::{CryptoString, MensagoError, RandomId, base85};
use mensago_core::{EncryptionPair, PublicKey};

use crate::conn::{ClientRequest, ServerConnection};
use crate::error::{ClientError, Result};

/// Starts a login by proving the server can open a challenge sealed to its
/// encryption key
pub async fn login(
    conn: &mut ServerConnection,
    wid: &RandomId,
    server_key: &CryptoString,
) -> Result<()> {
    let challenge = base85::encode(&rand::random::<[u8; 32]>());
    let sealed = PublicKey::new(server_key.clone())?.encrypt(challenge.as_bytes())?;

    let request = ClientRequest::new("LOGIN")
        .with("Workspace-ID", wid.as_str())
        .with("Login-Type", "PLAIN")
        .with("Challenge", sealed);
    let response = conn.request(&request).await?.expect(100)?;

    if response.require("Response")? != challenge {
        return Err(ClientError::Protocol(
            "server failed to decrypt challenge".to_string(),
        ));
    }
    Ok(())
}

/// Continues a login with the workspace's password hash
pub async fn password(conn: &mut ServerConnection, pwhash: &str) -> Result<()> {
    if pwhash.is_empty() {
        return Err(ClientError::bad_value("password hash may not be empty"));
    }

    let request = ClientRequest::new("PASSWORD").with("Password-Hash", pwhash);
    conn.request(&request).await?.expect(100)?;
    Ok(())
}

fn open_challenge(pair: &EncryptionPair, challenge: &str) -> Result<String> {
    let data = pair.decrypt(challenge)?;
    String::from_utf8(data).map_err(|_| MensagoError::DecryptionFailed.into())
}

/// Completes a login by answering the device challenge. Returns true if the
/// server reports an administrator session.
pub async fn device(
    conn: &mut ServerConnection,
    devid: &RandomId,
    devpair: &EncryptionPair,
) -> Result<bool> {
    let mut request = ClientRequest::new("DEVICE")
        .with("Device-ID", devid.as_str())
        .with("Device-Key", devpair.public_key().as_str());
    let response = conn.request(&request).await?.expect(100)?;

    let challenge = response
        .field("Challenge")
        .ok_or_else(|| ClientError::Protocol("server did not return a device challenge".into()))?;
    let answer = match open_challenge(devpair, challenge) {
        Ok(answer) => answer,
        Err(e) => {
            warn!("Failed to decrypt device challenge: {}", e);
            let _ = cancel(conn).await;
            return Err(MensagoError::DecryptionFailed.into());
        }
    };

    request.set("Response", answer);
    let response = conn.request(&request).await?.expect(200)?;

    let is_admin = response
        .field("Is-Admin")
        .is_some_and(|v| v.eq_ignore_ascii_case("true") || v == "YES");
    debug!(is_admin, "device authenticated");
    Ok(is_admin)
}

/// Replaces a device's key on the server
pub async fn devkey(
    conn: &mut ServerConnection,
    devid: &RandomId,
    old: &EncryptionPair,
    new: &EncryptionPair,
) -> Result<()> {
    let request = ClientRequest::new("DEVKEY")
        .with("Device-ID", devid.as_str())
        .with("Old-Key", old.public_key().as_str())
        .with("New-Key", new.public_key().as_str());
    let response = conn.request(&request).await?.expect(100)?;

    let (Some(challenge), Some(new_challenge)) =
        (response.field("Challenge"), response.field("New-Challenge"))
    else {
        return Err(ClientError::Protocol(
            "server did not return both device challenges".to_string(),
        ));
    };

    let answers = open_challenge(old, challenge)
        .and_then(|a| open_challenge(new, new_challenge).map(|b| (a, b)));
    let (answer, new_answer) = match answers {
        Ok(answers) => answers,
        Err(_) => {
            let _ = cancel(conn).await;
            return Err(MensagoError::DecryptionFailed.into());
        }
    };

    let request = ClientRequest::new("DEVKEY")
        .with("Response", answer)
        .with("New-Response", new_answer);
    conn.request(&request).await?.expect(200)?;
    Ok(())
}

pub async fn logout(conn: &mut ServerConnection) -> Result<()> {
    conn.request(&ClientRequest::new("LOGOUT")).await?.expect(200)?;
    Ok(())
}

/// Returns the session to a state ready for the next command
pub async fn cancel(conn: &mut ServerConnection) -> Result<()> {
    conn.request(&ClientRequest::new("CANCEL")).await?.expect(200)?;
    Ok(())
}

pub async fn setpassword(conn: &mut ServerConnection, pwhash: &str, newpwhash: &str) -> Result<()> {
    if pwhash.is_empty() || newpwhash.is_empty() {
        return Err(ClientError::bad_value("password hash may not be empty"));
    }

    let request = ClientRequest::new("SETPASSWORD")
        .with("Password-Hash", pwhash)
        .with("NewPassword-Hash", newpwhash);
    conn.request(&request).await?.expect(200)?;
    Ok(())
}

/// Sets a new password using a reset code
pub async fn passcode(
    conn: &mut ServerConnection,
    wid: &RandomId,
    reset_code: &str,
    pwhash: &str,
) -> Result<()> {
    if reset_code.is_empty() || pwhash.is_empty() {
        return Err(ClientError::bad_value("reset code and password hash are required"));
    }

    let request = ClientRequest::new("PASSCODE")
        .with("Workspace-ID", wid.as_str())
        .with("Reset-Code", reset_code)
        .with("Password-Hash", pwhash);
    conn.request(&request).await?.expect(200)?;
    Ok(())
}

/// Reset code issued by an administrator
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PasswordReset {
    pub reset_code: String,
    pub expires: String,
}

/// Asks the server to issue a password reset code for a workspace. The
/// server generates the code and expiration when they are not supplied.
pub async fn reset_password(
    conn: &mut ServerConnection,
    wid: &RandomId,
    reset_code: Option<&str>,
    expires: Option<&str>,
) -> Result<PasswordReset> {
    let mut request = ClientRequest::new("RESETPASSWORD").with("Workspace-ID", wid.as_str());
    if let Some(code) = reset_code {
        request.set("Reset-Code", code);
    }
    if let Some(expires) = expires {
        request.set("Expires", expires);
    }

    let response = conn.request(&request).await?.expect(200)?;
    Ok(PasswordReset {
        reset_code: response.require("Reset-Code")?.to_string(),
        expires: response.require("Expires")?.to_string(),
    })
}
