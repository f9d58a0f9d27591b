//! Keycard commands

use tracing::debug;

use mensago_common::{CryptoString, Domain, MAddress, RandomId, UserId};
use mensago_core::{Entry, EntryType, Keycard, SigType, SigningPair};

use crate::conn::{ClientRequest, ServerConnection};
use crate::error::{ClientError, Result};

/// Largest keycard a server may send in one TRANSFER
pub const MAX_KEYCARD_SIZE: usize = 4 * 1024 * 1024;

/// Uploads a new user entry.
///
/// The server custody-checks the base entry, then returns its organization
/// signature and the chain hashes. Those are verified locally before the
/// entry is signed by the user and the user signature is sent back.
pub async fn addentry(
    conn: &mut ServerConnection,
    entry: &mut Entry,
    org_vkey: &CryptoString,
    spair: &SigningPair,
) -> Result<()> {
    // Everything up to and including the custody signature
    let base = String::from_utf8(entry.make_bytestring(1))
        .map_err(|_| ClientError::bad_value("entry is not valid UTF-8"))?;
    let request = ClientRequest::new("ADDENTRY").with("Base-Entry", base);
    let response = conn.request(&request).await?.expect(100)?;

    let org_sig: CryptoString = response.require_parsed("Organization-Signature")?;
    let hash: CryptoString = response.require_parsed("Hash")?;
    let prev_hash: CryptoString = response.require_parsed("Previous-Hash")?;

    entry.set_signature(SigType::Organization, &org_sig);
    entry.verify_signature(org_vkey, SigType::Organization)?;

    entry.set_prev_hash(&prev_hash);
    entry.set_hash(&hash);
    entry.verify_hash()?;

    entry.sign(spair.private_key(), SigType::User)?;
    entry.verify_signature(spair.public_key(), SigType::User)?;
    entry.is_compliant()?;

    let user_sig = entry
        .signature(SigType::User)
        .ok_or_else(|| ClientError::Protocol("entry is missing its user signature".into()))?
        .to_string();
    let request = ClientRequest::new("ADDENTRY").with("User-Signature", user_sig);
    conn.request(&request).await?.expect(200)?;

    debug!(index = entry.index().unwrap_or_default(), "uploaded keycard entry");
    Ok(())
}

/// Runs a card request, then downloads the card with TRANSFER
async fn transfer_card(
    conn: &mut ServerConnection,
    request: ClientRequest,
    entry_type: EntryType,
) -> Result<Keycard> {
    let response = conn.request(&request).await?.expect(104)?;
    let size = usize::try_from(response.require_u64("Total-Size")?)
        .ok()
        .filter(|size| *size <= MAX_KEYCARD_SIZE);
    let Some(size) = size else {
        // The server is waiting on a TRANSFER that will never come
        conn.disconnect().await?;
        return Err(ClientError::Protocol("keycard is too large".to_string()));
    };

    conn.send(&ClientRequest::new("TRANSFER")).await?;
    let raw = conn.read_raw(size).await?;
    let text = String::from_utf8(raw)
        .map_err(|_| ClientError::Protocol("keycard data is not valid UTF-8".to_string()))?;

    let card = Keycard::from_transfer(&text, entry_type)?;
    debug!(entries = card.len(), %entry_type, "downloaded keycard");
    Ok(card)
}

fn card_request(action: &str, start: u32, end: Option<u32>) -> Result<ClientRequest> {
    if start < 1 || end.is_some_and(|end| end < start) {
        return Err(ClientError::bad_value("bad keycard index range"));
    }

    let mut request = ClientRequest::new(action).with("Start-Index", start.to_string());
    if let Some(end) = end {
        request.set("End-Index", end.to_string());
    }
    Ok(request)
}

/// Obtains entries of the server's organization keycard. Without an end
/// index, all entries from `start` onward are returned.
pub async fn orgcard(conn: &mut ServerConnection, start: u32, end: Option<u32>) -> Result<Keycard> {
    let request = card_request("ORGCARD", start, end)?;
    transfer_card(conn, request, EntryType::Organization).await
}

/// Obtains entries of a user's keycard
pub async fn usercard(
    conn: &mut ServerConnection,
    owner: &MAddress,
    start: u32,
    end: Option<u32>,
) -> Result<Keycard> {
    let request = card_request("USERCARD", start, end)?.with("Owner", owner.to_string());
    transfer_card(conn, request, EntryType::User).await
}

/// Checks whether an entry index is current. Without a workspace ID, the
/// organization's card is checked.
pub async fn iscurrent(
    conn: &mut ServerConnection,
    index: u32,
    wid: Option<&RandomId>,
) -> Result<bool> {
    if index < 1 {
        return Err(ClientError::bad_value("index must be at least 1"));
    }

    let mut request = ClientRequest::new("ISCURRENT").with("Index", index.to_string());
    if let Some(wid) = wid {
        request.set("Workspace-ID", wid.as_str());
    }

    let response = conn.request(&request).await?.expect(200)?;
    Ok(response.require("Is-Current")? == "YES")
}

/// Looks up the workspace ID for a user ID
pub async fn getwid(
    conn: &mut ServerConnection,
    uid: &UserId,
    domain: Option<&Domain>,
) -> Result<RandomId> {
    let mut request = ClientRequest::new("GETWID").with("User-ID", uid.as_str());
    if let Some(domain) = domain {
        request.set("Domain", domain.as_str());
    }

    let response = conn.request(&request).await?.expect(200)?;
    response.require_parsed("Workspace-ID")
}
