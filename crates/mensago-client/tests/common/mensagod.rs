//! A small in-memory mensagod
//!
//! Implements enough of the server side of the protocol to drive the
//! client through registration, login, and keycard updates: a signed
//! organization keycard, workspaces with devices, and the ADDENTRY
//! signing exchange.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::json;

use mensago_client::ClientSettings;
use mensago_common::{CryptoString, HashAlgorithm, RandomId};
use mensago_core::{
    EncryptionPair, Entry, EntryType, Keycard, PublicKey, SigType, SigningPair,
};

use super::server::{MockServer, Reply, Request, Session, error, ok, reply, transfer};

pub const ADMIN_WID: &str = "ae406c5e-2673-4d3e-af20-91325d9623ca";

/// Wraps card entries in the delimiters a server sends them in
pub fn transfer_bytes(card: &Keycard) -> Vec<u8> {
    let tag = match card.entry_type() {
        EntryType::Organization => "ORG",
        EntryType::User => "USER",
    };
    let mut out = String::new();
    for entry in &card.entries {
        out.push_str(&format!("----- BEGIN {} ENTRY -----\r\n", tag));
        out.push_str(&entry.to_string());
        out.push_str(&format!("----- END {} ENTRY -----\r\n", tag));
    }
    out.into_bytes()
}

/// Organization keys and a signed root keycard
pub struct Organization {
    pub sign: SigningPair,
    pub encrypt: EncryptionPair,
    pub card: Keycard,
}

impl Organization {
    pub fn generate(domain: &str) -> Self {
        let sign = SigningPair::generate();
        let encrypt = EncryptionPair::generate();

        let mut entry = Entry::new_org();
        entry.set_fields([
            ("Name", "Example, Inc."),
            ("Contact-Admin", format!("{}/{}", ADMIN_WID, domain).as_str()),
            ("Primary-Verification-Key", sign.public_key().as_str()),
            ("Encryption-Key", encrypt.public_key().as_str()),
        ]);
        entry.generate_hash(HashAlgorithm::Blake2b256);
        entry
            .sign(sign.private_key(), SigType::Organization)
            .expect("sign org entry");

        Self {
            sign,
            encrypt,
            card: Keycard::with_root(entry),
        }
    }
}

#[derive(Default)]
pub struct WorkspaceRecord {
    pub uid: Option<String>,
    pub pwhash: String,
    pub devices: HashMap<String, String>,
    pub admin: bool,
    pub entries: Vec<Entry>,
}

pub struct MensagodState {
    pub domain: String,
    pub org: Organization,
    pub workspaces: HashMap<String, WorkspaceRecord>,
    pub regcodes: HashMap<String, (String, Option<String>)>,
    /// Number of REGISTER requests to answer with a workspace ID collision
    pub collisions: u32,
    /// Refuse every new keycard entry
    pub reject_entries: bool,
}

impl MensagodState {
    fn wid_for(&self, id: &str) -> Option<String> {
        if self.workspaces.contains_key(id) {
            return Some(id.to_string());
        }
        self.workspaces
            .iter()
            .find(|(_, ws)| ws.uid.as_deref() == Some(id))
            .map(|(wid, _)| wid.clone())
    }

    fn uid_taken(&self, uid: &str) -> bool {
        self.workspaces
            .values()
            .any(|ws| ws.uid.as_deref() == Some(uid))
    }
}

pub struct FakeMensagod {
    pub server: MockServer,
    pub state: Arc<Mutex<MensagodState>>,
}

impl FakeMensagod {
    pub async fn start(domain: &str) -> Self {
        let state = Arc::new(Mutex::new(MensagodState {
            domain: domain.to_string(),
            org: Organization::generate(domain),
            workspaces: HashMap::new(),
            regcodes: HashMap::new(),
            collisions: 0,
            reject_entries: false,
        }));

        let handler_state = state.clone();
        let server = MockServer::start(move |request, session| {
            let mut state = handler_state.lock().unwrap();
            handle(&mut state, request, session)
        })
        .await;

        Self { server, state }
    }

    /// Client settings that route this server's domain to it
    pub fn settings(&self) -> ClientSettings {
        let mut settings = ClientSettings::defaults().expect("default settings");
        let domain = self.state.lock().unwrap().domain.clone();
        settings.add_host_override(&domain, &self.server.target());
        settings
    }

    pub fn add_workspace(
        &self,
        wid: &str,
        uid: Option<&str>,
        pwhash: &str,
        devid: &str,
        devkey: &CryptoString,
        admin: bool,
    ) {
        let mut record = WorkspaceRecord {
            uid: uid.map(str::to_string),
            pwhash: pwhash.to_string(),
            admin,
            ..Default::default()
        };
        record.devices.insert(devid.to_string(), devkey.to_string());
        self.state
            .lock()
            .unwrap()
            .workspaces
            .insert(wid.to_string(), record);
    }

    pub fn add_regcode(&self, regcode: &str, wid: &str, uid: Option<&str>) {
        self.state.lock().unwrap().regcodes.insert(
            regcode.to_string(),
            (wid.to_string(), uid.map(str::to_string)),
        );
    }

    pub fn set_collisions(&self, count: u32) {
        self.state.lock().unwrap().collisions = count;
    }

    pub fn set_reject_entries(&self, reject: bool) {
        self.state.lock().unwrap().reject_entries = reject;
    }

    pub fn org_verification_key(&self) -> CryptoString {
        self.state.lock().unwrap().org.sign.public_key().clone()
    }

    /// The user keycard entries stored for a workspace
    pub fn user_entries(&self, wid: &str) -> Vec<Entry> {
        self.state
            .lock()
            .unwrap()
            .workspaces
            .get(wid)
            .map(|ws| ws.entries.clone())
            .unwrap_or_default()
    }

    pub fn has_workspace(&self, wid: &str) -> bool {
        self.state.lock().unwrap().workspaces.contains_key(wid)
    }
}

fn handle(state: &mut MensagodState, request: &Request, session: &mut Session) -> Vec<Reply> {
    let result = match request.action.as_str() {
        "ORGCARD" => transfer(session, transfer_bytes(&state.org.card)),
        "USERCARD" => usercard(state, request, session),
        "GETWID" => getwid(state, request),
        "REGISTER" => register(state, request),
        "PREREG" => prereg(state, request, session),
        "REGCODE" => regcode(state, request),
        "LOGIN" => login(state, request, session),
        "PASSWORD" => password(state, request, session),
        "DEVICE" => device(state, request, session),
        "ADDENTRY" => addentry(state, request, session),
        "LOGOUT" => {
            session.logged_in = false;
            session.is_admin = false;
            session.wid = None;
            ok(json!({}))
        }
        "CANCEL" => {
            session.challenge = None;
            session.entry = None;
            ok(json!({}))
        }
        _ => error(301, "NOT IMPLEMENTED"),
    };
    vec![result]
}

fn usercard(state: &MensagodState, request: &Request, session: &mut Session) -> Reply {
    let Some((id, _)) = request.field("Owner").and_then(|o| o.split_once('/')) else {
        return error(400, "BAD REQUEST");
    };
    let entries = state
        .wid_for(id)
        .and_then(|wid| state.workspaces.get(&wid))
        .map(|ws| ws.entries.clone())
        .unwrap_or_default();
    if entries.is_empty() {
        return error(404, "NOT FOUND");
    }

    let mut card = Keycard::new(EntryType::User);
    card.entries = entries;
    transfer(session, transfer_bytes(&card))
}

fn getwid(state: &MensagodState, request: &Request) -> Reply {
    match request.field("User-ID").and_then(|uid| state.wid_for(uid)) {
        Some(wid) => ok(json!({ "Workspace-ID": wid })),
        None => error(404, "NOT FOUND"),
    }
}

fn new_workspace(request: &Request, uid: Option<String>) -> Option<WorkspaceRecord> {
    let mut record = WorkspaceRecord {
        uid,
        pwhash: request.field("Password-Hash")?.to_string(),
        ..Default::default()
    };
    record.devices.insert(
        request.field("Device-ID")?.to_string(),
        request.field("Device-Key")?.to_string(),
    );
    Some(record)
}

fn register(state: &mut MensagodState, request: &Request) -> Reply {
    if state.collisions > 0 {
        state.collisions -= 1;
        return reply(408, "RESOURCE EXISTS", json!({ "Field": "Workspace-ID" }));
    }

    let Some(wid) = request.field("Workspace-ID") else {
        return error(400, "BAD REQUEST");
    };
    let uid = request.field("User-ID").map(str::to_string);
    if uid.as_deref().is_some_and(|u| state.uid_taken(u)) {
        return reply(408, "RESOURCE EXISTS", json!({ "Field": "User-ID" }));
    }
    if state.workspaces.contains_key(wid) {
        return reply(408, "RESOURCE EXISTS", json!({ "Field": "Workspace-ID" }));
    }

    let Some(record) = new_workspace(request, uid) else {
        return error(400, "BAD REQUEST");
    };
    state.workspaces.insert(wid.to_string(), record);
    reply(201, "REGISTERED", json!({ "Domain": state.domain }))
}

fn prereg(state: &mut MensagodState, request: &Request, session: &Session) -> Reply {
    if !session.logged_in || !session.is_admin {
        return error(401, "UNAUTHORIZED");
    }

    let wid = request
        .field("Workspace-ID")
        .map(str::to_string)
        .unwrap_or_else(|| RandomId::generate().to_string());
    let uid = request.field("User-ID").map(str::to_string);
    let regcode = "Undamaged Shining Amaretto Improve Scuttle Uptake".to_string();
    state
        .regcodes
        .insert(regcode.clone(), (wid.clone(), uid.clone()));

    let mut data = json!({
        "Workspace-ID": wid,
        "Domain": state.domain,
        "Reg-Code": regcode,
    });
    if let Some(uid) = uid {
        data["User-ID"] = json!(uid);
    }
    ok(data)
}

fn regcode(state: &mut MensagodState, request: &Request) -> Reply {
    let Some((wid, uid)) = request
        .field("Reg-Code")
        .and_then(|code| state.regcodes.get(code))
        .cloned()
    else {
        return error(401, "UNAUTHORIZED");
    };

    let id_matches = request.field("Workspace-ID") == Some(wid.as_str())
        || (uid.is_some() && request.field("User-ID") == uid.as_deref());
    if !id_matches {
        return error(401, "UNAUTHORIZED");
    }

    let Some(record) = new_workspace(request, uid) else {
        return error(400, "BAD REQUEST");
    };
    if let Some(code) = request.field("Reg-Code") {
        state.regcodes.remove(code);
    }
    state.workspaces.insert(wid.clone(), record);
    reply(201, "REGISTERED", json!({ "Workspace-ID": wid, "Domain": state.domain }))
}

fn login(state: &MensagodState, request: &Request, session: &mut Session) -> Reply {
    let Some(wid) = request.field("Workspace-ID") else {
        return error(400, "BAD REQUEST");
    };
    if !state.workspaces.contains_key(wid) {
        return error(404, "NOT FOUND");
    }

    let answer = request
        .field("Challenge")
        .and_then(|c| state.org.encrypt.decrypt(c).ok())
        .and_then(|data| String::from_utf8(data).ok());
    let Some(answer) = answer else {
        return error(306, "KEY FAILURE");
    };

    session.wid = Some(wid.to_string());
    reply(100, "CONTINUE", json!({ "Response": answer }))
}

fn password(state: &MensagodState, request: &Request, session: &Session) -> Reply {
    let Some(record) = session.wid.as_ref().and_then(|w| state.workspaces.get(w)) else {
        return error(400, "BAD REQUEST");
    };
    if request.field("Password-Hash") != Some(record.pwhash.as_str()) {
        return error(402, "AUTHENTICATION FAILURE");
    }
    reply(100, "CONTINUE", json!({}))
}

fn device(state: &MensagodState, request: &Request, session: &mut Session) -> Reply {
    let Some(record) = session.wid.as_ref().and_then(|w| state.workspaces.get(w)) else {
        return error(400, "BAD REQUEST");
    };
    let (Some(devid), Some(devkey)) = (request.field("Device-ID"), request.field("Device-Key"))
    else {
        return error(400, "BAD REQUEST");
    };
    if record.devices.get(devid).map(String::as_str) != Some(devkey) {
        return error(402, "AUTHENTICATION FAILURE");
    }

    match request.field("Response") {
        None => {
            let challenge = RandomId::generate().to_string();
            let sealed = devkey
                .parse::<CryptoString>()
                .ok()
                .and_then(|key| PublicKey::new(key).ok())
                .and_then(|key| key.encrypt(challenge.as_bytes()).ok());
            let Some(sealed) = sealed else {
                return error(306, "KEY FAILURE");
            };
            session.challenge = Some(challenge);
            reply(100, "CONTINUE", json!({ "Challenge": sealed }))
        }
        Some(response) => {
            if session.challenge.take().as_deref() != Some(response) {
                return error(402, "AUTHENTICATION FAILURE");
            }
            session.logged_in = true;
            session.is_admin = record.admin;
            let admin = if record.admin { "True" } else { "False" };
            ok(json!({ "Is-Admin": admin }))
        }
    }
}

fn addentry(state: &mut MensagodState, request: &Request, session: &mut Session) -> Reply {
    let Some(wid) = session.wid.clone().filter(|_| session.logged_in) else {
        return error(401, "UNAUTHORIZED");
    };

    if let Some(base) = request.field("Base-Entry") {
        if state.reject_entries {
            return error(503, "SERVER UNAVAILABLE");
        }
        let Ok(mut entry) = Entry::from_bytes(EntryType::User, base.as_bytes()) else {
            return error(400, "BAD REQUEST");
        };
        if entry.field("Workspace-ID") != Some(wid.as_str()) {
            return error(411, "BAD KEYCARD DATA");
        }
        if entry.sign(state.org.sign.private_key(), SigType::Organization).is_err() {
            return error(306, "KEY FAILURE");
        }

        let prev_hash = state
            .workspaces
            .get(&wid)
            .and_then(|ws| ws.entries.last())
            .or(state.org.card.current())
            .map(|e| e.hash().to_string())
            .unwrap_or_default();
        let Ok(prev_hash) = prev_hash.parse::<CryptoString>() else {
            return error(300, "INTERNAL SERVER ERROR");
        };
        entry.set_prev_hash(&prev_hash);
        entry.generate_hash(HashAlgorithm::Blake2b256);

        let data = json!({
            "Organization-Signature": entry.signature(SigType::Organization).unwrap_or_default(),
            "Hash": entry.hash(),
            "Previous-Hash": entry.prev_hash(),
        });
        session.entry = Some(entry);
        return reply(100, "CONTINUE", data);
    }

    let Some(user_sig) = request.field("User-Signature") else {
        return error(400, "BAD REQUEST");
    };
    let Some(mut entry) = session.entry.take() else {
        return error(400, "BAD REQUEST");
    };
    let Ok(user_sig) = user_sig.parse::<CryptoString>() else {
        return error(400, "BAD REQUEST");
    };
    entry.set_signature(SigType::User, &user_sig);

    let verified = entry
        .field("Verification-Key")
        .and_then(|k| k.parse::<CryptoString>().ok())
        .is_some_and(|key| entry.verify_signature(&key, SigType::User).is_ok());
    if !verified {
        return error(413, "SIGNATURE FAILURE");
    }

    if let Some(ws) = state.workspaces.get_mut(&wid) {
        ws.entries.push(entry);
    }
    ok(json!({}))
}
