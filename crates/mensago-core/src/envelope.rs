//! Message envelopes
//!
//! A marshalled envelope is five newline-separated parts:
//!
//! ```text
//! MENSAGO
//! {"Version":"1.0","Date":...,"KeyHash":...,"PayloadKey":...}
//! ----------
//! XSALSA20
//! <Base85 encrypted payload>
//! ```
//!
//! The payload is encrypted with a per-message secret key. That key is
//! sealed to the recipient and carried in `PayloadKey`.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use mensago_common::{
    CryptoString, MensagoError, PROTOCOL_VERSION, RandomId, Result, TIMESTAMP_FORMAT, WAddress,
    base85,
};

use crate::encryption::{CryptoKey, EncryptionPair, PublicKey, SecretKey, XSALSA20};

const MAGIC: &str = "MENSAGO";
const SEPARATOR: &str = "----------";

/// Cleartext envelope header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeHeader {
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "KeyHash")]
    pub key_hash: String,
    #[serde(rename = "PayloadKey")]
    pub payload_key: String,
    #[serde(rename = "Sender", skip_serializing_if = "Option::is_none", default)]
    pub sender: Option<String>,
    #[serde(rename = "Receiver", skip_serializing_if = "Option::is_none", default)]
    pub receiver: Option<String>,
}

impl Default for EnvelopeHeader {
    fn default() -> Self {
        Self {
            version: PROTOCOL_VERSION.to_string(),
            date: Utc::now().format(TIMESTAMP_FORMAT).to_string(),
            key_hash: String::new(),
            payload_key: String::new(),
            sender: None,
            receiver: None,
        }
    }
}

/// A file or inline image carried by a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePart {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Type")]
    pub mime_type: String,
    #[serde(rename = "Data")]
    pub data: String,
}

/// Payload of a user-to-user message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMessage {
    #[serde(rename = "Type")]
    pub msg_type: String,
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "To")]
    pub to: String,
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "ThreadID")]
    pub thread_id: String,
    #[serde(rename = "Subject")]
    pub subject: String,
    #[serde(rename = "Body")]
    pub body: String,
    #[serde(rename = "Images", skip_serializing_if = "Vec::is_empty", default)]
    pub images: Vec<MessagePart>,
    #[serde(rename = "Attachments", skip_serializing_if = "Vec::is_empty", default)]
    pub attachments: Vec<MessagePart>,
}

impl UserMessage {
    pub fn new(from: &WAddress, to: &WAddress, subject: &str, body: &str) -> Self {
        Self {
            msg_type: "usermessage".to_string(),
            version: PROTOCOL_VERSION.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            date: Utc::now().format(TIMESTAMP_FORMAT).to_string(),
            thread_id: RandomId::generate().to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            images: Vec::new(),
            attachments: Vec::new(),
        }
    }
}

#[derive(Serialize)]
struct SenderTag<'a> {
    #[serde(rename = "From")]
    from: String,
    #[serde(rename = "RecipientDomain")]
    recipient_domain: &'a str,
}

#[derive(Serialize)]
struct ReceiverTag<'a> {
    #[serde(rename = "To")]
    to: String,
    #[serde(rename = "SenderDomain")]
    sender_domain: &'a str,
}

/// An encrypted message container
#[derive(Debug, Clone, Default)]
pub struct Envelope {
    pub header: EnvelopeHeader,
    payload: serde_json::Value,
    msg_key: Option<SecretKey>,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates a message key and attaches it, sealed to the recipient
    pub fn set_msg_key(&mut self, recipient_key: &CryptoString) -> Result<()> {
        let pubkey = PublicKey::new(recipient_key.clone())?;
        let msg_key = SecretKey::generate();
        self.header.payload_key = pubkey.encrypt(msg_key.key().as_str().as_bytes())?;
        self.header.key_hash = pubkey.key_hash().to_string();
        self.msg_key = Some(msg_key);
        Ok(())
    }

    /// Sets the sender tag, readable only by the sender's organization
    pub fn set_sender(
        &mut self,
        sender: &WAddress,
        recipient: &WAddress,
        org_key: &CryptoString,
    ) -> Result<()> {
        let tag = serde_json::to_vec(&SenderTag {
            from: sender.to_string(),
            recipient_domain: recipient.domain.as_str(),
        })?;
        self.header.sender = Some(PublicKey::new(org_key.clone())?.encrypt(&tag)?);
        Ok(())
    }

    /// Sets the receiver tag, readable only by the recipient's organization
    pub fn set_receiver(
        &mut self,
        sender: &WAddress,
        recipient: &WAddress,
        org_key: &CryptoString,
    ) -> Result<()> {
        let tag = serde_json::to_vec(&ReceiverTag {
            to: recipient.to_string(),
            sender_domain: sender.domain.as_str(),
        })?;
        self.header.receiver = Some(PublicKey::new(org_key.clone())?.encrypt(&tag)?);
        Ok(())
    }

    pub fn set_payload<T: Serialize>(&mut self, payload: &T) -> Result<()> {
        self.payload = serde_json::to_value(payload)?;
        Ok(())
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    /// Flattens the envelope into its text form, encrypting the payload
    pub fn marshall(&self) -> Result<String> {
        let msg_key = self
            .msg_key
            .as_ref()
            .ok_or_else(|| MensagoError::RequiredFieldMissing("message key".to_string()))?;

        if !CryptoString::is_cryptostring(&self.header.key_hash) {
            return Err(MensagoError::BadData("bad message key hash".to_string()));
        }
        if self.header.payload_key.is_empty() || base85::decode(&self.header.payload_key).is_err()
        {
            return Err(MensagoError::BadData("bad payload key".to_string()));
        }
        if self.header.version != PROTOCOL_VERSION {
            return Err(MensagoError::BadData("bad version value".to_string()));
        }

        let header = serde_json::to_string(&self.header)?;
        let payload = msg_key.encrypt(&serde_json::to_vec(&self.payload)?)?;
        Ok([MAGIC, &header, SEPARATOR, XSALSA20, &payload].join("\n"))
    }

    /// Parses a marshalled envelope and decrypts its payload with the
    /// recipient's key pair
    pub fn unmarshall(text: &str, recipient: &EncryptionPair) -> Result<Self> {
        let parts: Vec<&str> = text.trim_end().splitn(5, '\n').collect();
        let [magic, header, separator, algorithm, payload] = parts.as_slice() else {
            return Err(MensagoError::BadData("envelope is incomplete".to_string()));
        };
        if *magic != MAGIC || *separator != SEPARATOR {
            return Err(MensagoError::BadData("not a Mensago envelope".to_string()));
        }
        if *algorithm != XSALSA20 {
            return Err(MensagoError::UnsupportedAlgorithm(algorithm.to_string()));
        }

        let header: EnvelopeHeader = serde_json::from_str(header)?;
        if header.key_hash != recipient.key_hash().to_string() {
            return Err(MensagoError::BadValue(
                "envelope was not sealed to this key".to_string(),
            ));
        }

        let key_text = String::from_utf8(recipient.decrypt(&header.payload_key)?)
            .map_err(|_| MensagoError::BadData("bad payload key".to_string()))?;
        let msg_key = SecretKey::from_string(key_text.parse()?)?;
        let payload = serde_json::from_slice(&msg_key.decrypt(payload)?)?;

        Ok(Self {
            header,
            payload,
            msg_key: Some(msg_key),
        })
    }
}
