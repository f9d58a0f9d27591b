//! Server connection handling
//!
//! Mensago speaks one JSON object per CRLF-terminated line. Requests carry
//! an `Action` and a `Data` object; responses carry `Code`, `Status`, an
//! optional `Info`, and `Data`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use mensago_common::ResponseCode;

use crate::error::{ClientError, Result};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1800);

/// Largest payload `read_raw` will accept
pub const MAX_RAW_SIZE: usize = 64 * 1024 * 1024;
const RAW_CHUNK_SIZE: usize = 8192;

// ============== Wire types ==============

/// A command sent to the server
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClientRequest {
    #[serde(rename = "Action")]
    pub action: String,
    #[serde(rename = "Data")]
    pub data: Map<String, Value>,
}

impl ClientRequest {
    pub fn new(action: &str) -> Self {
        Self {
            action: action.to_string(),
            data: Map::new(),
        }
    }

    /// Builder-style field setter
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.data.insert(key.to_string(), value.into());
    }
}

/// A response read from the server
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ServerResponse {
    #[serde(rename = "Code")]
    pub code: u16,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "Info", default)]
    pub info: String,
    #[serde(rename = "Data")]
    pub data: Map<String, Value>,
}

impl ServerResponse {
    pub fn response_code(&self) -> Option<ResponseCode<'static>> {
        ResponseCode::lookup(self.code)
    }

    /// Returns the response unchanged if its code matches, otherwise the
    /// matching server error
    pub fn expect(self, code: u16) -> Result<Self> {
        if self.code == code {
            Ok(self)
        } else {
            Err(self.into_error())
        }
    }

    pub fn into_error(self) -> ClientError {
        ClientError::Server {
            code: self.code,
            status: self.status,
            info: self.info,
        }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.data.get(name).and_then(Value::as_str)
    }

    /// Returns a string field or a protocol error if it is missing
    pub fn require(&self, name: &str) -> Result<&str> {
        match self.data.get(name) {
            Some(Value::String(s)) => Ok(s),
            Some(_) => Err(ClientError::Protocol(format!(
                "server returned bad data for field {}",
                name
            ))),
            None => Err(ClientError::Protocol(format!(
                "server did not return required field {}",
                name
            ))),
        }
    }

    /// Parses a required field into any type implementing `FromStr`
    pub fn require_parsed<T: std::str::FromStr>(&self, name: &str) -> Result<T> {
        self.require(name)?.parse().map_err(|_| {
            ClientError::Protocol(format!("server returned bad value for field {}", name))
        })
    }

    /// Reads a numeric field sent either as a JSON number or as a string
    pub fn require_u64(&self, name: &str) -> Result<u64> {
        match self.data.get(name) {
            Some(Value::Number(n)) => n.as_u64().ok_or_else(|| {
                ClientError::Protocol(format!("server returned bad value for field {}", name))
            }),
            Some(Value::String(_)) => self.require_parsed(name),
            Some(_) => Err(ClientError::Protocol(format!(
                "server returned bad data for field {}",
                name
            ))),
            None => Err(ClientError::Protocol(format!(
                "server did not return required field {}",
                name
            ))),
        }
    }

    /// Reads a list of strings
    pub fn require_list(&self, name: &str) -> Result<Vec<String>> {
        let items = self
            .data
            .get(name)
            .and_then(Value::as_array)
            .ok_or_else(|| {
                ClientError::Protocol(format!("server did not return required field {}", name))
            })?;
        items
            .iter()
            .map(|v| {
                v.as_str().map(str::to_string).ok_or_else(|| {
                    ClientError::Protocol(format!("server returned bad data in {}", name))
                })
            })
            .collect()
    }
}

// ============== Connection ==============

/// A single connection to a Mensago server
pub struct ServerConnection {
    stream: Option<BufReader<TcpStream>>,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl Default for ServerConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerConnection {
    pub fn new() -> Self {
        Self::with_timeouts(DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT)
    }

    pub fn with_timeouts(connect_timeout: Duration, read_timeout: Duration) -> Self {
        Self {
            stream: None,
            connect_timeout,
            read_timeout,
        }
    }

    /// Connects to a server and absorbs its greeting
    pub async fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        if self.stream.is_some() {
            self.disconnect().await?;
        }

        info!("Connecting to Mensago server at {}:{}", host, port);
        let stream = timeout(self.connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| ClientError::Timeout)??;
        let mut reader = BufReader::new(stream);

        let mut greeting = String::new();
        let read = timeout(self.connect_timeout, reader.read_line(&mut greeting))
            .await
            .map_err(|_| ClientError::Timeout)??;
        if read == 0 {
            return Err(ClientError::NotConnected);
        }
        debug!(greeting = greeting.trim_end(), "server greeting");

        self.stream = Some(reader);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Sends QUIT and closes the socket
    pub async fn disconnect(&mut self) -> Result<()> {
        if self.stream.is_none() {
            return Ok(());
        }
        if let Err(e) = self.send(&ClientRequest::new("QUIT")).await {
            warn!("Failed to send QUIT: {}", e);
        }
        self.stream = None;
        debug!("Disconnected from server");
        Ok(())
    }

    pub async fn send(&mut self, request: &ClientRequest) -> Result<()> {
        let mut line = serde_json::to_string(request)?;
        line.push_str("\r\n");

        let stream = self.stream.as_mut().ok_or(ClientError::NotConnected)?;
        if let Err(e) = stream.get_mut().write_all(line.as_bytes()).await {
            self.stream = None;
            return Err(e.into());
        }
        debug!(action = %request.action, "sent request");
        Ok(())
    }

    pub async fn read_response(&mut self) -> Result<ServerResponse> {
        let read_timeout = self.read_timeout;
        let stream = self.stream.as_mut().ok_or(ClientError::NotConnected)?;

        let mut line = String::new();
        let read = timeout(read_timeout, stream.read_line(&mut line))
            .await
            .map_err(|_| ClientError::Timeout)??;
        if read == 0 {
            self.stream = None;
            return Err(ClientError::NotConnected);
        }

        let response: ServerResponse = serde_json::from_str(line.trim_end())
            .map_err(|e| ClientError::Protocol(format!("bad server response: {}", e)))?;
        debug!(code = response.code, status = %response.status, "received response");
        Ok(response)
    }

    /// Sends a request and reads its response
    pub async fn request(&mut self, request: &ClientRequest) -> Result<ServerResponse> {
        self.send(request).await?;
        self.read_response().await
    }

    /// Reads exactly `size` bytes of raw data, as sent after a TRANSFER.
    /// The buffer grows as data arrives, so a bogus size cannot force a
    /// large allocation up front.
    pub async fn read_raw(&mut self, size: usize) -> Result<Vec<u8>> {
        if size > MAX_RAW_SIZE {
            return Err(ClientError::Protocol(format!(
                "transfer of {} bytes exceeds the {} byte limit",
                size, MAX_RAW_SIZE
            )));
        }

        let read_timeout = self.read_timeout;
        let stream = self.stream.as_mut().ok_or(ClientError::NotConnected)?;

        let mut buffer = Vec::with_capacity(size.min(RAW_CHUNK_SIZE));
        let mut limited = (&mut *stream).take(size as u64);
        let read = timeout(read_timeout, limited.read_to_end(&mut buffer))
            .await
            .map_err(|_| ClientError::Timeout)??;
        if read < size {
            self.stream = None;
            return Err(ClientError::Protocol(format!(
                "connection closed after {} of {} bytes",
                read, size
            )));
        }
        Ok(buffer)
    }
}
