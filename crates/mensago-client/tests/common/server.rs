//! Scriptable stand-in for a Mensago server
//!
//! The server binds an ephemeral local port, greets every connection, then
//! feeds each JSON request line to a handler. QUIT and queued TRANSFER data
//! are handled here; everything else is up to the handler.

use std::sync::{Arc, Mutex};

use serde_json::{Map, Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use mensago_core::Entry;

/// A request as received by the server
#[derive(Clone, Debug)]
pub struct Request {
    pub action: String,
    pub data: Map<String, Value>,
}

impl Request {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.data.get(name).and_then(Value::as_str)
    }
}

pub enum Reply {
    Json(Value),
    Raw(Vec<u8>),
    Close,
}

/// Per-connection state
#[derive(Default)]
pub struct Session {
    pub wid: Option<String>,
    pub logged_in: bool,
    pub is_admin: bool,
    pub challenge: Option<String>,
    pub entry: Option<Entry>,
    pub transfer: Option<Vec<u8>>,
}

pub fn reply(code: u16, status: &str, data: Value) -> Reply {
    Reply::Json(json!({
        "Code": code,
        "Status": status,
        "Info": "",
        "Data": data,
    }))
}

pub fn ok(data: Value) -> Reply {
    reply(200, "OK", data)
}

pub fn error(code: u16, status: &str) -> Reply {
    reply(code, status, json!({}))
}

/// Queues data for the next TRANSFER and returns the 104 reply announcing it
pub fn transfer(session: &mut Session, data: Vec<u8>) -> Reply {
    let size = data.len();
    session.transfer = Some(data);
    reply(104, "TRANSFER", json!({ "Total-Size": size.to_string() }))
}

type Handler = Arc<dyn Fn(&Request, &mut Session) -> Vec<Reply> + Send + Sync>;

pub struct MockServer {
    port: u16,
    log: Arc<Mutex<Vec<Request>>>,
    task: JoinHandle<()>,
}

impl MockServer {
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&Request, &mut Session) -> Vec<Reply> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock server");
        let port = listener.local_addr().expect("mock server address").port();

        let handler: Handler = Arc::new(handler);
        let log = Arc::new(Mutex::new(Vec::new()));
        let task_log = log.clone();
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, handler.clone(), task_log.clone()));
            }
        });

        Self { port, log, task }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port` form for host overrides
    pub fn target(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    /// Every request received so far, across all connections
    pub fn requests(&self) -> Vec<Request> {
        self.log.lock().unwrap().clone()
    }

    pub fn actions(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.action).collect()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn write_line(writer: &mut OwnedWriteHalf, value: &Value) -> std::io::Result<()> {
    let mut line = value.to_string();
    line.push_str("\r\n");
    writer.write_all(line.as_bytes()).await
}

async fn serve(stream: TcpStream, handler: Handler, log: Arc<Mutex<Vec<Request>>>) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let greeting = json!({
        "Name": "Mensago",
        "Version": "0.1",
        "Code": 200,
        "Status": "OK",
        "Date": "20260101T000000Z",
    });
    if write_line(&mut writer, &greeting).await.is_err() {
        return;
    }

    let mut session = Session::default();
    while let Ok(Some(line)) = lines.next_line().await {
        let Ok(value) = serde_json::from_str::<Value>(&line) else {
            if let Reply::Json(v) = error(400, "BAD REQUEST") {
                let _ = write_line(&mut writer, &v).await;
            }
            continue;
        };
        let request = Request {
            action: value["Action"].as_str().unwrap_or_default().to_string(),
            data: value["Data"].as_object().cloned().unwrap_or_default(),
        };
        log.lock().unwrap().push(request.clone());

        let replies = match request.action.as_str() {
            "QUIT" => return,
            "TRANSFER" => match session.transfer.take() {
                Some(data) => vec![Reply::Raw(data)],
                None => handler(&request, &mut session),
            },
            _ => handler(&request, &mut session),
        };

        for reply in replies {
            let result = match reply {
                Reply::Json(v) => write_line(&mut writer, &v).await,
                Reply::Raw(data) => writer.write_all(&data).await,
                Reply::Close => return,
            };
            if result.is_err() {
                return;
            }
        }
    }
}
