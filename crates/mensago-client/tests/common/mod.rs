//! Common test utilities for integration testing
//!
//! This module provides shared test infrastructure including:
//! - MockServer: a scriptable Mensago server on an ephemeral port
//! - FakeMensagod: a stateful server built on MockServer that handles
//!   registration, login, and keycard updates

#[allow(dead_code, unused_imports)]
pub mod mensagod;
#[allow(dead_code, unused_imports)]
pub mod server;

#[allow(unused_imports)]
pub use mensagod::FakeMensagod;
#[allow(unused_imports)]
pub use server::{MockServer, Reply, Request, Session};

use mensago_client::ServerConnection;

/// Test domain, routed to the mock server through a host override
pub const TEST_DOMAIN: &str = "example.com";

/// Passphrase strong enough to pass the complexity check
pub const TEST_PASSWORD: &str = "MyS3cretPassw0rd!";

/// Opens a connection to a mock server
#[allow(dead_code)]
pub async fn connect(server: &MockServer) -> ServerConnection {
    let mut conn = ServerConnection::new();
    conn.connect("127.0.0.1", server.port())
        .await
        .expect("Failed to connect to mock server");
    conn
}
