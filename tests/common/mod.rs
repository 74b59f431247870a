//! Common test infrastructure
//!
//! Each test spawns its own fake gallery and server, backed by temporary
//! directories. Tests should only import from this module.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestClient, TestServer};
//!
//! #[tokio::test]
//! async fn test_status() {
//!     let server = TestServer::spawn().await;
//!     let client = TestClient::new(server.base_url.clone());
//!
//!     let response = client.status().await;
//!     assert_eq!(response.status(), 200);
//! }
//! ```

mod client;
mod constants;
mod fake_gallery;
mod server;

pub use client::TestClient;
pub use constants::*;
#[allow(unused_imports)]
pub use fake_gallery::knob_bytes;
pub use server::TestServer;
