//! Integration test common infrastructure.
//!
//! Provides a scripted upstream provider, an in-process relay server and a
//! WebSocket test client.

pub mod client;
pub mod provider;
pub mod server;

#[allow(unused_imports)]
pub use client::TestClient;
#[allow(unused_imports)]
pub use provider::ScriptedProvider;
#[allow(unused_imports)]
pub use server::TestServer;
