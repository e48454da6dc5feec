// unictl-api: Async Rust client for the UniFi controller API
//
// Cookie session auth with lazy login, the `{meta, data}` request
// pipeline, typed domain operations, and the site WebSocket event stream
// fanned out as `Notification`s.

mod auth;
pub mod client;
pub mod config;
mod endpoints;
pub mod error;
pub mod events;
pub mod models;
pub mod notify;
pub mod session;
pub mod transport;

pub use client::UnifiClient;
pub use config::{ClientConfig, ClientOptions};
pub use error::{Error, ErrorKind};
pub use events::StreamState;
pub use notify::Notification;
pub use session::SessionState;
pub use transport::{TlsMode, TransportConfig};
