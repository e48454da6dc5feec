// Connection configuration
//
// Describes how to reach one controller site: address, credentials and
// transport tuning. Never reads files or the environment; callers (or
// `unictl-config`) build a `ClientConfig` and hand it to the client.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::Error;

pub const DEFAULT_PORT: u16 = 8443;
pub const DEFAULT_SITE: &str = "default";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Raw, possibly incomplete connection settings.
///
/// Every field is optional so the struct can be filled from a builder
/// chain or deserialized from a config layer. [`build`](Self::build)
/// validates it into an immutable [`ClientConfig`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub site: Option<String>,
    /// Use `https`/`wss` (default) or plain `http`/`ws`.
    pub tls: Option<bool>,
    /// Verify the controller certificate. Off by default because most
    /// controllers ship self-signed certificates.
    pub strict_tls: Option<bool>,
    pub timeout_ms: Option<u64>,
}

impl ClientOptions {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<SecretString>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn site(mut self, site: impl Into<String>) -> Self {
        self.site = Some(site.into());
        self
    }

    pub fn tls(mut self, enabled: bool) -> Self {
        self.tls = Some(enabled);
        self
    }

    pub fn strict_tls(mut self, strict: bool) -> Self {
        self.strict_tls = Some(strict);
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Validate and freeze the options.
    ///
    /// Fails with [`Error::Config`] if host, username or password is
    /// missing or blank.
    pub fn build(self) -> Result<ClientConfig, Error> {
        let host = required("host", self.host)?;
        let username = required("username", self.username)?;
        let password = match self.password {
            Some(pw) if !pw.expose_secret().is_empty() => pw,
            _ => {
                return Err(Error::Config {
                    field: "password",
                    reason: "is required".into(),
                });
            }
        };

        let site = self
            .site
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SITE.to_owned());

        Ok(ClientConfig {
            host,
            port: self.port.unwrap_or(DEFAULT_PORT),
            username,
            password,
            site,
            tls: self.tls.unwrap_or(true),
            strict_tls: self.strict_tls.unwrap_or(false),
            timeout: Duration::from_millis(self.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS)),
        })
    }
}

fn required(field: &'static str, value: Option<String>) -> Result<String, Error> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_owned()),
        _ => Err(Error::Config {
            field,
            reason: "is required".into(),
        }),
    }
}

/// Validated, immutable configuration for a single controller.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    host: String,
    port: u16,
    username: String,
    password: SecretString,
    site: String,
    tls: bool,
    strict_tls: bool,
    timeout: Duration,
}

impl ClientConfig {
    /// Start an empty option set. Equivalent to `ClientOptions::default()`.
    pub fn builder() -> ClientOptions {
        ClientOptions::default()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &SecretString {
        &self.password
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    pub fn tls(&self) -> bool {
        self.tls
    }

    pub fn strict_tls(&self) -> bool {
        self.strict_tls
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// `<scheme>://<host>:<port>` with no trailing slash.
    pub fn base_url(&self) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }

    /// Site-scoped WebSocket event endpoint.
    pub fn events_url(&self) -> String {
        let scheme = if self.tls { "wss" } else { "ws" };
        format!(
            "{scheme}://{}:{}/wss/s/{}/events",
            self.host, self.port, self.site
        )
    }
}
