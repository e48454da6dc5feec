use thiserror::Error;

/// Top-level error type for the `unictl-api` crate.
///
/// Covers every failure mode of the client: configuration, authentication,
/// transport, the `{meta, data}` envelope, identifier lookups, and the
/// WebSocket event stream. Use [`Error::kind`] to branch on the failure
/// class without matching on messages.
#[derive(Debug, Error)]
pub enum Error {
    // ── Configuration ───────────────────────────────────────────────
    /// A required connection setting is missing or invalid.
    #[error("Invalid configuration: {field}: {reason}")]
    Config { field: &'static str, reason: String },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── Authentication ──────────────────────────────────────────────
    /// Login rejected, or the controller answered a call with HTTP 401.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// The controller could not be reached at all (refused, DNS failure).
    #[error("Cannot connect to controller at {target}: {reason}")]
    Connection { target: String, reason: String },

    /// Request timed out.
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Any other HTTP transport error, passed through unmodified.
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// TLS setup error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Non-success HTTP status without a readable envelope.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    // ── Envelope ────────────────────────────────────────────────────
    /// The envelope's `meta.rc` was not `"ok"`.
    #[error("Controller API error: {message}")]
    Api { message: String },

    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── Lookups ─────────────────────────────────────────────────────
    /// No record in the fetched collection matched the identifier.
    #[error("{entity} not found: {identifier}")]
    NotFound {
        entity: &'static str,
        identifier: String,
    },

    // ── Event stream ────────────────────────────────────────────────
    /// An inbound WebSocket frame was not valid JSON.
    #[error("Malformed event frame: {message}")]
    EventParse { message: String },

    /// WebSocket handshake or read failed.
    #[error("WebSocket error: {0}")]
    WebSocketConnect(String),
}

/// Discriminant for [`Error`], stable across message changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Config,
    Authentication,
    Connection,
    Timeout,
    Transport,
    Http,
    Api,
    Deserialization,
    NotFound,
    EventParse,
    WebSocket,
}

impl Error {
    /// The failure class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. } | Self::InvalidUrl(_) => ErrorKind::Config,
            Self::Authentication { .. } => ErrorKind::Authentication,
            Self::Connection { .. } => ErrorKind::Connection,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Transport(_) | Self::Tls(_) => ErrorKind::Transport,
            Self::Http { .. } => ErrorKind::Http,
            Self::Api { .. } => ErrorKind::Api,
            Self::Deserialization { .. } => ErrorKind::Deserialization,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::EventParse { .. } => ErrorKind::EventParse,
            Self::WebSocketConnect(_) => ErrorKind::WebSocket,
        }
    }

    /// Returns `true` if the session is no longer valid and a fresh
    /// login might resolve it.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } | Self::Http { status: 404, .. } => true,
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            _ => false,
        }
    }
}
