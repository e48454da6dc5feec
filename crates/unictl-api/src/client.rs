// Controller HTTP client and request pipeline
//
// Wraps `reqwest::Client` with session credential handling, site-scoped
// URL construction and envelope unwrapping. Endpoint groups (devices,
// clients, ...) are inherent methods in `endpoints/`, auth lives in
// `auth.rs` and the WebSocket stream in `events.rs`; this module keeps
// to the call path every one of them goes through.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::Error;
use crate::events::EventStream;
use crate::models::{Envelope, Meta};
use crate::notify::{Notification, Notifier};
use crate::session::{CSRF_HEADER, SessionState};
use crate::transport::TransportConfig;

/// Outcome of the most recent login attempt, guarded by the login gate.
#[derive(Debug, Default)]
pub(crate) struct LoginGate {
    pub(crate) last_failure: Option<String>,
}

/// Async client for one controller site.
///
/// Cheaply cloneable; clones share the session, the notification channel
/// and the event stream. Every domain operation funnels through the
/// request pipeline, which logs in lazily when the session is not
/// authenticated.
#[derive(Clone)]
pub struct UnifiClient {
    pub(crate) inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    pub(crate) config: ClientConfig,
    pub(crate) transport: TransportConfig,
    pub(crate) http: reqwest::Client,
    pub(crate) base_url: String,
    session: Mutex<SessionState>,
    /// Serializes logins so concurrent first calls share one attempt.
    pub(crate) login_gate: tokio::sync::Mutex<LoginGate>,
    /// Bumped after every finished login attempt.
    pub(crate) login_generation: AtomicU64,
    pub(crate) notifier: Notifier,
    pub(crate) events: Arc<EventStream>,
}

impl UnifiClient {
    /// Build a client. Does not touch the network.
    ///
    /// Fails with [`Error::InvalidUrl`] if the host does not form a URL.
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        let transport = TransportConfig::from_client_config(&config);
        let http = transport.build_client()?;
        let base_url = config.base_url();
        // Rejects hosts that cannot form a URL (spaces, stray scheme, ...).
        url::Url::parse(&base_url)?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                transport,
                http,
                base_url,
                session: Mutex::new(SessionState::default()),
                login_gate: tokio::sync::Mutex::new(LoginGate::default()),
                login_generation: AtomicU64::new(0),
                notifier: Notifier::new(),
                events: Arc::new(EventStream::new()),
            }),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// `<scheme>://<host>:<port>`
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// The configured site identifier.
    pub fn site(&self) -> &str {
        self.inner.config.site()
    }

    /// Snapshot of the current session.
    pub fn session(&self) -> SessionState {
        self.with_session(|s| s.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.with_session(|s| s.is_authenticated())
    }

    /// Subscribe to client notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.inner.notifier.subscribe()
    }

    pub(crate) fn with_session<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut guard = self
            .inner
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Controller-level path: `{base}/api/{path}`
    pub(crate) fn api_url(&self, path: &str) -> String {
        format!("{}/api/{path}", self.inner.base_url)
    }

    /// Site-scoped path: `{base}/api/s/{site}/{path}`
    pub(crate) fn site_url(&self, path: &str) -> String {
        format!(
            "{}/api/s/{}/{path}",
            self.inner.base_url,
            self.inner.config.site()
        )
    }

    /// Site-scoped path ending in a caller-supplied identifier:
    /// `{base}/api/s/{site}/{path}/{segment}`, with `segment`
    /// percent-encoded so `/`, `?` or `#` stay inside it.
    pub(crate) fn site_url_with(&self, path: &str, segment: &str) -> Result<String, Error> {
        let mut url = url::Url::parse(&self.site_url(path))?;
        url.path_segments_mut()
            .map_err(|()| Error::Config {
                field: "host",
                reason: "does not form a hierarchical URL".into(),
            })?
            .push(segment);
        Ok(url.into())
    }

    // ── Request pipeline ─────────────────────────────────────────────

    pub(crate) async fn get<T: DeserializeOwned>(&self, url: String) -> Result<T, Error> {
        self.call(Method::GET, url, None::<&Value>).await
    }

    pub(crate) async fn post<T: DeserializeOwned>(
        &self,
        url: String,
        body: &(impl Serialize + Sync + ?Sized),
    ) -> Result<T, Error> {
        self.call(Method::POST, url, Some(body)).await
    }

    pub(crate) async fn put<T: DeserializeOwned>(
        &self,
        url: String,
        body: &(impl Serialize + Sync + ?Sized),
    ) -> Result<T, Error> {
        self.call(Method::PUT, url, Some(body)).await
    }

    pub(crate) async fn delete<T: DeserializeOwned>(&self, url: String) -> Result<T, Error> {
        self.call(Method::DELETE, url, None::<&Value>).await
    }

    /// Issue an authenticated call and unwrap the response envelope.
    ///
    /// Logs in first if needed, attaches the session credentials, and
    /// returns `data` deserialized as `T` (or the whole body when the
    /// envelope has no `data`).
    pub(crate) async fn call<T, B>(
        &self,
        method: Method,
        url: String,
        body: Option<&B>,
    ) -> Result<T, Error>
    where
        T: DeserializeOwned,
        B: Serialize + Sync + ?Sized,
    {
        self.ensure_authenticated().await?;

        debug!("{method} {url}");
        let mut builder = self.inner.http.request(method, &url);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let resp = self.send(builder).await?;
        let payload = self.unwrap_response(resp).await?;

        serde_json::from_value(payload.clone()).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: payload.to_string(),
        })
    }

    /// Attach session credentials, send, and capture whatever credentials
    /// the response sets.
    pub(crate) async fn send(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, Error> {
        let (cookies, csrf) = self.with_session(|s| {
            (
                s.cookies().map(str::to_owned),
                s.csrf_token().map(str::to_owned),
            )
        });

        let mut builder = builder;
        if let Some(cookies) = cookies {
            builder = builder.header(reqwest::header::COOKIE, cookies);
        }
        if let Some(token) = csrf {
            builder = builder.header(CSRF_HEADER, token);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| self.inner.transport.classify(e, &self.inner.base_url))?;

        self.with_session(|s| {
            s.capture_cookies(resp.headers());
            s.capture_rotated_csrf(resp.headers());
        });

        Ok(resp)
    }

    /// Classify the HTTP status and open the `{ meta, data }` envelope.
    async fn unwrap_response(&self, resp: reqwest::Response) -> Result<Value, Error> {
        let status = resp.status();

        if status == StatusCode::UNAUTHORIZED {
            self.invalidate_session();
            return Err(Error::Authentication {
                message: "session expired or invalid credentials".into(),
            });
        }

        let body = resp
            .text()
            .await
            .map_err(|e| self.inner.transport.classify(e, &self.inner.base_url))?;

        if !status.is_success() {
            // Controllers often explain 4xx answers in a regular envelope.
            if let Ok(Envelope {
                meta: Some(meta), ..
            }) = serde_json::from_str::<Envelope>(&body)
            {
                if !meta.is_ok() {
                    return Err(meta.into_error());
                }
            }
            return Err(Error::Http {
                status: status.as_u16(),
                message: preview(&body).to_owned(),
            });
        }

        let value: Value = serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: format!("{e} (body preview: {:?})", preview(&body)),
            body: body.clone(),
        })?;

        open_envelope(value)
    }

    /// Drop the session after the controller rejected it.
    pub(crate) fn invalidate_session(&self) {
        debug!("session rejected by controller, clearing credentials");
        self.with_session(SessionState::clear);
    }

    /// Next login generation, recorded after each finished attempt.
    pub(crate) fn bump_login_generation(&self) {
        self.inner.login_generation.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn login_generation(&self) -> u64 {
        self.inner.login_generation.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for UnifiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnifiClient")
            .field("base_url", &self.inner.base_url)
            .field("site", &self.inner.config.site())
            .field("authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}

/// Return `data` from a successful envelope, or the whole envelope when
/// the endpoint has no `data` section.
///
/// Any `meta.rc` other than `"ok"` -- including a missing `meta` -- is an
/// application failure regardless of the HTTP status.
pub(crate) fn open_envelope(value: Value) -> Result<Value, Error> {
    let Value::Object(mut map) = value else {
        return Err(Error::Api {
            message: "response is not an envelope".into(),
        });
    };

    let meta = map
        .get("meta")
        .and_then(|m| serde_json::from_value::<Meta>(m.clone()).ok());

    match meta {
        Some(meta) if meta.is_ok() => {}
        Some(meta) => return Err(meta.into_error()),
        None => {
            return Err(Error::Api {
                message: "response has no meta section".into(),
            });
        }
    }

    match map.remove("data") {
        Some(data) => Ok(data),
        None => Ok(Value::Object(map)),
    }
}

/// Linear scan for a record whose identifier matches, ignoring ASCII case.
pub(crate) fn find_by<T>(
    items: Vec<T>,
    entity: &'static str,
    identifier: &str,
    key: impl Fn(&T) -> &str,
) -> Result<T, Error> {
    items
        .into_iter()
        .find(|item| key(item).eq_ignore_ascii_case(identifier))
        .ok_or_else(|| Error::NotFound {
            entity,
            identifier: identifier.to_owned(),
        })
}

fn preview(body: &str) -> &str {
    let mut end = body.len().min(200);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn envelope_returns_data_section() {
        let data = open_envelope(json!({"meta": {"rc": "ok"}, "data": [{"a": 1}]})).unwrap();
        assert_eq!(data, json!([{"a": 1}]));
    }

    #[test]
    fn envelope_without_data_returns_whole_body() {
        let body = json!({"meta": {"rc": "ok"}, "version": "8.0.24"});
        assert_eq!(open_envelope(body.clone()).unwrap(), body);
    }

    #[test]
    fn non_ok_rc_is_api_error_with_message() {
        let err = open_envelope(json!({"meta": {"rc": "error", "msg": "api.err.NoSiteContext"}}))
            .unwrap_err();
        match err {
            Error::Api { message } => assert_eq!(message, "api.err.NoSiteContext"),
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn non_ok_rc_without_message_uses_fallback() {
        let err = open_envelope(json!({"meta": {"rc": "error"}})).unwrap_err();
        assert_eq!(err.to_string(), "Controller API error: rc=error");
    }

    #[test]
    fn missing_meta_is_failure() {
        assert!(matches!(
            open_envelope(json!({"data": []})),
            Err(Error::Api { .. })
        ));
        assert!(matches!(open_envelope(json!([1, 2])), Err(Error::Api { .. })));
    }

    #[test]
    fn lookup_ignores_case() {
        let items = vec!["aa:bb:cc:00:11:22".to_owned(), "de:ad:be:ef:00:01".to_owned()];
        let found = find_by(items.clone(), "device", "DE:AD:BE:EF:00:01", String::as_str).unwrap();
        assert_eq!(found, "de:ad:be:ef:00:01");

        let err = find_by(items, "device", "ff:ff:ff:ff:ff:ff", String::as_str).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn preview_respects_char_boundaries() {
        let body = "é".repeat(150);
        assert!(preview(&body).len() <= 200);
    }

    #[test]
    fn urls_are_site_scoped() {
        let config = ClientConfig::builder()
            .host("ctrl.local")
            .username("u")
            .password("p".to_owned())
            .site("lab")
            .build()
            .unwrap();
        let client = UnifiClient::new(config).unwrap();
        assert_eq!(client.api_url("self"), "https://ctrl.local:8443/api/self");
        assert_eq!(
            client.site_url("stat/device"),
            "https://ctrl.local:8443/api/s/lab/stat/device"
        );
    }

    #[test]
    fn identifier_segments_are_encoded() {
        let config = ClientConfig::builder()
            .host("ctrl.local")
            .username("u")
            .password("p".to_owned())
            .build()
            .unwrap();
        let client = UnifiClient::new(config).unwrap();

        assert_eq!(
            client
                .site_url_with("stat/device", "aa:bb:cc:dd:ee:ff")
                .unwrap(),
            "https://ctrl.local:8443/api/s/default/stat/device/aa:bb:cc:dd:ee:ff"
        );
        assert_eq!(
            client
                .site_url_with("rest/networkconf", "../x?y#z")
                .unwrap(),
            "https://ctrl.local:8443/api/s/default/rest/networkconf/..%2Fx%3Fy%23z"
        );
    }
}
