// Session authentication
//
// Cookie-based login/logout against `/api/login` and `/api/logout`.
// The login response sets the session cookies and (usually) a CSRF token;
// both are kept in the client's `SessionState` and attached to every
// later request by the pipeline.

use secrecy::ExposeSecret;
use serde_json::{Value, json};
use tokio::sync::MutexGuard;
use tracing::{debug, info, warn};

use crate::client::{LoginGate, UnifiClient};
use crate::error::Error;
use crate::notify::Notification;
use crate::session::{CSRF_HEADER, SessionState, header_str};

impl UnifiClient {
    /// Log in with the configured username/password.
    ///
    /// On success the session is marked authenticated, the CSRF token is
    /// stored if the controller supplied one, and
    /// [`Notification::Authenticated`] is emitted. On failure the session
    /// is cleared and [`Error::Authentication`] is returned; nothing is
    /// retried.
    pub async fn authenticate(&self) -> Result<(), Error> {
        let gate = self.inner.login_gate.lock().await;
        self.login_locked(gate).await
    }

    /// Log in unless the session is already authenticated.
    ///
    /// Every domain operation calls this first. Concurrent callers queue
    /// on a single login gate: whoever arrives while another login is in
    /// flight reuses that attempt's outcome rather than logging in again.
    pub async fn ensure_authenticated(&self) -> Result<(), Error> {
        if self.is_authenticated() {
            return Ok(());
        }

        let seen = self.login_generation();
        let gate = self.inner.login_gate.lock().await;

        if self.is_authenticated() {
            return Ok(());
        }
        if self.login_generation() != seen {
            if let Some(message) = gate.last_failure.clone() {
                debug!("reusing failed login outcome from concurrent attempt");
                return Err(Error::Authentication { message });
            }
        }

        self.login_locked(gate).await
    }

    async fn login_locked(&self, mut gate: MutexGuard<'_, LoginGate>) -> Result<(), Error> {
        let result = self.login().await;

        gate.last_failure = result.as_ref().err().map(ToString::to_string);
        self.bump_login_generation();

        match &result {
            Ok(()) => self.inner.notifier.emit(Notification::Authenticated),
            Err(e) => {
                warn!(error = %e, "login failed");
                self.with_session(SessionState::clear);
            }
        }
        result
    }

    async fn login(&self) -> Result<(), Error> {
        let url = self.api_url("login");
        debug!("logging in at {url}");

        let config = self.config();
        let body = json!({
            "username": config.username(),
            "password": config.password().expose_secret(),
            "remember": false,
        });

        let resp = self.send(self.inner.http.post(&url).json(&body)).await?;
        let status = resp.status();
        let header_token = header_str(resp.headers(), CSRF_HEADER).map(str::to_owned);

        let text = resp
            .text()
            .await
            .map_err(|e| self.inner.transport.classify(e, self.base_url()))?;
        let payload: Option<Value> = serde_json::from_str(&text).ok();

        let meta = payload.as_ref().and_then(|p| p.get("meta"));
        let rc_ok = meta
            .and_then(|m| m.get("rc"))
            .and_then(Value::as_str)
            .is_some_and(|rc| rc == crate::models::RC_OK);

        if !status.is_success() || !rc_ok {
            let message = meta
                .and_then(|m| m.get("msg"))
                .and_then(Value::as_str)
                .map_or_else(|| format!("login rejected (HTTP {status})"), str::to_owned);
            return Err(Error::Authentication { message });
        }

        let token = payload.as_ref().and_then(csrf_from_payload).or(header_token);

        self.with_session(|s| {
            if let Some(token) = token {
                s.set_csrf_token(token);
            }
            s.mark_authenticated();
        });

        info!(site = self.site(), "login successful");
        Ok(())
    }

    /// End the session.
    ///
    /// Closes the event stream, asks the controller to log out, and always
    /// leaves the session unauthenticated. A failing logout call is logged
    /// and swallowed, so this never fails; the controller may have dropped
    /// the session already. Emits [`Notification::Disconnected`].
    pub async fn end_session(&self) -> Result<(), Error> {
        self.disable_events().await;

        let url = self.api_url("logout");
        debug!("logging out at {url}");

        match self.send(self.inner.http.post(&url)).await {
            Ok(resp) if resp.status().is_success() => debug!("logout complete"),
            Ok(resp) => warn!(status = %resp.status(), "logout rejected (ignored)"),
            Err(e) => warn!(error = %e, "logout failed (ignored)"),
        }

        self.with_session(SessionState::clear);
        self.inner.notifier.emit(Notification::Disconnected);
        Ok(())
    }
}

/// CSRF token from the login payload: `data.csrf_token`, or the first
/// element's when `data` is an array.
fn csrf_from_payload(payload: &Value) -> Option<String> {
    let data = payload.get("data")?;
    let record = match data {
        Value::Array(items) => items.first()?,
        other => other,
    };
    record
        .get("csrf_token")
        .or_else(|| record.get("csrfToken"))
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
}
