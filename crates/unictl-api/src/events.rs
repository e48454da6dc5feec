//! WebSocket event stream.
//!
//! One persistent connection per client to the site-scoped
//! `/wss/s/{site}/events` endpoint, authenticated with the session cookie.
//! Inbound frames are routed by their `meta.message` tag into typed
//! [`Notification`]s, and every routed frame is also published verbatim as
//! [`Notification::RawEvent`].
//!
//! The stream never reconnects on its own; callers drive it with
//! [`UnifiClient::enable_events`] and [`UnifiClient::disable_events`].
//!
//! # Example
//!
//! ```rust,ignore
//! let mut rx = client.subscribe();
//! client.enable_events().await?;
//!
//! while let Ok(n) = rx.recv().await {
//!     if let Notification::ClientConnected(data) = n {
//!         println!("joined: {}", data["mac"]);
//!     }
//! }
//!
//! client.disable_events().await;
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::StreamExt;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::client::UnifiClient;
use crate::error::Error;
use crate::notify::{Notification, Notifier};

// ── StreamState ──────────────────────────────────────────────────────

/// Lifecycle of the event connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Disconnected,
    Connecting,
    Connected,
}

// ── EventStream ──────────────────────────────────────────────────────

/// Owned by the client; shared with the reader task so it can release
/// its own slot when the socket closes.
pub(crate) struct EventStream {
    state: watch::Sender<StreamState>,
    slot: Mutex<Option<StreamHandle>>,
    next_id: AtomicU64,
}

struct StreamHandle {
    id: u64,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl EventStream {
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(StreamState::Disconnected);
        Self {
            state,
            slot: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Called by a reader task on exit. Only the connection that still
    /// owns the slot clears it.
    async fn release(&self, id: u64) {
        let mut slot = self.slot.lock().await;
        match slot.as_ref().map(|h| h.id) {
            Some(current) if current == id => {
                slot.take();
                self.state.send_replace(StreamState::Disconnected);
            }
            Some(_) => {}
            None => {
                self.state.send_replace(StreamState::Disconnected);
            }
        }
    }
}

impl UnifiClient {
    /// Current event stream state.
    pub fn events_state(&self) -> StreamState {
        *self.inner.events.state.borrow()
    }

    /// Watch event stream state transitions.
    pub fn watch_events_state(&self) -> watch::Receiver<StreamState> {
        self.inner.events.state.subscribe()
    }

    /// Open the event stream.
    ///
    /// Returns immediately if a connection is already open. Otherwise
    /// logs in if needed, connects with the session cookie, and returns
    /// once the WebSocket handshake has completed. A failed handshake is
    /// both returned and emitted as [`Notification::Error`].
    pub async fn enable_events(&self) -> Result<(), Error> {
        let events = Arc::clone(&self.inner.events);
        let mut slot = events.slot.lock().await;
        if slot.is_some() {
            trace!("event stream already open");
            return Ok(());
        }

        self.ensure_authenticated().await?;

        events.state.send_replace(StreamState::Connecting);
        let url = self.config().events_url();
        info!(url = %url, "connecting event stream");

        let ws = match self.open_socket(&url).await {
            Ok(ws) => ws,
            Err(reason) => {
                events.state.send_replace(StreamState::Disconnected);
                warn!(error = %reason, "event stream handshake failed");
                self.inner
                    .notifier
                    .emit_error(Error::WebSocketConnect(reason.clone()));
                return Err(Error::WebSocketConnect(reason));
            }
        };

        events.state.send_replace(StreamState::Connected);
        self.inner.notifier.emit(Notification::EventsConnected);
        info!("event stream connected");

        let id = events.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(read_loop(
            ws,
            Arc::clone(&events),
            self.inner.notifier.clone(),
            id,
            cancel.clone(),
        ));
        *slot = Some(StreamHandle { id, cancel, task });

        Ok(())
    }

    /// Close the event stream if open. Idempotent.
    ///
    /// Sends a close frame and waits for the reader task to finish, so
    /// [`Notification::EventsDisconnected`] has been emitted on return.
    pub async fn disable_events(&self) {
        let handle = self.inner.events.slot.lock().await.take();
        let Some(handle) = handle else {
            return;
        };

        debug!("closing event stream");
        handle.cancel.cancel();
        if let Err(e) = handle.task.await {
            warn!(error = %e, "event reader task ended abnormally");
        }
        self.inner
            .events
            .state
            .send_replace(StreamState::Disconnected);
    }

    async fn open_socket(
        &self,
        url: &str,
    ) -> Result<WebSocketStream<MaybeTlsStream<TcpStream>>, String> {
        let uri: tungstenite::http::Uri = url
            .parse()
            .map_err(|e: tungstenite::http::uri::InvalidUri| e.to_string())?;

        let mut request = ClientRequestBuilder::new(uri);
        if let Some(cookies) = self.session().cookies() {
            request = request.with_header("Cookie", cookies);
        }

        let connector = self
            .inner
            .transport
            .ws_connector()
            .map_err(|e| e.to_string())?;
        let (ws, _response) =
            tokio_tungstenite::connect_async_tls_with_config(request, None, false, connector)
                .await
                .map_err(|e| e.to_string())?;
        Ok(ws)
    }
}

// ── Reader task ──────────────────────────────────────────────────────

async fn read_loop<S>(
    mut ws: WebSocketStream<S>,
    events: Arc<EventStream>,
    notifier: Notifier,
    id: u64,
    cancel: CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                if let Err(e) = ws.close(None).await {
                    debug!(error = %e, "close handshake failed");
                }
                break;
            }
            frame = ws.next() => match frame {
                Some(Ok(tungstenite::Message::Text(text))) => {
                    dispatch_frame(text.as_str(), &notifier);
                }
                Some(Ok(tungstenite::Message::Ping(_))) => {
                    // tungstenite queues the pong itself
                    trace!("event stream ping");
                }
                Some(Ok(tungstenite::Message::Close(frame))) => {
                    match frame {
                        Some(cf) => info!(
                            code = u16::from(cf.code),
                            reason = cf.reason.as_str(),
                            "event stream closed by controller"
                        ),
                        None => info!("event stream closed by controller"),
                    }
                    break;
                }
                Some(Ok(tungstenite::Message::Binary(bytes))) => {
                    trace!(len = bytes.len(), "ignoring binary event frame");
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "event stream read failed");
                    notifier.emit_error(Error::WebSocketConnect(e.to_string()));
                    break;
                }
                None => {
                    info!("event stream ended");
                    break;
                }
            }
        }
    }

    events.release(id).await;
    notifier.emit(Notification::EventsDisconnected);
}

// ── Frame routing ────────────────────────────────────────────────────

/// Parse one text frame and publish its notifications.
///
/// Invalid JSON is reported as an [`Error::EventParse`] notification;
/// the stream keeps running either way.
pub(crate) fn dispatch_frame(text: &str, notifier: &Notifier) {
    match serde_json::from_str::<Value>(text) {
        Ok(envelope) => route_envelope(envelope, notifier),
        Err(e) => {
            debug!(error = %e, "malformed event frame");
            notifier.emit_error(Error::EventParse {
                message: e.to_string(),
            });
        }
    }
}

/// Route a parsed envelope by its `meta.message` tag.
///
/// Envelopes without a readable tag are dropped without any notification.
pub(crate) fn route_envelope(envelope: Value, notifier: &Notifier) {
    let Some(tag) = envelope
        .get("meta")
        .and_then(|meta| meta.get("message"))
        .and_then(Value::as_str)
    else {
        trace!("dropping event frame without a tag");
        return;
    };

    let tag = tag.to_owned();
    let data = envelope.get("data").cloned().unwrap_or(Value::Null);

    let notification = match tag.as_str() {
        "station-connect" => Notification::ClientConnected(data),
        "station-disconnect" => Notification::ClientDisconnected(data),
        "ap-detected" => Notification::DeviceDetected(data),
        "ap-lost" => Notification::DeviceLost(data),
        _ => Notification::Event { tag, data },
    };

    notifier.emit(notification);
    notifier.emit(Notification::RawEvent(envelope));
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio::sync::broadcast;
    use tokio::sync::broadcast::error::TryRecvError;
    use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};

    use super::*;
    use crate::config::ClientConfig;

    fn drain(rx: &mut broadcast::Receiver<Notification>) -> Vec<Notification> {
        let mut out = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(n) => out.push(n),
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
                Err(TryRecvError::Lagged(_)) => {}
            }
        }
        out
    }

    #[test]
    fn station_connect_emits_typed_and_raw() {
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();

        let frame = json!({"meta": {"message": "station-connect"}, "data": {"mac": "AA"}});
        dispatch_frame(&frame.to_string(), &notifier);

        let got = drain(&mut rx);
        assert_eq!(got.len(), 2);
        match &got[0] {
            Notification::ClientConnected(data) => assert_eq!(data, &json!({"mac": "AA"})),
            other => panic!("expected client.connected, got {other:?}"),
        }
        match &got[1] {
            Notification::RawEvent(raw) => assert_eq!(raw, &frame),
            other => panic!("expected raw_event, got {other:?}"),
        }
    }

    #[test]
    fn named_tags_map_to_named_notifications() {
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();

        for (tag, expected) in [
            ("station-disconnect", "client.disconnected"),
            ("ap-detected", "device.detected"),
            ("ap-lost", "device.lost"),
        ] {
            route_envelope(json!({"meta": {"message": tag}, "data": {}}), &notifier);
            let names: Vec<_> = drain(&mut rx).iter().map(Notification::name).collect();
            assert_eq!(names, vec![expected, "raw_event"]);
        }
    }

    #[test]
    fn unknown_tag_emits_generic_event() {
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();

        route_envelope(
            json!({"meta": {"message": "custom:event"}, "data": [{"x": 1}]}),
            &notifier,
        );

        let got = drain(&mut rx);
        assert_eq!(got.len(), 2);
        match &got[0] {
            Notification::Event { tag, data } => {
                assert_eq!(tag, "custom:event");
                assert_eq!(data, &json!([{"x": 1}]));
            }
            other => panic!("expected event, got {other:?}"),
        }
        assert_eq!(got[1].name(), "raw_event");
    }

    #[test]
    fn untagged_frames_are_dropped() {
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();

        for frame in ["null", "{}", r#"{"meta":null}"#, r#"{"meta":{}}"#, r#"{"data":"x"}"#] {
            dispatch_frame(frame, &notifier);
        }
        route_envelope(json!({"meta": {"message": 42}}), &notifier);

        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn invalid_json_emits_parse_error() {
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();

        dispatch_frame("{not json", &notifier);

        let got = drain(&mut rx);
        assert_eq!(got.len(), 1);
        match &got[0] {
            Notification::Error(err) => {
                assert_eq!(err.kind(), crate::error::ErrorKind::EventParse);
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    // ── Live socket tests ───────────────────────────────────────────

    struct TestServer {
        port: u16,
        accepted: Arc<AtomicUsize>,
        cookies: Arc<std::sync::Mutex<Vec<String>>>,
    }

    /// WebSocket server that pushes `frames` to every client, then keeps
    /// the socket open until the client closes it.
    async fn ws_server(frames: Vec<tungstenite::Message>) -> TestServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accepted = Arc::new(AtomicUsize::new(0));
        let cookies = Arc::new(std::sync::Mutex::new(Vec::new()));

        let server_accepted = Arc::clone(&accepted);
        let server_cookies = Arc::clone(&cookies);
        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                server_accepted.fetch_add(1, Ordering::SeqCst);
                let cookies = Arc::clone(&server_cookies);
                let frames = frames.clone();
                tokio::spawn(async move {
                    let callback = |req: &Request, resp: Response| {
                        if let Some(c) = req.headers().get("cookie") {
                            cookies
                                .lock()
                                .unwrap()
                                .push(c.to_str().unwrap().to_owned());
                        }
                        Ok(resp)
                    };
                    let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(tcp, callback).await
                    else {
                        return;
                    };
                    for f in frames {
                        let _ = futures_util::SinkExt::send(&mut ws, f).await;
                    }
                    while let Some(Ok(_)) = ws.next().await {}
                });
            }
        });

        TestServer {
            port,
            accepted,
            cookies,
        }
    }

    /// WebSocket server that closes the first connection right after the
    /// handshake and keeps later ones open.
    async fn closing_ws_server() -> TestServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accepted = Arc::new(AtomicUsize::new(0));

        let server_accepted = Arc::clone(&accepted);
        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                let nth = server_accepted.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let Ok(mut ws) = tokio_tungstenite::accept_async(tcp).await else {
                        return;
                    };
                    if nth == 0 {
                        let _ = ws.close(None).await;
                    }
                    while let Some(Ok(_)) = ws.next().await {}
                });
            }
        });

        TestServer {
            port,
            accepted,
            cookies: Arc::default(),
        }
    }

    fn client_for(port: u16) -> UnifiClient {
        let config = ClientConfig::builder()
            .host("127.0.0.1")
            .port(port)
            .username("admin")
            .password("pw".to_owned())
            .tls(false)
            .build()
            .unwrap();
        let client = UnifiClient::new(config).unwrap();
        client.with_session(|s| s.mark_authenticated());
        client
    }

    async fn next_named(rx: &mut broadcast::Receiver<Notification>, name: &str) -> Notification {
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            loop {
                let n = rx.recv().await.unwrap();
                if n.name() == name {
                    return n;
                }
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn enable_twice_opens_one_connection() {
        let server = ws_server(Vec::new()).await;
        let client = client_for(server.port);
        let mut rx = client.subscribe();

        client.enable_events().await.unwrap();
        assert_eq!(client.events_state(), StreamState::Connected);
        client.enable_events().await.unwrap();

        next_named(&mut rx, "events.connected").await;
        assert_eq!(server.accepted.load(Ordering::SeqCst), 1);

        client.disable_events().await;
        assert_eq!(client.events_state(), StreamState::Disconnected);
        next_named(&mut rx, "events.disconnected").await;

        // Idempotent.
        client.disable_events().await;
        assert_eq!(server.accepted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn frames_are_routed_and_cookie_presented() {
        let frames = vec![
            tungstenite::Message::text("garbage".to_owned()),
            tungstenite::Message::binary(br#"{"meta":{"message":"ap-detected"}}"#.to_vec()),
            tungstenite::Message::text(
                json!({"meta": {"message": "ap-lost"}, "data": {"mac": "BB"}}).to_string(),
            ),
        ];
        let server = ws_server(frames).await;
        let client = client_for(server.port);
        client.with_session(|s| {
            let mut headers = reqwest::header::HeaderMap::new();
            headers.insert(
                reqwest::header::SET_COOKIE,
                reqwest::header::HeaderValue::from_static("unifises=tok; Path=/"),
            );
            s.capture_cookies(&headers);
        });
        let mut rx = client.subscribe();

        client.enable_events().await.unwrap();

        next_named(&mut rx, "error").await;
        // The binary frame in between is skipped without a notification.
        let next = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match next {
            Notification::DeviceLost(data) => assert_eq!(data, json!({"mac": "BB"})),
            other => panic!("expected device.lost, got {other:?}"),
        }
        assert_eq!(
            server.cookies.lock().unwrap().as_slice(),
            ["unifises=tok".to_owned()]
        );

        client.disable_events().await;
    }

    #[tokio::test]
    async fn end_session_closes_stream_first() {
        let server = ws_server(Vec::new()).await;
        let client = client_for(server.port);

        client.enable_events().await.unwrap();
        let mut rx = client.subscribe();

        // The test server cannot answer the logout POST; that failure is swallowed.
        client.end_session().await.unwrap();

        assert_eq!(client.events_state(), StreamState::Disconnected);
        assert!(!client.is_authenticated());
        let names: Vec<_> = drain(&mut rx).iter().map(Notification::name).collect();
        assert_eq!(names, vec!["events.disconnected", "disconnected"]);
    }

    #[tokio::test]
    async fn controller_close_releases_stream() {
        let server = closing_ws_server().await;
        let client = client_for(server.port);
        let mut rx = client.subscribe();
        let mut state = client.watch_events_state();

        client.enable_events().await.unwrap();
        next_named(&mut rx, "events.disconnected").await;

        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            state.wait_for(|s| *s == StreamState::Disconnected),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(client.events_state(), StreamState::Disconnected);

        // No automatic reconnect; a fresh enable opens a new socket.
        assert_eq!(server.accepted.load(Ordering::SeqCst), 1);
        client.enable_events().await.unwrap();
        assert_eq!(client.events_state(), StreamState::Connected);
        assert_eq!(server.accepted.load(Ordering::SeqCst), 2);

        client.disable_events().await;
    }

    #[tokio::test]
    async fn refused_handshake_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = client_for(port);
        let mut rx = client.subscribe();

        let err = client.enable_events().await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::WebSocket);
        assert_eq!(client.events_state(), StreamState::Disconnected);
        assert_eq!(drain(&mut rx).first().map(Notification::name), Some("error"));
    }
}
