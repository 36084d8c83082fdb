//! Live-reload channel: a local reflecting proxy plus broadcast push.
//!
//! The proxy fronts the configured upstream origin and injects a small client
//! script into served HTML pages. Connected browsers hold an SSE stream
//! (`/__forge/events`) fed from a broadcast channel; `notify` pushes a
//! [`ReloadMessage`] to every attached client, best-effort, with no
//! acknowledgment and no ordering guarantee across clients.
//!
//! The server runs on its own thread and runtime, so pipeline work never
//! blocks reload delivery. Whether a change becomes a style injection or a
//! full reload is decided by the calling task, never inferred here.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::Router;
use futures::stream::Stream;
use serde::Serialize;
use std::convert::Infallible;
use std::net::TcpListener as StdTcpListener;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// What the browser should do with an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReloadKind {
    /// Reload the whole page
    FullReload,
    /// Re-fetch stylesheets without a page reload
    StyleInject,
}

/// A push message to connected browsers.
#[derive(Debug, Clone, Serialize)]
pub struct ReloadMessage {
    /// Update kind, chosen by the task that produced the change
    pub kind: ReloadKind,
    /// Changed asset paths
    pub paths: Vec<String>,
}

impl ReloadMessage {
    /// Full page reload for the given paths.
    pub fn full_reload(paths: Vec<String>) -> Self {
        Self { kind: ReloadKind::FullReload, paths }
    }

    /// Stylesheet injection for the given paths.
    pub fn style_inject(paths: Vec<String>) -> Self {
        Self { kind: ReloadKind::StyleInject, paths }
    }
}

/// Proxy/server settings.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// Upstream origin the proxy reflects, e.g. `http://localhost:8080`
    pub proxy: String,
    /// Host to bind
    pub host: String,
    /// Port to bind
    pub port: u16,
    /// Launch a browser after binding
    pub open: bool,
}

/// Error starting the live-reload server.
#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    /// Could not bind the listen address
    #[error("failed to bind live-reload listener: {0}")]
    Bind(#[source] std::io::Error),
    /// Could not spawn the server thread
    #[error("failed to spawn live-reload server: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Broadcast channel handle; cheap to clone into task closures.
#[derive(Debug, Clone)]
pub struct LiveReloadChannel {
    tx: broadcast::Sender<ReloadMessage>,
}

impl Default for LiveReloadChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveReloadChannel {
    /// Create a channel with no attached clients.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    /// Broadcast a message to all attached clients. Best-effort: having no
    /// clients is not an error, and a lagging client just misses messages.
    pub fn notify(&self, message: ReloadMessage) {
        let _ = self.tx.send(message);
    }

    /// Number of currently attached receivers.
    pub fn client_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Subscribe to the broadcast stream.
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadMessage> {
        self.tx.subscribe()
    }

    /// Start the reflecting proxy on `host:port` in front of the upstream.
    ///
    /// Binds synchronously so address errors surface here, then serves from a
    /// dedicated thread with its own runtime.
    pub fn start(&self, options: &ServeOptions) -> Result<(), ReloadError> {
        let listener = StdTcpListener::bind((options.host.as_str(), options.port))
            .map_err(ReloadError::Bind)?;
        listener.set_nonblocking(true).map_err(ReloadError::Bind)?;
        let addr = listener.local_addr().map_err(ReloadError::Bind)?;

        let state = Arc::new(ServerState {
            tx: self.tx.clone(),
            upstream: options.proxy.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        });
        let upstream = state.upstream.clone();

        std::thread::Builder::new()
            .name("forge-reload".to_string())
            .spawn(move || serve_blocking(listener, state))
            .map_err(ReloadError::Spawn)?;

        tracing::info!("live-reload proxy on http://{} -> {}", addr, upstream);

        if options.open {
            open_browser(&format!("http://{}:{}", options.host, addr.port()));
        }

        Ok(())
    }
}

struct ServerState {
    tx: broadcast::Sender<ReloadMessage>,
    upstream: String,
    client: reqwest::Client,
}

fn serve_blocking(listener: StdTcpListener, state: Arc<ServerState>) {
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("live-reload runtime failed to start: {}", e);
            return;
        }
    };

    runtime.block_on(async move {
        let listener = match tokio::net::TcpListener::from_std(listener) {
            Ok(l) => l,
            Err(e) => {
                tracing::error!("live-reload listener conversion failed: {}", e);
                return;
            }
        };

        let app = Router::new()
            .route("/__forge/events", get(events_handler))
            .fallback(any(proxy_handler))
            .with_state(state);

        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("live-reload server exited: {}", e);
        }
    });
}

async fn events_handler(
    State(state): State<Arc<ServerState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.tx.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| match msg {
        Ok(msg) => {
            let data = serde_json::to_string(&msg).unwrap_or_default();
            Some(Ok(Event::default().event("reload").data(data)))
        }
        // Lagged receiver: skip the missed messages, keep the stream alive
        Err(_) => None,
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn proxy_handler(
    State(state): State<Arc<ServerState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let path_and_query = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    let url = format!("{}{}", state.upstream, path_and_query);

    let mut headers = headers;
    headers.remove(header::HOST);

    let upstream = state
        .client
        .request(method, &url)
        .headers(headers)
        .body(body.to_vec())
        .send()
        .await;

    let upstream = match upstream {
        Ok(response) => response,
        Err(e) => return bad_gateway(&e),
    };

    let status = upstream.status();
    let content_type = upstream.headers().get(header::CONTENT_TYPE).cloned();
    let bytes = match upstream.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => return bad_gateway(&e),
    };

    let is_html = content_type
        .as_ref()
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("text/html"))
        .unwrap_or(false);
    let payload = if is_html { inject_client(&bytes) } else { bytes.to_vec() };

    let mut builder = Response::builder().status(status);
    if let Some(content_type) = content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    builder
        .body(Body::from(payload))
        .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response())
}

fn bad_gateway(error: &dyn std::fmt::Display) -> Response {
    tracing::debug!("proxy error: {}", error);
    (StatusCode::BAD_GATEWAY, format!("upstream error: {}", error)).into_response()
}

/// The script injected into proxied HTML pages.
const CLIENT_SCRIPT: &str = r#"<script>
(function () {
  var source = new EventSource("/__forge/events");
  source.addEventListener("reload", function (e) {
    var msg = JSON.parse(e.data);
    if (msg.kind === "style-inject") {
      document.querySelectorAll("link[rel=stylesheet]").forEach(function (link) {
        var href = link.getAttribute("href").split("?")[0];
        link.setAttribute("href", href + "?forge=" + Date.now());
      });
    } else {
      window.location.reload();
    }
  });
})();
</script>"#;

/// Insert the client script before `</body>`, or append when absent.
fn inject_client(html: &[u8]) -> Vec<u8> {
    const TAG: &[u8] = b"</body>";
    let mut out = Vec::with_capacity(html.len() + CLIENT_SCRIPT.len());
    match html.windows(TAG.len()).rposition(|w| w.eq_ignore_ascii_case(TAG)) {
        Some(pos) => {
            out.extend_from_slice(&html[..pos]);
            out.extend_from_slice(CLIENT_SCRIPT.as_bytes());
            out.extend_from_slice(&html[pos..]);
        }
        None => {
            out.extend_from_slice(html);
            out.extend_from_slice(CLIENT_SCRIPT.as_bytes());
        }
    }
    out
}

fn open_browser(url: &str) {
    #[cfg(target_os = "macos")]
    let command = "open";
    #[cfg(not(target_os = "macos"))]
    let command = "xdg-open";

    if let Err(e) = std::process::Command::new(command).arg(url).spawn() {
        tracing::debug!("could not open browser: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_without_clients_is_ok() {
        let channel = LiveReloadChannel::new();
        channel.notify(ReloadMessage::full_reload(vec![]));
        assert_eq!(channel.client_count(), 0);
    }

    #[test]
    fn test_notify_reaches_subscriber() {
        let channel = LiveReloadChannel::new();
        let mut rx = channel.subscribe();
        channel.notify(ReloadMessage::style_inject(vec!["style.css".to_string()]));

        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.kind, ReloadKind::StyleInject);
        assert_eq!(msg.paths, vec!["style.css"]);
    }

    #[test]
    fn test_message_serializes_kebab_case() {
        let msg = ReloadMessage::style_inject(vec!["style.css".to_string()]);
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"style-inject\""));

        let msg = ReloadMessage::full_reload(vec![]);
        assert!(serde_json::to_string(&msg).unwrap().contains("\"full-reload\""));
    }

    #[test]
    fn test_inject_before_body_close() {
        let html = b"<html><body><p>hi</p></body></html>";
        let out = String::from_utf8(inject_client(html)).unwrap();
        assert!(out.contains("EventSource"));
        assert!(out.find("EventSource").unwrap() < out.find("</body>").unwrap());
    }

    #[test]
    fn test_inject_appends_when_no_body_tag() {
        let out = String::from_utf8(inject_client(b"plain")).unwrap();
        assert!(out.starts_with("plain"));
        assert!(out.contains("EventSource"));
    }
}
