//! Local HTTP callback server for the authorization code flow
//!
//! Binds the loopback address named by the redirect URI, serves exactly the
//! redirect path and hands the first callback carrying the expected `state`
//! back to the waiting flow.

use super::types::{codes, ProviderError, ProviderResult};
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Authorization response delivered to the redirect URI
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CallbackData {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

struct CallbackState {
    sender: Mutex<Option<mpsc::Sender<CallbackData>>>,
    expected_state: String,
}

/// Loopback listener configuration derived from a redirect URI
#[derive(Debug, Clone)]
pub struct CallbackServer {
    addr: SocketAddr,
    path: String,
    timeout: Duration,
}

impl CallbackServer {
    pub fn new(addr: SocketAddr, path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr,
            path: path.into(),
            timeout,
        }
    }

    /// Listen on the host, port and path of an `http://localhost:<port>/...` URI
    pub fn from_redirect_uri(redirect_uri: &str, timeout: Duration) -> ProviderResult<Self> {
        let url = url::Url::parse(redirect_uri)
            .map_err(|e| ProviderError::client("invalid_redirect_uri", e.to_string()))?;

        let host = url.host_str().unwrap_or_default();
        let ip = match host {
            "localhost" | "127.0.0.1" => [127, 0, 0, 1],
            _ => {
                return Err(ProviderError::client(
                    "invalid_redirect_uri",
                    format!("redirect host '{}' is not a loopback address", host),
                ))
            }
        };

        let port = url.port_or_known_default().ok_or_else(|| {
            ProviderError::client("invalid_redirect_uri", "redirect URI has no port")
        })?;

        let path = match url.path() {
            "" => "/".to_string(),
            path => path.to_string(),
        };

        Ok(Self::new(SocketAddr::from((ip, port)), path, timeout))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Bind the listener and start serving in the background
    ///
    /// Binding happens before the browser is opened so a busy port fails
    /// fast instead of after the user has signed in.
    pub async fn start(&self, expected_state: &str) -> ProviderResult<PendingCallback> {
        let (tx, rx) = mpsc::channel(1);

        let state = Arc::new(CallbackState {
            sender: Mutex::new(Some(tx)),
            expected_state: expected_state.to_string(),
        });

        let app = Router::new()
            .route(&self.path, get(handle_callback))
            .with_state(state);

        let listener = TcpListener::bind(&self.addr).await.map_err(|e| {
            ProviderError::client(
                "callback_server",
                format!("Failed to bind to {}: {}", self.addr, e),
            )
        })?;
        let local_addr = listener.local_addr().map_err(|e| {
            ProviderError::client("callback_server", format!("No local address: {}", e))
        })?;

        info!(
            target: "signet_sdk::provider",
            "OAuth callback server listening on http://{}{}", local_addr, self.path
        );

        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                debug!(target: "signet_sdk::provider", "Callback server stopped: {}", e);
            }
        });

        Ok(PendingCallback {
            receiver: rx,
            server,
            timeout: self.timeout,
            local_addr,
        })
    }
}

/// A started callback server waiting for the browser to return
pub struct PendingCallback {
    receiver: mpsc::Receiver<CallbackData>,
    server: JoinHandle<()>,
    timeout: Duration,
    local_addr: SocketAddr,
}

impl PendingCallback {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the callback, the timeout or cancellation, whichever comes
    /// first. The server is shut down on every path.
    pub async fn wait(mut self, cancel: CancellationToken) -> ProviderResult<CallbackData> {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProviderError::client(
                codes::AUTHENTICATION_CANCELED,
                "sign-in cancelled while waiting for the browser",
            )),
            received = self.receiver.recv() => received.ok_or_else(|| {
                ProviderError::client("callback_server", "callback channel closed unexpectedly")
            }),
            _ = tokio::time::sleep(self.timeout) => Err(ProviderError::client(
                codes::AUTHENTICATION_TIMEOUT,
                format!("no authorization response within {}s", self.timeout.as_secs()),
            )),
        };

        self.server.abort();
        result
    }
}

impl Drop for PendingCallback {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn handle_callback(
    Query(params): Query<CallbackData>,
    State(state): State<Arc<CallbackState>>,
) -> impl IntoResponse {
    if params.state.as_deref() != Some(state.expected_state.as_str()) {
        // Stray or forged request; keep waiting for the real one
        debug!(target: "signet_sdk::provider", "Ignoring callback with mismatched state");
        return page(
            StatusCode::BAD_REQUEST,
            error_page("The sign-in response did not match this request."),
        );
    }

    let html = match (&params.error, &params.code) {
        (Some(error), _) => {
            error_page(params.error_description.as_deref().unwrap_or(error.as_str()))
        }
        (None, Some(_)) => success_page(),
        (None, None) => error_page("Missing authorization code"),
    };

    if let Some(sender) = state.sender.lock().await.take() {
        let _ = sender.send(params).await;
    }

    page(StatusCode::OK, html)
}

fn page(status: StatusCode, html: String) -> impl IntoResponse {
    (
        status,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        Html(html),
    )
}

fn success_page() -> String {
    r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Signed in</title>
    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
               display: flex; justify-content: center; align-items: center; min-height: 100vh; margin: 0; }
        .container { text-align: center; }
        .icon { font-size: 3rem; color: #16a34a; }
    </style>
</head>
<body>
    <div class="container">
        <div class="icon">&#10003;</div>
        <h1>Signed in</h1>
        <p>You can close this window and return to the application.</p>
    </div>
</body>
</html>
"#
    .to_string()
}

fn error_page(message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Sign-in failed</title>
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
               display: flex; justify-content: center; align-items: center; min-height: 100vh; margin: 0; }}
        .container {{ text-align: center; max-width: 500px; }}
        .details {{ font-family: monospace; background: #fee2e2; padding: 1rem; border-radius: 8px; }}
    </style>
</head>
<body>
    <div class="container">
        <h1>Sign-in failed</h1>
        <div class="details">{}</div>
        <p>Close this window and try again.</p>
    </div>
</body>
</html>
"#,
        escape_html(message)
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_redirect_uri() {
        let server =
            CallbackServer::from_redirect_uri("http://localhost:8400/callback", Duration::from_secs(5))
                .unwrap();
        assert_eq!(server.addr, SocketAddr::from(([127, 0, 0, 1], 8400)));
        assert_eq!(server.path(), "/callback");
    }

    #[test]
    fn test_from_redirect_uri_rejects_remote_host() {
        let err = CallbackServer::from_redirect_uri("http://example.com:8400/cb", Duration::from_secs(5))
            .unwrap_err();
        assert_eq!(err.code(), "invalid_redirect_uri");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html("<b>\"x\" & y</b>"),
            "&lt;b&gt;&quot;x&quot; &amp; y&lt;/b&gt;"
        );
    }

    async fn started(state: &str, timeout: Duration) -> PendingCallback {
        let server = CallbackServer::new(SocketAddr::from(([127, 0, 0, 1], 0)), "/cb", timeout);
        server.start(state).await.unwrap()
    }

    #[tokio::test]
    async fn test_delivers_matching_callback() {
        let pending = started("expected", Duration::from_secs(5)).await;
        let addr = pending.local_addr();

        let client = reqwest::Client::new();
        let stray = client
            .get(format!("http://{}/cb?code=evil&state=other", addr))
            .send()
            .await
            .unwrap();
        assert_eq!(stray.status(), reqwest::StatusCode::BAD_REQUEST);

        let ok = client
            .get(format!("http://{}/cb?code=abc&state=expected", addr))
            .send()
            .await
            .unwrap();
        assert!(ok.status().is_success());

        let data = pending.wait(CancellationToken::new()).await.unwrap();
        assert_eq!(data.code.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_cancel_stops_waiting() {
        let pending = started("expected", Duration::from_secs(30)).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = pending.wait(cancel).await.unwrap_err();
        assert_eq!(err.code(), codes::AUTHENTICATION_CANCELED);
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let pending = started("expected", Duration::from_millis(20)).await;

        let err = pending.wait(CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.code(), codes::AUTHENTICATION_TIMEOUT);
    }
}
