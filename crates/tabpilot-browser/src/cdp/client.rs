//! Browser-level CDP connection over one WebSocket.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};

use super::error::CdpError;
use super::protocol::{
    BrowserVersion, CdpEvent, CdpRequest, CdpResponse, TargetInfo, WindowBounds,
};
use super::session::PageSession;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Bound on ordinary protocol calls.
pub(crate) const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, CdpError>>>>>;

/// The shared WebSocket, used by the client and all page sessions.
pub(crate) struct Connection {
    ws_tx: tokio::sync::Mutex<WsSink>,
    request_id: AtomicU64,
    pending: Pending,
}

impl Connection {
    /// Send a command and wait for its response.
    ///
    /// `timeout` of `None` waits until the browser answers or the connection
    /// drops; callers then bound the wait themselves.
    pub(crate) async fn call(
        &self,
        method: &str,
        params: Option<Value>,
        session_id: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<Value, CdpError> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);

        let request = CdpRequest {
            id,
            method: method.to_string(),
            params,
            session_id: session_id.map(|s| s.to_string()),
        };

        let json = serde_json::to_string(&request)?;
        trace!("-> {}", json);

        let waiter = Waiter::register(&self.pending, id);
        {
            let mut ws = self.ws_tx.lock().await;
            ws.send(Message::Text(json.into())).await?;
        }
        waiter.reply(method, timeout).await
    }
}

/// A registered reply slot. The slot is released when the waiter drops,
/// including when the caller abandons the call before the browser answers.
pub(crate) struct Waiter<'a> {
    pending: &'a Pending,
    id: u64,
    rx: oneshot::Receiver<Result<Value, CdpError>>,
}

impl<'a> Waiter<'a> {
    pub(crate) fn register(pending: &'a Pending, id: u64) -> Self {
        let (tx, rx) = oneshot::channel();
        pending.lock().insert(id, tx);
        Self { pending, id, rx }
    }

    pub(crate) async fn reply(mut self, method: &str, timeout: Option<Duration>) -> Result<Value, CdpError> {
        let response = match timeout {
            Some(limit) => tokio::time::timeout(limit, &mut self.rx)
                .await
                .map_err(|_| CdpError::Timeout(format!("Request {} timed out", method)))?,
            None => (&mut self.rx).await,
        };
        response.unwrap_or(Err(CdpError::SessionClosed))
    }
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.id);
    }
}

/// CDP client for the user's browser.
///
/// Holds one browser-level WebSocket; page sessions are multiplexed over it
/// with flattened session ids.
pub struct CdpClient {
    browser_ws_url: String,
    conn: Arc<Connection>,
    events: broadcast::Sender<CdpEvent>,
    recv_task: tokio::task::JoinHandle<()>,
}

impl CdpClient {
    /// Connect to the browser behind a remote-debugging HTTP endpoint such
    /// as `http://localhost:9222`.
    pub async fn connect(endpoint: &str) -> Result<Self, CdpError> {
        let browser_ws_url = Self::discover(endpoint).await?;

        let (socket, _) = tokio_tungstenite::connect_async(browser_ws_url.as_str())
            .await
            .map_err(|e| CdpError::ConnectionFailed(format!("{}: {}", browser_ws_url, e)))?;
        let (sink, source) = socket.split();

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (events, _) = broadcast::channel(256);
        let recv_task = tokio::spawn(Self::receive_loop(source, pending.clone(), events.clone()));

        Ok(Self {
            browser_ws_url,
            conn: Arc::new(Connection {
                ws_tx: tokio::sync::Mutex::new(sink),
                request_id: AtomicU64::new(1),
                pending,
            }),
            events,
            recv_task,
        })
    }

    /// Ask the endpoint for the browser-level WebSocket URL.
    async fn discover(endpoint: &str) -> Result<String, CdpError> {
        let unavailable = |e: reqwest::Error| CdpError::ChromeNotAvailable(format!("{} ({})", endpoint, e));
        let url = format!("{}/json/version", endpoint.trim_end_matches('/'));

        let version: BrowserVersion = reqwest::Client::builder()
            .timeout(DEFAULT_CALL_TIMEOUT)
            .build()
            .map_err(unavailable)?
            .get(&url)
            .send()
            .await
            .map_err(unavailable)?
            .json()
            .await
            .map_err(unavailable)?;

        debug!("{} speaks CDP {}", version.browser, version.protocol_version);
        Ok(version.web_socket_debugger_url)
    }

    /// Route replies to waiting callers and fan events out to subscribers.
    async fn receive_loop(
        mut source: WsSource,
        pending: Pending,
        events: broadcast::Sender<CdpEvent>,
    ) {
        while let Some(frame) = source.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    warn!("Browser socket failed: {}", e);
                    break;
                }
            };
            trace!("<- {}", text);
            match serde_json::from_str::<CdpResponse>(&text) {
                Ok(message) => Self::route(message, &pending, &events),
                Err(e) => warn!("Unparseable CDP frame: {}", e),
            }
        }

        debug!("Browser socket closed");
        // Dropping the senders wakes every waiter with SessionClosed.
        pending.lock().clear();
    }

    fn route(resp: CdpResponse, pending: &Pending, events: &broadcast::Sender<CdpEvent>) {
        if let Some(id) = resp.id {
            let waiter = pending.lock().remove(&id);
            if let Some(tx) = waiter {
                let result = match resp.error {
                    Some(error) => Err(CdpError::Protocol {
                        code: error.code,
                        message: error.message,
                    }),
                    None => Ok(resp.result.unwrap_or(Value::Null)),
                };
                let _ = tx.send(result);
            }
        } else if let Some(method) = resp.method {
            let _ = events.send(CdpEvent {
                method,
                params: resp.params.unwrap_or(Value::Null),
                session_id: resp.session_id,
            });
        }
    }

    /// Send a browser-level CDP command.
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, CdpError> {
        self.conn
            .call(method, params, None, Some(DEFAULT_CALL_TIMEOUT))
            .await
    }

    /// Subscribe to protocol events from the browser and attached pages.
    pub fn subscribe_events(&self) -> broadcast::Receiver<CdpEvent> {
        self.events.subscribe()
    }

    /// Get browser WebSocket URL.
    pub fn browser_ws_url(&self) -> &str {
        &self.browser_ws_url
    }

    // ========================================================================
    // Target Management
    // ========================================================================

    /// Get all targets.
    pub async fn get_targets(&self) -> Result<Vec<TargetInfo>, CdpError> {
        let result = self.call("Target.getTargets", None).await?;
        let targets: Vec<TargetInfo> = serde_json::from_value(result["targetInfos"].clone())?;
        Ok(targets)
    }

    pub async fn get_target_info(&self, target_id: &str) -> Result<TargetInfo, CdpError> {
        let result = self
            .call("Target.getTargetInfo", Some(json!({"targetId": target_id})))
            .await?;
        Ok(serde_json::from_value(result["targetInfo"].clone())?)
    }

    /// Open a page target without stealing focus unless asked to.
    pub async fn create_target(
        &self,
        url: &str,
        background: bool,
        new_window: bool,
    ) -> Result<String, CdpError> {
        let mut params = json!({
            "url": url,
            "background": background,
        });
        if new_window {
            params["newWindow"] = json!(true);
        }

        let result = self.call("Target.createTarget", Some(params)).await?;
        result["targetId"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| CdpError::InvalidResponse("Missing targetId".to_string()))
    }

    /// Attach to a page and enable the domains the platform needs.
    pub async fn attach(&self, target_id: &str) -> Result<PageSession, CdpError> {
        let result = self
            .call(
                "Target.attachToTarget",
                Some(json!({
                    "targetId": target_id,
                    "flatten": true
                })),
            )
            .await?;

        let session_id = result["sessionId"]
            .as_str()
            .ok_or_else(|| CdpError::InvalidResponse("Missing sessionId".to_string()))?
            .to_string();

        let session = PageSession::new(target_id.to_string(), session_id, self.conn.clone());
        session.enable_domains().await?;
        Ok(session)
    }

    /// Bring a target to front.
    pub async fn activate_target(&self, target_id: &str) -> Result<(), CdpError> {
        self.call("Target.activateTarget", Some(json!({"targetId": target_id})))
            .await?;
        Ok(())
    }

    /// Close a page/target.
    pub async fn close_target(&self, target_id: &str) -> Result<(), CdpError> {
        self.call("Target.closeTarget", Some(json!({"targetId": target_id})))
            .await?;
        Ok(())
    }

    // ========================================================================
    // Windows
    // ========================================================================

    pub async fn get_window_for_target(&self, target_id: &str) -> Result<(i64, WindowBounds), CdpError> {
        let result = self
            .call("Browser.getWindowForTarget", Some(json!({"targetId": target_id})))
            .await?;
        let window_id = result["windowId"]
            .as_i64()
            .ok_or_else(|| CdpError::InvalidResponse("Missing windowId".to_string()))?;
        let bounds = serde_json::from_value(result["bounds"].clone()).unwrap_or_default();
        Ok((window_id, bounds))
    }

    pub async fn get_window_bounds(&self, window_id: i64) -> Result<WindowBounds, CdpError> {
        let result = self
            .call("Browser.getWindowBounds", Some(json!({"windowId": window_id})))
            .await?;
        Ok(serde_json::from_value(result["bounds"].clone())?)
    }

    /// Set `normal`, `minimized`, `maximized` or `fullscreen`.
    pub async fn set_window_state(&self, window_id: i64, state: &str) -> Result<(), CdpError> {
        self.call(
            "Browser.setWindowBounds",
            Some(json!({
                "windowId": window_id,
                "bounds": {"windowState": state},
            })),
        )
        .await?;
        Ok(())
    }
}

impl Drop for CdpClient {
    fn drop(&mut self) {
        self.recv_task.abort();
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
