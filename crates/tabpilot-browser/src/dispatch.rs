//! Execution dispatcher: one request/response round trip with the content
//! script of a tab.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tabpilot_workqueue::{Citation, QueryTask, TaskOutput};
use tracing::{debug, warn};

use crate::manager::BrowserError;
use crate::platform::{MessageTransport, PlatformError, TabId};

/// Messages exchanged with the page-side adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentMessage {
    ExecuteTask(QueryTask),
    TaskResult(ContentResult),
}

/// What the content script reports back for one task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default)]
    pub citations: Vec<Citation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ContentResult {
    /// Split into output or the error text the queue will classify.
    pub fn into_output(self) -> Result<TaskOutput, String> {
        if self.success {
            Ok(TaskOutput {
                response: self.response.unwrap_or_default(),
                citations: self.citations,
            })
        } else {
            Err(self
                .error
                .unwrap_or_else(|| "content script reported failure without a message".to_string()))
        }
    }
}

/// Sends tasks to content scripts and waits for their result.
pub struct ExecutionDispatcher {
    transport: Arc<dyn MessageTransport>,
    timeout: Duration,
}

impl ExecutionDispatcher {
    pub fn new(transport: Arc<dyn MessageTransport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send `EXECUTE_TASK` and wait for the `TASK_RESULT` reply.
    ///
    /// The timeout runs independently of the transport: a content script
    /// that never answers fails the call after exactly `timeout`.
    pub async fn execute_task_in_tab(
        &self,
        tab: &TabId,
        task: &QueryTask,
    ) -> Result<ContentResult, BrowserError> {
        let message = serde_json::to_value(ContentMessage::ExecuteTask(task.clone()))
            .map_err(|e| BrowserError::MalformedResponse(e.to_string()))?;

        debug!("Dispatching task {} to tab {}", task.id, tab);

        let reply = match tokio::time::timeout(self.timeout, self.transport.send_message(tab, message)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                warn!("Message to tab {} failed: {}", tab, e);
                return Err(send_error(e));
            }
            Err(_) => {
                return Err(BrowserError::ExecutionTimeout {
                    tab: tab.clone(),
                    timeout_ms: self.timeout.as_millis() as u64,
                });
            }
        };

        let reply = reply.ok_or(BrowserError::NoResponse)?;
        parse_reply(reply)
    }
}

/// Only a lost tab or socket is worth retrying as a connection problem.
fn send_error(e: PlatformError) -> BrowserError {
    match e {
        PlatformError::Connection(_) | PlatformError::TabNotFound(_) => {
            BrowserError::Transport(e.to_string())
        }
        PlatformError::Backend(message) => BrowserError::ScriptFailed(message),
        other => BrowserError::ScriptFailed(other.to_string()),
    }
}

fn parse_reply(reply: Value) -> Result<ContentResult, BrowserError> {
    let kind = reply
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("<none>")
        .to_string();

    match serde_json::from_value::<ContentMessage>(reply) {
        Ok(ContentMessage::TaskResult(result)) => Ok(result),
        Ok(_) => Err(BrowserError::MalformedResponse(format!(
            "unexpected message type {}",
            kind
        ))),
        Err(_) if kind == "TASK_RESULT" => Err(BrowserError::MalformedResponse(
            "result payload has the wrong shape".to_string(),
        )),
        Err(_) => Err(BrowserError::MalformedResponse(format!(
            "unexpected message type {}",
            kind
        ))),
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
