//! Call correlator: pairs forwarded tool calls with their responses.
//!
//! Every call gets a process-unique id and a `oneshot` channel parked in the
//! pending map. Settlement is a race between the extension's response and a
//! timer; whichever removes the map entry first decides the outcome, the
//! other finds nothing and does nothing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::bridge::{ExtensionBridge, PeerRequest, PeerResponse};
use crate::error::CallError;

type Settle = oneshot::Sender<Result<Value, CallError>>;

/// Outstanding tool invocation.
#[derive(Debug)]
struct PendingCall {
    tool: String,
    created_at: Instant,
    settle: Settle,
}

/// Anything that can run a browser tool and hand back its raw result.
#[async_trait::async_trait]
pub trait ToolCaller: Send + Sync {
    /// Invoke `tool` with `args`.
    async fn call(&self, tool: &str, args: Value) -> Result<Value, CallError>;
}

/// Pending-call registry in front of the extension bridge.
#[derive(Debug)]
pub struct CallCorrelator {
    bridge: Arc<ExtensionBridge>,
    pending: Mutex<HashMap<String, PendingCall>>,
    next_id: AtomicU64,
    timeout: Duration,
}

impl CallCorrelator {
    /// Create a correlator forwarding through `bridge`.
    pub fn new(bridge: Arc<ExtensionBridge>, timeout: Duration) -> Self {
        Self {
            bridge,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            timeout,
        }
    }

    /// Number of calls awaiting settlement.
    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingCall>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next_call_id(&self) -> String {
        format!("call-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Forward `tool` to the extension and wait for its settlement.
    pub async fn call(&self, tool: &str, args: Value) -> Result<Value, CallError> {
        let id = self.next_call_id();
        let (tx, mut rx) = oneshot::channel();

        self.lock().insert(
            id.clone(),
            PendingCall {
                tool: tool.to_string(),
                created_at: Instant::now(),
                settle: tx,
            },
        );
        let _guard = PendingGuard { correlator: self, id: &id };

        let request = PeerRequest {
            id: id.clone(),
            method: tool.to_string(),
            params: args,
        };
        self.bridge.send(&request).await?;
        debug!(call = %id, tool, "Forwarded tool call");

        match tokio::time::timeout(self.timeout, &mut rx).await {
            Ok(outcome) => outcome.unwrap_or(Err(CallError::Closed)),
            Err(_) => {
                let expired = self.lock().remove(&id);
                match expired {
                    Some(call) => {
                        warn!(
                            call = %id,
                            tool = %call.tool,
                            elapsed_ms = call.created_at.elapsed().as_millis() as u64,
                            "Tool call timed out"
                        );
                        Err(CallError::Timeout(self.timeout))
                    }
                    // The response won the race just before the timer.
                    None => rx.await.unwrap_or(Err(CallError::Closed)),
                }
            }
        }
    }

    /// Deliver an extension response to its pending call.
    ///
    /// Returns `false` when no call is waiting on the id (already timed out,
    /// or never issued).
    pub fn settle(&self, response: PeerResponse) -> bool {
        let entry = self.lock().remove(&response.id);
        match entry {
            Some(call) => {
                debug!(
                    call = %response.id,
                    tool = %call.tool,
                    elapsed_ms = call.created_at.elapsed().as_millis() as u64,
                    "Tool call settled"
                );
                let _ = call.settle.send(response.into_outcome());
                true
            }
            None => {
                debug!(call = %response.id, "No pending call for response");
                false
            }
        }
    }
}

#[async_trait::async_trait]
impl ToolCaller for CallCorrelator {
    async fn call(&self, tool: &str, args: Value) -> Result<Value, CallError> {
        CallCorrelator::call(self, tool, args).await
    }
}

/// Removes the pending entry when the calling future goes away, whatever
/// the reason. A no-op once the entry has been settled.
struct PendingGuard<'a> {
    correlator: &'a CallCorrelator,
    id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.correlator.lock().remove(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn call_ids_are_monotonic_and_distinct() {
        let correlator = CallCorrelator::new(Arc::new(ExtensionBridge::new()), Duration::from_secs(1));
        let a = correlator.next_call_id();
        let b = correlator.next_call_id();
        assert_eq!(a, "call-1");
        assert_eq!(b, "call-2");
    }

    #[tokio::test]
    async fn not_connected_leaves_no_pending_entry() {
        let correlator = CallCorrelator::new(Arc::new(ExtensionBridge::new()), Duration::from_secs(1));
        let outcome = correlator.call("tab_list", json!({})).await;
        assert_eq!(outcome, Err(CallError::NotConnected));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[test]
    fn settle_unknown_id_is_noop() {
        let correlator = CallCorrelator::new(Arc::new(ExtensionBridge::new()), Duration::from_secs(1));
        let response = PeerResponse {
            id: "call-404".into(),
            result: Some(json!({})),
            error: None,
        };
        assert!(!correlator.settle(response));
    }
}
