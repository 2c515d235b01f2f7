use super::{CdpError, CdpEvent, Transport, DEFAULT_COMMAND_TIMEOUT};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

/// A browser tab plus the flattened protocol session attached to it
///
/// The tab is closed by [`Target::close`]. If the owner is dropped before
/// that happens (for example because the surrounding future was cancelled),
/// the drop handler schedules the close on the current runtime so the tab
/// does not leak.
pub struct Target {
    transport: Arc<dyn Transport>,
    target_id: String,
    session_id: String,
    closed: bool,
}

impl Target {
    /// Creates a blank tab and attaches a flattened session to it
    pub async fn open(transport: Arc<dyn Transport>) -> Result<Self, CdpError> {
        let create = transport.send(None, "Target.createTarget", json!({ "url": "about:blank" }));
        let created = bounded("Target.createTarget", DEFAULT_COMMAND_TIMEOUT, create).await?;
        let target_id = created["targetId"]
            .as_str()
            .ok_or_else(|| CdpError::Protocol("createTarget returned no targetId".to_string()))?
            .to_string();

        let attach = transport.send(
            None,
            "Target.attachToTarget",
            json!({ "targetId": target_id, "flatten": true }),
        );
        let attached = bounded("Target.attachToTarget", DEFAULT_COMMAND_TIMEOUT, attach).await;
        let session_id = match attached {
            Ok(value) => match value["sessionId"].as_str() {
                Some(id) => id.to_string(),
                None => {
                    close_target(transport.as_ref(), &target_id).await;
                    return Err(CdpError::Protocol(
                        "attachToTarget returned no sessionId".to_string(),
                    ));
                }
            },
            Err(e) => {
                close_target(transport.as_ref(), &target_id).await;
                return Err(e);
            }
        };

        tracing::debug!("Opened target {} (session {})", target_id, session_id);

        Ok(Self {
            transport,
            target_id,
            session_id,
            closed: false,
        })
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Sends a command on this tab's session
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, CdpError> {
        self.handle().call(method, params).await
    }

    /// Sends a command that may legitimately run for long, like an awaited evaluation
    ///
    /// The caller is expected to race it against its own clock.
    pub async fn call_unbounded(&self, method: &str, params: Value) -> Result<Value, CdpError> {
        self.transport
            .send(Some(&self.session_id), method, params)
            .await
    }

    /// Cloneable access to the tab session for background listeners
    ///
    /// A handle cannot close the tab.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            transport: Arc::clone(&self.transport),
            session_id: self.session_id.clone(),
        }
    }

    /// Sends a browser-level command (not bound to the tab session)
    pub async fn call_browser(&self, method: &str, params: Value) -> Result<Value, CdpError> {
        bounded(
            method,
            DEFAULT_COMMAND_TIMEOUT,
            self.transport.send(None, method, params),
        )
        .await
    }

    /// Subscribes to events of this tab only, starting now
    pub fn events(&self) -> TargetEvents {
        self.handle().events()
    }

    /// Closes the tab
    pub async fn close(mut self) {
        self.closed = true;
        close_target(self.transport.as_ref(), &self.target_id).await;
    }

    /// Leaves the tab open in the browser (interactive debugging)
    pub fn detach(mut self) {
        tracing::info!("Keeping target {} open", self.target_id);
        self.closed = true;
    }
}

impl Drop for Target {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("Target {} dropped outside a runtime", self.target_id);
            return;
        };
        let transport = Arc::clone(&self.transport);
        let target_id = std::mem::take(&mut self.target_id);
        handle.spawn(async move {
            close_target(transport.as_ref(), &target_id).await;
        });
    }
}

/// Command and event access to one tab session
#[derive(Clone)]
pub struct SessionHandle {
    transport: Arc<dyn Transport>,
    session_id: String,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn call(&self, method: &str, params: Value) -> Result<Value, CdpError> {
        bounded(
            method,
            DEFAULT_COMMAND_TIMEOUT,
            self.transport.send(Some(&self.session_id), method, params),
        )
        .await
    }

    pub fn events(&self) -> TargetEvents {
        TargetEvents {
            receiver: self.transport.subscribe(),
            session_id: self.session_id.clone(),
        }
    }
}

async fn bounded<F>(method: &str, limit: Duration, call: F) -> Result<Value, CdpError>
where
    F: std::future::Future<Output = Result<Value, CdpError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(CdpError::Timeout {
            method: method.to_string(),
            duration: limit,
        }),
    }
}

async fn close_target(transport: &dyn Transport, target_id: &str) {
    let close = transport.send(None, "Target.closeTarget", json!({ "targetId": target_id }));
    if let Err(e) = bounded("Target.closeTarget", DEFAULT_COMMAND_TIMEOUT, close).await {
        tracing::warn!("Failed to close target {}: {}", target_id, e);
    }
}

/// Event stream filtered to one tab session
pub struct TargetEvents {
    receiver: broadcast::Receiver<CdpEvent>,
    session_id: String,
}

impl TargetEvents {
    /// Waits for the next event of this session
    ///
    /// Returns `Ok(None)` once the connection is gone. Falling behind the
    /// shared channel is an error: the skipped events cannot be recovered.
    pub async fn recv(&mut self) -> Result<Option<CdpEvent>, CdpError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.session_id.as_deref() == Some(self.session_id.as_str()) => {
                    return Ok(Some(event))
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        "Session {} lagged, {} events dropped",
                        self.session_id,
                        skipped
                    );
                    return Err(CdpError::EventsLagged {
                        session_id: self.session_id.clone(),
                        skipped,
                    });
                }
                Err(RecvError::Closed) => return Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Answers every command with an empty object and never emits events itself
    struct Quiet {
        events: broadcast::Sender<CdpEvent>,
    }

    #[async_trait]
    impl Transport for Quiet {
        async fn send(
            &self,
            _session_id: Option<&str>,
            method: &str,
            _params: Value,
        ) -> Result<Value, CdpError> {
            Ok(match method {
                "Target.createTarget" => json!({ "targetId": "T1" }),
                "Target.attachToTarget" => json!({ "sessionId": "S1" }),
                _ => json!({}),
            })
        }

        fn subscribe(&self) -> broadcast::Receiver<CdpEvent> {
            self.events.subscribe()
        }
    }

    fn event(session_id: &str, n: u64) -> CdpEvent {
        CdpEvent {
            session_id: Some(session_id.to_string()),
            method: "Runtime.bindingCalled".to_string(),
            params: json!({ "payload": n.to_string() }),
        }
    }

    #[tokio::test]
    async fn test_events_are_filtered_by_session() {
        let (sender, _) = broadcast::channel(16);
        let transport = Arc::new(Quiet { events: sender.clone() });
        let target = Target::open(transport).await.unwrap();
        let mut events = target.events();

        sender.send(event("OTHER", 1)).unwrap();
        sender.send(event("S1", 2)).unwrap();
        let received = events.recv().await.unwrap().unwrap();
        assert_eq!(received.params["payload"], "2");
        target.close().await;
    }

    #[tokio::test]
    async fn test_lag_is_reported() {
        let (sender, _) = broadcast::channel(4);
        let transport = Arc::new(Quiet { events: sender.clone() });
        let target = Target::open(transport).await.unwrap();
        let mut events = target.events();

        for n in 0..10 {
            sender.send(event("S1", n)).unwrap();
        }
        match events.recv().await {
            Err(CdpError::EventsLagged { session_id, skipped }) => {
                assert_eq!(session_id, "S1");
                assert_eq!(skipped, 6);
            }
            other => panic!("unexpected: {:?}", other),
        }
        // The stream resumes at the oldest retained event
        assert_eq!(events.recv().await.unwrap().unwrap().params["payload"], "6");
        target.close().await;
    }

    #[tokio::test]
    async fn test_closed_connection_ends_stream() {
        let (sender, _) = broadcast::channel(4);
        let transport = Arc::new(Quiet { events: sender });
        let target = Target::open(Arc::clone(&transport) as Arc<dyn Transport>)
            .await
            .unwrap();
        let mut events = target.events();
        target.close().await;
        drop(transport);
        assert!(events.recv().await.unwrap().is_none());
    }
}
