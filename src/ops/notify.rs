// ABOUTME: Stock notifiers (tracing, JSON webhook, fan-out) and the background dispatcher.
// ABOUTME: Dispatch is fire-and-forget: delivery failures are logged, never propagated.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use hyper::Method;
use tokio::sync::{mpsc, oneshot};

use super::http::send;
use super::{ExecutionEvent, Notifier, NotifyError};

/// Logs every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, event: &ExecutionEvent) -> Result<(), NotifyError> {
        match event {
            ExecutionEvent::ExecutionStarted {
                execution_id,
                strategy,
                environment,
                version,
                services,
                ..
            } => tracing::info!(
                execution = %execution_id,
                %strategy,
                environment = %environment,
                version = %version,
                services = services.len(),
                "execution started"
            ),
            ExecutionEvent::ServiceStateChanged {
                execution_id,
                service,
                state,
                attempt,
                error,
                ..
            } => match error {
                Some(error) => tracing::info!(
                    execution = %execution_id,
                    service = %service,
                    %state,
                    attempt,
                    error = %error,
                    "service state changed"
                ),
                None => tracing::info!(
                    execution = %execution_id,
                    service = %service,
                    %state,
                    attempt,
                    "service state changed"
                ),
            },
            ExecutionEvent::RollbackStarted {
                execution_id,
                services,
                ..
            } => tracing::warn!(
                execution = %execution_id,
                services = services.len(),
                "rollback started"
            ),
            ExecutionEvent::ExecutionFinished {
                execution_id,
                verdict,
                healthy,
                failed,
                skipped,
                rolled_back,
                ..
            } => tracing::info!(
                execution = %execution_id,
                %verdict,
                healthy,
                failed,
                skipped,
                rolled_back,
                "execution finished"
            ),
        }
        Ok(())
    }
}

/// POSTs each event as JSON to a webhook endpoint.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &ExecutionEvent) -> Result<(), NotifyError> {
        let body = Bytes::from(serde_json::to_vec(event)?);
        let status = send(Method::POST, &self.url, Some(body)).await?;
        if !status.is_success() {
            return Err(NotifyError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}

/// Delivers each event to every inner notifier concurrently.
#[derive(Clone, Default)]
pub struct FanoutNotifier {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }
}

#[async_trait]
impl Notifier for FanoutNotifier {
    /// Returns the first delivery error after every notifier has been tried.
    async fn notify(&self, event: &ExecutionEvent) -> Result<(), NotifyError> {
        let results =
            futures::future::join_all(self.notifiers.iter().map(|n| n.notify(event))).await;
        results.into_iter().collect::<Result<Vec<()>, _>>().map(|_| ())
    }
}

enum Dispatch {
    Event(ExecutionEvent),
    Flush(oneshot::Sender<()>),
}

/// Handle to a background task that forwards events to a notifier.
///
/// Sending never blocks or fails; the task exits once every handle is dropped.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    tx: mpsc::UnboundedSender<Dispatch>,
}

impl NotificationDispatcher {
    /// Spawn the dispatch task. Must be called inside a tokio runtime.
    pub fn spawn(notifier: Arc<dyn Notifier>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Dispatch>();
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let event = match message {
                    Dispatch::Event(event) => event,
                    Dispatch::Flush(done) => {
                        let _ = done.send(());
                        continue;
                    }
                };
                if let Err(e) = notifier.notify(&event).await {
                    tracing::warn!(
                        execution = %event.execution_id(),
                        event = event.name(),
                        "notification delivery failed: {}",
                        e
                    );
                }
            }
        });
        Self { tx }
    }

    pub fn send(&self, event: ExecutionEvent) {
        if self.tx.send(Dispatch::Event(event)).is_err() {
            tracing::debug!("notification dispatcher closed, dropping event");
        }
    }

    /// Resolve once every event sent before this call has been delivered.
    pub async fn flush(&self) {
        let (done, delivered) = oneshot::channel();
        if self.tx.send(Dispatch::Flush(done)).is_ok() {
            let _ = delivered.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExecutionId;
    use chrono::Utc;
    use parking_lot::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn event() -> ExecutionEvent {
        ExecutionEvent::RollbackStarted {
            execution_id: ExecutionId::new("exec-9"),
            services: vec![],
            at: Utc::now(),
        }
    }

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl Notifier for Recording {
        async fn notify(&self, event: &ExecutionEvent) -> Result<(), NotifyError> {
            self.seen.lock().push(event.name());
            Ok(())
        }
    }

    struct Refusing;

    #[async_trait]
    impl Notifier for Refusing {
        async fn notify(&self, _event: &ExecutionEvent) -> Result<(), NotifyError> {
            Err(NotifyError::Rejected(500))
        }
    }

    #[tokio::test]
    async fn fanout_reaches_every_notifier_even_after_failure() {
        let recording = Arc::new(Recording::default());
        let fanout = FanoutNotifier::new()
            .with(Arc::new(Refusing))
            .with(recording.clone());

        let err = fanout.notify(&event()).await.unwrap_err();
        assert!(matches!(err, NotifyError::Rejected(500)));
        assert_eq!(*recording.seen.lock(), vec!["rollback_started"]);
    }

    #[tokio::test]
    async fn dispatcher_delivers_in_order() {
        let recording = Arc::new(Recording::default());
        let dispatcher = NotificationDispatcher::spawn(recording.clone());
        dispatcher.send(event());
        dispatcher.send(ExecutionEvent::ExecutionFinished {
            execution_id: ExecutionId::new("exec-9"),
            verdict: crate::execution::Verdict::Succeeded,
            healthy: 1,
            failed: 0,
            skipped: 0,
            rolled_back: 0,
            at: Utc::now(),
        });

        for _ in 0..50 {
            if recording.seen.lock().len() == 2 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(
            *recording.seen.lock(),
            vec!["rollback_started", "execution_finished"]
        );
    }

    #[tokio::test]
    async fn flush_waits_for_queued_events() {
        struct Slow(Arc<Recording>);

        #[async_trait]
        impl Notifier for Slow {
            async fn notify(&self, event: &ExecutionEvent) -> Result<(), NotifyError> {
                tokio::time::sleep(std::time::Duration::from_millis(30)).await;
                self.0.notify(event).await
            }
        }

        let recording = Arc::new(Recording::default());
        let dispatcher = NotificationDispatcher::spawn(Arc::new(Slow(recording.clone())));
        dispatcher.send(event());
        dispatcher.send(event());
        dispatcher.flush().await;

        assert_eq!(recording.seen.lock().len(), 2);
    }

    #[tokio::test]
    async fn webhook_posts_json_body() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            // Headers and body may arrive in separate segments.
            while !request.ends_with(b"}") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket
                .write_all(b"HTTP/1.1 204 No Content\r\nconnection: close\r\n\r\n")
                .await
                .unwrap();
            String::from_utf8_lossy(&request).to_string()
        });

        let notifier = WebhookNotifier::new(format!("http://{addr}/hooks"));
        notifier.notify(&event()).await.unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /hooks HTTP/1.1"));
        assert!(request.contains("application/json"));
        assert!(request.contains("\"event\":\"rollback_started\""));
    }

    #[tokio::test]
    async fn webhook_error_status_is_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let _ = socket
                .write_all(b"HTTP/1.1 500 Internal Server Error\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                .await;
        });

        let err = WebhookNotifier::new(format!("http://{addr}/hooks"))
            .notify(&event())
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::Rejected(500)));
    }
}
