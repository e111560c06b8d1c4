use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use tracing::warn;

use crate::alert::engine::AlertEvent;
use crate::config::AlertsConfig;

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, event: &AlertEvent) -> Result<()>;
}

pub struct StdoutSink;

#[async_trait]
impl AlertSink for StdoutSink {
    async fn send(&self, event: &AlertEvent) -> Result<()> {
        println!("[{:?}] {} - {}", event.kind, event.title, event.body);
        Ok(())
    }
}

pub struct WebhookSink {
    client: Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent("tuition-engine/0.1")
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    async fn send(&self, event: &AlertEvent) -> Result<()> {
        self.client
            .post(&self.url)
            .json(event)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

pub fn build_sinks(config: &AlertsConfig) -> Result<Vec<Arc<dyn AlertSink>>> {
    let mut sinks: Vec<Arc<dyn AlertSink>> = Vec::new();
    if config.enable_stdout {
        sinks.push(Arc::new(StdoutSink));
    }
    if !config.webhook_url.trim().is_empty() {
        sinks.push(Arc::new(WebhookSink::new(config.webhook_url.clone())?));
    }
    Ok(sinks)
}

/// Delivers every event to every sink. A failing sink is logged and skipped.
pub async fn dispatch(sinks: &[Arc<dyn AlertSink>], events: &[AlertEvent]) {
    for event in events {
        for sink in sinks {
            if let Err(err) = sink.send(event).await {
                warn!(error = %err, title = %event.title, "alert delivery failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    use axum::extract::State;
    use axum::routing::post;
    use axum::{Json, Router};
    use tokio::sync::mpsc;

    use super::{dispatch, AlertSink, WebhookSink};
    use crate::alert::engine::AlertEvent;
    use crate::alert::rules::AlertEventKind;

    struct CountingSink {
        sent: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl AlertSink for CountingSink {
        async fn send(&self, _event: &AlertEvent) -> Result<()> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(anyhow!("sink offline"));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn failing_sink_does_not_block_others() {
        let failing = Arc::new(CountingSink { sent: AtomicUsize::new(0), fail: true });
        let working = Arc::new(CountingSink { sent: AtomicUsize::new(0), fail: false });
        let sinks: Vec<Arc<dyn AlertSink>> = vec![failing.clone(), working.clone()];
        let events = vec![
            AlertEvent {
                kind: AlertEventKind::StoreFallback,
                title: "a".to_string(),
                body: "b".to_string(),
            };
            2
        ];
        dispatch(&sinks, &events).await;
        assert_eq!(failing.sent.load(Ordering::SeqCst), 2);
        assert_eq!(working.sent.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn webhook_posts_event_json() {
        let (tx, mut rx) = mpsc::unbounded_channel::<AlertEvent>();
        let app = Router::new()
            .route(
                "/hook",
                post(
                    |State(tx): State<mpsc::UnboundedSender<AlertEvent>>, Json(event): Json<AlertEvent>| async move {
                        let _ = tx.send(event);
                    },
                ),
            )
            .with_state(tx);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind listener");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let event = AlertEvent {
            kind: AlertEventKind::InvariantViolation,
            title: "negative_final_value".to_string(),
            body: "final value -3.00".to_string(),
        };
        let sink = WebhookSink::new(format!("http://{addr}/hook")).expect("sink");
        sink.send(&event).await.expect("delivered");

        let received = rx.recv().await.expect("event received");
        assert_eq!(received, event);
    }
}
