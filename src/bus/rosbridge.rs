//! Rosbridge v2 client.
//!
//! Speaks the rosbridge JSON protocol over a WebSocket client connection:
//! each topic is `advertise`d once per connection, then payloads go out as
//! `publish` ops.
//!
//! The connection is dialed lazily by a spawned task, so a caller that
//! gives up (the publisher bounds every call) does not abort the dial; the
//! next publish picks up the finished connection. Concurrent callers share
//! one dial, and the connection lock is only held while a frame is sent.
//! Any send failure drops the connection and surfaces
//! [`PublishError::BusUnavailable`].

use std::collections::HashSet;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::{BoxFuture, Shared};
use futures_util::stream::SplitSink;
use futures_util::{FutureExt, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::MiddlewareBus;
use crate::domain::DrivePayload;
use crate::error::PublishError;

/// Upper bound on one dial attempt.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

type DialResult = Shared<BoxFuture<'static, Result<(), PublishError>>>;

struct Connection {
    sink: WsSink,
    advertised: HashSet<String>,
    reader: JoinHandle<()>,
}

impl Connection {
    async fn open(url: &str) -> Result<Self, PublishError> {
        let (stream, _) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(url))
            .await
            .map_err(|_| PublishError::BusUnavailable(format!("connect to {url} timed out")))?
            .map_err(|e| PublishError::BusUnavailable(e.to_string()))?;
        tracing::info!(url, "connected to rosbridge");

        let (sink, mut source) = stream.split();
        // Drain inbound traffic so control frames get answered.
        let reader = tokio::spawn(async move {
            while let Some(msg) = source.next().await {
                match msg {
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        });
        Ok(Self {
            sink,
            advertised: HashSet::new(),
            reader,
        })
    }

    fn is_alive(&self) -> bool {
        !self.reader.is_finished()
    }

    async fn send_op(&mut self, op: serde_json::Value) -> Result<(), PublishError> {
        let text =
            serde_json::to_string(&op).map_err(|e| PublishError::Encoding(e.to_string()))?;
        self.sink
            .send(Message::text(text))
            .await
            .map_err(|e| PublishError::BusUnavailable(e.to_string()))
    }

    async fn publish(
        &mut self,
        topic: &str,
        message_type: &str,
        payload: &DrivePayload,
    ) -> Result<(), PublishError> {
        if !self.advertised.contains(topic) {
            self.send_op(advertise_op(topic, message_type)).await?;
            self.advertised.insert(topic.to_string());
        }
        self.send_op(publish_op(topic, payload)).await
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("advertised", &self.advertised)
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

fn advertise_op(topic: &str, message_type: &str) -> serde_json::Value {
    serde_json::json!({
        "op": "advertise",
        "topic": topic,
        "type": message_type,
    })
}

fn publish_op(topic: &str, payload: &DrivePayload) -> serde_json::Value {
    serde_json::json!({
        "op": "publish",
        "topic": topic,
        "msg": payload,
    })
}

/// Dial in flight (or just finished), shared by every waiting caller.
struct Dial {
    result: DialResult,
    task: AbortHandle,
}

/// [`MiddlewareBus`] backed by a rosbridge server.
pub struct RosbridgeBus {
    url: String,
    message_type: String,
    conn: Arc<Mutex<Option<Connection>>>,
    dial: std::sync::Mutex<Option<Dial>>,
}

impl std::fmt::Debug for RosbridgeBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RosbridgeBus")
            .field("url", &self.url)
            .field("message_type", &self.message_type)
            .finish_non_exhaustive()
    }
}

impl RosbridgeBus {
    /// Creates a client for the rosbridge server at `url`. No connection
    /// is made until the first publish.
    #[must_use]
    pub fn new(url: String, message_type: String) -> Self {
        Self {
            url,
            message_type,
            conn: Arc::new(Mutex::new(None)),
            dial: std::sync::Mutex::new(None),
        }
    }

    /// Sends on the current connection. `None` means there is no live
    /// connection to try.
    async fn try_send(
        &self,
        topic: &str,
        payload: &DrivePayload,
    ) -> Option<Result<(), PublishError>> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().filter(|conn| conn.is_alive())?;
        let result = conn.publish(topic, &self.message_type, payload).await;
        if let Err(e) = &result {
            tracing::warn!(url = %self.url, error = %e, "rosbridge publish failed");
            *guard = None;
        }
        Some(result)
    }

    /// Joins the running dial, or starts a new one if none is running.
    fn dial(&self) -> DialResult {
        let mut slot = self.dial.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(dial) = slot.as_ref()
            && !dial.task.is_finished()
        {
            return dial.result.clone();
        }

        let url = self.url.clone();
        let conn = Arc::clone(&self.conn);
        let task = tokio::spawn(async move {
            let connection = Connection::open(&url).await?;
            *conn.lock().await = Some(connection);
            Ok(())
        });
        let abort = task.abort_handle();
        let result = async move {
            task.await
                .unwrap_or_else(|e| Err(PublishError::BusUnavailable(e.to_string())))
        }
        .boxed()
        .shared();
        *slot = Some(Dial {
            result: result.clone(),
            task: abort,
        });
        result
    }
}

impl Drop for RosbridgeBus {
    fn drop(&mut self) {
        let slot = self.dial.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(dial) = slot.take() {
            dial.task.abort();
        }
    }
}

#[async_trait]
impl MiddlewareBus for RosbridgeBus {
    async fn publish(&self, topic: &str, payload: &DrivePayload) -> Result<(), PublishError> {
        if let Some(result) = self.try_send(topic, payload).await {
            return result;
        }
        if let Err(e) = self.dial().await {
            tracing::warn!(url = %self.url, error = %e, "rosbridge connect failed");
            return Err(e);
        }
        self.try_send(topic, payload).await.unwrap_or_else(|| {
            Err(PublishError::BusUnavailable(
                "connection closed right after connect".to_string(),
            ))
        })
    }
}
