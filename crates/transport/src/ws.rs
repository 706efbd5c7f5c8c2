//! WebSocket transport to the collector.
//!
//! A supervisor task owns the connection and walks the state machine
//! `Connecting → Open → ClosedPendingRetry → Connecting …`, sleeping a fixed
//! interval before each retry, forever. Sending never waits on the network:
//! records are queued for the writer only while the connection is `Open`, and
//! dropped otherwise.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use capture_core::config::TransportConfig;
use capture_core::error::{CaptureError, CaptureResult};
use capture_core::sink::{CaptureFailure, RecordSink};
use capture_core::types::{EventClass, EventData, InteractionEvent, WireMessage};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Records queued for the writer before further sends are dropped.
pub const OUTBOUND_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    ClosedPendingRetry,
}

/// What happens to a record sent while the connection is not open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeliveryPolicy {
    /// Discard it. Records captured while disconnected are lost for good;
    /// there is no buffer and no resend.
    #[default]
    DropOnDisconnected,
}

pub struct Transport {
    url: Url,
    policy: DeliveryPolicy,
    state: watch::Receiver<ConnectionState>,
    outbound: mpsc::Sender<String>,
    attempts: Arc<AtomicU64>,
    supervisor: JoinHandle<()>,
}

impl Transport {
    /// Start connecting to the collector described by `config`. Returns
    /// immediately; the connection comes up in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(config: &TransportConfig) -> CaptureResult<Self> {
        let url = config.url()?;
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| CaptureError::Internal(anyhow::anyhow!("transport needs a tokio runtime: {e}")))?;

        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let attempts = Arc::new(AtomicU64::new(0));

        let supervisor = handle.spawn(supervise(
            url.clone(),
            config.reconnect_interval(),
            state_tx,
            outbound_rx,
            Arc::clone(&attempts),
        ));

        info!(
            url = %url,
            reconnect_interval_ms = config.reconnect_interval_ms,
            "collector transport started"
        );

        Ok(Self {
            url,
            policy: DeliveryPolicy::DropOnDisconnected,
            state: state_rx,
            outbound: outbound_tx,
            attempts,
            supervisor,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn policy(&self) -> DeliveryPolicy {
        self.policy
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Connection attempts made so far, including the first.
    pub fn connect_attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Wait until the connection reaches `target`. Returns `false` on timeout.
    pub async fn wait_for_state(&self, target: ConnectionState, timeout: Duration) -> bool {
        let mut state = self.state.clone();
        let reached = tokio::time::timeout(timeout, state.wait_for(|s| *s == target))
            .await
            .map(|r| r.is_ok());
        matches!(reached, Ok(true))
    }

    /// Queue one record for the collector. Fails with
    /// [`CaptureError::TransportUnavailable`] if the connection is not open and
    /// [`CaptureError::QueueFull`] if the writer has fallen behind.
    pub fn try_send(&self, event_type: EventClass, data: &EventData) -> CaptureResult<()> {
        if event_type != data.class() {
            return Err(CaptureError::Wire(format!(
                "{event_type} record carries {} data",
                data.class()
            )));
        }
        if self.state() != ConnectionState::Open {
            return Err(CaptureError::TransportUnavailable);
        }
        let text = serde_json::to_string(&WireMessage { event_type, data })?;
        enqueue(&self.outbound, text)
    }

    /// Fire-and-forget send. Anything that cannot go out right now is
    /// dropped without surfacing an error.
    pub fn send(&self, event_type: EventClass, data: &EventData) {
        match self.try_send(event_type, data) {
            Ok(()) => {}
            Err(CaptureError::TransportUnavailable) => {
                metrics::counter!("transport.dropped").increment(1);
                trace!(class = %event_type, "collector not connected, record dropped");
            }
            Err(CaptureError::QueueFull { capacity }) => {
                metrics::counter!("transport.dropped").increment(1);
                debug!(class = %event_type, capacity, "writer behind, record dropped");
            }
            Err(e) => {
                metrics::counter!("transport.dropped").increment(1);
                warn!(class = %event_type, error = %e, "record could not be encoded, dropped");
            }
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.supervisor.abort();
    }
}

impl RecordSink for Transport {
    fn send(&self, event: &InteractionEvent) {
        Transport::send(self, event.class(), &event.data);
    }

    fn fail(&self, failure: &CaptureFailure) {
        // The wire protocol has no failure message; keep it in the logs.
        metrics::counter!("transport.capture_failures").increment(1);
        warn!(
            class = %failure.event_type,
            data = %failure.data,
            reason = %failure.reason,
            "capture failed"
        );
    }
}

async fn supervise(
    url: Url,
    reconnect_interval: Duration,
    state: watch::Sender<ConnectionState>,
    mut outbound: mpsc::Receiver<String>,
    attempts: Arc<AtomicU64>,
) {
    loop {
        state.send_replace(ConnectionState::Connecting);
        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(url = %url, attempt, "connecting to collector");

        match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((stream, _)) => {
                info!(url = %url, attempt, "connected to collector");
                state.send_replace(ConnectionState::Open);
                let lost = pump(stream, &mut outbound).await;
                warn!(url = %url, error = %lost, "collector connection closed");
            }
            Err(e) => {
                warn!(url = %url, attempt, error = %e, "failed to connect to collector");
            }
        }

        state.send_replace(ConnectionState::ClosedPendingRetry);
        let discarded = discard_pending(&mut outbound);
        if discarded > 0 {
            metrics::counter!("transport.dropped").increment(discarded);
            debug!(discarded, "dropped records queued before disconnect");
        }
        metrics::counter!("transport.reconnects").increment(1);
        info!(
            url = %url,
            retry_in_ms = reconnect_interval.as_millis() as u64,
            "disconnected from collector, reconnecting after delay"
        );
        tokio::time::sleep(reconnect_interval).await;
    }
}

/// Write queued records until the connection fails or the collector closes it.
async fn pump(stream: WsStream, outbound: &mut mpsc::Receiver<String>) -> CaptureError {
    let (mut writer, mut reader) = stream.split();
    loop {
        tokio::select! {
            message = outbound.recv() => {
                let Some(text) = message else {
                    let _ = writer.close().await;
                    return CaptureError::ConnectionLost("transport shut down".into());
                };
                if let Err(e) = writer.send(Message::text(text)).await {
                    return CaptureError::ConnectionLost(e.to_string());
                }
                metrics::counter!("transport.sent").increment(1);
            }
            frame = reader.next() => match frame {
                None => return CaptureError::ConnectionLost("stream ended".into()),
                Some(Ok(Message::Close(frame))) => {
                    return CaptureError::ConnectionLost(format!("closed by collector ({frame:?})"));
                }
                // Inbound data is not part of the protocol; pings are answered by tungstenite.
                Some(Ok(_)) => {}
                Some(Err(e)) => return CaptureError::ConnectionLost(e.to_string()),
            },
        }
    }
}

fn enqueue(outbound: &mpsc::Sender<String>, text: String) -> CaptureResult<()> {
    outbound.try_send(text).map_err(|e| match e {
        mpsc::error::TrySendError::Full(_) => CaptureError::QueueFull {
            capacity: outbound.max_capacity(),
        },
        mpsc::error::TrySendError::Closed(_) => CaptureError::TransportUnavailable,
    })
}

fn discard_pending(outbound: &mut mpsc::Receiver<String>) -> u64 {
    let mut discarded = 0;
    while outbound.try_recv().is_ok() {
        discarded += 1;
    }
    discarded
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use capture_core::types::{InputData, WheelData};

    /// A loopback port that was just released, so connections are refused.
    async fn unreachable_config() -> TransportConfig {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        TransportConfig {
            host: "127.0.0.1".into(),
            port,
            reconnect_interval_ms: 50,
            ..TransportConfig::default()
        }
    }

    #[tokio::test]
    async fn test_send_while_not_open_is_silent() {
        let transport = Transport::connect(&unreachable_config().await).unwrap();
        assert_ne!(transport.state(), ConnectionState::Open);
        assert_eq!(transport.policy(), DeliveryPolicy::DropOnDisconnected);

        let data = EventData::Input(InputData {
            value: "x".into(),
            x: 0.0,
            y: 0.0,
        });
        transport.send(EventClass::Input, &data);
        assert!(matches!(
            transport.try_send(EventClass::Input, &data),
            Err(CaptureError::TransportUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_mismatched_class_is_rejected() {
        let transport = Transport::connect(&unreachable_config().await).unwrap();
        let data = EventData::Wheel(WheelData::default());
        assert!(matches!(
            transport.try_send(EventClass::Click, &data),
            Err(CaptureError::Wire(_))
        ));
    }

    #[tokio::test]
    async fn test_retries_forever_against_dead_collector() {
        let transport = Transport::connect(&unreachable_config().await).unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(transport.connect_attempts() >= 3);
        assert_ne!(transport.state(), ConnectionState::Open);
    }

    #[test]
    fn test_connect_requires_runtime() {
        assert!(Transport::connect(&TransportConfig::default()).is_err());
    }

    #[test]
    fn test_discard_pending_drains_queue() {
        let (tx, mut rx) = mpsc::channel(4);
        enqueue(&tx, "a".to_string()).unwrap();
        enqueue(&tx, "b".to_string()).unwrap();
        assert_eq!(discard_pending(&mut rx), 2);
        assert_eq!(discard_pending(&mut rx), 0);
    }

    #[test]
    fn test_full_queue_drops_instead_of_growing() {
        let (tx, mut rx) = mpsc::channel(2);
        enqueue(&tx, "a".to_string()).unwrap();
        enqueue(&tx, "b".to_string()).unwrap();
        assert!(matches!(
            enqueue(&tx, "c".to_string()),
            Err(CaptureError::QueueFull { capacity: 2 })
        ));
        assert_eq!(discard_pending(&mut rx), 2);

        drop(rx);
        assert!(matches!(
            enqueue(&tx, "d".to_string()),
            Err(CaptureError::TransportUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_wait_for_state_times_out() {
        let transport = Transport::connect(&unreachable_config().await).unwrap();
        assert!(
            !transport
                .wait_for_state(ConnectionState::Open, Duration::from_millis(200))
                .await
        );
        assert!(
            transport
                .wait_for_state(ConnectionState::ClosedPendingRetry, Duration::from_secs(3))
                .await
        );
    }
}
