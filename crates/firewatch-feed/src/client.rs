use crate::parser::{parse_frame, FeedFrame};
use crate::subscriptions::{ping, subscribe_incidents, unsubscribe_incidents};
use anyhow::Context;
use firewatch_core::ChangeEvent;
use futures_util::{SinkExt, StreamExt};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);
const IDLE_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(300);
const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Signals emitted towards the feed adapter. `Connected` fires once per
/// (re)connection and triggers a fresh bootstrap, since the channel offers
/// no replay-from-offset.
#[derive(Debug, Clone)]
pub enum FeedSignal {
    Connected,
    Disconnected,
    Change(ChangeEvent),
}

/// Websocket client for the incidents change feed. Owns the connection
/// lifecycle: subscribe, keepalive pings, idle detection, reconnect with
/// exponential backoff, and clean teardown when the shutdown watch flips.
pub struct FeedClient {
    ws_url: String,
    ping_interval: Duration,
    tx: mpsc::UnboundedSender<FeedSignal>,
}

impl FeedClient {
    pub fn new(
        ws_url: impl Into<String>,
        ping_interval: Duration,
        tx: mpsc::UnboundedSender<FeedSignal>,
    ) -> Self {
        Self {
            ws_url: ws_url.into(),
            ping_interval,
            tx,
        }
    }

    pub fn with_default_ping(ws_url: impl Into<String>, tx: mpsc::UnboundedSender<FeedSignal>) -> Self {
        Self::new(ws_url, DEFAULT_PING_INTERVAL, tx)
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let mut reconnect_delay = INITIAL_RECONNECT_DELAY;
        let mut attempt = 0u64;

        loop {
            match self.connect_and_run(&mut shutdown).await {
                Ok(true) => {
                    info!("feed client shut down");
                    return Ok(());
                }
                Ok(false) => {
                    // Server-side close, reset backoff
                    reconnect_delay = INITIAL_RECONNECT_DELAY;
                }
                Err(e) => {
                    error!("feed connection error: {}", e);
                }
            }
            attempt += 1;
            metrics::counter!("feed_reconnects_total").increment(1);
            let _ = self.tx.send(FeedSignal::Disconnected);

            let jitter = Duration::from_millis(jitter_ms() % 1000);
            let delay = reconnect_delay + jitter;
            warn!("reconnecting in {:?} (attempt {})", delay, attempt);
            tokio::select! {
                _ = sleep(delay) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("feed client shut down during backoff");
                        return Ok(());
                    }
                }
            }

            reconnect_delay = (reconnect_delay * 2).min(MAX_RECONNECT_DELAY);
        }
    }

    /// Returns Ok(true) if shutdown was requested, Ok(false) on a normal
    /// server-side close.
    async fn connect_and_run(&self, shutdown: &mut watch::Receiver<bool>) -> anyhow::Result<bool> {
        info!("connecting to {}", self.ws_url);
        let (ws_stream, _) = connect_async(&self.ws_url)
            .await
            .context("failed to connect to incident feed")?;

        let (mut write, mut read) = ws_stream.split();

        let sub = serde_json::to_string(&subscribe_incidents())?;
        write.send(Message::Text(sub)).await?;
        info!("subscribed to incidents channel");
        let _ = self.tx.send(FeedSignal::Connected);

        // Pings are queued from a ticker task and written by the main loop
        let (ping_tx, mut ping_rx) = mpsc::unbounded_channel();
        let ping_interval = self.ping_interval;
        let ping_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(ping_interval);
            loop {
                interval.tick().await;
                if let Ok(msg) = serde_json::to_string(&ping()) {
                    if ping_tx.send(msg).is_err() {
                        break;
                    }
                    debug!("queued ping");
                }
            }
        });

        let mut last_activity = Instant::now();

        loop {
            tokio::select! {
                msg_opt = read.next() => {
                    match msg_opt {
                        Some(Ok(msg)) => {
                            last_activity = Instant::now();
                            match msg {
                                Message::Text(text) => self.handle_frame(&text),
                                Message::Close(_) => {
                                    info!("feed closed by server");
                                    break;
                                }
                                Message::Ping(_) | Message::Pong(_) => {
                                    // Handled by tokio-tungstenite
                                }
                                _ => {}
                            }
                        }
                        Some(Err(e)) => {
                            error!("feed socket error: {}", e);
                            break;
                        }
                        None => {
                            info!("feed stream ended");
                            break;
                        }
                    }
                }
                ping_msg_opt = ping_rx.recv() => {
                    match ping_msg_opt {
                        Some(ping_msg) => {
                            if write.send(Message::Text(ping_msg)).await.is_err() {
                                break;
                            }
                            debug!("sent ping");
                        }
                        None => break,
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("tearing down feed subscription");
                        if let Ok(msg) = serde_json::to_string(&unsubscribe_incidents()) {
                            let _ = write.send(Message::Text(msg)).await;
                        }
                        let _ = write.send(Message::Close(None)).await;
                        ping_task.abort();
                        return Ok(true);
                    }
                }
            }

            if last_activity.elapsed() > IDLE_TIMEOUT {
                warn!("feed idle timeout, reconnecting");
                break;
            }
        }

        ping_task.abort();
        Ok(false)
    }

    fn handle_frame(&self, text: &str) {
        match parse_frame(text) {
            Ok(FeedFrame::Change(msg)) => match msg.into_change_event() {
                Ok(event) => {
                    let _ = self.tx.send(FeedSignal::Change(event));
                }
                Err(e) => warn!("dropping malformed change notification: {}", e),
            },
            Ok(FeedFrame::Ack(ack)) => {
                if let Some(err) = &ack.error {
                    error!("feed ack error: {}", err);
                } else {
                    debug!("ack: method={}, success={:?}", ack.method, ack.success);
                }
            }
            Ok(FeedFrame::Status(msg)) => {
                info!("feed status: {} - {}", msg.data.system, msg.data.status);
            }
            Ok(FeedFrame::Heartbeat) => debug!("heartbeat"),
            Ok(FeedFrame::Ping) => debug!("ping"),
            Err(e) => warn!("failed to parse frame: {} (frame: {})", e, text),
        }
    }
}

// Small xorshift-style jitter source; not worth a rand dependency
fn jitter_ms() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static SEED: AtomicU64 = AtomicU64::new(12345);
    let mut seed = SEED.load(Ordering::Relaxed);
    seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
    SEED.store(seed, Ordering::Relaxed);
    seed
}
