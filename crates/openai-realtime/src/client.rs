use crate::client::stats::Stats;
use crate::types;
use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex};
use tokio_tungstenite::tungstenite::Message;

pub mod config;
pub(crate) mod consts;
mod stats;
mod utils;

pub use config::{Config, ConfigBuilder};
pub use stats::Stats as UsageStats;

pub type ClientTx = tokio::sync::mpsc::Sender<types::ClientEvent>;
type ServerTx = tokio::sync::broadcast::Sender<types::ServerEvent>;
pub type ServerRx = tokio::sync::broadcast::Receiver<types::ServerEvent>;

// Contains the capacity for channels, client/server transmitters, configuration,
// and stats guarded by a Mutex.
pub struct Client {
    capacity: usize,
    config: Config,
    c_tx: Option<ClientTx>,
    s_tx: Option<ServerTx>,
    stats: Arc<Mutex<Stats>>,
}

impl Client {
    fn new(capacity: usize, config: Config) -> Self {
        Self {
            capacity,
            config,
            c_tx: None,
            s_tx: None,
            stats: Arc::new(Mutex::new(Stats::new())),
        }
    }

    async fn connect(&mut self) -> Result<()> {
        if self.c_tx.is_some() {
            return Err(anyhow::anyhow!("already connected"));
        }

        let request = utils::build_request(&self.config)?;
        let (ws_stream, _) = tokio_tungstenite::connect_async(request).await?;
        let (mut write, mut read) = ws_stream.split();

        let (c_tx, mut c_rx) = tokio::sync::mpsc::channel::<types::ClientEvent>(self.capacity);
        let (s_tx, _) = tokio::sync::broadcast::channel(self.capacity);

        self.c_tx = Some(c_tx);
        self.s_tx = Some(s_tx.clone());

        // Writer: runs until every sender is dropped, then closes the socket.
        tokio::spawn(async move {
            while let Some(event) = c_rx.recv().await {
                match serde_json::to_string(&event) {
                    Ok(text) => {
                        tracing::debug!(event_type = event.kind(), "sending client event");
                        if let Err(e) = write.send(Message::Text(text)).await {
                            tracing::error!("failed to send message: {}", e);
                        }
                    }
                    Err(e) => {
                        tracing::error!("failed to serialize event: {}", e);
                    }
                }
            }
            if let Err(e) = write.close().await {
                tracing::debug!("socket already closed: {}", e);
            }
        });

        let stats = self.stats.clone();
        // Reader: forwards every JSON message untouched and records token usage
        // from `response.done` as a side channel.
        tokio::spawn(async move {
            let mut close_reason = None;
            while let Some(message) = read.next().await {
                let message = match message {
                    Err(e) => {
                        tracing::error!("failed to read message: {}", e);
                        close_reason = Some(e.to_string());
                        break;
                    }
                    Ok(message) => message,
                };
                match message {
                    Message::Text(text) => {
                        let json = match serde_json::from_str::<serde_json::Value>(&text) {
                            Ok(json) => json,
                            Err(e) => {
                                tracing::warn!("dropping non-JSON message: {}", e);
                                continue;
                            }
                        };
                        let event_type = json.get("type").and_then(|v| v.as_str());
                        let event_id = json.get("event_id").and_then(|v| v.as_str());
                        tracing::debug!(
                            "received message: {}, id={}",
                            event_type.unwrap_or("unknown"),
                            event_id.unwrap_or("unknown")
                        );

                        if event_type == Some("response.done") {
                            record_usage(&stats, &json);
                        }

                        if let Err(e) = s_tx.send(types::ServerEvent::Message(json)) {
                            tracing::debug!("no subscribers for server event: {}", e);
                        }
                    }
                    Message::Binary(bin) => {
                        tracing::warn!("unexpected binary message: {} bytes", bin.len());
                    }
                    Message::Close(reason) => {
                        tracing::info!("connection closed: {:?}", reason);
                        close_reason = reason.map(|v| v.reason.to_string());
                        break;
                    }
                    _ => {}
                }
            }
            let close_event = types::ServerEvent::Close {
                reason: close_reason,
            };
            if let Err(e) = s_tx.send(close_event) {
                tracing::debug!("no subscribers for close event: {}", e);
            }
        });
        Ok(())
    }

    // Get a server receiver that we can use to receive server events.
    pub fn server_events(&self) -> Result<ServerRx> {
        match self.s_tx {
            Some(ref tx) => Ok(tx.subscribe()),
            None => Err(anyhow::anyhow!("not connected yet")),
        }
    }

    /// A cloneable handle for sending client events from other tasks.
    pub fn sender(&self) -> Result<ClientTx> {
        match self.c_tx {
            Some(ref tx) => Ok(tx.clone()),
            None => Err(anyhow::anyhow!("not connected yet")),
        }
    }

    // Return a stats object that we can use to inspect the stats.
    pub fn stats(&self) -> Result<Stats> {
        if let Ok(stats_guard) = self.stats.lock() {
            Ok(stats_guard.clone())
        } else {
            Err(anyhow::anyhow!("failed to get stats"))
        }
    }

    /// Send a client event.
    pub async fn send(&self, event: types::ClientEvent) -> Result<()> {
        match self.c_tx {
            Some(ref tx) => {
                tx.send(event).await?;
                Ok(())
            }
            None => Err(anyhow::anyhow!("not connected yet")),
        }
    }

    /// Drops the outbound sender; the writer task closes the socket once any
    /// queued events are flushed.
    pub fn close(&mut self) {
        if self.c_tx.take().is_some() {
            tracing::info!("closing realtime channel");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.c_tx.is_some()
    }
}

fn record_usage(stats: &Mutex<Stats>, json: &serde_json::Value) {
    let Some(usage) = json.pointer("/response/usage") else {
        return;
    };
    let read = |key: &str| usage.get(key).and_then(|v| v.as_u64()).unwrap_or(0);
    let (total, input, output) = (
        read("total_tokens"),
        read("input_tokens"),
        read("output_tokens"),
    );
    if let Ok(mut stats_guard) = stats.lock() {
        stats_guard.update_usage(total, input, output);
    } else {
        tracing::error!("failed to update stats");
    }
    tracing::debug!(
        "total_tokens: {}, input_tokens: {}, output_tokens: {}",
        total,
        input,
        output
    );
}

// Public function to create a client with specific config and connect to OpenAI.
pub async fn connect_with_config(capacity: usize, config: Config) -> Result<Client> {
    let mut client = Client::new(capacity, config);
    client.connect().await?;
    Ok(client)
}
