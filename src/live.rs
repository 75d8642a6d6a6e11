use crate::config::LIVE_RECONNECT_DELAY;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};

#[derive(Clone, Debug, PartialEq)]
pub enum LiveUpdate {
    Connected,
    Price(f64),
    Disconnected,
}

#[derive(Deserialize)]
struct PriceMessage {
    price: f64,
}

/// Substitutes the symbol into a URL template such as `wss://host/ws/stocks/{symbol}`.
pub fn endpoint_for(template: &str, symbol: &str) -> String {
    template.replace("{symbol}", symbol)
}

/// Extracts `price` from a `{"price": <number>}` message.
pub fn parse_price(text: &str) -> Option<f64> {
    serde_json::from_str::<PriceMessage>(text)
        .ok()
        .map(|m| m.price)
        .filter(|p| p.is_finite())
}

pub fn format_price_label(price: Option<f64>) -> String {
    match price {
        Some(p) => format!("Real-Time Price: {} USD", p),
        None => "Real-Time Price: N/A".to_string(),
    }
}

/// A running price stream for one symbol. Dropping it stops the stream.
pub struct LiveFeed {
    symbol: String,
    task: JoinHandle<()>,
    updates: mpsc::UnboundedReceiver<LiveUpdate>,
}

impl LiveFeed {
    pub fn start<F>(template: &str, symbol: &str, runtime: &Handle, notify: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let url = endpoint_for(template, symbol);
        let (tx, rx) = mpsc::unbounded_channel();
        info!("Starting live feed for {} at {}", symbol, url);
        let task = runtime.spawn(run_feed_loop(url, tx, notify));
        Self {
            symbol: symbol.to_string(),
            task,
            updates: rx,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn try_recv(&mut self) -> Option<LiveUpdate> {
        self.updates.try_recv().ok()
    }
}

impl Drop for LiveFeed {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_feed_loop<F>(url: String, tx: mpsc::UnboundedSender<LiveUpdate>, notify: F)
where
    F: Fn() + Send + Sync + 'static,
{
    loop {
        match connect_async(url.as_str()).await {
            Ok((ws_stream, _)) => {
                info!("Live feed connected: {}", url);
                if tx.send(LiveUpdate::Connected).is_err() {
                    return;
                }
                let (mut write, mut read) = ws_stream.split();

                while let Some(msg) = read.next().await {
                    match msg {
                        Ok(Message::Text(text)) => match parse_price(&text) {
                            Some(price) => {
                                if tx.send(LiveUpdate::Price(price)).is_err() {
                                    return;
                                }
                                notify();
                            }
                            None => debug!("Ignoring live feed message: {}", text),
                        },
                        Ok(Message::Ping(payload)) => {
                            let _ = write.send(Message::Pong(payload)).await;
                        }
                        Ok(Message::Close(_)) => break,
                        Ok(_) => {}
                        Err(err) => {
                            warn!("Live feed read error: {}", err);
                            break;
                        }
                    }
                }
                warn!("Live feed disconnected; reconnecting...");
            }
            Err(err) => warn!("Live feed connect failed {}: {}", url, err),
        }

        if tx.send(LiveUpdate::Disconnected).is_err() {
            return;
        }
        notify();
        tokio::time::sleep(LIVE_RECONNECT_DELAY).await;
    }
}
