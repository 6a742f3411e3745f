use crate::error::ExecutionError;
use crate::gateway::{ExchangeGateway, InstrumentCategory, Trade};
use crate::order::{Order, OrderId, OrderKind, PlaceOrderOutcome};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use gridfleet_instrument::Symbol;
use gridfleet_integration::channel::{mpsc_unbounded, Tx, UnboundedRx, UnboundedTx};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};

const RECONNECT_INITIAL: Duration = Duration::from_secs(5);
const RECONNECT_CAP: Duration = Duration::from_secs(15);

/// `LIVE` mode gateway (§4.1): real REST calls plus a reconnecting websocket trade stream.
///
/// The wire format of any particular exchange is out of scope (§6) - `rest_base`/`ws_url`
/// point at whatever venue the operator configured, and this type only assumes the abstract
/// shapes (`{symbol, price, ts}` trades; JSON REST responses) a typical venue exposes.
#[derive(Debug)]
pub struct LiveGateway {
    http: reqwest::Client,
    rest_base: String,
    ws_url: String,
    api_key: String,
    api_secret: String,
    subscribed: Mutex<HashSet<Symbol>>,
    command_tx: UnboundedTx<WsCommand, tokio::sync::mpsc::error::SendError<WsCommand>>,
}

#[derive(Debug, Clone)]
enum WsCommand {
    Subscribe(Symbol),
    Unsubscribe(Symbol),
}

#[derive(Deserialize)]
struct RestBalanceResponse {
    balance: Decimal,
}

#[derive(Deserialize)]
struct RestInstrumentsResponse {
    symbols: Vec<String>,
}

#[derive(Deserialize)]
struct RestOrderResponse {
    order_id: String,
    avg_price: Option<Decimal>,
}

impl LiveGateway {
    /// Spawns the background websocket-reconnection task and returns the gateway handle
    /// alongside the demultiplexed trade stream the Market Data Router consumes.
    pub fn new(
        rest_base: impl Into<String>,
        ws_url: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Result<(Self, UnboundedRx<Trade>), ExecutionError> {
        let api_key = api_key.into();
        let api_secret = api_secret.into();
        if api_key.is_empty() || api_secret.is_empty() {
            return Err(ExecutionError::MissingCredentials);
        }

        let (trade_tx, trade_rx) = mpsc_unbounded();
        let (command_tx, command_rx) = mpsc_unbounded();
        let ws_url_owned = ws_url.into();

        tokio::spawn(Self::run_socket(ws_url_owned.clone(), trade_tx, command_rx));

        Ok((
            Self {
                http: reqwest::Client::builder()
                    .timeout(Duration::from_secs(10))
                    .build()
                    .expect("reqwest client builder"),
                rest_base: rest_base.into(),
                ws_url: ws_url_owned,
                api_key,
                api_secret,
                subscribed: Mutex::new(HashSet::new()),
                command_tx,
            },
            trade_rx,
        ))
    }

    /// Connect-process-reconnect loop, exponential-capped per §4.1. Resubscribes every
    /// currently-subscribed symbol (tracked via `WsCommand`) immediately after each reconnect.
    async fn run_socket(
        ws_url: String,
        trade_tx: UnboundedTx<Trade, tokio::sync::mpsc::error::SendError<Trade>>,
        mut command_rx: UnboundedRx<WsCommand>,
    ) {
        let mut backoff = RECONNECT_INITIAL;
        let mut live_subscriptions: HashSet<Symbol> = HashSet::new();

        loop {
            match tokio_tungstenite::connect_async(&ws_url).await {
                Ok((mut stream, _response)) => {
                    info!(ws_url, "connected to exchange websocket");
                    backoff = RECONNECT_INITIAL;

                    for symbol in &live_subscriptions {
                        let _ = stream
                            .send(Message::text(subscribe_frame(symbol)))
                            .await;
                    }

                    loop {
                        tokio::select! {
                            command = command_rx.rx.recv() => {
                                match command {
                                    Some(WsCommand::Subscribe(symbol)) => {
                                        let _ = stream.send(Message::text(subscribe_frame(&symbol))).await;
                                        live_subscriptions.insert(symbol);
                                    }
                                    Some(WsCommand::Unsubscribe(symbol)) => {
                                        let _ = stream.send(Message::text(unsubscribe_frame(&symbol))).await;
                                        live_subscriptions.remove(&symbol);
                                    }
                                    None => return,
                                }
                            }
                            frame = stream.next() => {
                                match frame {
                                    Some(Ok(Message::Text(text))) => {
                                        if let Some(trade) = parse_trade(&text) {
                                            if trade_tx.send(trade).is_err() {
                                                return;
                                            }
                                        }
                                    }
                                    Some(Ok(_)) => continue,
                                    Some(Err(error)) => {
                                        warn!(%error, "exchange websocket error, reconnecting");
                                        break;
                                    }
                                    None => {
                                        warn!("exchange websocket closed, reconnecting");
                                        break;
                                    }
                                }
                            }
                        }
                    }
                }
                Err(error) => {
                    error!(%error, backoff_secs = backoff.as_secs(), "exchange websocket connect failed");
                }
            }

            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(RECONNECT_CAP);
        }
    }
}

fn subscribe_frame(symbol: &Symbol) -> String {
    format!(r#"{{"op":"subscribe","args":["trade.{}"]}}"#, symbol.as_str())
}

fn unsubscribe_frame(symbol: &Symbol) -> String {
    format!(r#"{{"op":"unsubscribe","args":["trade.{}"]}}"#, symbol.as_str())
}

#[derive(Deserialize)]
struct WireTrade {
    symbol: String,
    price: Decimal,
}

fn parse_trade(text: &str) -> Option<Trade> {
    let wire: WireTrade = serde_json::from_str(text).ok()?;
    Some(Trade {
        symbol: Symbol::new(wire.symbol),
        price: wire.price,
        ts: chrono::Utc::now(),
    })
}

#[async_trait]
impl ExchangeGateway for LiveGateway {
    async fn subscribe(&self, symbol: Symbol) -> Result<(), ExecutionError> {
        let mut subscribed = self.subscribed.lock().expect("live gateway subs poisoned");
        if !subscribed.insert(symbol.clone()) {
            return Ok(());
        }
        drop(subscribed);
        self.command_tx
            .send(WsCommand::Subscribe(symbol))
            .map_err(|_| ExecutionError::WalletBalance("websocket command channel closed".into()))
    }

    async fn unsubscribe(&self, symbol: Symbol) -> Result<(), ExecutionError> {
        let removed = self
            .subscribed
            .lock()
            .expect("live gateway subs poisoned")
            .remove(&symbol);
        if !removed {
            return Ok(());
        }
        let _ = self.command_tx.send(WsCommand::Unsubscribe(symbol));
        Ok(())
    }

    async fn place_order(&self, order: Order) -> Result<PlaceOrderOutcome, ExecutionError> {
        let response = self
            .http
            .post(format!("{}/order", self.rest_base))
            .header("X-API-KEY", &self.api_key)
            .header("X-API-SECRET", &self.api_secret)
            .json(&serde_json::json!({
                "symbol": order.symbol.as_str(),
                "side": order.side.to_string(),
                "type": matches!(order.kind, OrderKind::Market).then_some("MARKET").unwrap_or("LIMIT"),
                "qty": order.qty,
                "price": order.price,
                "client_order_id": order.client_order_id.to_string(),
            }))
            .send()
            .await
            .map_err(gridfleet_integration::error::IntegrationError::from)?;

        if !response.status().is_success() {
            let reason = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown rejection".to_string());
            return Ok(PlaceOrderOutcome::Rejected { reason });
        }

        let body: RestOrderResponse = response
            .json()
            .await
            .map_err(gridfleet_integration::error::IntegrationError::from)?;

        Ok(PlaceOrderOutcome::Accepted {
            order_id: OrderId(smol_str::SmolStr::new(body.order_id)),
            avg_price: body.avg_price,
        })
    }

    async fn get_instruments(
        &self,
        category: InstrumentCategory,
    ) -> Result<HashSet<Symbol>, ExecutionError> {
        let InstrumentCategory::Linear = category;
        let response = self
            .http
            .get(format!("{}/instruments?category=linear", self.rest_base))
            .send()
            .await
            .map_err(gridfleet_integration::error::IntegrationError::from)?;

        let body: RestInstrumentsResponse = response
            .json()
            .await
            .map_err(gridfleet_integration::error::IntegrationError::from)?;

        Ok(body.symbols.into_iter().map(Symbol::new).collect())
    }

    async fn get_wallet_balance(&self) -> Result<Decimal, ExecutionError> {
        let response = self
            .http
            .get(format!("{}/wallet", self.rest_base))
            .header("X-API-KEY", &self.api_key)
            .send()
            .await
            .map_err(gridfleet_integration::error::IntegrationError::from)?;

        let body: RestBalanceResponse = response
            .json()
            .await
            .map_err(gridfleet_integration::error::IntegrationError::from)?;

        Ok(body.balance)
    }
}
