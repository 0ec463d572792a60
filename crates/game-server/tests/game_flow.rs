//! End-to-end socket tests against a live server on an ephemeral port,
//! with a flat-price catalog so trade outcomes are exact regardless of
//! which window the daily sampler picks.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use game_server::scores::ScoreDb;
use game_server::{app, AppState};
use market_data::MarketCatalog;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Write a constant-price hourly series the catalog can load.
fn write_flat_series(dir: &PathBuf, symbol: &str, price: f64, len: usize) {
    let mut out = String::from("Datetime,Open,High,Low,Close,Volume\n");
    for i in 0..len {
        let ts = chrono::DateTime::from_timestamp(1_600_000_000 + i as i64 * 3600, 0).unwrap();
        out.push_str(&format!(
            "{},{price},{price},{price},{price},0\n",
            ts.format("%Y-%m-%d %H:%M:%S%z")
        ));
    }
    std::fs::write(dir.join(format!("{symbol}_1h.csv")), out).unwrap();
}

async fn spawn_server(tag: &str) -> (String, ScoreDb, PathBuf) {
    let dir = std::env::temp_dir().join(format!("coinduel-e2e-{tag}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    write_flat_series(&dir, "BTC", 50_000.0, 400);
    write_flat_series(&dir, "ETH", 4_000.0, 400);

    let scores = ScoreDb::connect("sqlite::memory:").await.unwrap();
    let state = AppState {
        catalog: Arc::new(MarketCatalog::new(&dir, 300)),
        scores: scores.clone(),
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app(state)).await.unwrap();
    });

    (format!("ws://{addr}/ws"), scores, dir)
}

async fn connect(url: &str) -> WsClient {
    let (socket, _) = connect_async(url).await.unwrap();
    socket
}

async fn send(socket: &mut WsClient, payload: Value) {
    socket
        .send(Message::Text(payload.to_string()))
        .await
        .unwrap();
}

async fn next_event(socket: &mut WsClient) -> Value {
    loop {
        let message = tokio::time::timeout(RECV_TIMEOUT, socket.next())
            .await
            .expect("timed out waiting for event")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Read events until one matches `pred`, failing on timeout.
async fn wait_for(socket: &mut WsClient, pred: impl Fn(&Value) -> bool) -> Value {
    loop {
        let event = next_event(socket).await;
        if pred(&event) {
            return event;
        }
    }
}

#[tokio::test]
async fn test_connect_announces_instruments() {
    let (url, _scores, dir) = spawn_server("announce").await;
    let mut socket = connect(&url).await;

    let event = next_event(&mut socket).await;
    assert_eq!(event["type"], "available_instruments");
    let instruments: Vec<String> =
        serde_json::from_value(event["instruments"].clone()).unwrap();
    assert_eq!(instruments, vec!["BTC", "ETH"]);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_start_game_sends_history() {
    let (url, _scores, dir) = spawn_server("history").await;
    let mut socket = connect(&url).await;

    send(
        &mut socket,
        json!({"type": "start_game", "username": "tester", "instruments": ["BTC"], "speed": 0.05}),
    )
    .await;

    let event = wait_for(&mut socket, |e| e["type"] == "history").await;
    assert_eq!(event["instrument"], "BTC");
    let candles = event["candles"].as_array().unwrap();
    assert_eq!(candles.len(), 60);
    assert_eq!(candles[0]["close"], 50_000.0);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_buy_updates_portfolio() {
    let (url, _scores, dir) = spawn_server("buy").await;
    let mut socket = connect(&url).await;

    send(
        &mut socket,
        json!({"type": "start_game", "instruments": ["BTC"], "speed": 0.05}),
    )
    .await;
    wait_for(&mut socket, |e| e["type"] == "history").await;

    // Spend the whole stack at the flat 50k price: 0.2 BTC, zero cash.
    send(
        &mut socket,
        json!({"type": "trade", "instrument": "BTC", "side": "BUY", "amount": 10000}),
    )
    .await;

    let state = wait_for(&mut socket, |e| {
        e["type"] == "portfolio_state" && e["cash"] == 0.0
    })
    .await;
    let btc = &state["positions"]["BTC"];
    assert_eq!(btc["amount"], 0.2);
    assert_eq!(btc["value"], 10_000.0);
    assert_eq!(state["total_value"], 10_000.0);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_round_trip_returns_cash() {
    let (url, _scores, dir) = spawn_server("roundtrip").await;
    let mut socket = connect(&url).await;

    send(
        &mut socket,
        json!({"type": "start_game", "instruments": ["BTC"], "speed": 0.05}),
    )
    .await;
    wait_for(&mut socket, |e| e["type"] == "history").await;

    send(
        &mut socket,
        json!({"type": "trade", "instrument": "BTC", "side": "BUY", "amount": 5000}),
    )
    .await;
    wait_for(&mut socket, |e| e["type"] == "portfolio_state" && e["cash"] == 5_000.0).await;

    // Price is flat, so selling the same notional closes the position
    // and restores the full balance.
    send(
        &mut socket,
        json!({"type": "trade", "instrument": "BTC", "side": "SELL", "amount": 5000}),
    )
    .await;
    let state = wait_for(&mut socket, |e| {
        e["type"] == "portfolio_state" && e["cash"] == 10_000.0
    })
    .await;
    assert_eq!(state["positions"]["BTC"]["amount"], 0.0);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_overdraft_rejected_with_error_event() {
    let (url, _scores, dir) = spawn_server("overdraft").await;
    let mut socket = connect(&url).await;

    send(
        &mut socket,
        json!({"type": "start_game", "instruments": ["BTC"], "speed": 0.05}),
    )
    .await;
    wait_for(&mut socket, |e| e["type"] == "history").await;

    send(
        &mut socket,
        json!({"type": "trade", "instrument": "BTC", "side": "BUY", "amount": 20000}),
    )
    .await;

    let event = wait_for(&mut socket, |e| e["type"] == "error").await;
    let message = event["message"].as_str().unwrap();
    assert!(message.contains("insufficient funds"), "got: {message}");

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_malformed_command_survives() {
    let (url, _scores, dir) = spawn_server("malformed").await;
    let mut socket = connect(&url).await;

    socket
        .send(Message::Text("certainly not json".to_string()))
        .await
        .unwrap();
    let event = wait_for(&mut socket, |e| e["type"] == "error").await;
    assert!(event["message"]
        .as_str()
        .unwrap()
        .contains("unrecognized command"));

    // The connection is still usable afterwards.
    send(
        &mut socket,
        json!({"type": "start_game", "instruments": ["BTC"], "speed": 0.05}),
    )
    .await;
    wait_for(&mut socket, |e| e["type"] == "history").await;

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_restart_replaces_running_game() {
    let (url, _scores, dir) = spawn_server("restart").await;
    let mut socket = connect(&url).await;

    send(
        &mut socket,
        json!({"type": "start_game", "instruments": ["BTC"], "speed": 0.05}),
    )
    .await;
    wait_for(&mut socket, |e| e["type"] == "history").await;

    // Starting over mid-game stops the old loop and deals a fresh hand.
    send(
        &mut socket,
        json!({"type": "start_game", "instruments": ["ETH"], "speed": 0.05}),
    )
    .await;
    let event = wait_for(&mut socket, |e| {
        e["type"] == "history" && e["instrument"] == "ETH"
    })
    .await;
    assert_eq!(event["candles"].as_array().unwrap().len(), 60);

    // The replacement session trades from a clean balance.
    send(
        &mut socket,
        json!({"type": "trade", "instrument": "ETH", "side": "BUY", "amount": 10000}),
    )
    .await;
    let state = wait_for(&mut socket, |e| {
        e["type"] == "portfolio_state" && e["cash"] == 0.0
    })
    .await;
    assert_eq!(state["positions"]["ETH"]["amount"], 2.5);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_trade_without_game_is_an_error() {
    let (url, _scores, dir) = spawn_server("nogame").await;
    let mut socket = connect(&url).await;

    send(
        &mut socket,
        json!({"type": "trade", "instrument": "BTC", "side": "BUY", "amount": 100}),
    )
    .await;
    let event = wait_for(&mut socket, |e| e["type"] == "error").await;
    assert_eq!(event["message"], "no game in progress");

    let _ = std::fs::remove_dir_all(&dir);
}
