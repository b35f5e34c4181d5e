//! Trade Stream Server Integration Tests
//!
//! Connects real WebSocket clients to `/trades` and checks the snapshot
//! frame, live trade frames and shutdown.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;
use rust_decimal::Decimal;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use market_trade_broker::application::ports::{NoOpTradePublisher, TradePublisher};
use market_trade_broker::{
    BroadcastConfig, EnrichedTrade, RawTradeEvent, StreamMessage, StreamServerState,
    TradeBroadcastHub, TradeStreamServer,
};

type Client = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

fn trade(price: i64) -> EnrichedTrade {
    EnrichedTrade::without_context(&RawTradeEvent::live(
        Decimal::from(price),
        Decimal::ONE,
        Utc::now(),
    ))
}

async fn start_server(
    hub: Arc<TradeBroadcastHub>,
) -> (SocketAddr, Arc<StreamServerState>, CancellationToken) {
    let cancel = CancellationToken::new();
    let state = Arc::new(StreamServerState::new(hub, cancel.clone()));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server_state = Arc::clone(&state);
    tokio::spawn(async move {
        TradeStreamServer::serve(listener, server_state).await.unwrap();
    });

    (addr, state, cancel)
}

async fn connect(addr: SocketAddr) -> Client {
    let (client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/trades"))
        .await
        .unwrap();
    client
}

async fn next_frame(client: &mut Client) -> StreamMessage {
    loop {
        let message = timeout(Duration::from_secs(2), client.next())
            .await
            .expect("frame before timeout")
            .expect("stream open")
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn wait_for_clients(state: &StreamServerState, expected: usize) {
    timeout(Duration::from_secs(2), async {
        while state.client_count() != expected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("client count reached");
}

#[tokio::test]
async fn snapshot_then_live_trades() {
    let hub = Arc::new(TradeBroadcastHub::with_defaults());
    hub.register_snapshot_provider(Arc::new(|| vec![trade(1), trade(2)]));
    let (addr, state, cancel) = start_server(Arc::clone(&hub)).await;

    let mut client = connect(addr).await;

    match next_frame(&mut client).await {
        StreamMessage::Snapshot { trades } => {
            let prices: Vec<_> = trades.iter().map(|t| t.price).collect();
            assert_eq!(prices, vec![Decimal::from(1), Decimal::from(2)]);
        }
        other => panic!("expected snapshot, got {other:?}"),
    }

    wait_for_clients(&state, 1).await;
    assert_eq!(hub.publish(&trade(3)), 1);

    match next_frame(&mut client).await {
        StreamMessage::Trade { trade } => assert_eq!(trade.price, Decimal::from(3)),
        other => panic!("expected trade, got {other:?}"),
    }

    cancel.cancel();
}

#[tokio::test]
async fn empty_snapshot_without_provider() {
    let hub = Arc::new(TradeBroadcastHub::with_defaults());
    let (addr, _state, cancel) = start_server(hub).await;

    let mut client = connect(addr).await;
    assert_eq!(
        next_frame(&mut client).await,
        StreamMessage::Snapshot { trades: vec![] }
    );

    cancel.cancel();
}

#[tokio::test]
async fn every_client_receives_each_trade() {
    let hub = Arc::new(TradeBroadcastHub::with_defaults());
    let (addr, state, cancel) = start_server(Arc::clone(&hub)).await;

    let mut a = connect(addr).await;
    let mut b = connect(addr).await;
    next_frame(&mut a).await;
    next_frame(&mut b).await;
    wait_for_clients(&state, 2).await;

    assert_eq!(hub.publish(&trade(5)), 2);

    for client in [&mut a, &mut b] {
        assert!(matches!(
            next_frame(client).await,
            StreamMessage::Trade { trade } if trade.price == Decimal::from(5)
        ));
    }

    cancel.cancel();
}

#[tokio::test]
async fn slow_client_is_told_it_lagged() {
    let hub = Arc::new(TradeBroadcastHub::new(BroadcastConfig { capacity: 2 }));
    let (addr, state, cancel) = start_server(Arc::clone(&hub)).await;

    let mut client = connect(addr).await;
    next_frame(&mut client).await;
    wait_for_clients(&state, 1).await;

    // The server task forwards as fast as it can; publish a burst larger
    // than the buffer before yielding so the receiver overflows.
    for price in 0..10 {
        hub.publish(&trade(price));
    }

    let mut saw_lagged = false;
    let mut last_price = None;
    while last_price != Some(Decimal::from(9)) {
        match next_frame(&mut client).await {
            StreamMessage::Lagged { skipped } => {
                assert!(skipped > 0);
                saw_lagged = true;
            }
            StreamMessage::Trade { trade } => last_price = Some(trade.price),
            StreamMessage::Snapshot { .. } => panic!("snapshot sent twice"),
        }
    }
    assert!(saw_lagged);
    assert_eq!(state.client_count(), 1);

    cancel.cancel();
}

#[tokio::test]
async fn client_disconnect_is_tracked() {
    let hub = Arc::new(TradeBroadcastHub::with_defaults());
    let (addr, state, cancel) = start_server(Arc::clone(&hub)).await;

    let mut client = connect(addr).await;
    next_frame(&mut client).await;
    wait_for_clients(&state, 1).await;

    client.close(None).await.unwrap();
    drop(client);
    wait_for_clients(&state, 0).await;

    // No receivers left: publishing still succeeds.
    assert_eq!(hub.publish(&trade(1)), 0);
    assert_eq!(NoOpTradePublisher.publish(&trade(1)), 0);

    cancel.cancel();
}

#[tokio::test]
async fn shutdown_closes_clients() {
    let hub = Arc::new(TradeBroadcastHub::with_defaults());
    let (addr, state, cancel) = start_server(hub).await;

    let mut client = connect(addr).await;
    next_frame(&mut client).await;
    wait_for_clients(&state, 1).await;

    cancel.cancel();

    let closed = timeout(Duration::from_secs(2), async {
        loop {
            match client.next().await {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok());
}
