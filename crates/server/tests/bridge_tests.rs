//! End-to-end tests over a real loopback socket.

mod support;

use ntbridge_core::MarketPosition;
use ntbridge_server::BridgeConfig;
use ntbridge_sim::{HistoryMode, SimulatedPlatform};
use rust_decimal_macros::dec;
use std::time::{Duration, Instant};
use support::{TestBridge, TestClient};
use tokio::io::AsyncWriteExt;

#[tokio::test]
async fn test_login_subscribe_price_logout_scenario() {
    let bridge = TestBridge::start().await;
    let mut client = bridge.client().await;

    assert_eq!(client.send("LOGIN:Sim101").await, "OK:Logged in to Sim101");
    assert_eq!(
        client.send("SUBSCRIBE:ESZ25").await,
        "OK:Subscribed:ESZ25:0.25:50"
    );
    assert_eq!(
        client.send("GETPRICE:ESZ25").await,
        "PRICE:5000.25:5000:5000.5:1250000"
    );
    assert_eq!(client.send("LOGOUT").await, "OK:Logged out");
    assert_eq!(client.send("GETACCOUNT").await, "ERROR:Not logged in");

    bridge.handle.shutdown().await;
}

#[tokio::test]
async fn test_unknown_command_keeps_connection_open() {
    let bridge = TestBridge::start().await;
    let mut client = bridge.client().await;

    assert_eq!(client.send("FOO:1").await, "ERROR:Unknown command: FOO");
    assert_eq!(client.send("  ping \r\n").await, "PONG");
}

#[tokio::test]
async fn test_short_commands_never_reach_platform() {
    let bridge = TestBridge::start().await;
    let mut client = bridge.client().await;
    assert_eq!(client.send("LOGIN:Sim101").await, "OK:Logged in to Sim101");

    let before = bridge.platform.call_count();
    for line in [
        "LOGIN",
        "SUBSCRIBE",
        "UNSUBSCRIBE",
        "GETPRICE",
        "GETPOSITION",
        "PLACEORDER:BUY",
        "CANCELORDER",
        "GETORDERSTATUS",
        "SETLOGLEVEL",
        "GETHISTORY:ESZ25",
    ] {
        let response = client.send(line).await;
        assert!(response.starts_with("ERROR:"), "{line} -> {response}");
    }
    assert_eq!(bridge.platform.call_count(), before);
}

#[tokio::test]
async fn test_position_sign_over_the_wire() {
    let bridge = TestBridge::start().await;
    let mut client = bridge.client().await;
    client.send("LOGIN:Sim101").await;

    assert_eq!(client.send("GETPOSITION:MESH26").await, "POSITION:0:0");

    bridge
        .platform
        .set_position("Sim101", "MES 03-26", MarketPosition::Short, 3, dec!(5050));
    assert_eq!(client.send("GETPOSITION:MESH26").await, "POSITION:-3:5050");

    bridge
        .platform
        .set_position("Sim101", "MES 03-26", MarketPosition::Long, 3, dec!(5050));
    assert_eq!(client.send("GETPOSITION:MES 0326").await, "POSITION:3:5050");
}

#[tokio::test]
async fn test_login_is_shared_across_connections() {
    let bridge = TestBridge::start().await;
    let mut first = bridge.client().await;
    let mut second = bridge.client().await;

    assert_eq!(second.send("CONNECTED").await, "CONNECTED:0");
    first.send("LOGIN:Sim102").await;
    assert_eq!(second.send("CONNECTED").await, "CONNECTED:1");
    assert_eq!(second.send("GETACCOUNT").await, "ACCOUNT:50000:50000:0:0");
}

#[tokio::test]
async fn test_concurrent_subscribers_see_their_own_symbols() {
    let bridge = TestBridge::start().await;
    let symbols = [
        "ESZ25",
        "ES 12-25",
        "MESH26",
        "MES 03-26",
        "NQZ25",
        "NQ 12-25",
    ];

    let mut tasks = Vec::new();
    for symbol in symbols {
        let addr = bridge.addr();
        tasks.push(tokio::spawn(async move {
            let mut client = TestClient::connect(addr).await;
            for _ in 0..25 {
                let subscribed = client.send(&format!("SUBSCRIBE:{symbol}")).await;
                assert!(subscribed.starts_with("OK:Subscribed:"), "{subscribed}");
                let price = client.send(&format!("GETPRICE:{symbol}")).await;
                assert!(price.starts_with("PRICE:"), "{symbol}: {price}");
            }
        }));
    }

    // Unrelated churn on the same registry
    let addr = bridge.addr();
    tasks.push(tokio::spawn(async move {
        let mut client = TestClient::connect(addr).await;
        for _ in 0..25 {
            client.send("SUBSCRIBE:NQ 1225").await;
            client.send("UNSUBSCRIBE:NQ 1225").await;
            client.send("UNSUBSCRIBE:CLF26").await;
        }
    }));

    for task in tasks {
        task.await.expect("client task");
    }
    assert_eq!(bridge.session.subscription_count(), symbols.len());
}

#[tokio::test]
async fn test_failed_order_leaves_registry_untouched() {
    let bridge = TestBridge::start().await;
    let mut client = bridge.client().await;
    client.send("LOGIN:Sim101").await;

    assert_eq!(
        client.send("PLACEORDER:BUY:ESZ25:0:MARKET").await,
        "ERROR:Order rejected: quantity must be positive"
    );
    assert_eq!(bridge.session.tracked_order_count(), 0);

    let placed = client.send("PLACEORDER:BUY:ESZ25:1:MARKET").await;
    let order_id = placed.strip_prefix("ORDER:").expect("order id");
    assert_eq!(bridge.session.tracked_order_count(), 1);
    assert_eq!(
        client.send(&format!("GETORDERSTATUS:{order_id}")).await,
        format!("ORDERSTATUS:{order_id}:Filled:1:5000.25")
    );
}

#[tokio::test]
async fn test_history_timeout_is_bounded() {
    let config = BridgeConfig {
        history_timeout_secs: 1,
        history_poll_millis: 20,
        ..Default::default()
    };
    let platform = SimulatedPlatform::default();
    platform.set_history_mode(HistoryMode::Silent);
    let bridge = TestBridge::start_with(platform, config).await;

    let mut client = bridge.client().await;
    let mut other = bridge.client().await;
    client.send("LOGIN:Sim101").await;

    let started = Instant::now();
    let waiting = tokio::spawn(async move {
        client.send("GETHISTORY:ESZ25:45975:45976:5:100").await
    });
    // Other connections keep being served meanwhile
    assert_eq!(other.send("PING").await, "PONG");
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(waiting.await.unwrap(), "ERROR:Bars request timeout");
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert_eq!(bridge.platform.unanswered_history_requests(), 1);
}

#[tokio::test]
async fn test_disconnect_does_not_affect_other_clients() {
    let bridge = TestBridge::start().await;
    let mut survivor = bridge.client().await;

    let mut dropped = tokio::net::TcpStream::connect(bridge.addr()).await.unwrap();
    dropped.write_all(b"PING").await.unwrap();
    dropped.shutdown().await.unwrap();
    drop(dropped);

    assert_eq!(survivor.send("VERSION").await, "VERSION:1.0");
}

#[tokio::test]
async fn test_shutdown_stops_accepting() {
    let bridge = TestBridge::start().await;
    let addr = bridge.addr();
    assert!(bridge.handle.is_running());

    bridge.handle.shutdown().await;
    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
}
