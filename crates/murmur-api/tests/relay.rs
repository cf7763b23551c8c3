mod common;

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use common::{eventually, serve, test_app};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(addr: std::net::SocketAddr, query: &str) -> Client {
    let (ws, _) = connect_async(format!("ws://{}/ws?{}", addr, query)).await.unwrap();
    ws
}

async fn recv_json(client: &mut Client) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .expect("message within timeout")
            .expect("stream open")
            .expect("valid frame");
        if let Message::Text(_) = msg {
            return serde_json::from_str(msg.to_text().unwrap()).unwrap();
        }
    }
}

async fn assert_silent(client: &mut Client) {
    let next = tokio::time::timeout(Duration::from_millis(200), client.next()).await;
    assert!(next.is_err(), "expected no frame, got {:?}", next);
}

#[tokio::test]
async fn message_fans_out_to_everyone_but_sender_and_is_stored() {
    let app = test_app();
    let addr = serve(&app).await;

    let mut alice = connect(addr, "user_id=1&from_id=2").await;
    let mut bob = connect(addr, "user_id=2").await;
    let mut carol = connect(addr, "user_id=3").await;
    assert!(eventually(|| app.relay.registry().len() == 3).await);

    // Spoofed sender and counterpart are overwritten server side.
    alice
        .send(Message::text(r#"{"user_id":3,"content":"hi","from_id":7}"#))
        .await
        .unwrap();

    let expected = json!({ "user_id": 1, "content": "hi", "from_id": 2 });
    assert_eq!(recv_json(&mut bob).await, expected);
    assert_eq!(recv_json(&mut carol).await, expected);
    assert_silent(&mut alice).await;

    assert!(eventually(|| app.db.get_conversation(1, 2).unwrap().len() == 1).await);
}

#[tokio::test]
async fn departed_peer_does_not_disturb_the_rest() {
    let app = test_app();
    let addr = serve(&app).await;

    let mut alice = connect(addr, "user_id=1&from_id=3").await;
    let mut bob = connect(addr, "user_id=2").await;
    let mut carol = connect(addr, "user_id=3").await;
    assert!(eventually(|| app.relay.registry().len() == 3).await);

    bob.close(None).await.unwrap();
    drop(bob);

    alice.send(Message::text(r#"{"content":"still here?"}"#)).await.unwrap();
    assert_eq!(recv_json(&mut carol).await["content"], "still here?");
    assert!(eventually(|| app.relay.registry().len() == 2).await);

    // The sender's own connection is unaffected.
    alice.send(Message::text(r#"{"content":"again"}"#)).await.unwrap();
    assert_eq!(recv_json(&mut carol).await["content"], "again");
}

#[tokio::test]
async fn messages_from_one_sender_keep_their_order() {
    let app = test_app();
    let addr = serve(&app).await;

    let mut alice = connect(addr, "user_id=1&from_id=2").await;
    let mut bob = connect(addr, "user_id=2&from_id=1").await;
    assert!(eventually(|| app.relay.registry().len() == 2).await);

    for content in ["a", "b", "c", "d"] {
        alice
            .send(Message::text(json!({ "content": content }).to_string()))
            .await
            .unwrap();
    }

    let mut received = Vec::new();
    for _ in 0..4 {
        received.push(recv_json(&mut bob).await["content"].as_str().unwrap().to_string());
    }
    assert_eq!(received, vec!["a", "b", "c", "d"]);
}

#[tokio::test]
async fn bad_frame_drops_only_that_connection() {
    let app = test_app();
    let addr = serve(&app).await;

    let mut alice = connect(addr, "user_id=1").await;
    let mut bob = connect(addr, "user_id=2").await;
    assert!(eventually(|| app.relay.registry().len() == 2).await);

    alice.send(Message::text("definitely not json")).await.unwrap();
    assert!(eventually(|| app.relay.registry().len() == 1).await);

    bob.send(Message::text(r#"{"content":"anyone?","from_id":1}"#)).await.unwrap();
    assert_silent(&mut bob).await;
    assert!(eventually(|| app.db.get_conversation(1, 2).unwrap().len() == 1).await);
}

#[tokio::test]
async fn connection_without_identity_is_rejected_before_upgrade() {
    let app = test_app();
    let addr = serve(&app).await;

    for query in ["", "user_id=", "user_id=abc", "user_id=0", "user_id=1&from_id=x"] {
        let err = connect_async(format!("ws://{}/ws?{}", addr, query))
            .await
            .expect_err("connection must be rejected");
        match err {
            WsError::Http(response) => assert_eq!(response.status().as_u16(), 400, "query {:?}", query),
            other => panic!("unexpected error for {:?}: {}", query, other),
        }
    }

    assert!(app.relay.registry().is_empty());
}

#[tokio::test]
async fn shutdown_closes_live_connections() {
    let app = test_app();
    let addr = serve(&app).await;

    let mut alice = connect(addr, "user_id=1").await;
    assert!(eventually(|| app.relay.registry().len() == 1).await);

    app.relay.shutdown().await;

    let closed = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match alice.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok());
    assert!(app.relay.registry().is_empty());
}
