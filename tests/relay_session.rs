//! End-to-end session tests against a miniature relay on a local port.

use std::future::Future;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};

use durak_session::{
    Card, Rank, RelayConfig, RoomId, SessionNotice, SessionSnapshot, SessionStore, Suit,
};

type RelaySocket = WebSocketStream<TcpStream>;

async fn relay() -> (TcpListener, RelayConfig) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let config = RelayConfig {
        host: "127.0.0.1".into(),
        port,
        reconnect_delay: Duration::from_millis(100),
        message_throttle: Duration::from_millis(50),
        connect_timeout: Duration::from_secs(2),
        ..Default::default()
    };
    (listener, config)
}

/// Accept one client, returning the socket and the request path.
async fn accept(listener: &TcpListener) -> (RelaySocket, String) {
    let (stream, _) = listener.accept().await.unwrap();
    let mut path = String::new();
    let ws = accept_hdr_async(
        stream,
        |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            path = request.uri().to_string();
            Ok(response)
        },
    )
    .await
    .unwrap();
    (ws, path)
}

async fn next_frame(ws: &mut RelaySocket) -> Value {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
            Some(Ok(_)) => continue,
            other => panic!("relay socket ended: {:?}", other),
        }
    }
}

async fn push(ws: &mut RelaySocket, frame: Value) {
    ws.send(Message::Text(frame.to_string())).await.unwrap();
}

async fn wait_for(session: &SessionStore, ready: impl FnMut(&SessionSnapshot) -> bool) {
    session.subscribe().wait_for(ready).await.unwrap();
}

async fn within<F: Future>(test: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(10), test)
        .await
        .expect("relay test timed out")
}

#[tokio::test]
async fn test_full_match_flow() {
    let (listener, config) = relay().await;
    let session = SessionStore::start(config);
    let room = RoomId::parse("it-room").unwrap();

    session.join_room(room.clone()).unwrap();
    session.set_ready().unwrap();
    assert!(session.game_state().is_ready);

    within(async {
        let (mut ws, path) = accept(&listener).await;
        assert_eq!(path, "/ws?room=it-room");
        assert_eq!(next_frame(&mut ws).await, json!({"type": "ready"}));

        ws.send(Message::Text("garbage".into())).await.unwrap();
        push(&mut ws, json!({"type": "spectators", "payload": {"count": 2}})).await;
        push(&mut ws, json!({"type": "playerReady"})).await;
        push(&mut ws, json!({"type": "gameStarted"})).await;
        push(
            &mut ws,
            json!({"type": "gameState", "payload": {
                "playerHand": [{"suit": "♠", "rank": "6"}, {"suit": "♥", "rank": "K"}],
                "trump": {"suit": "♥", "rank": "7"},
                "deckCount": 23,
                "isMyTurn": true,
                "waitingForPeer": false
            }}),
        )
        .await;

        wait_for(&session, |s| s.game.is_my_turn).await;
        let snapshot = session.snapshot();
        assert!(snapshot.is_connected());
        assert!(snapshot.game.opponent_ready);
        assert!(snapshot.game.game_started);
        assert!(snapshot.game.is_ready);
        assert!(!snapshot.game.waiting_for_peer);
        assert_eq!(snapshot.game.trump, Some(Card::new(Rank::Seven, Suit::Hearts)));
        assert_eq!(snapshot.game.room_id, Some(room.clone()));

        let card = Card::new(Rank::Six, Suit::Spades);
        assert!(session.play_card(card).unwrap());
        assert_eq!(
            next_frame(&mut ws).await,
            json!({"type": "playCard", "payload": {"card": {"suit": "♠", "rank": "6"}}})
        );

        push(
            &mut ws,
            json!({"type": "gameState", "payload": {
                "playerHand": [{"suit": "♥", "rank": "K"}],
                "fieldCards": [{"suit": "♠", "rank": "6"}],
                "isMyTurn": false
            }}),
        )
        .await;
        wait_for(&session, |s| !s.game.is_my_turn).await;
        let game = session.game_state();
        assert_eq!(game.open_attacks(), 1);
        assert_eq!(game.deck_count, 23);

        let mut notices = session.notices();
        session.surrender().unwrap();
        assert_eq!(next_frame(&mut ws).await, json!({"type": "surrender"}));

        push(&mut ws, json!({"type": "error", "payload": {"message": "Opponent left"}})).await;
        push(&mut ws, json!({"type": "gameOver", "payload": {"winner": "opponent"}})).await;
        assert_eq!(
            notices.recv().await.unwrap(),
            SessionNotice::GameOver(json!({"winner": "opponent"}))
        );
        assert_eq!(session.connection_error().as_deref(), Some("Opponent left"));
    })
    .await;

    session.shutdown().await;
}

#[tokio::test]
async fn test_reconnects_after_abrupt_drop() {
    let (listener, config) = relay().await;
    let session = SessionStore::start(config);
    session.join_room(RoomId::parse("flaky").unwrap()).unwrap();

    within(async {
        let (ws, _) = accept(&listener).await;
        wait_for(&session, |s| s.is_connected()).await;

        // No close handshake
        drop(ws);
        wait_for(&session, |s| !s.is_connected()).await;
        assert_eq!(
            session.connection_error().as_deref(),
            Some("Reconnecting... attempt 1/5")
        );

        let (mut ws, path) = accept(&listener).await;
        assert_eq!(path, "/ws?room=flaky");
        wait_for(&session, |s| s.is_connected()).await;
        assert_eq!(session.connection_error(), None);
        assert_eq!(session.snapshot().connection.reconnect_attempts, 0);

        session.offer_rematch().unwrap();
        assert_eq!(next_frame(&mut ws).await, json!({"type": "rematch"}));
    })
    .await;

    session.shutdown().await;
}

#[tokio::test]
async fn test_clean_close_from_relay_is_final() {
    let (listener, config) = relay().await;
    let session = SessionStore::start(config);
    session.join_room(RoomId::parse("closing").unwrap()).unwrap();

    within(async {
        let (mut ws, _) = accept(&listener).await;
        wait_for(&session, |s| s.is_connected()).await;

        ws.close(None).await.unwrap();
        wait_for(&session, |s| !s.is_connected()).await;

        let again = tokio::time::timeout(Duration::from_millis(500), listener.accept()).await;
        assert!(again.is_err(), "session reconnected after a clean close");
        assert_eq!(session.connection_error(), None);
    })
    .await;

    session.shutdown().await;
}
