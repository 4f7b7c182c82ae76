// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::future_not_send,
    clippy::missing_panics_doc,
    clippy::missing_docs_in_private_items
)]

//! Integration tests for the WebSocket transport against a real socket.
//!
//! A minimal chat server is spun up per test with
//! `tokio_tungstenite::accept_hdr_async` on an ephemeral port. The client
//! side is a full `ChatController` over `WsConnector`.
//!
//! These tests validate:
//! - the endpoint carries the token and `auth` is the first frame received
//! - server frames reach the presenter and client frames reach the server
//! - a server close code other than 1000/1001 triggers the reconnect path
//! - logout closes the socket with code 1000
//! - an unreachable server is reported as an abnormal close
//!
//! Verification command: `cargo test --test ws_transport`

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use tradechat::chat::{ChatController, ChatSettings, Credentials, RECONNECTING_NOTICE};
use tradechat::presentation::{RecordingPresenter, Rendered};
use tradechat::session::{ConnectionState, SessionEvent};
use tradechat::trading::TradingSnapshot;
use tradechat::transport::ws::WsConnector;

type Controller = ChatController<WsConnector, RecordingPresenter, TradingSnapshot>;

// =============================================================================
// Test helpers
// =============================================================================

async fn bind() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// Accepts one WebSocket client and returns it with the request URI.
async fn accept(listener: &TcpListener) -> (WebSocketStream<TcpStream>, String) {
    let (stream, _) = listener.accept().await.unwrap();
    let mut uri = String::new();
    let ws = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
        uri = req.uri().to_string();
        Ok(resp)
    })
    .await
    .unwrap();
    (ws, uri)
}

/// Reads the next text frame as JSON.
async fn next_json(ws: &mut WebSocketStream<TcpStream>) -> Value {
    loop {
        match ws.next().await.expect("stream open").expect("frame") {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => {}
            other => panic!("unexpected frame {other:?}"),
        }
    }
}

fn controller(port: u16, presenter: &RecordingPresenter) -> Controller {
    let (controller, _handle) = ChatController::new(
        WsConnector::default(),
        presenter.clone(),
        TradingSnapshot::default(),
        Credentials::new("secret token", "alice"),
        ChatSettings::new(format!("http://127.0.0.1:{port}")),
    );
    controller
}

/// Steps the controller until `done` holds, failing after five seconds.
async fn drive_until(controller: &mut Controller, done: impl Fn(&Controller) -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done(controller) {
            assert!(controller.step().await, "controller stopped");
        }
    })
    .await
    .expect("condition reached in time");
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn auth_first_then_frames_flow_both_ways() {
    let (listener, port) = bind().await;
    let server = tokio::spawn(async move {
        let (mut ws, uri) = accept(&listener).await;
        let auth = next_json(&mut ws).await;
        ws.send(Message::text(r#"{"type":"online_count","count":2}"#))
            .await
            .unwrap();
        ws.send(Message::text(
            r#"{"type":"message","username":"bob","message":"gm","timestamp":1700000000000}"#,
        ))
        .await
        .unwrap();
        let chat = next_json(&mut ws).await;
        ws.close(Some(CloseFrame {
            code: CloseCode::from(4000),
            reason: "restart".into(),
        }))
        .await
        .unwrap();
        while let Some(Ok(_)) = ws.next().await {}
        (uri, auth, chat)
    });

    let presenter = RecordingPresenter::new();
    let mut controller = controller(port, &presenter);
    controller.handle_event(SessionEvent::SurfaceOpened);
    drive_until(&mut controller, |c| c.state() == ConnectionState::Open).await;
    drive_until(&mut controller, |_| {
        presenter
            .rendered()
            .iter()
            .any(|r| matches!(r, Rendered::Message(_)))
    })
    .await;

    controller.handle_event(SessionEvent::Submit("hello bob".to_string()));
    drive_until(&mut controller, |c| {
        c.state() == ConnectionState::Reconnecting
    })
    .await;

    let (uri, auth, chat) = server.await.unwrap();
    assert_eq!(uri, "/ws/chat?token=secret+token");
    assert_eq!(auth["type"], "auth");
    assert_eq!(auth["token"], "secret token");
    assert_eq!(auth["username"], "alice");
    assert_eq!(chat["type"], "message");
    assert_eq!(chat["message"], "hello bob");

    assert_eq!(controller.session().online_peer_count(), Some(2));
    assert!(presenter.notices().iter().any(|n| n == RECONNECTING_NOTICE));
}

#[tokio::test]
async fn logout_closes_with_normal_code() {
    let (listener, port) = bind().await;
    let server = tokio::spawn(async move {
        let (mut ws, _) = accept(&listener).await;
        let _auth = next_json(&mut ws).await;
        ws.send(Message::text(r#"{"type":"system","message":"welcome"}"#))
            .await
            .unwrap();
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(frame))) => {
                    return frame.map(|f| u16::from(f.code));
                }
                Some(Ok(_)) => {}
                Some(Err(_)) | None => return None,
            }
        }
    });

    let presenter = RecordingPresenter::new();
    let mut controller = controller(port, &presenter);
    controller.handle_event(SessionEvent::SurfaceOpened);
    drive_until(&mut controller, |c| c.state() == ConnectionState::Open).await;

    controller.handle_event(SessionEvent::Logout);
    assert_eq!(controller.state(), ConnectionState::Disconnected);

    let code = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server saw the close")
        .unwrap();
    assert_eq!(code, Some(1000));
    assert_eq!(presenter.notices(), ["welcome"]);
}

#[tokio::test]
async fn unreachable_server_is_an_abnormal_close() {
    let (listener, port) = bind().await;
    drop(listener);

    let presenter = RecordingPresenter::new();
    let mut controller = controller(port, &presenter);
    controller.handle_event(SessionEvent::SurfaceOpened);
    assert_eq!(controller.state(), ConnectionState::Connecting);

    drive_until(&mut controller, |c| {
        c.state() == ConnectionState::Reconnecting
    })
    .await;
    assert_eq!(controller.session().retry_attempt(), 1);
}
