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

//! Integration tests for the chat connection lifecycle.
//!
//! Drives a `ChatController` over the loopback transport with tokio's paused
//! clock, so the auth delay and the 3 s reconnect delay elapse instantly
//! while their ordering is still observable.
//!
//! These tests validate:
//! - nothing is written before the session is open, and `auth` comes first
//! - only one transport is live at a time
//! - hiding the surface keeps the transport but suppresses retries
//! - an abnormal close schedules exactly one reconnect after 3 s
//! - unread counting while the surface is hidden
//!
//! Verification command: `cargo test --test connection_lifecycle`

use std::time::Duration;

use tokio::time::Instant;

use tradechat::chat::{
    ChatController, ChatError, ChatSettings, Credentials, NOT_CONNECTED_NOTICE,
    RECONNECTING_NOTICE,
};
use tradechat::presentation::{RecordingPresenter, Rendered};
use tradechat::session::{ConnectionState, SessionEvent};
use tradechat::trading::TradingSnapshot;
use tradechat::transport::loopback::{LoopbackConnector, LoopbackLink};
use tradechat_proto::envelope::Outbound;

type Controller = ChatController<LoopbackConnector, RecordingPresenter, TradingSnapshot>;

// =============================================================================
// Test helpers
// =============================================================================

struct Harness {
    controller: Controller,
    connector: LoopbackConnector,
    presenter: RecordingPresenter,
}

fn harness() -> Harness {
    let connector = LoopbackConnector::new();
    let presenter = RecordingPresenter::new();
    let (controller, _handle) = ChatController::new(
        connector.clone(),
        presenter.clone(),
        TradingSnapshot::default(),
        Credentials::new("token-1", "alice"),
        ChatSettings::new("http://localhost:8000"),
    );
    Harness {
        controller,
        connector,
        presenter,
    }
}

fn chat_frame(username: &str, text: &str) -> String {
    serde_json::json!({
        "type": "message",
        "username": username,
        "message": text,
        "timestamp": 1_700_000_000_000_u64,
    })
    .to_string()
}

fn sent_kinds(link: &LoopbackLink) -> Vec<String> {
    link.sent()
        .iter()
        .map(|raw| {
            let value: serde_json::Value = serde_json::from_str(raw).unwrap();
            value["type"].as_str().unwrap().to_string()
        })
        .collect()
}

/// Opens the surface and walks the newest link through open → auth → first
/// inbound envelope, leaving the session `Open`.
async fn authenticate(h: &mut Harness) -> LoopbackLink {
    if !h.controller.session().is_surface_open() {
        h.controller.handle_event(SessionEvent::SurfaceOpened);
    }
    let link = h.connector.last_link().expect("connect() opened a link");
    link.open().await;
    h.controller.process_pending();
    assert_eq!(h.controller.state(), ConnectionState::AuthPending);

    // The auth timer is the only thing pending; the paused clock jumps to it.
    assert!(h.controller.step().await);
    link.deliver(r#"{"type":"online_count","count":4}"#).await;
    h.controller.process_pending();
    assert_eq!(h.controller.state(), ConnectionState::Open);
    link
}

/// Opens a link and lets the auth timer fire, leaving the session `AuthPending`.
async fn send_auth(h: &mut Harness) -> LoopbackLink {
    h.controller.handle_event(SessionEvent::SurfaceOpened);
    let link = h.connector.last_link().expect("connect() opened a link");
    link.open().await;
    h.controller.process_pending();
    assert!(h.controller.step().await);
    assert_eq!(sent_kinds(&link), ["auth"]);
    assert_eq!(h.controller.state(), ConnectionState::AuthPending);
    link
}

// =============================================================================
// Send gating and auth
// =============================================================================

#[tokio::test(start_paused = true)]
async fn fresh_controller_rejects_send() {
    let mut h = harness();
    let result = h.controller.send(&Outbound::Message {
        message: "hello".to_string(),
    });

    assert!(matches!(result, Err(ChatError::NotConnected)));
    assert_eq!(h.presenter.notices(), [NOT_CONNECTED_NOTICE]);
    // The failed send kicked off a connection attempt but wrote nothing.
    assert_eq!(h.connector.open_count(), 1);
    assert!(h.connector.last_link().unwrap().sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn send_while_auth_pending_writes_nothing() {
    let mut h = harness();
    h.controller.handle_event(SessionEvent::SurfaceOpened);
    let link = h.connector.last_link().unwrap();
    link.open().await;
    h.controller.process_pending();

    h.controller
        .handle_event(SessionEvent::Submit("too early".to_string()));
    assert!(link.sent().is_empty());
    assert_eq!(h.connector.open_count(), 1, "AuthPending must not reconnect");
}

#[tokio::test(start_paused = true)]
async fn auth_waits_for_the_delay() {
    let mut h = harness();
    h.controller.handle_event(SessionEvent::SurfaceOpened);
    let link = h.connector.last_link().unwrap();
    link.open().await;
    h.controller.process_pending();

    let opened_at = Instant::now();
    assert!(h.controller.step().await);
    assert!(opened_at.elapsed() >= Duration::from_millis(100));
    assert_eq!(sent_kinds(&link), ["auth"]);
}

#[tokio::test(start_paused = true)]
async fn history_reply_opens_the_session() {
    let mut h = harness();
    let link = send_auth(&mut h).await;

    link.deliver(
        r#"{"type":"history","messages":[
            {"username":"a","message":"hi","timestamp":1},
            {"username":"b","message":"closed","timestamp":2,
             "metadata":{"tradeType":"CLOSE LONG","leverage":3}}
        ]}"#,
    )
    .await;
    h.controller.process_pending();
    assert_eq!(h.controller.state(), ConnectionState::Open);

    let rendered = h.presenter.rendered();
    let Some(Rendered::History(entries)) = rendered.last() else {
        panic!("expected history, got {rendered:?}");
    };
    assert_eq!(entries.len(), 2);

    let sent = h.controller.send(&Outbound::Message {
        message: "gm".to_string(),
    });
    assert!(sent.is_ok());
    assert_eq!(sent_kinds(&link), ["auth", "message"]);
    assert_eq!(h.connector.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn undecodable_reply_still_opens_the_session() {
    let mut h = harness();
    let link = send_auth(&mut h).await;
    h.presenter.reset();

    link.deliver(r#"{"type":"welcome","message":"hello"}"#).await;
    h.controller.process_pending();

    assert_eq!(h.controller.state(), ConnectionState::Open);
    assert!(h.presenter.rendered().is_empty());
    h.controller.handle_event(SessionEvent::Submit("gm".to_string()));
    assert_eq!(sent_kinds(&link), ["auth", "message"]);
}

#[tokio::test(start_paused = true)]
async fn frame_before_auth_does_not_open_the_session() {
    let mut h = harness();
    h.controller.handle_event(SessionEvent::SurfaceOpened);
    let link = h.connector.last_link().unwrap();
    link.open().await;
    link.deliver(r#"{"type":"online_count","count":1}"#).await;
    h.controller.process_pending();

    assert_eq!(h.controller.state(), ConnectionState::AuthPending);
}

#[tokio::test(start_paused = true)]
async fn auth_is_first_and_sent_once_per_link() {
    let mut h = harness();
    let link = authenticate(&mut h).await;

    h.controller
        .handle_event(SessionEvent::Submit("  gm everyone  ".to_string()));
    link.deliver(&chat_frame("bob", "gm")).await;
    h.controller.process_pending();
    h.controller.handle_event(SessionEvent::Submit("second".to_string()));

    assert_eq!(sent_kinds(&link), ["auth", "message", "message"]);
    let first: serde_json::Value = serde_json::from_str(&link.sent()[1]).unwrap();
    assert_eq!(first["message"], "gm everyone");
}

#[tokio::test(start_paused = true)]
async fn own_messages_are_not_echoed_locally() {
    let mut h = harness();
    authenticate(&mut h).await;
    h.presenter.reset();

    h.controller
        .handle_event(SessionEvent::Submit("hello".to_string()));
    assert!(
        !h.presenter
            .rendered()
            .iter()
            .any(|r| matches!(r, Rendered::Message(_)))
    );
}

#[tokio::test(start_paused = true)]
async fn blank_submit_is_a_no_op() {
    let mut h = harness();
    let link = authenticate(&mut h).await;
    h.presenter.reset();

    h.controller.handle_event(SessionEvent::Submit("   ".to_string()));
    assert_eq!(sent_kinds(&link), ["auth"]);
    assert!(h.presenter.rendered().is_empty());
}

#[tokio::test(start_paused = true)]
async fn double_connect_leaves_one_live_transport() {
    let mut h = harness();
    h.controller.connect().unwrap();
    h.controller.connect().unwrap();

    assert_eq!(h.connector.open_count(), 2);
    assert_eq!(h.connector.live_links(), 1);
    assert_eq!(h.connector.link(0).unwrap().closed_by_client(), Some(1000));
    assert_eq!(h.controller.state(), ConnectionState::Connecting);
}

// =============================================================================
// Surface and reconnect
// =============================================================================

#[tokio::test(start_paused = true)]
async fn hiding_surface_keeps_transport() {
    let mut h = harness();
    let link = authenticate(&mut h).await;

    h.controller.handle_event(SessionEvent::SurfaceClosed);
    assert!(link.is_live());
    assert_eq!(h.controller.state(), ConnectionState::Open);

    h.controller.handle_event(SessionEvent::SurfaceOpened);
    assert_eq!(h.connector.open_count(), 1, "reopening an open session must not reconnect");
}

#[tokio::test(start_paused = true)]
async fn normal_close_does_not_retry() {
    let mut h = harness();
    let link = authenticate(&mut h).await;
    link.close_with(1000).await;
    h.controller.process_pending();

    assert_eq!(h.controller.state(), ConnectionState::Disconnected);
    assert!(!h.presenter.notices().iter().any(|n| n == RECONNECTING_NOTICE));
}

#[tokio::test(start_paused = true)]
async fn abnormal_close_reconnects_once_after_three_seconds() {
    let mut h = harness();
    let link = authenticate(&mut h).await;

    link.close_with(1006).await;
    h.controller.process_pending();
    assert_eq!(h.controller.state(), ConnectionState::Reconnecting);
    assert_eq!(h.controller.session().retry_attempt(), 1);
    assert_eq!(
        h.presenter.notices().last().map(String::as_str),
        Some(RECONNECTING_NOTICE)
    );

    let closed_at = Instant::now();
    assert!(h.controller.step().await);
    assert!(closed_at.elapsed() >= Duration::from_secs(3));
    assert_eq!(h.connector.open_count(), 2);
    assert_eq!(h.controller.state(), ConnectionState::Connecting);

    // Nothing else is pending: no second timer was scheduled.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.controller.process_pending(), 0);
    assert_eq!(h.connector.open_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn auth_rejection_is_treated_as_abnormal_close() {
    let mut h = harness();
    h.controller.handle_event(SessionEvent::SurfaceOpened);
    let link = h.connector.last_link().unwrap();
    link.open().await;
    h.controller.process_pending();
    assert!(h.controller.step().await);

    link.close_with(4001).await;
    h.controller.process_pending();
    assert_eq!(h.controller.state(), ConnectionState::Reconnecting);
}

#[tokio::test(start_paused = true)]
async fn surface_closed_before_retry_fires_stands_down() {
    let mut h = harness();
    let link = authenticate(&mut h).await;

    link.close_with(1006).await;
    h.controller.process_pending();
    h.controller.handle_event(SessionEvent::SurfaceClosed);

    assert!(h.controller.step().await);
    assert_eq!(h.controller.state(), ConnectionState::Disconnected);
    assert_eq!(h.connector.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn abnormal_close_while_hidden_does_not_retry() {
    let mut h = harness();
    let link = authenticate(&mut h).await;
    h.controller.handle_event(SessionEvent::SurfaceClosed);

    link.close_with(1006).await;
    h.controller.process_pending();
    assert_eq!(h.controller.state(), ConnectionState::Disconnected);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.controller.process_pending(), 0);
    assert_eq!(h.connector.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn reopening_during_backoff_connects_now_and_timer_is_ignored() {
    let mut h = harness();
    let link = authenticate(&mut h).await;
    link.close_with(1006).await;
    h.controller.process_pending();

    h.controller.handle_event(SessionEvent::SurfaceClosed);
    h.controller.handle_event(SessionEvent::SurfaceOpened);
    assert_eq!(h.connector.open_count(), 2);
    assert_eq!(h.controller.state(), ConnectionState::Connecting);

    // The old retry timer fires into a state that no longer wants it.
    assert!(h.controller.step().await);
    assert_eq!(h.connector.open_count(), 2);
    assert_eq!(h.controller.state(), ConnectionState::Connecting);
}

#[tokio::test(start_paused = true)]
async fn successful_reconnect_resets_retry_counter() {
    let mut h = harness();
    let link = authenticate(&mut h).await;
    link.close_with(1006).await;
    h.controller.process_pending();
    assert!(h.controller.step().await);
    assert_eq!(h.controller.session().retry_attempt(), 1);

    let relinked = authenticate(&mut h).await;
    assert_eq!(h.controller.session().retry_attempt(), 0);
    assert_eq!(sent_kinds(&relinked), ["auth"]);
}

#[tokio::test(start_paused = true)]
async fn logout_closes_normally_and_suppresses_retry() {
    let mut h = harness();
    let link = authenticate(&mut h).await;
    h.controller.handle_event(SessionEvent::Logout);

    assert_eq!(link.closed_by_client(), Some(1000));
    assert_eq!(h.controller.state(), ConnectionState::Disconnected);

    // A late close from the server side belongs to a dropped link.
    link.close_with(1006).await;
    h.controller.process_pending();
    assert_eq!(h.controller.state(), ConnectionState::Disconnected);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.controller.process_pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn transport_error_alone_changes_nothing() {
    let mut h = harness();
    let link = authenticate(&mut h).await;
    link.fail("connection reset").await;
    h.controller.process_pending();
    assert_eq!(h.controller.state(), ConnectionState::Open);
}

// =============================================================================
// Inbound handling
// =============================================================================

#[tokio::test(start_paused = true)]
async fn unread_counts_messages_while_hidden() {
    let mut h = harness();
    let link = authenticate(&mut h).await;
    h.controller.handle_event(SessionEvent::SurfaceClosed);

    link.deliver(&chat_frame("bob", "one")).await;
    link.deliver(r#"{"type":"online_count","count":9}"#).await;
    link.deliver(&chat_frame("carol", "two")).await;
    h.controller.process_pending();

    assert_eq!(h.controller.session().unread_count(), 2);
    assert_eq!(h.presenter.last_unread_badge(), Some(2));
    assert_eq!(h.controller.session().online_peer_count(), Some(9));

    h.controller.handle_event(SessionEvent::SurfaceOpened);
    assert_eq!(h.controller.session().unread_count(), 0);
    assert_eq!(h.presenter.last_unread_badge(), Some(0));
}

#[tokio::test(start_paused = true)]
async fn malformed_and_unknown_frames_are_dropped() {
    let mut h = harness();
    let link = authenticate(&mut h).await;
    h.presenter.reset();

    link.deliver("not json at all").await;
    link.deliver(r#"{"type":"typing","username":"bob"}"#).await;
    link.deliver(r#"{"type":"message"}"#).await;
    link.deliver(&chat_frame("bob", "still here")).await;
    h.controller.process_pending();

    let rendered = h.presenter.rendered();
    assert_eq!(rendered.len(), 1);
    assert!(matches!(&rendered[0], Rendered::Message(line) if line.text == "still here"));
    assert_eq!(h.controller.state(), ConnectionState::Open);
}

#[tokio::test(start_paused = true)]
async fn history_and_system_are_rendered() {
    let mut h = harness();
    let link = authenticate(&mut h).await;
    h.presenter.reset();

    link.deliver(
        r#"{"type":"history","messages":[
            {"username":"bob","message":"old","timestamp":1},
            {"username":"carol","message":"rekt","timestamp":2,
             "metadata":{"tradeType":"LIQUIDATION","leverage":5,"entryPrice":10,"exitPrice":8,"pnl":150}}
        ]}"#,
    )
    .await;
    link.deliver(r#"{"type":"system","message":"Server restarting soon"}"#)
        .await;
    h.controller.process_pending();

    let rendered = h.presenter.rendered();
    let Rendered::History(entries) = &rendered[0] else {
        panic!("expected history first, got {rendered:?}");
    };
    assert_eq!(entries.len(), 2);
    assert_eq!(rendered[1], Rendered::Notice("Server restarting soon".to_string()));
}
