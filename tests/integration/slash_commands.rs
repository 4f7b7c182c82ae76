// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::future_not_send,
    clippy::float_cmp,
    clippy::missing_panics_doc,
    clippy::missing_docs_in_private_items
)]

//! Integration tests for slash commands typed into the chat box.
//!
//! Each test authenticates a loopback session backed by a fixed trading
//! snapshot, submits one line, and checks both what was written to the
//! transport and what was shown locally.
//!
//! Verification command: `cargo test --test slash_commands`

use serde_json::Value;

use tradechat::chat::{ChatController, ChatSettings, Credentials, NOT_CONNECTED_NOTICE};
use tradechat::command::{CLEARED_NOTICE, HELP_TEXT, NO_TRADES_NOTICE};
use tradechat::presentation::{RecordingPresenter, Rendered};
use tradechat::session::{ConnectionState, SessionEvent};
use tradechat::trading::{Transaction, TradingSnapshot};
use tradechat::transport::loopback::{LoopbackConnector, LoopbackLink};

type Controller = ChatController<LoopbackConnector, RecordingPresenter, TradingSnapshot>;

struct Session {
    controller: Controller,
    presenter: RecordingPresenter,
    link: LoopbackLink,
}

fn snapshot(transactions: &str, balance: f64) -> TradingSnapshot {
    let transactions: Vec<Transaction> = serde_json::from_str(transactions).unwrap();
    TradingSnapshot::new(transactions, balance)
}

/// Builds a controller over `trading` and brings it to `Open`.
async fn open_session(trading: TradingSnapshot) -> Session {
    let connector = LoopbackConnector::new();
    let presenter = RecordingPresenter::new();
    let (mut controller, _handle) = ChatController::new(
        connector.clone(),
        presenter.clone(),
        trading,
        Credentials::new("tok", "alice"),
        ChatSettings::new("https://trade.example.com"),
    );

    controller.handle_event(SessionEvent::SurfaceOpened);
    let link = connector.last_link().unwrap();
    link.open().await;
    controller.process_pending();
    assert!(controller.step().await);
    link.deliver(r#"{"type":"online_count","count":1}"#).await;
    controller.process_pending();
    assert_eq!(controller.state(), ConnectionState::Open);

    presenter.reset();
    Session {
        controller,
        presenter,
        link,
    }
}

impl Session {
    fn submit(&mut self, text: &str) {
        self.controller
            .handle_event(SessionEvent::Submit(text.to_string()));
    }

    /// Frames written after `auth`.
    fn outbound(&self) -> Vec<Value> {
        self.link
            .sent()
            .iter()
            .skip(1)
            .map(|raw| serde_json::from_str(raw).unwrap())
            .collect()
    }
}

// =============================================================================
// /share
// =============================================================================

#[tokio::test(start_paused = true)]
async fn share_without_closed_trades_sends_nothing() {
    let mut s = open_session(snapshot(
        r#"[{"type":"buy","amount":0.5,"price":30000},{"type":"sell","amount":0.5,"price":31000}]"#,
        500.0,
    ))
    .await;

    s.submit("/share");
    assert!(s.outbound().is_empty());
    assert_eq!(s.presenter.notices(), [NO_TRADES_NOTICE]);
}

#[tokio::test(start_paused = true)]
async fn share_close_long() {
    let mut s = open_session(snapshot(
        r#"[
            {"type":"buy","amount":1,"price":100,"leverage":3},
            {"type":"close_long","price":114.17,"entryPrice":100,"pnl":42.50,"leverage":3}
        ]"#,
        1042.5,
    ))
    .await;

    s.submit("/share");
    let sent = s.outbound();
    assert_eq!(sent.len(), 1);
    let card = &sent[0];
    assert_eq!(card["type"], "trade_share");
    assert_eq!(card["tradeType"], "CLOSE LONG");
    assert_eq!(card["pnl"].as_f64().unwrap(), 42.5);
    assert_eq!(card["leverage"].as_f64().unwrap(), 3.0);
    assert_eq!(card["entryPrice"].as_f64().unwrap(), 100.0);
    assert_eq!(card["exitPrice"].as_f64().unwrap(), 114.17);
    assert!(s.presenter.rendered().is_empty(), "no local echo");
}

#[tokio::test(start_paused = true)]
async fn share_liquidation_reports_a_loss() {
    let mut s = open_session(snapshot(
        r#"[{"type":"liquidation","loss":150,"leverage":10,"entryPrice":200,"price":185}]"#,
        0.0,
    ))
    .await;

    s.submit("/share");
    let sent = s.outbound();
    assert_eq!(sent[0]["tradeType"], "LIQUIDATION");
    assert_eq!(sent[0]["pnl"].as_f64().unwrap(), -150.0);
}

#[tokio::test(start_paused = true)]
async fn share_uses_most_recent_settlement_and_note() {
    let mut s = open_session(snapshot(
        r#"[
            {"type":"close_short","pnl":12},
            {"type":"close_long","pnl":-4},
            {"type":"buy","amount":1,"price":10}
        ]"#,
        100.0,
    ))
    .await;

    s.submit("/SHARE   buying the dip again ");
    let sent = s.outbound();
    assert_eq!(sent[0]["tradeType"], "CLOSE LONG");
    assert_eq!(sent[0]["pnl"].as_f64().unwrap(), -4.0);
    assert_eq!(sent[0]["message"], "buying the dip again");
}

#[tokio::test(start_paused = true)]
async fn share_while_disconnected_is_refused() {
    let connector = LoopbackConnector::new();
    let presenter = RecordingPresenter::new();
    let (mut controller, _handle) = ChatController::new(
        connector.clone(),
        presenter.clone(),
        snapshot(r#"[{"type":"close_long","pnl":5}]"#, 0.0),
        Credentials::new("tok", "alice"),
        ChatSettings::new("https://trade.example.com"),
    );

    controller.handle_event(SessionEvent::Submit("/share".to_string()));
    assert_eq!(presenter.notices(), [NOT_CONNECTED_NOTICE]);
    assert!(connector.last_link().unwrap().sent().is_empty());
}

// =============================================================================
// Local-only commands
// =============================================================================

#[tokio::test(start_paused = true)]
async fn stats_summarizes_closed_trades() {
    let mut s = open_session(snapshot(
        r#"[
            {"type":"buy","amount":1,"price":10},
            {"type":"close_short","pnl":-10},
            {"type":"liquidation","loss":-50}
        ]"#,
        940.0,
    ))
    .await;

    s.submit("/stats");
    assert!(s.outbound().is_empty());
    let notices = s.presenter.notices();
    assert_eq!(notices.len(), 1);
    let text = &notices[0];
    assert!(text.contains("2 trades"), "{text}");
    assert!(text.contains("0 wins"), "{text}");
    assert!(text.contains("0.0% win rate"), "{text}");
    assert!(text.contains("total P&L -60.00 USD"), "{text}");
    assert!(text.contains("average P&L -30.00 USD"), "{text}");
    assert!(text.contains("balance 940.00 USD"), "{text}");
}

#[tokio::test(start_paused = true)]
async fn help_is_a_local_notice() {
    let mut s = open_session(TradingSnapshot::default()).await;
    s.submit("/help");
    assert!(s.outbound().is_empty());
    assert_eq!(s.presenter.notices(), [HELP_TEXT]);
}

#[tokio::test(start_paused = true)]
async fn clear_empties_the_list_then_confirms() {
    let mut s = open_session(TradingSnapshot::default()).await;
    s.link
        .deliver(r#"{"type":"message","username":"bob","message":"hi","timestamp":1}"#)
        .await;
    s.controller.process_pending();
    s.presenter.reset();

    s.submit("/clear");
    assert!(s.outbound().is_empty());
    assert_eq!(
        s.presenter.rendered(),
        [Rendered::Cleared, Rendered::Notice(CLEARED_NOTICE.to_string())]
    );
}

#[tokio::test(start_paused = true)]
async fn unknown_command_names_itself() {
    let mut s = open_session(TradingSnapshot::default()).await;
    s.submit("/moon soon");
    assert!(s.outbound().is_empty());
    let notices = s.presenter.notices();
    assert_eq!(notices.len(), 1);
    assert!(notices[0].starts_with("Unknown command: /moon."), "{}", notices[0]);
}
