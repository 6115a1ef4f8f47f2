//! Integration Tests - End-to-end Engine Testing
//!
//! Drives the dispatch loop over the loopback transport with tokio's
//! paused clock. Uses mockall for the advisory provider.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, TimeZone, Utc};
use mockall::mock;
use rust_decimal_macros::dec;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use trade_bridge::adapters::api::trading::{close_trade, open_trade, CloseRequest};
use trade_bridge::adapters::api::TradingState;
use trade_bridge::adapters::transport::{LoopbackPeer, LoopbackTransport};
use trade_bridge::config::EngineConfig;
use trade_bridge::domain::{
    CommandFrame, CommandType, DailySignal, Direction, EngineError, TransportError,
};
use trade_bridge::ports::{Clock, SignalProvider};
use trade_bridge::usecases::{DispatchLoop, EngineHandle, EngineState, SignalPoller};

// ---- Mock Definitions ----

mock! {
    pub Provider {}

    #[async_trait::async_trait]
    impl trade_bridge::ports::SignalProvider for Provider {
        async fn get_signal(
            &self,
            symbol: &str,
        ) -> anyhow::Result<Option<trade_bridge::domain::DailySignal>>;
    }
}

/// Clock frozen at a fixed instant.
struct FixedClock(DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

// ---- Helpers ----

const ACCOUNT: &str = "510071179";

fn engine_config() -> EngineConfig {
    EngineConfig {
        startup_delay_ms: 2000,
        loop_interval_ms: 1000,
        receive_timeout_ms: 100,
        default_command_timeout_ms: 15_000,
    }
}

/// 2024-06-12, a Wednesday.
fn wednesday() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 12, 8, 30, 0).unwrap()
}

fn signal(direction: Direction, confidence: u8) -> DailySignal {
    DailySignal {
        symbol: "USDCAD".to_string(),
        direction,
        entry_price: dec!(1.3600),
        take_profit: dec!(1.3650),
        stop_loss: dec!(1.3550),
        confidence,
        rationale: "test".to_string(),
    }
}

struct Running {
    engine: EngineHandle,
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<Result<(), EngineError>>,
}

impl Running {
    async fn stop(self) -> EngineHandle {
        let _ = self.shutdown_tx.send(());
        self.task.await.unwrap().unwrap();
        self.engine
    }
}

fn spawn(dispatch: DispatchLoop<LoopbackTransport>, engine: EngineHandle) -> Running {
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let task = tokio::spawn(dispatch.run(shutdown_rx));
    Running {
        engine,
        shutdown_tx,
        task,
    }
}

async fn start_engine() -> (Running, LoopbackPeer) {
    let (transport, peer) = LoopbackTransport::pair();
    let (dispatch, engine) = DispatchLoop::new(transport, &engine_config(), ACCOUNT);
    let running = spawn(dispatch, engine);
    running.engine.wait_for(EngineState::Running).await;
    (running, peer)
}

fn start_with_poller(provider: MockProvider, now: DateTime<Utc>) -> (Running, LoopbackPeer) {
    let (transport, peer) = LoopbackTransport::pair();
    let (dispatch, engine) = DispatchLoop::new(transport, &engine_config(), ACCOUNT);
    let poller = SignalPoller::new(
        Arc::new(provider),
        "USDCAD",
        60,
        dec!(0.01),
        Duration::from_secs(60),
    );
    let dispatch = dispatch
        .with_signal_poller(poller)
        .with_clock(Arc::new(FixedClock(now)));
    (spawn(dispatch, engine), peer)
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..200 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not reached");
}

// ---- Submission Tests ----

#[tokio::test]
async fn test_submit_before_run_is_not_running() {
    let (transport, _peer) = LoopbackTransport::pair();
    let (_dispatch, engine) = DispatchLoop::new(transport, &engine_config(), ACCOUNT);

    assert_eq!(engine.state(), EngineState::Idle);
    let err = engine.submit(CommandType::Info, "", None).unwrap_err();
    assert_eq!(err, EngineError::NotRunning);
}

#[tokio::test(start_paused = true)]
async fn test_commands_queued_before_connect_publish_in_order() {
    let (transport, mut peer) = LoopbackTransport::gated_pair();
    let (dispatch, engine) = DispatchLoop::new(transport, &engine_config(), ACCOUNT);
    let running = spawn(dispatch, engine.clone());

    engine.wait_for(EngineState::Starting).await;
    let open = engine.submit(CommandType::Open, "AAA", None).unwrap();
    let close = engine.submit(CommandType::Close, "BBB", None).unwrap();
    assert_eq!(engine.queued_count(), 2);

    peer.release();

    let first: CommandFrame = peer.next_sent().await.unwrap().parse().unwrap();
    let second: CommandFrame = peer.next_sent().await.unwrap().parse().unwrap();

    assert_eq!(first.account, ACCOUNT);
    assert_eq!(first.command_type, CommandType::Open);
    assert_eq!(first.body, "AAA");
    assert_eq!(&first.correlation_id, open.correlation_id());
    assert_eq!(second.command_type, CommandType::Close);
    assert_eq!(second.body, "BBB");
    assert_eq!(&second.correlation_id, close.correlation_id());

    let engine = running.stop().await;
    assert_eq!(engine.stats().published, 2);
}

#[tokio::test(start_paused = true)]
async fn test_reply_resolves_matching_future() {
    let (running, mut peer) = start_engine().await;

    let fut = running.engine.submit(CommandType::Open, "0 USDCAD 0.01 1.3650 1.3550", None).unwrap();
    let id = fut.correlation_id().clone();
    let frame = peer.next_sent().await.unwrap();
    assert_eq!(frame, format!("{ACCOUNT}|{id} open 0 USDCAD 0.01 1.3650 1.3550"));

    assert!(peer.reply(format!("{ACCOUNT}|{id} 12345")));
    assert_eq!(fut.await.unwrap(), "12345");
    assert!(!running.engine.is_pending(&id));

    let engine = running.stop().await;
    assert_eq!(engine.stats().replies_matched, 1);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_reply_is_dropped_and_loop_continues() {
    let (running, mut peer) = start_engine().await;
    let engine = running.engine.clone();

    let fut = engine.submit(CommandType::Info, "", None).unwrap();
    let id = fut.correlation_id().clone();
    peer.next_sent().await.unwrap();

    assert!(peer.reply("response|acct|idX 999"));
    wait_until(|| engine.stats().correlation_misses == 1).await;
    assert!(engine.is_pending(&id));
    assert_eq!(engine.state(), EngineState::Running);

    assert!(peer.reply(format!("response|{ACCOUNT}|{id} ok")));
    assert_eq!(fut.await.unwrap(), "ok");

    running.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_malformed_replies_count_as_protocol_faults() {
    let (running, mut peer) = start_engine().await;
    let engine = running.engine.clone();

    let fut = engine.submit(CommandType::Info, "", None).unwrap();
    peer.next_sent().await.unwrap();

    assert!(peer.reply("no-separator"));
    assert!(peer.reply("acct| empty-id"));
    wait_until(|| engine.stats().protocol_faults == 2).await;

    assert_eq!(engine.pending_count(), 1);
    assert!(engine.is_pending(fut.correlation_id()));

    running.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_correlation_ids_are_unique() {
    let (running, mut peer) = start_engine().await;

    let futures: Vec<_> = (0..50)
        .map(|i| running.engine.submit(CommandType::Info, format!("n{i}"), None).unwrap())
        .collect();

    let mut seen = HashSet::new();
    for _ in 0..50 {
        let frame: CommandFrame = peer.next_sent().await.unwrap().parse().unwrap();
        assert!(seen.insert(frame.correlation_id));
    }
    assert_eq!(running.engine.pending_count(), 50);
    for fut in &futures {
        assert!(seen.contains(fut.correlation_id()));
    }

    running.stop().await;
}

// ---- Timeout and Shutdown Tests ----

#[tokio::test(start_paused = true)]
async fn test_unanswered_command_times_out() {
    let (running, mut peer) = start_engine().await;

    let fut = running
        .engine
        .submit(CommandType::Close, "71176146", Some(Duration::from_secs(3)))
        .unwrap();
    let id = fut.correlation_id().clone();
    peer.next_sent().await.unwrap();

    match fut.await {
        Err(EngineError::Timeout {
            correlation_id,
            timeout,
        }) => {
            assert_eq!(correlation_id, id);
            assert_eq!(timeout, Duration::from_secs(3));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!(!running.engine.is_pending(&id));

    // A late reply is just a correlation miss.
    assert!(peer.reply(format!("{ACCOUNT}|{id} late")));
    let engine = running.engine.clone();
    wait_until(|| engine.stats().correlation_misses == 1).await;
    assert_eq!(engine.stats().timeouts, 1);

    running.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_fails_outstanding_futures() {
    let (running, mut peer) = start_engine().await;
    let engine = running.engine.clone();

    let pending = engine.submit(CommandType::Open, "AAA", None).unwrap();
    peer.next_sent().await.unwrap();
    assert_eq!(engine.pending_count(), 1);

    let engine = running.stop().await;

    assert_eq!(pending.await, Err(EngineError::EngineStopped));
    assert_eq!(engine.state(), EngineState::Stopped);
    assert_eq!(engine.pending_count(), 0);
    assert_eq!(engine.stats().stopped_at_shutdown, 1);

    let err = engine.submit(CommandType::Info, "", None).unwrap_err();
    assert_eq!(err, EngineError::EngineStopped);
}

#[tokio::test(start_paused = true)]
async fn test_queued_commands_fail_when_stopped_before_connect() {
    let (transport, _peer) = LoopbackTransport::gated_pair();
    let (dispatch, engine) = DispatchLoop::new(transport, &engine_config(), ACCOUNT);
    let running = spawn(dispatch, engine.clone());

    engine.wait_for(EngineState::Starting).await;
    let queued = engine.submit(CommandType::Open, "AAA", None).unwrap();

    running.stop().await;
    assert_eq!(queued.await, Err(EngineError::EngineStopped));
}

// ---- Transport Fault and Throughput Tests ----

#[tokio::test(start_paused = true)]
async fn test_send_failure_fails_future_and_clears_pending() {
    let (running, peer) = start_engine().await;
    let engine = running.engine.clone();
    drop(peer);

    let fut = engine.submit(CommandType::Open, "AAA", None).unwrap();
    let id = fut.correlation_id().clone();

    match fut.await {
        Err(EngineError::Transport(TransportError::Send(_))) => {}
        other => panic!("expected send failure, got {other:?}"),
    }
    assert!(!engine.is_pending(&id));
    assert_eq!(engine.pending_count(), 0);
    assert_eq!(engine.stats().transport_faults, 1);
    assert_eq!(engine.state(), EngineState::Running);

    running.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_at_most_one_reply_routed_per_iteration() {
    let (running, mut peer) = start_engine().await;
    let engine = running.engine.clone();

    let futures: Vec<_> = (0..3)
        .map(|i| engine.submit(CommandType::Info, format!("n{i}"), None).unwrap())
        .collect();
    for _ in 0..3 {
        peer.next_sent().await.unwrap();
    }

    // All three replies are waiting before the loop reads any of them.
    for fut in &futures {
        assert!(peer.reply(format!("{ACCOUNT}|{} ok", fut.correlation_id())));
    }

    let mut matched = Vec::new();
    tokio::time::sleep(Duration::from_millis(500)).await;
    matched.push(engine.stats().replies_matched);
    for _ in 0..2 {
        tokio::time::sleep(Duration::from_millis(1000)).await;
        matched.push(engine.stats().replies_matched);
    }
    assert_eq!(matched, vec![1, 2, 3]);

    for fut in futures {
        assert_eq!(fut.await.unwrap(), "ok");
    }
    running.stop().await;
}

// ---- Signal Poller Tests ----

#[tokio::test(start_paused = true)]
async fn test_confident_signal_opens_exactly_one_trade() {
    let mut provider = MockProvider::new();
    provider
        .expect_get_signal()
        .withf(|symbol| symbol == "USDCAD")
        .times(1)
        .returning(|_| Ok(Some(signal(Direction::Buy, 75))));

    let (running, mut peer) = start_with_poller(provider, wednesday());

    let frame: CommandFrame = peer.next_sent().await.unwrap().parse().unwrap();
    assert_eq!(frame.command_type, CommandType::Open);
    assert_eq!(frame.body, "0 USDCAD 0.01 1.3650 1.3550");

    // Several more iterations on the same day: no second call.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(peer.try_next_sent().is_none());

    let engine = running.stop().await;
    assert_eq!(engine.stats().signal_fetches, 1);
}

#[tokio::test(start_paused = true)]
async fn test_threshold_confidence_opens_nothing() {
    let mut provider = MockProvider::new();
    provider
        .expect_get_signal()
        .times(1)
        .returning(|_| Ok(Some(signal(Direction::Sell, 60))));

    let (running, mut peer) = start_with_poller(provider, wednesday());
    running.engine.wait_for(EngineState::Running).await;
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert!(peer.try_next_sent().is_none());
    running.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_missing_signal_opens_nothing_and_waits_retry_gap() {
    let mut provider = MockProvider::new();
    provider.expect_get_signal().times(1).returning(|_| Ok(None));

    let (running, mut peer) = start_with_poller(provider, wednesday());
    running.engine.wait_for(EngineState::Running).await;
    // Fixed clock never reaches the retry gap, so one call only.
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert!(peer.try_next_sent().is_none());
    let engine = running.stop().await;
    assert_eq!(engine.stats().signal_fetches, 1);
    assert_eq!(engine.stats().submitted, 0);
}

#[tokio::test(start_paused = true)]
async fn test_provider_failure_does_not_stop_loop() {
    let mut provider = MockProvider::new();
    provider
        .expect_get_signal()
        .times(1)
        .returning(|_| Err(anyhow::anyhow!("advisory service unavailable")));

    let (running, mut peer) = start_with_poller(provider, wednesday());
    running.engine.wait_for(EngineState::Running).await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    let fut = running.engine.submit(CommandType::Info, "", None).unwrap();
    let id = fut.correlation_id().clone();
    peer.next_sent().await.unwrap();
    assert!(peer.reply(format!("{ACCOUNT}|{id} alive")));
    assert_eq!(fut.await.unwrap(), "alive");

    running.stop().await;
}

// ---- Trading Route Tests ----

#[tokio::test(start_paused = true)]
async fn test_trading_routes_submit_commands() {
    let (transport, _peer) = LoopbackTransport::gated_pair();
    let (dispatch, engine) = DispatchLoop::new(transport, &engine_config(), ACCOUNT);
    let running = spawn(dispatch, engine.clone());
    engine.wait_for(EngineState::Starting).await;

    let mut provider = MockProvider::new();
    provider
        .expect_get_signal()
        .times(1)
        .returning(|_| Ok(Some(signal(Direction::Sell, 10))));
    let provider: Arc<dyn SignalProvider> = Arc::new(provider);

    let state = TradingState {
        engine: engine.clone(),
        provider: Some(provider),
        symbol: "USDCAD".to_string(),
        lot_size: dec!(0.01),
    };

    let (status, Json(ok)) = open_trade(State(state.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert!(ok);

    let (status, Json(ok)) = close_trade(
        State(state.clone()),
        Json(CloseRequest {
            ticket: "71176146".to_string(),
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(ok);
    assert_eq!(engine.queued_count(), 2);

    running.stop().await;

    let (status, Json(ok)) = close_trade(
        State(state),
        Json(CloseRequest {
            ticket: "71176146".to_string(),
        }),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(!ok);
}

#[tokio::test]
async fn test_open_route_without_signal_is_bad_request() {
    let (transport, _peer) = LoopbackTransport::pair();
    let (_dispatch, engine) = DispatchLoop::new(transport, &engine_config(), ACCOUNT);

    let mut provider = MockProvider::new();
    provider.expect_get_signal().times(1).returning(|_| Ok(None));

    let state = TradingState {
        engine,
        provider: Some(Arc::new(provider)),
        symbol: "USDCAD".to_string(),
        lot_size: dec!(0.01),
    };

    let (status, Json(ok)) = open_trade(State(state)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!ok);
}
