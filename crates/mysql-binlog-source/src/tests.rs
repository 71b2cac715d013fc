//! Stream driver tests against scripted replication connections.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use migration_context::MigrationContext;
use mysql_async::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::testing::scripted::int_row;
use crate::testing::{ScriptStep, ScriptedConnector};
use crate::{
    DispatchMode, DmlEvent, DmlEventHandler, DmlKind, EventsStreamer, RetryPolicy, RowChange,
    StreamError, StreamPosition, StreamerConfig, StreamerState,
};

const TABLE_ID: u64 = 7;

fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

fn context() -> Arc<MigrationContext> {
    Arc::new(
        MigrationContext::new("users")
            .unwrap()
            .with_database_name("app"),
    )
}

fn config(max_attempts: u32) -> StreamerConfig {
    StreamerConfig::default().with_retry(
        RetryPolicy::default()
            .with_max_attempts(max_attempts)
            .with_initial_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(5)),
    )
}

fn pos(offset: u64) -> StreamPosition {
    StreamPosition::new("binlog.000001", offset)
}

/// One single-row insert transaction: begin, table-map, rows, commit.
fn insert_tx(begin: u64, id: i64) -> Vec<ScriptStep> {
    vec![
        ScriptStep::marker(begin),
        ScriptStep::table_map(TABLE_ID, "app", "users", begin + 50),
        ScriptStep::rows(TABLE_ID, vec![RowChange::insert(int_row(&[id]))], begin + 100),
        ScriptStep::marker(begin + 130),
    ]
}

fn first_int(event: &DmlEvent) -> i64 {
    match event.row().and_then(|row| row.value(0)) {
        Some(Value::Int(v)) => *v,
        other => panic!("unexpected first column {other:?}"),
    }
}

#[derive(Clone, Default)]
struct Recorder {
    seen: Arc<Mutex<Vec<DmlEvent>>>,
}

impl Recorder {
    fn ids(&self) -> Vec<i64> {
        self.seen.lock().unwrap().iter().map(first_int).collect()
    }

    fn len(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    fn stop_after(&self, count: usize) -> impl Fn() -> bool + Send + Sync + 'static {
        let seen = Arc::clone(&self.seen);
        move || seen.lock().unwrap().len() >= count
    }
}

#[async_trait]
impl DmlEventHandler for Recorder {
    async fn on_dml_event(&self, event: DmlEvent) -> anyhow::Result<()> {
        self.seen.lock().unwrap().push(event);
        Ok(())
    }
}

async fn started(connector: ScriptedConnector) -> EventsStreamer<ScriptedConnector> {
    init_logging();
    let mut streamer = EventsStreamer::with_connector(context(), connector, config(3));
    streamer.init_db_connections().await.unwrap();
    streamer
}

#[tokio::test]
async fn test_three_inserts_delivered_in_order() {
    let script = [
        vec![ScriptStep::marker(120)],
        insert_tx(200, 1),
        insert_tx(400, 2),
        insert_tx(600, 3),
    ]
    .concat();
    let connector = ScriptedConnector::new(pos(4)).with_connection(script);
    let mut streamer = started(connector).await;
    let recorder = Recorder::default();
    streamer
        .add_listener(DispatchMode::Sync, "app", "users", recorder.clone())
        .unwrap();

    streamer.stream_events(recorder.stop_after(3)).await.unwrap();

    assert_eq!(recorder.ids(), vec![1, 2, 3]);
    let seen = recorder.seen.lock().unwrap();
    assert!(seen.iter().all(|e| e.kind == DmlKind::Insert && e.before.is_none()));
    assert_eq!(seen[2].position, pos(700));
    drop(seen);
    assert_eq!(streamer.position(), Some(&pos(700)));
    assert_eq!(streamer.state(), StreamerState::Stopped);

    streamer.teardown().await;
}

#[tokio::test]
async fn test_events_for_other_tables_are_not_delivered() {
    let script = vec![
        ScriptStep::marker(200),
        ScriptStep::table_map(3, "app", "orders", 250),
        ScriptStep::rows(3, vec![RowChange::insert(int_row(&[99]))], 300),
        ScriptStep::table_map(TABLE_ID, "app", "users", 350),
        ScriptStep::rows(TABLE_ID, vec![RowChange::insert(int_row(&[1]))], 400),
        ScriptStep::marker(430),
    ];
    let connector = ScriptedConnector::new(pos(4)).with_connection(script);
    let mut streamer = started(connector).await;
    let recorder = Recorder::default();
    streamer
        .add_listener(DispatchMode::Sync, "app", "users", recorder.clone())
        .unwrap();

    streamer.stream_events(recorder.stop_after(1)).await.unwrap();

    assert_eq!(recorder.ids(), vec![1]);
    streamer.teardown().await;
}

#[tokio::test]
async fn test_update_and_delete_carry_before_images() {
    let script = vec![
        ScriptStep::marker(200),
        ScriptStep::table_map(TABLE_ID, "app", "users", 250),
        ScriptStep::rows(
            TABLE_ID,
            vec![
                RowChange::update(int_row(&[1, 10]), int_row(&[1, 11])),
                RowChange::delete(int_row(&[2, 20])),
            ],
            300,
        ),
        ScriptStep::marker(330),
    ];
    let connector = ScriptedConnector::new(pos(4)).with_connection(script);
    let mut streamer = started(connector).await;
    let recorder = Recorder::default();
    streamer
        .add_listener(DispatchMode::Sync, "app", "users", recorder.clone())
        .unwrap();

    streamer.stream_events(recorder.stop_after(2)).await.unwrap();

    let seen = recorder.seen.lock().unwrap();
    assert_eq!(seen[0].kind, DmlKind::Update);
    assert_eq!(
        seen[0].before.as_ref().and_then(|r| r.value(1)),
        Some(&Value::Int(10))
    );
    assert_eq!(
        seen[0].after.as_ref().and_then(|r| r.value(1)),
        Some(&Value::Int(11))
    );
    assert_eq!(seen[1].kind, DmlKind::Delete);
    assert!(seen[1].after.is_none());
    assert_eq!(first_int(&seen[1]), 2);
    drop(seen);
    streamer.teardown().await;
}

#[tokio::test]
async fn test_duplicate_listener_registration_delivers_twice() {
    let connector = ScriptedConnector::new(pos(4)).with_connection(insert_tx(200, 1));
    let mut streamer = started(connector).await;
    let recorder = Recorder::default();
    streamer
        .add_listener(DispatchMode::Sync, "app", "users", recorder.clone())
        .unwrap();
    streamer
        .add_listener(DispatchMode::Sync, "app", "users", recorder.clone())
        .unwrap();

    streamer.stream_events(recorder.stop_after(2)).await.unwrap();

    assert_eq!(recorder.ids(), vec![1, 1]);
    streamer.teardown().await;
}

#[tokio::test]
async fn test_reconnect_resumes_without_gaps_or_duplicates() {
    let first = [
        vec![ScriptStep::marker(120)],
        insert_tx(200, 1),
        vec![
            ScriptStep::marker(400),
            ScriptStep::table_map(TABLE_ID, "app", "users", 450),
            ScriptStep::rows(TABLE_ID, vec![RowChange::insert(int_row(&[2]))], 500),
            ScriptStep::Disconnect,
        ],
    ]
    .concat();
    // The server replays from the last transaction boundary.
    let second = [
        vec![
            ScriptStep::table_map(TABLE_ID, "app", "users", 450),
            ScriptStep::rows(TABLE_ID, vec![RowChange::insert(int_row(&[2]))], 500),
            ScriptStep::marker(530),
        ],
        insert_tx(600, 3),
    ]
    .concat();
    let connector = ScriptedConnector::new(pos(4))
        .with_connection(first)
        .with_connection(second);
    let mut streamer = started(connector.clone()).await;
    let recorder = Recorder::default();
    streamer
        .add_listener(DispatchMode::Sync, "app", "users", recorder.clone())
        .unwrap();

    streamer.stream_events(recorder.stop_after(3)).await.unwrap();

    assert_eq!(recorder.ids(), vec![1, 2, 3]);
    assert_eq!(connector.opened_at(), vec![pos(4), pos(400)]);
    assert_eq!(streamer.position(), Some(&pos(700)));
    streamer.teardown().await;
}

#[tokio::test]
async fn test_server_ending_stream_triggers_reconnect() {
    let first = vec![ScriptStep::marker(120), ScriptStep::EndOfStream];
    let connector = ScriptedConnector::new(pos(4))
        .with_connection(first)
        .with_connection(insert_tx(200, 1));
    let mut streamer = started(connector.clone()).await;
    let recorder = Recorder::default();
    streamer
        .add_listener(DispatchMode::Sync, "app", "users", recorder.clone())
        .unwrap();

    streamer.stream_events(recorder.stop_after(1)).await.unwrap();

    assert_eq!(recorder.ids(), vec![1]);
    assert_eq!(connector.opened_at(), vec![pos(4), pos(120)]);
    streamer.teardown().await;
}

#[tokio::test]
async fn test_rows_without_table_map_after_reconnect_is_fatal() {
    let first = vec![
        ScriptStep::table_map(TABLE_ID, "app", "users", 250),
        ScriptStep::rows(TABLE_ID, vec![RowChange::insert(int_row(&[1]))], 300),
        ScriptStep::Disconnect,
    ];
    let second = vec![ScriptStep::rows(
        TABLE_ID,
        vec![RowChange::insert(int_row(&[2]))],
        400,
    )];
    let connector = ScriptedConnector::new(pos(4))
        .with_connection(first)
        .with_connection(second);
    let mut streamer = started(connector).await;
    let recorder = Recorder::default();
    streamer
        .add_listener(DispatchMode::Sync, "app", "users", recorder.clone())
        .unwrap();

    let err = streamer.stream_events(|| false).await.unwrap_err();

    assert!(matches!(err, StreamError::ProtocolDecode(_)), "{err}");
    assert_eq!(recorder.ids(), vec![1]);
    assert_eq!(streamer.state(), StreamerState::Connected);
    streamer.teardown().await;
}

#[tokio::test]
async fn test_rows_before_table_map_is_fatal() {
    let script = vec![ScriptStep::rows(
        TABLE_ID,
        vec![RowChange::insert(int_row(&[1]))],
        300,
    )];
    let connector = ScriptedConnector::new(pos(4)).with_connection(script);
    let mut streamer = started(connector.clone()).await;
    let recorder = Recorder::default();
    streamer
        .add_listener(DispatchMode::Sync, "app", "users", recorder.clone())
        .unwrap();

    let err = streamer.stream_events(|| false).await.unwrap_err();

    assert!(matches!(err, StreamError::ProtocolDecode(_)), "{err}");
    assert_eq!(recorder.len(), 0);
    assert_eq!(connector.opened_at().len(), 1);
    streamer.teardown().await;
}

#[tokio::test]
async fn test_garbled_frame_is_not_retried() {
    let script = vec![
        ScriptStep::marker(120),
        ScriptStep::Garbled("unexpected event type 0xff".to_string()),
    ];
    let connector = ScriptedConnector::new(pos(4)).with_connection(script);
    let mut streamer = started(connector.clone()).await;

    let err = streamer.stream_events(|| false).await.unwrap_err();

    assert!(matches!(err, StreamError::ProtocolDecode(ref m) if m.contains("0xff")));
    assert_eq!(connector.opened_at().len(), 1);
    streamer.teardown().await;
}

#[tokio::test]
async fn test_sync_listener_error_stops_streaming() {
    let connector = ScriptedConnector::new(pos(4)).with_connection(insert_tx(200, 1));
    let mut streamer = started(connector).await;
    streamer
        .add_listener(
            DispatchMode::Sync,
            "app",
            "users",
            |_e: DmlEvent| -> anyhow::Result<()> { Err(anyhow::anyhow!("shadow table is gone")) },
        )
        .unwrap();

    let err = streamer.stream_events(|| false).await.unwrap_err();

    match err {
        StreamError::Listener { schema, table, source } => {
            assert_eq!(schema, "app");
            assert_eq!(table, "users");
            assert_eq!(source.to_string(), "shadow table is gone");
        }
        other => panic!("expected listener error, got {other:?}"),
    }
    // The failed frame is not recorded as dispatched.
    assert_eq!(streamer.position(), Some(&pos(250)));
    assert_eq!(streamer.state(), StreamerState::Connected);
    streamer.teardown().await;
}

#[tokio::test]
async fn test_streaming_again_after_listener_error_redelivers_failed_frame() {
    let first = [insert_tx(200, 1), insert_tx(400, 2)].concat();
    let second = vec![
        ScriptStep::table_map(TABLE_ID, "app", "users", 450),
        ScriptStep::rows(TABLE_ID, vec![RowChange::insert(int_row(&[2]))], 500),
        ScriptStep::marker(530),
    ];
    let connector = ScriptedConnector::new(pos(4))
        .with_connection(first)
        .with_connection(second);
    let mut streamer = started(connector.clone()).await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let failed_once = Arc::new(AtomicBool::new(false));
    let sink = Arc::clone(&seen);
    let flag = Arc::clone(&failed_once);
    streamer
        .add_listener(
            DispatchMode::Sync,
            "app",
            "users",
            move |e: DmlEvent| -> anyhow::Result<()> {
                let id = first_int(&e);
                if id == 2 && !flag.swap(true, Ordering::SeqCst) {
                    anyhow::bail!("transient apply failure");
                }
                sink.lock().unwrap().push(id);
                Ok(())
            },
        )
        .unwrap();

    assert!(streamer.stream_events(|| false).await.is_err());
    assert_eq!(streamer.position(), Some(&pos(450)));

    let done = Arc::clone(&seen);
    streamer
        .stream_events(move || done.lock().unwrap().len() >= 2)
        .await
        .unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    assert_eq!(connector.opened_at(), vec![pos(4), pos(400)]);
    streamer.teardown().await;
}

#[tokio::test]
async fn test_reconnect_retries_exhausted_is_connection_error() {
    let connector = ScriptedConnector::new(pos(4))
        .with_connection(vec![ScriptStep::marker(120), ScriptStep::Disconnect])
        .with_connection(insert_tx(200, 1))
        .with_refused_reopens(3);
    let mut streamer = started(connector.clone()).await;

    let err = streamer.stream_events(|| false).await.unwrap_err();

    match err {
        StreamError::Connection(msg) => {
            assert!(msg.contains("binlog.000001:120"), "{msg}");
            assert!(msg.contains("after 3 attempts"), "{msg}");
        }
        other => panic!("expected connection error, got {other:?}"),
    }
    assert_eq!(connector.opened_at(), vec![pos(4)]);
    assert_eq!(streamer.state(), StreamerState::Connected);
    streamer.teardown().await;
}

#[tokio::test]
async fn test_connections_dropping_without_progress_exhaust_retries() {
    let mut connector = ScriptedConnector::new(pos(4));
    for _ in 0..10 {
        connector = connector.with_connection(vec![ScriptStep::Disconnect]);
    }
    init_logging();
    let retry = RetryPolicy::default()
        .with_max_attempts(3)
        .with_initial_delay(Duration::from_millis(20))
        .with_max_delay(Duration::from_millis(100));
    let mut streamer = EventsStreamer::with_connector(
        context(),
        connector.clone(),
        StreamerConfig::default().with_retry(retry),
    );
    streamer.init_db_connections().await.unwrap();

    let started_at = std::time::Instant::now();
    let err = streamer.stream_events(|| false).await.unwrap_err();

    match err {
        StreamError::Connection(msg) => {
            assert!(msg.contains("binlog.000001:4"), "{msg}");
            assert!(msg.contains("after 3 attempts"), "{msg}");
        }
        other => panic!("expected connection error, got {other:?}"),
    }
    assert_eq!(connector.opened_at(), vec![pos(4), pos(4), pos(4)]);
    // 20ms after the first drop, 40ms after the second.
    assert!(started_at.elapsed() >= Duration::from_millis(60));
    assert_eq!(streamer.state(), StreamerState::Connected);
    streamer.teardown().await;
}

#[tokio::test]
async fn test_progress_restores_the_retry_budget() {
    // Each connection moves the stream forward before dropping, so three
    // drops with a budget of three attempts never exhaust it.
    let connector = ScriptedConnector::new(pos(4))
        .with_connection([insert_tx(200, 1), vec![ScriptStep::Disconnect]].concat())
        .with_connection([insert_tx(400, 2), vec![ScriptStep::Disconnect]].concat())
        .with_connection([insert_tx(600, 3), vec![ScriptStep::Disconnect]].concat())
        .with_connection(insert_tx(800, 4));
    let mut streamer = started(connector.clone()).await;
    let recorder = Recorder::default();
    streamer
        .add_listener(DispatchMode::Sync, "app", "users", recorder.clone())
        .unwrap();

    streamer.stream_events(recorder.stop_after(4)).await.unwrap();

    assert_eq!(recorder.ids(), vec![1, 2, 3, 4]);
    assert_eq!(
        connector.opened_at(),
        vec![pos(4), pos(330), pos(530), pos(730)]
    );
    streamer.teardown().await;
}

#[tokio::test]
async fn test_replayed_frames_do_not_restore_the_retry_budget() {
    // After the first drop every connection only replays what was already
    // dispatched before dropping again.
    let replay = vec![
        ScriptStep::table_map(TABLE_ID, "app", "users", 250),
        ScriptStep::rows(TABLE_ID, vec![RowChange::insert(int_row(&[1]))], 300),
        ScriptStep::Disconnect,
    ];
    let connector = ScriptedConnector::new(pos(4))
        .with_connection(
            [
                vec![ScriptStep::marker(200)],
                replay.clone(),
            ]
            .concat(),
        )
        .with_connection(replay.clone())
        .with_connection(replay.clone())
        .with_connection(replay);
    let mut streamer = started(connector.clone()).await;
    let recorder = Recorder::default();
    streamer
        .add_listener(DispatchMode::Sync, "app", "users", recorder.clone())
        .unwrap();

    let err = streamer.stream_events(|| false).await.unwrap_err();

    assert!(
        matches!(&err, StreamError::Connection(msg) if msg.contains("after 3 attempts")),
        "{err:?}"
    );
    assert_eq!(recorder.ids(), vec![1]);
    assert_eq!(connector.opened_at(), vec![pos(4), pos(200), pos(200)]);
    streamer.teardown().await;
}

#[tokio::test]
async fn test_initial_open_retries_then_gives_up() {
    let connector = ScriptedConnector::new(pos(4))
        .with_connection(insert_tx(200, 1))
        .with_refused_opens(3);
    let mut streamer = started(connector.clone()).await;

    let err = streamer.stream_events(|| false).await.unwrap_err();

    match err {
        StreamError::Connection(msg) => assert!(msg.contains("after 3 attempts"), "{msg}"),
        other => panic!("expected connection error, got {other:?}"),
    }
    assert!(connector.opened_at().is_empty());
    streamer.teardown().await;
}

#[tokio::test]
async fn test_transient_refusals_are_retried() {
    let connector = ScriptedConnector::new(pos(4))
        .with_connection(insert_tx(200, 1))
        .with_refused_opens(2);
    let mut streamer = started(connector.clone()).await;
    let recorder = Recorder::default();
    streamer
        .add_listener(DispatchMode::Sync, "app", "users", recorder.clone())
        .unwrap();

    streamer.stream_events(recorder.stop_after(1)).await.unwrap();

    assert_eq!(recorder.ids(), vec![1]);
    assert_eq!(connector.opened_at(), vec![pos(4)]);
    streamer.teardown().await;
}

#[tokio::test]
async fn test_rotate_moves_position_to_next_file() {
    let script = vec![
        ScriptStep::marker(200),
        ScriptStep::table_map(TABLE_ID, "app", "users", 250),
        ScriptStep::rows(TABLE_ID, vec![RowChange::insert(int_row(&[1]))], 300),
        ScriptStep::marker(330),
        ScriptStep::rotate("binlog.000002", 4),
        ScriptStep::marker(126),
        ScriptStep::table_map(TABLE_ID, "app", "users", 200),
        ScriptStep::rows(TABLE_ID, vec![RowChange::insert(int_row(&[2]))], 250),
    ];
    let connector = ScriptedConnector::new(pos(4)).with_connection(script);
    let mut streamer = started(connector).await;
    let recorder = Recorder::default();
    streamer
        .add_listener(DispatchMode::Sync, "app", "users", recorder.clone())
        .unwrap();

    streamer.stream_events(recorder.stop_after(2)).await.unwrap();

    let positions: Vec<StreamPosition> = recorder
        .seen
        .lock()
        .unwrap()
        .iter()
        .map(|e| e.position.clone())
        .collect();
    assert_eq!(
        positions,
        vec![pos(300), StreamPosition::new("binlog.000002", 250)]
    );
    streamer.teardown().await;
}

#[tokio::test]
async fn test_rotate_past_six_digit_sequence_keeps_delivering() {
    let start = StreamPosition::new("binlog.999999", 4);
    let script = vec![
        ScriptStep::marker(120),
        ScriptStep::rotate("binlog.1000000", 4),
        ScriptStep::marker(126),
        ScriptStep::table_map(TABLE_ID, "app", "users", 200),
        ScriptStep::rows(TABLE_ID, vec![RowChange::insert(int_row(&[1]))], 250),
        ScriptStep::marker(280),
    ];
    let connector = ScriptedConnector::new(start.clone()).with_connection(script);
    let mut streamer = started(connector).await;
    let recorder = Recorder::default();
    streamer
        .add_listener(DispatchMode::Sync, "app", "users", recorder.clone())
        .unwrap();

    streamer.stream_events(recorder.stop_after(1)).await.unwrap();

    assert_eq!(recorder.ids(), vec![1]);
    assert_eq!(
        streamer.position(),
        Some(&StreamPosition::new("binlog.1000000", 250))
    );
    streamer.teardown().await;
}

#[tokio::test]
async fn test_start_position_overrides_server_position() {
    let start = StreamPosition::new("binlog.000005", 1000);
    let connector = ScriptedConnector::new(pos(4)).with_connection(vec![ScriptStep::marker(1100)]);
    init_logging();
    let mut streamer = EventsStreamer::with_connector(context(), connector.clone(), config(3))
        .with_start_position(start.clone());
    streamer.init_db_connections().await.unwrap();
    assert_eq!(streamer.position(), Some(&start));

    let frames = AtomicUsize::new(0);
    streamer
        .stream_events(move || frames.fetch_add(1, Ordering::SeqCst) >= 1)
        .await
        .unwrap();

    assert_eq!(connector.opened_at(), vec![start]);
    assert_eq!(
        streamer.position(),
        Some(&StreamPosition::new("binlog.000005", 1100))
    );
    streamer.teardown().await;
}

#[tokio::test]
async fn test_stop_condition_evaluated_once_per_frame() {
    let script = vec![
        ScriptStep::marker(120),
        ScriptStep::marker(200),
        ScriptStep::marker(300),
    ];
    let connector = ScriptedConnector::new(pos(4)).with_connection(script);
    let mut streamer = started(connector).await;

    let checks = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&checks);
    // Opening rotate, then the 120 marker.
    streamer
        .stream_events(move || counter.fetch_add(1, Ordering::SeqCst) + 1 >= 2)
        .await
        .unwrap();

    assert_eq!(checks.load(Ordering::SeqCst), 2);
    assert_eq!(streamer.position(), Some(&pos(120)));
    streamer.teardown().await;
}

#[tokio::test]
async fn test_idle_interval_lets_quiet_stream_stop() {
    init_logging();
    let connector = ScriptedConnector::new(pos(4)).with_connection(vec![]);
    let mut streamer = EventsStreamer::with_connector(
        context(),
        connector,
        config(3).with_stop_check_interval(Duration::from_millis(10)),
    );
    streamer.init_db_connections().await.unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let setter = Arc::clone(&stop);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        setter.store(true, Ordering::SeqCst);
    });

    tokio::time::timeout(Duration::from_secs(5), streamer.stream_events(stop))
        .await
        .expect("stream_events should return once the stop flag is set")
        .unwrap();

    assert_eq!(streamer.state(), StreamerState::Stopped);
    streamer.teardown().await;
}

#[tokio::test]
async fn test_async_listener_drained_on_teardown() {
    let script = [insert_tx(200, 1), insert_tx(400, 2), insert_tx(600, 3)].concat();
    let connector = ScriptedConnector::new(pos(4)).with_connection(script);
    let mut streamer = started(connector.clone()).await;

    let recorder = Recorder::default();
    streamer
        .add_listener(DispatchMode::Async, "app", "users", recorder.clone())
        .unwrap();
    let frames = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&frames);
    // Opening rotate plus three four-frame transactions.
    streamer
        .stream_events(move || counter.fetch_add(1, Ordering::SeqCst) + 1 >= 13)
        .await
        .unwrap();

    streamer.teardown().await;

    assert_eq!(recorder.ids(), vec![1, 2, 3]);
    assert_eq!(connector.close_calls(), 1);
    assert_eq!(streamer.state(), StreamerState::Stopped);
}

#[tokio::test]
async fn test_stream_events_requires_init() {
    let connector = ScriptedConnector::new(pos(4));
    let mut streamer = EventsStreamer::with_connector(context(), connector.clone(), config(3));

    let err = streamer.stream_events(|| true).await.unwrap_err();

    assert!(matches!(err, StreamError::Connection(_)));
    assert_eq!(connector.init_calls(), 0);
    assert!(connector.opened_at().is_empty());
}

#[tokio::test]
async fn test_init_is_idempotent() {
    let connector = ScriptedConnector::new(pos(4));
    let mut streamer = started(connector.clone()).await;
    streamer.init_db_connections().await.unwrap();

    assert_eq!(connector.init_calls(), 1);
    assert_eq!(streamer.state(), StreamerState::Connected);
    streamer.teardown().await;
}

#[tokio::test]
async fn test_teardown_is_terminal() {
    let connector = ScriptedConnector::new(pos(4)).with_connection(vec![]);
    let mut streamer = started(connector).await;
    streamer.teardown().await;

    assert_eq!(streamer.state(), StreamerState::Stopped);
    assert!(streamer.stream_events(|| true).await.is_err());
    assert!(streamer.init_db_connections().await.is_err());
}
