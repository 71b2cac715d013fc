//! The `tail` command: stream row changes of one table to stdout.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use checkpoint::{emit_checkpoint, read_checkpoint, Checkpoint, FilesystemStore, StreamPhase};
use ghost_sync_mysql_binlog_source::{
    DispatchMode, DmlEvent, EventsStreamer, RetryPolicy, StreamPosition, StreamerConfig,
};
use migration_context::MigrationContext;
use mysql_async::binlog::value::BinlogValue;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::WatchTable;

/// Options for `ghost-sync tail`
#[derive(clap::Parser, Clone, Debug)]
pub struct TailOpts {
    /// Table to follow
    #[arg(long, value_enum, default_value = "original")]
    pub watch: WatchTable,

    /// Hand events to the printer on its own task instead of inline
    #[arg(long = "async")]
    pub async_dispatch: bool,

    /// Stop after this many events
    #[arg(long)]
    pub max_events: Option<usize>,

    /// Start at this binlog position (`file:offset`) instead of the current one
    #[arg(long)]
    pub start_position: Option<String>,

    /// Directory for stream checkpoints; resumes from the last stop checkpoint
    #[arg(long)]
    pub checkpoint_dir: Option<PathBuf>,

    /// How often to check for Ctrl-C while the binlog is quiet, in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub idle_check_ms: u64,

    /// Reconnect attempts before giving up
    #[arg(long, default_value_t = 10)]
    pub max_reconnect_attempts: u32,

    /// Replica server id; random when unset
    #[arg(long)]
    pub server_id: Option<u32>,
}

/// One line per event: kind, table, position and column values.
pub fn format_event(event: &DmlEvent) -> String {
    let image = |row: Option<&ghost_sync_mysql_binlog_source::RowImage>| match row {
        Some(row) => row
            .values()
            .iter()
            .map(format_value)
            .collect::<Vec<_>>()
            .join(", "),
        None => "-".to_string(),
    };
    format!(
        "{} {}.{} @{} before=[{}] after=[{}]",
        event.kind.as_str(),
        event.schema,
        event.table,
        event.position,
        image(event.before.as_ref()),
        image(event.after.as_ref()),
    )
}

fn format_value(value: &BinlogValue<'static>) -> String {
    match value {
        BinlogValue::Value(value) => value.as_sql(false),
        other => format!("{other:?}"),
    }
}

/// Position to start at: an explicit `--start-position` wins over the last
/// stop checkpoint in `store`.
pub async fn resolve_start_position(
    start_position: Option<&str>,
    store: Option<&FilesystemStore>,
) -> anyhow::Result<Option<StreamPosition>> {
    if let Some(position) = start_position {
        return StreamPosition::from_cli_string(position).map(Some);
    }
    match store {
        Some(store) => {
            let position = read_checkpoint::<StreamPosition>(store, StreamPhase::StreamStop)
                .await
                .context("Failed to read stop checkpoint")?;
            if let Some(position) = &position {
                info!("Resuming from checkpoint {}", position);
            }
            Ok(position)
        }
        None => Ok(None),
    }
}

pub async fn run_tail(
    context: MigrationContext,
    opts: TailOpts,
) -> anyhow::Result<()> {
    let store = opts.checkpoint_dir.clone().map(FilesystemStore::new);
    let start = resolve_start_position(opts.start_position.as_deref(), store.as_ref()).await?;

    let mut config = StreamerConfig::default()
        .with_retry(RetryPolicy::default().with_max_attempts(opts.max_reconnect_attempts))
        .with_stop_check_interval(Duration::from_millis(opts.idle_check_ms.max(1)));
    if let Some(server_id) = opts.server_id {
        config = config.with_server_id(server_id);
    }

    let schema = context.database_name().to_string();
    let table = opts.watch.table_name(&context);
    let mut streamer = EventsStreamer::new(Arc::new(context), config);
    if let Some(position) = start {
        streamer = streamer.with_start_position(position);
    }
    streamer.init_db_connections().await?;

    if let (Some(store), Some(position)) = (&store, streamer.position()) {
        emit_checkpoint(store, position, StreamPhase::StreamStart).await?;
    }

    let token = CancellationToken::new();
    let printed = Arc::new(AtomicUsize::new(0));
    let max_events = opts.max_events;
    let done = token.clone();
    let counter = Arc::clone(&printed);
    let mode = if opts.async_dispatch {
        DispatchMode::Async
    } else {
        DispatchMode::Sync
    };
    streamer.add_listener(mode, &schema, &table, move |event: DmlEvent| -> anyhow::Result<()> {
        println!("{}", format_event(&event));
        let count = counter.fetch_add(1, Ordering::SeqCst) + 1;
        if max_events.is_some_and(|max| count >= max) {
            done.cancel();
        }
        Ok(())
    })?;

    let interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received; stopping");
            interrupt.cancel();
        }
    });

    info!("Tailing {}.{}", schema, table);
    let result = streamer.stream_events(token).await;

    if let (Some(store), Some(position)) = (&store, streamer.position()) {
        if let Err(e) = emit_checkpoint(store, position, StreamPhase::StreamStop).await {
            warn!("Failed to write stop checkpoint: {:#}", e);
        }
    }
    streamer.teardown().await;
    info!("Printed {} events", printed.load(Ordering::SeqCst));

    result.map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ghost_sync_mysql_binlog_source::{DmlKind, RowImage};
    use mysql_async::Value;
    use tempfile::TempDir;

    #[test]
    fn test_format_event() {
        let event = DmlEvent {
            kind: DmlKind::Update,
            schema: "app".to_string(),
            table: "users".to_string(),
            before: Some(RowImage::new(vec![
                BinlogValue::Value(Value::Int(1)),
                BinlogValue::Value(Value::Bytes(b"foo".to_vec())),
            ])),
            after: Some(RowImage::new(vec![
                BinlogValue::Value(Value::Int(1)),
                BinlogValue::Value(Value::NULL),
            ])),
            position: StreamPosition::new("binlog.000002", 880),
        };
        assert_eq!(
            format_event(&event),
            "update app.users @binlog.000002:880 before=[1, 'foo'] after=[1, NULL]"
        );
    }

    #[tokio::test]
    async fn test_explicit_start_position_wins() {
        let tmp = TempDir::new().unwrap();
        let store = FilesystemStore::new(tmp.path());
        emit_checkpoint(
            &store,
            &StreamPosition::new("binlog.000001", 500),
            StreamPhase::StreamStop,
        )
        .await
        .unwrap();

        let start = resolve_start_position(Some("binlog.000009:4"), Some(&store))
            .await
            .unwrap();
        assert_eq!(start, Some(StreamPosition::new("binlog.000009", 4)));
    }

    #[tokio::test]
    async fn test_resumes_from_stop_checkpoint() {
        let tmp = TempDir::new().unwrap();
        let store = FilesystemStore::new(tmp.path());
        emit_checkpoint(
            &store,
            &StreamPosition::new("binlog.000001", 4),
            StreamPhase::StreamStart,
        )
        .await
        .unwrap();
        emit_checkpoint(
            &store,
            &StreamPosition::new("binlog.000001", 500),
            StreamPhase::StreamStop,
        )
        .await
        .unwrap();

        let start = resolve_start_position(None, Some(&store)).await.unwrap();
        assert_eq!(start, Some(StreamPosition::new("binlog.000001", 500)));
    }

    #[tokio::test]
    async fn test_no_store_no_position() {
        assert_eq!(resolve_start_position(None, None).await.unwrap(), None);
        assert!(resolve_start_position(Some("garbage"), None).await.is_err());
    }
}
