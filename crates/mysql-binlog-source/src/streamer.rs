//! The replication stream driver.
//!
//! [`EventsStreamer`] owns one replication connection at a time, decodes its
//! frames into [`DmlEvent`]s and hands them to the listeners registered for
//! their table. Transport failures are handled locally by reopening the
//! connection at the last restart-safe position and skipping row frames that
//! were already dispatched, so listeners see every row change once and in log
//! order.
//!
//! Reconnects share one retry budget: failed opens and connections lost
//! before the stream moves past its previous position both count against
//! [`RetryPolicy::max_attempts`], with backoff between attempts. The budget
//! is restored once a connection delivers a frame beyond that position.
//!
//! Delivery is at-most-once per event while the process lives. Positions are
//! recorded after a frame is fully dispatched, so a caller that persists
//! [`EventsStreamer::position`] and restarts after a crash in the middle of a
//! frame may see that frame's events again.

use std::sync::Arc;
use std::time::Duration;

use migration_context::MigrationContext;
use tracing::{debug, error, info, trace, warn};

use crate::decoder::DecodeState;
use crate::error::StreamError;
use crate::frame::{Frame, SourceError};
use crate::lifecycle::{open_with_retry, Backoff, RetryPolicy};
use crate::listener::{DispatchMode, DmlEventHandler, ListenerRegistry};
use crate::mysql::MySqlConnector;
use crate::position::{PositionTracker, StreamPosition};
use crate::source::{BinlogConnector, FrameSource};
use crate::stop::StopCondition;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamerState {
    Idle,
    Connected,
    Streaming,
    Reconnecting,
    Stopped,
}

#[derive(Debug, Clone, Default)]
pub struct StreamerConfig {
    pub retry: RetryPolicy,
    /// When set, the stop condition is also evaluated after the stream has
    /// been idle this long. Unset, the condition is only evaluated after a
    /// frame arrives, so a quiet server can hold `stream_events` indefinitely.
    pub stop_check_interval: Option<Duration>,
    /// Replica server id for replication connections. Random when unset.
    pub server_id: Option<u32>,
}

impl StreamerConfig {
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_stop_check_interval(mut self, interval: Duration) -> Self {
        self.stop_check_interval = Some(interval);
        self
    }

    pub fn with_server_id(mut self, server_id: u32) -> Self {
        self.server_id = Some(server_id);
        self
    }
}

enum Read {
    Frame(Frame),
    Idle,
}

pub struct EventsStreamer<C: BinlogConnector = MySqlConnector> {
    context: Arc<MigrationContext>,
    connector: C,
    config: StreamerConfig,
    listeners: ListenerRegistry,
    state: StreamerState,
    start_position: Option<StreamPosition>,
    tracker: Option<PositionTracker>,
    source: Option<Box<dyn FrameSource>>,
    decode: DecodeState,
    backoff: Backoff,
}

impl EventsStreamer<MySqlConnector> {
    /// Streamer reading from the inspector connection of `context`.
    pub fn new(context: Arc<MigrationContext>, config: StreamerConfig) -> Self {
        let mut connector = MySqlConnector::new(context.inspector_connection_config().clone());
        if let Some(server_id) = config.server_id {
            connector = connector.with_server_id(server_id);
        }
        Self::with_connector(context, connector, config)
    }
}

impl<C: BinlogConnector> EventsStreamer<C> {
    pub fn with_connector(context: Arc<MigrationContext>, connector: C, config: StreamerConfig) -> Self {
        let backoff = Backoff::new(config.retry.clone());
        Self {
            context,
            connector,
            config,
            listeners: ListenerRegistry::new(),
            state: StreamerState::Idle,
            start_position: None,
            tracker: None,
            source: None,
            decode: DecodeState::new(),
            backoff,
        }
    }

    /// Start at `position` instead of the server's current binlog end.
    pub fn with_start_position(mut self, position: StreamPosition) -> Self {
        self.start_position = Some(position);
        self
    }

    pub fn context(&self) -> &MigrationContext {
        &self.context
    }

    pub fn state(&self) -> StreamerState {
        self.state
    }

    /// End of the last fully-dispatched frame. `None` before initialisation.
    pub fn position(&self) -> Option<&StreamPosition> {
        self.tracker.as_ref().map(PositionTracker::dispatched)
    }

    /// Handle for registering listeners from other tasks.
    pub fn listener_registry(&self) -> ListenerRegistry {
        self.listeners.clone()
    }

    pub fn add_listener<H>(
        &self,
        mode: DispatchMode,
        schema: &str,
        table: &str,
        handler: H,
    ) -> Result<(), StreamError>
    where
        H: DmlEventHandler + 'static,
    {
        self.listeners.add_listener(mode, schema, table, handler)
    }

    /// Open control connections, validate the server and fix the starting
    /// position. Later calls are no-ops.
    pub async fn init_db_connections(&mut self) -> Result<(), StreamError> {
        match self.state {
            StreamerState::Idle => {}
            StreamerState::Stopped => {
                return Err(StreamError::Connection(
                    "streamer has been torn down".to_string(),
                ))
            }
            _ => {
                debug!("init_db_connections called again; already connected");
                return Ok(());
            }
        }

        let current = self.connector.init().await?;
        let start = match self.start_position.clone() {
            Some(position) => {
                info!("Streaming from requested position {} (server is at {})", position, current);
                position
            }
            None => {
                info!("Streaming from current position {}", current);
                current
            }
        };

        self.tracker = Some(PositionTracker::new(start));
        self.state = StreamerState::Connected;
        Ok(())
    }

    /// Run the read-decode-dispatch loop until `stop` says so or an
    /// unrecoverable error occurs.
    ///
    /// `stop` is evaluated after each handled frame, and after each idle
    /// interval when [`StreamerConfig::stop_check_interval`] is set. It never
    /// interrupts a read or a listener in progress.
    ///
    /// On error the streamer returns to [`StreamerState::Connected`] and may
    /// be run again; it resumes after the last fully-dispatched frame.
    pub async fn stream_events<S: StopCondition>(&mut self, stop: S) -> Result<(), StreamError> {
        match self.state {
            StreamerState::Connected => {}
            StreamerState::Idle => {
                return Err(StreamError::Connection(
                    "init_db_connections must be called before stream_events".to_string(),
                ))
            }
            state => {
                return Err(StreamError::Connection(format!(
                    "cannot start streaming in state {state:?}"
                )))
            }
        }

        let result = self.run(&stop).await;
        match &result {
            Ok(()) => {
                info!(
                    "Stop condition met; stopped streaming at {}",
                    self.position_label()
                );
                self.state = StreamerState::Stopped;
            }
            Err(e) => {
                warn!("Streaming stopped at {}: {}", self.position_label(), e);
                self.close_source().await;
                self.state = StreamerState::Connected;
            }
        }
        result
    }

    async fn run<S: StopCondition>(&mut self, stop: &S) -> Result<(), StreamError> {
        self.backoff.reset();
        if self.source.is_none() {
            self.open_source().await?;
        }
        self.state = StreamerState::Streaming;

        loop {
            match self.read_frame().await? {
                Read::Frame(frame) => {
                    if self.handle_frame(frame).await? {
                        self.backoff.reset();
                    }
                }
                Read::Idle => trace!("No frames for {:?}", self.config.stop_check_interval),
            }
            if stop.should_stop() {
                return Ok(());
            }
        }
    }

    async fn read_frame(&mut self) -> Result<Read, StreamError> {
        loop {
            let source = self.source.as_mut().ok_or_else(|| {
                StreamError::Connection("no replication connection is open".to_string())
            })?;

            let read = match self.config.stop_check_interval {
                Some(interval) => match tokio::time::timeout(interval, source.next_frame()).await {
                    Ok(read) => read,
                    Err(_) => return Ok(Read::Idle),
                },
                None => source.next_frame().await,
            };

            match read {
                Ok(Some(frame)) => return Ok(Read::Frame(frame)),
                Ok(None) => self.reconnect("stream ended by server").await?,
                Err(SourceError::Transport(e)) => self.reconnect(&e).await?,
                Err(SourceError::Rejected(e)) => return Err(StreamError::Connection(e)),
                Err(SourceError::Decode(e)) => return Err(StreamError::ProtocolDecode(e)),
            }
        }
    }

    /// Returns whether the frame moved the dispatched position forward.
    async fn handle_frame(&mut self, frame: Frame) -> Result<bool, StreamError> {
        let tracker = self
            .tracker
            .as_mut()
            .ok_or_else(|| StreamError::Connection("streamer is not initialised".to_string()))?;

        let progressed = match frame {
            Frame::Rotate { file, offset } => {
                debug!("Rotate to {}:{}", file, offset);
                tracker.on_rotate(file, offset)
            }
            Frame::TableMap {
                table_id,
                schema,
                table,
                log_pos,
            } => {
                self.decode.observe_table_map(table_id, schema, table);
                tracker.record(log_pos, false)
            }
            Frame::Rows {
                table_id,
                rows,
                log_pos,
            } => {
                if tracker.is_replayed(log_pos) {
                    self.decode.resolve(table_id)?;
                    trace!("Skipping already dispatched rows ending at {}", log_pos);
                    return Ok(false);
                }
                let position = tracker.position_of(log_pos);
                let events = self.decode.decode_rows(table_id, rows, &position)?;
                for event in &events {
                    self.listeners.dispatch(event).await?;
                }
                tracker.record(log_pos, false)
            }
            Frame::Other { log_pos } => tracker.record(log_pos, true),
        };
        Ok(progressed)
    }

    async fn open_source(&mut self) -> Result<(), StreamError> {
        let tracker = self
            .tracker
            .as_mut()
            .ok_or_else(|| StreamError::Connection("streamer is not initialised".to_string()))?;
        let from = tracker.restart_point();

        let source = open_with_retry(&self.connector, &from, &mut self.backoff).await?;
        self.decode.reset();
        self.source = Some(source);
        info!(
            "Streaming binlog of {} from {}",
            self.context.database_name(),
            from
        );
        Ok(())
    }

    /// Replace a lost connection. The loss counts as a failed attempt.
    async fn reconnect(&mut self, cause: &str) -> Result<(), StreamError> {
        self.state = StreamerState::Reconnecting;
        self.close_source().await;

        let from = self.resume_label();
        match self.backoff.on_failure() {
            Some(delay) => {
                warn!(
                    "Replication connection lost ({}); attempt {}/{}, reconnecting at {} in {:?}",
                    cause,
                    self.backoff.failures(),
                    self.backoff.max_attempts(),
                    from,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            None => {
                let attempts = self.backoff.failures();
                error!(
                    "Replication connection at {} lost after {} attempts without progress: {}",
                    from, attempts, cause
                );
                return Err(StreamError::Connection(format!(
                    "replication connection at {from} lost after {attempts} attempts: {cause}"
                )));
            }
        }
        self.open_source().await?;
        self.state = StreamerState::Streaming;
        Ok(())
    }

    async fn close_source(&mut self) {
        if let Some(source) = self.source.take() {
            if let Err(e) = source.close().await {
                debug!("Error closing replication connection: {}", e);
            }
        }
    }

    fn resume_label(&self) -> String {
        self.tracker
            .as_ref()
            .map(|tracker| tracker.resume_from().to_string())
            .unwrap_or_else(|| "<unknown>".to_string())
    }

    fn position_label(&self) -> String {
        self.position()
            .map(ToString::to_string)
            .unwrap_or_else(|| "<unknown>".to_string())
    }

    /// Release the replication connection and the control connections.
    pub async fn close(&mut self) -> Result<(), StreamError> {
        self.close_source().await;
        self.connector.close().await?;
        if self.state != StreamerState::Idle {
            debug!("Closed connections at {}", self.position_label());
        }
        Ok(())
    }

    /// Close connections, wait for async listeners to finish their queues
    /// and stop the streamer for good.
    pub async fn teardown(&mut self) {
        if let Err(e) = self.close().await {
            warn!("Error closing connections during teardown: {}", e);
        }
        self.listeners.drain().await;
        self.state = StreamerState::Stopped;
        info!("Events streamer torn down");
    }
}

impl<C: BinlogConnector> Drop for EventsStreamer<C> {
    fn drop(&mut self) {
        if self.source.is_some() {
            warn!("Events streamer dropped with an open replication connection; call teardown()");
        }
        self.listeners.abort_workers();
    }
}
