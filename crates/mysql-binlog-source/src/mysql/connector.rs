//! Replication connections backed by `mysql_async` binlog streams.

use async_trait::async_trait;
use futures::StreamExt;
use migration_context::ConnectionConfig;
use mysql_async::binlog::events::EventData;
use mysql_async::binlog::row::BinlogRow;
use mysql_async::{BinlogStream, BinlogStreamRequest, Conn, Pool};
use tracing::{debug, info};

use super::client::{
    classify, control_error, current_binlog_position, opts_builder, validate_binlog_settings,
};
use crate::error::StreamError;
use crate::frame::{Frame, RowChange, SourceError};
use crate::position::StreamPosition;
use crate::source::{BinlogConnector, FrameSource};

/// Connects to a MySQL server as a replica.
///
/// A control pool is used for settings checks and coordinates; each replication
/// connection is a dedicated `Conn` turned into a binlog stream.
pub struct MySqlConnector {
    config: ConnectionConfig,
    server_id: u32,
    control: Option<Pool>,
}

impl MySqlConnector {
    pub fn new(config: ConnectionConfig) -> Self {
        let server_id = rand::random::<u32>() % 1000000 + 1000000; // Random ID between 1M-2M

        Self {
            config,
            server_id,
            control: None,
        }
    }

    /// Replica server id to announce. Must be unique among the server's replicas.
    pub fn with_server_id(mut self, server_id: u32) -> Self {
        self.server_id = server_id;
        self
    }

    pub fn server_id(&self) -> u32 {
        self.server_id
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

impl std::fmt::Debug for MySqlConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlConnector")
            .field("config", &self.config)
            .field("server_id", &self.server_id)
            .field("connected", &self.control.is_some())
            .finish()
    }
}

#[async_trait]
impl BinlogConnector for MySqlConnector {
    async fn init(&mut self) -> Result<StreamPosition, StreamError> {
        self.config
            .validate()
            .map_err(|e| StreamError::InvalidArgument(e.to_string()))?;

        let address = self.config.address();
        info!("Connecting to MySQL at {} as {}", address, self.config.user);

        let pool = Pool::new(opts_builder(&self.config));
        let mut conn = tokio::time::timeout(self.config.connect_timeout, pool.get_conn())
            .await
            .map_err(|_| {
                StreamError::Connection(format!(
                    "Timed out after {:?} connecting to {address}",
                    self.config.connect_timeout
                ))
            })?
            .map_err(|e| control_error(&format!("Failed to connect to {address}"), e))?;

        validate_binlog_settings(&mut conn).await?;
        let position = current_binlog_position(&mut conn).await?;
        drop(conn);

        self.control = Some(pool);
        Ok(position)
    }

    async fn open(&self, from: &StreamPosition) -> Result<Box<dyn FrameSource>, SourceError> {
        let conn = tokio::time::timeout(
            self.config.connect_timeout,
            Conn::new(opts_builder(&self.config)),
        )
        .await
        .map_err(|_| {
            SourceError::Transport(format!(
                "timed out after {:?} connecting to {}",
                self.config.connect_timeout,
                self.config.address()
            ))
        })?
        .map_err(classify)?;

        let request = BinlogStreamRequest::new(self.server_id)
            .with_filename(from.file.as_bytes())
            .with_pos(from.offset);
        let stream = conn.get_binlog_stream(request).await.map_err(classify)?;
        debug!(
            "Replication connection open at {} with server id {}",
            from, self.server_id
        );

        Ok(Box::new(MySqlFrameSource { stream }))
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        if let Some(pool) = self.control.take() {
            pool.disconnect()
                .await
                .map_err(|e| control_error("Failed to close control connections", e))?;
            debug!("Control connections to {} closed", self.config.address());
        }
        Ok(())
    }
}

/// Frames from one `mysql_async` binlog stream.
pub struct MySqlFrameSource {
    stream: BinlogStream,
}

impl MySqlFrameSource {
    fn decode_error(log_pos: u64, e: impl std::fmt::Display) -> SourceError {
        SourceError::Decode(format!("Failed to decode binlog event ending at {log_pos}: {e}"))
    }
}

#[async_trait]
impl FrameSource for MySqlFrameSource {
    async fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        let event = match self.stream.next().await {
            Some(Ok(event)) => event,
            Some(Err(e)) => return Err(classify(e)),
            None => return Ok(None),
        };

        let log_pos = u64::from(event.header().log_pos());
        let data = event
            .read_data()
            .map_err(|e| Self::decode_error(log_pos, e))?;

        let frame = match data {
            Some(EventData::TableMapEvent(tme)) => Frame::TableMap {
                table_id: tme.table_id(),
                schema: tme.database_name().into_owned(),
                table: tme.table_name().into_owned(),
                log_pos,
            },
            Some(EventData::RowsEvent(rows_event)) => {
                let table_id = rows_event.table_id();
                // The stream keeps its own table-map cache for column metadata.
                let tme = self.stream.get_tme(table_id).ok_or_else(|| {
                    SourceError::Decode(format!(
                        "Row-change frame ending at {log_pos} references table id {table_id} with no table-map frame"
                    ))
                })?;
                let mut rows = Vec::new();
                for row in rows_event.rows(tme) {
                    let (before, after) = row.map_err(|e| Self::decode_error(log_pos, e))?;
                    rows.push(RowChange {
                        before: before.map(BinlogRow::unwrap),
                        after: after.map(BinlogRow::unwrap),
                    });
                }
                Frame::Rows {
                    table_id,
                    rows,
                    log_pos,
                }
            }
            Some(EventData::RotateEvent(rotate)) => Frame::Rotate {
                file: rotate.name().into_owned(),
                offset: rotate.position(),
            },
            _ => Frame::Other { log_pos },
        };

        Ok(Some(frame))
    }

    async fn close(self: Box<Self>) -> Result<(), SourceError> {
        self.stream.close().await.map_err(classify)
    }
}
