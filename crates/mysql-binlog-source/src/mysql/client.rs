//! Control-connection helpers and error classification.

use migration_context::ConnectionConfig;
use mysql_async::prelude::*;
use mysql_async::{Conn, DriverError, Opts, OptsBuilder, Row, SslOpts};
use tracing::{debug, info};

use crate::error::StreamError;
use crate::frame::SourceError;
use crate::position::StreamPosition;

/// Server error codes that mean the connection went away rather than that
/// the request was wrong: shutdown in progress, query interrupted, connection
/// killed, server gone away, lost connection.
const TRANSIENT_SERVER_ERRORS: [u16; 5] = [1053, 1317, 1927, 2006, 2013];

/// Build driver options from a connection config.
pub fn mysql_opts(config: &ConnectionConfig) -> Opts {
    opts_builder(config).into()
}

pub(crate) fn opts_builder(config: &ConnectionConfig) -> OptsBuilder {
    let mut builder = OptsBuilder::default()
        .ip_or_hostname(config.host.clone())
        .tcp_port(config.port)
        .user(Some(config.user.clone()))
        .pass(config.password.clone())
        .db_name(config.database.clone());

    if let Some(tls) = &config.tls {
        builder = builder.ssl_opts(
            SslOpts::default()
                .with_danger_accept_invalid_certs(tls.accept_invalid_certs)
                .with_danger_skip_domain_validation(tls.skip_domain_validation),
        );
    }

    builder
}

pub(crate) fn is_transient(err: &mysql_async::Error) -> bool {
    match err {
        mysql_async::Error::Io(_) => true,
        mysql_async::Error::Driver(
            DriverError::ConnectionClosed | DriverError::PoolDisconnected,
        ) => true,
        mysql_async::Error::Server(server) => TRANSIENT_SERVER_ERRORS.contains(&server.code),
        _ => false,
    }
}

pub(crate) fn classify(err: mysql_async::Error) -> SourceError {
    if is_transient(&err) {
        SourceError::Transport(err.to_string())
    } else {
        SourceError::Rejected(err.to_string())
    }
}

pub(crate) fn control_error(context: &str, err: mysql_async::Error) -> StreamError {
    StreamError::Connection(format!("{context}: {err}"))
}

/// Check the server writes a binlog the streamer can decode: logging on,
/// row-based format and full row images.
pub async fn validate_binlog_settings(conn: &mut Conn) -> Result<(), StreamError> {
    let settings: Option<(i64, String, String)> = conn
        .query_first("SELECT @@global.log_bin, @@global.binlog_format, @@global.binlog_row_image")
        .await
        .map_err(|e| control_error("Failed to read binlog settings", e))?;

    let (log_bin, format, row_image) = settings.ok_or_else(|| {
        StreamError::Connection("Server returned no binlog settings".to_string())
    })?;

    if log_bin != 1 {
        return Err(StreamError::Connection(
            "Binary logging is disabled on the server (log_bin=0)".to_string(),
        ));
    }
    if !format.eq_ignore_ascii_case("ROW") {
        return Err(StreamError::Connection(format!(
            "binlog_format must be ROW, server has {format}"
        )));
    }
    if !row_image.eq_ignore_ascii_case("FULL") {
        return Err(StreamError::Connection(format!(
            "binlog_row_image must be FULL, server has {row_image}"
        )));
    }

    debug!("Binlog settings OK: log_bin=1 binlog_format={format} binlog_row_image={row_image}");
    Ok(())
}

/// Current end of the server's binlog.
///
/// Uses `SHOW BINARY LOG STATUS` and falls back to `SHOW MASTER STATUS` on
/// servers older than 8.2.
pub async fn current_binlog_position(conn: &mut Conn) -> Result<StreamPosition, StreamError> {
    let row: Option<Row> = match conn.query_first("SHOW BINARY LOG STATUS").await {
        Ok(row) => row,
        Err(e) => {
            debug!("SHOW BINARY LOG STATUS unavailable ({e}), using SHOW MASTER STATUS");
            conn.query_first("SHOW MASTER STATUS")
                .await
                .map_err(|e| control_error("Failed to read binlog status", e))?
        }
    };

    let row = row.ok_or_else(|| {
        StreamError::Connection("Server reported no binary log status".to_string())
    })?;
    let file: String = row
        .get("File")
        .ok_or_else(|| StreamError::Connection("Binary log status has no File".to_string()))?;
    let offset: u64 = row
        .get("Position")
        .ok_or_else(|| StreamError::Connection("Binary log status has no Position".to_string()))?;

    let position = StreamPosition::new(file, offset);
    info!("Current binlog position: {}", position);
    Ok(position)
}
