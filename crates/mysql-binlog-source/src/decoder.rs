//! Per-connection table-id bookkeeping and row decoding.

use std::collections::HashMap;

use tracing::trace;

use crate::error::StreamError;
use crate::event::{DmlEvent, DmlKind, RowImage};
use crate::frame::RowChange;
use crate::position::StreamPosition;

/// Table ids are only meaningful on the connection that announced them, so
/// this state is cleared every time a replication connection is opened.
#[derive(Debug, Default)]
pub(crate) struct DecodeState {
    tables: HashMap<u64, (String, String)>,
}

impl DecodeState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn reset(&mut self) {
        self.tables.clear();
    }

    pub(crate) fn observe_table_map(&mut self, table_id: u64, schema: String, table: String) {
        trace!("Table id {} maps to {}.{}", table_id, schema, table);
        self.tables.insert(table_id, (schema, table));
    }

    pub(crate) fn resolve(&self, table_id: u64) -> Result<(&str, &str), StreamError> {
        self.tables
            .get(&table_id)
            .map(|(schema, table)| (schema.as_str(), table.as_str()))
            .ok_or_else(|| {
                StreamError::ProtocolDecode(format!(
                    "Row-change frame references table id {table_id} with no preceding table-map frame on this connection"
                ))
            })
    }

    /// Turn the rows of one row-change frame into events, in frame order.
    pub(crate) fn decode_rows(
        &self,
        table_id: u64,
        rows: Vec<RowChange>,
        position: &StreamPosition,
    ) -> Result<Vec<DmlEvent>, StreamError> {
        let (schema, table) = self.resolve(table_id)?;
        rows.into_iter()
            .map(|row| {
                let kind = DmlKind::from_images(row.before.is_some(), row.after.is_some())
                    .ok_or_else(|| {
                        StreamError::ProtocolDecode(format!(
                            "Row change for {schema}.{table} at {position} carries neither a before nor an after image"
                        ))
                    })?;
                Ok(DmlEvent {
                    kind,
                    schema: schema.to_string(),
                    table: table.to_string(),
                    before: row.before.map(RowImage::new),
                    after: row.after.map(RowImage::new),
                    position: position.clone(),
                })
            })
            .collect()
    }
}
