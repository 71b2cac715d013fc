//! Row-change events delivered to listeners.

use mysql_async::binlog::value::BinlogValue;
use mysql_async::Value;

use crate::position::StreamPosition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DmlKind {
    Insert,
    Update,
    Delete,
}

impl DmlKind {
    /// Classify a row change by which images it carries.
    pub fn from_images(has_before: bool, has_after: bool) -> Option<Self> {
        match (has_before, has_after) {
            (false, true) => Some(DmlKind::Insert),
            (true, true) => Some(DmlKind::Update),
            (true, false) => Some(DmlKind::Delete),
            (false, false) => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DmlKind::Insert => "insert",
            DmlKind::Update => "update",
            DmlKind::Delete => "delete",
        }
    }
}

/// Column values of one row image, in table column order.
#[derive(Debug, Clone)]
pub struct RowImage(Vec<BinlogValue<'static>>);

impl RowImage {
    pub fn new(values: Vec<BinlogValue<'static>>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[BinlogValue<'static>] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Plain value of column `index`. `None` for out-of-range indexes and for
    /// JSON partial-update columns, which have no plain value.
    pub fn value(&self, index: usize) -> Option<&Value> {
        match self.0.get(index)? {
            BinlogValue::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_values(self) -> Vec<BinlogValue<'static>> {
        self.0
    }
}

/// One decoded row change for a specific table.
///
/// Every listener receives its own copy.
#[derive(Debug, Clone)]
pub struct DmlEvent {
    pub kind: DmlKind,
    pub schema: String,
    pub table: String,
    /// Present for updates and deletes.
    pub before: Option<RowImage>,
    /// Present for inserts and updates.
    pub after: Option<RowImage>,
    /// End of the frame that carried this row change.
    pub position: StreamPosition,
}

impl DmlEvent {
    /// The image describing the row as it exists after the change, or the
    /// deleted row for deletes.
    pub fn row(&self) -> Option<&RowImage> {
        self.after.as_ref().or(self.before.as_ref())
    }
}
