//! The five-field ACID event envelope plus payload (spec §3, §6).

/// Number of fixed fields in the on-disk envelope, ahead of the payload
/// row: `operation, originalTxn, bucket, rowId, currentTxn` (spec §6).
/// `ReaderOptions::as_event_options` skips this many caller-supplied
/// column names/selections to name the wrapped payload's own columns.
pub const FIXED_FIELD_COUNT: usize = 5;

/// The operation an event records.
///
/// Stored on disk as `i32`: `0 = Insert`, `1 = Update`, `2 = Delete`
/// (spec §6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
	Insert,
	Update,
	Delete,
}

impl Operation {
	pub fn from_i32(v: i32) -> crate::error::Result<Operation> {
		match v {
			0 => Ok(Operation::Insert),
			1 => Ok(Operation::Update),
			2 => Ok(Operation::Delete),
			other => {
				log::error!("unknown event operation tag {other}");
				Err(crate::error::MergeError::InvariantViolation(format!(
					"unknown event operation tag {other}"
				)))
			}
		}
	}

	pub fn as_i32(self) -> i32 {
		match self {
			Operation::Insert => 0,
			Operation::Update => 1,
			Operation::Delete => 2,
		}
	}
}

/// A single ACID event: the fixed envelope fields plus an opaque payload
/// row. The merge engine never interprets `row`; it is whatever the
/// wrapped file format's user schema produces.
#[derive(Clone, Debug)]
pub struct Event<Row> {
	pub operation: Operation,
	pub original_txn: i64,
	pub bucket: i32,
	pub row_id: i64,
	pub current_txn: i64,
	pub row: Row,
}

impl<Row> Event<Row> {
	/// `true` if this event is a `DELETE` (spec §4.6 `is_delete`).
	pub fn is_delete(&self) -> bool {
		self.operation == Operation::Delete
	}
}
