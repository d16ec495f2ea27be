//! One-record-lookahead over a single file, clipped to `(minKey, maxKey]`
//! (spec §4.3).
//!
//! Two kinds share this contract: [`AcidCursor`] over native ACID files
//! and [`crate::original_cursor::OriginalCursor`] over pre-ACID files.
//! Per spec §9's re-architecture note, construction never reads; a
//! separate `advance_to_min_key` call performs the first read, so no
//! subtype dispatch is needed during construction (the cyclic
//! initialization the source material describes doesn't arise here).

use crate::error::Result;
use crate::event::Event;
use crate::record_identifier::{ReaderKey, RecordIdentifier};
use crate::traits::EventFileReader;
use std::cmp::Ordering;

/// The shared contract every cursor kind in a merge implements.
///
/// A cursor is forward-only and single-pass. Closing is idempotent and
/// happens on exhaustion, on crossing `max_key`, or when the merger
/// closes it explicitly.
pub trait MergeCursor<Row> {
	/// Must be called exactly once before first use. Repeatedly reads
	/// while the head's row projection is `<= min_key`; afterwards
	/// `has_head` is either `false` or the head is the first record
	/// strictly greater than `min_key`.
	fn advance_to_min_key(&mut self) -> Result<()>;

	/// Read the next record, clipping to `max_key` and updating
	/// `head_key`. `scratch` is an optional buffer to reuse.
	fn next(&mut self, scratch: Option<Event<Row>>) -> Result<()>;

	/// Take the current head record, leaving nothing behind (the
	/// merger rotates this into its own recycled buffer).
	fn take_head(&mut self) -> Option<Event<Row>>;

	fn head_key(&self) -> ReaderKey;

	fn has_head(&self) -> bool;

	fn min_key(&self) -> Option<RecordIdentifier>;
	fn max_key(&self) -> Option<RecordIdentifier>;
	fn bucket(&self) -> i32;
	fn statement_id(&self) -> i32;

	fn close(&mut self) -> Result<()>;
}

/// A cursor over a native ACID file (base or delta).
pub struct AcidCursor<Row> {
	reader: Option<Box<dyn EventFileReader<Row>>>,
	head: Option<Event<Row>>,
	head_key: ReaderKey,
	min_key: Option<RecordIdentifier>,
	max_key: Option<RecordIdentifier>,
	bucket: i32,
	statement_id: i32,
}

impl<Row> AcidCursor<Row> {
	pub fn new(
		reader: Box<dyn EventFileReader<Row>>,
		min_key: Option<RecordIdentifier>,
		max_key: Option<RecordIdentifier>,
		bucket: i32,
		statement_id: i32,
	) -> Self {
		AcidCursor {
			reader: Some(reader),
			head: None,
			head_key: ReaderKey::new(0, 0, 0, 0, 0),
			min_key,
			max_key,
			bucket,
			statement_id,
		}
	}
}

impl<Row> MergeCursor<Row> for AcidCursor<Row> {
	fn advance_to_min_key(&mut self) -> Result<()> {
		self.next(None)?;
		if let Some(min_key) = self.min_key {
			while self.head.is_some() && self.head_key.compare_row(&min_key) != Ordering::Greater {
				let scratch = self.head.take();
				self.next(scratch)?;
			}
		}
		Ok(())
	}

	fn next(&mut self, scratch: Option<Event<Row>>) -> Result<()> {
		let Some(reader) = self.reader.as_mut() else {
			self.head = None;
			return Ok(());
		};

		match reader.next_event(scratch)? {
			None => {
				log::debug!(
					"cursor exhausted (bucket {}, statement {})",
					self.bucket,
					self.statement_id
				);
				self.head = None;
				self.close()?;
			}
			Some(event) => {
				self.head_key.set_all(
					event.original_txn,
					event.bucket,
					event.row_id,
					event.current_txn,
					self.statement_id,
				);
				if let Some(max_key) = self.max_key {
					if self.head_key.compare_row(&max_key) == Ordering::Greater {
						log::debug!(
							"cursor (bucket {}, statement {}) crossed max_key, closing",
							self.bucket,
							self.statement_id
						);
						self.head = None;
						self.close()?;
						return Ok(());
					}
				}
				self.head = Some(event);
			}
		}
		Ok(())
	}

	fn take_head(&mut self) -> Option<Event<Row>> {
		self.head.take()
	}

	fn head_key(&self) -> ReaderKey {
		self.head_key
	}

	fn has_head(&self) -> bool {
		self.head.is_some()
	}

	fn min_key(&self) -> Option<RecordIdentifier> {
		self.min_key
	}

	fn max_key(&self) -> Option<RecordIdentifier> {
		self.max_key
	}

	fn bucket(&self) -> i32 {
		self.bucket
	}

	fn statement_id(&self) -> i32 {
		self.statement_id
	}

	fn close(&mut self) -> Result<()> {
		if let Some(mut reader) = self.reader.take() {
			reader.close()?;
		}
		Ok(())
	}
}
