//! The multi-way merge over a set of cursors (spec §4.5).
//!
//! Grounded on `merge.rs`'s `Merge<Source, Record>`: that merger also
//! keeps one entry per source keyed by its current head and repeatedly
//! extracts the minimum, but does so with a `BinaryHeap` wrapped in a
//! reversed `Ord` so the heap's max becomes the logical min. Spec §9
//! explicitly prefers an ordered map here ("the source uses an ordered
//! tree because it also occasionally inspects the least key without
//! popping"), so this merger uses a `BTreeMap<ReaderKey, Cursor>`
//! instead — `ReaderKey`'s own `Ord` already orders ascending the way we
//! want, so no reversal wrapper is needed the way `merge.rs`'s heap
//! needs one.
//!
//! Buffer aliasing (spec §5, §9): the source material rotates a single
//! payload buffer between the merger and the consumer via field
//! aliasing. In an owning language that is unsound without unsafe
//! tricks, so per spec §9's own suggested fallback this merger takes
//! the safe default instead: `next_event` returns an owned `Event<Row>`
//! and lets the allocator reuse the memory. Cursors still accept a
//! `scratch` buffer on `next()` so a cursor implementation is free to
//! reuse it internally if its `Row` type supports that.

use crate::cursor::MergeCursor;
use crate::dirlayout::DeltaStats;
use crate::error::Result;
use crate::event::Event;
use crate::record_identifier::{ReaderKey, RecordIdentifier};
use crate::traits::ValidTxnList;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Whether same-row events collapse to just the newest one (spec §4.5,
/// §8 "Collapse law").
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CollapseEvents(pub bool);

type CursorBox<Row> = Box<dyn MergeCursor<Row>>;

/// A sentinel strictly less than any real `ReaderKey` (its
/// `RecordIdentifier` fields are all `MIN`), so the very first event of
/// a stream is never mistaken for a collapse continuation of a previous
/// one that never existed.
fn sentinel_prev_key() -> ReaderKey {
	ReaderKey::new(i64::MIN, i32::MIN, i64::MIN, i64::MAX, i32::MAX)
}

/// Merges a base cursor and zero or more delta cursors into one
/// `ReaderKey`-ordered stream, filtering out events from invalid
/// transactions and optionally collapsing same-row events down to the
/// newest.
pub struct Merger<Row> {
	readers: BTreeMap<ReaderKey, CursorBox<Row>>,
	primary: Option<CursorBox<Row>>,
	secondary_key: Option<ReaderKey>,
	prev_key: ReaderKey,
	collapse: bool,
	valid_txn_list: Box<dyn ValidTxnList>,
	min_key: Option<RecordIdentifier>,
	max_key: Option<RecordIdentifier>,
	has_base: bool,
	columns: i32,
}

impl<Row> Merger<Row> {
	/// Build a merger from an already-primed base cursor (if any) and
	/// already-primed delta cursors. "Primed" means `advance_to_min_key`
	/// has already been called on each — the merger's own constructor
	/// never reads, it only registers non-empty heads (spec §4.5 steps
	/// 3-5).
	///
	/// `columns` is the width of the derived envelope/event schema (spec
	/// §4.5 step 1), as the caller computed it from configuration; it is
	/// forced to `0` if no cursor ends up with a head at all (spec §4.5
	/// step 5: "If no cursors exist, primary = None and columns = 0").
	pub fn new(
		base: Option<CursorBox<Row>>,
		deltas: Vec<CursorBox<Row>>,
		collapse: CollapseEvents,
		valid_txn_list: Box<dyn ValidTxnList>,
		columns: i32,
	) -> Self {
		let mut readers: BTreeMap<ReaderKey, CursorBox<Row>> = BTreeMap::new();

		let (min_key, max_key) = match &base {
			Some(c) => (c.min_key(), c.max_key()),
			None => (None, None),
		};
		let has_base = base.is_some();

		if let Some(mut c) = base {
			if c.has_head() {
				readers.insert(c.head_key(), c);
			} else {
				let _ = c.close();
			}
		}
		for mut c in deltas {
			if c.has_head() {
				readers.insert(c.head_key(), c);
			} else {
				let _ = c.close();
			}
		}

		let mut merger = Merger {
			readers,
			primary: None,
			secondary_key: None,
			prev_key: sentinel_prev_key(),
			collapse: collapse.0,
			valid_txn_list,
			min_key,
			max_key,
			has_base,
			columns,
		};
		merger.pop_primary();
		if merger.primary.is_none() {
			merger.columns = 0;
		}
		merger
	}

	/// Log whether predicate pushdown had to be stripped for a delta
	/// carrying deletes or updates (spec §4.5 step 4), before the
	/// driver constructs that delta's cursor.
	pub fn log_delta_pushdown_decision(delta_path: &std::path::Path, stats: DeltaStats) {
		if stats.has_deletes_or_updates() {
			log::debug!(
				"delta {delta_path:?} carries {} updates / {} deletes, stripping predicate pushdown",
				stats.updates,
				stats.deletes
			);
		}
	}

	fn pop_primary(&mut self) {
		let least = self.readers.keys().next().copied();
		self.primary = least.and_then(|k| self.readers.remove(&k));
		self.secondary_key = self.readers.keys().next().copied();
	}

	/// The overall stream's key bounds, taken from the base cursor after
	/// any original-mode shifting (spec §4.5 step 3).
	pub fn bounds(&self) -> (Option<RecordIdentifier>, Option<RecordIdentifier>) {
		(self.min_key, self.max_key)
	}

	/// Pull the next merged event, or `Ok(None)` at end of stream.
	///
	/// Filters out events whose transaction is not valid, and — when
	/// `collapse` is set, or always for same-transaction multi-statement
	/// duplicates — suppresses every event but the first (newest) one
	/// for a given row (spec §4.5 step 6-9, §8).
	pub fn next_event(&mut self) -> Result<Option<(ReaderKey, Event<Row>)>> {
		loop {
			let Some(primary) = self.primary.as_mut() else {
				return Ok(None);
			};
			if !primary.has_head() {
				return Ok(None);
			}

			let out_key = primary.head_key();
			let current = primary.take_head().expect("has_head checked above");

			primary.next(None)?;

			let primary_dominated = match self.secondary_key {
				Some(sk) => !primary.has_head() || primary.head_key() > sk,
				None => false,
			};
			if primary_dominated {
				let mut c = self.primary.take().expect("primary checked present above");
				if c.has_head() {
					let key = c.head_key();
					self.readers.insert(key, c);
				} else {
					let _ = c.close();
				}
				self.pop_primary();
			}

			if !self.valid_txn_list.is_valid(out_key.current_txn_id) {
				continue;
			}

			let is_same_row = self.prev_key.is_same_row(&out_key);
			let keys_same = (self.collapse || is_same_row)
				&& ((self.collapse && self.prev_key.compare_row(&out_key.id) == Ordering::Equal)
					|| is_same_row);

			if !keys_same {
				self.prev_key = out_key;
			}

			if keys_same {
				continue;
			}
			return Ok(Some((out_key, current)));
		}
	}

	/// `true` once every cursor is exhausted (used by `get_progress`'s
	/// "no base" fallback and by drivers that want a cheap is-done
	/// check without consuming another record).
	pub fn is_exhausted(&self) -> bool {
		self.primary.is_none() || !self.primary.as_ref().unwrap().has_head()
	}

	/// The derived envelope/event schema's column count, `0` if this
	/// merge has no cursors at all (spec §4.6 `get_columns`, §4.5 step 5).
	pub fn get_columns(&self) -> i32 {
		self.columns
	}

	/// A fresh, unset key, for callers using the `next(key, value)` record-
	/// reader-style protocol (spec §4.6 `create_key`) instead of
	/// [`Merger::next_event`].
	pub fn create_key(&self) -> ReaderKey {
		ReaderKey::new(0, 0, 0, 0, 0)
	}

	/// `next_event`, adapted to the record-reader protocol's `next(key,
	/// value) -> bool` shape (spec §4.6, §6): overwrites `key`/`value` in
	/// place and returns whether an event was produced.
	pub fn next(&mut self, key: &mut ReaderKey, value: &mut Event<Row>) -> Result<bool> {
		match self.next_event()? {
			Some((k, v)) => {
				*key = k;
				*value = v;
				Ok(true)
			}
			None => Ok(false),
		}
	}

	/// A coarse completion fraction. `base_progress` is whatever the base
	/// reader itself reports (delta consumption is never reflected, spec
	/// §4.6, §9); when this merge has no base cursor at all, progress is
	/// always complete.
	pub fn get_progress(&self, base_progress: Option<f32>) -> f32 {
		if self.has_base {
			crate::options::get_progress(base_progress)
		} else {
			1.0
		}
	}

	/// A coarse byte-position estimate: `offset + progress * length`.
	pub fn get_pos(&self, offset: u64, length: u64, progress: f32) -> u64 {
		crate::options::get_pos(offset, length, progress)
	}

	/// Close the primary cursor and every registered (non-primary)
	/// cursor. Idempotent: a second call finds nothing left to close.
	pub fn close(&mut self) -> Result<()> {
		if let Some(mut c) = self.primary.take() {
			c.close()?;
		}
		for (_, mut c) in std::mem::take(&mut self.readers) {
			c.close()?;
		}
		Ok(())
	}
}

impl<Row: Default> Merger<Row> {
	/// A fresh, blank event, for callers using the `next(key, value)`
	/// record-reader-style protocol (spec §4.6 `create_value`). Bounded
	/// on `Row: Default` since [`Merger`] itself never needs to fabricate
	/// a payload row — only a caller wanting a reusable buffer does.
	pub fn create_value(&self) -> Event<Row> {
		Event {
			operation: crate::event::Operation::Insert,
			original_txn: 0,
			bucket: 0,
			row_id: 0,
			current_txn: 0,
			row: Row::default(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::event::Operation;
	use crate::traits::AllTransactionsValid;

	/// An in-memory cursor over a fixed `Vec<(ReaderKey, Event<i32>)>`,
	/// used to exercise `Merger` without a real file format.
	struct VecCursor {
		events: std::vec::IntoIter<(ReaderKey, Event<i32>)>,
		head: Option<(ReaderKey, Event<i32>)>,
		statement_id: i32,
		bucket: i32,
	}

	impl VecCursor {
		fn new(bucket: i32, statement_id: i32, mut events: Vec<(ReaderKey, Event<i32>)>) -> Self {
			events.sort_by_key(|(k, _)| *k);
			let mut c = VecCursor {
				events: events.into_iter(),
				head: None,
				statement_id,
				bucket,
			};
			c.advance();
			c
		}
		fn advance(&mut self) {
			self.head = self.events.next();
		}
	}

	impl MergeCursor<i32> for VecCursor {
		fn advance_to_min_key(&mut self) -> Result<()> {
			Ok(())
		}
		fn next(&mut self, _scratch: Option<Event<i32>>) -> Result<()> {
			self.advance();
			Ok(())
		}
		fn take_head(&mut self) -> Option<Event<i32>> {
			self.head.take().map(|(_, e)| e)
		}
		fn head_key(&self) -> ReaderKey {
			self.head.as_ref().unwrap().0
		}
		fn has_head(&self) -> bool {
			self.head.is_some()
		}
		fn min_key(&self) -> Option<RecordIdentifier> {
			None
		}
		fn max_key(&self) -> Option<RecordIdentifier> {
			None
		}
		fn bucket(&self) -> i32 {
			self.bucket
		}
		fn statement_id(&self) -> i32 {
			self.statement_id
		}
		fn close(&mut self) -> Result<()> {
			Ok(())
		}
	}

	fn insert(key: ReaderKey, row: i32) -> (ReaderKey, Event<i32>) {
		(
			key,
			Event {
				operation: Operation::Insert,
				original_txn: key.id.original_txn_id,
				bucket: key.id.bucket_property,
				row_id: key.id.row_id,
				current_txn: key.current_txn_id,
				row,
			},
		)
	}

	fn update(key: ReaderKey, row: i32) -> (ReaderKey, Event<i32>) {
		let mut e = insert(key, row);
		e.1.operation = Operation::Update;
		e
	}

	fn drain<Row>(m: &mut Merger<Row>) -> Vec<(ReaderKey, Event<Row>)> {
		let mut out = Vec::new();
		while let Some(ev) = m.next_event().unwrap() {
			out.push(ev);
		}
		out
	}

	#[test]
	fn base_only_passes_through_in_order() {
		let base = VecCursor::new(
			0,
			0,
			vec![
				insert(ReaderKey::new(5, 0, 0, 5, 0), 1),
				insert(ReaderKey::new(5, 0, 1, 5, 0), 2),
				insert(ReaderKey::new(5, 0, 2, 5, 0), 3),
			],
		);
		let mut merger = Merger::new(
			Some(Box::new(base)),
			vec![],
			CollapseEvents(false),
			Box::new(AllTransactionsValid),
			1,
		);
		assert_eq!(merger.get_columns(), 1);
		let out = drain(&mut merger);
		let keys: Vec<_> = out.iter().map(|(k, _)| *k).collect();
		assert_eq!(
			keys,
			vec![
				ReaderKey::new(5, 0, 0, 5, 0),
				ReaderKey::new(5, 0, 1, 5, 0),
				ReaderKey::new(5, 0, 2, 5, 0),
			]
		);
	}

	#[test]
	fn collapse_prefers_newest_update() {
		let base = VecCursor::new(0, 0, vec![insert(ReaderKey::new(5, 0, 0, 5, 0), 1)]);
		let delta = VecCursor::new(0, 0, vec![update(ReaderKey::new(5, 0, 0, 7, 0), 2)]);
		let mut merger = Merger::new(
			Some(Box::new(base)),
			vec![Box::new(delta)],
			CollapseEvents(true),
			Box::new(AllTransactionsValid),
			1,
		);
		let out = drain(&mut merger);
		assert_eq!(out.len(), 1);
		assert_eq!(out[0].0, ReaderKey::new(5, 0, 0, 7, 0));
		assert_eq!(out[0].1.row, 2);
		assert_eq!(out[0].1.operation, Operation::Update);
	}

	struct ExceptOne(i64);
	impl ValidTxnList for ExceptOne {
		fn is_valid(&self, txn_id: i64) -> bool {
			txn_id != self.0
		}
	}

	#[test]
	fn invalid_transaction_is_filtered_without_unsuppressing_base() {
		let base = VecCursor::new(0, 0, vec![insert(ReaderKey::new(5, 0, 0, 5, 0), 1)]);
		let delta = VecCursor::new(0, 0, vec![update(ReaderKey::new(5, 0, 0, 8, 0), 2)]);
		let mut merger = Merger::new(
			Some(Box::new(base)),
			vec![Box::new(delta)],
			CollapseEvents(true),
			Box::new(ExceptOne(8)),
			1,
		);
		let out = drain(&mut merger);
		assert_eq!(out.len(), 1);
		assert_eq!(out[0].0, ReaderKey::new(5, 0, 0, 5, 0));
		assert_eq!(out[0].1.row, 1);
	}

	#[test]
	fn same_transaction_multi_statement_always_collapses() {
		let delta = VecCursor::new(
			0,
			0,
			vec![
				insert(ReaderKey::new(0, 0, 0, 9, 0), 1),
				update(ReaderKey::new(0, 0, 0, 9, 1), 2),
			],
		);
		let mut merger = Merger::new(
			None,
			vec![Box::new(delta)],
			CollapseEvents(false),
			Box::new(AllTransactionsValid),
			1,
		);
		let out = drain(&mut merger);
		assert_eq!(out.len(), 1);
		assert_eq!(out[0].0, ReaderKey::new(0, 0, 0, 9, 1));
		assert_eq!(out[0].1.row, 2);
	}

	#[test]
	fn columns_is_zero_with_no_cursors() {
		let merger: Merger<i32> = Merger::new(
			None,
			vec![],
			CollapseEvents(false),
			Box::new(AllTransactionsValid),
			7,
		);
		assert_eq!(merger.get_columns(), 0);
		assert!(merger.is_exhausted());
	}

	#[test]
	fn next_protocol_matches_next_event() {
		let base = VecCursor::new(
			0,
			0,
			vec![
				insert(ReaderKey::new(5, 0, 0, 5, 0), 1),
				insert(ReaderKey::new(5, 0, 1, 5, 0), 2),
			],
		);
		let mut merger = Merger::new(
			Some(Box::new(base)),
			vec![],
			CollapseEvents(false),
			Box::new(AllTransactionsValid),
			1,
		);

		let mut key = merger.create_key();
		let mut value = merger.create_value();

		assert!(merger.next(&mut key, &mut value).unwrap());
		assert_eq!(key, ReaderKey::new(5, 0, 0, 5, 0));
		assert_eq!(value.row, 1);

		assert!(merger.next(&mut key, &mut value).unwrap());
		assert_eq!(key, ReaderKey::new(5, 0, 1, 5, 0));
		assert_eq!(value.row, 2);

		assert!(!merger.next(&mut key, &mut value).unwrap());
	}
}
