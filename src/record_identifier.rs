//! The composite keys that induce the total order the merger streams in.
//!
//! Grounded on `key_reader.rs`'s `StringKeyRangeReader`, which also
//! carries a small, cheap-to-compare sort key alongside each record and
//! compares lexicographically field by field; here the fields are fixed
//! and the comparator additionally reverses two of them (see
//! [`ReaderKey`]).

use std::cmp::Ordering;

/// Identifies a logical row across its entire history: the transaction
/// that first inserted it, the bucket it lives in, and its row number
/// within that bucket.
///
/// Ordered lexicographically ascending on all three fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordIdentifier {
	pub original_txn_id: i64,
	pub bucket_property: i32,
	pub row_id: i64,
}

impl RecordIdentifier {
	pub fn new(original_txn_id: i64, bucket_property: i32, row_id: i64) -> Self {
		RecordIdentifier {
			original_txn_id,
			bucket_property,
			row_id,
		}
	}
}

/// Total order over every event source in a merge: a [`RecordIdentifier`]
/// plus the transaction and statement that produced this particular
/// event.
///
/// The sort is lexicographic ascending on `(original_txn_id,
/// bucket_property, row_id)`, then **descending** on `(current_txn_id,
/// statement_id)`: when several events touch the same logical row, the
/// most recent mutation sorts first, so a collapsing consumer only has to
/// keep the head of a run of equal rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ReaderKey {
	pub id: RecordIdentifier,
	pub current_txn_id: i64,
	pub statement_id: i32,
}

impl ReaderKey {
	pub fn new(
		original_txn_id: i64,
		bucket_property: i32,
		row_id: i64,
		current_txn_id: i64,
		statement_id: i32,
	) -> Self {
		ReaderKey {
			id: RecordIdentifier::new(original_txn_id, bucket_property, row_id),
			current_txn_id,
			statement_id,
		}
	}

	/// Overwrite every field in place; used by cursors that reuse a
	/// single `ReaderKey` across calls to `next`.
	pub fn set_all(
		&mut self,
		original_txn_id: i64,
		bucket_property: i32,
		row_id: i64,
		current_txn_id: i64,
		statement_id: i32,
	) {
		self.id.original_txn_id = original_txn_id;
		self.id.bucket_property = bucket_property;
		self.id.row_id = row_id;
		self.current_txn_id = current_txn_id;
		self.statement_id = statement_id;
	}

	/// Compare only the `RecordIdentifier` projection (the first three
	/// fields), ignoring which transaction/statement produced the event.
	/// This is the ordering [`crate::KeyInterval`] range checks use.
	pub fn compare_row(&self, other: &RecordIdentifier) -> Ordering {
		self.id.cmp(other)
	}

	/// `true` if `self` and `other` name the same row *and* the same
	/// transaction touched it. Multiple statements within one
	/// transaction mutating the same row collapse regardless of the
	/// merger's `collapse` option (spec §4.5 step 6).
	pub fn is_same_row(&self, other: &ReaderKey) -> bool {
		self.compare_row(&other.id) == Ordering::Equal && self.current_txn_id == other.current_txn_id
	}
}

impl PartialOrd for ReaderKey {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for ReaderKey {
	fn cmp(&self, other: &Self) -> Ordering {
		self.id
			.cmp(&other.id)
			.then_with(|| other.current_txn_id.cmp(&self.current_txn_id))
			.then_with(|| other.statement_id.cmp(&self.statement_id))
	}
}

/// Compares a `ReaderKey` against a bare `RecordIdentifier`: when the two
/// are equal on the `RecordIdentifier` projection, the `ReaderKey` ranks
/// lower (it sorts first), since a `RecordIdentifier` alone carries no
/// transaction/statement to break the tie in its favor.
impl PartialEq<RecordIdentifier> for ReaderKey {
	fn eq(&self, _other: &RecordIdentifier) -> bool {
		false
	}
}

impl PartialOrd<RecordIdentifier> for ReaderKey {
	fn partial_cmp(&self, other: &RecordIdentifier) -> Option<Ordering> {
		Some(match self.id.cmp(other) {
			Ordering::Equal => Ordering::Less,
			o => o,
		})
	}
}
