//! Collaborator seams spec.md §1 declares out of scope: the columnar file
//! reader, the directory-layout utilities, and the transaction snapshot
//! oracle. These are traits, not stubs — [`crate::flat_format`] ships one
//! concrete implementation of each so the merge engine can be exercised
//! end to end.
//!
//! Grounded on the boundary the teacher draws between its own on-disk
//! format (`segment_reader.rs`/`segment.rs`) and the generic merge logic
//! in `merge.rs`/`key_reader.rs`: the reader owns stripe/segment layout
//! and lookahead, the merge logic only ever asks it for "the next row".

use crate::error::Result;
use crate::event::Event;
use crate::record_identifier::RecordIdentifier;

/// One stripe's worth of layout metadata, as surfaced by the columnar
/// file reader (spec §4.2).
#[derive(Clone, Copy, Debug)]
pub struct StripeInfo {
	/// Byte offset this stripe starts at within the file.
	pub offset: u64,
	/// Number of rows in this stripe.
	pub num_rows: u64,
}

/// Column selection, predicate pushdown, and the byte range a split reads
/// (spec §4.6 `readerOptions`).
#[derive(Clone, Debug, Default)]
pub struct ReaderOptions {
	pub offset: u64,
	/// `None` means "to EOF" (spec §4.5 step 2: delta reads always
	/// extend the upper bound to unlimited).
	pub max_offset: Option<u64>,
	pub include: Vec<bool>,
	pub column_names: Vec<String>,
	/// Opaque predicate-pushdown expression; the merge engine forwards
	/// it and never inspects or evaluates it. `None` disables pushdown.
	pub search_argument: Option<String>,
}

impl ReaderOptions {
	/// Extend the upper bound to unlimited and shift `column_names` down
	/// by `skip` columns, naming the payload row's columns instead of
	/// the envelope's own fixed fields (spec §4.5 step 2).
	pub fn as_event_options(&self, skip: usize) -> ReaderOptions {
		ReaderOptions {
			offset: self.offset,
			max_offset: None,
			include: self.include.iter().skip(skip).copied().collect(),
			column_names: self.column_names.iter().skip(skip).cloned().collect(),
			search_argument: self.search_argument.clone(),
		}
	}

	/// Drop predicate pushdown. Applying a predicate meant for live rows
	/// against a delta that also carries tombstones can wrongly drop the
	/// latest live version of a row, or fault against an index built for
	/// a different row shape (spec §4.5 step 4).
	pub fn without_pushdown(&self) -> ReaderOptions {
		ReaderOptions {
			search_argument: None,
			..self.clone()
		}
	}
}

/// Row-numbered sequential reads of an ACID file's event envelopes, with
/// a per-stripe key index (spec §4.2 ACID variant, §6 event envelope).
pub trait EventFileReader<Row> {
	/// The stripes in file order, with the last `RecordIdentifier`
	/// written in each stripe, as stored in the file's key index.
	fn stripes(&self) -> &[StripeInfo];
	fn stripe_last_keys(&self) -> &[RecordIdentifier];

	/// Read the next event envelope, or `None` at EOF / the configured
	/// byte range's end. `scratch` may be reused to avoid allocating.
	fn next_event(&mut self, scratch: Option<Event<Row>>) -> Result<Option<Event<Row>>>;

	fn close(&mut self) -> Result<()>;
}

/// Row-numbered sequential reads of a pre-ACID "original" file's raw
/// payload rows, with per-stripe row counts (spec §4.2 original variant,
/// §4.4).
pub trait RawRowFileReader<Row> {
	fn stripes(&self) -> &[StripeInfo];

	/// The file-local row number (0-based) of the most recently-read
	/// row, valid only after a successful `next_row`.
	fn last_row_number(&self) -> u64;

	fn total_rows(&self) -> u64;

	fn next_row(&mut self) -> Result<Option<Row>>;

	fn close(&mut self) -> Result<()>;
}

/// The transaction snapshot oracle: which transactions are visible to
/// the current read (spec §6).
pub trait ValidTxnList {
	fn is_valid(&self, txn_id: i64) -> bool;
}

/// A `ValidTxnList` that considers every transaction valid; useful for
/// tests and for compactions that read everything ever written.
pub struct AllTransactionsValid;

impl ValidTxnList for AllTransactionsValid {
	fn is_valid(&self, _txn_id: i64) -> bool {
		true
	}
}

/// A `ValidTxnList` backed by an explicit exclusion set, mirroring a
/// snapshot's aborted/open transaction list.
pub struct ExceptTransactions {
	pub invalid: std::collections::HashSet<i64>,
}

impl ValidTxnList for ExceptTransactions {
	fn is_valid(&self, txn_id: i64) -> bool {
		!self.invalid.contains(&txn_id)
	}
}
