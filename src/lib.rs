//! Merge a table's base dataset and its time-ordered delta datasets into
//! one deterministically-ordered stream of ACID events for a single
//! bucket of a single split.
//!
//! The merge engine itself ([`Merger`]) depends only on the trait seams
//! in [`traits`] and [`original_cursor::OriginalFileOpener`] — it never
//! assumes a particular on-disk file format. [`flat_format`] ships one
//! concrete implementation of those seams (gated behind the
//! `flat-format` feature, on by default) so the engine can be exercised
//! end to end without a real columnar reader attached.

pub mod cursor;
pub mod dirlayout;
pub mod error;
pub mod event;
#[cfg(feature = "flat-format")]
pub mod flat_format;
pub mod key_bounds;
pub mod key_interval;
pub mod merger;
pub mod options;
pub mod original_cursor;
pub mod record_identifier;
pub mod traits;

pub use cursor::{AcidCursor, MergeCursor};
pub use error::{MergeError, Result};
pub use event::{Event, Operation, FIXED_FIELD_COUNT};
pub use key_interval::KeyInterval;
pub use merger::{CollapseEvents, Merger};
pub use options::{CompactionOptions, MergerOptions};
pub use original_cursor::{OriginalCursor, OriginalFileOpener};
pub use record_identifier::{ReaderKey, RecordIdentifier};
pub use traits::{
	AllTransactionsValid, EventFileReader, ExceptTransactions, RawRowFileReader, ReaderOptions,
	StripeInfo, ValidTxnList,
};
