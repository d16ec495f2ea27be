//! Error kinds surfaced by the merge engine (spec §7).

/// Something went wrong while merging a base and its deltas.
///
/// `EmptyStream` is deliberately not a variant here: running out of
/// records is not an error, it is [`crate::Merger::next_event`] returning
/// `Ok(None)`.
#[derive(thiserror::Error, Debug)]
pub enum MergeError {
	/// A read, open, or close of an underlying file failed. The cursor
	/// that produced this is poisoned and must not be reused.
	#[error("io error: {0}")]
	Io(#[from] std::io::Error),

	/// A precondition the merge engine relies on to stay correct was
	/// violated: an impossible `(offset, maxOffset, minKey, maxKey)`
	/// combination for a compaction split, or a bucket with no original
	/// files backing a split that claims it.
	#[error("invariant violation: {0}")]
	InvariantViolation(String),
}

pub type Result<T> = std::result::Result<T, MergeError>;
