//! Derive a split's `(minKey, maxKey]` window from stripe layout (spec
//! §4.2). Two variants: native ACID files carry a key index; pre-ACID
//! "original" files don't, so their bounds are synthesized from
//! cumulative row counts.

use crate::key_interval::KeyInterval;
use crate::record_identifier::RecordIdentifier;
use crate::traits::StripeInfo;

/// Walk `stripes` in file order and count:
/// - `first_stripe`: stripes whose start offset is before `offset`,
/// - `stripe_count`: stripes whose start offset falls in `[offset,
///   max_offset)`.
///
/// Returns `(first_stripe, stripe_count, is_tail)`, where `is_tail` is
/// true when no stripe remains after the ones counted (the split
/// extends to EOF).
fn locate_stripes(stripes: &[StripeInfo], offset: u64, max_offset: u64) -> (usize, usize, bool) {
	let first_stripe = stripes.iter().take_while(|s| s.offset < offset).count();
	let stripe_count = stripes[first_stripe..]
		.iter()
		.take_while(|s| s.offset >= offset && s.offset < max_offset)
		.count();
	let is_tail = first_stripe + stripe_count >= stripes.len();
	(first_stripe, stripe_count, is_tail)
}

/// The ACID variant: reads the per-file key index (one `RecordIdentifier`
/// per stripe, the last key written in that stripe).
pub fn discover_acid_key_bounds(
	stripes: &[StripeInfo],
	stripe_last_keys: &[RecordIdentifier],
	offset: u64,
	max_offset: u64,
) -> KeyInterval {
	let (first_stripe, stripe_count, is_tail) = locate_stripes(stripes, offset, max_offset);

	let min_key = if first_stripe > 0 {
		Some(stripe_last_keys[first_stripe - 1])
	} else {
		None
	};
	let max_key = if !is_tail {
		Some(stripe_last_keys[first_stripe + stripe_count - 1])
	} else {
		None
	};
	KeyInterval::new(min_key, max_key)
}

/// The original-file variant: no key index exists, so keys are
/// synthesized from cumulative row counts as `(0, bucket, rowOffset-1)`
/// and `(0, bucket, rowOffset+rowLength-1)`.
///
/// Known limitation carried from spec §9: if both `offset` and
/// `max_offset` land inside a single stripe, `stripe_count` is 0,
/// `rowLength` stays 0, and the computed `maxKey` equals `minKey` —
/// an empty window. Callers (in particular `OriginalCursor`) must
/// tolerate that rather than treat it as an error.
pub fn discover_original_key_bounds(
	stripes: &[StripeInfo],
	bucket: i32,
	offset: u64,
	max_offset: u64,
) -> KeyInterval {
	let (first_stripe, stripe_count, is_tail) = locate_stripes(stripes, offset, max_offset);

	let row_offset: u64 = stripes[..first_stripe].iter().map(|s| s.num_rows).sum();
	let row_length: u64 = stripes[first_stripe..first_stripe + stripe_count]
		.iter()
		.map(|s| s.num_rows)
		.sum();

	let min_key = if first_stripe > 0 {
		Some(RecordIdentifier::new(0, bucket, row_offset as i64 - 1))
	} else {
		None
	};
	let max_key = if !is_tail {
		Some(RecordIdentifier::new(
			0,
			bucket,
			(row_offset + row_length) as i64 - 1,
		))
	} else {
		None
	};
	KeyInterval::new(min_key, max_key)
}
