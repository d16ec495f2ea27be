//! Presents a pre-ACID "original" file (or, in compaction, the whole
//! logical bucket's concatenation of them) as a stream of synthesized
//! `INSERT` events with a bucket-global `rowId` (spec §4.4).
//!
//! Grounded on `database_reader.rs::new_opts`'s pattern of opening a
//! sorted list of files one at a time and tracking a running offset
//! across them (there: transaction files and their zero-length check;
//! here: original files and their row counts).

use crate::cursor::MergeCursor;
use crate::error::{MergeError, Result};
use crate::event::{Event, Operation};
use crate::record_identifier::{ReaderKey, RecordIdentifier};
use crate::traits::RawRowFileReader;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// Opens a physical original file for reading, given its path.
pub trait OriginalFileOpener<Row> {
	fn open(&self, path: &Path) -> Result<Box<dyn RawRowFileReader<Row>>>;
}

enum Mode {
	/// The entire logical bucket is processed in one split: every
	/// remaining physical file is opened in turn as the current one is
	/// exhausted.
	Compaction {
		remaining_files: std::vec::IntoIter<PathBuf>,
	},
	/// A byte-range of exactly one physical file.
	Split,
}

/// A cursor over pre-ACID original files, synthesizing ACID envelopes
/// around their raw rows.
pub struct OriginalCursor<Row> {
	opener: Box<dyn OriginalFileOpener<Row>>,
	mode: Mode,
	reader: Option<Box<dyn RawRowFileReader<Row>>>,
	bucket: i32,
	row_id_offset: i64,
	min_key: Option<RecordIdentifier>,
	max_key: Option<RecordIdentifier>,
	head: Option<Event<Row>>,
	head_key: ReaderKey,
}

impl<Row> OriginalCursor<Row> {
	/// Construction for a compaction split: every original file
	/// belonging to `bucket`, concatenated, starting at row 0.
	pub fn new_compaction(
		opener: Box<dyn OriginalFileOpener<Row>>,
		original_files_in_order: Vec<PathBuf>,
		bucket: i32,
	) -> Result<Self> {
		if original_files_in_order.is_empty() {
			log::error!("bucket {bucket} has no original files but a compaction split claims it");
			return Err(MergeError::InvariantViolation(format!(
				"bucket {bucket} has no original files but a compaction split claims it"
			)));
		}
		let mut remaining = original_files_in_order.into_iter();
		let first = remaining.next().expect("checked non-empty above");
		let reader = Some(opener.open(&first)?);
		Ok(OriginalCursor {
			opener,
			mode: Mode::Compaction {
				remaining_files: remaining,
			},
			reader,
			bucket,
			row_id_offset: 0,
			min_key: None,
			max_key: None,
			head: None,
			head_key: ReaderKey::new(0, 0, 0, 0, 0),
		})
	}

	/// Construction for a split of a single physical file identified by
	/// `bucket_path`, the `copy_index`'th physical file of the logical
	/// bucket. `all_files_in_order` is every physical file of the
	/// bucket, used to compute `row_id_offset` and whether `bucket_path`
	/// is the bucket's last physical file.
	///
	/// `caller_min_key`/`caller_max_key` are whatever bounds
	/// [`crate::key_bounds::discover_original_key_bounds`] already
	/// produced for this split's byte range *within its own file*; they
	/// get shifted by `row_id_offset` here (spec §4.4 split mode).
	pub fn new_split(
		opener: Box<dyn OriginalFileOpener<Row>>,
		all_files_in_order: &[PathBuf],
		bucket_path: &Path,
		bucket: i32,
		caller_min_key: Option<RecordIdentifier>,
		caller_max_key: Option<RecordIdentifier>,
	) -> Result<Self> {
		let mut row_id_offset: i64 = 0;
		let mut found_index = None;
		for (i, f) in all_files_in_order.iter().enumerate() {
			if f == bucket_path {
				found_index = Some(i);
				break;
			}
			let mut r = opener.open(f)?;
			// drain just to learn the row count without keeping the reader open
			let rows = r.total_rows();
			r.close()?;
			row_id_offset += rows as i64;
		}
		let found_index = found_index.ok_or_else(|| {
			log::error!("split file {bucket_path:?} is not among bucket {bucket}'s original files");
			MergeError::InvariantViolation(format!(
				"split file {bucket_path:?} is not among bucket {bucket}'s original files"
			))
		})?;
		let is_last_file_for_bucket = found_index + 1 == all_files_in_order.len();

		let reader = opener.open(bucket_path)?;
		let rows_in_this_file = reader.total_rows();

		let min_key = if row_id_offset > 0 {
			Some(match caller_min_key {
				Some(m) => shift_row_id(m, row_id_offset),
				None => RecordIdentifier::new(0, bucket, row_id_offset - 1),
			})
		} else {
			caller_min_key
		};

		let max_key = match caller_max_key {
			Some(m) => Some(shift_row_id(m, row_id_offset)),
			None if !is_last_file_for_bucket => Some(RecordIdentifier::new(
				0,
				bucket,
				row_id_offset + rows_in_this_file as i64 - 1,
			)),
			None => None,
		};

		Ok(OriginalCursor {
			opener,
			mode: Mode::Split,
			reader: Some(reader),
			bucket,
			row_id_offset,
			min_key,
			max_key,
			head: None,
			head_key: ReaderKey::new(0, 0, 0, 0, 0),
		})
	}
}

fn shift_row_id(id: RecordIdentifier, by: i64) -> RecordIdentifier {
	RecordIdentifier::new(id.original_txn_id, id.bucket_property, id.row_id + by)
}

impl<Row> MergeCursor<Row> for OriginalCursor<Row> {
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
		loop {
			let Some(reader) = self.reader.as_mut() else {
				self.head = None;
				return Ok(());
			};

			match reader.next_row()? {
				Some(row) => {
					let row_id = self.row_id_offset + reader.last_row_number() as i64;
					let event = match scratch {
						Some(mut ev) => {
							ev.operation = Operation::Insert;
							ev.original_txn = 0;
							ev.bucket = self.bucket;
							ev.row_id = row_id;
							ev.current_txn = 0;
							ev.row = row;
							ev
						}
						None => Event {
							operation: Operation::Insert,
							original_txn: 0,
							bucket: self.bucket,
							row_id,
							current_txn: 0,
							row,
						},
					};
					self.head_key.set_all(0, self.bucket, row_id, 0, 0);

					if let Some(max_key) = self.max_key {
						if self.head_key.compare_row(&max_key) == Ordering::Greater {
							log::debug!(
								"original cursor (bucket {}) crossed max_key, closing",
								self.bucket
							);
							self.head = None;
							self.close()?;
							return Ok(());
						}
					}
					self.head = Some(event);
					return Ok(());
				}
				None => {
					// this physical file is exhausted; open the next one
					// if we're compacting the whole logical bucket.
					let rows_read = reader.total_rows();
					self.reader.as_mut().unwrap().close()?;
					self.reader = None;
					self.row_id_offset += rows_read as i64;

					match &mut self.mode {
						Mode::Compaction { remaining_files } => {
							if let Some(next_file) = remaining_files.next() {
								self.reader = Some(self.opener.open(&next_file)?);
								continue;
							}
							log::debug!(
								"original cursor (bucket {}) exhausted after compacting {} rows",
								self.bucket,
								self.row_id_offset
							);
							self.head = None;
							return Ok(());
						}
						Mode::Split => {
							log::debug!("original cursor (bucket {}) exhausted", self.bucket);
							self.head = None;
							return Ok(());
						}
					}
				}
			}
		}
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
		0
	}

	fn close(&mut self) -> Result<()> {
		if let Some(mut reader) = self.reader.take() {
			reader.close()?;
		}
		Ok(())
	}
}
