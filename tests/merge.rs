//! End-to-end exercises of the public `Merger` API over the bundled
//! flat file format, covering the compaction and split scenarios the
//! unit tests (keyed on in-memory cursors) don't reach: multiple
//! physical original files, and `OriginalCursor`'s maxKey synthesis
//! excluding out-of-range delta inserts.

use acid_merge::flat_format::{
	FlatEventReader, FlatEventWriter, FlatOriginalOpener, FlatOriginalReader, FlatOriginalWriter,
};
use acid_merge::traits::{AllTransactionsValid, EventFileReader};
use acid_merge::{AcidCursor, CollapseEvents, Event, Merger, Operation, OriginalCursor, ReaderOptions};

fn insert_event(bucket: i32, row_id: i64, txn: i64, payload: &[u8]) -> Event<Vec<u8>> {
	Event {
		operation: Operation::Insert,
		original_txn: txn,
		bucket,
		row_id,
		current_txn: txn,
		row: payload.to_vec(),
	}
}

fn update_event(bucket: i32, row_id: i64, original_txn: i64, current_txn: i64, payload: &[u8]) -> Event<Vec<u8>> {
	Event {
		operation: Operation::Update,
		original_txn,
		bucket,
		row_id,
		current_txn,
		row: payload.to_vec(),
	}
}

#[test]
fn base_and_delta_merge_with_collapse() {
	let dir = tempfile::TempDir::new().unwrap();

	let base_path = dir.path().join("bucket_00000");
	let mut w = FlatEventWriter::new(10);
	w.write_event(&insert_event(0, 0, 1, b"alice"));
	w.write_event(&insert_event(0, 1, 1, b"bob"));
	w.write_event(&insert_event(0, 2, 1, b"carol"));
	w.finish(&base_path).unwrap();

	let delta_path = dir.path().join("delta_bucket_00000");
	let mut w = FlatEventWriter::new(10);
	w.write_event(&update_event(0, 1, 1, 5, b"bobby"));
	w.finish(&delta_path).unwrap();

	let base_reader = FlatEventReader::open(&base_path, 0, u64::MAX).unwrap();
	let base_cursor = Box::new(AcidCursor::new(Box::new(base_reader), None, None, 0, 0));

	let delta_reader = FlatEventReader::open(&delta_path, 0, u64::MAX).unwrap();
	let delta_cursor = Box::new(AcidCursor::new(Box::new(delta_reader), None, None, 0, 1));

	let mut base_cursor: Box<dyn acid_merge::MergeCursor<Vec<u8>>> = base_cursor;
	let mut delta_cursor: Box<dyn acid_merge::MergeCursor<Vec<u8>>> = delta_cursor;
	base_cursor.advance_to_min_key().unwrap();
	delta_cursor.advance_to_min_key().unwrap();

	let mut merger = Merger::new(
		Some(base_cursor),
		vec![delta_cursor],
		CollapseEvents(true),
		Box::new(AllTransactionsValid),
		1,
	);

	let mut rows = Vec::new();
	while let Some((key, event)) = merger.next_event().unwrap() {
		rows.push((key.id.row_id, event.row));
	}
	merger.close().unwrap();

	assert_eq!(
		rows,
		vec![
			(0, b"alice".to_vec()),
			(1, b"bobby".to_vec()),
			(2, b"carol".to_vec()),
		]
	);
}

#[test]
fn compaction_spans_multiple_physical_original_files() {
	let dir = tempfile::TempDir::new().unwrap();

	let first = dir.path().join("00000_0");
	let mut w = FlatOriginalWriter::new(100);
	w.write_row(b"a");
	w.write_row(b"b");
	w.finish(&first).unwrap();

	let second = dir.path().join("00000_0_copy_1");
	let mut w = FlatOriginalWriter::new(100);
	w.write_row(b"c");
	w.finish(&second).unwrap();

	let files = acid_merge::dirlayout::list_original_files(dir.path(), 0).unwrap();
	assert_eq!(files, vec![first.clone(), second.clone()]);

	let mut cursor: Box<dyn acid_merge::MergeCursor<Vec<u8>>> = Box::new(
		OriginalCursor::new_compaction(Box::new(FlatOriginalOpener), files, 0).unwrap(),
	);
	cursor.advance_to_min_key().unwrap();

	let mut merger = Merger::new(
		Some(cursor),
		vec![],
		CollapseEvents(false),
		Box::new(AllTransactionsValid),
		1,
	);

	let mut rows = Vec::new();
	while let Some((key, event)) = merger.next_event().unwrap() {
		rows.push((key.id.row_id, event.row));
	}
	merger.close().unwrap();

	// row ids are bucket-global across both physical files: 0, 1 from the
	// first file, 2 from the second.
	assert_eq!(
		rows,
		vec![(0, b"a".to_vec()), (1, b"b".to_vec()), (2, b"c".to_vec())]
	);
}

#[test]
fn split_of_non_last_original_file_synthesizes_max_key_and_excludes_later_inserts() {
	let dir = tempfile::TempDir::new().unwrap();

	let first = dir.path().join("00000_0");
	let mut w = FlatOriginalWriter::new(100);
	w.write_row(b"x");
	w.write_row(b"y");
	w.finish(&first).unwrap();

	let second = dir.path().join("00000_0_copy_1");
	let mut w = FlatOriginalWriter::new(100);
	w.write_row(b"z");
	w.finish(&second).unwrap();

	let all_files = acid_merge::dirlayout::list_original_files(dir.path(), 0).unwrap();

	// split targeting the first (non-last) physical file: no copy-index
	// offset, but its own maxKey should exclude row id 2, which belongs
	// to the second physical file.
	let reader = FlatOriginalReader::open(&first).unwrap();
	let bounds = acid_merge::key_bounds::discover_original_key_bounds(
		reader.stripes(),
		0,
		0,
		u64::MAX,
	);

	let mut cursor: Box<dyn acid_merge::MergeCursor<Vec<u8>>> = Box::new(
		OriginalCursor::new_split(
			Box::new(FlatOriginalOpener),
			&all_files,
			&first,
			0,
			bounds.min_key,
			bounds.max_key,
		)
		.unwrap(),
	);
	// the file-local bounds above carry no maxKey (this file's only
	// stripe spans the whole requested range); `OriginalCursor` itself
	// synthesizes the real cutoff from cross-file knowledge of which
	// physical file is last, so every other cursor in this split must
	// clip against *that* bound, not the one computed above.
	let split_max_key = cursor.max_key();
	cursor.advance_to_min_key().unwrap();

	// a delta insert for row id 2 (which lives in the second physical
	// file) must not leak into this split's output.
	let delta_path = dir.path().join("delta_bucket_00000");
	let mut w = FlatEventWriter::new(10);
	w.write_event(&insert_event(0, 2, 9, b"phantom"));
	w.finish(&delta_path).unwrap();
	let delta_reader = FlatEventReader::open(&delta_path, 0, u64::MAX).unwrap();
	let mut delta_cursor: Box<dyn acid_merge::MergeCursor<Vec<u8>>> =
		Box::new(AcidCursor::new(Box::new(delta_reader), bounds.min_key, split_max_key, 0, 1));
	delta_cursor.advance_to_min_key().unwrap();

	let mut merger = Merger::new(
		Some(cursor),
		vec![delta_cursor],
		CollapseEvents(false),
		Box::new(AllTransactionsValid),
		1,
	);

	let mut rows = Vec::new();
	while let Some((key, event)) = merger.next_event().unwrap() {
		rows.push((key.id.row_id, event.row));
	}
	merger.close().unwrap();

	assert_eq!(rows, vec![(0, b"x".to_vec()), (1, b"y".to_vec())]);
}

#[test]
fn delta_with_updates_strips_predicate_pushdown() {
	let dir = tempfile::TempDir::new().unwrap();

	let delta_path = dir.path().join("delta_bucket_00000");
	let mut w = FlatEventWriter::new(10);
	w.write_event(&update_event(0, 1, 1, 5, b"bobby"));
	w.finish(&delta_path).unwrap();

	let stats = acid_merge::dirlayout::read_delta_stats(&delta_path).unwrap();
	assert!(stats.has_deletes_or_updates());

	let options = ReaderOptions {
		offset: 0,
		max_offset: Some(10),
		include: vec![true, true],
		column_names: vec!["name".to_string(), "age".to_string()],
		search_argument: Some("age > 30".to_string()),
	};
	let event_options = options.as_event_options(acid_merge::FIXED_FIELD_COUNT);
	assert!(event_options.search_argument.is_some());
	let event_options = if stats.has_deletes_or_updates() {
		event_options.without_pushdown()
	} else {
		event_options
	};
	assert!(event_options.search_argument.is_none());
	assert_eq!(event_options.max_offset, None);
}

#[test]
fn delta_read_is_capped_to_flush_length_marker() {
	let dir = tempfile::TempDir::new().unwrap();

	let delta_path = dir.path().join("delta_bucket_00000");
	let mut w = FlatEventWriter::new(10);
	w.write_event(&insert_event(0, 0, 1, b"alice"));
	w.write_event(&insert_event(0, 1, 1, b"bob"));
	w.finish(&delta_path).unwrap();

	// simulate a writer still mid-append past the flushed length: only the
	// first event is durably visible.
	let full_len = std::fs::metadata(&delta_path).unwrap().len();
	let flushed_len = full_len / 2;
	std::fs::write(
		acid_merge::dirlayout::flush_length_marker_path(&delta_path),
		flushed_len.to_string(),
	)
	.unwrap();

	let max_offset = acid_merge::dirlayout::read_flush_length(&delta_path).unwrap();
	assert_eq!(max_offset, flushed_len);

	let reader = FlatEventReader::open(&delta_path, 0, max_offset).unwrap();
	let mut cursor: Box<dyn acid_merge::MergeCursor<Vec<u8>>> =
		Box::new(AcidCursor::new(Box::new(reader), None, None, 0, 0));
	cursor.advance_to_min_key().unwrap();

	let mut merger = Merger::new(
		Some(cursor),
		vec![],
		CollapseEvents(false),
		Box::new(AllTransactionsValid),
		1,
	);

	let mut rows = Vec::new();
	while let Some((key, event)) = merger.next_event().unwrap() {
		rows.push((key.id.row_id, event.row));
	}
	merger.close().unwrap();

	assert_eq!(rows, vec![(0, b"alice".to_vec())]);
}
