use std::path::PathBuf;

use clap::Parser;

use acid_merge::flat_format::{FlatOriginalOpener, FlatOriginalReader};
use acid_merge::traits::{AllTransactionsValid, EventFileReader};
use acid_merge::{
	dirlayout, key_bounds, options, AcidCursor, CollapseEvents, Merger, OriginalCursor,
};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Merge a bucket's base and deltas into one ACID event stream", long_about = None)]
struct Opt {
	/// Load a `MergerOptions` TOML file instead of the flags below.
	#[clap(short, long)]
	config: Option<PathBuf>,

	/// Table directory (holds `bucket_NNNNN` and `delta_*` subdirectories).
	#[clap(short, long)]
	dir: Option<PathBuf>,

	/// Which bucket to merge.
	#[clap(short, long)]
	bucket: Option<i32>,

	/// Treat the bucket as pre-ACID original files instead of a native
	/// ACID base file.
	#[clap(long)]
	original: bool,

	/// Collapse same-row events down to the newest.
	#[clap(long)]
	collapse: bool,
}

fn main() {
	env_logger::init();
	let opt = Opt::parse();

	if let Err(e) = run(opt) {
		log::error!("{e}");
		std::process::exit(1);
	}
}

fn run(opt: Opt) -> acid_merge::Result<()> {
	let merger_options = match opt.config {
		Some(path) => options::load_merger_options(&path)?,
		None => {
			let dir = opt.dir.expect("--dir or --config is required");
			let bucket = opt.bucket.expect("--bucket or --config is required");
			options::MergerOptions {
				collapse_events: opt.collapse,
				is_original: opt.original,
				bucket,
				reader_options: Default::default(),
				delta_directories: dirlayout::list_delta_directories(&dir)?,
				compaction: Some(options::CompactionOptions {
					copy_index: 0,
					is_compacting: opt.original,
					bucket_path: None,
					root_path: dir,
				}),
			}
		}
	};

	let mut merger = build_merger(&merger_options)?;

	let mut count = 0u64;
	while let Some((key, event)) = merger.next_event()? {
		println!(
			"{}\t{}\t{:?}\t{}",
			key.id.row_id,
			key.current_txn_id,
			event.operation,
			event.row.len()
		);
		count += 1;
	}
	merger.close()?;
	log::info!("emitted {count} events");
	Ok(())
}

/// Wire a `MergerOptions` into a runnable `Merger` over the bundled flat
/// file format. A real driver would plug in its own columnar reader here
/// instead of `flat_format`.
fn build_merger(opts: &options::MergerOptions) -> acid_merge::Result<Merger<Vec<u8>>> {
	let compaction = opts
		.compaction
		.as_ref()
		.expect("CLI always sets compaction");

	let base: Option<Box<dyn acid_merge::MergeCursor<Vec<u8>>>> = if opts.is_original {
		let original_files = dirlayout::list_original_files(&compaction.root_path, opts.bucket)?;
		if original_files.is_empty() {
			None
		} else if compaction.is_compacting {
			Some(Box::new(OriginalCursor::new_compaction(
				Box::new(FlatOriginalOpener),
				original_files,
				opts.bucket,
			)?))
		} else {
			let bucket_path = compaction
				.bucket_path
				.clone()
				.unwrap_or_else(|| original_files[compaction.copy_index as usize].clone());
			let reader = FlatOriginalReader::open(&bucket_path)?;
			let bounds = key_bounds::discover_original_key_bounds(
				reader.stripes(),
				opts.bucket,
				opts.reader_options.offset,
				opts.reader_options.max_offset.unwrap_or(u64::MAX),
			);
			Some(Box::new(OriginalCursor::new_split(
				Box::new(FlatOriginalOpener),
				&original_files,
				&bucket_path,
				opts.bucket,
				bounds.min_key,
				bounds.max_key,
			)?))
		}
	} else {
		let base_path = dirlayout::base_file_path(&compaction.root_path, opts.bucket);
		if base_path.exists() {
			let max_offset = opts
				.reader_options
				.max_offset
				.unwrap_or_else(|| dirlayout::read_flush_length(&base_path).unwrap_or(u64::MAX));
			let reader =
				acid_merge::flat_format::FlatEventReader::open(&base_path, 0, u64::MAX)?;
			let bounds = key_bounds::discover_acid_key_bounds(
				reader.stripes(),
				reader.stripe_last_keys(),
				opts.reader_options.offset,
				max_offset,
			);
			let reader = acid_merge::flat_format::FlatEventReader::open(
				&base_path,
				opts.reader_options.offset,
				max_offset,
			)?;
			Some(Box::new(AcidCursor::new(
				Box::new(reader),
				bounds.min_key,
				bounds.max_key,
				opts.bucket,
				0,
			)))
		} else {
			None
		}
	};

	let mut deltas: Vec<Box<dyn acid_merge::MergeCursor<Vec<u8>>>> = Vec::new();
	for (i, delta_dir) in opts.delta_directories.iter().enumerate() {
		let Some(delta_path) = dirlayout::find_bucket_file_in_delta(delta_dir, opts.bucket)? else {
			continue;
		};

		// delta reads are always capped to the durably-flushed length
		// (spec §6), never to the caller's own byte-range options.
		let max_offset = dirlayout::read_flush_length(&delta_path)?;

		// eventOptions: the caller's row-level options, widened to the
		// whole (flush-capped) delta and shifted to name payload columns
		// instead of envelope fields (spec §4.5 step 2), with predicate
		// pushdown stripped if this delta carries deletes or updates
		// (spec §4.5 step 4).
		let stats = dirlayout::read_delta_stats(&delta_path)?;
		Merger::<Vec<u8>>::log_delta_pushdown_decision(&delta_path, stats);
		let event_options = acid_merge::ReaderOptions::from(opts.reader_options.clone())
			.as_event_options(acid_merge::FIXED_FIELD_COUNT);
		let event_options = if stats.has_deletes_or_updates() {
			event_options.without_pushdown()
		} else {
			event_options
		};
		log::debug!(
			"delta {delta_path:?}: columns={:?} pushdown={}",
			event_options.column_names,
			event_options.search_argument.is_some()
		);

		let reader = acid_merge::flat_format::FlatEventReader::open(&delta_path, 0, max_offset)?;
		deltas.push(Box::new(AcidCursor::new(
			Box::new(reader),
			None,
			None,
			opts.bucket,
			i as i32,
		)));
	}

	let mut base = base;
	if let Some(b) = base.as_mut() {
		b.advance_to_min_key()?;
	}
	for d in deltas.iter_mut() {
		d.advance_to_min_key()?;
	}

	let columns = acid_merge::FIXED_FIELD_COUNT as i32 + opts.reader_options.column_names.len() as i32;

	Ok(Merger::new(
		base,
		deltas,
		CollapseEvents(opts.collapse_events),
		Box::new(AllTransactionsValid),
		columns,
	))
}
