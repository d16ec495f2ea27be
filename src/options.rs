//! Configuration consumed at `Merger` construction (spec §4.6) and the
//! thin wiring around it.
//!
//! Grounded on `bin/sonnerie-serve.rs`'s `Opt` (a `clap::Parser` struct)
//! and on the teacher's general pattern of deriving `serde::Deserialize`
//! on its optional-feature data types — this crate extends that to a
//! `MergerOptions`/`ReaderOptions`/`CompactionOptions` model a driver can
//! load from a TOML file instead of constructing by hand.

use crate::traits::ReaderOptions;
use std::path::PathBuf;

/// Compaction-specific parameters (spec §4.6 `mergerOptions`).
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CompactionOptions {
	/// Which physical original file (0-based) this split reads, when
	/// `is_original` and not `is_compacting`.
	pub copy_index: u32,
	/// `true` if this split processes an entire logical bucket's
	/// original files in one pass, rather than a byte-range of one
	/// physical file.
	pub is_compacting: bool,
	/// The specific physical file this split targets, relative to
	/// `root_path`, when not compacting.
	pub bucket_path: Option<PathBuf>,
	pub root_path: PathBuf,
}

/// Top-level options a driver passes to build a [`crate::Merger`] (spec
/// §4.6).
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct MergerOptions {
	pub collapse_events: bool,
	pub is_original: bool,
	pub bucket: i32,
	pub reader_options: SerializableReaderOptions,
	pub delta_directories: Vec<PathBuf>,
	pub compaction: Option<CompactionOptions>,
}

/// A `serde`-friendly mirror of [`ReaderOptions`] (which itself stays
/// serde-free so the merge engine's core types don't carry an optional
/// dependency).
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct SerializableReaderOptions {
	pub offset: u64,
	pub max_offset: Option<u64>,
	pub column_names: Vec<String>,
	pub search_argument: Option<String>,
}

impl From<SerializableReaderOptions> for ReaderOptions {
	fn from(o: SerializableReaderOptions) -> ReaderOptions {
		ReaderOptions {
			offset: o.offset,
			max_offset: o.max_offset,
			include: vec![true; o.column_names.len()],
			column_names: o.column_names,
			search_argument: o.search_argument,
		}
	}
}

#[cfg(feature = "toml")]
pub fn load_merger_options(path: &std::path::Path) -> crate::error::Result<MergerOptions> {
	let text = std::fs::read_to_string(path)?;
	toml::from_str(&text)
		.map_err(|e| crate::error::MergeError::InvariantViolation(format!("bad config: {e}")))
}

/// `offset + progress * length` (spec §4.6 `get_pos`): position
/// estimate for coarse progress UIs. `progress` should come from the
/// base reader only (delta consumption is never reflected, spec §7,
/// §9).
pub fn get_pos(offset: u64, length: u64, progress: f32) -> u64 {
	offset + (progress as f64 * length as f64) as u64
}

/// `get_progress` always returns `1.0` when there is no base reader
/// (spec §4.6): a merge over deltas alone has no natural notion of
/// fractional completion to report.
pub fn get_progress(base_progress: Option<f32>) -> f32 {
	base_progress.unwrap_or(1.0)
}
