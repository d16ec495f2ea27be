//! Directory-layout utilities: enumerate a bucket's base file, its
//! original files, and a table's delta directories; parse bucket/copy
//! indices out of filenames (spec §1, §6).
//!
//! Grounded on `database_reader.rs::new_opts`, which collects `tx.*`
//! paths with `std::fs::read_dir` into a `Vec` and calls `.sort()`
//! before opening them in order — `read_dir` makes no ordering
//! guarantee, so every directory scan here sorts its results the same
//! way before returning them.

use crate::error::Result;
use std::path::{Path, PathBuf};

/// Per-delta summary statistics (spec §6: "Delta files carry ACID
/// summary statistics including deletes, updates, inserts").
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeltaStats {
	pub inserts: u64,
	pub updates: u64,
	pub deletes: u64,
}

impl DeltaStats {
	/// Whether the merger must strip predicate pushdown before reading
	/// this delta (spec §4.5 step 4).
	pub fn has_deletes_or_updates(&self) -> bool {
		self.updates > 0 || self.deletes > 0
	}
}

/// Name a physical original file belonging to bucket `bucket`:
/// `bbbbb_0`, `bbbbb_0_copy_1`, ..., `bbbbb_0_copy_n`.
pub fn original_file_name(bucket: i32, copy_index: u32) -> String {
	if copy_index == 0 {
		format!("{bucket:05}_0")
	} else {
		format!("{bucket:05}_0_copy_{copy_index}")
	}
}

/// Parse the `copy_index` out of an original file's name, if it names a
/// file belonging to `bucket`.
pub fn parse_copy_index(bucket: i32, file_name: &str) -> Option<u32> {
	let base = format!("{bucket:05}_0");
	if file_name == base {
		return Some(0);
	}
	let prefix = format!("{base}_copy_");
	file_name.strip_prefix(&prefix)?.parse().ok()
}

/// List every physical original file for `bucket` under `dir`, in
/// deterministic ascending copy-index order: `bbbbb_0`,
/// `bbbbb_0_copy_1`, ..., `bbbbb_0_copy_n`.
pub fn list_original_files(dir: &Path, bucket: i32) -> Result<Vec<PathBuf>> {
	let mut found: Vec<(u32, PathBuf)> = Vec::new();
	for entry in std::fs::read_dir(dir)? {
		let entry = entry?;
		let name = entry.file_name();
		let Some(name) = name.to_str() else {
			continue;
		};
		if let Some(copy_index) = parse_copy_index(bucket, name) {
			found.push((copy_index, entry.path()));
		}
	}
	found.sort_by_key(|(idx, _)| *idx);
	Ok(found.into_iter().map(|(_, p)| p).collect())
}

/// The path a native ACID base file for `bucket` would live at, if it
/// exists.
pub fn base_file_path(dir: &Path, bucket: i32) -> PathBuf {
	dir.join(format!("bucket_{bucket:05}"))
}

/// List a table's delta directories in commit order (deltas are named so
/// that lexicographic order is commit order, same discipline as the
/// teacher's `tx.*` transaction files).
pub fn list_delta_directories(table_dir: &Path) -> Result<Vec<PathBuf>> {
	let mut found = Vec::new();
	for entry in std::fs::read_dir(table_dir)? {
		let entry = entry?;
		if !entry.file_type()?.is_dir() {
			continue;
		}
		let name = entry.file_name();
		if name.to_string_lossy().starts_with("delta_") {
			found.push(entry.path());
		}
	}
	found.sort();
	Ok(found)
}

/// Locate the single file belonging to `bucket` within a delta
/// directory, if this delta touched that bucket at all.
pub fn find_bucket_file_in_delta(delta_dir: &Path, bucket: i32) -> Result<Option<PathBuf>> {
	let candidate = delta_dir.join(format!("bucket_{bucket:05}"));
	if candidate.exists() {
		Ok(Some(candidate))
	} else {
		Ok(None)
	}
}

/// Read the durably-flushed length marker for a delta's bucket file, so
/// reads never run past bytes that might still be mid-write (spec §6).
/// The marker lives alongside the data file as `<name>.length`, one
/// decimal integer.
pub fn read_flush_length(bucket_file: &Path) -> Result<u64> {
	let marker = flush_length_marker_path(bucket_file);
	match std::fs::read_to_string(&marker) {
		Ok(s) => s
			.trim()
			.parse()
			.map_err(|_| crate::error::MergeError::InvariantViolation(
				format!("malformed flush-length marker {marker:?}"),
			)),
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
			Ok(std::fs::metadata(bucket_file)?.len())
		}
		Err(e) => Err(e.into()),
	}
}

pub fn flush_length_marker_path(bucket_file: &Path) -> PathBuf {
	let mut name = bucket_file.as_os_str().to_owned();
	name.push(".length");
	PathBuf::from(name)
}

/// The path a delta bucket file's summary-statistics sidecar would live
/// at (spec §6: "delta files carry ACID summary statistics including
/// deletes, updates, inserts").
pub fn stats_marker_path(bucket_file: &Path) -> PathBuf {
	let mut name = bucket_file.as_os_str().to_owned();
	name.push(".stats");
	PathBuf::from(name)
}

/// Write `stats` to `bucket_file`'s summary-statistics sidecar, as three
/// whitespace-separated decimal integers (`inserts updates deletes`).
pub fn write_delta_stats(bucket_file: &Path, stats: DeltaStats) -> Result<()> {
	let marker = stats_marker_path(bucket_file);
	std::fs::write(
		marker,
		format!("{} {} {}", stats.inserts, stats.updates, stats.deletes),
	)?;
	Ok(())
}

/// Read a delta's summary statistics off its sidecar file (spec §4.5 step
/// 4 needs this to decide whether to strip predicate pushdown).
///
/// If the sidecar is missing — a delta written by something other than
/// this crate's own writer — conservatively report it as carrying both
/// updates and deletes, since wrongly keeping pushdown enabled against a
/// delta that actually has them can drop the latest live version of a
/// row (spec §4.5 step 4), while wrongly stripping it against a pure-
/// insert delta only costs performance.
pub fn read_delta_stats(bucket_file: &Path) -> Result<DeltaStats> {
	let marker = stats_marker_path(bucket_file);
	match std::fs::read_to_string(&marker) {
		Ok(s) => {
			let mut fields = s.split_whitespace();
			let mut next_u64 = || -> Result<u64> {
				fields
					.next()
					.and_then(|v| v.parse().ok())
					.ok_or_else(|| {
						log::error!("malformed delta stats marker {marker:?}");
						crate::error::MergeError::InvariantViolation(format!(
							"malformed delta stats marker {marker:?}"
						))
					})
			};
			Ok(DeltaStats {
				inserts: next_u64()?,
				updates: next_u64()?,
				deletes: next_u64()?,
			})
		}
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
			log::warn!(
				"no delta stats marker for {bucket_file:?}; conservatively assuming it carries updates/deletes"
			);
			Ok(DeltaStats {
				inserts: 0,
				updates: 1,
				deletes: 1,
			})
		}
		Err(e) => Err(e.into()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn names_copy_zero_without_suffix() {
		assert_eq!(original_file_name(42, 0), "00042_0");
		assert_eq!(original_file_name(42, 3), "00042_0_copy_3");
	}

	#[test]
	fn parses_copy_index_round_trip() {
		for bucket in [0, 1, 42] {
			for copy in [0, 1, 7] {
				let name = original_file_name(bucket, copy);
				assert_eq!(parse_copy_index(bucket, &name), Some(copy));
			}
		}
		assert_eq!(parse_copy_index(42, "00043_0"), None);
	}

	#[test]
	fn lists_original_files_in_copy_order() {
		let dir = tempfile::TempDir::new().unwrap();
		for name in ["00000_0_copy_2", "00000_0", "00000_0_copy_1", "00001_0"] {
			std::fs::write(dir.path().join(name), b"").unwrap();
		}
		let found = list_original_files(dir.path(), 0).unwrap();
		let names: Vec<_> = found
			.iter()
			.map(|p| p.file_name().unwrap().to_str().unwrap().to_owned())
			.collect();
		assert_eq!(names, vec!["00000_0", "00000_0_copy_1", "00000_0_copy_2"]);
	}

	#[test]
	fn flush_length_falls_back_to_file_size_without_marker() {
		let dir = tempfile::TempDir::new().unwrap();
		let f = dir.path().join("bucket_00000");
		std::fs::write(&f, b"12345").unwrap();
		assert_eq!(read_flush_length(&f).unwrap(), 5);
	}

	#[test]
	fn flush_length_prefers_marker() {
		let dir = tempfile::TempDir::new().unwrap();
		let f = dir.path().join("bucket_00000");
		std::fs::write(&f, b"1234567890").unwrap();
		std::fs::write(flush_length_marker_path(&f), b"3").unwrap();
		assert_eq!(read_flush_length(&f).unwrap(), 3);
	}

	#[test]
	fn delta_stats_round_trip() {
		let dir = tempfile::TempDir::new().unwrap();
		let f = dir.path().join("bucket_00000");
		let stats = DeltaStats {
			inserts: 2,
			updates: 1,
			deletes: 3,
		};
		write_delta_stats(&f, stats).unwrap();
		assert_eq!(read_delta_stats(&f).unwrap(), stats);
	}

	#[test]
	fn delta_stats_default_to_conservative_without_marker() {
		let dir = tempfile::TempDir::new().unwrap();
		let f = dir.path().join("bucket_00000");
		let stats = read_delta_stats(&f).unwrap();
		assert!(stats.has_deletes_or_updates());
	}
}
