use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;

/// Name of the per-entity counter sidecar, stored next to the documents.
pub const COUNTER_FILE: &str = "_next_id.txt";

/// Allocate the next document ID for an entity directory.
///
/// The counter file holds the last allocated ID as decimal ASCII. Allocation
/// takes an exclusive advisory lock on the file, reads the current value,
/// writes `current + 1` back, and returns the new value. Concurrent
/// allocators (tasks, threads, or cooperating processes on the same host)
/// serialise through the OS lock, so IDs are strictly increasing and never
/// reused.
///
/// This blocks on the lock; call it from `spawn_blocking` in async contexts.
pub fn allocate(entity_dir: &Path) -> Result<i64> {
	let counter_path: PathBuf = entity_dir.join(COUNTER_FILE);
	let mut file = OpenOptions::new()
		.read(true)
		.write(true)
		.create(true)
		.truncate(false)
		.open(&counter_path)
		.with_context(|| format!("opening counter file {}", counter_path.display()))?;

	file.lock_exclusive()
		.with_context(|| format!("locking counter file {}", counter_path.display()))?;

	// The lock is held for the read-modify-write below and released when the
	// file handle drops, including on the error paths.
	let result = (|| {
		let mut contents = String::new();
		file.read_to_string(&mut contents)?;
		let current: i64 = contents.trim().parse().unwrap_or(0);
		let next = current + 1;

		file.seek(SeekFrom::Start(0))?;
		file.set_len(0)?;
		file.write_all(next.to_string().as_bytes())?;
		file.flush()?;
		Ok(next)
	})();

	let _ = fs2::FileExt::unlock(&file);
	result
}
