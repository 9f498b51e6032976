// Copyright (c) 2022 Papoo Software & Media GmbH <info@papoo.de>
// SPDX-License-Identifier: LGPL-3.0-or-later

//! The `Oss` ("object storage system") trait boundary.
//!
//! Everything the monitor and purge driver know about the filesystem goes
//! through this trait, generalizing the way the teacher's `apache_cache`
//! and `cache_file_info` modules wrap raw `std::fs`/`nix` calls behind small
//! owned types. [`LocalOss`] is the only implementation shipped; the trait
//! exists so tests can substitute an in-memory namespace.

use nix::sys::statvfs::statvfs;
use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Disk occupancy as returned by `stat_vs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpaceInfo {
	pub total_bytes: u64,
	pub free_bytes: u64,
}

impl SpaceInfo {
	#[inline]
	pub fn used_bytes(&self) -> u64 {
		self.total_bytes.saturating_sub(self.free_bytes)
	}
}

/// One entry returned by `readdir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
	pub name: String,
	pub is_dir: bool,
}

/// Metadata for a single file, as returned by `stat`/`open_ro_at`'s peer stat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
	pub size: u64,
	/// Size in 512-byte blocks, matching the units `FPurgeState` candidates use.
	pub blocks_512: u64,
	pub mtime: i64,
	pub atime: i64,
}

/// Converts a [`SystemTime`] to a unix epoch second count, saturating at zero.
pub fn unix_secs(t: SystemTime) -> i64 {
	match t.duration_since(SystemTime::UNIX_EPOCH) {
		Ok(d) => d.as_secs() as i64,
		Err(_) => 0,
	}
}

/// The namespace and space-info operations the purge core consumes.
///
/// A `Handle` identifies an open directory. `LocalOss` represents it as the
/// directory's resolved path, which keeps the trait simple to fake in tests
/// while still letting `LocalOss` perform real relative lookups underneath.
pub trait Oss: Send + Sync {
	type Handle: Clone + std::fmt::Debug;

	/// Total/free bytes for the named space (passed through from config's
	/// `data_space_name`; `LocalOss` ignores the name and stats its root).
	fn stat_vs(&self, space_name: &str) -> io::Result<SpaceInfo>;

	fn open_dir(&self, path: &Path) -> io::Result<Self::Handle>;
	fn readdir(&self, handle: &Self::Handle) -> io::Result<Vec<DirEntryInfo>>;
	fn close_dir(&self, _handle: Self::Handle) {}

	fn open_dir_at(&self, handle: &Self::Handle, name: &str) -> io::Result<Self::Handle>;
	/// Reads the full contents of a small file relative to `handle` (used for cinfo sidecars).
	fn open_ro_at(&self, handle: &Self::Handle, name: &str) -> io::Result<Vec<u8>>;
	fn unlink_at(&self, handle: &Self::Handle, name: &str) -> io::Result<()>;

	fn stat(&self, path: &Path) -> io::Result<FileStat>;
	fn unlink(&self, path: &Path) -> io::Result<()>;

	/// The path a handle corresponds to, for error messages and logging.
	fn handle_path(&self, handle: &Self::Handle) -> PathBuf;
}

/// `Oss` implementation backed directly by `std::fs` and `nix`.
pub struct LocalOss {
	root: PathBuf,
}

impl LocalOss {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}
}

impl Oss for LocalOss {
	type Handle = PathBuf;

	fn stat_vs(&self, _space_name: &str) -> io::Result<SpaceInfo> {
		let vfs = statvfs(&self.root)?;
		let block_size = vfs.fragment_size().max(1);
		Ok(SpaceInfo {
			total_bytes: vfs.blocks() * block_size,
			free_bytes: vfs.blocks_available() * block_size,
		})
	}

	fn open_dir(&self, path: &Path) -> io::Result<Self::Handle> {
		let full = self.root.join(path);
		// Confirm it actually opens as a directory before handing back the handle.
		let md = fs::metadata(&full)?;
		if !md.is_dir() {
			return Err(io::Error::new(io::ErrorKind::InvalidInput, "not a directory"));
		}
		Ok(full)
	}

	fn readdir(&self, handle: &Self::Handle) -> io::Result<Vec<DirEntryInfo>> {
		let mut out = Vec::new();
		for entry in fs::read_dir(handle)? {
			let entry = entry?;
			let name = entry.file_name().to_string_lossy().into_owned();
			let is_dir = entry.file_type()?.is_dir();
			out.push(DirEntryInfo { name, is_dir });
		}
		Ok(out)
	}

	fn open_dir_at(&self, handle: &Self::Handle, name: &str) -> io::Result<Self::Handle> {
		let full = handle.join(name);
		let md = fs::metadata(&full)?;
		if !md.is_dir() {
			return Err(io::Error::new(io::ErrorKind::InvalidInput, "not a directory"));
		}
		Ok(full)
	}

	fn open_ro_at(&self, handle: &Self::Handle, name: &str) -> io::Result<Vec<u8>> {
		fs::read(handle.join(name))
	}

	fn unlink_at(&self, handle: &Self::Handle, name: &str) -> io::Result<()> {
		fs::remove_file(handle.join(name))
	}

	fn stat(&self, path: &Path) -> io::Result<FileStat> {
		let md = fs::metadata(self.root.join(path))?;
		Ok(FileStat {
			size: md.len(),
			blocks_512: md.blocks(),
			mtime: md.mtime(),
			atime: md.atime(),
		})
	}

	fn unlink(&self, path: &Path) -> io::Result<()> {
		fs::remove_file(self.root.join(path))
	}

	fn handle_path(&self, handle: &Self::Handle) -> PathBuf {
		handle.clone()
	}
}
