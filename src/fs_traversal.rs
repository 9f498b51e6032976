// Copyright (c) 2022 Papoo Software & Media GmbH <info@papoo.de>
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Stateful depth-first walker over the `Oss` namespace.

use crate::oss::{DirEntryInfo, Oss};
use std::collections::HashSet;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TraversalState {
	Idle,
	Open,
	Scanning,
	Closed,
}

/// One entry found while scanning the current directory.
#[derive(Debug, Clone)]
pub struct ScannedFile {
	pub name: String,
}

/// A depth-first, stack-based walk over an [`Oss`] namespace.
///
/// State machine: `Idle -> Open -> Scanning -> Closed`. `begin_traversal`
/// opens the root; `cd_down`/`cd_up` descend/ascend; `unlink_at` deletes
/// relative to the current handle.
pub struct FsTraversal<'o, O: Oss> {
	oss: &'o O,
	state: TraversalState,
	stack: Vec<(O::Handle, String)>,
	current: Option<O::Handle>,
	current_path: String,
	files: Vec<ScannedFile>,
	subdirs: Vec<String>,
	/// Names skipped at the traversal root (e.g. the stats-export directory).
	pub protected_top_dirs: HashSet<String>,
}

impl<'o, O: Oss> FsTraversal<'o, O> {
	pub fn new(oss: &'o O) -> Self {
		Self {
			oss,
			state: TraversalState::Idle,
			stack: Vec::new(),
			current: None,
			current_path: String::new(),
			files: Vec::new(),
			subdirs: Vec::new(),
			protected_top_dirs: HashSet::new(),
		}
	}

	pub fn current_path(&self) -> &str {
		&self.current_path
	}

	pub fn files(&self) -> &[ScannedFile] {
		&self.files
	}

	pub fn subdirs(&self) -> &[String] {
		&self.subdirs
	}

	/// Opens the root and classifies its entries. Fatal to the caller if the
	/// root cannot be opened.
	pub fn begin_traversal(&mut self, root: &std::path::Path) -> std::io::Result<()> {
		let handle = self.oss.open_dir(root)?;
		self.current = Some(handle);
		self.current_path = String::new();
		self.state = TraversalState::Open;
		self.rescan_excluding_protected(true)?;
		self.state = TraversalState::Scanning;
		Ok(())
	}

	fn rescan_excluding_protected(&mut self, at_root: bool) -> std::io::Result<()> {
		let handle = self.current.as_ref().expect("traversal not open");
		let entries: Vec<DirEntryInfo> = self.oss.readdir(handle)?;
		self.files.clear();
		self.subdirs.clear();
		for entry in entries {
			if at_root && self.protected_top_dirs.contains(&entry.name) {
				continue;
			}
			if entry.is_dir {
				self.subdirs.push(entry.name);
			} else {
				self.files.push(ScannedFile { name: entry.name });
			}
		}
		Ok(())
	}

	/// Descends into `name`. Returns `false` (logged elsewhere) if the
	/// subdirectory could not be opened; no matching `cd_up` is required in
	/// that case.
	pub fn cd_down(&mut self, name: &str) -> std::io::Result<bool> {
		let parent = self.current.clone().expect("traversal not open");
		match self.oss.open_dir_at(&parent, name) {
			Ok(handle) => {
				self.stack.push((parent, self.current_path.clone()));
				self.current = Some(handle);
				if self.current_path.is_empty() {
					self.current_path = format!("{}/", name);
				} else {
					self.current_path = format!("{}{}/", self.current_path, name);
				}
				self.rescan_excluding_protected(false)?;
				Ok(true)
			}
			Err(_) => Ok(false),
		}
	}

	/// Releases the current handle and returns to the parent.
	pub fn cd_up(&mut self) {
		if let Some((parent, parent_path)) = self.stack.pop() {
			if let Some(handle) = self.current.take() {
				self.oss.close_dir(handle);
			}
			self.current = Some(parent);
			self.current_path = parent_path;
			let _ = self.rescan_excluding_protected(self.stack.is_empty());
		}
	}

	/// Unlinks `name` relative to the current handle.
	pub fn unlink_at(&self, name: &str) -> std::io::Result<()> {
		let handle = self.current.as_ref().expect("traversal not open");
		self.oss.unlink_at(handle, name)
	}

	/// Reads a small file relative to the current handle (cinfo sidecars).
	pub fn read_at(&self, name: &str) -> std::io::Result<Vec<u8>> {
		let handle = self.current.as_ref().expect("traversal not open");
		self.oss.open_ro_at(handle, name)
	}

	pub fn full_path(&self, name: &str) -> PathBuf {
		PathBuf::from(format!("{}{}", self.current_path, name))
	}

	pub fn close(&mut self) {
		while !self.stack.is_empty() {
			self.cd_up();
		}
		if let Some(handle) = self.current.take() {
			self.oss.close_dir(handle);
		}
		self.state = TraversalState::Closed;
	}
}
