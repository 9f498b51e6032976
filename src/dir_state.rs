// Copyright (c) 2022 Papoo Software & Media GmbH <info@papoo.de>
// SPDX-License-Identifier: LGPL-3.0-or-later

//! The in-memory mirror of the cached namespace.
//!
//! Modeled as an arena of [`DirNode`] records addressed by [`DirNodeId`]
//! rather than as a graph of owned/weak pointers, since Rust has no free
//! mutable aliasing: parent/child links are indices into the same `Vec`,
//! matching the arena pattern §9 prescribes for languages without it. The
//! root is always node `0`.

use crate::dir_stats::{DirStats, DirUsage};
use std::collections::BTreeMap;
use std::fmt::Write as _;

pub type DirNodeId = usize;

/// One node of the namespace tree.
#[derive(Debug, Clone)]
pub struct DirNode {
	pub name: String,
	pub depth: u32,
	pub parent: Option<DirNodeId>,
	/// Sorted by name for deterministic, insertion-order-independent export.
	pub children: BTreeMap<String, DirNodeId>,
	pub here_stats: DirStats,
	pub subdir_stats: DirStats,
	pub here_usage: DirUsage,
	pub subdir_usage: DirUsage,
}

impl DirNode {
	fn new(name: String, depth: u32, parent: Option<DirNodeId>) -> Self {
		Self {
			name,
			depth,
			parent,
			children: BTreeMap::new(),
			here_stats: DirStats::default(),
			subdir_stats: DirStats::default(),
			here_usage: DirUsage::default(),
			subdir_usage: DirUsage::default(),
		}
	}
}

/// Arena-backed directory tree, a.k.a. the core's `DataFsState` root.
#[derive(Debug, Clone)]
pub struct DirState {
	nodes: Vec<DirNode>,
	pub usage_update_time: i64,
	pub stats_reset_time: i64,
}

pub const ROOT: DirNodeId = 0;

impl Default for DirState {
	fn default() -> Self {
		Self::new()
	}
}

impl DirState {
	pub fn new() -> Self {
		Self {
			nodes: vec![DirNode::new(String::new(), 0, None)],
			usage_update_time: 0,
			stats_reset_time: 0,
		}
	}

	#[inline]
	pub fn node(&self, id: DirNodeId) -> &DirNode {
		&self.nodes[id]
	}

	#[inline]
	pub fn node_mut(&mut self, id: DirNodeId) -> &mut DirNode {
		&mut self.nodes[id]
	}

	#[inline]
	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	#[inline]
	pub fn is_empty(&self) -> bool {
		false
	}

	/// Single-level lookup (or creation) of a child directory.
	pub fn find_dir(&mut self, parent: DirNodeId, name: &str, create_subdirs: bool) -> Option<DirNodeId> {
		if let Some(&id) = self.nodes[parent].children.get(name) {
			return Some(id);
		}
		if !create_subdirs {
			return None;
		}
		let depth = self.nodes[parent].depth + 1;
		let id = self.nodes.len();
		self.nodes.push(DirNode::new(name.to_string(), depth, Some(parent)));
		self.nodes[parent].children.insert(name.to_string(), id);
		Some(id)
	}

	/// Tokenizes `path` into directory components and walks from the root,
	/// creating missing children up to `max_depth` if `create_subdirs`.
	///
	/// Returns `(terminal_node, last_existing_node)`: `last_existing` is the
	/// deepest node that pre-existed the call, letting callers count how
	/// many parents were newly created.
	pub fn find_path(&mut self, path: &str, max_depth: Option<u32>, create_subdirs: bool) -> (Option<DirNodeId>, DirNodeId) {
		let mut cur = ROOT;
		let mut last_existing = ROOT;

		for component in path.split('/').filter(|s| !s.is_empty()) {
			if let Some(limit) = max_depth {
				if self.nodes[cur].depth >= limit {
					break;
				}
			}
			let already_present = self.nodes[cur].children.contains_key(component);
			match self.find_dir(cur, component, create_subdirs) {
				Some(next) => {
					if already_present {
						last_existing = next;
					}
					cur = next;
				}
				None => return (None, last_existing),
			}
		}
		(Some(cur), last_existing)
	}

	/// Bumps `here_stats.n_directories_created` on the parent of every
	/// directory newly created between `last_existing` (exclusive) and
	/// `terminal` (inclusive), as returned by `find_path` — the "count
	/// newly created parents" use of `last_existing` from §4.1.
	pub fn mark_directories_created(&mut self, last_existing: DirNodeId, terminal: DirNodeId) {
		let mut cur = terminal;
		while cur != last_existing {
			let parent = self.nodes[cur].parent.expect("non-root node has a parent");
			self.nodes[parent].here_stats.n_directories_created += 1;
			cur = parent;
		}
	}

	/// Directly seeds `here_usage.n_directories` on `parent`, for the
	/// initial scan which discovers pre-existing directories rather than
	/// creating new ones through an event.
	pub fn seed_directory(&mut self, parent: DirNodeId) {
		self.nodes[parent].here_usage.n_directories += 1;
	}

	/// Walks `path` purely to size an export or report depth, never creating nodes.
	pub fn find_path_ro(&self, path: &str) -> Option<DirNodeId> {
		let mut cur = ROOT;
		for component in path.split('/').filter(|s| !s.is_empty()) {
			cur = *self.nodes[cur].children.get(component)?;
		}
		Some(cur)
	}

	/// Phase B: bottom-up, `subdir_stats = sum over children of (here + subdir)`,
	/// and `last_open/close_time` become the max over children.
	pub fn upward_propagate_stats_and_times(&mut self) {
		// Post-order over the arena: children always have a higher index than
		// their parent since nodes are only ever appended, so a simple
		// reverse scan is already bottom-up.
		for id in (0..self.nodes.len()).rev() {
			let child_ids: Vec<DirNodeId> = self.nodes[id].children.values().copied().collect();
			let mut subdir_stats = DirStats::default();
			let mut last_open = self.nodes[id].here_usage.last_open_time;
			let mut last_close = self.nodes[id].here_usage.last_close_time;
			for child in child_ids {
				let mut combined = self.nodes[child].here_stats;
				combined.merge(&self.nodes[child].subdir_stats);
				subdir_stats.merge(&combined);
				last_open = last_open.max(self.nodes[child].subdir_usage.last_open_time);
				last_open = last_open.max(self.nodes[child].here_usage.last_open_time);
				last_close = last_close.max(self.nodes[child].subdir_usage.last_close_time);
				last_close = last_close.max(self.nodes[child].here_usage.last_close_time);
			}
			self.nodes[id].subdir_stats = subdir_stats;
			// These are provisional; phase C folds them into `*_usage` properly.
			self.nodes[id].subdir_usage.last_open_time = last_open;
			self.nodes[id].subdir_usage.last_close_time = last_close;
		}
	}

	/// Phase C: fold stats into usage and zero the stats for the next cycle.
	pub fn apply_stats_to_usages(&mut self) {
		for node in &mut self.nodes {
			node.here_usage.update_from(&node.here_stats);
			node.subdir_usage.update_from(&node.subdir_stats);
			node.here_usage.bump_open_time(node.here_usage.last_open_time);
			node.here_usage.bump_close_time(node.here_usage.last_close_time);
		}
	}

	/// Zeroes every node's `here_stats`/`subdir_stats`.
	pub fn reset_stats(&mut self) {
		for node in &mut self.nodes {
			node.here_stats.reset();
			node.subdir_stats.reset();
		}
	}

	/// Counts nodes at or above `max_depth`, for sizing a flat export.
	pub fn count_dirs_to_level(&self, max_depth: u32) -> usize {
		self.nodes.iter().filter(|n| n.depth <= max_depth).count()
	}

	/// Full path from the root to `id`, without a leading slash.
	pub fn path_of(&self, id: DirNodeId) -> String {
		let mut parts = Vec::new();
		let mut cur = Some(id);
		while let Some(n) = cur {
			if n == ROOT {
				break;
			}
			parts.push(self.nodes[n].name.clone());
			cur = self.nodes[n].parent;
		}
		parts.reverse();
		parts.join("/")
	}

	/// Textual snapshot for debugging/logging, depth-first up to `max_depth`.
	pub fn dump_recursively(&self, max_depth: u32) -> String {
		let mut out = String::new();
		self.dump_node(ROOT, max_depth, &mut out);
		out
	}

	fn dump_node(&self, id: DirNodeId, max_depth: u32, out: &mut String) {
		let node = &self.nodes[id];
		let _ = writeln!(
			out,
			"{}{} here_files={} subdir_files={} bytes={}",
			"  ".repeat(node.depth as usize),
			if node.name.is_empty() { "/" } else { &node.name },
			node.here_usage.n_files,
			node.subdir_usage.n_files,
			node.here_usage.bytes_on_disk + node.subdir_usage.bytes_on_disk,
		);
		if node.depth >= max_depth {
			return;
		}
		for &child in node.children.values() {
			self.dump_node(child, max_depth, out);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn find_path_creates_missing_parents() {
		let mut tree = DirState::new();
		let (leaf, last_existing) = tree.find_path("a/b/c", None, true);
		assert!(leaf.is_some());
		assert_eq!(last_existing, ROOT);
		assert_eq!(tree.path_of(leaf.unwrap()), "a/b/c");
	}

	#[test]
	fn find_path_without_create_fails_on_missing() {
		let mut tree = DirState::new();
		let (leaf, _) = tree.find_path("a/b", None, false);
		assert!(leaf.is_none());
	}

	#[test]
	fn find_path_respects_max_depth() {
		let mut tree = DirState::new();
		let (leaf, _) = tree.find_path("a/b/c/d", Some(2), true);
		assert_eq!(tree.path_of(leaf.unwrap()), "a/b");
	}

	#[test]
	fn upward_propagation_sums_children() {
		let mut tree = DirState::new();
		let (a, _) = tree.find_path("a", None, true);
		let (b, _) = tree.find_path("a/b", None, true);
		tree.node_mut(b.unwrap()).here_stats.bytes_written = 100;
		tree.node_mut(a.unwrap()).here_stats.bytes_written = 10;
		tree.upward_propagate_stats_and_times();
		assert_eq!(tree.node(a.unwrap()).subdir_stats.bytes_written, 100);
		assert_eq!(tree.node(ROOT).subdir_stats.bytes_written, 110);
	}

	#[test]
	fn propagation_twice_is_idempotent() {
		let mut tree = DirState::new();
		let (a, _) = tree.find_path("a", None, true);
		tree.node_mut(a.unwrap()).here_stats.bytes_written = 5;
		tree.upward_propagate_stats_and_times();
		let first = tree.node(ROOT).subdir_stats;
		tree.upward_propagate_stats_and_times();
		let second = tree.node(ROOT).subdir_stats;
		assert_eq!(first.bytes_written, second.bytes_written);
	}

	#[test]
	fn apply_then_reset_zeroes_stats() {
		let mut tree = DirState::new();
		let (a, _) = tree.find_path("a", None, true);
		tree.node_mut(a.unwrap()).here_stats.bytes_written = 5;
		tree.upward_propagate_stats_and_times();
		tree.apply_stats_to_usages();
		tree.reset_stats();
		assert_eq!(tree.node(a.unwrap()).here_stats, DirStats::default());
		assert_eq!(tree.node(a.unwrap()).here_usage.bytes_on_disk, 5);
	}

	#[test]
	fn mark_directories_created_credits_each_new_parent() {
		let mut tree = DirState::new();
		let (leaf, last_existing) = tree.find_path("a/b/c", None, true);
		tree.mark_directories_created(last_existing, leaf.unwrap());

		let a = tree.find_path_ro("a").unwrap();
		let b = tree.find_path_ro("a/b").unwrap();
		assert_eq!(tree.node(ROOT).here_stats.n_directories_created, 1);
		assert_eq!(tree.node(a).here_stats.n_directories_created, 1);
		assert_eq!(tree.node(b).here_stats.n_directories_created, 1);
	}

	#[test]
	fn mark_directories_created_is_a_no_op_for_a_fully_existing_path() {
		let mut tree = DirState::new();
		let (existing, _) = tree.find_path("a/b", None, true);
		tree.upward_propagate_stats_and_times();
		tree.apply_stats_to_usages();
		tree.reset_stats();

		let (leaf, last_existing) = tree.find_path("a/b", None, true);
		assert_eq!(leaf, Some(existing.unwrap()));
		tree.mark_directories_created(last_existing, leaf.unwrap());

		assert_eq!(tree.node(ROOT).here_stats.n_directories_created, 0);
	}

	#[test]
	fn seed_directory_bumps_usage_directly() {
		let mut tree = DirState::new();
		tree.seed_directory(ROOT);
		tree.seed_directory(ROOT);
		assert_eq!(tree.node(ROOT).here_usage.n_directories, 2);
	}
}
