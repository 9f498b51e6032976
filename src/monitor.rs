// Copyright (c) 2022 Papoo Software & Media GmbH <info@papoo.de>
// SPDX-License-Identifier: LGPL-3.0-or-later

//! `ResourceMonitor`: owns the `DirState` tree, the event queues and the
//! access-token table, and runs the heartbeat that keeps them in sync.

use crate::config::Config;
use crate::dir_state::DirState;
use crate::error::MonitorError;
use crate::event_queue::EventQueues;
use crate::oss::Oss;
use crate::snapshot::DirStateSnapshot;
use std::path::Path;
use tracing::{instrument, warn};

/// Splits `"a/b/c.cinfo"` into its directory component (`"a/b"`) and file
/// name (`"c.cinfo"`). A bare filename has an empty directory component.
fn split_parent(path: &str) -> (&str, &str) {
	match path.rfind('/') {
		Some(i) => (&path[..i], &path[i + 1..]),
		None => ("", path),
	}
}

/// Owns the live `DirState` mirror and the queues feeding it. `O` is the
/// filesystem abstraction used for the initial scan.
pub struct ResourceMonitor<'o, O: Oss> {
	oss: &'o O,
	pub tree: DirState,
	pub queues: EventQueues,
	last_heartbeat: i64,
	last_propagation: i64,
	heartbeat_interval: i64,
	propagation_interval: i64,
	snapshot_path: Option<std::path::PathBuf>,
	snapshot_depth: u32,
}

impl<'o, O: Oss> ResourceMonitor<'o, O> {
	pub fn new(config: &Config, oss: &'o O) -> Self {
		Self {
			oss,
			tree: DirState::new(),
			queues: EventQueues::new(),
			last_heartbeat: 0,
			last_propagation: 0,
			heartbeat_interval: config.heartbeat_interval_seconds as i64,
			propagation_interval: config.stats_propagation_interval_seconds as i64,
			snapshot_path: config.snapshot_path.clone(),
			snapshot_depth: config.dir_stats_store_depth,
		}
	}

	/// Walks the whole namespace once, creating a `DirState` node for every
	/// directory found. File-level accounting is seeded lazily by open/close
	/// events and by the purge driver's own traversal; this only guarantees
	/// the tree shape matches the namespace before the first heartbeat.
	#[instrument(level = "debug", skip(self))]
	pub fn initial_scan(&mut self) -> Result<(), MonitorError> {
		let mut traversal = crate::fs_traversal::FsTraversal::new(self.oss);
		traversal.begin_traversal(Path::new(".")).map_err(|source| MonitorError::TraversalRootUnavailable {
			path: Path::new(".").to_path_buf(),
			source,
		})?;
		self.scan_recursive(&mut traversal, "");
		traversal.close();
		Ok(())
	}

	fn scan_recursive(&mut self, traversal: &mut crate::fs_traversal::FsTraversal<O>, path_prefix: &str) {
		let subdirs: Vec<String> = traversal.subdirs().to_vec();
		for name in subdirs {
			let child_path = if path_prefix.is_empty() { name.clone() } else { format!("{path_prefix}/{name}") };
			let (child_node, _) = self.tree.find_path(&child_path, None, true);
			if let Some(child_node) = child_node {
				let parent = self.tree.node(child_node).parent.expect("just resolved a non-root path");
				self.tree.seed_directory(parent);
			}
			match traversal.cd_down(&name) {
				Ok(true) => {
					self.scan_recursive(traversal, &child_path);
					traversal.cd_up();
				}
				Ok(false) => warn!(dir = %child_path, "failed to open subdirectory during initial scan, skipping"),
				Err(error) => warn!(dir = %child_path, %error, "failed to open subdirectory during initial scan, skipping"),
			}
		}
	}

	/// Phase A: drains the write queues and folds every event into the
	/// corresponding node's `here_stats`/`here_usage`.
	pub fn drain_queues(&mut self, now: i64) {
		let batch = self.queues.swap_queues();

		for (token, open) in batch.file_open {
			let filename = match self.queues.take_token_filename(token) {
				Some(f) => f,
				None => continue,
			};
			let (dir, _file) = split_parent(&filename);
			let (dir_node, last_existing) = self.tree.find_path(dir, None, true);
			let Some(dir_node) = dir_node else { continue };
			self.tree.mark_directories_created(last_existing, dir_node);
			self.queues.set_token_dir(token, dir_node);
			let node = self.tree.node_mut(dir_node);
			node.here_stats.n_files_opened += 1;
			if !open.existing_file {
				node.here_stats.n_files_created += 1;
			}
			node.here_usage.bump_open_time(open.open_time);
		}

		for (token, delta) in batch.file_update_stats {
			if let Some(dir_node) = self.queues.token_dir(token) {
				self.tree.node_mut(dir_node).here_stats.merge(&delta);
			}
		}

		for (token, close) in batch.file_close {
			if let Some(dir_node) = self.queues.token_dir(token) {
				let node = self.tree.node_mut(dir_node);
				node.here_stats.merge(&close.stats);
				node.here_stats.n_files_closed += 1;
				node.here_usage.bump_close_time(close.close_time);
			}
			self.queues.free_token(token);
		}

		for (dir_node, record) in batch.purge_by_node {
			let node = self.tree.node_mut(dir_node);
			node.here_stats.bytes_removed += record.total_size;
			node.here_stats.n_files_removed += record.n_files;
		}

		for (dir_path, record) in batch.purge_by_dir {
			match self.tree.find_path_ro(&dir_path) {
				Some(dir_node) => {
					let node = self.tree.node_mut(dir_node);
					node.here_stats.bytes_removed += record.total_size;
					node.here_stats.n_files_removed += record.n_files;
				}
				None => warn!(path = %dir_path, "purge event for directory never seen by the tree"),
			}
		}

		for (lfn, size) in batch.purge_by_lfn {
			let (dir, _file) = split_parent(&lfn);
			match self.tree.find_path_ro(dir) {
				Some(dir_node) => {
					let node = self.tree.node_mut(dir_node);
					node.here_stats.bytes_removed += size;
					node.here_stats.n_files_removed += 1;
				}
				None => warn!(path = %lfn, "purge event for logical filename never seen by the tree"),
			}
		}

		self.last_heartbeat = now;
	}

	/// Phases B and C: upward propagation, usage fold-in, and stats reset.
	pub fn propagate(&mut self, now: i64) {
		self.tree.upward_propagate_stats_and_times();
		self.tree.apply_stats_to_usages();
		self.tree.reset_stats();
		self.tree.usage_update_time = now;
		self.tree.stats_reset_time = now;
		self.last_propagation = now;
		self.maybe_emit_snapshot();
	}

	fn maybe_emit_snapshot(&self) {
		let Some(path) = &self.snapshot_path else { return };
		let snapshot = DirStateSnapshot::from_tree(&self.tree, self.snapshot_depth);
		match snapshot.to_json() {
			Ok(json) => {
				if let Err(error) = std::fs::write(path, json) {
					warn!(%error, path = %path.display(), "failed to write snapshot");
				}
			}
			Err(error) => warn!(%error, "failed to serialize snapshot"),
		}
	}

	/// One heartbeat tick: always drains queues; runs the stats roll-up (and
	/// snapshot emission) only once `propagation_interval` has elapsed.
	pub fn heartbeat(&mut self, now: i64) {
		self.drain_queues(now);
		if now - self.last_propagation >= self.propagation_interval {
			self.propagate(now);
		}
	}

	pub fn due_for_heartbeat(&self, now: i64) -> bool {
		now - self.last_heartbeat >= self.heartbeat_interval
	}
}
