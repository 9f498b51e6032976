// Copyright (c) 2022 Papoo Software & Media GmbH <info@papoo.de>
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Double-buffered event queues and the access-token table.
//!
//! A single mutex guards all six queues' producer (write) side and the
//! token free-list, matching §4.3/§9: producers only ever hold the lock
//! long enough to append or coalesce a small record. The consumer (read)
//! side lives entirely on the monitor thread, handed over as an
//! [`EventBatch`] by [`EventQueues::swap_queues`].

use crate::dir_state::DirNodeId;
use crate::dir_stats::DirStats;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy)]
pub struct OpenRecord {
	pub open_time: i64,
	pub existing_file: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CloseRecord {
	pub close_time: i64,
	pub stats: DirStats,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PurgeRecord {
	pub total_size: u64,
	pub n_files: u64,
}

impl PurgeRecord {
	fn merge(&mut self, other: &PurgeRecord) {
		self.total_size += other.total_size;
		self.n_files += other.n_files;
	}
}

/// An ephemeral handle issued at file-open time and freed at file-close.
#[derive(Debug, Clone)]
struct AccessToken {
	/// Set at open, cleared once `process_queues` resolves it to a `DirState` node.
	filename: Option<String>,
	dir_node: Option<DirNodeId>,
	last_swap_epoch: u64,
	last_update_pos: Option<usize>,
	live: bool,
}

impl AccessToken {
	fn fresh(filename: String, epoch: u64) -> Self {
		Self {
			filename: Some(filename),
			dir_node: None,
			last_swap_epoch: epoch,
			last_update_pos: None,
			live: true,
		}
	}
}

#[derive(Default)]
struct Shared {
	epoch: u64,
	tokens: Vec<AccessToken>,
	free_list: Vec<usize>,
	file_open: Vec<(usize, OpenRecord)>,
	file_update_stats: Vec<(usize, DirStats)>,
	file_close: Vec<(usize, CloseRecord)>,
	purge_by_node: Vec<(DirNodeId, PurgeRecord)>,
	purge_by_dir: Vec<(String, PurgeRecord)>,
	purge_by_lfn: Vec<(String, u64)>,
}

/// A drained copy of all six write queues, ready for the monitor to apply.
#[derive(Default)]
pub struct EventBatch {
	pub file_open: Vec<(usize, OpenRecord)>,
	pub file_update_stats: Vec<(usize, DirStats)>,
	pub file_close: Vec<(usize, CloseRecord)>,
	pub purge_by_node: Vec<(DirNodeId, PurgeRecord)>,
	pub purge_by_dir: Vec<(String, PurgeRecord)>,
	pub purge_by_lfn: Vec<(String, u64)>,
}

pub struct EventQueues {
	shared: Mutex<Shared>,
}

impl Default for EventQueues {
	fn default() -> Self {
		Self::new()
	}
}

impl EventQueues {
	pub fn new() -> Self {
		Self {
			shared: Mutex::new(Shared::default()),
		}
	}

	/// Allocates a token (reusing a freed slot where possible) and posts an
	/// open record for it.
	pub fn register_file_open(&self, filename: String, open_time: i64, existing_file: bool) -> usize {
		let mut shared = self.shared.lock().unwrap();
		let epoch = shared.epoch;
		let id = match shared.free_list.pop() {
			Some(id) => {
				shared.tokens[id] = AccessToken::fresh(filename, epoch);
				id
			}
			None => {
				shared.tokens.push(AccessToken::fresh(filename, epoch));
				shared.tokens.len() - 1
			}
		};
		shared.file_open.push((id, OpenRecord { open_time, existing_file }));
		id
	}

	/// Posts a stats delta for `token`. If this token already wrote into the
	/// current (not-yet-swapped) write queue, the delta is merged into the
	/// existing entry instead of pushing a new one.
	pub fn register_file_update_stats(&self, token: usize, delta: DirStats) {
		let mut shared = self.shared.lock().unwrap();
		let epoch = shared.epoch;
		let same_epoch_pos = {
			let tok = &shared.tokens[token];
			if tok.last_swap_epoch == epoch {
				tok.last_update_pos
			} else {
				None
			}
		};
		match same_epoch_pos {
			Some(pos) => shared.file_update_stats[pos].1.merge(&delta),
			None => {
				let pos = shared.file_update_stats.len();
				shared.file_update_stats.push((token, delta));
				let tok = &mut shared.tokens[token];
				tok.last_swap_epoch = epoch;
				tok.last_update_pos = Some(pos);
			}
		}
	}

	pub fn register_file_close(&self, token: usize, close_time: i64, stats: DirStats) {
		let mut shared = self.shared.lock().unwrap();
		shared.file_close.push((token, CloseRecord { close_time, stats }));
	}

	pub fn register_purge_by_node(&self, node: DirNodeId, total_size: u64, n_files: u64) {
		let mut shared = self.shared.lock().unwrap();
		if let Some(existing) = shared.purge_by_node.iter_mut().find(|(n, _)| *n == node) {
			existing.1.merge(&PurgeRecord { total_size, n_files });
		} else {
			shared.purge_by_node.push((node, PurgeRecord { total_size, n_files }));
		}
	}

	pub fn register_purge_by_dir(&self, dir: String, total_size: u64, n_files: u64) {
		let mut shared = self.shared.lock().unwrap();
		if let Some(existing) = shared.purge_by_dir.iter_mut().find(|(d, _)| *d == dir) {
			existing.1.merge(&PurgeRecord { total_size, n_files });
		} else {
			shared.purge_by_dir.push((dir, PurgeRecord { total_size, n_files }));
		}
	}

	pub fn register_purge_by_lfn(&self, lfn: String, size: u64) {
		let mut shared = self.shared.lock().unwrap();
		shared.purge_by_lfn.push((lfn, size));
	}

	/// Moves the write side into a returned [`EventBatch`] and bumps the
	/// swap epoch, so any in-flight coalescing targets the new epoch.
	pub fn swap_queues(&self) -> EventBatch {
		let mut shared = self.shared.lock().unwrap();
		shared.epoch += 1;
		EventBatch {
			file_open: std::mem::take(&mut shared.file_open),
			file_update_stats: std::mem::take(&mut shared.file_update_stats),
			file_close: std::mem::take(&mut shared.file_close),
			purge_by_node: std::mem::take(&mut shared.purge_by_node),
			purge_by_dir: std::mem::take(&mut shared.purge_by_dir),
			purge_by_lfn: std::mem::take(&mut shared.purge_by_lfn),
		}
	}

	/// Takes the filename stashed at open time, if not yet resolved.
	pub fn take_token_filename(&self, token: usize) -> Option<String> {
		self.shared.lock().unwrap().tokens[token].filename.take()
	}

	pub fn set_token_dir(&self, token: usize, dir: DirNodeId) {
		self.shared.lock().unwrap().tokens[token].dir_node = Some(dir);
	}

	pub fn token_dir(&self, token: usize) -> Option<DirNodeId> {
		self.shared.lock().unwrap().tokens[token].dir_node
	}

	/// Returns `token` to the free-list. Must only be called once the
	/// close event for it has been fully applied.
	pub fn free_token(&self, token: usize) {
		let mut shared = self.shared.lock().unwrap();
		shared.tokens[token].live = false;
		shared.free_list.push(token);
	}

	/// Number of tokens currently allocated (open, not yet closed).
	pub fn live_token_count(&self) -> usize {
		let shared = self.shared.lock().unwrap();
		shared.tokens.iter().filter(|t| t.live).count()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn update_stats_coalesce_within_one_epoch() {
		let queues = EventQueues::new();
		let token = queues.register_file_open("a/b.cinfo".to_string(), 100, false);
		for _ in 0..100 {
			queues.register_file_update_stats(
				token,
				DirStats {
					bytes_hit: 1,
					..Default::default()
				},
			);
		}
		let batch = queues.swap_queues();
		assert_eq!(batch.file_update_stats.len(), 1);
		assert_eq!(batch.file_update_stats[0].1.bytes_hit, 100);
	}

	#[test]
	fn update_stats_after_swap_start_a_new_entry() {
		let queues = EventQueues::new();
		let token = queues.register_file_open("a".to_string(), 0, false);
		queues.register_file_update_stats(token, DirStats { bytes_hit: 1, ..Default::default() });
		let first = queues.swap_queues();
		queues.register_file_update_stats(token, DirStats { bytes_hit: 5, ..Default::default() });
		let second = queues.swap_queues();
		assert_eq!(first.file_update_stats[0].1.bytes_hit, 1);
		assert_eq!(second.file_update_stats[0].1.bytes_hit, 5);
	}

	#[test]
	fn tokens_are_recycled_after_free() {
		let queues = EventQueues::new();
		let t1 = queues.register_file_open("a".to_string(), 0, false);
		queues.free_token(t1);
		let t2 = queues.register_file_open("b".to_string(), 0, false);
		assert_eq!(t1, t2);
	}

	#[test]
	fn purge_by_node_merges_repeated_registrations() {
		let queues = EventQueues::new();
		queues.register_purge_by_node(7, 100, 1);
		queues.register_purge_by_node(7, 50, 1);
		let batch = queues.swap_queues();
		assert_eq!(batch.purge_by_node.len(), 1);
		assert_eq!(batch.purge_by_node[0].1.total_size, 150);
		assert_eq!(batch.purge_by_node[0].1.n_files, 2);
	}
}
