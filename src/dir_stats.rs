// Copyright (c) 2022 Papoo Software & Media GmbH <info@papoo.de>
// SPDX-License-Identifier: LGPL-3.0-or-later

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Traffic counters accumulated over an interval.
///
/// Folded into a [`DirUsage`] and reset to zero once per propagation cycle
/// (see `DirState::apply_stats_to_usages`). All fields are non-negative at
/// steady state, but may transiently go negative while concurrent events are
/// still being drained; callers must tolerate that and expect convergence by
/// the next cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DirStats {
	pub num_ios: u64,
	pub duration: Duration,
	pub bytes_hit: u64,
	pub bytes_missed: u64,
	pub bytes_bypassed: u64,
	pub bytes_written: u64,
	pub n_cksum_errors: u64,
	pub bytes_removed: u64,
	pub n_files_opened: u64,
	pub n_files_closed: u64,
	pub n_files_created: u64,
	pub n_files_removed: u64,
	pub n_directories_created: u64,
	pub n_directories_removed: u64,
}

impl DirStats {
	/// Adds `other`'s counters into `self`.
	#[inline]
	pub fn merge(&mut self, other: &DirStats) {
		self.num_ios += other.num_ios;
		self.duration += other.duration;
		self.bytes_hit += other.bytes_hit;
		self.bytes_missed += other.bytes_missed;
		self.bytes_bypassed += other.bytes_bypassed;
		self.bytes_written += other.bytes_written;
		self.n_cksum_errors += other.n_cksum_errors;
		self.bytes_removed += other.bytes_removed;
		self.n_files_opened += other.n_files_opened;
		self.n_files_closed += other.n_files_closed;
		self.n_files_created += other.n_files_created;
		self.n_files_removed += other.n_files_removed;
		self.n_directories_created += other.n_directories_created;
		self.n_directories_removed += other.n_directories_removed;
	}

	/// Returns the elementwise difference `self - reference`.
	pub fn delta(&self, reference: &DirStats) -> DirStats {
		DirStats {
			num_ios: self.num_ios.saturating_sub(reference.num_ios),
			duration: self.duration.saturating_sub(reference.duration),
			bytes_hit: self.bytes_hit.saturating_sub(reference.bytes_hit),
			bytes_missed: self.bytes_missed.saturating_sub(reference.bytes_missed),
			bytes_bypassed: self.bytes_bypassed.saturating_sub(reference.bytes_bypassed),
			bytes_written: self.bytes_written.saturating_sub(reference.bytes_written),
			n_cksum_errors: self.n_cksum_errors.saturating_sub(reference.n_cksum_errors),
			bytes_removed: self.bytes_removed.saturating_sub(reference.bytes_removed),
			n_files_opened: self.n_files_opened.saturating_sub(reference.n_files_opened),
			n_files_closed: self.n_files_closed.saturating_sub(reference.n_files_closed),
			n_files_created: self.n_files_created.saturating_sub(reference.n_files_created),
			n_files_removed: self.n_files_removed.saturating_sub(reference.n_files_removed),
			n_directories_created: self
				.n_directories_created
				.saturating_sub(reference.n_directories_created),
			n_directories_removed: self
				.n_directories_removed
				.saturating_sub(reference.n_directories_removed),
		}
	}

	/// Zeroes every counter, keeping the struct around for reuse.
	#[inline]
	pub fn reset(&mut self) {
		*self = DirStats::default();
	}
}

/// Cumulative per-directory usage state, updated from [`DirStats`] deltas.
///
/// Invariant: `bytes_on_disk += bytes_written - bytes_removed`, and
/// similarly for `n_files_open`, `n_files`, `n_directories`. `last_*_time`
/// are monotonically non-decreasing per node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DirUsage {
	pub last_open_time: i64,
	pub last_close_time: i64,
	pub bytes_on_disk: i64,
	pub n_files_open: i64,
	pub n_files: i64,
	pub n_directories: i64,
}

impl DirUsage {
	/// Folds a [`DirStats`] delta into this usage snapshot.
	///
	/// Does not touch `last_open_time`/`last_close_time`; callers derive
	/// those from the timestamps carried alongside the stats (phase B of the
	/// roll-up), since `DirStats` itself carries no timestamp field.
	pub fn update_from(&mut self, stats: &DirStats) {
		self.bytes_on_disk += stats.bytes_written as i64 - stats.bytes_removed as i64;
		self.n_files_open += stats.n_files_opened as i64 - stats.n_files_closed as i64;
		self.n_files += stats.n_files_created as i64 - stats.n_files_removed as i64;
		self.n_directories += stats.n_directories_created as i64 - stats.n_directories_removed as i64;
	}

	/// Records a newer access time if `time` is more recent.
	#[inline]
	pub fn bump_open_time(&mut self, time: i64) {
		self.last_open_time = self.last_open_time.max(time);
	}

	#[inline]
	pub fn bump_close_time(&mut self, time: i64) {
		self.last_close_time = self.last_close_time.max(time);
	}
}
