// Copyright (c) 2022 Papoo Software & Media GmbH <info@papoo.de>
// SPDX-License-Identifier: LGPL-3.0-or-later

//! The purge-candidate collector: walks a namespace subtree, classifies
//! every cinfo-suffixed file, and keeps a size-bounded sorted set of
//! eviction candidates ordered by access time.

use crate::cinfo::{CinfoData, CinfoReader, CINFO_SUFFIX};
use crate::fs_traversal::FsTraversal;
use crate::oss::Oss;
use std::collections::BTreeMap;
use tracing::warn;

/// One file eligible (or forced) for removal. `atime == 0` marks a
/// "doomed" candidate: aged-out or checksum-aged-out, sorting before every
/// real access time so it is removed regardless of space pressure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeCandidate {
	pub path: String,
	pub size_bytes: u64,
	pub atime: i64,
}

/// Classification outcome for one cinfo-suffixed file, used by callers/tests
/// to assert on how a given fixture was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
	Doomed,
	Candidate,
	Rejected,
}

pub struct FPurgeState {
	target_bytes: u64,
	min_time: Option<i64>,
	min_uvkeep_time: Option<i64>,
	/// Unconditional removals (doomed; not yet promoted into `fmap`).
	flist: Vec<PurgeCandidate>,
	/// Bytes accumulated in `flist`, counted toward the budget gate in
	/// `maybe_insert` alongside `fmap_bytes` — doomed files are never
	/// evicted but still occupy the budget the original's `m_nBytesAccum`
	/// tracks (`XrdPfcFPurgeState.cc:91-99`).
	flist_bytes: u64,
	/// `(atime, insertion-sequence) -> candidate`, bounded so that
	/// `Σ sizes` hovers around `target_bytes` (see `maybe_insert`).
	fmap: BTreeMap<(i64, u64), PurgeCandidate>,
	fmap_bytes: u64,
	/// Running total of every classified file's size, doomed or not —
	/// the actual bytes seen by this scan, independent of what's currently
	/// retained in `fmap`/`flist`. Lets callers refresh a stale usage
	/// estimate from ground truth after a full traversal.
	bytes_total: u64,
	seq: u64,
	n_consistency_repairs: u64,
}

impl FPurgeState {
	pub fn new(target_bytes: u64, min_time: Option<i64>, min_uvkeep_time: Option<i64>) -> Self {
		Self {
			target_bytes,
			min_time,
			min_uvkeep_time,
			flist: Vec::new(),
			flist_bytes: 0,
			fmap: BTreeMap::new(),
			fmap_bytes: 0,
			bytes_total: 0,
			seq: 0,
			n_consistency_repairs: 0,
		}
	}

	pub fn fmap_len(&self) -> usize {
		self.fmap.len()
	}

	pub fn fmap_bytes(&self) -> u64 {
		self.fmap_bytes
	}

	pub fn n_consistency_repairs(&self) -> u64 {
		self.n_consistency_repairs
	}

	/// Total bytes across every file classified by this scan (doomed and
	/// ordinary candidates alike), mirroring `XrdPfcFPurgeState`'s own
	/// `m_nBytesTotal` accumulator — the ground truth §4.8 step 4 refreshes
	/// `file_usage` from.
	pub fn bytes_total(&self) -> u64 {
		self.bytes_total
	}

	/// Depth-first walk over the traversal's current subtree, reading every
	/// cinfo sidecar and classifying it. Subdirectory open failures are
	/// warned and skipped; root failure must be handled by the caller before
	/// `scan` is invoked (traversal is already open by then).
	pub fn scan<O: Oss, R: CinfoReader>(&mut self, traversal: &mut FsTraversal<O>, reader: &R, now: i64) {
		let names: Vec<String> = traversal
			.files()
			.iter()
			.filter_map(|f| f.name.strip_suffix(CINFO_SUFFIX).map(|_| f.name.clone()))
			.collect();
		for name in names {
			self.visit_cinfo(traversal, reader, &name, now);
		}

		let subdirs: Vec<String> = traversal.subdirs().to_vec();
		for subdir in subdirs {
			match traversal.cd_down(&subdir) {
				Ok(true) => {
					self.scan(traversal, reader, now);
					traversal.cd_up();
				}
				Ok(false) => {
					warn!(dir = %subdir, "failed to open subdirectory during purge scan, skipping");
				}
				Err(error) => {
					warn!(dir = %subdir, %error, "failed to open subdirectory during purge scan, skipping");
				}
			}
		}
	}

	fn visit_cinfo<O: Oss, R: CinfoReader>(&mut self, traversal: &mut FsTraversal<O>, reader: &R, cinfo_name: &str, now: i64) {
		let full_path = traversal.full_path(cinfo_name).to_string_lossy().into_owned();
		let data_name = data_peer_name(cinfo_name);
		let bytes = match traversal.read_at(cinfo_name) {
			Ok(b) => b,
			Err(error) => {
				warn!(path = %full_path, %error, "cinfo unreadable, treating as orphan");
				self.repair_orphan(traversal, cinfo_name, &data_name);
				return;
			}
		};

		let data = match reader.parse(&bytes) {
			Ok(d) => d,
			Err(error) => {
				warn!(path = %full_path, %error, "cinfo malformed, treating as orphan");
				self.repair_orphan(traversal, cinfo_name, &data_name);
				return;
			}
		};

		let atime = resolve_atime(traversal, &data_name, &data, now);
		self.classify(full_path, data.downloaded_bytes, atime, &data);
	}

	/// Unlinks both the cinfo file and its data peer; a read failure on
	/// either half means the pair is inconsistent and neither is kept.
	fn repair_orphan<O: Oss>(&mut self, traversal: &FsTraversal<O>, cinfo_name: &str, data_name: &str) {
		if let Err(error) = traversal.unlink_at(cinfo_name) {
			warn!(name = %cinfo_name, %error, "failed to unlink orphaned cinfo");
		}
		if let Err(error) = traversal.unlink_at(data_name) {
			warn!(name = %data_name, %error, "failed to unlink orphaned data peer");
		}
		self.n_consistency_repairs += 1;
	}

	fn classify(&mut self, path: String, size_bytes: u64, atime: i64, data: &CinfoData) -> Classification {
		self.bytes_total += size_bytes;
		if let Some(min_time) = self.min_time {
			if min_time > 0 && atime < min_time {
				self.flist_bytes += size_bytes;
				self.flist.push(PurgeCandidate { path, size_bytes, atime: 0 });
				return Classification::Doomed;
			}
		}
		if let Some(min_uvkeep) = self.min_uvkeep_time {
			if min_uvkeep > 0 && data.checksum_state.has_missing_bits() && data.no_checksum_time_for_uvkeep < min_uvkeep {
				self.flist_bytes += size_bytes;
				self.flist.push(PurgeCandidate { path, size_bytes, atime: 0 });
				return Classification::Doomed;
			}
		}

		let candidate = PurgeCandidate { path, size_bytes, atime };
		if self.maybe_insert(candidate) {
			Classification::Candidate
		} else {
			Classification::Rejected
		}
	}

	fn maybe_insert(&mut self, candidate: PurgeCandidate) -> bool {
		let max_atime = self.fmap.keys().next_back().map(|&(t, _)| t);
		let bytes_accum = self.flist_bytes + self.fmap_bytes;
		let should_insert = bytes_accum < self.target_bytes || max_atime.map_or(true, |t| candidate.atime < t);
		if !should_insert {
			return false;
		}

		let seq = self.seq;
		self.seq += 1;
		self.fmap_bytes += candidate.size_bytes;
		self.fmap.insert((candidate.atime, seq), candidate);

		while let Some((&key, entry)) = self.fmap.iter().next_back() {
			let bytes_accum = self.flist_bytes + self.fmap_bytes;
			if bytes_accum.saturating_sub(entry.size_bytes) >= self.target_bytes {
				self.fmap_bytes -= entry.size_bytes;
				self.fmap.remove(&key);
			} else {
				break;
			}
		}
		true
	}

	/// Splices externally-collected candidates (e.g. from a quota-pin
	/// subtree scan) into `fmap` unconditionally, at time 0, bypassing the
	/// budget eviction `maybe_insert` applies to ordinary candidates.
	pub fn splice_unconditional(&mut self, candidates: impl IntoIterator<Item = PurgeCandidate>) {
		for mut candidate in candidates {
			candidate.atime = 0;
			let seq = self.seq;
			self.seq += 1;
			self.fmap_bytes += candidate.size_bytes;
			self.fmap.insert((0, seq), candidate);
		}
	}

	/// Promotes every doomed `flist` entry into `fmap` with key `(0, seq)`
	/// so they sort before all real access times and are removed first.
	pub fn move_list_entries_to_map(&mut self) {
		for candidate in std::mem::take(&mut self.flist) {
			let seq = self.seq;
			self.seq += 1;
			self.fmap_bytes += candidate.size_bytes;
			self.fmap.insert((0, seq), candidate);
		}
	}

	/// Consumes the collector, returning candidates in ascending access-time
	/// order (doomed entries, if promoted, sort first).
	pub fn into_sorted_candidates(mut self) -> Vec<PurgeCandidate> {
		self.move_list_entries_to_map();
		self.fmap.into_values().collect()
	}
}

fn data_peer_name(cinfo_name: &str) -> String {
	cinfo_name.strip_suffix(CINFO_SUFFIX).unwrap_or(cinfo_name).to_string()
}

/// `cinfo`'s own detach time is authoritative when present. Lacking that, we
/// fall back to `now` rather than 0: an unknown access time should not make
/// the file look maximally stale and jump the eviction queue.
fn resolve_atime<O: Oss>(traversal: &FsTraversal<O>, data_name: &str, data: &CinfoData, now: i64) -> i64 {
	if let Some(t) = data.latest_detach_time {
		return t;
	}
	let _ = traversal.full_path(data_name);
	now
}

/// Peels the cinfo suffix off a candidate path, for the unlink step in
/// `PurgeDriver`.
pub fn data_path_for_candidate(candidate_path: &str) -> &str {
	candidate_path.strip_suffix(CINFO_SUFFIX).unwrap_or(candidate_path)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cinfo::ChecksumState;

	fn cand(path: &str, size: u64, atime: i64) -> PurgeCandidate {
		PurgeCandidate {
			path: path.to_string(),
			size_bytes: size,
			atime,
		}
	}

	#[test]
	fn keeps_inserting_until_budget_reached() {
		let mut state = FPurgeState::new(400, None, None);
		assert!(state.maybe_insert(cand("a", 100, 10)));
		assert!(state.maybe_insert(cand("b", 100, 20)));
		assert!(state.maybe_insert(cand("c", 100, 30)));
		assert!(state.maybe_insert(cand("d", 100, 40)));
		assert_eq!(state.fmap_len(), 4);
		assert_eq!(state.fmap_bytes(), 400);
	}

	#[test]
	fn evicts_newest_once_budget_exceeded() {
		let mut state = FPurgeState::new(250, None, None);
		state.maybe_insert(cand("a", 100, 10));
		state.maybe_insert(cand("b", 100, 20));
		state.maybe_insert(cand("c", 100, 30));
		// total would be 300 >= 250 after removing the newest (c, size 100): 300-100=200 < 250, so c stays.
		assert_eq!(state.fmap_len(), 3);
		state.maybe_insert(cand("d", 100, 5));
		// d is older than max key (30) so it's inserted, then eviction trims off the newest until under budget.
		assert!(state.fmap.values().any(|c| c.path == "d"));
	}

	#[test]
	fn doomed_candidate_sorts_before_all_real_atimes() {
		let mut state = FPurgeState::new(1000, Some(100), None);
		let doomed = CinfoData {
			downloaded_bytes: 50,
			latest_detach_time: Some(10),
			checksum_state: ChecksumState::default(),
			no_checksum_time_for_uvkeep: 0,
		};
		assert_eq!(state.classify("doomed.cinfo".into(), 50, 10, &doomed), Classification::Doomed);
		state.maybe_insert(cand("fresh", 50, 500));
		state.move_list_entries_to_map();
		let sorted = state.into_sorted_candidates();
		assert_eq!(sorted[0].path, "doomed.cinfo");
		assert_eq!(sorted[0].atime, 0);
	}

	#[test]
	fn uv_keep_policy_marks_doomed_when_checksum_incomplete() {
		let mut state = FPurgeState::new(1000, None, Some(100));
		let data = CinfoData {
			downloaded_bytes: 10,
			latest_detach_time: Some(500),
			checksum_state: ChecksumState { missing_mask: 0b1 },
			no_checksum_time_for_uvkeep: 50,
		};
		assert_eq!(state.classify("x.cinfo".into(), 10, 500, &data), Classification::Doomed);
	}

	#[test]
	fn data_path_strips_cinfo_suffix() {
		assert_eq!(data_path_for_candidate("a/b.cinfo"), "a/b");
	}

	#[test]
	fn doomed_bytes_count_toward_the_budget_gate() {
		let mut state = FPurgeState::new(150, Some(100), None);
		let doomed = CinfoData {
			downloaded_bytes: 100,
			latest_detach_time: Some(10),
			checksum_state: ChecksumState::default(),
			no_checksum_time_for_uvkeep: 0,
		};
		assert_eq!(state.classify("doomed.cinfo".into(), 100, 10, &doomed), Classification::Doomed);
		assert!(state.maybe_insert(cand("a", 60, 10)));
		// flist (100) + fmap (60) is already past the 150 budget, and "b" is
		// newer than every atime currently in fmap, so it must be rejected —
		// a gate that only looked at fmap_bytes would have let it in.
		assert!(!state.maybe_insert(cand("b", 60, 20)));
	}

	#[test]
	fn bytes_total_accumulates_across_doomed_and_ordinary_files() {
		let mut state = FPurgeState::new(1000, Some(100), None);
		let doomed = CinfoData {
			downloaded_bytes: 40,
			latest_detach_time: Some(10),
			checksum_state: ChecksumState::default(),
			no_checksum_time_for_uvkeep: 0,
		};
		let fresh = CinfoData {
			downloaded_bytes: 60,
			latest_detach_time: Some(500),
			checksum_state: ChecksumState::default(),
			no_checksum_time_for_uvkeep: 0,
		};
		state.classify("a.cinfo".into(), 40, 10, &doomed);
		state.classify("b.cinfo".into(), 60, 500, &fresh);
		assert_eq!(state.bytes_total(), 100);
	}
}
