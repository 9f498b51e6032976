// Copyright (c) 2022 Papoo Software & Media GmbH <info@papoo.de>
// SPDX-License-Identifier: LGPL-3.0-or-later

//! `PurgeDriver`: the orchestrator that decides how much to remove and
//! removes it, every `purge_interval_seconds`.

use crate::active_registry::ActiveRegistry;
use crate::cinfo::CinfoReader;
use crate::config::Config;
use crate::dir_state::DirState;
use crate::error::MonitorError;
use crate::event_queue::EventQueues;
use crate::fpurge_state::{data_path_for_candidate, FPurgeState};
use crate::fs_traversal::FsTraversal;
use crate::oss::Oss;
use crate::purge_pin::PurgePin;
use crate::stats::CycleStats;
use std::path::Path;
use tracing::{info, instrument, warn};

/// Runs one purge decision/removal cycle against the live `DirState` tree
/// and `Oss` namespace. Holds the cross-cycle state the 7-step algorithm
/// needs: the running file-usage estimate and the age-based-pass countdown.
pub struct PurgeDriver<'o, O: Oss, R: CinfoReader, A: ActiveRegistry> {
	oss: &'o O,
	reader: R,
	active_registry: A,
	pin: PurgePin,
	config: Config,
	file_usage_estimate: u64,
	cycles_until_age_pass: u64,
	first_pass: bool,
}

impl<'o, O: Oss, R: CinfoReader, A: ActiveRegistry> PurgeDriver<'o, O, R, A> {
	pub fn new(config: Config, oss: &'o O, reader: R, active_registry: A) -> Result<Self, MonitorError> {
		let mut pin = PurgePin::new();
		if let Some(path) = &config.quota_pin_config {
			pin.configure(path)?;
		}
		let baseline = config.file_usage_baseline.map(|s| s.value(0)).unwrap_or(0);
		Ok(Self {
			oss,
			reader,
			active_registry,
			pin,
			cycles_until_age_pass: config.purge_age_based_period,
			config,
			file_usage_estimate: baseline,
			first_pass: true,
		})
	}

	/// Runs one full decision-and-removal cycle. `writes_since_last` is the
	/// byte count written to the cache since the previous call, folded into
	/// the running file-usage estimate (step 2).
	#[instrument(level = "debug", skip(self, tree, queues))]
	pub fn run_cycle(&mut self, tree: &DirState, queues: &EventQueues, writes_since_last: u64, now: i64) -> Result<CycleStats, MonitorError> {
		let space = self.oss.stat_vs(&self.config.data_space_name)?;
		let disk_used = space.used_bytes();
		let disk_hwm_bytes = self.config.disk_hwm.value(space.total_bytes);
		let disk_lwm_bytes = self.config.disk_lwm.value(space.total_bytes);

		// Step 1: disk-usage policy.
		let bytes_to_remove_disk = if disk_used > disk_hwm_bytes {
			disk_used.saturating_sub(disk_lwm_bytes)
		} else {
			0
		};

		// Step 2: file-usage policy.
		self.file_usage_estimate += writes_since_last;
		let bytes_to_remove_files = match self.config.file_usage_nominal {
			Some(nominal_spec) => {
				let nominal = nominal_spec.value(0);
				let mut to_remove = self.file_usage_estimate.saturating_sub(nominal);
				let file_fraction = if nominal > 0 {
					self.file_usage_estimate as f64 / nominal as f64
				} else {
					0.0
				};
				let disk_fraction = if disk_hwm_bytes > 0 { disk_used as f64 / disk_hwm_bytes as f64 } else { 0.0 };
				if file_fraction + disk_fraction > 1.0 {
					to_remove = to_remove.max(disk_used.saturating_sub(disk_lwm_bytes));
				}
				to_remove
			}
			None => 0,
		};

		// Step 3.
		let mut bytes_to_remove = bytes_to_remove_disk.max(bytes_to_remove_files);
		let countdown_reached = {
			self.cycles_until_age_pass = self.cycles_until_age_pass.saturating_sub(1);
			if self.cycles_until_age_pass == 0 {
				self.cycles_until_age_pass = self.config.purge_age_based_period;
				true
			} else {
				false
			}
		};
		let age_policy_set = self.config.purge_cold_files_age.is_some() || self.config.cs_uv_keep.is_some();
		let age_based = countdown_reached && age_policy_set;

		let mut stats = CycleStats::default();
		if bytes_to_remove == 0 && !age_based && !self.first_pass {
			return Ok(stats);
		}
		self.first_pass = false;

		// Step 4: scan the whole namespace.
		let min_time = self.config.purge_cold_files_age.map(|age| now.saturating_sub(age as i64));
		let min_uvkeep_time = self.config.cs_uv_keep.map(|age| now.saturating_sub(age as i64));
		let scan_budget = (bytes_to_remove.saturating_mul(2)).max(1);
		let mut main = FPurgeState::new(scan_budget, min_time, min_uvkeep_time);
		self.scan_root(&mut main, now)?;
		self.file_usage_estimate = main.bytes_total();
		if self.config.file_usage_nominal.is_some() {
			let baseline = self.config.file_usage_baseline.map(|s| s.value(0)).unwrap_or(0);
			bytes_to_remove = bytes_to_remove
				.max(bytes_to_remove_files)
				.min(self.file_usage_estimate.saturating_sub(baseline));
		}
		if age_based {
			main.move_list_entries_to_map();
		}

		// Step 5: quota-pin subtrees.
		if !self.pin.is_empty() {
			let mut plugin_total = 0u64;
			for info in self.pin.ref_dir_infos(tree) {
				if info.bytes_to_recover == 0 {
					continue;
				}
				plugin_total += info.bytes_to_recover;
				let path = tree.path_of(info.dir_node);
				match self.scan_subtree(&path, info.bytes_to_recover, now) {
					Ok(candidates) => main.splice_unconditional(candidates),
					Err(error) => warn!(path = %path, %error, "quota-pin subtree scan failed, skipping"),
				}
			}
			bytes_to_remove = bytes_to_remove.max(plugin_total);
		}

		// Step 6: pre-purge snapshot.
		self.emit_pre_purge_snapshot(tree);

		// Step 7: removal pass, ascending access time.
		for candidate in main.into_sorted_candidates() {
			if bytes_to_remove == 0 && candidate.atime != 0 {
				break;
			}
			let data_path = data_path_for_candidate(&candidate.path);
			if self.active_registry.is_active_or_protected(data_path) {
				stats.files_skipped_active += 1;
				continue;
			}

			let cinfo_result = self.oss.unlink(Path::new(&candidate.path));
			if let Err(error) = &cinfo_result {
				if error.kind() != std::io::ErrorKind::NotFound {
					warn!(path = %candidate.path, %error, "failed to unlink cinfo sidecar");
				}
			}
			let data_result = self.oss.unlink(Path::new(data_path));
			stats.count_unlink_result(data_result.as_ref().map(|_| ()).map_err(|e| e.kind()));
			if data_result.is_ok() {
				stats.count_removed(candidate.size_bytes);
				bytes_to_remove = bytes_to_remove.saturating_sub(candidate.size_bytes);
				self.file_usage_estimate = self.file_usage_estimate.saturating_sub(candidate.size_bytes);
				queues.register_purge_by_lfn(candidate.path.clone(), candidate.size_bytes);
			} else if let Err(error) = data_result {
				warn!(path = %data_path, %error, "failed to unlink data file");
			}
		}

		info!(
			files_removed = stats.files_removed,
			bytes_removed = stats.bytes_removed,
			files_skipped_active = stats.files_skipped_active,
			"purge cycle complete"
		);
		Ok(stats)
	}

	fn scan_root(&self, state: &mut FPurgeState, now: i64) -> Result<(), MonitorError> {
		let mut traversal = FsTraversal::new(self.oss);
		traversal.begin_traversal(Path::new(".")).map_err(|source| MonitorError::TraversalRootUnavailable {
			path: Path::new(".").to_path_buf(),
			source,
		})?;
		state.scan(&mut traversal, &self.reader, now);
		traversal.close();
		Ok(())
	}

	fn scan_subtree(&self, path: &str, target_bytes: u64, now: i64) -> Result<Vec<crate::fpurge_state::PurgeCandidate>, MonitorError> {
		let mut traversal = FsTraversal::new(self.oss);
		traversal.begin_traversal(Path::new(path)).map_err(|source| MonitorError::TraversalRootUnavailable {
			path: Path::new(path).to_path_buf(),
			source,
		})?;
		let mut state = FPurgeState::new(target_bytes, None, None);
		state.scan(&mut traversal, &self.reader, now);
		traversal.close();
		Ok(state.into_sorted_candidates())
	}

	fn emit_pre_purge_snapshot(&self, tree: &DirState) {
		let Some(path) = &self.config.snapshot_path else { return };
		let snapshot = crate::snapshot::DirStateSnapshot::from_tree(tree, self.config.dir_stats_store_depth);
		match snapshot.to_json() {
			Ok(json) => {
				if let Err(error) = std::fs::write(path, json) {
					warn!(%error, path = %path.display(), "failed to write pre-purge snapshot");
				}
			}
			Err(error) => warn!(%error, "failed to serialize pre-purge snapshot"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::active_registry::{EmptyActiveRegistry, InMemoryActiveRegistry};
	use crate::cinfo::{encode, ChecksumState, CinfoData, FixedWidthCinfoReader};
	use crate::job_count::JobCount;
	use crate::oss::fake::{FakeEntry, FakeOss};
	use crate::oss::SpaceInfo;
	use crate::size_spec::SizeSpec;

	fn config(data_path: &str) -> Config {
		Config {
			data_path: data_path.into(),
			disk_hwm: SizeSpec::Percentage(50.0),
			disk_lwm: SizeSpec::Percentage(20.0),
			file_usage_baseline: None,
			file_usage_nominal: None,
			file_usage_max: None,
			purge_interval_seconds: 60,
			purge_age_based_period: 60,
			purge_cold_files_age: None,
			cs_uv_keep: None,
			dir_stats_store_depth: 10,
			dir_stat_reporting_on: true,
			data_space_name: "default".to_string(),
			heartbeat_interval_seconds: 10,
			stats_propagation_interval_seconds: 60,
			quota_pin_config: None,
			snapshot_path: None,
			jobs: JobCount::Auto,
		}
	}

	fn cinfo_entry(downloaded: u64, detach: i64) -> FakeEntry {
		let data = CinfoData {
			downloaded_bytes: downloaded,
			latest_detach_time: Some(detach),
			checksum_state: ChecksumState::default(),
			no_checksum_time_for_uvkeep: 0,
		};
		FakeEntry::file(encode(&data), 0, detach)
	}

	fn tree_over_hwm() -> FakeOss {
		let mut root = FakeEntry::dir();
		if let FakeEntry::Dir(map) = &mut root {
			map.insert("old.cinfo".to_string(), cinfo_entry(100, 10));
			map.insert("old".to_string(), FakeEntry::file(vec![0u8; 100], 10, 10));
			map.insert("new.cinfo".to_string(), cinfo_entry(100, 1000));
			map.insert("new".to_string(), FakeEntry::file(vec![0u8; 100], 1000, 1000));
		}
		FakeOss::new(
			root,
			SpaceInfo {
				total_bytes: 1000,
				free_bytes: 100,
			},
		)
	}

	#[test]
	fn below_hwm_on_first_pass_still_scans_but_removes_nothing_when_budget_is_zero() {
		let oss = FakeOss::new(
			FakeEntry::dir(),
			SpaceInfo {
				total_bytes: 1000,
				free_bytes: 900,
			},
		);
		let mut driver = PurgeDriver::new(config("/cache"), &oss, FixedWidthCinfoReader, EmptyActiveRegistry).unwrap();
		let tree = DirState::new();
		let queues = EventQueues::new();
		let stats = driver.run_cycle(&tree, &queues, 0, 0).unwrap();
		assert_eq!(stats.files_removed, 0);
	}

	#[test]
	fn over_hwm_removes_oldest_file_first() {
		let oss = tree_over_hwm();
		let mut driver = PurgeDriver::new(config("/cache"), &oss, FixedWidthCinfoReader, EmptyActiveRegistry).unwrap();
		let tree = DirState::new();
		let queues = EventQueues::new();
		let stats = driver.run_cycle(&tree, &queues, 0, 2000).unwrap();
		assert!(stats.files_removed >= 1);
		assert!(oss.stat(Path::new("old")).is_err());
	}

	#[test]
	fn active_file_is_skipped_and_counted() {
		let oss = tree_over_hwm();
		let registry = InMemoryActiveRegistry::new();
		registry.mark_active("old");
		let mut driver = PurgeDriver::new(config("/cache"), &oss, FixedWidthCinfoReader, registry).unwrap();
		let tree = DirState::new();
		let queues = EventQueues::new();
		let stats = driver.run_cycle(&tree, &queues, 0, 2000).unwrap();
		assert!(stats.files_skipped_active >= 1);
		assert!(oss.stat(Path::new("old")).is_ok());
	}

	#[test]
	fn second_pass_with_nothing_over_budget_is_a_no_op() {
		let oss = FakeOss::new(
			FakeEntry::dir(),
			SpaceInfo {
				total_bytes: 1000,
				free_bytes: 900,
			},
		);
		let mut driver = PurgeDriver::new(config("/cache"), &oss, FixedWidthCinfoReader, EmptyActiveRegistry).unwrap();
		let tree = DirState::new();
		let queues = EventQueues::new();
		driver.run_cycle(&tree, &queues, 0, 0).unwrap();
		let stats = driver.run_cycle(&tree, &queues, 0, 1).unwrap();
		assert_eq!(stats.files_removed, 0);
	}
}
