// Copyright (c) 2022 Papoo Software & Media GmbH <info@papoo.de>
// SPDX-License-Identifier: LGPL-3.0-or-later

//! End-to-end purge-cycle scenarios driven through `LocalOss` against a real
//! temporary directory tree, mirroring the teacher's own `testcases/`-backed
//! integration tests for `apache_cache::parse`. The in-process unit tests
//! co-located with each module exercise the fake `Oss`; these confirm the
//! same decisions hold against the real filesystem backend.

use cpurged::{Config, EmptyActiveRegistry, FixedWidthCinfoReader, InMemoryActiveRegistry, JobCount, LocalOss, PurgeDriver, SizeSpec, EventQueues, DirState};
use std::path::Path;

/// Hand-rolled encoder for the fixed cinfo layout `FixedWidthCinfoReader`
/// expects: version(u32) + downloaded_bytes(u64) + detach_time(u64) +
/// no_checksum_time_for_uvkeep(u64) + missing_mask(u32), all native-endian.
/// Not exported by the crate (the real encoder lives behind `cfg(test)`
/// inside `cinfo.rs`), so integration tests reconstruct the same bytes here.
fn encode_cinfo(downloaded_bytes: u64, detach_time: i64, missing_mask: u32, no_checksum_time_for_uvkeep: i64) -> Vec<u8> {
	let mut out = Vec::new();
	out.extend_from_slice(&1u32.to_ne_bytes());
	out.extend_from_slice(&downloaded_bytes.to_ne_bytes());
	out.extend_from_slice(&(detach_time as u64).to_ne_bytes());
	out.extend_from_slice(&(no_checksum_time_for_uvkeep as u64).to_ne_bytes());
	out.extend_from_slice(&missing_mask.to_ne_bytes());
	out
}

/// A config with the disk- and file-usage policies disabled (thresholds set
/// so they can never trigger against the real, environment-dependent
/// filesystem), isolating the age-based policy under test.
fn age_only_config(data_path: &Path, purge_cold_files_age: u64) -> Config {
	Config {
		data_path: data_path.to_path_buf(),
		disk_hwm: SizeSpec::Absolute(u64::MAX),
		disk_lwm: SizeSpec::Absolute(0),
		file_usage_baseline: None,
		file_usage_nominal: None,
		file_usage_max: None,
		purge_interval_seconds: 60,
		purge_age_based_period: 60,
		purge_cold_files_age: Some(purge_cold_files_age),
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

/// S2 — age-based purge: a file older than `purge_cold_files_age` is removed
/// unconditionally on the very first pass, even though the (real, unbounded)
/// disk-usage policy never triggers; a fresh file is left alone.
#[test]
fn age_based_purge_removes_only_cold_files() {
	let dir = tempfile::tempdir().unwrap();
	std::fs::write(dir.path().join("old"), vec![0u8; 64]).unwrap();
	std::fs::write(dir.path().join("old.cinfo"), encode_cinfo(64, 10, 0, 0)).unwrap();
	std::fs::write(dir.path().join("new"), vec![0u8; 64]).unwrap();
	std::fs::write(dir.path().join("new.cinfo"), encode_cinfo(64, 9_990, 0, 0)).unwrap();

	let oss = LocalOss::new(dir.path());
	let config = age_only_config(dir.path(), 50);
	let mut driver = PurgeDriver::new(config, &oss, FixedWidthCinfoReader, EmptyActiveRegistry).unwrap();
	let tree = DirState::new();
	let queues = EventQueues::new();

	let now = 10_000;
	let stats = driver.run_cycle(&tree, &queues, 0, now).unwrap();

	assert_eq!(stats.files_removed, 1);
	assert!(!dir.path().join("old").exists());
	assert!(!dir.path().join("old.cinfo").exists());
	assert!(dir.path().join("new").exists());
	assert!(dir.path().join("new.cinfo").exists());
}

/// S3 — active file protection: a doomed (age-expired) candidate currently
/// marked active is skipped and counted, not unlinked.
#[test]
fn active_file_survives_an_otherwise_doomed_classification() {
	let dir = tempfile::tempdir().unwrap();
	std::fs::write(dir.path().join("hot"), vec![0u8; 64]).unwrap();
	std::fs::write(dir.path().join("hot.cinfo"), encode_cinfo(64, 10, 0, 0)).unwrap();

	let oss = LocalOss::new(dir.path());
	let config = age_only_config(dir.path(), 50);
	let registry = InMemoryActiveRegistry::new();
	registry.mark_active("hot");
	let mut driver = PurgeDriver::new(config, &oss, FixedWidthCinfoReader, registry).unwrap();
	let tree = DirState::new();
	let queues = EventQueues::new();

	let stats = driver.run_cycle(&tree, &queues, 0, 10_000).unwrap();

	assert_eq!(stats.files_removed, 0);
	assert_eq!(stats.files_skipped_active, 1);
	assert!(dir.path().join("hot").exists());
}

/// S5 — a truncated/unparseable cinfo sidecar is treated as inconsistent:
/// both halves are unlinked as a repair, and it never becomes a counted
/// removal (it doesn't go through the candidate map at all).
#[test]
fn malformed_cinfo_is_repaired_as_an_orphan_pair() {
	let dir = tempfile::tempdir().unwrap();
	std::fs::write(dir.path().join("broken"), vec![0u8; 64]).unwrap();
	std::fs::write(dir.path().join("broken.cinfo"), vec![0u8; 2]).unwrap();

	let oss = LocalOss::new(dir.path());
	let config = age_only_config(dir.path(), 50);
	let mut driver = PurgeDriver::new(config, &oss, FixedWidthCinfoReader, EmptyActiveRegistry).unwrap();
	let tree = DirState::new();
	let queues = EventQueues::new();

	let stats = driver.run_cycle(&tree, &queues, 0, 10_000).unwrap();

	assert_eq!(stats.files_removed, 0);
	assert!(!dir.path().join("broken").exists());
	assert!(!dir.path().join("broken.cinfo").exists());
}
