// Copyright (c) 2022 Papoo Software & Media GmbH <info@papoo.de>
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Typed configuration for the monitor and purge driver.
//!
//! Assembled from CLI [`Args`](crate::cmdargs::Args) plus defaults, the way
//! the teacher's `config::Config` is, and additionally loadable from a TOML
//! file for deployments where flags alone are unwieldy.

use crate::cmdargs::Args;
use crate::job_count::JobCount;
use crate::size_spec::SizeSpec;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

fn default_data_space_name() -> String {
	"default".to_string()
}

fn default_heartbeat_interval() -> u64 {
	10
}

fn default_stats_propagation_interval() -> u64 {
	60
}

fn default_dir_stats_store_depth() -> u32 {
	u32::MAX
}

fn default_purge_interval() -> u64 {
	60
}

fn default_purge_age_based_period() -> u64 {
	60
}

fn default_true() -> bool {
	true
}

/// All tunables consumed by [`crate::monitor::ResourceMonitor`] and
/// [`crate::purge_driver::PurgeDriver`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
	/// Root directory of the cached namespace.
	pub data_path: PathBuf,

	/// High/low water marks on disk usage, triggering and terminating a purge cycle.
	pub disk_hwm: SizeSpec,
	pub disk_lwm: SizeSpec,

	/// Optional file-usage policy thresholds; `None` disables the policy entirely.
	#[serde(default)]
	pub file_usage_baseline: Option<SizeSpec>,
	#[serde(default)]
	pub file_usage_nominal: Option<SizeSpec>,
	#[serde(default)]
	pub file_usage_max: Option<SizeSpec>,

	#[serde(default = "default_purge_interval")]
	pub purge_interval_seconds: u64,
	/// Number of purge intervals between age-based purge passes.
	#[serde(default = "default_purge_age_based_period")]
	pub purge_age_based_period: u64,

	/// Cold-file cutoff age in seconds; `None` disables the age policy.
	#[serde(default)]
	pub purge_cold_files_age: Option<u64>,
	/// UV-keep window in seconds; `None` disables the checksum-age policy.
	#[serde(default)]
	pub cs_uv_keep: Option<u64>,

	#[serde(default = "default_dir_stats_store_depth")]
	pub dir_stats_store_depth: u32,
	#[serde(default = "default_true")]
	pub dir_stat_reporting_on: bool,

	#[serde(default = "default_data_space_name")]
	pub data_space_name: String,

	#[serde(default = "default_heartbeat_interval")]
	pub heartbeat_interval_seconds: u64,
	#[serde(default = "default_stats_propagation_interval")]
	pub stats_propagation_interval_seconds: u64,

	#[serde(default)]
	pub quota_pin_config: Option<PathBuf>,
	#[serde(default)]
	pub snapshot_path: Option<PathBuf>,

	#[serde(default)]
	pub jobs: JobCount,
}

/// Errors building or loading a [`Config`].
#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("could not read config file {path:?}: {source}")]
	Read { path: PathBuf, source: std::io::Error },
	#[error("could not parse config file {path:?}: {source}")]
	Parse { path: PathBuf, source: toml::de::Error },
}

impl Config {
	/// Builds a `Config` directly from parsed CLI arguments and built-in
	/// defaults, with no file on disk.
	pub fn from_args(args: &Args) -> Self {
		Self {
			data_path: args.path.clone(),
			disk_hwm: args.disk_hwm,
			disk_lwm: args.disk_lwm,
			file_usage_baseline: args.file_usage_baseline,
			file_usage_nominal: args.file_usage_nominal,
			file_usage_max: args.file_usage_max,
			purge_interval_seconds: args.purge_interval_seconds,
			purge_age_based_period: default_purge_age_based_period(),
			purge_cold_files_age: args.purge_cold_files_age,
			cs_uv_keep: args.cs_uv_keep,
			dir_stats_store_depth: default_dir_stats_store_depth(),
			dir_stat_reporting_on: true,
			data_space_name: default_data_space_name(),
			heartbeat_interval_seconds: default_heartbeat_interval(),
			stats_propagation_interval_seconds: default_stats_propagation_interval(),
			quota_pin_config: args.quota_pin_config.clone(),
			snapshot_path: args.snapshot_path.clone(),
			jobs: args.jobs,
		}
	}

	/// Loads a TOML config file, then overlays any explicitly-passed CLI
	/// flags on top (CLI wins).
	pub fn load(path: &std::path::Path, args: &Args) -> Result<Self, ConfigError> {
		let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
			path: path.to_path_buf(),
			source,
		})?;
		let mut config: Config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
			path: path.to_path_buf(),
			source,
		})?;
		config.data_path = args.path.clone();
		Ok(config)
	}

	/// Number of purge workers to run in parallel, resolving `auto` against
	/// the host's CPU count the way the teacher resolves `jobs`.
	pub fn resolved_jobs(&self) -> usize {
		self.jobs.unwrap_or_else(|| std::cmp::max(1, num_cpus::get() / 2))
	}
}
