// Copyright (c) 2022 Papoo Software & Media GmbH <info@papoo.de>
// SPDX-License-Identifier: LGPL-3.0-or-later

use crate::job_count::JobCount;
use crate::size_spec::SizeSpec;
use clap::Parser;
use std::path::PathBuf;

/// Resource-monitoring and purge daemon for a proxy file cache.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
	/// Root directory of the cached namespace.
	#[clap(short, long)]
	pub path: PathBuf,

	/// Disk high-water mark. Attach 'K', 'M', 'G', 'T' or '%' for an
	/// absolute size or a percentage of total disk size.
	#[clap(long, value_name = "BYTES|PERCENT", default_value_t = SizeSpec::Percentage(90.0))]
	pub disk_hwm: SizeSpec,

	/// Disk low-water mark, same notation as `--disk-hwm`.
	#[clap(long, value_name = "BYTES|PERCENT", default_value_t = SizeSpec::Percentage(80.0))]
	pub disk_lwm: SizeSpec,

	/// Baseline file-usage estimate; enables the file-usage purge policy when set.
	#[clap(long, value_name = "BYTES|PERCENT")]
	pub file_usage_baseline: Option<SizeSpec>,

	/// Nominal file-usage target.
	#[clap(long, value_name = "BYTES|PERCENT")]
	pub file_usage_nominal: Option<SizeSpec>,

	/// Maximum tolerated file usage before desperate purging.
	#[clap(long, value_name = "BYTES|PERCENT")]
	pub file_usage_max: Option<SizeSpec>,

	/// Seconds between purge driver invocations.
	#[clap(long, default_value_t = 60)]
	pub purge_interval_seconds: u64,

	/// Cold-file cutoff age in seconds; enables the age-based purge policy when set.
	#[clap(long)]
	pub purge_cold_files_age: Option<u64>,

	/// UV-keep window in seconds; enables the checksum-age purge policy when set.
	#[clap(long)]
	pub cs_uv_keep: Option<u64>,

	/// Path to the quota-pin plugin's directive file.
	#[clap(long)]
	pub quota_pin_config: Option<PathBuf>,

	/// Path to write periodic usage snapshots to.
	#[clap(long)]
	pub snapshot_path: Option<PathBuf>,

	/// Optional TOML config file; CLI flags override its values.
	#[clap(long)]
	pub config_file: Option<PathBuf>,

	/// Jobs to run simultaneously for the initial scan. ('auto' selects based on available CPUs)
	#[clap(short, long, default_value_t = JobCount::Auto)]
	pub jobs: JobCount,

	/// Increase verbosity.
	#[clap(short, long, action = clap::ArgAction::Count)]
	pub verbose: u8,
}
