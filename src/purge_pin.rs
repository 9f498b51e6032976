// Copyright (c) 2022 Papoo Software & Media GmbH <info@papoo.de>
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Per-subtree quota enforcement.
//!
//! `PurgePin` is a pluggable collaborator: it knows nothing about the
//! traversal or candidate collection itself, only which subtrees have a
//! configured quota and how far over budget each currently is.

use crate::dir_state::{DirNodeId, DirState};
use crate::error::MonitorError;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
struct QuotaEntry {
	path: String,
	quota_bytes: u64,
}

/// One resolved quota subtree, reported by `ref_dir_infos`.
#[derive(Debug, Clone, Copy)]
pub struct DirInfo {
	pub dir_node: DirNodeId,
	pub quota_bytes: u64,
	pub bytes_to_recover: u64,
}

/// Tracks configured `<path> <quota>` directives and, each cycle, how many
/// bytes each subtree is over its quota.
#[derive(Default)]
pub struct PurgePin {
	entries: Vec<QuotaEntry>,
}

impl PurgePin {
	pub fn new() -> Self {
		Self::default()
	}

	/// Loads directives from a config file, one `<path> <size>` per line.
	/// Blank lines and `#`-prefixed lines are skipped. A malformed line is
	/// warned and skipped rather than failing the whole load.
	pub fn configure(&mut self, config_path: &Path) -> Result<(), MonitorError> {
		let text = fs::read_to_string(config_path).map_err(|source| MonitorError::QuotaConfigMissing {
			path: config_path.to_path_buf(),
			source,
		})?;

		let mut entries = Vec::new();
		for (line_no, line) in text.lines().enumerate() {
			let line = line.trim();
			if line.is_empty() || line.starts_with('#') {
				continue;
			}
			match parse_directive(line) {
				Some(entry) => entries.push(entry),
				None => {
					let err = MonitorError::QuotaConfigMalformed {
						line: line_no + 1,
						text: line.to_string(),
					};
					tracing::warn!(%err, "skipping quota-pin directive");
				}
			}
		}
		self.entries = entries;
		Ok(())
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Resolves each configured path against `tree` and returns the total
	/// bytes over quota across all subtrees. Paths the tree hasn't seen yet
	/// contribute zero rather than failing the whole computation.
	pub fn get_bytes_to_recover(&self, tree: &DirState) -> u64 {
		self.ref_dir_infos(tree).iter().map(|info| info.bytes_to_recover).sum()
	}

	/// Per-entry detail: resolved node, configured quota, and bytes over
	/// budget, for the driver to splice a quota-scoped `FPurgeState` per entry.
	pub fn ref_dir_infos(&self, tree: &DirState) -> Vec<DirInfo> {
		self.entries
			.iter()
			.filter_map(|entry| {
				let dir_node = tree.find_path_ro(&entry.path)?;
				let node = tree.node(dir_node);
				let used = node.subdir_usage.bytes_on_disk as u64 + node.here_usage.bytes_on_disk as u64;
				let bytes_to_recover = used.saturating_sub(entry.quota_bytes);
				Some(DirInfo {
					dir_node,
					quota_bytes: entry.quota_bytes,
					bytes_to_recover,
				})
			})
			.collect()
	}
}

fn parse_directive(line: &str) -> Option<QuotaEntry> {
	let mut parts = line.split_whitespace();
	let path = parts.next()?.to_string();
	let size = parts.next()?;
	if parts.next().is_some() {
		return None;
	}
	let quota_bytes = parse_size(size)?;
	Some(QuotaEntry { path, quota_bytes })
}

/// Parses an integer byte count or a number with an alphabetic unit suffix
/// (`k`, `m`, `g`, `t`, case-insensitive, base 1024).
fn parse_size(text: &str) -> Option<u64> {
	let split_at = text.find(|c: char| c.is_alphabetic()).unwrap_or(text.len());
	let (digits, suffix) = text.split_at(split_at);
	let value: u64 = digits.parse().ok()?;
	let multiplier: u64 = match suffix.to_lowercase().as_str() {
		"" => 1,
		"k" => 1024,
		"m" => 1024 * 1024,
		"g" => 1024 * 1024 * 1024,
		"t" => 1024 * 1024 * 1024 * 1024,
		_ => return None,
	};
	value.checked_mul(multiplier)
}
