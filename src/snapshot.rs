// Copyright (c) 2022 Papoo Software & Media GmbH <info@papoo.de>
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Flattening the [`DirState`] tree for JSON and binary export.

use crate::dir_state::{DirNodeId, DirState, ROOT};
use crate::dir_stats::{DirStats, DirUsage};
use serde::{Deserialize, Serialize};
use std::io;

const BINARY_MAGIC: &[u8; 4] = b"DFSS";
const BINARY_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirStateElement {
	pub m_dir_name: String,
	pub m_here_stats: DirStats,
	pub m_recursive_subdir_stats: DirStats,
	pub m_here_usage: DirUsage,
	pub m_recursive_subdir_usage: DirUsage,
	pub m_parent: i64,
	pub m_daughters_begin: i64,
	pub m_daughters_end: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirStateSnapshot {
	pub usage_update_time: i64,
	pub stats_reset_time: i64,
	pub dir_states: Vec<DirStateElement>,
}

#[derive(Serialize, Deserialize)]
struct SnapshotFile {
	dirstate_snapshot: DirStateSnapshot,
}

impl DirStateSnapshot {
	/// Flattens `tree` depth-first: the root is pushed first, then for each
	/// node its children are appended as one contiguous block (recording
	/// `[begin, end)` on the parent), and finally each child is recursed
	/// into in turn.
	pub fn from_tree(tree: &DirState, max_depth: u32) -> Self {
		let mut dir_states = vec![element_of(tree, ROOT, -1)];
		populate(tree, ROOT, 0, max_depth, &mut dir_states);
		Self {
			usage_update_time: tree.usage_update_time,
			stats_reset_time: tree.stats_reset_time,
			dir_states,
		}
	}

	/// Rebuilds a logically-equivalent [`DirState`] tree from the flattened form.
	pub fn to_tree(&self) -> DirState {
		let mut tree = DirState::new();
		if self.dir_states.is_empty() {
			return tree;
		}
		apply_element(&mut tree, &self.dir_states, 0, crate::dir_state::ROOT);
		tree.usage_update_time = self.usage_update_time;
		tree.stats_reset_time = self.stats_reset_time;
		tree
	}

	pub fn to_json(&self) -> serde_json::Result<String> {
		serde_json::to_string_pretty(&SnapshotFile {
			dirstate_snapshot: self.clone(),
		})
	}

	pub fn from_json(s: &str) -> serde_json::Result<Self> {
		let file: SnapshotFile = serde_json::from_str(s)?;
		Ok(file.dirstate_snapshot)
	}

	/// Length-prefixed bincode encoding, with a small magic/version header.
	pub fn to_binary(&self) -> Result<Vec<u8>, bincode::Error> {
		let body = bincode::serialize(self)?;
		let mut out = Vec::with_capacity(body.len() + 12);
		out.extend_from_slice(BINARY_MAGIC);
		out.extend_from_slice(&BINARY_VERSION.to_le_bytes());
		out.extend_from_slice(&(body.len() as u64).to_le_bytes());
		out.extend_from_slice(&body);
		Ok(out)
	}

	pub fn from_binary(bytes: &[u8]) -> io::Result<Self> {
		if bytes.len() < 16 || &bytes[0..4] != BINARY_MAGIC {
			return Err(io::Error::new(io::ErrorKind::InvalidData, "bad snapshot magic"));
		}
		let version = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
		if version != BINARY_VERSION {
			return Err(io::Error::new(io::ErrorKind::InvalidData, "unsupported snapshot version"));
		}
		let len = u64::from_le_bytes(bytes[8..16].try_into().unwrap()) as usize;
		let body = bytes.get(16..16 + len).ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "truncated snapshot body"))?;
		bincode::deserialize(body).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
	}
}

fn element_of(tree: &DirState, id: DirNodeId, parent: i64) -> DirStateElement {
	let node = tree.node(id);
	DirStateElement {
		m_dir_name: node.name.clone(),
		m_here_stats: node.here_stats,
		m_recursive_subdir_stats: node.subdir_stats,
		m_here_usage: node.here_usage,
		m_recursive_subdir_usage: node.subdir_usage,
		m_parent: parent,
		m_daughters_begin: -1,
		m_daughters_end: -1,
	}
}

fn populate(tree: &DirState, node_id: DirNodeId, elem_idx: usize, max_depth: u32, out: &mut Vec<DirStateElement>) {
	if tree.node(node_id).depth >= max_depth {
		return;
	}
	let children: Vec<DirNodeId> = tree.node(node_id).children.values().copied().collect();
	if children.is_empty() {
		return;
	}

	let begin = out.len();
	let mut child_elem_indices = Vec::with_capacity(children.len());
	for &child_id in &children {
		out.push(element_of(tree, child_id, elem_idx as i64));
		child_elem_indices.push(out.len() - 1);
	}
	let end = out.len();
	out[elem_idx].m_daughters_begin = begin as i64;
	out[elem_idx].m_daughters_end = end as i64;

	for (&child_id, child_idx) in children.iter().zip(child_elem_indices) {
		populate(tree, child_id, child_idx, max_depth, out);
	}
}

fn apply_element(tree: &mut DirState, elements: &[DirStateElement], elem_idx: usize, node_id: DirNodeId) {
	let elem = &elements[elem_idx];
	{
		let node = tree.node_mut(node_id);
		node.here_stats = elem.m_here_stats;
		node.subdir_stats = elem.m_recursive_subdir_stats;
		node.here_usage = elem.m_here_usage;
		node.subdir_usage = elem.m_recursive_subdir_usage;
	}
	if elem.m_daughters_begin < 0 || elem.m_daughters_end < 0 {
		return;
	}
	for i in elem.m_daughters_begin as usize..elem.m_daughters_end as usize {
		let child_elem = &elements[i];
		let child_id = tree.find_dir(node_id, &child_elem.m_dir_name, true).expect("just created");
		apply_element(tree, elements, i, child_id);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample_tree() -> DirState {
		let mut tree = DirState::new();
		let (a, _) = tree.find_path("a", None, true);
		let (b, _) = tree.find_path("a/b", None, true);
		let (c, _) = tree.find_path("c", None, true);
		tree.node_mut(a.unwrap()).here_usage.bytes_on_disk = 10;
		tree.node_mut(b.unwrap()).here_usage.bytes_on_disk = 20;
		tree.node_mut(c.unwrap()).here_usage.bytes_on_disk = 30;
		tree
	}

	#[test]
	fn root_is_entry_zero_with_parent_negative_one() {
		let tree = sample_tree();
		let snap = DirStateSnapshot::from_tree(&tree, 10);
		assert_eq!(snap.dir_states[0].m_parent, -1);
		assert_eq!(snap.dir_states[0].m_dir_name, "");
	}

	#[test]
	fn leaves_have_empty_daughter_range() {
		let tree = sample_tree();
		let snap = DirStateSnapshot::from_tree(&tree, 10);
		let b = snap.dir_states.iter().find(|e| e.m_dir_name == "b").unwrap();
		assert_eq!(b.m_daughters_begin, -1);
		assert_eq!(b.m_daughters_end, -1);
	}

	#[test]
	fn max_depth_truncates_export() {
		let tree = sample_tree();
		let snap = DirStateSnapshot::from_tree(&tree, 1);
		assert!(snap.dir_states.iter().all(|e| e.m_dir_name != "b"));
	}

	#[test]
	fn json_roundtrip_preserves_structure() {
		let tree = sample_tree();
		let snap = DirStateSnapshot::from_tree(&tree, 10);
		let json = snap.to_json().unwrap();
		let back = DirStateSnapshot::from_json(&json).unwrap();
		assert_eq!(snap, back);
	}

	#[test]
	fn binary_roundtrip_preserves_structure() {
		let tree = sample_tree();
		let snap = DirStateSnapshot::from_tree(&tree, 10);
		let bytes = snap.to_binary().unwrap();
		let back = DirStateSnapshot::from_binary(&bytes).unwrap();
		assert_eq!(snap, back);
	}

	#[test]
	fn tree_roundtrip_preserves_names_and_counters() {
		let tree = sample_tree();
		let snap = DirStateSnapshot::from_tree(&tree, 10);
		let rebuilt = snap.to_tree();
		let (a, _) = (rebuilt.find_path_ro("a"), ());
		let node = rebuilt.node(a.unwrap());
		assert_eq!(node.here_usage.bytes_on_disk, 10);
		let b = rebuilt.find_path_ro("a/b").unwrap();
		assert_eq!(rebuilt.node(b).here_usage.bytes_on_disk, 20);
	}
}
