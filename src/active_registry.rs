// Copyright (c) 2022 Papoo Software & Media GmbH <info@papoo.de>
// SPDX-License-Identifier: LGPL-3.0-or-later

//! The active-file registry boundary.
//!
//! Out-of-scope collaborator per the core's contract: owned by the
//! containing cache, accessed read-only here. A file currently open for
//! reading or writing, or otherwise protected from eviction (e.g. mid
//! checksum verification), must never be unlinked by a purge cycle even if
//! it sorts first in the candidate map.

use std::collections::HashSet;
use std::sync::Mutex;

/// Read-only query surface the purge driver consumes before unlinking a
/// candidate.
pub trait ActiveRegistry: Send + Sync {
	/// True if `data_path` (the cinfo-stripped path) must not be purged.
	fn is_active_or_protected(&self, data_path: &str) -> bool;
}

/// A registry that never protects anything, for tests and standalone runs
/// with no surrounding cache.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyActiveRegistry;

impl ActiveRegistry for EmptyActiveRegistry {
	fn is_active_or_protected(&self, _data_path: &str) -> bool {
		false
	}
}

/// A simple synchronized set, standing in for the cache's real registry in
/// tests that need to exercise the active-file skip path.
#[derive(Debug, Default)]
pub struct InMemoryActiveRegistry {
	active: Mutex<HashSet<String>>,
}

impl InMemoryActiveRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn mark_active(&self, data_path: impl Into<String>) {
		self.active.lock().unwrap().insert(data_path.into());
	}

	pub fn clear_active(&self, data_path: &str) {
		self.active.lock().unwrap().remove(data_path);
	}
}

impl ActiveRegistry for InMemoryActiveRegistry {
	fn is_active_or_protected(&self, data_path: &str) -> bool {
		self.active.lock().unwrap().contains(data_path)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_registry_protects_nothing() {
		assert!(!EmptyActiveRegistry.is_active_or_protected("a/b"));
	}

	#[test]
	fn marked_paths_are_protected_until_cleared() {
		let registry = InMemoryActiveRegistry::new();
		registry.mark_active("a/b");
		assert!(registry.is_active_or_protected("a/b"));
		registry.clear_active("a/b");
		assert!(!registry.is_active_or_protected("a/b"));
	}
}
