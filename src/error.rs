// Copyright (c) 2022 Papoo Software & Media GmbH <info@papoo.de>
// SPDX-License-Identifier: LGPL-3.0-or-later

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while running the monitor heartbeat or a purge cycle.
///
/// Most variants are recoverable: the caller warns and continues. Only
/// [`MonitorError::TraversalRootUnavailable`] aborts the current cycle.
#[derive(Error, Debug)]
pub enum MonitorError {
	/// The namespace root could not be opened. Aborts the current cycle;
	/// fatal if raised during the initial scan.
	#[error("cannot open traversal root {path:?}: {source}")]
	TraversalRootUnavailable { path: PathBuf, source: io::Error },

	/// A subdirectory could not be opened while descending. The subtree is
	/// skipped but the traversal otherwise continues.
	#[error("cannot open subdirectory {path:?}: {source}")]
	SubdirOpenFailure { path: PathBuf, source: io::Error },

	/// A cinfo file could not be parsed. Both peers are unlinked as a
	/// consistency repair; this is not treated as fatal.
	#[error("cannot read cinfo {path:?}: {source}")]
	CinfoReadFailure { path: PathBuf, source: CinfoError },

	/// A purge-by-path event referenced a directory never seen by the tree.
	#[error("purge event for unknown directory {path:?}")]
	DirStateNotFound { path: String },

	/// Unlinking a candidate failed. Logged and left for the next cycle.
	#[error("failed to unlink {path:?}: {source}")]
	UnlinkFailure { path: PathBuf, source: io::Error },

	/// The quota plugin's configuration file is missing.
	#[error("quota config file {path:?} not found: {source}")]
	QuotaConfigMissing { path: PathBuf, source: io::Error },

	/// A line in the quota plugin's configuration file could not be parsed.
	#[error("malformed quota directive on line {line}: {text:?}")]
	QuotaConfigMalformed { line: usize, text: String },

	/// Generic I/O failure not otherwise classified above.
	#[error(transparent)]
	Io(#[from] io::Error),
}

/// Errors raised while parsing a cinfo sidecar file.
#[derive(Error, Debug)]
pub enum CinfoError {
	#[error("cinfo file too short: expected {expected} bytes, got {actual}")]
	Truncated { expected: usize, actual: usize },
	#[error("unknown cinfo record version `{0}`")]
	UnknownVersion(u32),
	#[error(transparent)]
	Io(#[from] io::Error),
}
