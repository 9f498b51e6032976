// Copyright (c) 2022 Papoo Software & Media GmbH <info@papoo.de>
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Resource-monitoring and purge core for a proxy file cache.
//!
//! Keeps a live, hierarchical accounting of per-directory usage and access
//! statistics (see [`dir_state`]), refreshed from a stream of open/update/
//! close/purge events (see [`event_queue`]) posted by client-serving
//! threads. On a schedule, [`purge_driver`] decides how much data is over
//! budget across several cooperating policies (disk high-water, file
//! high-water, age, checksum-age) and removes the coldest candidates found
//! by a namespace traversal, honoring per-subtree quotas ([`purge_pin`])
//! and protecting files currently in use ([`active_registry`]).

#[macro_use]
extern crate tracing;

mod active_registry;
mod cinfo;
mod cmdargs;
mod config;
mod dir_state;
mod dir_stats;
mod error;
mod event_queue;
mod fpurge_state;
mod fs_traversal;
mod job_count;
mod monitor;
mod oss;
mod purge_driver;
mod purge_pin;
mod size_spec;
mod snapshot;
mod stats;

pub use active_registry::{ActiveRegistry, EmptyActiveRegistry, InMemoryActiveRegistry};
pub use cinfo::{CinfoData, CinfoReader, ChecksumState, FixedWidthCinfoReader, CINFO_SUFFIX};
pub use cmdargs::Args;
pub use config::{Config, ConfigError};
pub use dir_state::{DirNode, DirNodeId, DirState, ROOT};
pub use dir_stats::{DirStats, DirUsage};
pub use error::{CinfoError, MonitorError};
pub use event_queue::EventQueues;
pub use fpurge_state::{Classification, FPurgeState, PurgeCandidate};
pub use fs_traversal::FsTraversal;
pub use job_count::JobCount;
pub use monitor::ResourceMonitor;
pub use oss::{DirEntryInfo, FileStat, LocalOss, Oss, SpaceInfo};
pub use purge_driver::PurgeDriver;
pub use purge_pin::{DirInfo, PurgePin};
pub use size_spec::SizeSpec;
pub use snapshot::{DirStateElement, DirStateSnapshot};
pub use stats::CycleStats;
