// Copyright (c) 2022 Papoo Software & Media GmbH <info@papoo.de>
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Cinfo sidecar parsing.
//!
//! The cinfo reader/writer is an out-of-scope collaborator per the core's
//! contract; this module only consumes it. [`FixedWidthCinfoReader`] parses
//! a small fixed-layout binary record (version tag, downloaded-byte count,
//! detach time, checksum-state bitmask, no-checksum-since timestamp), the
//! same fixed-buffer-and-`from_ne_bytes` technique the teacher's
//! `apache_cache::parse` uses for Apache's own header format, generalized
//! from one record shape to this one.

use crate::error::CinfoError;
use std::mem::size_of;

pub const CINFO_SUFFIX: &str = ".cinfo";

const RECORD_VERSION: u32 = 1;
const RECORD_LEN: usize = size_of::<u32>() + size_of::<u64>() * 3 + size_of::<u32>();

/// Bitmask of checksum completeness. A file with any bit set in
/// `missing_mask` has not yet had its checksum fully verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChecksumState {
	pub missing_mask: u32,
}

impl ChecksumState {
	#[inline]
	pub fn has_missing_bits(&self) -> bool {
		self.missing_mask != 0
	}
}

/// Fields consumed from a cinfo sidecar file by the purge core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CinfoData {
	pub downloaded_bytes: u64,
	/// Access time recorded at last detach, if the writer populated it.
	pub latest_detach_time: Option<i64>,
	pub checksum_state: ChecksumState,
	/// Epoch seconds since the file stopped gaining checksum coverage;
	/// compared against `cs_uv_keep` to classify UV-keep-expired files.
	pub no_checksum_time_for_uvkeep: i64,
}

/// Parses cinfo records out of raw bytes.
pub trait CinfoReader {
	fn parse(&self, bytes: &[u8]) -> Result<CinfoData, CinfoError>;
}

/// Reads the fixed binary layout described above.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedWidthCinfoReader;

impl CinfoReader for FixedWidthCinfoReader {
	fn parse(&self, bytes: &[u8]) -> Result<CinfoData, CinfoError> {
		if bytes.len() < RECORD_LEN {
			return Err(CinfoError::Truncated {
				expected: RECORD_LEN,
				actual: bytes.len(),
			});
		}

		let mut offset = 0;
		let version = read_u32(bytes, &mut offset);
		if version != RECORD_VERSION {
			return Err(CinfoError::UnknownVersion(version));
		}

		let downloaded_bytes = read_u64(bytes, &mut offset);
		let detach_time_raw = read_u64(bytes, &mut offset) as i64;
		let no_checksum_time_for_uvkeep = read_u64(bytes, &mut offset) as i64;
		let missing_mask = read_u32(bytes, &mut offset);

		Ok(CinfoData {
			downloaded_bytes,
			latest_detach_time: if detach_time_raw > 0 { Some(detach_time_raw) } else { None },
			checksum_state: ChecksumState { missing_mask },
			no_checksum_time_for_uvkeep,
		})
	}
}

#[inline]
fn read_u32(bytes: &[u8], offset: &mut usize) -> u32 {
	let v = u32::from_ne_bytes(bytes[*offset..*offset + 4].try_into().unwrap());
	*offset += 4;
	v
}

#[inline]
fn read_u64(bytes: &[u8], offset: &mut usize) -> u64 {
	let v = u64::from_ne_bytes(bytes[*offset..*offset + 8].try_into().unwrap());
	*offset += 8;
	v
}

/// Serializes a [`CinfoData`] into the fixed layout, for test fixtures.
#[cfg(test)]
pub fn encode(data: &CinfoData) -> Vec<u8> {
	let mut out = Vec::with_capacity(RECORD_LEN);
	out.extend_from_slice(&RECORD_VERSION.to_ne_bytes());
	out.extend_from_slice(&data.downloaded_bytes.to_ne_bytes());
	out.extend_from_slice(&(data.latest_detach_time.unwrap_or(0) as u64).to_ne_bytes());
	out.extend_from_slice(&(data.no_checksum_time_for_uvkeep as u64).to_ne_bytes());
	out.extend_from_slice(&data.checksum_state.missing_mask.to_ne_bytes());
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn roundtrips_a_record() {
		let data = CinfoData {
			downloaded_bytes: 4096,
			latest_detach_time: Some(12345),
			checksum_state: ChecksumState { missing_mask: 0 },
			no_checksum_time_for_uvkeep: 0,
		};
		let bytes = encode(&data);
		let parsed = FixedWidthCinfoReader.parse(&bytes).unwrap();
		assert_eq!(parsed, data);
	}

	#[test]
	fn zero_detach_time_is_none() {
		let data = CinfoData {
			downloaded_bytes: 10,
			latest_detach_time: None,
			checksum_state: ChecksumState { missing_mask: 0b11 },
			no_checksum_time_for_uvkeep: 500,
		};
		let bytes = encode(&data);
		let parsed = FixedWidthCinfoReader.parse(&bytes).unwrap();
		assert_eq!(parsed.latest_detach_time, None);
		assert!(parsed.checksum_state.has_missing_bits());
	}

	#[test]
	fn rejects_truncated_record() {
		let err = FixedWidthCinfoReader.parse(&[0u8; 4]).unwrap_err();
		assert!(matches!(err, CinfoError::Truncated { .. }));
	}

	#[test]
	fn rejects_unknown_version() {
		let mut bytes = encode(&CinfoData {
			downloaded_bytes: 0,
			latest_detach_time: None,
			checksum_state: ChecksumState::default(),
			no_checksum_time_for_uvkeep: 0,
		});
		bytes[0..4].copy_from_slice(&99u32.to_ne_bytes());
		let err = FixedWidthCinfoReader.parse(&bytes).unwrap_err();
		assert!(matches!(err, CinfoError::UnknownVersion(99)));
	}
}
