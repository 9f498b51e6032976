// Copyright (c) 2022 Papoo Software & Media GmbH <info@papoo.de>
// SPDX-License-Identifier: LGPL-3.0-or-later

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::num::{ParseFloatError, ParseIntError};
use std::str::FromStr;
use thiserror::Error;

/// Representation for a user-specified size limit (percentage or absolute)
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizeSpec {
	Percentage(f64),
	Absolute(u64),
}

/// TOML/JSON form is always the same textual notation the CLI accepts
/// (`"500M"`, `"80%"`, ...), so config files and `--flag` values share one
/// grammar.
impl Serialize for SizeSpec {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(self)
	}
}

impl<'de> Deserialize<'de> for SizeSpec {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let s = String::deserialize(deserializer)?;
		s.parse().map_err(D::Error::custom)
	}
}

impl fmt::Display for SizeSpec {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SizeSpec::Percentage(n) => write!(f, "{}%", n),
			SizeSpec::Absolute(n) => {
				let n = *n;
				if n < 1000 {
					write!(f, "{}", n)
				} else if n < 1000000 {
					write!(f, "{}K", (n as f64) / 1000.0)
				} else if n < 1000000000 {
					write!(f, "{}M", (n as f64) / 1000000.0)
				} else if n < 1000000000000 {
					write!(f, "{}G", (n as f64) / 1000000000.0)
				} else {
					write!(f, "{}T", (n as f64) / 1000000000000.0)
				}
			}
		}
	}
}

impl SizeSpec {
	/// Return the absolute value when given the available `total`
	#[inline]
	pub fn value(&self, total: u64) -> u64 {
		match self {
			SizeSpec::Percentage(n) => (*n / 100.0 * (total as f64)) as u64,
			SizeSpec::Absolute(n) => *n,
		}
	}
}

/// Error type for parsing a `SizeSpec`
#[derive(Error, Debug)]
pub enum ParseSizeSpecError {
	#[error("expected a positive numeric value with an optional unit")]
	EmptyString,
	#[error("expected a positive numeric value with an optional unit")]
	InvalidInt(#[from] ParseIntError),
	#[error("expected a positive numeric value with an optional unit")]
	InvalidFloat(#[from] ParseFloatError),
	#[error("`{0}` is not a valid unit. Known units are `K`, `Ki`, `M`, `Mi`, `G`, `Gi`, `T`, `Ti`, `%`.")]
	InvalidUnit(char),
}

/// Parsing a string into a `SizeSpec`
impl FromStr for SizeSpec {
	type Err = ParseSizeSpecError;
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let first_char = s.chars().next().ok_or(ParseSizeSpecError::EmptyString)?;
		let (last_char, forelast_char) = {
			let mut it = s.chars().rev();
			(
				it.next().ok_or(ParseSizeSpecError::EmptyString)?,
				it.next().unwrap_or(' '),
			)
		};

		if first_char == '-' {
			return Err(s.parse::<u64>().unwrap_err().into());
		}

		match (forelast_char, last_char) {
			(_, '0'..='9') => Ok(SizeSpec::Absolute(s.parse::<u64>()?)),
			('K' | 'k', 'i') => Ok(SizeSpec::Absolute(
				(s[..s.len() - 2].parse::<f64>()? * 1024.0) as u64,
			)),
			('M', 'i') => Ok(SizeSpec::Absolute(
				(s[..s.len() - 2].parse::<f64>()? * 1048576.0) as u64,
			)),
			('G', 'i') => Ok(SizeSpec::Absolute(
				(s[..s.len() - 2].parse::<f64>()? * 1073741824.0) as u64,
			)),
			('T', 'i') => Ok(SizeSpec::Absolute(
				(s[..s.len() - 2].parse::<f64>()? * 1099511627776.0) as u64,
			)),
			(_, 'K' | 'k') => Ok(SizeSpec::Absolute(
				(s[..s.len() - 1].parse::<f64>()? * 1000.0) as u64,
			)),
			(_, 'M') => Ok(SizeSpec::Absolute(
				(s[..s.len() - 1].parse::<f64>()? * 1000000.0) as u64,
			)),
			(_, 'G') => Ok(SizeSpec::Absolute(
				(s[..s.len() - 1].parse::<f64>()? * 1000000000.0) as u64,
			)),
			(_, 'T') => Ok(SizeSpec::Absolute(
				(s[..s.len() - 1].parse::<f64>()? * 1000000000000.0) as u64,
			)),
			(_, '%') => Ok(SizeSpec::Percentage(s[..s.len() - 1].parse::<f64>()?)),
			_ => Err(ParseSizeSpecError::InvalidUnit(last_char)),
		}
	}
}
