// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Retention policies
//!
//! A policy decides which recorded versions survive a garbage collection
//! run. Every other version is dropped: its roots index entry is removed and
//! the nodes only it could reach are reclaimed.
//!
//! The latest recorded version is always retained, whatever the policy says,
//! because the next commit builds on it.
//!
//! Policies parse from the short forms used on the command line:
//!
//! ```text
//! latest:10          keep the 10 most recent versions
//! versions:1,5,9     keep exactly these versions
//! range:100-200      keep versions 100..=200
//! ```

use crate::error::{TrieError, TrieResult};
use crate::path::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Which versions a GC run keeps
///
/// Every policy also keeps the highest recorded version, even when
/// `KeepVersions` or `KeepRange` leave it out, so the tree the next commit
/// builds on is never collected. The dropped set is every recorded version
/// outside [`RetentionPolicy::retained`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Keep the N most recent versions
    KeepLatest(usize),
    /// Keep an explicit set of versions, plus the latest
    KeepVersions(BTreeSet<Version>),
    /// Keep every version in `from..=to`, plus the latest
    KeepRange { from: Version, to: Version },
}

impl RetentionPolicy {
    /// Keep the `count` most recent versions
    ///
    /// # Errors
    ///
    /// [`TrieError::Configuration`] if `count` is zero
    pub fn keep_latest(count: usize) -> TrieResult<Self> {
        let policy = RetentionPolicy::KeepLatest(count);
        policy.validate()?;
        Ok(policy)
    }

    /// Keep exactly `versions`
    ///
    /// # Errors
    ///
    /// [`TrieError::Configuration`] if the set is empty
    pub fn keep_versions(versions: impl IntoIterator<Item = Version>) -> TrieResult<Self> {
        let policy = RetentionPolicy::KeepVersions(versions.into_iter().collect());
        policy.validate()?;
        Ok(policy)
    }

    /// Keep every version in `from..=to`
    ///
    /// # Errors
    ///
    /// [`TrieError::Configuration`] if `from > to`
    pub fn keep_range(from: Version, to: Version) -> TrieResult<Self> {
        let policy = RetentionPolicy::KeepRange { from, to };
        policy.validate()?;
        Ok(policy)
    }

    /// Check the policy parameters
    pub fn validate(&self) -> TrieResult<()> {
        match self {
            RetentionPolicy::KeepLatest(0) => Err(TrieError::Configuration("keep-latest count must be at least 1".to_string())),
            RetentionPolicy::KeepVersions(versions) if versions.is_empty() => {
                Err(TrieError::Configuration("keep-versions set must not be empty".to_string()))
            }
            RetentionPolicy::KeepRange { from, to } if from > to => {
                Err(TrieError::Configuration(format!("keep-range start {from} is after its end {to}")))
            }
            _ => Ok(()),
        }
    }

    /// Versions to retain out of `recorded`
    ///
    /// The result is a subset of `recorded` and always contains its maximum.
    pub fn retained(&self, recorded: &BTreeSet<Version>) -> BTreeSet<Version> {
        let mut retained: BTreeSet<Version> = match self {
            RetentionPolicy::KeepLatest(count) => recorded.iter().rev().take(*count).copied().collect(),
            RetentionPolicy::KeepVersions(versions) => recorded.intersection(versions).copied().collect(),
            RetentionPolicy::KeepRange { from, to } if from <= to => recorded.range(*from..=*to).copied().collect(),
            RetentionPolicy::KeepRange { .. } => BTreeSet::new(),
        };
        if let Some(latest) = recorded.last() {
            retained.insert(*latest);
        }
        retained
    }

    /// Versions to drop out of `recorded`
    pub fn dropped(&self, recorded: &BTreeSet<Version>) -> BTreeSet<Version> {
        let retained = self.retained(recorded);
        recorded.difference(&retained).copied().collect()
    }
}

impl fmt::Display for RetentionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetentionPolicy::KeepLatest(count) => write!(f, "latest:{count}"),
            RetentionPolicy::KeepVersions(versions) => {
                let list: Vec<String> = versions.iter().map(Version::to_string).collect();
                write!(f, "versions:{}", list.join(","))
            }
            RetentionPolicy::KeepRange { from, to } => write!(f, "range:{from}-{to}"),
        }
    }
}

fn parse_version(raw: &str) -> TrieResult<Version> {
    raw.trim()
        .parse()
        .map_err(|_| TrieError::Configuration(format!("invalid version '{raw}'")))
}

impl FromStr for RetentionPolicy {
    type Err = TrieError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, args) = s
            .split_once(':')
            .ok_or_else(|| TrieError::Configuration(format!("retention policy '{s}' must look like kind:args")))?;
        match kind {
            "latest" => {
                let count = args
                    .trim()
                    .parse()
                    .map_err(|_| TrieError::Configuration(format!("invalid keep-latest count '{args}'")))?;
                Self::keep_latest(count)
            }
            "versions" => Self::keep_versions(args.split(',').map(parse_version).collect::<TrieResult<Vec<_>>>()?),
            "range" => {
                let (from, to) = args
                    .split_once('-')
                    .ok_or_else(|| TrieError::Configuration(format!("range '{args}' must look like from-to")))?;
                Self::keep_range(parse_version(from)?, parse_version(to)?)
            }
            other => Err(TrieError::Configuration(format!("unknown retention policy '{other}'"))),
        }
    }
}
