//! Duplicate detection and keeper selection.
//!
//! - Exact duplicates (same content hash)
//! - Visually similar images (perceptual hash distance)
//! - Choosing which member of a duplicate group is kept

pub mod exact;
pub mod keep_policy;
pub mod similar;

use crate::core::image::ImageRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use exact::{ExactDuplicateIndex, ExactLookup};
pub use keep_policy::{Choice, KeeperResolver};
pub use similar::{GroupError, SimilarCluster, SimilarityGrouper};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateReason {
    Exact,
    Visual,
}

impl DuplicateReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DuplicateReason::Exact => "exact",
            DuplicateReason::Visual => "visual",
        }
    }
}

impl fmt::Display for DuplicateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DuplicateReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(DuplicateReason::Exact),
            "visual" => Ok(DuplicateReason::Visual),
            other => Err(format!("unknown duplicate reason: {other}")),
        }
    }
}

/// Records asserted to be the same photo, with exactly one keeper among them.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateGroup {
    reason: DuplicateReason,
    members: Vec<ImageRecord>,
    keeper: usize,
}

impl DuplicateGroup {
    /// `None` for an empty candidate list; otherwise the resolver picks the keeper.
    pub fn resolve(
        reason: DuplicateReason,
        members: Vec<ImageRecord>,
        resolver: &KeeperResolver,
    ) -> Option<Self> {
        let keeper = resolver.choose(&members)?;
        Some(Self {
            reason,
            members,
            keeper,
        })
    }

    pub fn reason(&self) -> DuplicateReason {
        self.reason
    }

    pub fn keeper(&self) -> &ImageRecord {
        &self.members[self.keeper]
    }

    pub fn members(&self) -> &[ImageRecord] {
        &self.members
    }

    /// Members scheduled for quarantine.
    pub fn non_keepers(&self) -> impl Iterator<Item = &ImageRecord> {
        self.members
            .iter()
            .enumerate()
            .filter(move |(i, _)| *i != self.keeper)
            .map(|(_, record)| record)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
