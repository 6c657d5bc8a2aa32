//! Single-link grouping of records by perceptual signature distance.
//!
//! Each unvisited record, in input order, seeds a cluster and absorbs every
//! later unvisited record within `max_distance` of the seed. Members are only
//! guaranteed to be close to their seed, not to each other: a chain of
//! near-duplicates can end up split across clusters or merged around a seed.
//! That approximation is the grouping rule, not an oversight.

use crate::core::image::ImageRecord;
use crate::core::perceptual::{PerceptualError, PerceptualHash};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GroupError {
    #[error(
        "signature of {path} has {found} bits, expected {expected}: perceptual hash size changed"
    )]
    SignatureLength {
        path: PathBuf,
        expected: u32,
        found: u32,
    },

    #[error(transparent)]
    Distance(#[from] PerceptualError),
}

/// One cluster: the seed first, then members in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarCluster<'a> {
    pub seed: &'a ImageRecord,
    pub members: Vec<&'a ImageRecord>,
    /// Distance of each member to the seed, parallel to `members`.
    pub distances: Vec<u32>,
}

impl SimilarCluster<'_> {
    /// More than the seed alone.
    pub fn has_duplicates(&self) -> bool {
        self.members.len() > 1
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SimilarityGrouper {
    max_distance: u32,
}

impl SimilarityGrouper {
    pub fn new(max_distance: u32) -> Self {
        Self { max_distance }
    }

    pub fn max_distance(&self) -> u32 {
        self.max_distance
    }

    /// Partition the records that carry a signature into clusters.
    ///
    /// Records without a signature are left out. Signature lengths are checked
    /// for the whole set before any comparison; a mismatch is an error.
    pub fn group<'a>(&self, records: &'a [ImageRecord]) -> Result<Vec<SimilarCluster<'a>>, GroupError> {
        let candidates = signed(records);
        check_lengths(&candidates)?;

        let mut visited = vec![false; candidates.len()];
        let mut clusters = Vec::new();

        for i in 0..candidates.len() {
            if visited[i] {
                continue;
            }
            visited[i] = true;
            let (seed, seed_hash) = candidates[i];
            let mut members = vec![seed];
            let mut distances = vec![0];

            for j in (i + 1)..candidates.len() {
                if visited[j] {
                    continue;
                }
                let (other, other_hash) = candidates[j];
                let distance = seed_hash.distance(other_hash)?;
                if distance <= self.max_distance {
                    log::debug!(
                        "{} joins cluster of {} at distance {}",
                        other.path.display(),
                        seed.path.display(),
                        distance
                    );
                    visited[j] = true;
                    members.push(other);
                    distances.push(distance);
                }
            }

            clusters.push(SimilarCluster {
                seed,
                members,
                distances,
            });
        }

        Ok(clusters)
    }

    /// For every record with a signature, its closest other record and their distance.
    /// Records without a signature, or alone in the set, get `None`.
    pub fn nearest<'a>(
        &self,
        records: &'a [ImageRecord],
    ) -> Result<Vec<Option<(u32, &'a ImageRecord)>>, GroupError> {
        let candidates = signed(records);
        check_lengths(&candidates)?;

        records
            .iter()
            .map(|record| {
                let Some(hash) = record.perceptual_hash.as_ref() else {
                    return Ok(None);
                };
                let mut best: Option<(u32, &ImageRecord)> = None;
                for &(other, other_hash) in &candidates {
                    if other.path == record.path {
                        continue;
                    }
                    let distance = hash.distance(other_hash)?;
                    if best.is_none_or(|(d, _)| distance < d) {
                        best = Some((distance, other));
                    }
                }
                Ok(best)
            })
            .collect()
    }
}

fn signed(records: &[ImageRecord]) -> Vec<(&ImageRecord, &PerceptualHash)> {
    records
        .iter()
        .filter_map(|record| record.perceptual_hash.as_ref().map(|hash| (record, hash)))
        .collect()
}

fn check_lengths(candidates: &[(&ImageRecord, &PerceptualHash)]) -> Result<(), GroupError> {
    let Some((_, first)) = candidates.first() else {
        return Ok(());
    };
    let expected = first.bits();
    match candidates.iter().find(|(_, hash)| hash.bits() != expected) {
        Some((record, hash)) => Err(GroupError::SignatureLength {
            path: record.path.clone(),
            expected,
            found: hash.bits(),
        }),
        None => Ok(()),
    }
}
