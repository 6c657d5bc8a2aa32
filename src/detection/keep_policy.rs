use crate::config::KeepPolicy;
use crate::core::image::ImageRecord;
use std::cmp::Ordering;

/// Outcome of comparing an incumbent against a newcomer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Existing,
    Candidate,
}

/// Decides which of several records describing the same photo is authoritative.
#[derive(Debug, Clone, Copy)]
pub struct KeeperResolver {
    policy: KeepPolicy,
}

impl KeeperResolver {
    pub fn new(policy: KeepPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> KeepPolicy {
        self.policy
    }

    /// `existing` is the incumbent (already catalogued, or the current best).
    /// Ties always go to the incumbent.
    pub fn prefer(&self, existing: &ImageRecord, candidate: &ImageRecord) -> Choice {
        match self.policy {
            KeepPolicy::FirstFound => Choice::Existing,
            KeepPolicy::HighestResolution => by_resolution(existing, candidate),
            KeepPolicy::Newest => by_timestamp(existing, candidate, Ordering::Greater),
            KeepPolicy::Oldest => by_timestamp(existing, candidate, Ordering::Less),
        }
    }

    /// Index of the keeper, by a single pass that replaces the current best
    /// whenever the policy prefers the newcomer.
    ///
    /// Order-independent only when the comparison is transitive, which holds
    /// for resolution and for timestamps when every candidate has one.
    pub fn choose(&self, candidates: &[ImageRecord]) -> Option<usize> {
        let mut best = 0;
        for (i, candidate) in candidates.iter().enumerate().skip(1) {
            if self.prefer(&candidates[best], candidate) == Choice::Candidate {
                best = i;
            }
        }
        (!candidates.is_empty()).then_some(best)
    }
}

fn by_resolution(existing: &ImageRecord, candidate: &ImageRecord) -> Choice {
    if candidate.resolution() > existing.resolution() {
        Choice::Candidate
    } else {
        Choice::Existing
    }
}

/// `wanted` is the ordering of candidate vs existing that makes the candidate win.
fn by_timestamp(existing: &ImageRecord, candidate: &ImageRecord, wanted: Ordering) -> Choice {
    match (existing.captured_at, candidate.captured_at) {
        (Some(ex), Some(new)) if new.cmp(&ex) == wanted => Choice::Candidate,
        (Some(_), Some(_)) => Choice::Existing,
        _ => by_resolution(existing, candidate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fingerprint::Fingerprint;
    use crate::core::hash::ContentHash;
    use crate::core::image::ImageMetadata;
    use chrono::{NaiveDate, NaiveDateTime};
    use std::path::Path;

    fn at(year: i32) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(year, 6, 1).and_then(|d| d.and_hms_opt(12, 0, 0))
    }

    fn record(path: &str, dims: (u32, u32), captured_at: Option<NaiveDateTime>) -> ImageRecord {
        let mut metadata = ImageMetadata::bare(Path::new(path), 1);
        metadata.width = Some(dims.0);
        metadata.height = Some(dims.1);
        metadata.captured_at = captured_at;
        ImageRecord::new(
            metadata,
            Fingerprint {
                exact: ContentHash::from_hex("00"),
                perceptual: None,
            },
        )
    }

    #[test]
    fn test_first_found_keeps_existing() {
        let resolver = KeeperResolver::new(KeepPolicy::FirstFound);
        let existing = record("/a.jpg", (10, 10), at(2020));
        let candidate = record("/b.jpg", (4000, 3000), at(2024));
        assert_eq!(resolver.prefer(&existing, &candidate), Choice::Existing);
        assert_eq!(
            resolver.choose(&[existing, candidate]),
            Some(0)
        );
    }

    #[test]
    fn test_highest_resolution() {
        let resolver = KeeperResolver::new(KeepPolicy::HighestResolution);
        let hd = record("/hd.jpg", (1920, 1080), None);
        let big = record("/big.jpg", (4000, 3000), None);

        assert_eq!(resolver.prefer(&hd, &big), Choice::Candidate);
        assert_eq!(resolver.prefer(&big, &hd), Choice::Existing);
        // tie goes to the existing record
        assert_eq!(resolver.prefer(&hd, &hd.clone()), Choice::Existing);
    }

    #[test]
    fn test_newest_and_oldest() {
        let old = record("/old.jpg", (4000, 3000), at(2019));
        let new = record("/new.jpg", (640, 480), at(2023));

        let newest = KeeperResolver::new(KeepPolicy::Newest);
        assert_eq!(newest.prefer(&old, &new), Choice::Candidate);
        assert_eq!(newest.prefer(&new, &old), Choice::Existing);

        let oldest = KeeperResolver::new(KeepPolicy::Oldest);
        assert_eq!(oldest.prefer(&old, &new), Choice::Existing);
        assert_eq!(oldest.prefer(&new, &old), Choice::Candidate);
    }

    #[test]
    fn test_missing_timestamp_falls_back_to_resolution() {
        let dated_small = record("/small.jpg", (640, 480), at(2023));
        let undated_big = record("/big.jpg", (4000, 3000), None);

        for policy in [KeepPolicy::Newest, KeepPolicy::Oldest] {
            let resolver = KeeperResolver::new(policy);
            assert_eq!(resolver.prefer(&dated_small, &undated_big), Choice::Candidate);
            assert_eq!(resolver.prefer(&undated_big, &dated_small), Choice::Existing);
        }
    }

    #[test]
    fn test_choose_is_order_independent_for_resolution() {
        let resolver = KeeperResolver::new(KeepPolicy::HighestResolution);
        let a = record("/a.jpg", (100, 100), None);
        let b = record("/b.jpg", (300, 300), None);
        let c = record("/c.jpg", (200, 200), None);

        let orders = [
            vec![a.clone(), b.clone(), c.clone()],
            vec![c.clone(), a.clone(), b.clone()],
            vec![b.clone(), c.clone(), a.clone()],
        ];
        for candidates in orders {
            let keeper = resolver.choose(&candidates).unwrap();
            assert_eq!(candidates[keeper].path, Path::new("/b.jpg"));
        }
    }

    #[test]
    fn test_choose_oldest_among_many() {
        let resolver = KeeperResolver::new(KeepPolicy::Oldest);
        let candidates = vec![
            record("/2021.jpg", (1, 1), at(2021)),
            record("/2015.jpg", (1, 1), at(2015)),
            record("/2018.jpg", (1, 1), at(2018)),
        ];
        assert_eq!(resolver.choose(&candidates), Some(1));
        assert_eq!(resolver.choose(&[]), None);
    }
}
