//! Tag-overlap similarity between assets.
//!
//! The index is a plain value built from a snapshot of `(asset_id, tag)`
//! assignments. It does not track later tag edits; call
//! [`SimilarityIndex::rebuild`] after changing tags.

use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default)]
pub struct SimilarityIndex {
    tag_assets: BTreeMap<String, BTreeSet<i64>>,
    asset_tags: BTreeMap<i64, BTreeSet<String>>,
}

impl SimilarityIndex {
    pub fn build<I>(assignments: I) -> Self
    where
        I: IntoIterator<Item = (i64, String)>,
    {
        let mut index = Self::default();
        index.rebuild(assignments);
        index
    }

    /// Replace the index contents with a fresh snapshot.
    pub fn rebuild<I>(&mut self, assignments: I)
    where
        I: IntoIterator<Item = (i64, String)>,
    {
        self.tag_assets.clear();
        self.asset_tags.clear();
        for (asset_id, tag) in assignments {
            self.tag_assets.entry(tag.clone()).or_default().insert(asset_id);
            self.asset_tags.entry(asset_id).or_default().insert(tag);
        }
        tracing::debug!(
            tags = self.tag_assets.len(),
            assets = self.asset_tags.len(),
            "Rebuilt similarity index"
        );
    }

    pub fn tags_of(&self, asset_id: i64) -> Option<&BTreeSet<String>> {
        self.asset_tags.get(&asset_id)
    }

    /// Inverse document frequency: `1 / |assets carrying tag|`.
    pub fn idf(&self, tag: &str) -> f64 {
        match self.tag_assets.get(tag) {
            Some(assets) if !assets.is_empty() => 1.0 / assets.len() as f64,
            _ => 0.0,
        }
    }

    /// IDF-weighted Jaccard score in `[0, 1]`. `None` for a self pair or an
    /// asset without tags.
    pub fn score(&self, a: i64, b: i64) -> Option<f64> {
        if a == b {
            return None;
        }
        let mine = self.asset_tags.get(&a)?;
        let theirs = self.asset_tags.get(&b)?;

        let shared: f64 = mine.intersection(theirs).map(|t| self.idf(t)).sum();
        let total: f64 = mine.union(theirs).map(|t| self.idf(t)).sum();
        if total <= 0.0 {
            return Some(0.0);
        }
        Some(shared / total)
    }

    /// Assets sharing at least one tag with `asset_id`, scored at or above
    /// `threshold`, best first, at most `limit` of them.
    pub fn related(&self, asset_id: i64, threshold: f64, limit: usize) -> Vec<(i64, f64)> {
        let Some(mine) = self.asset_tags.get(&asset_id) else {
            return Vec::new();
        };

        let candidates: BTreeSet<i64> = mine
            .iter()
            .filter_map(|tag| self.tag_assets.get(tag))
            .flatten()
            .copied()
            .filter(|&id| id != asset_id)
            .collect();

        let mut scored: Vec<(i64, f64)> = candidates
            .into_iter()
            .filter_map(|id| self.score(asset_id, id).map(|score| (id, score)))
            .filter(|&(_, score)| score >= threshold)
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(limit);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> SimilarityIndex {
        let pairs = [
            (1, "a"),
            (1, "b"),
            (2, "a"),
            (2, "c"),
            (3, "b"),
            (3, "c"),
            (4, "a"),
            (4, "b"),
            (5, "z"),
        ];
        SimilarityIndex::build(pairs.iter().map(|&(id, t)| (id, t.to_string())))
    }

    #[test]
    fn test_idf() {
        let index = fixture();
        assert_eq!(index.idf("a"), 1.0 / 3.0);
        assert_eq!(index.idf("z"), 1.0);
        assert_eq!(index.idf("missing"), 0.0);
    }

    #[test]
    fn test_score_is_symmetric_and_bounded() {
        let index = fixture();
        for a in 1..=5 {
            for b in 1..=5 {
                if a == b {
                    assert_eq!(index.score(a, b), None);
                    continue;
                }
                let ab = index.score(a, b).unwrap();
                assert_eq!(Some(ab), index.score(b, a));
                assert!((0.0..=1.0).contains(&ab));
            }
        }
        assert_eq!(index.score(1, 4), Some(1.0));
        assert_eq!(index.score(1, 5), Some(0.0));
        assert_eq!(index.score(1, 99), None);
    }

    #[test]
    fn test_related() {
        let index = fixture();
        let related = index.related(1, 0.0, 10);
        assert_eq!(related[0], (4, 1.0));
        assert_eq!(related.iter().map(|r| r.0).collect::<Vec<_>>(), vec![4, 2, 3]);

        assert_eq!(index.related(1, 0.5, 10), vec![(4, 1.0)]);
        assert_eq!(index.related(1, 0.0, 1).len(), 1);
        assert!(index.related(5, 0.0, 10).is_empty());
    }

    #[test]
    fn test_rebuild_replaces_snapshot() {
        let mut index = fixture();
        index.rebuild([(7, "x".to_string()), (8, "x".to_string())]);
        assert_eq!(index.score(7, 8), Some(1.0));
        assert_eq!(index.score(1, 4), None);
    }
}
