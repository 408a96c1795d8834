//! Stable ranking with a pluggable recommendation label

use crate::models::{RankingEntry, ScoredItem};

/// Maps a score to a recommendation label
pub trait Recommender: Send + Sync {
    fn label(&self, score: f64) -> String;
}

/// `above` when the score reaches `threshold`, else `otherwise`
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdRecommender {
    pub threshold: f64,
    pub above: String,
    pub otherwise: String,
}

impl ThresholdRecommender {
    pub fn new(threshold: f64, above: impl Into<String>, otherwise: impl Into<String>) -> Self {
        Self {
            threshold,
            above: above.into(),
            otherwise: otherwise.into(),
        }
    }

    pub fn buy_hold(threshold: f64) -> Self {
        Self::new(threshold, "BUY", "HOLD")
    }
}

impl Default for ThresholdRecommender {
    fn default() -> Self {
        Self::buy_hold(7.0)
    }
}

impl Recommender for ThresholdRecommender {
    fn label(&self, score: f64) -> String {
        if score >= self.threshold {
            self.above.clone()
        } else {
            self.otherwise.clone()
        }
    }
}

/// Sort by score, highest first. The sort is stable, so equal scores keep
/// their input order. An empty input gives an empty ranking.
pub fn rank(items: Vec<ScoredItem>, recommender: &dyn Recommender) -> Vec<RankingEntry> {
    let mut items = items;
    // total_cmp keeps the order total even with NaN scores.
    items.sort_by(|a, b| b.score.total_cmp(&a.score));

    items
        .into_iter()
        .map(|item| RankingEntry {
            label: recommender.label(item.score),
            ticker_id: item.id,
            score: item.score,
            available: true,
            metadata: item.metadata,
        })
        .collect()
}
