//! Signal detection over the history index.
//!
//! Every detector consumes the same read-only [`HistoryView`] and emits
//! [`Signal`] records; detectors share no mutable state and may run in any
//! order.

mod adoption;
mod breaking;
mod churn;
mod fix_chain;
mod ownership;
mod revert;
mod stability;

pub use adoption::AdoptionCycleDetector;
pub use breaking::BreakingChangeDetector;
pub use churn::ChurnHotspotDetector;
pub use fix_chain::FixChainDetector;
pub use ownership::OwnershipDetector;
pub use revert::RevertPairDetector;
pub use stability::StabilityShiftDetector;

use std::collections::HashMap;

use chrono::DateTime;
use tracing::info;

use crate::domain::{DecisionClass, GitChunk, GitChunkType, Signal};

/// A temporal or relational pattern miner over the history index.
pub trait SignalDetector: Send + Sync {
    fn name(&self) -> &'static str;

    fn detect(&self, view: &HistoryView, detected_at: &str) -> Vec<Signal>;
}

/// Read-only, pre-indexed view of every history chunk for one repository.
/// Built once per analyze run; all detectors borrow it.
pub struct HistoryView {
    /// `commit_summary` chunks sorted ascending by date.
    summaries: Vec<GitChunk>,
    /// Epoch seconds parallel to `summaries`.
    summary_timestamps: Vec<i64>,
    /// All `file_diff` chunks.
    diffs: Vec<GitChunk>,
    diffs_by_sha: HashMap<String, Vec<usize>>,
    summary_by_sha: HashMap<String, usize>,
    decision_by_sha: HashMap<String, DecisionClass>,
}

impl HistoryView {
    pub fn build(chunks: Vec<GitChunk>) -> Self {
        let mut summaries: Vec<GitChunk> = Vec::new();
        let mut diffs: Vec<GitChunk> = Vec::new();
        for chunk in chunks {
            match chunk.chunk_type() {
                GitChunkType::CommitSummary => summaries.push(chunk),
                GitChunkType::FileDiff => diffs.push(chunk),
                GitChunkType::MergeGroup => {}
            }
        }
        summaries.sort_by(|a, b| {
            parse_epoch(a.date())
                .cmp(&parse_epoch(b.date()))
                .then_with(|| a.sha().cmp(b.sha()))
        });
        let summary_timestamps: Vec<i64> = summaries
            .iter()
            .map(|c| parse_epoch(c.date()).unwrap_or(0))
            .collect();

        let mut diffs_by_sha: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, diff) in diffs.iter().enumerate() {
            diffs_by_sha
                .entry(diff.sha().to_string())
                .or_default()
                .push(i);
        }
        let mut summary_by_sha = HashMap::new();
        let mut decision_by_sha = HashMap::new();
        for (i, summary) in summaries.iter().enumerate() {
            summary_by_sha.insert(summary.sha().to_string(), i);
            decision_by_sha.insert(summary.sha().to_string(), summary.decision_class());
        }

        Self {
            summaries,
            summary_timestamps,
            diffs,
            diffs_by_sha,
            summary_by_sha,
            decision_by_sha,
        }
    }

    pub fn summaries(&self) -> &[GitChunk] {
        &self.summaries
    }

    pub fn summary_timestamps(&self) -> &[i64] {
        &self.summary_timestamps
    }

    pub fn diffs(&self) -> &[GitChunk] {
        &self.diffs
    }

    pub fn summary_for_sha(&self, sha: &str) -> Option<&GitChunk> {
        self.summary_by_sha.get(sha).map(|&i| &self.summaries[i])
    }

    /// Summary whose full SHA starts with `prefix` (bodies often carry
    /// abbreviated SHAs).
    pub fn summary_for_sha_prefix(&self, prefix: &str) -> Option<&GitChunk> {
        if prefix.is_empty() {
            return None;
        }
        if let Some(found) = self.summary_for_sha(prefix) {
            return Some(found);
        }
        self.summaries.iter().find(|s| s.sha().starts_with(prefix))
    }

    /// Paths touched by one commit.
    pub fn files_for_sha(&self, sha: &str) -> Vec<&str> {
        self.diffs_by_sha
            .get(sha)
            .map(|indices| indices.iter().map(|&i| self.diffs[i].file_path()).collect())
            .unwrap_or_default()
    }

    /// Latest commit date in the view; detectors use it as the reference
    /// "now" so runs over the same input are deterministic.
    pub fn reference_epoch(&self) -> i64 {
        self.summary_timestamps.last().copied().unwrap_or(0)
    }

    /// Majority decision class across `shas`, ties broken by
    /// decision > routine > unknown.
    pub fn dominant_class(&self, shas: &[String]) -> DecisionClass {
        let mut counts: HashMap<DecisionClass, u32> = HashMap::new();
        for sha in shas {
            let class = self
                .decision_by_sha
                .get(sha)
                .copied()
                .unwrap_or(DecisionClass::Unknown);
            *counts.entry(class).or_insert(0) += 1;
        }
        counts
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.rank().cmp(&b.0.rank())))
            .map(|(class, _)| class)
            .unwrap_or(DecisionClass::Unknown)
    }
}

/// Parses an ISO-8601 date into epoch seconds.
pub fn parse_epoch(date: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(date)
        .ok()
        .map(|d| d.timestamp())
}

/// First index with `timestamps[i] > t`. Timestamps must be sorted.
pub fn upper_bound(timestamps: &[i64], t: i64) -> usize {
    timestamps.partition_point(|&ts| ts <= t)
}

/// First index with `timestamps[i] >= t`. Timestamps must be sorted.
pub fn lower_bound(timestamps: &[i64], t: i64) -> usize {
    timestamps.partition_point(|&ts| ts < t)
}

/// Parent directory of a path, `"."` for root-level files.
pub fn parent_dir(path: &str) -> String {
    match path.rsplit_once('/') {
        Some((dir, _)) => dir.to_string(),
        None => ".".to_string(),
    }
}

/// First path component, `"."` for root-level files.
pub fn top_level_dir(path: &str) -> String {
    match path.split_once('/') {
        Some((dir, _)) => dir.to_string(),
        None => ".".to_string(),
    }
}

/// Deepest directory containing every path. Falls back to the first of
/// the sorted touched directories, so multi-directory change sets scope
/// deterministically; `"."` only when there are no paths at all.
pub fn common_scope(paths: &[&str]) -> String {
    if paths.is_empty() {
        return ".".to_string();
    }
    let mut dirs: Vec<Vec<&str>> = paths
        .iter()
        .map(|p| {
            let dir = match p.rsplit_once('/') {
                Some((dir, _)) => dir,
                None => "",
            };
            dir.split('/').filter(|s| !s.is_empty()).collect()
        })
        .collect();
    dirs.sort();

    let first = &dirs[0];
    let mut common_len = first.len();
    for dir in &dirs[1..] {
        let mut i = 0;
        while i < common_len && i < dir.len() && dir[i] == first[i] {
            i += 1;
        }
        common_len = i;
    }
    if common_len > 0 {
        return first[..common_len].join("/");
    }
    // No common ancestor: take the first sorted non-root directory.
    dirs.iter()
        .find(|d| !d.is_empty())
        .map(|d| d.join("/"))
        .unwrap_or_else(|| ".".to_string())
}

/// Runs a configured subset of detectors and collects their signals.
pub struct DetectorPipeline {
    detectors: Vec<Box<dyn SignalDetector>>,
}

impl DetectorPipeline {
    pub fn with_all_detectors() -> Self {
        Self {
            detectors: vec![
                Box::new(RevertPairDetector::new()),
                Box::new(FixChainDetector::new()),
                Box::new(ChurnHotspotDetector::new()),
                Box::new(OwnershipDetector::new()),
                Box::new(AdoptionCycleDetector::new()),
                Box::new(StabilityShiftDetector::new()),
                Box::new(BreakingChangeDetector::new()),
            ],
        }
    }

    /// Windowed-only subset for incremental analyze runs.
    pub fn windowed_only() -> Self {
        Self {
            detectors: vec![
                Box::new(ChurnHotspotDetector::new()),
                Box::new(OwnershipDetector::new()),
                Box::new(StabilityShiftDetector::new()),
            ],
        }
    }

    pub fn run(&self, view: &HistoryView, detected_at: &str) -> Vec<Signal> {
        let mut signals = Vec::new();
        for detector in &self.detectors {
            let found = detector.detect(view, detected_at);
            info!("{}: {} signals", detector.name(), found.len());
            signals.extend(found);
        }
        signals
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds() {
        let ts = vec![10, 20, 20, 30];
        assert_eq!(lower_bound(&ts, 20), 1);
        assert_eq!(upper_bound(&ts, 20), 3);
        assert_eq!(upper_bound(&ts, 5), 0);
        assert_eq!(upper_bound(&ts, 99), 4);
    }

    #[test]
    fn test_common_scope_shared_ancestor() {
        assert_eq!(
            common_scope(&["src/auth/login.ts", "src/auth/session.ts"]),
            "src/auth"
        );
        assert_eq!(
            common_scope(&["src/auth/login.ts", "src/billing/pay.ts"]),
            "src"
        );
    }

    #[test]
    fn test_common_scope_disjoint_picks_first_sorted() {
        assert_eq!(
            common_scope(&["lib/z.ts", "app/a.ts"]),
            "app"
        );
    }

    #[test]
    fn test_common_scope_root_files() {
        assert_eq!(common_scope(&["README.md"]), ".");
        assert_eq!(common_scope(&[]), ".");
    }

    #[test]
    fn test_parent_and_top_level() {
        assert_eq!(parent_dir("src/auth/login.ts"), "src/auth");
        assert_eq!(parent_dir("README.md"), ".");
        assert_eq!(top_level_dir("src/auth/login.ts"), "src");
        assert_eq!(top_level_dir("README.md"), ".");
    }

    #[test]
    fn test_dominant_class_tie_break() {
        use crate::connector::detectors::testutil::view_from_commits;
        let view = view_from_commits(&[
            (
                "aaa",
                "Alice",
                "2024-03-01T10:00:00+00:00",
                "refactor: switch to new parser",
                &["src/a.ts"],
            ),
            (
                "bbb",
                "Bob",
                "2024-03-02T10:00:00+00:00",
                "chore: bump deps",
                &["src/b.ts"],
            ),
        ]);
        // One decision, one routine: the tie breaks toward decision.
        let class = view.dominant_class(&["aaa".to_string(), "bbb".to_string()]);
        assert_eq!(class, DecisionClass::Decision);
    }
}
