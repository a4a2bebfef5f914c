use std::collections::HashMap;

use super::{parent_dir, top_level_dir, HistoryView, SignalDetector};
use crate::domain::{
    Contributor, Severity, Signal, SignalMetadata, SignalType, TemporalScope,
};

/// Minimum share the leading author must hold.
const OWNERSHIP_SHARE: f32 = 0.30;
/// Minimum commits before a file ownership signal is considered.
const MIN_FILE_COMMITS: u32 = 3;
/// Minimum commits before a directory ownership signal is considered.
const MIN_DIR_COMMITS: u32 = 5;

/// Concentrated-authorship detection per file and per top-level directory.
pub struct OwnershipDetector;

impl OwnershipDetector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for OwnershipDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct TargetStats {
    by_author: HashMap<String, u32>,
    shas_by_author: HashMap<String, Vec<String>>,
    total: u32,
    first_date: String,
    last_date: String,
}

impl TargetStats {
    fn record(&mut self, author: &str, sha: &str, date: &str) {
        *self.by_author.entry(author.to_string()).or_insert(0) += 1;
        self.shas_by_author
            .entry(author.to_string())
            .or_default()
            .push(sha.to_string());
        self.total += 1;
        if self.first_date.is_empty() || date < self.first_date.as_str() {
            self.first_date = date.to_string();
        }
        if date > self.last_date.as_str() {
            self.last_date = date.to_string();
        }
    }

    fn leader(&self) -> Option<(&String, u32)> {
        self.by_author
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(author, count)| (author, *count))
    }

    fn top_contributors(&self, n: usize) -> Vec<Contributor> {
        let mut entries: Vec<(&String, &u32)> = self.by_author.iter().collect();
        entries.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        entries
            .into_iter()
            .take(n)
            .map(|(author, commits)| Contributor {
                author: author.clone(),
                commits: *commits,
                percentage: 100.0 * *commits as f32 / self.total.max(1) as f32,
            })
            .collect()
    }
}

impl SignalDetector for OwnershipDetector {
    fn name(&self) -> &'static str {
        "ownership"
    }

    fn detect(&self, view: &HistoryView, detected_at: &str) -> Vec<Signal> {
        let mut files: HashMap<String, TargetStats> = HashMap::new();
        let mut dirs: HashMap<String, TargetStats> = HashMap::new();
        for diff in view.diffs() {
            files
                .entry(diff.file_path().to_string())
                .or_default()
                .record(diff.author(), diff.sha(), diff.date());
            dirs.entry(top_level_dir(diff.file_path()))
                .or_default()
                .record(diff.author(), diff.sha(), diff.date());
        }

        let mut signals = Vec::new();
        let mut emit = |target: &str, is_directory: bool, stats: &TargetStats, scope: String| {
            let min = if is_directory {
                MIN_DIR_COMMITS
            } else {
                MIN_FILE_COMMITS
            };
            if stats.total < min {
                return;
            }
            let Some((leader, commits)) = stats.leader() else {
                return;
            };
            let share = commits as f32 / stats.total as f32;
            if share < OWNERSHIP_SHARE {
                return;
            }
            let contributing = stats
                .shas_by_author
                .get(leader)
                .cloned()
                .unwrap_or_default();
            let dominant = view.dominant_class(&contributing);
            let summary = format!(
                "{} owns {} ({:.0}% of {} commit{})",
                leader,
                target,
                share * 100.0,
                stats.total,
                if stats.total == 1 { "" } else { "s" }
            );
            signals.push(Signal::new(
                SignalType::Ownership,
                &[target, if is_directory { "dir" } else { "file" }],
                summary,
                Severity::Info,
                (0.5 + share / 2.0).min(0.95),
                scope,
                contributing,
                TemporalScope::new(stats.first_date.clone(), stats.last_date.clone()),
                SignalMetadata::Ownership {
                    target: target.to_string(),
                    is_directory,
                    total_commits: stats.total,
                    top_contributors: stats.top_contributors(5),
                },
                dominant,
                detected_at.to_string(),
            ));
        };

        let mut file_entries: Vec<(&String, &TargetStats)> = files.iter().collect();
        file_entries.sort_by(|a, b| a.0.cmp(b.0));
        for (file, stats) in file_entries {
            emit(file, false, stats, parent_dir(file));
        }
        let mut dir_entries: Vec<(&String, &TargetStats)> = dirs.iter().collect();
        dir_entries.sort_by(|a, b| a.0.cmp(b.0));
        for (dir, stats) in dir_entries {
            emit(dir, true, stats, dir.clone());
        }
        signals
    }
}
