use std::collections::BTreeSet;

use super::{common_scope, parent_dir, parse_epoch, upper_bound, HistoryView, SignalDetector};
use crate::domain::{Severity, Signal, SignalMetadata, SignalType, TemporalScope};

/// Cross-author fix window in seconds.
const WINDOW_SECS: i64 = 48 * 3_600;
/// Distinct fix authors (other than the original) required.
const MIN_AUTHORS: u32 = 2;

/// Commits that forced at least two other people to ship fixes in the
/// same area within 48 hours.
pub struct BreakingChangeDetector;

impl BreakingChangeDetector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BreakingChangeDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalDetector for BreakingChangeDetector {
    fn name(&self) -> &'static str {
        "breaking_change"
    }

    fn detect(&self, view: &HistoryView, detected_at: &str) -> Vec<Signal> {
        let fixes: Vec<&crate::domain::GitChunk> = view
            .summaries()
            .iter()
            .filter(|s| s.commit_type() == "fix")
            .collect();
        let fix_timestamps: Vec<i64> = fixes
            .iter()
            .map(|f| parse_epoch(f.date()).unwrap_or(0))
            .collect();

        let mut signals = Vec::new();
        for origin in view.summaries().iter().filter(|s| s.commit_type() != "fix") {
            let Some(origin_ts) = parse_epoch(origin.date()) else {
                continue;
            };
            let origin_files: BTreeSet<&str> =
                view.files_for_sha(origin.sha()).into_iter().collect();
            if origin_files.is_empty() {
                continue;
            }
            let origin_dirs: BTreeSet<String> =
                origin_files.iter().map(|f| parent_dir(f)).collect();

            let start = upper_bound(&fix_timestamps, origin_ts);
            let end = upper_bound(&fix_timestamps, origin_ts + WINDOW_SECS);

            let mut fix_shas: Vec<String> = Vec::new();
            let mut fix_authors: BTreeSet<String> = BTreeSet::new();
            for fix in &fixes[start..end] {
                if fix.author() == origin.author() {
                    continue;
                }
                let fix_files = view.files_for_sha(fix.sha());
                let related = fix_files.iter().any(|f| {
                    origin_files.contains(*f) || origin_dirs.contains(&parent_dir(f))
                });
                if !related {
                    continue;
                }
                fix_shas.push(fix.sha().to_string());
                fix_authors.insert(fix.author().to_string());
            }

            let author_count = fix_authors.len() as u32;
            if author_count < MIN_AUTHORS {
                continue;
            }
            let confidence = (0.6 + 0.1 * author_count as f32).min(0.95);
            let last_fix_date = fix_shas
                .last()
                .and_then(|sha| view.summary_for_sha(sha))
                .map(|s| s.date().to_string())
                .unwrap_or_else(|| origin.date().to_string());

            let files: Vec<&str> = origin_files.iter().copied().collect();
            let directory_scope = common_scope(&files);
            let mut contributing = vec![origin.sha().to_string()];
            contributing.extend(fix_shas.iter().cloned());
            let dominant = view.dominant_class(&contributing);
            let authors: Vec<String> = fix_authors.into_iter().collect();
            let summary = format!(
                "Commit {} (\"{}\") was followed within 48h by fixes from {} other author{}: {}",
                origin.short_sha(),
                origin.subject(),
                author_count,
                if author_count == 1 { "" } else { "s" },
                authors.join(", ")
            );

            signals.push(Signal::new(
                SignalType::BreakingChange,
                &[origin.sha()],
                summary,
                Severity::Warning,
                confidence,
                directory_scope,
                contributing,
                TemporalScope::new(origin.date(), last_fix_date),
                SignalMetadata::BreakingChange {
                    sha: origin.sha().to_string(),
                    author_count,
                    fix_shas,
                    fix_authors: authors,
                },
                dominant,
                detected_at.to_string(),
            ));
        }
        signals
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::view_from_commits;
    use super::*;

    #[test]
    fn test_two_other_authors_within_48h() {
        let view = view_from_commits(&[
            (
                "feat01",
                "Alice",
                "2024-03-01T10:00:00+00:00",
                "feat: rework session storage",
                &["src/auth/session.ts"],
            ),
            (
                "fix001",
                "Bob",
                "2024-03-01T20:00:00+00:00",
                "fix: session deserialization",
                &["src/auth/session.ts"],
            ),
            (
                "fix002",
                "Charlie",
                "2024-03-02T09:00:00+00:00",
                "fix: session cookie flags",
                &["src/auth/cookies.ts"],
            ),
        ]);
        let signals = BreakingChangeDetector::new().detect(&view, "2024-03-05T00:00:00Z");
        assert_eq!(signals.len(), 1);
        let signal = &signals[0];
        assert_eq!(signal.severity(), Severity::Warning);
        match signal.metadata() {
            SignalMetadata::BreakingChange {
                author_count,
                fix_authors,
                ..
            } => {
                assert_eq!(*author_count, 2);
                assert!(fix_authors.contains(&"Bob".to_string()));
                assert!(fix_authors.contains(&"Charlie".to_string()));
            }
            other => panic!("wrong metadata: {:?}", other),
        }
        // min(0.95, 0.6 + 0.1 * 2) = 0.8
        assert!((signal.confidence() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_own_fixes_do_not_count() {
        let view = view_from_commits(&[
            (
                "feat01",
                "Alice",
                "2024-03-01T10:00:00+00:00",
                "feat: rework session storage",
                &["src/auth/session.ts"],
            ),
            (
                "fix001",
                "Alice",
                "2024-03-01T20:00:00+00:00",
                "fix: own cleanup",
                &["src/auth/session.ts"],
            ),
            (
                "fix002",
                "Bob",
                "2024-03-02T09:00:00+00:00",
                "fix: session cookie flags",
                &["src/auth/session.ts"],
            ),
        ]);
        let signals = BreakingChangeDetector::new().detect(&view, "2024-03-05T00:00:00Z");
        assert!(signals.is_empty());
    }

    #[test]
    fn test_fixes_outside_window_do_not_count() {
        let view = view_from_commits(&[
            (
                "feat01",
                "Alice",
                "2024-03-01T10:00:00+00:00",
                "feat: rework session storage",
                &["src/auth/session.ts"],
            ),
            (
                "fix001",
                "Bob",
                "2024-03-05T10:00:00+00:00",
                "fix: late fix",
                &["src/auth/session.ts"],
            ),
            (
                "fix002",
                "Charlie",
                "2024-03-06T10:00:00+00:00",
                "fix: later fix",
                &["src/auth/session.ts"],
            ),
        ]);
        let signals = BreakingChangeDetector::new().detect(&view, "2024-03-07T00:00:00Z");
        assert!(signals.is_empty());
    }
}
