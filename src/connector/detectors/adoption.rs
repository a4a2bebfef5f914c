use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;

use super::{parent_dir, HistoryView, SignalDetector};
use crate::domain::{
    AdoptionStatus, Severity, Signal, SignalMetadata, SignalType, TemporalScope,
};

/// Manifest basenames whose diffs are mined for dependency events.
const MANIFEST_FILES: &[&str] = &[
    "package.json",
    "Cargo.toml",
    "Gemfile",
    "requirements.txt",
    "pyproject.toml",
    "go.mod",
];

/// Dependency names never treated as adoption events.
const IGNORED_KEYS: &[&str] = &["version", "name"];

/// Add/remove/re-add cycles of dependencies in manifest diffs.
pub struct AdoptionCycleDetector {
    added: Regex,
    removed: Regex,
}

impl AdoptionCycleDetector {
    pub fn new() -> Self {
        Self {
            added: Regex::new(r#"(?m)^\+\s*"([^"]+)"\s*:\s*""#).expect("static added regex"),
            removed: Regex::new(r#"(?m)^-\s*"([^"]+)"\s*:\s*""#).expect("static removed regex"),
        }
    }
}

impl Default for AdoptionCycleDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
struct DependencyEvent {
    date: String,
    sha: String,
    status: AdoptionStatus,
    manifest: String,
}

fn is_manifest(path: &str) -> bool {
    std::path::Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .map(|name| MANIFEST_FILES.contains(&name))
        .unwrap_or(false)
}

fn ignorable(dependency: &str) -> bool {
    dependency.starts_with("@types/") || IGNORED_KEYS.contains(&dependency)
}

impl SignalDetector for AdoptionCycleDetector {
    fn name(&self) -> &'static str {
        "adoption_cycle"
    }

    fn detect(&self, view: &HistoryView, detected_at: &str) -> Vec<Signal> {
        // BTreeMap keeps dependency iteration order stable across runs.
        let mut events: BTreeMap<String, Vec<DependencyEvent>> = BTreeMap::new();

        for diff in view.diffs() {
            if !is_manifest(diff.file_path()) {
                continue;
            }
            let added: BTreeSet<String> = self
                .added
                .captures_iter(diff.text())
                .map(|c| c[1].to_string())
                .filter(|d| !ignorable(d))
                .collect();
            let removed: BTreeSet<String> = self
                .removed
                .captures_iter(diff.text())
                .map(|c| c[1].to_string())
                .filter(|d| !ignorable(d))
                .collect();

            // A name on both sides of the same chunk is a version bump.
            for dependency in added.symmetric_difference(&removed) {
                let status = if added.contains(dependency) {
                    AdoptionStatus::Added
                } else {
                    AdoptionStatus::Removed
                };
                events.entry(dependency.clone()).or_default().push(DependencyEvent {
                    date: diff.date().to_string(),
                    sha: diff.sha().to_string(),
                    status,
                    manifest: diff.file_path().to_string(),
                });
            }
        }

        let mut signals = Vec::new();
        for (dependency, mut dep_events) in events {
            dep_events.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.sha.cmp(&b.sha)));

            let transitions = dep_events
                .windows(2)
                .filter(|w| w[0].status != w[1].status)
                .count() as u32;
            if transitions < 2 {
                continue;
            }
            let cycle_count = transitions.div_ceil(2);
            let severity = if cycle_count >= 3 {
                Severity::Warning
            } else {
                Severity::Caution
            };
            let confidence = (0.6 + 0.1 * cycle_count as f32).min(0.9);
            let first = dep_events.first().expect("non-empty events");
            let last = dep_events.last().expect("non-empty events");
            let contributing: Vec<String> =
                dep_events.iter().map(|e| e.sha.clone()).collect();
            let dominant = view.dominant_class(&contributing);
            let summary = format!(
                "Dependency {} went through {} adoption cycle{} in {} (currently {})",
                dependency,
                cycle_count,
                if cycle_count == 1 { "" } else { "s" },
                first.manifest,
                last.status.as_str()
            );

            signals.push(Signal::new(
                SignalType::AdoptionCycle,
                &[dependency.as_str()],
                summary,
                severity,
                confidence,
                parent_dir(&first.manifest),
                contributing,
                TemporalScope::new(first.date.clone(), last.date.clone()),
                SignalMetadata::AdoptionCycle {
                    dependency: dependency.clone(),
                    manifest: first.manifest.clone(),
                    cycle_count,
                    transitions,
                    current_status: last.status,
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
    use super::*;
    use crate::connector::config::GitConfig;
    use crate::connector::git::CommitChunker;
    use crate::domain::{FileChange, RawCommit};
    use std::collections::HashMap;

    fn manifest_commit(sha: &str, date: &str, subject: &str, hunk: &str) -> Vec<crate::domain::GitChunk> {
        let chunker = CommitChunker::new(GitConfig::default()).unwrap();
        let commit = RawCommit {
            sha: sha.to_string(),
            author: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            date: date.to_string(),
            subject: subject.to_string(),
            body: String::new(),
            parents: vec!["p".to_string()],
            refs: String::new(),
            files: vec![FileChange {
                path: "package.json".to_string(),
                additions: 1,
                deletions: 1,
                binary: false,
            }],
        };
        let mut patches = HashMap::new();
        patches.insert("package.json".to_string(), hunk.to_string());
        chunker.chunk_commit(&commit, Some(&patches))
    }

    #[test]
    fn test_add_remove_add_is_one_and_a_half_cycles() {
        let mut chunks = Vec::new();
        chunks.extend(manifest_commit(
            "a1",
            "2024-01-01T10:00:00+00:00",
            "feat: adopt lodash",
            "+  \"lodash\": \"^4.17.0\",\n",
        ));
        chunks.extend(manifest_commit(
            "a2",
            "2024-02-01T10:00:00+00:00",
            "feat: drop lodash",
            "-  \"lodash\": \"^4.17.0\",\n",
        ));
        chunks.extend(manifest_commit(
            "a3",
            "2024-03-01T10:00:00+00:00",
            "feat: re-adopt lodash",
            "+  \"lodash\": \"^4.17.21\",\n",
        ));
        let view = HistoryView::build(chunks);

        let signals = AdoptionCycleDetector::new().detect(&view, "2024-03-05T00:00:00Z");
        assert_eq!(signals.len(), 1);
        match signals[0].metadata() {
            SignalMetadata::AdoptionCycle {
                dependency,
                cycle_count,
                transitions,
                current_status,
                ..
            } => {
                assert_eq!(dependency, "lodash");
                assert_eq!(*transitions, 2);
                assert_eq!(*cycle_count, 1);
                assert_eq!(*current_status, AdoptionStatus::Added);
            }
            other => panic!("wrong metadata: {:?}", other),
        }
        assert_eq!(signals[0].severity(), Severity::Caution);
    }

    #[test]
    fn test_version_bump_is_not_an_event() {
        let chunks = manifest_commit(
            "a1",
            "2024-01-01T10:00:00+00:00",
            "chore: bump lodash",
            "-  \"lodash\": \"^4.17.0\",\n+  \"lodash\": \"^4.17.21\",\n",
        );
        let view = HistoryView::build(chunks);
        let signals = AdoptionCycleDetector::new().detect(&view, "2024-03-05T00:00:00Z");
        assert!(signals.is_empty());
    }

    #[test]
    fn test_types_packages_ignored() {
        let mut chunks = Vec::new();
        chunks.extend(manifest_commit(
            "a1",
            "2024-01-01T10:00:00+00:00",
            "feat: types on",
            "+  \"@types/node\": \"^20.0.0\",\n",
        ));
        chunks.extend(manifest_commit(
            "a2",
            "2024-02-01T10:00:00+00:00",
            "feat: types off",
            "-  \"@types/node\": \"^20.0.0\",\n",
        ));
        chunks.extend(manifest_commit(
            "a3",
            "2024-03-01T10:00:00+00:00",
            "feat: types on again",
            "+  \"@types/node\": \"^20.1.0\",\n",
        ));
        let view = HistoryView::build(chunks);
        let signals = AdoptionCycleDetector::new().detect(&view, "2024-03-05T00:00:00Z");
        assert!(signals.is_empty());
    }

    #[test]
    fn test_single_transition_is_silent() {
        let mut chunks = Vec::new();
        chunks.extend(manifest_commit(
            "a1",
            "2024-01-01T10:00:00+00:00",
            "feat: adopt lodash",
            "+  \"lodash\": \"^4.17.0\",\n",
        ));
        chunks.extend(manifest_commit(
            "a2",
            "2024-02-01T10:00:00+00:00",
            "feat: drop lodash",
            "-  \"lodash\": \"^4.17.0\",\n",
        ));
        let view = HistoryView::build(chunks);
        let signals = AdoptionCycleDetector::new().detect(&view, "2024-03-05T00:00:00Z");
        assert!(signals.is_empty());
    }
}
