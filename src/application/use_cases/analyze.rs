use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::application::{
    EmbedOptions, EmbeddingProvider, HistoryVectorStore, ProfileStore, SignalStore,
};
use crate::connector::detectors::{parent_dir, parse_epoch, DetectorPipeline, HistoryView};
use crate::connector::git::GitClient;
use crate::domain::{
    ChangeFrequency, DomainError, FileOwner, FileProfile, IndexState, IndexTotals, Signal,
    SignalMetadata, MIN_CHANGES_FOR_PROFILE,
};

/// Share the leading author needs to count as the file's owner.
const OWNER_SHARE: f32 = 0.30;

#[derive(Debug)]
pub struct AnalyzeReport {
    pub signal_count: u64,
    pub profile_count: u64,
    pub by_type: BTreeMap<String, u64>,
}

/// Fans the detectors out over the history index, derives per-file
/// profiles, and persists both.
pub struct AnalyzeUseCase {
    history: Arc<dyn HistoryVectorStore>,
    signals: Arc<dyn SignalStore>,
    profiles: Arc<dyn ProfileStore>,
    provider: Arc<dyn EmbeddingProvider>,
    repo_root: PathBuf,
    state_path: PathBuf,
}

impl AnalyzeUseCase {
    pub fn new(
        history: Arc<dyn HistoryVectorStore>,
        signals: Arc<dyn SignalStore>,
        profiles: Arc<dyn ProfileStore>,
        provider: Arc<dyn EmbeddingProvider>,
        repo_root: PathBuf,
        state_path: PathBuf,
    ) -> Self {
        Self {
            history,
            signals,
            profiles,
            provider,
            repo_root,
            state_path,
        }
    }

    pub async fn execute(&self, full: bool) -> Result<AnalyzeReport, DomainError> {
        self.provider.health_check().await?;
        let dimension = self.provider.probe_dimension().await?;

        let chunks = self.history.find(None, None).await?;
        if chunks.is_empty() {
            return Err(DomainError::missing_table("history_chunks"));
        }
        info!("Analyzing {} history chunks", chunks.len());
        let view = HistoryView::build(chunks);

        let pipeline = if full {
            DetectorPipeline::with_all_detectors()
        } else {
            DetectorPipeline::windowed_only()
        };
        let detected_at = Utc::now().to_rfc3339();
        let signals = pipeline.run(&view, &detected_at);

        let profiles = compute_profiles(&view, &signals);
        info!(
            "Derived {} signals and {} file profiles",
            signals.len(),
            profiles.len()
        );

        // Signal summaries are the embedded text.
        let texts: Vec<String> = signals.iter().map(|s| s.summary().to_string()).collect();
        let vectors = if texts.is_empty() {
            Vec::new()
        } else {
            let options = EmbedOptions {
                dimension,
                prefix: Some("search_document: ".to_string()),
                ..EmbedOptions::default()
            };
            self.provider.embed_batch(&texts, &options).await?
        };

        self.signals.init(dimension).await?;
        self.signals.overwrite(&signals, &vectors).await?;
        self.profiles.init().await?;
        self.profiles.overwrite(&profiles).await?;

        let last_commit = match GitClient::new(&self.repo_root) {
            Ok(git) => git.head_sha().await.unwrap_or_default(),
            Err(_) => String::new(),
        };
        IndexState::new(
            last_commit,
            detected_at,
            IndexTotals {
                files: profiles.len() as u64,
                chunks: signals.len() as u64,
                skipped: 0,
            },
            dimension,
        )
        .save(&self.state_path)?;

        let mut by_type: BTreeMap<String, u64> = BTreeMap::new();
        for signal in &signals {
            *by_type.entry(signal.signal_type().to_string()).or_insert(0) += 1;
        }
        Ok(AnalyzeReport {
            signal_count: signals.len() as u64,
            profile_count: profiles.len() as u64,
            by_type,
        })
    }
}

#[derive(Default)]
struct FileAccumulator {
    total: u32,
    by_author: HashMap<String, (u32, String)>,
    first_epoch: i64,
    last_epoch: i64,
    last_date: String,
}

/// Builds one profile per file with at least two recorded changes.
pub fn compute_profiles(view: &HistoryView, signals: &[Signal]) -> Vec<FileProfile> {
    let mut files: BTreeMap<String, FileAccumulator> = BTreeMap::new();
    for diff in view.diffs() {
        let entry = files.entry(diff.file_path().to_string()).or_default();
        entry.total += 1;
        let author_entry = entry
            .by_author
            .entry(diff.author().to_string())
            .or_insert((0, String::new()));
        author_entry.0 += 1;
        if diff.date() > author_entry.1.as_str() {
            author_entry.1 = diff.date().to_string();
        }
        if let Some(ts) = parse_epoch(diff.date()) {
            if entry.first_epoch == 0 || ts < entry.first_epoch {
                entry.first_epoch = ts;
            }
            if ts > entry.last_epoch {
                entry.last_epoch = ts;
            }
        }
        if diff.date() > entry.last_date.as_str() {
            entry.last_date = diff.date().to_string();
        }
    }

    let mut profiles = Vec::new();
    for (path, acc) in files {
        if acc.total < MIN_CHANGES_FOR_PROFILE {
            continue;
        }

        let leader = acc
            .by_author
            .iter()
            .max_by(|a, b| a.1 .0.cmp(&b.1 .0).then_with(|| b.0.cmp(a.0)));
        let owner = leader.and_then(|(author, (commits, last_change))| {
            let share = *commits as f32 / acc.total as f32;
            if share >= OWNER_SHARE {
                Some(FileOwner {
                    author: author.clone(),
                    percentage: share * 100.0,
                    commits: *commits,
                    last_change: last_change.clone(),
                })
            } else {
                None
            }
        });

        let span_days = ((acc.last_epoch - acc.first_epoch) / 86_400).max(1);
        let frequency = ChangeFrequency::from_rate(acc.total, span_days);

        let revert_count = signals
            .iter()
            .filter(|s| match s.metadata() {
                SignalMetadata::RevertPair { affected_files, .. } => {
                    affected_files.contains(&path)
                }
                _ => false,
            })
            .count() as u32;
        let fix_after_feature = signals
            .iter()
            .filter(|s| match s.metadata() {
                SignalMetadata::FixChain { files, .. } => files.contains(&path),
                _ => false,
            })
            .count() as u32;

        let dir = parent_dir(&path);
        let active_signal_ids: Vec<String> = signals
            .iter()
            .filter(|s| {
                s.directory_scope() == dir
                    || signal_names_file(s, &path)
            })
            .map(|s| s.id().to_string())
            .collect();

        profiles.push(FileProfile::new(
            path,
            owner,
            acc.by_author.len() as u32,
            acc.total,
            revert_count,
            fix_after_feature,
            frequency,
            acc.last_date,
            active_signal_ids,
        ));
    }
    profiles
}

fn signal_names_file(signal: &Signal, path: &String) -> bool {
    match signal.metadata() {
        SignalMetadata::RevertPair { affected_files, .. } => affected_files.contains(path),
        SignalMetadata::FixChain { files, .. } => files.contains(path),
        SignalMetadata::ChurnHotspot { file, .. } => file == path,
        SignalMetadata::Ownership { target, .. } => target == path,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::detectors::testutil::view_from_commits;
    use crate::connector::detectors::SignalDetector;

    fn sample_view() -> HistoryView {
        view_from_commits(&[
            (
                "c1",
                "Alice",
                "2024-01-01T10:00:00+00:00",
                "feat: add login",
                &["src/auth/login.ts"],
            ),
            (
                "c2",
                "Alice",
                "2024-01-15T10:00:00+00:00",
                "feat: extend login",
                &["src/auth/login.ts"],
            ),
            (
                "c3",
                "Bob",
                "2024-02-01T10:00:00+00:00",
                "feat: tweak login",
                &["src/auth/login.ts"],
            ),
            (
                "c4",
                "Carol",
                "2024-02-02T10:00:00+00:00",
                "feat: one-off",
                &["src/misc/once.ts"],
            ),
        ])
    }

    #[test]
    fn test_profiles_require_two_changes() {
        let view = sample_view();
        let profiles = compute_profiles(&view, &[]);
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].path(), "src/auth/login.ts");
        assert_eq!(profiles[0].total_changes(), 3);
    }

    #[test]
    fn test_owner_is_leading_author_over_threshold() {
        let view = sample_view();
        let profiles = compute_profiles(&view, &[]);
        let owner = profiles[0].primary_owner().expect("owner");
        assert_eq!(owner.author, "Alice");
        assert_eq!(owner.commits, 2);
        assert!((owner.percentage - 66.666).abs() < 0.1);
    }

    #[test]
    fn test_profile_links_signals_for_directory() {
        let view = sample_view();
        let signals =
            crate::connector::detectors::OwnershipDetector::new().detect(&view, "2024-02-03T00:00:00Z");
        let profiles = compute_profiles(&view, &signals);
        let profile = &profiles[0];
        assert!(!profile.active_signal_ids().is_empty());
    }
}
