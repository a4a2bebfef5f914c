use std::collections::BTreeSet;

use super::{common_scope, parse_epoch, upper_bound, HistoryView, SignalDetector};
use crate::domain::{Severity, Signal, SignalMetadata, SignalType, TemporalScope};

/// Fix-after-feature window in seconds.
const WINDOW_SECS: i64 = 7 * 86_400;

/// Finds `feat` commits followed within seven days by `fix` commits that
/// touch the same files.
pub struct FixChainDetector;

impl FixChainDetector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FixChainDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalDetector for FixChainDetector {
    fn name(&self) -> &'static str {
        "fix_chain"
    }

    fn detect(&self, view: &HistoryView, detected_at: &str) -> Vec<Signal> {
        // Sorted list of fix commits for the binary-searched window scan.
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
        for feat in view.summaries().iter().filter(|s| s.commit_type() == "feat") {
            let Some(feat_ts) = parse_epoch(feat.date()) else {
                continue;
            };
            let feat_files: BTreeSet<&str> = view.files_for_sha(feat.sha()).into_iter().collect();
            if feat_files.is_empty() {
                continue;
            }

            let start = upper_bound(&fix_timestamps, feat_ts);
            let end = upper_bound(&fix_timestamps, feat_ts + WINDOW_SECS);

            let mut chain: Vec<&crate::domain::GitChunk> = Vec::new();
            let mut touched: BTreeSet<String> = BTreeSet::new();
            for fix in &fixes[start..end] {
                let fix_files = view.files_for_sha(fix.sha());
                let overlap: Vec<&str> = fix_files
                    .iter()
                    .filter(|f| feat_files.contains(**f))
                    .copied()
                    .collect();
                if overlap.is_empty() {
                    continue;
                }
                chain.push(fix);
                touched.extend(overlap.iter().map(|f| f.to_string()));
            }
            if chain.is_empty() {
                continue;
            }

            let fix_count = chain.len() as u32;
            let last_fix = chain.last().expect("non-empty chain");
            let day_span = parse_epoch(last_fix.date())
                .map(|ts| (ts - feat_ts) / 86_400)
                .unwrap_or(0);
            let severity = if fix_count >= 3 {
                Severity::Warning
            } else {
                Severity::Caution
            };
            let confidence = (0.5 + 0.15 * fix_count as f32).min(0.9);

            let files: Vec<String> = touched.into_iter().collect();
            let file_refs: Vec<&str> = files.iter().map(|s| s.as_str()).collect();
            let directory_scope = common_scope(&file_refs);

            let mut contributing = vec![feat.sha().to_string()];
            contributing.extend(chain.iter().map(|f| f.sha().to_string()));
            let dominant = view.dominant_class(&contributing);

            let summary = format!(
                "Feature {} (\"{}\") needed {} fix{} within {} day{} touching {}",
                feat.short_sha(),
                feat.subject(),
                fix_count,
                if fix_count == 1 { "" } else { "es" },
                day_span,
                if day_span == 1 { "" } else { "s" },
                files.join(", ")
            );

            signals.push(Signal::new(
                SignalType::FixChain,
                &[feat.sha()],
                summary,
                severity,
                confidence,
                directory_scope,
                contributing,
                TemporalScope::new(feat.date(), last_fix.date()),
                SignalMetadata::FixChain {
                    feat_sha: feat.sha().to_string(),
                    fix_count,
                    day_span,
                    files,
                },
                dominant,
                detected_at.to_string(),
            ));
        }
        signals
    }
}
