use regex::Regex;

use super::{common_scope, parse_epoch, HistoryView, SignalDetector};
use crate::domain::{
    Severity, Signal, SignalMetadata, SignalType, TemporalScope,
};

/// Pairs `Revert "..."` commits with the original commit they undo.
pub struct RevertPairDetector {
    revert_subject: Regex,
    reverts_commit: Regex,
}

impl RevertPairDetector {
    pub fn new() -> Self {
        Self {
            revert_subject: Regex::new(r#"^Revert "(.+)""#).expect("static revert regex"),
            reverts_commit: Regex::new(r"This reverts commit ([0-9a-f]{7,40})")
                .expect("static reverts-commit regex"),
        }
    }
}

impl Default for RevertPairDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalDetector for RevertPairDetector {
    fn name(&self) -> &'static str {
        "revert_pair"
    }

    fn detect(&self, view: &HistoryView, detected_at: &str) -> Vec<Signal> {
        let mut signals = Vec::new();
        for revert in view.summaries() {
            let reverted_subject = self
                .revert_subject
                .captures(revert.subject())
                .map(|c| c[1].to_string());
            let reverted_sha = self
                .reverts_commit
                .captures(revert.body())
                .map(|c| c[1].to_string());
            if reverted_subject.is_none() && reverted_sha.is_none() {
                continue;
            }

            // Prefer the SHA from the body; fall back to subject matching.
            let original = reverted_sha
                .as_deref()
                .and_then(|sha| view.summary_for_sha_prefix(sha))
                .or_else(|| {
                    reverted_subject.as_deref().and_then(|subject| {
                        view.summaries().iter().find(|s| s.subject() == subject)
                    })
                });
            let Some(original) = original else {
                continue;
            };

            let affected_files: Vec<String> = view
                .files_for_sha(original.sha())
                .into_iter()
                .map(|f| f.to_string())
                .collect();
            let affected_refs: Vec<&str> = affected_files.iter().map(|s| s.as_str()).collect();
            let directory_scope = common_scope(&affected_refs);

            let days = match (parse_epoch(original.date()), parse_epoch(revert.date())) {
                (Some(start), Some(end)) => (end - start) / 86_400,
                _ => 0,
            };

            let contributing = vec![original.sha().to_string(), revert.sha().to_string()];
            let dominant = view.dominant_class(&contributing);
            let summary = format!(
                "Commit {} (\"{}\") was reverted by {} after {} day{}; files under {} were rolled back",
                original.short_sha(),
                original.subject(),
                revert.short_sha(),
                days,
                if days == 1 { "" } else { "s" },
                directory_scope
            );

            signals.push(Signal::new(
                SignalType::RevertPair,
                &[original.sha(), revert.sha()],
                summary,
                Severity::Caution,
                0.9,
                directory_scope,
                contributing,
                TemporalScope::new(original.date(), revert.date()),
                SignalMetadata::RevertPair {
                    original_sha: original.sha().to_string(),
                    revert_sha: revert.sha().to_string(),
                    time_to_revert_days: days,
                    affected_files,
                },
                dominant,
                detected_at.to_string(),
            ));
        }
        signals
    }
}
