use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::application::{EmbeddingProvider, ProfileStore, SignalStore};
use crate::connector::detectors::{parent_dir, parse_epoch};
use crate::domain::{
    DecisionClass, DomainError, FileProfile, Severity, Signal, SignalType,
};

/// Decay half-life in days for revert and breaking-change signals.
const SLOW_HALF_LIFE: f64 = 180.0;
/// Decay half-life for everything else.
const FAST_HALF_LIFE: f64 = 90.0;
/// Signals whose decayed weight drops under this are not surfaced.
const RELEVANCE_FLOOR: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningCategory {
    Stability,
    Ownership,
    Pattern,
    Churn,
    Breaking,
}

impl WarningCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningCategory::Stability => "stability",
            WarningCategory::Ownership => "ownership",
            WarningCategory::Pattern => "pattern",
            WarningCategory::Churn => "churn",
            WarningCategory::Breaking => "breaking",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Warning {
    pub severity: Severity,
    pub category: WarningCategory,
    pub message: String,
    pub file: Option<String>,
    pub signal_id: Option<String>,
}

/// Ownership facts surfaced separately from the warning list.
#[derive(Debug, Clone, Serialize)]
pub struct OwnershipNote {
    pub path: String,
    pub owner: Option<String>,
    pub percentage: Option<f32>,
    pub last_active: Option<String>,
    pub contributor_count: u32,
}

#[derive(Debug, Serialize)]
pub struct Assessment {
    pub warnings: Vec<Warning>,
    pub ownership: Vec<OwnershipNote>,
    pub profiled_files: u32,
}

/// Answers "what do I need to know before touching these files?" by
/// fusing file profiles with directory-scoped signals.
pub struct AssessUseCase {
    profiles: Arc<dyn ProfileStore>,
    signals: Arc<dyn SignalStore>,
    provider: Arc<dyn EmbeddingProvider>,
}

impl AssessUseCase {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        signals: Arc<dyn SignalStore>,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            profiles,
            signals,
            provider,
        }
    }

    pub async fn execute(
        &self,
        files: &[String],
        change_type: Option<&str>,
        query: Option<&str>,
    ) -> Result<Assessment, DomainError> {
        self.execute_at(files, change_type, query, Utc::now()).await
    }

    pub async fn execute_at(
        &self,
        files: &[String],
        change_type: Option<&str>,
        query: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Assessment, DomainError> {
        let mut warnings: Vec<Warning> = Vec::new();
        let mut ownership: Vec<OwnershipNote> = Vec::new();
        let mut profiled = 0u32;

        // Profiles for the candidates and their siblings.
        let mut gathered_signals: HashMap<String, Signal> = HashMap::new();
        for file in files {
            let dir = parent_dir(file);

            let profile = self.profiles.get(file).await?;
            let siblings = if dir == "." {
                Vec::new()
            } else {
                self.profiles.for_prefix(&format!("{}/", dir)).await?
            };
            debug!("{}: {} sibling profiles", file, siblings.len());

            if let Some(profile) = &profile {
                profiled += 1;
                self.profile_warnings(profile, change_type, &mut warnings, &mut ownership);
            }

            // Signals scoped to every containing directory plus the root.
            let mut scope = dir;
            loop {
                for signal in self.signals.for_directory(&scope).await? {
                    gathered_signals.insert(signal.id().to_string(), signal);
                }
                match scope.rsplit_once('/') {
                    Some((parent, _)) => scope = parent.to_string(),
                    None => break,
                }
            }
        }

        // Optional free-text search over the signal index.
        if let Some(query) = query {
            let vector = self
                .provider
                .embed_single(query, Some("search_query: "))
                .await?;
            for (signal, _score) in self.signals.search(&vector, 10).await? {
                gathered_signals.insert(signal.id().to_string(), signal);
            }
        }

        let mut signal_list: Vec<Signal> = gathered_signals.into_values().collect();
        signal_list.sort_by(|a, b| a.id().cmp(b.id()));
        for signal in &signal_list {
            if let Some(warning) = self.signal_warning(signal, now) {
                warnings.push(warning);
            }
        }

        // warning < caution < info.
        warnings.sort_by(|a, b| b.severity.cmp(&a.severity));
        Ok(Assessment {
            warnings,
            ownership,
            profiled_files: profiled,
        })
    }

    fn profile_warnings(
        &self,
        profile: &FileProfile,
        change_type: Option<&str>,
        warnings: &mut Vec<Warning>,
        ownership: &mut Vec<OwnershipNote>,
    ) {
        let stability = profile.stability_score();
        if stability < 30 {
            warnings.push(Warning {
                severity: Severity::Warning,
                category: WarningCategory::Stability,
                message: format!(
                    "{} is unstable (stability {}/100, {} changes, {} reverts)",
                    profile.path(),
                    stability,
                    profile.total_changes(),
                    profile.revert_count()
                ),
                file: Some(profile.path().to_string()),
                signal_id: None,
            });
        } else if (30..50).contains(&stability) && change_type == Some("refactor") {
            warnings.push(Warning {
                severity: Severity::Caution,
                category: WarningCategory::Stability,
                message: format!(
                    "{} is only moderately stable ({}/100); refactors here have a history of follow-up fixes",
                    profile.path(),
                    stability
                ),
                file: Some(profile.path().to_string()),
                signal_id: None,
            });
        }

        match profile.primary_owner() {
            Some(owner) => {
                warnings.push(Warning {
                    severity: Severity::Info,
                    category: WarningCategory::Ownership,
                    message: format!(
                        "{} is owned by {} ({:.0}% of changes, last active {})",
                        profile.path(),
                        owner.author,
                        owner.percentage,
                        owner.last_change
                    ),
                    file: Some(profile.path().to_string()),
                    signal_id: None,
                });
                ownership.push(OwnershipNote {
                    path: profile.path().to_string(),
                    owner: Some(owner.author.clone()),
                    percentage: Some(owner.percentage),
                    last_active: Some(owner.last_change.clone()),
                    contributor_count: profile.contributor_count(),
                });
            }
            None => {
                warnings.push(Warning {
                    severity: Severity::Info,
                    category: WarningCategory::Ownership,
                    message: format!(
                        "{} has no clear owner ({} contributors)",
                        profile.path(),
                        profile.contributor_count()
                    ),
                    file: Some(profile.path().to_string()),
                    signal_id: None,
                });
                ownership.push(OwnershipNote {
                    path: profile.path().to_string(),
                    owner: None,
                    percentage: None,
                    last_active: None,
                    contributor_count: profile.contributor_count(),
                });
            }
        }
    }

    /// Signal-type mapping under temporal decay and decision-class weight.
    fn signal_warning(&self, signal: &Signal, now: DateTime<Utc>) -> Option<Warning> {
        let (severity, category, half_life) = match signal.signal_type() {
            SignalType::RevertPair => {
                (Severity::Caution, WarningCategory::Pattern, SLOW_HALF_LIFE)
            }
            SignalType::FixChain => {
                (signal.severity(), WarningCategory::Pattern, FAST_HALF_LIFE)
            }
            SignalType::ChurnHotspot => (Severity::Info, WarningCategory::Churn, FAST_HALF_LIFE),
            SignalType::BreakingChange => {
                (Severity::Warning, WarningCategory::Breaking, SLOW_HALF_LIFE)
            }
            SignalType::AdoptionCycle => {
                (Severity::Warning, WarningCategory::Pattern, FAST_HALF_LIFE)
            }
            SignalType::Ownership | SignalType::StabilityShift => return None,
        };

        let age_days = parse_epoch(&signal.temporal_scope().end)
            .map(|ts| ((now.timestamp() - ts) as f64 / 86_400.0).max(0.0))
            .unwrap_or(0.0);
        let decay = 0.5f64.powf(age_days / half_life);
        let weight = match signal.dominant_class() {
            DecisionClass::Decision => 1.5,
            DecisionClass::Routine => 0.5,
            DecisionClass::Unknown => 1.0,
        };
        if decay * weight < RELEVANCE_FLOOR {
            return None;
        }

        Some(Warning {
            severity,
            category,
            message: signal.summary().to_string(),
            file: None,
            signal_id: Some(signal.id().to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use crate::domain::{
        ChangeFrequency, SignalMetadata, TemporalScope,
    };

    fn signal_at(end_date: &str, class: DecisionClass) -> Signal {
        Signal::new(
            SignalType::RevertPair,
            &["orig", "rev"],
            "old revert".to_string(),
            Severity::Caution,
            0.9,
            "src/auth".to_string(),
            vec!["orig".to_string(), "rev".to_string()],
            TemporalScope::new("2020-01-01T00:00:00+00:00", end_date),
            SignalMetadata::RevertPair {
                original_sha: "orig".to_string(),
                revert_sha: "rev".to_string(),
                time_to_revert_days: 1,
                affected_files: vec!["src/auth/login.ts".to_string()],
            },
            class,
            "2024-01-01T00:00:00Z".to_string(),
        )
    }

    struct NoopProvider;

    #[async_trait::async_trait]
    impl EmbeddingProvider for NoopProvider {
        fn name(&self) -> &str {
            "noop"
        }
        fn supports_prefixes(&self) -> bool {
            false
        }
        async fn health_check(&self) -> Result<(), DomainError> {
            Ok(())
        }
        async fn probe_dimension(&self) -> Result<usize, DomainError> {
            Ok(4)
        }
        async fn embed_batch(
            &self,
            texts: &[String],
            _options: &crate::application::EmbedOptions,
        ) -> Result<Vec<Vec<f32>>, DomainError> {
            Ok(texts.iter().map(|_| vec![0.0; 4]).collect())
        }
        async fn embed_single(
            &self,
            _text: &str,
            _prefix: Option<&str>,
        ) -> Result<Vec<f32>, DomainError> {
            Ok(vec![0.0; 4])
        }
    }

    fn use_case() -> AssessUseCase {
        // Stores are unused in the decay tests; the mock methods suffice.
        AssessUseCase::new(
            Arc::new(EmptyProfiles),
            Arc::new(EmptySignals),
            Arc::new(NoopProvider),
        )
    }

    struct EmptyProfiles;

    #[async_trait::async_trait]
    impl ProfileStore for EmptyProfiles {
        async fn init(&self) -> Result<(), DomainError> {
            Ok(())
        }
        async fn overwrite(&self, _profiles: &[FileProfile]) -> Result<(), DomainError> {
            Ok(())
        }
        async fn get(&self, _path: &str) -> Result<Option<FileProfile>, DomainError> {
            Ok(None)
        }
        async fn for_prefix(&self, _prefix: &str) -> Result<Vec<FileProfile>, DomainError> {
            Ok(Vec::new())
        }
        async fn count(&self) -> Result<u64, DomainError> {
            Ok(0)
        }
    }

    struct EmptySignals;

    #[async_trait::async_trait]
    impl SignalStore for EmptySignals {
        async fn init(&self, _dimension: usize) -> Result<(), DomainError> {
            Ok(())
        }
        async fn overwrite(
            &self,
            _signals: &[Signal],
            _vectors: &[Vec<f32>],
        ) -> Result<(), DomainError> {
            Ok(())
        }
        async fn search(
            &self,
            _vector: &[f32],
            _limit: usize,
        ) -> Result<Vec<(Signal, f32)>, DomainError> {
            Ok(Vec::new())
        }
        async fn for_directory(&self, _directory: &str) -> Result<Vec<Signal>, DomainError> {
            Ok(Vec::new())
        }
        async fn all(&self) -> Result<Vec<Signal>, DomainError> {
            Ok(Vec::new())
        }
        async fn count(&self) -> Result<u64, DomainError> {
            Ok(0)
        }
    }

    #[test]
    fn test_fresh_revert_signal_surfaces_as_caution_pattern() {
        let uc = use_case();
        let now = chrono::Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).single().unwrap();
        let signal = signal_at("2024-02-15T00:00:00+00:00", DecisionClass::Unknown);
        let warning = uc.signal_warning(&signal, now).expect("warning");
        assert_eq!(warning.severity, Severity::Caution);
        assert_eq!(warning.category, WarningCategory::Pattern);
    }

    #[test]
    fn test_ancient_signal_decays_away() {
        let uc = use_case();
        let now = chrono::Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).single().unwrap();
        // ~4 years old with a 180-day half-life: decay far below 0.1.
        let signal = signal_at("2020-02-15T00:00:00+00:00", DecisionClass::Unknown);
        assert!(uc.signal_warning(&signal, now).is_none());
    }

    #[test]
    fn test_routine_weight_can_drop_a_borderline_signal() {
        let uc = use_case();
        let now = chrono::Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).single().unwrap();
        // ~540 days old: decay = 0.5^3 = 0.125. Unknown keeps it; routine
        // (0.5 weight) drops it under the 0.1 floor.
        let borderline = signal_at("2022-09-08T00:00:00+00:00", DecisionClass::Unknown);
        assert!(uc.signal_warning(&borderline, now).is_some());
        let routine = signal_at("2022-09-08T00:00:00+00:00", DecisionClass::Routine);
        assert!(uc.signal_warning(&routine, now).is_none());
    }

    #[test]
    fn test_profile_warning_thresholds() {
        let uc = use_case();
        let mut warnings = Vec::new();
        let mut ownership = Vec::new();
        // Daily churn + reverts + fix chains drives stability under 30.
        let volatile = FileProfile::new(
            "src/auth/login.ts".to_string(),
            None,
            4,
            40,
            2,
            2,
            ChangeFrequency::Daily,
            "2024-02-28T00:00:00+00:00".to_string(),
            vec![],
        );
        uc.profile_warnings(&volatile, None, &mut warnings, &mut ownership);
        assert!(warnings
            .iter()
            .any(|w| w.severity == Severity::Warning
                && w.category == WarningCategory::Stability));
        assert!(warnings
            .iter()
            .any(|w| w.category == WarningCategory::Ownership));
        assert_eq!(ownership.len(), 1);
        assert_eq!(ownership[0].contributor_count, 4);
    }
}
