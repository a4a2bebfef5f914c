use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::DecisionClass;

/// Most contributing SHAs a signal will retain.
pub const MAX_CONTRIBUTING_SHAS: usize = 20;

/// Deterministic signal identifier: 16 hex chars of SHA-256 over the signal
/// type and its distinguishing key parts, joined with `:`.
pub fn signal_id(signal_type: SignalType, key_parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(signal_type.as_str().as_bytes());
    for part in key_parts {
        hasher.update(b":");
        hasher.update(part.as_bytes());
    }
    let digest = hasher.finalize();
    let mut id = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        id.push_str(&format!("{:02x}", byte));
    }
    id
}

/// A durable judgment derived from the history index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    id: String,
    signal_type: SignalType,
    /// Human-readable description; this is the embedded text.
    summary: String,
    severity: Severity,
    /// In `[0, 1]`.
    confidence: f32,
    /// `"."` means repo root; otherwise a repo-relative directory.
    directory_scope: String,
    contributing_shas: Vec<String>,
    temporal_scope: TemporalScope,
    metadata: SignalMetadata,
    /// Majority decision class of the contributing commits.
    dominant_class: DecisionClass,
    /// RFC 3339 timestamp of the detection run.
    detected_at: String,
}

impl Signal {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        signal_type: SignalType,
        key_parts: &[&str],
        summary: String,
        severity: Severity,
        confidence: f32,
        directory_scope: String,
        mut contributing_shas: Vec<String>,
        temporal_scope: TemporalScope,
        metadata: SignalMetadata,
        dominant_class: DecisionClass,
        detected_at: String,
    ) -> Self {
        contributing_shas.truncate(MAX_CONTRIBUTING_SHAS);
        Self {
            id: signal_id(signal_type, key_parts),
            signal_type,
            summary,
            severity,
            confidence: confidence.clamp(0.0, 1.0),
            directory_scope,
            contributing_shas,
            temporal_scope,
            metadata,
            dominant_class,
            detected_at,
        }
    }

    /// Reconstitutes from persisted data (used by the store adapter).
    #[allow(clippy::too_many_arguments)]
    pub fn reconstitute(
        id: String,
        signal_type: SignalType,
        summary: String,
        severity: Severity,
        confidence: f32,
        directory_scope: String,
        contributing_shas: Vec<String>,
        temporal_scope: TemporalScope,
        metadata: SignalMetadata,
        dominant_class: DecisionClass,
        detected_at: String,
    ) -> Self {
        Self {
            id,
            signal_type,
            summary,
            severity,
            confidence,
            directory_scope,
            contributing_shas,
            temporal_scope,
            metadata,
            dominant_class,
            detected_at,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn signal_type(&self) -> SignalType {
        self.signal_type
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn directory_scope(&self) -> &str {
        &self.directory_scope
    }

    pub fn contributing_shas(&self) -> &[String] {
        &self.contributing_shas
    }

    pub fn temporal_scope(&self) -> &TemporalScope {
        &self.temporal_scope
    }

    pub fn metadata(&self) -> &SignalMetadata {
        &self.metadata
    }

    pub fn dominant_class(&self) -> DecisionClass {
        self.dominant_class
    }

    pub fn detected_at(&self) -> &str {
        &self.detected_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    RevertPair,
    FixChain,
    ChurnHotspot,
    Ownership,
    AdoptionCycle,
    StabilityShift,
    BreakingChange,
}

impl SignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::RevertPair => "revert_pair",
            SignalType::FixChain => "fix_chain",
            SignalType::ChurnHotspot => "churn_hotspot",
            SignalType::Ownership => "ownership",
            SignalType::AdoptionCycle => "adoption_cycle",
            SignalType::StabilityShift => "stability_shift",
            SignalType::BreakingChange => "breaking_change",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "revert_pair" => Some(SignalType::RevertPair),
            "fix_chain" => Some(SignalType::FixChain),
            "churn_hotspot" => Some(SignalType::ChurnHotspot),
            "ownership" => Some(SignalType::Ownership),
            "adoption_cycle" => Some(SignalType::AdoptionCycle),
            "stability_shift" => Some(SignalType::StabilityShift),
            "breaking_change" => Some(SignalType::BreakingChange),
        _ => None,
        }
    }
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Caution,
    Warning,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Caution => "caution",
            Severity::Warning => "warning",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "warning" => Severity::Warning,
            "caution" => Severity::Caution,
            _ => Severity::Info,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Closed date range a signal covers. Both ends are ISO-8601 strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalScope {
    pub start: String,
    pub end: String,
}

impl TemporalScope {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        let start = start.into();
        let end = end.into();
        debug_assert!(start <= end, "temporal scope start must not exceed end");
        Self { start, end }
    }
}

/// Per-type metadata. One tagged union so the store serializes every variant
/// through a single JSON column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalMetadata {
    RevertPair {
        original_sha: String,
        revert_sha: String,
        time_to_revert_days: i64,
        affected_files: Vec<String>,
    },
    FixChain {
        feat_sha: String,
        fix_count: u32,
        day_span: i64,
        files: Vec<String>,
    },
    ChurnHotspot {
        file: String,
        change_count: u32,
        mean: f64,
        std_dev: f64,
        sigma_distance: f64,
        trend: ChurnTrend,
    },
    Ownership {
        target: String,
        is_directory: bool,
        total_commits: u32,
        top_contributors: Vec<Contributor>,
    },
    AdoptionCycle {
        dependency: String,
        manifest: String,
        cycle_count: u32,
        transitions: u32,
        current_status: AdoptionStatus,
    },
    StabilityShift {
        directory: String,
        recent_changes: u32,
        previous_changes: u32,
        direction: ShiftDirection,
    },
    BreakingChange {
        sha: String,
        author_count: u32,
        fix_shas: Vec<String>,
        fix_authors: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contributor {
    pub author: String,
    pub commits: u32,
    pub percentage: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChurnTrend {
    Increasing,
    Decreasing,
    Stable,
}

impl ChurnTrend {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChurnTrend::Increasing => "increasing",
            ChurnTrend::Decreasing => "decreasing",
            ChurnTrend::Stable => "stable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdoptionStatus {
    Added,
    Removed,
}

impl AdoptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdoptionStatus::Added => "added",
            AdoptionStatus::Removed => "removed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftDirection {
    Stabilized,
    Destabilized,
}

impl ShiftDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShiftDirection::Stabilized => "stabilized",
            ShiftDirection::Destabilized => "destabilized",
        }
    }
}
