use serde::{Deserialize, Serialize};

/// Minimum recorded changes before a profile is computed for a file.
pub const MIN_CHANGES_FOR_PROFILE: u32 = 2;

/// Per-file aggregate of ownership, stability and change frequency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileProfile {
    path: String,
    primary_owner: Option<FileOwner>,
    contributor_count: u32,
    /// 0 (volatile) to 100 (stable).
    stability_score: u32,
    total_changes: u32,
    revert_count: u32,
    fix_after_feature_count: u32,
    change_frequency: ChangeFrequency,
    /// 0 (safe) to 100 (risky).
    risk_score: u32,
    /// ISO-8601 date of the last recorded change.
    last_modified: String,
    active_signal_ids: Vec<String>,
}

impl FileProfile {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        path: String,
        primary_owner: Option<FileOwner>,
        contributor_count: u32,
        total_changes: u32,
        revert_count: u32,
        fix_after_feature_count: u32,
        change_frequency: ChangeFrequency,
        last_modified: String,
        active_signal_ids: Vec<String>,
    ) -> Self {
        let stability_score = stability_score(
            change_frequency,
            revert_count,
            fix_after_feature_count,
        );
        let risk_score = risk_score(
            stability_score,
            change_frequency,
            revert_count,
            fix_after_feature_count,
        );
        Self {
            path,
            primary_owner,
            contributor_count,
            stability_score,
            total_changes,
            revert_count,
            fix_after_feature_count,
            change_frequency,
            risk_score,
            last_modified,
            active_signal_ids,
        }
    }

    /// Reconstitutes from persisted data (used by the store adapter).
    #[allow(clippy::too_many_arguments)]
    pub fn reconstitute(
        path: String,
        primary_owner: Option<FileOwner>,
        contributor_count: u32,
        stability_score: u32,
        total_changes: u32,
        revert_count: u32,
        fix_after_feature_count: u32,
        change_frequency: ChangeFrequency,
        risk_score: u32,
        last_modified: String,
        active_signal_ids: Vec<String>,
    ) -> Self {
        Self {
            path,
            primary_owner,
            contributor_count,
            stability_score,
            total_changes,
            revert_count,
            fix_after_feature_count,
            change_frequency,
            risk_score,
            last_modified,
            active_signal_ids,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn primary_owner(&self) -> Option<&FileOwner> {
        self.primary_owner.as_ref()
    }

    pub fn contributor_count(&self) -> u32 {
        self.contributor_count
    }

    pub fn stability_score(&self) -> u32 {
        self.stability_score
    }

    pub fn total_changes(&self) -> u32 {
        self.total_changes
    }

    pub fn revert_count(&self) -> u32 {
        self.revert_count
    }

    pub fn fix_after_feature_count(&self) -> u32 {
        self.fix_after_feature_count
    }

    pub fn change_frequency(&self) -> ChangeFrequency {
        self.change_frequency
    }

    pub fn risk_score(&self) -> u32 {
        self.risk_score
    }

    pub fn last_modified(&self) -> &str {
        &self.last_modified
    }

    pub fn active_signal_ids(&self) -> &[String] {
        &self.active_signal_ids
    }
}

/// Leading contributor of a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileOwner {
    pub author: String,
    /// Share of the file's commits held by this author, in percent.
    pub percentage: f32,
    pub commits: u32,
    /// ISO-8601 date of the author's most recent change to the file.
    pub last_change: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeFrequency {
    Daily,
    Weekly,
    Monthly,
    Rare,
}

impl ChangeFrequency {
    /// Buckets a change count over an observed span of days.
    pub fn from_rate(total_changes: u32, span_days: i64) -> Self {
        if total_changes == 0 {
            return ChangeFrequency::Rare;
        }
        let span_days = span_days.max(1) as f64;
        let per_day = total_changes as f64 / span_days;
        if per_day >= 0.5 {
            ChangeFrequency::Daily
        } else if per_day >= 1.0 / 7.0 {
            ChangeFrequency::Weekly
        } else if per_day >= 1.0 / 30.0 {
            ChangeFrequency::Monthly
        } else {
            ChangeFrequency::Rare
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeFrequency::Daily => "daily",
            ChangeFrequency::Weekly => "weekly",
            ChangeFrequency::Monthly => "monthly",
            ChangeFrequency::Rare => "rare",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "daily" => ChangeFrequency::Daily,
            "weekly" => ChangeFrequency::Weekly,
            "monthly" => ChangeFrequency::Monthly,
            _ => ChangeFrequency::Rare,
        }
    }
}

/// Stability: 100 minus penalties for change cadence, reverts and
/// fix-after-feature churn. Deterministic in its inputs.
pub fn stability_score(
    frequency: ChangeFrequency,
    revert_count: u32,
    fix_after_feature_count: u32,
) -> u32 {
    let frequency_penalty = match frequency {
        ChangeFrequency::Daily => 40,
        ChangeFrequency::Weekly => 25,
        ChangeFrequency::Monthly => 10,
        ChangeFrequency::Rare => 0,
    };
    let revert_penalty = (revert_count * 15).min(30);
    let fix_penalty = (fix_after_feature_count * 10).min(20);
    100u32.saturating_sub(frequency_penalty + revert_penalty + fix_penalty)
}

/// Risk rises as stability falls and as reverts/fix chains accumulate.
pub fn risk_score(
    stability: u32,
    frequency: ChangeFrequency,
    revert_count: u32,
    fix_after_feature_count: u32,
) -> u32 {
    let frequency_factor = match frequency {
        ChangeFrequency::Daily => 25,
        ChangeFrequency::Weekly => 15,
        ChangeFrequency::Monthly => 5,
        ChangeFrequency::Rare => 0,
    };
    let score = (100 - stability) / 2
        + (revert_count * 10).min(30)
        + (fix_after_feature_count * 5).min(15)
        + frequency_factor;
    score.min(100)
}
