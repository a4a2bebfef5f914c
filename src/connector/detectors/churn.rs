use std::collections::HashMap;

use super::{parent_dir, parse_epoch, HistoryView, SignalDetector};
use crate::domain::{
    ChurnTrend, Severity, Signal, SignalMetadata, SignalType, TemporalScope,
};

/// Flags files whose change count exceeds the mean by this many standard
/// deviations.
const DEFAULT_SIGMA_MULTIPLIER: f64 = 2.0;

/// Statistical outlier detection over per-file change counts, with a
/// 30-versus-60-day trend.
pub struct ChurnHotspotDetector {
    sigma_multiplier: f64,
}

impl ChurnHotspotDetector {
    pub fn new() -> Self {
        Self {
            sigma_multiplier: DEFAULT_SIGMA_MULTIPLIER,
        }
    }

    pub fn with_sigma_multiplier(sigma_multiplier: f64) -> Self {
        Self { sigma_multiplier }
    }
}

impl Default for ChurnHotspotDetector {
    fn default() -> Self {
        Self::new()
    }
}

struct FileStats {
    count: u32,
    shas: Vec<String>,
    timestamps: Vec<i64>,
    first_date: String,
    last_date: String,
}

impl SignalDetector for ChurnHotspotDetector {
    fn name(&self) -> &'static str {
        "churn_hotspot"
    }

    fn detect(&self, view: &HistoryView, detected_at: &str) -> Vec<Signal> {
        let mut per_file: HashMap<&str, FileStats> = HashMap::new();
        for diff in view.diffs() {
            let entry = per_file.entry(diff.file_path()).or_insert_with(|| FileStats {
                count: 0,
                shas: Vec::new(),
                timestamps: Vec::new(),
                first_date: diff.date().to_string(),
                last_date: diff.date().to_string(),
            });
            entry.count += 1;
            entry.shas.push(diff.sha().to_string());
            if let Some(ts) = parse_epoch(diff.date()) {
                entry.timestamps.push(ts);
            }
            if diff.date() < entry.first_date.as_str() {
                entry.first_date = diff.date().to_string();
            }
            if diff.date() > entry.last_date.as_str() {
                entry.last_date = diff.date().to_string();
            }
        }
        if per_file.is_empty() {
            return Vec::new();
        }

        let counts: Vec<f64> = per_file.values().map(|s| s.count as f64).collect();
        let mean = counts.iter().sum::<f64>() / counts.len() as f64;
        let variance =
            counts.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / counts.len() as f64;
        let std_dev = variance.sqrt();
        let threshold = mean + self.sigma_multiplier * std_dev;

        let reference = view.reference_epoch();
        let mut signals: Vec<Signal> = Vec::new();
        for (file, stats) in per_file {
            if (stats.count as f64) <= threshold {
                continue;
            }
            let sigma_distance = if std_dev > 0.0 {
                (stats.count as f64 - mean) / std_dev
            } else {
                0.0
            };

            let recent = stats
                .timestamps
                .iter()
                .filter(|&&ts| ts > reference - 30 * 86_400)
                .count() as f64;
            let previous = stats
                .timestamps
                .iter()
                .filter(|&&ts| ts > reference - 60 * 86_400 && ts <= reference - 30 * 86_400)
                .count() as f64;
            let trend = if previous == 0.0 {
                if recent > 0.0 {
                    ChurnTrend::Increasing
                } else {
                    ChurnTrend::Stable
                }
            } else {
                let ratio = recent / previous;
                if ratio > 1.5 {
                    ChurnTrend::Increasing
                } else if ratio < 0.5 {
                    ChurnTrend::Decreasing
                } else {
                    ChurnTrend::Stable
                }
            };

            let severity = if sigma_distance > 3.0 {
                Severity::Warning
            } else {
                Severity::Caution
            };
            let confidence = (0.6 + 0.1 * sigma_distance).min(0.95) as f32;
            let dominant = view.dominant_class(&stats.shas);
            let summary = format!(
                "{} changed {} times ({:.1} standard deviations above the mean of {:.1}); trend is {}",
                file,
                stats.count,
                sigma_distance,
                mean,
                trend.as_str()
            );

            signals.push(Signal::new(
                SignalType::ChurnHotspot,
                &[file],
                summary,
                severity,
                confidence,
                parent_dir(file),
                stats.shas,
                TemporalScope::new(stats.first_date, stats.last_date),
                SignalMetadata::ChurnHotspot {
                    file: file.to_string(),
                    change_count: stats.count,
                    mean,
                    std_dev,
                    sigma_distance,
                    trend,
                },
                dominant,
                detected_at.to_string(),
            ));
        }

        // Hottest first.
        signals.sort_by(|a, b| {
            let da = sigma_of(a);
            let db = sigma_of(b);
            db.partial_cmp(&da).unwrap_or(std::cmp::Ordering::Equal)
        });
        signals
    }
}

fn sigma_of(signal: &Signal) -> f64 {
    match signal.metadata() {
        SignalMetadata::ChurnHotspot { sigma_distance, .. } => *sigma_distance,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::view_from_commits;
    use super::*;

    #[test]
    fn test_outlier_file_is_flagged() {
        // One file changed 8 times, five files changed once.
        let mut specs: Vec<(String, &str, String, String, Vec<&str>)> = Vec::new();
        for i in 0..8 {
            specs.push((
                format!("hot{:02}", i),
                "Alice",
                format!("2024-03-{:02}T10:00:00+00:00", i + 1),
                format!("feat: change hot {}", i),
                vec!["src/core/hot.ts"],
            ));
        }
        for i in 0..5 {
            specs.push((
                format!("cold{:02}", i),
                "Bob",
                format!("2024-02-{:02}T10:00:00+00:00", i + 1),
                format!("feat: touch cold {}", i),
                vec![match i {
                    0 => "src/a.ts",
                    1 => "src/b.ts",
                    2 => "src/c.ts",
                    3 => "src/d.ts",
                    _ => "src/e.ts",
                }],
            ));
        }
        let owned: Vec<(&str, &str, &str, &str, &[&str])> = specs
            .iter()
            .map(|(sha, author, date, subject, files)| {
                (
                    sha.as_str(),
                    *author,
                    date.as_str(),
                    subject.as_str(),
                    files.as_slice(),
                )
            })
            .collect();
        let view = view_from_commits(&owned);

        let signals = ChurnHotspotDetector::new().detect(&view, "2024-03-10T00:00:00Z");
        assert_eq!(signals.len(), 1);
        let signal = &signals[0];
        assert_eq!(signal.directory_scope(), "src/core");
        match signal.metadata() {
            SignalMetadata::ChurnHotspot {
                file, change_count, ..
            } => {
                assert_eq!(file, "src/core/hot.ts");
                assert_eq!(*change_count, 8);
            }
            other => panic!("wrong metadata: {:?}", other),
        }
    }

    #[test]
    fn test_uniform_churn_yields_nothing() {
        let view = view_from_commits(&[
            (
                "aaa",
                "Alice",
                "2024-03-01T10:00:00+00:00",
                "feat: one",
                &["src/a.ts"],
            ),
            (
                "bbb",
                "Bob",
                "2024-03-02T10:00:00+00:00",
                "feat: two",
                &["src/b.ts"],
            ),
        ]);
        let signals = ChurnHotspotDetector::new().detect(&view, "2024-03-03T00:00:00Z");
        assert!(signals.is_empty());
    }
}
