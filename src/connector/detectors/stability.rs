use std::collections::BTreeMap;

use chrono::{TimeZone, Utc};

use super::{lower_bound, parse_epoch, upper_bound, HistoryView, SignalDetector};
use crate::domain::{
    Severity, ShiftDirection, Signal, SignalMetadata, SignalType, TemporalScope,
};

const DAY: i64 = 86_400;

/// Compares per-directory change counts across the last three 30-day
/// windows and flags directions of travel.
pub struct StabilityShiftDetector;

impl StabilityShiftDetector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StabilityShiftDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Directory key: first two path segments of the file's directory.
fn window_dir(path: &str) -> Option<String> {
    let dir = match path.rsplit_once('/') {
        Some((dir, _)) => dir,
        None => return None,
    };
    let segments: Vec<&str> = dir.split('/').filter(|s| !s.is_empty()).collect();
    match segments.len() {
        0 => None,
        1 => Some(segments[0].to_string()),
        _ => Some(format!("{}/{}", segments[0], segments[1])),
    }
}

fn iso(epoch: i64) -> String {
    Utc.timestamp_opt(epoch, 0)
        .single()
        .map(|d| d.to_rfc3339())
        .unwrap_or_default()
}

impl SignalDetector for StabilityShiftDetector {
    fn name(&self) -> &'static str {
        "stability_shift"
    }

    fn detect(&self, view: &HistoryView, detected_at: &str) -> Vec<Signal> {
        let reference = view.reference_epoch();
        if reference == 0 {
            return Vec::new();
        }

        let mut per_dir: BTreeMap<String, Vec<(i64, String)>> = BTreeMap::new();
        for diff in view.diffs() {
            let Some(dir) = window_dir(diff.file_path()) else {
                continue;
            };
            let Some(ts) = parse_epoch(diff.date()) else {
                continue;
            };
            per_dir.entry(dir).or_default().push((ts, diff.sha().to_string()));
        }

        let mut signals = Vec::new();
        for (dir, mut entries) in per_dir {
            entries.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
            let timestamps: Vec<i64> = entries.iter().map(|(ts, _)| *ts).collect();

            let count_in = |from: i64, to: i64| -> u32 {
                // (from, to] via binary search on the sorted timestamps.
                (upper_bound(&timestamps, to) - upper_bound(&timestamps, from)) as u32
            };
            let recent = count_in(reference - 30 * DAY, reference);
            let previous = count_in(reference - 60 * DAY, reference - 30 * DAY);

            let direction = if previous >= 3 && (recent as f64) < 0.5 * previous as f64 {
                ShiftDirection::Stabilized
            } else if recent >= 3 && (recent as f64) > 2.0 * previous as f64 {
                ShiftDirection::Destabilized
            } else {
                continue;
            };
            let severity = match direction {
                ShiftDirection::Stabilized => Severity::Info,
                ShiftDirection::Destabilized => Severity::Caution,
            };

            let window_start = reference - 60 * DAY;
            let start_index = lower_bound(&timestamps, window_start);
            let contributing: Vec<String> = entries[start_index..]
                .iter()
                .map(|(_, sha)| sha.clone())
                .collect();
            let dominant = view.dominant_class(&contributing);
            let summary = format!(
                "{} has {} ({} changes in the last 30 days vs {} in the 30 before)",
                dir,
                direction.as_str(),
                recent,
                previous
            );

            signals.push(Signal::new(
                SignalType::StabilityShift,
                &[dir.as_str(), direction.as_str()],
                summary,
                severity,
                0.7,
                dir.clone(),
                contributing,
                TemporalScope::new(iso(window_start), iso(reference)),
                SignalMetadata::StabilityShift {
                    directory: dir.clone(),
                    recent_changes: recent,
                    previous_changes: previous,
                    direction,
                },
                dominant,
                detected_at.to_string(),
            ));
        }
        signals
    }
}
