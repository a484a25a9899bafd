use serde::Serialize;

use crate::model::ApprovalStatus;

/// A grade passes when it reaches this share of the lab's maximum score.
pub const PASS_THRESHOLD_PERCENT: f64 = 51.0;

pub fn round_2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

pub fn round_1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// `score / max_score * 100`, rounded to two decimals. Absent scores are 0.
pub fn percentage(score: Option<f64>, max_score: f64) -> f64 {
    match score {
        Some(s) if max_score > 0.0 => round_2(s / max_score * 100.0),
        _ => 0.0,
    }
}

pub fn approval_status(score: Option<f64>, max_score: f64) -> ApprovalStatus {
    match score {
        None => ApprovalStatus::Ungraded,
        Some(_) if percentage(score, max_score) >= PASS_THRESHOLD_PERCENT => {
            ApprovalStatus::Approved
        }
        Some(_) => ApprovalStatus::Failed,
    }
}

/// Arithmetic mean rounded to two decimals; 0 when there is nothing to average.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    round_2(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn ratio_1(total: i64, count: i64) -> f64 {
    if count > 0 {
        round_1(total as f64 / count as f64)
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSummary {
    pub count: usize,
    pub mean: f64,
    pub max: Option<f64>,
    pub min: Option<f64>,
    pub passed: usize,
    pub failed: usize,
    pub ungraded: usize,
}

/// Summarizes `(score, max_score)` pairs. Ungraded entries are counted but
/// excluded from the mean, extremes and pass/fail split.
pub fn summarize<I>(scores: I) -> ScoreSummary
where
    I: IntoIterator<Item = (Option<f64>, f64)>,
{
    let mut recorded: Vec<f64> = Vec::new();
    let mut passed = 0usize;
    let mut failed = 0usize;
    let mut ungraded = 0usize;

    for (score, max_score) in scores {
        match approval_status(score, max_score) {
            ApprovalStatus::Ungraded => {
                ungraded += 1;
                continue;
            }
            ApprovalStatus::Approved => passed += 1,
            ApprovalStatus::Failed => failed += 1,
        }
        if let Some(v) = score {
            recorded.push(v);
        }
    }

    ScoreSummary {
        count: recorded.len(),
        mean: mean(&recorded),
        max: recorded.iter().copied().reduce(f64::max),
        min: recorded.iter().copied().reduce(f64::min),
        passed,
        failed,
        ungraded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_and_status_follow_the_51_cutoff() {
        assert_eq!(percentage(Some(45.0), 100.0), 45.0);
        assert_eq!(approval_status(Some(45.0), 100.0), ApprovalStatus::Failed);
        assert_eq!(approval_status(Some(51.0), 100.0), ApprovalStatus::Approved);
        assert_eq!(approval_status(Some(10.0), 20.0), ApprovalStatus::Failed);
        assert_eq!(approval_status(Some(10.2), 20.0), ApprovalStatus::Approved);
        assert_eq!(approval_status(None, 100.0), ApprovalStatus::Ungraded);
    }

    #[test]
    fn zero_score_is_failed_not_ungraded() {
        assert_eq!(percentage(Some(0.0), 100.0), 0.0);
        assert_eq!(approval_status(Some(0.0), 100.0), ApprovalStatus::Failed);
    }

    #[test]
    fn summarize_skips_ungraded_entries() {
        let s = summarize(vec![
            (Some(80.0), 100.0),
            (None, 100.0),
            (Some(40.0), 100.0),
            (Some(15.0), 20.0),
        ]);
        assert_eq!(s.count, 3);
        assert_eq!(s.ungraded, 1);
        assert_eq!(s.passed, 2);
        assert_eq!(s.failed, 1);
        assert_eq!(s.max, Some(80.0));
        assert_eq!(s.min, Some(15.0));
        assert_eq!(s.mean, 45.0);
    }

    #[test]
    fn empty_summary_is_all_zero() {
        let s = summarize(Vec::new());
        assert_eq!(s.count, 0);
        assert_eq!(s.mean, 0.0);
        assert_eq!(s.max, None);
        assert_eq!(s.min, None);
    }

    #[test]
    fn ratio_rounds_to_one_decimal() {
        assert_eq!(ratio_1(5, 3), 1.7);
        assert_eq!(ratio_1(4, 0), 0.0);
    }
}
