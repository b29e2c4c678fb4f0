use std::collections::BTreeMap;

use serde::Serialize;
use sqlx::FromRow;

use crate::models::interview::STATUS_COMPLETED;

/// The slice of an interview the aggregates need.
#[derive(Debug, Clone, FromRow)]
pub struct InterviewScore {
    pub status: String,
    pub overall_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewAggregate {
    pub total_interviews: i64,
    pub completed_interviews: i64,
    /// Mean overall score of completed interviews that were scored.
    pub average_score: f64,
    #[serde(rename = "categoryBreakdown")]
    pub status_breakdown: BTreeMap<String, i64>,
}

pub fn aggregate(interviews: &[InterviewScore]) -> InterviewAggregate {
    let mut status_breakdown = BTreeMap::new();
    let mut completed = 0i64;
    let mut score_sum = 0.0;
    let mut scored = 0u32;

    for interview in interviews {
        *status_breakdown.entry(interview.status.clone()).or_insert(0) += 1;
        if interview.status == STATUS_COMPLETED {
            completed += 1;
            if let Some(score) = interview.overall_score {
                score_sum += score;
                scored += 1;
            }
        }
    }

    InterviewAggregate {
        total_interviews: interviews.len() as i64,
        completed_interviews: completed,
        average_score: if scored == 0 {
            0.0
        } else {
            round1(score_sum / scored as f64)
        },
        status_breakdown,
    }
}

/// Whole-number percentage, 0 when there is nothing to divide by.
pub fn completion_rate(completed: i64, total: i64) -> i64 {
    if total <= 0 {
        return 0;
    }
    ((completed as f64 / total as f64) * 100.0).round() as i64
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(status: &str, overall: Option<f64>) -> InterviewScore {
        InterviewScore {
            status: status.to_string(),
            overall_score: overall,
        }
    }

    #[test]
    fn test_empty_aggregate() {
        let agg = aggregate(&[]);
        assert_eq!(agg.total_interviews, 0);
        assert_eq!(agg.completed_interviews, 0);
        assert_eq!(agg.average_score, 0.0);
        assert!(agg.status_breakdown.is_empty());
    }

    #[test]
    fn test_average_ignores_unscored_and_open_interviews() {
        let agg = aggregate(&[
            score("completed", Some(80.0)),
            score("completed", Some(91.0)),
            score("completed", None),
            score("scheduled", Some(10.0)),
            score("cancelled", None),
        ]);
        assert_eq!(agg.total_interviews, 5);
        assert_eq!(agg.completed_interviews, 3);
        assert_eq!(agg.average_score, 85.5);
        assert_eq!(agg.status_breakdown["completed"], 3);
        assert_eq!(agg.status_breakdown["scheduled"], 1);
        assert_eq!(agg.status_breakdown["cancelled"], 1);
    }

    #[test]
    fn test_breakdown_serializes_under_frontend_name() {
        let value = serde_json::to_value(aggregate(&[score("scheduled", None)])).unwrap();
        assert_eq!(value["categoryBreakdown"]["scheduled"], 1);
        assert_eq!(value["totalInterviews"], 1);
    }

    #[test]
    fn test_completion_rate() {
        assert_eq!(completion_rate(0, 0), 0);
        assert_eq!(completion_rate(1, 3), 33);
        assert_eq!(completion_rate(2, 3), 67);
        assert_eq!(completion_rate(4, 4), 100);
    }
}
