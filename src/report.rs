//! Run summaries and report rendering
//!
//! Tallies a [`TestRun`] into pass/fail counts and a success rate, and
//! renders it as the plain-text report printed after a run or as JSON for
//! archiving.

use std::fmt;

use chrono::{DateTime, Local};
use serde::Serialize;
use uuid::Uuid;

use crate::catalog::escape_bytes;
use crate::constants::HEALTHY_SUCCESS_RATE;
use crate::error::FailureReason;
use crate::runner::{TestOutcome, TestRun};

/// Per-command verdict tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    Pass,
    Fail,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => write!(f, "PASS"),
            Verdict::Fail => write!(f, "FAIL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetailEntry {
    pub verdict: Verdict,
    pub outcome: TestOutcome,
}

/// Aggregated view of one run
#[derive(Debug, Clone)]
pub struct TestRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Local>,
    pub passed_count: usize,
    pub failed_count: usize,
    /// Percentage of attempted commands that passed; 0 when nothing ran
    pub success_rate_percent: f64,
    /// Catalog order
    pub ordered_detail: Vec<DetailEntry>,
    pub not_attempted: Vec<String>,
    pub cancelled: bool,
    pub total_catalog_size: usize,
    pub error: Option<String>,
}

impl TestRunSummary {
    pub fn attempted(&self) -> usize {
        self.passed_count + self.failed_count
    }

    pub fn all_passed(&self) -> bool {
        self.failed_count == 0 && self.error.is_none()
    }

    pub fn is_healthy(&self, threshold_percent: f64) -> bool {
        self.success_rate_percent >= threshold_percent
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    run_id: Uuid,
    started_at: DateTime<Local>,
    total_catalog_size: usize,
    attempted: usize,
    passed: usize,
    failed: usize,
    success_rate_percent: f64,
    cancelled: bool,
    error: Option<&'a str>,
    not_attempted: &'a [String],
    results: Vec<JsonResult<'a>>,
}

#[derive(Serialize)]
struct JsonResult<'a> {
    name: &'a str,
    verdict: Verdict,
    sent: String,
    received: String,
    elapsed_ms: u64,
    failure_reason: Option<FailureReason>,
}

/// Stateless outcome aggregation
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportAggregator;

impl ReportAggregator {
    pub fn summarize(run: &TestRun) -> TestRunSummary {
        let passed_count = run.outcomes.iter().filter(|o| o.passed).count();
        let failed_count = run.outcomes.len() - passed_count;
        let success_rate_percent = if run.outcomes.is_empty() {
            0.0
        } else {
            passed_count as f64 / run.outcomes.len() as f64 * 100.0
        };

        let ordered_detail = run
            .outcomes
            .iter()
            .map(|o| DetailEntry {
                verdict: if o.passed { Verdict::Pass } else { Verdict::Fail },
                outcome: o.clone(),
            })
            .collect();

        TestRunSummary {
            run_id: run.id,
            started_at: run.started_at,
            passed_count,
            failed_count,
            success_rate_percent,
            ordered_detail,
            not_attempted: run.not_attempted.clone(),
            cancelled: run.cancelled,
            total_catalog_size: run.total_catalog_size,
            error: run.error.as_ref().map(|e| e.to_string()),
        }
    }

    pub fn render_text(summary: &TestRunSummary) -> String {
        Self::render_text_with_threshold(summary, HEALTHY_SUCCESS_RATE)
    }

    /// Plain-text report; runs below `healthy_percent` are flagged
    pub fn render_text_with_threshold(summary: &TestRunSummary, healthy_percent: f64) -> String {
        let rule = "=".repeat(60);
        let mut out = String::new();

        out.push_str(&format!("{rule}\n"));
        if summary.cancelled {
            out.push_str("TEST SEQUENCE STOPPED\n");
        } else {
            out.push_str("TEST SEQUENCE COMPLETED\n");
        }
        out.push_str(&format!("{rule}\n"));
        out.push_str(&format!("Run: {} ({})\n", summary.run_id, summary.started_at.format("%Y-%m-%d %H:%M:%S")));
        out.push_str(&format!("Total Commands: {}\n", summary.total_catalog_size));
        out.push_str(&format!("Attempted: {}\n", summary.attempted()));
        out.push_str(&format!("Passed: {}\n", summary.passed_count));
        out.push_str(&format!("Failed: {}\n", summary.failed_count));
        out.push_str(&format!("Success Rate: {:.1}%", summary.success_rate_percent));
        if summary.is_healthy(healthy_percent) {
            out.push('\n');
        } else {
            out.push_str(" (below healthy threshold)\n");
        }
        if !summary.not_attempted.is_empty() {
            out.push_str(&format!("Not Attempted: {}\n", summary.not_attempted.len()));
        }
        if let Some(error) = &summary.error {
            out.push_str(&format!("Aborted: {error}\n"));
        }

        out.push_str("\nDETAILED RESULTS:\n");
        out.push_str(&format!("{}\n", "-".repeat(40)));
        for entry in &summary.ordered_detail {
            out.push_str(&format!("{:4} | {}", entry.verdict.to_string(), entry.outcome.name));
            if let Some(reason) = entry.outcome.failure_reason {
                out.push_str(&format!(" ({reason})"));
            }
            out.push('\n');
        }
        for name in &summary.not_attempted {
            out.push_str(&format!("---- | {name} (not attempted)\n"));
        }
        out.push_str(&format!("{rule}\n"));
        out
    }

    pub fn to_json(summary: &TestRunSummary) -> serde_json::Result<String> {
        let report = JsonReport {
            run_id: summary.run_id,
            started_at: summary.started_at,
            total_catalog_size: summary.total_catalog_size,
            attempted: summary.attempted(),
            passed: summary.passed_count,
            failed: summary.failed_count,
            success_rate_percent: summary.success_rate_percent,
            cancelled: summary.cancelled,
            error: summary.error.as_deref(),
            not_attempted: &summary.not_attempted,
            results: summary
                .ordered_detail
                .iter()
                .map(|e| JsonResult {
                    name: &e.outcome.name,
                    verdict: e.verdict,
                    sent: escape_bytes(&e.outcome.sent_bytes),
                    received: escape_bytes(&e.outcome.received_bytes),
                    elapsed_ms: e.outcome.elapsed.as_millis() as u64,
                    failure_reason: e.outcome.failure_reason,
                })
                .collect(),
        };
        serde_json::to_string_pretty(&report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn outcome(name: &str, passed: bool) -> TestOutcome {
        TestOutcome {
            name: name.to_string(),
            sent_bytes: b":GR#".to_vec(),
            received_bytes: if passed { b"12:34:56#".to_vec() } else { Vec::new() },
            elapsed: Duration::from_millis(120),
            passed,
            failure_reason: if passed { None } else { Some(FailureReason::Timeout) },
        }
    }

    #[test]
    fn test_empty_run_has_zero_rate() {
        let run = TestRun::new(24);
        let summary = ReportAggregator::summarize(&run);
        assert_eq!(summary.passed_count, 0);
        assert_eq!(summary.failed_count, 0);
        assert_eq!(summary.success_rate_percent, 0.0);
    }

    #[test]
    fn test_counts_and_rate() {
        let mut run = TestRun::new(4);
        run.outcomes = vec![outcome("a", true), outcome("b", false), outcome("c", true), outcome("d", true)];
        let summary = ReportAggregator::summarize(&run);
        assert_eq!(summary.passed_count, 3);
        assert_eq!(summary.failed_count, 1);
        assert_eq!(summary.success_rate_percent, 75.0);
        assert!(!summary.is_healthy(HEALTHY_SUCCESS_RATE));
        let names: Vec<_> = summary.ordered_detail.iter().map(|d| d.outcome.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c", "d"]);
        assert_eq!(summary.ordered_detail[1].verdict, Verdict::Fail);
    }

    #[test]
    fn test_text_report_layout() {
        let mut run = TestRun::new(3);
        run.outcomes = vec![outcome("Get Right Ascension", true), outcome("Get Declination", false)];
        run.cancelled = true;
        run.not_attempted = vec!["Get Site Name".to_string()];
        let text = ReportAggregator::render_text(&ReportAggregator::summarize(&run));
        assert!(text.contains("TEST SEQUENCE STOPPED"));
        assert!(text.contains("Success Rate: 50.0%"));
        assert!(text.contains("PASS | Get Right Ascension"));
        assert!(text.contains("FAIL | Get Declination (no response received (timeout))"));
        assert!(text.contains("Get Site Name (not attempted)"));
    }

    #[test]
    fn test_json_report() {
        let mut run = TestRun::new(1);
        run.outcomes = vec![outcome("Get Right Ascension", true)];
        let json = ReportAggregator::to_json(&ReportAggregator::summarize(&run)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["passed"], 1);
        assert_eq!(value["results"][0]["verdict"], "Pass");
        assert_eq!(value["results"][0]["received"], "12:34:56#");
        assert_eq!(value["results"][0]["elapsed_ms"], 120);
    }
}
