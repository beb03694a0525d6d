/// Report generation: terminal, JSON output for scenario results.
use crate::catalog::Thresholds;
use crate::metrics::SceneResult;

/// Summary of a single scenario run.
#[derive(Debug, serde::Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub category: String,
    pub passed: bool,
    pub detected: usize,
    pub posed: usize,
    pub expected: usize,
    pub detection_rate: f64,
    pub corner_rmse: f64,
    pub max_rotation_error_deg: f64,
    pub max_translation_error: f64,
    pub false_positives: usize,
    pub processing_time_us: u64,
    pub thresholds: ReportThresholds,
}

/// Serializable copy of the thresholds a scenario was judged against.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct ReportThresholds {
    pub corner_rmse: f64,
    pub rotation_deg: f64,
    pub translation: f64,
}

impl From<Thresholds> for ReportThresholds {
    fn from(t: Thresholds) -> Self {
        Self {
            corner_rmse: t.max_corner_rmse,
            rotation_deg: t.max_rotation_error_deg,
            translation: t.max_translation_error,
        }
    }
}

/// Full report across all scenarios.
#[derive(Debug, serde::Serialize)]
pub struct FullReport {
    pub scenarios: Vec<ScenarioReport>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

impl FullReport {
    pub fn from_scenarios(scenarios: Vec<ScenarioReport>) -> Self {
        let total = scenarios.len();
        let passed = scenarios.iter().filter(|s| s.passed).count();
        let failed = total - passed;
        Self {
            scenarios,
            total,
            passed,
            failed,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

/// Print a terminal table summarizing results.
pub fn print_terminal(report: &FullReport) {
    println!(
        "{:<35} {:>5} {:>8} {:>8} {:>8} {:>4} {:>6}",
        "Scenario", "Det%", "RMSE", "RotErr", "TransErr", "FP", "Status"
    );
    println!("{}", "-".repeat(82));

    for s in &report.scenarios {
        let status = if s.passed { "PASS" } else { "FAIL" };
        println!(
            "{:<35} {:>4.0}% {:>8.2} {:>7.2}° {:>7.2}% {:>4} {:>6}",
            truncate(&s.name, 35),
            s.detection_rate * 100.0,
            s.corner_rmse,
            s.max_rotation_error_deg,
            s.max_translation_error * 100.0,
            s.false_positives,
            status,
        );
    }

    println!("{}", "-".repeat(82));
    println!(
        "Total: {} | Passed: {} | Failed: {}",
        report.total, report.passed, report.failed
    );
}

/// Render report as JSON.
pub fn to_json(report: &FullReport) -> String {
    serde_json::to_string_pretty(report).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
}

/// Build a ScenarioReport from a scenario name, result, and thresholds.
///
/// A scenario passes when every expected target is posed within the
/// thresholds and nothing else survives to a detection.
pub fn scenario_report(
    name: &str,
    category: &str,
    result: &SceneResult,
    expected_count: usize,
    thresholds: Thresholds,
) -> ScenarioReport {
    let detected = result
        .matches
        .iter()
        .filter(|m| m.detection.is_some())
        .count();
    let posed = result
        .matches
        .iter()
        .filter(|m| m.rotation_error_deg.is_some())
        .count();
    let passed = posed == expected_count
        && result.false_positives.is_empty()
        && result.corner_rmse <= thresholds.max_corner_rmse
        && result.max_rotation_error_deg <= thresholds.max_rotation_error_deg
        && result.max_translation_error <= thresholds.max_translation_error;

    ScenarioReport {
        name: name.to_string(),
        category: category.to_string(),
        passed,
        detected,
        posed,
        expected: expected_count,
        detection_rate: result.detection_rate,
        corner_rmse: result.corner_rmse,
        max_rotation_error_deg: result.max_rotation_error_deg,
        max_translation_error: result.max_translation_error,
        false_positives: result.false_positives.len(),
        processing_time_us: result.processing_time_us,
        thresholds: thresholds.into(),
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 1).collect();
        format!("{head}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(name: &str, passed: bool) -> ScenarioReport {
        ScenarioReport {
            name: name.into(),
            category: "test".into(),
            passed,
            detected: 1,
            posed: usize::from(passed),
            expected: 1,
            detection_rate: 1.0,
            corner_rmse: 0.5,
            max_rotation_error_deg: 0.3,
            max_translation_error: 0.01,
            false_positives: 0,
            processing_time_us: 100,
            thresholds: Thresholds::default().into(),
        }
    }

    fn result(posed: bool, rmse: f64, rot: f64) -> SceneResult {
        SceneResult {
            matches: Vec::new(),
            false_positives: Vec::new(),
            detection_rate: 1.0,
            pose_rate: if posed { 1.0 } else { 0.0 },
            corner_rmse: rmse,
            max_corner_error: rmse,
            max_rotation_error_deg: rot,
            max_translation_error: 0.0,
            rejected: 0,
            processing_time_us: 10,
        }
    }

    #[test]
    fn full_report_counts() {
        let full = FullReport::from_scenarios(vec![report("a", true), report("b", false)]);
        assert_eq!(full.total, 2);
        assert_eq!(full.passed, 1);
        assert_eq!(full.failed, 1);
        assert!(!full.all_passed());
    }

    #[test]
    fn missing_targets_fail() {
        // No matches recorded, one expected.
        let r = scenario_report("x", "test", &result(true, 0.1, 0.1), 1, Thresholds::default());
        assert_eq!(r.posed, 0);
        assert!(!r.passed);
    }

    #[test]
    fn empty_scene_with_no_expectation_passes() {
        let r = scenario_report("x", "test", &result(false, 0.0, 0.0), 0, Thresholds::default());
        assert!(r.passed);
    }

    #[test]
    fn rotation_threshold_applies() {
        let t = Thresholds {
            max_rotation_error_deg: 1.0,
            ..Thresholds::default()
        };
        let r = scenario_report("x", "test", &result(false, 0.0, 2.0), 0, t);
        assert!(!r.passed);
        assert_eq!(r.thresholds.rotation_deg, 1.0);
    }

    #[test]
    fn json_output_parses() {
        let full = FullReport::from_scenarios(vec![report("a", true)]);
        let json = to_json(&full);
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["total"], 1);
        assert_eq!(parsed["scenarios"][0]["name"], "a");
    }

    #[test]
    fn truncate_short_string() {
        assert_eq!(truncate("hello", 10), "hello");
    }

    #[test]
    fn truncate_long_string() {
        let result = truncate("this-is-a-very-long-scenario-name", 20);
        assert_eq!(result.chars().count(), 20);
        assert!(result.ends_with('…'));
    }
}
