use serde::Serialize;

/// Default coverage target; anything reported below it is flagged in the
/// batch report.
pub const COVERAGE_TARGET: f64 = 90.0;

/// Structured summary pulled out of the final agent message for batch
/// reports. Missing headers stay empty.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskSummary {
    pub did: String,
    pub files: String,
    pub tests: String,
    pub coverage: String,
    pub below_threshold: bool,
}

impl TaskSummary {
    pub fn is_empty(&self) -> bool {
        self.did.is_empty()
            && self.files.is_empty()
            && self.tests.is_empty()
            && self.coverage.is_empty()
    }
}

/// Scan the agent message for the canonical summary headers
/// (`Did:`, `Files:`, `Tests:`, `Coverage:`), case-insensitive, tolerant of
/// surrounding whitespace. Values are captured verbatim; the last occurrence
/// of a header wins.
pub fn extract_summary(message: &str) -> Option<TaskSummary> {
    let mut summary = TaskSummary::default();

    for line in message.lines() {
        let trimmed = line.trim();
        let Some((head, value)) = trimmed.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match head.trim().to_ascii_lowercase().as_str() {
            "did" => summary.did = value.to_string(),
            "files" => summary.files = value.to_string(),
            "tests" => summary.tests = value.to_string(),
            "coverage" => {
                summary.coverage = value.to_string();
                summary.below_threshold = parse_coverage_percent(value)
                    .map(|pct| pct < COVERAGE_TARGET)
                    .unwrap_or(false);
            }
            _ => {}
        }
    }

    if summary.is_empty() {
        None
    } else {
        Some(summary)
    }
}

fn parse_coverage_percent(value: &str) -> Option<f64> {
    let digits: String = value
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    digits.parse().ok()
}
