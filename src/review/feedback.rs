use once_cell::sync::Lazy;
use regex::Regex;

/// `Line <N>:<comment>` at the start of a line, any spacing after the colon.
static LINE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Line (\d+):\s*(.*)$").expect("valid regex"));

/// One `Line <N>: <comment>` entry from model feedback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackTarget {
    pub line: usize,
    pub comment: String,
}

/// Pull every `Line <N>: <comment>` entry out of free-text feedback.
///
/// Non-matching lines and entries with an empty comment are ignored.
/// Encounter order is kept and repeated line numbers are not merged.
pub fn extract_targets(feedback: &str) -> Vec<FeedbackTarget> {
    feedback
        .lines()
        .filter_map(|line| {
            let caps = LINE_PATTERN.captures(line.trim_end_matches('\r'))?;
            // Numbers too large for usize cannot name a real line.
            let line = caps[1].parse().ok()?;
            let comment = caps[2].trim();
            if comment.is_empty() {
                return None;
            }
            Some(FeedbackTarget {
                line,
                comment: comment.to_string(),
            })
        })
        .collect()
}
