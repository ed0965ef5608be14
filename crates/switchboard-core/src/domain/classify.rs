//! Status text classification.
//!
//! Agents report progress as free text. This is the only place that turns such
//! text into a task state; keep it pure.

use super::task::TaskState;

/// Outcome of classifying a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Transition(TaskState),
    /// Nothing recognizable; the caller keeps the state and records evidence only.
    Unknown,
}

/// Case-insensitive substring match, first rule wins.
///
/// "failed" is last: text that names a failure while also saying the work is
/// under way ("working on the failed test") must not end the task.
const RULES: &[(&[&str], TaskState)] = &[
    (&["completed", "done"], TaskState::Completed),
    (
        &["in progress", "in-progress", "in_progress", "working"],
        TaskState::InProgress,
    ),
    (&["assigned"], TaskState::Assigned),
    (&["failed"], TaskState::Failed),
];

pub fn classify(status: &str) -> Classification {
    let text = status.to_lowercase();
    RULES
        .iter()
        .find(|(needles, _)| needles.iter().any(|needle| text.contains(needle)))
        .map(|&(_, state)| Classification::Transition(state))
        .unwrap_or(Classification::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::completed("Completed - done", TaskState::Completed)]
    #[case::done_upper("DONE", TaskState::Completed)]
    #[case::done_inside("all tests done, pushing", TaskState::Completed)]
    #[case::completed_wins_over_working("working... completed", TaskState::Completed)]
    #[case::failed("build failed", TaskState::Failed)]
    #[case::in_progress("In progress: refactoring", TaskState::InProgress)]
    #[case::hyphenated("in-progress", TaskState::InProgress)]
    #[case::snake("in_progress", TaskState::InProgress)]
    #[case::working("Working on it", TaskState::InProgress)]
    #[case::assigned("Assigned to A2", TaskState::Assigned)]
    #[case::working_on_failure("Working on the failed integration test", TaskState::InProgress)]
    #[case::in_progress_on_failure("in progress: fixing failed build", TaskState::InProgress)]
    #[case::assigned_failure("Assigned the failed deploy to A3", TaskState::Assigned)]
    #[case::done_after_failure("failed twice, now done", TaskState::Completed)]
    fn recognised_status_lines(#[case] text: &str, #[case] expected: TaskState) {
        assert_eq!(classify(text), Classification::Transition(expected));
    }

    #[rstest]
    #[case::empty("")]
    #[case::chatter("looking into the logs")]
    #[case::blocked("blocked on review")]
    #[case::whitespace("   ")]
    fn unmatched_text_is_unknown(#[case] text: &str) {
        assert_eq!(classify(text), Classification::Unknown);
    }
}
