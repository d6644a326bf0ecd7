use std::collections::HashMap;

use uuid::Uuid;

use crate::error::TrackerError;
use crate::models::{BehaviorKind, BehaviorLogRecord, Category, Priority, SuggestionResult};

pub const DEFAULT_PATTERN: &str = "No clear pattern identified from recent logs.";
pub const DEFAULT_SUGGESTION: &str = "Continue to monitor behavior and provide consistent support.";
pub const POSITIVE_PATTERN: &str = "Consistent positive engagement and participation.";
pub const MORNING_SUFFIX: &str = " (More prevalent in mornings).";

/// Builds a suggestion from a student's recent logs.
///
/// `recent_logs` must already be scoped to one student and ordered most recent
/// first; nothing is re-sorted here. Only the literal `negative` and `positive`
/// tags are considered. An empty slice yields the default "no pattern" result.
pub fn generate_suggestion(student_name: &str, recent_logs: &[BehaviorLogRecord]) -> SuggestionResult {
    let mut result = SuggestionResult {
        behavior_pattern: DEFAULT_PATTERN.to_string(),
        suggestion_text: DEFAULT_SUGGESTION.to_string(),
        category: Category::General,
        priority: Priority::Low,
    };

    let negative: Vec<&BehaviorLogRecord> = recent_logs
        .iter()
        .filter(|log| log.behavior_type == "negative")
        .collect();
    let has_positive = recent_logs.iter().any(|log| log.behavior_type == "positive");

    if let Some(note) = most_frequent_note(&negative) {
        result.behavior_pattern = format!("Frequent occurrence of \"{note}\" behavior.");
        result.priority = Priority::High;
        result.category = Category::Behavioral;

        let lowered = note.to_lowercase();
        result.suggestion_text = if lowered.contains("disruptive") {
            format!(
                "Implement a behavior management plan for {student_name} with clear expectations, \
                 positive reinforcement for appropriate behavior, and a designated de-escalation space."
            )
        } else if lowered.contains("attention") {
            format!(
                "Provide {student_name} with increased positive attention and specific praise when \
                 behaving appropriately, and teach constructive strategies to meet attention needs."
            )
        } else if lowered.contains("academic") {
            result.category = Category::Academic;
            format!(
                "Offer {student_name} targeted academic support, break tasks into smaller steps, \
                 and check for understanding frequently."
            )
        } else {
            format!(
                "Address the \"{note}\" behavior with consistent consequences and teach \
                 {student_name} alternative behaviors to use instead."
            )
        };
    } else if has_positive {
        result.behavior_pattern = POSITIVE_PATTERN.to_string();
        result.suggestion_text = format!(
            "Continue reinforcing {student_name}'s positive behavior and offer peer mentorship \
             opportunities so they can support classmates."
        );
        result.category = Category::Social;
        result.priority = Priority::Low;
    }

    let morning = negative
        .iter()
        .filter(|log| log.time_of_day.as_deref() == Some("morning"))
        .count();
    if negative.len() > 2 && morning * 2 > negative.len() {
        result.behavior_pattern.push_str(MORNING_SUFFIX);
        result.suggestion_text.push_str(&format!(
            " Consider adjusting morning routines for {student_name} to provide a calmer start to the day."
        ));
        result.priority = Priority::Medium;
    }

    result
}

/// Most frequent literal `notes` value. Ties go to the note seen first.
fn most_frequent_note<'a>(logs: &[&'a BehaviorLogRecord]) -> Option<&'a str> {
    let mut order: Vec<(&'a str, usize)> = Vec::new();
    let mut index: HashMap<&'a str, usize> = HashMap::new();

    for log in logs {
        let note = log.notes.as_str();
        match index.get(note) {
            Some(&position) => order[position].1 += 1,
            None => {
                index.insert(note, order.len());
                order.push((note, 1));
            }
        }
    }

    let mut best: Option<(&'a str, usize)> = None;
    for (note, count) in order {
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((note, count));
        }
    }
    best.map(|(note, _)| note)
}

/// Caller-side policy: a suggestion request needs at least one log.
pub fn suggest_for_student(
    student_id: Uuid,
    student_name: &str,
    recent_logs: &[BehaviorLogRecord],
) -> Result<SuggestionResult, TrackerError> {
    if recent_logs.is_empty() {
        return Err(TrackerError::NoLogsFound(student_id));
    }
    Ok(generate_suggestion(student_name, recent_logs))
}

/// Rewrites open teacher-facing tags to `positive`, `negative` or `neutral`.
pub fn canonicalize_types(logs: &[BehaviorLogRecord]) -> Vec<BehaviorLogRecord> {
    logs.iter()
        .map(|log| BehaviorLogRecord {
            behavior_type: BehaviorKind::classify(&log.behavior_type).as_str().to_string(),
            ..log.clone()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;

    fn sample_log(behavior_type: &str, notes: &str, time_of_day: Option<&str>) -> BehaviorLogRecord {
        BehaviorLogRecord {
            student_id: Uuid::nil(),
            teacher_id: Uuid::nil(),
            behavior_type: behavior_type.to_string(),
            subject: Some("Mathematics".to_string()),
            time_of_day: time_of_day.map(str::to_string),
            severity: None,
            notes: notes.to_string(),
            outcome: None,
            date: Utc::now() - Duration::hours(1),
        }
    }

    #[test]
    fn empty_logs_yield_defaults() {
        let result = generate_suggestion("Maya", &[]);
        assert_eq!(
            result,
            SuggestionResult {
                behavior_pattern: DEFAULT_PATTERN.to_string(),
                suggestion_text: DEFAULT_SUGGESTION.to_string(),
                category: Category::General,
                priority: Priority::Low,
            }
        );
    }

    #[test]
    fn positive_only_logs_are_social_and_low() {
        let logs = vec![
            sample_log("positive", "Helped a classmate", None),
            sample_log("positive", "Led group work", Some("morning")),
        ];
        let result = generate_suggestion("Maya", &logs);
        assert_eq!(result.behavior_pattern, POSITIVE_PATTERN);
        assert_eq!(result.category, Category::Social);
        assert_eq!(result.priority, Priority::Low);
        assert!(result.suggestion_text.contains("Maya"));
        assert!(result.suggestion_text.contains("peer mentorship"));
    }

    #[test]
    fn neutral_only_logs_keep_defaults() {
        let logs = vec![sample_log("neutral", "Quiet day", None)];
        let result = generate_suggestion("Maya", &logs);
        assert_eq!(result.behavior_pattern, DEFAULT_PATTERN);
        assert_eq!(result.category, Category::General);
    }

    #[test]
    fn disruptive_note_recommends_management_plan() {
        let logs = vec![sample_log("negative", "Disruptive shouting during test", None)];
        let result = generate_suggestion("Omar", &logs);
        assert_eq!(
            result.behavior_pattern,
            "Frequent occurrence of \"Disruptive shouting during test\" behavior."
        );
        assert_eq!(result.category, Category::Behavioral);
        assert_eq!(result.priority, Priority::High);
        assert!(result.suggestion_text.contains("behavior management plan"));
        assert!(result.suggestion_text.contains("de-escalation space"));
        assert!(result.suggestion_text.contains("Omar"));
    }

    #[test]
    fn attention_note_recommends_praise() {
        let logs = vec![sample_log("negative", "Seeking attention by calling out", None)];
        let result = generate_suggestion("Omar", &logs);
        assert_eq!(result.category, Category::Behavioral);
        assert!(result.suggestion_text.contains("specific praise"));
        assert!(result.suggestion_text.contains("attention needs"));
    }

    #[test]
    fn academic_note_overrides_category() {
        let logs = vec![sample_log("negative", "Academic struggle with fractions", None)];
        let result = generate_suggestion("Omar", &logs);
        assert_eq!(result.category, Category::Academic);
        assert_eq!(result.priority, Priority::High);
        assert!(result.suggestion_text.contains("smaller steps"));
    }

    #[test]
    fn disruptive_wins_over_academic_in_same_note() {
        let logs = vec![sample_log("negative", "Disruptive during academic block", None)];
        let result = generate_suggestion("Omar", &logs);
        assert_eq!(result.category, Category::Behavioral);
        assert!(result.suggestion_text.contains("de-escalation space"));
    }

    #[test]
    fn unmatched_note_is_quoted_in_suggestion() {
        let logs = vec![sample_log("negative", "Threw pencils", None)];
        let result = generate_suggestion("Omar", &logs);
        assert!(result.suggestion_text.contains("\"Threw pencils\""));
        assert!(result.suggestion_text.contains("consistent consequences"));
    }

    #[test]
    fn most_frequent_note_wins() {
        let logs = vec![
            sample_log("negative", "Talking back", None),
            sample_log("negative", "Left seat", None),
            sample_log("negative", "Left seat", None),
            sample_log("positive", "Finished work", None),
        ];
        let result = generate_suggestion("Omar", &logs);
        assert_eq!(result.behavior_pattern, "Frequent occurrence of \"Left seat\" behavior.");
    }

    #[test]
    fn notes_are_not_normalized() {
        let logs = vec![
            sample_log("negative", "left seat", None),
            sample_log("negative", "Left seat", None),
            sample_log("negative", "Left seat", None),
        ];
        let result = generate_suggestion("Omar", &logs);
        assert_eq!(result.behavior_pattern, "Frequent occurrence of \"Left seat\" behavior.");
    }

    #[test]
    fn tied_notes_resolve_to_first_seen() {
        let logs = vec![
            sample_log("negative", "Talking back", None),
            sample_log("negative", "Left seat", None),
            sample_log("negative", "Left seat", None),
            sample_log("negative", "Talking back", None),
        ];
        let first = generate_suggestion("Omar", &logs);
        for _ in 0..5 {
            assert_eq!(generate_suggestion("Omar", &logs), first);
        }
        assert_eq!(first.behavior_pattern, "Frequent occurrence of \"Talking back\" behavior.");
    }

    #[test]
    fn morning_majority_lowers_priority_to_medium() {
        let logs = vec![
            sample_log("negative", "Disruptive noise", Some("morning")),
            sample_log("negative", "Left seat", Some("morning")),
            sample_log("negative", "Talking back", Some("morning")),
            sample_log("negative", "Threw pencils", Some("morning")),
        ];
        let result = generate_suggestion("Omar", &logs);
        assert_eq!(result.priority, Priority::Medium);
        assert!(result.behavior_pattern.ends_with(MORNING_SUFFIX));
        assert!(result.suggestion_text.contains("morning routines for Omar"));
    }

    #[test]
    fn two_morning_negatives_do_not_trigger_override() {
        let logs = vec![
            sample_log("negative", "Left seat", Some("morning")),
            sample_log("negative", "Talking back", Some("morning")),
        ];
        let result = generate_suggestion("Omar", &logs);
        assert_eq!(result.priority, Priority::High);
        assert!(!result.behavior_pattern.ends_with(MORNING_SUFFIX));
    }

    #[test]
    fn exactly_half_in_morning_does_not_trigger_override() {
        let logs = vec![
            sample_log("negative", "Left seat", Some("morning")),
            sample_log("negative", "Left seat", Some("morning")),
            sample_log("negative", "Left seat", Some("afternoon")),
            sample_log("negative", "Left seat", None),
        ];
        let result = generate_suggestion("Omar", &logs);
        assert_eq!(result.priority, Priority::High);
    }

    #[test]
    fn morning_check_counts_only_negative_logs() {
        let logs = vec![
            sample_log("negative", "Left seat", Some("morning")),
            sample_log("negative", "Left seat", Some("morning")),
            sample_log("negative", "Left seat", Some("afternoon")),
            sample_log("positive", "Helped", Some("morning")),
            sample_log("positive", "Helped", Some("morning")),
        ];
        let result = generate_suggestion("Omar", &logs);
        assert_eq!(result.priority, Priority::Medium);
    }

    #[test]
    fn open_tags_are_ignored_until_canonicalized() {
        let logs = vec![sample_log("fighting", "Pushed a classmate", None)];
        assert_eq!(generate_suggestion("Omar", &logs).behavior_pattern, DEFAULT_PATTERN);

        let canonical = canonicalize_types(&logs);
        assert_eq!(canonical[0].behavior_type, "negative");
        assert_eq!(generate_suggestion("Omar", &canonical).priority, Priority::High);
    }

    #[test]
    fn empty_request_is_rejected_by_caller_policy() {
        let student_id = Uuid::new_v4();
        let err = suggest_for_student(student_id, "Omar", &[]).unwrap_err();
        assert!(matches!(err, TrackerError::NoLogsFound(id) if id == student_id));

        let logs = vec![sample_log("positive", "Helped", None)];
        assert!(suggest_for_student(student_id, "Omar", &logs).is_ok());
    }
}
