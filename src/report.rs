use std::collections::HashMap;
use std::fmt::Write;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::analytics::{self, GroupBy, GroupCount};
use crate::models::{BehaviorKind, BehaviorLogRecord};

/// Resolves a student id key to a display name, falling back to the id.
pub fn student_label(key: &str, names: &HashMap<Uuid, String>) -> String {
    Uuid::parse_str(key)
        .ok()
        .and_then(|id| names.get(&id).cloned())
        .unwrap_or_else(|| key.to_string())
}

fn write_counts(output: &mut String, heading: &str, counts: &[GroupCount], empty: &str) {
    let _ = writeln!(output);
    let _ = writeln!(output, "## {heading}");

    if counts.is_empty() {
        let _ = writeln!(output, "{empty}");
    } else {
        for group in analytics::top_n(counts, counts.len()) {
            let _ = writeln!(output, "- {}: {}", group.key, group.count);
        }
    }
}

pub fn build_report(
    scope_label: &str,
    cutoff: NaiveDate,
    logs: &[BehaviorLogRecord],
    names: &HashMap<Uuid, String>,
) -> String {
    let summary = analytics::summarize(logs);
    let mut output = String::new();

    let _ = writeln!(output, "# Behavior Report");
    let _ = writeln!(output, "Generated for {} (logs since {})", scope_label, cutoff);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Overview");
    let _ = writeln!(output, "- Total logs: {}", summary.total);
    let _ = writeln!(
        output,
        "- Positive: {}, negative: {}, neutral: {}",
        summary.positive, summary.negative, summary.neutral
    );
    let _ = writeln!(output, "- Positive rate: {}%", summary.positive_rate_percent);

    let none = "No behavior logs recorded for this window.";
    write_counts(&mut output, "Behavior Types", &summary.by_behavior_type, none);
    write_counts(&mut output, "Severity", &summary.by_severity, none);
    write_counts(&mut output, "Time of Day", &summary.by_time_of_day, none);
    write_counts(&mut output, "Subjects", &summary.by_subject, none);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Students Needing Attention");
    let top_students = analytics::top_students_by_negatives(logs, 5);
    if top_students.is_empty() {
        let _ = writeln!(output, "No negative behaviors in this window.");
    } else {
        for group in top_students {
            let _ = writeln!(
                output,
                "- {}: {} negative logs",
                student_label(&group.key, names),
                group.count
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Most Common Concerns");
    let top_notes = analytics::top_notes(logs, BehaviorKind::Negative, 5);
    if top_notes.is_empty() {
        let _ = writeln!(output, "No negative behaviors in this window.");
    } else {
        for group in top_notes {
            let _ = writeln!(output, "- \"{}\" ({} times)", group.key, group.count);
        }
    }

    let mut recent_logs = logs.to_vec();
    recent_logs.sort_by(|a, b| b.date.cmp(&a.date));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Incidents");

    if recent_logs.is_empty() {
        let _ = writeln!(output, "{none}");
    } else {
        for log in recent_logs.iter().take(5) {
            let _ = writeln!(
                output,
                "- {} ({}) on {}: {}",
                student_label(&log.student_id.to_string(), names),
                log.behavior_type,
                log.date.date_naive(),
                log.notes
            );
        }
    }

    output
}

/// Renders one grouping dimension as plain lines for the terminal.
pub fn format_stats(group_by: GroupBy, counts: &[GroupCount], names: &HashMap<Uuid, String>) -> String {
    let mut output = String::new();
    for group in counts {
        let label = if group_by == GroupBy::Student {
            student_label(&group.key, names)
        } else {
            group.key.clone()
        };
        let _ = writeln!(output, "- {}: {}", label, group.count);
    }
    output
}

#[derive(serde::Serialize)]
struct CsvExportRow<'a> {
    student: String,
    student_id: Uuid,
    teacher_id: Uuid,
    behavior_type: &'a str,
    subject: &'a str,
    time_of_day: &'a str,
    severity: &'a str,
    notes: &'a str,
    outcome: &'a str,
    logged_at: String,
}

pub fn export_csv<W: std::io::Write>(
    writer: W,
    logs: &[BehaviorLogRecord],
    names: &HashMap<Uuid, String>,
) -> anyhow::Result<usize> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    for log in logs {
        csv_writer.serialize(CsvExportRow {
            student: student_label(&log.student_id.to_string(), names),
            student_id: log.student_id,
            teacher_id: log.teacher_id,
            behavior_type: &log.behavior_type,
            subject: log.subject.as_deref().unwrap_or(""),
            time_of_day: log.time_of_day.as_deref().unwrap_or(""),
            severity: log.severity.map(|severity| severity.as_str()).unwrap_or(""),
            notes: &log.notes,
            outcome: log.outcome.as_deref().unwrap_or(""),
            logged_at: log.date.to_rfc3339(),
        })?;
    }

    csv_writer.flush()?;
    Ok(logs.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;
    use chrono::{Duration, TimeZone, Utc};

    fn sample_log(student_id: Uuid, behavior_type: &str, notes: &str, days_ago: i64) -> BehaviorLogRecord {
        BehaviorLogRecord {
            student_id,
            teacher_id: Uuid::nil(),
            behavior_type: behavior_type.to_string(),
            subject: Some("Mathematics".to_string()),
            time_of_day: Some("morning".to_string()),
            severity: Some(Severity::Medium),
            notes: notes.to_string(),
            outcome: None,
            date: Utc.with_ymd_and_hms(2026, 3, 20, 9, 0, 0).unwrap() - Duration::days(days_ago),
        }
    }

    #[test]
    fn report_names_students_and_rates() {
        let maya = Uuid::new_v4();
        let logs = vec![
            sample_log(maya, "negative", "Left seat", 1),
            sample_log(maya, "negative", "Left seat", 2),
            sample_log(maya, "positive", "Helped a classmate", 0),
            sample_log(maya, "positive", "Finished early", 3),
        ];
        let names = HashMap::from([(maya, "Maya Chen".to_string())]);
        let cutoff = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();

        let report = build_report("teacher a@school.org", cutoff, &logs, &names);
        assert!(report.contains("Generated for teacher a@school.org (logs since 2026-03-01)"));
        assert!(report.contains("- Positive rate: 50%"));
        assert!(report.contains("- Maya Chen: 2 negative logs"));
        assert!(report.contains("- \"Left seat\" (2 times)"));
        assert!(report.contains("- Maya Chen (positive) on 2026-03-20: Helped a classmate"));
    }

    #[test]
    fn empty_report_has_placeholders() {
        let cutoff = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let report = build_report("all schools", cutoff, &[], &HashMap::new());
        assert!(report.contains("- Positive rate: 0%"));
        assert!(report.contains("No negative behaviors in this window."));
    }

    #[test]
    fn unknown_student_falls_back_to_id() {
        let id = Uuid::new_v4();
        assert_eq!(student_label(&id.to_string(), &HashMap::new()), id.to_string());
        assert_eq!(student_label("undefined", &HashMap::new()), "undefined");
    }

    #[test]
    fn csv_export_writes_header_and_rows() {
        let maya = Uuid::new_v4();
        let logs = vec![sample_log(maya, "negative", "Left seat", 0)];
        let names = HashMap::from([(maya, "Maya Chen".to_string())]);

        let mut buffer = Vec::new();
        let written = export_csv(&mut buffer, &logs, &names).unwrap();
        let text = String::from_utf8(buffer).unwrap();

        assert_eq!(written, 1);
        assert!(text.starts_with("student,student_id,teacher_id,behavior_type"));
        assert!(text.contains("Maya Chen"));
        assert!(text.contains("Left seat"));
    }
}
