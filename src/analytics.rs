use std::collections::HashMap;
use std::str::FromStr;

use serde::Serialize;

use crate::error::TrackerError;
use crate::models::{BehaviorKind, BehaviorLogRecord};

/// Group key used when a record has no value for the grouping field.
pub const UNDEFINED_GROUP: &str = "undefined";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    BehaviorType,
    Severity,
    Subject,
    TimeOfDay,
    Student,
}

impl FromStr for GroupBy {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.replace(['-', '_'], "").to_ascii_lowercase().as_str() {
            "behaviortype" | "type" => Ok(GroupBy::BehaviorType),
            "severity" => Ok(GroupBy::Severity),
            "subject" => Ok(GroupBy::Subject),
            "timeofday" => Ok(GroupBy::TimeOfDay),
            "student" => Ok(GroupBy::Student),
            _ => Err(TrackerError::UnknownGroupBy(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupCount {
    pub key: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsSummary {
    pub total: usize,
    pub positive: usize,
    pub negative: usize,
    pub neutral: usize,
    pub positive_rate_percent: u32,
    pub by_behavior_type: Vec<GroupCount>,
    pub by_severity: Vec<GroupCount>,
    pub by_subject: Vec<GroupCount>,
    pub by_time_of_day: Vec<GroupCount>,
    pub by_student: Vec<GroupCount>,
}

pub fn group_key(log: &BehaviorLogRecord, group_by: GroupBy) -> String {
    let value = match group_by {
        GroupBy::BehaviorType => Some(log.behavior_type.clone()),
        GroupBy::Severity => log.severity.map(|severity| severity.as_str().to_string()),
        GroupBy::Subject => log.subject.clone(),
        GroupBy::TimeOfDay => log.time_of_day.clone(),
        GroupBy::Student => Some(log.student_id.to_string()),
    };
    value.unwrap_or_else(|| UNDEFINED_GROUP.to_string())
}

/// Counts records per group, in order of first appearance.
pub fn aggregate(logs: &[BehaviorLogRecord], group_by: GroupBy) -> Vec<GroupCount> {
    count_keys(logs.iter().map(|log| group_key(log, group_by)))
}

fn count_keys(keys: impl Iterator<Item = String>) -> Vec<GroupCount> {
    let mut counts: Vec<GroupCount> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for key in keys {
        match index.get(&key) {
            Some(&position) => counts[position].count += 1,
            None => {
                index.insert(key.clone(), counts.len());
                counts.push(GroupCount { key, count: 1 });
            }
        }
    }

    counts
}

/// Highest counts first. The sort is stable, so ties keep first-seen order.
pub fn top_n(counts: &[GroupCount], n: usize) -> Vec<GroupCount> {
    let mut ranked = counts.to_vec();
    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    ranked.truncate(n);
    ranked
}

/// Negative-behavior counts keyed by student id, highest first.
pub fn top_students_by_negatives(logs: &[BehaviorLogRecord], n: usize) -> Vec<GroupCount> {
    let counts = count_keys(
        logs.iter()
            .filter(|log| log.kind() == BehaviorKind::Negative)
            .map(|log| log.student_id.to_string()),
    );
    top_n(&counts, n)
}

/// Most common `notes` values among logs of the given kind.
pub fn top_notes(logs: &[BehaviorLogRecord], kind: BehaviorKind, n: usize) -> Vec<GroupCount> {
    let counts = count_keys(
        logs.iter()
            .filter(|log| log.kind() == kind)
            .map(|log| log.notes.clone()),
    );
    top_n(&counts, n)
}

pub fn positive_rate(logs: &[BehaviorLogRecord]) -> f64 {
    if logs.is_empty() {
        return 0.0;
    }
    let positive = logs
        .iter()
        .filter(|log| log.kind() == BehaviorKind::Positive)
        .count();
    positive as f64 / logs.len() as f64
}

pub fn rate_percent(rate: f64) -> u32 {
    (rate * 100.0).round().clamp(0.0, 100.0) as u32
}

pub fn summarize(logs: &[BehaviorLogRecord]) -> AnalyticsSummary {
    let count_kind = |kind: BehaviorKind| logs.iter().filter(|log| log.kind() == kind).count();

    AnalyticsSummary {
        total: logs.len(),
        positive: count_kind(BehaviorKind::Positive),
        negative: count_kind(BehaviorKind::Negative),
        neutral: count_kind(BehaviorKind::Neutral),
        positive_rate_percent: rate_percent(positive_rate(logs)),
        by_behavior_type: aggregate(logs, GroupBy::BehaviorType),
        by_severity: aggregate(logs, GroupBy::Severity),
        by_subject: aggregate(logs, GroupBy::Subject),
        by_time_of_day: aggregate(logs, GroupBy::TimeOfDay),
        by_student: aggregate(logs, GroupBy::Student),
    }
}
