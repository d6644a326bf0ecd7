use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TrackerError;

/// Tag substrings that mark a teacher-facing behavior type as negative.
const NEGATIVE_KEYWORDS: &[&str] = &[
    "negative", "fight", "phone", "disrupt", "bully", "cheat", "rude", "defian", "aggress",
    "arrived_late", "late_arrival", "tardy", "absent", "skipping", "talking", "refus", "off_task",
];

/// Tag substrings that mark a teacher-facing behavior type as positive.
const POSITIVE_KEYWORDS: &[&str] = &[
    "positive", "excellent", "good", "great", "help", "kind", "respect", "participat",
    "improve", "leader", "on_task", "complet", "teamwork",
];

#[derive(Debug, Clone, PartialEq)]
pub struct BehaviorLogRecord {
    pub student_id: Uuid,
    pub teacher_id: Uuid,
    pub behavior_type: String,
    pub subject: Option<String>,
    pub time_of_day: Option<String>,
    pub severity: Option<Severity>,
    pub notes: String,
    pub outcome: Option<String>,
    pub date: DateTime<Utc>,
}

impl BehaviorLogRecord {
    pub fn kind(&self) -> BehaviorKind {
        BehaviorKind::classify(&self.behavior_type)
    }
}

/// A behavior log about to be written. `date` falls back to the insert time.
#[derive(Debug, Clone)]
pub struct NewBehaviorLog {
    pub student_id: Uuid,
    pub teacher_id: Uuid,
    pub behavior_type: String,
    pub subject: Option<String>,
    pub time_of_day: Option<String>,
    pub severity: Option<Severity>,
    pub notes: String,
    pub outcome: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

impl NewBehaviorLog {
    pub fn validate(&self) -> Result<(), TrackerError> {
        if self.notes.trim().is_empty() {
            return Err(TrackerError::EmptyNotes);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl FromStr for Severity {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            _ => Err(TrackerError::UnknownSeverity(s.to_string())),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Positive / negative / neutral bucket of a behavior type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BehaviorKind {
    Positive,
    Negative,
    Neutral,
}

impl BehaviorKind {
    /// Canonical tags map directly; open tags are bucketed by keyword.
    /// Negative keywords are checked first.
    pub fn classify(tag: &str) -> BehaviorKind {
        let tag = tag.trim().to_ascii_lowercase();
        match tag.as_str() {
            "positive" => return BehaviorKind::Positive,
            "negative" => return BehaviorKind::Negative,
            "neutral" => return BehaviorKind::Neutral,
            _ => {}
        }

        if NEGATIVE_KEYWORDS.iter().any(|keyword| tag.contains(keyword)) {
            BehaviorKind::Negative
        } else if POSITIVE_KEYWORDS.iter().any(|keyword| tag.contains(keyword)) {
            BehaviorKind::Positive
        } else {
            BehaviorKind::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BehaviorKind::Positive => "positive",
            BehaviorKind::Negative => "negative",
            BehaviorKind::Neutral => "neutral",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Academic,
    Social,
    Emotional,
    Behavioral,
    General,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Academic => "academic",
            Category::Social => "social",
            Category::Emotional => "emotional",
            Category::Behavioral => "behavioral",
            Category::General => "general",
        }
    }
}

impl FromStr for Category {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "academic" => Ok(Category::Academic),
            "social" => Ok(Category::Social),
            "emotional" => Ok(Category::Emotional),
            "behavioral" => Ok(Category::Behavioral),
            "general" => Ok(Category::General),
            _ => Err(TrackerError::UnknownCategory(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl FromStr for Priority {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            _ => Err(TrackerError::UnknownPriority(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuggestionResult {
    pub behavior_pattern: String,
    pub suggestion_text: String,
    pub category: Category,
    pub priority: Priority,
}

/// A suggestion persisted for a student.
#[derive(Debug, Clone, Serialize)]
pub struct StoredSuggestion {
    pub id: Uuid,
    pub student_id: Uuid,
    #[serde(flatten)]
    pub result: SuggestionResult,
    pub is_implemented: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Student {
    pub id: Uuid,
    pub full_name: String,
    pub grade: String,
    pub teacher_id: Uuid,
}

impl Student {
    pub fn is_taught_by(&self, teacher_id: Uuid) -> bool {
        self.teacher_id == teacher_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Teacher,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
        }
    }
}

impl FromStr for Role {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "teacher" => Ok(Role::Teacher),
            _ => Err(TrackerError::UnknownRole(s.to_string())),
        }
    }
}

/// Which slice of the log table a command works on.
#[derive(Debug, Clone)]
pub enum LogScope {
    All,
    Teacher(String),
    School(String),
}

impl LogScope {
    pub fn from_args(teacher_email: Option<String>, school: Option<String>) -> Self {
        match (teacher_email, school) {
            (Some(email), _) => LogScope::Teacher(email),
            (None, Some(name)) => LogScope::School(name),
            (None, None) => LogScope::All,
        }
    }

    pub fn label(&self) -> String {
        match self {
            LogScope::All => "all schools".to_string(),
            LogScope::Teacher(email) => format!("teacher {email}"),
            LogScope::School(name) => format!("school {name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_tags_classify_directly() {
        assert_eq!(BehaviorKind::classify("positive"), BehaviorKind::Positive);
        assert_eq!(BehaviorKind::classify("Negative"), BehaviorKind::Negative);
        assert_eq!(BehaviorKind::classify("neutral"), BehaviorKind::Neutral);
    }

    #[test]
    fn open_tags_use_keyword_buckets() {
        assert_eq!(BehaviorKind::classify("excellent_work"), BehaviorKind::Positive);
        assert_eq!(BehaviorKind::classify("fighting"), BehaviorKind::Negative);
        assert_eq!(BehaviorKind::classify("using_phone"), BehaviorKind::Negative);
        assert_eq!(BehaviorKind::classify("helping_peers"), BehaviorKind::Positive);
        assert_eq!(BehaviorKind::classify("bathroom_break"), BehaviorKind::Neutral);
    }

    #[test]
    fn severity_parses_case_insensitively() {
        assert_eq!("HIGH".parse::<Severity>().unwrap(), Severity::High);
        assert_eq!(" low ".parse::<Severity>().unwrap(), Severity::Low);
        assert!(matches!(
            "severe".parse::<Severity>(),
            Err(TrackerError::UnknownSeverity(_))
        ));
    }

    #[test]
    fn blank_notes_fail_validation() {
        let log = NewBehaviorLog {
            student_id: Uuid::new_v4(),
            teacher_id: Uuid::new_v4(),
            behavior_type: "negative".to_string(),
            subject: None,
            time_of_day: None,
            severity: None,
            notes: "   ".to_string(),
            outcome: None,
            date: None,
        };
        assert!(matches!(log.validate(), Err(TrackerError::EmptyNotes)));
    }

    #[test]
    fn only_the_assigned_teacher_owns_a_student() {
        let teacher_id = Uuid::new_v4();
        let student = Student {
            id: Uuid::new_v4(),
            full_name: "Maya Chen".to_string(),
            grade: "4".to_string(),
            teacher_id,
        };
        assert!(student.is_taught_by(teacher_id));
        assert!(!student.is_taught_by(Uuid::new_v4()));
    }

    #[test]
    fn scope_prefers_teacher_over_school() {
        let scope = LogScope::from_args(Some("a@school.org".into()), Some("North".into()));
        assert!(matches!(scope, LogScope::Teacher(ref email) if email == "a@school.org"));
        assert_eq!(LogScope::from_args(None, None).label(), "all schools");
    }
}
