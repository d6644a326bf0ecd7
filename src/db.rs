use std::collections::HashMap;

use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{
    BehaviorLogRecord, LogScope, NewBehaviorLog, Role, Severity, StoredSuggestion, Student,
    SuggestionResult,
};

const LOG_COLUMNS: &str = "l.student_id, l.teacher_id, l.behavior_type, l.subject, \
     l.time_of_day, l.severity, l.notes, l.outcome, l.logged_at";

/// Newest first; later inserts win when timestamps tie.
const LOG_ORDER: &str = " ORDER BY l.logged_at DESC, l.entry_seq DESC";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    upsert_school(pool, "Riverside Elementary", Some("410 River Road")).await?;
    upsert_user(pool, "Dana Ortiz", "dana.ortiz@riverside.edu", Role::Admin, Some("Riverside Elementary")).await?;

    let teachers = vec![
        ("Priya Raman", "priya.raman@riverside.edu"),
        ("Marcus Hill", "marcus.hill@riverside.edu"),
    ];
    for (name, email) in teachers {
        upsert_user(pool, name, email, Role::Teacher, Some("Riverside Elementary")).await?;
    }

    let students = vec![
        ("Maya Chen", "4", "priya.raman@riverside.edu"),
        ("Omar Haddad", "4", "priya.raman@riverside.edu"),
        ("Lena Novak", "5", "marcus.hill@riverside.edu"),
    ];
    let mut student_ids = HashMap::new();
    for (name, grade, teacher_email) in students {
        let id = add_student(pool, name, grade, teacher_email).await?;
        student_ids.insert(name, id);
    }

    let logs = vec![
        ("seed-001", "Omar Haddad", "priya.raman@riverside.edu", "negative", "Mathematics", "morning", Some("high"), "Disruptive shouting during test", 6),
        ("seed-002", "Omar Haddad", "priya.raman@riverside.edu", "negative", "Reading", "morning", Some("medium"), "Disruptive shouting during test", 4),
        ("seed-003", "Omar Haddad", "priya.raman@riverside.edu", "negative", "Science", "morning", None, "Left seat without permission", 3),
        ("seed-004", "Maya Chen", "priya.raman@riverside.edu", "positive", "Reading", "afternoon", Some("low"), "Helped a classmate with reading", 5),
        ("seed-005", "Maya Chen", "priya.raman@riverside.edu", "positive", "Mathematics", "morning", None, "Led group problem solving", 2),
        ("seed-006", "Lena Novak", "marcus.hill@riverside.edu", "negative", "Mathematics", "afternoon", Some("medium"), "Academic struggle with fractions", 5),
        ("seed-007", "Lena Novak", "marcus.hill@riverside.edu", "neutral", "Art", "afternoon", None, "Quiet during group work", 3),
    ];

    // Dated relative to today so the default reporting window picks them up.
    let today = Utc::now().date_naive();
    for (source_key, student, teacher_email, behavior_type, subject, time_of_day, severity, notes, days_ago) in logs {
        let student_id = *student_ids.get(student).context("seed student missing")?;
        let teacher_id = teacher_id_by_email(pool, teacher_email).await?;
        let date = (today - Duration::days(days_ago))
            .and_hms_opt(9, 30, 0)
            .context("invalid date")?
            .and_utc();

        let log = NewBehaviorLog {
            student_id,
            teacher_id,
            behavior_type: behavior_type.to_string(),
            subject: Some(subject.to_string()),
            time_of_day: Some(time_of_day.to_string()),
            severity: severity.map(str::parse::<Severity>).transpose()?,
            notes: notes.to_string(),
            outcome: None,
            date: Some(date),
        };
        insert_log(pool, &log, Some(source_key.to_string())).await?;
    }

    Ok(())
}

pub async fn upsert_school(pool: &PgPool, name: &str, address: Option<&str>) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO behavior_tracker.schools (id, name, address)
        VALUES ($1, $2, $3)
        ON CONFLICT (name) DO UPDATE
        SET address = COALESCE(EXCLUDED.address, behavior_tracker.schools.address)
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(address)
    .fetch_one(pool)
    .await?
    .get("id");

    Ok(id)
}

async fn school_id_by_name(pool: &PgPool, name: &str) -> anyhow::Result<Uuid> {
    let row = sqlx::query("SELECT id FROM behavior_tracker.schools WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await?
        .with_context(|| format!("school {name} not found"))?;
    Ok(row.get("id"))
}

pub async fn upsert_user(
    pool: &PgPool,
    full_name: &str,
    email: &str,
    role: Role,
    school: Option<&str>,
) -> anyhow::Result<Uuid> {
    let school_id = match school {
        Some(name) => Some(school_id_by_name(pool, name).await?),
        None => None,
    };

    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO behavior_tracker.users (id, full_name, email, role, school_id)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (email) DO UPDATE
        SET full_name = EXCLUDED.full_name, role = EXCLUDED.role, school_id = EXCLUDED.school_id
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(full_name)
    .bind(email)
    .bind(role.as_str())
    .bind(school_id)
    .fetch_one(pool)
    .await?
    .get("id");

    Ok(id)
}

pub async fn teacher_id_by_email(pool: &PgPool, email: &str) -> anyhow::Result<Uuid> {
    let row = sqlx::query(
        "SELECT id FROM behavior_tracker.users WHERE email = $1 AND role = 'teacher'",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?
    .with_context(|| format!("no teacher registered with email {email}"))?;
    Ok(row.get("id"))
}

/// Registers a student under a teacher; the student inherits the teacher's school.
pub async fn add_student(
    pool: &PgPool,
    full_name: &str,
    grade: &str,
    teacher_email: &str,
) -> anyhow::Result<Uuid> {
    let teacher = sqlx::query(
        "SELECT id, school_id FROM behavior_tracker.users WHERE email = $1 AND role = 'teacher'",
    )
    .bind(teacher_email)
    .fetch_optional(pool)
    .await?
    .with_context(|| format!("no teacher registered with email {teacher_email}"))?;
    let teacher_id: Uuid = teacher.get("id");
    let school_id: Option<Uuid> = teacher.get("school_id");

    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO behavior_tracker.students (id, full_name, grade, teacher_id, school_id)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (full_name, teacher_id) DO UPDATE
        SET grade = EXCLUDED.grade
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(full_name)
    .bind(grade)
    .bind(teacher_id)
    .bind(school_id)
    .fetch_one(pool)
    .await?
    .get("id");

    Ok(id)
}

pub async fn fetch_student(pool: &PgPool, id: Uuid) -> anyhow::Result<Option<Student>> {
    let row = sqlx::query(
        "SELECT id, full_name, grade, teacher_id FROM behavior_tracker.students WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| Student {
        id: row.get("id"),
        full_name: row.get("full_name"),
        grade: row.get("grade"),
        teacher_id: row.get("teacher_id"),
    }))
}

/// Inserts a log; returns false when `source_key` was already imported.
pub async fn insert_log(
    pool: &PgPool,
    log: &NewBehaviorLog,
    source_key: Option<String>,
) -> anyhow::Result<bool> {
    log.validate()?;

    let source_key = source_key.unwrap_or_else(|| format!("manual-{}", Uuid::new_v4()));
    let logged_at = log.date.unwrap_or_else(Utc::now);

    let result = sqlx::query(
        r#"
        INSERT INTO behavior_tracker.behavior_logs
        (id, student_id, teacher_id, behavior_type, subject, time_of_day, severity, notes, outcome, logged_at, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(log.student_id)
    .bind(log.teacher_id)
    .bind(&log.behavior_type)
    .bind(&log.subject)
    .bind(&log.time_of_day)
    .bind(log.severity.map(|severity| severity.as_str()))
    .bind(&log.notes)
    .bind(&log.outcome)
    .bind(logged_at)
    .bind(source_key)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

fn log_from_row(row: &PgRow) -> anyhow::Result<BehaviorLogRecord> {
    let severity: Option<String> = row.get("severity");

    Ok(BehaviorLogRecord {
        student_id: row.get("student_id"),
        teacher_id: row.get("teacher_id"),
        behavior_type: row.get("behavior_type"),
        subject: row.get("subject"),
        time_of_day: row.get("time_of_day"),
        severity: severity.as_deref().map(str::parse::<Severity>).transpose()?,
        notes: row.get("notes"),
        outcome: row.get("outcome"),
        date: row.get("logged_at"),
    })
}

fn recent_logs_query() -> String {
    format!(
        "SELECT {LOG_COLUMNS} FROM behavior_tracker.behavior_logs l \
         WHERE l.student_id = $1{LOG_ORDER} \
         LIMIT $2"
    )
}

fn scoped_logs_query(scope: &LogScope) -> String {
    let mut query = format!(
        "SELECT {LOG_COLUMNS} FROM behavior_tracker.behavior_logs l \
         JOIN behavior_tracker.users u ON u.id = l.teacher_id \
         JOIN behavior_tracker.students st ON st.id = l.student_id \
         LEFT JOIN behavior_tracker.schools sc ON sc.id = st.school_id \
         WHERE l.logged_at >= $1"
    );

    match scope {
        LogScope::All => {}
        LogScope::Teacher(_) => query.push_str(" AND u.email = $2"),
        LogScope::School(_) => query.push_str(" AND sc.name = $2"),
    }
    query.push_str(LOG_ORDER);
    query
}

/// Most recent logs for one student, newest first.
pub async fn fetch_recent_logs(
    pool: &PgPool,
    student_id: Uuid,
    limit: i64,
) -> anyhow::Result<Vec<BehaviorLogRecord>> {
    let query = recent_logs_query();

    let rows = sqlx::query(&query)
        .bind(student_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    rows.iter().map(log_from_row).collect()
}

pub async fn fetch_logs(
    pool: &PgPool,
    since: DateTime<Utc>,
    scope: &LogScope,
) -> anyhow::Result<Vec<BehaviorLogRecord>> {
    let query = scoped_logs_query(scope);

    let mut rows = sqlx::query(&query).bind(since);
    match scope {
        LogScope::All => {}
        LogScope::Teacher(value) | LogScope::School(value) => rows = rows.bind(value),
    }

    let records = rows.fetch_all(pool).await?;
    records.iter().map(log_from_row).collect()
}

pub async fn fetch_student_names(
    pool: &PgPool,
    ids: &[Uuid],
) -> anyhow::Result<HashMap<Uuid, String>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = sqlx::query("SELECT id, full_name FROM behavior_tracker.students WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| (row.get("id"), row.get("full_name")))
        .collect())
}

pub async fn insert_suggestion(
    pool: &PgPool,
    student_id: Uuid,
    suggestion: &SuggestionResult,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO behavior_tracker.suggestions
        (id, student_id, behavior_pattern, suggestion_text, category, priority, is_implemented)
        VALUES ($1, $2, $3, $4, $5, $6, false)
        "#,
    )
    .bind(id)
    .bind(student_id)
    .bind(&suggestion.behavior_pattern)
    .bind(&suggestion.suggestion_text)
    .bind(suggestion.category.as_str())
    .bind(suggestion.priority.as_str())
    .execute(pool)
    .await?;

    Ok(id)
}

pub async fn fetch_suggestions(
    pool: &PgPool,
    student_id: Uuid,
) -> anyhow::Result<Vec<StoredSuggestion>> {
    let rows = sqlx::query(
        r#"
        SELECT id, student_id, behavior_pattern, suggestion_text, category, priority,
               is_implemented, created_at
        FROM behavior_tracker.suggestions
        WHERE student_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    let mut suggestions = Vec::new();
    for row in rows {
        let category: String = row.get("category");
        let priority: String = row.get("priority");
        suggestions.push(StoredSuggestion {
            id: row.get("id"),
            student_id: row.get("student_id"),
            result: SuggestionResult {
                behavior_pattern: row.get("behavior_pattern"),
                suggestion_text: row.get("suggestion_text"),
                category: category.parse()?,
                priority: priority.parse()?,
            },
            is_implemented: row.get("is_implemented"),
            created_at: row.get("created_at"),
        });
    }

    Ok(suggestions)
}

pub async fn mark_suggestion_implemented(pool: &PgPool, id: Uuid) -> anyhow::Result<bool> {
    let result = sqlx::query(
        "UPDATE behavior_tracker.suggestions SET is_implemented = true WHERE id = $1",
    )
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

fn csv_severity(raw: Option<&str>, row: usize) -> anyhow::Result<Option<Severity>> {
    raw.map(str::parse::<Severity>)
        .transpose()
        .with_context(|| format!("invalid severity in CSV row {row}"))
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        student_name: String,
        grade: String,
        teacher_email: String,
        behavior_type: String,
        subject: Option<String>,
        time_of_day: Option<String>,
        severity: Option<String>,
        notes: String,
        outcome: Option<String>,
        logged_on: Option<NaiveDate>,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("malformed CSV row {}", line + 1))?;
        let student_id = add_student(pool, &row.student_name, &row.grade, &row.teacher_email).await?;
        let teacher_id = teacher_id_by_email(pool, &row.teacher_email).await?;

        let log = NewBehaviorLog {
            student_id,
            teacher_id,
            behavior_type: row.behavior_type,
            subject: row.subject,
            time_of_day: row.time_of_day,
            severity: csv_severity(row.severity.as_deref(), line + 1)?,
            notes: row.notes,
            outcome: row.outcome,
            date: row
                .logged_on
                .and_then(|day| day.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc()),
        };

        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        if insert_log(pool, &log, Some(source_key))
            .await
            .with_context(|| format!("failed to insert CSV row {}", line + 1))?
        {
            inserted += 1;
        } else {
            tracing::debug!(row = line + 1, "skipping already imported row");
        }
    }

    Ok(inserted)
}
