use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, TimeDelta, Utc};
use clap::{ArgGroup, Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

mod analytics;
mod config;
mod db;
mod error;
mod models;
mod report;
mod suggest;
mod telemetry;

use crate::analytics::GroupBy;
use crate::models::{BehaviorLogRecord, LogScope, NewBehaviorLog, Role, Severity};

#[derive(Parser)]
#[command(name = "behavior-tracker")]
#[command(about = "Classroom behavior logging, analytics and suggestions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
#[command(group(
    ArgGroup::new("scope")
        .args(["teacher_email", "school"])
        .multiple(false)
))]
struct ScopeArgs {
    #[arg(long)]
    teacher_email: Option<String>,
    #[arg(long)]
    school: Option<String>,
    #[arg(long, default_value_t = 30)]
    since_days: i64,
}

impl ScopeArgs {
    fn scope(&self) -> LogScope {
        LogScope::from_args(self.teacher_email.clone(), self.school.clone())
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Create or update a school
    AddSchool {
        #[arg(long)]
        name: String,
        #[arg(long)]
        address: Option<String>,
    },
    /// Create or update an admin or teacher account
    AddUser {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "teacher")]
        role: Role,
        #[arg(long)]
        school: Option<String>,
    },
    /// Register a student under a teacher
    AddStudent {
        #[arg(long)]
        name: String,
        #[arg(long)]
        grade: String,
        #[arg(long)]
        teacher_email: String,
    },
    /// Record a behavior incident
    Log {
        #[arg(long)]
        student_id: Uuid,
        #[arg(long)]
        teacher_email: String,
        #[arg(long)]
        behavior_type: String,
        #[arg(long)]
        notes: String,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        time_of_day: Option<String>,
        #[arg(long)]
        severity: Option<Severity>,
        #[arg(long)]
        outcome: Option<String>,
    },
    /// Import behavior logs from a CSV file (a blank logged_on means today)
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Generate a suggestion from a student's recent logs
    Suggest {
        #[arg(long)]
        student_id: Uuid,
        #[arg(long, default_value_t = 10)]
        limit: i64,
        /// Bucket open behavior tags into positive/negative/neutral first
        #[arg(long)]
        classify: bool,
        /// Persist the suggestion for follow-up
        #[arg(long)]
        save: bool,
        #[arg(long)]
        json: bool,
    },
    /// List saved suggestions for a student
    Suggestions {
        #[arg(long)]
        student_id: Uuid,
    },
    /// Mark a saved suggestion as implemented
    Implement {
        #[arg(long)]
        id: Uuid,
    },
    /// Count behavior logs grouped by one dimension
    Stats {
        #[arg(long, default_value = "behavior-type")]
        group_by: GroupBy,
        #[arg(long)]
        top: Option<usize>,
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Export behavior logs to CSV
    Export {
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long, default_value = "behavior_logs.csv")]
        csv: PathBuf,
    },
}

/// Start of the reporting window, `since_days` (at least one) before `now`.
fn cutoff(since_days: i64, now: DateTime<Utc>) -> anyhow::Result<DateTime<Utc>> {
    TimeDelta::try_days(since_days.max(1))
        .and_then(|window| now.checked_sub_signed(window))
        .context("since-days out of range")
}

async fn student_names(
    pool: &sqlx::PgPool,
    logs: &[BehaviorLogRecord],
) -> anyhow::Result<std::collections::HashMap<Uuid, String>> {
    let ids: Vec<Uuid> = logs
        .iter()
        .map(|log| log.student_id)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    db::fetch_student_names(pool, &ids).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::Config::from_env()?;
    telemetry::init_tracing(config.log_format);

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::AddSchool { name, address } => {
            let id = db::upsert_school(&pool, &name, address.as_deref()).await?;
            tracing::info!(school_id = %id, "school saved");
            println!("School {name} saved ({id}).");
        }
        Commands::AddUser {
            name,
            email,
            role,
            school,
        } => {
            let id = db::upsert_user(&pool, &name, &email, role, school.as_deref()).await?;
            tracing::info!(user_id = %id, role = role.as_str(), "user saved");
            println!("{} {name} saved ({id}).", role.as_str());
        }
        Commands::AddStudent {
            name,
            grade,
            teacher_email,
        } => {
            let id = db::add_student(&pool, &name, &grade, &teacher_email).await?;
            tracing::info!(student_id = %id, "student registered");
            println!("Student {name} registered ({id}).");
        }
        Commands::Log {
            student_id,
            teacher_email,
            behavior_type,
            notes,
            subject,
            time_of_day,
            severity,
            outcome,
        } => {
            let student = db::fetch_student(&pool, student_id)
                .await?
                .with_context(|| format!("student {student_id} not found"))?;
            let teacher_id = db::teacher_id_by_email(&pool, &teacher_email).await?;
            if !student.is_taught_by(teacher_id) {
                anyhow::bail!("{} is not assigned to {teacher_email}", student.full_name);
            }
            let log = NewBehaviorLog {
                student_id,
                teacher_id,
                behavior_type,
                subject,
                time_of_day,
                severity,
                notes,
                outcome,
                date: None,
            };
            db::insert_log(&pool, &log, None).await?;
            tracing::info!(%student_id, behavior_type = %log.behavior_type, "behavior logged");
            println!("Behavior logged.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            tracing::info!(inserted, path = %csv.display(), "csv import finished");
            println!("Inserted {inserted} behavior logs from {}.", csv.display());
        }
        Commands::Suggest {
            student_id,
            limit,
            classify,
            save,
            json,
        } => {
            let student = db::fetch_student(&pool, student_id)
                .await?
                .with_context(|| format!("student {student_id} not found"))?;
            let mut logs = db::fetch_recent_logs(&pool, student_id, limit.max(1)).await?;
            if classify {
                logs = suggest::canonicalize_types(&logs);
            }

            let suggestion = suggest::suggest_for_student(student.id, &student.full_name, &logs)?;
            tracing::info!(
                %student_id,
                logs = logs.len(),
                category = suggestion.category.as_str(),
                priority = suggestion.priority.as_str(),
                "suggestion generated"
            );

            if json {
                println!("{}", serde_json::to_string_pretty(&suggestion)?);
            } else {
                println!("Suggestion for {} (grade {}):", student.full_name, student.grade);
                println!("- Pattern: {}", suggestion.behavior_pattern);
                println!("- Suggestion: {}", suggestion.suggestion_text);
                println!(
                    "- Category: {}, priority: {}",
                    suggestion.category.as_str(),
                    suggestion.priority.as_str()
                );
            }

            if save {
                let id = db::insert_suggestion(&pool, student.id, &suggestion).await?;
                println!("Saved suggestion {id}.");
            }
        }
        Commands::Suggestions { student_id } => {
            let suggestions = db::fetch_suggestions(&pool, student_id).await?;
            if suggestions.is_empty() {
                println!("No saved suggestions for this student.");
                return Ok(());
            }

            for saved in suggestions {
                println!(
                    "- {} [{}] {} / {}: {}{}",
                    saved.id,
                    saved.created_at.date_naive(),
                    saved.result.category.as_str(),
                    saved.result.priority.as_str(),
                    saved.result.behavior_pattern,
                    if saved.is_implemented { " (implemented)" } else { "" }
                );
            }
        }
        Commands::Implement { id } => {
            if db::mark_suggestion_implemented(&pool, id).await? {
                println!("Suggestion {id} marked as implemented.");
            } else {
                anyhow::bail!("suggestion {id} not found");
            }
        }
        Commands::Stats {
            group_by,
            top,
            scope,
            json,
        } => {
            let since = cutoff(scope.since_days, Utc::now())?;
            let logs = db::fetch_logs(&pool, since, &scope.scope()).await?;
            let mut counts = analytics::aggregate(&logs, group_by);
            if let Some(n) = top {
                counts = analytics::top_n(&counts, n);
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&counts)?);
                return Ok(());
            }

            if counts.is_empty() {
                println!("No behavior logs found for this window.");
                return Ok(());
            }

            let names = student_names(&pool, &logs).await?;
            println!(
                "Behavior logs for {} ({} total, {}% positive):",
                scope.scope().label(),
                logs.len(),
                analytics::rate_percent(analytics::positive_rate(&logs))
            );
            print!("{}", report::format_stats(group_by, &counts, &names));
        }
        Commands::Report { scope, out } => {
            let since = cutoff(scope.since_days, Utc::now())?;
            let log_scope = scope.scope();
            let logs = db::fetch_logs(&pool, since, &log_scope).await?;
            let names = student_names(&pool, &logs).await?;
            let report = report::build_report(&log_scope.label(), since.date_naive(), &logs, &names);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export { scope, csv } => {
            let since = cutoff(scope.since_days, Utc::now())?;
            let logs = db::fetch_logs(&pool, since, &scope.scope()).await?;
            let names = student_names(&pool, &logs).await?;
            let file = std::fs::File::create(&csv)
                .with_context(|| format!("failed to create {}", csv.display()))?;
            let written = report::export_csv(file, &logs, &names)?;
            println!("Exported {written} behavior logs to {}.", csv.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn cutoff_goes_back_whole_days() {
        let now = Utc.with_ymd_and_hms(2026, 3, 20, 12, 0, 0).unwrap();
        let since = cutoff(30, now).unwrap();
        assert_eq!(since, Utc.with_ymd_and_hms(2026, 2, 18, 12, 0, 0).unwrap());
    }

    #[test]
    fn cutoff_window_is_at_least_one_day() {
        let now = Utc.with_ymd_and_hms(2026, 3, 20, 12, 0, 0).unwrap();
        assert_eq!(cutoff(0, now).unwrap(), cutoff(1, now).unwrap());
        assert_eq!(cutoff(-5, now).unwrap(), cutoff(1, now).unwrap());
    }

    #[test]
    fn oversized_window_is_an_error() {
        let now = Utc.with_ymd_and_hms(2026, 3, 20, 12, 0, 0).unwrap();
        let err = cutoff(1_000_000_000, now).unwrap_err();
        assert!(err.to_string().contains("since-days out of range"));
        assert!(cutoff(i64::MAX, now).is_err());
    }
}
