use std::{fmt::Display, path::Path};

use anyhow::Result;
use chrono::{DateTime, Duration, Local, Utc};
use chrono_english::parse_date_string;
use clap::{CommandFactory, Parser, ValueEnum};
use now::DateTimeNow;

use crate::{
    daemon::{
        create_engine,
        engine::indicator::LogIndicator,
        storage::entities::Snapshot,
    },
    utils::{
        clock::DefaultClock,
        time::{clamp_ms, format_duration},
    },
};

use super::Args;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

#[derive(Debug, Parser)]
pub struct ReportCommand {
    #[arg(
        long = "start",
        short,
        help = "Start of the range. Examples are \"yesterday\", \"1 hour ago\", \"15/03/2025\", \"12:00 16/03/2025\". Defaults to the beginning of today"
    )]
    start_date: Option<String>,
    #[arg(long = "end", short, help = "End of the range. Same forms as --start")]
    end_date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
    #[arg(
        long = "days",
        default_value_t = false,
        help = "Take inputs as whole days. For example if start and end are both 15/03/2025 this option allows to summarize the whole day"
    )]
    treat_as_days: bool,
}

/// Command to process `report`. Summarizes recorded sessions between `start_date` and
/// `end_date` into per-task totals, the exportable view of tracked time.
pub async fn process_report_command(app_dir: &Path, command: ReportCommand) -> Result<()> {
    let (start, end) = parse_range(command)?;

    let mut engine = create_engine(app_dir, Box::new(DefaultClock), Box::new(LogIndicator))?;
    let snapshot = engine.snapshot().await?;

    let rows = summarize(&snapshot, start.with_timezone(&Utc), end.with_timezone(&Utc));
    if rows.is_empty() {
        println!("No sessions recorded between {start} and {end}");
        return Ok(());
    }

    let mut last_project = None;
    for row in &rows {
        if last_project.as_deref() != Some(row.project.as_str()) {
            println!("{}", ansi_term::Style::new().bold().paint(row.project.as_str()));
            last_project = Some(row.project.clone());
        }
        println!(
            "  {}\t{}",
            format_duration(Duration::milliseconds(row.total_ms as i64)),
            row.task
        );
    }
    Ok(())
}

fn parse_range(
    ReportCommand {
        start_date,
        end_date,
        date_style,
        treat_as_days,
    }: ReportCommand,
) -> Result<(DateTime<Local>, DateTime<Local>)> {
    let now = Local::now();
    let dialect: chrono_english::Dialect = date_style.into();

    let mut start = match start_date.map(|s| parse_date_string(&s, now, dialect)) {
        Some(Ok(v)) => v.with_timezone(&Local),
        Some(Err(e)) => {
            return Err(Args::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("Failed to valiate start date {e}"),
                )
                .into());
        }
        None => now.beginning_of_day(),
    };
    let mut end = match end_date.map(|s| parse_date_string(&s, now, dialect)) {
        Some(Ok(v)) => v.with_timezone(&Local),
        Some(Err(e)) => {
            return Err(Args::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("Failed to valiate end date {e}"),
                )
                .into());
        }
        None => now,
    };
    if treat_as_days {
        start = start.beginning_of_day();
        end = (end + Duration::days(1)).beginning_of_day();
    }

    Ok((start, end))
}

struct ReportRow {
    project: String,
    task: String,
    total_ms: u64,
}

/// Sums session time per task inside [start, end). A session counts into the range its end
/// falls in; manual corrections attributed to it count with it.
fn summarize(snapshot: &Snapshot, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<ReportRow> {
    let mut totals: Vec<(String, u64)> = Vec::new();
    for session in &snapshot.sessions {
        if session.end_at < start || session.end_at >= end {
            continue;
        }
        let contribution = clamp_ms(
            session.elapsed_ms as i64 + session.manual_adjusted_ms.unwrap_or(0),
        );
        match totals.iter_mut().find(|(task_id, _)| task_id == &session.task_id) {
            Some((_, total)) => *total += contribution,
            None => totals.push((session.task_id.clone(), contribution)),
        }
    }

    let mut rows: Vec<ReportRow> = totals
        .into_iter()
        .map(|(task_id, total_ms)| {
            let task = snapshot.tasks.iter().find(|t| t.id == task_id);
            let project = task
                .and_then(|t| snapshot.projects.iter().find(|p| p.id == t.project_id));
            ReportRow {
                project: project
                    .map(|p| p.name.clone())
                    .unwrap_or_else(|| "<unknown project>".to_string()),
                task: task
                    .map(|t| t.name.clone())
                    .unwrap_or_else(|| "<unknown task>".to_string()),
                total_ms,
            }
        })
        .collect();
    rows.sort_by(|a, b| a.project.cmp(&b.project).then(a.task.cmp(&b.task)));
    rows
}
