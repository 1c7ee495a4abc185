//! Output formatting for the CLI.

use crate::config::OutputFormat;
use crate::error::Result;
use chrono::{DateTime, Utc};
use colored::*;
use quarry_domain::{
    AppliesTo, AuditEvent, BreakerStatus, ExtractionJob, ExtractionResult, FieldDefinition, FieldKind,
    InsightSnapshot, JobCounts,
};
use serde::Serialize;
use tabled::{
    builder::Builder,
    settings::{object::Rows, Alignment, Modify, Style},
};

/// Output formatter.
pub struct Formatter {
    format: OutputFormat,
    color_enabled: bool,
}

impl Formatter {
    /// Create a new formatter.
    pub fn new(format: OutputFormat, color_enabled: bool) -> Self {
        Self {
            format,
            color_enabled,
        }
    }

    fn json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
        Ok(serde_json::to_string_pretty(value)?)
    }

    fn table(header: &[&str], rows: Vec<Vec<String>>) -> String {
        let mut builder = Builder::default();
        builder.push_record(header.iter().map(|h| h.to_string()));
        for row in rows {
            builder.push_record(row);
        }

        let mut table = builder.build();
        table
            .with(Style::rounded())
            .with(Modify::new(Rows::first()).with(Alignment::center()));
        table.to_string()
    }

    /// Format one job.
    pub fn job(&self, job: &ExtractionJob) -> Result<String> {
        match self.format {
            OutputFormat::Json => Self::json(job),
            OutputFormat::Quiet => Ok(job.id.to_string()),
            OutputFormat::Table => {
                let mut lines = vec![
                    format!("Job:          {}", job.id),
                    format!("Document:     {}", job.document_id),
                    format!("Case:         {}", job.case_id),
                    format!("Status:       {}", self.status(job)),
                    format!("Attempts:     {}/{}", job.attempt_count, job.max_attempts),
                    format!("Next attempt: {}", optional_time(job.next_attempt_at)),
                ];
                if let Some(worker) = &job.locked_by {
                    lines.push(format!("Locked by:    {} since {}", worker, optional_time(job.locked_at)));
                }
                if let Some(error) = &job.last_error {
                    lines.push(format!("Last error:   {}", self.colorize(error, "red")));
                }
                lines.push(format!("Updated:      {}", time(job.updated_at)));
                Ok(lines.join("\n"))
            }
        }
    }

    /// Format a job listing with per-status totals.
    pub fn jobs(&self, jobs: &[ExtractionJob], counts: &JobCounts) -> Result<String> {
        match self.format {
            OutputFormat::Json => Self::json(&serde_json::json!({ "jobs": jobs, "counts": counts })),
            OutputFormat::Quiet => Ok(jobs.iter().map(|j| j.id.to_string()).collect::<Vec<_>>().join("\n")),
            OutputFormat::Table => {
                let totals = format!(
                    "queued {} · processing {} · succeeded {} · failed {} · canceled {}",
                    counts.queued, counts.processing, counts.succeeded, counts.failed, counts.canceled
                );
                if jobs.is_empty() {
                    return Ok(format!("{}\n{}", self.colorize("No jobs found.", "yellow"), totals));
                }

                let rows = jobs
                    .iter()
                    .map(|job| {
                        vec![
                            job.id.to_string()[..8].to_string(),
                            job.document_id.to_string(),
                            job.case_id.to_string(),
                            job.status.to_string(),
                            format!("{}/{}", job.attempt_count, job.max_attempts),
                            optional_time(job.next_attempt_at),
                            job.last_error.clone().unwrap_or_default(),
                        ]
                    })
                    .collect();
                let table = Self::table(
                    &["ID", "Document", "Case", "Status", "Attempts", "Next attempt", "Last error"],
                    rows,
                );
                Ok(format!("{}\n{}", table, totals))
            }
        }
    }

    /// Format an extraction result.
    pub fn result(&self, result: &ExtractionResult) -> Result<String> {
        match self.format {
            OutputFormat::Json => Self::json(result),
            OutputFormat::Quiet => Ok(result
                .structured_json
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_default()),
            OutputFormat::Table => {
                let structured = match &result.structured_json {
                    Some(value) => serde_json::to_string_pretty(value)?,
                    None => "(none)".to_string(),
                };
                Ok([
                    format!("Document: {}", result.document_id),
                    format!("Provider: {} ({})", result.provider, result.model),
                    format!("Updated:  {}", time(result.updated_at)),
                    format!("Text:     {} chars", result.extracted_text.chars().count()),
                    "Fields:".to_string(),
                    structured,
                ]
                .join("\n"))
            }
        }
    }

    /// Format a case snapshot.
    pub fn snapshot(&self, snapshot: &InsightSnapshot) -> Result<String> {
        match self.format {
            OutputFormat::Json => Self::json(snapshot),
            OutputFormat::Quiet => Ok(snapshot.warnings.join("\n")),
            OutputFormat::Table => {
                let mut out = vec![format!(
                    "Case {} ({} observations, computed {})",
                    snapshot.case_id,
                    snapshot.observation_count,
                    time(snapshot.computed_at)
                )];

                if snapshot.fields.is_empty() {
                    out.push(self.colorize("No field values yet.", "yellow"));
                } else {
                    let rows = snapshot
                        .fields
                        .values()
                        .map(|field| {
                            let conflict = snapshot.conflicting_fields.contains(&field.field_key);
                            vec![
                                field.field_key.clone(),
                                field.value.clone(),
                                format!("{:.2}", field.confidence),
                                field.document_id.to_string(),
                                field.sources.len().to_string(),
                                if conflict { self.colorize("conflict", "red") } else { String::new() },
                            ]
                        })
                        .collect();
                    out.push(Self::table(
                        &["Field", "Value", "Confidence", "From", "Sources", ""],
                        rows,
                    ));
                }

                for warning in &snapshot.warnings {
                    out.push(self.warning(warning));
                }
                Ok(out.join("\n"))
            }
        }
    }

    /// Format the field registry.
    pub fn fields(&self, definitions: &[FieldDefinition]) -> Result<String> {
        match self.format {
            OutputFormat::Json => Self::json(definitions),
            OutputFormat::Quiet => Ok(definitions
                .iter()
                .map(|d| d.field_key.clone())
                .collect::<Vec<_>>()
                .join("\n")),
            OutputFormat::Table => {
                let rows = definitions
                    .iter()
                    .map(|d| {
                        vec![
                            d.field_key.clone(),
                            d.display_label.clone(),
                            match d.kind {
                                FieldKind::Numeric => "numeric".to_string(),
                                FieldKind::Text => "text".to_string(),
                            },
                            d.category.clone(),
                            if d.required { "yes".to_string() } else { String::new() },
                            match &d.applies_to {
                                AppliesTo::All => "all".to_string(),
                                AppliesTo::Categories(categories) => categories.join(", "),
                            },
                            d.aliases.join(", "),
                        ]
                    })
                    .collect();
                Ok(Self::table(
                    &["Key", "Label", "Kind", "Category", "Required", "Applies to", "Aliases"],
                    rows,
                ))
            }
        }
    }

    /// Format audit events.
    pub fn audit(&self, events: &[AuditEvent]) -> Result<String> {
        match self.format {
            OutputFormat::Json => Self::json(events),
            OutputFormat::Quiet => Ok(events
                .iter()
                .map(|e| format!("{} {}", e.kind, e.subject))
                .collect::<Vec<_>>()
                .join("\n")),
            OutputFormat::Table => {
                if events.is_empty() {
                    return Ok(self.colorize("No audit events.", "yellow"));
                }
                let rows = events
                    .iter()
                    .map(|e| vec![time(e.recorded_at), e.kind.to_string(), e.subject.clone(), e.detail.to_string()])
                    .collect();
                Ok(Self::table(&["Recorded", "Kind", "Subject", "Detail"], rows))
            }
        }
    }

    /// Format breaker states.
    pub fn breakers(&self, breakers: &[BreakerStatus]) -> Result<String> {
        match self.format {
            OutputFormat::Json => Self::json(breakers),
            OutputFormat::Quiet => Ok(breakers
                .iter()
                .map(|b| format!("{} {}", b.name, b.state))
                .collect::<Vec<_>>()
                .join("\n")),
            OutputFormat::Table => {
                if breakers.is_empty() {
                    return Ok(String::new());
                }
                let rows = breakers
                    .iter()
                    .map(|b| {
                        vec![
                            b.name.clone(),
                            b.state.to_string(),
                            b.failure_count.to_string(),
                            b.retry_after.map(|d| format!("{:?}", d)).unwrap_or_default(),
                        ]
                    })
                    .collect();
                Ok(Self::table(&["Breaker", "State", "Failures", "Retry after"], rows))
            }
        }
    }

    /// Format the kill switch state.
    pub fn kill_switch(&self, disabled: bool) -> Result<String> {
        match self.format {
            OutputFormat::Json => Self::json(&serde_json::json!({ "extraction_disabled": disabled })),
            OutputFormat::Quiet => Ok(if disabled { "on" } else { "off" }.to_string()),
            OutputFormat::Table => Ok(if disabled {
                self.warning("Extraction is disabled (kill switch on)")
            } else {
                self.success("Extraction is enabled (kill switch off)")
            }),
        }
    }

    fn status(&self, job: &ExtractionJob) -> String {
        use quarry_domain::JobStatus;
        let color = match job.status {
            JobStatus::Succeeded => "green",
            JobStatus::Failed => "yellow",
            JobStatus::Canceled => "red",
            JobStatus::Processing => "cyan",
            JobStatus::Queued => "blue",
        };
        self.colorize(job.status.as_str(), color)
    }

    /// Format a success message.
    pub fn success(&self, message: &str) -> String {
        self.colorize(&format!("✓ {}", message), "green")
    }

    /// Format an error message.
    pub fn error(&self, message: &str) -> String {
        self.colorize(&format!("✗ {}", message), "red")
    }

    /// Format an info message.
    pub fn info(&self, message: &str) -> String {
        self.colorize(&format!("ℹ {}", message), "blue")
    }

    /// Format a warning message.
    pub fn warning(&self, message: &str) -> String {
        self.colorize(&format!("⚠ {}", message), "yellow")
    }

    /// Colorize text if color is enabled.
    fn colorize(&self, text: &str, color: &str) -> String {
        if !self.color_enabled {
            return text.to_string();
        }

        match color {
            "red" => text.red().to_string(),
            "green" => text.green().to_string(),
            "blue" => text.blue().to_string(),
            "yellow" => text.yellow().to_string(),
            "cyan" => text.cyan().to_string(),
            _ => text.to_string(),
        }
    }
}

fn time(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn optional_time(t: Option<DateTime<Utc>>) -> String {
    t.map(time).unwrap_or_else(|| "-".to_string())
}
