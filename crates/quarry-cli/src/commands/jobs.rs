//! Job command implementations: enqueue, status, listing, results, retry and resume.

use crate::app::App;
use crate::cli::{EnqueueArgs, JobsArgs};
use crate::error::{CliError, Result};
use crate::output::Formatter;
use chrono::Utc;
use quarry_domain::{CaseId, DocumentId, DocumentVersion};

/// Execute the enqueue command.
///
/// With `--content` a new document version is registered first, which
/// re-queues an existing job; without it only the job is created.
pub async fn execute_enqueue(args: EnqueueArgs, app: &App, formatter: &Formatter) -> Result<()> {
    let document_id = DocumentId::new(args.document_id);
    let case_id = CaseId::new(args.case_id);
    let now = Utc::now();

    let job = match args.content {
        Some(content_ref) => {
            let file_name = match args.name {
                Some(name) => name,
                None => file_name_of(&content_ref)?,
            };
            let mime_type = args.mime.or_else(|| guess_mime(&file_name).map(str::to_string));

            let document = DocumentVersion {
                document_id,
                case_id,
                version: 0,
                content_ref,
                mime_type,
                file_name,
                category: args.category,
            };
            let (document, job) = app.service().ingest_document(document, now)?;
            eprintln!(
                "{}",
                formatter.info(&format!("Registered {} version {}", document.document_id, document.version))
            );
            job
        }
        None => app.service().enqueue(&document_id, &case_id, now)?,
    };

    println!("{}", formatter.job(&job)?);
    Ok(())
}

/// Execute the status command.
pub async fn execute_status(document_id: String, app: &App, formatter: &Formatter) -> Result<()> {
    let document_id = DocumentId::new(document_id);
    match app.service().job_status(&document_id)? {
        Some(job) => println!("{}", formatter.job(&job)?),
        None => return Err(not_found("job", &document_id)),
    }
    Ok(())
}

/// Execute the jobs command.
pub async fn execute_jobs(args: JobsArgs, app: &App, formatter: &Formatter) -> Result<()> {
    let jobs = app.service().list_jobs(args.status.map(Into::into), args.limit)?;
    let counts = app.service().job_counts()?;
    println!("{}", formatter.jobs(&jobs, &counts)?);
    Ok(())
}

/// Execute the result command.
pub async fn execute_result(document_id: String, app: &App, formatter: &Formatter) -> Result<()> {
    let document_id = DocumentId::new(document_id);
    match app.service().result(&document_id)? {
        Some(result) => println!("{}", formatter.result(&result)?),
        None => return Err(not_found("extraction result", &document_id)),
    }
    Ok(())
}

/// Execute the retry command.
pub async fn execute_retry(document_id: String, app: &App, formatter: &Formatter) -> Result<()> {
    let job = app.service().retry(&DocumentId::new(document_id), Utc::now())?;
    println!("{}", formatter.job(&job)?);
    Ok(())
}

/// Execute the resume command.
pub async fn execute_resume(document_id: String, app: &App, formatter: &Formatter) -> Result<()> {
    let job = app.service().resume(&DocumentId::new(document_id), Utc::now())?;
    println!("{}", formatter.job(&job)?);
    Ok(())
}

fn not_found(what: &str, document_id: &DocumentId) -> CliError {
    CliError::NotFound(format!("no {} for document {}", what, document_id))
}

/// Last path segment of a content reference
fn file_name_of(content_ref: &str) -> Result<String> {
    content_ref
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| CliError::InvalidInput(format!("Cannot derive a file name from '{}'", content_ref)))
}

/// MIME type from a file extension
fn guess_mime(file_name: &str) -> Option<&'static str> {
    let (_, extension) = file_name.rsplit_once('.')?;
    let mime = match extension.to_ascii_lowercase().as_str() {
        "pdf" => "application/pdf",
        "json" => "application/json",
        "txt" | "text" => "text/plain",
        "csv" => "text/csv",
        "md" => "text/markdown",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "tif" | "tiff" => "image/tiff",
        _ => return None,
    };
    Some(mime)
}
