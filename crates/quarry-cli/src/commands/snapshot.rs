//! Snapshot command implementation.

use crate::app::App;
use crate::cli::SnapshotArgs;
use crate::error::Result;
use crate::output::Formatter;
use chrono::Utc;
use quarry_domain::CaseId;

/// Execute the snapshot command.
///
/// Shows the last persisted snapshot (computed on the fly if none exists);
/// `--refresh` reconciles and persists first, emitting transition events.
pub async fn execute_snapshot(args: SnapshotArgs, app: &App, formatter: &Formatter) -> Result<()> {
    let case_id = CaseId::new(args.case_id);
    let now = Utc::now();

    let snapshot = if args.refresh {
        app.service().reconcile(&case_id, now)?
    } else {
        app.service().insight_snapshot(&case_id, now)?
    };

    println!("{}", formatter.snapshot(&snapshot)?);
    Ok(())
}
