//! Operational commands: kill switch and audit trail.

use crate::app::App;
use crate::cli::{AuditArgs, KillSwitchAction};
use crate::error::{CliError, Result};
use crate::output::Formatter;
use chrono::Utc;
use quarry_domain::AuditKind;

/// Execute the kill-switch command.
pub async fn execute_kill_switch(action: KillSwitchAction, app: &App, formatter: &Formatter) -> Result<()> {
    let disabled = match action {
        KillSwitchAction::Status => app.service().kill_switch_state()?,
        KillSwitchAction::On | KillSwitchAction::Off => {
            let engage = matches!(action, KillSwitchAction::On);
            let previous = app.service().set_kill_switch(engage, Utc::now())?;
            if previous == engage {
                eprintln!("{}", formatter.info("Kill switch unchanged"));
            }
            engage
        }
    };

    println!("{}", formatter.kill_switch(disabled)?);
    Ok(())
}

/// Execute the audit command.
pub async fn execute_audit(args: AuditArgs, app: &App, formatter: &Formatter) -> Result<()> {
    let kind = match args.kind.as_deref() {
        Some(kind) => Some(
            AuditKind::parse(kind).ok_or_else(|| CliError::InvalidInput(format!("Unknown audit kind '{}'", kind)))?,
        ),
        None => None,
    };

    let events = {
        let store = app.store().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        store.recent_audit_events(kind, args.limit)?
    };

    println!("{}", formatter.audit(&events)?);
    Ok(())
}
