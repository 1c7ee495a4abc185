//! Fields command implementation.

use crate::app::App;
use crate::error::Result;
use crate::output::Formatter;

/// Execute the fields command.
pub async fn execute_fields(app: &App, formatter: &Formatter) -> Result<()> {
    println!("{}", formatter.fields(app.reconciler().registry().definitions())?);
    Ok(())
}
