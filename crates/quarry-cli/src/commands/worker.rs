//! Worker command implementation.

use crate::app::App;
use crate::cli::WorkerArgs;
use crate::error::Result;
use crate::output::Formatter;
use quarry_worker::TickStatus;
use tracing::info;

/// Execute the worker command.
///
/// `--once` runs a single tick, `--cycles N` runs N ticks; otherwise the worker
/// polls until Ctrl+C.
pub async fn execute_worker(args: WorkerArgs, app: &App, formatter: &Formatter) -> Result<()> {
    let worker = app.worker(args.concurrency)?;

    if args.once {
        let report = worker.tick().await?;
        if report.status == TickStatus::Disabled {
            eprintln!("{}", formatter.warning("Extraction is disabled, nothing claimed"));
        }
    } else if let Some(cycles) = args.cycles {
        worker.run_cycles(cycles).await?;
    } else {
        info!(worker_id = %worker.config().worker_id, "Starting worker, press Ctrl+C to stop");
        worker.run().await?;
    }

    println!("{}", worker.metrics().summary());
    let breakers = formatter.breakers(&worker.breakers().snapshot())?;
    if !breakers.is_empty() {
        println!("{}", breakers);
    }
    Ok(())
}
