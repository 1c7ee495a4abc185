//! Command implementations.

pub mod fields;
pub mod jobs;
pub mod ops;
pub mod snapshot;
pub mod worker;

pub use self::fields::execute_fields;
pub use self::jobs::{execute_enqueue, execute_jobs, execute_result, execute_resume, execute_retry, execute_status};
pub use self::ops::{execute_audit, execute_kill_switch};
pub use self::snapshot::execute_snapshot;
pub use self::worker::execute_worker;
