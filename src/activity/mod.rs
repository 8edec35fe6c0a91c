//! Activity accounting for the telemetry client.
//!
//! Counts what the client did (frames, connection attempts, breathing
//! sessions, notifications) so a user can inspect it with `calmwave status`.

pub mod log;

pub use log::{
    create_shared_log, create_shared_log_with_persistence, ActivityLog, ActivityStats,
    SharedActivityLog,
};
