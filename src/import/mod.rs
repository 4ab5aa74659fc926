//! Import runs: task records, progress reporting and the orchestrator
//! that drives scanning, reconciliation and sweeping.

mod service;
mod task;

pub use service::ImportService;
pub use task::{
    ImportMode, ImportTask, MSG_COMPACTING, MSG_COUNTING_LOCAL, MSG_COUNTING_WEBDAV_AUDIOBOOK,
    MSG_COUNTING_WEBDAV_MUSIC, MSG_DONE, MSG_PARSING, MSG_SWEEPING, TaskRegistry, TaskStatus,
};
