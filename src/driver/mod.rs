//! Contains the batch-submission driver: the service lifecycle, the
//! driver loop, block-range resolution, and candidate building.

pub mod batch_driver;
pub use batch_driver::{BatchDriver, BatchSubmitter};

pub mod ranges;

pub mod candidates;

use thiserror::Error;

/// Lifecycle errors returned by [BatchSubmitter].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitterError {
    /// `start` was called while the driver loop was running
    #[error("batch submitter is already running")]
    AlreadyRunning,
    /// `stop` was called while the driver loop was stopped
    #[error("batch submitter is not running")]
    NotRunning,
    /// The configuration and the wired collaborators disagree
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
