//! Crate-level error for wiring and running a session.

use crate::calendar::CalendarError;
use crate::device::DeviceError;
use crate::journal::JournalError;
use crate::notify::NotifyError;

#[derive(Debug, thiserror::Error)]
pub enum CaretakerError {
    #[error("robot device error: {0}")]
    Device(#[from] DeviceError),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("calendar setup failed: {0}")]
    Calendar(#[from] CalendarError),

    #[error("email setup failed: {0}")]
    Notify(#[from] NotifyError),

    #[error("journal error: {0}")]
    Journal(#[from] JournalError),
}
