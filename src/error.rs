//! Error type shared by the coordinator, its components and the platform
//! capabilities.
//!
//! Every variant maps to a short stable reason code via [`Error::as_label`],
//! which is what failed commands and `RingFailed` events report.

use std::io;

use thiserror::Error;

use crate::alarm::AlarmId;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or malformed input, e.g. a zero id or an empty asset path.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The platform refused something the alarm needs: audio device busy,
    /// notification permission missing, foreground execution denied.
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// A trigger was suppressed because another alarm holds the ringing slot.
    #[error("alarm {0} is already ringing")]
    AlreadyRinging(AlarmId),

    #[error("no alarm with id {0}")]
    NotFound(AlarmId),

    /// The durable key/value store failed.
    #[error("storage failure: {0}")]
    Storage(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("couldn't parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("couldn't serialize: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The controller thread has exited.
    #[error("coordinator is not running")]
    Disconnected,
}

impl Error {
    /// Returns a short stable label (snake_case) for logs and failed-command
    /// results.
    #[must_use]
    pub const fn as_label(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::ResourceUnavailable(_) => "resource_unavailable",
            Self::AlreadyRinging(_) => "already_ringing",
            Self::NotFound(_) => "not_found",
            Self::Storage(_) => "storage",
            Self::Io(_) => "io",
            Self::ConfigParse(_) => "config_parse",
            Self::Serialize(_) => "serialize",
            Self::Disconnected => "disconnected",
        }
    }
}
