//! Error types for GUI process bring-up.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpawnError {
    #[error("a GUI process is already attached")]
    AlreadyRunning,

    #[error("host does not provide {0} support")]
    MissingHostSupport(&'static str),

    #[error("failed to create GUI transport: {0}")]
    Transport(#[source] io::Error),

    #[error("failed to launch GUI executable {}: {source}", executable.display())]
    Launch {
        executable: PathBuf,
        source: io::Error,
    },

    #[error("host refused descriptor registration")]
    FdRegistration,

    #[error("host refused timer registration")]
    TimerRegistration,
}

pub type Result<T> = std::result::Result<T, SpawnError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_error_display() {
        let err = SpawnError::MissingHostSupport("timer");
        assert!(err.to_string().contains("timer"));

        let err = SpawnError::Launch {
            executable: PathBuf::from("/opt/gui"),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert!(err.to_string().contains("/opt/gui"));
    }
}
