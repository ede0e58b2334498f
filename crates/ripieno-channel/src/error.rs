//! Error types for the GUI channel.

use thiserror::Error;

use crate::messages::Kind;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("bad frame magic {found:#010x}")]
    BadMagic { found: u32 },

    #[error("frame payload of {size} bytes exceeds the {max} byte limit")]
    FrameTooLarge { size: u32, max: u32 },

    #[error("unknown message kind {0}")]
    UnknownKind(u32),

    #[error("request kind {kind:?} carries cookie {cookie} of an outstanding request")]
    CookieCollision { kind: Kind, cookie: u32 },

    #[error("expected {expected:?} payload, got {found:?}")]
    KindMismatch { expected: Kind, found: Kind },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("payload codec error: {0}")]
    Codec(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, ChannelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ChannelError::BadMagic { found: 0xdead_beef };
        assert!(err.to_string().contains("0xdeadbeef"));

        let err = ChannelError::FrameTooLarge {
            size: 128,
            max: 64,
        };
        assert!(err.to_string().contains("128"));
        assert!(err.to_string().contains("64"));

        let err = ChannelError::UnknownKind(9999);
        assert!(err.to_string().contains("9999"));
    }
}
