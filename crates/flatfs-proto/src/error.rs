use flatfs_fs::LayoutError;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("channel i/o: {0}")]
    Io(#[from] io::Error),

    #[error("unknown opcode: {0}")]
    UnknownOpcode(u8),

    #[error("payload of {0} bytes exceeds the frame limit")]
    PayloadTooLarge(usize),

    #[error("frame exceeds the size limit")]
    FrameTooLarge,

    #[error("reply carries {count} bytes, buffer holds {capacity}")]
    ReplyTooLarge { count: usize, capacity: usize },

    #[error("frame encode error: {0}")]
    Encode(String),

    #[error("frame decode error: {0}")]
    Decode(String),

    #[error(transparent)]
    Name(#[from] LayoutError),
}

impl ProtoError {
    /// The channel ended in the middle of a frame.
    pub fn is_truncated(&self) -> bool {
        matches!(self, ProtoError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof)
    }
}

impl From<bincode::error::EncodeError> for ProtoError {
    fn from(e: bincode::error::EncodeError) -> Self {
        match e {
            bincode::error::EncodeError::Io { inner, .. } => ProtoError::Io(inner),
            other => ProtoError::Encode(format!("{:?}", other)),
        }
    }
}

impl From<bincode::error::DecodeError> for ProtoError {
    fn from(e: bincode::error::DecodeError) -> Self {
        match e {
            bincode::error::DecodeError::Io { inner, .. } => ProtoError::Io(inner),
            bincode::error::DecodeError::LimitExceeded => ProtoError::FrameTooLarge,
            other => ProtoError::Decode(format!("{:?}", other)),
        }
    }
}
