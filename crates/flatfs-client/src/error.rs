use flatfs_proto::ProtoError;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("channel i/o: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Proto(#[from] ProtoError),

    /// The server answered with the failure sentinel.
    #[error("request failed")]
    Failed,

    #[error("server refused the session")]
    MountRejected,
}
