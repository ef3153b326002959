use flatfs_engine::FsError;
use flatfs_proto::ProtoError;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("request channel: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Proto(#[from] ProtoError),

    #[error("file store: {0}")]
    Engine(#[from] FsError),
}
