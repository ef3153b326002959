use flatfs_fs::LayoutError;
use std::fmt;
use thiserror::Error;

/// Fixed-capacity table that an allocation can exhaust.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Inodes,
    Blocks,
    Directory,
    OpenFiles,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Resource::Inodes => "inode table",
            Resource::Blocks => "block pool",
            Resource::Directory => "directory",
            Resource::OpenFiles => "open file table",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FsError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("invalid path: {0:?}")]
    InvalidPath(String),

    #[error("no such file")]
    NotFound,

    #[error("{0} is full")]
    Full(Resource),

    #[error("name already exists: {0}")]
    Duplicate(String),

    #[error("bad file handle: {0}")]
    BadHandle(u32),

    #[error("no such inode: {0}")]
    NoInode(u32),

    #[error("no such block: {0}")]
    NoBlock(u32),

    #[error("inode {0} has data but no block")]
    MissingBlock(u32),

    #[error("inode {0} is not a directory")]
    NotADirectory(u32),

    #[error("file system is draining")]
    Draining,

    #[error("file system has been destroyed")]
    Destroyed,

    #[error("global lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Layout(#[from] LayoutError),
}
