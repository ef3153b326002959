use anyhow::Context;
use clap::Parser;
use flatfs_engine::FileSystem;
use flatfs_fs::{FsConfig, BLOCK_SIZE, DATA_BLOCKS, INODE_TABLE_SIZE, MAX_OPEN_FILES, MAX_SESSIONS};
use flatfs_server::{FifoEndpoint, Server};
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about = "Serve an in-memory flatfs over named pipes", long_about = None)]
struct Cli {
    /// Named pipe clients send requests to (create it with mkfifo)
    pipe: PathBuf,

    /// Block size in bytes; also the largest file size
    #[arg(long, default_value_t = BLOCK_SIZE)]
    block_size: usize,

    /// Number of data blocks
    #[arg(long, default_value_t = DATA_BLOCKS)]
    data_blocks: usize,

    /// Number of inodes, root directory included
    #[arg(long, default_value_t = INODE_TABLE_SIZE)]
    inodes: usize,

    /// Open-file table size
    #[arg(long, default_value_t = MAX_OPEN_FILES)]
    max_open_files: usize,

    /// Concurrent client sessions
    #[arg(long, default_value_t = MAX_SESSIONS)]
    max_sessions: usize,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    let config = FsConfig {
        block_size: cli.block_size,
        data_blocks: cli.data_blocks,
        inode_table_size: cli.inodes,
        max_open_files: cli.max_open_files,
    };
    let fs = FileSystem::new(config).context("initializing file store")?;

    let endpoint = FifoEndpoint::new(&cli.pipe);
    info!("listening on {}", endpoint.path().display());

    Server::new(endpoint, Arc::new(fs), cli.max_sessions)
        .run()
        .with_context(|| format!("serving on {}", cli.pipe.display()))?;

    Ok(())
}
