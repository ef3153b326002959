pub mod block;
pub mod dir;
pub mod error;
pub mod inode;
pub mod open_file;

pub use error::{FsError, Resource};

use block::BlockPool;
use flatfs_fs::{
    FileHandle, FileName, FileType, FsConfig, InodeId, OpenFlags, DIR_ENTRY_SIZE, PATH_SEPARATOR,
    ROOT_INODE,
};
use inode::InodeTable;
use log::{debug, info, warn};
use open_file::OpenFileTable;
use std::sync::{Condvar, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Active,
    /// No new opens; waiting for the open-file table to empty.
    Draining,
    Destroyed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    pub inode: InodeId,
    pub kind: FileType,
    pub size: usize,
}

struct State {
    lifecycle: Lifecycle,
    blocks: BlockPool,
    inodes: InodeTable,
    files: OpenFileTable,
}

/// The file store. Every operation runs under one global lock; `open` and
/// `close` signal `file_closed` so a draining caller can re-check the table.
pub struct FileSystem {
    config: FsConfig,
    state: Mutex<State>,
    file_closed: Condvar,
}

impl FileSystem {
    pub fn new(config: FsConfig) -> Result<Self, FsError> {
        if config.block_size < DIR_ENTRY_SIZE {
            return Err(FsError::InvalidConfig("block too small for one directory entry"));
        }
        if config.data_blocks == 0 || config.inode_table_size == 0 {
            return Err(FsError::InvalidConfig("root directory needs an inode and a block"));
        }
        if config.data_blocks.checked_mul(config.block_size).is_none() {
            return Err(FsError::InvalidConfig("data blocks overflow the address space"));
        }

        let mut blocks = BlockPool::new(config.data_blocks, config.block_size);
        let mut inodes = InodeTable::new(config.inode_table_size);
        let root = inodes.create(FileType::Directory, &mut blocks)?;
        debug_assert_eq!(root, ROOT_INODE);

        info!(
            "flatfs ready: {} blocks of {} bytes, {} inodes, {} open files, {} directory slots",
            config.data_blocks,
            config.block_size,
            config.inode_table_size,
            config.max_open_files,
            config.dir_entries()
        );

        Ok(Self {
            config,
            state: Mutex::new(State {
                lifecycle: Lifecycle::Active,
                blocks,
                inodes,
                files: OpenFileTable::new(config.max_open_files),
            }),
            file_closed: Condvar::new(),
        })
    }

    pub fn config(&self) -> &FsConfig {
        &self.config
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, FsError> {
        self.state.lock().map_err(|_| FsError::LockPoisoned)
    }

    pub fn lifecycle(&self) -> Result<Lifecycle, FsError> {
        Ok(self.lock()?.lifecycle)
    }

    /// Number of handles currently open.
    pub fn open_files(&self) -> Result<usize, FsError> {
        Ok(self.lock()?.files.len())
    }

    pub fn lookup(&self, path: &str) -> Result<InodeId, FsError> {
        self.lock()?.lookup(path)
    }

    pub fn stat(&self, path: &str) -> Result<Metadata, FsError> {
        let state = self.lock()?;
        let id = state.lookup(path)?;
        let inode = state.inodes.get(id)?;
        Ok(Metadata {
            inode: id,
            kind: inode.kind,
            size: inode.size,
        })
    }

    /// Names in the root directory, in slot order.
    pub fn list(&self) -> Result<Vec<String>, FsError> {
        let state = self.lock()?;
        state.ensure_live()?;
        let entries = dir::entries(&state.inodes, &state.blocks, ROOT_INODE)?;
        Ok(entries.iter().map(|(name, _)| name.to_string()).collect())
    }

    pub fn open(&self, path: &str, flags: OpenFlags) -> Result<FileHandle, FsError> {
        let mut state = self.lock()?;
        let result = state.open(path, flags);
        self.file_closed.notify_all();

        match &result {
            Ok(handle) => debug!("open {} {:?} -> handle {}", path, flags, handle.val()),
            Err(e) => debug!("open {} {:?} failed: {}", path, flags, e),
        }
        result
    }

    pub fn close(&self, handle: FileHandle) -> Result<(), FsError> {
        let mut state = self.lock()?;
        state.ensure_live()?;
        let result = state.files.remove(handle).map(|_| ());
        self.file_closed.notify_all();
        debug!("close handle {}: {} still open", handle.val(), state.files.len());
        result
    }

    /// Writes at the handle's offset, clamped to the end of the block.
    pub fn write(&self, handle: FileHandle, data: &[u8]) -> Result<usize, FsError> {
        self.lock()?.write(handle, data)
    }

    /// Reads from the handle's offset into `buf`, clamped to the file size.
    pub fn read(&self, handle: FileHandle, buf: &mut [u8]) -> Result<usize, FsError> {
        self.lock()?.read(handle, buf)
    }

    /// Like `read`, but allocates at most one block's worth of buffer.
    pub fn read_to_vec(&self, handle: FileHandle, max_len: usize) -> Result<Vec<u8>, FsError> {
        let mut buf = vec![0u8; max_len.min(self.config.block_size)];
        let count = self.read(handle, &mut buf)?;
        buf.truncate(count);
        Ok(buf)
    }

    /// Tears everything down now. Handles still open become invalid.
    pub fn destroy(&self) -> Result<(), FsError> {
        let mut state = self.lock()?;
        state.ensure_live()?;
        if !state.files.is_empty() {
            warn!("destroying with {} files still open", state.files.len());
        }
        state.teardown();
        self.file_closed.notify_all();
        Ok(())
    }

    /// Refuses new opens from now on. Handles already open keep working.
    pub fn begin_drain(&self) -> Result<(), FsError> {
        let mut state = self.lock()?;
        state.ensure_live()?;
        if state.lifecycle == Lifecycle::Active {
            state.lifecycle = Lifecycle::Draining;
            info!("draining: {} files open", state.files.len());
        }
        Ok(())
    }

    /// Refuses new opens, waits for every handle to be closed, then destroys.
    pub fn destroy_after_drain(&self) -> Result<(), FsError> {
        self.begin_drain()?;
        let mut state = self.lock()?;

        // A wakeup only says the table changed; the count has to be re-read.
        // Teardown empties the table too, so the lifecycle goes first.
        loop {
            if state.lifecycle == Lifecycle::Destroyed {
                return Err(FsError::Destroyed);
            }
            if state.files.is_empty() {
                break;
            }
            state = self
                .file_closed
                .wait(state)
                .map_err(|_| FsError::LockPoisoned)?;
        }

        state.teardown();
        self.file_closed.notify_all();
        info!("drained and destroyed");
        Ok(())
    }
}

impl State {
    fn ensure_live(&self) -> Result<(), FsError> {
        match self.lifecycle {
            Lifecycle::Destroyed => Err(FsError::Destroyed),
            _ => Ok(()),
        }
    }

    fn ensure_active(&self) -> Result<(), FsError> {
        match self.lifecycle {
            Lifecycle::Active => Ok(()),
            Lifecycle::Draining => Err(FsError::Draining),
            Lifecycle::Destroyed => Err(FsError::Destroyed),
        }
    }

    fn lookup(&self, path: &str) -> Result<InodeId, FsError> {
        self.ensure_live()?;
        let name = file_name(path)?;
        dir::find(&self.inodes, &self.blocks, ROOT_INODE, name)
    }

    fn open(&mut self, path: &str, flags: OpenFlags) -> Result<FileHandle, FsError> {
        self.ensure_active()?;
        let name = file_name(path)?;

        // Checked before truncating or creating so a failed open changes nothing.
        if self.files.is_full() {
            return Err(FsError::Full(Resource::OpenFiles));
        }

        let (inode, offset) = match dir::find(&self.inodes, &self.blocks, ROOT_INODE, name) {
            Ok(id) => {
                let inode = self.inodes.get_mut(id)?;
                if flags.contains(OpenFlags::TRUNCATE) {
                    inode.truncate(&mut self.blocks);
                }
                let offset = if flags.contains(OpenFlags::APPEND) {
                    inode.size
                } else {
                    0
                };
                (id, offset)
            }
            Err(FsError::NotFound) if flags.contains(OpenFlags::CREATE) => {
                (self.create_file(name)?, 0)
            }
            Err(e) => return Err(e),
        };

        self.files.add(inode, offset)
    }

    fn create_file(&mut self, name: &[u8]) -> Result<InodeId, FsError> {
        let name = FileName::from_bytes(name)?;
        let id = self.inodes.create(FileType::File, &mut self.blocks)?;

        if let Err(e) = dir::add_entry(&self.inodes, &mut self.blocks, ROOT_INODE, id, name) {
            self.inodes.delete(id, &mut self.blocks)?;
            return Err(e);
        }
        debug!("created {} as inode {}", name, id.val());
        Ok(id)
    }

    fn write(&mut self, handle: FileHandle, data: &[u8]) -> Result<usize, FsError> {
        self.ensure_live()?;
        let block_size = self.blocks.block_size();
        let State {
            files,
            inodes,
            blocks,
            ..
        } = self;

        let file = files.get_mut(handle)?;
        let inode = inodes.get_mut(file.inode)?;

        let count = data.len().min(block_size.saturating_sub(file.offset));
        if count == 0 {
            return Ok(0);
        }

        let block = match inode.block {
            Some(block) => block,
            None => {
                let block = blocks.alloc()?;
                inode.block = Some(block);
                block
            }
        };

        blocks.get_mut(block)?[file.offset..file.offset + count].copy_from_slice(&data[..count]);
        file.offset += count;
        inode.size = inode.size.max(file.offset);
        Ok(count)
    }

    fn read(&mut self, handle: FileHandle, buf: &mut [u8]) -> Result<usize, FsError> {
        self.ensure_live()?;
        let State {
            files,
            inodes,
            blocks,
            ..
        } = self;

        let file = files.get_mut(handle)?;
        let inode = inodes.get(file.inode)?;

        // Another handle may have truncated the file below this offset.
        let count = inode.size.saturating_sub(file.offset).min(buf.len());
        if count == 0 {
            return Ok(0);
        }

        let block = inode.block.ok_or(FsError::MissingBlock(file.inode.val()))?;
        buf[..count].copy_from_slice(&blocks.get(block)?[file.offset..file.offset + count]);
        file.offset += count;
        Ok(count)
    }

    fn teardown(&mut self) {
        let block_size = self.blocks.block_size();
        self.blocks = BlockPool::new(0, block_size);
        self.inodes = InodeTable::new(0);
        self.files = OpenFileTable::new(0);
        self.lifecycle = Lifecycle::Destroyed;
    }
}

/// Strips the single leading separator. The remaining name must be non-empty.
fn file_name(path: &str) -> Result<&[u8], FsError> {
    match path.as_bytes() {
        [PATH_SEPARATOR, name @ ..] if !name.is_empty() => Ok(name),
        _ => Err(FsError::InvalidPath(path.to_string())),
    }
}

#[cfg(test)]
mod tests;
