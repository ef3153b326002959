use crate::error::{FsError, Resource};
use flatfs_fs::{FileHandle, InodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFile {
    pub inode: InodeId,
    pub offset: usize,
}

/// Handle -> (inode, offset). Offsets are per handle, not per inode.
pub struct OpenFileTable {
    slots: Vec<Option<OpenFile>>,
    open: usize,
}

impl OpenFileTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
            open: 0,
        }
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.open
    }

    pub fn is_empty(&self) -> bool {
        self.open == 0
    }

    pub fn is_full(&self) -> bool {
        self.open == self.slots.len()
    }

    pub fn add(&mut self, inode: InodeId, offset: usize) -> Result<FileHandle, FsError> {
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(FsError::Full(Resource::OpenFiles))?;

        self.slots[index] = Some(OpenFile { inode, offset });
        self.open += 1;
        Ok(FileHandle::new(index as u32))
    }

    pub fn remove(&mut self, handle: FileHandle) -> Result<OpenFile, FsError> {
        let file = self
            .slots
            .get_mut(handle.index())
            .and_then(Option::take)
            .ok_or(FsError::BadHandle(handle.val()))?;
        self.open -= 1;
        Ok(file)
    }

    #[cfg(test)]
    pub fn get(&self, handle: FileHandle) -> Result<&OpenFile, FsError> {
        self.slots
            .get(handle.index())
            .and_then(Option::as_ref)
            .ok_or(FsError::BadHandle(handle.val()))
    }

    pub fn get_mut(&mut self, handle: FileHandle) -> Result<&mut OpenFile, FsError> {
        self.slots
            .get_mut(handle.index())
            .and_then(Option::as_mut)
            .ok_or(FsError::BadHandle(handle.val()))
    }
}
