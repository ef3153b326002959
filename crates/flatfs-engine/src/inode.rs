use crate::block::BlockPool;
use crate::error::{FsError, Resource};
use flatfs_fs::{BlockId, FileType, InodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inode {
    pub kind: FileType,
    pub size: usize,
    pub block: Option<BlockId>,
}

impl Inode {
    pub fn new(kind: FileType) -> Self {
        Self {
            kind,
            size: 0,
            block: None,
        }
    }

    /// Drops the content: the block goes back to the pool and size becomes 0.
    pub fn truncate(&mut self, blocks: &mut BlockPool) {
        if let Some(block) = self.block.take() {
            blocks.free(block);
        }
        self.size = 0;
    }
}

pub struct InodeTable {
    slots: Vec<Option<Inode>>,
}

impl InodeTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
        }
    }

    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[cfg(test)]
    pub fn free_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_none()).count()
    }

    /// Takes the lowest free slot. Directories get their entry block up
    /// front; if that allocation fails the slot stays free.
    pub fn create(&mut self, kind: FileType, blocks: &mut BlockPool) -> Result<InodeId, FsError> {
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(FsError::Full(Resource::Inodes))?;

        let mut inode = Inode::new(kind);
        if kind == FileType::Directory {
            inode.block = Some(blocks.alloc()?);
        }

        self.slots[index] = Some(inode);
        Ok(InodeId::new(index as u32))
    }

    pub fn get(&self, id: InodeId) -> Result<&Inode, FsError> {
        self.slots
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or(FsError::NoInode(id.val()))
    }

    pub fn get_mut(&mut self, id: InodeId) -> Result<&mut Inode, FsError> {
        self.slots
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(FsError::NoInode(id.val()))
    }

    /// Releases the inode's block, then its slot.
    pub fn delete(&mut self, id: InodeId, blocks: &mut BlockPool) -> Result<(), FsError> {
        let mut inode = self
            .slots
            .get_mut(id.index())
            .and_then(Option::take)
            .ok_or(FsError::NoInode(id.val()))?;
        inode.truncate(blocks);
        Ok(())
    }
}
