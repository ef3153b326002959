use crate::error::{FsError, Resource};
use flatfs_fs::BlockId;
use log::warn;

/// Fixed pool of equally sized data blocks.
pub struct BlockPool {
    block_size: usize,
    data: Vec<u8>,
    used: Vec<bool>,
}

impl BlockPool {
    pub fn new(count: usize, block_size: usize) -> Self {
        Self {
            block_size,
            data: vec![0; count * block_size],
            used: vec![false; count],
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.used.len()
    }

    #[cfg(test)]
    pub fn free_count(&self) -> usize {
        self.used.iter().filter(|&&used| !used).count()
    }

    /// Takes the lowest free block and zero-fills it.
    pub fn alloc(&mut self) -> Result<BlockId, FsError> {
        let index = self
            .used
            .iter()
            .position(|&used| !used)
            .ok_or(FsError::Full(Resource::Blocks))?;

        self.used[index] = true;
        let range = self.range(index);
        self.data[range].fill(0);
        Ok(BlockId::new(index as u32))
    }

    /// Returns a block to the pool. Freeing a free block changes nothing.
    pub fn free(&mut self, id: BlockId) -> bool {
        match self.used.get_mut(id.index()) {
            Some(used) if *used => {
                *used = false;
                true
            }
            Some(_) => {
                warn!("block {} freed twice", id.val());
                false
            }
            None => {
                warn!("free of out-of-range block {}", id.val());
                false
            }
        }
    }

    pub fn get(&self, id: BlockId) -> Result<&[u8], FsError> {
        self.check(id)?;
        Ok(&self.data[self.range(id.index())])
    }

    pub fn get_mut(&mut self, id: BlockId) -> Result<&mut [u8], FsError> {
        self.check(id)?;
        let range = self.range(id.index());
        Ok(&mut self.data[range])
    }

    fn check(&self, id: BlockId) -> Result<(), FsError> {
        match self.used.get(id.index()) {
            Some(true) => Ok(()),
            _ => Err(FsError::NoBlock(id.val())),
        }
    }

    fn range(&self, index: usize) -> std::ops::Range<usize> {
        let start = index * self.block_size;
        start..start + self.block_size
    }
}
