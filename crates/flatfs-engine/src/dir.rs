//! The flat directory. Entries live in the directory inode's own block,
//! one `DirEntry` per `DIR_ENTRY_SIZE` slot.

use crate::block::BlockPool;
use crate::error::{FsError, Resource};
use crate::inode::InodeTable;
use flatfs_fs::{BlockId, DirEntry, FileName, FileType, InodeId, DIR_ENTRY_SIZE};

fn entry_block(inodes: &InodeTable, dir: InodeId) -> Result<BlockId, FsError> {
    let inode = inodes.get(dir)?;
    if inode.kind != FileType::Directory {
        return Err(FsError::NotADirectory(dir.val()));
    }
    inode.block.ok_or(FsError::MissingBlock(dir.val()))
}

/// Linear scan for an exact name match.
pub fn find(
    inodes: &InodeTable,
    blocks: &BlockPool,
    dir: InodeId,
    name: &[u8],
) -> Result<InodeId, FsError> {
    let block = blocks.get(entry_block(inodes, dir)?)?;

    for slot in 0..block.len() / DIR_ENTRY_SIZE {
        let entry = DirEntry::read_slot(block, slot)?;
        if let Some(inode) = entry.inode() {
            if entry.name.as_bytes() == name {
                return Ok(inode);
            }
        }
    }
    Err(FsError::NotFound)
}

/// Stores `(name, inode)` in the first free slot.
pub fn add_entry(
    inodes: &InodeTable,
    blocks: &mut BlockPool,
    dir: InodeId,
    inode: InodeId,
    name: FileName,
) -> Result<(), FsError> {
    let block = blocks.get_mut(entry_block(inodes, dir)?)?;

    let mut free_slot = None;
    for slot in 0..block.len() / DIR_ENTRY_SIZE {
        let entry = DirEntry::read_slot(block, slot)?;
        match entry.inode() {
            Some(_) if entry.name == name => return Err(FsError::Duplicate(name.to_string())),
            None if free_slot.is_none() => free_slot = Some(slot),
            _ => {}
        }
    }

    let slot = free_slot.ok_or(FsError::Full(Resource::Directory))?;
    DirEntry::new(inode, name).write_slot(block, slot)?;
    Ok(())
}

/// Occupied entries in slot order.
pub fn entries(
    inodes: &InodeTable,
    blocks: &BlockPool,
    dir: InodeId,
) -> Result<Vec<(FileName, InodeId)>, FsError> {
    let block = blocks.get(entry_block(inodes, dir)?)?;

    let mut out = Vec::new();
    for slot in 0..block.len() / DIR_ENTRY_SIZE {
        let entry = DirEntry::read_slot(block, slot)?;
        if let Some(inode) = entry.inode() {
            out.push((entry.name, inode));
        }
    }
    Ok(out)
}
