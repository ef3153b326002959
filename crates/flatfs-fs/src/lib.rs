use bitflags::bitflags;
use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

pub const BLOCK_SIZE: usize = 1024;
pub const DATA_BLOCKS: usize = 1024;
pub const INODE_TABLE_SIZE: usize = 50;
pub const MAX_OPEN_FILES: usize = 20;
pub const MAX_FILE_NAME: usize = 40;
pub const MAX_SESSIONS: usize = 8;

pub const ROOT_INODE: InodeId = InodeId(0);
pub const PATH_SEPARATOR: u8 = b'/';

// Directory slot: occupied flag (1) + inode id (4) + name (MAX_FILE_NAME)
pub const DIR_ENTRY_SIZE: usize = 1 + 4 + MAX_FILE_NAME;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("name is {0} bytes, limit is {max}", max = MAX_FILE_NAME)]
    NameTooLong(usize),

    #[error("name contains a NUL byte")]
    NulInName,

    #[error("directory slot {0} lies outside the block")]
    SlotOutOfRange(usize),

    #[error("slot encode error: {0}")]
    Encode(String),

    #[error("slot decode error: {0}")]
    Decode(String),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct InodeId(u32);

impl InodeId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn val(&self) -> u32 {
        self.0
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct BlockId(u32);

impl BlockId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn val(&self) -> u32 {
        self.0
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Caller-visible identifier of an open-file table slot.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct FileHandle(u32);

impl FileHandle {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn val(&self) -> u32 {
        self.0
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FileType {
    File = 1,
    Directory = 2,
}

bitflags! {
    /// Options accepted by `open`. Unknown bits are dropped.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OpenFlags: u32 {
        const CREATE = 0b001;
        const TRUNCATE = 0b010;
        const APPEND = 0b100;
    }
}

/// Capacity limits of one file store instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsConfig {
    pub block_size: usize,
    pub data_blocks: usize,
    pub inode_table_size: usize,
    pub max_open_files: usize,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            block_size: BLOCK_SIZE,
            data_blocks: DATA_BLOCKS,
            inode_table_size: INODE_TABLE_SIZE,
            max_open_files: MAX_OPEN_FILES,
        }
    }
}

impl FsConfig {
    /// Number of entry slots that fit in the root directory's block.
    pub fn dir_entries(&self) -> usize {
        self.block_size / DIR_ENTRY_SIZE
    }
}

/// Zero-padded fixed-width name, as stored in directory slots and frames.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileName([u8; MAX_FILE_NAME]);

impl FileName {
    pub fn new(name: &str) -> Result<Self, LayoutError> {
        Self::from_bytes(name.as_bytes())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LayoutError> {
        if bytes.len() > MAX_FILE_NAME {
            return Err(LayoutError::NameTooLong(bytes.len()));
        }
        if bytes.contains(&0) {
            return Err(LayoutError::NulInName);
        }
        let mut name = [0u8; MAX_FILE_NAME];
        name[..bytes.len()].copy_from_slice(bytes);
        Ok(Self(name))
    }

    /// Bytes up to the first NUL.
    pub fn as_bytes(&self) -> &[u8] {
        let end = self.0.iter().position(|&c| c == 0).unwrap_or(MAX_FILE_NAME);
        &self.0[..end]
    }

    pub fn to_str(&self) -> Option<&str> {
        std::str::from_utf8(self.as_bytes()).ok()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.0[0] == 0
    }

    #[cfg(test)]
    pub fn raw(&self) -> &[u8; MAX_FILE_NAME] {
        &self.0
    }
}

impl fmt::Debug for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(self.as_bytes()))
    }
}

impl fmt::Display for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.as_bytes()))
    }
}

// Encoded as a fixed tuple so bincode writes exactly MAX_FILE_NAME bytes
// with no length prefix.
impl Serialize for FileName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(MAX_FILE_NAME)?;
        for byte in &self.0 {
            tuple.serialize_element(byte)?;
        }
        tuple.end()
    }
}

impl<'de> Deserialize<'de> for FileName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct NameVisitor;

        impl<'de> Visitor<'de> for NameVisitor {
            type Value = FileName;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{} name bytes", MAX_FILE_NAME)
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<FileName, A::Error> {
                let mut name = [0u8; MAX_FILE_NAME];
                for (i, byte) in name.iter_mut().enumerate() {
                    *byte = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(i, &self))?;
                }
                // Bytes past the terminator are not part of the name.
                if let Some(end) = name.iter().position(|&c| c == 0) {
                    name[end..].fill(0);
                }
                Ok(FileName(name))
            }
        }

        deserializer.deserialize_tuple(MAX_FILE_NAME, NameVisitor)
    }
}

/// One slot of the root directory. A zeroed slot is free.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    pub occupied: bool,
    pub inode_id: u32,
    pub name: FileName,
}

impl DirEntry {
    pub fn new(inode: InodeId, name: FileName) -> Self {
        Self {
            occupied: true,
            inode_id: inode.val(),
            name,
        }
    }

    pub fn inode(&self) -> Option<InodeId> {
        self.occupied.then_some(InodeId(self.inode_id))
    }

    pub fn read_slot(block: &[u8], slot: usize) -> Result<Self, LayoutError> {
        let bytes = slot_range(block.len(), slot).map(|r| &block[r])?;
        bincode::serde::decode_from_slice(bytes, slot_config())
            .map(|(entry, _)| entry)
            .map_err(|e| LayoutError::Decode(format!("{:?}", e)))
    }

    pub fn write_slot(&self, block: &mut [u8], slot: usize) -> Result<(), LayoutError> {
        let range = slot_range(block.len(), slot)?;
        bincode::serde::encode_into_slice(self, &mut block[range], slot_config())
            .map(|_| ())
            .map_err(|e| LayoutError::Encode(format!("{:?}", e)))
    }
}

fn slot_range(block_len: usize, slot: usize) -> Result<std::ops::Range<usize>, LayoutError> {
    let start = slot * DIR_ENTRY_SIZE;
    let end = start + DIR_ENTRY_SIZE;
    if end > block_len {
        return Err(LayoutError::SlotOutOfRange(slot));
    }
    Ok(start..end)
}

fn slot_config() -> impl bincode::config::Config {
    bincode::config::standard()
        .with_fixed_int_encoding()
        .with_little_endian()
}
