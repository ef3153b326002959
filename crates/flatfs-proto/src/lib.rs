//! Wire format shared by the flatfs server and its clients.
//!
//! Every request is one opcode byte followed by a fixed little-endian body;
//! write payloads carry a `u64` length prefix. Replies are a bare `i32`
//! status or `i64` count, where -1 means failure. A read reply is followed by
//! `count` data bytes.

pub mod error;

pub use error::ProtoError;

use flatfs_fs::{FileName, OpenFlags};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};

/// Largest write payload a frame may carry.
pub const MAX_PAYLOAD: usize = 1 << 20;

const FRAME_LIMIT: usize = MAX_PAYLOAD + 64;

/// Reply value signalling failure.
pub const FAILURE: i32 = -1;

/// Mount reply signalling a refused session.
pub const NO_SESSION: i32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Mount = 1,
    Unmount = 2,
    Open = 3,
    Close = 4,
    Write = 5,
    Read = 6,
    ShutdownAfterDrain = 7,
}

impl TryFrom<u8> for Opcode {
    type Error = ProtoError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Opcode::Mount),
            2 => Ok(Opcode::Unmount),
            3 => Ok(Opcode::Open),
            4 => Ok(Opcode::Close),
            5 => Ok(Opcode::Write),
            6 => Ok(Opcode::Read),
            7 => Ok(Opcode::ShutdownAfterDrain),
            _ => Err(ProtoError::UnknownOpcode(value)),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MountRequest {
    /// Identifier of the client's response channel.
    pub channel: FileName,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UnmountRequest {
    pub session: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    pub session: i32,
    pub name: FileName,
    pub flags: u32,
}

impl OpenRequest {
    pub fn open_flags(&self) -> OpenFlags {
        OpenFlags::from_bits_truncate(self.flags)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CloseRequest {
    pub session: i32,
    pub handle: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    pub session: i32,
    pub handle: i32,
    pub data: Vec<u8>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    pub session: i32,
    pub handle: i32,
    pub len: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ShutdownRequest {
    pub session: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Mount(MountRequest),
    Unmount(UnmountRequest),
    Open(OpenRequest),
    Close(CloseRequest),
    Write(WriteRequest),
    Read(ReadRequest),
    ShutdownAfterDrain(ShutdownRequest),
}

impl Request {
    pub fn opcode(&self) -> Opcode {
        match self {
            Request::Mount(_) => Opcode::Mount,
            Request::Unmount(_) => Opcode::Unmount,
            Request::Open(_) => Opcode::Open,
            Request::Close(_) => Opcode::Close,
            Request::Write(_) => Opcode::Write,
            Request::Read(_) => Opcode::Read,
            Request::ShutdownAfterDrain(_) => Opcode::ShutdownAfterDrain,
        }
    }

    /// Session the request belongs to; mount has none yet.
    pub fn session(&self) -> Option<i32> {
        match self {
            Request::Mount(_) => None,
            Request::Unmount(r) => Some(r.session),
            Request::Open(r) => Some(r.session),
            Request::Close(r) => Some(r.session),
            Request::Write(r) => Some(r.session),
            Request::Read(r) => Some(r.session),
            Request::ShutdownAfterDrain(r) => Some(r.session),
        }
    }

    /// Encodes the whole frame, opcode first.
    pub fn encode(&self) -> Result<Vec<u8>, ProtoError> {
        let mut frame = vec![self.opcode() as u8];
        match self {
            Request::Mount(r) => encode_body(r, &mut frame)?,
            Request::Unmount(r) => encode_body(r, &mut frame)?,
            Request::Open(r) => encode_body(r, &mut frame)?,
            Request::Close(r) => encode_body(r, &mut frame)?,
            Request::Write(r) => {
                if r.data.len() > MAX_PAYLOAD {
                    return Err(ProtoError::PayloadTooLarge(r.data.len()));
                }
                encode_body(r, &mut frame)?
            }
            Request::Read(r) => encode_body(r, &mut frame)?,
            Request::ShutdownAfterDrain(r) => encode_body(r, &mut frame)?,
        }
        Ok(frame)
    }

    /// Sends the frame with a single write so concurrent writers on a shared
    /// channel do not interleave small frames.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), ProtoError> {
        writer.write_all(&self.encode()?)?;
        writer.flush()?;
        Ok(())
    }

    /// Reads the next frame. `Ok(None)` means the channel ended cleanly
    /// before an opcode byte.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Option<Self>, ProtoError> {
        let Some(byte) = read_opcode_byte(reader)? else {
            return Ok(None);
        };

        let request = match Opcode::try_from(byte)? {
            Opcode::Mount => Request::Mount(decode_body(reader)?),
            Opcode::Unmount => Request::Unmount(decode_body(reader)?),
            Opcode::Open => Request::Open(decode_body(reader)?),
            Opcode::Close => Request::Close(decode_body(reader)?),
            Opcode::Write => Request::Write(decode_body(reader)?),
            Opcode::Read => Request::Read(decode_body(reader)?),
            Opcode::ShutdownAfterDrain => Request::ShutdownAfterDrain(decode_body(reader)?),
        };
        Ok(Some(request))
    }
}

fn read_opcode_byte<R: Read>(reader: &mut R) -> Result<Option<u8>, ProtoError> {
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(byte[0])),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

fn frame_config() -> impl bincode::config::Config {
    bincode::config::standard()
        .with_fixed_int_encoding()
        .with_little_endian()
        .with_limit::<FRAME_LIMIT>()
}

fn encode_body<T: Serialize>(body: &T, frame: &mut Vec<u8>) -> Result<(), ProtoError> {
    bincode::serde::encode_into_std_write(body, frame, frame_config())?;
    Ok(())
}

fn decode_body<T: DeserializeOwned, R: Read>(reader: &mut R) -> Result<T, ProtoError> {
    Ok(bincode::serde::decode_from_std_read(reader, frame_config())?)
}

/// `i32` reply used by mount, open, close and shutdown.
pub fn write_status<W: Write>(writer: &mut W, status: i32) -> Result<(), ProtoError> {
    bincode::serde::encode_into_std_write(status, writer, frame_config())?;
    writer.flush()?;
    Ok(())
}

pub fn read_status<R: Read>(reader: &mut R) -> Result<i32, ProtoError> {
    decode_body(reader)
}

/// `i64` reply used by write.
pub fn write_count<W: Write>(writer: &mut W, count: i64) -> Result<(), ProtoError> {
    bincode::serde::encode_into_std_write(count, writer, frame_config())?;
    writer.flush()?;
    Ok(())
}

pub fn read_count<R: Read>(reader: &mut R) -> Result<i64, ProtoError> {
    decode_body(reader)
}

/// Read reply: the count (or -1 for `None`), then the bytes themselves.
pub fn write_read_reply<W: Write>(writer: &mut W, data: Option<&[u8]>) -> Result<(), ProtoError> {
    let mut frame = Vec::new();
    match data {
        Some(bytes) => {
            bincode::serde::encode_into_std_write(bytes.len() as i64, &mut frame, frame_config())?;
            frame.extend_from_slice(bytes);
        }
        None => {
            bincode::serde::encode_into_std_write(FAILURE as i64, &mut frame, frame_config())?;
        }
    }
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

/// Fills the front of `buf` from a read reply. `Ok(None)` is the failure
/// sentinel.
pub fn read_read_reply<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<Option<usize>, ProtoError> {
    let count = read_count(reader)?;
    if count < 0 {
        return Ok(None);
    }

    let count = count as usize;
    if count > buf.len() {
        return Err(ProtoError::ReplyTooLarge {
            count,
            capacity: buf.len(),
        });
    }
    reader.read_exact(&mut buf[..count])?;
    Ok(Some(count))
}
