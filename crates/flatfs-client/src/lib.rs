//! Client side of the flatfs protocol. A `Client` owns one session: the
//! shared request channel it writes frames to, and its private response
//! channel.

pub mod error;

pub use error::ClientError;
pub use flatfs_fs::{FileHandle, OpenFlags};

use flatfs_fs::FileName;
use flatfs_proto::{
    read_count, read_read_reply, read_status, CloseRequest, MountRequest, OpenRequest,
    ReadRequest, Request, ShutdownRequest, UnmountRequest, WriteRequest, FAILURE, MAX_PAYLOAD,
};
use log::{debug, error};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;

pub struct Client<W: Write, R: Read> {
    requests: W,
    responses: R,
    session: i32,
}

impl Client<File, File> {
    /// Mounts over named pipes. Both pipes must already exist; the client
    /// pipe's path doubles as the channel id and must fit in a file name.
    pub fn mount_fifo(
        client_path: impl AsRef<Path>,
        server_path: impl AsRef<Path>,
    ) -> Result<Self, ClientError> {
        let client_path = client_path.as_ref();
        let channel_id = client_path.to_str().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("pipe path is not utf-8: {}", client_path.display()),
            )
        })?;

        let requests = OpenOptions::new().write(true).open(server_path.as_ref())?;
        Client::mount(requests, channel_id, || {
            OpenOptions::new().read(true).open(client_path)
        })
    }
}

impl<W: Write, R: Read> Client<W, R> {
    /// Sends the mount frame, then calls `connect` to open the response
    /// channel the server is about to write the session id to.
    pub fn mount<F>(mut requests: W, channel_id: &str, connect: F) -> Result<Self, ClientError>
    where
        F: FnOnce() -> io::Result<R>,
    {
        let channel = FileName::new(channel_id).map_err(flatfs_proto::ProtoError::from)?;
        Request::Mount(MountRequest { channel }).write_to(&mut requests)?;

        let mut responses = connect()?;
        let session = read_status(&mut responses)?;
        if session <= 0 {
            return Err(ClientError::MountRejected);
        }

        debug!("mounted {} as session {}", channel_id, session);
        Ok(Self {
            requests,
            responses,
            session,
        })
    }

    pub fn session(&self) -> i32 {
        self.session
    }

    /// Ends the session. The server sends no reply.
    pub fn unmount(mut self) -> Result<(), ClientError> {
        self.send(Request::Unmount(UnmountRequest {
            session: self.session,
        }))?;
        debug!("unmounted session {}", self.session);
        Ok(())
    }

    pub fn open(&mut self, path: &str, flags: OpenFlags) -> Result<FileHandle, ClientError> {
        let name = FileName::new(path).map_err(flatfs_proto::ProtoError::from)?;
        self.send(Request::Open(OpenRequest {
            session: self.session,
            name,
            flags: flags.bits(),
        }))?;

        let handle = self.status()?;
        u32::try_from(handle)
            .map(FileHandle::new)
            .map_err(|_| ClientError::Failed)
    }

    pub fn close(&mut self, handle: FileHandle) -> Result<(), ClientError> {
        self.send(Request::Close(CloseRequest {
            session: self.session,
            handle: wire_handle(handle),
        }))?;
        self.status().map(|_| ())
    }

    /// Returns the number of bytes the server stored, which may be fewer
    /// than `data.len()` once the file's block is full. At most
    /// `MAX_PAYLOAD` bytes go out in one request.
    pub fn write(&mut self, handle: FileHandle, data: &[u8]) -> Result<usize, ClientError> {
        let data = &data[..data.len().min(MAX_PAYLOAD)];
        self.send(Request::Write(WriteRequest {
            session: self.session,
            handle: wire_handle(handle),
            data: data.to_vec(),
        }))?;

        let count = read_count(&mut self.responses)?;
        usize::try_from(count).map_err(|_| ClientError::Failed)
    }

    /// Reads up to `buf.len()` bytes into the front of `buf`.
    pub fn read(&mut self, handle: FileHandle, buf: &mut [u8]) -> Result<usize, ClientError> {
        self.send(Request::Read(ReadRequest {
            session: self.session,
            handle: wire_handle(handle),
            len: buf.len() as u64,
        }))?;

        read_read_reply(&mut self.responses, buf)?.ok_or(ClientError::Failed)
    }

    /// Blocks until every open file on the server is closed and the store
    /// is destroyed.
    pub fn shutdown_after_drain(&mut self) -> Result<(), ClientError> {
        self.send(Request::ShutdownAfterDrain(ShutdownRequest {
            session: self.session,
        }))?;
        self.status().map(|_| ())
    }

    fn send(&mut self, request: Request) -> Result<(), ClientError> {
        request.write_to(&mut self.requests).map_err(|e| {
            error!("session {}: sending {:?} failed: {}", self.session, request.opcode(), e);
            ClientError::from(e)
        })
    }

    fn status(&mut self) -> Result<i32, ClientError> {
        match read_status(&mut self.responses)? {
            FAILURE => Err(ClientError::Failed),
            status => Ok(status),
        }
    }
}

fn wire_handle(handle: FileHandle) -> i32 {
    handle.val() as i32
}
