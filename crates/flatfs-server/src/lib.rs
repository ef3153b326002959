//! Request dispatcher. One thread reads frames off the shared request
//! channel, runs them against the file store and answers on the channel of
//! the session that sent them.

pub mod endpoint;
pub mod error;
pub mod session;

pub use endpoint::{Endpoint, FifoEndpoint};
pub use error::ServerError;
pub use session::SessionTable;

use flatfs_engine::{FileSystem, FsError};
use flatfs_fs::FileHandle;
use flatfs_proto::{
    write_count, write_read_reply, write_status, CloseRequest, MountRequest, OpenRequest,
    ProtoError, ReadRequest, Request, WriteRequest, FAILURE, NO_SESSION,
};
use log::{debug, error, info, warn};
use std::io::BufReader;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// A shutdown request waiting for the open-file table to empty.
struct PendingShutdown {
    session: i32,
    drain: JoinHandle<Result<(), FsError>>,
}

pub struct Server<E: Endpoint> {
    endpoint: E,
    fs: Arc<FileSystem>,
    sessions: SessionTable<E::Responses>,
    shutdown: Option<PendingShutdown>,
}

impl<E: Endpoint> Server<E> {
    pub fn new(endpoint: E, fs: Arc<FileSystem>, max_sessions: usize) -> Self {
        Self {
            endpoint,
            fs,
            sessions: SessionTable::new(max_sessions),
            shutdown: None,
        }
    }

    /// Serves requests until a shutdown-after-drain completes.
    pub fn run(mut self) -> Result<(), ServerError> {
        let mut requests = BufReader::new(self.endpoint.open_requests()?);
        info!("serving, up to {} sessions", self.sessions.capacity());

        loop {
            match Request::read_from(&mut requests) {
                Ok(Some(request)) => self.dispatch(request),
                Ok(None) => {
                    debug!("request channel closed, reopening");
                    requests = BufReader::new(self.endpoint.open_requests()?);
                }
                Err(ProtoError::UnknownOpcode(op)) => {
                    warn!("skipping unknown opcode {}", op);
                }
                Err(e) => {
                    // Reopening does not resynchronise a pipe: unread bytes of
                    // the bad frame stay in it and buffered ones are lost.
                    error!(
                        "bad frame, reopening request channel; frames buffered behind it are dropped: {}",
                        e
                    );
                    requests = BufReader::new(self.endpoint.open_requests()?);
                }
            }

            if self.finish_shutdown()? {
                info!("shut down");
                return Ok(());
            }
        }
    }

    fn dispatch(&mut self, request: Request) {
        if let Some(session) = request.session() {
            if self.sessions.get_mut(session).is_none() {
                warn!("{:?} from unknown session {}, ignored", request.opcode(), session);
                return;
            }
        }

        match request {
            Request::Mount(r) => self.mount(r),
            Request::Unmount(r) => {
                self.sessions.remove(r.session);
                info!("session {} unmounted", r.session);
            }
            Request::Open(r) => {
                let status = self.open(&r);
                self.reply(r.session, |w| write_status(w, status));
            }
            Request::Close(r) => {
                let status = self.close(&r);
                self.reply(r.session, |w| write_status(w, status));
            }
            Request::Write(r) => {
                let count = self.write(&r);
                self.reply(r.session, |w| write_count(w, count));
            }
            Request::Read(r) => {
                let data = self.read(&r);
                self.reply(r.session, |w| write_read_reply(w, data.as_deref()));
            }
            Request::ShutdownAfterDrain(r) => {
                if self.shutdown.is_some() {
                    warn!("session {}: shutdown already pending", r.session);
                    self.reply(r.session, |w| write_status(w, FAILURE));
                    return;
                }

                // Marked here so the next frame already sees a draining store.
                if let Err(e) = self.fs.begin_drain() {
                    error!("session {}: cannot drain: {}", r.session, e);
                    self.reply(r.session, |w| write_status(w, FAILURE));
                    return;
                }

                info!("session {} requested shutdown, draining", r.session);
                let fs = Arc::clone(&self.fs);
                self.shutdown = Some(PendingShutdown {
                    session: r.session,
                    drain: thread::spawn(move || fs.destroy_after_drain()),
                });
            }
        }
    }

    fn mount(&mut self, request: MountRequest) {
        let Some(channel_id) = request.channel.to_str() else {
            warn!("mount with a non-utf-8 channel id: {}", request.channel);
            return;
        };

        let channel = match self.endpoint.open_responses(channel_id) {
            Ok(channel) => channel,
            Err(e) => {
                error!("opening response channel {}: {}", channel_id, e);
                return;
            }
        };

        match self.sessions.insert(channel) {
            Ok(session) => {
                info!("session {} mounted on {}", session, channel_id);
                self.reply(session, |w| write_status(w, session));
            }
            Err(mut channel) => {
                warn!("no free session for {}", channel_id);
                if let Err(e) = write_status(&mut channel, NO_SESSION) {
                    error!("refusing {}: {}", channel_id, e);
                }
            }
        }
    }

    fn open(&self, request: &OpenRequest) -> i32 {
        let Some(path) = request.name.to_str() else {
            return FAILURE;
        };

        match self.fs.open(path, request.open_flags()) {
            Ok(handle) => handle.val() as i32,
            Err(e) => {
                debug!("session {}: open {}: {}", request.session, path, e);
                FAILURE
            }
        }
    }

    fn close(&self, request: &CloseRequest) -> i32 {
        let result = file_handle(request.handle).and_then(|h| self.fs.close(h));
        match result {
            Ok(()) => 0,
            Err(e) => {
                debug!("session {}: close {}: {}", request.session, request.handle, e);
                FAILURE
            }
        }
    }

    fn write(&self, request: &WriteRequest) -> i64 {
        let result = file_handle(request.handle).and_then(|h| self.fs.write(h, &request.data));
        match result {
            Ok(count) => count as i64,
            Err(e) => {
                debug!("session {}: write {}: {}", request.session, request.handle, e);
                FAILURE as i64
            }
        }
    }

    fn read(&self, request: &ReadRequest) -> Option<Vec<u8>> {
        let len = usize::try_from(request.len).unwrap_or(usize::MAX);
        let result = file_handle(request.handle).and_then(|h| self.fs.read_to_vec(h, len));
        match result {
            Ok(data) => Some(data),
            Err(e) => {
                debug!("session {}: read {}: {}", request.session, request.handle, e);
                None
            }
        }
    }

    /// Answers the pending shutdown once nothing is left open.
    fn finish_shutdown(&mut self) -> Result<bool, ServerError> {
        if self.shutdown.is_none() || self.fs.open_files()? > 0 {
            return Ok(false);
        }
        let Some(pending) = self.shutdown.take() else {
            return Ok(false);
        };

        let result = match pending.drain.join() {
            Ok(result) => result,
            Err(_) => Err(FsError::LockPoisoned),
        };
        let status = if result.is_ok() { 0 } else { FAILURE };
        self.reply(pending.session, |w| write_status(w, status));

        result?;
        Ok(true)
    }

    /// Writes a reply on the session's channel. A channel that fails is
    /// dropped along with its session.
    fn reply<F>(&mut self, session: i32, send: F)
    where
        F: FnOnce(&mut E::Responses) -> Result<(), ProtoError>,
    {
        let Some(channel) = self.sessions.get_mut(session) else {
            warn!("no channel for session {}", session);
            return;
        };

        if let Err(e) = send(channel) {
            error!("session {}: reply failed, dropping session: {}", session, e);
            self.sessions.remove(session);
        }
    }
}

fn file_handle(handle: i32) -> Result<FileHandle, FsError> {
    u32::try_from(handle)
        .map(FileHandle::new)
        .map_err(|_| FsError::BadHandle(handle as u32))
}
