use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// Where the server's channels come from.
pub trait Endpoint {
    type Requests: Read;
    type Responses: Write;

    /// Opens the shared request channel. Called again each time the
    /// previous one reaches end of stream.
    fn open_requests(&mut self) -> io::Result<Self::Requests>;

    /// Opens the response channel a client named in its mount request.
    fn open_responses(&mut self, channel_id: &str) -> io::Result<Self::Responses>;
}

/// Named pipes on the local filesystem. The pipes are created outside the
/// server, e.g. with `mkfifo`.
pub struct FifoEndpoint {
    requests: PathBuf,
}

impl FifoEndpoint {
    pub fn new(requests: impl AsRef<Path>) -> Self {
        Self {
            requests: requests.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.requests
    }
}

impl Endpoint for FifoEndpoint {
    type Requests = File;
    type Responses = File;

    // Blocks until a writer opens the other end.
    fn open_requests(&mut self) -> io::Result<File> {
        OpenOptions::new().read(true).open(&self.requests)
    }

    fn open_responses(&mut self, channel_id: &str) -> io::Result<File> {
        OpenOptions::new().write(true).open(channel_id)
    }
}
