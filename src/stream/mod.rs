//! Stream bridge between caller-owned data sources and the engine's I/O layer
//!
//! A caller hands over any `Read + Seek` resource; the [`StreamRegistry`]
//! stages it under a private URI. When the engine opens that URI, the staged
//! source becomes a [`StreamSession`] whose address is the cookie passed to
//! the read/seek/size/close callbacks in [`bridge`].

pub mod bridge;

use crate::utils::error::{PlayerError, Result};
use log::{debug, info};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// URI scheme staged sources are registered under
pub const STREAM_SCHEME: &str = "vidpane-stream";

/// A readable, seekable backing store
pub trait MediaStream: Read + Seek + Send {
    /// Total length in bytes, leaving the position unchanged
    fn byte_len(&mut self) -> io::Result<u64> {
        let position = self.stream_position()?;
        let end = self.seek(SeekFrom::End(0))?;
        if end != position {
            self.seek(SeekFrom::Start(position))?;
        }
        Ok(end)
    }
}

impl<T: Read + Seek + Send> MediaStream for T {}

/// One open read session, owned by the engine between open and close
pub struct StreamSession {
    source: Box<dyn MediaStream>,
    token: String,
    bytes_read: u64,
    size: Option<u64>,
    live: Arc<AtomicUsize>,
}

impl StreamSession {
    fn new(source: Box<dyn MediaStream>, token: String, live: Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self {
            source,
            token,
            bytes_read: 0,
            size: None,
            live,
        }
    }

    /// Opaque caller token, e.g. the original path
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Total bytes handed to the engine so far
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// One partial read; `Ok(0)` only at end of stream
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            match self.source.read(buf) {
                Ok(n) => {
                    self.bytes_read += n as u64;
                    return Ok(n);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(PlayerError::StreamIo(e)),
            }
        }
    }

    /// Absolute seek from the start of the stream
    pub fn seek(&mut self, offset: i64) -> Result<u64> {
        let offset = u64::try_from(offset).map_err(|_| {
            PlayerError::StreamIo(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("negative seek offset {}", offset),
            ))
        })?;
        Ok(self.source.seek(SeekFrom::Start(offset))?)
    }

    /// Total length; measured once and cached
    pub fn size(&mut self) -> Result<u64> {
        if let Some(size) = self.size {
            return Ok(size);
        }
        let size = self.source.byte_len()?;
        self.size = Some(size);
        Ok(size)
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
        debug!("Stream session for '{}' closed after {} bytes", self.token, self.bytes_read);
    }
}

struct StagedSource {
    source: Box<dyn MediaStream>,
    token: String,
}

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    staged: HashMap<u64, StagedSource>,
}

/// Sources waiting for the engine to open them
#[derive(Default)]
pub struct StreamRegistry {
    inner: Mutex<RegistryInner>,
    live: Arc<AtomicUsize>,
}

impl StreamRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Stage `source` and return the URI the engine should load
    ///
    /// Any source staged earlier and never opened is dropped, so at most one
    /// load is pending at a time.
    pub fn stage(&self, source: Box<dyn MediaStream>, token: impl Into<String>) -> String {
        let token = token.into();
        let mut inner = self.inner.lock();
        if !inner.staged.is_empty() {
            debug!("Discarding {} unopened stream(s)", inner.staged.len());
            inner.staged.clear();
        }
        inner.next_id += 1;
        let id = inner.next_id;
        info!("Staged stream '{}' as {}://{}", token, STREAM_SCHEME, id);
        inner.staged.insert(id, StagedSource { source, token });
        format!("{}://{}", STREAM_SCHEME, id)
    }

    /// Claim the source staged under `uri`, turning it into a session
    pub fn open(&self, uri: &str) -> Option<StreamSession> {
        let id = uri
            .strip_prefix(STREAM_SCHEME)
            .and_then(|rest| rest.strip_prefix("://"))
            .and_then(|id| id.parse::<u64>().ok())?;
        let staged = self.inner.lock().staged.remove(&id)?;
        Some(StreamSession::new(staged.source, staged.token, self.live.clone()))
    }

    /// Sessions opened and not yet closed
    pub fn live_sessions(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Sources staged and not yet opened
    pub fn pending(&self) -> usize {
        self.inner.lock().staged.len()
    }

    /// Opener the engine handle registers for [`STREAM_SCHEME`]
    pub fn opener(self: &Arc<Self>) -> StreamOpener {
        let registry = Arc::clone(self);
        StreamOpener::new(STREAM_SCHEME, move |uri| registry.open(uri))
    }
}

type OpenFn = dyn Fn(&str) -> Option<StreamSession> + Send + Sync;

/// Resolves engine open requests for one URI scheme
///
/// The engine holds a raw pointer to this value as callback user data, so
/// the engine handle keeps it alive until the native instance is gone.
pub struct StreamOpener {
    scheme: String,
    open: Box<OpenFn>,
}

impl StreamOpener {
    pub fn new<F>(scheme: impl Into<String>, open: F) -> Self
    where
        F: Fn(&str) -> Option<StreamSession> + Send + Sync + 'static,
    {
        Self {
            scheme: scheme.into(),
            open: Box::new(open),
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Resolve `uri` into a session
    pub fn open(&self, uri: &str) -> Option<StreamSession> {
        (self.open)(uri)
    }
}
