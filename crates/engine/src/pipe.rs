// Named pipes between the decoder, the relay and the encoder

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use tracing::{debug, warn};

use crate::error::EngineError;

/// Which end of the FIFO this process holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeEnd {
    /// We read what an external process writes.
    Read,
    /// We write what an external process reads.
    Write,
}

#[derive(Debug)]
pub struct PipeChannel {
    path: PathBuf,
}

impl PipeChannel {
    /// Create the FIFO at `path`, replacing a stale one left by an earlier run.
    #[cfg(unix)]
    pub fn create(path: &Path) -> Result<Self, EngineError> {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        if path.exists() {
            std::fs::remove_file(path).map_err(|e| EngineError::pipe(path, e))?;
        }

        let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|e| {
            EngineError::pipe(path, io::Error::new(io::ErrorKind::InvalidInput, e))
        })?;
        // SAFETY: c_path is a valid NUL-terminated string for the duration of the call
        let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
        if rc != 0 {
            return Err(EngineError::pipe(path, io::Error::last_os_error()));
        }

        debug!("Created pipe {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    #[cfg(not(unix))]
    pub fn create(_path: &Path) -> Result<Self, EngineError> {
        Err(EngineError::UnsupportedPlatform("named pipe transport"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start waiting for the external process to open its end.
    pub fn connect(&self, end: PipeEnd) -> PendingConnection {
        PendingConnection::begin(&self.path, end)
    }
}

impl Drop for PipeChannel {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Failed to remove pipe {}: {}", self.path.display(), e);
            }
        }
    }
}

type Slot = Arc<Mutex<Option<io::Result<File>>>>;

/// An open-in-progress on one end of a FIFO. Dropping it releases a waiter
/// that is still blocked.
#[derive(Debug)]
pub struct PendingConnection {
    slot: Slot,
    watch: ConnectionWatch,
}

/// Shared view of a `PendingConnection` that can outlive it on another
/// thread: whether the peer has connected, and a way to stop waiting.
#[derive(Debug, Clone)]
pub struct ConnectionWatch {
    path: PathBuf,
    end: PipeEnd,
    settled: Arc<AtomicBool>,
}

impl ConnectionWatch {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True once the waiter's open returned, successfully or not.
    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::SeqCst)
    }

    /// Release a waiter that is still blocked because the peer never opened
    /// its end, by opening the opposite end ourselves without blocking.
    #[cfg(unix)]
    pub fn release(&self) {
        use std::os::unix::fs::OpenOptionsExt;

        if self.is_settled() {
            return;
        }
        let mut options = std::fs::OpenOptions::new();
        match self.end {
            PipeEnd::Read => options.write(true),
            PipeEnd::Write => options.read(true),
        };
        options.custom_flags(libc::O_NONBLOCK);
        match options.open(&self.path) {
            // Dropped right away; the waiter sees an immediate EOF or EPIPE
            Ok(_) => debug!("Released waiter on {}", self.path.display()),
            Err(e) => debug!("No waiter to release on {}: {}", self.path.display(), e),
        }
    }

    #[cfg(not(unix))]
    pub fn release(&self) {}
}

impl PendingConnection {
    fn begin(path: &Path, end: PipeEnd) -> Self {
        let slot: Slot = Arc::new(Mutex::new(None));
        let settled = Arc::new(AtomicBool::new(false));
        let waiter_slot = Arc::clone(&slot);
        let waiter_settled = Arc::clone(&settled);
        let waiter_path = path.to_path_buf();

        thread::spawn(move || {
            let opened = match end {
                PipeEnd::Read => File::open(&waiter_path),
                PipeEnd::Write => std::fs::OpenOptions::new().write(true).open(&waiter_path),
            };
            match &opened {
                Ok(_) => debug!("Pipe {} connected", waiter_path.display()),
                Err(e) => warn!("Pipe {} failed to connect: {}", waiter_path.display(), e),
            }
            *waiter_slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(opened);
            waiter_settled.store(true, Ordering::SeqCst);
        });

        Self {
            slot,
            watch: ConnectionWatch {
                path: path.to_path_buf(),
                end,
                settled,
            },
        }
    }

    pub fn path(&self) -> &Path {
        &self.watch.path
    }

    pub fn watch(&self) -> ConnectionWatch {
        self.watch.clone()
    }

    pub fn is_connected(&self) -> bool {
        matches!(
            *self.slot.lock().unwrap_or_else(|e| e.into_inner()),
            Some(Ok(_))
        )
    }

    /// The open handle once the peer has connected, or the error that ended
    /// the wait. `None` while still waiting; a taken result is not returned twice.
    pub fn try_take(&self) -> Option<io::Result<File>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    pub fn abort(&self) {
        self.watch.release();
    }
}

impl Drop for PendingConnection {
    fn drop(&mut self) {
        self.abort();
    }
}
