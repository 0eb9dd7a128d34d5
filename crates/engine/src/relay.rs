use std::fs::File;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::Priority;
use crate::pipe::PendingConnection;
use crate::priority::set_current_thread_priority;

pub const RELAY_BUFFER_SIZE: usize = 0xA0_0000;
pub const CONNECT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEnd {
    /// The decoder closed its end after writing everything.
    Finished,
    /// A read or write failed, usually because a process went away.
    Disconnected,
    /// Stopped before or during the copy.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayReport {
    pub bytes: u64,
    pub end: RelayEnd,
}

/// Copy `source` into `sink` until end of stream, a disconnect or `stop`.
/// Both handles are consumed and closed when the copy ends.
pub fn relay<R: Read, W: Write>(mut source: R, mut sink: W, stop: &AtomicBool) -> RelayReport {
    let mut buffer = vec![0u8; RELAY_BUFFER_SIZE];
    let mut bytes = 0u64;

    let end = loop {
        if stop.load(Ordering::SeqCst) {
            break RelayEnd::Cancelled;
        }

        let read = match source.read(&mut buffer) {
            Ok(0) => break RelayEnd::Finished,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!("Relay read ended: {}", e);
                break RelayEnd::Disconnected;
            }
        };

        if stop.load(Ordering::SeqCst) {
            break RelayEnd::Cancelled;
        }

        if let Err(e) = sink.write_all(&buffer[..read]) {
            debug!("Relay write ended: {}", e);
            break RelayEnd::Disconnected;
        }
        bytes += read as u64;
    };

    if end == RelayEnd::Finished {
        if let Err(e) = sink.flush() {
            debug!("Relay flush failed: {}", e);
        }
    }

    drop(source);
    drop(sink);
    RelayReport { bytes, end }
}

/// Where relayed bytes go.
#[derive(Debug)]
pub enum RelaySink {
    /// The encode-side FIFO, once the encoder opens it.
    Pipe(PendingConnection),
    /// The encoder's standard input.
    Stdin(File),
}

/// Start the relay thread. It waits, polling, until both ends are connected
/// and only then starts copying.
pub fn spawn_relay(
    source: PendingConnection,
    sink: RelaySink,
    stop: Arc<AtomicBool>,
    priority: Priority,
) -> io::Result<JoinHandle<RelayReport>> {
    thread::Builder::new()
        .name("pipe-relay".to_string())
        .spawn(move || {
            set_current_thread_priority(priority);
            run_relay(source, sink, &stop)
        })
}

fn run_relay(source: PendingConnection, sink: RelaySink, stop: &AtomicBool) -> RelayReport {
    let cancelled = RelayReport {
        bytes: 0,
        end: RelayEnd::Cancelled,
    };
    let disconnected = RelayReport {
        bytes: 0,
        end: RelayEnd::Disconnected,
    };

    let mut reader: Option<File> = None;
    let mut writer: Option<File> = None;

    loop {
        if stop.load(Ordering::SeqCst) {
            source.abort();
            if let RelaySink::Pipe(pending) = &sink {
                pending.abort();
            }
            return cancelled;
        }

        if reader.is_none() {
            match source.try_take() {
                Some(Ok(file)) => reader = Some(file),
                Some(Err(e)) => {
                    warn!("Decode pipe {} failed: {}", source.path().display(), e);
                    return disconnected;
                }
                None => {}
            }
        }
        if writer.is_none() {
            if let RelaySink::Pipe(pending) = &sink {
                match pending.try_take() {
                    Some(Ok(file)) => writer = Some(file),
                    Some(Err(e)) => {
                        warn!("Encode pipe {} failed: {}", pending.path().display(), e);
                        return disconnected;
                    }
                    None => {}
                }
            }
        }

        let sink_ready = writer.is_some() || matches!(sink, RelaySink::Stdin(_));
        if reader.is_some() && sink_ready {
            break;
        }
        thread::sleep(CONNECT_POLL_INTERVAL);
    }

    let Some(reader) = reader else {
        return disconnected;
    };
    info!("Pipes connected, relaying");
    let report = match (sink, writer) {
        (RelaySink::Stdin(stdin), _) => relay(reader, stdin, stop),
        (RelaySink::Pipe(_), Some(writer)) => relay(reader, writer, stop),
        (RelaySink::Pipe(_), None) => disconnected,
    };
    info!(
        "Relay ended ({:?}) after {} bytes",
        report.end, report.bytes
    );
    report
}
