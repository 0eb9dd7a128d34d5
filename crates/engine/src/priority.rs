use std::io;

use tracing::warn;

use crate::config::Priority;

/// Apply `priority` to the process `pid`. Raising priority usually needs
/// privileges; a refusal is logged and otherwise ignored.
#[cfg(unix)]
pub fn set_process_priority(pid: u32, priority: Priority) {
    // SAFETY: setpriority has no memory-safety preconditions
    let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, pid as libc::id_t, priority.nice()) };
    if rc != 0 {
        warn!(
            "Failed to set priority {:?} on process {}: {}",
            priority,
            pid,
            io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
pub fn set_process_priority(_pid: u32, _priority: Priority) {}

/// Apply `priority` to the calling thread.
#[cfg(target_os = "linux")]
pub fn set_current_thread_priority(priority: Priority) {
    // SAFETY: gettid and setpriority have no memory-safety preconditions
    let rc = unsafe {
        let tid = libc::syscall(libc::SYS_gettid) as libc::id_t;
        libc::setpriority(libc::PRIO_PROCESS, tid, priority.nice())
    };
    if rc != 0 {
        warn!(
            "Failed to set thread priority {:?}: {}",
            priority,
            io::Error::last_os_error()
        );
    }
}

#[cfg(not(target_os = "linux"))]
pub fn set_current_thread_priority(_priority: Priority) {}
