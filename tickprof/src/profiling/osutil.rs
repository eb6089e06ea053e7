//! Operating system features used by the recorder
//!
//! Thin wrappers over `sigaction`, `pthread_sigmask`, `pipe2`, `poll` and
//! `setitimer`. Everything reachable from a signal handler here is
//! async-signal-safe.

#![allow(unsafe_code)]
// libc field types differ across targets
#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_possible_wrap)]

use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::time::Duration;

use crate::domain::{ProfilerError, Signal};

/// Signature of an `SA_SIGINFO` handler.
pub type SigInfoHandler = extern "C" fn(libc::c_int, *mut libc::siginfo_t, *mut libc::c_void);

// ============================================================================
// Signal dispositions
// ============================================================================

/// Disposition that was in place before we installed ours.
pub struct SavedDisposition {
    signal: Signal,
    action: libc::sigaction,
}

impl SavedDisposition {
    #[must_use]
    pub fn signal(&self) -> Signal {
        self.signal
    }

    /// Put the previous disposition back.
    ///
    /// # Errors
    /// Returns the `sigaction` error.
    pub fn restore(self) -> io::Result<()> {
        unsafe {
            if libc::sigaction(self.signal.0, &self.action, std::ptr::null_mut()) != 0 {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(())
    }
}

/// Install `handler` for `signal` with `SA_SIGINFO | SA_RESTART`.
///
/// Every signal is blocked while the handler runs, so it never nests inside
/// itself or another tickprof handler.
///
/// # Errors
/// Returns [`ProfilerError::SignalInstallFailed`] when `sigaction` fails.
pub fn install_handler(
    signal: Signal,
    handler: SigInfoHandler,
) -> Result<SavedDisposition, ProfilerError> {
    unsafe {
        let mut sa: libc::sigaction = mem::zeroed();
        sa.sa_sigaction = handler as usize;
        sa.sa_flags = libc::SA_SIGINFO | libc::SA_RESTART;
        libc::sigfillset(&mut sa.sa_mask);

        let mut previous: libc::sigaction = mem::zeroed();
        if libc::sigaction(signal.0, &sa, &mut previous) != 0 {
            return Err(ProfilerError::SignalInstallFailed {
                signal,
                source: io::Error::last_os_error(),
            });
        }
        Ok(SavedDisposition { signal, action: previous })
    }
}

/// Address of the handler currently installed for `signal`. `SIG_DFL` is 0.
///
/// # Errors
/// Returns the `sigaction` error.
pub fn current_handler(signal: Signal) -> io::Result<usize> {
    unsafe {
        let mut current: libc::sigaction = mem::zeroed();
        if libc::sigaction(signal.0, std::ptr::null(), &mut current) != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(current.sa_sigaction)
    }
}

/// Block `signal` for the calling thread and threads it spawns afterwards.
pub fn block_signal(signal: Signal) {
    unsafe {
        let mut set: libc::sigset_t = mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, signal.0);
        libc::pthread_sigmask(libc::SIG_BLOCK, &set, std::ptr::null_mut());
    }
}

/// Restores `errno` on drop so a handler never clobbers the value the
/// interrupted code is about to inspect.
pub struct ErrnoGuard(libc::c_int);

impl ErrnoGuard {
    #[must_use]
    pub fn save() -> Self {
        ErrnoGuard(unsafe { *errno_location() })
    }
}

impl Drop for ErrnoGuard {
    fn drop(&mut self) {
        unsafe { *errno_location() = self.0 };
    }
}

#[cfg(target_os = "linux")]
unsafe fn errno_location() -> *mut libc::c_int {
    libc::__errno_location()
}

#[cfg(target_os = "android")]
unsafe fn errno_location() -> *mut libc::c_int {
    libc::__errno()
}

// ============================================================================
// Interrupted program counter
// ============================================================================

/// Program counter saved in the signal frame.
///
/// # Safety
/// `context` must be the third argument of an `SA_SIGINFO` handler.
#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
pub unsafe fn interrupted_pc(context: *mut libc::c_void) -> Option<usize> {
    let uc = context.cast::<libc::ucontext_t>().as_ref()?;
    Some(uc.uc_mcontext.gregs[libc::REG_RIP as usize] as usize)
}

/// Program counter saved in the signal frame.
///
/// # Safety
/// `context` must be the third argument of an `SA_SIGINFO` handler.
#[cfg(all(target_os = "linux", target_arch = "x86"))]
pub unsafe fn interrupted_pc(context: *mut libc::c_void) -> Option<usize> {
    let uc = context.cast::<libc::ucontext_t>().as_ref()?;
    Some(uc.uc_mcontext.gregs[libc::REG_EIP as usize] as usize)
}

/// Program counter saved in the signal frame.
///
/// # Safety
/// `context` must be the third argument of an `SA_SIGINFO` handler.
#[cfg(all(target_os = "linux", target_arch = "aarch64"))]
pub unsafe fn interrupted_pc(context: *mut libc::c_void) -> Option<usize> {
    let uc = context.cast::<libc::ucontext_t>().as_ref()?;
    Some(uc.uc_mcontext.pc as usize)
}

/// Program counter saved in the signal frame.
///
/// # Safety
/// `context` must be the third argument of an `SA_SIGINFO` handler.
#[cfg(all(target_os = "linux", target_arch = "arm"))]
pub unsafe fn interrupted_pc(context: *mut libc::c_void) -> Option<usize> {
    let uc = context.cast::<libc::ucontext_t>().as_ref()?;
    Some(uc.uc_mcontext.arm_pc as usize)
}

/// No register layout known for this target: timer ticks record nothing.
///
/// # Safety
/// Always safe; kept `unsafe` to match the other targets.
#[cfg(not(all(
    target_os = "linux",
    any(target_arch = "x86_64", target_arch = "x86", target_arch = "aarch64", target_arch = "arm")
)))]
pub unsafe fn interrupted_pc(_context: *mut libc::c_void) -> Option<usize> {
    None
}

// ============================================================================
// Wake pipe
// ============================================================================

/// Non-blocking pipe used by signal handlers to wake the drain thread.
///
/// Only `notify` is called from signal context. A full pipe means a wake-up
/// is already pending, so `EAGAIN` is ignored.
pub struct WakePipe {
    read: OwnedFd,
    write: OwnedFd,
}

impl WakePipe {
    /// # Errors
    /// Returns the `pipe2` error.
    pub fn new() -> io::Result<Self> {
        let mut fds: [libc::c_int; 2] = [0; 2];
        unsafe {
            if libc::pipe2(fds.as_mut_ptr(), libc::O_NONBLOCK | libc::O_CLOEXEC) != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(Self { read: OwnedFd::from_raw_fd(fds[0]), write: OwnedFd::from_raw_fd(fds[1]) })
        }
    }

    /// Write one wake byte. Async-signal-safe.
    pub fn notify(&self) {
        let byte = 1u8;
        unsafe {
            libc::write(self.write.as_raw_fd(), std::ptr::addr_of!(byte).cast(), 1);
        }
    }

    /// Block until a wake byte arrives or `timeout` passes.
    ///
    /// Returns `true` when woken. Interrupted polls count as a wake-up.
    pub fn wait(&self, timeout: Duration) -> bool {
        let mut pfd = libc::pollfd { fd: self.read.as_raw_fd(), events: libc::POLLIN, revents: 0 };
        let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as libc::c_int;
        let ret = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        ret != 0
    }

    /// Discard pending wake bytes.
    pub fn clear(&self) {
        let mut buf = [0u8; 64];
        loop {
            let n = unsafe { libc::read(self.read.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len()) };
            if n <= 0 {
                break;
            }
        }
    }
}

// ============================================================================
// Interval timer
// ============================================================================

/// Arm `ITIMER_PROF` with the given period.
///
/// # Errors
/// Returns the `setitimer` error.
pub fn arm_prof_timer(period_us: u64) -> io::Result<()> {
    let period = libc::timeval {
        tv_sec: (period_us / 1_000_000) as libc::time_t,
        tv_usec: (period_us % 1_000_000) as libc::suseconds_t,
    };
    set_prof_timer(period)
}

/// Disarm `ITIMER_PROF`. Ticks already pending are still delivered.
///
/// # Errors
/// Returns the `setitimer` error.
pub fn disarm_prof_timer() -> io::Result<()> {
    set_prof_timer(libc::timeval { tv_sec: 0, tv_usec: 0 })
}

fn set_prof_timer(period: libc::timeval) -> io::Result<()> {
    let value = libc::itimerval { it_interval: period, it_value: period };
    unsafe {
        if libc::setitimer(libc::ITIMER_PROF, &value, std::ptr::null_mut()) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}
