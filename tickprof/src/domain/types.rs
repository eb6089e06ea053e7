//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers keep raw integers apart: a program counter is not a
//! signal number, and a session id is not a sample count.

use std::fmt;

/// Captured program counter
///
/// Stored as `u64` so traces recorded on 32-bit hosts read back unchanged on
/// 64-bit readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(transparent)]
pub struct Address(pub u64);

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl From<usize> for Address {
    fn from(pc: usize) -> Self {
        Address(pc as u64)
    }
}

/// Identity of one profiling run
///
/// Monotonic for the lifetime of the process; a restarted session always gets
/// a new id, which is how a stale guard recognizes it no longer owns the
/// active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// POSIX signal number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signal(pub i32);

impl Signal {
    pub const PROF: Signal = Signal(libc::SIGPROF);
    pub const USR1: Signal = Signal(libc::SIGUSR1);
    pub const USR2: Signal = Signal(libc::SIGUSR2);

    /// Symbolic name for the signals this crate deals with.
    #[must_use]
    pub fn name(self) -> Option<&'static str> {
        Some(match self.0 {
            libc::SIGPROF => "SIGPROF",
            libc::SIGUSR1 => "SIGUSR1",
            libc::SIGUSR2 => "SIGUSR2",
            libc::SIGINT => "SIGINT",
            libc::SIGTERM => "SIGTERM",
            libc::SIGHUP => "SIGHUP",
            libc::SIGQUIT => "SIGQUIT",
            libc::SIGALRM => "SIGALRM",
            libc::SIGVTALRM => "SIGVTALRM",
            libc::SIGKILL => "SIGKILL",
            libc::SIGSTOP => "SIGSTOP",
            _ => return None,
        })
    }

    /// Parse `USR2`, `SIGUSR2` or a decimal signal number.
    #[must_use]
    pub fn parse(text: &str) -> Option<Signal> {
        let text = text.trim();
        if let Ok(num) = text.parse::<i32>() {
            return (num > 0).then_some(Signal(num));
        }
        let upper = text.to_ascii_uppercase();
        let bare = upper.strip_prefix("SIG").unwrap_or(&upper);
        let num = match bare {
            "PROF" => libc::SIGPROF,
            "USR1" => libc::SIGUSR1,
            "USR2" => libc::SIGUSR2,
            "INT" => libc::SIGINT,
            "TERM" => libc::SIGTERM,
            "HUP" => libc::SIGHUP,
            "QUIT" => libc::SIGQUIT,
            "ALRM" => libc::SIGALRM,
            "VTALRM" => libc::SIGVTALRM,
            _ => return None,
        };
        Some(Signal(num))
    }

    /// Whether a handler can be installed for this signal at all.
    #[must_use]
    pub fn is_catchable(self) -> bool {
        self.0 > 0 && self.0 != libc::SIGKILL && self.0 != libc::SIGSTOP
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "signal {}", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_display() {
        assert_eq!(Address(0x1000).to_string(), "0x1000");
        assert_eq!(Address::from(0xdead_usize), Address(0xdead));
    }

    #[test]
    fn test_signal_parse() {
        assert_eq!(Signal::parse("USR1"), Some(Signal::USR1));
        assert_eq!(Signal::parse("sigusr2"), Some(Signal::USR2));
        assert_eq!(Signal::parse(" 27 "), Some(Signal(27)));
        assert_eq!(Signal::parse("-3"), None);
        assert_eq!(Signal::parse("BOGUS"), None);
    }

    #[test]
    fn test_signal_display() {
        assert_eq!(Signal::PROF.to_string(), "SIGPROF");
        assert_eq!(Signal(63).to_string(), "signal 63");
        assert!(!Signal(libc::SIGKILL).is_catchable());
        assert!(Signal::USR2.is_catchable());
    }
}
