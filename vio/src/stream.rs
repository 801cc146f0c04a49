//! The byte stream contract.
//!
//! Every transport, real or simulated, exposes one or both of [`InputStream`] and
//! [`OutputStream`]. Calls never fail with an exception-like control flow. Instead, they return an
//! [`IoSize`], which is either a byte count or a sentinel. Sentinels are fed back into the stream's
//! `suggest_*_action` function to obtain an [`Action`] that tells the caller's scheduler what to
//! wait for.
//!
//! Short reads and writes are always legal, callers must loop.

use crate::action::Action;
use crate::error::{Error, Location, Result, State, Subject};
use std::sync::Arc;

/// Result of a single `read` or `write` call.
///
/// A sentinel is never a valid byte count, and vice versa.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum IoSize {
    /// Number of bytes actually transferred. May be less than requested.
    ///
    /// For reads, `Bytes(0)` with a non-empty buffer signals end of stream.
    Bytes(usize),
    /// No data available yet, retry once the suggested action is satisfied.
    RetryRead,
    /// No space available yet, retry once the suggested action is satisfied.
    RetryWrite,
    /// The channel is closed for this direction.
    BrokenPipe,
    /// Backend specific failure.
    Error(Error),
}

impl IoSize {
    /// Returns the transferred byte count, if this is not a sentinel.
    pub const fn bytes(&self) -> Option<usize> {
        match self {
            Self::Bytes(n) => Some(*n),
            _ => None,
        }
    }

    pub const fn is_sentinel(&self) -> bool {
        !matches!(self, Self::Bytes(_))
    }

    /// Returns `true` for `RetryRead` and `RetryWrite`.
    pub const fn is_retry(&self) -> bool {
        matches!(self, Self::RetryRead | Self::RetryWrite)
    }

    /// Convert into a `Result`, mapping every sentinel to an error of matching kind.
    pub fn into_result(self) -> Result<usize> {
        match self {
            Self::Bytes(n) => Ok(n),
            Self::RetryRead => Err(Error::new(Subject::Input, State::NotReady, Location::Core)),
            Self::RetryWrite => Err(Error::new(Subject::Output, State::NotReady, Location::Core)),
            Self::BrokenPipe => Err(Error::new(Subject::Io, State::BrokenPipe, Location::Core)),
            Self::Error(e) => Err(e),
        }
    }
}

impl From<Error> for IoSize {
    fn from(err: Error) -> Self {
        Self::Error(err)
    }
}

/// Whether a would-block condition suspends inside the call, or returns a sentinel.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum IoMode {
    #[default]
    Blocking,
    NonBlocking,
}

impl IoMode {
    pub(crate) const fn to_u8(self) -> u8 {
        match self {
            Self::Blocking => 0,
            Self::NonBlocking => 1,
        }
    }

    pub(crate) const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Blocking,
            _ => Self::NonBlocking,
        }
    }
}

/// Atomic cell holding an [`IoMode`].
///
/// Backends use this to keep a per-direction mode that can be switched through a shared
/// reference.
#[derive(Debug, Default)]
pub struct AtomicIoMode(core::sync::atomic::AtomicU8);

impl AtomicIoMode {
    pub const fn new(mode: IoMode) -> Self {
        Self(core::sync::atomic::AtomicU8::new(mode.to_u8()))
    }

    pub fn load(&self) -> IoMode {
        IoMode::from_u8(self.0.load(core::sync::atomic::Ordering::Acquire))
    }

    pub fn store(&self, mode: IoMode) {
        self.0
            .store(mode.to_u8(), core::sync::atomic::Ordering::Release)
    }
}

/// Direction of a duplex stream.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Direction {
    Input,
    Output,
}

/// Common base of [`InputStream`] and [`OutputStream`].
pub trait Stream {}

pub trait InputStream: Stream {
    /// Read up to `buf.len()` bytes.
    ///
    /// It is a legal case if fewer bytes are returned, even if more are available. Caller should
    /// handle this!
    fn read(&self, buf: &mut [u8]) -> IoSize;

    /// Set the input I/O mode.
    ///
    /// Fails with [`ErrorKind::UnsupportedOperation`](crate::error::ErrorKind) if the backend can
    /// not honor the mode.
    fn set_input_mode(&self, mode: IoMode) -> Result<()>;

    fn input_mode(&self) -> IoMode;

    /// Suggest a scheduling action for the result of the immediately preceding `read`.
    ///
    /// The stream MUST always report the same readiness handle. Terminal sentinels
    /// (`BrokenPipe`, `Error`) produce an error, because they are never to be retried.
    fn suggest_input_action(&self, result: IoSize) -> Result<Action>;
}

pub trait OutputStream: Stream {
    /// Write up to `buf.len()` bytes.
    ///
    /// It is a legal case if fewer bytes are written. Caller should handle this!
    fn write(&self, buf: &[u8]) -> IoSize;

    fn set_output_mode(&self, mode: IoMode) -> Result<()>;

    fn output_mode(&self) -> IoMode;

    /// Suggest a scheduling action for the result of the immediately preceding `write`.
    fn suggest_output_action(&self, result: IoSize) -> Result<Action>;
}

/// Direction-parameterised view over duplex streams.
pub trait IoStream: InputStream + OutputStream {
    fn set_mode(&self, direction: Direction, mode: IoMode) -> Result<()> {
        match direction {
            Direction::Input => self.set_input_mode(mode),
            Direction::Output => self.set_output_mode(mode),
        }
    }

    fn mode(&self, direction: Direction) -> IoMode {
        match direction {
            Direction::Input => self.input_mode(),
            Direction::Output => self.output_mode(),
        }
    }

    fn suggest_action(&self, direction: Direction, result: IoSize) -> Result<Action> {
        match direction {
            Direction::Input => self.suggest_input_action(result),
            Direction::Output => self.suggest_output_action(result),
        }
    }
}

impl<T: InputStream + OutputStream + ?Sized> IoStream for T {}

/// Action suggestion shared by backends: byte counts proceed, terminal sentinels error out.
///
/// `wait` is invoked for `RetryRead`/`RetryWrite` and returns the action to wait on.
pub fn suggest_with(
    result: IoSize,
    subject: Subject,
    location: Location,
    wait: impl FnOnce() -> Action,
) -> Result<Action> {
    match result {
        IoSize::Bytes(_) => Ok(Action::Proceed),
        res if res.is_retry() => Ok(wait()),
        IoSize::Error(e) => Err(e),
        _ => Err(Error::new(subject, State::BrokenPipe, location)),
    }
}

macro_rules! forward_impls {
    ($($ty:ty),*) => {
        $(
            impl<T: Stream + ?Sized> Stream for $ty {}

            impl<T: InputStream + ?Sized> InputStream for $ty {
                fn read(&self, buf: &mut [u8]) -> IoSize {
                    (**self).read(buf)
                }

                fn set_input_mode(&self, mode: IoMode) -> Result<()> {
                    (**self).set_input_mode(mode)
                }

                fn input_mode(&self) -> IoMode {
                    (**self).input_mode()
                }

                fn suggest_input_action(&self, result: IoSize) -> Result<Action> {
                    (**self).suggest_input_action(result)
                }
            }

            impl<T: OutputStream + ?Sized> OutputStream for $ty {
                fn write(&self, buf: &[u8]) -> IoSize {
                    (**self).write(buf)
                }

                fn set_output_mode(&self, mode: IoMode) -> Result<()> {
                    (**self).set_output_mode(mode)
                }

                fn output_mode(&self) -> IoMode {
                    (**self).output_mode()
                }

                fn suggest_output_action(&self, result: IoSize) -> Result<Action> {
                    (**self).suggest_output_action(result)
                }
            }
        )*
    };
}

forward_impls!(&T, Box<T>, Arc<T>);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn sentinels_are_not_counts() {
        assert_eq!(IoSize::Bytes(0).bytes(), Some(0));
        for s in [
            IoSize::RetryRead,
            IoSize::RetryWrite,
            IoSize::BrokenPipe,
            IoSize::Error(crate::vioerr!(Io, Other, Other)),
        ] {
            assert!(s.is_sentinel());
            assert_eq!(s.bytes(), None);
        }

        assert!(IoSize::RetryRead.is_retry());
        assert!(IoSize::RetryWrite.is_retry());
        assert!(!IoSize::BrokenPipe.is_retry());
        assert!(!IoSize::Bytes(0).is_retry());
    }

    #[test]
    fn into_result_kinds() {
        assert_eq!(IoSize::Bytes(7).into_result(), Ok(7));
        assert_eq!(
            IoSize::RetryRead.into_result().unwrap_err().kind(),
            ErrorKind::RetryableWouldBlock
        );
        assert_eq!(
            IoSize::RetryWrite.into_result().unwrap_err().kind(),
            ErrorKind::RetryableWouldBlock
        );
        assert_eq!(
            IoSize::BrokenPipe.into_result().unwrap_err().kind(),
            ErrorKind::ChannelClosed
        );
    }

    #[test]
    fn atomic_mode() {
        let mode = AtomicIoMode::default();
        assert_eq!(mode.load(), IoMode::Blocking);
        mode.store(IoMode::NonBlocking);
        assert_eq!(mode.load(), IoMode::NonBlocking);
    }

    #[test]
    fn suggest_terminal_errors() {
        let wait = || Action::RepeatImmediately;
        assert!(matches!(
            suggest_with(IoSize::Bytes(3), Subject::Io, Location::Core, wait),
            Ok(Action::Proceed)
        ));
        assert!(matches!(
            suggest_with(IoSize::RetryRead, Subject::Io, Location::Core, wait),
            Ok(Action::RepeatImmediately)
        ));
        let err = suggest_with(IoSize::BrokenPipe, Subject::Pipe, Location::Network, wait)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChannelClosed);
        assert_eq!(err.subject, Subject::Pipe);
    }
}
