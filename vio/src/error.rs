//! vio's error types
//!
//! Errors are meant to be cheap to copy around and descriptive enough to be acted upon by a
//! scheduler. Hence an error is a triplet of small enums, instead of a boxed trait object.

use core::fmt;

pub type Result<T> = core::result::Result<T, Error>;

/// vio's error type.
///
/// This type consists of 3 distinct pieces:
///
/// - `subject`, represents what errored out.
/// - `state`, represents what kind of error state was reached.
/// - `location`, where in the program the error occured.
///
/// Use [`Error::kind`] to classify the error for retry decisions.
#[repr(C)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Error {
    pub subject: Subject,
    pub state: State,
    pub location: Location,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}: {} in {} state at {}",
            self.kind(),
            self.subject,
            self.state,
            self.location
        )
    }
}

impl std::error::Error for Error {}

impl Error {
    pub const fn new(subject: Subject, state: State, location: Location) -> Self {
        Self {
            subject,
            state,
            location,
        }
    }

    /// Classify the error.
    pub const fn kind(&self) -> ErrorKind {
        match self.state {
            State::NotReady => ErrorKind::RetryableWouldBlock,
            State::BrokenPipe | State::NotConnected => ErrorKind::ChannelClosed,
            State::Unsupported => ErrorKind::UnsupportedOperation,
            _ => ErrorKind::IoFailure,
        }
    }

    /// Returns `true` if the operation may succeed once the channel becomes ready.
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::RetryableWouldBlock)
    }
}

/// Coarse classification of an [`Error`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    /// The channel is not ready. Not a failure, retry after the suggested action.
    RetryableWouldBlock,
    /// The channel is closed for this direction. Terminal, never retried.
    ChannelClosed,
    /// The backend cannot provide the requested mode or capability.
    UnsupportedOperation,
    /// Backend specific fatal condition.
    IoFailure,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::RetryableWouldBlock => "would block",
            Self::ChannelClosed => "channel closed",
            Self::UnsupportedOperation => "unsupported operation",
            Self::IoFailure => "I/O failure",
        };
        f.write_str(s)
    }
}

/// Shorthand for building vio error structure.
///
/// All enum variants act as if they are imported, therefore in this macro they are to be used
/// without specifying the type.
///
/// ```
/// use vio::error::ErrorKind;
///
/// let err = vio::vioerr!(Io, BrokenPipe, Network);
/// assert_eq!(err.kind(), ErrorKind::ChannelClosed);
/// ```
#[macro_export]
macro_rules! vioerr {
    ($subject:ident, $state:ident, $location:ident) => {
        $crate::error::Error {
            subject: $crate::error::Subject::$subject,
            state: $crate::error::State::$state,
            location: $crate::error::Location::$location,
        }
    };
}

macro_rules! ienum {
    (
        $(#[$meta:meta])*
        pub enum $ident:ident {
            $($variant:ident,)*
        }
    ) => {
        $(#[$meta])*
        #[repr(u8)]
        #[non_exhaustive]
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        pub enum $ident {
            $($variant),*
        }

        impl $ident {
            pub const fn to_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => stringify!($variant),)*
                }
            }
        }

        impl AsRef<str> for $ident {
            fn as_ref(&self) -> &str {
                self.to_str()
            }
        }

        impl core::ops::Deref for $ident {
            type Target = str;

            fn deref(&self) -> &str {
                self.to_str()
            }
        }

        impl fmt::Display for $ident {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}", self.to_str())
            }
        }
    };
}

ienum! {
    pub enum Subject {
        Argument,
        Data,
        File,
        Io,
        Input,
        Output,
        Buffer,
        Mode,
        Pipe,
        Socket,
        Connection,
        Interface,
        Listener,
        Operation,
        Other,
    }
}

ienum! {
    pub enum State {
        Invalid,
        Unsupported,
        Unavailable,
        NotFound,
        PermissionDenied,
        AlreadyExists,
        InUse,
        Interrupted,
        Refused,
        Aborted,
        NotReady,
        NotConnected,
        BrokenPipe,
        Timeout,
        Nop,
        UnexpectedEof,
        Exhausted,
        Other,
    }
}

ienum! {
    pub enum Location {
        Core,
        Backend,
        Filesystem,
        Network,
        Scheduler,
        Application,
        Stdlib,
        Other,
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self {
            subject: Subject::Io,
            state: err.kind().into(),
            location: Location::Stdlib,
        }
    }
}

impl From<std::io::ErrorKind> for State {
    fn from(kind: std::io::ErrorKind) -> Self {
        use std::io::ErrorKind::*;
        match kind {
            NotFound => State::NotFound,
            PermissionDenied => State::PermissionDenied,
            ConnectionRefused => State::Refused,
            ConnectionReset => State::BrokenPipe,
            ConnectionAborted => State::Aborted,
            NotConnected => State::NotConnected,
            AddrInUse => State::InUse,
            AddrNotAvailable => State::Unavailable,
            BrokenPipe => State::BrokenPipe,
            AlreadyExists => State::AlreadyExists,
            WouldBlock => State::NotReady,
            InvalidInput => State::Invalid,
            InvalidData => State::Invalid,
            TimedOut => State::Timeout,
            WriteZero => State::Nop,
            Interrupted => State::Interrupted,
            Unsupported => State::Unsupported,
            UnexpectedEof => State::UnexpectedEof,
            OutOfMemory => State::Exhausted,
            _ => State::Other,
        }
    }
}

impl From<State> for std::io::ErrorKind {
    fn from(state: State) -> Self {
        use std::io::ErrorKind::*;
        match state {
            State::Invalid => InvalidInput,
            State::Unsupported => Unsupported,
            State::NotFound => NotFound,
            State::PermissionDenied => PermissionDenied,
            State::AlreadyExists => AlreadyExists,
            State::InUse => AddrInUse,
            State::Unavailable => AddrNotAvailable,
            State::Interrupted => Interrupted,
            State::Refused => ConnectionRefused,
            State::Aborted => ConnectionAborted,
            State::NotReady => WouldBlock,
            State::NotConnected => NotConnected,
            State::BrokenPipe => BrokenPipe,
            State::Timeout => TimedOut,
            State::Nop => WriteZero,
            State::UnexpectedEof => UnexpectedEof,
            State::Exhausted => OutOfMemory,
            _ => Other,
        }
    }
}

impl From<std::io::ErrorKind> for Error {
    fn from(kind: std::io::ErrorKind) -> Self {
        Self {
            subject: Subject::Io,
            state: kind.into(),
            location: Location::Other,
        }
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        std::io::Error::new(err.state.into(), err)
    }
}

impl From<core::convert::Infallible> for Error {
    fn from(_: core::convert::Infallible) -> Self {
        unreachable!()
    }
}

pub trait ErrorSpecify: Sized {
    fn subject(self, subject: Subject) -> Self;
    fn state(self, state: State) -> Self;
    fn location(self, location: Location) -> Self;
}

impl ErrorSpecify for Error {
    fn subject(self, subject: Subject) -> Self {
        Self { subject, ..self }
    }

    fn state(self, state: State) -> Self {
        Self { state, ..self }
    }

    fn location(self, location: Location) -> Self {
        Self { location, ..self }
    }
}

impl<T> ErrorSpecify for Result<T> {
    fn subject(self, subject: Subject) -> Self {
        self.map_err(|e| e.subject(subject))
    }

    fn state(self, state: State) -> Self {
        self.map_err(|e| e.state(state))
    }

    fn location(self, location: Location) -> Self {
        self.map_err(|e| e.location(location))
    }
}
