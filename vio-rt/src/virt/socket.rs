use core::fmt;
use log::*;
use parking_lot::RwLock;

use vio::action::Action;
use vio::error::{Location, Result, Subject};
use vio::stream::{suggest_with, InputStream, IoMode, IoSize, OutputStream, Stream};

use super::pipe::{Pipe, PipeReader, PipeWriter};
use crate::util::closed_err;

struct Ends {
    input: PipeReader,
    output: PipeWriter,
}

/// Full-duplex virtual connection.
///
/// A socket reads from the read end of one pipe and writes into the write end of another. Two
/// sockets are connected when each one's inbound pipe is the other's outbound pipe, which is what
/// [`Socket::pair`] sets up.
///
/// Readiness handles suggested by a socket are those of the underlying pipe endpoints. Thus
/// multiple sockets sharing a pipe wait on the same signal.
///
/// ```
/// use vio::stream::{InputStream, IoSize, OutputStream};
/// use vio_rt::virt::Socket;
///
/// let (a, b) = Socket::pair(64);
///
/// assert_eq!(a.write(b"ping"), IoSize::Bytes(4));
///
/// let mut buf = [0; 4];
/// assert_eq!(b.read(&mut buf), IoSize::Bytes(4));
/// assert_eq!(&buf, b"ping");
/// ```
pub struct Socket {
    ends: RwLock<Option<Ends>>,
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Socket")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Socket {
    /// Build a socket reading from `pipe_in` and writing into `pipe_out`.
    pub fn new(pipe_in: &Pipe, pipe_out: &Pipe) -> Self {
        Self {
            ends: RwLock::new(Some(Ends {
                input: pipe_in.reader().clone(),
                output: pipe_out.writer().clone(),
            })),
        }
    }

    /// Create two connected sockets, each direction buffering up to `capacity` bytes.
    pub fn pair(capacity: usize) -> (Self, Self) {
        Self::pair_with(Pipe::new(capacity), Pipe::new(capacity))
    }

    /// Connect two sockets through the given pipes.
    ///
    /// The first socket writes into `a_to_b`, the second writes into `b_to_a`.
    pub fn pair_with(a_to_b: Pipe, b_to_a: Pipe) -> (Self, Self) {
        let a = Self::new(&b_to_a, &a_to_b);
        let b = Self::new(&a_to_b, &b_to_a);
        (a, b)
    }

    fn input(&self) -> Option<PipeReader> {
        self.ends.read().as_ref().map(|e| e.input.clone())
    }

    fn output(&self) -> Option<PipeWriter> {
        self.ends.read().as_ref().map(|e| e.output.clone())
    }

    /// Cap single read and write transfers on the underlying pipe endpoints.
    ///
    /// Useful for simulating limited throughput, or forcing fragmentation between connected
    /// sockets. `None` removes a cap. Has no effect on a closed socket.
    pub fn set_max_available_to_read_write(&self, to_read: Option<usize>, to_write: Option<usize>) {
        if let Some(ends) = &*self.ends.read() {
            ends.input.set_max_available_to_read(to_read);
            ends.output.set_max_available_to_write(to_write);
        }
    }

    /// Close both pipes and release them.
    ///
    /// The peer observes end of stream on read and `BrokenPipe` on write. Subsequent I/O on this
    /// socket reports `BrokenPipe`. Calling this more than once has no effect.
    pub fn close(&self) {
        // Take the ends out first, so that callers blocked in I/O are not holding us up.
        let ends = self.ends.write().take();

        if let Some(ends) = ends {
            ends.input.close_pipe();
            ends.output.close_pipe();
            debug!("Socket closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.ends.read().is_none()
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        self.close();
    }
}

impl Stream for Socket {}

impl InputStream for Socket {
    fn read(&self, buf: &mut [u8]) -> IoSize {
        match self.input() {
            Some(input) => input.read(buf),
            None => IoSize::BrokenPipe,
        }
    }

    fn set_input_mode(&self, mode: IoMode) -> Result<()> {
        self.input()
            .ok_or_else(|| closed_err(Subject::Socket))?
            .set_input_mode(mode)
    }

    fn input_mode(&self) -> IoMode {
        self.input().map(|i| i.input_mode()).unwrap_or_default()
    }

    fn suggest_input_action(&self, result: IoSize) -> Result<Action> {
        match self.input() {
            Some(input) => input.suggest_input_action(result),
            None => suggest_with(result, Subject::Socket, Location::Network, || {
                Action::Proceed
            }),
        }
    }
}

impl OutputStream for Socket {
    fn write(&self, buf: &[u8]) -> IoSize {
        match self.output() {
            Some(output) => output.write(buf),
            None => IoSize::BrokenPipe,
        }
    }

    fn set_output_mode(&self, mode: IoMode) -> Result<()> {
        self.output()
            .ok_or_else(|| closed_err(Subject::Socket))?
            .set_output_mode(mode)
    }

    fn output_mode(&self) -> IoMode {
        self.output().map(|o| o.output_mode()).unwrap_or_default()
    }

    fn suggest_output_action(&self, result: IoSize) -> Result<Action> {
        match self.output() {
            Some(output) => output.suggest_output_action(result),
            None => suggest_with(result, Subject::Socket, Location::Network, || {
                Action::Proceed
            }),
        }
    }
}
