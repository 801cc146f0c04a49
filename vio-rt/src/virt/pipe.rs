//! Bounded in-process byte channel.
//!
//! A [`Pipe`] connects one logical writer with one logical reader through a fixed capacity ring
//! buffer. Both ends are exposed as separate handles ([`PipeWriter`], [`PipeReader`]), each
//! implementing its side of the stream contract.
//!
//! Synchronization is a single mutex plus two condition variables (data available, space
//! available) for blocking callers, and two [`Readiness`] handles for non-blocking callers driven
//! by an external scheduler.
//!
//! # Closing
//!
//! - [`PipeWriter::close`] closes the write end. Readers drain the buffer, then observe EOF.
//! - [`PipeReader::close`] closes the read end. Writers observe `BrokenPipe`.
//! - [`Pipe::close`] closes both.
//!
//! Dropping the last handle of an end closes that end. Closing is idempotent, terminal, and wakes
//! every suspended caller.

use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};
use log::*;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

use vio::action::{Action, Readiness};
use vio::error::{Location, Result, Subject};
use vio::stream::{
    suggest_with, AtomicIoMode, InputStream, IoMode, IoSize, OutputStream, Stream,
};

use super::ring::RingBuf;

/// Capacity used when none is specified.
pub const DEFAULT_CAPACITY: usize = 4096;

/// Environment variable overriding the default capacity in [`PipeBuilder::env`].
pub const CAPACITY_ENV: &str = "VIO_PIPE_CAPACITY";

struct State {
    buf: RingBuf,
    read_closed: bool,
    write_closed: bool,
    max_available_to_read: Option<usize>,
    max_available_to_write: Option<usize>,
}

impl State {
    fn closed(&self) -> bool {
        self.read_closed || self.write_closed
    }
}

struct Shared {
    state: Mutex<State>,
    data_available: Condvar,
    space_available: Condvar,
    readable: Readiness,
    writable: Readiness,
    input_mode: AtomicIoMode,
    output_mode: AtomicIoMode,
    readers: AtomicUsize,
    writers: AtomicUsize,
}

impl Shared {
    fn id(&self) -> usize {
        self as *const Self as usize
    }

    fn read(&self, buf: &mut [u8]) -> IoSize {
        if buf.is_empty() {
            return IoSize::Bytes(0);
        }

        let mut state = self.state.lock();

        loop {
            let n = buf
                .len()
                .min(state.max_available_to_read.unwrap_or(usize::MAX))
                .min(state.buf.len());

            if n > 0 {
                let n = state.buf.pop_into(&mut buf[..n]);
                core::mem::drop(state);
                self.space_available.notify_all();
                self.writable.notify();
                return IoSize::Bytes(n);
            }

            if state.closed() {
                return IoSize::Bytes(0);
            }

            if self.input_mode.load() == IoMode::NonBlocking {
                return IoSize::RetryRead;
            }

            self.data_available.wait(&mut state);
        }
    }

    fn write(&self, buf: &[u8]) -> IoSize {
        let mut state = self.state.lock();

        loop {
            if state.closed() {
                return IoSize::BrokenPipe;
            }

            if buf.is_empty() {
                return IoSize::Bytes(0);
            }

            let n = buf
                .len()
                .min(state.max_available_to_write.unwrap_or(usize::MAX))
                .min(state.buf.free());

            if n > 0 {
                let n = state.buf.push_from(&buf[..n]);
                core::mem::drop(state);
                self.data_available.notify_all();
                self.readable.notify();
                return IoSize::Bytes(n);
            }

            if self.output_mode.load() == IoMode::NonBlocking {
                return IoSize::RetryWrite;
            }

            self.space_available.wait(&mut state);
        }
    }

    fn close_with(&self, f: impl FnOnce(&mut State) -> bool) {
        let changed = f(&mut self.state.lock());

        if changed {
            self.data_available.notify_all();
            self.space_available.notify_all();
            self.readable.notify();
            self.writable.notify();
        }
    }

    fn close_read(&self) {
        self.close_with(|state| {
            let changed = !state.read_closed;
            state.read_closed = true;
            changed
        });
        trace!("Pipe {:x}: read end closed", self.id());
    }

    fn close_write(&self) {
        self.close_with(|state| {
            let changed = !state.write_closed;
            state.write_closed = true;
            changed
        });
        trace!("Pipe {:x}: write end closed", self.id());
    }

    fn close(&self) {
        self.close_with(|state| {
            let changed = !(state.read_closed && state.write_closed);
            state.read_closed = true;
            state.write_closed = true;
            changed
        });
        trace!("Pipe {:x}: closed", self.id());
    }
}

/// Builder for [`Pipe`].
///
/// ```
/// use vio::stream::{InputStream, IoMode, IoSize};
/// use vio_rt::virt::PipeBuilder;
///
/// let pipe = PipeBuilder::new()
///     .capacity(16)
///     .input_mode(IoMode::NonBlocking)
///     .build();
///
/// let mut buf = [0; 4];
/// assert_eq!(pipe.reader().read(&mut buf), IoSize::RetryRead);
/// ```
#[derive(Clone, Debug)]
pub struct PipeBuilder {
    capacity: usize,
    max_available_to_read: Option<usize>,
    max_available_to_write: Option<usize>,
    input_mode: IoMode,
    output_mode: IoMode,
}

impl Default for PipeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipeBuilder {
    pub fn new() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            max_available_to_read: None,
            max_available_to_write: None,
            input_mode: IoMode::Blocking,
            output_mode: IoMode::Blocking,
        }
    }

    /// Get a `PipeBuilder` with capacity specified by environment.
    ///
    /// This function attempts to parse `VIO_PIPE_CAPACITY` environment variable. If the variable
    /// is not present, or does not hold a number, this function falls back to
    /// [`DEFAULT_CAPACITY`].
    pub fn env() -> Self {
        Self::new().capacity(parse_capacity(std::env::var(CAPACITY_ENV).ok()))
    }

    /// Total number of bytes the pipe may buffer. Clamped to at least 1.
    pub fn capacity(self, capacity: usize) -> Self {
        Self { capacity, ..self }
    }

    /// Cap on bytes a single read may transfer. `None` is unlimited.
    pub fn max_available_to_read(self, max_available_to_read: Option<usize>) -> Self {
        Self {
            max_available_to_read,
            ..self
        }
    }

    /// Cap on bytes a single write may transfer. `None` is unlimited.
    pub fn max_available_to_write(self, max_available_to_write: Option<usize>) -> Self {
        Self {
            max_available_to_write,
            ..self
        }
    }

    pub fn input_mode(self, input_mode: IoMode) -> Self {
        Self { input_mode, ..self }
    }

    pub fn output_mode(self, output_mode: IoMode) -> Self {
        Self {
            output_mode,
            ..self
        }
    }

    pub fn build(self) -> Pipe {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                buf: RingBuf::with_capacity(self.capacity.max(1)),
                read_closed: false,
                write_closed: false,
                max_available_to_read: clamp_cap(self.max_available_to_read),
                max_available_to_write: clamp_cap(self.max_available_to_write),
            }),
            data_available: Condvar::new(),
            space_available: Condvar::new(),
            readable: Readiness::new(),
            writable: Readiness::new(),
            input_mode: AtomicIoMode::new(self.input_mode),
            output_mode: AtomicIoMode::new(self.output_mode),
            readers: AtomicUsize::new(0),
            writers: AtomicUsize::new(0),
        });

        Pipe {
            reader: PipeReader::new(shared.clone()),
            writer: PipeWriter::new(shared),
        }
    }
}

fn parse_capacity(val: Option<String>) -> usize {
    match val {
        Some(val) => val.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid {CAPACITY_ENV}={val:?}");
            DEFAULT_CAPACITY
        }),
        None => DEFAULT_CAPACITY,
    }
}

// A zero cap would never let a call make progress.
fn clamp_cap(cap: Option<usize>) -> Option<usize> {
    cap.map(|c| c.max(1))
}

/// Bounded byte channel with two endpoints.
///
/// Cloning a pipe yields another handle to the same channel.
#[derive(Clone)]
pub struct Pipe {
    reader: PipeReader,
    writer: PipeWriter,
}

impl fmt::Debug for Pipe {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let state = self.reader.shared.state.lock();
        f.debug_struct("Pipe")
            .field("id", &self.reader.shared.id())
            .field("len", &state.buf.len())
            .field("capacity", &state.buf.capacity())
            .field("read_closed", &state.read_closed)
            .field("write_closed", &state.write_closed)
            .finish()
    }
}

impl Default for Pipe {
    fn default() -> Self {
        PipeBuilder::new().build()
    }
}

impl Pipe {
    /// Create a pipe with given buffer capacity, in blocking mode on both ends.
    pub fn new(capacity: usize) -> Self {
        PipeBuilder::new().capacity(capacity).build()
    }

    pub fn builder() -> PipeBuilder {
        PipeBuilder::new()
    }

    pub fn reader(&self) -> &PipeReader {
        &self.reader
    }

    pub fn writer(&self) -> &PipeWriter {
        &self.writer
    }

    /// Split the pipe into its endpoints.
    pub fn into_split(self) -> (PipeReader, PipeWriter) {
        (self.reader, self.writer)
    }

    /// Close both ends, waking every suspended caller.
    pub fn close(&self) {
        self.reader.shared.close();
    }

    /// Returns `true` once both ends are closed.
    pub fn is_closed(&self) -> bool {
        let state = self.reader.shared.state.lock();
        state.read_closed && state.write_closed
    }

    /// Number of currently buffered bytes.
    pub fn len(&self) -> usize {
        self.reader.shared.state.lock().buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reader.shared.state.lock().buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.reader.shared.state.lock().buf.capacity()
    }

    /// Returns `true` if both handles refer to the same channel.
    pub fn same_as(&self, other: &Pipe) -> bool {
        Arc::ptr_eq(&self.reader.shared, &other.reader.shared)
    }
}

/// Read end of a [`Pipe`].
pub struct PipeReader {
    shared: Arc<Shared>,
}

impl PipeReader {
    fn new(shared: Arc<Shared>) -> Self {
        shared.readers.fetch_add(1, Ordering::Relaxed);
        Self { shared }
    }

    /// Cap the number of bytes a single read may return. `None` is unlimited.
    ///
    /// The cap persists until changed. `Some(0)` is treated as `Some(1)`.
    pub fn set_max_available_to_read(&self, max: Option<usize>) {
        self.shared.state.lock().max_available_to_read = clamp_cap(max);
    }

    pub fn max_available_to_read(&self) -> Option<usize> {
        self.shared.state.lock().max_available_to_read
    }

    /// Close the read end. Pending and future writes report `BrokenPipe`.
    pub fn close(&self) {
        self.shared.close_read();
    }

    /// Close both ends of the underlying pipe.
    pub fn close_pipe(&self) {
        self.shared.close();
    }

    /// Returns `true` if no more data will ever be written.
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed()
    }

    pub fn readiness(&self) -> &Readiness {
        &self.shared.readable
    }
}

impl Clone for PipeReader {
    fn clone(&self) -> Self {
        Self::new(self.shared.clone())
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        if self.shared.readers.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.shared.close_read();
        }
    }
}

impl Stream for PipeReader {}

impl InputStream for PipeReader {
    fn read(&self, buf: &mut [u8]) -> IoSize {
        self.shared.read(buf)
    }

    fn set_input_mode(&self, mode: IoMode) -> Result<()> {
        self.shared.input_mode.store(mode);
        // Let blocked readers observe the new mode.
        let _guard = self.shared.state.lock();
        self.shared.data_available.notify_all();
        Ok(())
    }

    fn input_mode(&self) -> IoMode {
        self.shared.input_mode.load()
    }

    fn suggest_input_action(&self, result: IoSize) -> Result<Action> {
        suggest_with(result, Subject::Pipe, Location::Network, || {
            Action::WaitReadable(self.shared.readable.clone())
        })
    }
}

/// Write end of a [`Pipe`].
pub struct PipeWriter {
    shared: Arc<Shared>,
}

impl PipeWriter {
    fn new(shared: Arc<Shared>) -> Self {
        shared.writers.fetch_add(1, Ordering::Relaxed);
        Self { shared }
    }

    /// Cap the number of bytes a single write may accept. `None` is unlimited.
    ///
    /// The cap persists until changed. `Some(0)` is treated as `Some(1)`.
    pub fn set_max_available_to_write(&self, max: Option<usize>) {
        self.shared.state.lock().max_available_to_write = clamp_cap(max);
    }

    pub fn max_available_to_write(&self) -> Option<usize> {
        self.shared.state.lock().max_available_to_write
    }

    /// Close the write end. Readers drain what is buffered, then observe EOF.
    pub fn close(&self) {
        self.shared.close_write();
    }

    /// Close both ends of the underlying pipe.
    pub fn close_pipe(&self) {
        self.shared.close();
    }

    /// Returns `true` if writes can no longer succeed.
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed()
    }

    pub fn readiness(&self) -> &Readiness {
        &self.shared.writable
    }
}

impl Clone for PipeWriter {
    fn clone(&self) -> Self {
        Self::new(self.shared.clone())
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        if self.shared.writers.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.shared.close_write();
        }
    }
}

impl Stream for PipeWriter {}

impl OutputStream for PipeWriter {
    fn write(&self, buf: &[u8]) -> IoSize {
        self.shared.write(buf)
    }

    fn set_output_mode(&self, mode: IoMode) -> Result<()> {
        self.shared.output_mode.store(mode);
        let _guard = self.shared.state.lock();
        self.shared.space_available.notify_all();
        Ok(())
    }

    fn output_mode(&self) -> IoMode {
        self.shared.output_mode.load()
    }

    fn suggest_output_action(&self, result: IoSize) -> Result<Action> {
        suggest_with(result, Subject::Pipe, Location::Network, || {
            Action::WaitWritable(self.shared.writable.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::atomic::AtomicBool;
    use std::thread;
    use std::time::Duration;
    use vio::error::ErrorKind;
    use vio::poller;

    #[test]
    fn fifo_with_random_chunks() {
        let _ = env_logger::builder().is_test(true).try_init();

        let mut rng = StdRng::seed_from_u64(0x5eed);

        for _ in 0..32 {
            let capacity = rng.gen_range(1..=16);
            let len = rng.gen_range(0..512);
            let data = (0..len).map(|_| rng.gen::<u8>()).collect::<Vec<_>>();
            let chunks = (0..8).map(|_| rng.gen_range(1..=32)).collect::<Vec<usize>>();
            let read_cap = rng.gen_bool(0.5).then(|| rng.gen_range(1..=8));

            let pipe = Pipe::builder()
                .capacity(capacity)
                .max_available_to_read(read_cap)
                .build();
            let (reader, writer) = pipe.into_split();

            let input = data.clone();
            let producer = thread::spawn(move || {
                let mut rest = &input[..];
                for chunk in chunks.iter().cycle() {
                    if rest.is_empty() {
                        break;
                    }
                    let (head, tail) = rest.split_at((*chunk).min(rest.len()));
                    poller::write_all(&writer, head).unwrap();
                    rest = tail;
                }
                // Dropping the writer closes the write end.
            });

            let mut out = vec![];
            poller::read_to_end(&reader, &mut out).unwrap();
            producer.join().unwrap();

            assert_eq!(out, data, "capacity {capacity}, read cap {read_cap:?}");
        }
    }

    #[test]
    fn non_blocking_empty_read_retries() {
        let pipe = Pipe::new(8);
        pipe.reader().set_input_mode(IoMode::NonBlocking).unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(pipe.reader().read(&mut buf), IoSize::RetryRead);
        assert_eq!(pipe.reader().read(&mut buf), IoSize::RetryRead);
    }

    #[test]
    fn non_blocking_full_write_retries() {
        let pipe = Pipe::new(4);
        pipe.writer().set_output_mode(IoMode::NonBlocking).unwrap();

        assert_eq!(pipe.writer().write(b"abcdef"), IoSize::Bytes(4));
        assert_eq!(pipe.writer().write(b"g"), IoSize::RetryWrite);

        let mut buf = [0u8; 1];
        assert_eq!(pipe.reader().read(&mut buf), IoSize::Bytes(1));
        assert_eq!(pipe.writer().write(b"gh"), IoSize::Bytes(1));
    }

    #[test]
    fn close_unblocks_reader() {
        let pipe = Pipe::new(8);
        let reader = pipe.reader().clone();
        let done = Arc::new(AtomicBool::new(false));
        let done2 = done.clone();

        let handle = thread::spawn(move || {
            let mut buf = [0u8; 8];
            let res = reader.read(&mut buf);
            done2.store(true, Ordering::SeqCst);
            res
        });

        thread::sleep(Duration::from_millis(20));
        assert!(!done.load(Ordering::SeqCst));

        pipe.close();
        assert_eq!(handle.join().unwrap(), IoSize::Bytes(0));
        assert!(pipe.is_closed());
    }

    #[test]
    fn close_unblocks_writer() {
        let pipe = Pipe::new(2);
        assert_eq!(pipe.writer().write(b"xy"), IoSize::Bytes(2));

        let writer = pipe.writer().clone();
        let handle = thread::spawn(move || writer.write(b"z"));

        thread::sleep(Duration::from_millis(20));
        pipe.close();

        assert_eq!(handle.join().unwrap(), IoSize::BrokenPipe);
    }

    #[test]
    fn after_close() {
        let pipe = Pipe::new(8);
        assert_eq!(pipe.writer().write(b"abc"), IoSize::Bytes(3));
        pipe.close();
        pipe.close();

        assert_eq!(pipe.writer().write(b"d"), IoSize::BrokenPipe);

        let mut buf = [0u8; 8];
        assert_eq!(pipe.reader().read(&mut buf), IoSize::Bytes(3));
        assert_eq!(&buf[..3], b"abc");
        assert_eq!(pipe.reader().read(&mut buf), IoSize::Bytes(0));

        let err = pipe
            .writer()
            .suggest_output_action(IoSize::BrokenPipe)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChannelClosed);
    }

    #[test]
    fn max_available_to_read_caps_single_call() {
        let pipe = Pipe::new(16);
        assert_eq!(pipe.writer().write(b"0123456789"), IoSize::Bytes(10));

        pipe.reader().set_max_available_to_read(Some(3));
        let mut buf = [0u8; 10];
        assert_eq!(pipe.reader().read(&mut buf), IoSize::Bytes(3));
        assert_eq!(&buf[..3], b"012");
        // The cap persists.
        assert_eq!(pipe.reader().read(&mut buf), IoSize::Bytes(3));

        pipe.reader().set_max_available_to_read(None);
        assert_eq!(pipe.reader().read(&mut buf), IoSize::Bytes(4));
        assert_eq!(&buf[..4], b"6789");
    }

    #[test]
    fn max_available_to_write_caps_single_call() {
        let pipe = Pipe::new(16);
        pipe.writer().set_max_available_to_write(Some(0));
        assert_eq!(pipe.writer().max_available_to_write(), Some(1));

        pipe.writer().set_max_available_to_write(Some(2));
        assert_eq!(pipe.writer().write(b"hello"), IoSize::Bytes(2));
        assert_eq!(pipe.len(), 2);
    }

    #[test]
    fn suggestions_are_stable() {
        let pipe = Pipe::new(1);

        let a = pipe.reader().suggest_input_action(IoSize::RetryRead).unwrap();
        let b = pipe.reader().clone().suggest_input_action(IoSize::RetryRead).unwrap();

        match (a, b) {
            (Action::WaitReadable(a), Action::WaitReadable(b)) => {
                assert!(a.same_as(&b));
                assert!(a.same_as(pipe.reader().readiness()));
                assert!(!a.same_as(pipe.writer().readiness()));
            }
            v => panic!("unexpected actions {v:?}"),
        }

        assert!(matches!(
            pipe.writer().suggest_output_action(IoSize::RetryWrite),
            Ok(Action::WaitWritable(_))
        ));
        assert!(matches!(
            pipe.reader().suggest_input_action(IoSize::Bytes(1)),
            Ok(Action::Proceed)
        ));
    }

    #[test]
    fn writes_notify_readiness() {
        let pipe = Pipe::new(4);
        let readable = pipe.reader().readiness().clone();
        let writable = pipe.writer().readiness().clone();

        let before = readable.notifications();
        pipe.writer().write(b"ab");
        assert_eq!(readable.notifications(), before + 1);

        let before = writable.notifications();
        pipe.reader().read(&mut [0u8; 1]);
        assert_eq!(writable.notifications(), before + 1);
    }

    #[test]
    fn dropping_last_handle_closes_end() {
        let (reader, writer) = Pipe::new(8).into_split();
        let writer2 = writer.clone();

        writer.write(b"hi");
        drop(writer);
        assert!(!reader.is_closed());
        drop(writer2);
        assert!(reader.is_closed());

        let mut buf = [0u8; 4];
        assert_eq!(reader.read(&mut buf), IoSize::Bytes(2));
        assert_eq!(reader.read(&mut buf), IoSize::Bytes(0));

        let (reader, writer) = Pipe::new(8).into_split();
        drop(reader);
        assert_eq!(writer.write(b"x"), IoSize::BrokenPipe);
    }

    #[test]
    fn mode_switch_releases_blocked_reader() {
        let pipe = Pipe::new(8);
        let reader = pipe.reader().clone();

        let handle = thread::spawn(move || reader.read(&mut [0u8; 4]));

        thread::sleep(Duration::from_millis(20));
        pipe.reader().set_input_mode(IoMode::NonBlocking).unwrap();

        assert_eq!(handle.join().unwrap(), IoSize::RetryRead);
    }

    #[test]
    fn capacity_from_env_value() {
        assert_eq!(parse_capacity(Some("128".into())), 128);
        assert_eq!(parse_capacity(Some(" 64\n".into())), 64);
        assert_eq!(parse_capacity(Some("lots".into())), DEFAULT_CAPACITY);
        assert_eq!(parse_capacity(None), DEFAULT_CAPACITY);

        assert_eq!(Pipe::new(0).capacity(), 1);
        assert_eq!(PipeBuilder::new().capacity(128).build().capacity(), 128);
    }
}
