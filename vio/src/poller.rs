//! Thread based driver for the action protocol.
//!
//! This is the simplest possible scheduler: the calling thread itself is the unit of work being
//! suspended. It parks whenever a stream suggests waiting on a [`Readiness`] handle and gets
//! unparked by the backend's notification. Cooperative executors should use
//! [`futures_compat`](crate::futures_compat) instead.

use crate::action::{Action, Readiness};
use crate::error::{Error, ErrorSpecify, Location, Result, State, Subject};
use crate::stream::{InputStream, IoSize, OutputStream};
use core::future::Future;
use core::task::{Context, Poll, Waker};
use std::sync::Arc;
use std::task::Wake;
use std::thread::{self, Thread};

struct ThreadWaker(Thread);

impl Wake for ThreadWaker {
    fn wake(self: Arc<Self>) {
        self.0.unpark();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.0.unpark();
    }
}

fn thread_waker() -> Waker {
    Arc::new(ThreadWaker(thread::current())).into()
}

/// Block the thread until the future is ready.
///
/// # Example
///
/// ```
/// let my_fut = async { 42 };
/// assert_eq!(vio::poller::block_on(my_fut), 42);
/// ```
pub fn block_on<F: Future>(fut: F) -> F::Output {
    let mut fut = core::pin::pin!(fut);
    let waker = thread_waker();
    let mut context = Context::from_waker(&waker);

    loop {
        match fut.as_mut().poll(&mut context) {
            Poll::Pending => thread::park(),
            Poll::Ready(item) => break item,
        }
    }
}

/// Tracks registration state of a single suspended call.
struct Waiter {
    waker: Waker,
    armed: Option<Readiness>,
}

impl Waiter {
    fn new() -> Self {
        Self {
            waker: thread_waker(),
            armed: None,
        }
    }

    fn wait(&mut self, action: Action) {
        match action {
            Action::Proceed => self.armed = None,
            Action::RepeatImmediately => {
                self.armed = None;
                thread::yield_now();
            }
            Action::WaitReadable(handle) | Action::WaitWritable(handle) => {
                match self.armed.take() {
                    // We registered and re-checked already, any notification since then has
                    // unparked us (or will).
                    Some(armed) if armed.same_as(&handle) => thread::park(),
                    // Register first, then let the caller re-check the condition once, so that no
                    // notification is lost between the failed call and the registration.
                    _ => {
                        handle.register(&self.waker);
                        self.armed = Some(handle);
                    }
                }
            }
        }
    }
}

/// Re-invoke `op` until it transfers bytes or fails terminally.
///
/// `suggest` maps a sentinel to the scheduling action, usually one of the stream's
/// `suggest_*_action` functions. A byte count is returned as is, including `0`.
pub fn drive(
    mut op: impl FnMut() -> IoSize,
    mut suggest: impl FnMut(IoSize) -> Result<Action>,
) -> Result<usize> {
    let mut waiter = Waiter::new();

    loop {
        match op() {
            IoSize::Bytes(n) => return Ok(n),
            IoSize::Error(e) => return Err(e),
            res => waiter.wait(suggest(res)?),
        }
    }
}

/// Read into `buf`, suspending the thread on would-block conditions.
pub fn read<S: InputStream + ?Sized>(stream: &S, buf: &mut [u8]) -> Result<usize> {
    drive(|| stream.read(buf), |res| stream.suggest_input_action(res))
}

/// Write from `buf`, suspending the thread on would-block conditions.
pub fn write<S: OutputStream + ?Sized>(stream: &S, buf: &[u8]) -> Result<usize> {
    drive(|| stream.write(buf), |res| stream.suggest_output_action(res))
}

/// Fill the whole `buf`, looping on short reads.
///
/// Fails with `UnexpectedEof` if the stream ends first.
pub fn read_exact<S: InputStream + ?Sized>(stream: &S, mut buf: &mut [u8]) -> Result<()> {
    while !buf.is_empty() {
        match read(stream, buf)? {
            0 => {
                return Err(Error::new(
                    Subject::Input,
                    State::UnexpectedEof,
                    Location::Scheduler,
                ))
            }
            n => buf = &mut buf[n..],
        }
    }
    Ok(())
}

/// Write the whole `buf`, looping on short writes.
pub fn write_all<S: OutputStream + ?Sized>(stream: &S, mut buf: &[u8]) -> Result<()> {
    while !buf.is_empty() {
        match write(stream, buf).subject(Subject::Output)? {
            0 => return Err(Error::new(Subject::Output, State::Nop, Location::Scheduler)),
            n => buf = &buf[n..],
        }
    }
    Ok(())
}

/// Read until end of stream, appending to `out`.
pub fn read_to_end<S: InputStream + ?Sized>(stream: &S, out: &mut Vec<u8>) -> Result<usize> {
    let mut chunk = [0u8; 1024];
    let mut total = 0;
    loop {
        match read(stream, &mut chunk)? {
            0 => return Ok(total),
            n => {
                out.extend_from_slice(&chunk[..n]);
                total += n;
            }
        }
    }
}
