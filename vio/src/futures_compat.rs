use crate::action::{Action, Readiness};
use crate::stream::{InputStream, IoSize, OutputStream, Stream};
use core::pin::Pin;
use core::task::{Context, Poll};
use futures::io::{AsyncRead, AsyncWrite};
use std::io::Result;

/// `futures::io` adapter returned by [`FuturesCompat::compat`].
///
/// Flushing and closing the adapter are no-ops. Streams do not buffer writes, and shutting a
/// stream down is done through the stream itself (for instance `Socket::close`), so that the peer
/// observes end of stream.
pub struct Compat<'a, Io: ?Sized> {
    io: &'a Io,
    read_armed: Option<Readiness>,
    write_armed: Option<Readiness>,
}

/// Bridges vio streams with futures.
///
/// Streams should be switched to [`IoMode::NonBlocking`](crate::stream::IoMode) beforehand,
/// otherwise polling may block the executor thread.
///
/// # Examples
///
/// ```rust
/// use futures::io::AsyncReadExt;
/// use vio::file::FileInputStream;
/// use vio::futures_compat::FuturesCompat;
///
/// let mut path = std::env::temp_dir();
/// path.push("vio-compat-doc");
/// std::fs::write(&path, b"hello").unwrap();
///
/// let stream = FileInputStream::open(&path).unwrap();
///
/// vio::poller::block_on(async {
///     let mut out = vec![];
///     stream.compat().read_to_end(&mut out).await.unwrap();
///     assert_eq!(out, b"hello");
/// });
/// ```
pub trait FuturesCompat {
    fn compat(&self) -> Compat<'_, Self> {
        Compat {
            io: self,
            read_armed: None,
            write_armed: None,
        }
    }
}

impl<Io: ?Sized + Stream> FuturesCompat for Io {}

enum Step {
    Ready(Result<usize>),
    Retry,
    Pending,
}

/// Turn a suggested action into a poll step.
///
/// Waiting actions register the task waker and re-check the stream once before returning
/// pending, so that notifications issued in between are not lost.
fn step(
    action: crate::error::Result<Action>,
    armed: &mut Option<Readiness>,
    cx: &Context,
) -> Step {
    match action {
        Err(e) => Step::Ready(Err(e.into())),
        Ok(Action::Proceed) => Step::Retry,
        Ok(Action::RepeatImmediately) => {
            cx.waker().wake_by_ref();
            Step::Pending
        }
        Ok(Action::WaitReadable(handle)) | Ok(Action::WaitWritable(handle)) => {
            match armed.take() {
                Some(prev) if prev.same_as(&handle) => Step::Pending,
                _ => {
                    handle.register(cx.waker());
                    *armed = Some(handle);
                    Step::Retry
                }
            }
        }
    }
}

impl<'a, Io: ?Sized + InputStream> AsyncRead for Compat<'a, Io> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context, buf: &mut [u8]) -> Poll<Result<usize>> {
        let this = self.get_mut();

        loop {
            let res = match this.io.read(buf) {
                IoSize::Bytes(n) => {
                    this.read_armed = None;
                    return Poll::Ready(Ok(n));
                }
                IoSize::Error(e) => return Poll::Ready(Err(e.into())),
                res => res,
            };

            match step(this.io.suggest_input_action(res), &mut this.read_armed, cx) {
                Step::Ready(v) => return Poll::Ready(v),
                Step::Retry => continue,
                Step::Pending => return Poll::Pending,
            }
        }
    }
}

impl<'a, Io: ?Sized + OutputStream> AsyncWrite for Compat<'a, Io> {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context, buf: &[u8]) -> Poll<Result<usize>> {
        let this = self.get_mut();

        loop {
            let res = match this.io.write(buf) {
                IoSize::Bytes(n) => {
                    this.write_armed = None;
                    return Poll::Ready(Ok(n));
                }
                IoSize::Error(e) => return Poll::Ready(Err(e.into())),
                res => res,
            };

            match step(this.io.suggest_output_action(res), &mut this.write_armed, cx) {
                Step::Ready(v) => return Poll::Ready(v),
                Step::Retry => continue,
                Step::Pending => return Poll::Pending,
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _: &mut Context) -> Poll<Result<()>> {
        // Streams do not buffer on the writer side.
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _: &mut Context) -> Poll<Result<()>> {
        // The adapter only borrows the stream, it can not close it.
        Poll::Ready(Ok(()))
    }
}
