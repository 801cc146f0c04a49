//! File backed streams.
//!
//! Files have no readiness primitive the scheduler could wait on. Thus these streams only support
//! [`IoMode::Blocking`], and suggest [`Action::RepeatImmediately`] whenever a call made no
//! progress without failing.

use crate::action::Action;
use crate::error::{Error, ErrorSpecify, Location, Result, State, Subject};
use crate::stream::{InputStream, IoMode, IoSize, OutputStream, Stream};
use core::mem::ManuallyDrop;
use log::*;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;

fn unsupported_mode() -> Error {
    Error::new(Subject::Mode, State::Unsupported, Location::Filesystem)
}

fn set_mode(mode: IoMode) -> Result<()> {
    match mode {
        IoMode::Blocking => Ok(()),
        IoMode::NonBlocking => Err(unsupported_mode()),
    }
}

fn to_io_size(res: io::Result<usize>, retry: IoSize) -> IoSize {
    match res {
        Ok(n) => IoSize::Bytes(n),
        Err(e) => match e.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => retry,
            io::ErrorKind::BrokenPipe => IoSize::BrokenPipe,
            _ => IoSize::Error(Error::from(e).location(Location::Filesystem)),
        },
    }
}

fn suggest(result: IoSize, subject: Subject) -> Result<Action> {
    match result {
        IoSize::Bytes(0) | IoSize::RetryRead | IoSize::RetryWrite => Ok(Action::RepeatImmediately),
        IoSize::Bytes(_) => Ok(Action::Proceed),
        IoSize::BrokenPipe => Err(Error::new(subject, State::BrokenPipe, Location::Filesystem)),
        IoSize::Error(e) => Err(e),
    }
}

/// File handle that may or may not be closed on drop.
struct Handle {
    file: ManuallyDrop<File>,
    owns_file: bool,
}

impl Handle {
    fn new(file: File, owns_file: bool) -> Self {
        Self {
            file: ManuallyDrop::new(file),
            owns_file,
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if self.owns_file {
            // SAFETY: the file is never accessed after this point.
            unsafe { ManuallyDrop::drop(&mut self.file) };
        } else {
            trace!("Leaving borrowed file handle open");
        }
    }
}

/// Input stream over a [`File`].
pub struct FileInputStream {
    handle: Handle,
}

impl FileInputStream {
    /// Wrap a file.
    ///
    /// If `owns_file` is `false`, the file handle is not closed when this stream is dropped, and
    /// the caller stays responsible for its lifetime.
    pub fn new(file: File, owns_file: bool) -> Self {
        Self {
            handle: Handle::new(file, owns_file),
        }
    }

    /// Open a file for reading. The stream owns the handle.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::from(e).subject(Subject::File))?;
        Ok(Self::new(file, true))
    }

    pub fn file(&self) -> &File {
        &self.handle.file
    }

    pub fn owns_file(&self) -> bool {
        self.handle.owns_file
    }
}

impl Stream for FileInputStream {}

impl InputStream for FileInputStream {
    fn read(&self, buf: &mut [u8]) -> IoSize {
        to_io_size((&*self.handle.file).read(buf), IoSize::RetryRead)
    }

    fn set_input_mode(&self, mode: IoMode) -> Result<()> {
        set_mode(mode)
    }

    fn input_mode(&self) -> IoMode {
        IoMode::Blocking
    }

    fn suggest_input_action(&self, result: IoSize) -> Result<Action> {
        suggest(result, Subject::Input)
    }
}

/// Output stream over a [`File`].
pub struct FileOutputStream {
    handle: Handle,
}

impl FileOutputStream {
    /// Wrap a file.
    ///
    /// If `owns_file` is `false`, the file handle is not closed when this stream is dropped.
    pub fn new(file: File, owns_file: bool) -> Self {
        Self {
            handle: Handle::new(file, owns_file),
        }
    }

    /// Create a new file, or truncate an existing one.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, OpenOptions::new().write(true).create(true).truncate(true))
    }

    /// Open a file for appending, creating it if needed.
    pub fn append(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, OpenOptions::new().append(true).create(true))
    }

    fn open_with(path: impl AsRef<Path>, options: &OpenOptions) -> Result<Self> {
        let file = options
            .open(path)
            .map_err(|e| Error::from(e).subject(Subject::File))?;
        Ok(Self::new(file, true))
    }

    pub fn file(&self) -> &File {
        &self.handle.file
    }

    pub fn owns_file(&self) -> bool {
        self.handle.owns_file
    }

    /// Flush OS level buffers of the underlying file.
    pub fn flush(&self) -> Result<()> {
        (&*self.handle.file).flush().map_err(Error::from)
    }
}

impl Stream for FileOutputStream {}

impl OutputStream for FileOutputStream {
    fn write(&self, buf: &[u8]) -> IoSize {
        to_io_size((&*self.handle.file).write(buf), IoSize::RetryWrite)
    }

    fn set_output_mode(&self, mode: IoMode) -> Result<()> {
        set_mode(mode)
    }

    fn output_mode(&self) -> IoMode {
        IoMode::Blocking
    }

    fn suggest_output_action(&self, result: IoSize) -> Result<Action> {
        suggest(result, Subject::Output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::poller;
    use tempdir::TempDir;

    #[test]
    fn write_then_read() {
        let dir = TempDir::new("vio-file").unwrap();
        let path = dir.path().join("data.bin");

        let out = FileOutputStream::create(&path).unwrap();
        poller::write_all(&out, b"file stream contents").unwrap();
        out.flush().unwrap();
        drop(out);

        let input = FileInputStream::open(&path).unwrap();
        let mut data = vec![];
        poller::read_to_end(&input, &mut data).unwrap();
        assert_eq!(data, b"file stream contents");
    }

    #[test]
    fn append_extends() {
        let dir = TempDir::new("vio-file").unwrap();
        let path = dir.path().join("log.txt");

        poller::write_all(&FileOutputStream::create(&path).unwrap(), b"a").unwrap();
        poller::write_all(&FileOutputStream::append(&path).unwrap(), b"b").unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"ab");
    }

    #[test]
    fn non_blocking_is_unsupported() {
        let dir = TempDir::new("vio-file").unwrap();
        let out = FileOutputStream::create(dir.path().join("x")).unwrap();

        let err = out.set_output_mode(IoMode::NonBlocking).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
        assert_eq!(out.output_mode(), IoMode::Blocking);
        out.set_output_mode(IoMode::Blocking).unwrap();
    }

    #[test]
    fn suggestions() {
        let dir = TempDir::new("vio-file").unwrap();
        std::fs::write(dir.path().join("x"), b"").unwrap();
        let input = FileInputStream::open(dir.path().join("x")).unwrap();

        assert!(matches!(
            input.suggest_input_action(IoSize::Bytes(0)),
            Ok(Action::RepeatImmediately)
        ));
        assert!(matches!(
            input.suggest_input_action(IoSize::Bytes(4)),
            Ok(Action::Proceed)
        ));
        assert!(input.suggest_input_action(IoSize::BrokenPipe).is_err());
    }

    #[test]
    fn missing_file() {
        let dir = TempDir::new("vio-file").unwrap();
        let err = FileInputStream::open(dir.path().join("nope")).err().unwrap();
        assert_eq!(err.state, State::NotFound);
        assert_eq!(err.subject, Subject::File);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn owned_handle_closes_on_drop() {
        use std::os::fd::AsRawFd;

        let dir = TempDir::new("vio-file").unwrap();
        let file = File::create(dir.path().join("owned")).unwrap();
        let path = dir.path().join("owned").canonicalize().unwrap();
        let link = format!("/proc/self/fd/{}", file.as_raw_fd());
        assert_eq!(std::fs::read_link(&link).unwrap(), path);

        let out = FileOutputStream::new(file, true);
        assert!(out.owns_file());
        poller::write_all(&out, b"owned").unwrap();
        drop(out);

        // The descriptor number may be reused by another test, but not for our file.
        assert_ne!(std::fs::read_link(&link).ok(), Some(path.clone()));
        assert_eq!(std::fs::read(&path).unwrap(), b"owned");
    }

    #[cfg(unix)]
    #[test]
    fn borrowed_handle_stays_open() {
        use std::os::fd::{AsRawFd, FromRawFd};

        let _ = env_logger::builder().is_test(true).try_init();

        let dir = TempDir::new("vio-file").unwrap();
        let path = dir.path().join("shared");
        let file = File::create(&path).unwrap();
        let fd = file.as_raw_fd();

        let out = FileOutputStream::new(file, false);
        assert!(!out.owns_file());
        poller::write_all(&out, b"one").unwrap();
        drop(out);

        // SAFETY: the stream did not own the descriptor, so it is still open and unowned.
        let file = unsafe { File::from_raw_fd(fd) };
        (&file).write_all(b"two").unwrap();
        drop(file);

        assert_eq!(std::fs::read(&path).unwrap(), b"onetwo");
    }
}
