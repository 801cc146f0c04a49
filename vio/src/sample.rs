//! Non-blocking in-memory stream used by tests.

use crate::action::{Action, Readiness};
use crate::error::{Location, Result, Subject};
use crate::stream::{suggest_with, InputStream, IoMode, IoSize, OutputStream, Stream};
use crate::vioerr;
use parking_lot::Mutex;
use std::collections::VecDeque;

#[derive(Default)]
struct State {
    input: VecDeque<u8>,
    written: Vec<u8>,
    finished: bool,
    max_chunk: Option<usize>,
}

#[derive(Default)]
pub struct SampleStream {
    state: Mutex<State>,
    readable: Readiness,
}

impl SampleStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&self, data: &[u8]) {
        self.state.lock().input.extend(data);
        self.readable.notify();
    }

    pub fn finish(&self) {
        self.state.lock().finished = true;
        self.readable.notify();
    }

    pub fn set_max_chunk(&self, max: usize) {
        self.state.lock().max_chunk = Some(max);
    }

    pub fn written(&self) -> Vec<u8> {
        self.state.lock().written.clone()
    }

    pub fn readiness(&self) -> &Readiness {
        &self.readable
    }
}

impl Stream for SampleStream {}

impl InputStream for SampleStream {
    fn read(&self, buf: &mut [u8]) -> IoSize {
        let mut state = self.state.lock();
        let n = buf
            .len()
            .min(state.input.len())
            .min(state.max_chunk.unwrap_or(usize::MAX));

        if n == 0 && !buf.is_empty() && !state.finished {
            return IoSize::RetryRead;
        }

        for (dst, src) in buf.iter_mut().zip(state.input.drain(..n)) {
            *dst = src;
        }

        IoSize::Bytes(n)
    }

    fn set_input_mode(&self, mode: IoMode) -> Result<()> {
        match mode {
            IoMode::NonBlocking => Ok(()),
            IoMode::Blocking => Err(vioerr!(Mode, Unsupported, Core)),
        }
    }

    fn input_mode(&self) -> IoMode {
        IoMode::NonBlocking
    }

    fn suggest_input_action(&self, result: IoSize) -> Result<Action> {
        suggest_with(result, Subject::Input, Location::Core, || {
            Action::WaitReadable(self.readable.clone())
        })
    }
}

impl OutputStream for SampleStream {
    fn write(&self, buf: &[u8]) -> IoSize {
        let mut state = self.state.lock();

        if state.finished {
            return IoSize::BrokenPipe;
        }

        let n = buf.len().min(state.max_chunk.unwrap_or(usize::MAX));
        state.written.extend_from_slice(&buf[..n]);

        IoSize::Bytes(n)
    }

    fn set_output_mode(&self, mode: IoMode) -> Result<()> {
        self.set_input_mode(mode)
    }

    fn output_mode(&self) -> IoMode {
        IoMode::NonBlocking
    }

    fn suggest_output_action(&self, result: IoSize) -> Result<Action> {
        suggest_with(result, Subject::Output, Location::Core, || {
            Action::RepeatImmediately
        })
    }
}
