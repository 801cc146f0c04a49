//! # vio
//!
//! ## Uniform byte streams with explicit scheduling
//!
//! vio defines the read/write contract every transport implements, be it a file, a real socket,
//! or an in-process virtual connection. It aims to make the following aspects of stream I/O
//! uniform across backends:
//!
//! 1. Partial progress
//! 2. Blocking and non-blocking modes
//! 3. Resumption of suspended callers
//!
//! Instead of language-level suspension, every I/O result ([`IoSize`](stream::IoSize)) can be
//! turned into an [`Action`](action::Action) by the stream that produced it. The action tells the
//! scheduler whether to retry right away, to yield once, or to wait on a readiness handle. Any
//! concurrency model can drive this: plain threads ([`poller`]), futures executors
//! ([`futures_compat`]), or custom cooperative schedulers.
//!
//! ```
//! use vio::action::Action;
//! use vio::file::FileOutputStream;
//! use vio::stream::{IoSize, OutputStream};
//!
//! let mut path = std::env::temp_dir();
//! path.push("vio-lib-doc");
//!
//! let out = FileOutputStream::create(&path).unwrap();
//!
//! let res = out.write(b"bytes");
//! assert_eq!(res, IoSize::Bytes(5));
//! assert!(matches!(out.suggest_output_action(res), Ok(Action::Proceed)));
//! ```

pub mod action;
pub mod error;
pub mod file;
pub mod futures_compat;
pub mod poller;
pub mod stream;

#[cfg(test)]
mod sample;

pub use action::{Action, Readiness};
pub use error::{Error, ErrorKind, Result};
pub use stream::{Direction, InputStream, IoMode, IoSize, IoStream, OutputStream, Stream};
