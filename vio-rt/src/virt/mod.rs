//! Virtual network
//!
//! This module implements an in-process transport that mimics a network connection without
//! touching any OS primitive: bounded [`Pipe`]s, full-duplex [`Socket`]s composed of two pipes,
//! and named [`Interface`]s to establish connections on.
//!
//! All types support both [`IoMode`](vio::stream::IoMode)s. In blocking mode calls suspend the
//! thread on internal condition variables, while in non-blocking mode they return retry sentinels
//! and hand out per-direction readiness handles for the scheduler to wait on.

pub mod interface;
pub mod pipe;
mod ring;
pub mod socket;

pub use interface::{Interface, Listener};
pub use pipe::{Pipe, PipeBuilder, PipeReader, PipeWriter};
pub use socket::Socket;
