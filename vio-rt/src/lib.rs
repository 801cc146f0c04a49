//! # vio-rt
//!
//! Transports implementing the [`vio`] stream contract.
//!
//! Currently this crate provides the [`virt`] network, which is useful for testing protocol code
//! deterministically, and for connecting components living in the same process.
//!
//! ```
//! use vio::poller;
//! use vio_rt::virt::Socket;
//!
//! let (client, server) = Socket::pair(8);
//!
//! let writer = std::thread::spawn(move || {
//!     poller::write_all(&client, b"larger than the pipe").unwrap();
//! });
//!
//! let mut out = vec![];
//! poller::read_to_end(&server, &mut out).unwrap();
//! writer.join().unwrap();
//!
//! assert_eq!(out, b"larger than the pipe");
//! ```

mod util;
pub mod virt;
