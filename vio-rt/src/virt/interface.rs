//! Named rendezvous points for virtual connections.
//!
//! An [`Interface`] plays the role of a network address. A server binds a [`Listener`] to it, and
//! clients [`connect`](Interface::connect) to obtain one half of a fresh [`Socket`] pair, while
//! the other half is queued for the listener to accept.

use core::fmt;
use core::time::Duration;
use log::*;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use vio::error::{Result, State, Subject};

use super::pipe::PipeBuilder;
use super::socket::Socket;
use crate::util::net_err;

static INTERFACES: Lazy<Mutex<HashMap<String, Weak<Interface>>>> = Lazy::new(Default::default);

struct Config {
    pipe: PipeBuilder,
    max_available_to_read: Option<usize>,
    max_available_to_write: Option<usize>,
}

/// Named virtual network interface.
///
/// Interfaces are registered process-wide: obtaining the same name twice yields the same
/// instance, for as long as someone keeps a reference to it.
///
/// ```
/// use vio::poller;
/// use vio_rt::virt::Interface;
///
/// let iface = Interface::obtain("doc-iface");
/// let listener = iface.bind().unwrap();
///
/// let client = iface.connect().unwrap();
/// let server = listener.accept().unwrap();
///
/// poller::write_all(&client, b"hi").unwrap();
///
/// let mut buf = [0; 2];
/// poller::read_exact(&server, &mut buf).unwrap();
/// assert_eq!(&buf, b"hi");
/// ```
pub struct Interface {
    name: String,
    acceptor: Mutex<Option<flume::Sender<Socket>>>,
    config: Mutex<Config>,
}

impl fmt::Debug for Interface {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Interface")
            .field("name", &self.name)
            .field("bound", &self.is_bound())
            .finish()
    }
}

impl Interface {
    /// Get the interface registered under `name`, creating it if needed.
    pub fn obtain(name: &str) -> Arc<Self> {
        let mut interfaces = INTERFACES.lock();

        if let Some(iface) = interfaces.get(name).and_then(Weak::upgrade) {
            return iface;
        }

        debug!("Creating interface {name}");

        let iface = Arc::new(Self {
            name: name.into(),
            acceptor: Mutex::new(None),
            config: Mutex::new(Config {
                pipe: PipeBuilder::env(),
                max_available_to_read: None,
                max_available_to_write: None,
            }),
        });

        interfaces.insert(name.into(), Arc::downgrade(&iface));

        iface
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start accepting connections on this interface.
    ///
    /// Only one listener may be bound at a time, a second bind fails with `InUse` until the first
    /// listener is dropped.
    pub fn bind(self: &Arc<Self>) -> Result<Listener> {
        let mut acceptor = self.acceptor.lock();

        if acceptor.is_some() {
            return Err(net_err(Subject::Interface, State::InUse));
        }

        let (tx, rx) = flume::unbounded();
        *acceptor = Some(tx);

        debug!("Interface {}: listener bound", self.name);

        Ok(Listener {
            iface: self.clone(),
            rx,
        })
    }

    /// Returns `true` if a listener is bound.
    pub fn is_bound(&self) -> bool {
        self.acceptor.lock().is_some()
    }

    /// Connect to the listener bound on this interface.
    ///
    /// Fails with `Refused` if nothing is bound.
    pub fn connect(&self) -> Result<Socket> {
        let acceptor = self
            .acceptor
            .lock()
            .clone()
            .ok_or_else(|| net_err(Subject::Connection, State::Refused))?;

        let (client, server) = {
            let config = self.config.lock();
            let pipe = config.pipe.clone();
            let (client, server) = Socket::pair_with(pipe.clone().build(), pipe.build());

            for socket in [&client, &server] {
                socket.set_max_available_to_read_write(
                    config.max_available_to_read,
                    config.max_available_to_write,
                );
            }

            (client, server)
        };

        // The listener may have gone away in between, the unsent socket is dropped and closed.
        acceptor
            .send(server)
            .map_err(|_| net_err(Subject::Connection, State::Refused))?;

        trace!("Interface {}: connected", self.name);

        Ok(client)
    }

    /// Cap single read and write transfers of sockets created from now on.
    pub fn set_max_available(&self, to_read: Option<usize>, to_write: Option<usize>) {
        let mut config = self.config.lock();
        config.max_available_to_read = to_read;
        config.max_available_to_write = to_write;
    }

    /// Set the per-direction buffer capacity of sockets created from now on.
    pub fn set_pipe_capacity(&self, capacity: usize) {
        let mut config = self.config.lock();
        config.pipe = config.pipe.clone().capacity(capacity);
    }
}

impl Drop for Interface {
    fn drop(&mut self) {
        let mut interfaces = INTERFACES.lock();
        // The name may have been re-registered by a newer instance already.
        if interfaces
            .get(&self.name)
            .map_or(false, |w| w.strong_count() == 0)
        {
            interfaces.remove(&self.name);
        }
    }
}

/// Accepting side of an [`Interface`].
///
/// Dropping the listener unbinds it, and closes connections that were never accepted.
pub struct Listener {
    iface: Arc<Interface>,
    rx: flume::Receiver<Socket>,
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Listener")
            .field("interface", &self.iface.name)
            .field("pending", &self.rx.len())
            .finish()
    }
}

impl Listener {
    pub fn interface(&self) -> &Arc<Interface> {
        &self.iface
    }

    /// Wait for the next connection.
    pub fn accept(&self) -> Result<Socket> {
        self.rx
            .recv()
            .map_err(|_| net_err(Subject::Listener, State::Aborted))
    }

    /// Accept a queued connection without waiting. Returns `None` if there is none.
    pub fn try_accept(&self) -> Option<Socket> {
        self.rx.try_recv().ok()
    }

    /// Wait for the next connection, for at most `timeout`.
    pub fn accept_timeout(&self, timeout: Duration) -> Result<Socket> {
        self.rx.recv_timeout(timeout).map_err(|e| match e {
            flume::RecvTimeoutError::Timeout => net_err(Subject::Listener, State::Timeout),
            flume::RecvTimeoutError::Disconnected => net_err(Subject::Listener, State::Aborted),
        })
    }

    /// Wait for the next connection without blocking the thread.
    pub async fn accept_async(&self) -> Result<Socket> {
        self.rx
            .recv_async()
            .await
            .map_err(|_| net_err(Subject::Listener, State::Aborted))
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        *self.iface.acceptor.lock() = None;

        let pending = self.rx.drain().count();

        if pending > 0 {
            warn!(
                "Interface {}: closing {pending} unaccepted connections",
                self.iface.name
            );
        }

        debug!("Interface {}: listener unbound", self.iface.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use vio::error::ErrorKind;
    use vio::poller;
    use vio::stream::{InputStream, IoSize, OutputStream};

    #[test]
    fn obtain_is_shared() {
        let a = Interface::obtain("iface-shared");
        let b = Interface::obtain("iface-shared");
        assert!(Arc::ptr_eq(&a, &b));

        let c = Interface::obtain("iface-other");
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn single_listener() {
        let iface = Interface::obtain("iface-single");
        let listener = iface.bind().unwrap();

        let err = iface.bind().unwrap_err();
        assert_eq!(err.state, State::InUse);

        drop(listener);
        assert!(!iface.is_bound());
        iface.bind().unwrap();
    }

    #[test]
    fn connect_refused_without_listener() {
        let iface = Interface::obtain("iface-refused");
        let err = iface.connect().unwrap_err();
        assert_eq!(err.state, State::Refused);
        assert_eq!(err.subject, Subject::Connection);
    }

    #[test]
    fn accept_and_talk() {
        let _ = env_logger::builder().is_test(true).try_init();

        let iface = Interface::obtain("iface-talk");
        let listener = iface.bind().unwrap();

        let server = thread::spawn(move || {
            let socket = listener.accept().unwrap();
            let mut buf = [0u8; 4];
            poller::read_exact(&socket, &mut buf).unwrap();
            poller::write_all(&socket, &buf).unwrap();
        });

        let client = Interface::obtain("iface-talk").connect().unwrap();
        poller::write_all(&client, b"echo").unwrap();

        let mut out = vec![];
        server.join().unwrap();
        // The server socket was dropped, so the stream ends after the echo.
        poller::read_to_end(&client, &mut out).unwrap();
        assert_eq!(out, b"echo");
    }

    #[test]
    fn accept_timeout_and_try_accept() {
        let iface = Interface::obtain("iface-timeout");
        let listener = iface.bind().unwrap();

        assert!(listener.try_accept().is_none());
        let err = listener
            .accept_timeout(Duration::from_millis(10))
            .unwrap_err();
        assert_eq!(err.state, State::Timeout);

        let _client = iface.connect().unwrap();
        assert!(listener.try_accept().is_some());
    }

    #[test]
    fn unaccepted_connections_close_on_unbind() {
        let iface = Interface::obtain("iface-unbind");
        let listener = iface.bind().unwrap();

        let client = iface.connect().unwrap();
        drop(listener);

        let mut buf = [0u8; 4];
        assert_eq!(client.read(&mut buf), IoSize::Bytes(0));
        assert_eq!(client.write(b"x"), IoSize::BrokenPipe);

        let err = client.suggest_output_action(IoSize::BrokenPipe).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChannelClosed);
    }

    #[test]
    fn caps_apply_to_new_sockets() {
        let iface = Interface::obtain("iface-caps");
        let listener = iface.bind().unwrap();
        iface.set_pipe_capacity(32);
        iface.set_max_available(None, Some(2));

        let client = iface.connect().unwrap();
        let server = listener.accept().unwrap();

        assert_eq!(client.write(b"abcd"), IoSize::Bytes(2));
        assert_eq!(server.write(b"abcd"), IoSize::Bytes(2));
    }

    #[test]
    fn async_accept() {
        let iface = Interface::obtain("iface-async");
        let listener = iface.bind().unwrap();
        let _client = iface.connect().unwrap();

        let socket = pollster::block_on(listener.accept_async()).unwrap();
        assert!(!socket.is_closed());
    }
}
