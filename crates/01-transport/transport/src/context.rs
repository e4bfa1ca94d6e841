//! In-process context: socket table, endpoint registry, and message routing.
//!
//! All sockets of a context share one state block behind a `parking_lot`
//! mutex. Blocking calls park on the context's condition variable and are woken
//! whenever queue state changes or the context is terminated.
//!
//! Message content is never dropped while the state lock is held: a free
//! callback is caller code and may call back into the context.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use log::{debug, trace, warn};
use parking_lot::{Condvar, Mutex, MutexGuard};
use smallvec::SmallVec;

use crate::error::{Errno, Status};
use crate::msg::{payload_bytes, Payload, RawMsg};
use crate::options::{OptionName, OptionValue, SocketOptions};
use crate::socket::{parse_endpoint, Flags, SocketHandle, SocketKind};

/// Tunables for a [`Context`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContextConfig {
    /// High-water mark given to new sockets; `0` means unbounded.
    pub default_hwm: u64,
    /// Largest message accepted by `send`.
    pub max_msg_size: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            default_hwm: 1000,
            max_msg_size: 64 * 1024 * 1024,
        }
    }
}

struct Queued {
    from: u32,
    payload: Payload,
}

struct SocketState {
    kind: SocketKind,
    options: SocketOptions,
    peers: SmallVec<[u32; 4]>,
    endpoints: SmallVec<[String; 1]>,
    inbox: VecDeque<Queued>,
    next_peer: usize,
}

impl SocketState {
    fn new(kind: SocketKind, hwm: u64) -> Self {
        Self {
            kind,
            options: SocketOptions::new(hwm),
            peers: SmallVec::new(),
            endpoints: SmallVec::new(),
            inbox: VecDeque::new(),
            next_peer: 0,
        }
    }

    fn queued_from(&self, sender: u32) -> usize {
        self.inbox.iter().filter(|q| q.from == sender).count()
    }
}

/// Smaller non-zero high-water mark of the two ends; `None` when unbounded.
fn pipe_limit(sender_hwm: u64, receiver_hwm: u64) -> Option<u64> {
    match (sender_hwm, receiver_hwm) {
        (0, 0) => None,
        (0, hwm) | (hwm, 0) => Some(hwm),
        (a, b) => Some(a.min(b)),
    }
}

#[derive(Default)]
struct State {
    sockets: HashMap<u32, SocketState>,
    endpoints: HashMap<String, u32>,
    next_handle: u32,
    terminated: bool,
}

impl State {
    fn socket(&self, handle: SocketHandle) -> Result<&SocketState, Errno> {
        self.sockets.get(&handle.as_raw()).ok_or(Errno::ENOTSOCK)
    }

    fn socket_mut(&mut self, handle: SocketHandle) -> Result<&mut SocketState, Errno> {
        self.sockets.get_mut(&handle.as_raw()).ok_or(Errno::ENOTSOCK)
    }

    fn has_room(&self, sender: u32, sender_hwm: u64, peer: u32) -> bool {
        let Some(receiver) = self.sockets.get(&peer) else {
            return false;
        };
        match pipe_limit(sender_hwm, receiver.options.hwm) {
            Some(limit) => (receiver.queued_from(sender) as u64) < limit,
            None => true,
        }
    }

    fn enqueue(&mut self, sender: u32, peer: u32, payload: Payload) {
        if let Some(receiver) = self.sockets.get_mut(&peer) {
            receiver.inbox.push_back(Queued {
                from: sender,
                payload,
            });
        }
    }

    /// Hands `payload` to the next peer, round-robin, that has room.
    fn route(&mut self, sender: u32, payload: &Payload) -> bool {
        let Some(socket) = self.sockets.get(&sender) else {
            return false;
        };
        let hwm = socket.options.hwm;
        let peers = socket.peers.clone();
        let start = socket.next_peer;

        let count = peers.len();
        for offset in 0..count {
            let idx = (start + offset) % count;
            let peer = peers[idx];
            if self.has_room(sender, hwm, peer) {
                self.enqueue(sender, peer, payload.clone());
                if let Some(socket) = self.sockets.get_mut(&sender) {
                    socket.next_peer = idx + 1;
                }
                return true;
            }
        }
        false
    }
}

struct Shared {
    config: ContextConfig,
    state: Mutex<State>,
    wakeup: Condvar,
}

impl Drop for Shared {
    fn drop(&mut self) {
        let open = self.state.get_mut().sockets.len();
        if open > 0 {
            warn!("context dropped with {open} socket(s) still open");
        }
    }
}

/// Handle to an in-process transport context.
///
/// Cloning the handle shares the same socket table. The context lives until the
/// last clone is dropped.
#[derive(Clone)]
pub struct Context {
    shared: Arc<Shared>,
}

impl Context {
    /// Creates a context with default tunables.
    pub fn new() -> Self {
        Self::with_config(ContextConfig::default())
    }

    /// Creates a context with explicit tunables.
    pub fn with_config(config: ContextConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(State {
                    next_handle: 1,
                    ..State::default()
                }),
                wakeup: Condvar::new(),
            }),
        }
    }

    /// Tunables this context was created with.
    pub fn config(&self) -> ContextConfig {
        self.shared.config
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, Errno> {
        let state = self.shared.state.lock();
        if state.terminated {
            return Err(Errno::ETERM);
        }
        Ok(state)
    }

    /// Creates a socket of the given kind.
    pub fn socket(&self, kind: SocketKind) -> Result<SocketHandle, Errno> {
        let mut state = self.lock()?;
        let raw = state.next_handle;
        state.next_handle = state.next_handle.checked_add(1).ok_or(Errno::ENOMEM)?;
        state
            .sockets
            .insert(raw, SocketState::new(kind, self.shared.config.default_hwm));
        debug!("created {kind:?} socket {raw}");
        Ok(SocketHandle::from_raw(raw))
    }

    /// Binds `socket` to an `inproc://` endpoint.
    pub fn bind(&self, socket: SocketHandle, endpoint: &str) -> Status {
        let name = parse_endpoint(endpoint)?;
        let mut state = self.lock()?;
        state.socket(socket)?;
        if state.endpoints.contains_key(name) {
            return Err(Errno::EADDRINUSE);
        }
        state.endpoints.insert(name.to_owned(), socket.as_raw());
        state.socket_mut(socket)?.endpoints.push(name.to_owned());
        debug!("socket {} bound to {endpoint}", socket.as_raw());
        Ok(())
    }

    /// Connects `socket` to the socket bound at `endpoint`.
    pub fn connect(&self, socket: SocketHandle, endpoint: &str) -> Status {
        let name = parse_endpoint(endpoint)?;
        let mut state = self.lock()?;
        let kind = state.socket(socket)?.kind;
        let bound = *state.endpoints.get(name).ok_or(Errno::ECONNREFUSED)?;
        if bound == socket.as_raw() {
            return Err(Errno::EINVAL);
        }
        let peer_kind = state.sockets.get(&bound).ok_or(Errno::ECONNREFUSED)?.kind;
        if !kind.is_compatible(peer_kind) {
            return Err(Errno::EINVAL);
        }

        let local = state.socket_mut(socket)?;
        if !local.peers.contains(&bound) {
            local.peers.push(bound);
        }
        if let Some(remote) = state.sockets.get_mut(&bound) {
            if !remote.peers.contains(&socket.as_raw()) {
                remote.peers.push(socket.as_raw());
            }
        }
        debug!("socket {} connected to {endpoint}", socket.as_raw());
        self.shared.wakeup.notify_all();
        Ok(())
    }

    /// Closes `socket`, discarding its pending inbound messages.
    ///
    /// Closing is allowed after [`Context::terminate`].
    pub fn close(&self, socket: SocketHandle) -> Status {
        let mut state = self.shared.state.lock();
        let raw = socket.as_raw();
        let closed = state.sockets.remove(&raw).ok_or(Errno::ENOTSOCK)?;
        for name in &closed.endpoints {
            state.endpoints.remove(name);
        }
        for peer in &closed.peers {
            if let Some(remote) = state.sockets.get_mut(peer) {
                remote.peers.retain(|p| *p != raw);
            }
        }
        self.shared.wakeup.notify_all();
        drop(state);

        debug!(
            "closed socket {raw}, discarding {} pending message(s)",
            closed.inbox.len()
        );
        drop(closed);
        Ok(())
    }

    /// Queues the content of `msg` for delivery.
    ///
    /// The caller's descriptor is left untouched: the queued message shares
    /// its content, so the caller still owns and must close `msg`.
    pub fn send(&self, socket: SocketHandle, msg: &RawMsg, flags: Flags) -> Status {
        let payload = msg.share()?;
        let len = payload_bytes(&payload).len();
        let mut state = self.lock()?;

        loop {
            let local = state.socket(socket)?;
            if !local.kind.can_send() {
                return Err(Errno::ENOTSUP);
            }
            if len > self.shared.config.max_msg_size {
                return Err(Errno::EMSGSIZE);
            }

            if state.route(socket.as_raw(), &payload) {
                trace!("socket {} sent {len} bytes", socket.as_raw());
                self.shared.wakeup.notify_all();
                return Ok(());
            }
            if flags.is_nonblocking() {
                return Err(Errno::EAGAIN);
            }
            self.shared.wakeup.wait(&mut state);
            if state.terminated {
                return Err(Errno::ETERM);
            }
        }
    }

    /// Replaces the content of `msg` with the next inbound message.
    pub fn recv(&self, socket: SocketHandle, msg: &mut RawMsg, flags: Flags) -> Status {
        if msg.is_closed() {
            return Err(Errno::EFAULT);
        }
        let mut state = self.lock()?;

        let queued = loop {
            let local = state.socket_mut(socket)?;
            if !local.kind.can_recv() {
                return Err(Errno::ENOTSUP);
            }
            if let Some(queued) = local.inbox.pop_front() {
                break queued;
            }
            if flags.is_nonblocking() {
                return Err(Errno::EAGAIN);
            }
            self.shared.wakeup.wait(&mut state);
            if state.terminated {
                return Err(Errno::ETERM);
            }
        };
        self.shared.wakeup.notify_all();
        drop(state);

        trace!(
            "socket {} received {} bytes",
            socket.as_raw(),
            payload_bytes(&queued.payload).len()
        );
        let previous = msg.replace(queued.payload)?;
        drop(previous);
        Ok(())
    }

    /// Sets an option from its wire encoding.
    pub fn setsockopt(&self, socket: SocketHandle, option: i32, value: &[u8]) -> Status {
        let name = OptionName::from_raw(option).ok_or(Errno::EINVAL)?;
        let mut state = self.lock()?;
        state.socket_mut(socket)?.options.set(name, value)?;
        if name == OptionName::Hwm {
            self.shared.wakeup.notify_all();
        }
        Ok(())
    }

    /// Reads an option back in its wire encoding.
    pub fn getsockopt(&self, socket: SocketHandle, option: i32) -> Result<Vec<u8>, Errno> {
        let name = OptionName::from_raw(option).ok_or(Errno::EINVAL)?;
        let state = self.lock()?;
        let local = state.socket(socket)?;
        Ok(local.options.get(local.kind, name).encode())
    }

    /// Decoded variant of [`Context::getsockopt`].
    pub fn option(&self, socket: SocketHandle, name: OptionName) -> Result<OptionValue, Errno> {
        let raw = self.getsockopt(socket, name.as_raw())?;
        OptionValue::decode(name.kind(), &raw)
    }

    /// Number of messages waiting in `socket`'s inbound queue.
    pub fn pending(&self, socket: SocketHandle) -> Result<usize, Errno> {
        let state = self.lock()?;
        Ok(state.socket(socket)?.inbox.len())
    }

    /// Terminates the context: blocked calls return [`Errno::ETERM`], as does
    /// every later call except [`Context::close`].
    pub fn terminate(&self) {
        let mut state = self.shared.state.lock();
        if state.terminated {
            return;
        }
        state.terminated = true;
        let open = state.sockets.len();
        self.shared.wakeup.notify_all();
        drop(state);
        debug!("context terminated with {open} open socket(s)");
    }

    /// True once [`Context::terminate`] has been called.
    pub fn is_terminated(&self) -> bool {
        self.shared.state.lock().terminated
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Context")
            .field("sockets", &state.sockets.len())
            .field("endpoints", &state.endpoints.len())
            .field("terminated", &state.terminated)
            .finish()
    }
}
